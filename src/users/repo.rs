use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User};

pub const USERS_EMAIL_KEY: &str = "users_email_key";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Turns a Postgres unique-index failure into `RepoError::UniqueViolation`.
fn map_db_error(e: sqlx::Error) -> RepoError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return RepoError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or(USERS_EMAIL_KEY).to_string(),
            };
        }
    }
    RepoError::Database(e)
}

/// Storage access for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Opens a transaction. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> RepoResult<Box<dyn UserTransaction>>;
}

#[async_trait]
pub trait UserTransaction: Send {
    async fn insert(&mut self, user: &NewUser) -> RepoResult<User>;
    async fn commit(self: Box<Self>) -> RepoResult<()>;
    async fn rollback(self: Box<Self>) -> RepoResult<()>;
}

// ---- Postgres ----

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, inactive, activation_token, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(user)
    }

    async fn begin(&self) -> RepoResult<Box<dyn UserTransaction>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgUserTransaction { tx }))
    }
}

pub struct PgUserTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UserTransaction for PgUserTransaction {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert(&mut self, user: &NewUser) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, inactive, activation_token)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, username, email, password_hash, inactive, activation_token, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.activation_token)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(user)
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> RepoResult<()> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}

// ---- In memory ----

#[derive(Default)]
struct MemoryTable {
    rows: Vec<User>,
    // Emails inserted by transactions that are still open.
    pending: HashSet<String>,
}

impl MemoryTable {
    fn email_taken(&self, email: &str) -> bool {
        self.pending.contains(email) || self.rows.iter().any(|u| u.email == email)
    }
}

type SharedTable = Arc<Mutex<MemoryTable>>;

// The lock is never held across an await, so a poisoned table is still consistent.
fn lock(table: &SharedTable) -> MutexGuard<'_, MemoryTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local repository used when no database is configured, and by tests.
///
/// An insert reserves its email until the transaction ends, so a second
/// insert of the same email fails immediately, as it would behind a unique
/// index.
#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    table: SharedTable,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of committed users, oldest first.
    pub async fn users(&self) -> Vec<User> {
        lock(&self.table).rows.clone()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let table = lock(&self.table);
        Ok(table.rows.iter().find(|u| u.email == email).cloned())
    }

    async fn begin(&self) -> RepoResult<Box<dyn UserTransaction>> {
        Ok(Box::new(InMemoryUserTransaction {
            table: Arc::clone(&self.table),
            staged: Vec::new(),
        }))
    }
}

pub struct InMemoryUserTransaction {
    table: SharedTable,
    staged: Vec<User>,
}

impl InMemoryUserTransaction {
    fn release(table: &mut MemoryTable, staged: &[User]) {
        for user in staged {
            table.pending.remove(&user.email);
        }
    }
}

#[async_trait]
impl UserTransaction for InMemoryUserTransaction {
    async fn insert(&mut self, user: &NewUser) -> RepoResult<User> {
        let mut table = lock(&self.table);
        if table.email_taken(&user.email) {
            return Err(RepoError::UniqueViolation {
                constraint: USERS_EMAIL_KEY.to_string(),
            });
        }
        table.pending.insert(user.email.clone());
        let row = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            inactive: true,
            activation_token: Some(user.activation_token.clone()),
            created_at: OffsetDateTime::now_utc(),
        };
        self.staged.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);
        let mut table = lock(&this.table);
        Self::release(&mut table, &staged);
        debug!(count = staged.len(), "in-memory commit");
        table.rows.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepoResult<()> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);
        Self::release(&mut lock(&this.table), &staged);
        debug!(count = staged.len(), "in-memory rollback");
        Ok(())
    }
}

impl Drop for InMemoryUserTransaction {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            Self::release(&mut lock(&self.table), &self.staged);
        }
    }
}
