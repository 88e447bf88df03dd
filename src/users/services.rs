use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    mailer::Mailer,
    users::{
        dto::Registration,
        password::hash_password_off_thread,
        repo::{RepoError, UserRepository, UserTransaction},
        repo_types::{NewUser, User},
        token::generate_activation_token,
    },
};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("email already registered")]
    EmailInUse,
    #[error("activation email could not be sent")]
    EmailFailure(#[source] anyhow::Error),
    #[error("password hashing failed")]
    Hash(#[source] anyhow::Error),
    #[error("storage failure")]
    Storage(#[source] RepoError),
}

impl From<RepoError> for RegisterError {
    fn from(e: RepoError) -> Self {
        if e.is_unique_violation() {
            Self::EmailInUse
        } else {
            Self::Storage(e)
        }
    }
}

async fn rollback(tx: Box<dyn UserTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback failed; transaction dropped");
    }
}

/// Creates an inactive user and sends its activation email.
///
/// The insert and the email share one transaction: the row is committed only
/// after the mail transport accepted the message, and rolled back on any
/// failure. A transaction abandoned by a panic or a cancelled future is
/// discarded when dropped.
#[instrument(skip(repo, mailer, reg), fields(email = %reg.email))]
pub async fn register_user(
    repo: &dyn UserRepository,
    mailer: &dyn Mailer,
    reg: Registration,
) -> Result<User, RegisterError> {
    let password_hash = hash_password_off_thread(reg.password)
        .await
        .map_err(RegisterError::Hash)?;

    let new_user = NewUser {
        username: reg.username,
        email: reg.email,
        password_hash,
        activation_token: generate_activation_token(),
    };

    let mut tx = repo.begin().await.map_err(RegisterError::Storage)?;

    let user = match tx.insert(&new_user).await {
        Ok(u) => u,
        Err(e) => {
            rollback(tx).await;
            let err = RegisterError::from(e);
            match &err {
                RegisterError::EmailInUse => warn!("email already registered"),
                _ => error!(error = %err, "insert user failed"),
            }
            return Err(err);
        }
    };

    if let Err(e) = mailer
        .send_account_activation(&new_user.email, &new_user.activation_token)
        .await
    {
        error!(error = %e, user_id = %user.id, "activation email failed; rolling back");
        rollback(tx).await;
        return Err(RegisterError::EmailFailure(e));
    }

    tx.commit().await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "commit failed");
        RegisterError::from(e)
    })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}
