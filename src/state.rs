use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::mailer::{LogMailer, Mailer};
use crate::users::repo::{InMemoryUserRepository, PgUserRepository, UserRepository};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let users = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user repository");
                Arc::new(PgUserRepository::new(db)) as Arc<dyn UserRepository>
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(InMemoryUserRepository::new()) as Arc<dyn UserRepository>
            }
        };

        let mailer = Arc::new(LogMailer::new(config.mail.from.clone())) as Arc<dyn Mailer>;

        Ok(Self::from_parts(config, users, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepository>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
        }
    }
}
