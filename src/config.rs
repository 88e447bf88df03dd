use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string. When unset the service keeps users in memory.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = match std::env::var("APP_PORT") {
            Ok(v) => v.parse::<u16>().context("APP_PORT must be a port number")?,
            Err(_) => 8080,
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "My App <info@my-app.com>".into()),
        };
        Ok(Self {
            database_url,
            db_max_connections,
            host,
            port,
            mail,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))?;
        Ok(addr)
    }

    /// Configuration used by tests: in-memory storage, ephemeral port.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            db_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            mail: MailConfig {
                from: "My App <info@my-app.com>".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_joins_host_and_port() {
        let mut cfg = AppConfig::for_tests();
        cfg.port = 9000;
        assert_eq!(cfg.addr().unwrap().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn addr_rejects_bad_host() {
        let mut cfg = AppConfig::for_tests();
        cfg.host = "not a host".into();
        assert!(cfg.addr().is_err());
    }
}
