use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Process-wide configuration, loaded once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub port: u16,
    pub max_seats: i64,
    pub service_time_seconds: i64,
    pub checkin_expiry_seconds: i64,
    pub max_party_name_length: usize,
    pub session_key: String,
    pub cookie_max_age_seconds: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: env::var("REDIS_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()
                .context("REDIS_PORT must be a valid port number")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            max_seats: env::var("MAX_SEATS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("MAX_SEATS must be a valid integer")?,
            service_time_seconds: env::var("SERVICE_TIME_SECONDS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("SERVICE_TIME_SECONDS must be a valid integer")?,
            checkin_expiry_seconds: env::var("CHECKIN_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("CHECKIN_EXPIRY_SECONDS must be a valid integer")?,
            max_party_name_length: env::var("MAX_PARTY_NAME_LENGTH")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("MAX_PARTY_NAME_LENGTH must be a valid integer")?,
            session_key: env::var("SESSION_KEY").context("SESSION_KEY must be set")?,
            cookie_max_age_seconds: env::var("COOKIE_MAX_AGE_SECONDS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("COOKIE_MAX_AGE_SECONDS must be a valid integer")?,
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_combines_host_and_port() {
        let config = Config {
            database_url: "postgres://localhost/test".into(),
            redis_host: "cache.internal".into(),
            redis_port: 6380,
            port: 8080,
            max_seats: 10,
            service_time_seconds: 15,
            checkin_expiry_seconds: 60,
            max_party_name_length: 30,
            session_key: "a".repeat(64),
            cookie_max_age_seconds: 86_400,
        };

        assert_eq!(config.redis_url(), "redis://cache.internal:6380");
    }
}
