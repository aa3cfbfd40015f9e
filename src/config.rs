use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub db_max_connections: u32,
    pub request_timeout_secs: u64,
    pub concurrency_limit: usize,
    /// Reject add-to-cart when the merged line would exceed the product's stock.
    pub enforce_stock_on_add: bool,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            jwt_secret: jwt_secret.into(),
            jwt_expiry_hours: 24,
            db_max_connections: 10,
            request_timeout_secs: 30,
            concurrency_limit: 100,
            enforce_stock_on_add: true,
            cors_origins: Vec::new(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30),
            concurrency_limit: parse_or("CONCURRENCY_LIMIT", 100),
            enforce_stock_on_add: parse_or("ENFORCE_STOCK_ON_ADD", true),
            cors_origins,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::split_list;

    #[test]
    fn cors_list_ignores_blank_entries() {
        assert_eq!(
            split_list(" http://a.test , ,http://b.test,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
