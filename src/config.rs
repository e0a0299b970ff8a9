use std::env;

use anyhow::{Context, Result};

pub const DEFAULT_LOG_FILTER: &str = "actix_web=info,asl_dictionary=info";

/// Server settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub pool_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(port) => port.parse().context("PORT must be a valid port number")?,
            Err(_) => 8080,
        };
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let pool_size = match env::var("DATABASE_POOL_SIZE") {
            Ok(size) => size
                .parse()
                .context("DATABASE_POOL_SIZE must be a positive integer")?,
            Err(_) => 10,
        };

        Ok(Self {
            host,
            port,
            database_url,
            pool_size,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: "postgres://localhost/asl".to_string(),
            pool_size: 4,
        };

        assert_eq!(config.listen_addr(), "127.0.0.1:3000");
    }
}
