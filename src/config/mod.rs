use std::env;

/// Server configuration loaded once at startup from the process environment.
///
/// Fatal on a missing or too-short `JWT_SECRET` — a weak signing secret is not
/// a condition the server should continue running under.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,

    pub broker_url: Option<String>,

    pub object_store_endpoint: Option<String>,
    pub object_store_bucket: String,
    pub object_store_access_key: Option<String>,
    pub object_store_secret_key: Option<String>,
    pub object_store_public_url: String,
    pub presign_ttl_seconds: i64,
    pub upload_dir: std::path::PathBuf,

    pub jwt_secret: String,
    pub jwt_access_ttl_minutes: i64,
    pub jwt_refresh_ttl_minutes: i64,

    pub server_host: String,
    pub server_port: u16,
    pub max_file_size_mb: u64,

    pub is_dev: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),
    #[error("JWT_SECRET must be at least 16 characters")]
    WeakJwtSecret,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::Missing("JWT_SECRET".into()))?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::WeakJwtSecret);
        }

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL".into()))?;

        let is_dev = env::var("APP_ENV").as_deref() != Ok("production");

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            database_url,
            db_pool_size: env_parse("DB_POOL_SIZE", 10)?,

            broker_url: env::var("BROKER_URL").ok().filter(|s| !s.is_empty()),

            object_store_endpoint: env::var("OBJECT_STORE_ENDPOINT").ok(),
            object_store_bucket: env::var("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|_| "courier-files".to_string()),
            object_store_access_key: env::var("OBJECT_STORE_ACCESS_KEY").ok(),
            object_store_secret_key: env::var("OBJECT_STORE_SECRET_KEY").ok(),
            object_store_public_url: env::var("OBJECT_STORE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            presign_ttl_seconds: env_parse("OBJECT_STORE_PRESIGN_TTL_SECONDS", 900)?,
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads".to_string())
                .into(),

            jwt_secret,
            jwt_access_ttl_minutes: env_parse("JWT_ACCESS_TTL_MINUTES", 15)?,
            jwt_refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30)?,

            server_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env_parse("API_PORT", 8080)?,
            max_file_size_mb: env_parse("MAX_FILE_SIZE_MB", 50)?,

            is_dev,
            allowed_origins,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_jwt_secret() {
        std::env::set_var("JWT_SECRET", "short");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakJwtSecret)));
    }

    #[test]
    fn max_file_size_bytes_converts_mb() {
        std::env::set_var("JWT_SECRET", "a_valid_secret_value");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("MAX_FILE_SIZE_MB", "2");
        let config = Config::from_env().expect("config should load");
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);
    }
}
