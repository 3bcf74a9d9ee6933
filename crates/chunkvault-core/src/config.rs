//! Configuration module
//!
//! Settings are read from the environment (after loading `.env` if present), with
//! defaults for everything except the database URL.

use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_CHUNK_COUNT: i32 = 10_000;
const MAX_CHUNK_SIZE_MB: u64 = 64;

/// Limits enforced by the upload engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    /// Upper bound for a file's expected chunk count
    pub max_chunk_count: i32,
    /// Payloads above this size are rejected and the chunk marked failed
    pub max_chunk_size_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_chunk_count: MAX_CHUNK_COUNT,
            max_chunk_size_bytes: MAX_CHUNK_SIZE_MB * 1024 * 1024,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub upload_limits: UploadLimits,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let max_chunk_size_mb = lookup("MAX_CHUNK_SIZE_MB")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(MAX_CHUNK_SIZE_MB);

        let config = Config {
            environment,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: lookup("DB_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            local_storage_path: lookup("LOCAL_STORAGE_PATH").filter(|s| !s.is_empty()),
            upload_limits: UploadLimits {
                max_chunk_count: lookup("MAX_CHUNK_COUNT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(MAX_CHUNK_COUNT),
                max_chunk_size_bytes: max_chunk_size_mb * 1024 * 1024,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.upload_limits.max_chunk_count < 1 {
            return Err(anyhow::anyhow!("MAX_CHUNK_COUNT must be at least 1"));
        }

        if self.upload_limits.max_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNK_SIZE_MB must be at least 1"));
        }

        if self.storage_backend == StorageBackend::Local && self.local_storage_path.is_none() {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when using local storage backend"
            ));
        }

        if self.is_production() && self.storage_backend == StorageBackend::Memory {
            return Err(anyhow::anyhow!(
                "The memory storage backend cannot be used in production"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn upload_limits(&self) -> &UploadLimits {
        &self.upload_limits
    }
}
