use std::env;
use std::time::Duration;
use thiserror::Error;

/// Records per batch handed from the reader to the workers.
pub const DEFAULT_BATCH_SIZE: usize = 24_000;
/// Batches that may wait in the queue before the reader blocks.
pub const QUEUE_CAPACITY: usize = 10;
/// Writer workers, each with its own store connection.
pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_RETRY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

/// Sizing and behaviour of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub workers: usize,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub skip_header: bool,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: env_usize("LOADER_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            queue_capacity: env_usize("LOADER_QUEUE_CAPACITY", QUEUE_CAPACITY),
            workers: env_usize("LOADER_WORKERS", DEFAULT_WORKERS),
            connect_attempts: env_u32("LOADER_CONNECT_ATTEMPTS", DEFAULT_CONNECT_ATTEMPTS),
            connect_retry_delay: env_duration_millis(
                "LOADER_CONNECT_RETRY_MS",
                DEFAULT_CONNECT_RETRY_MS,
            ),
            skip_header: env_bool("LOADER_SKIP_HEADER", true),
        }
        .clamped()
    }

    /// Replace zero sizes with 1 so the pipeline can always make progress.
    pub fn clamped(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.workers = self.workers.max(1);
        self.connect_attempts = self.connect_attempts.max(1);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: Duration::from_millis(DEFAULT_CONNECT_RETRY_MS),
            skip_header: true,
        }
    }
}

/// Connection settings for the PostGIS destination.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Commit each batch with `synchronous_commit = off`.
    pub async_commit: bool,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(None)
    }

    /// Like [`from_env`](Self::from_env), with `url` taking precedence over `DATABASE_URL`.
    pub fn resolve(url: Option<String>) -> Result<Self, ConfigError> {
        let url = match url {
            Some(url) => url,
            None => env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?,
        };
        Ok(Self {
            url,
            async_commit: env_bool("LOADER_ASYNC_COMMIT", false),
        })
    }
}
