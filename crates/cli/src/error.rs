use engine_config::error::ConfigError;
use engine_runtime::error::MigrationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrationError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("No scan result stored; run `offload scan` first")]
    NoScanResult,

    #[error("Shutdown requested")]
    ShutdownRequested,
}
