use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required settings are missing; the operation is skipped.
    #[error("Configuration incomplete, missing: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Env file error: {0}")]
    EnvFile(String),
}
