use crate::{env::EnvManager, error::ConfigError};
use connectors::sql::base::adapter::DatabaseKind;
use model::chunk::DEFAULT_CHUNK_SIZE;
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::debug;

pub const KEY_DATABASE_URL: &str = "OFFLOAD_DATABASE_URL";
pub const KEY_DATABASE_KIND: &str = "OFFLOAD_DATABASE_KIND";
pub const KEY_TABLE_PREFIX: &str = "OFFLOAD_TABLE_PREFIX";
pub const KEY_UPLOADS_DIR: &str = "OFFLOAD_UPLOADS_DIR";
pub const KEY_LOCAL_BASE_URL: &str = "OFFLOAD_LOCAL_BASE_URL";
pub const KEY_BLOB_ENDPOINT: &str = "OFFLOAD_BLOB_ENDPOINT";
pub const KEY_BLOB_BUCKET: &str = "OFFLOAD_BLOB_BUCKET";
pub const KEY_BLOB_TOKEN: &str = "OFFLOAD_BLOB_TOKEN";
pub const KEY_BLOB_PUBLIC_URL: &str = "OFFLOAD_BLOB_PUBLIC_URL";
pub const KEY_BLOB_KEY_PREFIX: &str = "OFFLOAD_BLOB_KEY_PREFIX";
pub const KEY_BLOB_DIR: &str = "OFFLOAD_BLOB_DIR";
pub const KEY_STATE_PATH: &str = "OFFLOAD_STATE_PATH";
pub const KEY_CHUNK_SIZE: &str = "OFFLOAD_CHUNK_SIZE";
pub const KEY_CHUNK_STAGGER_SECS: &str = "OFFLOAD_CHUNK_STAGGER_SECS";
pub const KEY_WORKER_CONCURRENCY: &str = "OFFLOAD_WORKER_CONCURRENCY";
pub const KEY_UPLOAD_MAX_ATTEMPTS: &str = "OFFLOAD_UPLOAD_MAX_ATTEMPTS";

const DEFAULT_TABLE_PREFIX: &str = "wp_";
const DEFAULT_STAGGER_SECS: u64 = 30;
const DEFAULT_WORKER_CONCURRENCY: usize = 2;
const DEFAULT_UPLOAD_MAX_ATTEMPTS: usize = 3;
const MAX_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
    pub kind: DatabaseKind,
    pub table_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBackend {
    Http {
        endpoint: String,
        bucket: String,
        token: Option<String>,
    },
    Filesystem {
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSettings {
    pub backend: BlobBackend,
    /// Base URL objects are served from once uploaded.
    pub public_url: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSettings {
    pub uploads_dir: PathBuf,
    pub local_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub state_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_stagger: Duration,
    pub worker_concurrency: usize,
    pub upload_max_attempts: usize,
}

/// Everything a command needs, validated up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub database: DatabaseSettings,
    pub blob: BlobSettings,
    pub media: MediaSettings,
    pub run: RunSettings,
}

impl MigrationConfig {
    /// Reads the process environment, then the optional env file on top.
    pub fn load(env_file: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut env = EnvManager::from_process();
        if let Some(path) = env_file {
            env.load_from_file(path)?;
        }
        Self::from_env(&env)
    }

    /// Collects every missing required key before failing so the operator
    /// sees the full list at once.
    pub fn from_env(env: &EnvManager) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |key: &str| -> String {
            match env.get(key) {
                Some(value) => value.to_string(),
                None => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        };

        let database_url = required(KEY_DATABASE_URL);
        let uploads_dir = required(KEY_UPLOADS_DIR);
        let local_base_url = required(KEY_LOCAL_BASE_URL);
        let public_url = required(KEY_BLOB_PUBLIC_URL);

        let backend = match env.get(KEY_BLOB_DIR) {
            Some(dir) => BlobBackend::Filesystem {
                dir: expand_home(dir),
            },
            None => BlobBackend::Http {
                endpoint: required(KEY_BLOB_ENDPOINT),
                bucket: required(KEY_BLOB_BUCKET),
                token: env.get(KEY_BLOB_TOKEN).map(str::to_string),
            },
        };

        if !missing.is_empty() {
            return Err(ConfigError::Incomplete(missing));
        }

        let kind = match env.get(KEY_DATABASE_KIND) {
            Some(name) => DatabaseKind::from_name(name),
            None => DatabaseKind::from_url(&database_url),
        };
        if let DatabaseKind::Other(name) = &kind {
            return Err(ConfigError::Invalid {
                key: KEY_DATABASE_KIND.to_string(),
                reason: format!("unsupported database '{name}'"),
            });
        }

        let chunk_size = parse_or(env, KEY_CHUNK_SIZE, DEFAULT_CHUNK_SIZE)?;
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(invalid(
                KEY_CHUNK_SIZE,
                format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            ));
        }

        let stagger_secs = parse_or(env, KEY_CHUNK_STAGGER_SECS, DEFAULT_STAGGER_SECS)?;
        if stagger_secs == 0 {
            return Err(invalid(KEY_CHUNK_STAGGER_SECS, "must be greater than 0".into()));
        }

        let worker_concurrency =
            parse_or(env, KEY_WORKER_CONCURRENCY, DEFAULT_WORKER_CONCURRENCY)?.max(1);
        let upload_max_attempts =
            parse_or(env, KEY_UPLOAD_MAX_ATTEMPTS, DEFAULT_UPLOAD_MAX_ATTEMPTS)?.max(1);

        let state_path = match env.get(KEY_STATE_PATH) {
            Some(path) => expand_home(path),
            None => default_state_path(),
        };

        let config = MigrationConfig {
            database: DatabaseSettings {
                url: database_url,
                kind,
                table_prefix: env
                    .get(KEY_TABLE_PREFIX)
                    .unwrap_or(DEFAULT_TABLE_PREFIX)
                    .to_string(),
            },
            blob: BlobSettings {
                backend,
                public_url,
                key_prefix: env
                    .get(KEY_BLOB_KEY_PREFIX)
                    .map(|p| p.trim_matches('/').to_string())
                    .unwrap_or_default(),
            },
            media: MediaSettings {
                uploads_dir: expand_home(&uploads_dir),
                local_base_url,
            },
            run: RunSettings {
                state_path,
                chunk_size,
                chunk_stagger: Duration::from_secs(stagger_secs),
                worker_concurrency,
                upload_max_attempts,
            },
        };

        debug!(
            database = ?config.database.kind,
            prefix = %config.database.table_prefix,
            chunk_size = config.run.chunk_size,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn invalid(key: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason,
    }
}

fn parse_or<T>(env: &EnvManager, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".offload")
        .join("state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvManager {
        EnvManager::from_vars(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            (KEY_DATABASE_URL, "mysql://wp:wp@localhost/wordpress"),
            (KEY_UPLOADS_DIR, "/srv/uploads"),
            (KEY_LOCAL_BASE_URL, "https://example.com/wp-content/uploads"),
            (KEY_BLOB_ENDPOINT, "http://minio:9000"),
            (KEY_BLOB_BUCKET, "media"),
            (KEY_BLOB_PUBLIC_URL, "https://cdn.example.com"),
        ]
    }

    #[test]
    fn loads_with_defaults() {
        let config = MigrationConfig::from_env(&env(&complete())).unwrap();
        assert_eq!(config.database.kind, DatabaseKind::MySql);
        assert_eq!(config.database.table_prefix, "wp_");
        assert_eq!(config.run.chunk_size, 100);
        assert_eq!(config.run.chunk_stagger, Duration::from_secs(30));
        assert_eq!(config.run.upload_max_attempts, 3);
        assert!(matches!(config.blob.backend, BlobBackend::Http { .. }));
    }

    #[test]
    fn reports_every_missing_key() {
        let err = MigrationConfig::from_env(&env(&[(KEY_UPLOADS_DIR, "/srv/uploads")]))
            .unwrap_err();
        match err {
            ConfigError::Incomplete(keys) => {
                assert!(keys.contains(&KEY_DATABASE_URL.to_string()));
                assert!(keys.contains(&KEY_BLOB_BUCKET.to_string()));
                assert!(!keys.contains(&KEY_UPLOADS_DIR.to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blob_dir_selects_filesystem_store() {
        let vars = [
            (KEY_DATABASE_URL, "postgres://localhost/wp"),
            (KEY_UPLOADS_DIR, "/srv/uploads"),
            (KEY_LOCAL_BASE_URL, "https://example.com/uploads"),
            (KEY_BLOB_PUBLIC_URL, "https://cdn.example.com"),
            (KEY_BLOB_DIR, "/mnt/bucket"),
            (KEY_BLOB_KEY_PREFIX, "/site-a/"),
        ];
        let config = MigrationConfig::from_env(&env(&vars)).unwrap();
        assert_eq!(config.database.kind, DatabaseKind::Postgres);
        assert_eq!(
            config.blob.backend,
            BlobBackend::Filesystem {
                dir: PathBuf::from("/mnt/bucket")
            }
        );
        assert_eq!(config.blob.key_prefix, "site-a");
    }

    #[test]
    fn rejects_out_of_range_chunk_size() {
        let mut vars = complete();
        vars.push((KEY_CHUNK_SIZE, "0"));
        assert!(matches!(
            MigrationConfig::from_env(&env(&vars)),
            Err(ConfigError::Invalid { .. })
        ));

        let mut vars = complete();
        vars.push((KEY_CHUNK_STAGGER_SECS, "soon"));
        assert!(matches!(
            MigrationConfig::from_env(&env(&vars)),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
