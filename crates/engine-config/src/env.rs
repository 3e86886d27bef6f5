use crate::error::ConfigError;
use std::{collections::HashMap, fs, path::Path};

/// Environment variables from the process, optionally overlaid by a `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Loads `KEY=VALUE` lines from a file; file entries win over the process environment.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::EnvFile(format!("failed to read {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::EnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::EnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), unquote(value.trim()));
        }

        Ok(())
    }
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_comments_quotes_and_exports() {
        let mut env = EnvManager::default();
        let content = r#"
# uploads
OFFLOAD_UPLOADS_DIR="/var/www/wp-content/uploads"
export OFFLOAD_BLOB_BUCKET='media'
OFFLOAD_TABLE_PREFIX=site_
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(
            env.get("OFFLOAD_UPLOADS_DIR"),
            Some("/var/www/wp-content/uploads")
        );
        assert_eq!(env.get("OFFLOAD_BLOB_BUCKET"), Some("media"));
        assert_eq!(env.get("OFFLOAD_TABLE_PREFIX"), Some("site_"));
    }

    #[test]
    fn rejects_lines_without_equals() {
        let mut env = EnvManager::default();
        assert!(env.parse_env_content("NOT A PAIR").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn file_overrides_existing_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "OFFLOAD_CHUNK_SIZE=50").unwrap();

        let mut env = EnvManager::from_vars(HashMap::from([(
            "OFFLOAD_CHUNK_SIZE".to_string(),
            "100".to_string(),
        )]));
        env.load_from_file(file.path()).unwrap();
        assert_eq!(env.get("OFFLOAD_CHUNK_SIZE"), Some("50"));
    }

    #[test]
    fn blank_values_read_as_missing() {
        let env = EnvManager::from_vars(HashMap::from([(
            "OFFLOAD_BLOB_TOKEN".to_string(),
            "  ".to_string(),
        )]));
        assert_eq!(env.get("OFFLOAD_BLOB_TOKEN"), None);
    }
}
