//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use crate::{ConfigError, RevarcConfig};

/// Name of the project configuration file.
const PROJECT_CONFIG_FILE: &str = "revarc.toml";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "REVARC".to_string(),
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "REVARC")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence and
    /// validate the result.
    pub fn load(self) -> Result<RevarcConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = RevarcConfig::default();
        builder = builder.add_source(
            config::Config::try_from(&defaults)
                .map_err(|e| ConfigError::MergeError(e.to_string()))?,
        );

        // 2. Project config (revarc.toml)
        let project_config_file = self.project_dir.join(PROJECT_CONFIG_FILE);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Environment variables (REVARC_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder
            .build()
            .map_err(|e| ConfigError::MergeError(e.to_string()))?;
        let config: RevarcConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigError::MergeError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if no sources resolve.
    pub fn load_or_default(self) -> RevarcConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_defaults_from_empty_dir() {
        let temp_dir = tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .unwrap();
        assert_eq!(config.pipeline.consumers, 1);
        assert!(config.archives.is_empty());
    }

    #[test]
    fn project_file_overrides_defaults() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("revarc.toml"),
            r#"
[pipeline]
diff_workers = 8

[[archives]]
kind = "bzip2"
path = "/dumps/enwiki-history.xml.bz2"
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .unwrap();
        assert_eq!(config.pipeline.diff_workers, 8);
        assert_eq!(config.archives.len(), 1);
        assert_eq!(config.archives[0].start_offset, 0);
    }

    #[test]
    fn invalid_file_config_is_rejected() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("revarc.toml"),
            "[pipeline]\nconsumers = 0\n",
        )
        .unwrap();

        let err = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
