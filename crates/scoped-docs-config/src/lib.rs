use scoped_docs_engine::grant::DEFAULT_REQUEST_CODE_BASE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the granted tree root, as returned by `path()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_uri: Option<String>,

    /// First request code used for tree requests
    #[serde(default = "default_request_code_base")]
    pub request_code_base: i32,

    /// Ask for grants that survive a restart
    #[serde(default = "default_persist_grant")]
    pub persist_grant: bool,
}

fn default_request_code_base() -> i32 {
    DEFAULT_REQUEST_CODE_BASE
}

fn default_persist_grant() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_uri: None,
            request_code_base: default_request_code_base(),
            persist_grant: default_persist_grant(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/scoped-docs");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }
}

/// Expand `~` and environment variables in a host directory given on the command line
pub fn expand_host_path(path: &str) -> Option<PathBuf> {
    match shellexpand::full(path) {
        Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/scoped-docs/config.toml"));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.request_code_base, 2801);
        assert!(config.persist_grant);
    }

    #[test]
    fn test_config_from_toml() {
        let config_content = r#"
root_uri = "content://com.android.externalstorage.documents/tree/primary%3AGames"
request_code_base = 4000
persist_grant = false
"#;

        let config: Config = toml::from_str(config_content).unwrap();

        assert_eq!(
            config.root_uri.as_deref(),
            Some("content://com.android.externalstorage.documents/tree/primary%3AGames")
        );
        assert_eq!(config.request_code_base, 4000);
        assert!(!config.persist_grant);
    }

    #[test]
    fn test_unset_root_is_not_written() {
        let toml_str = toml::to_string(&Config::default()).unwrap();
        assert!(!toml_str.contains("root_uri"));
    }

    #[test]
    fn test_expand_host_path_with_tilde() {
        let expanded = expand_host_path("~/test/path").unwrap();

        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_host_path_with_env_var() {
        unsafe {
            env::set_var("SCOPED_DOCS_TEST_VAR", "/test/env/path");
        }

        let expanded = expand_host_path("$SCOPED_DOCS_TEST_VAR/subdir").unwrap();
        assert_eq!(expanded, PathBuf::from("/test/env/path/subdir"));

        unsafe {
            env::remove_var("SCOPED_DOCS_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_host_path_with_relative_path() {
        let expanded = expand_host_path("relative/path").unwrap();
        assert_eq!(expanded, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "request_code_base = \"soon\"").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested/config.toml");
        let test_config = Config {
            root_uri: Some("file://%2Fhome%2Fgamer%2Fsaves".to_string()),
            ..Config::default()
        };

        test_config.save_to_path(&config_file).unwrap();
        let loaded_config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded_config, test_config);
    }
}
