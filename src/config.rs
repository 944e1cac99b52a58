use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";
const MIN_REFRESH_SECS: u64 = 1;
const MAX_REFRESH_SECS: u64 = 60;

/// Error type for configuration persistence
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    NoConfigDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// ufw binary name or path
    #[serde(default = "default_ufw_command")]
    pub ufw_command: String,
    /// Seconds between background refreshes of the rule list
    ///
    /// Clamped to 1..=60 when read via [`AppConfig::refresh_interval`].
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Directory holding `services.txt` and `notes.txt`; defaults to the
    /// config directory
    #[serde(default)]
    pub metadata_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ufw_command: default_ufw_command(),
            refresh_interval_secs: default_refresh_interval(),
            metadata_dir: None,
        }
    }
}

impl AppConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh_interval_secs
                .clamp(MIN_REFRESH_SECS, MAX_REFRESH_SECS),
        )
    }

    /// Annotation directory after applying the default.
    pub fn resolved_metadata_dir(&self) -> Option<PathBuf> {
        self.metadata_dir.clone().or_else(get_config_dir)
    }
}

fn default_ufw_command() -> String {
    "ufw".to_string()
}

fn default_refresh_interval() -> u64 {
    2
}

/// Location of `config.json`.
pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Saves the app config to the config directory using an atomic write pattern.
///
/// Returns the path written.
pub async fn save_config(config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config_to(&path, config).await?;
    Ok(path)
}

/// Saves the app config to `path`.
/// 1. Writes to a temporary file next to `path`.
/// 2. Sets restrictive permissions (0o600) before any data is written.
/// 3. Atomically renames to the target path.
pub async fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })?;
    Ok(())
}

/// Loads the app config, or returns defaults if it is missing or corrupt.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

pub async fn load_config_from(path: &Path) -> AppConfig {
    let Ok(json) = tokio::fs::read_to_string(path).await else {
        return AppConfig::default();
    };
    match serde_json::from_str::<AppConfig>(&json) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring corrupt config {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"ufw_command":"/usr/sbin/ufw"}"#).unwrap();
        assert_eq!(config.ufw_command, "/usr/sbin/ufw");
        assert_eq!(config.refresh_interval_secs, 2);
        assert!(config.metadata_dir.is_none());
    }

    #[test]
    fn test_refresh_interval_is_clamped() {
        let mut config = AppConfig {
            refresh_interval_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        config.refresh_interval_secs = 3600;
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = AppConfig {
            ufw_command: "/opt/ufw".into(),
            refresh_interval_secs: 5,
            metadata_dir: Some(dir.path().join("notes")),
        };

        save_config_to(&path, &config).await.unwrap();
        assert_eq!(load_config_from(&path).await, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_corrupt_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path).await, AppConfig::default());
    }
}
