use std::fs;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const DEFAULT_BASE_URL: &str = "https://api.29thstreet.com/";
pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub client_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub preview: Option<bool>,
    #[serde(default)]
    pub storage_folder: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub client_key: String,
    /// Always ends with a trailing slash so request paths can be appended.
    pub base_url: String,
    pub preview: bool,
    pub storage_folder: Utf8PathBuf,
    /// Size of the download worker pool. Bounds the fan-out of child
    /// fetches; small payloads behave as if unbounded.
    pub workers: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from("kiosk-sync.json"),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(SyncError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| SyncError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SyncError> {
        let client_key = config.client_key.trim().to_string();
        if client_key.is_empty() {
            return Err(SyncError::ConfigParse("client_key must not be empty".to_string()));
        }

        let mut base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let storage_folder = match config.storage_folder {
            Some(folder) => Utf8PathBuf::from(folder),
            None => default_storage_folder()?,
        };

        let workers = match config.workers {
            Some(0) | None => DEFAULT_WORKERS,
            Some(count) => count,
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            client_key,
            base_url,
            preview: config.preview.unwrap_or(false),
            storage_folder,
            workers,
        })
    }
}

pub fn default_storage_folder() -> Result<Utf8PathBuf, SyncError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".local/share/kiosk-sync")).ok()
        })
        .ok_or_else(|| SyncError::Filesystem("unable to resolve storage directory".to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolve_defaults() {
        let config = Config {
            schema_version: None,
            client_key: "ck-test".to_string(),
            base_url: None,
            preview: None,
            storage_folder: Some("/tmp/kiosk".to_string()),
            workers: None,
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert!(!resolved.preview);
        assert_eq!(resolved.workers, DEFAULT_WORKERS);
        assert_eq!(resolved.storage_folder, Utf8PathBuf::from("/tmp/kiosk"));
    }

    #[test]
    fn resolve_appends_trailing_slash() {
        let config = Config {
            schema_version: Some(1),
            client_key: "ck-test".to_string(),
            base_url: Some("https://api.example.com/v2".to_string()),
            preview: Some(true),
            storage_folder: Some("/tmp/kiosk".to_string()),
            workers: Some(2),
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.base_url, "https://api.example.com/v2/");
        assert!(resolved.preview);
        assert_eq!(resolved.workers, 2);
    }

    #[test]
    fn resolve_rejects_blank_client_key() {
        let config = Config {
            schema_version: None,
            client_key: "  ".to_string(),
            base_url: None,
            preview: None,
            storage_folder: Some("/tmp/kiosk".to_string()),
            workers: None,
        };

        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SyncError::ConfigParse(_))
        );
    }

    #[test]
    fn zero_workers_falls_back_to_default() {
        let config = Config {
            schema_version: None,
            client_key: "ck".to_string(),
            base_url: None,
            preview: None,
            storage_folder: Some("/tmp/kiosk".to_string()),
            workers: Some(0),
        };
        assert_eq!(
            ConfigLoader::resolve_config(config).unwrap().workers,
            DEFAULT_WORKERS
        );
    }
}
