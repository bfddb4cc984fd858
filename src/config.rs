use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KitapError;
use crate::grouping::CategoryMode;

pub const CONFIG_FILE: &str = "ekitap.json";
pub const DEFAULT_CATALOG_PATH: &str = "data.csv";
pub const DEFAULT_DOWNLOAD_DIR: &str = "data";
pub const DEFAULT_COVER_SIZE: u32 = 150;
pub const DEFAULT_IMAGE_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default)]
    pub remote_catalog_url: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub cover_size: Option<u32>,
    #[serde(default)]
    pub image_retries: Option<u32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub categories: Option<CategoryEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CategoryEntry {
    Mode(String),
    Fixed(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_path: Utf8PathBuf,
    pub remote_catalog_url: Option<String>,
    pub download_dir: Utf8PathBuf,
    pub cache_dir: Option<Utf8PathBuf>,
    pub cover_size: u32,
    pub image_retries: u32,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub category_mode: CategoryMode,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            catalog_path: Utf8PathBuf::from(DEFAULT_CATALOG_PATH),
            remote_catalog_url: None,
            download_dir: Utf8PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            cache_dir: None,
            cover_size: DEFAULT_COVER_SIZE,
            image_retries: DEFAULT_IMAGE_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            category_mode: CategoryMode::Dynamic,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KitapError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| KitapError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KitapError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KitapError> {
        let defaults = ResolvedConfig::default();

        let category_mode = match config.categories {
            None => CategoryMode::Dynamic,
            Some(CategoryEntry::Mode(mode)) if mode.trim().eq_ignore_ascii_case("dynamic") => {
                CategoryMode::Dynamic
            }
            Some(CategoryEntry::Mode(other)) => {
                return Err(KitapError::ConfigParse(format!(
                    "unknown category mode '{other}' (expected \"dynamic\" or a list of keys)"
                )));
            }
            Some(CategoryEntry::Fixed(keys)) => CategoryMode::fixed(keys),
        };

        let cover_size = config.cover_size.unwrap_or(defaults.cover_size);
        if cover_size == 0 {
            return Err(KitapError::ConfigParse(
                "cover_size must be greater than zero".to_string(),
            ));
        }

        let request_timeout = positive_secs(
            "request_timeout_secs",
            config.request_timeout_secs,
            defaults.request_timeout,
        )?;
        let download_timeout = positive_secs(
            "download_timeout_secs",
            config.download_timeout_secs,
            defaults.download_timeout,
        )?;

        Ok(ResolvedConfig {
            catalog_path: config
                .catalog_path
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            remote_catalog_url: config
                .remote_catalog_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            download_dir: config
                .download_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.download_dir),
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            cover_size,
            image_retries: config.image_retries.unwrap_or(defaults.image_retries).max(1),
            request_timeout,
            download_timeout,
            category_mode,
        })
    }
}

fn positive_secs(field: &str, value: Option<u64>, default: Duration) -> Result<Duration, KitapError> {
    match value {
        Some(0) => Err(KitapError::ConfigParse(format!(
            "{field} must be greater than zero"
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
