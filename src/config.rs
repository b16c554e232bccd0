use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::CountryFilter;
use crate::error::PreseeaError;

pub const DEFAULT_CONFIG_FILE: &str = "preseea.json";
pub const DEFAULT_BASE_URL: &str = "https://preseea.uah.es/corpus/";
pub const DEFAULT_RAW_DIR: &str = "preseea";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MANIFEST: &str = "metadata.csv";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub concurrent: Option<usize>,
    #[serde(default)]
    pub raw_dir: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CrawlOverrides {
    pub country: Option<String>,
    pub concurrent: Option<usize>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: Url,
    pub country: CountryFilter,
    pub concurrent: usize,
    pub raw_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
    pub max_pages: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: CrawlOverrides,
    ) -> Result<ResolvedConfig, PreseeaError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| PreseeaError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| PreseeaError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: CrawlOverrides,
    ) -> Result<ResolvedConfig, PreseeaError> {
        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            return Err(PreseeaError::InvalidConfig(format!(
                "base_url must end with '/': {base_url}"
            )));
        }
        let base_url = Url::parse(&base_url)
            .map_err(|err| PreseeaError::InvalidConfig(format!("base_url: {err}")))?;

        let country = overrides
            .country
            .or(config.country)
            .map(CountryFilter::new)
            .unwrap_or_default();
        if country.as_str().trim().is_empty() {
            return Err(PreseeaError::InvalidConfig(
                "country filter must not be empty".to_string(),
            ));
        }

        let concurrent = overrides.concurrent.or(config.concurrent).unwrap_or(1);
        if concurrent == 0 {
            return Err(PreseeaError::InvalidConfig(
                "concurrent must be at least 1".to_string(),
            ));
        }

        let max_pages = overrides.max_pages.or(config.max_pages);
        if max_pages == Some(0) {
            return Err(PreseeaError::InvalidConfig(
                "max_pages must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            base_url,
            country,
            concurrent,
            raw_dir: relative_path("raw_dir", config.raw_dir, DEFAULT_RAW_DIR)?,
            data_dir: relative_path("data_dir", config.data_dir, DEFAULT_DATA_DIR)?,
            manifest: relative_path("manifest", config.manifest, DEFAULT_MANIFEST)?,
            max_pages,
            timeout_secs: config.timeout_secs,
            user_agent: config
                .user_agent
                .unwrap_or_else(|| format!("preseea-dl/{}", env!("CARGO_PKG_VERSION"))),
        })
    }
}

fn relative_path(
    field: &str,
    value: Option<String>,
    default: &str,
) -> Result<Utf8PathBuf, PreseeaError> {
    let path = Utf8PathBuf::from(value.unwrap_or_else(|| default.to_string()));
    if path.as_str().is_empty() || path.is_absolute() || path.as_str().contains("..") {
        return Err(PreseeaError::InvalidConfig(format!(
            "{field} must be a relative path inside the output root: {path}"
        )));
    }
    Ok(path)
}
