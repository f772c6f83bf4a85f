use std::path::PathBuf;

use axum::http::HeaderName;
use thiserror::Error;

use crate::identity::DEFAULT_PRINCIPAL_HEADER;

const DB_FILE: &str = "intellipix.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("INTELLIPIX_PORT '{0}' is not a valid port")]
    InvalidPort(String),
    #[error("INTELLIPIX_PUBLIC_URL '{0}' is not an absolute URL")]
    InvalidPublicUrl(String),
    #[error("INTELLIPIX_PRINCIPAL_HEADER '{0}' is not a valid header name")]
    InvalidPrincipalHeader(String),
    #[error("VISION_SUBSCRIPTION_KEY must be set together with VISION_ENDPOINT")]
    MissingVisionKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionConfig {
    pub endpoint: String,
    pub subscription_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub data_file: String,
    pub port: u16,
    pub public_url: String,
    pub vision: Option<VisionConfig>,
    pub principal_header: HeaderName,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from any variable source; unset and empty
    /// variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = var("INTELLIPIX_DATA_DIR").unwrap_or_else(|| String::from(CURRENT_DIR));
        let data_file = var("INTELLIPIX_DATA_FILE").unwrap_or_else(|| String::from(DB_FILE));

        let port = match var("INTELLIPIX_PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError::InvalidPort(p))?,
            None => DEFAULT_PORT,
        };

        let public_url =
            var("INTELLIPIX_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        if url::Url::parse(&public_url).map_or(true, |u| u.cannot_be_a_base()) {
            return Err(ConfigError::InvalidPublicUrl(public_url));
        }

        let vision = match (var("VISION_ENDPOINT"), var("VISION_SUBSCRIPTION_KEY")) {
            (Some(endpoint), Some(subscription_key)) => Some(VisionConfig {
                endpoint,
                subscription_key,
            }),
            (Some(_), None) => return Err(ConfigError::MissingVisionKey),
            (None, _) => None,
        };

        let principal_header = match var("INTELLIPIX_PRINCIPAL_HEADER") {
            Some(h) => HeaderName::try_from(h.trim().to_ascii_lowercase())
                .map_err(|_| ConfigError::InvalidPrincipalHeader(h))?,
            None => HeaderName::from_static(DEFAULT_PRINCIPAL_HEADER),
        };

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            data_file,
            port,
            public_url,
            vision,
            principal_header,
        })
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }
}
