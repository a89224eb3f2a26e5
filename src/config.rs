//! Console configuration
//!
//! Values come from the process environment (`API_URL`, `DATA_STORAGE`,
//! `DATA_EXCHANGE`, `DATA_RELEASE`, ...) or are built directly in code.

use log::info;
use serde::Deserialize;
use std::env::vars;
use std::time::Duration;

/// Default presigned download expiry in seconds
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 60;
/// Default number of parts uploaded in parallel for one object
pub const DEFAULT_UPLOAD_QUEUE_SIZE: usize = 5;
/// Default multipart part size: 5MB
pub const DEFAULT_UPLOAD_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] serde_env::Error),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Logical S3 service behind a storage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "dss")]
    Storage,
    #[serde(rename = "des")]
    Exchange,
    #[serde(rename = "drs")]
    Release,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Storage => "dss",
            ServiceType::Exchange => "des",
            ServiceType::Release => "drs",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Portal API gateway, e.g. `https://portal.example.com`
    pub api_url: String,
    /// S3 endpoint for data storage pages
    pub data_storage: String,
    /// S3 endpoint for data exchange pages
    pub data_exchange: String,
    /// S3 endpoint for data release pages
    pub data_release: String,
    pub public_site: bool,
    pub presign_expiry: Duration,
    pub upload_queue_size: usize,
    pub upload_part_size: u64,
}

#[derive(Deserialize)]
struct RawConfig {
    api_url: Option<String>,
    data_storage: Option<String>,
    data_exchange: Option<String>,
    data_release: Option<String>,
    public_site: Option<bool>,
    presign_expiry_secs: Option<u64>,
    upload_queue_size: Option<usize>,
    upload_part_size: Option<u64>,
}

impl ConsoleConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            data_storage: String::new(),
            data_exchange: String::new(),
            data_release: String::new(),
            public_site: false,
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
            upload_queue_size: DEFAULT_UPLOAD_QUEUE_SIZE,
            upload_part_size: DEFAULT_UPLOAD_PART_SIZE,
        }
    }

    pub fn with_endpoint(mut self, service: ServiceType, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        match service {
            ServiceType::Storage => self.data_storage = endpoint,
            ServiceType::Exchange => self.data_exchange = endpoint,
            ServiceType::Release => self.data_release = endpoint,
        }
        self
    }

    /// S3 endpoint serving the given service type.
    pub fn endpoint(&self, service: ServiceType) -> &str {
        match service {
            ServiceType::Storage => &self.data_storage,
            ServiceType::Exchange => &self.data_exchange,
            ServiceType::Release => &self.data_release,
        }
    }

    /// Path segment of the usage service for a service type.
    pub fn usage_service_path(&self, service: ServiceType) -> &'static str {
        match service {
            ServiceType::Storage if self.public_site => "dss-public",
            ServiceType::Storage => "dss-private",
            ServiceType::Exchange => "des",
            ServiceType::Release => "drs",
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        info!("Loading console configuration from environment variables");
        let raw: RawConfig = serde_env::from_iter(vars())?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let RawConfig {
            api_url,
            data_storage,
            data_exchange,
            data_release,
            public_site,
            presign_expiry_secs,
            upload_queue_size,
            upload_part_size,
        } = raw;

        let api_url = api_url
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("API_URL"))?;

        let upload_queue_size = upload_queue_size.unwrap_or(DEFAULT_UPLOAD_QUEUE_SIZE);
        if upload_queue_size == 0 {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_QUEUE_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        let upload_part_size = upload_part_size.unwrap_or(DEFAULT_UPLOAD_PART_SIZE);
        if upload_part_size < DEFAULT_UPLOAD_PART_SIZE {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_PART_SIZE",
                reason: format!("must be at least {} bytes", DEFAULT_UPLOAD_PART_SIZE),
            });
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            data_storage: data_storage.unwrap_or_default(),
            data_exchange: data_exchange.unwrap_or_default(),
            data_release: data_release.unwrap_or_default(),
            public_site: public_site.unwrap_or(false),
            presign_expiry: Duration::from_secs(
                presign_expiry_secs.unwrap_or(DEFAULT_PRESIGN_EXPIRY_SECS),
            ),
            upload_queue_size,
            upload_part_size,
        })
    }
}
