//! Storage usage and quota lookup

use crate::config::{ConsoleConfig, ServiceType};
use crate::error::StorageResult;
use crate::format::format_bytes;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const USAGE_API_VERSION: &str = "/cs/api/v1";

/// Hard limit value meaning "no quota".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub size_bytes: i64,
    pub hard_limit_bytes: i64,
}

impl StorageUsage {
    pub fn is_unlimited(&self) -> bool {
        self.hard_limit_bytes == UNLIMITED
    }

    pub fn is_quota_full(&self) -> bool {
        !self.is_unlimited() && self.size_bytes >= self.hard_limit_bytes
    }

    pub fn used_display(&self) -> String {
        format_bytes(self.size_bytes.max(0) as u64)
    }

    /// `None` when unlimited.
    pub fn limit_display(&self) -> Option<String> {
        (!self.is_unlimited()).then(|| format_bytes(self.hard_limit_bytes.max(0) as u64))
    }
}

/// REST client for `{api_url}/{service}/cs/api/v1/project/{projectId}`.
#[derive(Debug, Clone)]
pub struct UsageClient {
    http: Client,
    config: ConsoleConfig,
    token: Option<String>,
}

impl UsageClient {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            http: Client::new(),
            config: config.clone(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn usage_url(&self, service: ServiceType, project_id: &str) -> String {
        format!(
            "{}/{}{}/project/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.usage_service_path(service),
            USAGE_API_VERSION,
            urlencoding::encode(project_id)
        )
    }

    pub async fn fetch(&self, service: ServiceType, project_id: &str) -> StorageResult<StorageUsage> {
        let url = self.usage_url(service, project_id);
        debug!("usage: GET {}", url);
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<StorageUsage>().await?)
    }
}
