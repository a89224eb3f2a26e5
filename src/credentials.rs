//! Project-scoped S3 credentials
//!
//! The IAM service issues one access key / secret key pair per project. The
//! pair is cached in memory for the active session and fetched again whenever
//! it is missing.

use crate::config::ServiceType;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const IAM_API_VERSION: &str = "/iam/api/v1";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_key: String,
    pub secret_key: String,
}

impl CredentialPair {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Everything needed to build an S3 client for the active page.
#[derive(Debug, Clone, PartialEq)]
pub struct S3Info {
    pub credential: CredentialPair,
    pub endpoint: String,
    pub service: ServiceType,
}

/// Issues credential pairs for a project.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, project_id: &str) -> StorageResult<CredentialPair>;

    /// Replace the project's pair with a new one.
    async fn rotate(&self, project_id: &str) -> StorageResult<CredentialPair>;
}

/// IAM REST client for `/iam/api/v1/credential/project/{projectId}/`.
#[derive(Debug, Clone)]
pub struct IamClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl IamClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn credential_url(&self, project_id: &str) -> String {
        format!(
            "{}{}/credential/project/{}/",
            self.base_url,
            IAM_API_VERSION,
            urlencoding::encode(project_id)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CredentialSource for IamClient {
    async fn fetch(&self, project_id: &str) -> StorageResult<CredentialPair> {
        let response = self
            .authorize(self.http.get(self.credential_url(project_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<CredentialPair>().await?)
    }

    async fn rotate(&self, project_id: &str) -> StorageResult<CredentialPair> {
        let response = self
            .authorize(self.http.put(self.credential_url(project_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<CredentialPair>().await?)
    }
}

struct SessionState {
    project_id: String,
    service: ServiceType,
    endpoint: String,
    credential: Option<CredentialPair>,
}

/// Credential gate for the active project and service.
pub struct CredentialSession {
    source: Arc<dyn CredentialSource>,
    state: Mutex<SessionState>,
}

impl CredentialSession {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        project_id: impl Into<String>,
        service: ServiceType,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            source,
            state: Mutex::new(SessionState {
                project_id: project_id.into(),
                service,
                endpoint: endpoint.into(),
                credential: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn project_id(&self) -> String {
        self.state().project_id.clone()
    }

    pub fn service(&self) -> ServiceType {
        self.state().service
    }

    pub fn has_credential(&self) -> bool {
        self.state().credential.is_some()
    }

    /// Cached S3 info, without touching the network.
    pub fn cached(&self) -> StorageResult<S3Info> {
        let state = self.state();
        match &state.credential {
            Some(credential) => Ok(S3Info {
                credential: credential.clone(),
                endpoint: state.endpoint.clone(),
                service: state.service,
            }),
            None => Err(StorageError::MissingCredentials),
        }
    }

    /// Return cached S3 info, fetching the credential pair first if absent.
    ///
    /// Fails with `MissingCredentials` when no pair can be obtained.
    pub async fn ensure(&self) -> StorageResult<S3Info> {
        if let Ok(info) = self.cached() {
            return Ok(info);
        }

        let project_id = self.project_id();
        match self.source.fetch(&project_id).await {
            Ok(credential) if credential.is_complete() => {
                let mut state = self.state();
                // The project may have been switched while fetching.
                if state.project_id != project_id {
                    warn!(
                        "credentials: project switched during fetch ({} -> {})",
                        project_id, state.project_id
                    );
                    return Err(StorageError::MissingCredentials);
                }
                info!("credentials: cached pair for project {}", project_id);
                state.credential = Some(credential);
                drop(state);
                self.cached()
            }
            Ok(_) => {
                warn!("credentials: empty pair returned for project {}", project_id);
                self.clear();
                Err(StorageError::MissingCredentials)
            }
            Err(e) => {
                warn!(
                    "credentials: fetch failed for project {}: {}",
                    project_id, e
                );
                self.clear();
                Err(StorageError::MissingCredentials)
            }
        }
    }

    /// Rotate the project's credential pair and cache the new one.
    pub async fn rotate(&self) -> StorageResult<()> {
        let project_id = self.project_id();
        match self.source.rotate(&project_id).await {
            Ok(credential) => {
                info!("credentials: rotated pair for project {}", project_id);
                self.state().credential = Some(credential);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "credentials: rotate failed for project {}: {}",
                    project_id, e
                );
                self.clear();
                Err(e)
            }
        }
    }

    pub fn clear(&self) {
        self.state().credential = None;
    }

    /// Switch the active project; the cached pair belongs to the old one.
    pub fn switch_project(&self, project_id: impl Into<String>) {
        let mut state = self.state();
        state.project_id = project_id.into();
        state.credential = None;
    }

    /// Point the session at another S3 service; credentials stay valid.
    pub fn set_service(&self, service: ServiceType, endpoint: impl Into<String>) {
        let mut state = self.state();
        state.service = service;
        state.endpoint = endpoint.into();
    }
}
