//! Storage client: the credential gate in front of every store operation

use super::backend::ObjectStore;
use super::upload::UploadTracker;
use crate::config::{ConsoleConfig, DEFAULT_PRESIGN_EXPIRY_SECS, DEFAULT_UPLOAD_QUEUE_SIZE};
use crate::credentials::{CredentialSession, S3Info};
use crate::error::StorageResult;
use std::sync::Arc;
use std::time::Duration;

/// Object storage client for the active project.
///
/// Operations live in the `list`, `objects`, `upload` and `acl` modules.
#[derive(Clone)]
pub struct StorageClient {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) session: Arc<CredentialSession>,
    pub(crate) tracker: UploadTracker,
    pub(crate) presign_expiry: Duration,
    pub(crate) upload_queue_size: usize,
}

impl StorageClient {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        session: Arc<CredentialSession>,
        config: &ConsoleConfig,
    ) -> Self {
        Self {
            store,
            session,
            tracker: UploadTracker::default(),
            presign_expiry: config.presign_expiry,
            upload_queue_size: config.upload_queue_size.max(1),
        }
    }

    pub fn with_defaults(store: Arc<dyn ObjectStore>, session: Arc<CredentialSession>) -> Self {
        Self {
            store,
            session,
            tracker: UploadTracker::default(),
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
            upload_queue_size: DEFAULT_UPLOAD_QUEUE_SIZE,
        }
    }

    pub fn session(&self) -> &Arc<CredentialSession> {
        &self.session
    }

    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }

    /// Cached S3 info, fetching credentials first when absent.
    ///
    /// Runs before any S3 request; fails with `MissingCredentials` without
    /// touching the store.
    pub(crate) async fn s3_info(&self) -> StorageResult<S3Info> {
        self.session.ensure().await
    }
}
