//! Storage console: dispatcher-wrapped storage operations for one page
//!
//! - `listing`: listing state machine of the active bucket/prefix view

mod listing;

pub use listing::{ListingState, ListingView};

use crate::config::{ConsoleConfig, ServiceType};
use crate::credentials::{CredentialSession, IamClient};
use crate::dispatch::{
    BatchCallDescriptor, BatchFailure, CallDescriptor, CallResult, Dispatcher, Indexed, Presenter,
};
use crate::error::StorageError;
use crate::storage::{
    Bucket, BucketAcl, DeleteTarget, ObjectStore, S3Store, StorageClient, UploadRequest,
    UploadSummary,
};
use crate::usage::{StorageUsage, UsageClient};
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Everything a storage page does, routed through the call dispatcher.
///
/// Storage pages run without the progress overlay; failures still surface
/// as error dialogs unless stated otherwise.
pub struct StorageConsole {
    config: ConsoleConfig,
    client: StorageClient,
    dispatcher: Dispatcher,
    usage: UsageClient,
    listing: ListingView,
    usage_info: Option<StorageUsage>,
}

impl StorageConsole {
    pub fn new(
        config: ConsoleConfig,
        client: StorageClient,
        dispatcher: Dispatcher,
        usage: UsageClient,
    ) -> Self {
        Self {
            config,
            client,
            dispatcher,
            usage,
            listing: ListingView::default(),
            usage_info: None,
        }
    }

    /// Wire the console to the live IAM, S3 and usage services.
    pub fn connect(
        config: ConsoleConfig,
        token: &str,
        project_id: &str,
        service: ServiceType,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let iam = IamClient::new(config.api_url.as_str()).with_token(token);
        let session = CredentialSession::new(
            Arc::new(iam),
            project_id,
            service,
            config.endpoint(service),
        );
        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config));
        let client = StorageClient::new(store, Arc::new(session), &config);
        let usage = UsageClient::new(&config).with_token(token);
        info!(
            "storage console: project {} on {} ({})",
            project_id,
            service,
            config.endpoint(service)
        );
        Self::new(config, client, Dispatcher::new(presenter), usage)
    }

    pub fn client(&self) -> &StorageClient {
        &self.client
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn listing(&self) -> &ListingView {
        &self.listing
    }

    pub fn usage(&self) -> Option<&StorageUsage> {
        self.usage_info.as_ref()
    }

    pub async fn fetch_bucket_list(&self) -> CallResult<Vec<Bucket>, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| client.list_buckets())
                    .name("fetch_bucket_list")
                    .skip_progress(),
            )
            .await
    }

    /// Show the first page of `prefix`, dropping the previous view.
    pub async fn open_prefix(&mut self, bucket: &str, prefix: &str) -> CallResult<(), StorageError> {
        let request = self.listing.navigate(bucket, prefix);
        self.fetch_page(request).await
    }

    /// Append the next page of the current view. No-op when there is none.
    pub async fn load_more(&mut self) -> CallResult<(), StorageError> {
        match self.listing.next_page() {
            Some(request) => self.fetch_page(request).await,
            None => CallResult::Success(()),
        }
    }

    async fn fetch_page(&mut self, request: listing::PageRequest) -> CallResult<(), StorageError> {
        let client = &self.client;
        let result = self
            .dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| async move {
                    client
                        .list_objects(
                            &request.bucket,
                            &request.prefix,
                            &request.delimiter,
                            &request.continuation_token,
                        )
                        .await
                })
                .name("fetch_object_list")
                .skip_progress(),
            )
            .await;
        self.listing.apply(&result);
        result.map(|_| ())
    }

    pub async fn create_bucket(&self, bucket: &str) -> CallResult<(), StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|name: Option<String>| async move {
                    client.create_bucket(&name.unwrap_or_default()).await
                })
                .payload(bucket.to_string())
                .name("create_bucket")
                .skip_progress(),
            )
            .await
    }

    pub async fn create_folder(&self, bucket: &str, path: &str) -> CallResult<String, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| client.create_folder(bucket, path))
                    .name("create_folder")
                    .skip_progress(),
            )
            .await
    }

    /// Delete several buckets concurrently; each is emptied before removal.
    pub async fn delete_buckets(
        &self,
        buckets: Vec<String>,
    ) -> CallResult<Vec<Indexed<()>>, BatchFailure<StorageError>> {
        let client = &self.client;
        self.dispatcher
            .dispatch_all(
                BatchCallDescriptor::new(
                    |bucket: String| async move { client.delete_bucket(&bucket).await },
                    buckets,
                )
                .name("delete_bucket")
                .skip_progress(),
            )
            .await
    }

    pub async fn delete_selection(
        &self,
        bucket: &str,
        targets: &[DeleteTarget],
    ) -> CallResult<(), StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| client.delete_selection(bucket, targets))
                    .name("delete_objects")
                    .skip_progress(),
            )
            .await
    }

    /// Presigned download link with the configured expiry.
    pub async fn download_link(&self, bucket: &str, key: &str) -> CallResult<String, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|expiry: Option<Duration>| {
                    client.presigned_download(bucket, key, expiry)
                })
                .payload(self.config.presign_expiry)
                .name("download_object")
                .skip_progress(),
            )
            .await
    }

    pub async fn read_acl(&self, bucket: &str) -> CallResult<BucketAcl, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| client.read_acl(bucket))
                    .name("fetch_bucket_acl")
                    .skip_progress(),
            )
            .await
    }

    pub async fn update_acl(
        &self,
        bucket: &str,
        owner_id: Option<String>,
        grantee_ids: &[String],
    ) -> CallResult<Vec<String>, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|owner: Option<Option<String>>| {
                    client.update_acl(bucket, owner.flatten(), grantee_ids)
                })
                .payload(owner_id)
                .name("update_bucket_acl")
                .skip_progress(),
            )
            .await
    }

    /// Refresh the quota of the active project and service.
    ///
    /// Failures are logged only; the usage panel keeps its last value.
    pub async fn refresh_usage(&mut self) -> CallResult<StorageUsage, StorageError> {
        let usage = &self.usage;
        let service = self.client.session().service();
        let project_id = self.client.session().project_id();
        let result = self
            .dispatcher
            .dispatch(
                CallDescriptor::new(|_: Option<()>| async move {
                    usage.fetch(service, &project_id).await
                })
                .name("fetch_usage")
                .skip_progress()
                .suppress_error_dialog(),
            )
            .await;
        if let CallResult::Success(info) = &result {
            self.usage_info = Some(*info);
        }
        result
    }

    pub fn is_quota_full(&self) -> bool {
        self.usage_info.is_some_and(|usage| usage.is_quota_full())
    }

    pub async fn upload(
        &self,
        base_path: &str,
        requests: Vec<UploadRequest>,
    ) -> CallResult<UploadSummary, StorageError> {
        let client = &self.client;
        self.dispatcher
            .dispatch(
                CallDescriptor::new(|requests: Option<Vec<UploadRequest>>| {
                    client.upload_files(base_path, requests.unwrap_or_default())
                })
                .payload(requests)
                .name("upload_object")
                .skip_progress(),
            )
            .await
    }

    pub fn cancel_upload(&self, key: &str) -> bool {
        self.client.cancel_upload(key)
    }

    /// Switch the active project: credentials, uploads, listing and usage
    /// of the previous one are dropped.
    pub fn switch_project(&mut self, project_id: &str) {
        self.client.session().switch_project(project_id);
        self.client.tracker().reset();
        self.listing.reset();
        self.usage_info = None;
        info!("storage console: switched to project {}", project_id);
    }

    /// Point the console at another storage service of the same project.
    pub fn set_service(&mut self, service: ServiceType) {
        self.client
            .session()
            .set_service(service, self.config.endpoint(service));
        self.listing.reset();
        self.usage_info = None;
    }
}
