//! In-memory `ObjectStore` for tests

use super::backend::{ObjectStore, ProgressFn};
use super::types::{
    AclPolicy, Bucket, DeleteResult, ListRequest, RawListing, RawObject, UploadRequest,
    LIST_MAX_KEYS,
};
use crate::credentials::S3Info;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MockState {
    /// bucket -> key -> size
    buckets: BTreeMap<String, BTreeMap<String, i64>>,
    acl: HashMap<String, AclPolicy>,
    acl_denied: HashSet<String>,
    fail_upload_keys: HashSet<String>,
    hold_upload_keys: HashSet<String>,
    fail_delete_keys: HashSet<String>,
    fail_list_prefixes: HashSet<String>,
    fail_next_page_prefixes: HashSet<String>,
    /// Operation names in call order.
    calls: Vec<String>,
    delete_batches: Vec<Vec<String>>,
    upload_attempts: Vec<String>,
}

/// Mock S3 store with ListObjectsV2 pagination semantics.
///
/// - Continuation tokens are the last returned key or prefix
/// - Upload and delete failures can be scripted per key
/// - Every call is recorded for later inspection
#[derive(Clone, Default)]
pub struct MockObjectStore {
    state: Arc<Mutex<MockState>>,
}

fn service_error(message: &str, status: u16, code: &str) -> StorageError {
    StorageError::Service {
        message: message.to_string(),
        status: Some(status),
        status_text: Some(code.to_string()),
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&self, bucket: &str) {
        let mut state = self.state.lock().unwrap();
        state.buckets.entry(bucket.to_string()).or_default();
    }

    pub fn add_object(&self, bucket: &str, key: &str, size: i64) {
        let mut state = self.state.lock().unwrap();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), size);
    }

    /// Add `count` files named `{prefix}file-NNNN.txt`.
    pub fn add_objects(&self, bucket: &str, prefix: &str, count: usize) {
        for i in 0..count {
            self.add_object(bucket, &format!("{}file-{:04}.txt", prefix, i), 10);
        }
    }

    pub fn fail_upload_for(&self, key: &str) {
        self.state.lock().unwrap().fail_upload_keys.insert(key.to_string());
    }

    /// Uploads of `key` block until cancelled.
    pub fn hold_upload_for(&self, key: &str) {
        self.state.lock().unwrap().hold_upload_keys.insert(key.to_string());
    }

    /// Any delete batch containing `key` fails.
    pub fn fail_delete_for(&self, key: &str) {
        self.state.lock().unwrap().fail_delete_keys.insert(key.to_string());
    }

    pub fn fail_list_for(&self, prefix: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_list_prefixes
            .insert(prefix.to_string());
    }

    /// Listing `prefix` fails once a continuation token is sent.
    pub fn fail_next_pages_for(&self, prefix: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_next_page_prefixes
            .insert(prefix.to_string());
    }

    pub fn deny_acl(&self, bucket: &str) {
        self.state.lock().unwrap().acl_denied.insert(bucket.to_string());
    }

    pub fn set_acl(&self, bucket: &str, policy: AclPolicy) {
        self.state
            .lock()
            .unwrap()
            .acl
            .insert(bucket.to_string(), policy);
    }

    pub fn acl(&self, bucket: &str) -> Option<AclPolicy> {
        self.state.lock().unwrap().acl.get(bucket).cloned()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(bucket)
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().delete_batches.clone()
    }

    pub fn upload_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().upload_attempts.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn list_buckets(&self, _info: &S3Info) -> StorageResult<Vec<Bucket>> {
        self.record("list_buckets");
        let state = self.state.lock().unwrap();
        Ok(state
            .buckets
            .keys()
            .map(|name| Bucket {
                name: name.clone(),
                creation_date: "-".to_string(),
            })
            .collect())
    }

    async fn list_objects_v2(
        &self,
        _info: &S3Info,
        request: &ListRequest,
    ) -> StorageResult<RawListing> {
        self.record("list_objects_v2");
        let state = self.state.lock().unwrap();
        let next_page_fails = !request.continuation_token.is_empty()
            && state.fail_next_page_prefixes.contains(&request.prefix);
        if next_page_fails || state.fail_list_prefixes.contains(&request.prefix) {
            return Err(service_error("list failed", 500, "InternalError"));
        }
        let objects = state
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| service_error("The specified bucket does not exist", 404, "NoSuchBucket"))?;

        // (name, Some(size)) for objects, (prefix, None) for common prefixes
        let mut items: BTreeMap<String, Option<i64>> = BTreeMap::new();
        for (key, size) in objects.range(request.prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&request.prefix) else {
                break;
            };
            if !request.delimiter.is_empty() {
                if let Some(pos) = rest.find(&request.delimiter) {
                    let common = format!(
                        "{}{}",
                        request.prefix,
                        &rest[..pos + request.delimiter.len()]
                    );
                    items.insert(common, None);
                    continue;
                }
            }
            items.insert(key.clone(), Some(*size));
        }

        let page: Vec<(String, Option<i64>)> = items
            .into_iter()
            .filter(|(name, _)| {
                request.continuation_token.is_empty() || *name > request.continuation_token
            })
            .collect();
        let is_truncated = page.len() > LIST_MAX_KEYS as usize;
        let page = &page[..page.len().min(LIST_MAX_KEYS as usize)];

        let mut listing = RawListing {
            is_truncated,
            next_continuation_token: if is_truncated {
                page.last().map(|(name, _)| name.clone())
            } else {
                None
            },
            ..Default::default()
        };
        for (name, size) in page {
            match size {
                Some(size) => listing.contents.push(RawObject {
                    key: name.clone(),
                    size: Some(*size),
                    last_modified: None,
                    owner: Some("owner".to_string()),
                }),
                None => listing.common_prefixes.push(name.clone()),
            }
        }
        Ok(listing)
    }

    async fn delete_objects(
        &self,
        _info: &S3Info,
        bucket: &str,
        keys: Vec<String>,
    ) -> StorageResult<DeleteResult> {
        self.record("delete_objects");
        let mut state = self.state.lock().unwrap();
        state.delete_batches.push(keys.clone());
        if keys.is_empty() {
            return Err(service_error("The XML you provided was not well-formed", 400, "MalformedXML"));
        }
        if keys.iter().any(|key| state.fail_delete_keys.contains(key)) {
            return Err(service_error("delete failed", 500, "InternalError"));
        }
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| service_error("The specified bucket does not exist", 404, "NoSuchBucket"))?;
        for key in &keys {
            objects.remove(key);
        }
        Ok(DeleteResult {
            deleted: keys,
            errors: Vec::new(),
        })
    }

    async fn head_bucket(&self, _info: &S3Info, bucket: &str) -> StorageResult<bool> {
        self.record("head_bucket");
        Ok(self.has_bucket(bucket))
    }

    async fn create_bucket(&self, _info: &S3Info, bucket: &str) -> StorageResult<()> {
        self.record("create_bucket");
        self.add_bucket(bucket);
        Ok(())
    }

    async fn delete_bucket(&self, _info: &S3Info, bucket: &str) -> StorageResult<()> {
        self.record("delete_bucket");
        let mut state = self.state.lock().unwrap();
        let object_count = state.buckets.get(bucket).map(|objects| objects.len());
        match object_count {
            None => Err(service_error("The specified bucket does not exist", 404, "NoSuchBucket")),
            Some(count) if count > 0 => Err(service_error(
                "The bucket you tried to delete is not empty",
                409,
                "BucketNotEmpty",
            )),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn head_object(&self, _info: &S3Info, bucket: &str, key: &str) -> StorageResult<bool> {
        self.record("head_object");
        let state = self.state.lock().unwrap();
        Ok(state
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn upload(
        &self,
        _info: &S3Info,
        request: &UploadRequest,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        self.record("upload");
        let total = request.total_bytes();
        let (fail, hold) = {
            let mut state = self.state.lock().unwrap();
            state.upload_attempts.push(request.key.clone());
            (
                state.fail_upload_keys.contains(&request.key),
                state.hold_upload_keys.contains(&request.key),
            )
        };

        progress(0, total);
        if hold {
            cancel.cancelled().await;
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled(request.key.clone()));
        }
        if fail {
            return Err(service_error("upload failed", 500, "InternalError"));
        }

        progress(total / 2, total);
        progress(total, total);
        self.add_object(&request.bucket, &request.key, total as i64);
        Ok(())
    }

    async fn presign_get(
        &self,
        info: &S3Info,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.record("presign_get");
        Ok(format!(
            "{}/{}/{}?X-Amz-Expires={}",
            info.endpoint,
            bucket,
            key,
            expires_in.as_secs()
        ))
    }

    async fn get_bucket_acl(&self, _info: &S3Info, bucket: &str) -> StorageResult<AclPolicy> {
        self.record("get_bucket_acl");
        let state = self.state.lock().unwrap();
        if state.acl_denied.contains(bucket) {
            return Err(service_error("Access Denied", 403, "AccessDenied"));
        }
        Ok(state.acl.get(bucket).cloned().unwrap_or_default())
    }

    async fn put_bucket_acl(
        &self,
        _info: &S3Info,
        bucket: &str,
        policy: &AclPolicy,
    ) -> StorageResult<()> {
        self.record("put_bucket_acl");
        let mut state = self.state.lock().unwrap();
        if state.acl_denied.contains(bucket) {
            return Err(service_error("Access Denied", 403, "AccessDenied"));
        }
        state.acl.insert(bucket.to_string(), policy.clone());
        Ok(())
    }
}
