//! S3 protocol operations behind a trait seam

use super::types::{
    create_s3_client, AclPolicy, Bucket, DeleteFailure, DeleteResult, Grant, ListRequest,
    Permission, RawListing, RawObject, UploadRequest, LIST_MAX_KEYS,
};
use crate::config::{ConsoleConfig, DEFAULT_UPLOAD_PART_SIZE, DEFAULT_UPLOAD_QUEUE_SIZE};
use crate::credentials::S3Info;
use crate::error::{from_sdk, sdk_status, StorageError, StorageResult};
use crate::format::{format_timestamp, from_smithy};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AccessControlPolicy, CompletedMultipartUpload, CompletedPart, Delete, Grantee,
    ObjectIdentifier, Owner, Permission as S3Permission, Type,
};
use aws_sdk_s3::Client;
use futures_util::future::join_all;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Byte progress callback: `(loaded, total)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// S3-compatible object store operations used by the storage client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self, info: &S3Info) -> StorageResult<Vec<Bucket>>;

    /// One ListObjectsV2 page (max 100 keys, owner included).
    async fn list_objects_v2(&self, info: &S3Info, request: &ListRequest)
        -> StorageResult<RawListing>;

    async fn delete_objects(
        &self,
        info: &S3Info,
        bucket: &str,
        keys: Vec<String>,
    ) -> StorageResult<DeleteResult>;

    /// `Ok(false)` when the bucket does not exist (404).
    async fn head_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<bool>;

    async fn create_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<()>;

    async fn delete_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<()>;

    /// `Ok(false)` when the object does not exist (404).
    async fn head_object(&self, info: &S3Info, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Upload one object, reporting byte progress, until done or `cancel` fires.
    async fn upload(
        &self,
        info: &S3Info,
        request: &UploadRequest,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> StorageResult<()>;

    async fn presign_get(
        &self,
        info: &S3Info,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    async fn get_bucket_acl(&self, info: &S3Info, bucket: &str) -> StorageResult<AclPolicy>;

    async fn put_bucket_acl(
        &self,
        info: &S3Info,
        bucket: &str,
        policy: &AclPolicy,
    ) -> StorageResult<()>;
}

/// `ObjectStore` backed by the AWS SDK; one client per call, built from the session.
#[derive(Debug, Clone)]
pub struct S3Store {
    part_size: u64,
    queue_size: usize,
}

impl Default for S3Store {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_UPLOAD_PART_SIZE,
            queue_size: DEFAULT_UPLOAD_QUEUE_SIZE,
        }
    }
}

impl S3Store {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            part_size: config.upload_part_size,
            queue_size: config.upload_queue_size.max(1),
        }
    }

    async fn put_single(
        &self,
        client: &Client,
        request: &UploadRequest,
        progress: &ProgressFn,
    ) -> StorageResult<()> {
        let total = request.total_bytes();
        client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_content_type(request.content_type.clone())
            .body(ByteStream::from(request.body.clone()))
            .send()
            .await
            .map_err(from_sdk)?;
        progress(total, total);
        Ok(())
    }

    async fn put_multipart(
        &self,
        client: &Client,
        request: &UploadRequest,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let created = client
            .create_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_content_type(request.content_type.clone())
            .send()
            .await
            .map_err(from_sdk)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::service("No upload ID returned"))?
            .to_string();

        let uploaded = tokio::select! {
            _ = cancel.cancelled() => Err(StorageError::Cancelled(request.key.clone())),
            parts = self.upload_parts(client, request, &upload_id, progress) => parts,
        };

        let parts = match uploaded {
            Ok(parts) => parts,
            Err(e) => {
                abort_multipart_upload(client, request, &upload_id).await;
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let result = client
            .complete_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await;
        if let Err(e) = result {
            abort_multipart_upload(client, request, &upload_id).await;
            return Err(from_sdk(e));
        }
        Ok(())
    }

    /// Upload every part with at most `queue_size` parts in flight.
    async fn upload_parts(
        &self,
        client: &Client,
        request: &UploadRequest,
        upload_id: &str,
        progress: &ProgressFn,
    ) -> StorageResult<Vec<CompletedPart>> {
        let total = request.total_bytes();
        let semaphore = Semaphore::new(self.queue_size);
        let uploaded_bytes = AtomicU64::new(0);
        let semaphore = &semaphore;
        let uploaded_bytes = &uploaded_bytes;

        let tasks = request
            .body
            .chunks(self.part_size as usize)
            .enumerate()
            .map(move |(index, chunk)| async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| StorageError::service(e.to_string()))?;
                let part_number = index as i32 + 1;

                let response = client
                    .upload_part()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(chunk.to_vec()))
                    .send()
                    .await
                    .map_err(from_sdk)?;

                let part_len = chunk.len() as u64;
                let loaded = uploaded_bytes.fetch_add(part_len, Ordering::SeqCst) + part_len;
                progress(loaded, total);
                debug!(
                    "upload_part_done: {} part={} loaded={}/{}",
                    request.key, part_number, loaded, total
                );

                Ok::<_, StorageError>(
                    CompletedPart::builder()
                        .part_number(part_number)
                        .set_e_tag(response.e_tag().map(str::to_string))
                        .build(),
                )
            });

        let mut parts = Vec::new();
        for result in join_all(tasks).await {
            parts.push(result?);
        }
        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }
}

async fn abort_multipart_upload(client: &Client, request: &UploadRequest, upload_id: &str) {
    let result = client
        .abort_multipart_upload()
        .bucket(&request.bucket)
        .key(&request.key)
        .upload_id(upload_id)
        .send()
        .await;
    if let Err(e) = result {
        warn!(
            "abort_multipart_upload failed for {}: {}",
            request.key,
            from_sdk(e)
        );
    }
}

fn to_s3_permission(permission: Permission) -> S3Permission {
    match permission {
        Permission::FullControl => S3Permission::FullControl,
        Permission::Read => S3Permission::Read,
        Permission::ReadAcp => S3Permission::ReadAcp,
        Permission::Write => S3Permission::Write,
        Permission::WriteAcp => S3Permission::WriteAcp,
    }
}

fn from_s3_permission(permission: &S3Permission) -> Option<Permission> {
    match permission {
        S3Permission::FullControl => Some(Permission::FullControl),
        S3Permission::Read => Some(Permission::Read),
        S3Permission::ReadAcp => Some(Permission::ReadAcp),
        S3Permission::Write => Some(Permission::Write),
        S3Permission::WriteAcp => Some(Permission::WriteAcp),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_buckets(&self, info: &S3Info) -> StorageResult<Vec<Bucket>> {
        let client = create_s3_client(info);
        let response = client.list_buckets().send().await.map_err(from_sdk)?;

        let buckets = response
            .buckets()
            .iter()
            .filter_map(|bucket| {
                let name = bucket.name()?.to_string();
                let creation_date = format_timestamp(
                    bucket.creation_date().and_then(from_smithy),
                );
                Some(Bucket {
                    name,
                    creation_date,
                })
            })
            .collect();

        Ok(buckets)
    }

    async fn list_objects_v2(
        &self,
        info: &S3Info,
        request: &ListRequest,
    ) -> StorageResult<RawListing> {
        let client = create_s3_client(info);

        let mut builder = client
            .list_objects_v2()
            .bucket(&request.bucket)
            .fetch_owner(true)
            .max_keys(LIST_MAX_KEYS);

        if !request.prefix.is_empty() {
            builder = builder.prefix(&request.prefix);
        }
        if !request.delimiter.is_empty() {
            builder = builder.delimiter(&request.delimiter);
        }
        if !request.continuation_token.is_empty() {
            builder = builder.continuation_token(&request.continuation_token);
        }

        let response = builder.send().await.map_err(from_sdk)?;

        let contents = response
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(RawObject {
                    key: obj.key()?.to_string(),
                    size: obj.size(),
                    last_modified: obj.last_modified().and_then(from_smithy),
                    owner: obj
                        .owner()
                        .and_then(|owner| owner.display_name())
                        .map(str::to_string),
                })
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix().map(str::to_string))
            .collect();

        Ok(RawListing {
            contents,
            common_prefixes,
            is_truncated: response.is_truncated().unwrap_or(false),
            next_continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_objects(
        &self,
        info: &S3Info,
        bucket: &str,
        keys: Vec<String>,
    ) -> StorageResult<DeleteResult> {
        if keys.is_empty() {
            return Ok(DeleteResult::default());
        }

        let client = create_s3_client(info);

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let response = client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(from_sdk)?;

        Ok(DeleteResult {
            deleted: response
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: response
                .errors()
                .iter()
                .map(|e| DeleteFailure {
                    key: e.key().unwrap_or_default().to_string(),
                    message: e
                        .message()
                        .or(e.code())
                        .unwrap_or("delete failed")
                        .to_string(),
                })
                .collect(),
        })
    }

    async fn head_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<bool> {
        let client = create_s3_client(info);
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if sdk_status(&e) == Some(404) => Ok(false),
            Err(e) => Err(from_sdk(e)),
        }
    }

    async fn create_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<()> {
        let client = create_s3_client(info);
        client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn delete_bucket(&self, info: &S3Info, bucket: &str) -> StorageResult<()> {
        let client = create_s3_client(info);
        client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn head_object(&self, info: &S3Info, bucket: &str, key: &str) -> StorageResult<bool> {
        let client = create_s3_client(info);
        match client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if sdk_status(&e) == Some(404) => Ok(false),
            Err(e) => Err(from_sdk(e)),
        }
    }

    async fn upload(
        &self,
        info: &S3Info,
        request: &UploadRequest,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let client = create_s3_client(info);
        progress(0, request.total_bytes());

        if request.total_bytes() <= self.part_size {
            return tokio::select! {
                _ = cancel.cancelled() => Err(StorageError::Cancelled(request.key.clone())),
                result = self.put_single(&client, request, progress) => result,
            };
        }
        self.put_multipart(&client, request, progress, cancel).await
    }

    async fn presign_get(
        &self,
        info: &S3Info,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let client = create_s3_client(info);

        let presigning_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let presigned_request = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(from_sdk)?;

        Ok(presigned_request.uri().to_string())
    }

    async fn get_bucket_acl(&self, info: &S3Info, bucket: &str) -> StorageResult<AclPolicy> {
        let client = create_s3_client(info);
        let response = client
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(from_sdk)?;

        let grants = response
            .grants()
            .iter()
            .filter_map(|grant| {
                Some(Grant {
                    grantee_id: grant.grantee()?.id()?.to_string(),
                    permission: from_s3_permission(grant.permission()?)?,
                })
            })
            .collect();

        Ok(AclPolicy {
            owner_id: response.owner().and_then(|o| o.id()).map(str::to_string),
            owner_name: response
                .owner()
                .and_then(|o| o.display_name())
                .map(str::to_string),
            grants,
        })
    }

    async fn put_bucket_acl(
        &self,
        info: &S3Info,
        bucket: &str,
        policy: &AclPolicy,
    ) -> StorageResult<()> {
        let client = create_s3_client(info);

        let grants = policy
            .grants
            .iter()
            .map(|grant| {
                let grantee = Grantee::builder()
                    .r#type(Type::CanonicalUser)
                    .id(&grant.grantee_id)
                    .build()
                    .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;
                Ok(aws_sdk_s3::types::Grant::builder()
                    .grantee(grantee)
                    .permission(to_s3_permission(grant.permission))
                    .build())
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let owner = Owner::builder()
            .set_id(policy.owner_id.clone())
            .set_display_name(policy.owner_name.clone())
            .build();

        let access_control_policy = AccessControlPolicy::builder()
            .set_grants(Some(grants))
            .owner(owner)
            .build();

        client
            .put_bucket_acl()
            .bucket(bucket)
            .access_control_policy(access_control_policy)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}
