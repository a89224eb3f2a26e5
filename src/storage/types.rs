//! Storage types and S3 client creation

use crate::credentials::S3Info;
use crate::error::StorageResult;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Page size for every object listing request.
pub const LIST_MAX_KEYS: i32 = 100;

pub const DELIMITER: &str = "/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    pub creation_date: String,
}

/// One `Contents` record of a ListObjectsV2 response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub key: String,
    pub size: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub owner: Option<String>,
}

/// One ListObjectsV2 response, before any formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub contents: Vec<RawObject>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: String,
    pub continuation_token: String,
}

impl ListRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = token.into();
        self
    }
}

/// A listed file or folder, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub key: String,
    /// Key relative to the listed prefix.
    pub name: String,
    pub raw_size: Option<u64>,
    pub size: String,
    pub last_modified: String,
    pub is_folder: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub entries: Vec<ObjectEntry>,
    /// Empty when there is no next page.
    pub continuation_token: String,
    pub is_truncated: bool,
}

/// An item of a user selection to delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTarget {
    pub key: String,
    pub is_folder: bool,
}

impl DeleteTarget {
    pub fn file(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_folder: false,
        }
    }

    pub fn folder(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_folder: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Outcome of one DeleteObjects call. Keys can fail individually.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    FullControl,
    Read,
    ReadAcp,
    Write,
    WriteAcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub grantee_id: String,
    pub permission: Permission,
}

/// Full access control policy of a bucket, as read or written in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclPolicy {
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAcl {
    pub has_permission: bool,
    pub owner_id: Option<String>,
    /// De-duplicated grantee ids, in grant order.
    pub grantees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl UploadRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body,
            content_type: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read the whole file at `path` as the upload body.
    pub async fn from_path(
        bucket: impl Into<String>,
        key: impl Into<String>,
        path: &Path,
    ) -> StorageResult<Self> {
        let body = tokio::fs::read(path).await?;
        Ok(Self::new(bucket, key, body))
    }

    pub fn total_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Create an S3 client for the session's endpoint and credential pair
pub fn create_s3_client(info: &S3Info) -> Client {
    let credentials = Credentials::new(
        &info.credential.access_key,
        &info.credential.secret_key,
        None,
        None,
        "trusty-cloud",
    );

    let s3_config = S3ConfigBuilder::new()
        .behavior_version_latest()
        .credentials_provider(credentials)
        .region(Region::new("default"))
        .endpoint_url(&info.endpoint)
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}
