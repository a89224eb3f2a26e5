//! Object storage module - S3-compatible storage operations
//!
//! This module is organized into submodules:
//! - `types`: Core types and client creation
//! - `backend`: `ObjectStore` trait and the AWS SDK implementation
//! - `client`: `StorageClient` and the credential gate
//! - `list`: List operations (buckets, objects)
//! - `objects`: Object operations (create, delete, presigned download)
//! - `upload`: Batched uploads, progress and cancellation
//! - `acl`: Bucket access control lists

mod acl;
mod backend;
mod client;
mod list;
#[cfg(test)]
pub(crate) mod mock;
mod objects;
mod types;
mod upload;

// Re-export types
pub use types::{
    create_s3_client, AclPolicy, Bucket, BucketAcl, DeleteFailure, DeleteResult, DeleteTarget,
    Grant, ListRequest, ListingPage, ObjectEntry, Permission, RawListing, RawObject,
    UploadRequest, DELIMITER, LIST_MAX_KEYS,
};

pub use acl::build_grants;
pub use backend::{ObjectStore, ProgressFn, S3Store};
pub use client::StorageClient;
pub use upload::{abort_path, UploadProgress, UploadSummary, UploadTracker, UPLOAD_ABORTED};

#[cfg(test)]
pub(crate) use client::testing;
