//! Bucket access control list read/update

use super::client::StorageClient;
use super::types::{AclPolicy, BucketAcl, Grant, Permission};
use crate::error::StorageResult;
use log::{info, warn};

/// De-duplicate ids, keeping first-seen order and dropping empty ones.
fn unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for id in ids {
        if !id.is_empty() && !unique.iter().any(|seen| seen == id) {
            unique.push(id.to_string());
        }
    }
    unique
}

/// Full grant list for `grantee_ids`: WRITE then READ for each.
pub fn build_grants(grantee_ids: &[String]) -> Vec<Grant> {
    grantee_ids
        .iter()
        .flat_map(|id| {
            [Permission::Write, Permission::Read].map(|permission| Grant {
                grantee_id: id.clone(),
                permission,
            })
        })
        .collect()
}

impl StorageClient {
    /// Read a bucket's grantees.
    ///
    /// Lacking permission to read the ACL is a normal outcome, reported as
    /// `has_permission: false`.
    pub async fn read_acl(&self, bucket: &str) -> StorageResult<BucketAcl> {
        let info = self.s3_info().await?;
        match self.store.get_bucket_acl(&info, bucket).await {
            Ok(policy) => Ok(BucketAcl {
                has_permission: true,
                owner_id: policy.owner_id,
                grantees: unique_ids(policy.grants.iter().map(|g| g.grantee_id.as_str())),
            }),
            Err(e) => {
                warn!("read_acl: {} not readable: {}", bucket, e);
                Ok(BucketAcl::default())
            }
        }
    }

    /// Replace a bucket's grants with WRITE + READ for each grantee id.
    ///
    /// Returns the de-duplicated ids that were submitted.
    pub async fn update_acl(
        &self,
        bucket: &str,
        owner_id: Option<String>,
        grantee_ids: &[String],
    ) -> StorageResult<Vec<String>> {
        let info = self.s3_info().await?;
        let grantees = unique_ids(grantee_ids.iter().map(String::as_str));
        let policy = AclPolicy {
            owner_id,
            owner_name: None,
            grants: build_grants(&grantees),
        };
        self.store.put_bucket_acl(&info, bucket, &policy).await?;
        info!("update_acl: {} grantees={}", bucket, grantees.len());
        Ok(grantees)
    }
}
