//! List operations (buckets, objects)

use super::client::StorageClient;
use super::types::{Bucket, ListRequest, ListingPage, ObjectEntry, RawListing, DELIMITER};
use crate::error::{StorageError, StorageResult};
use crate::format::{format_bytes, format_timestamp};
use chrono::{DateTime, Utc};
use log::debug;

/// Merge files and folders of one listing page into display entries.
///
/// Files come first, then common prefixes. The placeholder object of the
/// listed prefix itself is dropped.
pub(crate) fn build_entries(listing: &RawListing, prefix: &str, delimiter: &str) -> Vec<ObjectEntry> {
    let folder_suffix = if delimiter.is_empty() {
        DELIMITER
    } else {
        delimiter
    };

    let files = listing.contents.iter().map(|obj| {
        let is_folder = obj.key.ends_with(folder_suffix);
        let raw_size = if is_folder {
            None
        } else {
            Some(obj.size.unwrap_or(0).max(0) as u64)
        };
        (obj.key.as_str(), raw_size, obj.last_modified, is_folder, obj.owner.clone())
    });
    let folders = listing
        .common_prefixes
        .iter()
        .map(|p| (p.as_str(), None, None::<DateTime<Utc>>, true, None));

    files
        .chain(folders)
        .filter(|(key, ..)| prefix.is_empty() || *key != prefix)
        .map(|(key, raw_size, last_modified, is_folder, owner)| ObjectEntry {
            key: key.to_string(),
            name: key.strip_prefix(prefix).unwrap_or(key).to_string(),
            size: raw_size.map(format_bytes).unwrap_or_else(|| "-".to_string()),
            raw_size,
            last_modified: format_timestamp(last_modified),
            is_folder,
            owner,
        })
        .collect()
}

impl StorageClient {
    /// List all buckets visible to the project's credential pair
    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        let info = self.s3_info().await?;
        self.store.list_buckets(&info).await
    }

    /// List one page of a bucket under `prefix`.
    ///
    /// A non-empty prefix with nothing under it is `NotFound`.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        continuation_token: &str,
    ) -> StorageResult<ListingPage> {
        let info = self.s3_info().await?;
        let request = ListRequest::new(bucket)
            .prefix(prefix)
            .delimiter(delimiter)
            .continuation_token(continuation_token);
        let listing = self.store.list_objects_v2(&info, &request).await?;

        if !prefix.is_empty() && listing.contents.is_empty() && listing.common_prefixes.is_empty()
        {
            return Err(StorageError::NotFound {
                prefix: prefix.to_string(),
            });
        }

        let entries = build_entries(&listing, prefix, delimiter);
        debug!(
            "list_objects: {}/{} entries={} truncated={}",
            bucket,
            prefix,
            entries.len(),
            listing.is_truncated
        );

        Ok(ListingPage {
            entries,
            continuation_token: listing.next_continuation_token.unwrap_or_default(),
            is_truncated: listing.is_truncated,
        })
    }
}
