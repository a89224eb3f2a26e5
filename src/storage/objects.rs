//! Object operations (create, delete, presigned download)

use super::backend::ObjectStore;
use super::client::StorageClient;
use super::types::{DeleteTarget, ListRequest, UploadRequest, DELIMITER};
use crate::credentials::S3Info;
use crate::error::{IndexedFailure, ResponseError, StorageError, StorageResult};
use futures_util::future::{join_all, BoxFuture, FutureExt};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// DeleteObjects accepts at most 1000 keys per call.
const DELETE_BATCH_SIZE: usize = 1000;

/// Folder key for `path`, always ending in the delimiter.
fn folder_key(path: &str) -> StorageResult<String> {
    if path.trim_matches('/').is_empty() {
        return Err(StorageError::InvalidRequest(
            "folder name must not be empty".to_string(),
        ));
    }
    if path.ends_with(DELIMITER) {
        Ok(path.to_string())
    } else {
        Ok(format!("{}{}", path, DELIMITER))
    }
}

/// Issue one DeleteObjects call in the background.
fn spawn_delete(
    store: Arc<dyn ObjectStore>,
    info: S3Info,
    bucket: String,
    keys: Vec<String>,
) -> JoinHandle<StorageResult<()>> {
    tokio::spawn(async move {
        let count = keys.len();
        let result = store.delete_objects(&info, &bucket, keys).await?;
        if !result.errors.is_empty() {
            let reasons: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.key, e.message))
                .collect();
            return Err(StorageError::service(reasons.join(", ")));
        }
        info!(
            "delete_objects: {} removed {} of {} keys",
            bucket,
            result.deleted.len(),
            count
        );
        Ok(())
    })
}

impl StorageClient {
    /// Create a bucket unless a bucket with that name already exists
    pub async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let info = self.s3_info().await?;
        if self.store.head_bucket(&info, bucket).await? {
            return Err(StorageError::NameCollision {
                kind: "bucket",
                name: bucket.to_string(),
            });
        }
        self.store.create_bucket(&info, bucket).await?;
        info!("create_bucket: {}", bucket);
        Ok(())
    }

    /// Create a folder placeholder; `path` is normalized to end in `/`.
    pub async fn create_folder(&self, bucket: &str, path: &str) -> StorageResult<String> {
        let key = folder_key(path)?;

        let info = self.s3_info().await?;
        if self.store.head_object(&info, bucket, &key).await? {
            return Err(StorageError::NameCollision {
                kind: "folder",
                name: key,
            });
        }

        let request = UploadRequest::new(bucket, key.as_str(), Vec::new());
        self.store
            .upload(&info, &request, &|_, _| {}, &CancellationToken::new())
            .await?;
        info!("create_folder: {}/{}", bucket, key);
        Ok(key)
    }

    /// Presigned GET URL; `expires_in` defaults to the configured expiry.
    pub async fn presigned_download(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        let info = self.s3_info().await?;
        let expires_in = expires_in.unwrap_or(self.presign_expiry);
        self.store.presign_get(&info, bucket, key, expires_in).await
    }

    /// Delete every key under `prefix`, listing page by page.
    ///
    /// Each page's delete starts as soon as the page is known; all of them
    /// are awaited before returning. `placeholder` joins the first batch.
    async fn purge_prefix(
        &self,
        info: &S3Info,
        bucket: &str,
        prefix: &str,
        placeholder: Option<String>,
    ) -> StorageResult<()> {
        let mut pending: Vec<JoinHandle<StorageResult<()>>> = Vec::new();
        let mut placeholder = placeholder;
        let mut token = String::new();

        let listed = loop {
            let request = ListRequest::new(bucket)
                .prefix(prefix)
                .continuation_token(token.as_str());
            let listing = match self.store.list_objects_v2(info, &request).await {
                Ok(listing) => listing,
                Err(e) => break Err(e),
            };

            let mut keys: Vec<String> = listing
                .contents
                .into_iter()
                .map(|obj| obj.key)
                .filter(|key| key != prefix)
                .collect();
            if let Some(key) = placeholder.take() {
                keys.push(key);
            }
            if !keys.is_empty() {
                pending.push(spawn_delete(
                    self.store.clone(),
                    info.clone(),
                    bucket.to_string(),
                    keys,
                ));
            }

            token = listing.next_continuation_token.unwrap_or_default();
            if !listing.is_truncated || token.is_empty() {
                break Ok(());
            }
        };

        let mut failures = Vec::new();
        for (index, outcome) in join_all(pending).await.into_iter().enumerate() {
            let result = outcome.unwrap_or_else(|e| Err(StorageError::service(e.to_string())));
            if let Err(e) = result {
                failures.push(IndexedFailure {
                    index,
                    message: e.response().message,
                });
            }
        }

        listed?;
        if !failures.is_empty() {
            return Err(StorageError::Partial { failures });
        }
        Ok(())
    }

    /// Delete a folder and everything below it.
    ///
    /// `folder` is treated as a folder key, `dir` and `dir/` alike.
    pub async fn delete_folder(&self, bucket: &str, folder: &str) -> StorageResult<()> {
        folder_key(folder)?;
        let info = self.s3_info().await?;
        self.delete_folder_with(&info, bucket, folder).await
    }

    async fn delete_folder_with(
        &self,
        info: &S3Info,
        bucket: &str,
        folder: &str,
    ) -> StorageResult<()> {
        let folder = folder_key(folder)?;
        self.purge_prefix(info, bucket, &folder, Some(folder.clone()))
            .await?;
        info!("delete_folder: {}/{}", bucket, folder);
        Ok(())
    }

    /// Empty the bucket, then delete it
    pub async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let info = self.s3_info().await?;
        self.purge_prefix(&info, bucket, "", None).await?;
        self.store.delete_bucket(&info, bucket).await?;
        info!("delete_bucket: {}", bucket);
        Ok(())
    }

    /// Delete a mixed selection of files and folders.
    ///
    /// Files go in batch calls of up to 1000 keys, each folder through the
    /// recursive delete.
    /// All of them run to completion; nothing is rolled back.
    pub async fn delete_selection(
        &self,
        bucket: &str,
        targets: &[DeleteTarget],
    ) -> StorageResult<()> {
        if bucket.is_empty() {
            return Err(StorageError::InvalidRequest(
                "bucket name must not be empty".to_string(),
            ));
        }
        if targets.iter().any(|target| target.key.is_empty()) {
            return Err(StorageError::InvalidRequest(
                "object key must not be empty".to_string(),
            ));
        }
        for folder in targets.iter().filter(|t| t.is_folder) {
            folder_key(&folder.key)?;
        }

        let info = self.s3_info().await?;
        let (folders, files): (Vec<_>, Vec<_>) = targets.iter().partition(|t| t.is_folder);

        let mut labels: Vec<String> = Vec::new();
        let mut tasks: Vec<BoxFuture<'_, StorageResult<()>>> = Vec::new();

        for chunk in files.chunks(DELETE_BATCH_SIZE) {
            let keys: Vec<String> = chunk.iter().map(|t| t.key.clone()).collect();
            labels.push(format!("{} files", keys.len()));
            tasks.push(
                spawn_delete(self.store.clone(), info.clone(), bucket.to_string(), keys)
                    .map(|joined| {
                        joined.unwrap_or_else(|e| Err(StorageError::service(e.to_string())))
                    })
                    .boxed(),
            );
        }
        for folder in &folders {
            labels.push(folder.key.clone());
            tasks.push(self.delete_folder_with(&info, bucket, &folder.key).boxed());
        }

        let failures: Vec<IndexedFailure> = join_all(tasks)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| {
                result.err().map(|e| IndexedFailure {
                    index,
                    message: format!("{}: {}", labels[index], e.response().message),
                })
            })
            .collect();

        if failures.is_empty() {
            info!("delete_selection: {} removed {} items", bucket, targets.len());
            Ok(())
        } else {
            warn!(
                "delete_selection: {} had {} failed deletes",
                bucket,
                failures.len()
            );
            Err(StorageError::Partial { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::client::testing::client;
    use crate::storage::mock::MockObjectStore;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn create_bucket_rejects_existing_name() {
        let store = MockObjectStore::new();
        store.add_bucket("photos");
        let client = client(&store);

        let result = client.create_bucket("photos").await;
        assert_eq!(
            result,
            Err(StorageError::NameCollision {
                kind: "bucket",
                name: "photos".to_string()
            })
        );
        assert!(!store.calls().contains(&"create_bucket".to_string()));

        client.create_bucket("videos").await.unwrap();
        assert!(store.has_bucket("videos"));
    }

    #[tokio::test]
    async fn create_folder_writes_placeholder() {
        let store = MockObjectStore::new();
        store.add_bucket("photos");
        let client = client(&store);

        let key = client.create_folder("photos", "2024/trip").await.unwrap();
        assert_eq!(key, "2024/trip/");
        assert_eq!(store.keys("photos"), vec!["2024/trip/".to_string()]);

        let again = client.create_folder("photos", "2024/trip/").await;
        assert!(matches!(
            again,
            Err(StorageError::NameCollision { kind: "folder", .. })
        ));
        assert!(matches!(
            client.create_folder("photos", "/").await,
            Err(StorageError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn presigned_download_uses_default_expiry() {
        let store = MockObjectStore::new();
        let client = client(&store);

        let url = client
            .presigned_download("photos", "a.jpg", None)
            .await
            .unwrap();
        assert!(url.ends_with("photos/a.jpg?X-Amz-Expires=60"));

        let url = client
            .presigned_download("photos", "a.jpg", Some(Duration::from_secs(600)))
            .await
            .unwrap();
        assert!(url.ends_with("X-Amz-Expires=600"));
    }

    #[tokio::test]
    async fn folder_delete_covers_every_page() {
        let store = MockObjectStore::new();
        store.add_object("photos", "big/", 0);
        store.add_objects("photos", "big/", 230);
        store.add_objects("photos", "big/nested/", 20);
        store.add_object("photos", "other.txt", 1);
        let client = client(&store);

        client.delete_folder("photos", "big/").await.unwrap();

        let batches = store.delete_batches();
        assert!(batches.len() >= 3);
        assert!(batches[0].contains(&"big/".to_string()));

        let deleted: Vec<String> = batches.concat();
        let unique: BTreeSet<&String> = deleted.iter().collect();
        assert_eq!(deleted.len(), unique.len());
        assert_eq!(deleted.len(), 251);
        assert_eq!(store.keys("photos"), vec!["other.txt".to_string()]);
    }

    #[tokio::test]
    async fn folder_without_placeholder_is_still_removed() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "implicit/", 3);
        let client = client(&store);

        client.delete_folder("photos", "implicit/").await.unwrap();
        assert!(store.keys("photos").is_empty());
        assert!(store.delete_batches()[0].contains(&"implicit/".to_string()));
    }

    #[tokio::test]
    async fn bucket_delete_empties_bucket_first() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "", 120);
        store.add_objects("photos", "a/b/", 90);
        let client = client(&store);

        client.delete_bucket("photos").await.unwrap();
        assert!(!store.has_bucket("photos"));

        let calls = store.calls();
        let last_delete = calls.iter().rposition(|c| c == "delete_objects").unwrap();
        let bucket_delete = calls.iter().position(|c| c == "delete_bucket").unwrap();
        assert!(last_delete < bucket_delete);
        assert_eq!(store.delete_batches().concat().len(), 210);
    }

    #[tokio::test]
    async fn empty_bucket_is_deleted_without_batch_delete() {
        let store = MockObjectStore::new();
        store.add_bucket("empty");
        let client = client(&store);

        client.delete_bucket("empty").await.unwrap();
        assert!(store.delete_batches().is_empty());
        assert!(!store.has_bucket("empty"));
    }

    #[tokio::test]
    async fn failed_batch_keeps_bucket() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "", 150);
        store.fail_delete_for("file-0120.txt");
        let client = client(&store);

        let result = client.delete_bucket("photos").await;
        assert!(matches!(result, Err(StorageError::Partial { ref failures }) if failures.len() == 1));
        assert!(store.has_bucket("photos"));
        assert!(!store.calls().contains(&"delete_bucket".to_string()));
    }

    #[tokio::test]
    async fn selection_delete_handles_files_and_folders() {
        let store = MockObjectStore::new();
        store.add_object("photos", "a.txt", 1);
        store.add_object("photos", "b.txt", 1);
        store.add_object("photos", "keep.txt", 1);
        store.add_object("photos", "dir/", 0);
        store.add_objects("photos", "dir/", 4);
        let client = client(&store);

        client
            .delete_selection(
                "photos",
                &[
                    DeleteTarget::file("a.txt"),
                    DeleteTarget::folder("dir/"),
                    DeleteTarget::file("b.txt"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.keys("photos"), vec!["keep.txt".to_string()]);
        assert!(store
            .delete_batches()
            .contains(&vec!["a.txt".to_string(), "b.txt".to_string()]));
    }

    #[tokio::test]
    async fn selection_delete_keeps_going_past_a_failed_folder() {
        let store = MockObjectStore::new();
        store.add_object("photos", "a.txt", 1);
        store.add_objects("photos", "bad/", 2);
        store.add_objects("photos", "good/", 2);
        store.fail_delete_for("bad/file-0000.txt");
        let client = client(&store);

        let result = client
            .delete_selection(
                "photos",
                &[
                    DeleteTarget::folder("bad/"),
                    DeleteTarget::folder("good/"),
                    DeleteTarget::file("a.txt"),
                ],
            )
            .await;

        match result {
            Err(StorageError::Partial { failures }) => {
                assert_eq!(failures.len(), 1);
                // files batch is task 0, then folders in selection order
                assert_eq!(failures[0].index, 1);
                assert!(failures[0].message.starts_with("bad/: "));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            store.keys("photos"),
            vec!["bad/file-0000.txt".to_string(), "bad/file-0001.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn selection_delete_validates_before_any_request() {
        let store = MockObjectStore::new();
        let client = client(&store);

        assert!(matches!(
            client.delete_selection("", &[DeleteTarget::file("a")]).await,
            Err(StorageError::InvalidRequest(_))
        ));
        assert!(matches!(
            client
                .delete_selection("photos", &[DeleteTarget::file("")])
                .await,
            Err(StorageError::InvalidRequest(_))
        ));
        assert_eq!(store.call_count(), 0);
        assert!(!client.session().has_credential());
    }

    #[tokio::test]
    async fn folder_key_without_slash_keeps_sibling_keys() {
        let store = MockObjectStore::new();
        store.add_object("photos", "dir/", 0);
        store.add_object("photos", "dir/a.txt", 1);
        store.add_object("photos", "dirty.txt", 1);
        store.add_object("photos", "directory/b.txt", 1);
        let client = client(&store);

        client
            .delete_selection("photos", &[DeleteTarget::folder("dir")])
            .await
            .unwrap();
        assert_eq!(
            store.keys("photos"),
            vec!["directory/b.txt".to_string(), "dirty.txt".to_string()]
        );

        assert!(matches!(
            client
                .delete_selection("photos", &[DeleteTarget::folder("/")])
                .await,
            Err(StorageError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn large_file_selection_is_split_into_batches() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "", 1001);
        let client = client(&store);

        let targets: Vec<DeleteTarget> = store
            .keys("photos")
            .iter()
            .map(|key| DeleteTarget::file(key.as_str()))
            .collect();
        client.delete_selection("photos", &targets).await.unwrap();

        let sizes: Vec<usize> = store.delete_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1000, 1]);
        assert!(store.keys("photos").is_empty());
    }

    #[tokio::test]
    async fn folder_delete_stops_when_a_later_page_fails_to_list() {
        let store = MockObjectStore::new();
        store.add_object("photos", "big/", 0);
        store.add_objects("photos", "big/", 250);
        store.fail_next_pages_for("big/");
        let client = client(&store);

        let result = client.delete_folder("photos", "big/").await;
        assert!(matches!(
            result,
            Err(StorageError::Service { status: Some(500), .. })
        ));

        // the first page's batch finished before the error came back
        let batches = store.delete_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(store.keys("photos").len(), 151);
        assert!(batches[0]
            .iter()
            .all(|key| !store.keys("photos").contains(key)));
    }

    #[tokio::test]
    async fn folder_delete_with_unlistable_prefix_deletes_nothing() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "gone/", 3);
        store.fail_list_for("gone/");
        let client = client(&store);

        let result = client.delete_folder("photos", "gone/").await;
        assert!(matches!(
            result,
            Err(StorageError::Service { status: Some(500), .. })
        ));
        assert!(store.delete_batches().is_empty());
        assert_eq!(store.keys("photos").len(), 3);
    }

    #[tokio::test]
    async fn bucket_survives_a_failed_later_listing() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "", 250);
        store.fail_next_pages_for("");
        let client = client(&store);

        let result = client.delete_bucket("photos").await;
        assert!(matches!(
            result,
            Err(StorageError::Service { status: Some(500), .. })
        ));
        assert_eq!(store.delete_batches().len(), 1);
        assert_eq!(store.keys("photos").len(), 150);
        assert!(store.has_bucket("photos"));
        assert!(!store.calls().contains(&"delete_bucket".to_string()));
    }

    #[tokio::test]
    async fn folder_only_selection_skips_file_batch() {
        let store = MockObjectStore::new();
        store.add_objects("photos", "dir/", 2);
        let client = client(&store);

        client
            .delete_selection("photos", &[DeleteTarget::folder("dir/")])
            .await
            .unwrap();
        assert_eq!(store.delete_batches().len(), 1);
    }
}
