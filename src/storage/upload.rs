//! Upload operations: batched uploads with per-key progress and cancellation

use super::client::StorageClient;
use super::types::{UploadRequest, DELIMITER};
use crate::credentials::S3Info;
use crate::error::{IndexedFailure, ResponseError, StorageError, StorageResult};
use futures_util::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Progress value of an aborted or failed upload.
pub const UPLOAD_ABORTED: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// 0..=100, or `UPLOAD_ABORTED`.
    pub percentage: i32,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
    /// Keys skipped because an earlier upload under the same folder failed.
    pub aborted: Vec<String>,
}

struct InFlight {
    token: CancellationToken,
    abort_path: String,
}

#[derive(Default)]
struct TrackerState {
    progress: HashMap<String, UploadProgress>,
    in_flight: HashMap<String, InFlight>,
    aborted_paths: Vec<String>,
}

impl TrackerState {
    fn mark_aborted(&mut self, key: &str, abort_path: &str) {
        if let Some(entry) = self.progress.get_mut(key) {
            entry.percentage = UPLOAD_ABORTED;
        }
        if !self.aborted_paths.iter().any(|p| p == abort_path) {
            self.aborted_paths.push(abort_path.to_string());
        }
    }
}

/// Folder path that gets blocked when an upload of `key` fails.
///
/// The first path segment below `base_path`, or the key itself for files
/// directly in `base_path`.
pub fn abort_path(base_path: &str, key: &str) -> String {
    let relative = key.strip_prefix(base_path).unwrap_or(key);
    match relative.split_once(DELIMITER) {
        Some((first, _)) => format!("{}{}{}", base_path, first, DELIMITER),
        None => key.to_string(),
    }
}

/// Per-key upload progress and cancellation handles.
///
/// Progress never decreases; an aborted entry stays at `UPLOAD_ABORTED`.
#[derive(Clone, Default)]
pub struct UploadTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl UploadTracker {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an upload and hand out its cancellation handle
    pub fn begin(&self, key: &str, total_bytes: u64, abort_path: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut state = self.state();
        state.progress.insert(
            key.to_string(),
            UploadProgress {
                percentage: 0,
                total_bytes,
            },
        );
        state.in_flight.insert(
            key.to_string(),
            InFlight {
                token: token.clone(),
                abort_path: abort_path.to_string(),
            },
        );
        token
    }

    pub fn report(&self, key: &str, loaded: u64, total: u64) {
        let percentage = if total == 0 {
            100
        } else {
            ((loaded.min(total) as f64 / total as f64) * 100.0).floor() as i32
        };
        let mut state = self.state();
        if let Some(entry) = state.progress.get_mut(key) {
            if entry.percentage != UPLOAD_ABORTED && percentage > entry.percentage {
                entry.percentage = percentage;
            }
        }
    }

    pub fn finish(&self, key: &str) {
        let mut state = self.state();
        state.in_flight.remove(key);
        if let Some(entry) = state.progress.get_mut(key) {
            if entry.percentage != UPLOAD_ABORTED {
                entry.percentage = 100;
            }
        }
    }

    /// Mark an upload failed and block its folder for later batches
    pub fn fail(&self, key: &str, abort_path: &str) {
        let mut state = self.state();
        state.in_flight.remove(key);
        state.mark_aborted(key, abort_path);
    }

    /// Record a key that was never attempted
    pub fn skip(&self, key: &str, total_bytes: u64) {
        self.state().progress.insert(
            key.to_string(),
            UploadProgress {
                percentage: UPLOAD_ABORTED,
                total_bytes,
            },
        );
    }

    /// Cancel an in-flight upload. Returns false when `key` is not uploading.
    pub fn cancel(&self, key: &str) -> bool {
        let mut state = self.state();
        let Some(in_flight) = state.in_flight.remove(key) else {
            return false;
        };
        in_flight.token.cancel();
        state.mark_aborted(key, &in_flight.abort_path);
        info!("upload cancelled: {}", key);
        true
    }

    /// Folder paths block every key below them, file paths only themselves.
    pub fn is_blocked(&self, key: &str) -> bool {
        self.state().aborted_paths.iter().any(|path| {
            if path.ends_with(DELIMITER) {
                key.starts_with(path.as_str())
            } else {
                key == path
            }
        })
    }

    /// Forget aborted paths of a previous upload run.
    pub fn clear_aborted(&self) {
        self.state().aborted_paths.clear();
    }

    pub fn progress(&self, key: &str) -> Option<UploadProgress> {
        self.state().progress.get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, UploadProgress> {
        self.state().progress.clone()
    }

    pub fn aborted_paths(&self) -> Vec<String> {
        self.state().aborted_paths.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight.len()
    }

    /// Cancel everything in flight and forget all progress.
    pub fn reset(&self) {
        let mut state = self.state();
        for (_, in_flight) in state.in_flight.drain() {
            in_flight.token.cancel();
        }
        state.progress.clear();
        state.aborted_paths.clear();
    }
}

impl StorageClient {
    async fn upload_one(
        &self,
        info: &S3Info,
        base_path: &str,
        request: &UploadRequest,
    ) -> StorageResult<()> {
        let key = request.key.as_str();
        let blocked_path = abort_path(base_path, key);
        let token = self
            .tracker
            .begin(key, request.total_bytes(), &blocked_path);

        let reporter = self.tracker.clone();
        let progress_key = key.to_string();
        let progress =
            move |loaded: u64, total: u64| reporter.report(&progress_key, loaded, total);
        let result = self.store.upload(info, request, &progress, &token).await;

        match &result {
            Ok(()) => self.tracker.finish(key),
            Err(e) => {
                warn!("upload failed: {}: {}", key, e);
                self.tracker.fail(key, &blocked_path);
            }
        }
        result
    }

    /// Upload files in batches of the configured queue size.
    ///
    /// Within a batch every upload runs independently. A failure blocks its
    /// folder under `base_path`; files under a blocked folder in later
    /// batches of the same call are marked aborted without being attempted.
    /// Each call starts with no blocked folders. Returns `Partial` when
    /// anything failed or was skipped.
    pub async fn upload_files(
        &self,
        base_path: &str,
        requests: Vec<UploadRequest>,
    ) -> StorageResult<UploadSummary> {
        let info = self.s3_info().await?;
        self.tracker.clear_aborted();
        let mut summary = UploadSummary::default();
        let mut failures = Vec::new();
        let mut index = 0;

        for batch in requests.chunks(self.upload_queue_size) {
            let mut attempts = Vec::new();
            for request in batch {
                if self.tracker.is_blocked(&request.key) {
                    self.tracker.skip(&request.key, request.total_bytes());
                    summary.aborted.push(request.key.clone());
                    failures.push(IndexedFailure {
                        index,
                        message: StorageError::Cancelled(request.key.clone())
                            .response()
                            .message,
                    });
                } else {
                    attempts.push((index, request));
                }
                index += 1;
            }

            let outcomes = join_all(
                attempts
                    .iter()
                    .map(|(_, request)| self.upload_one(&info, base_path, request)),
            )
            .await;

            for ((index, request), outcome) in attempts.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => summary.uploaded.push(request.key.clone()),
                    Err(e) => {
                        summary.failed.push(request.key.clone());
                        failures.push(IndexedFailure {
                            index: *index,
                            message: format!("{}: {}", request.key, e.response().message),
                        });
                    }
                }
            }
        }

        info!(
            "upload_files: uploaded={} failed={} aborted={}",
            summary.uploaded.len(),
            summary.failed.len(),
            summary.aborted.len()
        );
        if failures.is_empty() {
            Ok(summary)
        } else {
            failures.sort_by_key(|f| f.index);
            Err(StorageError::Partial { failures })
        }
    }

    /// Cancel one in-flight upload
    pub fn cancel_upload(&self, key: &str) -> bool {
        self.tracker.cancel(key)
    }
}
