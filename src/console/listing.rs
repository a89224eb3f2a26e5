//! Listing state for one bucket/prefix view

use crate::dispatch::CallResult;
use crate::error::StorageError;
use crate::storage::{ListingPage, ObjectEntry, DELIMITER};

#[derive(Debug, Clone, PartialEq)]
pub enum ListingState {
    Idle,
    Listing,
    Listed,
    Error(StorageError),
}

/// Parameters of the next page request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageRequest {
    pub(crate) bucket: String,
    pub(crate) prefix: String,
    pub(crate) delimiter: String,
    pub(crate) continuation_token: String,
}

/// Accumulated entries of the active (bucket, prefix) view.
///
/// `Idle -> Listing -> Listed | Error`, and `Listed -> Listing` again on
/// load more. Navigating to another prefix clears entries and token first.
#[derive(Debug, Clone)]
pub struct ListingView {
    bucket: String,
    prefix: String,
    delimiter: String,
    entries: Vec<ObjectEntry>,
    continuation_token: String,
    is_truncated: bool,
    state: ListingState,
}

impl Default for ListingView {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            delimiter: DELIMITER.to_string(),
            entries: Vec::new(),
            continuation_token: String::new(),
            is_truncated: false,
            state: ListingState::Idle,
        }
    }
}

impl ListingView {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[ObjectEntry] {
        &self.entries
    }

    pub fn continuation_token(&self) -> &str {
        &self.continuation_token
    }

    pub fn is_truncated(&self) -> bool {
        self.is_truncated
    }

    pub fn state(&self) -> &ListingState {
        &self.state
    }

    pub fn can_load_more(&self) -> bool {
        self.state == ListingState::Listed && self.is_truncated
    }

    /// Forget everything, back to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Point the view at a new (bucket, prefix) and request its first page.
    pub(crate) fn navigate(&mut self, bucket: &str, prefix: &str) -> PageRequest {
        self.reset();
        self.bucket = bucket.to_string();
        self.prefix = prefix.to_string();
        self.begin()
    }

    /// Request the page after the current one, if there is one.
    pub(crate) fn next_page(&mut self) -> Option<PageRequest> {
        self.can_load_more().then(|| self.begin())
    }

    fn begin(&mut self) -> PageRequest {
        self.state = ListingState::Listing;
        PageRequest {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            continuation_token: self.continuation_token.clone(),
        }
    }

    /// Fold a page outcome into the view.
    pub(crate) fn apply(&mut self, result: &CallResult<ListingPage, StorageError>) {
        match result {
            CallResult::Success(page) => {
                self.entries.extend(page.entries.iter().cloned());
                self.continuation_token = page.continuation_token.clone();
                self.is_truncated = page.is_truncated;
                self.state = ListingState::Listed;
            }
            CallResult::Failure(err) => {
                self.is_truncated = false;
                self.state = ListingState::Error(err.clone());
            }
        }
    }
}
