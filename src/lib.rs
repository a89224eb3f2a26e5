//! Trusty Cloud console core: call dispatching, credential gating and
//! S3-compatible object storage operations.

pub mod config;
pub mod console;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod storage;
pub mod usage;

pub use config::{ConfigError, ConsoleConfig, ServiceType};
pub use console::{ListingState, ListingView, StorageConsole};
pub use credentials::{CredentialPair, CredentialSession, CredentialSource, IamClient, S3Info};
pub use dispatch::{
    BatchCallDescriptor, BatchFailure, CallDescriptor, CallResult, Dispatcher, ErrorDialog,
    Indexed, LogPresenter, Presenter,
};
pub use error::{ErrorResponse, IndexedFailure, ResponseError, StorageError, StorageResult};
pub use storage::{ObjectStore, S3Store, StorageClient};
pub use usage::{StorageUsage, UsageClient};
