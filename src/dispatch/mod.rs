//! Call dispatch module
//!
//! - `types`: call descriptors and `CallResult`
//! - `presenter`: progress indicator / error dialog sink
//! - `dispatcher`: single and batch call execution

mod dispatcher;
mod presenter;
mod types;

pub use dispatcher::Dispatcher;
pub use presenter::{DialogCallback, ErrorDialog, LogPresenter, Presenter, ERROR_DIALOG_TITLE};
pub use types::{BatchCallDescriptor, BatchFailure, CallDescriptor, CallResult, Indexed};

#[cfg(test)]
pub(crate) use presenter::testing;
