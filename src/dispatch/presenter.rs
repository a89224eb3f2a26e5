//! Progress indicator and error dialog presentation

use crate::error::ErrorResponse;
use log::{debug, warn};
use std::sync::Arc;

pub const ERROR_DIALOG_TITLE: &str = "Action failed: API call";

pub type DialogCallback = Box<dyn FnOnce() + Send>;

/// Error dialog handed to the presentation layer.
///
/// `dismiss` runs the confirmation action, if any.
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
    pub api_name: String,
    pub error_response: ErrorResponse,
    pub hide_cancel_btn: bool,
    callback: Option<DialogCallback>,
}

impl ErrorDialog {
    pub fn new(
        api_name: impl Into<String>,
        error_response: ErrorResponse,
        callback: Option<DialogCallback>,
    ) -> Self {
        let api_name = api_name.into();
        let message = dialog_message(&api_name, &error_response);
        Self {
            title: ERROR_DIALOG_TITLE.to_string(),
            message,
            api_name,
            error_response,
            hide_cancel_btn: true,
            callback,
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn dismiss(self) {
        if let Some(callback) = self.callback {
            callback();
        }
    }
}

impl std::fmt::Debug for ErrorDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorDialog")
            .field("title", &self.title)
            .field("message", &self.message)
            .field("api_name", &self.api_name)
            .field("error_response", &self.error_response)
            .field("hide_cancel_btn", &self.hide_cancel_btn)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

fn dialog_message(api_name: &str, response: &ErrorResponse) -> String {
    if response.hide_error_code {
        return format!("Error message: {}", response.message);
    }

    let function = if cfg!(debug_assertions) && !api_name.is_empty() {
        format!("Function: {}\n", api_name)
    } else {
        String::new()
    };
    let status = response.status.map(|s| s.to_string()).unwrap_or_default();
    let status_text = response.status_text.as_deref().unwrap_or_default();
    format!(
        "{}Error code: {} ({})\nError message: {}",
        function, status, status_text, response.message
    )
}

/// Presentation sink for progress indicators and error dialogs.
pub trait Presenter: Send + Sync {
    fn show_progress(&self, message: &str);
    fn hide_progress(&self);
    fn show_error_dialog(&self, dialog: ErrorDialog);
}

/// Headless presenter: logs everything and acknowledges dialogs immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show_progress(&self, message: &str) {
        debug!("progress: show {}", message);
    }

    fn hide_progress(&self) {
        debug!("progress: hide");
    }

    fn show_error_dialog(&self, dialog: ErrorDialog) {
        warn!("{} [{}]: {}", dialog.title, dialog.api_name, dialog.message);
        dialog.dismiss();
    }
}

/// Hides the progress indicator when dropped.
pub(crate) struct ProgressGuard {
    presenter: Arc<dyn Presenter>,
}

impl ProgressGuard {
    pub(crate) fn show(presenter: Arc<dyn Presenter>, message: &str) -> Self {
        presenter.show_progress(message);
        Self { presenter }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.presenter.hide_progress();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Event {
        ShowProgress(String),
        HideProgress,
        Dialog(String),
    }

    /// Records presentation events; dialogs are kept until dismissed.
    #[derive(Default)]
    pub(crate) struct RecordingPresenter {
        events: Mutex<Vec<Event>>,
        dialogs: Mutex<Vec<ErrorDialog>>,
    }

    impl RecordingPresenter {
        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn dialogs(&self) -> usize {
            self.dialogs.lock().unwrap().len()
        }

        pub(crate) fn take_dialog(&self) -> Option<ErrorDialog> {
            self.dialogs.lock().unwrap().pop()
        }
    }

    impl Presenter for RecordingPresenter {
        fn show_progress(&self, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::ShowProgress(message.to_string()));
        }

        fn hide_progress(&self) {
            self.events.lock().unwrap().push(Event::HideProgress);
        }

        fn show_error_dialog(&self, dialog: ErrorDialog) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Dialog(dialog.message.clone()));
            self.dialogs.lock().unwrap().push(dialog);
        }
    }
}
