//! Call descriptors and call results

use crate::error::{ErrorResponse, ResponseError};
use serde::Serialize;

/// Outcome of a dispatched call. Failures are values, never panics or escaping errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> CallResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallResult::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U, E> {
        match self {
            CallResult::Success(value) => CallResult::Success(f(value)),
            CallResult::Failure(err) => CallResult::Failure(err),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            CallResult::Success(value) => Some(value),
            CallResult::Failure(_) => None,
        }
    }

    pub fn failure(self) -> Option<E> {
        match self {
            CallResult::Success(_) => None,
            CallResult::Failure(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            CallResult::Success(value) => Ok(value),
            CallResult::Failure(err) => Err(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for CallResult<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => CallResult::Success(value),
            Err(err) => CallResult::Failure(err),
        }
    }
}

pub type SuccessHook<T> = Box<dyn FnOnce(&T) + Send>;
pub type ErrorHook<E> = Box<dyn FnOnce(&E) + Send>;
pub type ErrorHandler<E> = Box<dyn FnOnce(E) -> E + Send>;

/// Display name of an operation, taken from its Rust type name.
pub(crate) fn operation_name<F>() -> String {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .unwrap_or(full)
        .to_string()
}

/// One backend operation plus its presentation options.
///
/// The operation is invoked with the payload when one is set, `None` otherwise.
pub struct CallDescriptor<P, T, E, F> {
    pub name: String,
    pub operation: F,
    pub payload: Option<P>,
    pub show_progress: bool,
    pub suppress_error_dialog: bool,
    pub progress_message: String,
    pub on_success: Option<SuccessHook<T>>,
    pub on_error: Option<ErrorHook<E>>,
    pub error_handler: Option<ErrorHandler<E>>,
}

impl<P, T, E, F> CallDescriptor<P, T, E, F> {
    pub fn new(operation: F) -> Self {
        Self {
            name: operation_name::<F>(),
            operation,
            payload: None,
            show_progress: true,
            suppress_error_dialog: false,
            progress_message: String::new(),
            on_success: None,
            on_error: None,
            error_handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn skip_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn suppress_error_dialog(mut self) -> Self {
        self.suppress_error_dialog = true;
        self
    }

    pub fn progress_message(mut self, message: impl Into<String>) -> Self {
        self.progress_message = message.into();
        self
    }

    pub fn on_success(mut self, hook: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(&E) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn error_handler(mut self, handler: impl FnOnce(E) -> E + Send + 'static) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }
}

/// A value tagged with its position in the original payload list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indexed<T> {
    pub index: usize,
    pub value: T,
}

/// Failed entries of a batch call; successful entries are not included.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure<E> {
    pub failures: Vec<Indexed<E>>,
}

impl<E: ResponseError> ResponseError for BatchFailure<E> {
    fn response(&self) -> ErrorResponse {
        let reasons: Vec<String> = self
            .failures
            .iter()
            .map(|failure| failure.value.response().message)
            .collect();
        ErrorResponse {
            message: reasons.join(", "),
            status: None,
            status_text: None,
            hide_error_code: true,
        }
    }
}

pub type BatchSuccessHook<T> = Box<dyn FnOnce(&[Indexed<T>]) + Send>;
pub type BatchErrorHook<E> = Box<dyn FnOnce(&BatchFailure<E>) + Send>;
pub type BatchErrorHandler<E> = Box<dyn FnOnce(BatchFailure<E>) -> BatchFailure<E> + Send>;

/// One operation applied to many payloads concurrently.
pub struct BatchCallDescriptor<P, T, E, F> {
    pub name: String,
    pub operation: F,
    pub payloads: Vec<P>,
    pub show_progress: bool,
    pub suppress_error_dialog: bool,
    pub progress_message: String,
    pub on_success: Option<BatchSuccessHook<T>>,
    pub on_error: Option<BatchErrorHook<E>>,
    pub error_handler: Option<BatchErrorHandler<E>>,
}

impl<P, T, E, F> BatchCallDescriptor<P, T, E, F> {
    pub fn new(operation: F, payloads: Vec<P>) -> Self {
        Self {
            name: operation_name::<F>(),
            operation,
            payloads,
            show_progress: true,
            suppress_error_dialog: false,
            progress_message: String::new(),
            on_success: None,
            on_error: None,
            error_handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn skip_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn suppress_error_dialog(mut self) -> Self {
        self.suppress_error_dialog = true;
        self
    }

    pub fn progress_message(mut self, message: impl Into<String>) -> Self {
        self.progress_message = message.into();
        self
    }

    pub fn on_success(mut self, hook: impl FnOnce(&[Indexed<T>]) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(&BatchFailure<E>) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn error_handler(
        mut self,
        handler: impl FnOnce(BatchFailure<E>) -> BatchFailure<E> + Send + 'static,
    ) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }
}
