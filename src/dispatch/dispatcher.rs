//! Call dispatcher: progress indicator lifecycle and uniform failure handling

use super::presenter::{DialogCallback, ErrorDialog, Presenter, ProgressGuard};
use super::types::{BatchCallDescriptor, BatchFailure, CallDescriptor, CallResult, Indexed};
use crate::error::ResponseError;
use futures_util::future::join_all;
use log::{debug, error};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct Dispatcher {
    presenter: Arc<dyn Presenter>,
}

impl Dispatcher {
    pub fn new(presenter: Arc<dyn Presenter>) -> Self {
        Self { presenter }
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Run one operation and fold its outcome into a `CallResult`.
    pub async fn dispatch<P, T, E, F, Fut>(
        &self,
        call: CallDescriptor<P, T, E, F>,
    ) -> CallResult<T, E>
    where
        F: FnOnce(Option<P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ResponseError + Debug + Clone + Send + 'static,
    {
        let CallDescriptor {
            name,
            operation,
            payload,
            show_progress,
            suppress_error_dialog,
            progress_message,
            on_success,
            on_error,
            error_handler,
        } = call;

        let _progress = show_progress
            .then(|| ProgressGuard::show(self.presenter.clone(), &progress_message));

        match operation(payload).await {
            Ok(value) => {
                debug!("dispatch: {} succeeded", name);
                if let Some(hook) = on_success {
                    hook(&value);
                }
                CallResult::Success(value)
            }
            Err(raw) => {
                error!("dispatch: {} failed: {:?}", name, raw);
                let response = raw.response();
                let normalized = match error_handler {
                    Some(handler) => handler(raw),
                    None => raw,
                };

                if suppress_error_dialog {
                    if let Some(hook) = on_error {
                        hook(&normalized);
                    }
                } else {
                    let callback = on_error.map(|hook| {
                        let err = normalized.clone();
                        Box::new(move || hook(&err)) as DialogCallback
                    });
                    self.presenter
                        .show_error_dialog(ErrorDialog::new(name, response, callback));
                }
                CallResult::Failure(normalized)
            }
        }
    }

    /// Run one operation per payload concurrently and wait for every outcome.
    pub async fn dispatch_all<P, T, E, F, Fut>(
        &self,
        call: BatchCallDescriptor<P, T, E, F>,
    ) -> CallResult<Vec<Indexed<T>>, BatchFailure<E>>
    where
        F: Fn(P) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ResponseError + Debug + Clone + Send + 'static,
    {
        let BatchCallDescriptor {
            name,
            operation,
            payloads,
            show_progress,
            suppress_error_dialog,
            progress_message,
            on_success,
            on_error,
            error_handler,
        } = call;

        let _progress = show_progress
            .then(|| ProgressGuard::show(self.presenter.clone(), &progress_message));

        let total = payloads.len();
        let calls: Vec<Fut> = payloads.into_iter().map(&operation).collect();
        let outcomes = join_all(calls).await;

        let mut succeeded = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => succeeded.push(Indexed { index, value }),
                Err(value) => failures.push(Indexed { index, value }),
            }
        }

        if failures.is_empty() {
            debug!("dispatch_all: {} succeeded for {} payloads", name, total);
            if let Some(hook) = on_success {
                hook(&succeeded);
            }
            return CallResult::Success(succeeded);
        }

        error!(
            "dispatch_all: {} failed for {} of {} payloads: {:?}",
            name,
            failures.len(),
            total,
            failures
        );
        let raw = BatchFailure { failures };
        let response = raw.response();
        let normalized = match error_handler {
            Some(handler) => handler(raw),
            None => raw,
        };

        if suppress_error_dialog {
            if let Some(hook) = on_error {
                hook(&normalized);
            }
        } else {
            let callback = on_error.map(|hook| {
                let err = normalized.clone();
                Box::new(move || hook(&err)) as DialogCallback
            });
            self.presenter
                .show_error_dialog(ErrorDialog::new(name, response, callback));
        }
        CallResult::Failure(normalized)
    }
}
