//! Per-request cancellation context.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// Carries the cancellation signal of one client request.
///
/// Every storage call, directory call and lock acquisition made on behalf of
/// a request runs through [`run`](Self::run), so a cancelled request returns
/// [`EngineError::Cancelled`] promptly instead of holding a worker.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel_token: CancellationToken,
}

impl RequestContext {
    /// Creates a context that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bound to an existing token, e.g. one owned by the
    /// host's request handler.
    #[must_use]
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    /// Returns a child context that is cancelled together with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self { cancel_token: self.cancel_token.child_token() }
    }

    /// Cancels the request.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Runs `fut` until it completes or the request is cancelled.
    ///
    /// The future is dropped on cancellation. Errors from `fut` are converted
    /// into [`EngineError`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] if cancellation wins the race, or the
    /// converted error of `fut`.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<EngineError>,
    {
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => Err(EngineError::Cancelled),
            result = fut => result.map_err(Into::into),
        }
    }

    /// Like [`run`](Self::run) for infallible futures such as lock acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] if cancellation wins the race.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => Err(EngineError::Cancelled),
            value = fut => Ok(value),
        }
    }
}
