//! Async result pipeline primitives.
//!
//! Graph builds are ordinary futures: lazily started, canceled by
//! dropping (which aborts any in-flight network call). This module
//! adds the small pieces the engine and its callers need on top:
//! strictly ordered batch awaiting, an explicit cancel handle, and a
//! generation token for ignoring superseded requests.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{abortable, AbortHandle};

/// Runs the given futures strictly one after another: the next is not
/// started until the previous settles. Results keep input order; the
/// first failure short-circuits the rest.
pub async fn sequential<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let iter = futures.into_iter();
    let mut results = Vec::with_capacity(iter.size_hint().0);
    for future in iter {
        results.push(future.await?);
    }
    Ok(results)
}

/// Handle that cancels an in-flight [`cancelable`] computation.
#[derive(Debug, Clone)]
pub struct CancelHandle(AbortHandle);

impl CancelHandle {
    /// Aborts the computation. Idempotent.
    pub fn cancel(&self) {
        self.0.abort();
    }
}

/// Wraps a future so it can be canceled out-of-band. Cancellation is
/// not an error: the wrapped future resolves to `None` and any partial
/// result is discarded.
pub fn cancelable<F>(future: F) -> (impl Future<Output = Option<F::Output>>, CancelHandle)
where
    F: Future,
{
    let (wrapped, handle) = abortable(future);
    (async move { wrapped.await.ok() }, CancelHandle(handle))
}

/// Monotonically increasing request-generation counter. Callers tag
/// each build with a token and drop results whose token is no longer
/// current, so a stale in-flight build can never overwrite a newer one.
#[derive(Debug, Default)]
pub struct RequestGeneration(AtomicU64);

impl RequestGeneration {
    /// Creates a counter starting at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation and returns its token, superseding all
    /// earlier tokens.
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether the token still belongs to the latest generation.
    pub fn is_current(&self, token: u64) -> bool {
        self.0.load(Ordering::SeqCst) == token
    }
}
