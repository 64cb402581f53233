use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Single-flight slot: starting a run cancels the one still in flight.
///
/// A superseded run resolves to `None` and its future is dropped at its
/// current suspension point, so nothing it would have done afterwards
/// (merging a page, publishing state) ever happens.
#[derive(Debug)]
pub struct AbortableRequest {
    parent: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

impl AbortableRequest {
    /// Runs are children of `parent`; cancelling it aborts whatever is in flight.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            parent: parent.clone(),
            current: Mutex::new(None),
        }
    }

    pub async fn run<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        let token = self.begin();
        let out = unless_cancelled(&token, fut).await;
        if out.is_none() {
            log::debug!("request superseded before completion");
        }
        out
    }

    /// Cancels the in-flight run, if any.
    pub fn abort(&self) {
        if let Some(token) = lock(&self.current).take() {
            token.cancel();
        }
    }

    fn begin(&self) -> CancellationToken {
        let token = self.parent.child_token();
        if let Some(previous) = lock(&self.current).replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

/// Races `fut` against `token`; cancellation wins when both are ready.
pub async fn unless_cancelled<F>(token: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    if token.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("state mutex poisoned, recovering...");
        poisoned.into_inner()
    })
}
