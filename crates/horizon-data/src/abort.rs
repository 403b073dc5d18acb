//! Cooperative cancellation of in-flight fetches.
//!
//! An [`AbortController`] hands out [`AbortSignal`]s that travel inside fetch
//! parameters. Raw providers check the signal before producing results.
//! Decorators race every upstream step against the signal, so a pending step
//! rejects as soon as the abort lands, and they check it again before
//! committing anything to a cache.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::FutureExt;
use futures_util::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{DataError, DataResult};

#[derive(Default)]
struct AbortState {
    reason: Mutex<Option<String>>,
    notify: Notify,
}

/// The receiving half of an abort.
///
/// Clones observe the same abort.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Whether the signal has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.reason.lock().is_some()
    }

    /// The abort reason, once aborted.
    pub fn reason(&self) -> Option<String> {
        self.state.reason.lock().clone()
    }

    /// `Err(DataError::Aborted)` if the signal has been aborted.
    pub fn check(&self) -> DataResult<()> {
        match self.reason() {
            Some(reason) => Err(DataError::aborted(reason)),
            None => Ok(()),
        }
    }

    /// Wait until the signal is aborted.
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Run `future` unless the signal aborts first.
    pub async fn race<T, F>(&self, future: F) -> DataResult<T>
    where
        F: Future<Output = DataResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.aborted() => Err(DataError::aborted(self.reason().unwrap_or_default())),
            result = future => result,
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal").field("reason", &self.reason()).finish()
    }
}

/// Two signals are equal when they observe the same abort.
impl PartialEq for AbortSignal {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// The sending half of an abort.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    /// Create a controller with a fresh signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// The signal to pass in fetch parameters.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort every fetch observing this controller's signal.
    ///
    /// Only the first reason is kept.
    pub fn abort(&self, reason: impl Into<String>) {
        {
            let mut current = self.signal.state.reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason.into());
        }
        self.signal.state.notify.notify_waiters();
    }
}

/// `Err(DataError::Aborted)` if an optional signal has been aborted.
pub(crate) fn check_signal(signal: Option<&AbortSignal>) -> DataResult<()> {
    signal.map_or(Ok(()), AbortSignal::check)
}

/// Pull the next item of `stream`, rejecting as soon as `signal` aborts.
///
/// A pending upstream step is abandoned when the abort lands.
pub(crate) async fn next_or_abort<S, T>(
    stream: &mut S,
    signal: Option<&AbortSignal>,
) -> Option<DataResult<T>>
where
    S: Stream<Item = DataResult<T>> + Unpin,
{
    let Some(signal) = signal else {
        return stream.next().await;
    };
    match signal.race(stream.next().map(Ok)).await {
        Ok(next) => next,
        Err(err) => Some(Err(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_sets_reason_once() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(signal.check().is_ok());

        controller.abort("user navigated away");
        controller.abort("second reason");

        assert!(signal.is_aborted());
        assert_eq!(signal.reason().as_deref(), Some("user navigated away"));
        assert_eq!(signal.check(), Err(DataError::aborted("user navigated away")));
    }

    #[tokio::test]
    async fn test_race_completes_without_abort() {
        let controller = AbortController::new();
        let result = controller.signal().race(async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_race_rejects_on_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let pending = tokio::spawn(async move {
            signal
                .race(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort("cancelled");

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn test_race_on_already_aborted_signal() {
        let controller = AbortController::new();
        controller.abort("early");
        let result = controller.signal().race(async { Ok(1) }).await;
        assert_eq!(result, Err(DataError::aborted("early")));
    }

    #[tokio::test]
    async fn test_next_or_abort_passes_items_through() {
        let mut stream = futures_util::stream::iter(vec![Ok::<u32, DataError>(1)]);
        assert_eq!(next_or_abort(&mut stream, None).await, Some(Ok(1)));

        let controller = AbortController::new();
        let mut stream = futures_util::stream::iter(vec![Ok::<u32, DataError>(2)]);
        assert_eq!(next_or_abort(&mut stream, Some(&controller.signal())).await, Some(Ok(2)));
        assert_eq!(next_or_abort(&mut stream, Some(&controller.signal())).await, None);
    }

    #[tokio::test]
    async fn test_next_or_abort_abandons_pending_step() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let pending = tokio::spawn(async move {
            let mut stream = futures_util::stream::pending::<DataResult<u32>>();
            next_or_abort(&mut stream, Some(&signal)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort("closed");

        let next = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
        assert_eq!(next, Some(Err(DataError::aborted("closed"))));
    }
}
