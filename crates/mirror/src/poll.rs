use crate::cache::ReadModelCache;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const BACKOFF_FACTOR: f64 = 1.5;
const RECOVERY_FACTOR: f64 = 0.9;
const MAX_BASE_MULTIPLE: f64 = 5.0;

/// Additive/multiplicative poll interval: widens ×1.5 on error (capped at
/// 5× the base), contracts ×0.9 on success back toward the base, never
/// below it. Deliberately not jittered exponential backoff; a fleet of
/// synchronized clients would want jitter here.
#[derive(Debug, Clone)]
pub struct PollInterval {
    base: Duration,
    current: Duration,
    adaptive: bool,
}

impl PollInterval {
    pub fn new(base: Duration, adaptive: bool) -> Self {
        Self {
            base,
            current: base,
            adaptive,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn on_failure(&mut self) {
        if !self.adaptive {
            return;
        }
        let widened = self.current.as_secs_f64() * BACKOFF_FACTOR;
        let cap = self.base.as_secs_f64() * MAX_BASE_MULTIPLE;
        self.current = Duration::from_secs_f64(widened.min(cap));
    }

    pub fn on_success(&mut self) {
        if !self.adaptive {
            return;
        }
        let narrowed = self.current.as_secs_f64() * RECOVERY_FACTOR;
        self.current = Duration::from_secs_f64(narrowed.max(self.base.as_secs_f64()));
    }
}

/// Owns the cancellation of one polling task. Dropping the handle without
/// calling `stop` detaches the task; views are expected to stop on teardown.
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signal shutdown and wait for the loop to exit. A fetch already in
    /// flight finishes first; its result is discarded.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Repeatedly fetch `key` on a timer, bypassing the cache's freshness check
/// and overwriting the entry with each result. An in-flight fetch that was
/// started before cancellation is allowed to finish; its result is
/// discarded once shutdown has been signalled.
pub fn spawn_polling<V, F, Fut>(
    cache: Arc<ReadModelCache<V>>,
    key: String,
    fetcher: F,
    interval: PollInterval,
) -> PollHandle
where
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V>> + Send,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = interval;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(interval.current()) => {}
            }

            let result = fetcher().await;
            if *shutdown_rx.borrow() {
                break;
            }
            match result {
                Ok(value) => {
                    cache.store(&key, value).await;
                    interval.on_success();
                }
                Err(err) => {
                    interval.on_failure();
                    tracing::warn!(
                        key = %key,
                        error = %err,
                        next_interval_ms = interval.current().as_millis() as u64,
                        "poll fetch failed, widening interval"
                    );
                }
            }
        }
        tracing::debug!(key = %key, "polling stopped");
    });

    PollHandle { shutdown, task }
}
