//! Content loader: bounded window fetches and backoff polling.

use async_stream::stream;
use futures::stream::BoxStream;
use histsync_config::PollConfig;
use histsync_core::{
    CachePage, ContentCache, ContentServer, FetchRequest, Filters, Hid, ListId, MutationSignal,
    PollResult, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Exponential backoff between polls.
///
/// Starts at `initial`, doubles on each [`Backoff::advance`] and is capped at
/// `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff. A `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Build from poll configuration.
    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.initial_interval(), config.max_interval())
    }

    /// Delay before the next poll.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay, up to the cap.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Fetches windows of one (list, filters) and writes them to the cache.
#[derive(Clone)]
pub struct ContentLoader {
    server: Arc<dyn ContentServer>,
    cache: Arc<dyn ContentCache>,
    list: ListId,
    filters: Filters,
    rows_per_side: usize,
    poll: PollConfig,
}

impl ContentLoader {
    /// Create a loader.
    pub fn new(
        server: Arc<dyn ContentServer>,
        cache: Arc<dyn ContentCache>,
        list: ListId,
        filters: Filters,
        rows_per_side: usize,
        poll: PollConfig,
    ) -> Self {
        Self {
            server,
            cache,
            list,
            filters,
            rows_per_side,
            poll,
        }
    }

    /// One bounded fetch around `key`.
    ///
    /// Returned rows are written to the cache before the summary is returned.
    /// A failed fetch writes nothing.
    pub async fn load(&self, key: Hid) -> Result<PollResult> {
        let response = self
            .server
            .fetch(FetchRequest {
                list: self.list.clone(),
                filters: self.filters.clone(),
                key,
                rows_per_side: self.rows_per_side,
            })
            .await?;

        let summary = response.summary;
        debug!(
            list = %self.list,
            key,
            matches = ?summary.matches,
            total = ?summary.total_matches,
            "loaded window"
        );

        self.cache
            .write(CachePage {
                list: self.list.clone(),
                filters: self.filters.clone(),
                rows: response.rows,
                span: covered_span(&summary, self.rows_per_side),
            })
            .await?;
        Ok(summary)
    }

    /// Load `key` now, then again on a backoff timer while polling is enabled.
    ///
    /// A signal for this loader's list resets the backoff and restarts the
    /// wait. Failures are yielded and polling carries on. The stream ends when
    /// `cancel` fires, or after the first load when polling is disabled.
    pub fn poll(
        &self,
        key: Hid,
        mutations: Option<broadcast::Receiver<MutationSignal>>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<PollResult>> {
        let loader = self.clone();
        let mut mutations = mutations;

        Box::pin(stream! {
            let mut backoff = Backoff::from_config(&loader.poll);

            'polling: loop {
                let loaded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = loader.load(key) => Some(result),
                };
                let Some(result) = loaded else {
                    break 'polling;
                };
                yield result;

                if !loader.poll.enabled {
                    break 'polling;
                }

                let mut deadline = Instant::now() + backoff.current();
                let mut signalled = false;
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'polling,
                        _ = sleep_until(deadline) => break,
                        _ = next_signal(&mut mutations, &loader.list) => {
                            trace!(list = %loader.list, "mutation signal, polling backoff reset");
                            backoff.reset();
                            signalled = true;
                            deadline = Instant::now() + backoff.current();
                        }
                    }
                }
                if !signalled {
                    backoff.advance();
                }
            }
        })
    }
}

impl std::fmt::Debug for ContentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentLoader")
            .field("list", &self.list)
            .field("filters", &self.filters)
            .field("rows_per_side", &self.rows_per_side)
            .finish()
    }
}

/// Inclusive hid range a response speaks for.
///
/// A side that returned fewer rows than requested reached the end of the
/// list, so the range is open on that side. An inverted range covers nothing.
fn covered_span(summary: &PollResult, rows_per_side: usize) -> Option<(Hid, Hid)> {
    let per_side = rows_per_side as u64;
    let upper = if summary.matches_up? < per_side {
        Hid::MAX
    } else {
        summary.max_content_hid?
    };
    let lower = if summary.matches_down? < per_side {
        Hid::MIN
    } else {
        summary.min_content_hid?
    };
    if lower > upper {
        debug!(lower, upper, "inverted content range in poll summary, no eviction");
        return None;
    }
    Some((lower, upper))
}

/// Resolves on the next signal for `list`, or on lag. Pends forever without
/// a source or once the source has closed.
async fn next_signal(mutations: &mut Option<broadcast::Receiver<MutationSignal>>, list: &ListId) {
    loop {
        let Some(receiver) = mutations.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(signal) if &signal.list == list => return,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                trace!(skipped, "mutation signals lagged");
                return;
            }
            Err(RecvError::Closed) => *mutations = None,
        }
    }
}
