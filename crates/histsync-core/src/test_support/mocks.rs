//! Mock collaborators.
//!
//! - [`RecordingServer`] wraps any [`ContentServer`] and records every request
//!   with the (tokio) instant it arrived, so paused-clock tests can assert on
//!   fetch timing.
//! - [`FailingCache`] is a [`ContentCache`] whose writes and watches always
//!   fail.

use crate::error::{Error, Result};
use crate::traits::{
    CachePage, ContentCache, ContentServer, FetchRequest, FetchResponse, RowStream, WindowQuery,
};
use crate::types::Hid;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

/// Operation counters of a mock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Calls that succeeded
    pub ok: usize,
    /// Calls that failed
    pub failed: usize,
}

#[derive(Default)]
struct RecordingState {
    requests: Vec<(Instant, FetchRequest)>,
    stats: MockStats,
}

/// Server wrapper that records requests.
pub struct RecordingServer<S> {
    inner: S,
    state: Arc<Mutex<RecordingState>>,
}

impl<S: ContentServer> RecordingServer<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(RecordingState::default())),
        }
    }

    /// The wrapped server.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of requests seen.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Keys of every request, in arrival order.
    pub fn requested_keys(&self) -> Vec<Hid> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|(_, request)| request.key)
            .collect()
    }

    /// Arrival instants of every request.
    pub fn request_times(&self) -> Vec<Instant> {
        self.state.lock().requests.iter().map(|(at, _)| *at).collect()
    }

    /// Success and failure counts.
    pub fn stats(&self) -> MockStats {
        self.state.lock().stats.clone()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.stats = MockStats::default();
    }
}

#[async_trait]
impl<S: ContentServer> ContentServer for RecordingServer<S> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.state
            .lock()
            .requests
            .push((Instant::now(), request.clone()));

        let result = self.inner.fetch(request).await;
        let mut state = self.state.lock();
        match &result {
            Ok(_) => state.stats.ok += 1,
            Err(_) => state.stats.failed += 1,
        }
        result
    }
}

/// Cache that rejects everything.
#[derive(Debug, Clone, Default)]
pub struct FailingCache;

#[async_trait]
impl ContentCache for FailingCache {
    async fn write(&self, page: CachePage) -> Result<()> {
        Err(Error::Cache(format!("write rejected for list {}", page.list)))
    }

    fn watch(&self, query: WindowQuery) -> RowStream {
        let error = Error::Cache(format!("watch rejected for list {}", query.list));
        Box::pin(futures::stream::once(async move { Err(error) }))
    }
}
