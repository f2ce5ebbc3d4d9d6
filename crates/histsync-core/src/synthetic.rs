//! In-memory [`ContentServer`] holding whole lists.
//!
//! Used by the CLI simulator and by tests. Lists can grow at the head, rows can
//! be flagged deleted or hidden, failures can be injected, and every mutation
//! is published on a [`MutationBus`].

use crate::error::{Error, Result};
use crate::filters::Filters;
use crate::signal::MutationBus;
use crate::traits::{ContentServer, FetchRequest, FetchResponse, MutationKind};
use crate::types::{Hid, ListId, PollResult, Row};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    lists: RwLock<HashMap<ListId, BTreeMap<Hid, Row>>>,
    pending_failures: AtomicUsize,
    fetches: AtomicUsize,
    latency: Option<Duration>,
    bus: MutationBus,
}

/// Synthetic server over in-memory lists.
#[derive(Clone, Default)]
pub struct SyntheticServer {
    inner: Arc<Inner>,
}

impl SyntheticServer {
    /// Create a server with no lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a list with hids `1..=count`, named `dataset <hid>`.
    pub fn with_rows(self, list: impl Into<ListId>, count: usize) -> Self {
        let rows = (1..=count as Hid).map(|hid| Row::new(hid, format!("dataset {}", hid)));
        self.insert(list, rows);
        self
    }

    /// Delay every fetch by `latency`.
    ///
    /// Must be called before the server is cloned or shared.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.latency = Some(latency),
            None => warn!("with_latency called on a shared server; ignored"),
        }
        self
    }

    /// Insert or replace rows without emitting signals.
    pub fn insert(&self, list: impl Into<ListId>, rows: impl IntoIterator<Item = Row>) {
        let mut lists = self.inner.lists.write();
        let stored = lists.entry(list.into()).or_default();
        for row in rows {
            stored.insert(row.hid, row);
        }
    }

    /// Append a row at the head of `list` and signal the creation.
    pub fn append(&self, list: &ListId, name: impl Into<String>) -> Hid {
        let hid = {
            let mut lists = self.inner.lists.write();
            let stored = lists.entry(list.clone()).or_default();
            let hid = stored.keys().next_back().map_or(1, |max| max + 1);
            stored.insert(hid, Row::new(hid, name));
            hid
        };
        debug!(%list, hid, "appended row");
        self.inner.bus.notify(list.clone(), MutationKind::Create);
        hid
    }

    /// Modify one row in place and signal the update.
    pub fn update(&self, list: &ListId, hid: Hid, change: impl FnOnce(&mut Row)) -> Result<()> {
        self.modify(list, hid, change)?;
        self.inner.bus.notify(list.clone(), MutationKind::Update);
        Ok(())
    }

    /// Soft-delete one row and signal the deletion.
    pub fn delete(&self, list: &ListId, hid: Hid) -> Result<()> {
        self.modify(list, hid, |row| row.deleted = true)?;
        self.inner.bus.notify(list.clone(), MutationKind::Delete);
        Ok(())
    }

    fn modify(&self, list: &ListId, hid: Hid, change: impl FnOnce(&mut Row)) -> Result<()> {
        let mut lists = self.inner.lists.write();
        let stored = lists
            .get_mut(list)
            .ok_or_else(|| Error::ListNotFound(list.to_string()))?;
        let row = stored
            .get_mut(&hid)
            .ok_or_else(|| Error::Server(format!("no row {} in list {}", hid, list)))?;
        change(row);
        Ok(())
    }

    /// Make the next `count` fetches fail.
    pub fn fail_next(&self, count: usize) {
        self.inner.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Newest hid of `list`, ignoring filters.
    pub fn head(&self, list: &ListId) -> Option<Hid> {
        self.inner
            .lists
            .read()
            .get(list)
            .and_then(|rows| rows.keys().next_back().copied())
    }

    /// Bus carrying this server's mutation signals.
    pub fn mutations(&self) -> &MutationBus {
        &self.inner.bus
    }

    fn take_failure(&self) -> bool {
        self.inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl std::fmt::Debug for SyntheticServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticServer")
            .field("lists", &self.inner.lists.read().len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

/// Serve one window out of a full list.
pub fn window_response(
    rows: &BTreeMap<Hid, Row>,
    filters: &Filters,
    key: Hid,
    rows_per_side: usize,
) -> FetchResponse {
    let universe: Vec<&Row> = rows.values().rev().filter(|row| filters.matches(row)).collect();
    let total_up = universe.iter().take_while(|row| row.hid > key).count();

    let up_start = total_up.saturating_sub(rows_per_side);
    let up = &universe[up_start..total_up];
    let down_end = (total_up + rows_per_side).min(universe.len());
    let down = &universe[total_up..down_end];

    let returned: Vec<Row> = up.iter().chain(down.iter()).map(|row| (*row).clone()).collect();
    let summary = PollResult {
        max_hid: universe.first().map(|row| row.hid),
        min_hid: universe.last().map(|row| row.hid),
        max_content_hid: returned.first().map(|row| row.hid),
        min_content_hid: returned.last().map(|row| row.hid),
        matches: Some(returned.len() as u64),
        matches_up: Some(up.len() as u64),
        matches_down: Some(down.len() as u64),
        total_matches_up: Some(total_up as u64),
        total_matches: Some(universe.len() as u64),
    };

    FetchResponse {
        rows: returned,
        summary,
    }
}

#[async_trait]
impl ContentServer for SyntheticServer {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_failure() {
            return Err(Error::Server("injected failure".to_string()));
        }

        let lists = self.inner.lists.read();
        let rows = lists
            .get(&request.list)
            .ok_or_else(|| Error::ListNotFound(request.list.to_string()))?;
        Ok(window_response(
            rows,
            &request.filters,
            request.key,
            request.rows_per_side,
        ))
    }
}
