//! In-process [`ContentCache`] with change notification.
//!
//! Rows are stored per list, ordered by hid. Every write bumps a version
//! counter on a `watch` channel; window streams re-read on each bump and skip
//! emissions whose rows did not change.

use crate::error::{Error, Result};
use crate::filters::Filters;
use crate::traits::{CachePage, ContentCache, RowStream, WindowQuery};
use crate::types::{Hid, ListId, Row};
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

struct Inner {
    lists: RwLock<HashMap<ListId, BTreeMap<Hid, Row>>>,
    version: watch::Sender<u64>,
    fail_next_watch: AtomicBool,
    fail_next_write: AtomicBool,
}

impl Inner {
    fn window(&self, query: &WindowQuery) -> Vec<Row> {
        let lists = self.lists.read();
        let Some(rows) = lists.get(&query.list) else {
            return Vec::new();
        };
        window_of(rows, &query.filters, query.key, query.rows_per_side)
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }
}

/// Rows around `key`: the nearest `per_side` matching rows above it and the
/// first `per_side` at or below it, newest first.
fn window_of(
    rows: &BTreeMap<Hid, Row>,
    filters: &Filters,
    key: Hid,
    per_side: usize,
) -> Vec<Row> {
    let mut above: Vec<Row> = rows
        .range(key.saturating_add(1)..)
        .map(|(_, row)| row)
        .filter(|row| filters.matches(row))
        .take(per_side)
        .cloned()
        .collect();
    above.reverse();

    let below = rows
        .range(..=key)
        .rev()
        .map(|(_, row)| row)
        .filter(|row| filters.matches(row))
        .take(per_side)
        .cloned();

    above.extend(below);
    above
}

/// Cheaply cloneable in-memory cache.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                lists: RwLock::new(HashMap::new()),
                version,
                fail_next_watch: AtomicBool::new(false),
                fail_next_write: AtomicBool::new(false),
            }),
        }
    }

    /// Insert rows directly, as if restored from a previous session.
    pub fn seed(&self, list: &ListId, rows: impl IntoIterator<Item = Row>) {
        {
            let mut lists = self.inner.lists.write();
            let stored = lists.entry(list.clone()).or_default();
            for row in rows {
                stored.insert(row.hid, row);
            }
        }
        self.inner.bump();
    }

    /// All cached rows of `list`, newest first.
    pub fn rows(&self, list: &ListId) -> Vec<Row> {
        self.inner
            .lists
            .read()
            .get(list)
            .map(|rows| rows.values().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of cached rows of `list`.
    pub fn len(&self, list: &ListId) -> usize {
        self.inner.lists.read().get(list).map_or(0, BTreeMap::len)
    }

    /// Whether nothing is cached for `list`.
    pub fn is_empty(&self, list: &ListId) -> bool {
        self.len(list) == 0
    }

    /// Current change counter.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Make the next [`ContentCache::watch`] stream fail on first poll.
    pub fn fail_next_watch(&self) {
        self.inner.fail_next_watch.store(true, Ordering::SeqCst);
    }

    /// Make the next [`ContentCache::write`] fail without storing anything.
    pub fn fail_next_write(&self) {
        self.inner.fail_next_write.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("lists", &self.inner.lists.read().len())
            .field("version", &self.version())
            .finish()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn write(&self, page: CachePage) -> Result<()> {
        if self.inner.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(Error::Cache(format!("write failed for list {}", page.list)));
        }
        let written = page.rows.len();
        let mut evicted = 0usize;
        {
            let mut lists = self.inner.lists.write();
            let stored = lists.entry(page.list.clone()).or_default();

            if let Some((low, high)) = page.span.filter(|(low, high)| low <= high) {
                let stale: Vec<Hid> = stored
                    .range(low..=high)
                    .filter(|(hid, row)| {
                        page.filters.matches(row) && !page.rows.iter().any(|r| r.hid == **hid)
                    })
                    .map(|(hid, _)| *hid)
                    .collect();
                evicted = stale.len();
                for hid in stale {
                    stored.remove(&hid);
                }
            }

            for row in page.rows {
                stored.insert(row.hid, row);
            }
        }
        self.inner.bump();
        trace!(list = %page.list, written, evicted, "cache write");
        Ok(())
    }

    fn watch(&self, query: WindowQuery) -> RowStream {
        let inner = Arc::clone(&self.inner);
        let mut version = self.inner.version.subscribe();
        let fail = self.inner.fail_next_watch.swap(false, Ordering::SeqCst);
        debug!(list = %query.list, key = query.key, "cache watch opened");

        Box::pin(stream! {
            if fail {
                yield Err(Error::Cache(format!("watch failed for list {}", query.list)));
            } else {
                let mut last: Option<Vec<Row>> = None;
                loop {
                    let _ = version.borrow_and_update();
                    let window = inner.window(&query);
                    if last.as_ref() != Some(&window) {
                        last = Some(window.clone());
                        yield Ok(window);
                    }
                    if version.changed().await.is_err() {
                        break;
                    }
                }
            }
        })
    }
}
