//! Contracts for the external collaborators: the server, the local cache and
//! the mutation-signal source.

use crate::error::Result;
use crate::filters::Filters;
use crate::types::{Hid, ListId, PollResult, Row};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One bounded window request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// List to read
    pub list: ListId,
    /// Filter set to apply server-side
    pub filters: Filters,
    /// Target key the window is centred on
    pub key: Hid,
    /// Rows wanted above the key, and again at or below it
    pub rows_per_side: usize,
}

/// Rows and aggregates returned for a [`FetchRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    /// Returned rows, newest first
    pub rows: Vec<Row>,
    /// Aggregate counts describing the window
    pub summary: PollResult,
}

/// Read endpoint of the server.
#[async_trait]
pub trait ContentServer: Send + Sync {
    /// Fetch a window of rows around `request.key`.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

/// A page of fetched rows to store.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePage {
    /// Owning list
    pub list: ListId,
    /// Filter set the rows were fetched under
    pub filters: Filters,
    /// Rows to upsert
    pub rows: Vec<Row>,
    /// Inclusive hid range the server vouched for. Cached rows inside it that
    /// are absent from `rows` no longer match and are evicted.
    pub span: Option<(Hid, Hid)>,
}

/// Window read from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowQuery {
    /// Owning list
    pub list: ListId,
    /// Filter set the window must match
    pub filters: Filters,
    /// Window centre
    pub key: Hid,
    /// Rows above the key, and again at or below it
    pub rows_per_side: usize,
}

/// Updating stream of cache windows.
pub type RowStream = BoxStream<'static, Result<Vec<Row>>>;

/// Local persistent store of content rows.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Upsert a page of rows.
    async fn write(&self, page: CachePage) -> Result<()>;

    /// Watch the window around `query.key`.
    ///
    /// Emits the current window immediately, then again whenever the cache
    /// changes. Rows come newest first.
    fn watch(&self, query: WindowQuery) -> RowStream;
}

/// Kind of server-side mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// A row was created
    Create,
    /// A row was updated
    Update,
    /// A row was deleted
    Delete,
}

/// "A write just happened against this list."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSignal {
    /// Affected list
    pub list: ListId,
    /// What happened
    pub kind: MutationKind,
}

impl MutationSignal {
    /// Create a signal.
    pub fn new(list: ListId, kind: MutationKind) -> Self {
        Self { list, kind }
    }
}

/// Source of mutation signals, used only to reset polling backoff.
pub trait MutationSource: Send + Sync {
    /// Subscribe to future signals.
    fn subscribe(&self) -> broadcast::Receiver<MutationSignal>;
}
