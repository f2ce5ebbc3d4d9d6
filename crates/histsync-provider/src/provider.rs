//! Content provider: the handle a UI holds.

use crate::builder::{BuilderParts, Command, PayloadBuilder};
use histsync_config::ProviderConfig;
use histsync_core::{
    ContentCache, ContentServer, Error, Filters, FitStore, Hid, ListHandle, MutationSource,
    Payload, Result, ScrollPosition,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where the builder is for the current (list, filters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing loaded yet, or the last chain was aborted
    #[default]
    Idle,
    /// Waiting for the first loader response for this key
    Loading(Hid),
    /// First response in; the cache window is being watched
    Watching(Hid),
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => f.write_str("idle"),
            SyncPhase::Loading(key) => write!(f, "loading({})", key),
            SyncPhase::Watching(key) => write!(f, "watching({})", key),
        }
    }
}

/// Everything a view renders from, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderState {
    /// Latest payload
    pub payload: Payload,
    /// A chain is running and has not produced a payload or failure yet
    pub loading: bool,
    /// A position was requested and has not settled yet
    pub scrolling: bool,
    /// Message of the last loader or cache failure, cleared by the next
    /// successful response
    pub last_error: Option<String>,
    /// Last settled position
    pub position: Option<ScrollPosition>,
    /// Builder phase
    pub phase: SyncPhase,
}

impl ProviderState {
    /// Whether a real payload is shown and nothing is in flight.
    pub fn is_settled(&self) -> bool {
        !self.loading && !self.scrolling && !self.payload.pending
    }
}

/// Configures and spawns a [`ContentProvider`].
pub struct ContentProviderBuilder {
    list: ListHandle,
    server: Arc<dyn ContentServer>,
    cache: Arc<dyn ContentCache>,
    config: ProviderConfig,
    filters: Filters,
    mutations: Option<Arc<dyn MutationSource>>,
    fits: Option<Arc<FitStore>>,
}

impl ContentProviderBuilder {
    /// Use `config` instead of the defaults.
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Start with `filters` instead of the default filter set.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Reset polling backoff on signals from `source`.
    pub fn with_mutations(mut self, source: Arc<dyn MutationSource>) -> Self {
        self.mutations = Some(source);
        self
    }

    /// Share fit state with other providers.
    pub fn with_fit_store(mut self, fits: Arc<FitStore>) -> Self {
        self.fits = Some(fits);
        self
    }

    /// Validate the configuration and spawn the builder task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<ContentProvider> {
        self.config.validate()?;

        let fits = self
            .fits
            .unwrap_or_else(|| Arc::new(FitStore::new(self.config.fit.clone())));
        let (state_tx, state_rx) = watch::channel(ProviderState::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        debug!(list = %self.list.id, "spawning content provider");
        let builder = PayloadBuilder::new(
            BuilderParts {
                list: self.list,
                filters: self.filters,
                config: self.config,
                server: self.server,
                cache: self.cache,
                mutations: self.mutations,
                fits: Arc::clone(&fits),
            },
            state_tx,
            commands_rx,
            shutdown.clone(),
        );
        let task = tokio::spawn(builder.run());

        Ok(ContentProvider {
            commands: commands_tx,
            state: state_rx,
            fits,
            shutdown,
            task: Some(task),
        })
    }
}

/// Handle to a running payload builder.
///
/// Dropping the handle stops the builder and every chain it runs.
pub struct ContentProvider {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ProviderState>,
    fits: Arc<FitStore>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ContentProvider {
    /// Start configuring a provider for `list`.
    pub fn builder(
        list: ListHandle,
        server: Arc<dyn ContentServer>,
        cache: Arc<dyn ContentCache>,
    ) -> ContentProviderBuilder {
        ContentProviderBuilder {
            list,
            server,
            cache,
            config: ProviderConfig::default(),
            filters: Filters::default(),
            mutations: None,
            fits: None,
        }
    }

    /// Move to `position`. Equal consecutive positions are ignored.
    pub fn set_scroll_position(&self, position: ScrollPosition) -> Result<()> {
        self.send(Command::Position(position))
    }

    /// Re-resolve the current position and restart loading even if the key
    /// is unchanged.
    pub fn manual_reload(&self) -> Result<()> {
        self.send(Command::Reload)
    }

    /// View the list through another filter set.
    pub fn set_filters(&self, filters: Filters) -> Result<()> {
        self.send(Command::SetFilters(filters))
    }

    /// Latest payload.
    pub fn payload(&self) -> Payload {
        self.state.borrow().payload.clone()
    }

    /// Whether a load is in flight.
    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Whether a position is waiting to settle.
    pub fn scrolling(&self) -> bool {
        self.state.borrow().scrolling
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> ProviderState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProviderState> {
        self.state.clone()
    }

    /// Stream of states, starting with the current one.
    ///
    /// Intermediate states may be skipped when the consumer falls behind.
    pub fn states(&self) -> WatchStream<ProviderState> {
        WatchStream::new(self.state.clone())
    }

    /// Wait until the state satisfies `predicate` and return that state.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&ProviderState) -> bool,
    ) -> Result<ProviderState> {
        let mut state = self.state.clone();
        let matched = state.wait_for(predicate).await.map_err(|_| Error::Shutdown)?;
        Ok(matched.clone())
    }

    /// Fit store this provider reads and writes.
    pub fn fit_store(&self) -> Arc<FitStore> {
        Arc::clone(&self.fits)
    }

    /// Stop the builder and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!(error = %err, "payload builder task ended abnormally");
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Shutdown)
    }
}

impl Drop for ContentProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ContentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentProvider")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histsync_core::{MemoryCache, SyntheticServer};

    #[test]
    fn test_phase_display() {
        assert_eq!(SyncPhase::Idle.to_string(), "idle");
        assert_eq!(SyncPhase::Watching(7).to_string(), "watching(7)");
    }

    #[test]
    fn test_settled_state() {
        let mut state = ProviderState::default();
        assert!(state.is_settled());
        state.payload = Payload::placeholder(Some(1), 10);
        assert!(!state.is_settled());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ProviderConfig {
            page_size: 0,
            ..ProviderConfig::default()
        };
        let result = ContentProvider::builder(
            ListHandle::new("h1"),
            Arc::new(SyntheticServer::new()),
            Arc::new(MemoryCache::new()),
        )
        .with_config(config)
        .spawn();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_state_channel_closes_after_shutdown() {
        let provider = ContentProvider::builder(
            ListHandle::new("h1"),
            Arc::new(SyntheticServer::new()),
            Arc::new(MemoryCache::new()),
        )
        .spawn()
        .unwrap();
        let handle = provider.subscribe();

        provider.shutdown().await;
        assert!(handle.has_changed().is_err());
    }
}
