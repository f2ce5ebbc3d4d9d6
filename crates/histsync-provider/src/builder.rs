//! Payload builder actor.
//!
//! One task per provider. It owns the position stream, resolves settled
//! positions to keys through the fit pair, and runs a chain task per resolved
//! key: loader poll first, cache watch once the first response is in. Chain
//! events are tagged with a generation; anything from a superseded chain is
//! dropped.

use crate::loader::ContentLoader;
use crate::provider::{ProviderState, SyncPhase};
use futures::StreamExt;
use histsync_config::ProviderConfig;
use histsync_core::fit_store::SharedFitPair;
use histsync_core::{
    ContentCache, ContentServer, Error, Filters, FitKey, FitStore, Hid, ListHandle,
    MutationSource, Payload, PollResult, Row, RowStream, ScrollPosition, WindowQuery,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Requests from the provider shell.
#[derive(Debug)]
pub(crate) enum Command {
    Position(ScrollPosition),
    Reload,
    SetFilters(Filters),
}

#[derive(Debug)]
enum ChainEventKind {
    Response(PollResult),
    Contents(Vec<Row>),
    LoadFailed(Error),
    CacheFailed(Error),
}

#[derive(Debug)]
struct ChainEvent {
    generation: u64,
    key: Hid,
    kind: ChainEventKind,
}

/// Collaborators handed to the actor by the shell.
pub(crate) struct BuilderParts {
    pub list: ListHandle,
    pub filters: Filters,
    pub config: ProviderConfig,
    pub server: Arc<dyn ContentServer>,
    pub cache: Arc<dyn ContentCache>,
    pub mutations: Option<Arc<dyn MutationSource>>,
    pub fits: Arc<FitStore>,
}

pub(crate) struct PayloadBuilder {
    parts: BuilderParts,
    pair: SharedFitPair,
    loader: ContentLoader,
    state: watch::Sender<ProviderState>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<ChainEvent>,
    events_rx: mpsc::UnboundedReceiver<ChainEvent>,
    shutdown: CancellationToken,

    requested: Option<ScrollPosition>,
    settled: Option<ScrollPosition>,
    force_next: bool,
    debounce_deadline: Option<Instant>,
    placeholder_deadline: Option<Instant>,

    generation: u64,
    chain: Option<CancellationToken>,
    current_key: Option<Hid>,
    last_poll: Option<PollResult>,
    total_matches: Option<u64>,
}

impl PayloadBuilder {
    pub(crate) fn new(
        parts: BuilderParts,
        state: watch::Sender<ProviderState>,
        commands: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) -> Self {
        let pair = pair_for(&parts);
        let loader = loader_for(&parts);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            parts,
            pair,
            loader,
            state,
            commands,
            events_tx,
            events_rx,
            shutdown,
            requested: None,
            settled: None,
            force_next: false,
            debounce_deadline: None,
            placeholder_deadline: None,
            generation: 0,
            chain: None,
            current_key: None,
            last_poll: None,
            total_matches: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(list = %self.parts.list.id, filters = %self.parts.filters, "payload builder started");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sleep_until_opt(self.debounce_deadline) => self.settle(),
                _ = sleep_until_opt(self.placeholder_deadline) => self.publish_placeholder(),
            }
        }

        self.cancel_chain();
        info!(list = %self.parts.list.id, "payload builder stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Position(position) => self.request_position(position),
            Command::Reload => {
                debug!("manual reload");
                self.force_next = true;
                self.settle();
            }
            Command::SetFilters(filters) => {
                if filters == self.parts.filters {
                    return;
                }
                debug!(%filters, "switching filter set");
                self.cancel_chain();
                // Events already queued by the old chain belong to the old fits
                self.generation += 1;
                self.parts.filters = filters;
                self.pair = pair_for(&self.parts);
                self.loader = loader_for(&self.parts);
                self.current_key = None;
                self.last_poll = None;
                self.total_matches = None;
                self.placeholder_deadline = None;
                // Rows of the previous filter set never stand in for the new one
                self.publish(|state| {
                    state.payload = Payload::default();
                    state.loading = false;
                    state.phase = SyncPhase::Idle;
                });
                self.force_next = true;
                self.settle();
            }
        }
    }

    /// Queue a position behind the scroll debounce. Equal positions are
    /// dropped.
    fn request_position(&mut self, position: ScrollPosition) {
        if self.requested == Some(position) {
            trace!(%position, "duplicate scroll position");
            return;
        }
        self.requested = Some(position);
        self.debounce_deadline = Some(Instant::now() + self.parts.config.scroll_debounce());
        self.publish(|state| state.scrolling = true);
    }

    fn settle(&mut self) {
        self.debounce_deadline = None;
        let force = std::mem::take(&mut self.force_next);
        let Some(position) = self.requested else {
            return;
        };
        self.settled = Some(position);

        let chain_key = match self.resolve(&position) {
            None => {
                debug!(%position, "scroll position unresolved, nothing to load");
                None
            }
            Some(key) if !force && self.current_key == Some(key) => {
                trace!(key, "resolved key unchanged");
                None
            }
            Some(key) => Some(key),
        };

        // Position and load state change in a single update
        self.publish(|state| {
            state.scrolling = false;
            state.position = Some(position);
            if let Some(key) = chain_key {
                state.loading = true;
                state.phase = SyncPhase::Loading(key);
            }
        });
        if let Some(key) = chain_key {
            self.start_chain(key);
        }
    }

    fn resolve(&self, position: &ScrollPosition) -> Option<Hid> {
        match (position.key, position.cursor) {
            (Some(key), _) => Some(key),
            (None, Some(cursor)) => self.pair.lock().estimate_key(cursor),
            (None, None) => None,
        }
    }

    fn start_chain(&mut self, key: Hid) {
        self.cancel_chain();
        self.generation += 1;
        let token = self.shutdown.child_token();
        self.chain = Some(token.clone());
        self.current_key = Some(key);
        self.placeholder_deadline = Some(Instant::now() + self.parts.config.placeholder_timeout());
        debug!(key, generation = self.generation, "starting chain");

        let chain = Chain {
            generation: self.generation,
            key,
            loader: self.loader.clone(),
            cache: Arc::clone(&self.parts.cache),
            query: WindowQuery {
                list: self.parts.list.id.clone(),
                filters: self.parts.filters.clone(),
                key,
                rows_per_side: self.parts.config.rows_per_side(),
            },
            mutations: self.parts.mutations.as_ref().map(|source| source.subscribe()),
            events: self.events_tx.clone(),
            cancel: token,
            cache_debounce: self.parts.config.cache_debounce(),
        };
        tokio::spawn(chain.run());
    }

    fn cancel_chain(&mut self) {
        if let Some(token) = self.chain.take() {
            token.cancel();
        }
    }

    fn handle_event(&mut self, event: ChainEvent) {
        if event.generation != self.generation {
            trace!(
                generation = event.generation,
                current = self.generation,
                "dropping stale chain event"
            );
            return;
        }

        match event.kind {
            ChainEventKind::Response(summary) => self.on_response(event.key, summary),
            ChainEventKind::Contents(rows) => self.on_contents(event.key, rows),
            ChainEventKind::LoadFailed(err) => {
                warn!(key = event.key, error = %err, "content load failed");
                self.placeholder_deadline = None;
                let message = err.to_string();
                self.publish(|state| {
                    state.loading = false;
                    state.last_error = Some(message);
                    // Nothing was loaded for this key yet
                    if state.phase == SyncPhase::Loading(event.key) {
                        state.phase = SyncPhase::Idle;
                    }
                });
            }
            ChainEventKind::CacheFailed(err) => {
                error!(key = event.key, error = %err, "cache watch failed, chain aborted");
                self.cancel_chain();
                self.current_key = None;
                self.placeholder_deadline = None;
                let message = err.to_string();
                self.publish(|state| {
                    state.loading = false;
                    state.last_error = Some(message);
                    state.phase = SyncPhase::Idle;
                });
            }
        }
    }

    fn on_response(&mut self, key: Hid, summary: PollResult) {
        self.pair.lock().observe(&summary);
        if let Some(total) = summary.total_matches {
            self.total_matches = Some(total);
        }

        // Only follow the head once the user has stopped scrolling
        let correction = match (&self.last_poll, self.settled) {
            (Some(previous), Some(position)) if self.debounce_deadline.is_none() => {
                head_correction(
                    &position,
                    previous,
                    &summary,
                    self.parts.config.head_tolerance,
                )
            }
            _ => None,
        };
        self.last_poll = Some(summary);
        self.publish(|state| {
            state.last_error = None;
            state.phase = SyncPhase::Watching(key);
        });

        if let Some(position) = correction {
            debug!(%position, "new rows at the head, following");
            self.request_position(position);
        }
    }

    fn on_contents(&mut self, key: Hid, rows: Vec<Row>) {
        let payload = {
            let pair = self.pair.lock();
            Payload::compose(rows, Some(key), self.total_matches, &pair.hid_to_top_rows)
        };
        trace!(
            key,
            rows = payload.contents.len(),
            top = payload.top_rows,
            bottom = payload.bottom_rows,
            "payload composed"
        );
        self.placeholder_deadline = None;
        self.publish(|state| {
            state.payload = payload;
            state.loading = false;
        });
    }

    fn publish_placeholder(&mut self) {
        self.placeholder_deadline = None;
        let payload = Payload::placeholder(self.current_key, self.total_matches.unwrap_or(0));
        debug!(key = ?self.current_key, "no results yet, publishing placeholder");
        self.publish(|state| state.payload = payload);
    }

    fn publish(&self, update: impl FnOnce(&mut ProviderState)) {
        self.state.send_modify(update);
    }
}

/// Position to jump to when new rows appeared at the head while the user was
/// sitting on it.
///
/// The user counts as on the head when the position is a bare `cursor: 0`,
/// or its key equals the previous `max_content_hid` or `max_hid`, or lies
/// within `tolerance` of the previous `max_content_hid`.
pub fn head_correction(
    position: &ScrollPosition,
    previous: &PollResult,
    next: &PollResult,
    tolerance: i64,
) -> Option<ScrollPosition> {
    let (previous_max, next_max) = (previous.max_hid?, next.max_hid?);
    if next_max <= previous_max {
        return None;
    }

    let at_head = position.is_cursor_head()
        || position.key.is_some_and(|key| {
            key == previous_max
                || previous
                    .max_content_hid
                    .is_some_and(|top| key.abs_diff(top) <= tolerance.unsigned_abs())
        });
    if !at_head {
        return None;
    }
    next.max_content_hid.map(ScrollPosition::at_head)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn pair_for(parts: &BuilderParts) -> SharedFitPair {
    let key = FitKey::new(parts.list.id.clone(), parts.filters.clone());
    parts.fits.pair(&key, parts.list.head_hint)
}

fn loader_for(parts: &BuilderParts) -> ContentLoader {
    ContentLoader::new(
        Arc::clone(&parts.server),
        Arc::clone(&parts.cache),
        parts.list.id.clone(),
        parts.filters.clone(),
        parts.config.rows_per_side(),
        parts.config.poll.clone(),
    )
}

/// Loader poll and cache watch for one resolved key.
struct Chain {
    generation: u64,
    key: Hid,
    loader: ContentLoader,
    cache: Arc<dyn ContentCache>,
    query: WindowQuery,
    mutations: Option<tokio::sync::broadcast::Receiver<histsync_core::MutationSignal>>,
    events: mpsc::UnboundedSender<ChainEvent>,
    cancel: CancellationToken,
    cache_debounce: Duration,
}

impl Chain {
    async fn run(mut self) {
        let mut polls = self
            .loader
            .poll(self.key, self.mutations.take(), self.cancel.clone());
        let mut polls_done = false;
        let mut contents: Option<RowStream> = None;
        let mut pending_rows: Option<Vec<Row>> = None;
        let mut flush_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                polled = polls.next(), if !polls_done => match polled {
                    Some(Ok(summary)) => {
                        if !self.send(ChainEventKind::Response(summary)) {
                            break;
                        }
                        // Opened only after the first response was sent
                        if contents.is_none() {
                            contents = Some(self.cache.watch(self.query.clone()));
                        }
                    }
                    Some(Err(err)) => {
                        if !self.send(ChainEventKind::LoadFailed(err)) {
                            break;
                        }
                    }
                    None => {
                        polls_done = true;
                        if contents.is_none() {
                            break;
                        }
                    }
                },
                window = next_window(&mut contents) => match window {
                    Some(Ok(rows)) => {
                        pending_rows = Some(rows);
                        flush_at = Some(Instant::now() + self.cache_debounce);
                    }
                    Some(Err(err)) => {
                        self.send(ChainEventKind::CacheFailed(err));
                        break;
                    }
                    None => {
                        debug!(key = self.key, "cache watch ended");
                        contents = None;
                        if polls_done {
                            break;
                        }
                    }
                },
                _ = sleep_until_opt(flush_at) => {
                    flush_at = None;
                    if let Some(rows) = pending_rows.take() {
                        if !self.send(ChainEventKind::Contents(rows)) {
                            break;
                        }
                    }
                }
            }
        }
        trace!(key = self.key, generation = self.generation, "chain stopped");
    }

    fn send(&self, kind: ChainEventKind) -> bool {
        self.events
            .send(ChainEvent {
                generation: self.generation,
                key: self.key,
                kind,
            })
            .is_ok()
    }
}

async fn next_window(contents: &mut Option<RowStream>) -> Option<histsync_core::Result<Vec<Row>>> {
    match contents {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
