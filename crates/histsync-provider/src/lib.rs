//! # histsync provider
//!
//! Orchestration around the `histsync-core` data types:
//!
//! - [`loader::ContentLoader`] fetches bounded windows from the server,
//!   writes them to the cache and polls with exponential backoff.
//! - The payload builder (internal) is an actor that resolves scroll
//!   positions, runs one loader/cache-watch chain per resolved key and
//!   composes render payloads.
//! - [`ContentProvider`] is the handle a UI holds: it feeds positions in and
//!   publishes [`ProviderState`] through a `watch` channel.
//!
//! ```no_run
//! use std::sync::Arc;
//! use histsync_core::{ListHandle, MemoryCache, ScrollPosition, SyntheticServer};
//! use histsync_provider::ContentProvider;
//!
//! # async fn example() -> histsync_core::Result<()> {
//! let server = Arc::new(SyntheticServer::new().with_rows("h1", 100));
//! let cache = Arc::new(MemoryCache::new());
//! let provider = ContentProvider::builder(ListHandle::new("h1").with_head_hint(100), server, cache)
//!     .spawn()?;
//!
//! provider.set_scroll_position(ScrollPosition::top())?;
//! let state = provider.wait_until(|state| !state.payload.contents.is_empty()).await?;
//! println!("{} rows above the window", state.payload.top_rows);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod builder;
pub mod loader;
pub mod provider;

pub use builder::head_correction;
pub use loader::{Backoff, ContentLoader};
pub use provider::{ContentProvider, ContentProviderBuilder, ProviderState, SyncPhase};
