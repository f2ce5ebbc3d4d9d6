//! # histsync core
//!
//! Data types and collaborator contracts for presenting a server-backed,
//! virtually-infinite ordered list (a history or collection panel) through a
//! fixed-size window.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ ScrollPosition  │───▶│  CurveFit pair   │───▶│  resolved Hid   │
//! │ (key | cursor)  │    │  (FitStore, LRU) │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//!                                 ▲                       │
//!                                 │ PollResult            ▼
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │  ContentCache   │◀───│  ContentServer   │◀───│  fetch window   │
//! │  (rows, watch)  │    │  (fetch)         │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! The orchestration (loader, payload builder, provider shell) lives in the
//! `histsync-provider` crate; this crate only holds the pieces that are pure
//! data or contracts, plus in-memory reference implementations of the two I/O
//! edges ([`MemoryCache`], [`SyntheticServer`]).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cache;
pub mod curve_fit;
pub mod error;
pub mod filters;
pub mod fit_store;
pub mod position;
pub mod signal;
pub mod synthetic;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use cache::MemoryCache;
pub use curve_fit::CurveFit;
pub use error::{Error, Result};
pub use filters::Filters;
pub use fit_store::{FitKey, FitPair, FitStore};
pub use position::ScrollPosition;
pub use signal::MutationBus;
pub use synthetic::SyntheticServer;
pub use traits::{
    CachePage, ContentCache, ContentServer, FetchRequest, FetchResponse, MutationKind,
    MutationSignal, MutationSource, RowStream, WindowQuery,
};
pub use types::{Hid, ListHandle, ListId, Payload, PollResult, Row};
