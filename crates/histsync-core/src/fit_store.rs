//! Bounded store of curve-fit pairs keyed by (list, filters).
//!
//! Fits survive remounts of a provider for the same list and filter set, so a
//! reopened panel resolves cursors immediately. The store is an explicit
//! object owned by whoever constructs the provider; nothing here is global.

use crate::curve_fit::CurveFit;
use crate::filters::Filters;
use crate::types::{Hid, ListId, PollResult};
use histsync_config::FitConfig;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Key of one fit pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FitKey {
    /// List identity
    pub list: ListId,
    /// Filter set the list is viewed through
    pub filters: Filters,
}

impl FitKey {
    /// Create a key.
    pub fn new(list: ListId, filters: Filters) -> Self {
        Self { list, filters }
    }
}

/// The two fits maintained per (list, filters).
#[derive(Debug, Clone, PartialEq)]
pub struct FitPair {
    /// Scroll cursor → item key
    pub cursor_to_hid: CurveFit,
    /// Item key → rows above it
    pub hid_to_top_rows: CurveFit,
}

impl FitPair {
    /// Create an empty pair using the configured precisions.
    pub fn new(config: &FitConfig) -> Self {
        Self {
            cursor_to_hid: CurveFit::new(config.cursor_precision, config.value_precision)
                .with_domain(0.0, 1.0),
            hid_to_top_rows: CurveFit::new(config.key_precision, config.value_precision),
        }
    }

    /// Estimate the key at `cursor`.
    ///
    /// Falls back to the head sample (x = 0) when nothing else is known and
    /// returns `None` when the fit is still empty.
    pub fn estimate_key(&self, cursor: f64) -> Option<Hid> {
        self.cursor_to_hid
            .get(cursor, true)
            .or_else(|| self.cursor_to_hid.get(0.0, true))
            .map(|y| y.round() as Hid)
    }

    /// Pin both fits to the edges reported by one loader response.
    ///
    /// Updates that need a field the server omitted are skipped.
    pub fn observe(&mut self, summary: &PollResult) {
        if let Some(max) = summary.max_hid {
            self.cursor_to_hid.set(0.0, max as f64);
            self.hid_to_top_rows.set(max as f64, 0.0);
        }
        if let Some(min) = summary.min_hid {
            self.cursor_to_hid.set(1.0, min as f64);
            if let Some(total) = summary.total_matches.filter(|t| *t > 0) {
                self.hid_to_top_rows.set(min as f64, (total - 1) as f64);
            }
        }

        if summary.matches.unwrap_or(0) == 0 {
            return;
        }
        if let (Some(top), Some(hid)) = (summary.top_offset(), summary.max_content_hid) {
            self.pin_edge(summary, top, hid);
        }
        if let (Some(bottom), Some(hid)) = (summary.bottom_offset(), summary.min_content_hid) {
            self.pin_edge(summary, bottom, hid);
        }
    }

    fn pin_edge(&mut self, summary: &PollResult, offset: u64, hid: Hid) {
        if let Some(cursor) = summary.offset_to_cursor(offset) {
            self.cursor_to_hid.set(cursor, hid as f64);
        }
        self.hid_to_top_rows.set(hid as f64, offset as f64);
        trace!(hid, offset, "pinned fit edge");
    }
}

/// Shared handle to one fit pair.
pub type SharedFitPair = Arc<Mutex<FitPair>>;

/// LRU map of fit pairs.
pub struct FitStore {
    pairs: Mutex<LruCache<FitKey, SharedFitPair>>,
    config: FitConfig,
}

impl FitStore {
    /// Create a store sized by `config.store_capacity`.
    pub fn new(config: FitConfig) -> Self {
        let capacity = NonZeroUsize::new(config.store_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pairs: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    /// Fetch the pair for `key`, creating it on first use.
    ///
    /// A new pair is seeded with `(0, head_hint)` on the cursor fit.
    pub fn pair(&self, key: &FitKey, head_hint: Option<Hid>) -> SharedFitPair {
        let mut pairs = self.pairs.lock();
        if let Some(pair) = pairs.get(key) {
            return Arc::clone(pair);
        }

        let mut pair = FitPair::new(&self.config);
        if let Some(hint) = head_hint {
            pair.cursor_to_hid.set(0.0, hint as f64);
        }
        let pair = Arc::new(Mutex::new(pair));
        pairs.put(key.clone(), Arc::clone(&pair));
        pair
    }

    /// Whether a pair exists for `key`, without touching LRU order.
    pub fn contains(&self, key: &FitKey) -> bool {
        self.pairs.lock().contains(key)
    }

    /// Number of retained pairs.
    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitStore")
            .field("len", &self.len())
            .field("capacity", &self.config.store_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hundred_row_head_response() -> PollResult {
        // Fetch near hid 100 in a list of hids 100..=1, 20 rows returned below
        PollResult {
            max_hid: Some(100),
            min_hid: Some(1),
            max_content_hid: Some(100),
            min_content_hid: Some(81),
            matches: Some(20),
            matches_up: Some(0),
            matches_down: Some(20),
            total_matches_up: Some(0),
            total_matches: Some(100),
        }
    }

    #[test]
    fn test_observe_pins_edges() {
        let mut pair = FitPair::new(&FitConfig::default());
        pair.observe(&hundred_row_head_response());

        assert_eq!(pair.cursor_to_hid.get(0.0, false), Some(100.0));
        assert_eq!(pair.cursor_to_hid.get(1.0, false), Some(1.0));
        assert_eq!(pair.hid_to_top_rows.get(100.0, false), Some(0.0));
        assert_eq!(pair.hid_to_top_rows.get(81.0, false), Some(19.0));
        assert_eq!(pair.hid_to_top_rows.get(1.0, false), Some(99.0));

        let middle = pair.estimate_key(0.5).unwrap();
        assert!((45..=55).contains(&middle), "estimated {}", middle);
    }

    #[test]
    fn test_observe_skips_missing_fields() {
        let mut pair = FitPair::new(&FitConfig::default());
        pair.observe(&PollResult {
            max_hid: Some(10),
            matches: Some(5),
            ..Default::default()
        });
        assert_eq!(pair.cursor_to_hid.len(), 1);
        assert_eq!(pair.hid_to_top_rows.len(), 1);
    }

    #[test]
    fn test_estimate_without_data_is_unresolved() {
        let pair = FitPair::new(&FitConfig::default());
        assert_eq!(pair.estimate_key(0.3), None);
    }

    #[test]
    fn test_pair_is_shared_and_seeded() {
        let store = FitStore::new(FitConfig::default());
        let key = FitKey::new(ListId::new("h1"), Filters::default());

        let first = store.pair(&key, Some(42));
        let second = store.pair(&key, Some(7));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().estimate_key(0.0), Some(42));
    }

    #[test]
    fn test_lru_eviction() {
        let config = FitConfig {
            store_capacity: 2,
            ..FitConfig::default()
        };
        let store = FitStore::new(config);
        let key = |id: &str| FitKey::new(ListId::new(id), Filters::default());

        store.pair(&key("a"), None);
        store.pair(&key("b"), None);
        store.pair(&key("a"), None);
        store.pair(&key("c"), None);

        assert_eq!(store.len(), 2);
        assert!(store.contains(&key("a")));
        assert!(!store.contains(&key("b")));
    }

    #[test]
    fn test_filters_separate_pairs() {
        let store = FitStore::new(FitConfig::default());
        let visible = FitKey::new(ListId::new("h1"), Filters::default());
        let deleted = FitKey::new(ListId::new("h1"), Filters::parse("deleted:true").unwrap());

        store.pair(&visible, Some(10));
        let other = store.pair(&deleted, None);
        assert!(other.lock().cursor_to_hid.is_empty());
    }
}
