//! Rows, list identities, poll summaries and render payloads.

use crate::curve_fit::CurveFit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer ordering key of a content row. Higher is more recent.
pub type Hid = i64;

/// Identity of a server-side list (a history or a collection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(String);

impl ListId {
    /// Create a list identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ListId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A list identity plus what the host already knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListHandle {
    /// List identity
    pub id: ListId,
    /// Newest hid the host knows of (for example the list's hid counter).
    /// Seeds the cursor → hid fit so a first `{cursor: 0}` can resolve.
    pub head_hint: Option<Hid>,
}

impl ListHandle {
    /// Create a handle without a head hint.
    pub fn new(id: impl Into<ListId>) -> Self {
        Self {
            id: id.into(),
            head_hint: None,
        }
    }

    /// Attach a head hint.
    pub fn with_head_hint(mut self, hid: Hid) -> Self {
        self.head_hint = Some(hid);
        self
    }
}

/// A content row. Opaque to the engine apart from its key and the flags the
/// filter set understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Ordering key
    pub hid: Hid,
    /// Display name
    pub name: String,
    /// Soft-deleted flag
    #[serde(default)]
    pub deleted: bool,
    /// Visibility flag (hidden rows have `visible = false`)
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Processing state (`ok`, `queued`, `running`, `error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Anything else the host attaches to the row
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

fn default_visible() -> bool {
    true
}

impl Row {
    /// Create a visible, non-deleted row.
    pub fn new(hid: Hid, name: impl Into<String>) -> Self {
        Self {
            hid,
            name: name.into(),
            deleted: false,
            visible: true,
            state: None,
            extra: serde_json::Value::Null,
        }
    }

    /// Set the processing state.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Mark the row deleted.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Mark the row hidden.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Summary statistics of one server fetch window.
///
/// Every field is optional because a server may omit aggregates; consumers
/// skip whatever update would need a missing field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    /// Highest hid in the filtered list
    pub max_hid: Option<Hid>,
    /// Lowest hid in the filtered list
    pub min_hid: Option<Hid>,
    /// Highest hid among the returned rows
    pub max_content_hid: Option<Hid>,
    /// Lowest hid among the returned rows
    pub min_content_hid: Option<Hid>,
    /// Number of rows returned
    pub matches: Option<u64>,
    /// Returned rows above the target key
    pub matches_up: Option<u64>,
    /// Returned rows at or below the target key
    pub matches_down: Option<u64>,
    /// Rows in the whole filtered list above the target key
    pub total_matches_up: Option<u64>,
    /// Rows in the whole filtered list
    pub total_matches: Option<u64>,
}

impl PollResult {
    /// Offset from the top of the list of the first returned row.
    pub fn top_offset(&self) -> Option<u64> {
        let total_up = self.total_matches_up?;
        let up = self.matches_up?;
        Some(total_up.saturating_sub(up))
    }

    /// Offset from the top of the list of the last returned row.
    pub fn bottom_offset(&self) -> Option<u64> {
        let matches = self.matches.filter(|m| *m > 0)?;
        Some(self.top_offset()? + matches - 1)
    }

    /// Convert a row offset into a cursor fraction in `[0, 1]`.
    pub fn offset_to_cursor(&self, offset: u64) -> Option<f64> {
        let total = self.total_matches.filter(|t| *t > 0)?;
        let span = total.saturating_sub(1).max(1) as f64;
        Some((offset as f64 / span).clamp(0.0, 1.0))
    }
}

/// Render-ready window of rows with counts of what lies above and below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Visible rows, newest first
    pub contents: Vec<Row>,
    /// Rows above the window
    pub top_rows: u64,
    /// Rows below the window
    pub bottom_rows: u64,
    /// Rows in the whole filtered list
    pub total_matches: u64,
    /// First row at or below the target key
    pub start_key: Option<Hid>,
    /// Index of `start_key` in `contents`
    pub start_key_index: Option<usize>,
    /// Key this payload was built for
    pub target_key: Option<Hid>,
    /// Placeholder published while the first results are outstanding
    #[serde(default)]
    pub pending: bool,
}

impl Payload {
    /// "No results yet" placeholder for `target_key`.
    pub fn placeholder(target_key: Option<Hid>, total_matches: u64) -> Self {
        Self {
            contents: Vec::new(),
            top_rows: 0,
            bottom_rows: total_matches,
            total_matches,
            start_key: None,
            start_key_index: None,
            target_key,
            pending: true,
        }
    }

    /// Compose a payload from a cache window.
    ///
    /// `top_rows` is the interpolated offset of the first row, rounded and
    /// floored at zero, then clamped so that
    /// `top_rows + contents.len() + bottom_rows == total_matches` holds.
    /// Without a known total the window is treated as the whole list.
    pub fn compose(
        contents: Vec<Row>,
        target_key: Option<Hid>,
        total_matches: Option<u64>,
        hid_to_top_rows: &CurveFit,
    ) -> Self {
        let len = contents.len() as u64;
        let total = total_matches.unwrap_or(len);

        let estimated_top = contents
            .first()
            .and_then(|row| hid_to_top_rows.get(row.hid as f64, true))
            .map(|y| y.round().max(0.0) as u64)
            .unwrap_or(0);
        let top_rows = estimated_top.min(total.saturating_sub(len));
        let bottom_rows = total.saturating_sub(top_rows + len);

        let start_key_index = target_key
            .and_then(|key| contents.iter().position(|row| row.hid <= key))
            .or_else(|| (!contents.is_empty() && target_key.is_none()).then_some(0));
        let start_key = start_key_index.map(|index| contents[index].hid);

        Self {
            contents,
            top_rows,
            bottom_rows,
            total_matches: total,
            start_key,
            start_key_index,
            target_key,
            pending: false,
        }
    }

    /// Whether the row counts add up to the total.
    pub fn is_consistent(&self) -> bool {
        self.top_rows + self.contents.len() as u64 + self.bottom_rows == self.total_matches
    }

    /// Hids of the visible rows, in display order.
    pub fn hids(&self) -> Vec<Hid> {
        self.contents.iter().map(|row| row.hid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(hids: impl IntoIterator<Item = Hid>) -> Vec<Row> {
        hids.into_iter()
            .map(|hid| Row::new(hid, format!("dataset {}", hid)))
            .collect()
    }

    #[test]
    fn test_poll_result_offsets() {
        let summary = PollResult {
            matches: Some(40),
            matches_up: Some(20),
            total_matches_up: Some(49),
            total_matches: Some(100),
            ..Default::default()
        };
        assert_eq!(summary.top_offset(), Some(29));
        assert_eq!(summary.bottom_offset(), Some(68));
        assert_eq!(summary.offset_to_cursor(99), Some(1.0));
    }

    #[test]
    fn test_bottom_offset_requires_matches() {
        let summary = PollResult {
            matches: Some(0),
            matches_up: Some(0),
            total_matches_up: Some(0),
            ..Default::default()
        };
        assert_eq!(summary.bottom_offset(), None);
    }

    #[test]
    fn test_compose_uses_fit_for_top_rows() {
        let mut fit = CurveFit::new(0, 2);
        fit.set(100.0, 0.0);
        fit.set(1.0, 99.0);

        let payload = Payload::compose(rows((60..=70).rev()), Some(65), Some(100), &fit);
        assert!(payload.top_rows > 0);
        assert!(payload.is_consistent());
        assert_eq!(payload.start_key, Some(65));
        assert_eq!(payload.start_key_index, Some(5));
    }

    #[test]
    fn test_compose_without_fit_starts_at_top() {
        let fit = CurveFit::new(0, 2);
        let payload = Payload::compose(rows((91..=100).rev()), Some(100), Some(100), &fit);
        assert_eq!(payload.top_rows, 0);
        assert_eq!(payload.bottom_rows, 90);
        assert!(payload.is_consistent());
    }

    #[test]
    fn test_compose_clamps_overshooting_estimate() {
        let mut fit = CurveFit::new(0, 2);
        fit.set(10.0, 95.0);
        let payload = Payload::compose(rows((1..=10).rev()), Some(5), Some(100), &fit);
        assert_eq!(payload.top_rows, 90);
        assert_eq!(payload.bottom_rows, 0);
        assert!(payload.is_consistent());
    }

    #[test]
    fn test_placeholder_is_consistent() {
        let payload = Payload::placeholder(Some(42), 100);
        assert!(payload.pending);
        assert!(payload.is_consistent());
    }
}
