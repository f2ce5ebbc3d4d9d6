//! Scroll position: where the user is in the list.

use crate::error::{Error, Result};
use crate::types::Hid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Immutable descriptor of the user's place in the list.
///
/// Either an exact item key, or a fractional cursor in `[0, 1]` (0 is the
/// most-recent end) when no key is known. When both are present the key wins
/// and the cursor is informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    /// Exact item key
    pub key: Option<Hid>,
    /// Fractional cursor, 0 = head of the list
    pub cursor: Option<f64>,
}

impl ScrollPosition {
    /// Position at an exact key.
    pub fn at_key(key: Hid) -> Self {
        Self {
            key: Some(key),
            cursor: None,
        }
    }

    /// Position at a cursor fraction. Non-finite input maps to the head;
    /// anything else is clamped into `[0, 1]`.
    pub fn at_cursor(cursor: f64) -> Self {
        let cursor = if cursor.is_finite() {
            cursor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            key: None,
            cursor: Some(cursor),
        }
    }

    /// The head of the list, pinned to a known newest key.
    pub fn at_head(key: Hid) -> Self {
        Self {
            key: Some(key),
            cursor: Some(0.0),
        }
    }

    /// The head of the list when no key is known.
    pub fn top() -> Self {
        Self::at_cursor(0.0)
    }

    /// Whether this position is a bare cursor sitting exactly on the head.
    pub fn is_cursor_head(&self) -> bool {
        self.key.is_none() && self.cursor == Some(0.0)
    }
}

impl fmt::Display for ScrollPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.key, self.cursor) {
            (Some(key), Some(cursor)) => write!(f, "key:{} (cursor {:.4})", key, cursor),
            (Some(key), None) => write!(f, "key:{}", key),
            (None, Some(cursor)) => write!(f, "cursor:{:.4}", cursor),
            (None, None) => f.write_str("unset"),
        }
    }
}

/// Parses `key:42`, `cursor:0.5`, `top`, or a bare fraction such as `0.5`.
impl FromStr for ScrollPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let invalid = || Error::InvalidPosition(s.to_string());

        if text.eq_ignore_ascii_case("top") {
            return Ok(Self::top());
        }
        if let Some(key) = text.strip_prefix("key:") {
            return key.trim().parse().map(Self::at_key).map_err(|_| invalid());
        }
        let cursor = text.strip_prefix("cursor:").unwrap_or(text);
        let cursor: f64 = cursor.trim().parse().map_err(|_| invalid())?;
        if !(0.0..=1.0).contains(&cursor) {
            return Err(invalid());
        }
        Ok(Self::at_cursor(cursor))
    }
}
