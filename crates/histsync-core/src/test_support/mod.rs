//! Test doubles and fixtures shared by the workspace's test suites.
//!
//! Enabled with the `test-utils` feature.

pub mod mocks;

pub use mocks::{FailingCache, MockStats, RecordingServer};

use crate::types::{Hid, Row};

/// Rows named `dataset <hid>`, in the order given.
pub fn rows(hids: impl IntoIterator<Item = Hid>) -> Vec<Row> {
    hids.into_iter()
        .map(|hid| Row::new(hid, format!("dataset {}", hid)))
        .collect()
}

/// Hids of `rows`, in order.
pub fn hids(rows: &[Row]) -> Vec<Hid> {
    rows.iter().map(|row| row.hid).collect()
}
