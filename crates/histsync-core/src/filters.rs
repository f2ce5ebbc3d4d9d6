//! Filter set applied to server queries and cache windows.
//!
//! Filter text follows the history panel's search syntax:
//! `deleted:false visible:true state:ok name:fastq`. A bare word is a name
//! filter, and `any` lifts a flag filter (`deleted:any`).

use crate::error::{Error, Result};
use crate::types::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which rows of a list are in view.
///
/// `None` fields do not filter. The default shows non-deleted, visible rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters {
    /// Required deleted flag
    pub deleted: Option<bool>,
    /// Required visible flag
    pub visible: Option<bool>,
    /// Required processing state
    pub state: Option<String>,
    /// Case-insensitive name substring
    pub name: Option<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            deleted: Some(false),
            visible: Some(true),
            state: None,
            name: None,
        }
    }
}

impl Filters {
    /// Parse filter text on top of the defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let mut filters = Self::default();
        let mut bare_words: Vec<&str> = Vec::new();

        for token in text.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                bare_words.push(token);
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "deleted" => filters.deleted = parse_flag(token, value)?,
                "visible" => filters.visible = parse_flag(token, value)?,
                "state" => filters.state = non_empty(value),
                "name" => filters.name = non_empty(value),
                _ => {
                    return Err(Error::InvalidFilter {
                        token: token.to_string(),
                        reason: format!("unknown filter key '{}'", key),
                    })
                }
            }
        }

        if !bare_words.is_empty() {
            filters.name = Some(bare_words.join(" "));
        }
        Ok(filters)
    }

    /// Whether `row` passes every active filter.
    pub fn matches(&self, row: &Row) -> bool {
        if self.deleted.is_some_and(|deleted| row.deleted != deleted) {
            return false;
        }
        if self.visible.is_some_and(|visible| row.visible != visible) {
            return false;
        }
        if let Some(state) = &self.state {
            if row.state.as_deref() != Some(state.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !row.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn parse_flag(token: &str, value: &str) -> Result<Option<bool>> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(Some(true)),
        "false" | "no" => Ok(Some(false)),
        "any" => Ok(None),
        _ => Err(Error::InvalidFilter {
            token: token.to_string(),
            reason: "expected true, false or any".to_string(),
        }),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl FromStr for Filters {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |value: Option<bool>| match value {
            Some(true) => "true",
            Some(false) => "false",
            None => "any",
        };
        write!(
            f,
            "deleted:{} visible:{}",
            flag(self.deleted),
            flag(self.visible)
        )?;
        if let Some(state) = &self.state {
            write!(f, " state:{}", state)?;
        }
        if let Some(name) = &self.name {
            write!(f, " name:{}", name)?;
        }
        Ok(())
    }
}
