//! State types for tracking reconciled units.
//!
//! The stored record of each unit is what the host hands back to the
//! reconciler on the next run, so it is the only input for change detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{ApplyRecord, Verb};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// Everything the local driver remembers between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Stored units keyed by name.
    #[serde(default)]
    pub units: BTreeMap<String, UnitState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent lifecycle requests.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Stored state of a single unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitState {
    /// Unit name (from config).
    pub name: String,
    /// Last stored record. `id` is `None` after a failed request.
    pub record: ApplyRecord,
    /// Verb that produced the record.
    pub last_verb: Verb,
    /// When the unit was first stored.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the request finished.
    pub timestamp: DateTime<Utc>,
    /// Unit the request targeted.
    pub unit: String,
    /// Request verb.
    pub verb: Verb,
    /// Resulting identity, if one was stored.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the request succeeded.
    pub success: bool,
    /// Error message when it did not.
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            units: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a unit by name.
    #[must_use]
    pub fn get_unit(&self, name: &str) -> Option<&UnitState> {
        self.units.get(name)
    }

    /// Stores `record` under `name`, keeping the original creation time.
    pub fn set_unit(&mut self, name: &str, record: ApplyRecord, verb: Verb) {
        let now = Utc::now();
        let created_at = self.units.get(name).map_or(now, |u| u.created_at);

        self.units.insert(
            name.to_string(),
            UnitState {
                name: name.to_string(),
                record,
                last_verb: verb,
                created_at,
                updated_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Removes a unit by name.
    pub fn remove_unit(&mut self, name: &str) -> Option<UnitState> {
        let result = self.units.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Drops the stored identity of `name`, keeping its inputs. Returns the
    /// identity that was removed.
    pub fn clear_identity(&mut self, name: &str) -> Option<String> {
        let unit = self.units.get_mut(name)?;
        let previous = unit.record.id.take();
        if previous.is_some() {
            let now = Utc::now();
            unit.updated_at = now;
            self.last_updated = now;
        }
        previous
    }

    /// Adds a history entry, dropping the oldest beyond the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all unit names in order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.keys().map(String::as_str).collect()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn succeeded(unit: &str, verb: Verb, id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            unit: unit.to_string(),
            verb,
            id,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(unit: &str, verb: Verb, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            unit: unit.to_string(),
            verb,
            id: None,
            success: false,
            error: Some(error.to_string()),
        }
    }
}
