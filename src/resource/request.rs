//! Lifecycle requests issued by the host.

use serde::{Deserialize, Serialize};

use super::model::ApplyRecord;

/// Lifecycle verb, used for logging and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// First reconciliation of a declared unit.
    Create,
    /// Refresh of the stored identity.
    Read,
    /// Desired inputs changed.
    Update,
    /// Unit removed from the declaration.
    Delete,
    /// Record adopted from an external identity.
    Import,
}

/// One request from the host against a single managed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleRequest {
    /// Provision and record a new unit.
    Create {
        /// Desired attributes.
        planned: ApplyRecord,
    },
    /// Refresh the identity of an existing unit.
    Read {
        /// Currently stored record.
        current: ApplyRecord,
    },
    /// Re-provision an existing unit.
    Update {
        /// Previously stored record.
        prior: ApplyRecord,
        /// Desired attributes.
        planned: ApplyRecord,
    },
    /// Forget a unit. Nothing is torn down.
    Delete {
        /// Currently stored record.
        current: ApplyRecord,
    },
    /// Adopt a unit by identity only.
    Import {
        /// Identity supplied by the caller.
        id: String,
    },
}

impl LifecycleRequest {
    /// The verb this request carries.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        match self {
            Self::Create { .. } => Verb::Create,
            Self::Read { .. } => Verb::Read,
            Self::Update { .. } => Verb::Update,
            Self::Delete { .. } => Verb::Delete,
            Self::Import { .. } => Verb::Import,
        }
    }

    /// Working directory the request targets, if known.
    #[must_use]
    pub fn working_dir(&self) -> Option<&str> {
        match self {
            Self::Create { planned } | Self::Update { planned, .. } => Some(&planned.working_dir),
            Self::Read { current } | Self::Delete { current } => Some(&current.working_dir),
            Self::Import { .. } => None,
        }
    }
}

/// Result of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The host should store this record.
    Stored(ApplyRecord),
    /// The host should drop the record.
    Removed,
}

impl LifecycleOutcome {
    /// The stored record, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&ApplyRecord> {
        match self {
            Self::Stored(record) => Some(record),
            Self::Removed => None,
        }
    }

    /// Consumes the outcome, returning the stored record if any.
    #[must_use]
    pub fn into_record(self) -> Option<ApplyRecord> {
        match self {
            Self::Stored(record) => Some(record),
            Self::Removed => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_and_working_dir() {
        let planned = ApplyRecord::new("A", vec![]);
        let update = LifecycleRequest::Update {
            prior: ApplyRecord::new("old", vec![]),
            planned,
        };
        assert_eq!(update.verb(), Verb::Update);
        assert_eq!(update.working_dir(), Some("A"));

        let import = LifecycleRequest::Import { id: String::from("x") };
        assert_eq!(import.verb(), Verb::Import);
        assert!(import.working_dir().is_none());
    }

    #[test]
    fn test_outcome_record() {
        let record = ApplyRecord::new("A", vec![]).with_id("d1");
        let stored = LifecycleOutcome::Stored(record.clone());
        assert_eq!(stored.record(), Some(&record));
        assert_eq!(LifecycleOutcome::Removed.into_record(), None);
    }
}
