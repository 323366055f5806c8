//! Diff engine for comparing declared units with stored records.
//!
//! The inputs (`working_dir` and `args`) drive the decision. The identity
//! value is never compared; a stored unit without one (a failed run left it
//! unknown) is re-provisioned.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::resource::{ApplyRecord, ATTR_ARGS, ATTR_ID, ATTR_WORKING_DIR};
use crate::state::ProviderState;

/// Shown in place of an identity that only apply can compute.
const ID_AFTER_APPLY: &str = "(known after apply)";

/// Engine for computing diffs between declared and stored units.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Directory relative working directories are resolved against.
    base_dir: PathBuf,
}

/// Difference for a single unit.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDiff {
    /// Unit name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Field-level changes.
    pub details: Vec<DiffDetail>,
    /// Declared record, if the unit is declared.
    pub desired: Option<ApplyRecord>,
    /// Stored record, if the unit is stored.
    pub stored: Option<ApplyRecord>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// Declared but never stored.
    Create,
    /// Stored with different inputs.
    Update,
    /// Stored with the same inputs; only the identity is refreshed.
    Refresh,
    /// Stored but no longer declared.
    Delete,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffDetail {
    /// Attribute that differs.
    pub field: String,
    /// Stored value.
    pub old_value: Option<String>,
    /// Declared value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Serialize)]
pub struct DiffResult {
    /// Declared units in declaration order, then undeclared stored units.
    pub diffs: Vec<ResourceDiff>,
    /// Number of units to create.
    pub creates: usize,
    /// Number of units to update.
    pub updates: usize,
    /// Number of units only refreshed.
    pub refreshes: usize,
    /// Number of units to forget.
    pub deletes: usize,
}

impl DiffEngine {
    /// Creates a diff engine resolving relative working directories against
    /// `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Computes the diff between the declared units and the stored state.
    #[must_use]
    pub fn compute_diff(
        &self,
        config: &ProviderConfig,
        state: Option<&ProviderState>,
    ) -> DiffResult {
        let mut diffs = Vec::new();
        let mut declared = HashSet::new();

        for unit in &config.units {
            declared.insert(unit.name.as_str());
            let desired = unit.to_record(&self.base_dir);
            let stored = state
                .and_then(|s| s.get_unit(&unit.name))
                .map(|u| u.record.clone());

            diffs.push(Self::compute_unit_diff(&unit.name, desired, stored));
        }

        if let Some(state) = state {
            for (name, unit) in &state.units {
                if !declared.contains(name.as_str()) {
                    debug!("Unit {name} is stored but no longer declared");
                    diffs.push(ResourceDiff {
                        name: name.clone(),
                        diff_type: DiffType::Delete,
                        details: vec![],
                        desired: None,
                        stored: Some(unit.record.clone()),
                    });
                }
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        let creates = count(DiffType::Create);
        let updates = count(DiffType::Update);
        let refreshes = count(DiffType::Refresh);
        let deletes = count(DiffType::Delete);

        DiffResult {
            diffs,
            creates,
            updates,
            refreshes,
            deletes,
        }
    }

    /// Computes the diff for a single declared unit.
    fn compute_unit_diff(
        name: &str,
        desired: ApplyRecord,
        stored: Option<ApplyRecord>,
    ) -> ResourceDiff {
        let Some(stored) = stored else {
            debug!("Unit {name} needs to be created");
            return ResourceDiff {
                name: name.to_string(),
                diff_type: DiffType::Create,
                details: vec![],
                desired: Some(desired),
                stored: None,
            };
        };

        let diff_type = if stored.same_inputs(&desired) && stored.id.is_some() {
            DiffType::Refresh
        } else {
            DiffType::Update
        };
        let details = Self::compute_detailed_diff(&stored, &desired);

        debug!("Unit {name}: {diff_type}");
        ResourceDiff {
            name: name.to_string(),
            diff_type,
            details,
            desired: Some(desired),
            stored: Some(stored),
        }
    }

    /// Field-level differences between the stored and declared inputs.
    fn compute_detailed_diff(stored: &ApplyRecord, desired: &ApplyRecord) -> Vec<DiffDetail> {
        let mut details = Vec::new();

        if stored.working_dir != desired.working_dir {
            details.push(DiffDetail {
                field: String::from(ATTR_WORKING_DIR),
                old_value: Some(stored.working_dir.clone()).filter(|s| !s.is_empty()),
                new_value: Some(desired.working_dir.clone()),
            });
        }

        if stored.args != desired.args {
            details.push(DiffDetail {
                field: String::from(ATTR_ARGS),
                old_value: Some(format!("{:?}", stored.args)),
                new_value: Some(format!("{:?}", desired.args)),
            });
        }

        if stored.id.is_none() {
            details.push(DiffDetail {
                field: String::from(ATTR_ID),
                old_value: None,
                new_value: Some(String::from(ID_AFTER_APPLY)),
            });
        }

        details
    }
}

impl DiffResult {
    /// Returns true if any unit is created, updated or forgotten.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.deletes > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Refresh => "refresh",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
