//! Execution plan types and construction.
//!
//! A plan is the ordered list of lifecycle requests the local driver will
//! send to the reconciler, one per unit.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resource::{ApplyRecord, LifecycleRequest, Verb};

use super::diff::{DiffResult, DiffType};

/// A complete execution plan.
#[derive(Debug, Serialize)]
pub struct ExecutionPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Unit name.
    pub unit: String,
    /// Verb sent to the reconciler.
    pub verb: Verb,
    /// Reason for this action.
    pub reason: String,
    /// The request itself.
    #[serde(skip)]
    pub request: LifecycleRequest,
}

impl ExecutionPlan {
    /// Creates a plan that brings every declared unit in line.
    ///
    /// Forgotten units go first, then declared units in declaration order.
    /// Unchanged units are read so their identity stays current.
    #[must_use]
    pub fn from_diff(diff: &DiffResult) -> Self {
        let mut actions = Vec::new();

        for resource_diff in &diff.diffs {
            if resource_diff.diff_type == DiffType::Delete {
                if let Some(current) = &resource_diff.stored {
                    actions.push(PlannedAction {
                        unit: resource_diff.name.clone(),
                        verb: Verb::Delete,
                        reason: String::from("Unit removed from configuration"),
                        request: LifecycleRequest::Delete {
                            current: current.clone(),
                        },
                    });
                }
            }
        }

        for resource_diff in &diff.diffs {
            let Some(planned) = resource_diff.desired.clone() else {
                continue;
            };

            let action = match (resource_diff.diff_type, &resource_diff.stored) {
                (DiffType::Create, _) | (_, None) => PlannedAction {
                    unit: resource_diff.name.clone(),
                    verb: Verb::Create,
                    reason: String::from("Unit declared in configuration"),
                    request: LifecycleRequest::Create { planned },
                },
                (DiffType::Update, Some(prior)) => PlannedAction {
                    unit: resource_diff.name.clone(),
                    verb: Verb::Update,
                    reason: format!("{} changed", Self::changed_fields(resource_diff)),
                    request: LifecycleRequest::Update {
                        planned: Self::carry_identity(planned, prior),
                        prior: prior.clone(),
                    },
                },
                (_, Some(current)) => PlannedAction {
                    unit: resource_diff.name.clone(),
                    verb: Verb::Read,
                    reason: String::from("Refresh identity"),
                    request: LifecycleRequest::Read {
                        current: current.clone(),
                    },
                },
            };
            actions.push(action);
        }

        Self {
            created_at: Utc::now(),
            actions,
        }
    }

    /// Creates a plan that only re-reads the identity of stored units.
    ///
    /// Terraform is never run, whatever the configuration says.
    #[must_use]
    pub fn refresh_only(diff: &DiffResult) -> Self {
        let actions = diff
            .diffs
            .iter()
            .filter_map(|d| {
                d.stored.as_ref().map(|current| PlannedAction {
                    unit: d.name.clone(),
                    verb: Verb::Read,
                    reason: String::from("Refresh identity"),
                    request: LifecycleRequest::Read {
                        current: current.clone(),
                    },
                })
            })
            .collect();

        Self {
            created_at: Utc::now(),
            actions,
        }
    }

    /// Until the new identity is computed the planned record keeps the
    /// previous one.
    fn carry_identity(mut planned: ApplyRecord, prior: &ApplyRecord) -> ApplyRecord {
        planned.id.clone_from(&prior.id);
        planned
    }

    fn changed_fields(diff: &super::diff::ResourceDiff) -> String {
        diff.details
            .iter()
            .map(|d| d.field.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns true if the plan is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions with the given verb.
    #[must_use]
    pub fn count(&self, verb: Verb) -> usize {
        self.actions.iter().filter(|a| a.verb == verb).count()
    }

    /// Returns the number of actions that run terraform or forget a unit.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.actions.iter().filter(|a| a.verb != Verb::Read).count()
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.verb {
            Verb::Create => format!("Create '{}'", self.unit),
            Verb::Read => format!("Refresh '{}'", self.unit),
            Verb::Update => format!("Update '{}'", self.unit),
            Verb::Delete => format!("Forget '{}'", self.unit),
            Verb::Import => format!("Import '{}'", self.unit),
        }
    }

    /// Working directory the action targets, if known.
    #[must_use]
    pub fn working_dir(&self) -> Option<&str> {
        self.request.working_dir()
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb, self.unit)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No units declared");
        }

        writeln!(f, "Execution Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}
