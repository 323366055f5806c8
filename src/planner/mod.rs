//! Planning module for the local driver.
//!
//! This module compares declared units with the stored state, turns the
//! result into lifecycle requests and runs them through the reconciler.

mod diff;
mod plan;
mod executor;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use plan::{ExecutionPlan, PlannedAction};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
