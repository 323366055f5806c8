//! Plan executor.
//!
//! Sends each planned request to the reconciler in order, folds the
//! responses into the stored state and records history. Actions run one at
//! a time so a failure can stop the rest of the plan.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::identity::short_identity;
use crate::reconciler::Reconciler;
use crate::resource::{Diagnostic, Verb};
use crate::runner::{ExecutionContext, ProcessRunner};
use crate::state::{HistoryEntry, ProviderState, StateStore};

use super::plan::{ExecutionPlan, PlannedAction};

/// Executor for execution plans.
pub struct PlanExecutor<'a, R: ProcessRunner> {
    /// Serves the requests.
    reconciler: &'a Reconciler<R>,
    /// Cancellation and deadline for the whole run.
    ctx: &'a ExecutionContext,
    /// Persists the state after every action, when set.
    store: Option<&'a dyn StateStore>,
    /// Whether to continue on errors.
    continue_on_error: bool,
}

/// Result of executing a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Unit name.
    pub unit: String,
    /// Verb that was sent.
    pub verb: Verb,
    /// Whether the action succeeded.
    pub success: bool,
    /// Stored identity after the action, if any.
    pub id: Option<String>,
    /// Diagnostics returned by the reconciler.
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of executing the entire plan.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions executed.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions never started.
    pub skipped: usize,
    /// Whether the run was interrupted by cancellation.
    pub cancelled: bool,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a, R: ProcessRunner> PlanExecutor<'a, R> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(reconciler: &'a Reconciler<R>, ctx: &'a ExecutionContext) -> Self {
        Self {
            reconciler,
            ctx,
            store: None,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Saves the state to `store` after every action.
    #[must_use]
    pub const fn with_store(mut self, store: &'a dyn StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Executes a plan against `state`.
    ///
    /// A failed action keeps the stored inputs but drops the stored
    /// identity, so the unit is re-provisioned by the next plan.
    /// Cancellation stops the run even with `continue_on_error`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state cannot be saved.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        state: &mut ProviderState,
    ) -> crate::error::Result<ExecutionResult> {
        info!("Executing plan with {} actions", plan.actions.len());

        let mut results = Vec::new();
        let mut cancelled = false;

        for (idx, action) in plan.actions.iter().enumerate() {
            if let Some(reason) = self.ctx.check() {
                warn!("Stopping before action {idx}: {reason}");
                cancelled = true;
                break;
            }

            let result = self.execute_action(idx, action, state).await;
            let failed = !result.success;
            results.push(result);

            if let Some(store) = self.store {
                store.save(state).await?;
            }

            if failed {
                if self.ctx.check().is_some() {
                    cancelled = true;
                    break;
                }
                if !self.continue_on_error {
                    break;
                }
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let skipped = plan.actions.len() - results.len();

        Ok(ExecutionResult {
            total_executed: results.len(),
            successful,
            failed,
            skipped,
            cancelled,
            success: failed == 0 && skipped == 0,
            results,
        })
    }

    /// Executes a single action and applies its response to `state`.
    async fn execute_action(
        &self,
        index: usize,
        action: &PlannedAction,
        state: &mut ProviderState,
    ) -> ActionResult {
        info!("Executing action {}: {}", index, action.description());

        let mut response = self.reconciler.handle(action.request.clone(), self.ctx).await;

        if response.has_error() {
            let message = response
                .diagnostics
                .iter()
                .map(|d| d.detail.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            error!("{} failed: {}", action.description(), message);
            if let Some(previous) = state.clear_identity(&action.unit) {
                warn!(
                    "Dropped identity {} of {}",
                    short_identity(&previous),
                    action.unit
                );
            }
            state.add_history(HistoryEntry::failed(&action.unit, action.verb, &message));

            return ActionResult {
                index,
                unit: action.unit.clone(),
                verb: action.verb,
                success: false,
                id: None,
                diagnostics: response.diagnostics,
            };
        }

        let id = match response.state.take() {
            Some(record) => {
                let id = record.id.clone();
                state.set_unit(&action.unit, record, action.verb);
                id
            }
            None => {
                state.remove_unit(&action.unit);
                response.diagnostics.push(Diagnostic::warning(
                    "Unit forgotten",
                    format!(
                        "'{}' was removed from state; terraform destroy was not run",
                        action.unit
                    ),
                ));
                None
            }
        };

        state.add_history(HistoryEntry::succeeded(&action.unit, action.verb, id.clone()));

        ActionResult {
            index,
            unit: action.unit.clone(),
            verb: action.verb,
            success: true,
            id,
            diagnostics: response.diagnostics,
        }
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, UnitConfig};
    use crate::error::{ProcessError, Result};
    use crate::identity::{digest, DEFAULT_STATE_FILE};
    use crate::planner::DiffEngine;
    use crate::resource::{ApplyRecord, Severity};
    use crate::runner::{Phase, PhaseOutput};
    use crate::state::LocalStateStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a state artifact named after the arguments; fails units whose
    /// directory name starts with `bad`.
    #[derive(Debug, Default)]
    struct FakeTerraform {
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProcessRunner for FakeTerraform {
        async fn run(
            &self,
            working_dir: &Path,
            phase: Phase,
            args: &[String],
            _ctx: &ExecutionContext,
        ) -> Result<PhaseOutput> {
            let name = working_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with("bad") {
                return Err(ProcessError::Failed {
                    phase,
                    status: String::from("exit status: 1"),
                    output: String::from("broken configuration"),
                }
                .into());
            }
            if phase == Phase::Apply {
                self.applied.lock().expect("lock").push(name);
                std::fs::write(working_dir.join(DEFAULT_STATE_FILE), args.join(" "))?;
            }
            Ok(PhaseOutput {
                phase,
                output: String::new(),
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        reconciler: Reconciler<FakeTerraform>,
    }

    impl Fixture {
        fn new(dirs: &[&str]) -> Self {
            let dir = TempDir::new().expect("temp dir");
            for d in dirs {
                std::fs::create_dir(dir.path().join(d)).expect("mkdir");
            }
            Self {
                dir,
                reconciler: Reconciler::new(FakeTerraform::default()),
            }
        }

        fn config(&self, units: &[(&str, &[&str])]) -> ProviderConfig {
            ProviderConfig {
                units: units
                    .iter()
                    .map(|(name, args)| UnitConfig {
                        name: (*name).to_string(),
                        working_dir: (*name).to_string(),
                        args: args.iter().map(|a| (*a).to_string()).collect(),
                    })
                    .collect(),
                ..ProviderConfig::default()
            }
        }

        fn plan(&self, config: &ProviderConfig, state: &ProviderState) -> ExecutionPlan {
            let diff = DiffEngine::new(self.dir.path()).compute_diff(config, Some(state));
            ExecutionPlan::from_diff(&diff)
        }

        fn applied(&self) -> Vec<String> {
            self.reconciler.runner().applied.lock().expect("lock").clone()
        }
    }

    #[tokio::test]
    async fn test_create_then_refresh() {
        let fx = Fixture::new(&["first"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let config = fx.config(&[("first", &["-var=x=1"])]);
        let mut state = ProviderState::new();

        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");
        assert!(result.all_successful());
        let stored = state.get_unit("first").expect("stored");
        assert_eq!(stored.record.id.as_deref(), Some(digest(b"-var=x=1").as_str()));
        assert_eq!(stored.last_verb, Verb::Create);

        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");
        assert_eq!(result.results[0].verb, Verb::Read);
        assert_eq!(fx.applied(), vec![String::from("first")]);
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_update_changes_identity() {
        let fx = Fixture::new(&["first"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let mut state = ProviderState::new();

        let cool = fx.config(&[("first", &["-var=value=cool"])]);
        executor.execute(&fx.plan(&cool, &state), &mut state).await.expect("create");
        let d1 = state.get_unit("first").and_then(|u| u.record.id.clone());

        let neat = fx.config(&[("first", &["-var=value=neat"])]);
        let result = executor.execute(&fx.plan(&neat, &state), &mut state).await.expect("update");
        let d2 = state.get_unit("first").and_then(|u| u.record.id.clone());

        assert_eq!(result.results[0].verb, Verb::Update);
        assert!(d1.is_some() && d2.is_some());
        assert_ne!(d1, d2);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let fx = Fixture::new(&["bad", "good"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let config = fx.config(&[("bad", &[]), ("good", &[])]);
        let mut state = ProviderState::new();

        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");

        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(!result.success);
        assert!(state.get_unit("bad").is_none());
        assert!(state.get_unit("good").is_none());
        assert_eq!(result.results[0].diagnostics[0].severity, Severity::Error);
        assert!(!state.history[0].success);
    }

    #[tokio::test]
    async fn test_continue_on_error() {
        let fx = Fixture::new(&["bad", "good"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx).with_continue_on_error(true);
        let config = fx.config(&[("bad", &[]), ("good", &[])]);
        let mut state = ProviderState::new();

        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");

        assert_eq!(result.failed, 1);
        assert_eq!(result.successful, 1);
        assert!(state.get_unit("good").is_some());
    }

    #[tokio::test]
    async fn test_failed_update_drops_identity() {
        let fx = Fixture::new(&["bad"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let mut state = ProviderState::new();
        let dir = fx.dir.path().join("bad").display().to_string();
        state.set_unit("bad", ApplyRecord::new(dir.clone(), vec![]).with_id("d0"), Verb::Create);

        let config = fx.config(&[("bad", &["-var=x=2"])]);
        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");

        assert_eq!(result.results[0].verb, Verb::Update);
        assert!(!result.results[0].success);
        assert!(result.results[0].id.is_none());

        let unit = state.get_unit("bad").expect("inputs kept");
        assert!(unit.record.id.is_none());
        assert_eq!(unit.record.working_dir, dir);
        assert!(unit.record.args.is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_drops_identity_and_reprovisions() {
        let fx = Fixture::new(&["first"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let mut state = ProviderState::new();
        let dir = fx.dir.path().join("first").display().to_string();
        state.set_unit("first", ApplyRecord::new(dir, vec![]).with_id("d0_previous"), Verb::Create);

        // No terraform.tfstate in the directory, so the refresh fails.
        let config = fx.config(&[("first", &[])]);
        let result = executor
            .execute(&fx.plan(&config, &state), &mut state)
            .await
            .expect("execute");

        assert_eq!(result.results[0].verb, Verb::Read);
        assert!(!result.results[0].success);
        assert!(result.results[0].id.is_none());
        assert!(state.get_unit("first").and_then(|u| u.record.id.clone()).is_none());

        let plan = fx.plan(&config, &state);
        assert_eq!(plan.actions[0].verb, Verb::Update);
        let result = executor.execute(&plan, &mut state).await.expect("execute");
        assert!(result.all_successful());
        assert_eq!(
            state.get_unit("first").and_then(|u| u.record.id.clone()),
            Some(digest(b""))
        );
    }

    #[tokio::test]
    async fn test_delete_forgets_with_warning() {
        let fx = Fixture::new(&["first"]);
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx);
        let mut state = ProviderState::new();
        executor
            .execute(&fx.plan(&fx.config(&[("first", &[])]), &state), &mut state)
            .await
            .expect("create");
        let artifact = fx.dir.path().join("first").join(DEFAULT_STATE_FILE);
        assert!(artifact.exists());

        let result = executor
            .execute(&fx.plan(&fx.config(&[]), &state), &mut state)
            .await
            .expect("delete");

        assert_eq!(result.results[0].verb, Verb::Delete);
        assert_eq!(result.results[0].diagnostics[0].severity, Severity::Warning);
        assert!(state.get_unit("first").is_none());
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new(&["first"]);
        let ctx = ExecutionContext::new();
        ctx.cancel();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx).with_continue_on_error(true);
        let mut state = ProviderState::new();

        let result = executor
            .execute(&fx.plan(&fx.config(&[("first", &[])]), &state), &mut state)
            .await
            .expect("execute");

        assert!(result.cancelled);
        assert_eq!(result.skipped, 1);
        assert!(fx.applied().is_empty());
    }

    #[tokio::test]
    async fn test_saves_after_each_action() {
        let fx = Fixture::new(&["first"]);
        let store = LocalStateStore::with_base_dir(fx.dir.path().join(".pteraform"));
        let ctx = ExecutionContext::new();
        let executor = PlanExecutor::new(&fx.reconciler, &ctx).with_store(&store);
        let mut state = ProviderState::new();

        executor
            .execute(&fx.plan(&fx.config(&[("first", &[])]), &state), &mut state)
            .await
            .expect("execute");

        let saved = store.load().await.expect("load").expect("saved");
        assert_eq!(saved.get_unit("first"), state.get_unit("first"));
    }
}
