//! Reconciler for a single managed unit.
//!
//! This module maps the host's lifecycle requests onto the provisioning
//! cycle and the identity resolver. It keeps no state between calls: every
//! request carries the records it needs and gets back the record to store.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identity::{short_identity, IdentityResolver};
use crate::resource::{ApplyRecord, LifecycleOutcome, LifecycleRequest, ResourceResponse};
use crate::runner::{provision, ExecutionContext, ProcessRunner};

/// Serves lifecycle requests for `pteraform_apply` units.
#[derive(Debug)]
pub struct Reconciler<R: ProcessRunner> {
    /// Runs terraform.
    runner: R,
    /// Turns a working directory into an identity.
    resolver: IdentityResolver,
}

impl<R: ProcessRunner> Reconciler<R> {
    /// Creates a reconciler using the default `terraform.tfstate` resolver.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self::with_resolver(runner, IdentityResolver::new())
    }

    /// Creates a reconciler with a custom resolver.
    #[must_use]
    pub const fn with_resolver(runner: R, resolver: IdentityResolver) -> Self {
        Self { runner, resolver }
    }

    /// The process runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// The identity resolver.
    #[must_use]
    pub const fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Serves one request.
    ///
    /// # Errors
    ///
    /// Returns the first failure from validation, either terraform phase,
    /// identity resolution, or cancellation. Nothing is retried and no
    /// identity is returned on failure.
    pub async fn reconcile(
        &self,
        request: LifecycleRequest,
        ctx: &ExecutionContext,
    ) -> Result<LifecycleOutcome> {
        let verb = request.verb();
        debug!("Serving {} for {:?}", verb, request.working_dir());

        let outcome = match request {
            LifecycleRequest::Create { planned } => {
                LifecycleOutcome::Stored(self.apply(planned, ctx).await?)
            }
            LifecycleRequest::Read { current } => {
                LifecycleOutcome::Stored(self.read(current, ctx).await?)
            }
            LifecycleRequest::Update { prior, planned } => {
                debug!(
                    "Updating {} (prior identity {})",
                    planned.working_dir,
                    prior.id.as_deref().map_or_else(|| String::from("none"), short_identity)
                );
                LifecycleOutcome::Stored(self.apply(planned, ctx).await?)
            }
            LifecycleRequest::Delete { current } => {
                info!("Forgetting {}; nothing is destroyed", current.working_dir);
                LifecycleOutcome::Removed
            }
            LifecycleRequest::Import { id } => {
                info!("Importing identity {}", short_identity(&id));
                LifecycleOutcome::Stored(ApplyRecord::imported(id))
            }
        };

        Ok(outcome)
    }

    /// Serves one request and folds any error into a diagnostic.
    pub async fn handle(
        &self,
        request: LifecycleRequest,
        ctx: &ExecutionContext,
    ) -> ResourceResponse {
        let verb = request.verb();
        let result = self.reconcile(request, ctx).await;
        if let Err(e) = &result {
            warn!("{} failed: {}", verb, e);
        }
        ResourceResponse::from_result(verb, result)
    }

    /// Create and update: full cycle, then identity.
    async fn apply(&self, mut planned: ApplyRecord, ctx: &ExecutionContext) -> Result<ApplyRecord> {
        planned.validate()?;
        let working_dir = planned.working_dir_path();

        info!("Provisioning {}", working_dir.display());
        provision(&self.runner, working_dir, &planned.args, ctx).await?;

        let id = self.resolver.resolve(working_dir, ctx).await?;
        planned.id = Some(id);
        Ok(planned)
    }

    /// Read: identity only, terraform is never invoked.
    async fn read(&self, mut current: ApplyRecord, ctx: &ExecutionContext) -> Result<ApplyRecord> {
        current.validate()?;

        let id = self.resolver.resolve(current.working_dir_path(), ctx).await?;
        if current.id.as_deref() != Some(id.as_str()) {
            info!(
                "Identity of {} changed to {}",
                current.working_dir,
                short_identity(&id)
            );
        }
        current.id = Some(id);
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, ProcessError, PteraformError};
    use crate::identity::{digest, DEFAULT_STATE_FILE};
    use crate::runner::{CancelReason, MockProcessRunner, Phase, PhaseOutput};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    /// Records every call and, on apply, writes the arguments as the state
    /// artifact so different arguments give different identities.
    #[derive(Debug, Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(Phase, Vec<String>)>>,
        fail: Option<Phase>,
        hang_apply: bool,
    }

    impl RecordingRunner {
        fn failing(phase: Phase) -> Self {
            Self {
                fail: Some(phase),
                ..Self::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hang_apply: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(Phase, Vec<String>)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(
            &self,
            working_dir: &Path,
            phase: Phase,
            args: &[String],
            ctx: &ExecutionContext,
        ) -> Result<PhaseOutput> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((phase, args.to_vec()));

            if self.fail == Some(phase) {
                return Err(ProcessError::Failed {
                    phase,
                    status: String::from("exit status: 1"),
                    output: format!("{phase} blew up"),
                }
                .into());
            }

            if phase == Phase::Apply {
                if self.hang_apply {
                    let reason = ctx.done().await;
                    return Err(PteraformError::cancelled("terraform apply", reason));
                }
                let state = format!("{{\"args\": {args:?}}}");
                std::fs::write(working_dir.join(DEFAULT_STATE_FILE), state)?;
            }

            Ok(PhaseOutput {
                phase,
                output: String::new(),
            })
        }
    }

    fn dir_string(dir: &TempDir) -> String {
        dir.path().display().to_string()
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|e| {
                let e = e.expect("entry");
                (
                    e.file_name().to_string_lossy().into_owned(),
                    std::fs::read(e.path()).unwrap_or_default(),
                )
            })
            .collect();
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn test_create_then_update_changes_identity() {
        let work = TempDir::new().expect("work dir");
        let runner = Arc::new(RecordingRunner::default());
        let reconciler = Reconciler::new(Arc::clone(&runner));
        let ctx = ExecutionContext::new();

        let created = reconciler
            .reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&work), vec![]),
                },
                &ctx,
            )
            .await
            .expect("create")
            .into_record()
            .expect("stored");
        let d1 = created.id.clone().expect("identity after create");

        let state = std::fs::read(work.path().join(DEFAULT_STATE_FILE)).expect("state");
        assert_eq!(d1, digest(&state));

        let planned = ApplyRecord::new(dir_string(&work), vec![String::from("-var=value=cool")]);
        let updated = reconciler
            .reconcile(LifecycleRequest::Update { prior: created, planned }, &ctx)
            .await
            .expect("update")
            .into_record()
            .expect("stored");
        let d2 = updated.id.clone().expect("identity after update");

        assert_ne!(d1, d2);
        assert_eq!(updated.args, vec!["-var=value=cool"]);
        assert_eq!(
            runner.calls(),
            vec![
                (Phase::Init, vec![]),
                (Phase::Apply, vec![]),
                (Phase::Init, vec![]),
                (Phase::Apply, vec![String::from("-var=value=cool")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_always_reruns_cycle() {
        let work = TempDir::new().expect("work dir");
        let runner = Arc::new(RecordingRunner::default());
        let reconciler = Reconciler::new(Arc::clone(&runner));
        let record = ApplyRecord::new(dir_string(&work), vec![]).with_id("stale");

        let outcome = reconciler
            .reconcile(
                LifecycleRequest::Update {
                    prior: record.clone(),
                    planned: record,
                },
                &ExecutionContext::new(),
            )
            .await;

        assert_ok!(outcome);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_gates_apply() {
        let work = TempDir::new().expect("work dir");
        let runner = Arc::new(RecordingRunner::failing(Phase::Init));
        let reconciler = Reconciler::new(Arc::clone(&runner));

        let err = reconciler
            .reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&work), vec![]),
                },
                &ExecutionContext::new(),
            )
            .await
            .expect_err("init fails");

        assert_eq!(err.phase(), Some(Phase::Init));
        assert_eq!(runner.calls(), vec![(Phase::Init, vec![])]);
    }

    #[tokio::test]
    async fn test_init_failure_with_mock_never_applies() {
        let work = TempDir::new().expect("work dir");
        let mut mock = MockProcessRunner::new();
        mock.expect_run()
            .withf(|_, phase, args, _| *phase == Phase::Init && args.is_empty())
            .times(1)
            .returning(|_, phase, _, _| {
                Err(ProcessError::Failed {
                    phase,
                    status: String::from("exit status: 1"),
                    output: String::from("no backend"),
                }
                .into())
            });
        mock.expect_run()
            .withf(|_, phase, _, _| *phase == Phase::Apply)
            .times(0);

        let reconciler = Reconciler::new(mock);
        let err = reconciler
            .reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&work), vec![String::from("-x")]),
                },
                &ExecutionContext::new(),
            )
            .await
            .expect_err("init fails");

        assert_eq!(err.kind(), FailureKind::Invocation);
        assert!(err.to_string().contains("terraform init failed"));
    }

    #[tokio::test]
    async fn test_apply_without_artifact_is_not_found() {
        let work = TempDir::new().expect("work dir");
        let mut mock = MockProcessRunner::new();
        mock.expect_run().times(2).returning(|_, phase, _, _| {
            Ok(PhaseOutput {
                phase,
                output: String::new(),
            })
        });

        let err = Reconciler::new(mock)
            .reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&work), vec![]),
                },
                &ExecutionContext::new(),
            )
            .await
            .expect_err("no artifact");

        assert_eq!(err.kind(), FailureKind::ArtifactNotFound);
    }

    #[tokio::test]
    async fn test_create_requires_working_dir() {
        let runner = Arc::new(RecordingRunner::default());
        let reconciler = Reconciler::new(Arc::clone(&runner));

        let result = reconciler
            .reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new("", vec![]),
                },
                &ExecutionContext::new(),
            )
            .await;

        let err = assert_err!(result);
        assert_eq!(err.kind(), FailureKind::InvalidAttribute);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_does_not_provision_and_is_idempotent() {
        let work = TempDir::new().expect("work dir");
        std::fs::write(work.path().join(DEFAULT_STATE_FILE), b"{\"serial\": 3}").expect("write");
        let runner = Arc::new(RecordingRunner::default());
        let reconciler = Reconciler::new(Arc::clone(&runner));
        let ctx = ExecutionContext::new();
        let current = ApplyRecord::new(dir_string(&work), vec![]).with_id("stale");

        let first = reconciler
            .reconcile(LifecycleRequest::Read { current: current.clone() }, &ctx)
            .await
            .expect("first read");
        let second = reconciler
            .reconcile(LifecycleRequest::Read { current }, &ctx)
            .await
            .expect("second read");

        assert_eq!(first, second);
        assert_eq!(
            first.record().and_then(|r| r.id.clone()),
            Some(digest(b"{\"serial\": 3}"))
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_artifact_does_not_report_stale_identity() {
        let work = TempDir::new().expect("work dir");
        let reconciler = Reconciler::new(RecordingRunner::default());
        let current = ApplyRecord::new(dir_string(&work), vec![]).with_id("previous");

        let response = reconciler
            .handle(LifecycleRequest::Read { current }, &ExecutionContext::new())
            .await;

        assert!(response.state.is_none());
        assert!(response.has_error());
        assert!(response.diagnostics[0].detail.contains("Unable to get ID"));
    }

    #[tokio::test]
    async fn test_delete_is_a_noop() {
        let work = TempDir::new().expect("work dir");
        std::fs::write(work.path().join(DEFAULT_STATE_FILE), b"state").expect("write");
        let before = snapshot(work.path());

        let mut mock = MockProcessRunner::new();
        mock.expect_run().times(0);
        let reconciler = Reconciler::new(mock);

        let outcome = reconciler
            .reconcile(
                LifecycleRequest::Delete {
                    current: ApplyRecord::new(dir_string(&work), vec![]).with_id("x"),
                },
                &ExecutionContext::new(),
            )
            .await
            .expect("delete");

        assert_eq!(outcome, LifecycleOutcome::Removed);
        assert_eq!(snapshot(work.path()), before);
    }

    #[tokio::test]
    async fn test_import_then_read() {
        let work = TempDir::new().expect("work dir");
        std::fs::write(work.path().join(DEFAULT_STATE_FILE), b"adopted").expect("write");
        let reconciler = Reconciler::new(RecordingRunner::default());
        let ctx = ExecutionContext::new();

        let imported = reconciler
            .reconcile(LifecycleRequest::Import { id: String::from("external") }, &ctx)
            .await
            .expect("import")
            .into_record()
            .expect("stored");
        assert_eq!(imported, ApplyRecord::imported("external"));

        // The host fills in the working directory after import.
        let current = ApplyRecord {
            working_dir: dir_string(&work),
            ..imported
        };
        let refreshed = reconciler
            .reconcile(LifecycleRequest::Read { current }, &ctx)
            .await
            .expect("read")
            .into_record()
            .expect("stored");
        assert_eq!(refreshed.id, Some(digest(b"adopted")));
    }

    #[tokio::test]
    async fn test_cancel_mid_apply() {
        let work = TempDir::new().expect("work dir");
        let runner = Arc::new(RecordingRunner::hanging());
        let reconciler = Reconciler::new(Arc::clone(&runner));
        let ctx = ExecutionContext::new();

        let trigger = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            reconciler.reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&work), vec![]),
                },
                &ctx,
            ),
        )
        .await
        .expect("reconcile should return promptly");

        let err = assert_err!(result);
        assert!(matches!(
            err,
            PteraformError::Cancelled { reason: CancelReason::Cancelled, .. }
        ));
        assert!(!work.path().join(DEFAULT_STATE_FILE).exists());
    }

    #[tokio::test]
    async fn test_independent_units_reconcile_concurrently() {
        let a = TempDir::new().expect("a");
        let b = TempDir::new().expect("b");
        let reconciler = Reconciler::new(RecordingRunner::default());
        let ctx = ExecutionContext::new();

        let (ra, rb) = tokio::join!(
            reconciler.reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&a), vec![String::from("-var=a=1")]),
                },
                &ctx,
            ),
            reconciler.reconcile(
                LifecycleRequest::Create {
                    planned: ApplyRecord::new(dir_string(&b), vec![String::from("-var=b=2")]),
                },
                &ctx,
            ),
        );

        let ida = ra.expect("a").into_record().and_then(|r| r.id);
        let idb = rb.expect("b").into_record().and_then(|r| r.id);
        assert!(ida.is_some());
        assert_ne!(ida, idb);
    }
}
