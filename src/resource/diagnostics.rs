//! Host-facing diagnostics.
//!
//! The host never sees a bare error: every failed request becomes a
//! [`Diagnostic`] attached to the unit, and the response carries no state.

use serde::Serialize;

use crate::error::{FailureKind, PteraformError};

use super::model::ApplyRecord;
use super::request::{LifecycleOutcome, Verb};

/// Summary used for every error diagnostic.
const CLIENT_ERROR: &str = "Client Error";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The request failed.
    Error,
    /// The request succeeded with a caveat.
    Warning,
}

/// A user-visible message attached to a managed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Short summary.
    pub summary: String,
    /// Full message.
    pub detail: String,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Describes `err` raised while serving `verb`.
    #[must_use]
    pub fn from_error(verb: Verb, err: &PteraformError) -> Self {
        let detail = match err.kind() {
            FailureKind::Invocation => {
                format!("Unable to run terraform apply, got error: {err}")
            }
            FailureKind::ArtifactNotFound | FailureKind::ArtifactRead => {
                format!("Unable to get ID, got error: {err}")
            }
            FailureKind::Cancellation => format!("Interrupted during {verb}: {err}"),
            _ => format!("Unable to {verb} resource, got error: {err}"),
        };
        Self::error(CLIENT_ERROR, detail)
    }
}

/// Response returned to the host for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceResponse {
    /// New state to store; `None` means drop the record, or that the
    /// request failed.
    pub state: Option<ApplyRecord>,
    /// Diagnostics raised while serving the request.
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourceResponse {
    /// Builds a response from a reconciliation result.
    #[must_use]
    pub fn from_result(verb: Verb, result: crate::error::Result<LifecycleOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                state: outcome.into_record(),
                diagnostics: Vec::new(),
            },
            Err(err) => Self {
                state: None,
                diagnostics: vec![Diagnostic::from_error(verb, &err)],
            },
        }
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{level}: {}: {}", self.summary, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdentityError, ProcessError};
    use crate::runner::Phase;
    use std::path::PathBuf;

    #[test]
    fn test_apply_failure_detail() {
        let err = PteraformError::from(ProcessError::Failed {
            phase: Phase::Apply,
            status: String::from("exit status: 1"),
            output: String::from("boom"),
        });
        let diag = Diagnostic::from_error(Verb::Create, &err);

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.summary, "Client Error");
        assert!(diag.detail.starts_with("Unable to run terraform apply, got error:"));
        assert!(diag.detail.contains("boom"));
    }

    #[test]
    fn test_missing_artifact_detail() {
        let err = PteraformError::from(IdentityError::ArtifactNotFound {
            path: PathBuf::from("A/terraform.tfstate"),
        });
        let diag = Diagnostic::from_error(Verb::Read, &err);
        assert!(diag.detail.starts_with("Unable to get ID"));
    }

    #[test]
    fn test_failed_response_carries_no_state() {
        let err = PteraformError::internal("nope");
        let response = ResourceResponse::from_result(Verb::Update, Err(err));
        assert!(response.state.is_none());
        assert!(response.has_error());
    }

    #[test]
    fn test_successful_response() {
        let record = ApplyRecord::new("A", vec![]).with_id("d1");
        let outcome = LifecycleOutcome::Stored(record.clone());
        let response = ResourceResponse::from_result(Verb::Create, Ok(outcome));
        assert_eq!(response.state, Some(record));
        assert!(!response.has_error());
    }
}
