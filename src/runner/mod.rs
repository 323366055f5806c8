//! Terraform invocation module.
//!
//! This module runs the provisioning cycle (`terraform init` followed by
//! `terraform apply -auto-approve`) in a working directory. Process spawning
//! sits behind the [`ProcessRunner`] trait so the reconciler can be driven by
//! a fake in tests.

mod context;
mod phase;
mod process;

pub use context::{CancelReason, ExecutionContext};
pub use phase::{Phase, AUTO_APPROVE_FLAG};
pub use process::{
    provision, PhaseOutput, ProcessRunner, TerraformBinary, TerraformRunner,
    DEFAULT_TERRAFORM_BINARY,
};

#[cfg(test)]
pub(crate) use process::MockProcessRunner;
