// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Pteraform
//!
//! Runs `terraform apply` as a managed resource of an outer orchestrator.
//!
//! ## Overview
//!
//! A `pteraform_apply` unit names a working directory holding a complete
//! Terraform configuration, plus optional extra arguments. Reconciling the
//! unit runs `terraform init` followed by `terraform apply -auto-approve`
//! in that directory and stores the SHA-256 of the resulting
//! `terraform.tfstate` as the unit's identity:
//!
//! - **Create / Update**: run the full cycle, then compute the identity
//! - **Read**: recompute the identity only, terraform is not run
//! - **Delete**: forget the unit, nothing is destroyed
//! - **Import**: adopt a unit from a caller-supplied identity
//!
//! ## Modules
//!
//! - [`runner`]: Spawning terraform phases under cancellation
//! - [`identity`]: State artifact digests
//! - [`resource`]: Records, lifecycle requests, schema and diagnostics
//! - [`reconciler`]: Lifecycle request dispatch
//! - [`config`]: Configuration parsing and validation
//! - [`state`]: Local state store for the bundled driver
//! - [`planner`]: Diff computation and plan execution
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! terraform:
//!   binary: terraform
//! timeout_secs: 1800
//!
//! units:
//!   - name: network
//!     working_dir: stacks/network
//!   - name: app
//!     working_dir: stacks/app
//!     args: ["-var=value=cool"]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod runner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ProviderConfig};
pub use error::{PteraformError, Result};
pub use identity::IdentityResolver;
pub use planner::{DiffEngine, ExecutionPlan, PlanExecutor};
pub use reconciler::Reconciler;
pub use resource::{ApplyRecord, LifecycleOutcome, LifecycleRequest, ResourceResponse};
pub use runner::{ExecutionContext, ProcessRunner, TerraformRunner};
pub use state::{LocalStateStore, ProviderState, StateStore};
