//! The `pteraform_apply` resource.
//!
//! This module holds the attribute record stored by the host, the lifecycle
//! requests the host issues against it, the attribute schema, and the
//! diagnostics returned when a request fails.

mod diagnostics;
mod model;
mod request;
mod schema;

pub use diagnostics::{Diagnostic, ResourceResponse, Severity};
pub use model::{ApplyRecord, ATTR_ARGS, ATTR_ID, ATTR_WORKING_DIR};
pub use request::{LifecycleOutcome, LifecycleRequest, Verb};
pub use schema::{
    apply_resource_schema, AttributeKind, AttributeMode, AttributeSchema, PlanModifier,
    ResourceSchema, PROVIDER_TYPE_NAME, RESOURCE_TYPE_SUFFIX,
};
