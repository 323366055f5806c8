//! Attribute record for a managed unit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, Result};

/// Name of the working directory attribute.
pub const ATTR_WORKING_DIR: &str = "working_dir";

/// Name of the apply arguments attribute.
pub const ATTR_ARGS: &str = "args";

/// Name of the computed identity attribute.
pub const ATTR_ID: &str = "id";

/// Stored state of one `pteraform_apply` resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    /// Directory to run `terraform apply` in.
    #[serde(default)]
    pub working_dir: String,
    /// Arguments appended to `terraform apply -auto-approve`, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Digest of the last observed state artifact. Computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ApplyRecord {
    /// Creates a record with no identity yet.
    #[must_use]
    pub fn new(working_dir: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            args,
            id: None,
        }
    }

    /// Creates a record carrying only an imported identity.
    #[must_use]
    pub fn imported(id: impl Into<String>) -> Self {
        Self {
            working_dir: String::new(),
            args: Vec::new(),
            id: Some(id.into()),
        }
    }

    /// Returns the record with `id` replaced.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The working directory as a path.
    #[must_use]
    pub fn working_dir_path(&self) -> &Path {
        Path::new(&self.working_dir)
    }

    /// Returns true if `working_dir` and `args` match `other`. Identity is
    /// not compared.
    #[must_use]
    pub fn same_inputs(&self, other: &Self) -> bool {
        self.working_dir == other.working_dir && self.args == other.args
    }

    /// Checks that required attributes are present.
    ///
    /// # Errors
    ///
    /// Returns a resource error if `working_dir` is empty or an argument
    /// contains a NUL byte.
    pub fn validate(&self) -> Result<()> {
        if self.working_dir.trim().is_empty() {
            return Err(ResourceError::MissingAttribute {
                attribute: ATTR_WORKING_DIR,
            }
            .into());
        }

        if let Some(pos) = self.args.iter().position(|a| a.contains('\0')) {
            return Err(ResourceError::InvalidAttribute {
                attribute: ATTR_ARGS,
                message: format!("element {pos} contains a NUL byte"),
            }
            .into());
        }

        Ok(())
    }
}
