//! Configuration types for pteraform.
//!
//! These structs map to `pteraform.yaml`: how to invoke terraform, where the
//! state artifact lives, and which units the local driver manages.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityResolver, DEFAULT_STATE_FILE};
use crate::resource::ApplyRecord;
use crate::runner::{TerraformBinary, DEFAULT_TERRAFORM_BINARY};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// How to invoke terraform.
    #[serde(default)]
    pub terraform: TerraformConfig,
    /// State artifact file name, relative to each working directory.
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Upper bound on a single reconciliation, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Local record store.
    #[serde(default)]
    pub state: StateConfig,
    /// Units managed by the local driver.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// Terraform executable settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerraformConfig {
    /// Program name or path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Extra environment for every invocation.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Local record store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding `state.json`. Defaults to `.pteraform` next to the
    /// configuration file.
    #[serde(default)]
    pub path: Option<String>,
}

/// One declared `pteraform_apply` unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitConfig {
    /// Unique name.
    pub name: String,
    /// Directory to run terraform in.
    pub working_dir: String,
    /// Arguments for `terraform apply`.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

fn default_binary() -> String {
    DEFAULT_TERRAFORM_BINARY.to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            terraform: TerraformConfig::default(),
            state_file: default_state_file(),
            timeout_secs: None,
            state: StateConfig::default(),
            units: Vec::new(),
        }
    }
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            env: BTreeMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Terraform binary described by this configuration.
    #[must_use]
    pub fn binary(&self) -> TerraformBinary {
        TerraformBinary {
            program: self.terraform.binary.clone().into(),
            env: self.terraform.env.clone(),
        }
    }

    /// Identity resolver for the configured state file.
    #[must_use]
    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::with_state_file(&self.state_file)
    }

    /// Reconciliation timeout, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Looks up a unit by name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Names of all declared units, in declaration order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

impl UnitConfig {
    /// Desired record for this unit. Relative working directories are joined
    /// onto `base`.
    #[must_use]
    pub fn to_record(&self, base: &Path) -> ApplyRecord {
        let dir = Path::new(&self.working_dir);
        let working_dir = if dir.is_absolute() {
            self.working_dir.clone()
        } else {
            base.join(dir).display().to_string()
        };
        ApplyRecord::new(working_dir, self.args.clone())
    }
}
