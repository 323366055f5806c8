//! Provisioning phases.

use serde::{Deserialize, Serialize};

/// Flag that makes `terraform apply` non-interactive.
pub const AUTO_APPROVE_FLAG: &str = "-auto-approve";

/// One step of the provisioning cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// `terraform init`.
    Init,
    /// `terraform apply -auto-approve <args>`.
    Apply,
}

impl Phase {
    /// Phases in the order they run.
    pub const CYCLE: [Self; 2] = [Self::Init, Self::Apply];

    /// Terraform subcommand for this phase.
    #[must_use]
    pub const fn subcommand(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Apply => "apply",
        }
    }

    /// Builds the argument vector passed to the terraform binary.
    ///
    /// `init` takes no caller arguments. `apply` appends them, unmodified and
    /// in order, after the fixed flags.
    #[must_use]
    pub fn command_line(self, args: &[String]) -> Vec<String> {
        match self {
            Self::Init => vec![self.subcommand().to_string()],
            Self::Apply => {
                let mut argv = Vec::with_capacity(args.len() + 2);
                argv.push(self.subcommand().to_string());
                argv.push(AUTO_APPROVE_FLAG.to_string());
                argv.extend(args.iter().cloned());
                argv
            }
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subcommand())
    }
}
