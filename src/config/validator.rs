//! Configuration validation.
//!
//! Checks the provider settings and every declared unit before anything is
//! run, collecting all problems instead of stopping at the first.

use crate::error::{ConfigError, PteraformError, Result};
use std::collections::HashSet;
use std::path::{Component, Path};
use tracing::debug;

use super::spec::{ProviderConfig, UnitConfig};

/// Longest accepted `timeout_secs`: one week.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Directory relative working directories are resolved against when
    /// checking they exist.
    base_dir: Option<std::path::PathBuf>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_dir: None }
    }

    /// Resolves relative working directories against `base_dir` when
    /// checking for their existence.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<std::path::PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Validates a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; all errors and warnings are in the
    /// returned result when validation passes.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let result = self.collect(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(PteraformError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and returns all findings.
    #[must_use]
    pub fn collect(&self, config: &ProviderConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_terraform(config, &mut result);
        Self::validate_state_file(&config.state_file, &mut result);
        Self::validate_timeout(config.timeout_secs, &mut result);
        self.validate_units(&config.units, &mut result);

        result
    }

    /// Validates the terraform executable settings.
    fn validate_terraform(config: &ProviderConfig, result: &mut ValidationResult) {
        if config.terraform.binary.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("terraform.binary"),
                message: String::from("Terraform binary cannot be empty"),
            });
        }

        for key in config.terraform.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                result.errors.push(ValidationError {
                    field: format!("terraform.env.{key}"),
                    message: format!("Invalid environment variable name '{key}'"),
                });
            }
        }
    }

    /// The state file must be a plain relative path that stays inside the
    /// working directory.
    fn validate_state_file(state_file: &str, result: &mut ValidationResult) {
        let path = Path::new(state_file);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if state_file.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("state_file"),
                message: String::from("State file name cannot be empty"),
            });
        } else if escapes {
            result.errors.push(ValidationError {
                field: String::from("state_file"),
                message: format!(
                    "State file '{state_file}' must be a relative path inside the working directory"
                ),
            });
        }
    }

    /// Validates the reconciliation timeout.
    fn validate_timeout(timeout_secs: Option<u64>, result: &mut ValidationResult) {
        match timeout_secs {
            Some(0) => result.errors.push(ValidationError {
                field: String::from("timeout_secs"),
                message: String::from("Timeout must be at least 1 second"),
            }),
            Some(secs) if secs > MAX_TIMEOUT_SECS => result.errors.push(ValidationError {
                field: String::from("timeout_secs"),
                message: format!("Timeout of {secs}s exceeds the maximum of {MAX_TIMEOUT_SECS}s"),
            }),
            _ => {}
        }
    }

    /// Validates all unit declarations.
    fn validate_units(&self, units: &[UnitConfig], result: &mut ValidationResult) {
        if units.is_empty() {
            result.warnings.push(String::from("No units defined in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, unit) in units.iter().enumerate() {
            let prefix = format!("units[{i}]");

            if seen_names.contains(&unit.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: ConfigError::DuplicateName {
                        name: unit.name.clone(),
                    }
                    .to_string(),
                });
            } else {
                seen_names.insert(&unit.name);
            }

            if !is_valid_name(&unit.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Unit name '{}' is invalid. Must start with a letter and contain only letters, digits, '_' or '-'.",
                        unit.name
                    ),
                });
            }

            if unit.working_dir.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.working_dir"),
                    message: format!("Unit '{}' has an empty working_dir", unit.name),
                });
            } else {
                self.check_working_dir(unit, &prefix, result);
            }

            for (j, arg) in unit.args.iter().enumerate() {
                if arg.contains('\0') {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.args[{j}]"),
                        message: String::from("Argument contains a NUL byte"),
                    });
                }
            }
        }
    }

    /// Missing directories only warn: terraform may be run after another
    /// step creates them.
    fn check_working_dir(&self, unit: &UnitConfig, prefix: &str, result: &mut ValidationResult) {
        let dir = Path::new(&unit.working_dir);
        let resolved = match &self.base_dir {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.to_path_buf(),
        };

        if !resolved.is_dir() {
            result.warnings.push(format!(
                "{prefix}.working_dir: '{}' does not exist yet",
                resolved.display()
            ));
        }
    }
}

/// Names must start with a letter and contain only ASCII letters, digits,
/// underscores and hyphens, like Terraform resource names.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(name: &str, working_dir: &str) -> UnitConfig {
        UnitConfig {
            name: name.to_string(),
            working_dir: working_dir.to_string(),
            args: vec![],
        }
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("first"));
        assert!(is_valid_name("network_core"));
        assert!(is_valid_name("app-2"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2nd"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("dot.name"));
    }

    #[test]
    fn test_valid_config_with_existing_dir() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir(dir.path().join("first")).expect("mkdir");
        let config = ProviderConfig {
            units: vec![unit("first", "first")],
            ..ProviderConfig::default()
        };

        let result = ConfigValidator::new()
            .with_base_dir(dir.path())
            .validate(&config)
            .expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_missing_dir_only_warns() {
        let dir = TempDir::new().expect("temp dir");
        let config = ProviderConfig {
            units: vec![unit("first", "not-there")],
            ..ProviderConfig::default()
        };

        let result = ConfigValidator::new()
            .with_base_dir(dir.path())
            .validate(&config)
            .expect("still valid");
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_duplicate_names() {
        let config = ProviderConfig {
            units: vec![unit("first", "a"), unit("first", "b")],
            ..ProviderConfig::default()
        };

        let result = ConfigValidator::new().collect(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "units[1].name");
    }

    #[test]
    fn test_escaping_state_file() {
        let mut config = ProviderConfig::default();
        config.state_file = String::from("../elsewhere.tfstate");
        assert!(ConfigValidator::new().validate(&config).is_err());

        config.state_file = String::from("/abs.tfstate");
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout_and_empty_binary() {
        let mut config = ProviderConfig::default();
        config.timeout_secs = Some(0);
        config.terraform.binary = String::new();

        let result = ConfigValidator::new().collect(&config);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["terraform.binary", "timeout_secs"]);
    }

    #[test]
    fn test_timeout_upper_bound() {
        let mut config = ProviderConfig::default();
        config.timeout_secs = Some(MAX_TIMEOUT_SECS);
        assert!(ConfigValidator::new().collect(&config).is_valid());

        config.timeout_secs = Some(u64::MAX);
        let result = ConfigValidator::new().collect(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "timeout_secs");
        assert!(result.errors[0].message.contains("exceeds the maximum"));
    }

    #[test]
    fn test_empty_working_dir() {
        let config = ProviderConfig {
            units: vec![unit("first", " ")],
            ..ProviderConfig::default()
        };
        let err = ConfigValidator::new().validate(&config).expect_err("empty dir");
        assert!(err.to_string().contains("empty working_dir"));
    }
}
