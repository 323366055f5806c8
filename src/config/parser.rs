//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, PteraformError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProviderConfig;

/// Overrides `terraform.binary`.
pub const ENV_TERRAFORM_BINARY: &str = "PTERAFORM_TERRAFORM_BINARY";

/// Overrides `state_file`.
pub const ENV_STATE_FILE: &str = "PTERAFORM_STATE_FILE";

/// Overrides `timeout_secs`.
pub const ENV_TIMEOUT_SECS: &str = "PTERAFORM_TIMEOUT_SECS";

/// Overrides `state.path`.
pub const ENV_STATE_PATH: &str = "PTERAFORM_STATE_PATH";

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(PteraformError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PteraformError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        let config: ProviderConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            PteraformError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration with {} unit(s)", config.units.len());
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognised variables: `PTERAFORM_TERRAFORM_BINARY`,
    /// `PTERAFORM_STATE_FILE`, `PTERAFORM_TIMEOUT_SECS`,
    /// `PTERAFORM_STATE_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// has an unparsable value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let mut config = self.load_file(path)?;

        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Applies overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PTERAFORM_TIMEOUT_SECS` is not a number.
    pub fn apply_env_overrides<F>(config: &mut ProviderConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup(ENV_TERRAFORM_BINARY) {
            debug!("Overriding terraform.binary from environment");
            config.terraform.binary = binary;
        }

        if let Some(state_file) = lookup(ENV_STATE_FILE) {
            debug!("Overriding state_file from environment");
            config.state_file = state_file;
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            debug!("Overriding timeout_secs from environment");
            let secs = timeout.trim().parse::<u64>().map_err(|e| {
                ConfigError::validation(
                    format!("{ENV_TIMEOUT_SECS}='{timeout}' is not a number: {e}"),
                    "timeout_secs",
                )
            })?;
            config.timeout_secs = Some(secs);
        }

        if let Some(path) = lookup(ENV_STATE_PATH) {
            debug!("Overriding state.path from environment");
            config.state.path = Some(path);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                PteraformError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["pteraform.yaml", "pteraform.yml"];

/// Finds the configuration file in `start_dir` or its parents, falling back
/// to the user configuration directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(user_config) = user_config_file() {
        if user_config.exists() {
            info!("Using user configuration: {}", user_config.display());
            return Ok(user_config);
        }
    }

    Err(PteraformError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

/// `<config dir>/pteraform/pteraform.yaml`, if the platform has a config dir.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pteraform").join(DEFAULT_CONFIG_FILES[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
units:
  - name: first
    working_dir: testdata/first
";
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("minimal config should parse");

        assert_eq!(config.terraform.binary, "terraform");
        assert_eq!(config.state_file, "terraform.tfstate");
        assert_eq!(config.units.len(), 1);
        assert!(config.units[0].args.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
terraform:
  binary: /usr/local/bin/terraform
  env:
    TF_IN_AUTOMATION: "1"
state_file: custom.tfstate
timeout_secs: 1800
state:
  path: .state
units:
  - name: first
    working_dir: testdata/first
  - name: second
    working_dir: testdata/second
    args: ["-var=value=cool"]
"#;
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("full config should parse");

        assert_eq!(config.terraform.binary, "/usr/local/bin/terraform");
        assert_eq!(config.terraform.env.len(), 1);
        assert_eq!(config.state_file, "custom.tfstate");
        assert_eq!(config.timeout_secs, Some(1800));
        assert_eq!(config.state.path.as_deref(), Some(".state"));
        assert_eq!(config.unit_names(), vec!["first", "second"]);
        assert_eq!(
            config.unit("second").map(|u| u.args.clone()),
            Some(vec![String::from("-var=value=cool")])
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = ConfigParser::new().parse_yaml("\n", None).expect("empty");
        assert!(config.units.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConfigParser::new()
            .parse_yaml("units: [", Some(Path::new("pteraform.yaml")))
            .expect_err("invalid yaml");
        assert!(err.to_string().contains("YAML parse error"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TERRAFORM_BINARY, "tofu"),
            (ENV_STATE_FILE, "other.tfstate"),
            (ENV_TIMEOUT_SECS, "60"),
            (ENV_STATE_PATH, "/tmp/pteraform"),
        ]
        .into_iter()
        .collect();

        let mut config = ProviderConfig::default();
        ConfigParser::apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()))
            .expect("overrides apply");

        assert_eq!(config.terraform.binary, "tofu");
        assert_eq!(config.state_file, "other.tfstate");
        assert_eq!(config.timeout_secs, Some(60));
        assert_eq!(config.state.path.as_deref(), Some("/tmp/pteraform"));
    }

    #[test]
    fn test_bad_timeout_override() {
        let mut config = ProviderConfig::default();
        let err = ConfigParser::apply_env_overrides(&mut config, |k| {
            (k == ENV_TIMEOUT_SECS).then(|| String::from("soon"))
        })
        .expect_err("not a number");
        assert!(err.to_string().contains("PTERAFORM_TIMEOUT_SECS"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let root = TempDir::new().expect("temp dir");
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(root.path().join("pteraform.yaml"), "units: []\n").expect("write");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, root.path().join("pteraform.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let root = TempDir::new().expect("temp dir");
        let err = ConfigParser::new()
            .load_file(root.path().join("nope.yaml"))
            .expect_err("missing");
        assert!(matches!(err, PteraformError::Config(ConfigError::FileNotFound { .. })));
    }
}
