//! Configuration module for pteraform.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `pteraform.yaml`
//! - Environment and `.env` overrides
//! - Validation of provider settings and unit declarations

mod spec;
mod parser;
mod validator;

pub use spec::{ProviderConfig, StateConfig, TerraformConfig, UnitConfig};
pub use parser::{
    find_config_file, user_config_file, ConfigParser, DEFAULT_CONFIG_FILES, ENV_STATE_FILE,
    ENV_STATE_PATH, ENV_TERRAFORM_BINARY, ENV_TIMEOUT_SECS,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult, MAX_TIMEOUT_SECS};
