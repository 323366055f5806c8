//! State artifact digests for change detection.
//!
//! A unit's identity is the SHA-256 of its `terraform.tfstate` bytes,
//! rendered as lowercase hex. The artifact is never parsed, so any byte
//! change (including formatting churn) yields a new identity.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{IdentityError, PteraformError, Result};
use crate::runner::ExecutionContext;

/// State file terraform writes next to the configuration.
pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";

/// Read size while streaming the artifact.
const READ_CHUNK: usize = 64 * 1024;

/// Length of the display form returned by [`short_identity`].
const SHORT_LEN: usize = 8;

/// Resolves a working directory to the digest of its state artifact.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Artifact path relative to the working directory.
    state_file: PathBuf,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver {
    /// Creates a resolver for `terraform.tfstate`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state_file(DEFAULT_STATE_FILE)
    }

    /// Creates a resolver for a different artifact name.
    #[must_use]
    pub fn with_state_file(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
        }
    }

    /// Path of the artifact inside `working_dir`.
    #[must_use]
    pub fn artifact_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.state_file)
    }

    /// Streams the artifact through SHA-256 and returns the hex digest.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotFound` if the file does not exist,
    /// `ArtifactReadFailed` if it cannot be fully read, and a cancellation
    /// error if `ctx` fires between chunks.
    pub async fn resolve(&self, working_dir: &Path, ctx: &ExecutionContext) -> Result<String> {
        let path = self.artifact_path(working_dir);
        debug!("Resolving identity from {}", path.display());

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IdentityError::ArtifactNotFound { path }.into());
            }
            Err(e) => {
                return Err(IdentityError::ArtifactReadFailed {
                    path,
                    message: e.to_string(),
                }
                .into());
            }
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            if let Some(reason) = ctx.check() {
                return Err(PteraformError::cancelled(
                    format!("reading {}", path.display()),
                    reason,
                ));
            }
            let n = file.read(&mut buf).await.map_err(|e| IdentityError::ArtifactReadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let identity = hex::encode(hasher.finalize());
        info!("Identity of {} is {}", working_dir.display(), short_identity(&identity));
        Ok(identity)
    }
}

/// Digest of an in-memory byte slice, identical to what
/// [`IdentityResolver::resolve`] returns for a file with these bytes.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// First eight characters of an identity, for display.
#[must_use]
pub fn short_identity(identity: &str) -> String {
    identity.chars().take(SHORT_LEN).collect()
}
