//! Filesystem layout of the upload store.
//!
//! ```text
//! <root>/
//!   <id><ext>          published objects, one file per upload
//!   .incoming/         in-flight writes, never served
//!     <id><ext>.part
//! ```

use crate::config::ConfigError;
use crate::error::{DropError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Name of the directory created beside the executable when no root is configured
pub const DEFAULT_ROOT_NAME: &str = "uploads";

/// Hidden directory inside the root that holds partially written objects
pub const STAGING_DIR_NAME: &str = ".incoming";

/// On-disk root under which every uploaded object lives
#[derive(Debug, Clone)]
pub struct StorageDirectory {
    root: PathBuf,
    dir_mode: u32,
}

impl StorageDirectory {
    /// Create a storage directory handle for an explicit root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir_mode: 0o755,
        }
    }

    /// Storage directory anchored beside the running executable
    pub fn beside_executable() -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(Self::executable_root()?))
    }

    /// `uploads/` next to the running binary, independent of the working directory
    pub fn executable_root() -> std::result::Result<PathBuf, ConfigError> {
        Ok(Self::executable_dir()?.join(DEFAULT_ROOT_NAME))
    }

    /// Directory containing the running binary
    pub fn executable_dir() -> std::result::Result<PathBuf, ConfigError> {
        let exe = std::env::current_exe().map_err(ConfigError::Executable)?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "storage.root".to_string(),
                message: format!("executable {} has no parent directory", exe.display()),
            })
    }

    /// Permission bits applied to directories this handle creates (unix only)
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Resolved storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for in-flight writes
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Create the root and staging directories, including missing parents.
    ///
    /// Safe to call concurrently and on every request: an existing directory is success.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn ensure_root(&self) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(self.dir_mode);

        builder
            .create(self.staging_dir())
            .await
            .map_err(DropError::WriteFailure)?;

        debug!("Storage root ready");
        Ok(())
    }
}
