use std::future::Future;
use std::io;
use std::path::Path;

use tempfile::TempDir;

/// An exclusively-owned temporary directory holding the descriptor files.
///
/// The directory and its content are deleted when the workspace is dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Wraps an existing temporary directory.
    pub fn new(dir: TempDir) -> Self {
        Self { dir }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Provisions the scoped temporary directory of a descriptor cache.
///
/// Implement this trait to control where the descriptors are stored, or to
/// simulate provisioning failures in tests.
///
/// # Example
///
/// ```rust
/// use std::io;
/// use ews_client::{TempWorkspace, WorkspaceProvisioner};
///
/// #[derive(Debug)]
/// struct UnderTarget;
///
/// impl WorkspaceProvisioner for UnderTarget {
///     async fn create_dir(&self) -> io::Result<TempWorkspace> {
///         let dir = tempfile::Builder::new().prefix("ews-").tempdir_in("target")?;
///         Ok(TempWorkspace::new(dir))
///     }
/// }
/// ```
pub trait WorkspaceProvisioner: Send + Sync {
    /// Creates a new, empty temporary directory.
    fn create_dir(&self) -> impl Future<Output = io::Result<TempWorkspace>> + Send;
}

/// Default provisioner: a fresh directory under the system temporary directory.
#[derive(Debug, Clone)]
pub struct TempDirProvisioner {
    prefix: String,
}

impl TempDirProvisioner {
    /// Creates a provisioner whose directories are named `{prefix}XXXXXX`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for TempDirProvisioner {
    fn default() -> Self {
        Self::with_prefix("ews-")
    }
}

impl WorkspaceProvisioner for TempDirProvisioner {
    async fn create_dir(&self) -> io::Result<TempWorkspace> {
        let prefix = self.prefix.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir()
        })
        .await
        .map_err(io::Error::other)??;

        Ok(TempWorkspace::new(dir))
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[tokio::test]
    async fn should_create_prefixed_directory() {
        let provisioner = TempDirProvisioner::with_prefix("ews-test-");

        let workspace = provisioner.create_dir().await.expect("created");

        assert!(workspace.path().is_dir());
        let name = workspace
            .path()
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        assert!(name.starts_with("ews-test-"));
    }

    #[tokio::test]
    async fn should_delete_directory_on_drop() {
        let workspace = TempDirProvisioner::default()
            .create_dir()
            .await
            .expect("created");
        let path = workspace.path().to_path_buf();
        tokio::fs::write(path.join("services.wsdl"), "<wsdl/>")
            .await
            .expect("write");

        drop(workspace);

        assert!(!path.exists());
    }
}
