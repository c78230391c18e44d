//! Service descriptors: download, caching and WSDL patching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::client::{EwsError, SessionConfig};
use crate::transport::Transport;

mod error;
pub use self::error::{DownloadError, PatchError};

mod fetcher;
pub use self::fetcher::AuthenticatedFetcher;

mod patch;
pub use self::patch::{patch_wsdl, patch_wsdl_text};

mod workspace;
pub use self::workspace::{TempDirProvisioner, TempWorkspace, WorkspaceProvisioner};

/// The three descriptors needed to build the SOAP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// `services.wsdl`
    Wsdl,
    /// `messages.xsd`
    MessagesXsd,
    /// `types.xsd`
    TypesXsd,
}

impl DescriptorKind {
    /// Every descriptor, WSDL first.
    pub const ALL: [Self; 3] = [Self::Wsdl, Self::MessagesXsd, Self::TypesXsd];
}

/// A remote descriptor and its local cache path.
///
/// The path is only set after a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    kind: DescriptorKind,
    url: Url,
    path: Option<PathBuf>,
}

impl Descriptor {
    /// Creates an unresolved descriptor.
    pub fn new(kind: DescriptorKind, url: Url) -> Self {
        Self {
            kind,
            url,
            path: None,
        }
    }

    /// The descriptor kind.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// The remote URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The local path, once downloaded.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The file name under which the descriptor is stored: the URL basename.
    pub fn file_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or(match self.kind {
                DescriptorKind::Wsdl => "services.wsdl",
                DescriptorKind::MessagesXsd => "messages.xsd",
                DescriptorKind::TypesXsd => "types.xsd",
            })
    }
}

/// The WSDL, messages XSD and types XSD of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSet {
    descriptors: [Descriptor; 3],
}

impl DescriptorSet {
    pub(crate) fn new(descriptors: [Descriptor; 3]) -> Self {
        Self { descriptors }
    }

    /// Iterates over the descriptors, WSDL first.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    /// The WSDL descriptor.
    pub fn wsdl(&self) -> &Descriptor {
        let [wsdl, _, _] = &self.descriptors;
        wsdl
    }

    /// The local paths, if all three descriptors are downloaded.
    pub fn paths(&self) -> Option<[PathBuf; 3]> {
        let [wsdl, messages, types] = &self.descriptors;
        Some([
            wsdl.path.clone()?,
            messages.path.clone()?,
            types.path.clone()?,
        ])
    }

    fn resolve(&mut self, dir: &Path) {
        for descriptor in &mut self.descriptors {
            descriptor.path = Some(dir.join(descriptor.file_name()));
        }
    }
}

#[derive(Debug)]
struct CacheState {
    workspace: Option<TempWorkspace>,
    descriptors: DescriptorSet,
}

impl CacheState {
    fn resolved_wsdl(&self) -> Option<PathBuf> {
        self.workspace.as_ref()?;
        let [wsdl, _, _] = self.descriptors.paths()?;
        Some(wsdl)
    }
}

/// Caches the descriptors of a session in a temporary workspace.
///
/// The state is guarded by an async mutex held for the whole population, so
/// concurrent cold callers wait for the in-flight download and then observe
/// its result instead of downloading again.
#[derive(Debug)]
pub(crate) struct DescriptorCache {
    state: Mutex<CacheState>,
}

impl DescriptorCache {
    pub(crate) fn new(descriptors: DescriptorSet) -> Self {
        Self {
            state: Mutex::new(CacheState {
                workspace: None,
                descriptors,
            }),
        }
    }

    pub(crate) async fn resolved_paths(&self) -> Option<[PathBuf; 3]> {
        let state = self.state.lock().await;
        state.workspace.as_ref()?;
        state.descriptors.paths()
    }

    /// Returns the patched WSDL path, downloading and patching on a cache miss.
    ///
    /// On failure the descriptor paths stay unset, so the next call starts over.
    /// Files already written stay in the workspace.
    pub(crate) async fn ensure_ready<T, P>(
        &self,
        transport: &Arc<T>,
        provisioner: &P,
        config: &SessionConfig,
    ) -> Result<PathBuf, EwsError>
    where
        T: Transport,
        P: WorkspaceProvisioner,
    {
        let mut state = self.state.lock().await;
        if let Some(wsdl) = state.resolved_wsdl() {
            debug!(path = %wsdl.display(), "descriptor cache hit");
            return Ok(wsdl);
        }

        let workspace = provisioner
            .create_dir()
            .await
            .map_err(|source| DownloadError::Workspace { source })?;
        let dir = workspace.path().to_path_buf();
        state.workspace = Some(workspace);

        let fetcher = AuthenticatedFetcher::new(Arc::clone(transport), config.security());
        let [wsdl, messages, types] = &state.descriptors.descriptors;
        let wsdl_path = dir.join(wsdl.file_name());
        let messages_path = dir.join(messages.file_name());
        let types_path = dir.join(types.file_name());

        tokio::try_join!(
            fetcher.download(wsdl.url(), &wsdl_path),
            fetcher.download(messages.url(), &messages_path),
            fetcher.download(types.url(), &types_path),
        )?;

        patch_wsdl(Some(&wsdl_path), config.endpoints().service()).await?;

        state.descriptors.resolve(&dir);
        info!(
            host = config.host(),
            workspace = %dir.display(),
            "service descriptors downloaded"
        );

        Ok(wsdl_path)
    }
}
