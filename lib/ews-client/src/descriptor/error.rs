use std::io;
use std::path::PathBuf;

use crate::transport::TransportError;

/// Errors raised while fetching and storing the service descriptors.
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum DownloadError {
    /// The temporary workspace could not be created.
    #[display("failed to create the descriptor workspace: {source}")]
    Workspace {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The transport failed (network, NTLM handshake, TLS).
    #[display("failed to fetch {url}: {source}")]
    Transport {
        /// The descriptor URL.
        url: String,
        /// The transport failure.
        source: TransportError,
    },

    /// The server answered with a non-success status code.
    #[display("failed to fetch {url}: unexpected status code {status_code}")]
    UnexpectedStatus {
        /// The descriptor URL.
        url: String,
        /// The HTTP status code received.
        status_code: u16,
    },

    /// The downloaded descriptor could not be written to the workspace.
    #[display("failed to write {}: {source}", path.display())]
    Write {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Errors raised while patching the downloaded WSDL.
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum PatchError {
    /// The WSDL has no local path yet.
    #[display("the WSDL path is not set, the descriptor was not downloaded")]
    PathUnset,

    /// The WSDL could not be read as UTF-8 text.
    #[display("failed to read WSDL {}: {source}", path.display())]
    Read {
        /// The WSDL path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The patched WSDL could not be written back.
    #[display("failed to write WSDL {}: {source}", path.display())]
    Write {
        /// The WSDL path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}
