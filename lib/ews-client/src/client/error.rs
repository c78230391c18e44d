use std::fmt::Debug;

use crate::descriptor::{DownloadError, PatchError};
use crate::normalize::ParseError;
use crate::soap::{ClientBuildError, InvocationError};

/// Errors that can occur when using the [`EwsClient`](crate::EwsClient).
///
/// Each variant is one failure category of the bootstrap-and-invoke sequence.
/// Errors are propagated unchanged from the step that produced them; nothing
/// in the client retries.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum EwsError {
    /// Missing or invalid session parameters.
    ///
    /// Raised before any I/O happens, never retried.
    Configuration(ConfigurationError),

    /// A descriptor (WSDL or XSD) could not be fetched or stored.
    ///
    /// The descriptor cache stays unresolved, so the next call downloads
    /// all three descriptors again.
    Download(DownloadError),

    /// The downloaded WSDL could not be patched.
    ///
    /// The descriptor cache stays unresolved.
    Patch(PatchError),

    /// The SOAP client could not be built from the patched WSDL.
    ClientBuild(ClientBuildError),

    /// The remote operation failed (unknown operation, SOAP fault, transport failure).
    Invocation(InvocationError),

    /// The response XML could not be normalized.
    Parse(ParseError),
}

/// Errors raised while configuring a session.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum ConfigurationError {
    /// A mandatory parameter is missing or empty.
    #[display("missing required parameter: {name}")]
    MissingParameter {
        /// Name of the missing parameter.
        name: &'static str,
    },

    /// The host cannot be used to build the service URLs.
    #[display("invalid host '{host}': {reason}")]
    InvalidHost {
        /// The rejected host.
        host: String,
        /// Description of why the host is invalid.
        reason: String,
    },

    /// An operation was requested before [`EwsClient::auth`](crate::EwsClient::auth).
    #[display("session is not configured, call auth() first")]
    NotConfigured,
}
