use std::path::PathBuf;

use crate::transport::TransportError;

/// Errors raised while building a [`SoapClient`](super::SoapClient) from a WSDL.
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum ClientBuildError {
    /// The WSDL file cannot be read.
    #[display("failed to read WSDL {}: {source}", path.display())]
    Read {
        /// The WSDL path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The WSDL is not well-formed XML.
    #[display("malformed WSDL: {source}")]
    Xml {
        /// The XML error.
        source: quick_xml::Error,
    },

    /// The WSDL declares no service address.
    ///
    /// Happens when the WSDL was not patched with a `wsdl:service` element.
    #[display("WSDL declares no soap:address location")]
    MissingAddress,

    /// The service address is not a valid URL.
    #[display("invalid service address '{location}': {source}")]
    InvalidAddress {
        /// The declared location.
        location: String,
        /// The URL parse error.
        source: url::ParseError,
    },
}

impl From<quick_xml::Error> for ClientBuildError {
    fn from(source: quick_xml::Error) -> Self {
        Self::Xml { source }
    }
}

impl From<quick_xml::events::attributes::AttrError> for ClientBuildError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml {
            source: error.into(),
        }
    }
}

/// Errors raised while invoking a remote operation.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum InvocationError {
    /// The operation is not declared by the WSDL binding.
    #[display("unknown operation '{operation}'")]
    #[from(skip)]
    UnknownOperation {
        /// The requested operation name.
        operation: String,
    },

    /// The request envelope cannot be built from the body.
    #[display("cannot build SOAP envelope: {reason}")]
    #[from(skip)]
    Envelope {
        /// Description of the problem.
        reason: String,
    },

    /// Invalid HTTP header value (e.g. a `SOAPAction` with control characters).
    InvalidHeader(http::header::InvalidHeaderValue),

    /// The request could not be sent or the response could not be read.
    Transport(TransportError),

    /// The server answered with a SOAP fault.
    #[display("SOAP fault {code}: {message}")]
    #[from(skip)]
    Fault {
        /// The HTTP status code.
        status_code: u16,
        /// The `faultcode`, prefix included.
        code: String,
        /// The `faultstring`.
        message: String,
    },

    /// The server answered with an error status and no SOAP fault.
    #[display("unexpected HTTP status {status_code}")]
    #[from(skip)]
    UnexpectedStatus {
        /// The HTTP status code.
        status_code: u16,
        /// The response body.
        body: String,
    },
}
