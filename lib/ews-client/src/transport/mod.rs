//! HTTP transports carrying NTLM-authenticated requests.
//!
//! The [`Transport`] trait is the seam between the client and the network:
//! descriptor downloads and SOAP calls both go through it.
//!
//! - [`NtlmTransport`] - the default, a `reqwest` client performing the NTLM handshake
//! - [`MemoryTransport`] - canned responses and request recording, for tests

use std::fmt;
use std::future::Future;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::client::NtlmSecurity;

mod memory;
pub use self::memory::MemoryTransport;

mod ntlm;
pub use self::ntlm::NtlmTransport;

/// Executes HTTP requests on behalf of the client.
///
/// Implementations must honor the request's [`NtlmSecurity`]: authenticate
/// with its credentials and skip TLS certificate verification when
/// [`NtlmSecurity::ignore_ssl`] is set. Timeouts are the responsibility of
/// the implementation.
pub trait Transport: Send + Sync {
    /// Sends the request and returns the final response.
    fn execute(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// An HTTP request sent through a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<String>,
    security: Option<NtlmSecurity>,
}

impl TransportRequest {
    /// Creates a request without body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            security: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request with a body.
    pub fn post(url: Url, body: impl Into<String>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attaches NTLM security.
    #[must_use]
    pub fn with_security(mut self, security: NtlmSecurity) -> Self {
        self.security = Some(security);
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// The attached NTLM security, if any.
    pub fn security(&self) -> Option<&NtlmSecurity> {
        self.security.as_ref()
    }
}

/// The final response of a [`Transport`].
#[derive(Clone, PartialEq, Eq)]
pub struct TransportResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl TransportResponse {
    /// Creates a response.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("body_length", &self.body.len())
            .finish()
    }
}

/// Errors raised by a [`Transport`].
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum TransportError {
    /// HTTP client error from the underlying reqwest library.
    ///
    /// Covers network failures, timeouts and TLS errors.
    ReqwestError(reqwest::Error),

    /// Invalid HTTP header value.
    InvalidHeaderValue(http::header::InvalidHeaderValue),

    /// The NTLM handshake could not be completed.
    #[display("NTLM handshake failed: {reason}")]
    #[from(skip)]
    Ntlm {
        /// Description of the handshake failure.
        reason: String,
    },

    /// No response is registered for the request (in-memory transport).
    #[display("no response registered for {method} {url}")]
    #[from(skip)]
    Unrouted {
        /// The request method.
        method: String,
        /// The request URL.
        url: String,
    },

    /// A failure injected into the in-memory transport.
    #[display("simulated failure for {url}: {reason}")]
    #[from(skip)]
    Simulated {
        /// The request URL.
        url: String,
        /// The injected reason.
        reason: String,
    },
}
