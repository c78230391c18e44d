use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{DescriptorCache, TempDirProvisioner, WorkspaceProvisioner};
use crate::normalize::{ParserOptions, normalize};
use crate::soap::SoapClient;
use crate::transport::{NtlmTransport, Transport, TransportError};

mod args;
pub use self::args::OperationArgs;

mod auth;
pub use self::auth::{NtlmSecurity, SecureString};

mod config;
pub use self::config::{ServiceEndpoints, SessionConfig};

mod error;
pub use self::error::{ConfigurationError, EwsError};


/// Client facade for Exchange Web Services.
///
/// `EwsClient` owns the session: credentials, host, TLS bypass flag, parser
/// options and the descriptor cache. Use [`EwsClient::auth`] to configure it,
/// then [`EwsClient::run`] to invoke operations.
///
/// # Example
///
/// ```rust,no_run
/// use ews_client::EwsClient;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = EwsClient::new()?;
/// client.auth("jdoe@corp.example.com", "secret", "mail.corp.example.com")?;
/// client.set_ignore_ssl(true);
///
/// let folders = client
///     .run(
///         "GetFolder",
///         json!({
///             "FolderShape": { "t:BaseShape": "Default" },
///             "FolderIds": { "t:DistinguishedFolderId": { "$": { "Id": "inbox" } } }
///         }),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Descriptor Caching
///
/// The WSDL and XSD descriptors are downloaded on the first call and reused by
/// every later call of the same session. Calling [`EwsClient::auth`] again
/// starts a new caching epoch. The SOAP client itself is rebuilt on every call.
///
/// # Thread Safety
///
/// [`EwsClient::run`] takes `&self`, so calls can be issued concurrently.
/// Descriptor cache population is single-flight: concurrent cold calls wait for
/// the one in-flight download instead of downloading again.
#[derive(Debug)]
pub struct EwsClient<T = NtlmTransport, P = TempDirProvisioner> {
    transport: Arc<T>,
    provisioner: P,
    parser_options: ParserOptions,
    ignore_ssl: bool,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    config: SessionConfig,
    cache: DescriptorCache,
}

// Create
impl EwsClient {
    /// Creates a client using the default NTLM transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP clients cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_transport(NtlmTransport::new()?))
    }
}

impl<T> EwsClient<T>
where
    T: Transport,
{
    /// Creates a client sending every request through `transport`.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            provisioner: TempDirProvisioner::default(),
            parser_options: ParserOptions::default(),
            ignore_ssl: false,
            session: None,
        }
    }
}

// Configure
impl<T, P> EwsClient<T, P>
where
    T: Transport,
    P: WorkspaceProvisioner,
{
    /// Replaces the temporary directory provisioner.
    pub fn with_provisioner<Q>(self, provisioner: Q) -> EwsClient<T, Q>
    where
        Q: WorkspaceProvisioner,
    {
        let Self {
            transport,
            parser_options,
            ignore_ssl,
            session,
            ..
        } = self;

        EwsClient {
            transport,
            provisioner,
            parser_options,
            ignore_ssl,
            session,
        }
    }

    /// Replaces the response parser options.
    #[must_use]
    pub fn with_parser_options(mut self, parser_options: ParserOptions) -> Self {
        self.parser_options = parser_options;
        self
    }

    /// Configures the session credentials and host.
    ///
    /// Computes the service endpoint and the descriptor URLs. No I/O is
    /// performed. Any previously cached descriptors are discarded, so the next
    /// call downloads them again from the new host.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a parameter is missing or empty, or
    /// if the host is not usable in a URL. The previous session is kept in
    /// that case.
    pub fn auth(
        &mut self,
        username: impl Into<String>,
        password: impl Into<SecureString>,
        host: impl Into<String>,
    ) -> Result<(), ConfigurationError> {
        let mut config = SessionConfig::new(username, password, host)?;
        config.set_ignore_ssl(self.ignore_ssl);

        debug!(
            host = config.host(),
            username = config.username(),
            "session configured"
        );
        let cache = DescriptorCache::new(config.endpoints().descriptor_set());
        self.session = Some(Session { config, cache });

        Ok(())
    }

    /// Enables or disables TLS certificate verification bypass for every request.
    pub fn set_ignore_ssl(&mut self, ignore_ssl: bool) {
        self.ignore_ssl = ignore_ssl;
        if let Some(session) = &mut self.session {
            session.config.set_ignore_ssl(ignore_ssl);
        }
    }

    /// Whether TLS certificate verification is disabled.
    pub fn ignore_ssl(&self) -> bool {
        self.ignore_ssl
    }

    /// The current session configuration, if [`EwsClient::auth`] succeeded.
    pub fn config(&self) -> Option<&SessionConfig> {
        self.session.as_ref().map(|session| &session.config)
    }

    /// The response parser options.
    pub fn parser_options(&self) -> &ParserOptions {
        &self.parser_options
    }

    /// Releases the temporary workspace and its descriptor files.
    ///
    /// The session stays configured; the next call downloads the descriptors again.
    pub fn cleanup(&mut self) {
        if let Some(session) = &mut self.session {
            session.cache = DescriptorCache::new(session.config.endpoints().descriptor_set());
        }
    }

    fn session(&self) -> Result<&Session, ConfigurationError> {
        self.session
            .as_ref()
            .ok_or(ConfigurationError::NotConfigured)
    }
}

// Run
impl<T, P> EwsClient<T, P>
where
    T: Transport,
    P: WorkspaceProvisioner,
{
    /// Ensures the descriptors are downloaded and the WSDL is patched.
    ///
    /// Returns the path of the patched WSDL. Only the first call of a session
    /// performs network I/O; later calls return the cached path.
    ///
    /// # Errors
    ///
    /// - [`EwsError::Configuration`] if the session is not configured
    /// - [`EwsError::Download`] if the workspace cannot be created or a descriptor cannot be fetched
    /// - [`EwsError::Patch`] if the WSDL cannot be patched
    pub async fn ensure_ready(&self) -> Result<PathBuf, EwsError> {
        let session = self.session()?;
        session
            .cache
            .ensure_ready(&self.transport, &self.provisioner, &session.config)
            .await
    }

    /// The local paths of the WSDL, messages XSD and types XSD, once resolved.
    pub async fn descriptor_paths(&self) -> Option<[PathBuf; 3]> {
        let session = self.session.as_ref()?;
        session.cache.resolved_paths().await
    }

    /// Invokes the remote operation `operation` and normalizes the response.
    ///
    /// `args` is either an [`OperationArgs`] or a JSON value of the shape
    /// `{ "body": ..., "headers": { "<namespace>": ["<header>"] } }`. Without a
    /// `body` field (or with an empty one) the whole value is sent as payload
    /// and no header is attached.
    ///
    /// # Errors
    ///
    /// Fails with the first error of the sequence: configuration, descriptor
    /// download, WSDL patch, client build, invocation, or response parsing.
    pub async fn run(
        &self,
        operation: &str,
        args: impl Into<OperationArgs>,
    ) -> Result<Value, EwsError> {
        let session = self.session()?;
        let args = args.into();

        let wsdl = session
            .cache
            .ensure_ready(&self.transport, &self.provisioner, &session.config)
            .await?;

        let mut client = SoapClient::from_wsdl(&wsdl, Arc::clone(&self.transport)).await?;
        for header in args.soap_headers() {
            client.add_soap_header(header);
        }
        client.set_security(session.config.security());

        debug!(operation, "invoking...");
        let raw = client.invoke(operation, args.body()).await?;
        debug!(operation, length = raw.len(), "...response received");

        let tree = normalize(&raw, &self.parser_options)?;
        Ok(tree)
    }
}
