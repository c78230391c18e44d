use url::Url;

use super::{ConfigurationError, NtlmSecurity, SecureString};
use crate::descriptor::{Descriptor, DescriptorKind, DescriptorSet};

/// URLs derived from the configured Exchange host.
///
/// Computed by [`EwsClient::auth`](crate::EwsClient::auth) and recomputed on
/// every host change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    service: Url,
    wsdl: Url,
    messages_xsd: Url,
    types_xsd: Url,
}

impl ServiceEndpoints {
    /// Derives the endpoint and descriptor URLs of `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidHost`] if the host does not form a valid URL.
    pub fn for_host(host: &str) -> Result<Self, ConfigurationError> {
        let parse = |path: &str| {
            Url::parse(&format!("https://{host}{path}")).map_err(|err| {
                ConfigurationError::InvalidHost {
                    host: host.to_string(),
                    reason: err.to_string(),
                }
            })
        };

        Ok(Self {
            service: parse("/EWS/Exchange.asmx")?,
            wsdl: parse("/ews/services.wsdl")?,
            messages_xsd: parse("/ews/messages.xsd")?,
            types_xsd: parse("/ews/types.xsd")?,
        })
    }

    /// The SOAP endpoint: `https://{host}/EWS/Exchange.asmx`.
    pub fn service(&self) -> &Url {
        &self.service
    }

    /// The remote URL of a descriptor.
    pub fn descriptor(&self, kind: DescriptorKind) -> &Url {
        match kind {
            DescriptorKind::Wsdl => &self.wsdl,
            DescriptorKind::MessagesXsd => &self.messages_xsd,
            DescriptorKind::TypesXsd => &self.types_xsd,
        }
    }

    /// A fresh, unresolved descriptor set for these endpoints.
    pub(crate) fn descriptor_set(&self) -> DescriptorSet {
        DescriptorSet::new(
            DescriptorKind::ALL.map(|kind| Descriptor::new(kind, self.descriptor(kind).clone())),
        )
    }
}

/// Session configuration created by [`EwsClient::auth`](crate::EwsClient::auth).
///
/// Lives for the lifetime of the client and is never persisted.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    username: String,
    password: SecureString,
    host: String,
    ignore_ssl: bool,
    endpoints: ServiceEndpoints,
}

impl SessionConfig {
    /// Validates the credentials and derives the service URLs. No I/O is performed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingParameter`] if any of the parameters
    /// is empty, or [`ConfigurationError::InvalidHost`] if the host cannot be
    /// used in a URL.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<SecureString>,
        host: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let username = username.into();
        let password = password.into();
        let host = host.into();

        if username.is_empty() {
            return Err(ConfigurationError::MissingParameter { name: "username" });
        }
        if password.is_empty() {
            return Err(ConfigurationError::MissingParameter { name: "password" });
        }
        if host.is_empty() {
            return Err(ConfigurationError::MissingParameter { name: "host" });
        }

        let endpoints = ServiceEndpoints::for_host(&host)?;

        Ok(Self {
            username,
            password,
            host,
            ignore_ssl: false,
            endpoints,
        })
    }

    /// The configured username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The configured Exchange host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether TLS certificate verification is disabled.
    pub fn ignore_ssl(&self) -> bool {
        self.ignore_ssl
    }

    /// The URLs derived from the host.
    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    pub(crate) fn set_ignore_ssl(&mut self, ignore_ssl: bool) {
        self.ignore_ssl = ignore_ssl;
    }

    /// The NTLM security to attach to every request of this session.
    pub fn security(&self) -> NtlmSecurity {
        NtlmSecurity::new(
            self.username.clone(),
            self.password.clone(),
            self.ignore_ssl,
        )
    }
}
