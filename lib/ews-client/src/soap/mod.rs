//! SOAP client bound to a patched WSDL.
//!
//! [`SoapClient`] reads the service description from the WSDL, then sends
//! document/literal SOAP 1.1 requests through a [`Transport`].

use std::path::Path;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::client::NtlmSecurity;
use crate::transport::{Transport, TransportRequest};

mod envelope;
pub use self::envelope::SOAP_ENVELOPE_NS;

mod error;
pub use self::error::{ClientBuildError, InvocationError};

mod fault;
use self::fault::SoapFault;

mod wsdl;
pub use self::wsdl::{Operation, QualifiedName, ServiceDescription};

const SOAP_ACTION: &str = "soapaction";
const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// A SOAP header attached to every request of a [`SoapClient`].
///
/// A header whose name starts with `<` is an XML fragment inserted verbatim;
/// otherwise it is written as `<alias:name xmlns:alias="namespace">value</alias:name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapHeader {
    name: String,
    value: String,
    alias: String,
    namespace: String,
}

impl SoapHeader {
    /// Creates an empty-valued header aliased `ns`.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            alias: "ns".to_string(),
            namespace: namespace.into(),
        }
    }

    /// Sets the text content.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Sets the namespace prefix.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// The element name, or the XML fragment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text content.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The namespace prefix.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The namespace URI.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the header is an XML fragment.
    pub fn is_raw(&self) -> bool {
        self.name.trim_start().starts_with('<')
    }
}

/// A SOAP client for the operations of a WSDL binding.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::sync::Arc;
///
/// use ews_client::{NtlmSecurity, NtlmTransport, SoapClient, SoapHeader};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(NtlmTransport::new()?);
/// let mut client = SoapClient::from_wsdl(Path::new("/tmp/ews-x/services.wsdl"), transport).await?;
/// client.add_soap_header(SoapHeader::new(
///     "RequestServerVersion",
///     "http://schemas.microsoft.com/exchange/services/2006/types",
/// ));
/// client.set_security(NtlmSecurity::new("CORP\\jdoe", "secret", false));
///
/// let raw = client.invoke("GetFolder", &json!({ "FolderShape": {} })).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SoapClient<T> {
    transport: Arc<T>,
    description: ServiceDescription,
    endpoint: Url,
    headers: Vec<SoapHeader>,
    security: Option<NtlmSecurity>,
}

impl<T> SoapClient<T>
where
    T: Transport,
{
    /// Builds the client from the WSDL file at `path`.
    ///
    /// # Errors
    ///
    /// - [`ClientBuildError::Read`] if the file cannot be read
    /// - [`ClientBuildError::Xml`] if the WSDL is malformed
    /// - [`ClientBuildError::MissingAddress`] or [`ClientBuildError::InvalidAddress`]
    ///   if the service address is absent or invalid
    pub async fn from_wsdl(path: &Path, transport: Arc<T>) -> Result<Self, ClientBuildError> {
        let wsdl = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ClientBuildError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let client = Self::from_wsdl_text(&wsdl, transport)?;
        debug!(
            path = %path.display(),
            operations = client.description.operations().count(),
            "SOAP client built"
        );
        Ok(client)
    }

    /// Builds the client from the WSDL content.
    ///
    /// # Errors
    ///
    /// See [`SoapClient::from_wsdl`].
    pub fn from_wsdl_text(wsdl: &str, transport: Arc<T>) -> Result<Self, ClientBuildError> {
        let description = ServiceDescription::parse(wsdl)?;
        let location = description
            .address()
            .ok_or(ClientBuildError::MissingAddress)?;
        let endpoint = Url::parse(location).map_err(|source| ClientBuildError::InvalidAddress {
            location: location.to_string(),
            source,
        })?;

        Ok(Self {
            transport,
            description,
            endpoint,
            headers: Vec::new(),
            security: None,
        })
    }

    /// Attaches a header to every following request.
    pub fn add_soap_header(&mut self, header: SoapHeader) {
        self.headers.push(header);
    }

    /// The attached headers, in attachment order.
    pub fn soap_headers(&self) -> &[SoapHeader] {
        &self.headers
    }

    /// Sets the NTLM security of every following request.
    pub fn set_security(&mut self, security: NtlmSecurity) {
        self.security = Some(security);
    }

    /// The service endpoint, from the WSDL `soap:address`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The service description read from the WSDL.
    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// Whether the binding declares `operation`.
    pub fn has_operation(&self, operation: &str) -> bool {
        self.description.operation(operation).is_some()
    }

    /// Serializes the request envelope of `operation` without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::UnknownOperation`] if the binding does not
    /// declare `operation`, or [`InvocationError::Envelope`] if the body
    /// cannot be serialized.
    pub fn envelope(&self, operation: &str, body: &Value) -> Result<String, InvocationError> {
        let operation = self.operation(operation)?;
        envelope::build_envelope(
            operation,
            self.description.target_namespace(),
            self.description.namespaces(),
            &self.headers,
            body,
        )
    }

    /// Invokes `operation` and returns the raw response body.
    ///
    /// # Errors
    ///
    /// - [`InvocationError::UnknownOperation`] before any I/O if the binding
    ///   does not declare `operation`
    /// - [`InvocationError::Transport`] if the exchange fails
    /// - [`InvocationError::Fault`] if the response carries a SOAP fault
    /// - [`InvocationError::UnexpectedStatus`] on an error status without fault
    pub async fn invoke(&self, operation: &str, body: &Value) -> Result<String, InvocationError> {
        let declared = self.operation(operation)?;
        let envelope = self.envelope(operation, body)?;

        let mut request = TransportRequest::post(self.endpoint.clone(), envelope)
            .with_header(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
        if let Some(action) = declared.soap_action() {
            let action = HeaderValue::from_str(&format!("\"{action}\""))?;
            request = request.with_header(HeaderName::from_static(SOAP_ACTION), action);
        }
        if let Some(security) = &self.security {
            request = request.with_security(security.clone());
        }

        let response = self.transport.execute(request).await?;
        let status_code = response.status().as_u16();
        let body = response.text();

        if let Some(fault) = SoapFault::find(&body) {
            warn!(operation, status_code, code = %fault.code, "SOAP fault");
            return Err(InvocationError::Fault {
                status_code,
                code: fault.code,
                message: fault.message,
            });
        }
        if !response.status().is_success() {
            return Err(InvocationError::UnexpectedStatus { status_code, body });
        }

        Ok(body)
    }

    fn operation(&self, operation: &str) -> Result<&Operation, InvocationError> {
        self.description
            .operation(operation)
            .ok_or_else(|| InvocationError::UnknownOperation {
                operation: operation.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::transport::MemoryTransport;

    const ENDPOINT: &str = "https://mail.example.com/EWS/Exchange.asmx";

    const WSDL: &str = r#"<wsdl:definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/" xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:tns="urn:messages" targetNamespace="urn:messages">
  <wsdl:message name="GetFolderSoapIn"><wsdl:part name="request" element="tns:GetFolder"/></wsdl:message>
  <wsdl:portType name="PortType"><wsdl:operation name="GetFolder"><wsdl:input message="tns:GetFolderSoapIn"/></wsdl:operation></wsdl:portType>
  <wsdl:binding name="Binding" type="tns:PortType"><wsdl:operation name="GetFolder"><soap:operation soapAction="urn:messages/GetFolder"/></wsdl:operation></wsdl:binding>
<wsdl:service name="ExchangeServices">
<wsdl:port name="ExchangeServicePort" binding="tns:ExchangeServiceBinding">
<soap:address location="https://mail.example.com/EWS/Exchange.asmx"/>
</wsdl:port>
</wsdl:service>
</wsdl:definitions>"#;

    fn client(transport: &MemoryTransport) -> SoapClient<MemoryTransport> {
        SoapClient::from_wsdl_text(WSDL, Arc::new(transport.clone())).expect("valid WSDL")
    }

    #[test]
    fn should_recognize_raw_headers() {
        assert!(SoapHeader::new("  <t:Foo/>", "urn:t").is_raw());
        assert!(!SoapHeader::new("Foo", "urn:t").is_raw());
    }

    #[test]
    fn should_require_service_address() {
        let unpatched = r#"<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"/>"#;

        let result = SoapClient::from_wsdl_text(unpatched, Arc::new(MemoryTransport::new()));

        assert!(matches!(result, Err(ClientBuildError::MissingAddress)));
    }

    #[tokio::test]
    async fn should_fail_fast_on_unknown_operation() {
        let transport = MemoryTransport::new();
        let client = client(&transport);

        let result = client.invoke("GetFolders", &json!({})).await;

        assert!(matches!(
            result,
            Err(InvocationError::UnknownOperation { ref operation }) if operation == "GetFolders"
        ));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn should_post_envelope_with_soap_action_and_security() {
        let transport = MemoryTransport::new();
        transport.respond(Method::POST, ENDPOINT, StatusCode::OK, "<s:Envelope/>");
        let mut client = client(&transport);
        client.add_soap_header(SoapHeader::new("Header1", "urn:ns1"));
        client.set_security(NtlmSecurity::new("jdoe", "secret", true));

        let raw = client
            .invoke("GetFolder", &json!({ "Foo": 1 }))
            .await
            .expect("invoked");

        assert_eq!(raw, "<s:Envelope/>");
        let requests = transport.requests();
        let request = requests.first().expect("one request");
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers()[SOAP_ACTION], "\"urn:messages/GetFolder\"");
        assert_eq!(request.headers()[CONTENT_TYPE], XML_CONTENT_TYPE);
        assert!(request.security().is_some_and(NtlmSecurity::ignore_ssl));
        let body = request.body().unwrap_or_default();
        assert!(body.contains(r#"<soap:Header><ns:Header1 xmlns:ns="urn:ns1"/></soap:Header>"#));
        assert!(body.contains("<tns:Foo>1</tns:Foo>"));
    }

    #[tokio::test]
    async fn should_report_soap_fault() {
        let transport = MemoryTransport::new();
        transport.respond(
            Method::POST,
            ENDPOINT,
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>Invalid request</faultstring></s:Fault></s:Body></s:Envelope>"#,
        );
        let client = client(&transport);

        let result = client.invoke("GetFolder", &json!({})).await;

        assert!(matches!(
            result,
            Err(InvocationError::Fault { status_code: 500, ref code, ref message })
                if code == "s:Client" && message == "Invalid request"
        ));
    }

    #[tokio::test]
    async fn should_report_unexpected_status() {
        let transport = MemoryTransport::new();
        transport.respond(Method::POST, ENDPOINT, StatusCode::UNAUTHORIZED, "");
        let client = client(&transport);

        let result = client.invoke("GetFolder", &json!({})).await;

        assert!(matches!(
            result,
            Err(InvocationError::UnexpectedStatus {
                status_code: 401,
                ..
            })
        ));
    }
}
