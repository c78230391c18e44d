//! # EWS Client
//!
//! A client facade for Exchange Web Services (EWS).
//!
//! Exchange exposes its SOAP API through a WSDL document and two schema files
//! that do not fully conform to the WSDL standard: the WSDL lacks a
//! `wsdl:service` element, because the service is not meant to be hosted at a
//! predefined address. This crate handles the whole bootstrap sequence:
//!
//! - **[`EwsClient::auth`]** - configure NTLM credentials and the server host
//! - **Descriptor cache** - download `services.wsdl`, `messages.xsd` and `types.xsd`
//!   once per session into a private temporary directory
//! - **WSDL patch** - append the missing service binding pointing to
//!   `https://{host}/EWS/Exchange.asmx`
//! - **[`EwsClient::run`]** - build a [`SoapClient`] from the patched WSDL, attach
//!   SOAP headers and NTLM security, invoke the operation, and normalize the
//!   XML response into a [`serde_json::Value`] tree
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ews_client::EwsClient;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = EwsClient::new()?;
//! client.auth("DOMAIN\\jdoe", "secret", "mail.example.com")?;
//!
//! let args = json!({
//!     "body": {
//!         "$": { "Traversal": "Shallow" },
//!         "ItemShape": { "t:BaseShape": "IdOnly" },
//!         "ParentFolderIds": {
//!             "t:DistinguishedFolderId": { "$": { "Id": "inbox" } }
//!         }
//!     },
//!     "headers": {
//!         "http://schemas.microsoft.com/exchange/services/2006/types": ["RequestServerVersion"]
//!     }
//! });
//!
//! // Descriptors are downloaded on the first call only
//! let tree = client.run("FindItem", args).await?;
//! println!("{tree:#}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Request Bodies
//!
//! Bodies follow the response tree conventions: object keys become elements,
//! `$` holds attributes and `_` text. An unprefixed key is qualified with the
//! operation element's prefix, that is the EWS messages namespace. The schema
//! files are only cached, never read, so elements of the EWS types namespace
//! need an explicit prefix declared on the WSDL root, such as `t:BaseShape`.
//!
//! ## Response Trees
//!
//! Responses are normalized with the same shape as the `xml2js` family of
//! parsers: the root element is kept as the single top-level key, child
//! elements are always arrays, attributes live under `$` and text under `_`
//! when an element also has attributes or children. Namespace prefixes are
//! stripped by default, see [`ParserOptions`].
//!
//! ```rust
//! use ews_client::{ParserOptions, normalize};
//! use serde_json::json;
//!
//! let tree = normalize(
//!     r#"<m:Items><m:Item id="1">x</m:Item></m:Items>"#,
//!     &ParserOptions::default(),
//! )?;
//! assert_eq!(
//!     tree,
//!     json!({ "Items": { "Item": [{ "$": { "id": "1" }, "_": "x" }] } })
//! );
//! # Ok::<(), ews_client::ParseError>(())
//! ```
//!
//! ## Testing
//!
//! Every network exchange goes through the [`Transport`] trait.
//! [`MemoryTransport`] answers from canned responses and records every request,
//! so the whole pipeline can run without an Exchange server.

mod client;
pub use self::client::{
    ConfigurationError, EwsClient, EwsError, NtlmSecurity, OperationArgs, SecureString,
    ServiceEndpoints, SessionConfig,
};

mod descriptor;
pub use self::descriptor::{
    AuthenticatedFetcher, Descriptor, DescriptorKind, DescriptorSet, DownloadError, PatchError,
    TempDirProvisioner, TempWorkspace, WorkspaceProvisioner, patch_wsdl, patch_wsdl_text,
};

pub mod soap;
pub use self::soap::{ClientBuildError, InvocationError, SoapClient, SoapHeader};

mod normalize;
pub use self::normalize::{ParseError, ParserOptions, Processor, normalize, strip_prefix};

pub mod transport;
pub use self::transport::{
    MemoryTransport, NtlmTransport, Transport, TransportError, TransportRequest,
    TransportResponse,
};
