#![allow(dead_code, missing_docs, clippy::expect_used)]

use http::{Method, StatusCode};
use rstest::fixture;
use tracing::info;

use ews_client::{EwsClient, MemoryTransport, TransportRequest};

pub const HOST: &str = "mail.corp.example.com";

pub const SERVICES_WSDL: &str = include_str!("../fixtures/services.wsdl");
pub const MESSAGES_XSD: &str = include_str!("../fixtures/messages.xsd");
pub const TYPES_XSD: &str = include_str!("../fixtures/types.xsd");
pub const FIND_ITEM_RESPONSE: &str = include_str!("../fixtures/find_item_response.xml");
pub const SCHEMA_FAULT: &str = include_str!("../fixtures/schema_fault.xml");

pub fn init_tracing() {
    // should be run once, fail otherwise, we skip that error
    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    info!("Tracing initialized");
}

/// A simulated Exchange server answering from the fixtures.
#[derive(Debug, Clone)]
pub struct FakeExchange {
    pub host: String,
    pub transport: MemoryTransport,
}

impl FakeExchange {
    pub fn new(host: &str) -> Self {
        let exchange = Self {
            host: host.to_string(),
            transport: MemoryTransport::new(),
        };
        exchange.serve_descriptors();
        exchange.respond_to_soap(StatusCode::OK, FIND_ITEM_RESPONSE);
        exchange
    }

    pub fn url(&self, path: &str) -> String {
        format!("https://{}{path}", self.host)
    }

    pub fn endpoint(&self) -> String {
        self.url("/EWS/Exchange.asmx")
    }

    pub fn serve_descriptors(&self) {
        for (path, body) in [
            ("/ews/services.wsdl", SERVICES_WSDL),
            ("/ews/messages.xsd", MESSAGES_XSD),
            ("/ews/types.xsd", TYPES_XSD),
        ] {
            self.transport
                .respond(Method::GET, &self.url(path), StatusCode::OK, body);
        }
    }

    pub fn respond_to_soap(&self, status: StatusCode, body: &str) {
        self.transport
            .respond(Method::POST, &self.endpoint(), status, body);
    }

    pub fn client(&self) -> EwsClient<MemoryTransport> {
        let mut client = EwsClient::with_transport(self.transport.clone());
        client
            .auth("CORP\\jdoe", "s3cr3t", self.host.as_str())
            .expect("valid session");
        client
    }

    pub fn descriptor_downloads(&self) -> usize {
        ["/ews/services.wsdl", "/ews/messages.xsd", "/ews/types.xsd"]
            .iter()
            .map(|path| self.transport.count(&Method::GET, &self.url(path)))
            .sum()
    }

    pub fn soap_requests(&self) -> Vec<TransportRequest> {
        self.transport
            .requests()
            .into_iter()
            .filter(|request| *request.method() == Method::POST)
            .collect()
    }
}

#[fixture]
pub fn exchange() -> FakeExchange {
    init_tracing();
    FakeExchange::new(HOST)
}
