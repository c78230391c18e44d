use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use http::{Method, StatusCode};
use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

/// In-memory [`Transport`] answering from canned responses.
///
/// Every executed request is recorded, including the unrouted ones. Clones
/// share the same routes and records, so a test can keep a handle after
/// giving the transport to a client.
///
/// # Example
///
/// ```rust
/// use ews_client::{MemoryTransport, Transport, TransportRequest};
/// use http::{Method, StatusCode};
/// use url::Url;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = MemoryTransport::new();
/// transport.respond(Method::GET, "https://mail.example.com/ews/types.xsd", StatusCode::OK, "<xs:schema/>");
///
/// let url = Url::parse("https://mail.example.com/ews/types.xsd")?;
/// let response = transport.execute(TransportRequest::get(url)).await?;
///
/// assert_eq!(response.text(), "<xs:schema/>");
/// assert_eq!(transport.requests().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    routes: IndexMap<(Method, String), Route>,
    requests: Vec<TransportRequest>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone)]
enum Route {
    Respond(TransportResponse),
    Fail(String),
}

impl MemoryTransport {
    /// Creates a transport without any route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `method url` with `status_code` and `body`, replacing any previous route.
    pub fn respond(
        &self,
        method: Method,
        url: &str,
        status_code: StatusCode,
        body: impl Into<Vec<u8>>,
    ) {
        let route = Route::Respond(TransportResponse::new(status_code, body));
        self.with_state(|state| state.routes.insert((method, normalize_url(url)), route));
    }

    /// Fails `method url` with [`TransportError::Simulated`].
    pub fn fail(&self, method: Method, url: &str, reason: impl Into<String>) {
        let route = Route::Fail(reason.into());
        self.with_state(|state| state.routes.insert((method, normalize_url(url)), route));
    }

    /// Delays every response, to widen concurrency windows in tests.
    pub fn set_latency(&self, latency: Duration) {
        self.with_state(|state| state.latency = Some(latency));
    }

    /// The recorded requests, in execution order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.with_state(|state| state.requests.clone())
    }

    /// The number of recorded requests matching `method url`.
    pub fn count(&self, method: &Method, url: &str) -> usize {
        let url = normalize_url(url);
        self.with_state(|state| {
            state
                .requests
                .iter()
                .filter(|request| request.method() == method && request.url().as_str() == url)
                .count()
        })
    }

    /// Forgets the recorded requests, keeping the routes.
    pub fn clear_requests(&self) {
        self.with_state(|state| state.requests.clear());
    }

    fn with_state<R>(&self, update: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut state)
    }
}

impl Transport for MemoryTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let key = (request.method().clone(), request.url().to_string());
        let (route, latency) = self.with_state(|state| {
            state.requests.push(request);
            (state.routes.get(&key).cloned(), state.latency)
        });

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let (method, url) = key;
        debug!(%method, %url, routed = route.is_some(), "in-memory exchange");
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(reason)) => Err(TransportError::Simulated { url, reason }),
            None => Err(TransportError::Unrouted {
                method: method.to_string(),
                url,
            }),
        }
    }
}

fn normalize_url(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), String::from)
}
