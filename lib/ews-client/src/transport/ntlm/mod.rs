use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, HeaderValue, WWW_AUTHENTICATE};
use http::{HeaderMap, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::client::NtlmSecurity;

mod message;
use self::message::{
    ChallengeMessage, NtlmIdentity, authenticate_message, filetime_now, negotiate_message,
};

/// The default [`Transport`]: `reqwest` with the NTLM challenge/response handshake.
///
/// Requests carrying an [`NtlmSecurity`] go through the three-leg handshake
/// (negotiate, challenge, authenticate) on a keep-alive connection. Requests
/// without security are sent as-is.
///
/// Two HTTP clients are kept: one verifying TLS certificates, one accepting
/// any certificate. The request's [`NtlmSecurity::ignore_ssl`] flag selects
/// between them.
///
/// NTLM authenticates a connection, so handshakes are serialized: the three
/// legs of one handshake always travel over the single pooled connection.
/// Clones share the same lock.
#[derive(Debug, Clone)]
pub struct NtlmTransport {
    verified: reqwest::Client,
    unverified: reqwest::Client,
    handshake: Arc<Mutex<()>>,
}

impl NtlmTransport {
    /// Creates the transport with default HTTP clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        let verified = Self::builder().build()?;
        let unverified = Self::builder().danger_accept_invalid_certs(true).build()?;

        Ok(Self::with_clients(verified, unverified))
    }

    /// Creates the transport from pre-configured HTTP clients.
    ///
    /// `unverified` is used for requests whose security disables TLS
    /// verification; it is expected to accept invalid certificates.
    pub fn with_clients(verified: reqwest::Client, unverified: reqwest::Client) -> Self {
        Self {
            verified,
            unverified,
            handshake: Arc::default(),
        }
    }

    fn builder() -> reqwest::ClientBuilder {
        // NTLM authenticates the connection, not the request
        reqwest::Client::builder().pool_max_idle_per_host(1)
    }

    fn client(&self, security: Option<&NtlmSecurity>) -> &reqwest::Client {
        match security {
            Some(security) if security.ignore_ssl() => &self.unverified,
            _ => &self.verified,
        }
    }

    async fn send(
        client: &reqwest::Client,
        request: &TransportRequest,
        authorization: Option<HeaderValue>,
        with_body: bool,
    ) -> Result<reqwest::Response, TransportError> {
        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        builder = match request.body() {
            Some(body) if with_body => builder.body(body.to_string()),
            Some(_) => builder.header(CONTENT_LENGTH, 0),
            None => builder,
        };

        let response = builder.send().await?;
        Ok(response)
    }

    async fn read(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let status = response.status();
        let body = response.bytes().await?;
        Ok(TransportResponse::new(status, body.to_vec()))
    }

    async fn handshake(
        client: &reqwest::Client,
        request: &TransportRequest,
        security: &NtlmSecurity,
    ) -> Result<TransportResponse, TransportError> {
        let negotiate = authorization_header(&negotiate_message())?;
        debug!(url = %request.url(), "NTLM negotiate...");
        let response = Self::send(client, request, Some(negotiate), false).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            // the negotiate leg carries no body, so an accepted request is replayed with it
            if response.status().is_success() && request.body().is_some() {
                debug!(url = %request.url(), "...no NTLM challenge, replaying the request");
                let replayed = Self::send(client, request, None, true).await?;
                return Self::read(replayed).await;
            }
            return Self::read(response).await;
        }

        let Some(challenge) = challenge_token(response.headers()) else {
            warn!(url = %request.url(), "server does not offer NTLM authentication");
            return Self::read(response).await;
        };
        // drain the body so the connection returns to the pool
        response.bytes().await?;

        let challenge = ChallengeMessage::parse(&challenge).map_err(ntlm_error)?;
        let identity = NtlmIdentity::new(security.username(), security.password().clone());
        let authenticate =
            authenticate_message(&identity, &challenge, rand::random(), filetime_now())
                .map_err(ntlm_error)?;

        debug!(url = %request.url(), "...NTLM authenticate");
        let authorization = authorization_header(&authenticate)?;
        let response = Self::send(client, request, Some(authorization), true).await?;
        Self::read(response).await
    }
}

impl Transport for NtlmTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client(request.security());

        let response = match request.security() {
            Some(security) => {
                let _connection = self.handshake.lock().await;
                Self::handshake(client, &request, security).await?
            }
            None => {
                let response = Self::send(client, &request, None, true).await?;
                Self::read(response).await?
            }
        };

        debug!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            "HTTP exchange completed"
        );
        Ok(response)
    }
}

fn authorization_header(message: &[u8]) -> Result<HeaderValue, TransportError> {
    let value = HeaderValue::from_str(&format!("NTLM {}", STANDARD.encode(message)))?;
    Ok(value)
}

/// Extracts the decoded type 2 message from the `WWW-Authenticate` headers.
fn challenge_token(headers: &HeaderMap) -> Option<Vec<u8>> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            value
                .strip_prefix("NTLM ")
                .or_else(|| value.strip_prefix("Negotiate "))
        })
        .find_map(|token| STANDARD.decode(token.trim()).ok())
}

fn ntlm_error(error: message::MessageError) -> TransportError {
    TransportError::Ntlm {
        reason: error.to_string(),
    }
}
