use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::DownloadError;
use crate::client::NtlmSecurity;
use crate::transport::{Transport, TransportRequest};

/// Downloads descriptor files with the session's NTLM credentials.
///
/// Every request carries the session's TLS-verification bypass flag through
/// its [`NtlmSecurity`].
#[derive(Debug)]
pub struct AuthenticatedFetcher<T> {
    transport: Arc<T>,
    security: NtlmSecurity,
}

impl<T> AuthenticatedFetcher<T>
where
    T: Transport,
{
    /// Creates a fetcher authenticating with `security`.
    pub fn new(transport: Arc<T>, security: NtlmSecurity) -> Self {
        Self {
            transport,
            security,
        }
    }

    /// Fetches `url` and writes the response body to `destination`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Transport`] if the request fails
    /// - [`DownloadError::UnexpectedStatus`] if the server does not answer with a 2xx status
    /// - [`DownloadError::Write`] if the body cannot be written to `destination`
    pub async fn download(&self, url: &Url, destination: &Path) -> Result<(), DownloadError> {
        let request = TransportRequest::get(url.clone()).with_security(self.security.clone());

        debug!(%url, "downloading...");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DownloadError::UnexpectedStatus {
                url: url.to_string(),
                status_code,
            });
        }

        tokio::fs::write(destination, response.body())
            .await
            .map_err(|source| DownloadError::Write {
                path: destination.to_path_buf(),
                source,
            })?;
        debug!(
            %url,
            destination = %destination.display(),
            bytes = response.body().len(),
            "...downloaded"
        );

        Ok(())
    }
}
