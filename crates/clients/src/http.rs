//! Response helpers shared by the service clients.

/// Errors from a collaborator's REST API.
#[derive(Debug, thiserror::Error)]
pub enum ServiceApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("{service} API error ({status}): {body}")]
    ApiError {
        service: &'static str,
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ServiceApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Return the response unchanged on success, or an
/// [`ServiceApiError::ApiError`] carrying the status and body.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ServiceApiError::ApiError {
            service,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
