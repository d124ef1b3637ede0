//! `reqwest` implementation of [`HttpTransport`].

use crate::domain::errors::TransportError;
use crate::ports::outbound::{HttpResponse, HttpTransport};
use async_trait::async_trait;
use std::time::Duration;

/// Path the agent posts envelopes to.
pub const CONTROL_PATH: &str = "/control";

/// Path the server certificate is served from.
pub const SERVER_PEM_PATH: &str = "/server.pem";

/// HTTP transport to one frontend.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    control_url: String,
    pem_url: String,
}

impl ReqwestTransport {
    /// Transport for the frontend at `server_url`, e.g. `http://fleet:8080`.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let base = server_url.trim_end_matches('/');
        Ok(Self {
            client,
            control_url: format!("{base}{CONTROL_PATH}"),
            pem_url: format!("{base}{SERVER_PEM_PATH}"),
        })
    }

    pub fn control_url(&self) -> &str {
        &self.control_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_control(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(&self.control_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }

    async fn fetch_server_pem(&self) -> Result<String, TransportError> {
        let response = self
            .client
            .get(&self.pem_url)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
