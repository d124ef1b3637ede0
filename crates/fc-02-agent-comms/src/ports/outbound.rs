//! # Driven Ports (Outbound SPI)
//!
//! The HTTP transport the loop posts envelopes through.

use crate::domain::errors::TransportError;
use async_trait::async_trait;

/// Status and body of a `/control` exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }
}

/// Agent-to-frontend HTTP.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST an envelope to `/control`. Non-2xx statuses are returned, not
    /// mapped to errors.
    async fn post_control(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError>;

    /// GET `/server.pem`.
    async fn fetch_server_pem(&self) -> Result<String, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn post_control(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        (**self).post_control(body).await
    }

    async fn fetch_server_pem(&self) -> Result<String, TransportError> {
        (**self).fetch_server_pem().await
    }
}
