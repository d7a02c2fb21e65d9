//! HTTP transport to the server's `/command` endpoint.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use griddev_core::protocol::COMMAND_PATH;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::application::dispatch_worker::{Transport, TransportError};

/// Posts request bodies to `http://127.0.0.1:<port>/command`.
///
/// Idle connections are not pooled: a restarted server would leave pooled
/// sockets pointing at the dead process.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(port: u16) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .tcp_nodelay(true)
            .user_agent(concat!("griddev-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(Box::new(e)))?;
        Ok(Self {
            client,
            url: format!("http://{}:{port}{COMMAND_PATH}", Ipv4Addr::LOCALHOST),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| TransportError::Request(Box::new(e)))?;

        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(Box::new(e)))?;
        Ok(bytes.to_vec())
    }
}
