//! HTTP transport seam
//!
//! The dispatcher only needs "send this signed request, give me the body".
//! Status codes are not interpreted here: the cloud reports failures inside
//! the JSON envelope, so the body is returned whatever the status.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method};
use tracing::debug;
use url::Url;

use crate::error::{Result, TuyaClientError};

/// A fully signed request, ready to be sent
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Something that can perform one HTTP round-trip
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send the request and return the raw response body
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>>;
}

/// Default transport backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        Self::from_builder(
            Client::builder()
                .timeout(timeout)
                .connect_timeout(connect_timeout),
        )
    }

    /// Build the client from a prepared builder
    pub fn from_builder(builder: ClientBuilder) -> Result<Self> {
        let client = builder.build().map_err(|e| {
            TuyaClientError::Config(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>> {
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(%status, len = body.len(), "response received");

        Ok(body.to_vec())
    }
}
