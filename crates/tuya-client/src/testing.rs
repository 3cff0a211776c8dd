//! Test utilities for tuya-client
//!
//! Two ways to exercise the client without the real cloud:
//!
//! - [`ScriptedTransport`] replays queued response bodies and records the
//!   signed requests it was given.
//! - [`TestServer`] runs an axum router (typically a mock cloud) on a local
//!   port and hands back a client pointed at it. [`verify_signature`] lets
//!   such a mock check the headers the client sent.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::client::{ClientConfig, TuyaClient};
use crate::error::{Result, TuyaClientError};
use crate::sign::SigningRequest;
use crate::transport::{HttpRequest, Transport};
use crate::types::Credentials;

// =============================================================================
// Scripted transport
// =============================================================================

/// Transport that answers from a queue instead of the network
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Vec<u8>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response body
    pub fn push_json(&self, body: Value) {
        self.push_body(body.to_string().into_bytes());
    }

    /// Queue a raw response body
    pub fn push_body(&self, body: impl Into<Vec<u8>>) {
        lock(&self.responses).push_back(Ok(body.into()));
    }

    /// Queue a transport failure
    pub fn push_error(&self, message: &str) {
        lock(&self.responses).push_back(Err(TuyaClientError::Transport(message.to_string())));
    }

    /// Requests sent so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>> {
        let path = request.url.path().to_string();
        lock(&self.requests).push(request);
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(TuyaClientError::Transport(format!(
                "no scripted response for {}",
                path
            )))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Signature verification
// =============================================================================

/// Check the signature headers of a request the way the cloud would
///
/// `path_and_query` is the request target as received (e.g.
/// `/v1.0/token?grant_type=1`). Returns `false` if any signing header is
/// missing or the signature does not match.
pub fn verify_signature(
    headers: &HeaderMap,
    method: &str,
    path_and_query: &str,
    body: &[u8],
    client_id: &str,
    secret: &str,
    access_token: Option<&str>,
) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("client_id") != Some(client_id) || header("sign_method") != Some("HMAC-SHA256") {
        return false;
    }
    if header("access_token") != access_token {
        return false;
    }
    let (Some(sign), Some(t), Some(nonce)) = (header("sign"), header("t"), header("nonce")) else {
        return false;
    };
    let Ok(t) = t.parse::<i64>() else {
        return false;
    };

    let (path, query) = path_and_query.split_once('?').unwrap_or((path_and_query, ""));
    let expected = SigningRequest {
        client_id,
        secret,
        access_token,
        method,
        path,
        query,
        body,
    }
    .sign_with(t, nonce);

    expected.sign == sign
}

// =============================================================================
// Test server
// =============================================================================

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: TuyaClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on a free local port with a client using `credentials`
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tuya_client::testing::TestServer;
    ///
    /// let server = TestServer::start(mock_cloud_router(), credentials).await?;
    /// let devices = server.client.list_devices(20, true).await?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>, credentials: Credentials) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_timeout(
            router,
            credentials,
            Duration::from_secs(5),
            Duration::from_secs(2),
        )
        .await
    }

    /// Create a new test server with custom timeouts
    pub async fn start_with_timeout<S>(
        router: axum::Router<S>,
        credentials: Credentials,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| TuyaClientError::Config(format!("failed to bind test server: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| TuyaClientError::Config(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let config = ClientConfig {
            base_url: Some(format!("http://{}", addr)),
            timeout,
            connect_timeout,
        };
        let client = TuyaClient::with_config(credentials, config)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
