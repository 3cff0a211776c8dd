//! Tuya cloud client implementation

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::dispatch::RequestDispatcher;
use crate::error::{Result, ResultExt, TuyaClientError};
use crate::pagination::{DevicePaginator, DEFAULT_PAGE_SIZE};
use crate::sign::rfc3986_encode;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::*;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport and endpoint settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overrides the regional host (proxies, mock servers); a path prefix
    /// such as `http://proxy/tuya` is kept in front of every API path
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Tuya OpenAPI client
///
/// Clones share the same connection pool and access token.
#[derive(Debug, Clone)]
pub struct TuyaClient {
    inner: Arc<RequestDispatcher>,
}

impl TuyaClient {
    /// Create a client for the credentials' regional host
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, ClientConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout, config.connect_timeout)?;
        let base_url = config
            .base_url
            .unwrap_or_else(|| credentials.region.base_url());
        Self::with_transport(credentials, &base_url, Arc::new(transport))
    }

    /// Create a client that sends requests through `transport`
    pub fn with_transport(
        credentials: Credentials,
        base_url: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(TuyaClientError::Config(
                "client id and client secret are required".to_string(),
            ));
        }
        let base_url = Url::parse(base_url)?;

        Ok(Self {
            inner: Arc::new(RequestDispatcher::new(credentials, base_url, transport)),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// The dispatcher, for calling endpoints this client has no method for
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.inner
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in now instead of on the first call
    pub async fn login(&self) -> Result<AccessToken> {
        self.inner.ensure_token().await
    }

    /// Drop the held token; the next call logs in again
    pub async fn clear_token(&self) {
        self.inner.tokens().clear().await;
    }

    // =========================================================================
    // Device Listing
    // =========================================================================

    /// Page through the device list
    pub fn paginate_devices(&self, page_size: u32, fetch_all: bool) -> DevicePaginator<'_> {
        DevicePaginator::new(&self.inner, page_size, fetch_all)
    }

    /// List devices; with `fetch_all` every page is followed
    #[instrument(skip(self))]
    pub async fn list_devices(&self, page_size: u32, fetch_all: bool) -> Result<Vec<Device>> {
        let devices = self
            .paginate_devices(page_size, fetch_all)
            .collect()
            .await
            .with_context(|| "list_devices")?;
        debug!(count = devices.len(), "Listed devices");
        Ok(devices)
    }

    /// List every device with the default page size
    pub async fn list_all_devices(&self) -> Result<Vec<Device>> {
        self.list_devices(DEFAULT_PAGE_SIZE, true).await
    }

    // =========================================================================
    // Device Operations
    // =========================================================================

    /// Current status data points of a device
    #[instrument(skip(self))]
    pub async fn get_device_status(&self, device_id: &str) -> Result<Vec<DeviceStatus>> {
        let path = format!("/v1.0/devices/{}/status", rfc3986_encode(device_id));
        let result = self
            .inner
            .get(&path)
            .await
            .with_context(|| format!("get_device_status({})", device_id))?;

        serde_json::from_value(result)
            .map_err(|e| TuyaClientError::Parse(format!("malformed status: {}", e)))
    }

    /// Send a command batch; returns the full response envelope
    #[instrument(skip(self, commands), fields(count = commands.len()))]
    pub async fn set_device_status(&self, device_id: &str, commands: &[Command]) -> Result<Value> {
        let path = format!("/v1.0/iot-03/devices/{}/commands", rfc3986_encode(device_id));
        self.inner
            .post(&path, &CommandRequest { commands })
            .await
            .with_context(|| format!("set_device_status({})", device_id))
    }

    /// Details of a single device
    #[instrument(skip(self))]
    pub async fn get_device_info(&self, device_id: &str) -> Result<Device> {
        let path = format!("/v1.0/devices/{}", rfc3986_encode(device_id));
        let result = self
            .inner
            .get(&path)
            .await
            .with_context(|| format!("get_device_info({})", device_id))?;

        serde_json::from_value(result)
            .map_err(|e| TuyaClientError::Parse(format!("malformed device: {}", e)))
    }

    /// Id of the first device whose custom name (or name) equals `name`
    ///
    /// Lists every device; `None` if nothing matches.
    #[instrument(skip(self))]
    pub async fn get_device_id_by_name(
        &self,
        name: &str,
        use_custom_name: bool,
    ) -> Result<Option<String>> {
        let devices = self.list_all_devices().await?;

        Ok(devices
            .into_iter()
            .find(|d| {
                let field = if use_custom_name {
                    &d.custom_name
                } else {
                    &d.name
                };
                field.as_deref() == Some(name)
            })
            .and_then(|d| d.id))
    }

    /// First device whose id, name or custom name equals `id_or_name`
    #[instrument(skip(self))]
    pub async fn find_device(&self, id_or_name: &str) -> Result<Device> {
        let devices = self.list_all_devices().await?;
        find_by_identifier(devices, id_or_name)
            .ok_or_else(|| TuyaClientError::NotFound(id_or_name.to_string()))
    }

    /// Whether a device (by id, name or custom name) is online
    pub async fn is_device_online(&self, id_or_name: &str) -> Result<bool> {
        let device = self.find_device(id_or_name).await?;
        Ok(device.online_state())
    }
}

/// First device in list order whose id, name or custom name equals `ident`
fn find_by_identifier(devices: Vec<Device>, ident: &str) -> Option<Device> {
    devices.into_iter().find(|d| {
        d.id.as_deref() == Some(ident)
            || d.name.as_deref() == Some(ident)
            || d.custom_name.as_deref() == Some(ident)
    })
}
