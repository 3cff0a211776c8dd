//! Tuya Cloud Client Library
//!
//! Provides a signed HTTP client for the Tuya IoT cloud OpenAPI.
//!
//! # Example
//!
//! ```rust,no_run
//! use tuya_client::{Command, Credentials, Region, TuyaClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TuyaClient::new(Credentials::new("client-id", "secret", Region::Eu))?;
//!
//!     // Logs in on the first call, then lists every device
//!     let devices = client.list_devices(20, true).await?;
//!
//!     // Look a device up by the name shown in the app
//!     if let Some(id) = client.get_device_id_by_name("Lavastoviglie", true).await? {
//!         let status = client.get_device_status(&id).await?;
//!         client
//!             .set_device_status(&id, &[Command::new("switch_1", false)])
//!             .await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Signing
//!
//! Every request is signed with HMAC-SHA256 over a canonical form of the
//! request; see [`sign`]. The access token is obtained lazily and reused for
//! the lifetime of the client. It is never refreshed automatically; call
//! [`TuyaClient::clear_token`] to force a new login.
//!
//! # Testing
//!
//! The `testing` module provides utilities for integration testing:
//!
//! ```rust,ignore
//! use tuya_client::testing::{verify_signature, TestServer};
//!
//! let server = TestServer::start(mock_cloud_router(), credentials).await?;
//! let devices = server.client.list_devices(20, true).await?;
//! ```

mod client;
mod dispatch;
mod error;
pub mod pagination;
pub mod sign;
pub mod testing;
mod token;
pub mod transport;
mod types;

pub use client::{ClientConfig, TuyaClient};
pub use dispatch::RequestDispatcher;
pub use error::{ErrorKind, Result, TuyaClientError};
pub use pagination::DevicePaginator;
pub use token::{TokenManager, TOKEN_PATH};
pub use transport::{HttpRequest, ReqwestTransport, Transport};
pub use types::*;
