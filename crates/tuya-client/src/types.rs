//! Request and response types for the Tuya client

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TuyaClientError;

// =============================================================================
// Credentials
// =============================================================================

/// Data center the cloud project lives in
///
/// The region is the literal infix of the API host, e.g. `eu` in
/// `https://openapi.tuyaeu.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Region {
    Cn,
    Us,
    #[default]
    Eu,
    In,
    /// Any other host infix
    Custom(String),
}

impl Region {
    /// Host infix as used in the API URL
    pub fn as_str(&self) -> &str {
        match self {
            Region::Cn => "cn",
            Region::Us => "us",
            Region::Eu => "eu",
            Region::In => "in",
            Region::Custom(s) => s,
        }
    }

    /// Base URL of the OpenAPI for this region
    pub fn base_url(&self) -> String {
        format!("https://openapi.tuya{}.com", self.as_str())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = TuyaClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TuyaClientError::Config(format!("invalid region: {:?}", s)));
        }
        Ok(match s.as_str() {
            "cn" => Region::Cn,
            "us" => Region::Us,
            "eu" => Region::Eu,
            "in" => Region::In,
            _ => Region::Custom(s),
        })
    }
}

impl TryFrom<String> for Region {
    type Error = TuyaClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.as_str().to_string()
    }
}

/// Cloud project credentials
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub region: Region,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        region: Region,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            region,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

// =============================================================================
// Token Types
// =============================================================================

/// Access token returned by `GET /v1.0/token?grant_type=1`
///
/// Only `access_token` is used for signing. The other fields are kept for
/// callers that want to inspect them; nothing refreshes the token on expiry.
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expire_time: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(skip, default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.access_token
    }

    /// When the provider says the token stops being valid, if it said
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expire_time
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| self.obtained_at.checked_add_signed(lifetime))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expire_time", &self.expire_time)
            .field("uid", &self.uid)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

// =============================================================================
// Device Types
// =============================================================================

/// Device record as listed by the cloud
///
/// Only the fields the client reads are named; everything else the
/// provider sends is preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Missing only on malformed records, which also end pagination
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "customName",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub online: Option<bool>,
    #[serde(
        default,
        rename = "isOnline",
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_online: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// Read one raw list item
    ///
    /// Never fails: objects keep every field they carry, anything else
    /// becomes an empty record with the raw item under `extra["raw"]`.
    pub fn from_value(item: Value) -> Self {
        match item {
            Value::Object(_) => serde_json::from_value(item).unwrap_or_default(),
            other => {
                let mut device = Device::default();
                device.extra.insert("raw".to_string(), other);
                device
            }
        }
    }

    /// `isOnline` if reported, else `online`, else offline
    pub fn online_state(&self) -> bool {
        self.is_online.or(self.online).unwrap_or(false)
    }

    /// The display name: custom name if set, otherwise the product name
    pub fn display_name(&self) -> Option<&str> {
        self.custom_name.as_deref().or(self.name.as_deref())
    }
}

/// One status data point, e.g. `{"code": "switch_1", "value": true}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub code: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single instruction in a command batch
///
/// Codes and values are passed through unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub code: String,
    pub value: Value,
}

impl Command {
    pub fn new(code: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }
}

/// Body of `POST /v1.0/iot-03/devices/{id}/commands`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommandRequest<'a> {
    pub commands: &'a [Command],
}

/// Device ids arrive as strings, occasionally as numbers
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A string field; any other shape reads as absent
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Accept the loose truthiness the cloud uses for online flags
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Null => None,
        Value::Bool(b) => Some(b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => Some(!(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(_) => Some(true),
    }))
}
