//! Error types for Tuya client operations

use thiserror::Error;

/// Result type alias for Tuya client operations
pub type Result<T> = std::result::Result<T, TuyaClientError>;

/// Errors that can occur during Tuya client operations
#[derive(Error, Debug)]
pub enum TuyaClientError {
    /// Network or TLS failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body was not valid JSON or did not match the expected shape
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Token endpoint answered without an access token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Business error reported by the cloud
    #[error("Tuya API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Device lookup found no match
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header value could not be built (e.g. non-ASCII client id)
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Client construction failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error annotated with the operation or path that failed
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<TuyaClientError>,
    },
}

/// Coarse classification of a [`TuyaClientError`], ignoring added context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Parse,
    Auth,
    Api,
    NotFound,
    Config,
}

impl TuyaClientError {
    /// Create an API error from a provider code and message
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Wrap this error with a description of what was being attempted
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &TuyaClientError {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Api { .. } => ErrorKind::Api,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidUrl(_) | Self::InvalidHeader(_) | Self::Config(_) => ErrorKind::Config,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Provider error code, if this is (or wraps) an API error
    pub fn api_code(&self) -> Option<i64> {
        match self.root() {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TuyaClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Attach context to the error branch of a [`Result`]
pub(crate) trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
