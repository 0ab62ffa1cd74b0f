//! Error handling for the session layer
//!
//! Every failure the session manager can produce maps to one of the
//! domain-specific enums below, and all of them convert into `AppError`,
//! which is what the public API returns.
//!
//! 1. Domain-specific error types
//! 2. Unified application error type
//! 3. Conversions from library errors
//! 4. Structured error logging

use std::error::Error as StdError;
use std::fmt;

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Authentication and session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login rejected; carries the server's human-readable reason
    InvalidCredentials(String),
    /// The retried request was rejected again with 401
    Unauthorized,
    /// Silent refresh failed and the local session was torn down
    SessionExpired,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials(reason) => write!(f, "Invalid credentials: {}", reason),
            AuthError::Unauthorized => write!(f, "Request is not authorized"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
        }
    }
}

impl StdError for AuthError {}

/// Persistent session store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Io(String),
    Serialization(String),
    LockPoisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "Session store I/O error: {}", msg),
            StorageError::Serialization(msg) => {
                write!(f, "Session store serialization error: {}", msg)
            }
            StorageError::LockPoisoned => write!(f, "Session store lock poisoned"),
        }
    }
}

impl StdError for StorageError {}

/// Errors talking to the remote API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response at all (connection refused, DNS, TLS, ...)
    Network(String),
    /// A 2xx response whose body could not be read
    UnexpectedResponse(String),
    /// A non-2xx response from a resource endpoint
    Api { status: u16, message: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "Network error: {}", msg),
            TransportError::UnexpectedResponse(msg) => write!(f, "Unexpected response: {}", msg),
            TransportError::Api { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
        }
    }
}

impl StdError for TransportError {}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

// ============================================================================
// 2. UNIFIED APPLICATION ERROR TYPE
// ============================================================================

/// Central error type returned by every fallible public operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Auth(AuthError),
    Storage(StorageError),
    Transport(TransportError),
    Config(ConfigError),
}

impl AppError {
    /// True for failures caused by the session itself rather than by the
    /// request being made.
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            AppError::Auth(AuthError::Unauthorized) | AppError::Auth(AuthError::SessionExpired)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Transport(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// 3. FROM IMPLEMENTATIONS
// ============================================================================

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Transport(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Transport(TransportError::UnexpectedResponse(err.to_string()))
        } else {
            AppError::Transport(TransportError::Network(err.to_string()))
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => {
                AppError::Config(ConfigError::MissingRequired(key))
            }
            config::ConfigError::Type { .. } => {
                AppError::Config(ConfigError::InvalidValue(err.to_string()))
            }
            other => AppError::Config(ConfigError::ParseError(other.to_string())),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

// ============================================================================
// 4. STRUCTURED ERROR LOGGING
// ============================================================================

impl AppError {
    /// Log the error at a level matching its category
    pub fn log_error(&self, request_id: &str) {
        match self {
            AppError::Auth(AuthError::InvalidCredentials(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Login rejected");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Session error");
            }
            AppError::Transport(TransportError::Api { status, .. }) => {
                tracing::warn!(
                    request_id = request_id,
                    status = status,
                    error = %self,
                    "API returned an error"
                );
            }
            AppError::Transport(e) => {
                tracing::error!(request_id = request_id, error = %e, "Transport error");
            }
            AppError::Storage(e) => {
                tracing::error!(request_id = request_id, error = %e, "Session store error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
        }
    }
}
