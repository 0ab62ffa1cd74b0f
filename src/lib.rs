//! Session layer for the rental administration console
//!
//! Holds the access/refresh token pair and the signed-in user, and puts
//! every authorized call to the REST API through a single
//! refresh-and-retry-once protocol.

pub mod api;
pub mod auth;
pub mod configuration;
pub mod error;
pub mod request_logging;
pub mod storage;
pub mod telemetry;

pub use api::{Resource, ResourceClient};
pub use auth::{ApiRequest, SessionEvent, SessionManager, SessionUser};
pub use error::AppError;
