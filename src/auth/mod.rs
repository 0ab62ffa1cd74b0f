//! Authentication module
//!
//! Session state (credential pair and user), login/logout/refresh, the
//! authorized request protocol, and the events the UI shell reacts to.

mod credentials;
mod events;
mod protocol;
mod session;

pub use credentials::bearer_value;
pub use credentials::validate_login_input;
pub use credentials::{CredentialPair, SessionUser, UserId};
pub use events::{EndReason, SessionEvent};
pub use protocol::ApiRequest;
pub use session::SessionManager;
