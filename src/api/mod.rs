//! Remote API surface
//!
//! Wire types for the authentication endpoints and the resource client
//! that domain screens use.

pub mod endpoints;
mod resources;

pub use resources::{Resource, ResourceClient};
