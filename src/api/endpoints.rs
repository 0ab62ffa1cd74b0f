//! Remote authentication endpoints
//!
//! Request and response bodies for the `users/` endpoints, plus the
//! server-message extraction shared by every failing call.

use serde::{Deserialize, Serialize};

use crate::auth::SessionUser;

pub const LOGIN_PATH: &str = "users/login/";
pub const EXTERNAL_LOGIN_PATH: &str = "users/google/";
pub const REFRESH_PATH: &str = "users/refresh/";
pub const LOGOUT_PATH: &str = "users/logout/";

/// POST users/login/
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub secret: &'a str,
}

/// POST users/google/
#[derive(Debug, Serialize)]
pub struct ExternalLoginRequest<'a> {
    pub id_token: &'a str,
}

/// POST users/refresh/ and users/logout/
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Successful login from either endpoint
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub user: SessionUser,
}

/// Successful refresh. `refresh` is present only when the server rotates it.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Pull a human-readable reason out of an error body.
///
/// Looks at `detail`, `message`, `error`, then the first entry of
/// `non_field_errors`; falls back to the status reason phrase.
pub fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
                .or_else(|| {
                    value
                        .get("non_field_errors")
                        .and_then(|v| v.as_array())
                        .and_then(|errors| errors.first())
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
        });

    from_body.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    })
}

/// Consume a failed response and return its reason
pub async fn read_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_message(status, &body)
}
