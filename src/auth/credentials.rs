//! Credential pair and session user
//!
//! The two records the session layer persists. They are created and
//! cleared together.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

const MAX_IDENTIFIER_LENGTH: usize = 254;
const MAX_SECRET_LENGTH: usize = 128;

/// Access/refresh token pair issued at login
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Authorization header value for the access token
    pub fn bearer(&self) -> String {
        bearer_value(&self.access_token)
    }
}

// Tokens stay out of debug output
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

pub fn bearer_value(access_token: &str) -> String {
    format!("Bearer {}", access_token)
}

/// User ids arrive as numbers or strings depending on the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// The authenticated user as returned by the login endpoints.
///
/// Only `id` and `roles` mean anything here; every other profile field is
/// kept as-is in `profile` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl SessionUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Opaque profile field, e.g. `nombre` or `email`
    pub fn profile_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.profile.get(key)
    }
}

/// Check login input before it goes over the network.
/// Returns the trimmed identifier.
pub fn validate_login_input(identifier: &str, secret: &str) -> Result<String, AuthError> {
    let identifier = identifier.trim();

    if identifier.is_empty() {
        return Err(AuthError::InvalidCredentials(
            "Identifier is required".to_string(),
        ));
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(AuthError::InvalidCredentials(format!(
            "Identifier is too long (maximum {} characters)",
            MAX_IDENTIFIER_LENGTH
        )));
    }
    if identifier.chars().any(char::is_control) {
        return Err(AuthError::InvalidCredentials(
            "Identifier contains invalid characters".to_string(),
        ));
    }
    if secret.is_empty() {
        return Err(AuthError::InvalidCredentials(
            "Password is required".to_string(),
        ));
    }
    if secret.chars().count() > MAX_SECRET_LENGTH {
        return Err(AuthError::InvalidCredentials(format!(
            "Password is too long (maximum {} characters)",
            MAX_SECRET_LENGTH
        )));
    }

    Ok(identifier.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bearer_header_format() {
        let pair = CredentialPair::new("A1".to_string(), "R1".to_string());
        assert_eq!(pair.bearer(), "Bearer A1");
    }

    #[test]
    fn test_debug_hides_tokens() {
        let pair = CredentialPair::new("secret-access".to_string(), "secret-refresh".to_string());
        let debug = format!("{:?}", pair);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_user_with_numeric_id_and_extra_fields() {
        let user: SessionUser = serde_json::from_value(json!({
            "id": 7,
            "roles": ["cliente"],
            "nombre": "Ana",
            "celular": "3001234567"
        }))
        .expect("Failed to parse user");

        assert_eq!(user.id, UserId::Numeric(7));
        assert_eq!(user.id.to_string(), "7");
        assert!(user.has_role("cliente"));
        assert!(!user.has_role("admin"));
        assert_eq!(user.profile_field("nombre"), Some(&json!("Ana")));

        let round = serde_json::to_value(&user).expect("Failed to serialize user");
        assert_eq!(round["celular"], json!("3001234567"));
    }

    #[test]
    fn test_user_without_roles() {
        let user: SessionUser =
            serde_json::from_value(json!({ "id": "u-1" })).expect("Failed to parse user");
        assert_eq!(user.id, UserId::Text("u-1".to_string()));
        assert!(user.roles.is_empty());
        assert!(!user.has_role("admin"));
    }

    #[test]
    fn test_validate_login_input_trims_identifier() {
        let identifier = validate_login_input("  3001234567 ", "correct-pw").unwrap();
        assert_eq!(identifier, "3001234567");
    }

    #[test]
    fn test_validate_login_input_rejections() {
        let long_identifier = "9".repeat(255);
        let long_secret = "x".repeat(129);
        let cases = vec![
            ("", "pw", "empty identifier"),
            ("   ", "pw", "blank identifier"),
            (long_identifier.as_str(), "pw", "identifier too long"),
            ("300\n123", "pw", "control character"),
            ("3001234567", "", "empty secret"),
            ("3001234567", long_secret.as_str(), "secret too long"),
        ];

        for (identifier, secret, reason) in cases {
            assert!(
                matches!(
                    validate_login_input(identifier, secret),
                    Err(AuthError::InvalidCredentials(_))
                ),
                "Should reject: {}",
                reason
            );
        }
    }
}
