use std::path::PathBuf;

use crate::error::AppError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub google: GoogleSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Remote REST API location
#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApiSettings {
    pub base_url: String,
}

impl ApiSettings {
    /// Join an endpoint path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// External identity provider settings
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,
}

/// Where the session survives restarts. No path means in-memory only.
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct StorageSettings {
    pub path: Option<PathBuf>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct SessionSettings {
    /// Where the UI goes when a session ends
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Locations reachable without a session; no forced redirect from here
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Share one refresh call between requests that hit 401 together
    #[serde(default = "default_coalesce_refresh")]
    pub coalesce_refresh: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            public_paths: default_public_paths(),
            coalesce_refresh: default_coalesce_refresh(),
        }
    }
}

impl SessionSettings {
    /// A location is public if it is a public path or lies beneath one.
    /// Query strings and fragments are ignored.
    pub fn is_public_route(&self, location: &str) -> bool {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        self.public_paths.iter().any(|public| {
            let public = public.trim_end_matches('/');
            match path.strip_prefix(public) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        })
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec!["/login".to_string(), "/public-properties".to_string()]
}

fn default_coalesce_refresh() -> bool {
    true
}

/// Load settings from an optional `configuration` file, then `APP_*`
/// environment variables (`APP_API__BASE_URL=https://...`).
pub fn get_configuration() -> Result<Settings, AppError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(settings.try_deserialize::<Settings>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let api = ApiSettings {
            base_url: "https://api.example.com/api/".to_string(),
        };
        assert_eq!(
            api.endpoint("/users/login/"),
            "https://api.example.com/api/users/login/"
        );
        assert_eq!(
            api.endpoint("users/refresh/"),
            "https://api.example.com/api/users/refresh/"
        );
    }

    #[test]
    fn test_default_public_routes() {
        let session = SessionSettings::default();
        assert!(session.is_public_route("/login"));
        assert!(session.is_public_route("/public-properties"));
        assert!(session.is_public_route("/public-properties/12"));
        assert!(session.is_public_route("/public-properties?ciudad=cali"));
        assert!(!session.is_public_route("/public-properties-admin"));
        assert!(!session.is_public_route("/dashboard"));
        assert!(!session.is_public_route("/"));
    }

    #[test]
    fn test_session_settings_defaults_when_section_missing() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "api": { "base_url": "http://localhost:8000/api" }
        }))
        .expect("Failed to deserialize settings");

        assert_eq!(settings.session.login_path, "/login");
        assert!(settings.session.coalesce_refresh);
        assert!(settings.storage.path.is_none());
        assert!(settings.google.client_id.is_none());
    }

    #[test]
    fn test_environment_overrides_with_app_prefix() {
        std::env::set_var("APP_API__BASE_URL", "https://arriendos.example.com/api");
        std::env::set_var("APP_SESSION__LOGIN_PATH", "/ingreso");

        let settings = get_configuration();

        std::env::remove_var("APP_API__BASE_URL");
        std::env::remove_var("APP_SESSION__LOGIN_PATH");

        let settings = settings.expect("Failed to load configuration");
        assert_eq!(settings.api.base_url, "https://arriendos.example.com/api");
        assert_eq!(settings.session.login_path, "/ingreso");
        assert_eq!(
            settings.session.public_paths,
            vec!["/login".to_string(), "/public-properties".to_string()]
        );
    }
}
