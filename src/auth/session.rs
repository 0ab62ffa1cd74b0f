//! Session manager
//!
//! Owns the credential pair and session user, performs login, logout and
//! silent refresh against the remote API, and answers session queries.
//! The authorized request protocol built on top of it lives in
//! `auth::protocol`.

use std::sync::{Arc, RwLock};

use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::api::endpoints::{
    read_error_message, AuthResponse, ExternalLoginRequest, LoginRequest, RefreshRequest,
    RefreshResponse, EXTERNAL_LOGIN_PATH, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH,
};
use crate::auth::credentials::{bearer_value, validate_login_input, CredentialPair, SessionUser};
use crate::auth::events::{EndReason, SessionEvent, EVENT_CAPACITY};
use crate::configuration::{ApiSettings, SessionSettings, Settings};
use crate::error::{AppError, AuthError, TransportError};
use crate::request_logging::mask_token;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, SessionStorage};

/// Cheap to clone; every clone shares the same session.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<SessionInner>,
}

pub(super) struct SessionInner {
    pub(super) http_client: reqwest::Client,
    pub(super) api: ApiSettings,
    pub(super) settings: SessionSettings,
    pub(super) storage: SessionStorage,
    /// Held by every writer of the credential pair: login, logout and refresh
    pub(super) refresh_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    location: RwLock<String>,
    external_client_id: Option<String>,
}

impl SessionManager {
    pub fn new(
        api: ApiSettings,
        settings: SessionSettings,
        store: Arc<dyn KeyValueStore>,
        http_client: reqwest::Client,
    ) -> Self {
        Self::build(api, settings, store, http_client, None)
    }

    /// Build the manager, its store and HTTP client from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let store: Arc<dyn KeyValueStore> = match &settings.storage.path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let http_client = reqwest::Client::builder().build()?;

        tracing::info!(
            base_url = %settings.api.base_url,
            persistent = settings.storage.path.is_some(),
            coalesce_refresh = settings.session.coalesce_refresh,
            "Session manager configured"
        );

        Ok(Self::build(
            settings.api.clone(),
            settings.session.clone(),
            store,
            http_client,
            settings.google.client_id.clone(),
        ))
    }

    fn build(
        api: ApiSettings,
        settings: SessionSettings,
        store: Arc<dyn KeyValueStore>,
        http_client: reqwest::Client,
        external_client_id: Option<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                http_client,
                api,
                settings,
                storage: SessionStorage::new(store),
                refresh_lock: Mutex::new(()),
                events,
                location: RwLock::new("/".to_string()),
                external_client_id,
            }),
        }
    }

    /// Receive session events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Client id the UI's external identity widget needs
    pub fn external_client_id(&self) -> Option<&str> {
        self.inner.external_client_id.as_deref()
    }

    /// Record where the UI currently is; used to decide whether a failed
    /// refresh redirects to the login path.
    pub fn set_location(&self, location: &str) {
        match self.inner.location.write() {
            Ok(mut current) => *current = location.to_string(),
            Err(poisoned) => *poisoned.into_inner() = location.to_string(),
        }
    }

    pub fn location(&self) -> String {
        match self.inner.location.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ------------------------------------------------------------------
    // Login / logout
    // ------------------------------------------------------------------

    pub async fn login_with_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<SessionUser, AppError> {
        let request_id = Uuid::new_v4().to_string();
        let identifier = match validate_login_input(identifier, secret) {
            Ok(identifier) => identifier,
            Err(e) => {
                let err = AppError::from(e);
                err.log_error(&request_id);
                return Err(err);
            }
        };

        let body = LoginRequest {
            identifier: &identifier,
            secret,
        };
        self.establish_session(&request_id, LOGIN_PATH, &body).await
    }

    /// Exchange a third-party identity token for a session
    pub async fn login_with_external_token(&self, id_token: &str) -> Result<SessionUser, AppError> {
        let request_id = Uuid::new_v4().to_string();
        if id_token.trim().is_empty() {
            let err = AppError::from(AuthError::InvalidCredentials(
                "Identity token is required".to_string(),
            ));
            err.log_error(&request_id);
            return Err(err);
        }

        let body = ExternalLoginRequest { id_token };
        self.establish_session(&request_id, EXTERNAL_LOGIN_PATH, &body)
            .await
    }

    async fn establish_session<B: Serialize>(
        &self,
        request_id: &str,
        path: &str,
        body: &B,
    ) -> Result<SessionUser, AppError> {
        let result = {
            let _guard = self.inner.refresh_lock.lock().await;
            self.exchange_for_session(path, body).await
        };
        match &result {
            Ok(user) => {
                tracing::info!(request_id = request_id, user_id = %user.id, "Signed in");
                self.emit(SessionEvent::SignedIn(user.clone()));
            }
            Err(e) => e.log_error(request_id),
        }
        result
    }

    async fn exchange_for_session<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<SessionUser, AppError> {
        let response = self
            .inner
            .http_client
            .post(self.inner.api.endpoint(path))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let reason = read_error_message(response).await;
            return Err(AuthError::InvalidCredentials(reason).into());
        }

        let auth: AuthResponse = response.json().await?;
        let credentials = CredentialPair::new(auth.access, auth.refresh);
        self.inner.storage.save_session(&credentials, &auth.user)?;
        Ok(auth.user)
    }

    /// End the session. The remote invalidation is best effort; the local
    /// session is cleared whatever happens to it.
    pub async fn logout(&self) {
        // An in-flight refresh finishes before the session is cleared
        let _guard = self.inner.refresh_lock.lock().await;

        let refresh_token = match self.inner.storage.refresh_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read refresh token for logout");
                None
            }
        };

        match refresh_token {
            Some(refresh_token) => {
                if let Err(e) = self.invalidate_remote(&refresh_token).await {
                    tracing::warn!(error = %e, "Remote logout failed; clearing local session");
                }
            }
            None => tracing::debug!("No refresh token; skipping remote logout"),
        }

        if self.teardown(EndReason::LoggedOut) {
            self.emit(SessionEvent::NavigateTo(self.inner.settings.login_path.clone()));
        }
    }

    async fn invalidate_remote(&self, refresh_token: &str) -> Result<(), AppError> {
        let request = self
            .inner
            .http_client
            .post(self.inner.api.endpoint(LOGOUT_PATH))
            .json(&RefreshRequest {
                refresh: refresh_token,
            });

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response).await;
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Exchange the refresh token for a new access token.
    ///
    /// Returns false, with the session torn down, when there is no refresh
    /// token or the server refuses it.
    pub async fn refresh(&self) -> bool {
        let _guard = self.inner.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh body; the caller holds `refresh_lock`
    pub(super) async fn refresh_locked(&self) -> bool {
        let refresh_token = match self.inner.storage.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!("No refresh token available");
                self.teardown(EndReason::MissingRefreshToken);
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not read refresh token");
                self.teardown(EndReason::MissingRefreshToken);
                return false;
            }
        };

        let tokens = match self.request_refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected");
                self.teardown(EndReason::RefreshRejected);
                return false;
            }
        };

        if let Err(e) = self
            .inner
            .storage
            .replace_access_token(&tokens.access, tokens.refresh.as_deref())
        {
            tracing::error!(error = %e, "Could not store refreshed access token");
            self.teardown(EndReason::RefreshRejected);
            return false;
        }

        tracing::info!(
            access_token = %mask_token(&tokens.access),
            rotated = tokens.refresh.is_some(),
            "Access token refreshed"
        );
        self.emit(SessionEvent::TokenRefreshed);
        true
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AppError> {
        let response = self
            .inner
            .http_client
            .post(self.inner.api.endpoint(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response).await;
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        Ok(response.json::<RefreshResponse>().await?)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_user(&self) -> Option<SessionUser> {
        match self.inner.storage.user() {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session user");
                None
            }
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.current_user()
            .map(|user| user.has_role(role))
            .unwrap_or(false)
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.current_user().is_some()
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        match self.inner.storage.access_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read access token");
                None
            }
        }
    }

    /// Attach `Authorization: Bearer <access token>` when a token exists
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token() {
            Some(token) => request.header(AUTHORIZATION, bearer_value(&token)),
            None => request,
        }
    }

    // ------------------------------------------------------------------
    // Teardown and signals
    // ------------------------------------------------------------------

    /// Clear the local session. Returns true if there was one and it is
    /// now gone.
    pub(super) fn teardown(&self, reason: EndReason) -> bool {
        let had_session = match self.inner.storage.clear() {
            Ok(had_session) => had_session,
            Err(e) => {
                tracing::error!(error = %e, reason = reason.as_str(), "Could not clear session");
                return false;
            }
        };

        if had_session {
            tracing::info!(reason = reason.as_str(), "Session ended");
            self.emit(SessionEvent::Ended(reason));
        }
        had_session
    }

    /// Ask the shell to go to the login path unless it is on a public route
    pub(super) fn redirect_to_login(&self) {
        let location = self.location();
        if self.inner.settings.is_public_route(&location) {
            tracing::debug!(location = %location, "On a public route; not redirecting");
            return;
        }
        self.emit(SessionEvent::NavigateTo(self.inner.settings.login_path.clone()));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}
