//! Authorized request protocol
//!
//! Every authorized call goes through `SessionManager::send`:
//!
//! 1. Attach the bearer header from the current access token.
//! 2. Send. Anything but 401 is returned as-is.
//! 3. On the first 401, refresh once and replay the same request with the
//!    new token. A second 401 is returned as `Unauthorized`.
//! 4. If the refresh fails the session is torn down and the shell is told
//!    to go to the login path (unless it is on a public route).
//!
//! Transport failures never trigger a refresh.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};

use crate::auth::credentials::bearer_value;
use crate::auth::session::SessionManager;
use crate::error::{AppError, AuthError};
use crate::request_logging::{RequestState, RequestTrace};

/// A request that can be replayed after a refresh
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Whether this request already used its one refresh-triggered retry
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    /// Another request replaced the token while this one waited
    AlreadyRefreshed,
    Failed,
    /// Another request's failed refresh already ended the session
    AlreadyEnded,
}

impl SessionManager {
    /// Send an authorized request, refreshing and replaying it once on 401.
    ///
    /// Returns the response for every status except 401. A 401 on the
    /// replay gives `Unauthorized`; a failed refresh gives `SessionExpired`.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, AppError> {
        let mut trace = RequestTrace::new(request.method.as_str(), &request.path);
        self.send_traced(request, &mut trace).await
    }

    /// `send`, recording every state transition on `trace`
    pub(crate) async fn send_traced(
        &self,
        mut request: ApiRequest,
        trace: &mut RequestTrace,
    ) -> Result<reqwest::Response, AppError> {
        loop {
            let access_token = self.access_token();
            trace.record(RequestState::Sent);

            let response = match self.dispatch(&request, access_token.as_deref()).await {
                Ok(response) => response,
                Err(e) => {
                    trace.record(RequestState::Failed);
                    trace.finish(None);
                    e.log_error(trace.request_id());
                    return Err(e);
                }
            };

            let status = response.status();
            if status != StatusCode::UNAUTHORIZED {
                trace.record(if status.is_success() {
                    RequestState::Succeeded
                } else {
                    RequestState::Failed
                });
                trace.finish(Some(status.as_u16()));
                return Ok(response);
            }

            trace.record(RequestState::Unauthorized);
            if request.retried {
                trace.record(RequestState::Failed);
                trace.finish(Some(status.as_u16()));
                let err = AppError::from(AuthError::Unauthorized);
                err.log_error(trace.request_id());
                return Err(err);
            }

            request.retried = true;
            trace.record(RequestState::RefreshAttempted);

            match self.refresh_after_unauthorized(access_token.as_deref()).await {
                RefreshOutcome::Refreshed | RefreshOutcome::AlreadyRefreshed => {
                    trace.record(RequestState::RefreshSucceeded);
                    trace.record(RequestState::Retried);
                }
                outcome => {
                    trace.record(RequestState::RefreshFailed);
                    if outcome == RefreshOutcome::Failed {
                        self.redirect_to_login();
                    }
                    trace.record(RequestState::SessionTornDown);
                    trace.finish(Some(status.as_u16()));
                    let err = AppError::from(AuthError::SessionExpired);
                    err.log_error(trace.request_id());
                    return Err(err);
                }
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, AppError> {
        let mut builder = self
            .inner
            .http_client
            .request(request.method.clone(), self.inner.api.endpoint(&request.path));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = access_token {
            builder = builder.header(AUTHORIZATION, bearer_value(token));
        }

        Ok(builder.send().await?)
    }

    /// Run the refresh step for a request rejected while carrying
    /// `sent_with`.
    async fn refresh_after_unauthorized(&self, sent_with: Option<&str>) -> RefreshOutcome {
        if !self.inner.settings.coalesce_refresh {
            return if self.refresh().await {
                RefreshOutcome::Refreshed
            } else {
                RefreshOutcome::Failed
            };
        }

        let _guard = self.inner.refresh_lock.lock().await;
        let current = self.access_token();

        match (current.as_deref(), sent_with) {
            (Some(current), Some(sent)) if current != sent => {
                tracing::debug!("Access token already refreshed by a concurrent request");
                RefreshOutcome::AlreadyRefreshed
            }
            (Some(_), None) => RefreshOutcome::AlreadyRefreshed,
            (None, Some(_)) => {
                tracing::debug!("Session already ended by a concurrent request");
                RefreshOutcome::AlreadyEnded
            }
            _ => {
                if self.refresh_locked().await {
                    RefreshOutcome::Refreshed
                } else {
                    RefreshOutcome::Failed
                }
            }
        }
    }
}
