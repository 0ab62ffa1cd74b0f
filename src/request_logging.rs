//! Per-request trace of the authorized request protocol
//!
//! Each outbound request gets a `RequestTrace` that records:
//! 1. Request metadata (id, method, path, start time)
//! 2. Every state transition, with its timestamp
//! 3. Number of network attempts
//! 4. A completion log line with the final status and elapsed time
//!
//! Tokens never reach the logs; use `mask_token` when one has to be
//! identified.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// States of one authorized request.
///
/// ```text
/// Unsent -> Sent -> Succeeded | Failed | Unauthorized
/// Unauthorized -> RefreshAttempted -> RefreshSucceeded -> Retried -> Sent
///                                  -> RefreshFailed -> SessionTornDown
/// Unauthorized (after retry) -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Unsent,
    Sent,
    Succeeded,
    Unauthorized,
    Failed,
    RefreshAttempted,
    RefreshSucceeded,
    Retried,
    RefreshFailed,
    SessionTornDown,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Unsent => "unsent",
            RequestState::Sent => "sent",
            RequestState::Succeeded => "succeeded",
            RequestState::Unauthorized => "unauthorized",
            RequestState::Failed => "failed",
            RequestState::RefreshAttempted => "refresh_attempted",
            RequestState::RefreshSucceeded => "refresh_succeeded",
            RequestState::Retried => "retried",
            RequestState::RefreshFailed => "refresh_failed",
            RequestState::SessionTornDown => "session_torn_down",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::Failed | RequestState::SessionTornDown
        )
    }

    /// Whether `next` may follow `self`
    pub fn allows(&self, next: RequestState) -> bool {
        use RequestState::*;

        matches!(
            (self, next),
            (Unsent, Sent)
                | (Sent, Succeeded)
                | (Sent, Failed)
                | (Sent, Unauthorized)
                | (Unauthorized, RefreshAttempted)
                | (Unauthorized, Failed)
                | (RefreshAttempted, RefreshSucceeded)
                | (RefreshAttempted, RefreshFailed)
                | (RefreshSucceeded, Retried)
                | (Retried, Sent)
                | (RefreshFailed, SessionTornDown)
        )
    }
}

/// Trace of a single logical request, including its retry
#[derive(Debug, Clone)]
pub struct RequestTrace {
    request_id: String,
    method: String,
    path: String,
    started_at: DateTime<Utc>,
    transitions: Vec<(RequestState, DateTime<Utc>)>,
    attempts: u32,
}

impl RequestTrace {
    pub fn new(method: &str, path: &str) -> Self {
        let started_at = Utc::now();
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            path: path.to_string(),
            started_at,
            transitions: vec![(RequestState::Unsent, started_at)],
            attempts: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.transitions
            .last()
            .map(|(state, _)| *state)
            .unwrap_or(RequestState::Unsent)
    }

    /// Ordered states the request went through, starting with `Unsent`
    pub fn states(&self) -> Vec<RequestState> {
        self.transitions.iter().map(|(state, _)| *state).collect()
    }

    fn state_names(&self) -> Vec<&'static str> {
        self.transitions.iter().map(|(state, _)| state.as_str()).collect()
    }

    /// Number of times the request went over the network
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record(&mut self, next: RequestState) {
        let current = self.state();
        if !current.allows(next) {
            tracing::warn!(
                request_id = %self.request_id,
                from = current.as_str(),
                to = next.as_str(),
                "Unexpected request state transition"
            );
        }

        if next == RequestState::Sent {
            self.attempts += 1;
        }

        tracing::debug!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            state = next.as_str(),
            attempt = self.attempts,
            "Request state changed"
        );

        self.transitions.push((next, Utc::now()));
    }

    /// Log the outcome of the request. `status` is absent when no response
    /// was received.
    pub fn finish(&self, status: Option<u16>) {
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        tracing::info!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            status = status,
            state = self.state().as_str(),
            states = ?self.state_names(),
            attempts = self.attempts,
            elapsed_ms = elapsed_ms,
            "Request completed"
        );
    }
}

/// Short, log-safe form of a token
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "***".to_string()
    } else {
        format!("{}***", prefix)
    }
}
