//! Stub of the remote REST API used by the integration tests.
//!
//! Every call is recorded. The `users/` endpoints answer with configurable
//! replies; any other path is a protected resource that answers with the
//! resource reply for bearer tokens listed in `valid_tokens` and 401 otherwise.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};

use rentadmin::configuration::{ApiSettings, SessionSettings};
use rentadmin::storage::MemoryStore;
use rentadmin::{SessionEvent, SessionManager};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct StubReply {
    pub status: u16,
    pub body: Value,
}

impl StubReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

pub struct StubApi {
    pub calls: Mutex<Vec<RecordedCall>>,
    pub login: Mutex<StubReply>,
    pub google: Mutex<StubReply>,
    pub refresh: Mutex<StubReply>,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub logout: Mutex<StubReply>,
    pub valid_tokens: Mutex<HashSet<String>>,
    pub resource_reply: Mutex<StubReply>,
}

impl Default for StubApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            login: Mutex::new(StubReply::new(
                401,
                json!({"detail": "No active account found with the given credentials"}),
            )),
            google: Mutex::new(StubReply::new(400, json!({"detail": "Invalid token"}))),
            refresh: Mutex::new(StubReply::new(
                401,
                json!({"detail": "Token is invalid or expired"}),
            )),
            refresh_delay: Mutex::new(None),
            logout: Mutex::new(StubReply::new(205, Value::Null)),
            valid_tokens: Mutex::new(HashSet::new()),
            resource_reply: Mutex::new(StubReply::new(200, json!([]))),
        }
    }
}

impl StubApi {
    pub fn set_login(&self, status: u16, body: Value) {
        *self.login.lock().unwrap() = StubReply::new(status, body);
    }

    pub fn set_google(&self, status: u16, body: Value) {
        *self.google.lock().unwrap() = StubReply::new(status, body);
    }

    pub fn set_refresh(&self, status: u16, body: Value) {
        *self.refresh.lock().unwrap() = StubReply::new(status, body);
    }

    /// Hold refresh replies back, leaving room for a concurrent login or logout
    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_logout(&self, status: u16, body: Value) {
        *self.logout.lock().unwrap() = StubReply::new(status, body);
    }

    pub fn set_resource_body(&self, body: Value) {
        self.set_resource_reply(200, body);
    }

    /// Reply given to authorized calls on protected paths
    pub fn set_resource_reply(&self, status: u16, body: Value) {
        *self.resource_reply.lock().unwrap() = StubReply::new(status, body);
    }

    pub fn accept_token(&self, token: &str) {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

async fn handle(req: HttpRequest, body: web::Bytes, stub: web::Data<StubApi>) -> HttpResponse {
    let authorization = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let path = req.path().to_string();

    stub.calls.lock().unwrap().push(RecordedCall {
        method: req.method().to_string(),
        path: path.clone(),
        query: req.query_string().to_string(),
        authorization: authorization.clone(),
        body,
    });

    if path == "/users/refresh/" {
        let delay = *stub.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            actix_web::rt::time::sleep(delay).await;
        }
    }

    let reply = match path.as_str() {
        "/users/login/" => stub.login.lock().unwrap().clone(),
        "/users/google/" => stub.google.lock().unwrap().clone(),
        "/users/refresh/" => stub.refresh.lock().unwrap().clone(),
        "/users/logout/" => stub.logout.lock().unwrap().clone(),
        _ => {
            let token = authorization
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .unwrap_or_default();
            if stub.valid_tokens.lock().unwrap().contains(token) {
                stub.resource_reply.lock().unwrap().clone()
            } else {
                StubReply::new(401, json!({"detail": "Given token not valid for any token type"}))
            }
        }
    };

    let status = StatusCode::from_u16(reply.status).unwrap();
    if reply.body.is_null() {
        HttpResponse::build(status).finish()
    } else {
        HttpResponse::build(status).json(reply.body)
    }
}

pub struct TestApp {
    pub address: String,
    pub stub: web::Data<StubApi>,
    pub store: Arc<MemoryStore>,
    pub session: SessionManager,
}

pub fn spawn_stub(stub: StubApi) -> (String, web::Data<StubApi>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let stub = web::Data::new(stub);
    let server_stub = stub.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_stub.clone())
            .default_service(web::route().to(handle))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen")
    .run();

    let _ = tokio::spawn(server);

    (format!("http://127.0.0.1:{}", port), stub)
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(SessionSettings::default())
}

pub fn spawn_app_with(settings: SessionSettings) -> TestApp {
    rentadmin::telemetry::init_telemetry();

    let (address, stub) = spawn_stub(StubApi::default());
    let store = Arc::new(MemoryStore::new());
    let session = SessionManager::new(
        ApiSettings {
            base_url: address.clone(),
        },
        settings,
        store.clone(),
        reqwest::Client::new(),
    );

    TestApp {
        address,
        stub,
        store,
        session,
    }
}

/// Address nothing listens on
pub fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Everything currently queued on a subscription
pub fn drain(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

pub fn login_reply() -> Value {
    json!({
        "access": "A1",
        "refresh": "R1",
        "user": {"id": 7, "roles": ["cliente"], "nombre": "Ana"}
    })
}

/// Log in as the standard test user against the stub
pub async fn signed_in_app() -> TestApp {
    signed_in_app_with(SessionSettings::default()).await
}

pub async fn signed_in_app_with(settings: SessionSettings) -> TestApp {
    let app = spawn_app_with(settings);
    app.stub.set_login(200, login_reply());
    app.session
        .login_with_credentials("3001234567", "correct-pw")
        .await
        .expect("Failed to log in");
    app
}
