#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use vvp_core::poll::PollPolicy;
use vvp_core::session::{endpoints, Headers, HttpResponse, HttpSession, TransportError};
use vvp_core::VvpSession;

pub const NAMESPACE: &str = "test";
pub const TARGET_ID: &str = "0b7e8f13-6943-404e-9809-c14db57d195e";
pub const DEPLOYMENT_ID: &str = "58ea758d-02e2-4b8e-8d60-3c36c3413bf3";
pub const JOB_ID: &str = "68ab92d0-1acc-459f-a6ed-26a374e08717";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<String>,
}

enum Scripted {
    Reply(HttpResponse),
    Fail(String),
}

/// In-memory platform: each route replays its queued replies, repeating the last one.
#[derive(Default)]
pub struct ScriptedSession {
    routes: Mutex<HashMap<(&'static str, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: &'static str, path: impl Into<String>, status: u16, body: Value) -> &Self {
        self.push(
            method,
            path.into(),
            Scripted::Reply(HttpResponse {
                status,
                body: body.to_string(),
            }),
        )
    }

    pub fn fail(&self, method: &'static str, path: impl Into<String>, message: &str) -> &Self {
        self.push(method, path.into(), Scripted::Fail(message.to_string()))
    }

    fn push(&self, method: &'static str, path: String, scripted: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path))
            .or_default()
            .push_back(scripted);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    pub fn last_body(&self, method: &str, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|call| call.method == method && call.path == path)
            .and_then(|call| call.body.as_deref())
            .map(|body| serde_json::from_str(body).expect("recorded body is JSON"))
    }

    fn answer(&self, method: &'static str, path: &str, body: Option<String>) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body,
        });

        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&(method, path.to_string())) else {
            return Ok(HttpResponse {
                status: 404,
                body: format!("no route for {method} {path}"),
            });
        };
        let scripted = if queue.len() > 1 { queue.pop_front() } else { None };
        let current = scripted.as_ref().or_else(|| queue.front());
        match current {
            Some(Scripted::Reply(response)) => Ok(response.clone()),
            Some(Scripted::Fail(message)) => Err(TransportError::Request {
                method,
                path: path.to_string(),
                message: message.clone(),
            }),
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[async_trait]
impl HttpSession for ScriptedSession {
    async fn get(&self, path: &str, _headers: &Headers) -> Result<HttpResponse, TransportError> {
        self.answer("GET", path, None)
    }

    async fn post(&self, path: &str, body: String, _headers: &Headers) -> Result<HttpResponse, TransportError> {
        self.answer("POST", path, Some(body))
    }
}

pub fn session(http: &Arc<ScriptedSession>) -> VvpSession {
    VvpSession::new(http.clone(), NAMESPACE)
}

pub fn fast_poll(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts,
        timeout: Duration::from_secs(2),
    }
}

pub fn defaults_path() -> String {
    endpoints::deployment_defaults(NAMESPACE)
}

pub fn validate_path() -> String {
    endpoints::sql_validate(NAMESPACE)
}

pub fn create_path() -> String {
    endpoints::deployments(NAMESPACE)
}

pub fn deployment_path() -> String {
    endpoints::deployment(NAMESPACE, DEPLOYMENT_ID)
}
