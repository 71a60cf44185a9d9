use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{Result, VvpError};

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{method} {path} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },
    #[error("{method} {path} failed: {message}")]
    Request {
        method: &'static str,
        path: String,
        message: String,
    },
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw request capability against the platform. Paths are relative to the base URL.
#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn get(&self, path: &str, headers: &Headers) -> std::result::Result<HttpResponse, TransportError>;

    async fn post(
        &self,
        path: &str,
        body: String,
        headers: &Headers,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

/// A namespace-bound handle on the platform, shared read-only across calls.
#[derive(Clone)]
pub struct VvpSession {
    namespace: String,
    http: Arc<dyn HttpSession>,
}

impl fmt::Debug for VvpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VvpSession")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    namespaces: Vec<NamespaceEntry>,
}

#[derive(Debug, Deserialize)]
struct NamespaceEntry {
    name: String,
}

/// Lists the namespaces visible through `http`, without their `namespaces/` prefix.
pub async fn list_namespaces(http: &dyn HttpSession) -> Result<Vec<String>> {
    let path = endpoints::namespaces();
    let response = http.get(&path, &Headers::new()).await?;
    let body = ensure_success("GET", &path, response)?;
    let list: NamespaceList = decode(&path, &body)?;
    Ok(list
        .namespaces
        .into_iter()
        .map(|entry| match entry.name.strip_prefix("namespaces/") {
            Some(bare) => bare.to_string(),
            None => entry.name,
        })
        .collect())
}

impl VvpSession {
    /// Binds `http` to `namespace` without contacting the server.
    pub fn new(http: Arc<dyn HttpSession>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            http,
        }
    }

    /// Binds `http` to `namespace` after checking the namespace exists.
    pub async fn connect(http: Arc<dyn HttpSession>, namespace: impl Into<String>) -> Result<Self> {
        let session = Self::new(http, namespace);
        let path = endpoints::namespace(&session.namespace);
        let response = session.http.get(&path, &Headers::new()).await?;
        if response.status == 404 {
            return Err(VvpError::configuration(format!(
                "namespace '{}' not found",
                session.namespace
            )));
        }
        ensure_success("GET", &path, response)?;
        debug!(namespace = %session.namespace, "Connected session");
        Ok(session)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn http(&self) -> &dyn HttpSession {
        self.http.as_ref()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self.http.get(path, &json_headers()).await?;
        let body = ensure_success("GET", path, response)?;
        Ok(decode(path, &body)?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let payload = serde_json::to_string(body)?;
        let response = self.http.post(path, payload, &json_headers()).await?;
        let body = ensure_success("POST", path, response)?;
        Ok(decode(path, &body)?)
    }
}

fn json_headers() -> Headers {
    Headers::from([("Accept".to_string(), "application/json".to_string())])
}

fn ensure_success(
    method: &'static str,
    path: &str,
    response: HttpResponse,
) -> std::result::Result<String, TransportError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(TransportError::Status {
            method,
            path: path.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> std::result::Result<T, TransportError> {
    serde_json::from_str(body).map_err(|source| TransportError::Decode {
        path: path.to_string(),
        source,
    })
}

/// REST paths used against the platform.
pub mod endpoints {
    pub fn namespaces() -> String {
        "/namespaces/v1/namespaces".to_string()
    }

    pub fn namespace(ns: &str) -> String {
        format!("/namespaces/v1/namespaces/{ns}")
    }

    pub fn sql_validate(ns: &str) -> String {
        format!("/sql/v1beta1/namespaces/{ns}/sqlscripts:validate")
    }

    pub fn sql_execute(ns: &str) -> String {
        format!("/sql/v1beta1/namespaces/{ns}/sqlscripts:execute")
    }

    pub fn deployment_defaults(ns: &str) -> String {
        format!("/api/v1/namespaces/{ns}/deployment-defaults")
    }

    pub fn deployments(ns: &str) -> String {
        format!("/api/v1/namespaces/{ns}/deployments")
    }

    pub fn deployment(ns: &str, id: &str) -> String {
        format!("/api/v1/namespaces/{ns}/deployments/{id}")
    }
}
