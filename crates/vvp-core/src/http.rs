//! `reqwest`-backed transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use crate::session::{Headers, HttpResponse, HttpSession, TransportError};

/// HTTP transport rooted at a base URL, carrying default headers on every request.
#[derive(Debug, Clone)]
pub struct ReqwestSession {
    base_url: String,
    client: Client,
    default_headers: Headers,
}

impl ReqwestSession {
    pub fn new(
        base_url: impl Into<String>,
        default_headers: Headers,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Request {
                method: "BUILD",
                path: String::new(),
                message: err.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            default_headers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Session headers first, then request headers, so request values win.
    fn merged_headers(&self, request_headers: &Headers) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in self.default_headers.iter().chain(request_headers.iter()) {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    async fn send(
        &self,
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let response = request.send().await.map_err(|err| {
            warn!(method, path, error = %err, "HTTP request failed");
            TransportError::Request {
                method,
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| TransportError::Request {
            method,
            path: path.to_string(),
            message: err.to_string(),
        })?;
        debug!(
            method,
            path,
            status,
            duration_ms = started.elapsed().as_millis() as u64,
            "HTTP response received"
        );

        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn get(&self, path: &str, headers: &Headers) -> Result<HttpResponse, TransportError> {
        let request = self.client.get(self.url(path)).headers(self.merged_headers(headers)?);
        self.send("GET", path, request).await
    }

    async fn post(&self, path: &str, body: String, headers: &Headers) -> Result<HttpResponse, TransportError> {
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        header_map.extend(self.merged_headers(headers)?);
        let request = self.client.post(self.url(path)).headers(header_map).body(body);
        self.send("POST", path, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_doubling_slashes() {
        let session =
            ReqwestSession::new("http://localhost:8080/", Headers::new(), Duration::from_secs(5)).expect("client");
        assert_eq!(session.url("/api/v1/x"), "http://localhost:8080/api/v1/x");
        assert_eq!(session.url("test"), "http://localhost:8080/test");
    }

    #[test]
    fn request_headers_override_session_headers() {
        let defaults = Headers::from([
            ("x-shared".to_string(), "session".to_string()),
            ("x-session".to_string(), "kept".to_string()),
        ]);
        let session = ReqwestSession::new("http://localhost", defaults, Duration::from_secs(5)).expect("client");
        let merged = session
            .merged_headers(&Headers::from([("x-shared".to_string(), "request".to_string())]))
            .expect("headers");

        assert_eq!(merged.get("x-shared").map(|v| v.to_str().unwrap()), Some("request"));
        assert_eq!(merged.get("x-session").map(|v| v.to_str().unwrap()), Some("kept"));
    }

    #[test]
    fn invalid_header_name_is_reported() {
        let session = ReqwestSession::new("http://localhost", Headers::new(), Duration::from_secs(5)).expect("client");
        let err = session
            .merged_headers(&Headers::from([("bad header".to_string(), "v".to_string())]))
            .expect_err("invalid");
        assert!(matches!(err, TransportError::InvalidHeader(name) if name == "bad header"));
    }
}
