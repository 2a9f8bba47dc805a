//! Request/response values seen by the interceptor, and the network seam.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout for asset fetches in seconds.
const ASSET_TIMEOUT_SECS: u64 = 30;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Parse a method name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Root-relative path (`/icons/icon.png`) or absolute URL.
    pub url: String,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    /// Key under which the response is stored in a cache generation.
    pub fn cache_key(&self) -> &str {
        &self.url
    }

    /// Same request with an absolute URL on `origin` rewritten to its
    /// root-relative path. Other URLs are left as they are.
    pub fn relative_to(&self, origin: &str) -> Request {
        let origin = origin.trim_end_matches('/');
        let path = self
            .url
            .strip_prefix(origin)
            .filter(|_| !origin.is_empty())
            .and_then(|rest| match rest.chars().next() {
                None => Some("/".to_string()),
                Some('/') => Some(rest.to_string()),
                Some('?') | Some('#') => Some(format!("/{}", rest)),
                Some(_) => None,
            });

        match path {
            Some(path) => Request::new(self.method, path),
            None => self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outbound fetch used by the interceptor and the installer.
///
/// A response with any status is a success; only transport failures are
/// errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;

    /// Origin that root-relative paths resolve against, if any.
    fn origin(&self) -> Option<&str> {
        None
    }
}

/// `Network` over HTTP, resolving root-relative paths against an origin.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: String,
}

impl HttpNetwork {
    pub fn new(origin: impl Into<String>) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ASSET_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.origin, url)
        }
    }

    fn to_reqwest(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    fn origin(&self) -> Option<&str> {
        Some(&self.origin)
    }

    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = self.resolve(&request.url);
        let response = self
            .client
            .request(Self::to_reqwest(request.method), &url)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    NetworkError::Unreachable(format!("{}: {}", url, e))
                } else {
                    NetworkError::Http(e)
                }
            })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("POST"), Some(Method::Post));
        assert_eq!(Method::parse("BREW"), None);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::new(200, "<html></html>").with_header("Content-Type", "text/html");
        assert!(response.ok());
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert!(!Response::new(404, "").ok());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let network = HttpNetwork::new("https://troop.example.org/").unwrap();
        assert_eq!(network.resolve("/manifest.json"), "https://troop.example.org/manifest.json");
        assert_eq!(network.resolve("https://cdn.example.org/a.png"), "https://cdn.example.org/a.png");
    }

    #[test]
    fn test_relative_to_strips_matching_origin() {
        let origin = "https://troop.example.org/";
        let rel = |url: &str| Request::get(url).relative_to(origin).url;

        assert_eq!(rel("https://troop.example.org/manifest.json"), "/manifest.json");
        assert_eq!(rel("https://troop.example.org"), "/");
        assert_eq!(rel("https://troop.example.org?v=2"), "/?v=2");
        assert_eq!(rel("/favicon.ico"), "/favicon.ico");
        // Lookalike hosts and other origins are not ours
        assert_eq!(rel("https://troop.example.org.evil/x"), "https://troop.example.org.evil/x");
        assert_eq!(rel("https://cdn.example.org/a.png"), "https://cdn.example.org/a.png");
    }

    #[test]
    fn test_relative_to_keeps_method() {
        let request = Request::new(Method::Head, "https://troop.example.org/").relative_to("https://troop.example.org");
        assert_eq!(request, Request::new(Method::Head, "/"));
    }

    #[test]
    fn test_http_network_reports_origin() {
        let network = HttpNetwork::new("https://troop.example.org/").unwrap();
        assert_eq!(network.origin(), Some("https://troop.example.org"));
    }
}
