//! HTTP Client Abstraction
//!
//! Opens long-lived streaming responses (Shoutcast/Icecast endpoints) and
//! exposes their headers together with an async body reader.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Request header that asks Shoutcast/Icecast servers to interleave
/// in-band metadata blocks into the body.
pub const ICY_METADATA_HEADER: &str = "Icy-MetaData";

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Ask the server for inline ICY metadata.
    pub fn with_icy_metadata(self) -> Self {
        self.header(ICY_METADATA_HEADER, "1")
    }

    /// Timeout applied to establishing the response (not to the body).
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Boxed async body reader returned by [`HttpClient::open_stream`].
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streaming HTTP response.
///
/// Header names are stored lower-cased so lookups through [`header`](Self::header)
/// are case-insensitive.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: BodyReader,
}

impl HttpStreamResponse {
    /// Build a response, normalising header names to lower case.
    pub fn new(status: u16, headers: HashMap<String, String>, body: BodyReader) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpStreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"AsyncRead { ... }")
            .finish()
    }
}

/// Async HTTP client trait
///
/// Implementations should handle TLS, redirects and connection timeouts. The
/// returned body must stay open for as long as the server keeps sending;
/// internet radio responses have no content length.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn connect(client: &dyn HttpClient) -> Result<()> {
///     let request = HttpRequest::get("http://radio.example/stream").with_icy_metadata();
///     let response = client.open_stream(request).await?;
///     let metaint = response.header("icy-metaint");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and return as soon as the response head is received.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - Request times out
    /// - Server answers with a non-success status
    async fn open_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse>;
}
