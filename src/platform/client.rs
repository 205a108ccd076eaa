//! HTTP transport for page, script, manifest and media requests

use crate::download::retry::{RetryConfig, RetryExecutor};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{header, Client, ClientBuilder, Method, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default desktop browser user agent
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Network collaborator used by the resolver.
///
/// Implementations own retries and timeouts; callers see a single outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a document as text
    async fn fetch_text(&self, url: &str) -> Result<String, TransportError>;

    /// GET `length` bytes starting at `offset`. Reading past the end yields
    /// fewer bytes, or none.
    async fn fetch_bytes_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, TransportError>;

    /// Total size of the resource, if the server reports it
    async fn content_length(&self, _url: &str) -> Result<Option<u64>, TransportError> {
        Ok(None)
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retries
    pub max_retries: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Proxy URL
    pub proxy_url: Option<String>,
    /// Force HTTP/1.1 only (disable HTTP/2)
    pub http1_only: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: None,
            proxy_url: None,
            http1_only: false, // HTTP/2 by default
        }
    }
}

/// [`Transport`] backed by reqwest
pub struct HttpTransport {
    client: Client,
    config: HttpClientConfig,
    retry: RetryExecutor,
}

impl HttpTransport {
    /// Create a transport with default configuration
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a transport with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self, TransportError> {
        let retry = RetryConfig {
            max_retries: config.max_retries,
            ..RetryConfig::default()
        };
        Self::with_retry_config(config, retry)
    }

    /// Create a transport with explicit retry timing
    pub fn with_retry_config(
        config: HttpClientConfig,
        retry: RetryConfig,
    ) -> Result<Self, TransportError> {
        let build_error = |message: String| TransportError::Request {
            url: String::new(),
            message,
        };

        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));

        if config.http1_only {
            builder = builder.http1_only();
        }

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| build_error(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| build_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            retry: RetryExecutor::with_config(retry),
        })
    }

    /// Get client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Create a request with common headers
    fn create_request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::CACHE_CONTROL, "no-cache")
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE {
            Ok(response)
        } else {
            warn!("HTTP request failed with status: {} for {}", status, url);
            Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }
}

/// Total size from a `Content-Range: bytes a-b/total` header
fn total_from_content_range(response: &Response) -> Option<u64> {
    let value = response.headers().get(header::CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        self.retry
            .execute(|| async {
                debug!("GET {}", url);
                let response = self.send(self.create_request(Method::GET, url), url).await?;
                response
                    .text()
                    .await
                    .map_err(|e| TransportError::from_reqwest(url, &e))
            })
            .await
    }

    async fn fetch_bytes_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, TransportError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);

        self.retry
            .execute(|| async {
                let request = self
                    .create_request(Method::GET, url)
                    .header(header::ACCEPT_ENCODING, "identity")
                    .header(header::RANGE, range.as_str());
                let response = self.send(request, url).await?;

                let status = response.status();
                if status == StatusCode::RANGE_NOT_SATISFIABLE {
                    return Ok(Vec::new());
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::from_reqwest(url, &e))?;
                debug!("Received {} bytes for {} from {}", body.len(), range, url);

                // A plain 200 means the server ignored the range
                if status == StatusCode::PARTIAL_CONTENT {
                    Ok(body.to_vec())
                } else {
                    let start = (offset as usize).min(body.len());
                    let end = start.saturating_add(length as usize).min(body.len());
                    Ok(body[start..end].to_vec())
                }
            })
            .await
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>, TransportError> {
        self.retry
            .execute(|| async {
                let request = self
                    .create_request(Method::GET, url)
                    .header(header::ACCEPT_ENCODING, "identity")
                    .header(header::RANGE, "bytes=0-0");
                let response = self.send(request, url).await?;

                Ok(total_from_content_range(&response).or_else(|| {
                    (response.status() == StatusCode::OK)
                        .then(|| response.content_length())
                        .flatten()
                }))
            })
            .await
    }
}
