//! Content fetching from URLs, files, and stdin.
//!
//! The pipeline only sees the [`Fetcher`] trait: given a target string it
//! returns the raw HTML or an error. [`SourceFetcher`] is the default,
//! dispatching `http://`/`https://` targets to HTTP and everything else to
//! the local filesystem.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
#[cfg(feature = "fetch")]
use std::time::Duration;

#[cfg(feature = "fetch")]
use reqwest::Client;
#[cfg(feature = "fetch")]
use url::Url;

use crate::{QuarryError, Result};

/// Turns a target key into raw HTML.
///
/// A failed or cancelled fetch must not have side effects; the pipeline
/// only parses and persists after the returned future resolves to `Ok`.
pub trait Fetcher {
    fn fetch(&self, target: &str) -> impl Future<Output = Result<String>>;
}

/// HTTP client configuration for fetching web pages.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 30, user_agent: "Mozilla/5.0 (compatible; Quarry/0.1)".to_string() }
    }
}

/// Returns true if the target looks like an HTTP(S) URL.
pub fn is_http_target(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Fetches HTML content from a URL.
///
/// Follows redirects, respects the configured timeout, and sends a
/// browser-like Accept header.
#[cfg(feature = "fetch")]
pub async fn fetch_url(url: &str, config: &FetchConfig) -> Result<String> {
    let client = build_client(config)?;
    fetch_with_client(&client, url, config).await
}

#[cfg(feature = "fetch")]
fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(QuarryError::HttpError)
}

#[cfg(feature = "fetch")]
async fn fetch_with_client(client: &Client, url: &str, config: &FetchConfig) -> Result<String> {
    let parsed_url = Url::parse(url).map_err(|e| QuarryError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(QuarryError::InvalidUrl(format!(
            "URL must use http:// or https://, got {}",
            parsed_url.scheme()
        )));
    }

    let response = client
        .get(parsed_url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                QuarryError::Timeout { timeout: config.timeout }
            } else {
                QuarryError::HttpError(e)
            }
        })?
        .error_for_status()?;

    Ok(response.text().await?)
}

/// Reads HTML content from a local file.
pub fn fetch_file(path: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(QuarryError::FileNotFound(path_buf))
    } else {
        fs::read_to_string(&path_buf).map_err(QuarryError::from)
    }
}

/// Reads HTML content from standard input until EOF.
pub fn fetch_stdin() -> Result<String> {
    use std::io::{self, Read};

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(QuarryError::from)?;

    Ok(buffer)
}

/// Fetches targets over HTTP with one shared client.
#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

#[cfg(feature = "fetch")]
impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self { client: build_client(&config)?, config })
    }
}

#[cfg(feature = "fetch")]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &str) -> Result<String> {
        fetch_with_client(&self.client, target, &self.config).await
    }
}

/// Treats targets as local file paths.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    async fn fetch(&self, target: &str) -> Result<String> {
        fetch_file(target)
    }
}

/// Dispatches HTTP(S) targets to the network and anything else to files.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    #[cfg(feature = "fetch")]
    http: HttpFetcher,
}

impl SourceFetcher {
    #[cfg(feature = "fetch")]
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self { http: HttpFetcher::new(config)? })
    }

    #[cfg(not(feature = "fetch"))]
    pub fn new(_config: FetchConfig) -> Result<Self> {
        Ok(Self {})
    }
}

impl Fetcher for SourceFetcher {
    async fn fetch(&self, target: &str) -> Result<String> {
        if is_http_target(target) {
            #[cfg(feature = "fetch")]
            return self.http.fetch(target).await;
            #[cfg(not(feature = "fetch"))]
            return Err(QuarryError::InvalidUrl(format!(
                "{}: HTTP targets need the `fetch` feature",
                target
            )));
        }
        fetch_file(target)
    }
}
