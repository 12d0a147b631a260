//! Browser rendering port
//!
//! The URL check treats a rendered navigation's main-document status as
//! ground truth. Rendering happens in an isolated, ephemeral context: one
//! context per probe, closed on every exit path by [`render_page`].
//! Implementations must also release OS resources on `Drop`, which covers
//! unwinding out of a navigation.
//!
//! [`HttpBrowserLauncher`] is the built-in backend: each context is a fresh
//! HTTP client with its own cookie jar, browser headers, redirect following,
//! and a full document read before the status is reported. It executes no
//! scripts, so its navigations report `rendered = false` and a 403 it
//! receives is never classified as an IP block. IP-block detection needs a
//! CDP or WebDriver backend plugged in through the same two traits.

use async_trait::async_trait;
use reqwest::{header, redirect, Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of the rendering machinery (not of the target site)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// Browser or context could not be started
    #[error("browser context launch failed: {0}")]
    Launch(String),

    /// Page did not settle within the hard cap
    #[error("navigation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Network-level navigation failure (DNS, TLS, connection reset, ...)
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Identity a context presents to the site
#[derive(Debug, Clone)]
pub struct ContextProfile {
    pub user_agent: String,
}

/// Result of a completed navigation
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// Status of the main document after redirects
    pub status_code: u16,
    /// URL the navigation ended on
    pub final_url: String,
    /// Page was loaded by a script-executing browser engine
    pub rendered: bool,
}

/// Opens isolated browser contexts
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open_context(
        &self,
        profile: &ContextProfile,
    ) -> Result<Box<dyn BrowserContext>, RenderError>;
}

/// One ephemeral browsing context
#[async_trait]
pub trait BrowserContext: Send {
    /// Navigate and wait for DOM content; callers bound this with a timeout
    async fn navigate(&mut self, url: &Url) -> Result<Navigation, RenderError>;

    /// Release the context; must be safe to call after a failed navigation
    async fn close(&mut self);
}

/// Open a fresh context, navigate under `settle_cap`, always close
pub async fn render_page(
    launcher: &dyn BrowserLauncher,
    profile: &ContextProfile,
    url: &Url,
    settle_cap: Duration,
) -> Result<Navigation, RenderError> {
    let mut context = match tokio::time::timeout(settle_cap, launcher.open_context(profile)).await {
        Ok(opened) => opened?,
        Err(_) => return Err(RenderError::Timeout(settle_cap)),
    };

    let outcome = match tokio::time::timeout(settle_cap, context.navigate(url)).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout(settle_cap)),
    };

    context.close().await;
    outcome
}

/// HTTP-client backed launcher presenting as a desktop browser
#[derive(Debug, Clone)]
pub struct HttpBrowserLauncher {
    max_redirects: usize,
}

impl HttpBrowserLauncher {
    pub fn new() -> Self {
        Self { max_redirects: 10 }
    }
}

impl Default for HttpBrowserLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowserLauncher {
    async fn open_context(
        &self,
        profile: &ContextProfile,
    ) -> Result<Box<dyn BrowserContext>, RenderError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            header::HeaderValue::from_static("1"),
        );

        let client = Client::builder()
            .user_agent(profile.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .redirect(redirect::Policy::limited(self.max_redirects))
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        Ok(Box::new(HttpBrowserContext {
            client: Some(client),
        }))
    }
}

/// Context owning its own client and cookie jar; dropped on close
struct HttpBrowserContext {
    client: Option<Client>,
}

#[async_trait]
impl BrowserContext for HttpBrowserContext {
    async fn navigate(&mut self, url: &Url) -> Result<Navigation, RenderError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| RenderError::Navigation("context already closed".to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RenderError::Navigation(describe_reqwest_error(&e)))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        // Read the whole document; a truncated body still reports the status
        if let Err(e) = response.bytes().await {
            debug!(url = %final_url, error = %e, "Document body read failed after headers");
        }

        Ok(Navigation {
            status_code,
            final_url,
            rendered: false,
        })
    }

    async fn close(&mut self) {
        if self.client.take().is_none() {
            warn!("Browser context closed twice");
        }
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else if e.is_redirect() {
        format!("redirect loop: {}", e)
    } else {
        e.to_string()
    }
}
