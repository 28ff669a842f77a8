use std::collections::HashMap;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use harvest_core::async_trait;
use harvest_core::error::{Error, NetworkError, Result};
use harvest_core::request::Request;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::transport::{Transport, TransportResponse};

/// Transport that renders pages in a headless Chromium.
///
/// The DevTools protocol does not hand back the HTTP status of a navigation,
/// so every page that loads is reported as 200.
pub struct BrowserTransport {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserTransport {
    /// Launch a headless browser
    pub async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(|e| Error::config(format!("Failed to build browser config: {}", e)))?;

        info!("Launching headless browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::other(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
            debug!("Browser event handler task completed");
        });

        Ok(Self { browser, handler })
    }
}

impl Drop for BrowserTransport {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn browser_error(request: &Request, e: impl std::fmt::Display) -> Error {
    Error::fetch(request.url.as_str(), NetworkError::Browser(e.to_string()))
}

#[async_trait]
impl Transport for BrowserTransport {
    fn name(&self) -> &str {
        "browser"
    }

    async fn fetch(&self, request: &Request) -> Result<TransportResponse> {
        if request.proxy.is_some() {
            warn!("Browser transport ignores per-request proxies ({})", request.url);
        }

        let page = self
            .browser
            .new_page(request.url.as_str())
            .await
            .map_err(|e| browser_error(request, e))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| browser_error(request, e))?;

        let html = page.content().await.map_err(|e| browser_error(request, e))?;

        if let Err(e) = page.close().await {
            debug!("Failed to close page for {}: {}", request.url, e);
        }

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "text/html; charset=utf-8".to_string());
        Ok(TransportResponse::new(200, headers, html.into_bytes()))
    }
}
