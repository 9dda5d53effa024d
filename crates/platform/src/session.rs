//! Shared HTTP session.
//!
//! One connection-pooling client with fixed identity headers (user agent and
//! referer). Every other component issues its requests through it.

use std::sync::{Arc, OnceLock};

use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Endpoints, SessionConfig};
use crate::cookie_utils::{CookieMap, cookie_header};
use crate::error::{PlatformError, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    config: Arc<SessionConfig>,
    endpoints: Arc<Endpoints>,
}

impl HttpSession {
    pub fn new(config: SessionConfig, endpoints: Endpoints) -> Result<Self> {
        install_rustls_provider();

        let referer = HeaderValue::from_str(&endpoints.web_origin)
            .map_err(|e| PlatformError::Config(format!("invalid web origin: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            endpoints: Arc::new(endpoints),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// GET for a JSON API call, bounded by the API timeout.
    pub fn api_get(&self, url: &str, cookies: Option<&CookieMap>) -> RequestBuilder {
        self.get(url, cookies).timeout(self.config.api_timeout())
    }

    /// GET for a streamed transfer; only the connect/read timeouts apply.
    pub fn stream_get(&self, url: &str, cookies: Option<&CookieMap>) -> RequestBuilder {
        self.get(url, cookies)
    }

    fn get(&self, url: &str, cookies: Option<&CookieMap>) -> RequestBuilder {
        let request = self.client.get(url);
        match cookies.filter(|c| !c.is_empty()) {
            Some(cookies) => request.header(COOKIE, cookie_header(cookies)),
            None => request,
        }
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let (body, _) = self.send_json_with_headers(request).await?;
        Ok(body)
    }

    /// Send a request and decode its JSON body, keeping the response headers.
    pub async fn send_json_with_headers<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<(T, HeaderMap)> {
        let response = ensure_success(request.send().await?)?;
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        debug!(url = %url, len = bytes.len(), "API response received");

        let body = serde_json::from_slice(&bytes)
            .map_err(|e| PlatformError::protocol(format!("malformed JSON from {url}: {e}")))?;
        Ok((body, headers))
    }
}

/// Turn a non-2xx response into [`PlatformError::HttpStatus`].
pub fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PlatformError::HttpStatus {
            status,
            url: response.url().to_string(),
        })
    }
}
