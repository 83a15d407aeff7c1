// MIT License
// reqwest-backed transport to the panel's web server

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::Transport;
use crate::constants::COMMAND_CONTENT_TYPE;
use crate::error::{BridgeError, Result};

/// Plain-HTTP transport. The panel does not serve TLS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is `http://<device>` without a trailing slash.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("elitesx2mqtt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_body(path: &str, resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::UnexpectedStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

impl Transport for HttpTransport {
    async fn get(&self, path: &str, token: &str) -> Result<String> {
        debug!("GET {}", path);
        // The token is appended with `?` even when `path` already carries a
        // query, which is the form the panel's own pages request.
        let resp = self
            .http
            .get(format!("{}?guid={}", self.url(path), token))
            .send()
            .await?;
        Self::read_body(path, resp).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        debug!("POST {} (form)", path);
        let resp = self.http.post(self.url(path)).form(form).send().await?;
        Self::read_body(path, resp).await
    }

    async fn post_body(&self, path: &str, body: String) -> Result<String> {
        debug!("POST {}", path);
        let resp = self
            .http
            .post(self.url(path))
            .header(CONTENT_TYPE, COMMAND_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        Self::read_body(path, resp).await
    }
}
