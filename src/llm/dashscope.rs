use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::RequestBuilder;
use tokio::sync::OnceCell;

use crate::config::DashScopeConfig;

/// Shared DashScope connection: one HTTP client plus the bearer credential,
/// resolved on first use.
pub struct DashScopeClient {
    http: reqwest::Client,
    config: DashScopeConfig,
    auth_header: OnceCell<String>,
}

impl DashScopeClient {
    pub fn new(http: reqwest::Client, config: DashScopeConfig) -> Self {
        Self {
            http,
            config,
            auth_header: OnceCell::new(),
        }
    }

    /// Client with the same timeouts the server uses.
    pub fn with_default_http(config: DashScopeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(http, config))
    }

    pub fn config(&self) -> &DashScopeConfig {
        &self.config
    }

    /// Bearer header value. Fails loudly when the key is not configured.
    async fn authorization(&self) -> Result<&str> {
        let header = self
            .auth_header
            .get_or_try_init(|| async {
                let key = self
                    .config
                    .api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .context(
                        "Missing DASHSCOPE_API_KEY. Set it in your environment to call DashScope.",
                    )?;
                Ok::<_, anyhow::Error>(format!("Bearer {key}"))
            })
            .await?;
        Ok(header.as_str())
    }

    /// Authorized POST to `url`.
    pub async fn post(&self, url: &str) -> Result<RequestBuilder> {
        let auth = self.authorization().await?;
        Ok(self.http.post(url).header("Authorization", auth))
    }

    /// URL under the OpenAI-compatible base.
    pub fn compatible_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Turn a non-2xx response into an error carrying the status and body.
pub async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("DashScope {what} returned {status}: {body}");
}
