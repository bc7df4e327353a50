//! HTTP client for the session bridge.
//!
//! The bridge is a small sidecar that owns the logged-in chat user session and
//! exposes it as JSON:
//!
//! - `GET  v1/updates?offset=N&timeout=S` → `{"updates": [{"update_id", "message"}]}`
//! - `POST v1/press` with a [`PressTarget`]
//! - `POST v1/send` with `{"peer", "text"}`
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::{IncomingUpdate, PressTarget};
use crate::transport::{Transport, UpdateSource};

/// Extra time on top of the long-poll window before the HTTP call gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    updates: Vec<IncomingUpdate>,
}

#[derive(Clone)]
pub struct BridgeClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid bridge URL")?;
        let http = Client::builder()
            .user_agent("tg-cardfilter/0.1")
            .build()
            .context("failed to build HTTP client")?;
        let token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid bridge endpoint")?;
        let mut req = self.http.request(method, endpoint);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.build().context("failed to build bridge request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<String> {
        let url = request.url().clone();
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach bridge at {}", url))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(%url, "rate limited by bridge: {}", body);
            return Err(anyhow!("received 429 from bridge: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("bridge error {}: {}", status, body));
        }
        res.text().await.context("failed to read bridge response")
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn poll_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>> {
        let mut request = self.build_request(Method::GET, "v1/updates", None)?;
        request
            .url_mut()
            .query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("timeout", &timeout.as_secs().to_string());
        *request.timeout_mut() = Some(timeout + POLL_GRACE);

        let body = self.execute(request).await?;
        let parsed: UpdatesResponse =
            serde_json::from_str(&body).context("invalid bridge updates JSON")?;
        debug!(count = parsed.updates.len(), offset, "polled updates");
        Ok(parsed.updates)
    }
}

pub fn build_press_body(target: &PressTarget) -> Value {
    json!({
        "chat_id": target.chat_id,
        "message_id": target.message_id,
        "index": target.index,
        "label": target.label,
        "kind": target.kind.as_str(),
    })
}

pub fn build_send_body(peer: &str, text: &str) -> Value {
    json!({ "peer": peer, "text": text })
}

#[async_trait]
impl UpdateSource for BridgeClient {
    async fn next_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<IncomingUpdate>> {
        self.poll_updates(offset, timeout).await
    }
}

#[async_trait]
impl Transport for BridgeClient {
    async fn press(&self, target: &PressTarget) -> Result<()> {
        let body = build_press_body(target);
        let request = self.build_request(Method::POST, "v1/press", Some(&body))?;
        self.execute(request).await?;
        Ok(())
    }

    async fn send_text(&self, peer: &str, text: &str) -> Result<()> {
        let body = build_send_body(peer, text);
        let request = self.build_request(Method::POST, "v1/send", Some(&body))?;
        self.execute(request).await?;
        Ok(())
    }
}
