//! HTTP remote speaking the realtime-database REST layout served by
//! `rollcall-server`: every node lives at `{base}/db/{path}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::scheduler::Connectivity;

/// Response body of a push.
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

pub struct HttpRemote {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    /// `timeout` bounds every request; the reconciler adds none of its own.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn node_url(&self, path: &str) -> String {
        format!("{}/db/{}", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.node_url(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn ensure_success(resp: Response, path: &str) -> SyncResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(path, status = status.as_u16(), body = %body, "remote rejected request");
    Err(SyncError::Status {
        status: status.as_u16(),
        path: path.to_string(),
    })
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn read(&self, path: &str) -> SyncResult<Option<Value>> {
        let resp = self.request(Method::GET, path).send().await?;
        let value: Value = ensure_success(resp, path).await?.json().await?;
        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }

    async fn push(&self, path: &str, value: Value) -> SyncResult<String> {
        let resp = self.request(Method::POST, path).json(&value).send().await?;
        let body: PushResponse = ensure_success(resp, path).await?.json().await?;
        Ok(body.name)
    }

    async fn update(&self, path: &str, entries: Map<String, Value>) -> SyncResult<()> {
        let resp = self
            .request(Method::PATCH, path)
            .json(&Value::Object(entries))
            .send()
            .await?;
        ensure_success(resp, path).await?;
        Ok(())
    }

    async fn set(&self, path: &str, value: Value) -> SyncResult<()> {
        let resp = self.request(Method::PUT, path).json(&value).send().await?;
        ensure_success(resp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Connectivity for HttpRemote {
    /// Online means the server's health endpoint answers.
    async fn is_online(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }
}
