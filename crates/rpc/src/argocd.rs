//! Argo CD API client, used when a live Argo CD server is configured.

use std::time::Duration;

use async_trait::async_trait;
use devplane_common::tree::ApplicationTree;
use futures::{stream::BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

/// Argo CD calls belong to the "slow" timeout class.
pub const ARGOCD_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ArgoCdError {
    #[error("argocd request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("argocd returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("argocd response can't be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Address of one resource managed by an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    pub app_name: String,
    pub app_namespace: Option<String>,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub resource_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplicationWatchEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub application: Value,
}

#[derive(Deserialize)]
struct StreamEnvelope {
    result: Option<ApplicationWatchEvent>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ManifestResponse {
    manifest: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArgoCdClient: Send + Sync {
    async fn resource_tree(
        &self,
        app_name: &str,
        app_namespace: Option<String>,
    ) -> Result<ApplicationTree, ArgoCdError>;

    async fn get_application(
        &self,
        app_name: &str,
        app_namespace: Option<String>,
    ) -> Result<Value, ArgoCdError>;

    async fn get_resource(&self, query: &ResourceQuery) -> Result<Value, ArgoCdError>;

    /// Streams application events for `app_name`, or for every application
    /// when it's empty.
    async fn watch(
        &self,
        app_name: &str,
    ) -> Result<BoxStream<'static, Result<ApplicationWatchEvent, ArgoCdError>>, ArgoCdError>;
}

#[derive(Clone)]
pub struct HttpArgoCdClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpArgoCdClient {
    pub fn new(base_url: &str, token: &str, insecure: bool) -> Result<Self, ArgoCdError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        req: reqwest::RequestBuilder,
    ) -> Result<T, ArgoCdError> {
        let resp = req.timeout(ARGOCD_TIMEOUT).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ArgoCdError::Status {
                status: status.as_u16(),
                body: devplane_common::bounded_error(body),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn app_namespace_query(app_namespace: &Option<String>) -> Vec<(&'static str, String)> {
    app_namespace
        .iter()
        .filter(|ns| !ns.is_empty())
        .map(|ns| ("appNamespace", ns.clone()))
        .collect()
}

#[async_trait]
impl ArgoCdClient for HttpArgoCdClient {
    async fn resource_tree(
        &self,
        app_name: &str,
        app_namespace: Option<String>,
    ) -> Result<ApplicationTree, ArgoCdError> {
        let req = self
            .get(&format!("/api/v1/applications/{app_name}/resource-tree"))
            .query(&app_namespace_query(&app_namespace));
        Self::send_json(req).await
    }

    async fn get_application(
        &self,
        app_name: &str,
        app_namespace: Option<String>,
    ) -> Result<Value, ArgoCdError> {
        let req = self
            .get(&format!("/api/v1/applications/{app_name}"))
            .query(&app_namespace_query(&app_namespace));
        Self::send_json(req).await
    }

    async fn get_resource(&self, query: &ResourceQuery) -> Result<Value, ArgoCdError> {
        let mut params = app_namespace_query(&query.app_namespace);
        params.extend([
            ("namespace", query.namespace.clone()),
            ("resourceName", query.resource_name.clone()),
            ("version", query.version.clone()),
            ("group", query.group.clone()),
            ("kind", query.kind.clone()),
        ]);
        let req = self
            .get(&format!("/api/v1/applications/{}/resource", query.app_name))
            .query(&params);
        let resp: ManifestResponse = Self::send_json(req).await?;
        Ok(serde_json::from_str(&resp.manifest)?)
    }

    async fn watch(
        &self,
        app_name: &str,
    ) -> Result<BoxStream<'static, Result<ApplicationWatchEvent, ArgoCdError>>, ArgoCdError> {
        let mut req = self.get("/api/v1/stream/applications");
        if !app_name.is_empty() {
            req = req.query(&[("name", app_name)]);
        }
        // no timeout, the stream stays open until the caller drops it
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArgoCdError::Status {
                status: status.as_u16(),
                body: devplane_common::bounded_error(body),
            });
        }

        let bytes = Box::pin(resp.bytes_stream());
        let lines = futures::stream::unfold(
            (bytes, Vec::<u8>::new(), false),
            |(mut bytes, mut buf, mut done)| async move {
                loop {
                    if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        return Some((Ok(line), (bytes, buf, done)));
                    }
                    if done {
                        if buf.is_empty() {
                            return None;
                        }
                        let line = std::mem::take(&mut buf);
                        return Some((Ok(line), (bytes, buf, done)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                        Some(Err(e)) => {
                            return Some((Err(ArgoCdError::from(e)), (bytes, Vec::new(), true)))
                        }
                        None => done = true,
                    }
                }
            },
        );

        let events = lines.filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(events.boxed())
    }
}

/// Decodes one line of the Argo CD event stream. Blank lines yield `None`.
fn parse_stream_line(line: &[u8]) -> Result<Option<ApplicationWatchEvent>, ArgoCdError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let envelope: StreamEnvelope = serde_json::from_slice(line)?;
    if let Some(err) = envelope.error {
        return Err(ArgoCdError::Status {
            status: err.get("httpCode").and_then(Value::as_u64).unwrap_or(500) as u16,
            body: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(envelope.result)
}
