//! JSON-over-HTTP provisioning client.
//!
//! Speaks HTTP/1.1 to a marketplace API:
//!
//! ```text
//! POST   {base}/instances        {"offer_id", "label"} → {"instance_id"}
//! GET    {base}/instances/{id}   → {"status", "ssh_host"?, "ssh_port"?, "username"?}
//! DELETE {base}/instances/{id}   → 2xx, or 404 when already gone
//! ```
//!
//! Each request opens its own connection and is bounded by the
//! configured timeout. Only `http://` endpoints are supported.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode, header};
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use tracing::debug;

use spotrace_core::{ConnectionInfo, InstanceId, Offer};

use crate::api::{InstanceStatus, ProvisioningApi};
use crate::error::{ProviderError, ProviderResult};

/// Longest provider body carried into an error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    offer_id: &'a str,
    label: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    instance_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    ssh_host: Option<String>,
    ssh_port: Option<u16>,
    username: Option<String>,
}

/// Provisioning client for a real marketplace endpoint.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    /// `host[:port]` as sent in the Host header.
    authority: String,
    /// `host:port` to dial.
    connect_addr: String,
    /// Path prefix without trailing slash.
    base_path: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> ProviderResult<Self> {
        let uri: http::Uri = config
            .base_url
            .parse()
            .map_err(|e: http::uri::InvalidUri| ProviderError::InvalidUrl(e.to_string()))?;

        if uri.scheme_str() != Some("http") {
            return Err(ProviderError::InvalidUrl(format!(
                "unsupported scheme in {}",
                config.base_url
            )));
        }

        let authority = uri
            .authority()
            .ok_or_else(|| ProviderError::InvalidUrl(format!("missing host in {}", config.base_url)))?;
        let connect_addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        Ok(Self {
            authority: authority.to_string(),
            connect_addr,
            base_path: uri.path().trim_end_matches('/').to_string(),
            api_key: config.api_key,
            timeout: config.request_timeout,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ProviderResult<(StatusCode, Bytes)> {
        let target = format!("{}{}", self.base_path, path);

        match tokio::time::timeout(self.timeout, self.exchange(method, &target, body)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(authority = %self.authority, %target, "provider request timed out");
                Err(ProviderError::Timeout)
            }
        }
    }

    async fn exchange(
        &self,
        method: Method,
        target: &str,
        body: Option<Vec<u8>>,
    ) -> ProviderResult<(StatusCode, Bytes)> {
        let stream = tokio::net::TcpStream::connect(&self.connect_addr)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(target)
            .header(header::HOST, &self.authority)
            .header(header::USER_AGENT, "spotrace/0.1")
            .header(header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        let payload = match body {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(payload)
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
            .to_bytes();

        Ok((status, bytes))
    }
}

fn http_error(status: StatusCode, body: &Bytes) -> ProviderError {
    let text = String::from_utf8_lossy(body);
    let body = if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text.into_owned()
    };
    ProviderError::Http {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvider {
    async fn create_instance(&self, offer: &Offer, label: &str) -> ProviderResult<InstanceId> {
        let body = serde_json::to_vec(&CreateRequest {
            offer_id: &offer.id,
            label,
        })
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let (status, bytes) = self.send(Method::POST, "/instances", Some(body)).await?;
        if !status.is_success() {
            return Err(http_error(status, &bytes));
        }

        let created: CreateResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;
        debug!(offer = %offer.id, instance = %created.instance_id, "provider accepted create");
        Ok(created.instance_id)
    }

    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus> {
        let (status, bytes) = self
            .send(Method::GET, &format!("/instances/{instance_id}"), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(InstanceStatus::new("destroyed"));
        }
        if !status.is_success() {
            return Err(http_error(status, &bytes));
        }

        let record: StatusResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let connection = match (record.ssh_host, record.ssh_port) {
            (Some(host), Some(port)) => Some(ConnectionInfo {
                host,
                port,
                username: record.username,
            }),
            _ => None,
        };

        Ok(InstanceStatus {
            status: record.status,
            connection,
        })
    }

    async fn destroy_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let (status, bytes) = self
            .send(Method::DELETE, &format!("/instances/{instance_id}"), None)
            .await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(true)
        } else {
            Err(http_error(status, &bytes))
        }
    }
}
