//! Client for the upstream OCR table-recognition service.
//!
//! The service takes the raw document as an `application/octet-stream` body and, when asked with
//! `excel=1`, answers `{"result": {"excel": "<base64 xlsx>", ...}}`. One call is made per inbound
//! upload and failures are never retried.

use crate::api::models::ocr::RecognitionEnvelope;
use crate::config::UpstreamConfig;
use crate::errors::{Error, Result};
use bytes::Bytes;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::instrument;
use url::Url;

/// Raw answer of the OCR service, before any interpretation.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// The `result` object of a successful recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// `result.excel`, untouched
    pub excel_base64: String,
    /// The whole `result` object, `excel` included
    pub result: Map<String, Value>,
}

impl UpstreamResponse {
    /// Interpret the response: only 200 is success, and its body must carry `result.excel`.
    pub fn into_recognition(self) -> Result<Recognition> {
        if self.status != StatusCode::OK {
            return Err(Error::Upstream {
                status: self.status.as_u16(),
                body: String::from_utf8_lossy(&self.body).into_owned(),
            });
        }

        parse_recognition(&self.body)
    }
}

/// Extract `result` and `result.excel` from a recognition body.
pub fn parse_recognition(body: &[u8]) -> Result<Recognition> {
    let RecognitionEnvelope { result } = serde_json::from_slice(body)?;

    let excel_base64 = match result.get("excel") {
        Some(Value::String(excel)) => excel.clone(),
        Some(other) => {
            return Err(Error::ResponseParse {
                detail: format!("field `result.excel` must be a string, got {}", json_type(other)),
            });
        }
        None => {
            return Err(Error::ResponseParse {
                detail: "missing field `result.excel`".to_string(),
            });
        }
    };

    Ok(Recognition { excel_base64, result })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// HTTP client bound to one recognition endpoint.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        crate::install_crypto_provider();

        let client = reqwest::Client::builder().connect_timeout(config.connect_timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send a document for recognition.
    ///
    /// Transport failures, including the timeout and a body that breaks off mid-read, become
    /// [`Error::UpstreamUnreachable`]. Dropping the returned future aborts the exchange.
    #[instrument(skip_all, fields(endpoint = %self.endpoint, payload_len = payload.len()))]
    pub async fn recognize(&self, payload: Bytes) -> Result<UpstreamResponse> {
        let started = Instant::now();

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "OCR request failed");
                e
            })?;

        let status = response.status();
        let body = response.bytes().await?;

        tracing::info!(
            status = status.as_u16(),
            response_len = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "OCR request completed"
        );

        Ok(UpstreamResponse { status, body })
    }
}
