//! Typed HTTP clients for the three backends.
//!
//! Typed calls go through [`ApiClient::send`], which reads the body exactly
//! once and keeps it as text. The pass-through proxy uses
//! [`ApiClient::send_raw`] instead. A failed call becomes [`FlowError::Http`] with
//! the JSON `message` field when the body has one, or the raw body otherwise.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FlowError, Result};

pub mod bank;
pub mod callcenter;
pub mod trustee;
pub mod types;

pub use bank::BankApi;
pub use callcenter::CallCenterApi;
pub use trustee::TrusteeApi;

/// Base URL plus a shared reqwest client
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

/// Status and body of a completed backend call
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub endpoint: String,
    pub status: StatusCode,
    pub body: String,
}

/// Backend reply kept byte for byte, for pass-through
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

fn network_error(endpoint: &str, source: reqwest::Error) -> FlowError {
    warn!("Request to {} failed: {}", endpoint, source);
    FlowError::Network {
        endpoint: endpoint.to_string(),
        source,
    }
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        Ok(self.http.request(method, url))
    }

    /// Send a request and read its body as text.
    ///
    /// Transport failures become [`FlowError::Network`]; any HTTP status is
    /// returned as-is for the caller to judge.
    pub async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<ApiReply> {
        let response = request
            .send()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        debug!("{} answered {}", endpoint, status);

        Ok(ApiReply {
            endpoint: endpoint.to_string(),
            status,
            body,
        })
    }

    /// Send a request and keep the body as bytes with its content type.
    pub async fn send_raw(&self, endpoint: &str, request: RequestBuilder) -> Result<RawReply> {
        let response = request
            .send()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(endpoint, e))?
            .to_vec();

        debug!("{} answered {} ({} bytes)", endpoint, status, body.len());
        Ok(RawReply {
            status,
            content_type,
            body,
        })
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiReply> {
        let request = self.request(Method::POST, path)?.json(body);
        self.send(path, request).await?.error_for_status()
    }

    pub async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiReply> {
        let request = self.request(Method::PATCH, path)?.json(body);
        self.send(path, request).await?.error_for_status()
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiReply> {
        let request = self.request(Method::GET, path)?.query(query);
        self.send(path, request).await?.error_for_status()
    }
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx reply into [`FlowError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FlowError::Http {
                status: self.status,
                message: self.message().unwrap_or_default(),
            })
        }
    }

    /// `message` from a JSON body, or the raw body when it is not JSON.
    pub fn message(&self) -> Option<String> {
        extract_message(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| FlowError::MalformedResponse {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })
    }
}

/// Pull a user-facing message out of a response body.
pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_from_json() {
        assert_eq!(
            extract_message(r#"{"status":"error","message":"Token expired"}"#).as_deref(),
            Some("Token expired")
        );
        assert_eq!(
            extract_message(r#"{"error":"Bad Request"}"#).as_deref(),
            Some("Bad Request")
        );
    }

    #[test]
    fn test_extract_message_falls_back_to_raw_text() {
        assert_eq!(
            extract_message("Identity mismatch").as_deref(),
            Some("Identity mismatch")
        );
        assert_eq!(extract_message("  "), None);
        assert_eq!(extract_message(r#"{"code":7}"#).as_deref(), Some(r#"{"code":7}"#));
    }

    #[test]
    fn test_error_for_status() {
        let reply = ApiReply {
            endpoint: "/api/v1/auth/confirm".to_string(),
            status: StatusCode::GONE,
            body: r#"{"message":"Verification time has expired"}"#.to_string(),
        };
        let err = reply.error_for_status().unwrap_err();
        match err {
            FlowError::Http { status, message } => {
                assert_eq!(status, StatusCode::GONE);
                assert_eq!(message, "Verification time has expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
