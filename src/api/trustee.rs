use tracing::info;
use url::Url;

use super::types::{ConfirmRequest, InitRequest, InitResponse, OtpRequest, OtpResponse};
use super::{ApiClient, ApiReply, RawReply};
use crate::error::{FlowError, Result};
use crate::logging::{mask_name, mask_phone, mask_token};
use crate::protocol::{PhoneNumber, SubjectName, TokenId};

pub const INIT_PATH: &str = "/api/v1/auth/init";
pub const REQUEST_OTP_PATH: &str = "/api/v1/auth/request-otp";
pub const CONFIRM_PATH: &str = "/api/v1/auth/confirm";

/// Client for the identity-verification backend
#[derive(Clone, Debug)]
pub struct TrusteeApi {
    client: ApiClient,
}

/// Fields sent with an OTP request
#[derive(Debug, Clone)]
pub struct OtpSubject<'a> {
    pub token_id: &'a TokenId,
    pub name: &'a SubjectName,
    pub phone: &'a PhoneNumber,
    pub resident_front: &'a str,
    pub carrier: &'a str,
}

impl TrusteeApi {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self {
            client: ApiClient::new(http, base),
        }
    }

    /// Ask the backend for a new verification token.
    ///
    /// A 2xx reply without a `tokenId` is treated as malformed.
    pub async fn init(&self, name: &SubjectName, phone: &PhoneNumber) -> Result<TokenId> {
        info!(
            "Issuing verification token for {} ({})",
            mask_name(name.as_str()),
            mask_phone(phone.digits())
        );

        let reply = self
            .client
            .post_json(
                INIT_PATH,
                &InitRequest {
                    client_data: phone.digits(),
                    name: name.as_str(),
                },
            )
            .await?;

        let body: InitResponse = reply.json()?;
        let token = body
            .token_id
            .as_deref()
            .and_then(|t| TokenId::parse(t).ok())
            .ok_or_else(|| FlowError::MalformedResponse {
                endpoint: INIT_PATH.to_string(),
                message: body
                    .message
                    .clone()
                    .unwrap_or_else(|| "response carried no tokenId".to_string()),
            })?;

        info!("Issued token {}", mask_token(token.as_str()));
        Ok(token)
    }

    /// Request an OTP for an issued token.
    pub async fn request_otp(&self, subject: &OtpSubject<'_>) -> Result<OtpResponse> {
        info!(
            "Requesting OTP for token {} via {}",
            mask_token(subject.token_id.as_str()),
            subject.carrier
        );

        let reply = self
            .client
            .post_json(
                REQUEST_OTP_PATH,
                &OtpRequest {
                    token_id: subject.token_id.as_str(),
                    name: subject.name.as_str(),
                    phone_number: subject.phone.digits(),
                    resident_front: subject.resident_front,
                    carrier: subject.carrier,
                },
            )
            .await?;

        // Some deployments answer with plain text; only the message matters then.
        Ok(reply.json().unwrap_or_else(|_| OtpResponse {
            otp: None,
            message: reply.message(),
        }))
    }

    /// Confirm an OTP. Any 2xx is success; the body is ignored.
    pub async fn confirm(&self, token_id: &TokenId, otp: &str) -> Result<ApiReply> {
        info!("Confirming OTP for token {}", mask_token(token_id.as_str()));
        self.client
            .patch_json(
                CONFIRM_PATH,
                &ConfirmRequest {
                    token_id: token_id.as_str(),
                    otp,
                },
            )
            .await
    }

    /// Forward a raw request to the backend, used by the client app proxy.
    pub async fn forward(
        &self,
        method: reqwest::Method,
        path_and_query: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<RawReply> {
        let mut request = self.client.request(method, path_and_query)?.body(body);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        self.client.send_raw(path_and_query, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBackend;
    use axum::http::StatusCode;
    use serde_json::json;

    fn api(backend: &MockBackend) -> TrusteeApi {
        TrusteeApi::new(reqwest::Client::new(), backend.base_url())
    }

    #[tokio::test]
    async fn test_init_returns_token_and_sends_digits() {
        let backend = MockBackend::start()
            .await
            .respond(INIT_PATH, StatusCode::OK, json!({ "tokenId": "tok_123", "message": "ok" }));

        let token = api(&backend)
            .init(
                &SubjectName::parse("홍길동").unwrap(),
                &PhoneNumber::parse("010-1234-5678").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok_123");
        let calls = backend.calls(INIT_PATH);
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            json!({ "clientData": "01012345678", "name": "홍길동" })
        );
    }

    #[tokio::test]
    async fn test_init_without_token_is_malformed() {
        let backend = MockBackend::start()
            .await
            .respond(INIT_PATH, StatusCode::OK, json!({ "message": "carrier down" }));

        let err = api(&backend)
            .init(
                &SubjectName::parse("홍길동").unwrap(),
                &PhoneNumber::parse("01012345678").unwrap(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::MalformedResponse { ref message, .. } if message == "carrier down"));
    }

    #[tokio::test]
    async fn test_confirm_failure_carries_status_and_message() {
        let backend = MockBackend::start().await.respond(
            CONFIRM_PATH,
            StatusCode::UNAUTHORIZED,
            json!({ "message": "OTP does not match" }),
        );

        let err = api(&backend)
            .confirm(&TokenId::parse("tok_123").unwrap(), "000000")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
        assert_eq!(err.user_message(), "OTP does not match (401)");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let err = TrusteeApi::new(reqwest::Client::new(), base)
            .confirm(&TokenId::parse("tok_123").unwrap(), "482913")
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Network { .. }));
        assert_eq!(
            err.user_message(),
            "A problem occurred while communicating with the server."
        );
    }
}
