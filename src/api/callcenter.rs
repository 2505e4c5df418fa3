use tracing::info;
use url::Url;

use super::types::{AgentLoginResponse, CallOutcome, CallResultRequest, Lead, LoginRequest};
use super::ApiClient;
use crate::error::{FlowError, Result};

pub const AGENT_LOGIN_PATH: &str = "/api/v1/auth/login";
pub const TARGETS_PATH: &str = "/api/v1/outbound/targets";
pub const HISTORY_PATH: &str = "/api/v1/outbound/history";
pub const RESULT_PATH: &str = "/api/v1/outbound/result";

/// Client for the call-center backend
#[derive(Clone, Debug)]
pub struct CallCenterApi {
    client: ApiClient,
}

impl CallCenterApi {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self {
            client: ApiClient::new(http, base),
        }
    }

    /// Log an agent in and return the display name used as `agentId`.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let request = self
            .client
            .request(reqwest::Method::POST, AGENT_LOGIN_PATH)?
            .json(&LoginRequest { username, password });
        let reply = self.client.send(AGENT_LOGIN_PATH, request).await?;
        let body: AgentLoginResponse = reply.json()?;

        if !body.success {
            return Err(FlowError::validation(body.message.unwrap_or_else(|| {
                "Username or password is incorrect.".to_string()
            })));
        }

        let name = body.name.unwrap_or_else(|| username.to_string());
        info!("Agent {} logged in", name);
        Ok(name)
    }

    pub async fn targets(&self) -> Result<Vec<Lead>> {
        self.client.get(TARGETS_PATH, &[]).await?.json()
    }

    pub async fn history(&self) -> Result<Vec<Lead>> {
        self.client.get(HISTORY_PATH, &[]).await?.json()
    }

    pub async fn submit_result(
        &self,
        lead_id: &serde_json::Value,
        customer_name: Option<&str>,
        outcome: CallOutcome,
        agent_id: &str,
    ) -> Result<()> {
        info!("Agent {} recorded {:?} for lead {}", agent_id, outcome, lead_id);
        self.client
            .post_json(
                RESULT_PATH,
                &CallResultRequest {
                    lead_id,
                    customer_name,
                    status: outcome,
                    agent_id,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBackend;
    use axum::http::StatusCode;
    use serde_json::json;

    fn api(backend: &MockBackend) -> CallCenterApi {
        CallCenterApi::new(reqwest::Client::new(), backend.base_url())
    }

    #[tokio::test]
    async fn test_failed_login_surfaces_backend_message() {
        let backend = MockBackend::start().await.respond(
            AGENT_LOGIN_PATH,
            StatusCode::OK,
            json!({ "success": false, "message": "Unknown agent" }),
        );

        let err = api(&backend).login("agent01", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), "Unknown agent");
    }

    #[tokio::test]
    async fn test_submit_result_body() {
        let backend = MockBackend::start()
            .await
            .respond(RESULT_PATH, StatusCode::OK, json!({ "success": true }));

        api(&backend)
            .submit_result(&json!(7), Some("홍*동"), CallOutcome::NoAnswer, "Kim Agent")
            .await
            .unwrap();

        assert_eq!(
            backend.calls(RESULT_PATH)[0],
            json!({
                "leadId": 7,
                "customerName": "홍*동",
                "status": "NO_ANSWER",
                "agentId": "Kim Agent"
            })
        );
    }

    #[tokio::test]
    async fn test_targets_parse() {
        let backend = MockBackend::start().await.respond(
            TARGETS_PATH,
            StatusCode::OK,
            json!([{ "leadId": "L-1", "name": "홍*동", "phone": "010-****-5678" }]),
        );

        let leads = api(&backend).targets().await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].lead_id, json!("L-1"));
        assert_eq!(leads[0].requested_product_type, None);
    }
}
