use tracing::{info, warn};
use url::Url;

use super::types::{
    CallbackRequest, CallbackResponse, ConsentStatus, ConsentType, CreateAccountRequest,
    CreateAccountResponse, LeadRequest, LoginRequest, MarketingConsentRequest,
    MarketingConsentResponse, RegisterRequest, TermsAgreement, UpdateConsentRequest, UserProfile,
};
use super::{ApiClient, ApiReply};
use crate::error::Result;
use crate::logging::{mask_name, mask_phone, mask_token};
use crate::protocol::{PhoneNumber, SubjectName, TokenId};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REGISTER_PATH: &str = "/api/v1/auth/register";
pub const CALLBACK_PATH: &str = "/api/v1/auth/callback";
pub const FIND_ID_PATH: &str = "/api/v1/auth/find-id";
pub const CREATE_ACCOUNT_PATH: &str = "/api/v1/accounts/create";
pub const LEADS_PATH: &str = "/api/v1/leads";
pub const MARKETING_CONSENT_PATH: &str = "/api/v1/compliance/marketing-consent";
pub const MY_CONSENT_PATH: &str = "/api/v1/compliance/my-consent";
pub const UPDATE_CONSENT_PATH: &str = "/api/v1/compliance/update-consent";

/// Registration data collected on the register page
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub name: &'a SubjectName,
    pub username: &'a str,
    pub password: &'a str,
    pub phone: &'a PhoneNumber,
    pub token_id: &'a TokenId,
    pub terms: TermsAgreement,
}

/// Client for the bank (entrusting) backend
#[derive(Clone, Debug)]
pub struct BankApi {
    client: ApiClient,
}

impl BankApi {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self {
            client: ApiClient::new(http, base),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        info!("Login attempt for {}", username);
        let reply = self
            .client
            .post_json(LOGIN_PATH, &LoginRequest { username, password })
            .await?;
        let mut profile: UserProfile = reply.json()?;
        if profile.username.is_none() {
            profile.username = Some(username.to_string());
        }
        Ok(profile)
    }

    /// Register a member. The backend answers with plain text.
    pub async fn register(&self, registration: Registration<'_>) -> Result<String> {
        info!(
            "Registering {} ({})",
            registration.username,
            mask_phone(registration.phone.digits())
        );
        let reply = self
            .client
            .post_json(
                REGISTER_PATH,
                &RegisterRequest {
                    name: registration.name.as_str(),
                    username: registration.username,
                    password: registration.password,
                    phone_number: registration.phone.digits(),
                    token_id: registration.token_id.as_str(),
                    terms_agreement: registration.terms.with_carrier_auth(),
                },
            )
            .await?;
        Ok(reply.message().unwrap_or_default())
    }

    /// Report a returned verification to the bank backend.
    ///
    /// The reply is returned unjudged; [`crate::flows::callback`] decides
    /// whether it counts as success.
    pub async fn callback(&self, token_id: &TokenId, phone: &str) -> Result<(ApiReply, CallbackResponse)> {
        info!(
            "Reporting verification callback for token {}",
            mask_token(token_id.as_str())
        );
        let request = self
            .client
            .request(reqwest::Method::POST, CALLBACK_PATH)?
            .json(&CallbackRequest {
                token_id: token_id.as_str(),
                phone_number: phone,
            });
        let reply = self.client.send(CALLBACK_PATH, request).await?;
        let body = reply.json().unwrap_or_else(|_| CallbackResponse {
            message: reply.message(),
            ..Default::default()
        });
        Ok((reply, body))
    }

    /// Look up the username registered to a verified phone and name.
    pub async fn find_id(&self, phone: &PhoneNumber, name: &str) -> Result<String> {
        info!("Looking up member id for {}", mask_name(name));
        let reply = self
            .client
            .get(FIND_ID_PATH, &[("phoneNumber", phone.digits()), ("name", name)])
            .await?;
        Ok(reply.body.trim().to_string())
    }

    pub async fn create_account(
        &self,
        username: &str,
        account_name: &str,
        pin: &str,
        token_id: &TokenId,
    ) -> Result<CreateAccountResponse> {
        info!("Opening account '{}' for {}", account_name, username);
        let reply = self
            .client
            .post_json(
                CREATE_ACCOUNT_PATH,
                &CreateAccountRequest {
                    username,
                    account_name,
                    pin,
                    token_id: token_id.as_str(),
                },
            )
            .await?;
        Ok(reply.json().unwrap_or_else(|_| CreateAccountResponse {
            bonus_applied: false,
            message: reply.message(),
        }))
    }

    pub async fn create_lead(&self, username: &str, profile: &UserProfile, product: &str) -> Result<()> {
        info!(
            "Creating consultation lead for {} ({})",
            mask_name(&profile.name),
            mask_phone(&profile.phone_number)
        );
        self.client
            .post_json(
                LEADS_PATH,
                &LeadRequest {
                    customer_ref: username,
                    name: &profile.name,
                    phone: &profile.phone_number,
                    product_type: product,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn marketing_consent(
        &self,
        username: &str,
        product_name: &str,
        consent_type: &str,
    ) -> Result<MarketingConsentResponse> {
        let reply = self
            .client
            .post_json(
                MARKETING_CONSENT_PATH,
                &MarketingConsentRequest {
                    username,
                    product_name,
                    consent_type,
                },
            )
            .await?;
        Ok(reply.json().unwrap_or_default())
    }

    pub async fn my_consent(&self, username: &str) -> Result<ConsentStatus> {
        let reply = self
            .client
            .get(MY_CONSENT_PATH, &[("username", username)])
            .await?;
        reply.json()
    }

    pub async fn update_consent(&self, username: &str, consent_type: ConsentType, agreed: bool) -> Result<()> {
        if !agreed {
            warn!("{} withdrew {} consent", username, consent_type.as_str());
        }
        self.client
            .post_json(
                UPDATE_CONSENT_PATH,
                &UpdateConsentRequest {
                    username,
                    consent_type,
                    agreed,
                },
            )
            .await?;
        Ok(())
    }
}
