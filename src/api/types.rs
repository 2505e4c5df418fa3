//! Wire types exchanged with the backends. All bodies are camelCase JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Verification backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest<'a> {
    /// Digits-only phone number
    pub client_data: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest<'a> {
    pub token_id: &'a str,
    pub name: &'a str,
    pub phone_number: &'a str,
    pub resident_front: &'a str,
    pub carrier: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpResponse {
    /// Only present when the backend runs in demo mode
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest<'a> {
    pub token_id: &'a str,
    pub otp: &'a str,
}

// ---------------------------------------------------------------------------
// Bank backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Profile returned by a successful bank login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    pub name: String,
    pub phone_number: String,
}

/// Terms agreed to on the signup page.
///
/// Keys follow the bank backend: `age`, `terms`, `privacy`, `uniqueId`,
/// `creditInfo`, `electronicFinance`, `monitoring` are required; the rest
/// are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsAgreement {
    pub agreements: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing_channels: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreed_at: Option<DateTime<Utc>>,
}

pub const REQUIRED_TERMS: &[&str] = &[
    "age",
    "terms",
    "privacy",
    "uniqueId",
    "creditInfo",
    "electronicFinance",
    "monitoring",
];

pub const OPTIONAL_TERMS: &[&str] = &[
    "thirdPartyProvision",
    "ssapProvision",
    "marketingPersonal",
    "marketing",
];

impl TermsAgreement {
    /// Build an agreement from the keys ticked on the signup form.
    pub fn from_checked<'a, I>(checked: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ticked: Vec<&str> = checked.into_iter().collect();
        let agreements: BTreeMap<String, bool> = REQUIRED_TERMS
            .iter()
            .chain(OPTIONAL_TERMS)
            .map(|key| (key.to_string(), ticked.contains(key)))
            .collect();

        let marketing_channels = agreements
            .get("marketing")
            .copied()
            .unwrap_or(false)
            .then(|| BTreeMap::from([("sms".to_string(), true)]));

        Self {
            agreements,
            marketing_channels,
            agreed_at: Some(now),
        }
    }

    pub fn all_required_agreed(&self) -> bool {
        REQUIRED_TERMS
            .iter()
            .all(|key| self.agreements.get(*key).copied().unwrap_or(false))
    }

    /// Carrier authentication is implied by a completed identity check.
    pub fn with_carrier_auth(mut self) -> Self {
        self.agreements.insert("carrierAuth".to_string(), true);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub phone_number: &'a str,
    pub token_id: &'a str,
    pub terms_agreement: TermsAgreement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest<'a> {
    pub token_id: &'a str,
    pub phone_number: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest<'a> {
    pub username: &'a str,
    pub account_name: &'a str,
    pub pin: &'a str,
    pub token_id: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    #[serde(default)]
    pub bonus_applied: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRequest<'a> {
    pub customer_ref: &'a str,
    pub name: &'a str,
    pub phone: &'a str,
    pub product_type: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingConsentRequest<'a> {
    pub username: &'a str,
    pub product_name: &'a str,
    pub consent_type: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingConsentResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub retention_until: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Consent switches shown on the my-page screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentType {
    Marketing,
    SsapProvision,
    ThirdParty,
}

impl ConsentType {
    pub const ALL: [ConsentType; 3] = [
        ConsentType::Marketing,
        ConsentType::SsapProvision,
        ConsentType::ThirdParty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentType::Marketing => "MARKETING",
            ConsentType::SsapProvision => "SSAP_PROVISION",
            ConsentType::ThirdParty => "THIRD_PARTY",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConsentType::Marketing => "Benefit and event notifications",
            ConsentType::SsapProvision => "Contact provision to partner TM center",
            ConsentType::ThirdParty => "Third-party information provision",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatus {
    #[serde(default)]
    pub marketing_agreed: bool,
    #[serde(default)]
    pub marketing_sms: bool,
    #[serde(default)]
    pub ssap_provision_agreed: bool,
    #[serde(default)]
    pub third_party_provision_agreed: bool,
}

impl ConsentStatus {
    pub fn get(&self, consent: ConsentType) -> bool {
        match consent {
            ConsentType::Marketing => self.marketing_agreed,
            ConsentType::SsapProvision => self.ssap_provision_agreed,
            ConsentType::ThirdParty => self.third_party_provision_agreed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConsentRequest<'a> {
    pub username: &'a str,
    pub consent_type: ConsentType,
    pub agreed: bool,
}

// ---------------------------------------------------------------------------
// Call-center backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub lead_id: serde_json::Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub requested_product_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outcome of an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallOutcome {
    Completed,
    Rejected,
    NoAnswer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResultRequest<'a> {
    pub lead_id: &'a serde_json::Value,
    pub customer_name: Option<&'a str>,
    pub status: CallOutcome,
    pub agent_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_request_is_camel_case() {
        let body = serde_json::to_value(InitRequest {
            client_data: "01012345678",
            name: "홍길동",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "clientData": "01012345678", "name": "홍길동" })
        );
    }

    #[test]
    fn test_terms_agreement_from_checked() {
        let now = Utc::now();
        let terms = TermsAgreement::from_checked(REQUIRED_TERMS.iter().copied(), now);
        assert!(terms.all_required_agreed());
        assert_eq!(terms.agreements.get("marketing"), Some(&false));
        assert!(terms.marketing_channels.is_none());

        let partial = TermsAgreement::from_checked(["age", "terms", "marketing"], now);
        assert!(!partial.all_required_agreed());
        assert_eq!(
            partial.marketing_channels,
            Some(BTreeMap::from([("sms".to_string(), true)]))
        );
    }

    #[test]
    fn test_carrier_auth_is_added() {
        let terms = TermsAgreement::default().with_carrier_auth();
        let body = serde_json::to_value(&terms).unwrap();
        assert_eq!(body["agreements"]["carrierAuth"], serde_json::json!(true));
    }

    #[test]
    fn test_consent_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ConsentType::SsapProvision).unwrap(),
            serde_json::json!("SSAP_PROVISION")
        );
        assert_eq!(ConsentType::parse("THIRD_PARTY"), Some(ConsentType::ThirdParty));
        assert_eq!(ConsentType::parse("PERSONAL_MARKETING"), None);
    }

    #[test]
    fn test_call_outcome_wire_names() {
        assert_eq!(
            serde_json::to_value(CallOutcome::NoAnswer).unwrap(),
            serde_json::json!("NO_ANSWER")
        );
    }

    #[test]
    fn test_lead_accepts_numeric_id() {
        let lead: Lead = serde_json::from_str(
            r#"{"leadId":42,"name":"홍*동","phone":"010-****-5678","requestedProductType":"Continue Card"}"#,
        )
        .unwrap();
        assert_eq!(lead.lead_id, serde_json::json!(42));
        assert_eq!(lead.requested_product_type.as_deref(), Some("Continue Card"));
    }
}
