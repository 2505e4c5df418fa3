use tracing::{info, warn};
use url::Url;

use crate::api::types::UserProfile;
use crate::api::TrusteeApi;
use crate::config::AppConfig;
use crate::error::{FlowError, Result};
use crate::logging::{mask_name, mask_phone};
use crate::protocol::{PhoneNumber, SubjectName, VerificationRequest};

/// Client app page the verification app sends the browser back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTarget {
    Registration,
    AccountOpening,
    FindId,
}

impl ReturnTarget {
    pub fn path(&self) -> &'static str {
        match self {
            ReturnTarget::Registration => "/auth/callback",
            ReturnTarget::AccountOpening => "/create-account?verified=true",
            ReturnTarget::FindId => "/find-id?verified=true",
        }
    }

    pub fn url(&self, config: &AppConfig) -> Result<Url> {
        config.client_page(self.path())
    }
}

/// Obtain a token and build the verification page URL.
///
/// Nothing is retried. On any failure the caller shows the error and stays
/// on its page.
pub async fn initiate_verification(
    trustee: &TrusteeApi,
    config: &AppConfig,
    name: &str,
    phone: &str,
    target: ReturnTarget,
) -> Result<Url> {
    let name = SubjectName::parse(name)
        .map_err(|_| FlowError::validation("Please enter both your name and phone number."))?;
    let phone = PhoneNumber::parse(phone)
        .map_err(|_| FlowError::validation("Please enter both your name and phone number."))?;

    let token_id = trustee.init(&name, &phone).await.map_err(|e| {
        warn!(
            "Verification init failed for {} ({}): {}",
            mask_name(name.as_str()),
            mask_phone(phone.digits()),
            e
        );
        e
    })?;

    let redirect_url = target.url(config)?;
    let request = VerificationRequest {
        token_id,
        name: Some(name),
        phone: Some(phone),
        redirect_url: Some(redirect_url),
    };
    let location = request.to_url(&config.verifier_entry()?);

    info!("Sending browser to verifier, returning to {}", target.path());
    Ok(location)
}

/// Re-entered identity must match the signed-in member.
pub fn check_profile_match(profile: &UserProfile, name: &str, phone: &str) -> Result<()> {
    let entered_name = name.trim();
    let entered_phone = crate::protocol::types::digits_only(phone);
    if entered_name.is_empty() || entered_phone.is_empty() {
        return Err(FlowError::validation("Please enter both your name and phone number."));
    }

    let profile_phone = crate::protocol::types::digits_only(&profile.phone_number);
    if entered_name != profile.name.trim() || entered_phone != profile_phone {
        warn!(
            "Profile mismatch: entered {} ({}), profile {} ({})",
            mask_name(entered_name),
            mask_phone(&entered_phone),
            mask_name(&profile.name),
            mask_phone(&profile_phone)
        );
        return Err(FlowError::ProfileMismatch);
    }
    Ok(())
}
