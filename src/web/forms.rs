//! Form bodies posted to the client app and their local validation.

use serde::Deserialize;

use crate::error::{FlowError, Result};
use crate::protocol::{PhoneNumber, SubjectName, TokenId};

pub const PASSWORD_SPECIALS: &str = "!@#$%^&*";
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 6..=12;
pub const PIN_LEN: usize = 4;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Name and phone re-entered before a verification hand-off
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub verified: String,
}

/// Registration that passed every local check
#[derive(Debug)]
pub struct ValidRegistration {
    pub name: SubjectName,
    pub phone: PhoneNumber,
    pub token_id: TokenId,
}

pub fn username_is_valid(username: &str) -> bool {
    USERNAME_LEN.contains(&username.len()) && username.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn password_is_valid(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c))
}

impl RegisterForm {
    pub fn validate(&self) -> Result<ValidRegistration> {
        if self.verified != "true" || self.token_id.trim().is_empty() {
            return Err(FlowError::validation(
                "Please complete identity verification first.",
            ));
        }
        if !username_is_valid(&self.username) {
            return Err(FlowError::validation(
                "Username must be 6-12 letters or digits.",
            ));
        }
        if !password_is_valid(&self.password) {
            return Err(FlowError::validation(
                "Password must contain a letter, a digit and a special character (!@#$%^&*).",
            ));
        }
        if self.password != self.confirm_password {
            return Err(FlowError::validation("Passwords do not match."));
        }

        let name = SubjectName::parse(&self.name)?;
        let phone = PhoneNumber::parse(&self.phone_number)?;
        if phone.len() < 10 {
            return Err(FlowError::validation("Please check your phone number."));
        }
        Ok(ValidRegistration {
            name,
            phone,
            token_id: TokenId::parse(&self.token_id)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountForm {
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub pin: String,
    #[serde(default)]
    pub token_id: String,
}

impl CreateAccountForm {
    pub fn validate(&self) -> Result<TokenId> {
        if self.account_name.trim().is_empty() {
            return Err(FlowError::validation("Please enter an account name."));
        }
        if self.pin.len() != PIN_LEN || !self.pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(FlowError::validation("The PIN must be 4 digits."));
        }
        TokenId::parse(&self.token_id)
            .map_err(|_| FlowError::validation("Please complete identity verification first."))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentForm {
    pub consent_type: String,
    #[serde(default)]
    pub agreed: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsultForm {
    #[serde(default)]
    pub essential: Option<String>,
    #[serde(default)]
    pub optional: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtpConfirmForm {
    #[serde(default)]
    pub otp: String,
}

/// `?message=` on pages that show a one-off notice
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub message: Option<String>,
}

pub fn is_checked(value: Option<&str>) -> bool {
    matches!(value, Some("on" | "true" | "1"))
}
