//! OTP request/confirm cycle of the verification page.
//!
//! Local checks run before any backend call: an incomplete form, a missing
//! consent, a resend inside the cooldown or a malformed OTP never reach the
//! network. The countdown is display-only; the backend decides expiry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::guard::ValidAccess;
use crate::api::trustee::OtpSubject;
use crate::api::TrusteeApi;
use crate::config::AppConfig;
use crate::error::{FlowError, Result};
use crate::logging::mask_token;
use crate::protocol::{
    PhoneNumber, SubjectName, TokenId, VerificationResult, VerificationSession,
};

/// Seconds shown on the countdown after an OTP is sent
pub const OTP_VALIDITY_SECS: i64 = 180;
/// Resend stays disabled while more than this many seconds remain
pub const RESEND_LOCK_ABOVE_SECS: i64 = 150;
pub const RESIDENT_FRONT_LEN: usize = 6;
pub const OTP_LEN: usize = 6;
pub const MIN_PHONE_DIGITS: usize = 10;
/// An in-flight marker older than this is treated as abandoned
pub const IN_FLIGHT_STALE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Carrier {
    #[serde(rename = "SKT")]
    Skt,
    #[serde(rename = "KT")]
    Kt,
    #[serde(rename = "LGU+")]
    LguPlus,
    #[serde(rename = "ALDDLE")]
    Alddle,
}

impl Carrier {
    pub const ALL: [Carrier; 4] = [Carrier::Skt, Carrier::Kt, Carrier::LguPlus, Carrier::Alddle];

    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Skt => "SKT",
            Carrier::Kt => "KT",
            Carrier::LguPlus => "LGU+",
            Carrier::Alddle => "ALDDLE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Carrier::Alddle => "MVNO (budget carrier)",
            other => other.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw.trim())
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpPhase {
    Entry,
    Sent { sent_at: DateTime<Utc> },
}

/// Raw values submitted from the identity form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resident_front: String,
    #[serde(default)]
    pub carrier: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub agreed: Option<String>,
}

/// Per-browser state of one verification page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpForm {
    pub token_id: TokenId,
    pub name: String,
    pub resident_front: String,
    pub carrier: Option<Carrier>,
    /// Display form, hyphenated
    pub phone: String,
    pub consent: bool,
    pub phase: OtpPhase,
    /// Set while a request-otp or confirm call for this token is in flight
    pub in_flight_since: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub name_locked: bool,
    pub phone_locked: bool,
    pub redirect_url: Option<Url>,
    /// Backend-exposed OTP, kept only in test mode
    pub test_otp: Option<String>,
    pub session: Option<VerificationSession>,
}

/// Successful OTP request
#[derive(Debug, Clone, PartialEq)]
pub struct OtpIssued {
    pub message: String,
    pub test_otp: Option<String>,
}

/// Successful confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Send the browser back to the initiator
    Redirect(Url),
    /// No return target; show a completion message in place
    Completed(String),
}

impl OtpForm {
    /// Fresh form for a validated page visit, with locked fields pre-filled.
    pub fn new(access: &ValidAccess) -> Self {
        let locked_name = access.locked_name();
        let locked_phone = access.locked_phone();
        Self {
            token_id: access.token_id.clone(),
            name: locked_name.map(|n| n.as_str().to_string()).unwrap_or_default(),
            resident_front: String::new(),
            carrier: None,
            phone: locked_phone.map(PhoneNumber::hyphenated).unwrap_or_default(),
            consent: false,
            phase: OtpPhase::Entry,
            in_flight_since: None,
            message: None,
            name_locked: locked_name.is_some(),
            phone_locked: locked_phone.is_some(),
            redirect_url: access.redirect_url.clone(),
            test_otp: None,
            session: None,
        }
    }

    /// Take submitted values, ignoring any change to a locked field.
    ///
    /// Once an OTP has been sent the identity fields are frozen as well.
    pub fn apply_entry(&mut self, entry: &OtpEntry) {
        let sent = matches!(self.phase, OtpPhase::Sent { .. });
        if !self.name_locked && !sent {
            self.name = entry.name.trim().to_string();
        }
        if !self.phone_locked && !sent {
            self.phone = crate::protocol::types::hyphenate(&entry.phone_number);
        }
        if !sent {
            self.resident_front = entry.resident_front.trim().to_string();
            self.carrier = Carrier::parse(&entry.carrier);
        }
        self.consent = matches!(entry.agreed.as_deref(), Some("on" | "true" | "1"));
    }

    /// Seconds left on the display countdown.
    pub fn remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.phase {
            OtpPhase::Entry => 0,
            OtpPhase::Sent { sent_at } => {
                let elapsed = (now - sent_at).num_seconds().max(0);
                (OTP_VALIDITY_SECS - elapsed).max(0)
            }
        }
    }

    pub fn resend_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.phase, OtpPhase::Sent { .. }) && self.remaining(now) > RESEND_LOCK_ABOVE_SECS
    }

    pub fn otp_sent(&self) -> bool {
        matches!(self.phase, OtpPhase::Sent { .. })
    }

    pub fn is_submitting(&self, now: DateTime<Utc>) -> bool {
        self.in_flight_since
            .is_some_and(|since| (now - since).num_seconds() < IN_FLIGHT_STALE_SECS)
    }

    /// Mark a backend call as in flight, refusing a second one.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_submitting(now) {
            return Err(FlowError::validation(
                "Your previous request is still being processed. Please wait.",
            ));
        }
        self.in_flight_since = Some(now);
        Ok(())
    }

    pub fn finish_submit(&mut self) {
        self.in_flight_since = None;
    }

    /// Check everything the OTP request needs, without the network.
    pub fn validate_for_request(&self, now: DateTime<Utc>) -> Result<(SubjectName, PhoneNumber, Carrier)> {
        let carrier = match self.carrier {
            Some(carrier)
                if !self.name.trim().is_empty()
                    && !self.resident_front.is_empty()
                    && !self.phone.is_empty() =>
            {
                carrier
            }
            _ => return Err(FlowError::validation("Please fill in all fields.")),
        };
        if !self.consent {
            return Err(FlowError::validation(
                "Please agree to the identity verification terms.",
            ));
        }
        if self.resident_front.len() != RESIDENT_FRONT_LEN
            || !self.resident_front.chars().all(|c| c.is_ascii_digit())
        {
            return Err(FlowError::validation(
                "Enter the first 6 digits of your resident registration number.",
            ));
        }

        let name = SubjectName::parse(&self.name)?;
        let phone = PhoneNumber::parse(&self.phone)?;
        if phone.len() < MIN_PHONE_DIGITS {
            return Err(FlowError::validation("Please check your phone number."));
        }
        if self.resend_locked(now) {
            let wait = self.remaining(now) - RESEND_LOCK_ABOVE_SECS;
            return Err(FlowError::validation(format!(
                "Please wait {} seconds before requesting a new code.",
                wait
            )));
        }

        Ok((name, phone, carrier))
    }
}

/// Validate an OTP as exactly six ASCII digits.
pub fn validate_otp(raw: &str) -> Result<&str> {
    let otp = raw.trim();
    if otp.len() == OTP_LEN && otp.chars().all(|c| c.is_ascii_digit()) {
        Ok(otp)
    } else {
        Err(FlowError::validation("Enter the 6-digit verification code."))
    }
}

/// Request an OTP for the form's token.
///
/// On failure the form keeps its phase so the user can correct and retry.
pub async fn request_otp(
    trustee: &TrusteeApi,
    config: &AppConfig,
    form: &mut OtpForm,
    now: DateTime<Utc>,
) -> Result<OtpIssued> {
    let (name, phone, carrier) = form.validate_for_request(now)?;

    let reply = trustee
        .request_otp(&OtpSubject {
            token_id: &form.token_id,
            name: &name,
            phone: &phone,
            resident_front: &form.resident_front,
            carrier: carrier.as_str(),
        })
        .await?;
    form.phase = OtpPhase::Sent { sent_at: now };
    form.session = Some(VerificationSession::issued(
        form.token_id.clone(),
        name,
        phone,
        form.redirect_url.clone(),
    ));

    let test_otp = if config.test_mode { reply.otp.clone() } else { None };
    if reply.otp.is_some() && !config.test_mode {
        warn!(
            "Backend exposed an OTP for token {} outside test mode; discarding it",
            mask_token(form.token_id.as_str())
        );
    }
    form.test_otp = test_otp.clone();

    let message = match &test_otp {
        Some(otp) => format!("Verification code sent. (test mode: {})", otp),
        None => "Verification code sent by SMS.".to_string(),
    };
    Ok(OtpIssued { message, test_otp })
}

/// Confirm an OTP and build the return redirect.
pub async fn confirm_otp(trustee: &TrusteeApi, form: &mut OtpForm, raw_otp: &str) -> Result<ConfirmOutcome> {
    let otp = validate_otp(raw_otp)?;

    if let Err(e) = trustee.confirm(&form.token_id, otp).await {
        let attempts = match form.session.as_mut() {
            Some(session) => {
                session.record_rejection(&e);
                session.confirm_attempts
            }
            None => 1,
        };
        warn!(
            "Confirmation rejected for token {} (attempt {}): {}",
            mask_token(form.token_id.as_str()),
            attempts,
            e
        );
        return Err(e);
    }

    let (name, phone) = match form.session.as_mut() {
        Some(session) => {
            session.record_confirmed();
            (session.subject_name.clone(), session.subject_phone.clone())
        }
        None => (SubjectName::parse(&form.name)?, PhoneNumber::parse(&form.phone)?),
    };
    info!("Token {} confirmed", mask_token(form.token_id.as_str()));

    match &form.redirect_url {
        Some(redirect) => {
            let result = VerificationResult {
                token_id: form.token_id.clone(),
                phone,
                name,
            };
            Ok(ConfirmOutcome::Redirect(result.apply_to(redirect)))
        }
        None => Ok(ConfirmOutcome::Completed(
            "Identity verification completed successfully.".to_string(),
        )),
    }
}
