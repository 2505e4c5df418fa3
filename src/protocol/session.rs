use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::types::{PhoneNumber, SubjectName, TokenId};
use crate::error::FlowError;

/// Lifecycle of a verification attempt as seen from the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Token issued, OTP not yet confirmed
    Pending,
    /// OTP accepted by the backend
    Confirmed,
    /// Backend no longer knows or accepts the token
    Expired,
    /// Last confirmation was rejected; the user may try again
    Failed,
}

/// Client-side mirror of one verification attempt.
///
/// The backend owns the real session. This mirror only records what the
/// front end has observed, so a page can tell the user where they stand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSession {
    pub token_id: TokenId,
    pub subject_name: SubjectName,
    pub subject_phone: PhoneNumber,
    pub status: SessionStatus,
    pub redirect_target: Option<Url>,
    pub confirm_attempts: u32,
}

impl VerificationSession {
    pub fn issued(
        token_id: TokenId,
        subject_name: SubjectName,
        subject_phone: PhoneNumber,
        redirect_target: Option<Url>,
    ) -> Self {
        Self {
            token_id,
            subject_name,
            subject_phone,
            status: SessionStatus::Pending,
            redirect_target,
            confirm_attempts: 0,
        }
    }

    pub fn record_confirmed(&mut self) {
        self.confirm_attempts += 1;
        self.status = SessionStatus::Confirmed;
    }

    /// Record a rejected confirmation.
    ///
    /// 404, 410 and 429 mean the backend has given up on the token. Anything
    /// else leaves room for another attempt with the same token. The status
    /// only shapes what the user is told; resubmission is never blocked here.
    pub fn record_rejection(&mut self, error: &FlowError) {
        self.confirm_attempts += 1;
        self.status = match error.status() {
            Some(StatusCode::NOT_FOUND)
            | Some(StatusCode::GONE)
            | Some(StatusCode::TOO_MANY_REQUESTS) => SessionStatus::Expired,
            _ => SessionStatus::Failed,
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Confirmed | SessionStatus::Expired
        )
    }
}
