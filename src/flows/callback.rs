use tracing::{info, warn};

use crate::api::BankApi;
use crate::error::{FlowError, Result};
use crate::logging::mask_token;
use crate::protocol::types::digits_only;
use crate::protocol::{ProtocolQuery, TokenId};

/// Name used when the bank confirms a callback without echoing one
pub const FALLBACK_NAME: &str = "Verified";

/// Where the client app continues after a successful callback
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Back to the registration form with the verified fields
    Register(String),
    Dashboard,
}

impl CallbackOutcome {
    pub fn path(&self) -> &str {
        match self {
            CallbackOutcome::Register(path) => path,
            CallbackOutcome::Dashboard => "/dashboard",
        }
    }
}

/// Success needs a 2xx plus an explicit success marker in the body.
pub fn is_success(status_ok: bool, status: Option<&str>, message: Option<&str>) -> bool {
    status_ok
        && (status == Some("success")
            || message
                .map(|m| m.to_lowercase().contains("success"))
                .unwrap_or(false))
}

/// Report a returned verification to the bank and pick the next page.
///
/// `registering` is true when a registration draft is waiting in the
/// browser's hand-off context.
pub async fn handle_callback(
    bank: &BankApi,
    query: &ProtocolQuery,
    registering: bool,
) -> Result<CallbackOutcome> {
    let token_id = query
        .token_id
        .as_deref()
        .and_then(|t| TokenId::parse(t).ok())
        .ok_or(FlowError::InvalidAccess)?;
    let raw_phone = query.phone_number.clone().unwrap_or_default();
    let phone = digits_only(&raw_phone);

    let (reply, body) = bank.callback(&token_id, &phone).await?;
    let message = body.message.clone().or_else(|| reply.message());

    if !is_success(reply.is_success(), body.status.as_deref(), message.as_deref()) {
        warn!(
            "Callback for token {} rejected ({}): {:?}",
            mask_token(token_id.as_str()),
            reply.status,
            message
        );
        let detail = message.unwrap_or_else(|| "The information does not match.".to_string());
        return Err(FlowError::validation(format!("Verification failed: {}", detail)));
    }

    info!("Callback for token {} accepted", mask_token(token_id.as_str()));

    if !registering {
        return Ok(CallbackOutcome::Dashboard);
    }

    let name = body
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let path = format!(
        "/register?verified=true&phoneNumber={}&tokenId={}&name={}",
        urlencoding::encode(&raw_phone),
        urlencoding::encode(token_id.as_str()),
        urlencoding::encode(&name)
    );
    Ok(CallbackOutcome::Register(path))
}
