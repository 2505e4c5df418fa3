//! The two messages of the redirect protocol and their URL encoding.
//!
//! Initiator → verifier: `tokenId`, `name`, `phoneNumber`, `redirectUrl`.
//! Verifier → initiator: the initiator's `redirectUrl` with `tokenId`,
//! `phoneNumber`, `name` and `verified=true` set on it.

use serde::Deserialize;
use url::Url;

use super::types::{PhoneNumber, SubjectName, TokenId};
use crate::error::{FlowError, Result};

pub const PARAM_TOKEN_ID: &str = "tokenId";
pub const PARAM_NAME: &str = "name";
pub const PARAM_PHONE: &str = "phoneNumber";
pub const PARAM_REDIRECT_URL: &str = "redirectUrl";
pub const PARAM_VERIFIED: &str = "verified";

/// Raw query string of a protocol URL, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolQuery {
    pub token_id: Option<String>,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub redirect_url: Option<String>,
    pub verified: Option<String>,
}

impl ProtocolQuery {
    pub fn is_verified(&self) -> bool {
        self.verified.as_deref() == Some("true")
    }

    /// Parse the query component of a URL.
    pub fn from_url(url: &Url) -> Self {
        let mut query = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                PARAM_TOKEN_ID => query.token_id = value,
                PARAM_NAME => query.name = value,
                PARAM_PHONE => query.phone_number = value,
                PARAM_REDIRECT_URL => query.redirect_url = value,
                PARAM_VERIFIED => query.verified = value,
                _ => {}
            }
        }
        query
    }
}

/// Initiator → verifier hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub token_id: TokenId,
    pub name: Option<SubjectName>,
    pub phone: Option<PhoneNumber>,
    pub redirect_url: Option<Url>,
}

impl VerificationRequest {
    /// Verification page URL carrying this request.
    pub fn to_url(&self, verifier_entry: &Url) -> Url {
        let mut url = verifier_entry.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(PARAM_TOKEN_ID, self.token_id.as_str());
            if let Some(name) = &self.name {
                pairs.append_pair(PARAM_NAME, name.as_str());
            }
            if let Some(phone) = &self.phone {
                pairs.append_pair(PARAM_PHONE, phone.digits());
            }
            if let Some(redirect) = &self.redirect_url {
                pairs.append_pair(PARAM_REDIRECT_URL, redirect.as_str());
            }
        }
        url
    }

    /// Validate what arrived on the verification page.
    ///
    /// A missing `tokenId` is the only hard failure. Unusable optional
    /// fields are dropped rather than rejected.
    pub fn from_query(query: &ProtocolQuery) -> Result<Self> {
        let token_id = query
            .token_id
            .as_deref()
            .and_then(|t| TokenId::parse(t).ok())
            .ok_or(FlowError::InvalidAccess)?;

        Ok(Self {
            token_id,
            name: query
                .name
                .as_deref()
                .and_then(|n| SubjectName::parse(n).ok()),
            phone: query
                .phone_number
                .as_deref()
                .and_then(|p| PhoneNumber::parse(p).ok()),
            redirect_url: query.redirect_url.as_deref().and_then(parse_absolute),
        })
    }
}

/// Verifier → initiator hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub token_id: TokenId,
    pub phone: PhoneNumber,
    pub name: SubjectName,
}

impl VerificationResult {
    /// Set the result parameters on the initiator's return URL.
    ///
    /// Existing values for the protocol keys are replaced; every other
    /// parameter of the return URL is preserved in order.
    pub fn apply_to(&self, redirect_url: &Url) -> Url {
        let kept: Vec<(String, String)> = redirect_url
            .query_pairs()
            .filter(|(k, _)| {
                !matches!(
                    k.as_ref(),
                    PARAM_TOKEN_ID | PARAM_PHONE | PARAM_NAME | PARAM_VERIFIED
                )
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = redirect_url.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(PARAM_TOKEN_ID, self.token_id.as_str());
            pairs.append_pair(PARAM_PHONE, self.phone.digits());
            pairs.append_pair(PARAM_NAME, self.name.as_str());
            pairs.append_pair(PARAM_VERIFIED, "true");
        }
        url
    }

    /// Validate what came back to the initiator.
    pub fn from_query(query: &ProtocolQuery) -> Result<Self> {
        let token_id = query
            .token_id
            .as_deref()
            .and_then(|t| TokenId::parse(t).ok())
            .ok_or(FlowError::InvalidAccess)?;

        if !query.is_verified() {
            return Err(FlowError::validation(
                "Identity verification has not been completed.",
            ));
        }

        let phone = PhoneNumber::parse(query.phone_number.as_deref().unwrap_or_default())?;
        let name = SubjectName::parse(query.name.as_deref().unwrap_or_default())?;

        Ok(Self {
            token_id,
            phone,
            name,
        })
    }
}

/// Accept only absolute http(s) URLs as return targets.
pub fn parse_absolute(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Url {
        Url::parse("http://localhost:5176/verify").unwrap()
    }

    fn request() -> VerificationRequest {
        VerificationRequest {
            token_id: TokenId::parse("tok_123").unwrap(),
            name: Some(SubjectName::parse("홍길동").unwrap()),
            phone: Some(PhoneNumber::parse("010-1234-5678").unwrap()),
            redirect_url: Some(
                Url::parse("http://localhost:5175/create-account?verified=true").unwrap(),
            ),
        }
    }

    #[test]
    fn test_request_survives_the_browser_hop() {
        let url = request().to_url(&entry());
        let query = ProtocolQuery::from_url(&url);
        assert_eq!(query.token_id.as_deref(), Some("tok_123"));
        assert_eq!(query.phone_number.as_deref(), Some("01012345678"));
        assert_eq!(VerificationRequest::from_query(&query).unwrap(), request());
    }

    #[test]
    fn test_request_params_keep_their_order() {
        let url = request().to_url(&entry());
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["tokenId", "name", "phoneNumber", "redirectUrl"]);
    }

    #[test]
    fn test_missing_token_is_invalid_access() {
        let query = ProtocolQuery {
            name: Some("홍길동".into()),
            phone_number: Some("01012345678".into()),
            redirect_url: Some("http://localhost:5175/auth/callback".into()),
            ..Default::default()
        };
        assert!(matches!(
            VerificationRequest::from_query(&query),
            Err(FlowError::InvalidAccess)
        ));

        let blank = ProtocolQuery {
            token_id: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(
            VerificationRequest::from_query(&blank),
            Err(FlowError::InvalidAccess)
        ));
    }

    #[test]
    fn test_unusable_redirect_is_dropped() {
        let query = ProtocolQuery {
            token_id: Some("tok_1".into()),
            redirect_url: Some("javascript:alert(1)".into()),
            ..Default::default()
        };
        let parsed = VerificationRequest::from_query(&query).unwrap();
        assert_eq!(parsed.redirect_url, None);
        assert_eq!(parsed.name, None);
    }

    #[test]
    fn test_result_replaces_protocol_keys_and_keeps_others() {
        let result = VerificationResult {
            token_id: TokenId::parse("tok_123").unwrap(),
            phone: PhoneNumber::parse("010-1234-5678").unwrap(),
            name: SubjectName::parse("홍길동").unwrap(),
        };
        let redirect =
            Url::parse("http://localhost:5175/create-account?verified=true&step=2").unwrap();
        let url = result.apply_to(&redirect);

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("step".to_string(), "2".to_string()),
                ("tokenId".to_string(), "tok_123".to_string()),
                ("phoneNumber".to_string(), "01012345678".to_string()),
                ("name".to_string(), "홍길동".to_string()),
                ("verified".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(url.path(), "/create-account");

        let back = VerificationResult::from_query(&ProtocolQuery::from_url(&url)).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_result_requires_verified_flag() {
        let query = ProtocolQuery {
            token_id: Some("tok_123".into()),
            phone_number: Some("01012345678".into()),
            name: Some("홍길동".into()),
            verified: Some("false".into()),
            ..Default::default()
        };
        assert!(matches!(
            VerificationResult::from_query(&query),
            Err(FlowError::Validation(_))
        ));
    }
}
