use url::Url;

use crate::error::{FlowError, Result};
use crate::protocol::{PhoneNumber, ProtocolQuery, SubjectName, TokenId, VerificationRequest};

/// Identity fields asserted by the initiator. Present fields are read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockedIdentity {
    pub name: Option<SubjectName>,
    pub phone: Option<PhoneNumber>,
}

impl LockedIdentity {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none()
    }
}

/// Verification page opened with a token
#[derive(Debug, Clone, PartialEq)]
pub struct ValidAccess {
    pub token_id: TokenId,
    pub locked: Option<LockedIdentity>,
    pub redirect_url: Option<Url>,
}

/// Outcome of opening the verification page.
///
/// `Invalid` is terminal: the page renders a denial and offers no form.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessGuard {
    Valid(ValidAccess),
    Invalid,
}

impl AccessGuard {
    /// Decide from the query string alone. Never touches the network.
    pub fn evaluate(query: &ProtocolQuery) -> Self {
        match VerificationRequest::from_query(query) {
            Ok(request) => {
                let locked = LockedIdentity {
                    name: request.name,
                    phone: request.phone,
                };
                AccessGuard::Valid(ValidAccess {
                    token_id: request.token_id,
                    locked: (!locked.is_empty()).then_some(locked),
                    redirect_url: request.redirect_url,
                })
            }
            Err(_) => AccessGuard::Invalid,
        }
    }

    pub fn into_valid(self) -> Result<ValidAccess> {
        match self {
            AccessGuard::Valid(access) => Ok(access),
            AccessGuard::Invalid => Err(FlowError::InvalidAccess),
        }
    }
}

impl ValidAccess {
    pub fn locked_name(&self) -> Option<&SubjectName> {
        self.locked.as_ref().and_then(|l| l.name.as_ref())
    }

    pub fn locked_phone(&self) -> Option<&PhoneNumber> {
        self.locked.as_ref().and_then(|l| l.phone.as_ref())
    }

    /// Login page on the initiator's origin, for the header back action.
    pub fn back_target(&self) -> Option<Url> {
        let redirect = self.redirect_url.as_ref()?;
        let mut target = redirect.clone();
        target.set_path("/login");
        target.set_query(None);
        target.set_fragment(None);
        Some(target)
    }
}
