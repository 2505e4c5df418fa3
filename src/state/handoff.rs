//! Per-browser navigation context shared between pages.
//!
//! Each browser gets an opaque uuid cookie; the store maps it to a typed
//! context. Writes replace the whole entry (last write wins) and entries
//! idle for longer than [`HANDOFF_TTL_HOURS`] are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::types::{TermsAgreement, UserProfile};
use crate::flows::OtpForm;
use crate::protocol::TokenId;

pub const HANDOFF_TTL_HOURS: i64 = 24;

/// Registration form values kept while the browser is at the verifier.
///
/// Passwords are never stored here; the user re-enters them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterDraft {
    pub name: String,
    pub username: String,
    pub phone_number: String,
}

/// Client app context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientContext {
    pub logged_in_user: Option<String>,
    pub user_profile: Option<UserProfile>,
    pub register_form: Option<RegisterDraft>,
    pub terms_agreement: Option<TermsAgreement>,
}

impl ClientContext {
    pub fn is_logged_in(&self) -> bool {
        self.logged_in_user.is_some()
    }
}

/// Verification app context: one form per token
#[derive(Debug, Clone, Default)]
pub struct VerifierContext {
    pub forms: HashMap<TokenId, OtpForm>,
}

#[derive(Debug, Clone)]
struct HandoffEntry<T> {
    data: T,
    last_seen: DateTime<Utc>,
}

impl<T> HandoffEntry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen >= Duration::hours(HANDOFF_TTL_HOURS)
    }
}

/// Store mapping browser tokens to their context
pub struct HandoffStore<T> {
    entries: DashMap<String, HandoffEntry<T>>,
}

pub type SharedHandoffStore<T> = Arc<HandoffStore<T>>;

impl<T: Clone + Default> Default for HandoffStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Default> HandoffStore<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn shared() -> SharedHandoffStore<T> {
        Arc::new(Self::new())
    }

    /// Start a context for a new browser and return its token.
    pub fn create(&self, data: T) -> String {
        self.cleanup_expired();
        let token = uuid::Uuid::new_v4().to_string();
        self.entries.insert(
            token.clone(),
            HandoffEntry {
                data,
                last_seen: Utc::now(),
            },
        );
        debug!("Opened hand-off context ({} active)", self.entries.len());
        token
    }

    /// Current context, or `None` for an unknown or expired token.
    pub fn get(&self, token: &str) -> Option<T> {
        let now = Utc::now();
        {
            let mut entry = self.entries.get_mut(token)?;
            if !entry.is_expired(now) {
                entry.last_seen = now;
                return Some(entry.data.clone());
            }
        }
        self.entries.remove(token);
        None
    }

    /// Replace the context for `token`.
    pub fn put(&self, token: &str, data: T) {
        self.entries.insert(
            token.to_string(),
            HandoffEntry {
                data,
                last_seen: Utc::now(),
            },
        );
    }

    /// Read-modify-write on a context under the entry lock.
    ///
    /// Unknown or expired tokens start from default. Two concurrent updates
    /// of one token run one after the other.
    pub fn update<R>(&self, token: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(token.to_string())
            .or_insert_with(|| HandoffEntry {
                data: T::default(),
                last_seen: now,
            });
        if entry.is_expired(now) {
            entry.data = T::default();
        }
        entry.last_seen = now;
        f(&mut entry.data)
    }

    pub fn remove(&self, token: &str) {
        self.entries.remove(token);
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn age(&self, token: &str, by: Duration) {
        if let Some(mut entry) = self.entries.get_mut(token) {
            entry.last_seen = entry.last_seen - by;
        }
    }
}
