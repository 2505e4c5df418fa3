//! Cookie plumbing between browsers and the hand-off store.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::state::HandoffStore;

/// Cookie carrying the client app context token
pub const CLIENT_COOKIE: &str = "bank_session";
/// Cookie carrying the verification app context token
pub const VERIFIER_COOKIE: &str = "ssap_session";

/// Extract a session token from cookies
pub fn get_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let cookie = cookie.trim();
            cookie
                .strip_prefix(prefix.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
}

/// Create a session cookie
pub fn create_session_cookie(cookie_name: &str, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400",
        cookie_name, token
    )
}

/// Create a logout cookie (clears the session)
pub fn create_logout_cookie(cookie_name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cookie_name)
}

/// The context of the browser behind one request.
///
/// Browsers without a valid cookie get a fresh context; the cookie is then
/// set on whatever response goes out through [`BrowserSession::respond`].
pub struct BrowserSession<T> {
    pub token: String,
    pub ctx: T,
    fresh: bool,
    cookie_name: &'static str,
}

impl<T: Clone + Default> BrowserSession<T> {
    pub fn resolve(store: &HandoffStore<T>, headers: &HeaderMap, cookie_name: &'static str) -> Self {
        if let Some(token) = get_session_token(headers, cookie_name) {
            if let Some(ctx) = store.get(&token) {
                return Self {
                    token,
                    ctx,
                    fresh: false,
                    cookie_name,
                };
            }
        }

        let ctx = T::default();
        let token = store.create(ctx.clone());
        Self {
            token,
            ctx,
            fresh: true,
            cookie_name,
        }
    }

    /// Write the context back (last write wins).
    pub fn save(&self, store: &HandoffStore<T>) {
        store.put(&self.token, self.ctx.clone());
    }

    pub fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.fresh {
            match HeaderValue::from_str(&create_session_cookie(self.cookie_name, &self.token)) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => warn!("Could not encode session cookie: {}", e),
            }
        }
        response
    }

    /// Drop the context and clear the cookie on `response`.
    pub fn end(self, store: &HandoffStore<T>, response: impl IntoResponse) -> Response {
        store.remove(&self.token);
        let mut response = response.into_response();
        if let Ok(value) = HeaderValue::from_str(&create_logout_cookie(self.cookie_name)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }
}
