//! Runtime configuration for both front ends and the agent console.
//!
//! Everything comes from environment variables (a `.env` file is loaded by
//! `main` first). Backend bases and public origins are validated as absolute
//! URLs at startup so that no request path has to deal with a bad base.

use std::path::PathBuf;

use url::Url;

use crate::error::{FlowError, Result};

pub mod server;

pub use server::ServerConfig;

/// Prefix the client app exposes for the verification backend.
pub const TRUSTEE_PROXY_PREFIX: &str = "/trustee-api";

/// Backend endpoints and public origins shared by every flow.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bank (client app) backend base URL
    pub bank_api_url: Url,
    /// Identity-verification backend base URL
    pub trustee_api_url: Url,
    /// Call-center backend base URL
    pub callcenter_api_url: Url,
    /// Origin the browser uses to reach the client app
    pub client_public_url: Url,
    /// Origin the browser uses to reach the verification app
    pub verifier_public_url: Url,
    /// Surface backend-returned OTPs on the page. Non-production shortcut.
    pub test_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bank_api_url: fixed_url("http://127.0.0.1:8085"),
            trustee_api_url: fixed_url("http://127.0.0.1:8086"),
            callcenter_api_url: fixed_url("http://127.0.0.1:8082"),
            client_public_url: fixed_url("http://localhost:5175"),
            verifier_public_url: fixed_url("http://localhost:5176"),
            test_mode: false,
        }
    }
}

impl AppConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            bank_api_url: url_var(&lookup, "BANK_API_URL", defaults.bank_api_url)?,
            trustee_api_url: url_var(&lookup, "TRUSTEE_API_URL", defaults.trustee_api_url)?,
            callcenter_api_url: url_var(
                &lookup,
                "CALLCENTER_API_URL",
                defaults.callcenter_api_url,
            )?,
            client_public_url: url_var(
                &lookup,
                "CLIENT_PUBLIC_URL",
                defaults.client_public_url,
            )?,
            verifier_public_url: url_var(
                &lookup,
                "VERIFIER_PUBLIC_URL",
                defaults.verifier_public_url,
            )?,
            test_mode: bool_var(&lookup, "SSAP_TEST_MODE")?.unwrap_or(false),
        })
    }

    /// Absolute URL of a page on the client app.
    pub fn client_page(&self, path_and_query: &str) -> Result<Url> {
        Ok(self.client_public_url.join(path_and_query)?)
    }

    /// Absolute URL of the verification entry page.
    pub fn verifier_entry(&self) -> Result<Url> {
        Ok(self.verifier_public_url.join("/verify")?)
    }
}

/// Rewrite a client-side proxy path to the verification backend path.
///
/// `/trustee-api/v1/auth/init` becomes `/api/v1/auth/init`. Paths outside
/// the prefix are not proxied.
pub fn rewrite_trustee_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(TRUSTEE_PROXY_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(format!("/api{}", rest))
}

/// Optional TLS material; both files must be present to serve HTTPS.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsPaths {
    pub fn from_env() -> Option<Self> {
        let cert_path = std::env::var("TLS_CERT_PATH").ok().map(PathBuf::from)?;
        let key_path = std::env::var("TLS_KEY_PATH").ok().map(PathBuf::from)?;
        Some(Self {
            cert_path,
            key_path,
        })
    }
}

fn fixed_url(raw: &str) -> Url {
    match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => unreachable!("built-in default URL {raw} is invalid: {e}"),
    }
}

fn url_var<F>(lookup: &F, key: &str, default: Url) -> Result<Url>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let url = Url::parse(raw.trim()).map_err(|e| FlowError::Config {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            if url.cannot_be_a_base() {
                return Err(FlowError::Config {
                    key: key.to_string(),
                    message: format!("'{}' cannot be used as a base URL", raw),
                });
            }
            Ok(url)
        }
        _ => Ok(default),
    }
}

fn bool_var<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(FlowError::Config {
                key: key.to_string(),
                message: format!("expected a boolean, got '{}'", other),
            }),
        },
    }
}
