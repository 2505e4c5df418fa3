//! Tracing setup and log-safe rendering of personal data.
//!
//! Names and phone numbers pass through every flow of the redirect protocol.
//! They are only ever logged through [`mask_name`] and [`mask_phone`], and
//! one-time passcodes are never logged at all.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to the whole
/// process.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

/// Mask a phone number as `010-****-5678`.
///
/// Input shorter than seven digits is fully masked.
pub fn mask_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 7 {
        return "*".repeat(digits.len());
    }
    format!("{}-****-{}", &digits[..3], &digits[digits.len() - 4..])
}

/// Mask a name keeping its first and last characters (`홍*동`).
pub fn mask_name(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => "*".to_string(),
        2 => format!("{}*", chars[0]),
        n => {
            let mut masked = String::new();
            masked.push(chars[0]);
            masked.push_str(&"*".repeat(n - 2));
            masked.push(chars[n - 1]);
            masked
        }
    }
}

/// Mask an opaque token, keeping a short prefix for correlation.
pub fn mask_token(raw: &str) -> String {
    let prefix: String = raw.chars().take(8).collect();
    if prefix.len() < raw.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}
