//! The redirect protocol as plain async functions over the API clients.
//!
//! Nothing here knows about axum; the web layer renders what these return.

pub mod bridge;
pub mod callback;
pub mod guard;
pub mod initiation;
pub mod otp;

pub use bridge::{BridgeNotice, BridgeQuery};
pub use callback::handle_callback;
pub use guard::{AccessGuard, ValidAccess};
pub use initiation::{check_profile_match, initiate_verification, ReturnTarget};
pub use otp::{confirm_otp, request_otp, ConfirmOutcome, OtpEntry, OtpForm};
