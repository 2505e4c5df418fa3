//! Cross-application identity-verification redirect protocol

pub mod messages;
pub mod session;
pub mod types;

pub use messages::{ProtocolQuery, VerificationRequest, VerificationResult};
pub use session::{SessionStatus, VerificationSession};
pub use types::{PhoneNumber, SubjectName, TokenId};
