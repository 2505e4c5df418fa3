use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    // Configuration errors
    #[error("Invalid config value for {key}: {message}")]
    Config { key: String, message: String },

    // Transport errors
    #[error("Backend request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend returned {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    // Local validation, never reaches the backend
    #[error("{0}")]
    Validation(String),

    // Protocol errors
    #[error("Verification page opened without a tokenId")]
    InvalidAccess,

    #[error("Entered identity does not match the signed-in profile")]
    ProfileMismatch,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        FlowError::Validation(message.into())
    }

    /// Text shown to the person in front of the browser.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Network { .. } => {
                "A problem occurred while communicating with the server.".to_string()
            }
            FlowError::Http { status, message } => {
                if message.trim().is_empty() {
                    format!("Request failed ({})", status.as_u16())
                } else {
                    format!("{} ({})", message, status.as_u16())
                }
            }
            FlowError::MalformedResponse { .. } => {
                "The server returned an unexpected response.".to_string()
            }
            FlowError::Validation(message) => message.clone(),
            FlowError::InvalidAccess => {
                "Direct access is blocked. Please start from the partner service.".to_string()
            }
            FlowError::ProfileMismatch => {
                "The information entered does not match your member profile. Only your own details can be used."
                    .to_string()
            }
            FlowError::Config { .. } | FlowError::Internal { .. } => {
                "An internal error occurred.".to_string()
            }
        }
    }

    /// HTTP status reported by the backend, if the failure came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FlowError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for FlowError {
    fn from(err: url::ParseError) -> Self {
        FlowError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
