use super::TlsPaths;

/// Listener configuration for the two front ends
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Client (bank) app port
    pub client_port: u16,
    /// Verification app port
    pub verifier_port: u16,
    /// Serve HTTPS when both PEM files are configured
    pub tls: Option<TlsPaths>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            client_port: 5175,
            verifier_port: 5176,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_port: std::env::var("CLIENT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.client_port),
            verifier_port: std::env::var("VERIFIER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.verifier_port),
            tls: TlsPaths::from_env(),
        }
    }
}
