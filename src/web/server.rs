//! Listeners for the client app and the verification app

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::client_app::{client_router, ClientState};
use super::verifier_app::{verifier_router, VerifierState};
use crate::config::{AppConfig, ServerConfig, TlsPaths};
use crate::state::HandoffStore;

/// Start both front ends and run until one of them stops
pub async fn start_servers(server: ServerConfig, config: AppConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let http = reqwest::Client::new();

    let client = client_router(ClientState::new(
        config.clone(),
        http.clone(),
        HandoffStore::shared(),
    ))
    .layer(TraceLayer::new_for_http());
    let verifier = verifier_router(VerifierState::new(
        config.clone(),
        http,
        HandoffStore::shared(),
    ))
    .layer(TraceLayer::new_for_http());

    let tls = match &server.tls {
        Some(paths) => Some(load_tls(paths).await?),
        None => None,
    };

    info!("=== Redirect protocol ===");
    info!("  Client app public URL:       {}", config.client_public_url);
    info!("  Verification app public URL: {}", config.verifier_public_url);
    info!("  Verification backend:        {}", config.trustee_api_url);
    info!("  Bank backend:                {}", config.bank_api_url);
    if config.test_mode {
        info!("  SSAP_TEST_MODE is on: backend OTPs are shown on the page");
    }

    tokio::try_join!(
        serve("Client app", server.client_port, client, tls.clone()),
        serve("Verification app", server.verifier_port, verifier, tls),
    )?;
    Ok(())
}

async fn serve(name: &str, port: u16, app: Router, tls: Option<RustlsConfig>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    match tls {
        Some(tls) => {
            info!("{} listening on https://{}", name, addr);
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| anyhow::anyhow!("{} could not bind port {}: {}", name, port, e))?;
            info!("{} listening on http://{}", name, listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

async fn load_tls(paths: &TlsPaths) -> anyhow::Result<RustlsConfig> {
    let cert_path = paths.cert_path.canonicalize().unwrap_or_else(|_| paths.cert_path.clone());
    let key_path = paths.key_path.canonicalize().unwrap_or_else(|_| paths.key_path.clone());

    info!("Loading TLS certificates:");
    info!("  Certificate: {}", cert_path.display());
    info!("  Private key: {}", key_path.display());

    if !paths.cert_path.exists() {
        return Err(anyhow::anyhow!(
            "Certificate file not found: {}",
            cert_path.display()
        ));
    }
    if !paths.key_path.exists() {
        return Err(anyhow::anyhow!(
            "Private key file not found: {}",
            key_path.display()
        ));
    }

    RustlsConfig::from_pem_file(&paths.cert_path, &paths.key_path)
        .await
        .map_err(|e| anyhow::anyhow!(
            "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}\n\nHint: The private key must be in PKCS#8 PEM format. If you have an RSA key, convert it with:\n  openssl pkcs8 -topk8 -inform PEM -outform PEM -nocrypt -in private.key -out key.pem",
            e, cert_path.display(), key_path.display()
        ))
}
