//! imgate Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use imgate_server::{config::ServerConfig, handler::LoginHandler, Server};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("IMGATE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = ServerConfig::laden(&config_pfad)?;
    config.validieren()?;

    imgate_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "imgate Server wird initialisiert"
    );

    let server = Server::neu(config, Arc::new(LoginHandler::new()));
    server.starten().await?;

    Ok(())
}
