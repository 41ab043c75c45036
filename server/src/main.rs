//! Tonmeister Proxy – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Proxy.

use anyhow::Result;
use tonmeister_observability::logging_initialisieren;
use tonmeister_server::{Server, config::ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("TONMEISTER_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Tonmeister Proxy wird initialisiert"
    );

    let server = Server::neu(config);
    server.starten().await?;

    Ok(())
}
