//! Tonmeister Worker – Einstiegspunkt
//!
//! Startet die Platzhalter-Engine samt Worker-Link gegen den konfigurierten
//! Proxy und laeuft bis zum Shutdown-Signal.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tonmeister_node::{LinkKonfiguration, PlatzhalterEngine, WorkerLink};
use tonmeister_observability::logging_initialisieren;
use tonmeister_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("TONMEISTER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    let instanz = config.worker_instanz();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        instanz = %instanz,
        proxy = %config.worker.proxy_adresse,
        max_kanaele = config.worker.max_kanaele,
        "Tonmeister Worker wird initialisiert"
    );

    let engine = PlatzhalterEngine::neu(
        config.worker.medien_adresse.clone(),
        config.worker.basis_port,
        config.worker.max_kanaele,
    );

    let mut link_konfig =
        LinkKonfiguration::neu(config.worker.proxy_adresse.clone(), instanz);
    link_konfig.wiederverbindung = Duration::from_millis(config.worker.wiederverbindung_ms);

    let link = WorkerLink::neu(link_konfig, Arc::new(engine));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let link_task = tokio::spawn(link.starten(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown-Signal empfangen, Worker wird beendet");
    let _ = shutdown_tx.send(true);
    let _ = link_task.await;

    Ok(())
}
