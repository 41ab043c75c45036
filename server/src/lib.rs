//! tonmeister-server – Bibliotheks-Root
//!
//! Baut die Proxy-Seite aus ihren Bausteinen zusammen: Worker-Registry,
//! Kanal-Tabelle und der TCP-Listener fuer die Worker-Anmeldungen.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use std::net::SocketAddr;
use tokio::sync::watch;
use tonmeister_proxy::{KanalTabelle, ProxyServer, WorkerRegistry};

/// Haelt den laufenden Proxy-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Proxy und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Registry und Kanal-Tabelle anlegen
    /// 2. Worker-Listener binden und Accept-Loop starten
    /// 3. Auf Ctrl-C warten, dann alle Verbindungen herunterfahren
    pub async fn starten(self) -> Result<()> {
        let registry = WorkerRegistry::neu();
        let tabelle = KanalTabelle::neu(registry.clone());

        let adresse = self.config.worker_bind_adresse();
        let bind: SocketAddr = adresse
            .parse()
            .with_context(|| format!("Bind-Adresse '{adresse}' ungueltig"))?;
        let listener = ProxyServer::binden(registry.clone(), tabelle.clone(), bind)
            .await
            .with_context(|| format!("Worker-Listener auf {adresse} nicht startbar"))?;

        tracing::info!(
            name = %self.config.server.name,
            worker_listener = %adresse,
            "Proxy startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener_task = tokio::spawn(listener.starten(shutdown_rx));

        tokio::signal::ctrl_c().await?;
        tracing::info!(
            worker = registry.anzahl(),
            kanaele = tabelle.kanal_anzahl(),
            "Shutdown-Signal empfangen, Proxy wird beendet"
        );

        let _ = shutdown_tx.send(true);
        let _ = listener_task.await;
        Ok(())
    }
}
