//! TCP-Listener – Bindet Socket, akzeptiert Worker-Verbindungen
//!
//! Der `ProxyServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Worker-Verbindung einen eigenen tokio-Task mit einer
//! `WorkerVerbindung`.
//!
//! Das Binden passiert getrennt vom Accept-Loop, damit der Aufrufer die
//! tatsaechliche Adresse (etwa bei Port 0) vor dem Start kennt.

use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::channel::KanalTabelle;
use crate::connection::WorkerVerbindung;
use crate::registry::WorkerRegistry;

/// TCP-Server fuer Worker-Verbindungen
///
/// Akzeptiert Verbindungen in einer Loop; jede Verbindung laeuft als
/// eigener tokio-Task bis zum Verbindungsende oder Shutdown.
pub struct ProxyServer {
    registry: WorkerRegistry,
    tabelle: KanalTabelle,
    listener: TcpListener,
}

impl ProxyServer {
    /// Bindet den Listener auf der gegebenen Adresse
    pub async fn binden(
        registry: WorkerRegistry,
        tabelle: KanalTabelle,
        bind_addr: SocketAddr,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            registry,
            tabelle,
            listener,
        })
    }

    /// Gibt die tatsaechlich gebundene Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "Worker-Listener gestartet");

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = WorkerVerbindung::neu(
                                self.registry.clone(),
                                self.tabelle.clone(),
                                peer_addr,
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Worker-Listener: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Worker-Listener gestoppt");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
