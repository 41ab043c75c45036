//! Worker-Verbindung – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede eingehende TCP-Verbindung bekommt eine `WorkerVerbindung` in einem
//! eigenen tokio-Task. Die Verbindung wird erst durch den ersten Frame mit
//! einem `status`-Bericht zum registrierten Worker; alles davor wird
//! verworfen.
//!
//! ## Lebenslauf
//! ```text
//! Angenommen -> Angemeldet (erster Status-Frame) -> Getrennt
//! ```
//!
//! Nach der Anmeldung pumpt die Schleife in beide Richtungen: eingehende
//! Ereignisse gehen an die Kanal-Tabelle, Kommandos aus der Registry-Queue
//! auf die Leitung. Beim Verbindungsende wird der Worker abgemeldet, sofern
//! sich dieselbe Instanz nicht schon neu verbunden hat, und alle seine
//! Kanaele werden beendet.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tonmeister_protocol::control::{KommandoNachricht, WorkerNachricht};
use tonmeister_protocol::wire::FrameCodec;

use crate::channel::KanalTabelle;
use crate::registry::{Worker, WorkerRegistry};

/// Groesse der Sende-Queue zwischen Registry-Verteiler und TCP-Schreiber
const SENDE_QUEUE_GROESSE: usize = 64;

/// Angemeldeter Zustand einer Verbindung
struct Angemeldet {
    instanz: String,
    worker: Worker,
}

// ---------------------------------------------------------------------------
// WorkerVerbindung
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Worker-Verbindung
///
/// Liest Frames via `FrameCodec`, registriert den Worker beim ersten
/// Status-Frame und leitet danach Ereignisse an die Kanal-Tabelle weiter.
/// Laeuft in einem eigenen tokio-Task.
pub struct WorkerVerbindung {
    registry: WorkerRegistry,
    tabelle: KanalTabelle,
    peer_addr: SocketAddr,
}

impl WorkerVerbindung {
    /// Erstellt eine neue WorkerVerbindung
    pub fn neu(registry: WorkerRegistry, tabelle: KanalTabelle, peer_addr: SocketAddr) -> Self {
        Self {
            registry,
            tabelle,
            peer_addr,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird, der Frame-Strom kippt oder
    /// ein Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Worker-Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::<WorkerNachricht>::new());

        // Ausgehende Kommando-Queue (Registry-Verteiler -> TCP)
        // Wird nach der Anmeldung mit der Kommando-Queue des Workers verknuepft
        let (sende_tx, mut sende_rx) = mpsc::channel::<KommandoNachricht>(SENDE_QUEUE_GROESSE);

        let mut angemeldet: Option<Angemeldet> = None;

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Worker
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            self.nachricht_verarbeiten(&mut angemeldet, nachricht, &sende_tx);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Frame-Lesefehler, Verbindung wird verworfen"
                            );
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Worker getrennt");
                            break;
                        }
                    }
                }

                // Ausgehendes Kommando aus der Worker-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    tracing::debug!(
                        peer = %peer_addr,
                        kanal = %ausgehend.id,
                        aktion = ausgehend.kommando.aktion(),
                        "Kommando geht raus"
                    );
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(
                            peer = %peer_addr,
                            fehler = %e,
                            "Senden fehlgeschlagen"
                        );
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal, Verbindung wird getrennt");
                        // Encoder-Typ festnageln, der Codec nimmt jedes Serialize
                        let _ = SinkExt::<KommandoNachricht>::close(&mut framed).await;
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende: Abmelden nur wenn der Eintrag noch
        // zu dieser Verbindung gehoert, sonst gehoeren Kanaele und Eintrag
        // schon dem Nachfolger derselben Instanz
        if let Some(Angemeldet { instanz, worker }) = angemeldet {
            if self.registry.entfernen_wenn_aktuell(&instanz, &worker) {
                self.tabelle.worker_verloren(&instanz);
            } else {
                tracing::debug!(
                    peer = %peer_addr,
                    instanz = %instanz,
                    "Instanz bereits neu verbunden, Kanaele bleiben"
                );
            }
        }

        tracing::info!(peer = %peer_addr, "Worker-Verbindungs-Task beendet");
    }

    /// Verarbeitet einen eingehenden Frame je nach Anmeldezustand
    fn nachricht_verarbeiten(
        &self,
        angemeldet: &mut Option<Angemeldet>,
        nachricht: WorkerNachricht,
        sende_tx: &mpsc::Sender<KommandoNachricht>,
    ) {
        match angemeldet {
            None => {
                // Vor der Anmeldung zaehlt nur ein Frame mit Status-Bericht
                let status = match nachricht.status.clone() {
                    Some(status) => status,
                    None => {
                        tracing::warn!(
                            peer = %self.peer_addr,
                            "Frame vor der Anmeldung verworfen"
                        );
                        return;
                    }
                };

                let instanz = status.instance.clone();
                let worker_count = status.worker_count;
                let verfuegbar = status.channel.available;
                let (worker, mut kommando_rx) = self.registry.registrieren(status);

                // Kommando-Queue des Workers auf die Sende-Queue pumpen
                let sende_tx = sende_tx.clone();
                tokio::spawn(async move {
                    while let Some(kommando) = kommando_rx.recv().await {
                        if sende_tx.send(kommando).await.is_err() {
                            break;
                        }
                    }
                });

                tracing::info!(
                    peer = %self.peer_addr,
                    instanz = %instanz,
                    worker_count,
                    verfuegbar,
                    "Worker angemeldet"
                );
                *angemeldet = Some(Angemeldet {
                    instanz: instanz.clone(),
                    worker,
                });

                // Huckepack-Kanalteil des Anmelde-Frames mit verarbeiten
                if !nachricht.ist_status_meldung() {
                    self.tabelle.nachricht_verarbeiten(&instanz, nachricht);
                }
            }

            Some(Angemeldet { instanz, .. }) => {
                if let Some(status) = &nachricht.status {
                    if status.instance != *instanz {
                        tracing::warn!(
                            peer = %self.peer_addr,
                            instanz = %instanz,
                            gemeldet = %status.instance,
                            "Instanzwechsel auf bestehender Verbindung ignoriert"
                        );
                    } else {
                        self.registry.status_aktualisieren(status.clone());
                    }
                }

                if !nachricht.ist_status_meldung() {
                    self.tabelle.nachricht_verarbeiten(instanz, nachricht);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
