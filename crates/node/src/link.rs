//! Worker-Link – Persistente TCP-Verbindung des Workers zum Proxy
//!
//! Der Link baut die Verbindung auf, meldet sich mit einem Status-Frame an
//! und pumpt danach in beide Richtungen:
//! - eingehende Kommandos gehen an den `KommandoVerteiler`
//! - Engine-Ereignisse gehen als Worker-Nachrichten zurueck zum Proxy
//!
//! Jede ausgehende Nachricht bekommt den aktuellen Kapazitaetsbericht
//! huckepack. Reisst die Verbindung ab, verbindet der Link sich nach einer
//! Wartezeit neu; der Kanalbestand bleibt dabei erhalten.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tonmeister_protocol::control::{KommandoNachricht, StatusBericht, WorkerNachricht};
use tonmeister_protocol::wire::FrameCodec;

use crate::dispatcher::KommandoVerteiler;
use crate::engine::{AudioEngine, EngineEreignis};

/// Groesse der Engine-Ereignis-Queue
const EREIGNIS_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration eines Worker-Links
#[derive(Debug, Clone)]
pub struct LinkKonfiguration {
    /// Adresse des Proxys ("host:port")
    pub proxy_adresse: String,
    /// Instanz-ID dieses Workers (eindeutig pro Prozesslebensdauer)
    pub instanz: String,
    /// Anzahl der Engine-Prozesse hinter diesem Link
    pub worker_count: u32,
    /// Wartezeit vor einem Wiederverbindungsversuch
    pub wiederverbindung: Duration,
}

impl LinkKonfiguration {
    /// Konfiguration mit Standard-Wiederverbindungszeit
    pub fn neu(proxy_adresse: impl Into<String>, instanz: impl Into<String>) -> Self {
        Self {
            proxy_adresse: proxy_adresse.into(),
            instanz: instanz.into(),
            worker_count: 1,
            wiederverbindung: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerLink
// ---------------------------------------------------------------------------

/// Ausgang einer einzelnen Verbindungsrunde
enum LinkAusgang {
    /// Shutdown-Signal empfangen
    Herunterfahren,
    /// Verbindung verloren, neu verbinden
    Getrennt,
}

/// Verbindet einen Worker mit seinem Proxy
pub struct WorkerLink<E: AudioEngine> {
    konfig: LinkKonfiguration,
    engine: Arc<E>,
    verteiler: KommandoVerteiler<E>,
    ereignis_rx: mpsc::Receiver<EngineEreignis>,
}

impl<E: AudioEngine> WorkerLink<E> {
    /// Erstellt einen neuen Link fuer die gegebene Engine
    pub fn neu(konfig: LinkKonfiguration, engine: Arc<E>) -> Self {
        let (ereignis_tx, ereignis_rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
        let verteiler = KommandoVerteiler::neu(Arc::clone(&engine), ereignis_tx);
        Self {
            konfig,
            engine,
            verteiler,
            ereignis_rx,
        }
    }

    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt
    ///
    /// Verbindet sich mit dem Proxy und verbindet sich bei Abriss neu.
    pub async fn starten(self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let Self {
            konfig,
            engine,
            verteiler,
            mut ereignis_rx,
        } = self;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let stream = tokio::select! {
                ergebnis = TcpStream::connect(&konfig.proxy_adresse) => {
                    match ergebnis {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!(
                                proxy = %konfig.proxy_adresse,
                                fehler = %e,
                                "Proxy nicht erreichbar"
                            );
                            tokio::time::sleep(konfig.wiederverbindung).await;
                            continue;
                        }
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!(
                proxy = %konfig.proxy_adresse,
                instanz = %konfig.instanz,
                "Mit Proxy verbunden"
            );

            let ausgang = Self::verbindung_fahren(
                stream,
                &konfig,
                &engine,
                &verteiler,
                &mut ereignis_rx,
                &mut shutdown_rx,
            )
            .await;

            match ausgang {
                LinkAusgang::Herunterfahren => break,
                LinkAusgang::Getrennt => {
                    tracing::warn!(
                        proxy = %konfig.proxy_adresse,
                        "Verbindung zum Proxy verloren, verbinde neu"
                    );
                    tokio::time::sleep(konfig.wiederverbindung).await;
                }
            }
        }

        tracing::info!(instanz = %konfig.instanz, "Worker-Link beendet");
    }

    /// Eine Verbindungsrunde: Handshake plus Pump-Schleife
    async fn verbindung_fahren(
        stream: TcpStream,
        konfig: &LinkKonfiguration,
        engine: &Arc<E>,
        verteiler: &KommandoVerteiler<E>,
        ereignis_rx: &mut mpsc::Receiver<EngineEreignis>,
        shutdown_rx: &mut tokio::sync::watch::Receiver<bool>,
    ) -> LinkAusgang {
        let mut framed: Framed<TcpStream, FrameCodec<KommandoNachricht>> =
            Framed::new(stream, FrameCodec::new());

        // Registrierungs-Handshake: reiner Status-Frame
        let handshake = WorkerNachricht::status_meldung(Self::status_bericht(konfig, engine));
        if let Err(e) = framed.send(handshake).await {
            tracing::warn!(fehler = %e, "Handshake fehlgeschlagen");
            return LinkAusgang::Getrennt;
        }

        loop {
            tokio::select! {
                // Kommando vom Proxy
                frame = framed.next() => {
                    match frame {
                        Some(Ok(kommando)) => {
                            tracing::trace!(
                                kanal = %kommando.id,
                                aktion = kommando.kommando.aktion(),
                                "Kommando empfangen"
                            );
                            if let Some(antwort) = verteiler.verteilen(kommando) {
                                let antwort = Self::mit_status(antwort, konfig, engine);
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(fehler = %e, "Antwort-Senden fehlgeschlagen");
                                    return LinkAusgang::Getrennt;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(fehler = %e, "Frame-Lesefehler, Verbindung wird verworfen");
                            return LinkAusgang::Getrennt;
                        }
                        None => {
                            tracing::info!("Proxy hat die Verbindung geschlossen");
                            return LinkAusgang::Getrennt;
                        }
                    }
                }

                // Ereignis aus der Engine
                Some(ereignis) = ereignis_rx.recv() => {
                    if let Some(nachricht) = verteiler.ereignis_einordnen(ereignis) {
                        let nachricht = Self::mit_status(nachricht, konfig, engine);
                        if let Err(e) = framed.send(nachricht).await {
                            tracing::warn!(fehler = %e, "Ereignis-Senden fehlgeschlagen");
                            return LinkAusgang::Getrennt;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Worker-Link: Shutdown-Signal empfangen");
                        // Encoder-Typ festnageln, der Codec nimmt jedes Serialize
                        let _ = SinkExt::<WorkerNachricht>::close(&mut framed).await;
                        return LinkAusgang::Herunterfahren;
                    }
                }
            }
        }
    }

    /// Aktueller Kapazitaetsbericht dieses Links
    fn status_bericht(konfig: &LinkKonfiguration, engine: &Arc<E>) -> StatusBericht {
        StatusBericht {
            worker_count: konfig.worker_count,
            instance: konfig.instanz.clone(),
            channel: engine.kapazitaet(),
        }
    }

    /// Haengt den aktuellen Status an eine ausgehende Nachricht
    fn mit_status(
        mut nachricht: WorkerNachricht,
        konfig: &LinkKonfiguration,
        engine: &Arc<E>,
    ) -> WorkerNachricht {
        nachricht.status = Some(Self::status_bericht(konfig, engine));
        nachricht
    }
}
