//! Kommando-Verteiler – Routet Proxy-Kommandos an die Engine
//!
//! Der Verteiler haelt den Kanalbestand des Workers (Proxy-ID, Engine-ID,
//! Engine-Handle) und setzt jedes eingehende Kommando in den passenden
//! Engine-Aufruf um. Nur `open` und unbekannte Aktionen erzeugen eine
//! direkte Antwort; alles andere bestaetigt die Engine asynchron ueber
//! ihre Ereignisse.
//!
//! ## Lebenszyklus eines Kanals
//! 1. `open` legt den Eintrag an und beantwortet mit der Engine-UUID
//! 2. Kommandos werden ueber die Proxy-ID nachgeschlagen
//! 3. `close` stoesst die Schliessung an, der Eintrag bleibt bestehen
//! 4. Das close-Ereignis der Engine traegt den Eintrag endgueltig aus

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tonmeister_core::types::{KanalId, RemoteKanalId};
use tonmeister_protocol::control::{
    KanalKommando, KommandoNachricht, SchlussStatistik, WorkerNachricht,
};

use crate::engine::{AudioEngine, EngineEreignis, EngineKanal};

// ---------------------------------------------------------------------------
// Kanalbestand
// ---------------------------------------------------------------------------

/// Eintrag eines offenen Kanals
struct KanalEintrag<K> {
    uuid: RemoteKanalId,
    handle: Arc<K>,
}

/// Alle offenen Kanaele des Workers, in beide Richtungen indiziert
struct KanalBestand<K> {
    nach_id: DashMap<KanalId, KanalEintrag<K>>,
    nach_uuid: DashMap<RemoteKanalId, KanalId>,
}

impl<K> KanalBestand<K> {
    fn neu() -> Self {
        Self {
            nach_id: DashMap::new(),
            nach_uuid: DashMap::new(),
        }
    }

    fn einfuegen(&self, id: KanalId, uuid: RemoteKanalId, handle: Arc<K>) {
        self.nach_id.insert(id, KanalEintrag { uuid, handle });
        self.nach_uuid.insert(uuid, id);
    }

    fn handle(&self, id: &KanalId) -> Option<Arc<K>> {
        self.nach_id.get(id).map(|e| Arc::clone(&e.handle))
    }

    fn id_von_uuid(&self, uuid: &RemoteKanalId) -> Option<KanalId> {
        self.nach_uuid.get(uuid).map(|e| *e)
    }

    fn austragen_nach_uuid(&self, uuid: &RemoteKanalId) {
        if let Some((_, id)) = self.nach_uuid.remove(uuid) {
            self.nach_id.remove(&id);
        }
    }

    fn anzahl(&self) -> usize {
        self.nach_id.len()
    }
}

// ---------------------------------------------------------------------------
// KommandoVerteiler
// ---------------------------------------------------------------------------

/// Setzt Proxy-Kommandos in Engine-Aufrufe um
pub struct KommandoVerteiler<E: AudioEngine> {
    engine: Arc<E>,
    bestand: KanalBestand<E::Kanal>,
    /// Geteilter Ereignis-Sender, wird jedem neuen Kanal mitgegeben
    ereignisse: mpsc::Sender<EngineEreignis>,
}

impl<E: AudioEngine> KommandoVerteiler<E> {
    /// Erstellt einen Verteiler fuer die gegebene Engine
    pub fn neu(engine: Arc<E>, ereignisse: mpsc::Sender<EngineEreignis>) -> Self {
        Self {
            engine,
            bestand: KanalBestand::neu(),
            ereignisse,
        }
    }

    /// Anzahl der aktuell gefuehrten Kanaele
    pub fn kanal_anzahl(&self) -> usize {
        self.bestand.anzahl()
    }

    /// Verarbeitet ein Kommando und gibt die direkte Antwort zurueck
    ///
    /// `None` bedeutet: keine direkte Antwort, eine etwaige Rueckmeldung
    /// kommt als Engine-Ereignis.
    pub fn verteilen(&self, nachricht: KommandoNachricht) -> Option<WorkerNachricht> {
        let id = nachricht.id;
        let uuid = nachricht.uuid;

        match nachricht.kommando {
            KanalKommando::Open(optionen) => {
                if self.bestand.handle(&id).is_some() {
                    tracing::warn!(kanal = %id, "open fuer bereits gefuehrten Kanal ignoriert");
                    return None;
                }

                match self.engine.kanal_oeffnen(&optionen, self.ereignisse.clone()) {
                    Ok(kanal) => {
                        let kanal = Arc::new(kanal);
                        let kanal_uuid = kanal.uuid();
                        let lokal = kanal.lokale_adresse();
                        self.bestand.einfuegen(id, kanal_uuid, kanal);
                        tracing::info!(
                            kanal = %id,
                            uuid = %kanal_uuid,
                            port = lokal.port,
                            "Kanal geoeffnet"
                        );
                        Some(WorkerNachricht::offen_bestaetigung(id, kanal_uuid, lokal))
                    }
                    Err(fehler) => {
                        tracing::warn!(kanal = %id, fehler = %fehler, "Oeffnen fehlgeschlagen");
                        // Fehlgeschlagene Oeffnungen melden sich als close-
                        // Ereignis mit dem Fehlertext als Grund
                        let mut daten = serde_json::Map::new();
                        daten.insert(
                            "reason".into(),
                            serde_json::Value::String(fehler.to_string()),
                        );
                        daten.insert(
                            "stats".into(),
                            serde_json::to_value(SchlussStatistik::default())
                                .unwrap_or(serde_json::Value::Null),
                        );
                        Some(WorkerNachricht::ereignis(id, None, "close", daten))
                    }
                }
            }

            KanalKommando::Close => {
                match self.bestand.handle(&id) {
                    Some(handle) => handle.schliessen("close"),
                    None => {
                        tracing::warn!(kanal = %id, "close fuer unbekannten Kanal");
                    }
                }
                None
            }

            KanalKommando::Mix { other } => {
                let eigener = self.bestand.handle(&id);
                let partner = self.bestand.handle(&other.id);
                match (eigener, partner) {
                    (Some(eigener), Some(partner)) => {
                        eigener.mischen(partner.as_ref());
                    }
                    _ => {
                        tracing::warn!(
                            kanal = %id,
                            partner = %other.id,
                            "mix mit unbekanntem Kanal"
                        );
                    }
                }
                None
            }

            KanalKommando::Unmix => {
                self.mit_handle(&id, "unmix", |k| k.mix_loesen());
                None
            }

            KanalKommando::Dtmf { digits } => {
                self.mit_handle(&id, "dtmf", |k| k.dtmf(&digits));
                None
            }

            KanalKommando::Echo => {
                self.mit_handle(&id, "echo", |k| k.echo());
                None
            }

            KanalKommando::Play { soup } => {
                self.mit_handle(&id, "play", |k| k.abspielen(&soup));
                None
            }

            KanalKommando::Record { options } => {
                self.mit_handle(&id, "record", |k| k.aufnehmen(&options));
                None
            }

            KanalKommando::Direction { options } => {
                self.mit_handle(&id, "direction", |k| k.richtung(options));
                None
            }

            KanalKommando::Target { spec } => {
                self.mit_handle(&id, "target", |k| k.ziel(&spec));
                None
            }

            KanalKommando::Remote { spec } => {
                self.mit_handle(&id, "remote", |k| k.gegenstelle(&spec));
                None
            }

            KanalKommando::Unbekannt => {
                tracing::warn!(kanal = %id, "Unbekanntes Kommando");
                Some(WorkerNachricht::unbekannte_methode(id, uuid))
            }
        }
    }

    /// Ordnet ein Engine-Ereignis seinem Kanal zu und baut die Nachricht
    ///
    /// close-Ereignisse tragen den Kanal aus dem Bestand aus. Ereignisse
    /// ohne bekannten Kanal werden verworfen.
    pub fn ereignis_einordnen(&self, ereignis: EngineEreignis) -> Option<WorkerNachricht> {
        let id = match self.bestand.id_von_uuid(&ereignis.uuid) {
            Some(id) => id,
            None => {
                tracing::debug!(uuid = %ereignis.uuid, aktion = %ereignis.aktion, "Ereignis ohne Kanal verworfen");
                return None;
            }
        };

        if ereignis.aktion == "close" {
            self.bestand.austragen_nach_uuid(&ereignis.uuid);
            tracing::info!(kanal = %id, uuid = %ereignis.uuid, "Kanal ausgetragen");
        }

        Some(WorkerNachricht::ereignis(
            id,
            Some(ereignis.uuid),
            ereignis.aktion,
            ereignis.daten,
        ))
    }
}

// ---------------------------------------------------------------------------
// Interne Hilfsmethoden
// ---------------------------------------------------------------------------

impl<E: AudioEngine> KommandoVerteiler<E> {
    fn mit_handle(&self, id: &KanalId, aktion: &str, f: impl FnOnce(&E::Kanal)) {
        match self.bestand.handle(id) {
            Some(handle) => f(handle.as_ref()),
            None => {
                tracing::warn!(kanal = %id, aktion, "Kommando fuer unbekannten Kanal");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
