//! Worker-Registry – Verwaltet alle verbundenen Worker und ihre Kapazitaet
//!
//! Jeder Worker meldet sich mit seiner Instanz-ID an; die Registry haelt
//! pro Instanz genau einen Eintrag. Meldet sich dieselbe Instanz erneut
//! (Prozess-Neustart, Reconnect), ersetzt der neue Eintrag den alten.
//!
//! ## Auswahl
//! Die Knoten-Auswahl nimmt den ersten noch verbundenen
//! Affinitaets-Kandidaten in Listenreihenfolge. Ohne (lebende) Affinitaet
//! entscheidet der groesste freie Spielraum; Gleichstand wird zufaellig
//! aufgeloest, damit die Last nicht an der Iterationsreihenfolge der Map
//! klebt.

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tonmeister_core::{Result, TonmeisterFehler};
use tonmeister_protocol::control::{KanalKapazitaet, KommandoNachricht, StatusBericht};

/// Groesse der Kommando-Queue pro Worker
const KOMMANDO_QUEUE_GROESSE: usize = 64;

/// Groesse des Broadcast-Kanals fuer Worker-Ankuenfte
const ANKUNFT_KANAL_GROESSE: usize = 32;

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Handle auf einen registrierten Worker
///
/// Clone teilt Kommando-Queue und letzten Statusbericht.
#[derive(Clone)]
pub struct Worker {
    instanz: String,
    status: Arc<RwLock<StatusBericht>>,
    tx: mpsc::Sender<KommandoNachricht>,
}

impl Worker {
    /// Instanz-ID des Workers
    pub fn instanz(&self) -> &str {
        &self.instanz
    }

    /// Zuletzt gemeldeter Statusbericht
    pub fn status(&self) -> StatusBericht {
        self.status.read().clone()
    }

    /// Zuletzt gemeldete Kanal-Kapazitaet
    pub fn kapazitaet(&self) -> KanalKapazitaet {
        self.status.read().channel
    }

    /// Freier Spielraum laut letztem Statusbericht
    pub fn headroom(&self) -> i64 {
        self.kapazitaet().headroom()
    }

    /// Reiht ein Kommando in die Sende-Queue des Workers ein
    pub async fn senden(&self, nachricht: KommandoNachricht) -> Result<()> {
        self.tx.send(nachricht).await.map_err(|_| {
            TonmeisterFehler::getrennt(format!("Worker {} nicht erreichbar", self.instanz))
        })
    }

    /// Reiht ein Kommando ein ohne auf Platz in der Queue zu warten
    ///
    /// Fuer Abbau-Sendungen aus Verbindungs-Tasks: die Queue eines Workers
    /// wird von genau dessen Verbindungsschleife geleert, dort darf keine
    /// Sendung auf Platz warten. Bei voller oder geschlossener Queue wird
    /// das Kommando verworfen.
    pub fn senden_versuchen(&self, nachricht: KommandoNachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(nachricht)) => {
                tracing::warn!(
                    instanz = %self.instanz,
                    aktion = nachricht.kommando.aktion(),
                    "Sende-Queue voll, Kommando verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(instanz = %self.instanz, "Sende-Queue geschlossen");
                false
            }
        }
    }

    /// True wenn beide Handles auf dieselbe Verbindung zeigen
    pub(crate) fn gleiche_verbindung(&self, anderer: &Worker) -> bool {
        self.tx.same_channel(&anderer.tx)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("instanz", &self.instanz)
            .field("kapazitaet", &self.kapazitaet())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkerRegistry
// ---------------------------------------------------------------------------

/// Verwaltet alle registrierten Worker
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct WorkerRegistry {
    inner: Arc<WorkerRegistryInner>,
}

struct WorkerRegistryInner {
    /// Worker, indiziert nach Instanz-ID
    worker: DashMap<String, Worker>,
    /// Broadcast-Sender fuer Ankunfts-Meldungen (Instanz-ID)
    ankunft_tx: broadcast::Sender<String>,
}

impl WorkerRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        let (ankunft_tx, _) = broadcast::channel(ANKUNFT_KANAL_GROESSE);
        Self {
            inner: Arc::new(WorkerRegistryInner {
                worker: DashMap::new(),
                ankunft_tx,
            }),
        }
    }

    /// Registriert einen Worker unter der Instanz seines Berichts und gibt
    /// die Empfangsseite seiner Kommando-Queue zurueck
    ///
    /// Ein bestehender Eintrag derselben Instanz wird ersetzt; alle
    /// Abonnenten werden ueber die Ankunft benachrichtigt.
    pub fn registrieren(
        &self,
        bericht: StatusBericht,
    ) -> (Worker, mpsc::Receiver<KommandoNachricht>) {
        let instanz = bericht.instance.clone();
        let verfuegbar = bericht.channel.available;
        let (tx, rx) = mpsc::channel(KOMMANDO_QUEUE_GROESSE);
        let worker = Worker {
            instanz: instanz.clone(),
            status: Arc::new(RwLock::new(bericht)),
            tx,
        };

        let ersetzt = self
            .inner
            .worker
            .insert(instanz.clone(), worker.clone())
            .is_some();
        if ersetzt {
            tracing::info!(instanz = %instanz, "Worker neu verbunden, alter Eintrag ersetzt");
        } else {
            tracing::info!(
                instanz = %instanz,
                verfuegbar,
                "Worker registriert"
            );
        }

        let _ = self.inner.ankunft_tx.send(instanz);
        (worker, rx)
    }

    /// Entfernt einen Worker, aber nur wenn der Eintrag noch zu der
    /// gegebenen Verbindung gehoert
    ///
    /// Schuetzt beim Verbindungsende davor, einen frisch neu verbundenen
    /// Worker derselben Instanz mitzureissen.
    pub(crate) fn entfernen_wenn_aktuell(&self, instanz: &str, verbindung: &Worker) -> bool {
        let entfernt = self
            .inner
            .worker
            .remove_if(instanz, |_, worker| worker.gleiche_verbindung(verbindung))
            .is_some();
        if entfernt {
            tracing::info!(instanz = %instanz, "Worker abgemeldet");
        }
        entfernt
    }

    /// Uebernimmt den Statusbericht eines Workers
    pub fn status_aktualisieren(&self, bericht: StatusBericht) {
        if let Some(worker) = self.inner.worker.get(&bericht.instance) {
            *worker.status.write() = bericht;
        }
    }

    /// Gibt das Handle eines Workers zurueck
    pub fn worker(&self, instanz: &str) -> Option<Worker> {
        self.inner.worker.get(instanz).map(|w| w.clone())
    }

    /// Gibt alle registrierten Worker zurueck
    pub fn alle(&self) -> Vec<Worker> {
        self.inner.worker.iter().map(|w| w.value().clone()).collect()
    }

    /// Anzahl der registrierten Worker
    pub fn anzahl(&self) -> usize {
        self.inner.worker.len()
    }

    /// Abonniert Ankunfts-Meldungen neuer Worker
    pub fn ankunft_abonnieren(&self) -> broadcast::Receiver<String> {
        self.inner.ankunft_tx.subscribe()
    }

    /// Waehlt einen Worker fuer einen neuen Kanal aus
    ///
    /// Der erste noch verbundene Affinitaets-Kandidat gewinnt, in der
    /// Reihenfolge der Liste. Ist keiner (mehr) verbunden, faellt die
    /// Auswahl auf alle Worker zurueck: der groesste freie Spielraum
    /// gewinnt, Gleichstand entscheidet der Zufall.
    pub fn auswaehlen(&self, affinitaet: &[String]) -> Result<Worker> {
        if let Some(gewaehlt) = affinitaet.iter().find_map(|instanz| self.worker(instanz)) {
            tracing::debug!(
                instanz = %gewaehlt.instanz(),
                "Worker ueber Affinitaet ausgewaehlt"
            );
            return Ok(gewaehlt);
        }

        let kandidaten = self.alle();
        if kandidaten.is_empty() {
            return Err(TonmeisterFehler::KeineWorkerVerfuegbar);
        }

        let bester_spielraum = kandidaten
            .iter()
            .map(Worker::headroom)
            .max()
            .unwrap_or_default();
        let mut beste: Vec<Worker> = kandidaten
            .into_iter()
            .filter(|w| w.headroom() == bester_spielraum)
            .collect();

        let gewaehlt = if beste.len() == 1 {
            beste.remove(0)
        } else {
            let index = rand::rng().random_range(0..beste.len());
            beste.swap_remove(index)
        };

        tracing::debug!(
            instanz = %gewaehlt.instanz(),
            spielraum = bester_spielraum,
            "Worker ausgewaehlt"
        );
        Ok(gewaehlt)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bericht(instanz: &str, available: u32, current: u32) -> StatusBericht {
        StatusBericht {
            worker_count: 1,
            instance: instanz.into(),
            channel: KanalKapazitaet { available, current },
        }
    }

    #[test]
    fn registrieren_und_abmelden() {
        let registry = WorkerRegistry::neu();
        let (worker, _rx) = registry.registrieren(bericht("w-1", 10, 0));

        assert_eq!(registry.anzahl(), 1);
        assert!(registry.worker("w-1").is_some());

        assert!(registry.entfernen_wenn_aktuell("w-1", &worker));
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn gleiche_instanz_ersetzt_alten_eintrag() {
        let registry = WorkerRegistry::neu();
        let (alter, _rx_alt) = registry.registrieren(bericht("w-1", 10, 0));
        let (_neuer, _rx_neu) = registry.registrieren(bericht("w-1", 20, 0));

        assert_eq!(registry.anzahl(), 1);
        assert_eq!(registry.worker("w-1").unwrap().kapazitaet().available, 20);

        // Das Verbindungsende des alten Eintrags darf den neuen nicht treffen
        assert!(!registry.entfernen_wenn_aktuell("w-1", &alter));
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn auswahl_ohne_worker_schlaegt_fehl() {
        let registry = WorkerRegistry::neu();
        let ergebnis = registry.auswaehlen(&[]);
        assert!(matches!(
            ergebnis,
            Err(TonmeisterFehler::KeineWorkerVerfuegbar)
        ));
    }

    #[test]
    fn auswahl_nimmt_groessten_spielraum() {
        let registry = WorkerRegistry::neu();
        let (_a, _rx_a) = registry.registrieren(bericht("voll", 10, 9));
        let (_b, _rx_b) = registry.registrieren(bericht("frei", 10, 1));

        for _ in 0..10 {
            let gewaehlt = registry.auswaehlen(&[]).unwrap();
            assert_eq!(gewaehlt.instanz(), "frei");
        }
    }

    #[test]
    fn auswahl_bevorzugt_affinitaet() {
        let registry = WorkerRegistry::neu();
        let (_a, _rx_a) = registry.registrieren(bericht("verwandt", 10, 9));
        let (_b, _rx_b) = registry.registrieren(bericht("frei", 10, 0));

        // Trotz geringerem Spielraum gewinnt der Affinitaets-Kandidat
        let gewaehlt = registry.auswaehlen(&["verwandt".into()]).unwrap();
        assert_eq!(gewaehlt.instanz(), "verwandt");
    }

    #[test]
    fn affinitaet_nimmt_den_ersten_treffer() {
        let registry = WorkerRegistry::neu();
        let (_a, _rx_a) = registry.registrieren(bericht("erster", 10, 9));
        let (_b, _rx_b) = registry.registrieren(bericht("zweiter", 10, 0));

        // Die Listenreihenfolge entscheidet, nicht der Spielraum
        let gewaehlt = registry
            .auswaehlen(&["erster".into(), "zweiter".into()])
            .unwrap();
        assert_eq!(gewaehlt.instanz(), "erster");

        // Verschwundene Kandidaten werden uebersprungen
        let gewaehlt = registry
            .auswaehlen(&["weg".into(), "zweiter".into(), "erster".into()])
            .unwrap();
        assert_eq!(gewaehlt.instanz(), "zweiter");
    }

    #[test]
    fn auswahl_faellt_auf_alle_zurueck_wenn_affinitaet_weg() {
        let registry = WorkerRegistry::neu();
        let (_b, _rx_b) = registry.registrieren(bericht("frei", 10, 0));

        let gewaehlt = registry.auswaehlen(&["verschwunden".into()]).unwrap();
        assert_eq!(gewaehlt.instanz(), "frei");
    }

    #[test]
    fn status_aktualisieren_wirkt_auf_auswahl() {
        let registry = WorkerRegistry::neu();
        let (_a, _rx_a) = registry.registrieren(bericht("a", 10, 0));
        let (_b, _rx_b) = registry.registrieren(bericht("b", 10, 0));

        registry.status_aktualisieren(bericht("a", 10, 8));
        let gewaehlt = registry.auswaehlen(&[]).unwrap();
        assert_eq!(gewaehlt.instanz(), "b");
    }

    #[test]
    fn letzter_statusbericht_bleibt_erhalten() {
        let registry = WorkerRegistry::neu();
        let (worker, _rx) = registry.registrieren(bericht("w-1", 10, 0));
        assert_eq!(worker.status().worker_count, 1);
        assert_eq!(worker.status().instance, "w-1");

        let mut neu = bericht("w-1", 10, 4);
        neu.worker_count = 3;
        registry.status_aktualisieren(neu);

        assert_eq!(worker.status().worker_count, 3);
        assert_eq!(worker.kapazitaet().current, 4);
    }

    #[tokio::test]
    async fn ankunft_wird_gemeldet() {
        let registry = WorkerRegistry::neu();
        let mut rx = registry.ankunft_abonnieren();

        let (_w, _rx_w) = registry.registrieren(bericht("w-neu", 5, 0));
        let instanz = rx.try_recv().expect("Ankunft muss gemeldet werden");
        assert_eq!(instanz, "w-neu");
    }

    #[tokio::test]
    async fn senden_erreicht_die_queue() {
        let registry = WorkerRegistry::neu();
        let (worker, mut rx) = registry.registrieren(bericht("w-1", 5, 0));

        let id = tonmeister_core::types::KanalId::new();
        worker
            .senden(KommandoNachricht::echo(id, None))
            .await
            .expect("Queue ist offen");

        let kommando = rx.recv().await.expect("Kommando in der Queue");
        assert_eq!(kommando.id, id);
    }

    #[test]
    fn senden_versuchen_verwirft_bei_voller_queue() {
        let registry = WorkerRegistry::neu();
        let (worker, mut rx) = registry.registrieren(bericht("w-1", 5, 0));

        let id = tonmeister_core::types::KanalId::new();
        while worker.senden_versuchen(KommandoNachricht::echo(id, None)) {}

        // Ein Abfluss macht wieder genau einen Platz frei
        let _ = rx.try_recv().expect("Queue ist gefuellt");
        assert!(worker.senden_versuchen(KommandoNachricht::echo(id, None)));
        assert!(!worker.senden_versuchen(KommandoNachricht::echo(id, None)));
    }
}
