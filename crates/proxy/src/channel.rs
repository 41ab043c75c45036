//! Kanal-Tabelle – Fuehrt alle vermittelten Kanaele und ihre Worker
//!
//! Die Tabelle ist das Herz des Proxys: sie waehlt fuer jeden neuen Kanal
//! einen Worker aus, korreliert Antworten ueber die proxy-vergebene ID und
//! reicht Ereignisse an den Sink des Aufrufers weiter.
//!
//! ## Lebenszyklus
//! 1. `kanal_oeffnen` legt den Eintrag an und schickt das open-Kommando
//! 2. Die open-Bestaetigung des Workers loest die `OeffnungsQuittung` aus
//! 3. Ereignisse laufen ueber den Sink, solange der Eintrag existiert
//! 4. Ausgetragen wird, was zuerst kommt: das `schliessen` des Aufrufers
//!    oder das close-Ereignis des Workers
//!
//! `schliessen` traegt den Eintrag sofort aus und schickt das
//! close-Kommando hinterher; das spaetere close-Ereignis des Workers
//! trifft dann keinen Eintrag mehr und wird verworfen, genau wie eine
//! verspaetete open-Bestaetigung. Reisst die Verbindung eines Workers ab,
//! beendet `worker_verloren` alle seine Kanaele mit einem synthetischen
//! Ereignis.
//!
//! ## Bruecken
//! Mischen zwei Kanaele auf verschiedenen Workern, baut die Tabelle eine
//! Bruecke: je ein Hilfskanal neben jedem Original, kreuzweise verbundene
//! Gegenstellen und eine lokale Mischung pro Seite.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tonmeister_core::types::{KanalId, RemoteKanalId};
use tonmeister_core::{Result, TonmeisterFehler};
use tonmeister_protocol::control::{
    KanalBeschreibung, KanalOeffnenOptionen, KommandoNachricht, MedienAdresse, RichtungsOptionen,
    WorkerNachricht,
};

use crate::bridge::{Bruecke, BrueckenKoordinator};
use crate::registry::{Worker, WorkerRegistry};

/// Groesse der Ereignis-Senke eines Hilfskanals
const HILFS_SENKE_GROESSE: usize = 8;

// ---------------------------------------------------------------------------
// Oeffnungs-Quittung
// ---------------------------------------------------------------------------

/// Ergebnis einer bestaetigten Kanal-Oeffnung
#[derive(Debug, Clone)]
pub struct KanalBereit {
    /// Worker-vergebene Kanal-ID
    pub uuid: RemoteKanalId,
    /// Lokale Medien-Adresse auf dem Worker
    pub lokal: MedienAdresse,
}

/// Wartet auf die open-Bestaetigung des Workers
///
/// Wird genau einmal aufgeloest: mit `KanalBereit` bei Erfolg, mit einem
/// Fehler wenn der Kanal vorher geschlossen wird oder sein Worker
/// verloren geht.
pub struct OeffnungsQuittung(oneshot::Receiver<Result<KanalBereit>>);

impl OeffnungsQuittung {
    /// Wartet auf die Bestaetigung
    pub async fn warten(self) -> Result<KanalBereit> {
        match self.0.await {
            Ok(ergebnis) => ergebnis,
            // Sender weg ohne Aufloesung: Tabelle wurde abgeraeumt
            Err(_) => Err(TonmeisterFehler::VorOeffnungGeschlossen),
        }
    }
}

// ---------------------------------------------------------------------------
// Tabellen-Zustand
// ---------------------------------------------------------------------------

/// Zustand eines vermittelten Kanals
struct KanalZustand {
    /// Worker der den Kanal hostet
    worker: Worker,
    /// Worker-vergebene ID, nach der Bestaetigung gesetzt
    uuid: Option<RemoteKanalId>,
    /// Lokale Medien-Adresse aus der Bestaetigung
    lokal: Option<MedienAdresse>,
    /// Ereignis-Senke des Aufrufers
    sink: mpsc::Sender<WorkerNachricht>,
    /// Offene Oeffnungs-Quittung, genau einmal aufzuloesen
    offen_warter: Option<oneshot::Sender<Result<KanalBereit>>>,
}

struct TabelleInner {
    kanaele: DashMap<KanalId, KanalZustand>,
    /// Rueckabbildung Worker-UUID -> Proxy-ID (fuer Affinitaets-Hinweise)
    uuid_index: DashMap<RemoteKanalId, KanalId>,
    registry: WorkerRegistry,
    bruecken: BrueckenKoordinator,
}

// ---------------------------------------------------------------------------
// KanalTabelle
// ---------------------------------------------------------------------------

/// Vermittelt Kanaele auf Worker und korreliert deren Antworten
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct KanalTabelle {
    inner: Arc<TabelleInner>,
}

impl KanalTabelle {
    /// Erstellt eine Tabelle ueber der gegebenen Registry
    pub fn neu(registry: WorkerRegistry) -> Self {
        Self {
            inner: Arc::new(TabelleInner {
                kanaele: DashMap::new(),
                uuid_index: DashMap::new(),
                registry,
                bruecken: BrueckenKoordinator::neu(),
            }),
        }
    }

    /// Anzahl der aktuell gefuehrten Kanaele
    pub fn kanal_anzahl(&self) -> usize {
        self.inner.kanaele.len()
    }

    /// Anzahl der aktiven Bruecken
    pub fn bruecken_anzahl(&self) -> usize {
        self.inner.bruecken.anzahl()
    }

    /// Oeffnet einen Kanal auf einem passenden Worker
    ///
    /// Waehlt den Worker nach Affinitaet (`related`) und Spielraum aus,
    /// schickt das open-Kommando und gibt Handle plus Quittung zurueck.
    /// Ohne registrierte Worker schlaegt der Aufruf sofort fehl.
    pub async fn kanal_oeffnen(
        &self,
        optionen: KanalOeffnenOptionen,
        sink: mpsc::Sender<WorkerNachricht>,
    ) -> Result<(KanalProxy, OeffnungsQuittung)> {
        // Affinitaets-Hinweise auf Instanzen abbilden
        let affinitaet: Vec<String> = optionen
            .related
            .iter()
            .filter_map(|uuid| self.inner.uuid_index.get(uuid).map(|id| *id))
            .filter_map(|id| {
                self.inner
                    .kanaele
                    .get(&id)
                    .map(|z| z.worker.instanz().to_string())
            })
            .collect();

        let worker = self.inner.registry.auswaehlen(&affinitaet)?;
        let id = KanalId::new();
        let (warter_tx, warter_rx) = oneshot::channel();

        self.inner.kanaele.insert(
            id,
            KanalZustand {
                worker: worker.clone(),
                uuid: None,
                lokal: None,
                sink,
                offen_warter: Some(warter_tx),
            },
        );

        tracing::info!(
            kanal = %id,
            worker = %worker.instanz(),
            "Kanal wird geoeffnet"
        );

        if let Err(e) = worker.senden(KommandoNachricht::open(id, optionen)).await {
            self.inner.kanaele.remove(&id);
            return Err(e);
        }

        let proxy = KanalProxy {
            id,
            inner: Arc::downgrade(&self.inner),
        };
        Ok((proxy, OeffnungsQuittung(warter_rx)))
    }

    // -----------------------------------------------------------------------
    // Routing eingehender Worker-Nachrichten
    // -----------------------------------------------------------------------

    /// Verarbeitet eine kanalbezogene Nachricht eines Workers
    ///
    /// Reine Status-Frames sind vorher schon in der Registry gelandet.
    pub(crate) fn nachricht_verarbeiten(&self, instanz: &str, nachricht: WorkerNachricht) {
        let id = match nachricht.id {
            Some(id) => id,
            None => return,
        };

        match nachricht.aktion() {
            Some("open") => self.offen_bestaetigt(instanz, id, nachricht),
            Some("close") => self.kanal_geschlossen(instanz, id, nachricht),
            _ => self.ereignis_weiterleiten(id, nachricht),
        }
    }

    /// Loest die Oeffnungs-Quittung eines Kanals auf
    fn offen_bestaetigt(&self, instanz: &str, id: KanalId, nachricht: WorkerNachricht) {
        let (uuid, lokal) = match (nachricht.uuid, nachricht.local.clone()) {
            (Some(uuid), Some(lokal)) => (uuid, lokal),
            _ => {
                tracing::warn!(kanal = %id, instanz, "open-Bestaetigung ohne uuid oder local");
                return;
            }
        };

        let warter = {
            let mut zustand = match self.inner.kanaele.get_mut(&id) {
                Some(zustand) => zustand,
                None => {
                    tracing::debug!(kanal = %id, instanz, "Spaete open-Bestaetigung ignoriert");
                    return;
                }
            };
            match zustand.offen_warter.take() {
                Some(warter) => {
                    zustand.uuid = Some(uuid);
                    zustand.lokal = Some(lokal.clone());
                    Some(warter)
                }
                None => None,
            }
        };

        match warter {
            Some(warter) => {
                self.inner.uuid_index.insert(uuid, id);
                tracing::info!(
                    kanal = %id,
                    uuid = %uuid,
                    port = lokal.port,
                    "Kanal bestaetigt"
                );
                let _ = warter.send(Ok(KanalBereit { uuid, lokal }));
            }
            // Doppelte Bestaetigung: als gewoehnliches Ereignis durchreichen
            None => self.ereignis_weiterleiten(id, nachricht),
        }
    }

    /// Traegt einen vom Worker geschlossenen Kanal aus
    fn kanal_geschlossen(&self, instanz: &str, id: KanalId, nachricht: WorkerNachricht) {
        let zustand =
            match self.eintrag_austragen(id, || TonmeisterFehler::VorOeffnungGeschlossen) {
                Some(zustand) => zustand,
                None => {
                    // Vom Aufrufer schon per schliessen ausgetragen
                    tracing::debug!(kanal = %id, instanz, "close fuer unbekannten Kanal");
                    return;
                }
            };

        tracing::info!(
            kanal = %id,
            instanz,
            grund = nachricht.rest.get("reason").and_then(|w| w.as_str()).unwrap_or(""),
            "Kanal geschlossen"
        );
        Self::sink_zustellen(&zustand.sink, id, nachricht);

        // Der ausgetragene Kanal wird beim Abbau uebersprungen
        self.bruecken_abbauen(id);
    }

    /// Reicht ein Ereignis unveraendert an den Sink des Kanals weiter
    fn ereignis_weiterleiten(&self, id: KanalId, nachricht: WorkerNachricht) {
        let sink = match self.inner.kanaele.get(&id) {
            Some(zustand) => zustand.sink.clone(),
            None => {
                tracing::debug!(kanal = %id, "Ereignis fuer unbekannten Kanal verworfen");
                return;
            }
        };
        Self::sink_zustellen(&sink, id, nachricht);
    }

    fn sink_zustellen(sink: &mpsc::Sender<WorkerNachricht>, id: KanalId, nachricht: WorkerNachricht) {
        match sink.try_send(nachricht) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(kanal = %id, "Ereignis-Senke voll, Nachricht verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(kanal = %id, "Ereignis-Senke geschlossen");
            }
        }
    }

    /// Beendet alle Kanaele eines verlorenen Workers
    ///
    /// Offene Quittungen werden abgewiesen, jeder Sink bekommt ein
    /// synthetisches worker-lost-Ereignis, Bruecken werden zu den noch
    /// lebenden Seiten hin abgebaut.
    pub(crate) fn worker_verloren(&self, instanz: &str) {
        let betroffen: Vec<KanalId> = self
            .inner
            .kanaele
            .iter()
            .filter(|zustand| zustand.worker.instanz() == instanz)
            .map(|zustand| *zustand.key())
            .collect();

        if betroffen.is_empty() {
            return;
        }
        tracing::warn!(
            instanz,
            kanaele = betroffen.len(),
            "Worker verloren, Kanaele werden beendet"
        );

        for id in &betroffen {
            let zustand = match self.eintrag_austragen(*id, || {
                TonmeisterFehler::WorkerVerloren(instanz.to_string())
            }) {
                Some(zustand) => zustand,
                None => continue,
            };
            Self::sink_zustellen(
                &zustand.sink,
                *id,
                WorkerNachricht::worker_verloren(*id, zustand.uuid, instanz),
            );
        }

        // Bruecken erst nach dem Austragen abbauen: tote Beine sind dann
        // schon weg und bekommen keine Kommandos mehr
        for id in betroffen {
            self.bruecken_abbauen(id);
        }
    }

    // -----------------------------------------------------------------------
    // Bruecken
    // -----------------------------------------------------------------------

    /// Baut eine Bruecke zwischen zwei Kanaelen auf verschiedenen Workern
    async fn bruecke_aufbauen(&self, a: &KanalProxy, b: &KanalProxy) -> Result<()> {
        let (_, uuid_a) = self.versand_daten(a.id)?;
        let (_, uuid_b) = self.versand_daten(b.id)?;
        let uuid_a = uuid_a.ok_or_else(|| {
            TonmeisterFehler::intern("Mischen vor der Oeffnungsbestaetigung")
        })?;
        let uuid_b = uuid_b.ok_or_else(|| {
            TonmeisterFehler::intern("Mischen vor der Oeffnungsbestaetigung")
        })?;

        // Besteht die Bruecke schon, werden nur die Mischungen erneuert
        if let Some(bestehend) = self.inner.bruecken.bestehende(a.id, b.id) {
            tracing::debug!(a = %a.id, b = %b.id, "Bruecke besteht, Mischungen werden erneuert");
            self.mischung_senden(bestehend.a, bestehend.hilfs_a).await?;
            self.mischung_senden(bestehend.b, bestehend.hilfs_b).await?;
            return Ok(());
        }

        tracing::info!(a = %a.id, b = %b.id, "Bruecke wird aufgebaut");

        // Hilfskanaele neben den Originalen oeffnen
        let optionen_a = KanalOeffnenOptionen {
            related: vec![uuid_a],
            ..Default::default()
        };
        let optionen_b = KanalOeffnenOptionen {
            related: vec![uuid_b],
            ..Default::default()
        };
        let (hilfs_a, quittung_a) = self.kanal_oeffnen(optionen_a, Self::hilfs_senke()).await?;
        let (hilfs_b, quittung_b) = match self.kanal_oeffnen(optionen_b, Self::hilfs_senke()).await
        {
            Ok(paar) => paar,
            Err(e) => {
                let _ = hilfs_a.schliessen().await;
                return Err(e);
            }
        };

        let aufbau = async {
            let (bereit_a, bereit_b) =
                tokio::try_join!(quittung_a.warten(), quittung_b.warten())?;

            // Medien kreuzweise verbinden
            hilfs_a.gegenstelle(bereit_b.lokal).await?;
            hilfs_b.gegenstelle(bereit_a.lokal).await?;

            // Lokale Mischungen auf beiden Seiten
            self.mischung_senden(a.id, hilfs_a.id).await?;
            self.mischung_senden(b.id, hilfs_b.id).await?;
            Ok(())
        };

        match aufbau.await {
            Ok(()) => {
                self.inner.bruecken.eintragen(Bruecke {
                    a: a.id,
                    b: b.id,
                    hilfs_a: hilfs_a.id,
                    hilfs_b: hilfs_b.id,
                });
                tracing::info!(a = %a.id, b = %b.id, "Bruecke steht");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(a = %a.id, b = %b.id, fehler = %e, "Brueckenbau fehlgeschlagen");
                let _ = hilfs_a.schliessen().await;
                let _ = hilfs_b.schliessen().await;
                Err(e)
            }
        }
    }

    /// Schickt ein mix-Kommando fuer einen Kanal und seinen Partner
    async fn mischung_senden(&self, kanal: KanalId, partner: KanalId) -> Result<()> {
        let (worker, uuid) = self.versand_daten(kanal)?;
        let (_, partner_uuid) = self.versand_daten(partner)?;
        worker
            .senden(KommandoNachricht::mix(
                kanal,
                uuid,
                KanalBeschreibung {
                    id: partner,
                    uuid: partner_uuid,
                },
            ))
            .await
    }

    /// Baut alle Bruecken eines Kanals ab
    ///
    /// Entmischt jedes noch gefuehrte Bein, traegt die Hilfskanaele aus
    /// und schickt ihnen ein close hinterher. Gibt true zurueck wenn
    /// mindestens eine Bruecke bestand.
    ///
    /// Laeuft auch auf Verbindungs-Tasks, deren Kommando-Queue nur die
    /// eigene Schleife leert. Alle Sendungen gehen deshalb ohne Warten
    /// raus; was in keine Queue passt, wird verworfen.
    fn bruecken_abbauen(&self, id: KanalId) -> bool {
        let bruecken = self.inner.bruecken.entnehmen_fuer(id);
        if bruecken.is_empty() {
            return false;
        }

        for bruecke in bruecken {
            tracing::info!(a = %bruecke.a, b = %bruecke.b, "Bruecke wird abgebaut");

            for bein in bruecke.beteiligte() {
                if let Ok((worker, uuid)) = self.versand_daten(bein) {
                    worker.senden_versuchen(KommandoNachricht::unmix(bein, uuid));
                }
            }

            for hilfs in bruecke.hilfskanaele() {
                if let Some(zustand) =
                    self.eintrag_austragen(hilfs, || TonmeisterFehler::VorOeffnungGeschlossen)
                {
                    zustand
                        .worker
                        .senden_versuchen(KommandoNachricht::close(hilfs, zustand.uuid));
                }
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Worker-Handle und Worker-UUID eines gefuehrten Kanals
    fn versand_daten(&self, id: KanalId) -> Result<(Worker, Option<RemoteKanalId>)> {
        self.inner
            .kanaele
            .get(&id)
            .map(|zustand| (zustand.worker.clone(), zustand.uuid))
            .ok_or(TonmeisterFehler::UnbekannterKanal(id))
    }

    /// Traegt einen Kanal aus Tabelle und UUID-Index aus
    ///
    /// Eine noch offene Oeffnungs-Quittung wird mit dem gegebenen Fehler
    /// abgewiesen. Ab hier meldet jede Operation auf der ID
    /// `UnbekannterKanal`.
    fn eintrag_austragen(
        &self,
        id: KanalId,
        abweisung: impl FnOnce() -> TonmeisterFehler,
    ) -> Option<KanalZustand> {
        let (_, mut zustand) = self.inner.kanaele.remove(&id)?;
        if let Some(uuid) = zustand.uuid {
            self.inner.uuid_index.remove(&uuid);
        }
        if let Some(warter) = zustand.offen_warter.take() {
            let _ = warter.send(Err(abweisung()));
        }
        Some(zustand)
    }

    /// Stoesst das Schliessen eines Kanals an
    ///
    /// Traegt den Eintrag sofort aus und schickt dem Worker das
    /// close-Kommando hinterher. Idempotent: ein schon ausgetragener
    /// Kanal ist kein Fehler.
    async fn kanal_schliessen_intern(&self, id: KanalId) -> Result<()> {
        let zustand =
            match self.eintrag_austragen(id, || TonmeisterFehler::VorOeffnungGeschlossen) {
                Some(zustand) => zustand,
                None => return Ok(()),
            };

        tracing::debug!(kanal = %id, "close wird gesendet");
        zustand
            .worker
            .senden(KommandoNachricht::close(id, zustand.uuid))
            .await
    }

    /// Ereignis-Senke fuer Hilfskanaele: leert sich selbst
    fn hilfs_senke() -> mpsc::Sender<WorkerNachricht> {
        let (tx, mut rx) = mpsc::channel::<WorkerNachricht>(HILFS_SENKE_GROESSE);
        tokio::spawn(async move {
            while let Some(nachricht) = rx.recv().await {
                tracing::trace!(aktion = ?nachricht.aktion(), "Hilfskanal-Ereignis");
            }
        });
        tx
    }
}

// ---------------------------------------------------------------------------
// KanalProxy
// ---------------------------------------------------------------------------

/// Aufrufer-Handle auf einen vermittelten Kanal
///
/// Haelt die Tabelle nur schwach: ein Handle ueberlebt den Proxy-Zustand
/// nicht und jede Operation auf einem abgeraeumten Kanal meldet sauber
/// einen Fehler.
#[derive(Clone)]
pub struct KanalProxy {
    id: KanalId,
    inner: Weak<TabelleInner>,
}

impl KanalProxy {
    /// Proxy-vergebene ID des Kanals
    pub fn id(&self) -> KanalId {
        self.id
    }

    /// Worker-vergebene ID, sobald bestaetigt
    pub fn uuid(&self) -> Option<RemoteKanalId> {
        let tabelle = self.tabelle().ok()?;
        tabelle.inner.kanaele.get(&self.id).and_then(|z| z.uuid)
    }

    /// Lokale Medien-Adresse aus der Bestaetigung
    pub fn lokale_adresse(&self) -> Option<MedienAdresse> {
        let tabelle = self.tabelle().ok()?;
        tabelle
            .inner
            .kanaele
            .get(&self.id)
            .and_then(|z| z.lokal.clone())
    }

    /// Instanz des Workers der den Kanal hostet
    pub fn worker_instanz(&self) -> Option<String> {
        let tabelle = self.tabelle().ok()?;
        tabelle
            .inner
            .kanaele
            .get(&self.id)
            .map(|z| z.worker.instanz().to_string())
    }

    /// Schliesst den Kanal
    ///
    /// Baut zuerst alle Bruecken des Kanals ab, traegt den Eintrag sofort
    /// aus und schickt dem Worker das close-Kommando. Idempotent; das
    /// spaetere close-Ereignis des Workers laeuft ins Leere.
    pub async fn schliessen(&self) -> Result<()> {
        let tabelle = self.tabelle()?;
        tabelle.bruecken_abbauen(self.id);
        tabelle.kanal_schliessen_intern(self.id).await
    }

    /// Mischt diesen Kanal mit einem anderen
    ///
    /// Auf demselben Worker genuegt ein mix-Kommando; ueber Worker-Grenzen
    /// hinweg wird eine Bruecke aufgebaut.
    pub async fn mischen(&self, anderer: &KanalProxy) -> Result<()> {
        if !Weak::ptr_eq(&self.inner, &anderer.inner) {
            return Err(TonmeisterFehler::intern(
                "Kanaele gehoeren zu verschiedenen Tabellen",
            ));
        }
        let tabelle = self.tabelle()?;
        let (eigener_worker, eigene_uuid) = tabelle.versand_daten(self.id)?;
        let (anderer_worker, andere_uuid) = tabelle.versand_daten(anderer.id)?;

        if eigener_worker.instanz() == anderer_worker.instanz() {
            tracing::debug!(a = %self.id, b = %anderer.id, "Mischung auf demselben Worker");
            eigener_worker
                .senden(KommandoNachricht::mix(
                    self.id,
                    eigene_uuid,
                    KanalBeschreibung {
                        id: anderer.id,
                        uuid: andere_uuid,
                    },
                ))
                .await
        } else {
            tabelle.bruecke_aufbauen(self, anderer).await
        }
    }

    /// Loest die Mischungen dieses Kanals auf
    ///
    /// Bestehen Bruecken, werden sie komplett abgebaut; sonst geht ein
    /// einzelnes unmix an den Worker.
    pub async fn mix_loesen(&self) -> Result<()> {
        let tabelle = self.tabelle()?;
        if tabelle.bruecken_abbauen(self.id) {
            return Ok(());
        }
        let (worker, uuid) = tabelle.versand_daten(self.id)?;
        worker.senden(KommandoNachricht::unmix(self.id, uuid)).await
    }

    /// Spielt DTMF-Ziffern auf dem Kanal ein
    pub async fn dtmf(&self, ziffern: impl Into<String>) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::dtmf(id, uuid, ziffern.into()))
            .await
    }

    /// Schaltet den Kanal in den Echo-Modus
    pub async fn echo(&self) -> Result<()> {
        self.senden(KommandoNachricht::echo).await
    }

    /// Startet einen Abspielplan
    pub async fn abspielen(&self, plan: serde_json::Value) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::play(id, uuid, plan))
            .await
    }

    /// Startet eine Aufnahme
    pub async fn aufnehmen(&self, optionen: serde_json::Value) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::record(id, uuid, optionen))
            .await
    }

    /// Setzt die Sende-/Empfangsrichtung
    pub async fn richtung(&self, optionen: RichtungsOptionen) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::direction(id, uuid, optionen))
            .await
    }

    /// Setzt das Medienziel des Kanals
    pub async fn ziel(&self, spec: MedienAdresse) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::target(id, uuid, spec))
            .await
    }

    /// Setzt die Gegenstelle fuer Knoten-zu-Knoten-Medien
    pub async fn gegenstelle(&self, spec: MedienAdresse) -> Result<()> {
        self.senden(|id, uuid| KommandoNachricht::remote(id, uuid, spec))
            .await
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn tabelle(&self) -> Result<KanalTabelle> {
        self.inner
            .upgrade()
            .map(|inner| KanalTabelle { inner })
            .ok_or_else(|| TonmeisterFehler::getrennt("Kanal-Tabelle nicht mehr vorhanden"))
    }

    async fn senden(
        &self,
        bauen: impl FnOnce(KanalId, Option<RemoteKanalId>) -> KommandoNachricht,
    ) -> Result<()> {
        let tabelle = self.tabelle()?;
        let (worker, uuid) = tabelle.versand_daten(self.id)?;
        worker.senden(bauen(self.id, uuid)).await
    }
}

impl std::fmt::Debug for KanalProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanalProxy").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
