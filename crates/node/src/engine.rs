//! Audio-Engine-Anbindung – Schnittstelle zwischen Worker und Medien-Engine
//!
//! Der Worker selbst fasst keine Medienpakete an. Er reicht Kommandos an
//! eine Engine weiter und leitet deren Ereignisse zurueck zum Proxy. Die
//! Schnittstelle ist als Trait-Paar geschnitten:
//! - `AudioEngine` oeffnet Kanaele und meldet Kapazitaet
//! - `EngineKanal` ist das Handle auf einen offenen Kanal
//!
//! Die `PlatzhalterEngine` implementiert beides in-memory. Sie vergibt
//! Ports und UUIDs, fuehrt Operationszaehler und meldet Ereignisse, ohne
//! einen echten Medienprozess zu starten.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonmeister_core::types::RemoteKanalId;
use tonmeister_protocol::control::{
    KanalKapazitaet, KanalOeffnenOptionen, MedienAdresse, RichtungsOptionen, SchlussStatistik,
};

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Ansprechen der Engine
#[derive(Debug, thiserror::Error)]
pub enum EngineFehler {
    /// Die Engine kann keine weiteren Kanaele aufnehmen
    #[error("Engine-Kapazitaet erschoepft")]
    KapazitaetErschoepft,
    /// Sonstiger Engine-Fehler
    #[error("Engine-Fehler: {0}")]
    Intern(String),
}

// ---------------------------------------------------------------------------
// Ereignisse
// ---------------------------------------------------------------------------

/// Standard-Codec wenn der Aufrufer keinen vorgibt
pub const STANDARD_CODEC: &str = "opus";

/// Asynchrones Ereignis einer Engine fuer einen ihrer Kanaele
///
/// Die `daten` gehen unveraendert in den Ereignis-Rest der Worker-Nachricht,
/// der Link ergaenzt nur die Korrelations-IDs.
#[derive(Debug, Clone)]
pub struct EngineEreignis {
    /// Engine-seitige Kanal-ID
    pub uuid: RemoteKanalId,
    /// Ereignis-Art ("close", "telephone-event", "play-done", ...)
    pub aktion: String,
    /// Ereignis-Felder
    pub daten: serde_json::Map<String, Value>,
}

impl EngineEreignis {
    /// Erstellt ein Ereignis
    pub fn neu(
        uuid: RemoteKanalId,
        aktion: impl Into<String>,
        daten: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            uuid,
            aktion: aktion.into(),
            daten,
        }
    }

    /// Schliessungs-Ereignis mit Grund und Zaehlerstaenden
    pub fn schliessung(uuid: RemoteKanalId, grund: &str, stats: SchlussStatistik) -> Self {
        let mut daten = serde_json::Map::new();
        daten.insert("reason".into(), Value::String(grund.into()));
        daten.insert(
            "stats".into(),
            serde_json::to_value(stats).unwrap_or(Value::Null),
        );
        Self::neu(uuid, "close", daten)
    }
}

// ---------------------------------------------------------------------------
// Engine-Traits
// ---------------------------------------------------------------------------

/// Handle auf einen offenen Engine-Kanal
///
/// Alle Operationen sind Fire-and-Forget: die Engine bestaetigt nichts,
/// Rueckmeldungen kommen als `EngineEreignis` ueber den beim Oeffnen
/// uebergebenen Sender.
pub trait EngineKanal: Send + Sync + 'static {
    /// Engine-seitige Kanal-ID
    fn uuid(&self) -> RemoteKanalId;
    /// Lokale Medien-Adresse des Kanals
    fn lokale_adresse(&self) -> MedienAdresse;
    /// Schliesst den Kanal; die Engine meldet ein close-Ereignis
    fn schliessen(&self, grund: &str);
    /// Mischt diesen Kanal mit einem Partner derselben Engine
    fn mischen(&self, partner: &Self);
    /// Loest alle Mischungen dieses Kanals auf
    fn mix_loesen(&self);
    /// Spielt DTMF-Ziffern ein
    fn dtmf(&self, ziffern: &str);
    /// Spiegelt den Eingang auf den Ausgang
    fn echo(&self);
    /// Startet einen Abspielplan
    fn abspielen(&self, plan: &Value);
    /// Startet eine Aufnahme
    fn aufnehmen(&self, optionen: &Value);
    /// Setzt die Sende-/Empfangsrichtung
    fn richtung(&self, optionen: RichtungsOptionen);
    /// Setzt das Medienziel
    fn ziel(&self, spec: &MedienAdresse);
    /// Setzt die Gegenstelle fuer Knoten-zu-Knoten-Medien
    fn gegenstelle(&self, spec: &MedienAdresse);
}

/// Eine Medien-Engine hinter einem Worker
pub trait AudioEngine: Send + Sync + 'static {
    /// Handle-Typ fuer offene Kanaele
    type Kanal: EngineKanal;

    /// Oeffnet einen Kanal
    ///
    /// Ereignisse des Kanals gehen ueber den uebergebenen Sender; der Link
    /// gibt allen Kanaelen denselben geteilten Sender mit.
    fn kanal_oeffnen(
        &self,
        optionen: &KanalOeffnenOptionen,
        ereignisse: mpsc::Sender<EngineEreignis>,
    ) -> Result<Self::Kanal, EngineFehler>;

    /// Aktuelle Kanal-Kapazitaet der Engine
    fn kapazitaet(&self) -> KanalKapazitaet;
}

// ---------------------------------------------------------------------------
// Operationszaehler
// ---------------------------------------------------------------------------

/// Zaehlt Engine-Operationen (fuer Logs und Tests)
#[derive(Debug, Default)]
pub struct OperationsZaehler {
    oeffnen: AtomicU64,
    schliessen: AtomicU64,
    mischen: AtomicU64,
    mix_loesen: AtomicU64,
    dtmf: AtomicU64,
    echo: AtomicU64,
    abspielen: AtomicU64,
    aufnehmen: AtomicU64,
    richtung: AtomicU64,
    ziel: AtomicU64,
    gegenstelle: AtomicU64,
}

/// Momentaufnahme der Operationszaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationsStand {
    pub oeffnen: u64,
    pub schliessen: u64,
    pub mischen: u64,
    pub mix_loesen: u64,
    pub dtmf: u64,
    pub echo: u64,
    pub abspielen: u64,
    pub aufnehmen: u64,
    pub richtung: u64,
    pub ziel: u64,
    pub gegenstelle: u64,
}

impl OperationsZaehler {
    fn zaehle(feld: &AtomicU64) {
        feld.fetch_add(1, Ordering::Relaxed);
    }

    /// Liest alle Zaehler als Momentaufnahme
    pub fn stand(&self) -> OperationsStand {
        OperationsStand {
            oeffnen: self.oeffnen.load(Ordering::Relaxed),
            schliessen: self.schliessen.load(Ordering::Relaxed),
            mischen: self.mischen.load(Ordering::Relaxed),
            mix_loesen: self.mix_loesen.load(Ordering::Relaxed),
            dtmf: self.dtmf.load(Ordering::Relaxed),
            echo: self.echo.load(Ordering::Relaxed),
            abspielen: self.abspielen.load(Ordering::Relaxed),
            aufnehmen: self.aufnehmen.load(Ordering::Relaxed),
            richtung: self.richtung.load(Ordering::Relaxed),
            ziel: self.ziel.load(Ordering::Relaxed),
            gegenstelle: self.gegenstelle.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// PlatzhalterEngine
// ---------------------------------------------------------------------------

/// In-Memory-Engine ohne echten Medienprozess
///
/// Vergibt UUIDs und Ports, fuehrt Kapazitaets- und Operationszaehler und
/// meldet close-Ereignisse. Dient als Engine fuer Tests und als Geruest
/// fuer echte Engine-Anbindungen.
#[derive(Clone)]
pub struct PlatzhalterEngine {
    inner: Arc<PlatzhalterInner>,
}

struct PlatzhalterInner {
    /// Adresse unter der Kanaele erreichbar gemeldet werden
    adresse: String,
    /// Erster vergebener Medien-Port
    basis_port: u16,
    /// Hoechstzahl gleichzeitig offener Kanaele
    max_kanaele: u32,
    /// Aktuell offene Kanaele
    offene: AtomicU32,
    /// Fortlaufender Port-Versatz
    port_versatz: AtomicU16,
    /// Operationszaehler ueber alle Kanaele
    zaehler: OperationsZaehler,
    /// Wenn gesetzt schlagen alle Oeffnungen fehl
    oeffnen_schlaegt_fehl: AtomicBool,
}

impl PlatzhalterEngine {
    /// Erstellt eine Engine mit Adresse, Basis-Port und Kapazitaet
    pub fn neu(adresse: impl Into<String>, basis_port: u16, max_kanaele: u32) -> Self {
        Self {
            inner: Arc::new(PlatzhalterInner {
                adresse: adresse.into(),
                basis_port,
                max_kanaele,
                offene: AtomicU32::new(0),
                port_versatz: AtomicU16::new(0),
                zaehler: OperationsZaehler::default(),
                oeffnen_schlaegt_fehl: AtomicBool::new(false),
            }),
        }
    }

    /// Schaltet den Fehlermodus um: alle weiteren Oeffnungen schlagen fehl
    pub fn oeffnen_fehlschlagen_lassen(&self, fehlschlagen: bool) {
        self.inner
            .oeffnen_schlaegt_fehl
            .store(fehlschlagen, Ordering::Relaxed);
    }

    /// Zugriff auf die Operationszaehler
    pub fn zaehler(&self) -> OperationsStand {
        self.inner.zaehler.stand()
    }
}

impl Default for PlatzhalterEngine {
    fn default() -> Self {
        Self::neu("127.0.0.1", 40000, 64)
    }
}

impl AudioEngine for PlatzhalterEngine {
    type Kanal = PlatzhalterKanal;

    fn kanal_oeffnen(
        &self,
        optionen: &KanalOeffnenOptionen,
        ereignisse: mpsc::Sender<EngineEreignis>,
    ) -> Result<Self::Kanal, EngineFehler> {
        if self.inner.oeffnen_schlaegt_fehl.load(Ordering::Relaxed) {
            return Err(EngineFehler::Intern("Engine verweigert Oeffnung".into()));
        }

        let offene = self.inner.offene.load(Ordering::Relaxed);
        if offene >= self.inner.max_kanaele {
            return Err(EngineFehler::KapazitaetErschoepft);
        }

        let uuid = RemoteKanalId::new();
        let versatz = self.inner.port_versatz.fetch_add(1, Ordering::Relaxed);
        let adresse = MedienAdresse {
            address: self.inner.adresse.clone(),
            port: self.inner.basis_port.wrapping_add(versatz),
            codec: Some(
                optionen
                    .codec
                    .clone()
                    .unwrap_or_else(|| STANDARD_CODEC.into()),
            ),
            dtls: None,
        };

        self.inner.offene.fetch_add(1, Ordering::Relaxed);
        OperationsZaehler::zaehle(&self.inner.zaehler.oeffnen);
        tracing::debug!(uuid = %uuid, port = adresse.port, "Platzhalter-Kanal geoeffnet");

        Ok(PlatzhalterKanal {
            uuid,
            adresse,
            ereignisse,
            engine: Arc::clone(&self.inner),
            geschlossen: AtomicBool::new(false),
            verkehr: Mutex::new(SchlussStatistik::default()),
        })
    }

    fn kapazitaet(&self) -> KanalKapazitaet {
        KanalKapazitaet {
            available: self.inner.max_kanaele,
            current: self.inner.offene.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// PlatzhalterKanal
// ---------------------------------------------------------------------------

/// Offener Kanal der `PlatzhalterEngine`
pub struct PlatzhalterKanal {
    uuid: RemoteKanalId,
    adresse: MedienAdresse,
    ereignisse: mpsc::Sender<EngineEreignis>,
    engine: Arc<PlatzhalterInner>,
    geschlossen: AtomicBool,
    /// Simulierte Verkehrszaehler fuer die Schluss-Statistik
    verkehr: Mutex<SchlussStatistik>,
}

impl PlatzhalterKanal {
    /// Setzt die simulierten Verkehrszaehler
    pub fn verkehr_setzen(&self, stats: SchlussStatistik) {
        *self.verkehr.lock() = stats;
    }

    /// Loest ein beliebiges Engine-Ereignis fuer diesen Kanal aus
    pub fn ereignis_ausloesen(
        &self,
        aktion: impl Into<String>,
        daten: serde_json::Map<String, Value>,
    ) {
        let ereignis = EngineEreignis::neu(self.uuid, aktion, daten);
        if let Err(e) = self.ereignisse.try_send(ereignis) {
            tracing::warn!(uuid = %self.uuid, fehler = %e, "Ereignis-Queue voll oder zu");
        }
    }
}

impl EngineKanal for PlatzhalterKanal {
    fn uuid(&self) -> RemoteKanalId {
        self.uuid
    }

    fn lokale_adresse(&self) -> MedienAdresse {
        self.adresse.clone()
    }

    fn schliessen(&self, grund: &str) {
        if self.geschlossen.swap(true, Ordering::Relaxed) {
            tracing::debug!(uuid = %self.uuid, "Kanal bereits geschlossen");
            return;
        }

        self.engine.offene.fetch_sub(1, Ordering::Relaxed);
        OperationsZaehler::zaehle(&self.engine.zaehler.schliessen);

        let stats = *self.verkehr.lock();
        let ereignis = EngineEreignis::schliessung(self.uuid, grund, stats);
        if let Err(e) = self.ereignisse.try_send(ereignis) {
            tracing::warn!(uuid = %self.uuid, fehler = %e, "close-Ereignis nicht zustellbar");
        }
        tracing::debug!(uuid = %self.uuid, grund, "Platzhalter-Kanal geschlossen");
    }

    fn mischen(&self, partner: &Self) {
        OperationsZaehler::zaehle(&self.engine.zaehler.mischen);
        tracing::debug!(uuid = %self.uuid, partner = %partner.uuid, "Kanaele gemischt");
    }

    fn mix_loesen(&self) {
        OperationsZaehler::zaehle(&self.engine.zaehler.mix_loesen);
    }

    fn dtmf(&self, ziffern: &str) {
        OperationsZaehler::zaehle(&self.engine.zaehler.dtmf);
        tracing::debug!(uuid = %self.uuid, ziffern, "DTMF eingespielt");
    }

    fn echo(&self) {
        OperationsZaehler::zaehle(&self.engine.zaehler.echo);
    }

    fn abspielen(&self, _plan: &Value) {
        OperationsZaehler::zaehle(&self.engine.zaehler.abspielen);
    }

    fn aufnehmen(&self, _optionen: &Value) {
        OperationsZaehler::zaehle(&self.engine.zaehler.aufnehmen);
    }

    fn richtung(&self, _optionen: RichtungsOptionen) {
        OperationsZaehler::zaehle(&self.engine.zaehler.richtung);
    }

    fn ziel(&self, _spec: &MedienAdresse) {
        OperationsZaehler::zaehle(&self.engine.zaehler.ziel);
    }

    fn gegenstelle(&self, _spec: &MedienAdresse) {
        OperationsZaehler::zaehle(&self.engine.zaehler.gegenstelle);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
