//! Steuerprotokoll zwischen Proxy und Worker
//!
//! Definiert alle Steuerungsnachrichten die ueber die persistente
//! TCP-Verbindung zwischen dem Proxy und seinen Workern laufen.
//!
//! ## Design
//! - Proxy -> Worker: Kommandos, das Feld `channel` waehlt die Aktion
//! - Worker -> Proxy: Ereignisse, das Feld `action` benennt die Art
//! - Jede Nachricht traegt `id` (Proxy-Korrelationsschluessel) und nach der
//!   open-Bestaetigung `uuid` (Worker-vergebene Kanal-ID)
//! - Worker-Nachrichten fuehren huckepack einen `status`-Schnappschuss mit
//! - Unbekannte Aktionen landen in einem expliziten Default-Arm statt in
//!   einem Laufzeit-Lookup

use serde::{Deserialize, Serialize};
use tonmeister_core::types::{KanalId, RemoteKanalId};

// ---------------------------------------------------------------------------
// Status & Kapazitaet
// ---------------------------------------------------------------------------

/// Kanal-Kapazitaet eines Workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanalKapazitaet {
    /// Wie viele Kanaele die Engine noch aufnehmen kann
    pub available: u32,
    /// Wie viele Kanaele gerade offen sind
    pub current: u32,
}

impl KanalKapazitaet {
    /// Freier Spielraum des Workers (fuer die Node-Auswahl)
    pub fn headroom(&self) -> i64 {
        i64::from(self.available) - i64::from(self.current)
    }
}

/// Kapazitaets- und Identitaetsbericht eines Workers
///
/// Wird als `status`-Objekt an jede Worker-Nachricht gehaengt; die erste
/// Nachricht nach dem Verbindungsaufbau besteht nur aus diesem Bericht und
/// dient als Registrierungs-Handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBericht {
    /// Anzahl der Engine-Prozesse hinter diesem Link
    #[serde(rename = "workerCount")]
    pub worker_count: u32,
    /// Instanz-ID des Workers (opak, eindeutig pro Prozesslebensdauer)
    pub instance: String,
    /// Kanal-Kapazitaet
    pub channel: KanalKapazitaet,
}

// ---------------------------------------------------------------------------
// Medien-Beschreibungen
// ---------------------------------------------------------------------------

/// DTLS-Parameter, vom Proxy unangetastet durchgereicht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsParameter {
    /// Zertifikats-Fingerprint
    pub fingerprint: String,
    /// Rollen-Aushandlung (z.B. "actpass")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
}

/// Medien-Adresse eines Kanals
///
/// Dient sowohl als `local`-Beschreibung in der open-Bestaetigung als auch
/// als Ziel fuer `target`/`remote`-Kommandos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedienAdresse {
    /// IP-Adresse oder Hostname
    pub address: String,
    /// UDP-Port
    pub port: u16,
    /// Ausgehandelter Codec, falls bekannt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Optionale DTLS-Parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtls: Option<DtlsParameter>,
}

// ---------------------------------------------------------------------------
// Kanal-Optionen
// ---------------------------------------------------------------------------

/// Optionen fuer das Oeffnen eines Kanals
///
/// `related` ist rein proxy-intern (Kolokations-Hinweis) und wird beim
/// Serialisieren unterdrueckt: der Worker bekommt das Feld nie zu sehen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KanalOeffnenOptionen {
    /// Gewuenschter Codec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Affinitaets-Liste: bereits gehostete Kanaele, neben denen dieser
    /// Kanal liegen soll (geht nie auf die Leitung)
    #[serde(default, skip_serializing)]
    pub related: Vec<RemoteKanalId>,
    /// Restliche Optionen, unangetastet fuer die Engine
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Sende-/Empfangsrichtung eines Kanals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichtungsOptionen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv: Option<bool>,
}

/// Beschreibung eines Partner-Kanals fuer `mix`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanalBeschreibung {
    /// Proxy-seitige ID des Partners
    pub id: KanalId,
    /// Worker-seitige ID des Partners, falls schon geoeffnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<RemoteKanalId>,
}

/// Zaehlerstaende beim Schliessen eines Kanals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchlussStatistik {
    /// Empfangene Medienpakete
    #[serde(rename = "in")]
    pub eingehend: u64,
    /// Gesendete Medienpakete
    #[serde(rename = "out")]
    pub ausgehend: u64,
    /// Engine-Ticks waehrend der Lebensdauer
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Proxy -> Worker: Kommandos
// ---------------------------------------------------------------------------

/// Alle Kanal-Kommandos (typsicher via Tagged Enum auf dem Feld `channel`)
///
/// Der `Unbekannt`-Arm faengt jede nicht modellierte Aktion auf, damit der
/// Dispatcher sie explizit mit "Unknown method" beantworten kann statt sie
/// stumm zu verlieren.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum KanalKommando {
    /// Kanal auf der Engine oeffnen
    Open(KanalOeffnenOptionen),
    /// Kanal schliessen
    Close,
    /// Mit einem anderen Kanal desselben Workers mischen
    Mix { other: KanalBeschreibung },
    /// Mischung aufloesen
    Unmix,
    /// DTMF-Ziffern einspielen
    Dtmf { digits: String },
    /// Echo-Modus (Eingang auf Ausgang spiegeln)
    Echo,
    /// Abspielplan starten
    Play { soup: serde_json::Value },
    /// Aufnahme starten
    Record { options: serde_json::Value },
    /// Sende-/Empfangsrichtung setzen
    Direction { options: RichtungsOptionen },
    /// Medienziel des Kanals setzen
    Target { spec: MedienAdresse },
    /// Gegenstelle fuer Knoten-zu-Knoten-Medien setzen
    Remote { spec: MedienAdresse },
    /// Jede nicht modellierte Aktion
    #[serde(other)]
    Unbekannt,
}

impl KanalKommando {
    /// Wire-Name der Aktion (fuer Logs)
    pub fn aktion(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Close => "close",
            Self::Mix { .. } => "mix",
            Self::Unmix => "unmix",
            Self::Dtmf { .. } => "dtmf",
            Self::Echo => "echo",
            Self::Play { .. } => "play",
            Self::Record { .. } => "record",
            Self::Direction { .. } => "direction",
            Self::Target { .. } => "target",
            Self::Remote { .. } => "remote",
            Self::Unbekannt => "unbekannt",
        }
    }
}

/// Kommando-Umschlag: Korrelations-IDs plus flach serialisiertes Kommando
///
/// Auf der Leitung liegen `id`, `uuid` und die Kommando-Felder nebeneinander
/// in einem Objekt, z.B. `{"id":"...","uuid":"...","channel":"dtmf",
/// "digits":"123"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KommandoNachricht {
    /// Proxy-vergebene Kanal-ID (Korrelationsschluessel)
    pub id: KanalId,
    /// Worker-vergebene Kanal-ID, sobald bekannt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<RemoteKanalId>,
    /// Das eigentliche Kommando
    #[serde(flatten)]
    pub kommando: KanalKommando,
}

impl KommandoNachricht {
    /// Erstellt eine neue Kommando-Nachricht
    pub fn new(id: KanalId, uuid: Option<RemoteKanalId>, kommando: KanalKommando) -> Self {
        Self { id, uuid, kommando }
    }

    /// Kanal oeffnen (`related` wird beim Serialisieren entfernt)
    pub fn open(id: KanalId, optionen: KanalOeffnenOptionen) -> Self {
        Self::new(id, None, KanalKommando::Open(optionen))
    }

    /// Kanal schliessen
    pub fn close(id: KanalId, uuid: Option<RemoteKanalId>) -> Self {
        Self::new(id, uuid, KanalKommando::Close)
    }

    /// Gleicher-Worker-Mischung anfordern
    pub fn mix(id: KanalId, uuid: Option<RemoteKanalId>, other: KanalBeschreibung) -> Self {
        Self::new(id, uuid, KanalKommando::Mix { other })
    }

    /// Mischung aufloesen
    pub fn unmix(id: KanalId, uuid: Option<RemoteKanalId>) -> Self {
        Self::new(id, uuid, KanalKommando::Unmix)
    }

    /// DTMF-Ziffern senden
    pub fn dtmf(id: KanalId, uuid: Option<RemoteKanalId>, digits: impl Into<String>) -> Self {
        Self::new(
            id,
            uuid,
            KanalKommando::Dtmf {
                digits: digits.into(),
            },
        )
    }

    /// Echo-Modus anfordern
    pub fn echo(id: KanalId, uuid: Option<RemoteKanalId>) -> Self {
        Self::new(id, uuid, KanalKommando::Echo)
    }

    /// Abspielplan starten
    pub fn play(id: KanalId, uuid: Option<RemoteKanalId>, soup: serde_json::Value) -> Self {
        Self::new(id, uuid, KanalKommando::Play { soup })
    }

    /// Aufnahme starten
    pub fn record(id: KanalId, uuid: Option<RemoteKanalId>, options: serde_json::Value) -> Self {
        Self::new(id, uuid, KanalKommando::Record { options })
    }

    /// Richtung setzen
    pub fn direction(
        id: KanalId,
        uuid: Option<RemoteKanalId>,
        options: RichtungsOptionen,
    ) -> Self {
        Self::new(id, uuid, KanalKommando::Direction { options })
    }

    /// Medienziel setzen
    pub fn target(id: KanalId, uuid: Option<RemoteKanalId>, spec: MedienAdresse) -> Self {
        Self::new(id, uuid, KanalKommando::Target { spec })
    }

    /// Gegenstelle setzen
    pub fn remote(id: KanalId, uuid: Option<RemoteKanalId>, spec: MedienAdresse) -> Self {
        Self::new(id, uuid, KanalKommando::Remote { spec })
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Worker -> Proxy: Ereignisse
// ---------------------------------------------------------------------------

/// Fehlertext fuer nicht modellierte Aktionen
pub const UNBEKANNTE_METHODE: &str = "Unknown method";

/// Aktionsname des synthetischen Worker-Verlust-Ereignisses
///
/// Wird proxy-seitig erzeugt wenn die Verbindung eines Workers abreisst und
/// steht nie auf der Leitung.
pub const AKTION_WORKER_VERLOREN: &str = "worker-lost";

/// Nachricht vom Worker an den Proxy
///
/// Entweder ein reiner Status-Frame (nur `status` gesetzt) oder ein
/// kanalbezogenes Ereignis. Die Ereignis-Art steht in `action`; alle nicht
/// modellierten Felder (`reason`, `stats`, `digit`, ...) bleiben im
/// flachen Rest und werden unveraendert an den Ereignis-Sink des Kanals
/// weitergereicht.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerNachricht {
    /// Proxy-vergebene Kanal-ID (fehlt bei reinen Status-Frames)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<KanalId>,
    /// Worker-vergebene Kanal-ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<RemoteKanalId>,
    /// Ereignis-Art ("open", "close", "error", "telephone-event", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Lokale Medien-Adresse (nur in open-Bestaetigungen)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<MedienAdresse>,
    /// Fehlertext (nur in error-Ereignissen)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Huckepack-Kapazitaetsbericht des Workers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusBericht>,
    /// Restliche Ereignis-Felder, unangetastet durchgereicht
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl WorkerNachricht {
    /// Reiner Status-Frame (Registrierungs-Handshake und Heartbeat)
    pub fn status_meldung(status: StatusBericht) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Bestaetigung eines erfolgreichen `open`
    pub fn offen_bestaetigung(id: KanalId, uuid: RemoteKanalId, local: MedienAdresse) -> Self {
        Self {
            id: Some(id),
            uuid: Some(uuid),
            action: Some("open".into()),
            local: Some(local),
            ..Self::default()
        }
    }

    /// Antwort auf eine nicht modellierte Aktion
    pub fn unbekannte_methode(id: KanalId, uuid: Option<RemoteKanalId>) -> Self {
        Self {
            id: Some(id),
            uuid,
            action: Some("error".into()),
            error: Some(UNBEKANNTE_METHODE.into()),
            ..Self::default()
        }
    }

    /// Durchgereichtes Engine-Ereignis
    pub fn ereignis(
        id: KanalId,
        uuid: Option<RemoteKanalId>,
        action: impl Into<String>,
        daten: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Some(id),
            uuid,
            action: Some(action.into()),
            rest: daten,
            ..Self::default()
        }
    }

    /// Synthetisches Worker-Verlust-Ereignis (nur proxy-intern)
    pub fn worker_verloren(id: KanalId, uuid: Option<RemoteKanalId>, instanz: &str) -> Self {
        let mut rest = serde_json::Map::new();
        rest.insert("instance".into(), serde_json::Value::String(instanz.into()));
        Self {
            id: Some(id),
            uuid,
            action: Some(AKTION_WORKER_VERLOREN.into()),
            rest,
            ..Self::default()
        }
    }

    /// Gibt die Ereignis-Art zurueck, falls vorhanden
    pub fn aktion(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// True wenn die Nachricht keinerlei Kanalbezug hat
    pub fn ist_status_meldung(&self) -> bool {
        self.id.is_none() && self.action.is_none()
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
