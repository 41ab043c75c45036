//! Fehlertypen fuer Tonmeister
//!
//! Zentraler Fehler-Enum der alle Fehlerzustaende der Steuerungsebene
//! abdeckt. Rahmen- und JSON-Fehler bleiben an der Transportgrenze haengen;
//! semantische Fehler werden als gewoehnliche Werte an den Aufrufer
//! durchgereicht und sind nie prozess-fatal.

use thiserror::Error;

use crate::types::KanalId;

/// Globaler Result-Alias fuer Tonmeister
pub type Result<T> = std::result::Result<T, TonmeisterFehler>;

/// Alle moeglichen Fehler im Tonmeister-System
#[derive(Debug, Error)]
pub enum TonmeisterFehler {
    // --- Transport & Rahmung ---
    #[error("Rahmenfehler: {0}")]
    Rahmen(String),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    // --- Vermittlung ---
    #[error("Keine Worker verfuegbar")]
    KeineWorkerVerfuegbar,

    #[error("Worker verloren: {0}")]
    WorkerVerloren(String),

    #[error("Kanal vor Oeffnung geschlossen")]
    VorOeffnungGeschlossen,

    #[error("Unbekannter Kanal: {0}")]
    UnbekannterKanal(KanalId),

    // --- Protokoll ---
    #[error("Unbekannte Methode")]
    UnbekannteMethode,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error("E/A-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TonmeisterFehler {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Getrennt-Fehler aus einer beliebigen Nachricht
    pub fn getrennt(msg: impl Into<String>) -> Self {
        Self::Getrennt(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Getrennt(_) | Self::KeineWorkerVerfuegbar | Self::Io(_)
        )
    }
}
