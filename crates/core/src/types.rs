//! Gemeinsame Identifikationstypen fuer Tonmeister
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Auf der Leitung
//! serialisieren beide als nackter UUID-String, damit die Korrelation ueber
//! die `id`/`uuid`-Felder der Frames funktioniert.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vom Proxy vergebene Kanal-ID (Korrelationsschluessel jeder Nachricht)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KanalId(pub Uuid);

impl KanalId {
    /// Erstellt eine neue zufaellige KanalId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for KanalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KanalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kanal:{}", self.0)
    }
}

/// Vom Worker vergebene Kanal-ID (erst nach der open-Bestaetigung bekannt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteKanalId(pub Uuid);

impl RemoteKanalId {
    /// Erstellt eine neue zufaellige RemoteKanalId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for RemoteKanalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RemoteKanalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote:{}", self.0)
    }
}
