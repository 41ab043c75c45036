//! tonmeister-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Tonmeister-Crates gemeinsam genutzt werden: die Kanal-IDs der
//! Steuerungsebene und die zentrale Fehlertaxonomie.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, TonmeisterFehler};
pub use types::{KanalId, RemoteKanalId};
