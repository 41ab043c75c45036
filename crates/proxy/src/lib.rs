//! tonmeister-proxy – Vermittlungsebene fuer Audio-Worker
//!
//! Dieser Crate implementiert die Proxy-Seite der Tonmeister-Steuerung.
//! Worker verbinden sich per TCP und melden sich mit einem Status-Frame an;
//! der Proxy vermittelt danach Kanaele auf die Worker, korreliert deren
//! Antworten und reicht Ereignisse an die Aufrufer weiter.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (ProxyServer)
//!     |
//!     v
//! WorkerVerbindung (pro Worker ein Task)
//!     |  Anmeldung ueber den ersten Status-Frame
//!     |
//!     +-- WorkerRegistry – Wer ist verbunden, mit welcher Kapazitaet
//!     |
//!     v
//! KanalTabelle
//!     |  Worker-Auswahl, open-Korrelation, Ereignis-Routing
//!     |
//!     +-- KanalProxy          – Aufrufer-Handle pro Kanal
//!     +-- BrueckenKoordinator – Mischungen ueber Worker-Grenzen
//! ```

pub mod bridge;
pub mod channel;
pub mod connection;
pub mod registry;
pub mod tcp;

// Bequeme Re-Exporte
pub use channel::{KanalBereit, KanalProxy, KanalTabelle, OeffnungsQuittung};
pub use connection::WorkerVerbindung;
pub use registry::{Worker, WorkerRegistry};
pub use tcp::ProxyServer;
