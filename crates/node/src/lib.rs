//! tonmeister-node – Worker-Seite von Tonmeister
//!
//! Ein Worker-Prozess verbindet sich mit dem Proxy, nimmt Kanal-Kommandos
//! entgegen und setzt sie auf einer Audio-Engine um. Die Engine selbst ist
//! hinter `AudioEngine`/`EngineKanal` austauschbar.

pub mod dispatcher;
pub mod engine;
pub mod link;

pub use dispatcher::KommandoVerteiler;
pub use engine::{
    AudioEngine, EngineEreignis, EngineFehler, EngineKanal, OperationsStand, PlatzhalterEngine,
    PlatzhalterKanal,
};
pub use link::{LinkKonfiguration, WorkerLink};
