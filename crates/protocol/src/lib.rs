//! tonmeister-protocol – Drahtformat zwischen Proxy und Worker
//!
//! Dieses Crate definiert den Frame-Codec fuer die persistente
//! TCP-Verbindung sowie alle Steuerungsnachrichten die darueber laufen.

pub mod control;
pub mod wire;

pub use control::{
    KanalBeschreibung, KanalKapazitaet, KanalKommando, KanalOeffnenOptionen, KommandoNachricht,
    MedienAdresse, RichtungsOptionen, SchlussStatistik, StatusBericht, WorkerNachricht,
};
pub use wire::{frame_lesen, frame_schreiben, FrameCodec, WIRE_MAGIC, WIRE_VERSION};
