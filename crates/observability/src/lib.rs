//! # tonmeister-observability
//!
//! Logging-Aufbau fuer die Tonmeister-Prozesse. Proxy und Worker
//! initialisieren ihr strukturiertes Logging ueber diese Crate; Level und
//! Format kommen aus der Konfigurationsdatei und lassen sich per
//! `TM_LOG_LEVEL` / `TM_LOG_FORMAT` uebersteuern.

pub mod logging;

pub use logging::{
    log_format_aus_env, log_format_gueltig, log_level_aus_env, log_level_gueltig,
    logging_initialisieren,
};
