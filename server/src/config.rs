//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen und von beiden Binaries
//! (Proxy und Worker) geteilt. Alle Felder haben sinnvolle Standardwerte,
//! sodass die Prozesse ohne Konfigurationsdatei lauffaehig sind.

use serde::{Deserialize, Serialize};
use tonmeister_observability::{log_format_gueltig, log_level_gueltig};

/// Gemeinsame Konfiguration beider Tonmeister-Prozesse
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen der Proxy-Seite
    pub netzwerk: NetzwerkEinstellungen,
    /// Einstellungen des Worker-Prozesses
    pub worker: WorkerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Proxys
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Tonmeister".into(),
        }
    }
}

/// Netzwerk-Einstellungen der Proxy-Seite
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den Worker-Listener
    pub bind_adresse: String,
    /// Port auf dem sich Worker anmelden
    pub worker_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            worker_port: 9400,
        }
    }
}

/// Einstellungen des Worker-Prozesses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEinstellungen {
    /// Adresse des Proxys ("host:port")
    pub proxy_adresse: String,
    /// Instanz-ID (leer = aus der Prozess-ID abgeleitet)
    pub instanz: Option<String>,
    /// Medien-Adresse die geoeffnete Kanaele veroeffentlichen
    pub medien_adresse: String,
    /// Basis-Port fuer die Medien-Ports der Kanaele
    pub basis_port: u16,
    /// Kapazitaet der Engine (gleichzeitig offene Kanaele)
    pub max_kanaele: u32,
    /// Wartezeit vor einem Wiederverbindungsversuch in Millisekunden
    pub wiederverbindung_ms: u64,
}

impl Default for WorkerEinstellungen {
    fn default() -> Self {
        Self {
            proxy_adresse: "127.0.0.1:9400".into(),
            instanz: None,
            medien_adresse: "127.0.0.1".into(),
            basis_port: 40000,
            max_kanaele: 64,
            wiederverbindung_ms: 2000,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config.normalisieren())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse des Worker-Listeners zurueck
    pub fn worker_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.worker_port)
    }

    /// Gibt die Instanz-ID des Workers zurueck, notfalls aus der Prozess-ID
    pub fn worker_instanz(&self) -> String {
        self.worker
            .instanz
            .clone()
            .unwrap_or_else(|| format!("worker-{}", std::process::id()))
    }

    /// Ersetzt unbrauchbare Logging-Werte durch die Standardwerte
    fn normalisieren(mut self) -> Self {
        if !log_level_gueltig(&self.logging.level) {
            self.logging.level = "info".into();
        }
        if !log_format_gueltig(&self.logging.format) {
            self.logging.format = "text".into();
        }
        self
    }
}
