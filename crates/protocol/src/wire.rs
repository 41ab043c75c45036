//! Wire-Format fuer die Proxy/Worker-Steuerverbindungen
//!
//! Frame-basiertes Protokoll: 5-Byte-Kopf + UTF-8-JSON-Rumpf.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+----...----+
//! | 0x33   | Version (u16 BE)| Laenge (u16 BE) | JSON-Rumpf |
//! +--------+--------+--------+--------+--------+----...----+
//! ```
//!
//! Byte 0 ist das Magic-Byte `0x33`, Bytes 1-2 die Protokollversion
//! (derzeit immer 0, reserviert fuer inkompatible Aenderungen), Bytes 3-4
//! die Rumpflaenge. Das 16-Bit-Laengenfeld begrenzt den Rumpf auf 65535
//! Bytes.
//!
//! Der Decoder ist eine explizite 3-Zustands-Maschine: ein falsches
//! Magic-Byte bedeutet Protokoll-Desynchronisation und ist fuer den Stream
//! endgueltig (Zustand `Gestoert`); kaputtes JSON in einem korrekt
//! gerahmten Rumpf wird dagegen nur geloggt und verworfen, damit eine
//! einzelne schlechte Nachricht nicht die Verbindung reisst.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Magic-Byte am Anfang jedes Frames
pub const WIRE_MAGIC: u8 = 0x33;

/// Aktuelle Protokollversion
pub const WIRE_VERSION: u16 = 0;

/// Groesse des Frame-Kopfs in Bytes (Magic + Version + Laenge)
pub const KOPF_LAENGE: usize = 5;

/// Maximale Rumpflaenge (durch das 16-Bit-Laengenfeld vorgegeben)
pub const MAX_RUMPF_LAENGE: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Decoder-Zustand
// ---------------------------------------------------------------------------

/// Zustand des inkrementellen Frame-Decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderZustand {
    /// Wartet auf die 5 Kopf-Bytes
    KopfErwartet,
    /// Kopf gelesen, wartet auf `laenge` Rumpf-Bytes
    RumpfErwartet { laenge: usize },
    /// Magic-Byte war falsch; der Stream ist nicht mehr synchronisierbar
    Gestoert,
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer die Steuerverbindung
///
/// Generisch ueber den Nachrichtentyp der Empfangsrichtung, weil Proxy und
/// Worker unterschiedliche Nachrichten lesen. Implementiert `Decoder` fuer
/// `Empfang` und `Encoder<S>` fuer jeden serialisierbaren Sendetyp, damit
/// eine `Framed`-Instanz beide Richtungen bedient.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use tonmeister_protocol::wire::FrameCodec;
/// use tonmeister_protocol::control::WorkerNachricht;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::<WorkerNachricht>::new());
/// ```
#[derive(Debug)]
pub struct FrameCodec<Empfang> {
    zustand: DecoderZustand,
    _empfang: PhantomData<Empfang>,
}

impl<Empfang> FrameCodec<Empfang> {
    /// Erstellt einen neuen `FrameCodec` im Ausgangszustand
    pub fn new() -> Self {
        Self {
            zustand: DecoderZustand::KopfErwartet,
            _empfang: PhantomData,
        }
    }

    /// Gibt true zurueck wenn der Stream wegen eines Magic-Fehlers
    /// unbrauchbar geworden ist
    pub fn ist_gestoert(&self) -> bool {
        self.zustand == DecoderZustand::Gestoert
    }
}

impl<Empfang> Default for FrameCodec<Empfang> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<Empfang> Decoder for FrameCodec<Empfang>
where
    Empfang: DeserializeOwned,
{
    type Item = Empfang;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.zustand {
                DecoderZustand::Gestoert => {
                    // Nach einem Magic-Fehler wird nichts mehr ausgeliefert
                    src.clear();
                    return Ok(None);
                }

                DecoderZustand::KopfErwartet => {
                    if src.len() < KOPF_LAENGE {
                        src.reserve(KOPF_LAENGE - src.len());
                        return Ok(None);
                    }

                    if src[0] != WIRE_MAGIC {
                        let gefunden = src[0];
                        self.zustand = DecoderZustand::Gestoert;
                        src.clear();
                        tracing::error!(
                            erwartet = WIRE_MAGIC,
                            gefunden,
                            "Falsches Magic-Byte, Stream desynchronisiert"
                        );
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Falsches Magic-Byte: {gefunden:#04x} statt {WIRE_MAGIC:#04x}"),
                        ));
                    }

                    let version = u16::from_be_bytes([src[1], src[2]]);
                    if version != WIRE_VERSION {
                        // Nur das Magic-Byte ist fatal; unbekannte Versionen
                        // werden durchgelassen, solange die Rahmung stimmt
                        tracing::debug!(version, "Unerwartete Protokollversion im Frame-Kopf");
                    }

                    let laenge = u16::from_be_bytes([src[3], src[4]]) as usize;
                    src.advance(KOPF_LAENGE);
                    self.zustand = DecoderZustand::RumpfErwartet { laenge };
                }

                DecoderZustand::RumpfErwartet { laenge } => {
                    if src.len() < laenge {
                        src.reserve(laenge - src.len());
                        return Ok(None);
                    }

                    let rumpf = src.split_to(laenge);
                    self.zustand = DecoderZustand::KopfErwartet;

                    match serde_json::from_slice::<Empfang>(&rumpf) {
                        Ok(nachricht) => return Ok(Some(nachricht)),
                        Err(e) => {
                            // Korrekt gerahmt, aber kaputtes JSON: verwerfen
                            // statt die Verbindung zu reissen
                            tracing::warn!(
                                fehler = %e,
                                rumpf_laenge = laenge,
                                "Unlesbarer Frame-Rumpf verworfen"
                            );
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<Empfang, S> Encoder<S> for FrameCodec<Empfang>
where
    S: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: S, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > MAX_RUMPF_LAENGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    json.len(),
                    MAX_RUMPF_LAENGE
                ),
            ));
        }

        dst.reserve(KOPF_LAENGE + json.len());
        dst.put_u8(WIRE_MAGIC);
        dst.put_u16(WIRE_VERSION);
        dst.put_u16(json.len() as u16);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei falschem Magic-Byte oder ungueltigem JSON
pub async fn frame_lesen<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut kopf = [0u8; KOPF_LAENGE];
    reader.read_exact(&mut kopf).await?;

    if kopf[0] != WIRE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Falsches Magic-Byte: {:#04x}", kopf[0]),
        ));
    }

    let laenge = u16::from_be_bytes([kopf[3], kopf[4]]) as usize;
    let mut rumpf = vec![0u8; laenge];
    reader.read_exact(&mut rumpf).await?;

    serde_json::from_slice(&rumpf).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
        )
    })
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
///
/// # Fehler
/// - `InvalidData` wenn die Nachricht nicht serialisierbar oder zu gross ist
/// - IO-Fehler beim Schreiben
pub async fn frame_schreiben<W, T>(writer: &mut W, nachricht: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(nachricht).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {}", e),
        )
    })?;

    if json.len() > MAX_RUMPF_LAENGE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                json.len(),
                MAX_RUMPF_LAENGE
            ),
        ));
    }

    let mut kopf = [0u8; KOPF_LAENGE];
    kopf[0] = WIRE_MAGIC;
    kopf[1..3].copy_from_slice(&WIRE_VERSION.to_be_bytes());
    kopf[3..5].copy_from_slice(&(json.len() as u16).to_be_bytes());

    writer.write_all(&kopf).await?;
    writer.write_all(&json).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
