//! Bruecken-Buchfuehrung – Merkt sich Hilfskanal-Paare zwischen Knoten
//!
//! Eine Bruecke verbindet zwei Kanaele auf verschiedenen Workern ueber
//! zwei Hilfskanaele, die ihre Medien kreuzweise zueinander schicken.
//! Dieses Modul fuehrt nur Buch; Auf- und Abbau der Bruecken laufen ueber
//! die Kanal-Tabelle.
//!
//! Der Schluessel ist das ungeordnete Paar der beiden Original-Kanaele:
//! es ist egal, von welcher Seite aus gemischt oder aufgeloest wird.
//! Mischt ein Kanal mit mehreren Gegenstellen, existiert pro Paar eine
//! eigene Bruecke.

use dashmap::DashMap;
use tonmeister_core::types::KanalId;

// ---------------------------------------------------------------------------
// Bruecke
// ---------------------------------------------------------------------------

/// Eine aufgebaute Knoten-zu-Knoten-Bruecke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bruecke {
    /// Erster Original-Kanal
    pub a: KanalId,
    /// Zweiter Original-Kanal
    pub b: KanalId,
    /// Hilfskanal neben `a`
    pub hilfs_a: KanalId,
    /// Hilfskanal neben `b`
    pub hilfs_b: KanalId,
}

impl Bruecke {
    /// Alle vier beteiligten Kanaele, Originale zuerst
    pub fn beteiligte(&self) -> [KanalId; 4] {
        [self.a, self.hilfs_a, self.b, self.hilfs_b]
    }

    /// Beide Hilfskanaele
    pub fn hilfskanaele(&self) -> [KanalId; 2] {
        [self.hilfs_a, self.hilfs_b]
    }
}

/// Ungeordnetes Kanal-Paar als Bruecken-Schluessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BrueckenPaar(KanalId, KanalId);

impl BrueckenPaar {
    fn neu(a: KanalId, b: KanalId) -> Self {
        if a.inner() <= b.inner() {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

// ---------------------------------------------------------------------------
// BrueckenKoordinator
// ---------------------------------------------------------------------------

/// Buchfuehrung aller aktiven Bruecken
#[derive(Default)]
pub struct BrueckenKoordinator {
    bruecken: DashMap<BrueckenPaar, Bruecke>,
}

impl BrueckenKoordinator {
    /// Erstellt eine leere Buchfuehrung
    pub fn neu() -> Self {
        Self::default()
    }

    /// Traegt eine aufgebaute Bruecke ein
    ///
    /// Eine bereits bestehende Bruecke desselben Paares wird ersetzt und
    /// zurueckgegeben, damit der Aufrufer ihre Hilfskanaele abbauen kann.
    pub fn eintragen(&self, bruecke: Bruecke) -> Option<Bruecke> {
        let paar = BrueckenPaar::neu(bruecke.a, bruecke.b);
        self.bruecken.insert(paar, bruecke)
    }

    /// Sucht die Bruecke eines Paares ohne sie zu entfernen
    pub fn bestehende(&self, a: KanalId, b: KanalId) -> Option<Bruecke> {
        self.bruecken.get(&BrueckenPaar::neu(a, b)).map(|b| *b)
    }

    /// Entnimmt alle Bruecken an denen der Kanal als Original beteiligt ist
    ///
    /// Die Eintraege sind danach weg; der Aufrufer ist fuer den Abbau der
    /// Hilfskanaele verantwortlich.
    pub fn entnehmen_fuer(&self, id: KanalId) -> Vec<Bruecke> {
        let paare: Vec<BrueckenPaar> = self
            .bruecken
            .iter()
            .filter(|eintrag| eintrag.a == id || eintrag.b == id)
            .map(|eintrag| *eintrag.key())
            .collect();

        paare
            .into_iter()
            .filter_map(|paar| self.bruecken.remove(&paar).map(|(_, b)| b))
            .collect()
    }

    /// Anzahl der aktiven Bruecken
    pub fn anzahl(&self) -> usize {
        self.bruecken.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
