//! Fehlertypen fuer Pitwall
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Pro-Frame-Fehler (zu kurzes Datagramm, falsche Magic) werden NICHT
//! hierueber propagiert – sie sind Best-Effort und werden an der Quelle
//! verworfen und gezaehlt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globaler Result-Alias fuer Pitwall
pub type Result<T> = std::result::Result<T, PitwallError>;

/// Kategorie eines fehlgeschlagenen API-Key-Tests
///
/// Wird dem Client im Ack von `config:setApiKey` / `config:testKey`
/// mitgeteilt, damit das Dashboard eine verstaendliche Meldung zeigen kann.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyFehlerKategorie {
    /// Kein Key gesetzt
    Empty,
    /// Provider lehnt den Key ab
    Invalid,
    /// Key gueltig, aber ohne Berechtigung fuer das Sprachmodell
    PermissionDenied,
    /// Kontingent erschoepft
    Quota,
    /// Provider nicht erreichbar
    Network,
    Unknown,
}

impl std::fmt::Display for KeyFehlerKategorie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Invalid => "invalid",
            Self::PermissionDenied => "permission-denied",
            Self::Quota => "quota",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Alle moeglichen Fehler im Pitwall-System
#[derive(Debug, Error)]
pub enum PitwallError {
    // --- Netzwerk ---
    #[error("Netzwerkfehler: {0}")]
    Netzwerk(String),

    #[error("Socket-Bind fehlgeschlagen auf {adresse}: {quelle}")]
    Bind {
        adresse: String,
        #[source]
        quelle: std::io::Error,
    },

    // --- Protokoll ---
    #[error("Ungueltiger Frame: {0}")]
    UngueltigerFrame(String),

    // --- Sprachmodell ---
    #[error("Modell-Session-Fehler: {0}")]
    ModellSitzung(String),

    #[error("Keine aktive Ingenieur-Session")]
    KeineSitzung,

    // --- Konfiguration & Keystore ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Keystore-Fehler: {0}")]
    Keystore(String),

    #[error("API-Key ungueltig: {0}")]
    SchluesselValidierung(KeyFehlerKategorie),

    // --- Kanaele & Lebenszyklus ---
    #[error("Kanal geschlossen: {0}")]
    KanalGeschlossen(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl PitwallError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler transient ist und die Pipeline
    /// weiterlaufen darf (Log + weitermachen statt Abbruch)
    pub fn ist_transient(&self) -> bool {
        matches!(self, Self::Netzwerk(_) | Self::UngueltigerFrame(_))
    }
}
