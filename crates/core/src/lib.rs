//! pitwall-core – Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Pitwall-Crates gemeinsam genutzt werden: die Datentypen der
//! Telemetrie-Pipeline (`Frame`, `Snapshot`, `Callout`), die
//! Session-Konfiguration des Renningenieurs und die Event-Definitionen
//! des Client-Transports.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{KeyFehlerKategorie, PitwallError, Result};
pub use types::{
    Callout, CalloutTyp, ClientId, Frame, FrameFlags, FuelUsage, PaceTrend, Personality,
    Prioritaet, SessionConfig, Snapshot, TyreTrend, VoiceMode,
};
