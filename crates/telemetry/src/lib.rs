//! pitwall-telemetry – Abgeleiteter Zustand aus dem Frame-Strom
//!
//! Der `Analyzer` konsumiert jeden Frame (~60 Hz), erkennt Session-Grenzen
//! und Rundenwechsel und exportiert auf Anfrage einen konsistenten
//! `Snapshot`. Der `SessionLogger` schreibt On-Track-Phasen als
//! NDJSON-Dateien mit Metadaten-Sidecar.

pub mod analyzer;
pub mod fuel;
pub mod logger;
pub mod tyres;

pub use analyzer::Analyzer;
pub use fuel::KraftstoffModell;
pub use logger::SessionLogger;
pub use tyres::ReifenVerlauf;
