//! pitwall-engineer – Der virtuelle Renningenieur
//!
//! Drei Teile: das deterministische Callout-Regelwerk (`rules`), die
//! Persoenlichkeiten samt System-Anweisung (`personality`) und der
//! Orchestrator der genau eine Sprachmodell-Session besitzt und Callouts,
//! Kontext und bidirektionales Audio multiplext (`orchestrator`). Die
//! Gemini-Live-Anbindung steckt hinter dem `ModellVerbindung`-Trait in
//! `gemini`.

pub mod gemini;
pub mod orchestrator;
pub mod personality;
pub mod rules;

pub use gemini::GeminiLiveVerbindung;
pub use orchestrator::{Ausgang, AusgangsZiel, ModellVerbindung, VoiceOrchestrator};
pub use personality::{eingebaute_persoenlichkeiten, system_anweisung};
pub use rules::CalloutEngine;
