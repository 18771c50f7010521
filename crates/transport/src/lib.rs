//! pitwall-transport – UDP-Seite der Telemetrie-Pipeline
//!
//! Zwei Stufen: der `TelemetrieEmpfaenger` entdeckt die Konsole per
//! Broadcast-Heartbeat und liefert dekodierte Frames in einen Kanal;
//! der `FrameVerteiler` faechert jeden Frame an Analyzer und Logger auf
//! und drosselt den Client-Broadcast auf die Ziel-Frequenz.

pub mod discovery;
pub mod fanout;

pub use discovery::{DiscoveryConfig, TelemetrieEmpfaenger};
pub use fanout::{BroadcastDrossel, FrameVerteiler, BROADCAST_HZ};
