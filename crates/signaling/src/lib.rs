//! pitwall-signaling – WebSocket-Client-Transport
//!
//! Dieser Crate verbindet das Browser-Dashboard mit der Pipeline. Jede
//! Nachricht ist ein JSON-Umschlag `{"event": ..., "data": ...}`.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket Listener (SignalingServer, axum)
//!     |
//!     v
//! ClientConnection (pro Socket ein Lese- und ein Schreib-Task)
//!     |
//!     +-- engineer:*  -> VoiceOrchestrator
//!     +-- config:*    -> KonfigStore + Key-Validierung
//!     |
//! EventBroadcaster (Telemetrie/Snapshots an alle,
//!                   Session-Audio/-Text nur an den Besitzer)
//! ```

pub mod broadcast;
pub mod connection;
pub mod server;

pub use broadcast::EventBroadcaster;
pub use connection::SignalingState;
pub use server::SignalingServer;
