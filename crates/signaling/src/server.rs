//! WebSocket-Listener – Bindet den Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` haengt einen einzelnen `/ws`-Upgrade-Endpunkt
//! hinter axum und startet fuer jede Verbindung `socket_betreuen`.
//! Daneben laeuft die Ausgangs-Pumpe die gerouteten Orchestrator-Events
//! in den Broadcaster schiebt.

use crate::broadcast::EventBroadcaster;
use crate::connection::{socket_betreuen, SignalingState};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use pitwall_core::{PitwallError, Result};
use pitwall_engineer::orchestrator::{Ausgang, AusgangsZiel};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    listener: tokio::net::TcpListener,
}

impl SignalingServer {
    /// Bindet den Listener.
    ///
    /// Ein Bind-Fehler ist fatal (ohne Fan-out-Port kein Dashboard) und
    /// gehoert deshalb in die Startsequenz, nicht in den laufenden Task.
    pub async fn binden(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| PitwallError::Bind {
                adresse: bind_addr.to_string(),
                quelle: e,
            })?;
        tracing::info!(addr = %bind_addr, "WebSocket-Listener gebunden");
        Ok(Self { state, listener })
    }

    /// Lokale Adresse des gebundenen Listeners
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis zum Shutdown-Signal
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(Arc::clone(&self.state));

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                // Warten bis das Shutdown-Signal auf true wechselt
                while shutdown_rx.changed().await.is_ok() {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| PitwallError::Netzwerk(format!("Listener beendet: {e}")))?;

        tracing::info!("WebSocket-Listener beendet");
        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| socket_betreuen(socket, state))
}

/// Pumpt geroutete Orchestrator-Events in den Broadcaster.
///
/// Laeuft bis der Ausgangs-Kanal schliesst (Orchestrator weg).
pub async fn ausgang_pumpe(mut ausgang_rx: mpsc::Receiver<Ausgang>, broadcaster: EventBroadcaster) {
    while let Some(ausgang) = ausgang_rx.recv().await {
        match ausgang.ziel {
            AusgangsZiel::Alle => {
                broadcaster.an_alle_senden(&ausgang.event);
            }
            AusgangsZiel::Client(client_id) => {
                broadcaster.an_client_senden(client_id, &ausgang.event);
            }
        }
    }
    tracing::debug!("Ausgangs-Pumpe beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
