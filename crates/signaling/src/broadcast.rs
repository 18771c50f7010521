//! Event-Broadcaster – Sendet Server-Events an verbundene Clients
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen
//! Sockets. Events werden genau einmal serialisiert und dann als fertiger
//! Text an die Queues verteilt.
//!
//! ## Selektives Senden
//! - An alle Clients: `an_alle_senden` (Telemetrie, Snapshots, config:state)
//! - An einen Client: `an_client_senden` (Session-Audio, Session-Text, Acks)

use dashmap::DashMap;
use pitwall_core::event::ServerEvent;
use pitwall_core::ClientId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Groesse der Send-Queue pro Client.
///
/// Muss den 30-Hz-Telemetrie-Strom plus Modell-Audio-Schuebe abfedern;
/// ein Client der nicht abnimmt verliert Nachrichten (try_send).
const SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
struct ClientSender {
    client_id: ClientId,
    tx: mpsc::Sender<String>,
}

impl ClientSender {
    /// Reiht eine fertig serialisierte Nachricht nicht-blockierend ein.
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    fn senden(&self, nachricht: String) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(client = %self.client_id, "Send-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(client = %self.client_id, "Send-Queue geschlossen");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle verbundenen Clients.
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ClientId, ClientSender>,
    naechste_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                naechste_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registriert einen neuen Client und gibt Id + Empfangs-Queue zurueck.
    ///
    /// Der Schreib-Task der Verbindung liest aus der Queue und schiebt
    /// die Nachrichten auf den Socket.
    pub fn client_registrieren(&self) -> (ClientId, mpsc::Receiver<String>) {
        let client_id = ClientId(self.inner.naechste_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.inner
            .clients
            .insert(client_id, ClientSender { client_id, tx });
        tracing::debug!(client = %client_id, "Client im Broadcaster registriert");
        (client_id, rx)
    }

    /// Entfernt einen Client
    pub fn client_entfernen(&self, client_id: ClientId) {
        self.inner.clients.remove(&client_id);
        tracing::debug!(client = %client_id, "Client aus Broadcaster entfernt");
    }

    /// Sendet ein Event an alle Clients; gibt die Anzahl der
    /// erfolgreichen Einreihungen zurueck.
    pub fn an_alle_senden(&self, event: &ServerEvent) -> usize {
        let nachricht = event.als_json();
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|eintrag| {
            if eintrag.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Sendet ein Event an einen einzelnen Client
    pub fn an_client_senden(&self, client_id: ClientId, event: &ServerEvent) -> bool {
        match self.inner.clients.get(&client_id) {
            Some(sender) => sender.senden(event.als_json()),
            None => {
                tracing::debug!(client = %client_id, "Senden an unbekannten Client");
                false
            }
        }
    }

    /// Anzahl der registrierten Clients
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, client_id: ClientId) -> bool {
        self.inner.clients.contains_key(&client_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
