//! Client-Connection – Verwaltet einen einzelnen WebSocket
//!
//! Jeder Socket bekommt einen Lese- und einen Schreib-Task. Der
//! Schreib-Task leert die Send-Queue des Broadcasters; der Lese-Task
//! parst den Event-Umschlag und verteilt auf Orchestrator und
//! Konfigurations-Store. Beim Trennen raeumt die Verbindung ihre
//! Registrierung und eine eventuell besessene Voice-Session ab.

use crate::broadcast::EventBroadcaster;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pitwall_config::{api_key_pruefen, KonfigStore};
use pitwall_core::event::{ClientEvent, ConfigStateDaten, ServerEvent};
use pitwall_core::{ClientId, KeyFehlerKategorie};
use pitwall_engineer::{CalloutEngine, VoiceOrchestrator};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// SignalingState
// ---------------------------------------------------------------------------

/// Geteilter Zustand aller Verbindungen
pub struct SignalingState {
    pub broadcaster: EventBroadcaster,
    pub orchestrator: VoiceOrchestrator,
    pub konfig: Arc<KonfigStore>,
    /// Verbosity-Gate des Regelwerks (Scheduler-Task wertet aus,
    /// `engineer:verbosity` stellt um)
    pub engine: Arc<Mutex<CalloutEngine>>,
}

impl SignalingState {
    /// Baut das `config:state`-Event aus dem aktuellen Store-Zustand
    pub fn config_state_event(&self) -> ServerEvent {
        ServerEvent::ConfigState(ConfigStateDaten {
            api_key_hint: self.konfig.api_key_hint(),
            has_api_key: self.konfig.api_key().is_some(),
            engineer_enabled: self.konfig.engineer_enabled(),
            api_key_valid: self.konfig.api_key_valid(),
        })
    }
}

// ---------------------------------------------------------------------------
// Socket-Lebenszyklus
// ---------------------------------------------------------------------------

/// Betreut einen WebSocket von Connect bis Disconnect
pub async fn socket_betreuen(socket: WebSocket, state: Arc<SignalingState>) {
    let (client_id, send_rx) = state.broadcaster.client_registrieren();
    tracing::info!(client = %client_id, "Client verbunden");

    let (schreiber, leser) = socket.split();
    let schreib_task = tokio::spawn(schreib_schleife(schreiber, send_rx));

    // Begruessung: aktueller Konfigurations- und Session-Zustand
    state
        .broadcaster
        .an_client_senden(client_id, &state.config_state_event());
    let verbunden = state.orchestrator.besitzer().await.is_some();
    state.broadcaster.an_client_senden(
        client_id,
        &ServerEvent::EngineerStatus {
            connected: verbunden,
            personality: None,
        },
    );

    lese_schleife(leser, client_id, &state).await;

    // Disconnect: Registrierung und ggf. besessene Session abraeumen
    state.broadcaster.client_entfernen(client_id);
    state.orchestrator.client_getrennt(client_id).await;
    schreib_task.abort();
    tracing::info!(client = %client_id, "Client getrennt");
}

/// Leert die Send-Queue auf den Socket
async fn schreib_schleife(
    mut schreiber: SplitSink<WebSocket, Message>,
    mut send_rx: tokio::sync::mpsc::Receiver<String>,
) {
    while let Some(nachricht) = send_rx.recv().await {
        if schreiber.send(Message::Text(nachricht.into())).await.is_err() {
            break;
        }
    }
}

/// Liest Nachrichten bis zum Verbindungsende
async fn lese_schleife(
    mut leser: SplitStream<WebSocket>,
    client_id: ClientId,
    state: &Arc<SignalingState>,
) {
    while let Some(nachricht) = leser.next().await {
        match nachricht {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(ereignis) => ereignis_verarbeiten(state, client_id, ereignis).await,
                Err(e) => {
                    tracing::debug!(client = %client_id, fehler = %e, "Ungueltiger Event-Umschlag");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(client = %client_id, fehler = %e, "Socket-Fehler");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event-Dispatch
// ---------------------------------------------------------------------------

/// Verarbeitet ein Client-Event
pub async fn ereignis_verarbeiten(
    state: &Arc<SignalingState>,
    client_id: ClientId,
    ereignis: ClientEvent,
) {
    match ereignis {
        // --- Ingenieur-Lebenszyklus ---
        ClientEvent::EngineerStart(daten) => {
            if !state.konfig.engineer_enabled() {
                state.broadcaster.an_client_senden(
                    client_id,
                    &ServerEvent::EngineerError {
                        message: "Der Renningenieur ist deaktiviert".into(),
                    },
                );
                return;
            }
            if let Some(verbosity) = daten.verbosity {
                state.engine.lock().verbosity_setzen(verbosity);
            }
            let api_key = state.konfig.api_key();
            state
                .orchestrator
                .starten(client_id, daten, api_key.as_deref())
                .await;
        }

        ClientEvent::EngineerStop => {
            state.orchestrator.stoppen(client_id).await;
        }

        ClientEvent::EngineerVerbosity { level } => {
            state.engine.lock().verbosity_setzen(level);
            state.orchestrator.verbosity_setzen(level).await;
            tracing::debug!(client = %client_id, level, "Verbosity umgestellt");
        }

        // --- Fahrer-Audio ---
        ClientEvent::EngineerAudioIn(chunk) => {
            state.orchestrator.fahrer_audio(client_id, &chunk).await;
        }

        ClientEvent::EngineerAudioEnd => {
            state.orchestrator.fahrer_audio_ende(client_id).await;
        }

        // --- Konfiguration ---
        ClientEvent::ConfigSetApiKey { api_key, req_id } => {
            let pruefung = api_key_pruefen(&api_key).await;
            let (valid, fehler) = match pruefung {
                Ok(()) => match state.konfig.api_key_setzen(api_key) {
                    Ok(()) => (true, None),
                    Err(e) => {
                        tracing::error!(fehler = %e, "API-Key nicht persistierbar");
                        (false, Some(KeyFehlerKategorie::Unknown))
                    }
                },
                Err(kategorie) => (false, Some(kategorie)),
            };
            state.konfig.api_key_valid_setzen(Some(valid));
            state.broadcaster.an_client_senden(
                client_id,
                &ServerEvent::ConfigKeyResult {
                    valid,
                    error: fehler,
                    req_id,
                },
            );
            state
                .broadcaster
                .an_alle_senden(&state.config_state_event());
        }

        ClientEvent::ConfigTestKey { req_id } => {
            let ergebnis = match state.konfig.api_key() {
                Some(key) => api_key_pruefen(&key).await,
                None => Err(KeyFehlerKategorie::Empty),
            };
            let (valid, fehler) = match ergebnis {
                Ok(()) => (true, None),
                Err(kategorie) => (false, Some(kategorie)),
            };
            state.konfig.api_key_valid_setzen(Some(valid));
            state.broadcaster.an_client_senden(
                client_id,
                &ServerEvent::ConfigKeyResult {
                    valid,
                    error: fehler,
                    req_id,
                },
            );
            state
                .broadcaster
                .an_alle_senden(&state.config_state_event());
        }

        ClientEvent::ConfigDeleteKey => {
            if let Err(e) = state.konfig.api_key_loeschen() {
                tracing::error!(fehler = %e, "API-Key nicht loeschbar");
            }
            state
                .broadcaster
                .an_alle_senden(&state.config_state_event());
        }

        ClientEvent::ConfigSetEngineerEnabled { enabled } => {
            if let Err(e) = state.konfig.engineer_enabled_setzen(enabled) {
                tracing::error!(fehler = %e, "Ingenieur-Schalter nicht persistierbar");
            }
            if !enabled {
                // Abschalten beendet eine laufende Session
                if let Some(besitzer) = state.orchestrator.besitzer().await {
                    state.orchestrator.stoppen(besitzer).await;
                }
            }
            state
                .broadcaster
                .an_alle_senden(&state.config_state_event());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pitwall_core::event::EngineerStartDaten;
    use pitwall_core::Result;
    use pitwall_engineer::orchestrator::{
        Ausgang, ModellEreignis, ModellSitzung, ModellVerbindung,
    };
    use tokio::sync::mpsc;

    struct StummeSitzung;

    #[async_trait]
    impl ModellSitzung for StummeSitzung {
        async fn text_senden(&mut self, _text: &str, _turn: bool) -> Result<()> {
            Ok(())
        }
        async fn audio_senden(&mut self, _chunk: &str) -> Result<()> {
            Ok(())
        }
        async fn audio_ende(&mut self) -> Result<()> {
            Ok(())
        }
        async fn schliessen(&mut self) {}
    }

    /// Haelt die Ereignis-Sender am Leben damit der Lesertask der
    /// Session nicht sofort ein Stream-Ende sieht
    #[derive(Default)]
    struct StummeVerbindung {
        haltungen: Mutex<Vec<mpsc::Sender<ModellEreignis>>>,
    }

    #[async_trait]
    impl ModellVerbindung for StummeVerbindung {
        async fn oeffnen(
            &self,
            _api_key: &str,
            _stimme: &str,
            _anweisung: &str,
        ) -> Result<(Box<dyn ModellSitzung>, mpsc::Receiver<ModellEreignis>)> {
            let (tx, rx) = mpsc::channel(4);
            self.haltungen.lock().push(tx);
            Ok((Box::new(StummeSitzung), rx))
        }
    }

    fn aufbau() -> (Arc<SignalingState>, mpsc::Receiver<Ausgang>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let konfig = Arc::new(KonfigStore::laden_mit_identitaet(
            dir.path().join("config.json"),
            "test|host|/tmp|linux",
        ));
        let (ausgang_tx, ausgang_rx) = mpsc::channel(64);
        let state = Arc::new(SignalingState {
            broadcaster: EventBroadcaster::neu(),
            orchestrator: VoiceOrchestrator::neu(
                Arc::new(StummeVerbindung::default()),
                ausgang_tx,
            ),
            konfig,
            engine: Arc::new(Mutex::new(CalloutEngine::neu(2))),
        });
        (state, ausgang_rx, dir)
    }

    #[tokio::test]
    async fn verbosity_event_stellt_engine_um() {
        let (state, _ausgang, _dir) = aufbau();
        let (client, _rx) = state.broadcaster.client_registrieren();

        ereignis_verarbeiten(&state, client, ClientEvent::EngineerVerbosity { level: 3 }).await;
        assert_eq!(state.engine.lock().verbosity(), 3);

        // Ausser Bereich wird begrenzt
        ereignis_verarbeiten(&state, client, ClientEvent::EngineerVerbosity { level: 9 }).await;
        assert_eq!(state.engine.lock().verbosity(), 3);
    }

    #[tokio::test]
    async fn start_mit_deaktiviertem_ingenieur_liefert_fehler() {
        let (state, _ausgang, _dir) = aufbau();
        let (client, mut rx) = state.broadcaster.client_registrieren();

        ereignis_verarbeiten(
            &state,
            client,
            ClientEvent::EngineerStart(EngineerStartDaten::default()),
        )
        .await;

        let nachricht = rx.try_recv().expect("Fehler-Event muss ankommen");
        assert!(nachricht.contains("engineer:error"));
        assert!(!state.orchestrator.ist_aktiv().await);
    }

    #[tokio::test]
    async fn start_mit_aktiviertem_ingenieur_oeffnet_session() {
        let (state, _ausgang, _dir) = aufbau();
        state.konfig.engineer_enabled_setzen(true).unwrap();
        state.konfig.api_key_setzen("test-key".into()).unwrap();
        let (client, _rx) = state.broadcaster.client_registrieren();

        ereignis_verarbeiten(
            &state,
            client,
            ClientEvent::EngineerStart(EngineerStartDaten::default()),
        )
        .await;

        assert!(state.orchestrator.ist_aktiv().await);
        assert_eq!(state.orchestrator.besitzer().await, Some(client));
    }

    #[tokio::test]
    async fn delete_key_broadcastet_config_state() {
        let (state, _ausgang, _dir) = aufbau();
        state.konfig.api_key_setzen("test-key".into()).unwrap();
        let (client, mut rx) = state.broadcaster.client_registrieren();

        ereignis_verarbeiten(&state, client, ClientEvent::ConfigDeleteKey).await;

        assert!(state.konfig.api_key().is_none());
        let nachricht = rx.try_recv().expect("config:state muss ankommen");
        assert!(nachricht.contains("config:state"));
        assert!(nachricht.contains("\"hasApiKey\":false"));
    }

    #[tokio::test]
    async fn engineer_abschalten_beendet_die_session() {
        let (state, _ausgang, _dir) = aufbau();
        state.konfig.engineer_enabled_setzen(true).unwrap();
        state.konfig.api_key_setzen("test-key".into()).unwrap();
        let (client, _rx) = state.broadcaster.client_registrieren();

        ereignis_verarbeiten(
            &state,
            client,
            ClientEvent::EngineerStart(EngineerStartDaten::default()),
        )
        .await;
        assert!(state.orchestrator.ist_aktiv().await);

        ereignis_verarbeiten(
            &state,
            client,
            ClientEvent::ConfigSetEngineerEnabled { enabled: false },
        )
        .await;
        assert!(!state.orchestrator.ist_aktiv().await);
        assert!(!state.konfig.engineer_enabled());
    }

    #[tokio::test]
    async fn config_state_event_spiegelt_den_store() {
        let (state, _ausgang, _dir) = aufbau();
        state.konfig.api_key_setzen("AIzaSyLangerTestKey99k3Pw".into()).unwrap();
        state.konfig.api_key_valid_setzen(Some(true));

        let event = state.config_state_event();
        let json = event.als_json();
        assert!(json.contains("\"hasApiKey\":true"));
        assert!(json.contains("AIza...k3Pw"));
        assert!(json.contains("\"apiKeyValid\":true"));
    }
}
