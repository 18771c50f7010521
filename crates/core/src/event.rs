//! Event-Definitionen des Client-Transports
//!
//! Jede WebSocket-Nachricht ist ein JSON-Umschlag `{"event": ..., "data": ...}`.
//! Die Enums hier bilden die komplette Event-Oberflaeche ab, getrennt nach
//! Richtung. Acks (`config:setApiKey`, `config:testKey`) laufen ueber eine
//! optionale `reqId` die im Antwort-Event (`config:keyResult`) zurueckkommt.

use crate::error::KeyFehlerKategorie;
use crate::types::{Frame, Personality, Snapshot, VoiceMode};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Daten von `engineer:start`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineerStartDaten {
    /// Id einer eingebauten Persoenlichkeit
    pub personality_id: Option<String>,
    /// Alternativ: vollstaendig benutzerdefinierte Persoenlichkeit
    pub custom_personality: Option<Personality>,
    /// Freie Zusatzanweisungen (werden hinter den Stil-Prompt gehaengt)
    pub custom_instructions: Option<String>,
    /// Verbosity-Stufe 1–3
    pub verbosity: Option<u8>,
    pub voice_mode: Option<VoiceMode>,
}

/// Alle Nachrichten die der Client an den Server sendet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "engineer:start")]
    EngineerStart(EngineerStartDaten),

    #[serde(rename = "engineer:stop")]
    EngineerStop,

    #[serde(rename = "engineer:verbosity")]
    EngineerVerbosity { level: u8 },

    /// Base64-kodierter PCM-Chunk (16 kHz, 16 Bit, mono)
    #[serde(rename = "engineer:audio:in")]
    EngineerAudioIn(String),

    /// Ende der Fahrer-Aeusserung (Push-to-Talk losgelassen / Mikro zu)
    #[serde(rename = "engineer:audio:end")]
    EngineerAudioEnd,

    #[serde(rename = "config:setApiKey")]
    ConfigSetApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
        #[serde(rename = "reqId", default, skip_serializing_if = "Option::is_none")]
        req_id: Option<u32>,
    },

    #[serde(rename = "config:testKey")]
    ConfigTestKey {
        #[serde(rename = "reqId", default, skip_serializing_if = "Option::is_none")]
        req_id: Option<u32>,
    },

    #[serde(rename = "config:deleteKey")]
    ConfigDeleteKey,

    #[serde(rename = "config:setEngineerEnabled")]
    ConfigSetEngineerEnabled { enabled: bool },
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Zustand der persistierten Konfiguration (fuer das Dashboard)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStateDaten {
    /// Maskierter Key (z.B. "AIza...k3Pw"), leer wenn kein Key gesetzt
    pub api_key_hint: String,
    pub has_api_key: bool,
    pub engineer_enabled: bool,
    /// Ergebnis des letzten Key-Tests (None = noch nie getestet)
    pub api_key_valid: Option<bool>,
}

/// Alle Nachrichten die der Server an Clients sendet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Gedrosselter Telemetrie-Frame (<= 30 Hz)
    #[serde(rename = "telemetry")]
    Telemetry(Frame),

    /// 1-Hz-Snapshot des Analyzers
    #[serde(rename = "telemetry:snapshot")]
    TelemetrySnapshot(Snapshot),

    /// Base64-kodierter PCM-Chunk vom Modell (24 kHz, 16 Bit, mono)
    #[serde(rename = "engineer:audio:out")]
    EngineerAudioOut(String),

    /// Text vom Ingenieur: Callout-Fallback, Modell-Antwort oder Transkript
    #[serde(rename = "engineer:text")]
    EngineerText {
        text: String,
        #[serde(rename = "type")]
        typ: String,
        timestamp: u64,
    },

    #[serde(rename = "engineer:status")]
    EngineerStatus {
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        personality: Option<String>,
    },

    #[serde(rename = "engineer:error")]
    EngineerError { message: String },

    #[serde(rename = "config:state")]
    ConfigState(ConfigStateDaten),

    /// Ack fuer `config:setApiKey` / `config:testKey`
    #[serde(rename = "config:keyResult")]
    ConfigKeyResult {
        valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<KeyFehlerKategorie>,
        #[serde(rename = "reqId", skip_serializing_if = "Option::is_none")]
        req_id: Option<u32>,
    },
}

impl ServerEvent {
    /// Serialisiert das Event einmalig in den Wire-Umschlag.
    ///
    /// Der Broadcaster verschickt den fertigen String an alle Sockets,
    /// statt pro Empfaenger neu zu serialisieren.
    pub fn als_json(&self) -> String {
        // Alle Varianten bestehen aus serialisierbaren Feldern; ein Fehler
        // hier waere ein Programmierfehler im Enum selbst.
        serde_json::to_string(self).expect("ServerEvent muss serialisierbar sein")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_namen() {
        let json = r#"{"event":"engineer:stop"}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, ClientEvent::EngineerStop));

        let json = r#"{"event":"engineer:verbosity","data":{"level":2}}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, ClientEvent::EngineerVerbosity { level: 2 }));
    }

    #[test]
    fn engineer_start_mit_teilfeldern() {
        let json = r#"{"event":"engineer:start","data":{"personalityId":"professional"}}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        match ev {
            ClientEvent::EngineerStart(daten) => {
                assert_eq!(daten.personality_id.as_deref(), Some("professional"));
                assert!(daten.verbosity.is_none());
                assert!(daten.custom_personality.is_none());
            }
            _ => panic!("falsches Event"),
        }
    }

    #[test]
    fn audio_in_ist_roher_string() {
        let json = r#"{"event":"engineer:audio:in","data":"QUJDRA=="}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        match ev {
            ClientEvent::EngineerAudioIn(chunk) => assert_eq!(chunk, "QUJDRA=="),
            _ => panic!("falsches Event"),
        }
    }

    #[test]
    fn set_api_key_mit_req_id() {
        let json = r#"{"event":"config:setApiKey","data":{"apiKey":"abc","reqId":7}}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        match ev {
            ClientEvent::ConfigSetApiKey { api_key, req_id } => {
                assert_eq!(api_key, "abc");
                assert_eq!(req_id, Some(7));
            }
            _ => panic!("falsches Event"),
        }
    }

    #[test]
    fn server_event_umschlag() {
        let ev = ServerEvent::EngineerError {
            message: "Session beendet".into(),
        };
        let json = ev.als_json();
        assert!(json.contains("\"event\":\"engineer:error\""));
        assert!(json.contains("Session beendet"));
    }

    #[test]
    fn key_result_ohne_fehler_laesst_feld_weg() {
        let ev = ServerEvent::ConfigKeyResult {
            valid: true,
            error: None,
            req_id: Some(3),
        };
        let json = ev.als_json();
        assert!(!json.contains("error"));
        assert!(json.contains("\"reqId\":3"));
    }

    #[test]
    fn config_state_camel_case() {
        let ev = ServerEvent::ConfigState(ConfigStateDaten {
            api_key_hint: "AIza...k3Pw".into(),
            has_api_key: true,
            engineer_enabled: false,
            api_key_valid: None,
        });
        let json = ev.als_json();
        assert!(json.contains("apiKeyHint"));
        assert!(json.contains("engineerEnabled"));
    }
}
