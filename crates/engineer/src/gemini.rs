//! Gemini-Live-Anbindung
//!
//! Produktions-Implementierung von `ModellVerbindung` ueber die
//! BidiGenerateContent-WebSocket-API. Der Handshake sendet das Setup
//! (Modell, Stimme, System-Anweisung) und wartet auf `setupComplete`;
//! danach liest ein Task den Socket und uebersetzt Server-Nachrichten in
//! `ModellEreignis`-Werte.
//!
//! Modell-Audio laeuft durch einen begrenzten Drop-Oldest-Puffer: wenn
//! der Konsument haengt, verfallen die aeltesten Chunks, die juengste
//! Aeusserung bleibt erhalten.

use crate::orchestrator::{ModellEreignis, ModellSitzung, ModellVerbindung, MODELL_EREIGNIS_PUFFER};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pitwall_core::{PitwallError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// WebSocket-Endpunkt der Live-API
const LIVE_ENDPUNKT: &str = "wss://generativelanguage.googleapis.com/ws/\
                             google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Standard-Modell fuer Live-Audio-Sessions
const STANDARD_MODELL: &str = "models/gemini-2.0-flash-live-001";

/// Zeitlimit fuer den Setup-Handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// ---------------------------------------------------------------------------
// EreignisPuffer – begrenzt, drop-oldest
// ---------------------------------------------------------------------------

/// Begrenzte Warteschlange zwischen Socket-Leser und Konsument.
///
/// Bei Ueberlauf verfaellt das aelteste Element. Terminale Ereignisse
/// (Geschlossen, Fehler) werden nie verworfen.
struct EreignisPuffer {
    queue: Mutex<VecDeque<ModellEreignis>>,
    bereit: Notify,
    kapazitaet: usize,
    verworfen: AtomicU64,
}

impl EreignisPuffer {
    fn neu(kapazitaet: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(kapazitaet)),
            bereit: Notify::new(),
            kapazitaet,
            verworfen: AtomicU64::new(0),
        }
    }

    fn einreihen(&self, ereignis: ModellEreignis) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.kapazitaet {
                // Drop-oldest: juengste Aeusserung hat Vorrang
                let platz = queue
                    .iter()
                    .position(|e| !matches!(e, ModellEreignis::Geschlossen { .. } | ModellEreignis::Fehler(_)));
                match platz {
                    Some(index) => {
                        queue.remove(index);
                        self.verworfen.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        // Nur terminale Ereignisse im Puffer: nichts verwerfen
                    }
                }
            }
            queue.push_back(ereignis);
        }
        self.bereit.notify_one();
    }

    async fn entnehmen(&self) -> ModellEreignis {
        loop {
            if let Some(ereignis) = self.queue.lock().pop_front() {
                return ereignis;
            }
            self.bereit.notified().await;
        }
    }

    fn verworfene(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Nachrichten-Aufbau und -Parsing
// ---------------------------------------------------------------------------

/// Baut die Setup-Nachricht des Handshakes
fn setup_nachricht(modell: &str, stimme: &str, anweisung: &str) -> serde_json::Value {
    serde_json::json!({
        "setup": {
            "model": modell,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": stimme }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": anweisung }]
            },
            "outputAudioTranscription": {}
        }
    })
}

/// Uebersetzt eine Server-Nachricht in null oder mehr Ereignisse
fn server_nachricht_parsen(nachricht: &serde_json::Value) -> Vec<ModellEreignis> {
    let mut ereignisse = Vec::new();

    let Some(inhalt) = nachricht.get("serverContent") else {
        return ereignisse;
    };

    if let Some(text) = inhalt
        .pointer("/outputTranscription/text")
        .and_then(serde_json::Value::as_str)
    {
        if !text.is_empty() {
            ereignisse.push(ModellEreignis::Text {
                inhalt: text.to_string(),
                transkript: true,
            });
        }
    }

    if let Some(teile) = inhalt
        .pointer("/modelTurn/parts")
        .and_then(serde_json::Value::as_array)
    {
        for teil in teile {
            if let Some(daten) = teil
                .pointer("/inlineData/data")
                .and_then(serde_json::Value::as_str)
            {
                ereignisse.push(ModellEreignis::Audio(daten.to_string()));
            }
            if let Some(text) = teil.get("text").and_then(serde_json::Value::as_str) {
                if !text.is_empty() {
                    ereignisse.push(ModellEreignis::Text {
                        inhalt: text.to_string(),
                        transkript: false,
                    });
                }
            }
        }
    }

    ereignisse
}

// ---------------------------------------------------------------------------
// GeminiSitzung
// ---------------------------------------------------------------------------

struct GeminiSitzung {
    sink: WsSink,
}

impl GeminiSitzung {
    async fn json_senden(&mut self, nachricht: serde_json::Value) -> Result<()> {
        self.sink
            .send(Message::text(nachricht.to_string()))
            .await
            .map_err(|e| PitwallError::ModellSitzung(format!("Senden fehlgeschlagen: {e}")))
    }
}

#[async_trait]
impl ModellSitzung for GeminiSitzung {
    async fn text_senden(&mut self, text: &str, turn_abschliessen: bool) -> Result<()> {
        self.json_senden(serde_json::json!({
            "clientContent": {
                "turns": [{
                    "role": "user",
                    "parts": [{ "text": text }]
                }],
                "turnComplete": turn_abschliessen
            }
        }))
        .await
    }

    async fn audio_senden(&mut self, base64_pcm: &str) -> Result<()> {
        self.json_senden(serde_json::json!({
            "realtimeInput": {
                "audio": {
                    "data": base64_pcm,
                    "mimeType": "audio/pcm;rate=16000"
                }
            }
        }))
        .await
    }

    async fn audio_ende(&mut self) -> Result<()> {
        self.json_senden(serde_json::json!({
            "realtimeInput": { "audioStreamEnd": true }
        }))
        .await
    }

    async fn schliessen(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(fehler = %e, "WebSocket-Close fehlgeschlagen");
        }
    }
}

// ---------------------------------------------------------------------------
// GeminiLiveVerbindung
// ---------------------------------------------------------------------------

/// Stellt Live-Sessions zur Gemini-API her
pub struct GeminiLiveVerbindung {
    modell: String,
}

impl GeminiLiveVerbindung {
    pub fn neu() -> Self {
        Self {
            modell: STANDARD_MODELL.to_string(),
        }
    }

    pub fn mit_modell(modell: impl Into<String>) -> Self {
        Self {
            modell: modell.into(),
        }
    }
}

impl Default for GeminiLiveVerbindung {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl ModellVerbindung for GeminiLiveVerbindung {
    async fn oeffnen(
        &self,
        api_key: &str,
        stimme: &str,
        anweisung: &str,
    ) -> Result<(Box<dyn ModellSitzung>, mpsc::Receiver<ModellEreignis>)> {
        let url = format!("{LIVE_ENDPUNKT}?key={api_key}");
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| PitwallError::ModellSitzung(format!("Verbindungsaufbau: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        // Setup senden und auf setupComplete warten
        let setup = setup_nachricht(&self.modell, stimme, anweisung);
        sink.send(Message::text(setup.to_string()))
            .await
            .map_err(|e| PitwallError::ModellSitzung(format!("Setup-Senden: {e}")))?;

        let antwort = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next())
            .await
            .map_err(|_| PitwallError::ModellSitzung("Setup-Timeout".into()))?
            .ok_or_else(|| PitwallError::ModellSitzung("Verbindung beim Setup getrennt".into()))?
            .map_err(|e| PitwallError::ModellSitzung(format!("Setup-Empfang: {e}")))?;

        let antwort_json: serde_json::Value = match &antwort {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap_or_default(),
            Message::Binary(daten) => serde_json::from_slice(daten).unwrap_or_default(),
            _ => serde_json::Value::Null,
        };
        if antwort_json.get("setupComplete").is_none() {
            return Err(PitwallError::ModellSitzung(format!(
                "Unerwartete Setup-Antwort: {antwort_json}"
            )));
        }

        tracing::info!(modell = %self.modell, stimme = %stimme, "Gemini-Live-Session geoeffnet");

        // Socket-Leser -> Drop-Oldest-Puffer -> Ereigniskanal
        let puffer = Arc::new(EreignisPuffer::neu(MODELL_EREIGNIS_PUFFER));
        let (tx, rx) = mpsc::channel(MODELL_EREIGNIS_PUFFER);

        let leser_puffer = Arc::clone(&puffer);
        tokio::spawn(async move {
            while let Some(nachricht) = stream.next().await {
                match nachricht {
                    Ok(Message::Text(text)) => {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(text.as_str()) {
                            for ereignis in server_nachricht_parsen(&json) {
                                leser_puffer.einreihen(ereignis);
                            }
                        }
                    }
                    Ok(Message::Binary(daten)) => {
                        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&daten) {
                            for ereignis in server_nachricht_parsen(&json) {
                                leser_puffer.einreihen(ereignis);
                            }
                        }
                    }
                    Ok(Message::Close(grund)) => {
                        leser_puffer.einreihen(ModellEreignis::Geschlossen {
                            grund: grund
                                .map(|g| g.reason.to_string())
                                .unwrap_or_else(|| "Modell hat geschlossen".into()),
                        });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        leser_puffer.einreihen(ModellEreignis::Fehler(e.to_string()));
                        return;
                    }
                }
            }
            leser_puffer.einreihen(ModellEreignis::Geschlossen {
                grund: "Stream beendet".into(),
            });
        });

        tokio::spawn(async move {
            loop {
                let ereignis = puffer.entnehmen().await;
                let terminal = matches!(
                    ereignis,
                    ModellEreignis::Geschlossen { .. } | ModellEreignis::Fehler(_)
                );
                if tx.send(ereignis).await.is_err() {
                    break;
                }
                if terminal {
                    let verworfen = puffer.verworfene();
                    if verworfen > 0 {
                        tracing::debug!(verworfen, "Audio-Chunks im Puffer verfallen");
                    }
                    break;
                }
            }
        });

        Ok((Box::new(GeminiSitzung { sink }), rx))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
