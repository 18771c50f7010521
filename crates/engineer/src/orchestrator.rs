//! Voice-Session-Orchestrator
//!
//! Besitzt hoechstens EINE Session zu einem externen Sprachmodell und
//! koppelt deren vier Stroeme: Modell-Audio und Modell-Text zum Client,
//! Fahrer-Audio und Text-Steuerereignisse (Callouts, Kontext) zum Modell.
//!
//! ## Lebenszyklus
//!
//! ```text
//! idle --start--> connecting --open--> active --stop/disconnect/fehler--> idle
//! ```
//!
//! Ein `start` waehrend eine Session laeuft raeumt zuerst die alte ab
//! (letzter Schreiber gewinnt); der alte Besitzer bekommt
//! `engineer:status {connected: false}`. Modell-Fehler sind terminal:
//! einmal melden, abraeumen, kein automatischer Reconnect.

use crate::personality;
use async_trait::async_trait;
use pitwall_core::event::{EngineerStartDaten, ServerEvent};
use pitwall_core::{
    Callout, ClientId, FuelUsage, Result, SessionConfig, Snapshot, VoiceMode,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Puffergroesse des Modell-Ereignis-Kanals (Audio-Chunks sind klein,
/// drop-oldest passiert auf der Gegenseite)
pub const MODELL_EREIGNIS_PUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Modell-Transport-Traits
// ---------------------------------------------------------------------------

/// Ereignisse die das Sprachmodell an die Session liefert
#[derive(Debug, Clone)]
pub enum ModellEreignis {
    /// Base64-kodierter PCM-Chunk (24 kHz, 16 Bit, mono)
    Audio(String),
    /// Text vom Modell: Antwort oder Ausgabe-Transkript
    Text { inhalt: String, transkript: bool },
    /// Modell hat die Verbindung geschlossen
    Geschlossen { grund: String },
    /// Terminaler Session-Fehler
    Fehler(String),
}

/// Eine offene Session zum Sprachmodell
#[async_trait]
pub trait ModellSitzung: Send {
    /// Sendet einen Text-Turn. `turn_abschliessen = false` liefert
    /// Hintergrund-Kontext den das Modell nicht beantworten soll.
    async fn text_senden(&mut self, text: &str, turn_abschliessen: bool) -> Result<()>;

    /// Leitet einen Fahrer-Audio-Chunk weiter (Base64-PCM, 16 kHz)
    async fn audio_senden(&mut self, base64_pcm: &str) -> Result<()>;

    /// Signalisiert das Ende der Fahrer-Aeusserung (ASR-Flush)
    async fn audio_ende(&mut self) -> Result<()>;

    /// Schliesst die Session; idempotent
    async fn schliessen(&mut self);
}

/// Stellt Sessions zum Sprachmodell her.
///
/// Trait-Naht damit Tests ohne Netz fahren; die Produktion haengt
/// `GeminiLiveVerbindung` dahinter.
#[async_trait]
pub trait ModellVerbindung: Send + Sync {
    /// Oeffnet eine Session mit Stimme und System-Anweisung.
    ///
    /// Kehrt erst nach dem Open-Signal des Modells zurueck; der Receiver
    /// liefert danach alle Modell-Ereignisse.
    async fn oeffnen(
        &self,
        api_key: &str,
        stimme: &str,
        anweisung: &str,
    ) -> Result<(Box<dyn ModellSitzung>, mpsc::Receiver<ModellEreignis>)>;
}

// ---------------------------------------------------------------------------
// Ausgang – Ereignisse Richtung Clients
// ---------------------------------------------------------------------------

/// Wohin ein Server-Event geht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AusgangsZiel {
    /// Broadcast an alle verbundenen Clients
    Alle,
    /// Nur an den genannten Client
    Client(ClientId),
}

/// Ein geroutetes Server-Event des Orchestrators.
///
/// Der Orchestrator kennt keine Sockets; das Signaling konsumiert diesen
/// Kanal und stellt zu.
#[derive(Debug)]
pub struct Ausgang {
    pub ziel: AusgangsZiel,
    pub event: ServerEvent,
}

// ---------------------------------------------------------------------------
// Aktive Session
// ---------------------------------------------------------------------------

/// Buendelt alle Ressourcen einer laufenden Session: ein einziges
/// `beenden` raeumt Lesertask und Modell-Handle ab, egal auf welchem
/// Weg die Session endet.
struct AktiveSitzung {
    besitzer: ClientId,
    config: SessionConfig,
    sitzung: Box<dyn ModellSitzung>,
    leser_task: JoinHandle<()>,
}

impl AktiveSitzung {
    async fn beenden(mut self, leser_abbrechen: bool) {
        if leser_abbrechen {
            self.leser_task.abort();
        }
        self.sitzung.schliessen().await;
    }
}

// ---------------------------------------------------------------------------
// VoiceOrchestrator
// ---------------------------------------------------------------------------

/// Orchestriert die eine Sprachmodell-Session.
///
/// Clone teilt den inneren Zustand (wie ueblich via Arc); der
/// Session-Slot ist durch einen tokio-Mutex bewacht, bei
/// konkurrierenden Starts gewinnt der letzte.
#[derive(Clone)]
pub struct VoiceOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    verbindung: Arc<dyn ModellVerbindung>,
    aktive: Mutex<Option<AktiveSitzung>>,
    ausgang_tx: mpsc::Sender<Ausgang>,
}

impl VoiceOrchestrator {
    pub fn neu(verbindung: Arc<dyn ModellVerbindung>, ausgang_tx: mpsc::Sender<Ausgang>) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                verbindung,
                aktive: Mutex::new(None),
                ausgang_tx,
            }),
        }
    }

    /// Laeuft gerade eine Session?
    pub async fn ist_aktiv(&self) -> bool {
        self.inner.aktive.lock().await.is_some()
    }

    /// Besitzer der laufenden Session
    pub async fn besitzer(&self) -> Option<ClientId> {
        self.inner.aktive.lock().await.as_ref().map(|s| s.besitzer)
    }

    /// Startet eine Session fuer `client`.
    ///
    /// Eine laufende Session wird zuerst abgeraeumt; ihr Besitzer bekommt
    /// den Status `connected: false`. Fehler beim Oeffnen gehen als
    /// `engineer:error` an den anfragenden Client, der Slot bleibt leer.
    pub async fn starten(
        &self,
        client: ClientId,
        daten: EngineerStartDaten,
        api_key: Option<&str>,
    ) {
        let Some(api_key) = api_key else {
            self.senden(AusgangsZiel::Client(client), ServerEvent::EngineerError {
                message: "Kein API-Key konfiguriert".into(),
            })
            .await;
            self.status_senden(client, false, None).await;
            return;
        };

        let persoenlichkeit = daten
            .custom_personality
            .or_else(|| {
                daten
                    .personality_id
                    .as_deref()
                    .and_then(personality::persoenlichkeit_finden)
            })
            .unwrap_or_else(personality::standard_persoenlichkeit);

        let config = SessionConfig {
            verbosity: daten.verbosity.unwrap_or(2).clamp(1, 3),
            custom_instructions: daten.custom_instructions,
            voice_mode: daten.voice_mode.unwrap_or(VoiceMode::PushToTalk),
            personality: persoenlichkeit,
        };

        let anweisung =
            personality::system_anweisung(&config.personality, config.custom_instructions.as_deref());

        let mut slot = self.inner.aktive.lock().await;

        // Laufende Session abraeumen: letzter Schreiber gewinnt
        if let Some(alte) = slot.take() {
            tracing::info!(
                alter_besitzer = %alte.besitzer,
                neuer_besitzer = %client,
                "Neue Session verdraengt die laufende"
            );
            self.status_senden(alte.besitzer, false, None).await;
            alte.beenden(true).await;
        }

        tracing::info!(
            client = %client,
            persoenlichkeit = %config.personality.id,
            stimme = %config.personality.voice,
            "Voice-Session wird geoeffnet"
        );

        match self
            .inner
            .verbindung
            .oeffnen(api_key, &config.personality.voice, &anweisung)
            .await
        {
            Ok((sitzung, ereignisse)) => {
                let leser_task = tokio::spawn(
                    self.clone()
                        .modell_ereignisse_lesen(client, ereignisse),
                );
                let anzeige_name = config.personality.display_name.clone();
                *slot = Some(AktiveSitzung {
                    besitzer: client,
                    config,
                    sitzung,
                    leser_task,
                });
                drop(slot);
                self.status_senden(client, true, Some(anzeige_name)).await;
            }
            Err(e) => {
                drop(slot);
                tracing::warn!(client = %client, fehler = %e, "Session-Aufbau fehlgeschlagen");
                self.senden(AusgangsZiel::Client(client), ServerEvent::EngineerError {
                    message: e.to_string(),
                })
                .await;
                self.status_senden(client, false, None).await;
            }
        }
    }

    /// Beendet die Session des Clients (No-Op fuer Nicht-Besitzer)
    pub async fn stoppen(&self, client: ClientId) {
        let mut slot = self.inner.aktive.lock().await;
        if !slot.as_ref().is_some_and(|s| s.besitzer == client) {
            if slot.is_some() {
                tracing::debug!(client = %client, "Stop von Nicht-Besitzer ignoriert");
            }
            return;
        }
        let aktive = slot.take();
        drop(slot);
        tracing::info!(client = %client, "Voice-Session gestoppt");
        if let Some(aktive) = aktive {
            aktive.beenden(true).await;
        }
        self.status_senden(client, false, None).await;
    }

    /// Client-Verbindung weg: Session des Besitzers abraeumen
    pub async fn client_getrennt(&self, client: ClientId) {
        let mut slot = self.inner.aktive.lock().await;
        if !slot.as_ref().is_some_and(|s| s.besitzer == client) {
            return;
        }
        let aktive = slot.take();
        drop(slot);
        tracing::info!(client = %client, "Besitzer getrennt, Session wird abgeraeumt");
        if let Some(aktive) = aktive {
            aktive.beenden(true).await;
        }
    }

    /// Stellt Callouts zu: als Text-Turns an die aktive Session, ohne
    /// Session als Klartext an alle Clients (Dashboard-Historie).
    pub async fn callouts_zustellen(&self, callouts: Vec<Callout>) {
        if callouts.is_empty() {
            return;
        }

        let mut slot = self.inner.aktive.lock().await;
        match slot.as_mut() {
            Some(aktive) => {
                for callout in &callouts {
                    let turn = format!(
                        "[CALLOUT: {}] {} Deliver this information in your style.",
                        callout.typ.name(),
                        callout.nachricht
                    );
                    if let Err(e) = aktive.sitzung.text_senden(&turn, true).await {
                        drop(slot);
                        self.sitzung_fehler(e.to_string()).await;
                        return;
                    }
                }
            }
            None => {
                drop(slot);
                for callout in callouts {
                    self.senden(AusgangsZiel::Alle, ServerEvent::EngineerText {
                        text: callout.nachricht,
                        typ: "callout".into(),
                        timestamp: callout.zeitstempel_ms,
                    })
                    .await;
                }
            }
        }
    }

    /// Schiebt den aktuellen Snapshot als Hintergrund-Kontext nach
    /// (`turn_complete = false`, das Modell soll nicht antworten).
    pub async fn kontext_aktualisieren(&self, snapshot: &Snapshot) {
        let mut slot = self.inner.aktive.lock().await;
        let Some(aktive) = slot.as_mut() else {
            return;
        };
        let block = kontext_formatieren(snapshot);
        if let Err(e) = aktive.sitzung.text_senden(&block, false).await {
            drop(slot);
            self.sitzung_fehler(e.to_string()).await;
        }
    }

    /// Fahrer-Audio-Chunk vom besitzenden Client an das Modell
    pub async fn fahrer_audio(&self, client: ClientId, base64_pcm: &str) {
        let mut slot = self.inner.aktive.lock().await;
        let Some(aktive) = slot.as_mut() else {
            return;
        };
        if aktive.besitzer != client {
            return;
        }
        if let Err(e) = aktive.sitzung.audio_senden(base64_pcm).await {
            drop(slot);
            self.sitzung_fehler(e.to_string()).await;
        }
    }

    /// Ende der Fahrer-Aeusserung (Push-to-Talk losgelassen)
    pub async fn fahrer_audio_ende(&self, client: ClientId) {
        let mut slot = self.inner.aktive.lock().await;
        let Some(aktive) = slot.as_mut() else {
            return;
        };
        if aktive.besitzer != client {
            return;
        }
        if let Err(e) = aktive.sitzung.audio_ende().await {
            drop(slot);
            self.sitzung_fehler(e.to_string()).await;
        }
    }

    /// Verbosity der laufenden Session nachziehen (Engine haelt das Gate,
    /// hier nur fuer den Status sichtbar)
    pub async fn verbosity_setzen(&self, verbosity: u8) {
        if let Some(aktive) = self.inner.aktive.lock().await.as_mut() {
            aktive.config.verbosity = verbosity.clamp(1, 3);
        }
    }

    // -----------------------------------------------------------------------
    // Interna
    // -----------------------------------------------------------------------

    /// Lesertask: Modell-Ereignisse an den besitzenden Client routen
    async fn modell_ereignisse_lesen(
        self,
        besitzer: ClientId,
        mut ereignisse: mpsc::Receiver<ModellEreignis>,
    ) {
        while let Some(ereignis) = ereignisse.recv().await {
            match ereignis {
                ModellEreignis::Audio(chunk) => {
                    self.senden(
                        AusgangsZiel::Client(besitzer),
                        ServerEvent::EngineerAudioOut(chunk),
                    )
                    .await;
                }
                ModellEreignis::Text { inhalt, transkript } => {
                    self.senden(AusgangsZiel::Client(besitzer), ServerEvent::EngineerText {
                        text: inhalt,
                        typ: if transkript { "transcript" } else { "response" }.into(),
                        timestamp: chrono::Utc::now().timestamp_millis() as u64,
                    })
                    .await;
                }
                ModellEreignis::Geschlossen { grund } => {
                    tracing::info!(grund = %grund, "Modell hat die Session geschlossen");
                    self.sitzung_beenden_vom_leser(besitzer, None).await;
                    return;
                }
                ModellEreignis::Fehler(fehler) => {
                    tracing::warn!(fehler = %fehler, "Terminaler Modell-Fehler");
                    self.sitzung_beenden_vom_leser(besitzer, Some(fehler)).await;
                    return;
                }
            }
        }
        // Kanal zu ohne Geschlossen-Ereignis: wie ein Close behandeln
        self.sitzung_beenden_vom_leser(besitzer, None).await;
    }

    /// Teardown aus dem Lesertask heraus (der Task beendet sich selbst,
    /// darf also nicht abgebrochen werden)
    async fn sitzung_beenden_vom_leser(&self, besitzer: ClientId, fehler: Option<String>) {
        let aktive = {
            let mut slot = self.inner.aktive.lock().await;
            match slot.as_ref() {
                Some(s) if s.besitzer == besitzer => slot.take(),
                _ => None,
            }
        };
        if let Some(aktive) = aktive {
            aktive.beenden(false).await;
        }
        if let Some(fehler) = fehler {
            self.senden(AusgangsZiel::Client(besitzer), ServerEvent::EngineerError {
                message: fehler,
            })
            .await;
        }
        self.status_senden(besitzer, false, None).await;
    }

    /// Terminaler Fehler beim Senden Richtung Modell: Session abraeumen
    /// und den Besitzer genau einmal informieren
    async fn sitzung_fehler(&self, fehler: String) {
        let aktive = self.inner.aktive.lock().await.take();
        if let Some(aktive) = aktive {
            let besitzer = aktive.besitzer;
            aktive.beenden(true).await;
            self.senden(AusgangsZiel::Client(besitzer), ServerEvent::EngineerError {
                message: fehler,
            })
            .await;
            self.status_senden(besitzer, false, None).await;
        }
    }

    async fn status_senden(&self, client: ClientId, connected: bool, personality: Option<String>) {
        self.senden(
            AusgangsZiel::Client(client),
            ServerEvent::EngineerStatus {
                connected,
                personality,
            },
        )
        .await;
    }

    async fn senden(&self, ziel: AusgangsZiel, event: ServerEvent) {
        if self
            .inner
            .ausgang_tx
            .send(Ausgang { ziel, event })
            .await
            .is_err()
        {
            tracing::debug!("Ausgangs-Kanal geschlossen");
        }
    }
}

/// Formatiert den Snapshot als Kontext-Block fuer das Modell
fn kontext_formatieren(s: &Snapshot) -> String {
    use crate::rules::{delta_formatieren, runde_formatieren};
    use std::fmt::Write;

    let mut block = String::from("[CONTEXT UPDATE]\n");
    let _ = writeln!(block, "Lap {}/{}", s.lap_count, s.laps_total);

    if s.best_lap_ms > 0 || s.last_lap_ms > 0 {
        let _ = writeln!(
            block,
            "Best {}, last {}, delta {}",
            runde_formatieren(s.best_lap_ms),
            runde_formatieren(s.last_lap_ms),
            delta_formatieren(s.lap_delta_ms)
        );
    }
    let _ = writeln!(block, "Pace: {:?}", s.pace_trend);
    let _ = writeln!(
        block,
        "Speed {:.0} km/h, gear {}, {:.0} rpm",
        s.current_speed_kmh, s.current_gear, s.engine_rpm
    );
    if s.fuel_usage == FuelUsage::On {
        if s.estimated_laps_remaining.is_finite() {
            let _ = writeln!(
                block,
                "Fuel {:.1} L, burn {:.2} L/lap, {:.1} laps remaining",
                s.fuel_level, s.fuel_burn_per_lap, s.estimated_laps_remaining
            );
        } else {
            let _ = writeln!(block, "Fuel {:.1} L", s.fuel_level);
        }
    }
    let _ = writeln!(
        block,
        "Tyres FL {:.0} FR {:.0} RL {:.0} RR {:.0}",
        s.tyre_temps[0], s.tyre_temps[1], s.tyre_temps[2], s.tyre_temps[3]
    );
    if s.tcs_fraction > 0.05 {
        let _ = writeln!(block, "TCS active {:.0}% of lap", s.tcs_fraction * 100.0);
    }
    if s.asm_fraction > 0.05 {
        let _ = writeln!(block, "ASM active {:.0}% of lap", s.asm_fraction * 100.0);
    }
    block
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
