//! pitwall-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und verdrahtet die Pipeline:
//! UDP-Empfaenger -> Frame-Verteiler -> (Analyzer, Logger, Clients),
//! dazu die Scheduler (1-Hz-Regelwerk, Rundenreaktor, 5-s-Kontext) und
//! der WebSocket-Fan-out.

pub mod config;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use config::ServerConfig;
use pitwall_config::KonfigStore;
use pitwall_core::event::ServerEvent;
use pitwall_engineer::{CalloutEngine, GeminiLiveVerbindung, VoiceOrchestrator};
use pitwall_signaling::connection::SignalingState;
use pitwall_signaling::server::ausgang_pumpe;
use pitwall_signaling::{EventBroadcaster, SignalingServer};
use pitwall_telemetry::{Analyzer, SessionLogger};
use pitwall_transport::{DiscoveryConfig, FrameVerteiler, TelemetrieEmpfaenger};

/// Kapazitaet des Frames-Kanals (Decoder -> Verteiler)
const FRAMES_KANAL: usize = 128;

/// Kapazitaet der Analyzer- und Logger-Kanaele
const KONSUMENTEN_KANAL: usize = 256;

/// Kapazitaet des gedrosselten Client-Kanals
const CLIENT_KANAL: usize = 64;

/// Kapazitaet des Orchestrator-Ausgangs
const AUSGANG_KANAL: usize = 256;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal.
    ///
    /// Reihenfolge:
    /// 1. App-Konfiguration laden (verschluesselter Store, Env-Override)
    /// 2. Kanaele und Analyzer aufbauen
    /// 3. UDP-Empfaenger binden (Fehler hier ist fatal)
    /// 4. Pipeline-Tasks starten (Verteiler, Analyzer, Logger)
    /// 5. Orchestrator und Signaling starten
    /// 6. Scheduler starten (1 Hz, Rundenreaktor, 5-s-Kontext)
    /// 7. Auf Ctrl-C warten, dann alles herunterfahren
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            empfangs_port = self.config.telemetrie.empfangs_port,
            ws = %self.config.ws_bind_adresse(),
            "Server startet"
        );

        // --- 1. App-Konfiguration ---
        let konfig = Arc::new(KonfigStore::laden(&self.config.speicher.konfig_pfad));
        konfig.env_override_anwenden();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // --- 2. Kanaele und Analyzer ---
        let (frames_tx, frames_rx) = mpsc::channel(FRAMES_KANAL);
        let (analyzer_tx, mut analyzer_rx) = mpsc::channel(KONSUMENTEN_KANAL);
        let (logger_tx, logger_rx) = mpsc::channel(KONSUMENTEN_KANAL);
        let (client_tx, mut client_rx) = mpsc::channel(CLIENT_KANAL);
        let (runden_tx, mut runden_rx) = mpsc::channel(16);
        let (ausgang_tx, ausgang_rx) = mpsc::channel(AUSGANG_KANAL);

        let analyzer = Arc::new(Analyzer::neu());
        analyzer.runden_beobachter_registrieren(runden_tx);

        // --- 3. UDP-Empfaenger binden ---
        let discovery = DiscoveryConfig {
            empfangs_port: self.config.telemetrie.empfangs_port,
            sende_port: self.config.telemetrie.sende_port,
            heartbeat_intervall: Duration::from_secs(self.config.telemetrie.heartbeat_intervall_s),
            expliziter_peer: self.config.telemetrie.konsole_ip,
        };
        let empfaenger = TelemetrieEmpfaenger::binden(discovery, frames_tx).await?;

        // --- 4. Pipeline-Tasks ---
        tokio::spawn(empfaenger.starten(shutdown_rx.clone()));

        let verteiler = FrameVerteiler::neu(analyzer_tx, logger_tx, client_tx);
        tokio::spawn(verteiler.starten(frames_rx, shutdown_rx.clone()));

        let analyzer_task = Arc::clone(&analyzer);
        tokio::spawn(async move {
            while let Some(frame) = analyzer_rx.recv().await {
                analyzer_task.frame_aufnehmen(&frame);
            }
        });

        let logger = SessionLogger::neu(&self.config.speicher.session_verzeichnis);
        tokio::spawn(logger.starten(logger_rx, shutdown_rx.clone()));

        // --- 5. Orchestrator und Signaling ---
        let verbindung = Arc::new(GeminiLiveVerbindung::mit_modell(
            self.config.engineer.modell.clone(),
        ));
        let orchestrator = VoiceOrchestrator::neu(verbindung, ausgang_tx);
        let engine = Arc::new(Mutex::new(CalloutEngine::neu(self.config.engineer.verbosity)));
        let broadcaster = EventBroadcaster::neu();

        let state = Arc::new(SignalingState {
            broadcaster: broadcaster.clone(),
            orchestrator: orchestrator.clone(),
            konfig: Arc::clone(&konfig),
            engine: Arc::clone(&engine),
        });

        tokio::spawn(ausgang_pumpe(ausgang_rx, broadcaster.clone()));

        let ws_addr = self
            .config
            .ws_bind_adresse()
            .parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige WS-Adresse: {e}"))?;
        let signaling = SignalingServer::binden(Arc::clone(&state), ws_addr).await?;
        let signaling_task = tokio::spawn(signaling.starten(shutdown_rx.clone()));

        // Gedrosselte Frames an alle Clients
        let frame_broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            while let Some(frame) = client_rx.recv().await {
                frame_broadcaster.an_alle_senden(&ServerEvent::Telemetry((*frame).clone()));
            }
        });

        // --- 6. Scheduler ---
        // 1 Hz: Snapshot -> periodische Regeln -> Zustellung
        let tick_analyzer = Arc::clone(&analyzer);
        let tick_engine = Arc::clone(&engine);
        let tick_orchestrator = orchestrator.clone();
        let tick_broadcaster = broadcaster.clone();
        let tick_konfig = Arc::clone(&konfig);
        let mut tick_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(Duration::from_secs(1));
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = takt.tick() => {
                        let snapshot = tick_analyzer.snapshot();
                        tick_broadcaster
                            .an_alle_senden(&ServerEvent::TelemetrySnapshot(snapshot.clone()));
                        if tick_konfig.engineer_enabled() {
                            let callouts = tick_engine.lock().bewerten(&snapshot, Instant::now());
                            tick_orchestrator.callouts_zustellen(callouts).await;
                        }
                    }
                    _ = tick_shutdown.changed() => {
                        if *tick_shutdown.borrow() { break; }
                    }
                }
            }
        });

        // Rundenreaktor: Regeln bei Rundenwechsel
        let runden_analyzer = Arc::clone(&analyzer);
        let runden_engine = Arc::clone(&engine);
        let runden_orchestrator = orchestrator.clone();
        let runden_konfig = Arc::clone(&konfig);
        tokio::spawn(async move {
            while let Some(runde) = runden_rx.recv().await {
                tracing::debug!(runde, "Rundenwechsel");
                if !runden_konfig.engineer_enabled() {
                    continue;
                }
                let snapshot = runden_analyzer.snapshot();
                let callouts = runden_engine
                    .lock()
                    .runde_abgeschlossen(&snapshot, Instant::now());
                runden_orchestrator.callouts_zustellen(callouts).await;
            }
        });

        // ~5 s: Kontext an die aktive Voice-Session
        let kontext_analyzer = Arc::clone(&analyzer);
        let kontext_orchestrator = orchestrator.clone();
        let mut kontext_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(Duration::from_secs(5));
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = takt.tick() => {
                        if kontext_orchestrator.ist_aktiv().await {
                            let snapshot = kontext_analyzer.snapshot();
                            kontext_orchestrator.kontext_aktualisieren(&snapshot).await;
                        }
                    }
                    _ = kontext_shutdown.changed() => {
                        if *kontext_shutdown.borrow() { break; }
                    }
                }
            }
        });

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");

        // --- 7. Shutdown ---
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        if let Some(besitzer) = orchestrator.besitzer().await {
            orchestrator.stoppen(besitzer).await;
        }
        let _ = shutdown_tx.send(true);

        // Dem Signaling Zeit zum sauberen Schliessen geben
        match tokio::time::timeout(Duration::from_secs(5), signaling_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(fehler = %e, "Signaling-Fehler beim Beenden"),
            Ok(Err(e)) => tracing::warn!(fehler = %e, "Signaling-Task abgebrochen"),
            Err(_) => tracing::warn!("Signaling-Shutdown-Timeout"),
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}
