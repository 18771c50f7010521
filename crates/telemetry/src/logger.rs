//! NDJSON-Session-Logger
//!
//! Reine Senke: oeffnet beim ersten On-Track-Frame eine Datei
//! `YYYY-MM-DDTHH-MM-SS_car-<code>.ndjson`, schreibt pro On-Track-Frame
//! eine Zeile `{"timestamp": ..., "data": ...}` und schliesst beim
//! Off-Track-Uebergang oder nach 30 s ohne On-Track-Frames. Die Metadaten
//! landen in einem `.meta.json`-Sidecar.
//!
//! Alles hier ist Best-Effort: Schreibfehler werden geloggt, nie
//! propagiert – die Telemetrie-Pipeline haengt nicht an der Platte.

use chrono::{DateTime, Local};
use pitwall_core::Frame;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Session-Ende nach so viel Zeit ohne On-Track-Frame
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pruefintervall des Idle-Watchdogs
const WATCHDOG_INTERVALL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Aktive Sitzung
// ---------------------------------------------------------------------------

struct AktiveSitzung {
    writer: BufWriter<File>,
    meta_pfad: PathBuf,
    start: DateTime<Local>,
    auto_code: i32,
    paket_zaehler: u64,
    /// Juengste gesetzte Bestzeit (Sentinel -1 solange keine vorliegt)
    beste_runde_ms: i32,
    letzte_runde: i16,
    letzter_on_track: Instant,
}

impl AktiveSitzung {
    fn zeile_schreiben(&mut self, frame: &Frame) -> std::io::Result<()> {
        let zeile = serde_json::json!({
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "data": frame,
        });
        // serde_json auf einen Writer vermeidet die Zwischen-Allokation
        serde_json::to_writer(&mut self.writer, &zeile)?;
        self.writer.write_all(b"\n")?;

        self.paket_zaehler += 1;
        if frame.best_lap_ms > 0 {
            self.beste_runde_ms = frame.best_lap_ms;
        }
        if frame.lap_count > self.letzte_runde {
            self.letzte_runde = frame.lap_count;
        }
        self.letzter_on_track = Instant::now();
        Ok(())
    }

    /// Schreibt das Metadaten-Sidecar und schliesst die Datei
    fn abschliessen(mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(fehler = %e, "Session-Datei-Flush fehlgeschlagen");
        }

        let meta = serde_json::json!({
            "start": self.start.to_rfc3339(),
            "ende": Local::now().to_rfc3339(),
            "carCode": self.auto_code,
            "totalLaps": self.letzte_runde,
            "bestLapMs": self.beste_runde_ms,
            "packetCount": self.paket_zaehler,
        });
        match serde_json::to_string_pretty(&meta) {
            Ok(inhalt) => {
                if let Err(e) = fs::write(&self.meta_pfad, inhalt) {
                    tracing::warn!(
                        pfad = %self.meta_pfad.display(),
                        fehler = %e,
                        "Metadaten-Sidecar nicht schreibbar"
                    );
                }
            }
            Err(e) => tracing::warn!(fehler = %e, "Metadaten nicht serialisierbar"),
        }

        tracing::info!(
            pakete = self.paket_zaehler,
            runden = self.letzte_runde,
            "Session-Log abgeschlossen"
        );
    }
}

// ---------------------------------------------------------------------------
// SessionLogger
// ---------------------------------------------------------------------------

/// Schreibt On-Track-Phasen als NDJSON-Dateien in ein Verzeichnis
pub struct SessionLogger {
    verzeichnis: PathBuf,
    aktive: Option<AktiveSitzung>,
    /// Unterdrueckt wiederholte Oeffnungsfehler bis zum naechsten
    /// Off-Track-Uebergang
    oeffnen_fehlgeschlagen: bool,
}

impl SessionLogger {
    /// Erstellt den Logger; das Verzeichnis wird bei Bedarf angelegt
    pub fn neu(verzeichnis: impl Into<PathBuf>) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
            aktive: None,
            oeffnen_fehlgeschlagen: false,
        }
    }

    /// Laeuft eine Session gerade?
    pub fn ist_offen(&self) -> bool {
        self.aktive.is_some()
    }

    /// Verarbeitet einen Frame: On-Track-Kante oeffnet, Off-Track-Kante
    /// schliesst, dazwischen wird eine Zeile geschrieben.
    pub fn frame_verarbeiten(&mut self, frame: &Frame) {
        if !frame.auf_strecke() {
            if let Some(sitzung) = self.aktive.take() {
                sitzung.abschliessen();
            }
            self.oeffnen_fehlgeschlagen = false;
            return;
        }

        if self.aktive.is_none() && !self.oeffnen_fehlgeschlagen {
            match self.sitzung_oeffnen(frame) {
                Ok(sitzung) => self.aktive = Some(sitzung),
                Err(e) => {
                    tracing::error!(fehler = %e, "Session-Datei nicht anlegbar");
                    self.oeffnen_fehlgeschlagen = true;
                }
            }
        }

        if let Some(sitzung) = &mut self.aktive {
            if let Err(e) = sitzung.zeile_schreiben(frame) {
                tracing::warn!(fehler = %e, "Session-Zeile nicht schreibbar");
            }
        }
    }

    /// Schliesst die Session wenn laenger als das Timeout kein
    /// On-Track-Frame kam (Session-Watchdog, keine Cancellation).
    pub fn idle_pruefen(&mut self, jetzt: Instant) {
        let abgelaufen = self
            .aktive
            .as_ref()
            .is_some_and(|s| jetzt.duration_since(s.letzter_on_track) >= IDLE_TIMEOUT);
        if abgelaufen {
            tracing::info!("Session-Log nach Leerlauf geschlossen");
            if let Some(sitzung) = self.aktive.take() {
                sitzung.abschliessen();
            }
        }
    }

    /// Schliesst eine offene Session (Shutdown-Pfad)
    pub fn abschliessen(&mut self) {
        if let Some(sitzung) = self.aktive.take() {
            sitzung.abschliessen();
        }
    }

    fn sitzung_oeffnen(&self, frame: &Frame) -> std::io::Result<AktiveSitzung> {
        fs::create_dir_all(&self.verzeichnis)?;

        let start = Local::now();
        let stamm = format!(
            "{}_car-{}",
            start.format("%Y-%m-%dT%H-%M-%S"),
            frame.car_code
        );
        let pfad = self.verzeichnis.join(format!("{stamm}.ndjson"));
        let meta_pfad = self.verzeichnis.join(format!("{stamm}.meta.json"));

        let datei = File::create(&pfad)?;
        tracing::info!(pfad = %pfad.display(), "Session-Log geoeffnet");

        Ok(AktiveSitzung {
            writer: BufWriter::new(datei),
            meta_pfad,
            start,
            auto_code: frame.car_code,
            paket_zaehler: 0,
            beste_runde_ms: -1,
            letzte_runde: frame.lap_count,
            letzter_on_track: Instant::now(),
        })
    }

    /// Task-Loop: konsumiert den Logger-Kanal bis zum Shutdown.
    pub async fn starten(
        mut self,
        mut frames_rx: mpsc::Receiver<Arc<Frame>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVALL);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(verzeichnis = %self.verzeichnis.display(), "Session-Logger gestartet");

        loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    match frame {
                        Some(frame) => self.frame_verarbeiten(&frame),
                        None => break,
                    }
                }
                _ = watchdog.tick() => {
                    self.idle_pruefen(Instant::now());
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.abschliessen();
        tracing::info!("Session-Logger beendet");
    }
}

/// Listet die NDJSON-Dateien eines Verzeichnisses (Diagnose/Tests)
pub fn session_dateien(verzeichnis: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dateien: Vec<PathBuf> = fs::read_dir(verzeichnis)?
        .filter_map(|eintrag| eintrag.ok())
        .map(|eintrag| eintrag.path())
        .filter(|pfad| pfad.extension().is_some_and(|ext| ext == "ndjson"))
        .collect();
    dateien.sort();
    Ok(dateien)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
