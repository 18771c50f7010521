//! Telemetrie-Analyzer
//!
//! Klassischer Single-Writer: nur der Frame-Konsument schreibt, Leser
//! bekommen ueber `snapshot()` eine konsistente Kopie. Der innere Zustand
//! verlaesst das Modul nie.
//!
//! ## Session-Grenzen
//!
//! Ein neues Rennen (kompletter Reset) wird auf einem On-Track-Frame
//! erklaert wenn eine der folgenden Bedingungen greift:
//! - erster On-Track-Frame ueberhaupt
//! - Fahrzeugcode gewechselt
//! - Rundenzaehler = 0 obwohl zuvor > 0
//! - Rundenzaehler um mehr als eins gefallen
//! - beste Rundenzeit zurueck auf dem Sentinel -1 obwohl zuvor gesetzt
//! - Fuellstand sprang auf >= 99 % der Kapazitaet von zuvor < 95 %
//!
//! On-Track -> Off-Track ist eine Pause: die Rueckkehr ohne eine der
//! Bedingungen setzt nichts zurueck.

use crate::fuel::KraftstoffModell;
use crate::tyres::ReifenVerlauf;
use parking_lot::{Mutex, RwLock};
use pitwall_core::{Frame, PaceTrend, Snapshot};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::mpsc;

/// Kapazitaet der Juengste-Runden-FIFO
const RECENT_LAPS_KAPAZITAET: usize = 5;

/// Anzahl Runden fuer die Pace-Bewertung
const PACE_FENSTER: usize = 3;

// ---------------------------------------------------------------------------
// Innerer Zustand
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AnalyzerZustand {
    /// Mindestens ein On-Track-Frame seit Prozessstart gesehen
    session_aktiv: bool,
    auto_code: i32,
    letzte_runde: i16,
    letzter_best_lap: i32,
    letzter_fuellstand: f32,
    /// Zeitstempel (ms, Prozessuhr) des Session-Beginns
    session_start_ms: u64,
    /// Zeitstempel (ms, Prozessuhr) des aktuellen Rundenbeginns
    runden_start_ms: u64,
    /// Juengster Frame, auch off-track (fuer Snapshot-Momentwerte)
    letzter_frame: Option<Frame>,
    /// Abgeschlossene Rundenzeiten in ms, aelteste zuerst, max. 5
    recent_laps: VecDeque<i32>,
    // Akkumulatoren der laufenden Runde
    frames_in_runde: u32,
    begrenzer_frames: u32,
    tcs_frames: u32,
    asm_frames: u32,
    top_speed_kmh: f32,
    reifen: [ReifenVerlauf; 4],
    kraftstoff: KraftstoffModell,
}

impl AnalyzerZustand {
    /// Kompletter Reset auf ein neues Rennen
    fn neues_rennen(&mut self, frame: &Frame, jetzt_ms: u64) {
        self.session_aktiv = true;
        self.auto_code = frame.car_code;
        self.letzte_runde = frame.lap_count;
        self.letzter_best_lap = frame.best_lap_ms;
        self.letzter_fuellstand = frame.fuel_level;
        self.session_start_ms = jetzt_ms;
        self.runden_start_ms = jetzt_ms;
        self.recent_laps.clear();
        self.runden_akkumulatoren_zuruecksetzen();
        for verlauf in &mut self.reifen {
            verlauf.leeren();
        }
        self.kraftstoff = KraftstoffModell::neu();
        // Index 0 des Runden-Fuellstand-Stapels: Beginn der Out-Lap
        self.kraftstoff.runde_begonnen(frame.fuel_level);
    }

    fn runden_akkumulatoren_zuruecksetzen(&mut self) {
        self.frames_in_runde = 0;
        self.begrenzer_frames = 0;
        self.tcs_frames = 0;
        self.asm_frames = 0;
        self.top_speed_kmh = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Haelt den abgeleiteten Zustand einer aktiven Session.
///
/// Thread-safe: `frame_aufnehmen` nimmt den Write-Lock (ein Schreiber),
/// `snapshot` den Read-Lock und kopiert heraus.
pub struct Analyzer {
    zustand: RwLock<AnalyzerZustand>,
    uhr_start: Instant,
    /// Wird nach abgeschlossener Rundenwechsel-Buchfuehrung benachrichtigt
    runden_beobachter: Mutex<Option<mpsc::Sender<i16>>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::neu()
    }
}

impl Analyzer {
    pub fn neu() -> Self {
        Self {
            zustand: RwLock::new(AnalyzerZustand::default()),
            uhr_start: Instant::now(),
            runden_beobachter: Mutex::new(None),
        }
    }

    /// Registriert den Rundenwechsel-Beobachter.
    ///
    /// Der Empfaenger bekommt die neue Rundennummer und darf danach
    /// `snapshot()` aufrufen um den Zustand nach dem Wechsel zu sehen.
    pub fn runden_beobachter_registrieren(&self, tx: mpsc::Sender<i16>) {
        *self.runden_beobachter.lock() = Some(tx);
    }

    /// Zeit der Prozessuhr in Millisekunden
    fn jetzt_ms(&self) -> u64 {
        self.uhr_start.elapsed().as_millis() as u64
    }

    /// Nimmt einen Frame mit der Prozessuhr auf
    pub fn frame_aufnehmen(&self, frame: &Frame) {
        self.frame_aufnehmen_mit_zeit(frame, self.jetzt_ms());
    }

    /// Nimmt einen Frame mit expliziter Zeit auf (Zeitquelle injizierbar,
    /// Tests fahren damit synthetische Sessions in Nullzeit ab).
    pub fn frame_aufnehmen_mit_zeit(&self, frame: &Frame, jetzt_ms: u64) {
        let mut runde_gewechselt = None;

        {
            let mut z = self.zustand.write();
            z.letzter_frame = Some(frame.clone());

            // Off-Track ist eine Pause: nichts ausser dem Momentbild aendern
            if !frame.auf_strecke() {
                drop(z);
                return;
            }

            if Self::ist_neues_rennen(&z, frame) {
                tracing::info!(
                    auto = frame.car_code,
                    runde = frame.lap_count,
                    "Neues Rennen erkannt, Analyzer-Zustand zurueckgesetzt"
                );
                z.neues_rennen(frame, jetzt_ms);
            } else if frame.lap_count != z.letzte_runde {
                // Rundenwechsel: Buchfuehrung vor der Benachrichtigung
                if frame.last_lap_ms > 0 {
                    if z.recent_laps.len() == RECENT_LAPS_KAPAZITAET {
                        z.recent_laps.pop_front();
                    }
                    z.recent_laps.push_back(frame.last_lap_ms);
                }
                z.kraftstoff.runde_begonnen(frame.fuel_level);
                z.runden_akkumulatoren_zuruecksetzen();
                z.runden_start_ms = jetzt_ms;
                z.letzte_runde = frame.lap_count;
                runde_gewechselt = Some(frame.lap_count);
            }

            // Laufende Buchfuehrung pro On-Track-Frame
            z.letzter_best_lap = frame.best_lap_ms;
            z.letzter_fuellstand = frame.fuel_level;
            z.frames_in_runde += 1;
            if frame.begrenzer_aktiv() {
                z.begrenzer_frames += 1;
            }
            if frame.tcs_aktiv() {
                z.tcs_frames += 1;
            }
            if frame.asm_aktiv() {
                z.asm_frames += 1;
            }
            if frame.speed_kmh > z.top_speed_kmh {
                z.top_speed_kmh = frame.speed_kmh;
            }
            for (verlauf, temp) in z.reifen.iter_mut().zip(frame.tyre_temps) {
                verlauf.aufzeichnen(temp, jetzt_ms);
            }
            let session_ms = jetzt_ms.saturating_sub(z.session_start_ms);
            z.kraftstoff.frame_aufnehmen(frame.fuel_level, session_ms);
        }

        // Benachrichtigung ausserhalb des Locks: der Beobachter darf
        // sofort snapshot() aufrufen ohne zu verklemmen
        if let Some(runde) = runde_gewechselt {
            if let Some(tx) = self.runden_beobachter.lock().as_ref() {
                if tx.try_send(runde).is_err() {
                    tracing::debug!(runde, "Rundenwechsel-Kanal voll oder geschlossen");
                }
            }
        }
    }

    fn ist_neues_rennen(z: &AnalyzerZustand, frame: &Frame) -> bool {
        if !z.session_aktiv {
            return true;
        }
        if frame.car_code != z.auto_code {
            return true;
        }
        if frame.lap_count == 0 && z.letzte_runde > 0 {
            return true;
        }
        if i32::from(z.letzte_runde) - i32::from(frame.lap_count) > 1 {
            return true;
        }
        if frame.best_lap_ms == -1 && z.letzter_best_lap > 0 {
            return true;
        }
        // Auffuellen auf praktisch voll: Boxenstopp oder neuer Stint
        if frame.fuel_capacity > 0.0
            && frame.fuel_level >= frame.fuel_capacity * 0.99
            && z.letzter_fuellstand < frame.fuel_capacity * 0.95
        {
            return true;
        }
        false
    }

    /// Erstellt einen Snapshot mit der Prozessuhr
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_mit_zeit(self.jetzt_ms())
    }

    /// Erstellt einen konsistenten Snapshot zum Zeitpunkt `jetzt_ms`
    pub fn snapshot_mit_zeit(&self, jetzt_ms: u64) -> Snapshot {
        let z = self.zustand.read();

        let Some(frame) = &z.letzter_frame else {
            return Snapshot::default();
        };

        let lap_delta_ms = if frame.last_lap_ms > 0 && frame.best_lap_ms > 0 {
            frame.last_lap_ms - frame.best_lap_ms
        } else {
            0
        };

        let frames = z.frames_in_runde.max(1) as f32;
        let session_ms = if z.session_aktiv {
            jetzt_ms.saturating_sub(z.session_start_ms)
        } else {
            0
        };

        Snapshot {
            lap_count: frame.lap_count,
            laps_total: frame.laps_total,
            last_lap_ms: frame.last_lap_ms,
            best_lap_ms: frame.best_lap_ms,
            lap_delta_ms,
            pace_trend: pace_bewerten(&z.recent_laps),
            recent_lap_times: z.recent_laps.iter().copied().collect(),
            fuel_level: frame.fuel_level,
            fuel_capacity: frame.fuel_capacity,
            fuel_burn_per_lap: z.kraftstoff.verbrauch_pro_runde(),
            estimated_laps_remaining: z.kraftstoff.geschaetzte_runden(
                frame.fuel_level,
                session_ms,
                frame.best_lap_ms,
                frame.last_lap_ms,
            ),
            fuel_usage: z.kraftstoff.bestimmt(),
            tyre_temps: frame.tyre_temps,
            tyre_trends: [
                z.reifen[0].trend(),
                z.reifen[1].trend(),
                z.reifen[2].trend(),
                z.reifen[3].trend(),
            ],
            rev_limiter_fraction: z.begrenzer_frames as f32 / frames,
            tcs_fraction: z.tcs_frames as f32 / frames,
            asm_fraction: z.asm_frames as f32 / frames,
            current_speed_kmh: frame.speed_kmh,
            top_speed_kmh: z.top_speed_kmh,
            current_gear: frame.current_gear,
            suggested_gear: frame.suggested_gear,
            engine_rpm: frame.engine_rpm,
            car_code: frame.car_code,
            on_track: frame.auf_strecke(),
            session_duration_ms: session_ms,
            current_lap_start_ms: z.runden_start_ms.saturating_sub(z.session_start_ms),
        }
    }
}

/// Pace ueber die juengsten drei Runden: streng monoton fallend =
/// `Improving`, streng monoton steigend = `Degrading`, sonst `Consistent`.
fn pace_bewerten(recent: &VecDeque<i32>) -> PaceTrend {
    if recent.len() < PACE_FENSTER {
        return PaceTrend::Consistent;
    }
    let fenster: Vec<i32> = recent.iter().rev().take(PACE_FENSTER).rev().copied().collect();
    if fenster.windows(2).all(|p| p[1] < p[0]) {
        PaceTrend::Improving
    } else if fenster.windows(2).all(|p| p[1] > p[0]) {
        PaceTrend::Degrading
    } else {
        PaceTrend::Consistent
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::{FrameFlags, FuelUsage, TyreTrend};

    fn frame() -> Frame {
        Frame {
            packet_id: 0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            rotation: [0.0; 3],
            body_height: 0.0,
            engine_rpm: 5000.0,
            fuel_level: 40.0,
            fuel_capacity: 60.0,
            speed_kmh: 180.0,
            turbo_boost: 1.0,
            oil_pressure: 4.0,
            water_temp: 85.0,
            oil_temp: 95.0,
            tyre_temps: [75.0; 4],
            lap_count: 1,
            laps_total: 10,
            best_lap_ms: -1,
            last_lap_ms: -1,
            rev_warn_rpm: 7000,
            rev_cutoff_rpm: 7500,
            calc_max_speed: 280,
            flags: FrameFlags::ON_TRACK,
            current_gear: 3,
            suggested_gear: 15,
            throttle: 80.0,
            brake: 0.0,
            car_code: 1000,
        }
    }

    /// Fahrt eine Runde zu Ende: Rundenzaehler hoch, Zeiten setzen
    fn runde_abschliessen(
        analyzer: &Analyzer,
        runde: i16,
        letzte_ms: i32,
        beste_ms: i32,
        fuellstand: f32,
        jetzt_ms: u64,
    ) {
        let mut f = frame();
        f.lap_count = runde;
        f.last_lap_ms = letzte_ms;
        f.best_lap_ms = beste_ms;
        f.fuel_level = fuellstand;
        analyzer.frame_aufnehmen_mit_zeit(&f, jetzt_ms);
    }

    #[test]
    fn erster_frame_startet_session() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 1_000);
        let s = analyzer.snapshot_mit_zeit(2_000);
        assert!(s.on_track);
        assert_eq!(s.lap_count, 1);
        assert_eq!(s.session_duration_ms, 1_000);
    }

    #[test]
    fn ohne_frames_liefert_default_snapshot() {
        let analyzer = Analyzer::neu();
        let s = analyzer.snapshot_mit_zeit(5_000);
        assert!(!s.on_track);
        assert_eq!(s.best_lap_ms, -1);
        assert!(s.estimated_laps_remaining.is_infinite());
    }

    #[test]
    fn rundenwechsel_fuellt_fifo() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        for runde in 2..=8i16 {
            runde_abschliessen(
                &analyzer,
                runde,
                100_000 + i32::from(runde),
                100_000,
                40.0,
                u64::try_from(runde).unwrap() * 100_000,
            );
        }
        let s = analyzer.snapshot_mit_zeit(900_000);
        // FIFO ist auf 5 begrenzt, aelteste fliegen raus
        assert_eq!(s.recent_lap_times.len(), 5);
        assert_eq!(s.recent_lap_times[4], 100_008);
        assert_eq!(s.recent_lap_times[0], 100_004);
    }

    #[test]
    fn pace_improving_bei_fallenden_zeiten() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        let zeiten = [103_000, 102_000, 101_000];
        for (i, zeit) in zeiten.iter().enumerate() {
            runde_abschliessen(
                &analyzer,
                2 + i as i16,
                *zeit,
                101_000,
                40.0,
                (i as u64 + 1) * 100_000,
            );
        }
        assert_eq!(analyzer.snapshot_mit_zeit(400_000).pace_trend, PaceTrend::Improving);
    }

    #[test]
    fn pace_degrading_bei_steigenden_zeiten() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        for (i, zeit) in [101_000, 102_000, 103_000].iter().enumerate() {
            runde_abschliessen(
                &analyzer,
                2 + i as i16,
                *zeit,
                101_000,
                40.0,
                (i as u64 + 1) * 100_000,
            );
        }
        assert_eq!(analyzer.snapshot_mit_zeit(400_000).pace_trend, PaceTrend::Degrading);
    }

    #[test]
    fn pace_consistent_unter_drei_runden() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 40.0, 100_000);
        runde_abschliessen(&analyzer, 3, 100_000, 100_000, 40.0, 200_000);
        assert_eq!(
            analyzer.snapshot_mit_zeit(300_000).pace_trend,
            PaceTrend::Consistent
        );
    }

    #[test]
    fn lap_delta_braucht_beide_zeiten() {
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.last_lap_ms = 102_350;
        f.best_lap_ms = -1;
        analyzer.frame_aufnehmen_mit_zeit(&f, 0);
        assert_eq!(analyzer.snapshot_mit_zeit(1_000).lap_delta_ms, 0);

        f.best_lap_ms = 101_823;
        analyzer.frame_aufnehmen_mit_zeit(&f, 100);
        assert_eq!(analyzer.snapshot_mit_zeit(1_000).lap_delta_ms, 527);
    }

    #[test]
    fn autowechsel_setzt_zurueck() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.0, 100_000);

        let mut f = frame();
        f.car_code = 2000;
        f.lap_count = 1;
        analyzer.frame_aufnehmen_mit_zeit(&f, 200_000);

        let s = analyzer.snapshot_mit_zeit(200_000);
        assert!(s.recent_lap_times.is_empty());
        assert_eq!(s.session_duration_ms, 0);
        assert_eq!(s.fuel_usage, FuelUsage::Undetermined);
    }

    #[test]
    fn rundenzaehler_null_nach_fortschritt_setzt_zurueck() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.0, 100_000);

        let mut f = frame();
        f.lap_count = 0;
        analyzer.frame_aufnehmen_mit_zeit(&f, 150_000);
        assert!(analyzer.snapshot_mit_zeit(150_000).recent_lap_times.is_empty());
    }

    #[test]
    fn best_lap_sentinel_rueckfall_setzt_zurueck() {
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.best_lap_ms = 101_000;
        analyzer.frame_aufnehmen_mit_zeit(&f, 0);
        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.0, 100_000);

        let mut f2 = frame();
        f2.best_lap_ms = -1;
        f2.lap_count = 2;
        analyzer.frame_aufnehmen_mit_zeit(&f2, 150_000);
        assert!(analyzer.snapshot_mit_zeit(150_000).recent_lap_times.is_empty());
    }

    #[test]
    fn auftanken_auf_voll_setzt_zurueck() {
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.fuel_level = 30.0; // < 95 % von 60
        analyzer.frame_aufnehmen_mit_zeit(&f, 0);

        f.fuel_level = 59.5; // >= 99 % von 60
        analyzer.frame_aufnehmen_mit_zeit(&f, 10_000);
        let s = analyzer.snapshot_mit_zeit(10_000);
        assert_eq!(s.session_duration_ms, 0, "Reset muss die Session neu starten");
    }

    #[test]
    fn pause_setzt_nicht_zurueck() {
        let analyzer = Analyzer::neu();
        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.5, 100_000);

        // Off-Track (Menue) und Rueckkehr ohne Reset-Bedingung
        let mut pause = frame();
        pause.flags = 0;
        analyzer.frame_aufnehmen_mit_zeit(&pause, 110_000);

        let mut zurueck = frame();
        zurueck.lap_count = 2;
        zurueck.fuel_level = 39.4;
        analyzer.frame_aufnehmen_mit_zeit(&zurueck, 120_000);

        let s = analyzer.snapshot_mit_zeit(120_000);
        assert_eq!(s.recent_lap_times.len(), 1, "Pause darf die FIFO nicht leeren");
        assert!(s.on_track);
    }

    #[test]
    fn assist_anteile_pro_runde() {
        let analyzer = Analyzer::neu();
        // 10 Frames, davon 4 mit TCS und 2 mit Begrenzer
        for i in 0..10u64 {
            let mut f = frame();
            if i < 4 {
                f.flags |= FrameFlags::TCS_ACTIVE;
            }
            if i < 2 {
                f.flags |= FrameFlags::REV_LIMITER;
            }
            analyzer.frame_aufnehmen_mit_zeit(&f, i * 16);
        }
        let s = analyzer.snapshot_mit_zeit(200);
        assert!((s.tcs_fraction - 0.4).abs() < 1e-6);
        assert!((s.rev_limiter_fraction - 0.2).abs() < 1e-6);
        assert_eq!(s.asm_fraction, 0.0);
    }

    #[test]
    fn rundenwechsel_setzt_akkumulatoren_zurueck() {
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.flags |= FrameFlags::TCS_ACTIVE;
        f.speed_kmh = 250.0;
        analyzer.frame_aufnehmen_mit_zeit(&f, 0);

        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.5, 100_000);
        let s = analyzer.snapshot_mit_zeit(100_000);
        assert!(s.tcs_fraction < 0.5, "Anteil gehoert zur neuen Runde");
        assert_eq!(s.top_speed_kmh, 180.0);
    }

    #[test]
    fn fuel_szenario_kaltstart() {
        // 30 s fallender Fuellstand: Erkennung bei t=5s, nach 3 Runden
        // positive Rate und endliche Restrunden
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.best_lap_ms = 100_000;
        for zehntel in 0..300u64 {
            f.fuel_level = 40.0 - zehntel as f32 / 300.0;
            analyzer.frame_aufnehmen_mit_zeit(&f, zehntel * 100);
        }
        assert_eq!(analyzer.snapshot_mit_zeit(30_000).fuel_usage, FuelUsage::On);

        for runde in 2..=4i16 {
            runde_abschliessen(
                &analyzer,
                runde,
                100_000,
                100_000,
                40.0 - f64::from(runde) as f32,
                30_000 + u64::try_from(runde).unwrap() * 100_000,
            );
        }
        let s = analyzer.snapshot_mit_zeit(500_000);
        assert!(s.fuel_burn_per_lap > 0.0);
        assert!(s.estimated_laps_remaining.is_finite());
    }

    #[test]
    fn fuel_szenario_konstant_aus() {
        let analyzer = Analyzer::neu();
        let f = frame();
        for sekunde in 0..60u64 {
            analyzer.frame_aufnehmen_mit_zeit(&f, sekunde * 1_000);
        }
        let s = analyzer.snapshot_mit_zeit(60_000);
        assert_eq!(s.fuel_usage, FuelUsage::Off);
        assert_eq!(s.fuel_burn_per_lap, 0.0);
        assert!(s.estimated_laps_remaining.is_infinite());
    }

    #[test]
    fn reifen_trend_im_snapshot() {
        let analyzer = Analyzer::neu();
        let mut f = frame();
        f.tyre_temps = [80.0, 80.0, 80.0, 80.0];
        analyzer.frame_aufnehmen_mit_zeit(&f, 0);
        f.tyre_temps = [85.0, 80.0, 80.0, 75.0];
        analyzer.frame_aufnehmen_mit_zeit(&f, 2_000);

        let s = analyzer.snapshot_mit_zeit(2_000);
        assert_eq!(s.tyre_trends[0], TyreTrend::Rising);
        assert_eq!(s.tyre_trends[1], TyreTrend::Stable);
        assert_eq!(s.tyre_trends[3], TyreTrend::Cooling);
    }

    #[tokio::test]
    async fn rundenbeobachter_wird_benachrichtigt() {
        let analyzer = Analyzer::neu();
        let (tx, mut rx) = mpsc::channel(4);
        analyzer.runden_beobachter_registrieren(tx);

        analyzer.frame_aufnehmen_mit_zeit(&frame(), 0);
        assert!(rx.try_recv().is_err(), "Session-Start ist kein Rundenwechsel");

        runde_abschliessen(&analyzer, 2, 101_000, 101_000, 39.5, 100_000);
        assert_eq!(rx.try_recv().unwrap(), 2);

        // Beobachter sieht den Zustand NACH der Buchfuehrung
        let s = analyzer.snapshot_mit_zeit(100_000);
        assert_eq!(s.recent_lap_times, vec![101_000]);
    }
}
