//! Frame-Fan-out und Broadcast-Drossel
//!
//! Eine einzelne Stufe konsumiert den Frames-Kanal des Empfaengers und
//! verteilt jeden Frame: Analyzer und Session-Logger bekommen die volle
//! Rate (~60 Hz), der Client-Broadcast wird auf `BROADCAST_HZ` gedrosselt.
//! Die Drossel ist monoton und global – nicht pro Client – damit alle
//! Clients denselben juengsten Frame im selben Takt sehen.

use pitwall_core::Frame;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Ziel-Frequenz des Client-Broadcasts
pub const BROADCAST_HZ: u32 = 30;

// ---------------------------------------------------------------------------
// BroadcastDrossel
// ---------------------------------------------------------------------------

/// Monotone Drossel: gibt frei wenn seit der letzten Freigabe mindestens
/// `1000 / BROADCAST_HZ` Millisekunden vergangen sind.
#[derive(Debug)]
pub struct BroadcastDrossel {
    intervall: Duration,
    letzte_freigabe: Option<Instant>,
}

impl BroadcastDrossel {
    /// Erstellt eine Drossel fuer die gegebene Ziel-Frequenz
    pub fn neu(hz: u32) -> Self {
        Self {
            intervall: Duration::from_millis(1000 / u64::from(hz.max(1))),
            letzte_freigabe: None,
        }
    }

    /// Prueft ob zum Zeitpunkt `jetzt` gesendet werden darf und merkt
    /// sich die Freigabe. Der erste Aufruf gibt immer frei.
    pub fn freigeben(&mut self, jetzt: Instant) -> bool {
        match self.letzte_freigabe {
            Some(letzte) if jetzt.duration_since(letzte) < self.intervall => false,
            _ => {
                self.letzte_freigabe = Some(jetzt);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameVerteiler
// ---------------------------------------------------------------------------

/// Verteilt Frames an Analyzer, Logger und den gedrosselten Client-Kanal
pub struct FrameVerteiler {
    analyzer_tx: mpsc::Sender<Arc<Frame>>,
    logger_tx: mpsc::Sender<Arc<Frame>>,
    client_tx: mpsc::Sender<Arc<Frame>>,
    drossel: BroadcastDrossel,
}

impl FrameVerteiler {
    /// Erstellt einen neuen Verteiler mit der Standard-Broadcast-Frequenz
    pub fn neu(
        analyzer_tx: mpsc::Sender<Arc<Frame>>,
        logger_tx: mpsc::Sender<Arc<Frame>>,
        client_tx: mpsc::Sender<Arc<Frame>>,
    ) -> Self {
        Self {
            analyzer_tx,
            logger_tx,
            client_tx,
            drossel: BroadcastDrossel::neu(BROADCAST_HZ),
        }
    }

    /// Konsumiert den Frames-Kanal bis er schliesst oder das
    /// Shutdown-Signal kommt.
    pub async fn starten(
        mut self,
        mut frames_rx: mpsc::Receiver<Arc<Frame>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!("Frame-Verteiler gestartet");

        loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    match frame {
                        Some(frame) => self.frame_verteilen(frame),
                        None => {
                            tracing::info!("Frames-Kanal geschlossen, Verteiler endet");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Frame-Verteiler: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }
    }

    /// Verteilt einen einzelnen Frame (Hot Path, nie blockierend).
    ///
    /// Analyzer und Logger sind drop-newest: ein voller Kanal heisst der
    /// Konsument haengt, und Echtzeitdaten nachzureichen hilft niemandem.
    fn frame_verteilen(&mut self, frame: Arc<Frame>) {
        if self.analyzer_tx.try_send(Arc::clone(&frame)).is_err() {
            tracing::trace!("Analyzer-Kanal voll, Frame verworfen");
        }
        if self.logger_tx.try_send(Arc::clone(&frame)).is_err() {
            tracing::trace!("Logger-Kanal voll, Frame verworfen");
        }
        if self.drossel.freigeben(Instant::now()) {
            if self.client_tx.try_send(frame).is_err() {
                tracing::trace!("Client-Kanal voll, Frame verworfen");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::FrameFlags;

    fn test_frame(packet_id: u32) -> Arc<Frame> {
        Arc::new(Frame {
            packet_id,
            position: [0.0; 3],
            velocity: [0.0; 3],
            rotation: [0.0; 3],
            body_height: 0.0,
            engine_rpm: 0.0,
            fuel_level: 0.0,
            fuel_capacity: 0.0,
            speed_kmh: 0.0,
            turbo_boost: 1.0,
            oil_pressure: 0.0,
            water_temp: 0.0,
            oil_temp: 0.0,
            tyre_temps: [0.0; 4],
            lap_count: 0,
            laps_total: 0,
            best_lap_ms: -1,
            last_lap_ms: -1,
            rev_warn_rpm: 0,
            rev_cutoff_rpm: 0,
            calc_max_speed: 0,
            flags: FrameFlags::ON_TRACK,
            current_gear: 1,
            suggested_gear: 15,
            throttle: 0.0,
            brake: 0.0,
            car_code: 0,
        })
    }

    #[test]
    fn drossel_erster_aufruf_gibt_frei() {
        let mut drossel = BroadcastDrossel::neu(30);
        assert!(drossel.freigeben(Instant::now()));
    }

    #[test]
    fn drossel_haelt_intervall_ein() {
        let mut drossel = BroadcastDrossel::neu(30); // ~33 ms
        let start = Instant::now();
        assert!(drossel.freigeben(start));
        assert!(!drossel.freigeben(start + Duration::from_millis(10)));
        assert!(!drossel.freigeben(start + Duration::from_millis(32)));
        assert!(drossel.freigeben(start + Duration::from_millis(34)));
        assert!(!drossel.freigeben(start + Duration::from_millis(40)));
    }

    #[test]
    fn drossel_60hz_frames_auf_30hz() {
        // 60 Frames in 16.6-ms-Abstaenden: hoechstens jeder zweite kommt durch
        let mut drossel = BroadcastDrossel::neu(30);
        let start = Instant::now();
        let freigaben = (0..60)
            .filter(|i| drossel.freigeben(start + Duration::from_micros(16_666 * i)))
            .count();
        assert!(freigaben <= 31, "zu viele Freigaben: {freigaben}");
        assert!(freigaben >= 29, "zu wenige Freigaben: {freigaben}");
    }

    #[tokio::test]
    async fn analyzer_und_logger_bekommen_volle_rate() {
        let (analyzer_tx, mut analyzer_rx) = mpsc::channel(64);
        let (logger_tx, mut logger_rx) = mpsc::channel(64);
        let (client_tx, _client_rx) = mpsc::channel(64);

        let mut verteiler = FrameVerteiler::neu(analyzer_tx, logger_tx, client_tx);
        for i in 0..10 {
            verteiler.frame_verteilen(test_frame(i));
        }

        for i in 0..10 {
            assert_eq!(analyzer_rx.try_recv().unwrap().packet_id, i);
            assert_eq!(logger_rx.try_recv().unwrap().packet_id, i);
        }
    }

    #[tokio::test]
    async fn client_kanal_ist_gedrosselt() {
        let (analyzer_tx, _a) = mpsc::channel(64);
        let (logger_tx, _l) = mpsc::channel(64);
        let (client_tx, mut client_rx) = mpsc::channel(64);

        // Back-to-back ohne Wartezeit: nur der erste Frame passiert die Drossel
        let mut verteiler = FrameVerteiler::neu(analyzer_tx, logger_tx, client_tx);
        for i in 0..5 {
            verteiler.frame_verteilen(test_frame(i));
        }

        assert_eq!(client_rx.try_recv().unwrap().packet_id, 0);
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn voller_analyzer_kanal_blockiert_nicht() {
        let (analyzer_tx, _analyzer_rx) = mpsc::channel(1);
        let (logger_tx, _l) = mpsc::channel(64);
        let (client_tx, _c) = mpsc::channel(64);

        let mut verteiler = FrameVerteiler::neu(analyzer_tx, logger_tx, client_tx);
        // Darf trotz vollem Kanal nicht haengen
        for i in 0..100 {
            verteiler.frame_verteilen(test_frame(i));
        }
    }
}
