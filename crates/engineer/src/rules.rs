//! Callout-Regelwerk
//!
//! Tabellengetriebene Regeln in zwei Saetzen: `periodisch` laeuft auf dem
//! 1-Hz-Takt, `runden` nur beim Rundenwechsel. Jede Regel traegt Typ,
//! Prioritaet, Mindest-Verbosity und Cooldown; der Evaluator ist eine
//! reine Funktion ueber dem Snapshot und damit isoliert testbar.
//!
//! Rundenregeln haben Cooldown 0 – sie sind durch den Rundentakt
//! natuerlich begrenzt.

use pitwall_core::{Callout, CalloutTyp, PaceTrend, Prioritaet, Snapshot, TyreTrend};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Schwelle fuer den Fuel-Low-Alarm (verbleibende Runden)
const FUEL_LOW_RUNDEN: f64 = 3.0;

/// Reifentemperatur-Alarmschwelle in Grad Celsius (strikt groesser)
const REIFEN_ALARM_GRAD: f32 = 100.0;

/// Rundenzeit-Differenz ab der ein Delta gemeldet wird (strikt groesser)
const DELTA_SCHWELLE_MS: i32 = 500;

/// Ergebnis eines Regel-Evaluators
struct RegelTreffer {
    daten: serde_json::Value,
    nachricht: String,
}

/// Eine Callout-Regel
struct Regel {
    typ: CalloutTyp,
    prioritaet: Prioritaet,
    min_verbosity: u8,
    cooldown: Duration,
    eval: fn(&Snapshot) -> Option<RegelTreffer>,
}

// ---------------------------------------------------------------------------
// Formatierung
// ---------------------------------------------------------------------------

/// Formatiert eine Rundenzeit als `MM:SS.mmm`
pub fn runde_formatieren(ms: i32) -> String {
    let ms = ms.max(0);
    let minuten = ms / 60_000;
    let sekunden = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{minuten:02}:{sekunden:02}.{millis:03}")
}

/// Formatiert eine Zeitdifferenz als `±S.sss`-Sekundenwert (z.B. `+0.527s`)
pub fn delta_formatieren(ms: i32) -> String {
    let vorzeichen = if ms < 0 { '-' } else { '+' };
    let betrag = ms.unsigned_abs();
    format!("{vorzeichen}{}.{:03}s", betrag / 1_000, betrag % 1_000)
}

/// Name einer Reifenecke fuer Meldungen
fn ecken_name(index: usize) -> &'static str {
    match index {
        0 => "front left",
        1 => "front right",
        2 => "rear left",
        _ => "rear right",
    }
}

// ---------------------------------------------------------------------------
// Periodische Regeln (1-Hz-Takt)
// ---------------------------------------------------------------------------

fn fuel_low_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.fuel_usage != pitwall_core::FuelUsage::On
        || s.fuel_burn_per_lap <= 0.0
        || !s.estimated_laps_remaining.is_finite()
        || s.estimated_laps_remaining >= FUEL_LOW_RUNDEN
    {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({
            "estimatedLaps": s.estimated_laps_remaining,
            "fuelLevel": s.fuel_level,
            "burnRate": s.fuel_burn_per_lap,
        }),
        nachricht: format!(
            "Fuel critical: about {:.1} laps remaining.",
            s.estimated_laps_remaining
        ),
    })
}

fn tyre_temp_high_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    let heisse: Vec<(usize, f32)> = s
        .tyre_temps
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, temp)| *temp > REIFEN_ALARM_GRAD)
        .collect();
    let (heisseste_ecke, heisseste) = heisse
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    Some(RegelTreffer {
        daten: serde_json::json!({
            "corners": heisse.iter().map(|(i, t)| {
                serde_json::json!({"corner": ecken_name(*i), "temp": t})
            }).collect::<Vec<_>>(),
            "temps": s.tyre_temps,
        }),
        nachricht: format!(
            "Tyre temperature critical: {} at {:.0} degrees.",
            ecken_name(heisseste_ecke),
            heisseste
        ),
    })
}

fn tyre_trend_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    let steigend: Vec<&str> = s
        .tyre_trends
        .iter()
        .enumerate()
        .filter(|(_, trend)| **trend == TyreTrend::Rising)
        .map(|(i, _)| ecken_name(i))
        .collect();
    if steigend.is_empty() {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({
            "rising": steigend,
            "temps": s.tyre_temps,
        }),
        nachricht: format!("Tyre temperatures rising on {}.", steigend.join(", ")),
    })
}

// ---------------------------------------------------------------------------
// Rundenregeln (bei Rundenwechsel)
// ---------------------------------------------------------------------------

fn lap_delta_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.last_lap_ms <= 0 || s.best_lap_ms <= 0 || s.lap_delta_ms.abs() <= DELTA_SCHWELLE_MS {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({
            "lastLapMs": s.last_lap_ms,
            "bestLapMs": s.best_lap_ms,
            "deltaMs": s.lap_delta_ms,
        }),
        nachricht: format!(
            "Last lap {}, {} to your best.",
            runde_formatieren(s.last_lap_ms),
            delta_formatieren(s.lap_delta_ms)
        ),
    })
}

fn lap_summary_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.last_lap_ms <= 0 {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({
            "lapCount": s.lap_count,
            "lastLapMs": s.last_lap_ms,
            "topSpeedKmh": s.top_speed_kmh,
        }),
        nachricht: format!(
            "Lap {} complete in {}.",
            s.lap_count.saturating_sub(1).max(1),
            runde_formatieren(s.last_lap_ms)
        ),
    })
}

fn fuel_estimate_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.fuel_usage != pitwall_core::FuelUsage::On || s.fuel_burn_per_lap <= 0.0 {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({
            "fuelLevel": s.fuel_level,
            "burnRate": s.fuel_burn_per_lap,
            "estimatedLaps": s.estimated_laps_remaining,
        }),
        nachricht: if s.estimated_laps_remaining.is_finite() {
            format!(
                "Fuel at {:.1} litres, roughly {:.1} laps in the tank.",
                s.fuel_level, s.estimated_laps_remaining
            )
        } else {
            format!("Fuel at {:.1} litres.", s.fuel_level)
        },
    })
}

fn rev_limiter_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.rev_limiter_fraction <= 0.15 {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({ "fraction": s.rev_limiter_fraction }),
        nachricht: format!(
            "You were on the rev limiter {:.0} percent of that lap, short shift for pace.",
            s.rev_limiter_fraction * 100.0
        ),
    })
}

fn tcs_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.tcs_fraction <= 0.10 {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({ "fraction": s.tcs_fraction }),
        nachricht: format!(
            "Traction control was working {:.0} percent of that lap.",
            s.tcs_fraction * 100.0
        ),
    })
}

fn asm_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.asm_fraction <= 0.10 {
        return None;
    }
    Some(RegelTreffer {
        daten: serde_json::json!({ "fraction": s.asm_fraction }),
        nachricht: format!(
            "Stability management stepped in {:.0} percent of that lap.",
            s.asm_fraction * 100.0
        ),
    })
}

fn race_progress_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.laps_total <= 0 {
        return None;
    }
    let verbleibend = i32::from(s.laps_total) - i32::from(s.lap_count);
    if s.lap_count % 5 != 0 && verbleibend > 3 {
        return None;
    }
    let nachricht = if verbleibend <= 3 {
        format!(
            "Lap {} of {}, {} to go.",
            s.lap_count, s.laps_total, verbleibend.max(0)
        )
    } else {
        format!("Lap {} of {}.", s.lap_count, s.laps_total)
    };
    Some(RegelTreffer {
        daten: serde_json::json!({
            "lapCount": s.lap_count,
            "lapsTotal": s.laps_total,
            "remaining": verbleibend,
        }),
        nachricht,
    })
}

fn pace_summary_bewerten(s: &Snapshot) -> Option<RegelTreffer> {
    if s.recent_lap_times.len() < 3 {
        return None;
    }
    let beschreibung = match s.pace_trend {
        PaceTrend::Improving => "improving",
        PaceTrend::Degrading => "dropping off",
        PaceTrend::Consistent => "consistent",
    };
    Some(RegelTreffer {
        daten: serde_json::json!({
            "trend": s.pace_trend,
            "recentLapTimes": s.recent_lap_times,
        }),
        nachricht: format!(
            "Your pace is {beschreibung}, last lap {}.",
            runde_formatieren(s.last_lap_ms)
        ),
    })
}

// ---------------------------------------------------------------------------
// Regeltabellen
// ---------------------------------------------------------------------------

const PERIODISCHE_REGELN: &[Regel] = &[
    Regel {
        typ: CalloutTyp::FuelLow,
        prioritaet: Prioritaet::Critical,
        min_verbosity: 1,
        cooldown: Duration::from_secs(60),
        eval: fuel_low_bewerten,
    },
    Regel {
        typ: CalloutTyp::TyreTempHigh,
        prioritaet: Prioritaet::Critical,
        min_verbosity: 1,
        cooldown: Duration::from_secs(30),
        eval: tyre_temp_high_bewerten,
    },
    Regel {
        typ: CalloutTyp::TyreTrend,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::from_secs(60),
        eval: tyre_trend_bewerten,
    },
];

const RUNDEN_REGELN: &[Regel] = &[
    Regel {
        typ: CalloutTyp::LapDelta,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: lap_delta_bewerten,
    },
    Regel {
        typ: CalloutTyp::LapSummary,
        prioritaet: Prioritaet::Info,
        min_verbosity: 3,
        cooldown: Duration::ZERO,
        eval: lap_summary_bewerten,
    },
    Regel {
        typ: CalloutTyp::FuelEstimate,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: fuel_estimate_bewerten,
    },
    Regel {
        typ: CalloutTyp::RevLimiter,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: rev_limiter_bewerten,
    },
    Regel {
        typ: CalloutTyp::TcsIntervention,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: tcs_bewerten,
    },
    Regel {
        typ: CalloutTyp::AsmIntervention,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: asm_bewerten,
    },
    Regel {
        typ: CalloutTyp::RaceProgress,
        prioritaet: Prioritaet::Normal,
        min_verbosity: 2,
        cooldown: Duration::ZERO,
        eval: race_progress_bewerten,
    },
    Regel {
        typ: CalloutTyp::PaceSummary,
        prioritaet: Prioritaet::Info,
        min_verbosity: 3,
        cooldown: Duration::ZERO,
        eval: pace_summary_bewerten,
    },
];

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Wertet die Regeltabellen mit Verbosity- und Cooldown-Gate aus.
///
/// Die Cooldown-Map gehoert exklusiv dieser Instanz; der Aufrufer ist der
/// einzelne Scheduler-Task.
pub struct CalloutEngine {
    verbosity: u8,
    letzte_ausloesung: HashMap<CalloutTyp, Instant>,
}

impl CalloutEngine {
    /// Erstellt eine Engine mit der gegebenen Verbosity-Stufe (1–3)
    pub fn neu(verbosity: u8) -> Self {
        Self {
            verbosity: verbosity.clamp(1, 3),
            letzte_ausloesung: HashMap::new(),
        }
    }

    /// Setzt die Verbosity-Stufe (wird auf 1–3 begrenzt)
    pub fn verbosity_setzen(&mut self, verbosity: u8) {
        self.verbosity = verbosity.clamp(1, 3);
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Wertet die periodischen Regeln aus (1-Hz-Takt)
    pub fn bewerten(&mut self, snapshot: &Snapshot, jetzt: Instant) -> Vec<Callout> {
        self.regeln_auswerten(PERIODISCHE_REGELN, snapshot, jetzt)
    }

    /// Wertet die Rundenregeln aus (bei Rundenwechsel)
    pub fn runde_abgeschlossen(&mut self, snapshot: &Snapshot, jetzt: Instant) -> Vec<Callout> {
        self.regeln_auswerten(RUNDEN_REGELN, snapshot, jetzt)
    }

    fn regeln_auswerten(
        &mut self,
        regeln: &[Regel],
        snapshot: &Snapshot,
        jetzt: Instant,
    ) -> Vec<Callout> {
        let mut callouts = Vec::new();

        for regel in regeln {
            if !regel.prioritaet.zugelassen(self.verbosity) || self.verbosity < regel.min_verbosity
            {
                continue;
            }
            if !self.cooldown_abgelaufen(regel, jetzt) {
                continue;
            }
            let Some(treffer) = (regel.eval)(snapshot) else {
                continue;
            };

            self.letzte_ausloesung.insert(regel.typ, jetzt);
            tracing::debug!(typ = regel.typ.name(), "Callout ausgeloest");
            callouts.push(Callout {
                typ: regel.typ,
                prioritaet: regel.prioritaet,
                daten: treffer.daten,
                nachricht: treffer.nachricht,
                zeitstempel_ms: chrono::Utc::now().timestamp_millis() as u64,
            });
        }

        callouts
    }

    fn cooldown_abgelaufen(&self, regel: &Regel, jetzt: Instant) -> bool {
        if regel.cooldown.is_zero() {
            return true;
        }
        match self.letzte_ausloesung.get(&regel.typ) {
            Some(letzte) => jetzt.duration_since(*letzte) >= regel.cooldown,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::FuelUsage;

    fn snapshot() -> Snapshot {
        Snapshot::default()
    }

    #[test]
    fn rundenzeit_formatierung() {
        assert_eq!(runde_formatieren(102_350), "01:42.350");
        assert_eq!(runde_formatieren(59_999), "00:59.999");
        assert_eq!(runde_formatieren(600_001), "10:00.001");
    }

    #[test]
    fn delta_formatierung() {
        assert_eq!(delta_formatieren(527), "+0.527s");
        assert_eq!(delta_formatieren(-1_204), "-1.204s");
        assert_eq!(delta_formatieren(0), "+0.000s");
    }

    #[test]
    fn leerer_snapshot_loest_nichts_aus() {
        let mut engine = CalloutEngine::neu(3);
        let jetzt = Instant::now();
        assert!(engine.bewerten(&snapshot(), jetzt).is_empty());
        assert!(engine.runde_abgeschlossen(&snapshot(), jetzt).is_empty());
    }

    #[test]
    fn tyre_temp_cooldown_fenster() {
        // Szenario: Reifen dauerhaft auf 105 Grad. Erster Tick feuert,
        // danach Stille bis der 30-s-Cooldown ablaeuft.
        let mut engine = CalloutEngine::neu(1);
        let mut s = snapshot();
        s.tyre_temps = [105.0, 90.0, 90.0, 90.0];

        let start = Instant::now();
        let erster = engine.bewerten(&s, start);
        assert_eq!(erster.len(), 1);
        assert_eq!(erster[0].typ, CalloutTyp::TyreTempHigh);
        assert!(erster[0].nachricht.contains("front left"));

        for sekunde in 1..30 {
            let tick = start + Duration::from_secs(sekunde);
            assert!(
                engine.bewerten(&s, tick).is_empty(),
                "Sekunde {sekunde} darf nicht feuern"
            );
        }

        let nach_cooldown = engine.bewerten(&s, start + Duration::from_secs(30));
        assert_eq!(nach_cooldown.len(), 1);
    }

    #[test]
    fn genau_100_grad_feuert_nicht() {
        let mut engine = CalloutEngine::neu(1);
        let mut s = snapshot();
        s.tyre_temps = [100.0; 4];
        assert!(engine.bewerten(&s, Instant::now()).is_empty());
    }

    #[test]
    fn fuel_low_braucht_erkennung_und_rate() {
        let mut engine = CalloutEngine::neu(1);
        let mut s = snapshot();
        s.estimated_laps_remaining = 2.0;
        s.fuel_burn_per_lap = 1.5;

        // Erkennung nicht auf On: kein Alarm
        s.fuel_usage = FuelUsage::Off;
        assert!(engine.bewerten(&s, Instant::now()).is_empty());

        s.fuel_usage = FuelUsage::On;
        let callouts = engine.bewerten(&s, Instant::now());
        assert_eq!(callouts.len(), 1);
        assert_eq!(callouts[0].typ, CalloutTyp::FuelLow);
        assert_eq!(callouts[0].prioritaet, Prioritaet::Critical);
    }

    #[test]
    fn verbosity_eins_unterdrueckt_normal_und_info() {
        let mut engine = CalloutEngine::neu(1);
        let mut s = snapshot();
        s.tyre_trends = [TyreTrend::Rising, TyreTrend::Stable, TyreTrend::Stable, TyreTrend::Stable];
        s.last_lap_ms = 100_000;
        s.lap_count = 2;

        assert!(engine.bewerten(&s, Instant::now()).is_empty());
        assert!(engine.runde_abgeschlossen(&s, Instant::now()).is_empty());
    }

    #[test]
    fn verbosity_drei_laesst_info_durch() {
        let mut engine = CalloutEngine::neu(3);
        let mut s = snapshot();
        s.last_lap_ms = 100_000;
        s.lap_count = 2;

        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        assert!(callouts.iter().any(|c| c.typ == CalloutTyp::LapSummary));
    }

    #[test]
    fn keine_prioritaet_unterhalb_der_stufe() {
        // Eigenschaft: fuer jede Stufe enthaelt die Ausgabe nur
        // zugelassene Prioritaeten
        for verbosity in 1..=3u8 {
            let mut engine = CalloutEngine::neu(verbosity);
            let mut s = snapshot();
            s.tyre_temps = [105.0; 4];
            s.tyre_trends = [TyreTrend::Rising; 4];
            s.last_lap_ms = 103_000;
            s.best_lap_ms = 100_000;
            s.lap_delta_ms = 3_000;
            s.lap_count = 5;
            s.laps_total = 10;
            s.recent_lap_times = vec![100_000, 101_000, 103_000];
            s.fuel_usage = FuelUsage::On;
            s.fuel_burn_per_lap = 2.0;
            s.estimated_laps_remaining = 2.5;
            s.rev_limiter_fraction = 0.3;
            s.tcs_fraction = 0.2;
            s.asm_fraction = 0.2;

            let jetzt = Instant::now();
            let mut alle = engine.bewerten(&s, jetzt);
            alle.extend(engine.runde_abgeschlossen(&s, jetzt));
            assert!(!alle.is_empty());
            for callout in &alle {
                assert!(
                    callout.prioritaet.zugelassen(verbosity),
                    "{:?} bei Stufe {verbosity}",
                    callout.typ
                );
            }
        }
    }

    #[test]
    fn lap_delta_szenario_nachricht() {
        let mut engine = CalloutEngine::neu(2);
        let mut s = snapshot();
        s.last_lap_ms = 102_350;
        s.best_lap_ms = 101_823;
        s.lap_delta_ms = 527;

        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        let delta = callouts
            .iter()
            .find(|c| c.typ == CalloutTyp::LapDelta)
            .expect("lap_delta muss feuern");
        assert_eq!(delta.nachricht, "Last lap 01:42.350, +0.527s to your best.");
    }

    #[test]
    fn genau_500_ms_delta_feuert_nicht() {
        let mut engine = CalloutEngine::neu(2);
        let mut s = snapshot();
        s.last_lap_ms = 100_500;
        s.best_lap_ms = 100_000;
        s.lap_delta_ms = 500;

        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        assert!(!callouts.iter().any(|c| c.typ == CalloutTyp::LapDelta));
    }

    #[test]
    fn race_progress_alle_fuenf_runden_und_endphase() {
        let mut engine = CalloutEngine::neu(2);
        let mut s = snapshot();
        s.laps_total = 20;

        s.lap_count = 5;
        assert!(engine
            .runde_abgeschlossen(&s, Instant::now())
            .iter()
            .any(|c| c.typ == CalloutTyp::RaceProgress));

        s.lap_count = 7;
        assert!(!engine
            .runde_abgeschlossen(&s, Instant::now())
            .iter()
            .any(|c| c.typ == CalloutTyp::RaceProgress));

        s.lap_count = 18; // 2 verbleibend
        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        let progress = callouts
            .iter()
            .find(|c| c.typ == CalloutTyp::RaceProgress)
            .expect("Endphase muss feuern");
        assert!(progress.nachricht.contains("2 to go"));
    }

    #[test]
    fn pace_summary_braucht_drei_runden() {
        let mut engine = CalloutEngine::neu(3);
        let mut s = snapshot();
        s.last_lap_ms = 100_000;
        s.recent_lap_times = vec![101_000, 100_000];
        assert!(!engine
            .runde_abgeschlossen(&s, Instant::now())
            .iter()
            .any(|c| c.typ == CalloutTyp::PaceSummary));

        s.recent_lap_times = vec![102_000, 101_000, 100_000];
        s.pace_trend = PaceTrend::Improving;
        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        let pace = callouts
            .iter()
            .find(|c| c.typ == CalloutTyp::PaceSummary)
            .expect("pace_summary muss feuern");
        assert!(pace.nachricht.contains("improving"));
    }

    #[test]
    fn assist_schwellen_sind_strikt() {
        let mut engine = CalloutEngine::neu(2);
        let mut s = snapshot();
        s.rev_limiter_fraction = 0.15;
        s.tcs_fraction = 0.10;
        s.asm_fraction = 0.10;

        let callouts = engine.runde_abgeschlossen(&s, Instant::now());
        assert!(!callouts.iter().any(|c| matches!(
            c.typ,
            CalloutTyp::RevLimiter | CalloutTyp::TcsIntervention | CalloutTyp::AsmIntervention
        )));
    }
}
