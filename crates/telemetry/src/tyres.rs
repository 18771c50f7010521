//! Reifentemperatur-Verlauf
//!
//! Pro Reifenecke haelt ein Ringpuffer die Proben der letzten 5 Sekunden.
//! Der Trend vergleicht aelteste und juengste Probe gegen eine
//! 3-Grad-Schwelle.

use pitwall_core::TyreTrend;
use std::collections::VecDeque;

/// Zeitfenster des Verlaufs in Millisekunden
const FENSTER_MS: u64 = 5_000;

/// Temperaturdifferenz ab der ein Trend gemeldet wird (Grad Celsius)
const TREND_SCHWELLE: f32 = 3.0;

/// Zeitgefensterter Temperatur-Verlauf einer Reifenecke
#[derive(Debug, Default)]
pub struct ReifenVerlauf {
    /// Proben (Temperatur, Zeitstempel in ms), aelteste vorne
    proben: VecDeque<(f32, u64)>,
}

impl ReifenVerlauf {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt eine Probe auf und verwirft alles ausserhalb des Fensters
    pub fn aufzeichnen(&mut self, temperatur: f32, jetzt_ms: u64) {
        self.proben.push_back((temperatur, jetzt_ms));
        let grenze = jetzt_ms.saturating_sub(FENSTER_MS);
        while let Some(&(_, zeit)) = self.proben.front() {
            if zeit < grenze {
                self.proben.pop_front();
            } else {
                break;
            }
        }
    }

    /// Trend ueber das aktuelle Fenster.
    ///
    /// Weniger als zwei Proben ergeben `Stable`.
    pub fn trend(&self) -> TyreTrend {
        if self.proben.len() < 2 {
            return TyreTrend::Stable;
        }
        let (Some(&(erste, _)), Some(&(letzte, _))) = (self.proben.front(), self.proben.back())
        else {
            return TyreTrend::Stable;
        };

        let differenz = letzte - erste;
        if differenz > TREND_SCHWELLE {
            TyreTrend::Rising
        } else if differenz < -TREND_SCHWELLE {
            TyreTrend::Cooling
        } else {
            TyreTrend::Stable
        }
    }

    /// Verwirft alle Proben (neues Rennen)
    pub fn leeren(&mut self) {
        self.proben.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
