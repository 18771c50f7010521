//! Kraftstoffmodell
//!
//! Drei Teilprobleme: (a) verbraucht dieses Fahrzeug ueberhaupt Kraftstoff
//! (Arcade-Events fahren ohne), (b) wie viel pro Runde, (c) wie viele
//! Runden reichen noch. Die Verbrauchserkennung prueft in den ersten
//! 30 Sekunden der Session zu festen Zeitpunkten gegen den Anfangsstand;
//! das Ergebnis ist danach endgueltig bis zum naechsten Rennen.

use pitwall_core::FuelUsage;

/// Pruefzeitpunkte der Verbrauchserkennung (ms nach Session-Start)
const PRUEFZEITEN_MS: [u64; 6] = [5_000, 10_000, 15_000, 20_000, 25_000, 30_000];

/// Verbrauch unterhalb dieser Schwelle gilt als Messrauschen (Liter)
const VERBRAUCH_SCHWELLE: f32 = 0.01;

/// Anzahl juengster Runden-Differenzen fuer die Verbrauchsrate
const RATE_FENSTER: usize = 3;

/// Mindest-Sessiondauer bevor der Fallback-Schaetzer rechnet (ms)
const FALLBACK_MINDESTDAUER_MS: u64 = 5_000;

/// Kraftstoffmodell einer aktiven Session
#[derive(Debug)]
pub struct KraftstoffModell {
    /// Fuellstand beim ersten Frame der Session
    anfangsstand: Option<f32>,
    /// Ergebnis der Verbrauchserkennung
    bestimmt: FuelUsage,
    /// Index des naechsten ausstehenden Pruefzeitpunkts
    naechste_pruefung: usize,
    /// Fuellstaende zu Rundenbeginn, Index 0 = Start der ersten Runde
    runden_staende: Vec<f32>,
}

impl Default for KraftstoffModell {
    fn default() -> Self {
        Self::neu()
    }
}

impl KraftstoffModell {
    pub fn neu() -> Self {
        Self {
            anfangsstand: None,
            bestimmt: FuelUsage::Undetermined,
            naechste_pruefung: 0,
            runden_staende: Vec::new(),
        }
    }

    /// Ergebnis der Verbrauchserkennung
    pub fn bestimmt(&self) -> FuelUsage {
        self.bestimmt
    }

    /// Nimmt einen Frame auf und fuehrt faellige Verbrauchspruefungen aus.
    ///
    /// `session_ms` ist die Zeit seit Session-Start. Der Uebergang von
    /// `Undetermined` nach `On`/`Off` passiert genau einmal.
    pub fn frame_aufnehmen(&mut self, fuellstand: f32, session_ms: u64) {
        let anfang = *self.anfangsstand.get_or_insert(fuellstand);

        if self.bestimmt != FuelUsage::Undetermined {
            return;
        }

        while self.naechste_pruefung < PRUEFZEITEN_MS.len()
            && session_ms >= PRUEFZEITEN_MS[self.naechste_pruefung]
        {
            self.naechste_pruefung += 1;
            if anfang - fuellstand > VERBRAUCH_SCHWELLE {
                self.bestimmt = FuelUsage::On;
                return;
            }
        }

        // Alle Pruefzeitpunkte verstrichen ohne Verbrauch: endgueltig Off
        if self.naechste_pruefung == PRUEFZEITEN_MS.len() {
            self.bestimmt = FuelUsage::Off;
        }
    }

    /// Haelt den Fuellstand zu Beginn einer neuen Runde fest
    pub fn runde_begonnen(&mut self, fuellstand: f32) {
        self.runden_staende.push(fuellstand);
    }

    /// Verbrauch pro Runde in Litern.
    ///
    /// Braucht mindestens drei Rundenbeginn-Staende. Das erste Intervall
    /// (angeschnittene Out-Lap) wird uebersprungen; gemittelt werden die
    /// juengsten drei positiven Differenzen. Ohne verwertbare Differenz
    /// oder mit Erkennungsergebnis != `On` ist die Rate 0.
    pub fn verbrauch_pro_runde(&self) -> f32 {
        if self.bestimmt != FuelUsage::On || self.runden_staende.len() < 3 {
            return 0.0;
        }

        let differenzen: Vec<f32> = (2..self.runden_staende.len())
            .map(|i| self.runden_staende[i - 1] - self.runden_staende[i])
            .filter(|d| *d > 0.0)
            .collect();

        if differenzen.is_empty() {
            return 0.0;
        }

        let fenster = &differenzen[differenzen.len().saturating_sub(RATE_FENSTER)..];
        fenster.iter().sum::<f32>() / fenster.len() as f32
    }

    /// Geschaetzte verbleibende Runden.
    ///
    /// Primaer `fuellstand / Rate`. Solange noch keine Rate vorliegt, aber
    /// Verbrauch erkannt wurde, wird aus dem Gesamtverbrauch seit
    /// Session-Start eine ms-Rate gebildet und auf eine Referenzrunde
    /// projiziert (beste Runde, sonst letzte). Ohne Referenz: unendlich.
    pub fn geschaetzte_runden(
        &self,
        fuellstand: f32,
        session_ms: u64,
        beste_runde_ms: i32,
        letzte_runde_ms: i32,
    ) -> f64 {
        if self.bestimmt != FuelUsage::On {
            return f64::INFINITY;
        }

        let rate = self.verbrauch_pro_runde();
        if rate > 0.0 {
            return f64::from(fuellstand / rate);
        }

        // Fallback: Gesamtverbrauch auf eine Referenzrunde projizieren
        let Some(anfang) = self.anfangsstand else {
            return f64::INFINITY;
        };
        let verbraucht = anfang - fuellstand;
        if session_ms <= FALLBACK_MINDESTDAUER_MS || verbraucht <= VERBRAUCH_SCHWELLE {
            return f64::INFINITY;
        }

        let referenz_ms = if beste_runde_ms > 0 {
            beste_runde_ms
        } else if letzte_runde_ms > 0 {
            letzte_runde_ms
        } else {
            return f64::INFINITY;
        };

        let rate_pro_ms = f64::from(verbraucht) / session_ms as f64;
        let pro_runde = rate_pro_ms * f64::from(referenz_ms);
        if pro_runde <= 0.0 {
            return f64::INFINITY;
        }
        f64::from(fuellstand) / pro_runde
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbrauch_wird_bei_erster_pruefung_erkannt() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.9, 5_000);
        assert_eq!(modell.bestimmt(), FuelUsage::On);
    }

    #[test]
    fn konstanter_stand_ergibt_off_nach_30s() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        for sekunde in 1..=29 {
            modell.frame_aufnehmen(40.0, sekunde * 1_000);
            assert_eq!(modell.bestimmt(), FuelUsage::Undetermined);
        }
        modell.frame_aufnehmen(40.0, 30_000);
        assert_eq!(modell.bestimmt(), FuelUsage::Off);
    }

    #[test]
    fn erkennung_ist_endgueltig() {
        // Uebergang nur Undetermined -> On/Off, nie zurueck
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(40.0, 31_000);
        assert_eq!(modell.bestimmt(), FuelUsage::Off);
        modell.frame_aufnehmen(20.0, 60_000);
        assert_eq!(modell.bestimmt(), FuelUsage::Off);
    }

    #[test]
    fn spaeter_frame_holt_versaeumte_pruefungen_nach() {
        // Frames koennen luecken; eine einzige Probe bei t=12s deckt die
        // Pruefzeitpunkte 5s und 10s ab
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.5, 12_000);
        assert_eq!(modell.bestimmt(), FuelUsage::On);
    }

    #[test]
    fn rate_braucht_drei_runden_staende() {
        let mut modell = modell_mit_verbrauch();
        modell.runde_begonnen(40.0);
        modell.runde_begonnen(38.0);
        assert_eq!(modell.verbrauch_pro_runde(), 0.0);
        modell.runde_begonnen(36.5);
        // Erstes Intervall (40->38) wird uebersprungen: Rate = 38 - 36.5
        assert!((modell.verbrauch_pro_runde() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn rate_mittelt_juengste_drei_differenzen() {
        let mut modell = modell_mit_verbrauch();
        for stand in [40.0, 38.0, 36.5, 35.0, 33.0, 31.5] {
            modell.runde_begonnen(stand);
        }
        // Differenzen ab i=2: 1.5, 1.5, 2.0, 1.5 -> juengste drei mitteln
        let erwartet = (1.5 + 2.0 + 1.5) / 3.0;
        assert!((modell.verbrauch_pro_runde() - erwartet).abs() < 1e-6);
    }

    #[test]
    fn auffuellen_zaehlt_nicht_als_verbrauch() {
        let mut modell = modell_mit_verbrauch();
        for stand in [40.0, 38.0, 36.0, 60.0, 58.0] {
            modell.runde_begonnen(stand);
        }
        // Die negative Differenz (36->60) faellt raus
        let erwartet = (2.0 + 2.0) / 2.0;
        assert!((modell.verbrauch_pro_runde() - erwartet).abs() < 1e-6);
    }

    #[test]
    fn ohne_erkennung_bleibt_rate_null() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        for stand in [40.0, 38.0, 36.5, 35.0] {
            modell.runde_begonnen(stand);
        }
        // bestimmt ist noch Undetermined
        assert_eq!(modell.verbrauch_pro_runde(), 0.0);
        assert!(modell.geschaetzte_runden(35.0, 4_000, -1, -1).is_infinite());
    }

    #[test]
    fn geschaetzte_runden_aus_rate() {
        let mut modell = modell_mit_verbrauch();
        for stand in [40.0, 38.0, 36.0, 34.0] {
            modell.runde_begonnen(stand);
        }
        let runden = modell.geschaetzte_runden(34.0, 200_000, 100_000, -1);
        assert!((runden - 17.0).abs() < 1e-3);
    }

    #[test]
    fn fallback_projiziert_auf_beste_runde() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.0, 10_000);
        assert_eq!(modell.bestimmt(), FuelUsage::On);

        // Keine Rundendaten: 1 L in 10 s, Referenzrunde 100 s -> 10 L/Runde
        let runden = modell.geschaetzte_runden(39.0, 10_000, 100_000, -1);
        assert!((runden - 3.9).abs() < 1e-3);
    }

    #[test]
    fn fallback_ohne_referenzrunde_ist_unendlich() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.0, 10_000);
        assert!(modell.geschaetzte_runden(39.0, 10_000, -1, -1).is_infinite());
    }

    #[test]
    fn fallback_braucht_mindestdauer() {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.0, 5_000);
        assert_eq!(modell.bestimmt(), FuelUsage::On);
        // Exakt 5 s reicht nicht (strikt groesser gefordert)
        assert!(modell.geschaetzte_runden(39.0, 5_000, 100_000, -1).is_infinite());
    }

    fn modell_mit_verbrauch() -> KraftstoffModell {
        let mut modell = KraftstoffModell::neu();
        modell.frame_aufnehmen(40.0, 0);
        modell.frame_aufnehmen(39.0, 5_000);
        assert_eq!(modell.bestimmt(), FuelUsage::On);
        modell
    }
}
