//! Datentypen der Telemetrie-Pipeline
//!
//! `Frame` ist ein dekodiertes Telemetrie-Sample (~60 Hz), `Snapshot` die
//! 1-Hz-Zusammenfassung des Analyzers und `Callout` eine vom Regelwerk
//! erzeugte Meldung. Alle Wire-Typen serialisieren als camelCase-JSON,
//! damit das Browser-Dashboard sie direkt konsumieren kann.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClientId – Identitaet eines verbundenen Dashboards
// ---------------------------------------------------------------------------

/// Laufende Nummer eines verbundenen Clients (pro Prozess eindeutig)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Frame – ein dekodiertes Telemetrie-Sample
// ---------------------------------------------------------------------------

/// Bit-Masken fuer das Flag-Wort im Telemetrie-Frame (Offset 0x8E)
pub struct FrameFlags;

impl FrameFlags {
    /// Fahrzeug befindet sich auf der Strecke
    pub const ON_TRACK: u16 = 1 << 0;
    /// Spiel ist pausiert
    pub const PAUSED: u16 = 1 << 1;
    /// Ladebildschirm / Menueverarbeitung
    pub const LOADING: u16 = 1 << 2;
    /// Gang eingelegt
    pub const IN_GEAR: u16 = 1 << 3;
    /// Fahrzeug hat einen Turbolader
    pub const HAS_TURBO: u16 = 1 << 4;
    /// Drehzahlbegrenzer aktiv
    pub const REV_LIMITER: u16 = 1 << 5;
    /// Handbremse angezogen
    pub const HANDBRAKE: u16 = 1 << 6;
    /// Beleuchtung aktiv
    pub const LIGHTS: u16 = 1 << 7;
    /// ASM (Stabilitaetsmanagement) greift ein
    pub const ASM_ACTIVE: u16 = 1 << 10;
    /// TCS (Traktionskontrolle) greift ein
    pub const TCS_ACTIVE: u16 = 1 << 11;
}

/// Ein dekodiertes Telemetrie-Sample
///
/// Nach dem Dekodieren unveraenderlich; wird als `Arc<Frame>` gleichzeitig
/// vom Analyzer, dem Session-Logger und dem Client-Broadcast konsumiert.
/// Lap-Zeiten verwenden den Sentinel `-1` fuer "nicht gesetzt".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Monoton steigende Paket-Sequenz-ID
    pub packet_id: u32,
    /// Weltposition (x, y, z) in Metern
    pub position: [f32; 3],
    /// Geschwindigkeitsvektor (x, y, z) in m/s
    pub velocity: [f32; 3],
    /// Rotation (Pitch, Yaw, Roll)
    pub rotation: [f32; 3],
    /// Karosseriehoehe ueber der Fahrbahn
    pub body_height: f32,
    /// Motordrehzahl in U/min
    pub engine_rpm: f32,
    /// Aktueller Kraftstoffstand in Litern
    pub fuel_level: f32,
    /// Tankkapazitaet in Litern
    pub fuel_capacity: f32,
    /// Geschwindigkeit in km/h (Wire-Wert ist m/s, Umrechnung im Decoder)
    pub speed_kmh: f32,
    /// Ladedruck (1.0 = kein Ladedruck)
    pub turbo_boost: f32,
    /// Oeldruck in bar
    pub oil_pressure: f32,
    /// Wassertemperatur in Grad Celsius
    pub water_temp: f32,
    /// Oeltemperatur in Grad Celsius
    pub oil_temp: f32,
    /// Reifentemperaturen vorne links / vorne rechts / hinten links /
    /// hinten rechts in Grad Celsius
    pub tyre_temps: [f32; 4],
    /// Aktuelle Runde (0 vor der Ziellinie)
    pub lap_count: i16,
    /// Rundenanzahl des Rennens (0 = Zeitrennen ohne Limit)
    pub laps_total: i16,
    /// Beste Rundenzeit in ms (-1 = nicht gesetzt)
    pub best_lap_ms: i32,
    /// Letzte Rundenzeit in ms (-1 = nicht gesetzt)
    pub last_lap_ms: i32,
    /// Drehzahl ab der die Begrenzer-Warnung blinkt
    pub rev_warn_rpm: u16,
    /// Drehzahl des harten Begrenzers
    pub rev_cutoff_rpm: u16,
    /// Vom Spiel berechnete Hoechstgeschwindigkeit in km/h
    pub calc_max_speed: u16,
    /// Rohes Flag-Wort (siehe `FrameFlags`)
    pub flags: u16,
    /// Eingelegter Gang (0 = Rueckwaertsgang/Neutral-Kodierung des Spiels)
    pub current_gear: u8,
    /// Vorgeschlagener Gang (15 = kein Vorschlag)
    pub suggested_gear: u8,
    /// Gaspedal 0–100
    pub throttle: f32,
    /// Bremspedal 0–100
    pub brake: f32,
    /// Fahrzeug-Identitaetscode
    pub car_code: i32,
}

impl Frame {
    /// Prueft ob ein bestimmtes Flag gesetzt ist
    pub fn hat_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    /// Fahrzeug ist auf der Strecke (weder Menue noch Replay-Leerlauf)
    pub fn auf_strecke(&self) -> bool {
        self.hat_flag(FrameFlags::ON_TRACK)
    }

    /// Spiel ist pausiert
    pub fn pausiert(&self) -> bool {
        self.hat_flag(FrameFlags::PAUSED)
    }

    /// Drehzahlbegrenzer aktiv
    pub fn begrenzer_aktiv(&self) -> bool {
        self.hat_flag(FrameFlags::REV_LIMITER)
    }

    /// Traktionskontrolle greift gerade ein
    pub fn tcs_aktiv(&self) -> bool {
        self.hat_flag(FrameFlags::TCS_ACTIVE)
    }

    /// Stabilitaetsmanagement greift gerade ein
    pub fn asm_aktiv(&self) -> bool {
        self.hat_flag(FrameFlags::ASM_ACTIVE)
    }
}

// ---------------------------------------------------------------------------
// Snapshot – 1-Hz-Zusammenfassung des Analyzers
// ---------------------------------------------------------------------------

/// Tendenz der Rundenzeiten ueber die letzten drei Runden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaceTrend {
    /// Rundenzeiten streng monoton fallend
    Improving,
    /// Rundenzeiten streng monoton steigend
    Degrading,
    /// Weniger als 3 Runden oder gemischtes Bild
    Consistent,
}

/// Temperatur-Tendenz eines Reifens ueber das 5-Sekunden-Fenster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TyreTrend {
    Rising,
    Stable,
    Cooling,
}

/// Ergebnis der Kraftstoffverbrauch-Erkennung
///
/// Wechselt genau einmal von `Undetermined` nach `On` oder `Off`,
/// nie zurueck (Reset nur bei neuem Rennen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelUsage {
    Undetermined,
    On,
    Off,
}

/// Exportierte Zusammenfassung des Analyzer-Zustands
///
/// Wird auf Anfrage aus dem inneren Zustand kopiert und ist ein in sich
/// konsistenter Zeitpunkt-Blick (keine zerrissenen Feldpaare).
/// `estimated_laps_remaining` verwendet `f64::INFINITY` als
/// Unbekannt-Sentinel; serde_json schreibt dafuer `null` auf den Draht.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub lap_count: i16,
    pub laps_total: i16,
    /// Letzte Rundenzeit in ms (-1 = nicht gesetzt)
    pub last_lap_ms: i32,
    /// Beste Rundenzeit in ms (-1 = nicht gesetzt)
    pub best_lap_ms: i32,
    /// Differenz letzte − beste Runde in ms; nur != 0 wenn beide > 0
    pub lap_delta_ms: i32,
    pub pace_trend: PaceTrend,
    /// Bis zu 5 juengste Rundenzeiten in ms, aelteste zuerst
    pub recent_lap_times: Vec<i32>,
    pub fuel_level: f32,
    pub fuel_capacity: f32,
    /// Kraftstoffverbrauch pro Runde in Litern (0 = unbekannt)
    pub fuel_burn_per_lap: f32,
    /// Geschaetzte verbleibende Runden (`f64::INFINITY` = unbekannt)
    pub estimated_laps_remaining: f64,
    pub fuel_usage: FuelUsage,
    /// Reifentemperaturen FL/FR/RL/RR in Grad Celsius
    pub tyre_temps: [f32; 4],
    pub tyre_trends: [TyreTrend; 4],
    /// Anteil der Frames dieser Runde mit aktivem Drehzahlbegrenzer (0–1)
    pub rev_limiter_fraction: f32,
    /// Anteil der Frames dieser Runde mit TCS-Eingriff (0–1)
    pub tcs_fraction: f32,
    /// Anteil der Frames dieser Runde mit ASM-Eingriff (0–1)
    pub asm_fraction: f32,
    pub current_speed_kmh: f32,
    /// Hoechstgeschwindigkeit der aktuellen Runde in km/h
    pub top_speed_kmh: f32,
    pub current_gear: u8,
    pub suggested_gear: u8,
    pub engine_rpm: f32,
    pub car_code: i32,
    pub on_track: bool,
    /// Dauer der aktiven Session in ms
    pub session_duration_ms: u64,
    /// Startzeitpunkt der laufenden Runde (ms seit Session-Beginn)
    pub current_lap_start_ms: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            lap_count: 0,
            laps_total: 0,
            last_lap_ms: -1,
            best_lap_ms: -1,
            lap_delta_ms: 0,
            pace_trend: PaceTrend::Consistent,
            recent_lap_times: Vec::new(),
            fuel_level: 0.0,
            fuel_capacity: 0.0,
            fuel_burn_per_lap: 0.0,
            estimated_laps_remaining: f64::INFINITY,
            fuel_usage: FuelUsage::Undetermined,
            tyre_temps: [0.0; 4],
            tyre_trends: [TyreTrend::Stable; 4],
            rev_limiter_fraction: 0.0,
            tcs_fraction: 0.0,
            asm_fraction: 0.0,
            current_speed_kmh: 0.0,
            top_speed_kmh: 0.0,
            current_gear: 0,
            suggested_gear: 15,
            engine_rpm: 0.0,
            car_code: -1,
            on_track: false,
            session_duration_ms: 0,
            current_lap_start_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Callout – eine Meldung des Regelwerks
// ---------------------------------------------------------------------------

/// Art eines Callouts (bestimmt Regel, Cooldown und Formulierung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalloutTyp {
    FuelLow,
    FuelEstimate,
    TyreTempHigh,
    TyreTrend,
    LapDelta,
    LapSummary,
    RevLimiter,
    TcsIntervention,
    AsmIntervention,
    RaceProgress,
    PaceSummary,
}

impl CalloutTyp {
    /// Wire-Name des Typs (entspricht der snake_case-Serialisierung)
    pub fn name(&self) -> &'static str {
        match self {
            Self::FuelLow => "fuel_low",
            Self::FuelEstimate => "fuel_estimate",
            Self::TyreTempHigh => "tyre_temp_high",
            Self::TyreTrend => "tyre_trend",
            Self::LapDelta => "lap_delta",
            Self::LapSummary => "lap_summary",
            Self::RevLimiter => "rev_limiter",
            Self::TcsIntervention => "tcs_intervention",
            Self::AsmIntervention => "asm_intervention",
            Self::RaceProgress => "race_progress",
            Self::PaceSummary => "pace_summary",
        }
    }
}

/// Prioritaet eines Callouts – bestimmt zusammen mit der Verbosity-Stufe
/// ob die Meldung den Fahrer erreicht
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prioritaet {
    Critical,
    Normal,
    Info,
}

impl Prioritaet {
    /// Prueft ob diese Prioritaet bei der gegebenen Verbosity-Stufe
    /// zugelassen ist: Stufe 1 nur critical, Stufe 2 critical+normal,
    /// Stufe 3 alles.
    pub fn zugelassen(&self, verbosity: u8) -> bool {
        match self {
            Self::Critical => verbosity >= 1,
            Self::Normal => verbosity >= 2,
            Self::Info => verbosity >= 3,
        }
    }
}

/// Eine vom Regelwerk erzeugte Meldung
///
/// Lebt von der Erzeugung bis zur Zustellung (Orchestrator oder direkter
/// Client-Emit) und wird nicht persistiert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callout {
    pub typ: CalloutTyp,
    pub prioritaet: Prioritaet,
    /// Freiform-Daten fuer die Verbalisierung durch das Sprachmodell
    pub daten: serde_json::Value,
    /// Klartext-Fallback-Satz
    pub nachricht: String,
    /// Erzeugungszeitpunkt (ms seit Unix-Epoche)
    pub zeitstempel_ms: u64,
}

// ---------------------------------------------------------------------------
// Session-Konfiguration des Renningenieurs
// ---------------------------------------------------------------------------

/// Eine Ingenieur-Persoenlichkeit: Anzeigename, Stil-Prompt und
/// Provider-Stimme. Wird auf den festen Basis-Prompt aufgesetzt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub id: String,
    pub display_name: String,
    /// Stil-Fragment das an den Basis-Prompt angehaengt wird
    pub prompt: String,
    /// Name der Stimme beim Sprachmodell-Provider
    pub voice: String,
}

/// Audio-Eingabe-Modus des Fahrers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceMode {
    /// Audio fliesst nur waehrend die Sprechtaste gehalten wird
    PushToTalk,
    /// Mikrofon dauerhaft offen
    AlwaysOpen,
}

/// Konfiguration einer Ingenieur-Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Verbosity-Stufe 1–3 (filtert Callouts nach Prioritaet)
    pub verbosity: u8,
    /// Gewaehlte Persoenlichkeit
    pub personality: Personality,
    /// Zusaetzliche freie Anweisungen des Benutzers
    pub custom_instructions: Option<String>,
    pub voice_mode: VoiceMode,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
