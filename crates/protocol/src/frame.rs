//! Frame-Decoder fuer das Simulator-Telemetrie-Protokoll
//!
//! Der Simulator sendet 296-Byte-Datagramme, als Ganzes Salsa20-verschluesselt
//! mit einem festen ASCII-Schluessel. Die Nonce steckt im Paket selbst.
//!
//! ## Ablauf beim Dekodieren
//!
//! 1. Datagramme unter 296 Bytes verwerfen
//! 2. `iv1` = LE-Wort bei 0x40, `iv2 = iv1 XOR 0xDEADBEAF`,
//!    Nonce = `iv2 (LE) || iv1 (LE)`
//! 3. Gesamten Puffer entschluesseln
//! 4. Bytes 0x40–0x43 des Chiffretextes in den Klartext zuruecklegen
//!    (die Nonce ist nicht Teil des verschluesselten Stroms)
//! 5. Magic `0x47375330` (LE) bei Offset 0 pruefen
//! 6. Festes Binaerlayout in einen `Frame` lesen
//!
//! ## Layout (Auszug, alle Werte little-endian)
//!
//! ```text
//! Offset  Typ     Feld
//! ------  ------  ----
//! 0x00    u32     Magic
//! 0x04    3xf32   Position
//! 0x10    3xf32   Geschwindigkeitsvektor (m/s)
//! 0x1C    3xf32   Rotation
//! 0x38    f32     Karosseriehoehe
//! 0x3C    f32     Motordrehzahl
//! 0x40    u32     IV (unverschluesselt)
//! 0x44    f32     Kraftstoffstand      0x48  f32  Tankkapazitaet
//! 0x4C    f32     Geschwindigkeit m/s  0x50  f32  Ladedruck
//! 0x54    f32     Oeldruck             0x58  f32  Wassertemperatur
//! 0x5C    f32     Oeltemperatur
//! 0x60    4xf32   Reifentemperaturen FL/FR/RL/RR
//! 0x70    u32     Paket-ID
//! 0x74    i16     Runde                0x76  i16  Rundenanzahl
//! 0x78    i32     Beste Runde (ms)     0x7C  i32  Letzte Runde (ms)
//! 0x88    u16     Begrenzer-Warndrehzahl
//! 0x8A    u16     Begrenzer-Abregeldrehzahl
//! 0x8C    u16     Berechnete Hoechstgeschwindigkeit
//! 0x8E    u16     Flags
//! 0x90    u8      Gang (Low-Nibble aktuell, High-Nibble Vorschlag)
//! 0x91    u8      Gas 0–255            0x92  u8   Bremse 0–255
//! 0x124   i32     Fahrzeugcode
//! ```

use crate::salsa::salsa20_xor;
use pitwall_core::Frame;

/// Feste Datagramm-Groesse des Telemetrie-Pakets
pub const FRAME_GROESSE: usize = 296;

/// Magic-Wort am Klartext-Offset 0 ("0S7G" als LE-u32)
pub const MAGIC: u32 = 0x4737_5330;

/// Offset der unverschluesselten IV im Datagramm
const IV_OFFSET: usize = 0x40;

/// XOR-Konstante der Nonce-Ableitung
const IV_XOR: u32 = 0xDEAD_BEAF;

/// Die ersten 32 Bytes des protokollfesten ASCII-Schluessels
const SCHLUESSEL: [u8; 32] = *b"Simulator Interface Packet GT7 v";

// ---------------------------------------------------------------------------
// LE-Lesehelfer (nach vorheriger Laengenpruefung immer im Bereich)
// ---------------------------------------------------------------------------

#[inline]
fn le_f32(b: &[u8], o: usize) -> f32 {
    f32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

#[inline]
fn le_u32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

#[inline]
fn le_i32(b: &[u8], o: usize) -> i32 {
    i32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

#[inline]
fn le_u16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}

#[inline]
fn le_i16(b: &[u8], o: usize) -> i16 {
    i16::from_le_bytes([b[o], b[o + 1]])
}

/// Leitet die 8-Byte-Nonce aus der IV des Datagramms ab
fn nonce_ableiten(iv1: u32) -> [u8; 8] {
    let iv2 = iv1 ^ IV_XOR;
    let mut nonce = [0u8; 8];
    nonce[0..4].copy_from_slice(&iv2.to_le_bytes());
    nonce[4..8].copy_from_slice(&iv1.to_le_bytes());
    nonce
}

// ---------------------------------------------------------------------------
// Dekodieren
// ---------------------------------------------------------------------------

/// Dekodiert ein rohes Datagramm in einen `Frame`.
///
/// Gibt `None` zurueck wenn das Datagramm zu kurz ist oder die Magic nach
/// dem Entschluesseln nicht stimmt ("kein Frame"). Andere Ausgaenge gibt
/// es nicht; der Aufrufer zaehlt Verwerfungen und macht weiter.
pub fn frame_dekodieren(datagramm: &[u8]) -> Option<Frame> {
    if datagramm.len() < FRAME_GROESSE {
        return None;
    }
    let datagramm = &datagramm[..FRAME_GROESSE];

    let iv1 = le_u32(datagramm, IV_OFFSET);
    let nonce = nonce_ableiten(iv1);

    let mut klartext = datagramm.to_vec();
    salsa20_xor(&mut klartext, &SCHLUESSEL, &nonce);

    // Die IV-Bytes sind nicht Teil des verschluesselten Stroms
    klartext[IV_OFFSET..IV_OFFSET + 4].copy_from_slice(&datagramm[IV_OFFSET..IV_OFFSET + 4]);

    if le_u32(&klartext, 0x00) != MAGIC {
        return None;
    }

    let b = &klartext;
    let gear_byte = b[0x90];

    Some(Frame {
        packet_id: le_u32(b, 0x70),
        position: [le_f32(b, 0x04), le_f32(b, 0x08), le_f32(b, 0x0C)],
        velocity: [le_f32(b, 0x10), le_f32(b, 0x14), le_f32(b, 0x18)],
        rotation: [le_f32(b, 0x1C), le_f32(b, 0x20), le_f32(b, 0x24)],
        body_height: le_f32(b, 0x38),
        engine_rpm: le_f32(b, 0x3C),
        fuel_level: le_f32(b, 0x44),
        fuel_capacity: le_f32(b, 0x48),
        speed_kmh: le_f32(b, 0x4C) * 3.6,
        turbo_boost: le_f32(b, 0x50),
        oil_pressure: le_f32(b, 0x54),
        water_temp: le_f32(b, 0x58),
        oil_temp: le_f32(b, 0x5C),
        tyre_temps: [
            le_f32(b, 0x60),
            le_f32(b, 0x64),
            le_f32(b, 0x68),
            le_f32(b, 0x6C),
        ],
        lap_count: le_i16(b, 0x74),
        laps_total: le_i16(b, 0x76),
        best_lap_ms: le_i32(b, 0x78),
        last_lap_ms: le_i32(b, 0x7C),
        rev_warn_rpm: le_u16(b, 0x88),
        rev_cutoff_rpm: le_u16(b, 0x8A),
        calc_max_speed: le_u16(b, 0x8C),
        flags: le_u16(b, 0x8E),
        current_gear: gear_byte & 0x0F,
        suggested_gear: gear_byte >> 4,
        throttle: f32::from(b[0x91]) / 255.0 * 100.0,
        brake: f32::from(b[0x92]) / 255.0 * 100.0,
        car_code: le_i32(b, 0x124),
    })
}

// ---------------------------------------------------------------------------
// Kodieren (Gegenstueck fuer Tests und Replays)
// ---------------------------------------------------------------------------

/// Baut aus einem `Frame` ein gueltiges verschluesseltes Datagramm.
///
/// Gegenstueck zu `frame_dekodieren`; wird von den Round-Trip-Tests und
/// von Replay-Werkzeugen verwendet. `iv1` ist frei waehlbar (der Simulator
/// verwendet einen Zeit-Tick).
pub fn frame_kodieren(frame: &Frame, iv1: u32) -> Vec<u8> {
    let mut b = vec![0u8; FRAME_GROESSE];

    b[0x00..0x04].copy_from_slice(&MAGIC.to_le_bytes());
    for (i, wert) in frame.position.iter().enumerate() {
        b[0x04 + i * 4..0x08 + i * 4].copy_from_slice(&wert.to_le_bytes());
    }
    for (i, wert) in frame.velocity.iter().enumerate() {
        b[0x10 + i * 4..0x14 + i * 4].copy_from_slice(&wert.to_le_bytes());
    }
    for (i, wert) in frame.rotation.iter().enumerate() {
        b[0x1C + i * 4..0x20 + i * 4].copy_from_slice(&wert.to_le_bytes());
    }
    b[0x38..0x3C].copy_from_slice(&frame.body_height.to_le_bytes());
    b[0x3C..0x40].copy_from_slice(&frame.engine_rpm.to_le_bytes());
    b[0x40..0x44].copy_from_slice(&iv1.to_le_bytes());
    b[0x44..0x48].copy_from_slice(&frame.fuel_level.to_le_bytes());
    b[0x48..0x4C].copy_from_slice(&frame.fuel_capacity.to_le_bytes());
    b[0x4C..0x50].copy_from_slice(&(frame.speed_kmh / 3.6).to_le_bytes());
    b[0x50..0x54].copy_from_slice(&frame.turbo_boost.to_le_bytes());
    b[0x54..0x58].copy_from_slice(&frame.oil_pressure.to_le_bytes());
    b[0x58..0x5C].copy_from_slice(&frame.water_temp.to_le_bytes());
    b[0x5C..0x60].copy_from_slice(&frame.oil_temp.to_le_bytes());
    for (i, wert) in frame.tyre_temps.iter().enumerate() {
        b[0x60 + i * 4..0x64 + i * 4].copy_from_slice(&wert.to_le_bytes());
    }
    b[0x70..0x74].copy_from_slice(&frame.packet_id.to_le_bytes());
    b[0x74..0x76].copy_from_slice(&frame.lap_count.to_le_bytes());
    b[0x76..0x78].copy_from_slice(&frame.laps_total.to_le_bytes());
    b[0x78..0x7C].copy_from_slice(&frame.best_lap_ms.to_le_bytes());
    b[0x7C..0x80].copy_from_slice(&frame.last_lap_ms.to_le_bytes());
    b[0x88..0x8A].copy_from_slice(&frame.rev_warn_rpm.to_le_bytes());
    b[0x8A..0x8C].copy_from_slice(&frame.rev_cutoff_rpm.to_le_bytes());
    b[0x8C..0x8E].copy_from_slice(&frame.calc_max_speed.to_le_bytes());
    b[0x8E..0x90].copy_from_slice(&frame.flags.to_le_bytes());
    b[0x90] = (frame.suggested_gear << 4) | (frame.current_gear & 0x0F);
    b[0x91] = (frame.throttle / 100.0 * 255.0).round() as u8;
    b[0x92] = (frame.brake / 100.0 * 255.0).round() as u8;
    b[0x124..0x128].copy_from_slice(&frame.car_code.to_le_bytes());

    let nonce = nonce_ableiten(iv1);
    salsa20_xor(&mut b, &SCHLUESSEL, &nonce);

    // Die IV steht im Datagramm im Klartext
    b[IV_OFFSET..IV_OFFSET + 4].copy_from_slice(&iv1.to_le_bytes());
    b
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::FrameFlags;

    fn test_frame() -> Frame {
        Frame {
            packet_id: 4711,
            position: [12.5, -3.0, 880.25],
            velocity: [41.0, 0.5, -2.0],
            rotation: [0.01, 0.97, -0.02],
            body_height: 0.11,
            engine_rpm: 6450.0,
            fuel_level: 38.5,
            fuel_capacity: 64.0,
            speed_kmh: 252.0,
            turbo_boost: 1.4,
            oil_pressure: 4.5,
            water_temp: 85.0,
            oil_temp: 102.0,
            tyre_temps: [78.0, 81.5, 74.0, 76.25],
            lap_count: 3,
            laps_total: 10,
            best_lap_ms: 101_823,
            last_lap_ms: 102_350,
            rev_warn_rpm: 7200,
            rev_cutoff_rpm: 7600,
            calc_max_speed: 289,
            flags: FrameFlags::ON_TRACK | FrameFlags::IN_GEAR,
            current_gear: 4,
            suggested_gear: 3,
            throttle: 100.0,
            brake: 0.0,
            car_code: 2278,
        }
    }

    #[test]
    fn kodieren_dekodieren_round_trip() {
        let original = test_frame();
        let datagramm = frame_kodieren(&original, 0x00BC_614E);
        assert_eq!(datagramm.len(), FRAME_GROESSE);

        let dekodiert = frame_dekodieren(&datagramm).expect("Frame muss dekodierbar sein");

        assert_eq!(dekodiert.packet_id, original.packet_id);
        assert_eq!(dekodiert.lap_count, original.lap_count);
        assert_eq!(dekodiert.laps_total, original.laps_total);
        assert_eq!(dekodiert.best_lap_ms, original.best_lap_ms);
        assert_eq!(dekodiert.last_lap_ms, original.last_lap_ms);
        assert_eq!(dekodiert.flags, original.flags);
        assert_eq!(dekodiert.current_gear, 4);
        assert_eq!(dekodiert.suggested_gear, 3);
        assert_eq!(dekodiert.car_code, original.car_code);
        assert_eq!(dekodiert.tyre_temps, original.tyre_temps);
        assert_eq!(dekodiert.position, original.position);
        assert_eq!(dekodiert.fuel_level, original.fuel_level);
        // Normalisierte Felder mit Rundungsspielraum
        assert!((dekodiert.speed_kmh - original.speed_kmh).abs() < 0.01);
        assert!((dekodiert.throttle - original.throttle).abs() < 0.5);
        assert!((dekodiert.brake - original.brake).abs() < 0.5);
    }

    #[test]
    fn zu_kurzes_datagramm_ist_kein_frame() {
        assert!(frame_dekodieren(&[0u8; FRAME_GROESSE - 1]).is_none());
        assert!(frame_dekodieren(&[]).is_none());
    }

    #[test]
    fn falsche_magic_ist_kein_frame() {
        let mut datagramm = frame_kodieren(&test_frame(), 42);
        // Ein Byte im verschluesselten Magic-Bereich kippen
        datagramm[0] ^= 0xFF;
        assert!(frame_dekodieren(&datagramm).is_none());
    }

    #[test]
    fn zufallsbytes_sind_kein_frame() {
        // Deterministisches Pseudo-Rauschen reicht: ohne gueltige
        // Verschluesselung passt die Magic praktisch nie.
        let mut daten = [0u8; FRAME_GROESSE];
        let mut x: u32 = 0x1234_5678;
        for byte in daten.iter_mut() {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            *byte = (x >> 24) as u8;
        }
        assert!(frame_dekodieren(&daten).is_none());
    }

    #[test]
    fn ueberlange_datagramme_werden_auf_frame_groesse_beschnitten() {
        let mut datagramm = frame_kodieren(&test_frame(), 7);
        datagramm.extend_from_slice(&[0xAA; 32]);
        let dekodiert = frame_dekodieren(&datagramm).expect("Frame muss dekodierbar sein");
        assert_eq!(dekodiert.packet_id, 4711);
    }

    #[test]
    fn nonce_ableitung() {
        let nonce = nonce_ableiten(0x1122_3344);
        let iv2 = 0x1122_3344u32 ^ 0xDEAD_BEAF;
        assert_eq!(&nonce[0..4], &iv2.to_le_bytes());
        assert_eq!(&nonce[4..8], &0x1122_3344u32.to_le_bytes());
    }

    #[test]
    fn gear_nibble_zerlegung() {
        let mut frame = test_frame();
        frame.current_gear = 6;
        frame.suggested_gear = 15; // kein Vorschlag
        let dekodiert = frame_dekodieren(&frame_kodieren(&frame, 1)).unwrap();
        assert_eq!(dekodiert.current_gear, 6);
        assert_eq!(dekodiert.suggested_gear, 15);
    }
}
