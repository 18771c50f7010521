//! Salsa20-Stromchiffre (20 Runden)
//!
//! Handgeschriebene Implementierung nach der Referenzbeschreibung von
//! D. J. Bernstein. Das Simulator-Protokoll verschluesselt jedes Datagramm
//! als Ganzes mit einem festen 256-Bit-Schluessel und einer 64-Bit-Nonce
//! aus dem Paket selbst; Streaming ueber Blockgrenzen hinweg wird daher
//! nicht benoetigt.
//!
//! ## Zustandslayout (16 Woerter, little-endian)
//!
//! ```text
//!  c0  k0  k1  k2
//!  k3  c1  n0  n1
//!  b0  b1  c2  k4
//!  k5  k6  k7  c3
//! ```
//!
//! c = "expand 32-byte k", k = Schluessel, n = Nonce, b = Blockzaehler.

/// Sigma-Konstante "expand 32-byte k" als vier LE-Woerter
const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// Anzahl der Doppelrunden (20 Runden insgesamt)
const DOPPELRUNDEN: usize = 10;

#[inline(always)]
fn quarterround(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    state[b] ^= state[a].wrapping_add(state[d]).rotate_left(7);
    state[c] ^= state[b].wrapping_add(state[a]).rotate_left(9);
    state[d] ^= state[c].wrapping_add(state[b]).rotate_left(13);
    state[a] ^= state[d].wrapping_add(state[c]).rotate_left(18);
}

/// Berechnet einen 64-Byte-Keystream-Block fuer den gegebenen Blockindex
fn keystream_block(schluessel: &[u8; 32], nonce: &[u8; 8], block: u64) -> [u8; 64] {
    let mut eingabe = [0u32; 16];
    eingabe[0] = SIGMA[0];
    eingabe[5] = SIGMA[1];
    eingabe[10] = SIGMA[2];
    eingabe[15] = SIGMA[3];
    for i in 0..4 {
        eingabe[1 + i] = u32::from_le_bytes(schluessel[i * 4..i * 4 + 4].try_into().unwrap());
        eingabe[11 + i] = u32::from_le_bytes(schluessel[16 + i * 4..16 + i * 4 + 4].try_into().unwrap());
    }
    eingabe[6] = u32::from_le_bytes(nonce[0..4].try_into().unwrap());
    eingabe[7] = u32::from_le_bytes(nonce[4..8].try_into().unwrap());
    eingabe[8] = block as u32;
    eingabe[9] = (block >> 32) as u32;

    let mut state = eingabe;
    for _ in 0..DOPPELRUNDEN {
        // Spaltenrunde
        quarterround(&mut state, 0, 4, 8, 12);
        quarterround(&mut state, 5, 9, 13, 1);
        quarterround(&mut state, 10, 14, 2, 6);
        quarterround(&mut state, 15, 3, 7, 11);
        // Zeilenrunde
        quarterround(&mut state, 0, 1, 2, 3);
        quarterround(&mut state, 5, 6, 7, 4);
        quarterround(&mut state, 10, 11, 8, 9);
        quarterround(&mut state, 15, 12, 13, 14);
    }

    let mut ausgabe = [0u8; 64];
    for i in 0..16 {
        let wort = state[i].wrapping_add(eingabe[i]);
        ausgabe[i * 4..i * 4 + 4].copy_from_slice(&wort.to_le_bytes());
    }
    ausgabe
}

/// Ver- bzw. entschluesselt `daten` in-place (XOR mit dem Keystream).
///
/// Salsa20 ist symmetrisch: derselbe Aufruf verschluesselt Klartext und
/// entschluesselt Chiffretext. Leere Eingaben sind erlaubt und ein No-Op.
pub fn salsa20_xor(daten: &mut [u8], schluessel: &[u8; 32], nonce: &[u8; 8]) {
    for (block, stueck) in daten.chunks_mut(64).enumerate() {
        let keystream = keystream_block(schluessel, nonce, block as u64);
        for (byte, k) in stueck.iter_mut().zip(keystream.iter()) {
            *byte ^= k;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
