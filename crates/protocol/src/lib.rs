//! pitwall-protocol – GT7-Wire-Protokoll
//!
//! Dieses Crate buendelt alles was das Simulator-Protokoll betrifft:
//! die Salsa20-Stromchiffre (bewusst ohne externe Abhaengigkeit, das
//! Protokoll verwendet sie mit einem festen ASCII-Schluessel) und den
//! Decoder der verschluesselte 296-Byte-Datagramme in `Frame`-Werte
//! uebersetzt.

pub mod frame;
pub mod salsa;

pub use frame::{frame_dekodieren, frame_kodieren, FRAME_GROESSE, MAGIC};
pub use salsa::salsa20_xor;
