//! pitwall-config – Persistierte App-Konfiguration
//!
//! Ein einzelner JSON-Datensatz (API-Key + Ingenieur-Schalter), at rest
//! mit AES-256-GCM verschluesselt. Der Schluessel wird per scrypt aus der
//! Host-Identitaet abgeleitet, eine kopierte Datei ist auf fremden
//! Maschinen wertlos. Dazu die Key-Validierung gegen den Provider.

pub mod keystore;
pub mod validation;

pub use keystore::{AppConfig, KonfigStore};
pub use validation::api_key_pruefen;
