//! Verschluesselter Konfigurations-Store
//!
//! Auf der Platte liegt ein JSON-Datensatz mit dem verschluesselten
//! API-Key als `iv:tag:ciphertext` (hex) und dem Ingenieur-Schalter.
//! Der AES-256-GCM-Schluessel wird per scrypt aus einer stabilen
//! Host-Identitaet abgeleitet.
//!
//! Lesbar fuer viele, Schreiben laeuft durch die `&self`-Methoden des
//! Stores und damit durch den einen Config-Handler-Task. Eine defekte
//! oder fremde Datei ergibt die leere Standard-Konfiguration, nie einen
//! Absturz.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use parking_lot::RwLock;
use pitwall_core::{PitwallError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Festes Anwendungs-Salt der Schluesselableitung
const KDF_SALT: &[u8] = b"pitwall-config-v1";

/// GCM-Nonce-Laenge in Bytes
const IV_LAENGE: usize = 12;

/// GCM-Auth-Tag-Laenge in Bytes
const TAG_LAENGE: usize = 16;

/// Wie viele Zeichen des Keys der Hint vorne/hinten zeigt
const HINT_ZEICHEN: usize = 4;

// ---------------------------------------------------------------------------
// Hex-Helfer
// ---------------------------------------------------------------------------

fn hex_kodieren(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_dekodieren(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Host-Identitaet und Schluesselableitung
// ---------------------------------------------------------------------------

/// Stabile Identitaet der Maschine aus Umgebungsmerkmalen.
///
/// Reicht damit eine kopierte Konfigurationsdatei auf einem anderen
/// Rechner nicht entschluesselbar ist; ein Angreifer mit Vollzugriff auf
/// die Maschine ist nicht das Bedrohungsmodell.
fn host_identitaet() -> String {
    let hostname = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    let benutzer = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let heim = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default();
    format!("{hostname}|{benutzer}|{heim}|{}", std::env::consts::OS)
}

/// Leitet den 32-Byte-AES-Schluessel aus der Identitaet ab
fn schluessel_ableiten(identitaet: &str) -> Result<[u8; 32]> {
    // Identitaet erst normalisieren, dann dehnen
    let digest = Sha256::digest(identitaet.as_bytes());

    let params = Params::new(14, 8, 1, 32)
        .map_err(|e| PitwallError::Keystore(format!("scrypt-Parameter: {e}")))?;
    let mut schluessel = [0u8; 32];
    scrypt::scrypt(&digest, KDF_SALT, &params, &mut schluessel)
        .map_err(|e| PitwallError::Keystore(format!("scrypt: {e}")))?;
    Ok(schluessel)
}

// ---------------------------------------------------------------------------
// Ver- und Entschluesselung
// ---------------------------------------------------------------------------

/// Verschluesselt einen Klartext als `iv:tag:ciphertext` (hex)
fn verschluesseln(klartext: &str, schluessel: &[u8; 32]) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(schluessel));

    let mut iv = [0u8; IV_LAENGE];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let mut versiegelt = cipher
        .encrypt(
            nonce,
            Payload {
                msg: klartext.as_bytes(),
                aad: &[],
            },
        )
        .map_err(|e| PitwallError::Keystore(format!("Verschluesselung: {e}")))?;

    // aes-gcm haengt das Tag hinten an; Format trennt iv:tag:ciphertext
    let tag = versiegelt.split_off(versiegelt.len() - TAG_LAENGE);
    Ok(format!(
        "{}:{}:{}",
        hex_kodieren(&iv),
        hex_kodieren(&tag),
        hex_kodieren(&versiegelt)
    ))
}

/// Entschluesselt einen `iv:tag:ciphertext`-String
fn entschluesseln(kodiert: &str, schluessel: &[u8; 32]) -> Result<String> {
    let teile: Vec<&str> = kodiert.split(':').collect();
    if teile.len() != 3 {
        return Err(PitwallError::Keystore("Format muss iv:tag:ciphertext sein".into()));
    }
    let iv = hex_dekodieren(teile[0])
        .filter(|iv| iv.len() == IV_LAENGE)
        .ok_or_else(|| PitwallError::Keystore("Ungueltige IV".into()))?;
    let tag = hex_dekodieren(teile[1])
        .filter(|tag| tag.len() == TAG_LAENGE)
        .ok_or_else(|| PitwallError::Keystore("Ungueltiges Tag".into()))?;
    let mut chiffrat = hex_dekodieren(teile[2])
        .ok_or_else(|| PitwallError::Keystore("Ungueltiger Ciphertext".into()))?;
    chiffrat.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(schluessel));
    let klartext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &chiffrat,
                aad: &[],
            },
        )
        .map_err(|_| PitwallError::Keystore("Entschluesselung fehlgeschlagen".into()))?;

    String::from_utf8(klartext).map_err(|_| PitwallError::Keystore("Kein UTF-8".into()))
}

// ---------------------------------------------------------------------------
// AppConfig und Datei-Format
// ---------------------------------------------------------------------------

/// In-Memory-Konfiguration (API-Key im Klartext)
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub engineer_enabled: bool,
}

/// Persistiertes Format: der Key liegt verschluesselt vor
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct KonfigDatei {
    api_key: Option<String>,
    engineer_enabled: bool,
}

// ---------------------------------------------------------------------------
// KonfigStore
// ---------------------------------------------------------------------------

/// Laedt, haelt und persistiert die App-Konfiguration
pub struct KonfigStore {
    pfad: PathBuf,
    schluessel: [u8; 32],
    config: RwLock<AppConfig>,
    /// Ergebnis des letzten Key-Tests (nur im Speicher, nie persistiert)
    api_key_valid: RwLock<Option<bool>>,
}

impl KonfigStore {
    /// Laedt die Konfiguration; eine unlesbare oder fremde Datei ergibt
    /// die leere Standard-Konfiguration (kein Absturz beim Start).
    pub fn laden(pfad: impl Into<PathBuf>) -> Self {
        Self::laden_mit_identitaet(pfad, &host_identitaet())
    }

    /// Wie `laden`, mit expliziter Host-Identitaet (Tests)
    pub fn laden_mit_identitaet(pfad: impl Into<PathBuf>, identitaet: &str) -> Self {
        let pfad = pfad.into();
        let schluessel = match schluessel_ableiten(identitaet) {
            Ok(s) => s,
            Err(e) => {
                // scrypt mit festen Parametern schlaegt praktisch nie fehl
                tracing::error!(fehler = %e, "Schluesselableitung fehlgeschlagen");
                [0u8; 32]
            }
        };

        let config = Self::datei_lesen(&pfad, &schluessel);
        Self {
            pfad,
            schluessel,
            config: RwLock::new(config),
            api_key_valid: RwLock::new(None),
        }
    }

    fn datei_lesen(pfad: &Path, schluessel: &[u8; 32]) -> AppConfig {
        let inhalt = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => inhalt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(pfad = %pfad.display(), "Keine Konfigurationsdatei, Standardwerte");
                return AppConfig::default();
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Konfigurationsdatei nicht lesbar, Standardwerte");
                return AppConfig::default();
            }
        };

        let datei: KonfigDatei = match serde_json::from_str(&inhalt) {
            Ok(datei) => datei,
            Err(e) => {
                tracing::warn!(fehler = %e, "Konfigurationsdatei defekt, Standardwerte");
                return AppConfig::default();
            }
        };

        let api_key = datei.api_key.and_then(|kodiert| {
            match entschluesseln(&kodiert, schluessel) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(
                        fehler = %e,
                        "API-Key nicht entschluesselbar (fremde Maschine?), verworfen"
                    );
                    None
                }
            }
        });

        AppConfig {
            api_key,
            engineer_enabled: datei.engineer_enabled,
        }
    }

    /// Wendet den `GEMINI_API_KEY`-Override an (nur im Speicher, die
    /// Datei bleibt unveraendert)
    pub fn env_override_anwenden(&self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                tracing::info!("API-Key aus Umgebungsvariable uebernommen");
                self.config.write().api_key = Some(key);
            }
        }
    }

    /// Aktueller API-Key (Klartext, nur im Speicher)
    pub fn api_key(&self) -> Option<String> {
        self.config.read().api_key.clone()
    }

    pub fn engineer_enabled(&self) -> bool {
        self.config.read().engineer_enabled
    }

    /// Maskierter Key fuer das Dashboard, z.B. "AIza...k3Pw"
    pub fn api_key_hint(&self) -> String {
        match &self.config.read().api_key {
            Some(key) if key.len() > HINT_ZEICHEN * 2 => {
                format!(
                    "{}...{}",
                    &key[..HINT_ZEICHEN],
                    &key[key.len() - HINT_ZEICHEN..]
                )
            }
            Some(_) => "****".into(),
            None => String::new(),
        }
    }

    /// Ergebnis des letzten Key-Tests (None = nie getestet)
    pub fn api_key_valid(&self) -> Option<bool> {
        *self.api_key_valid.read()
    }

    /// Merkt sich das Ergebnis eines Key-Tests (nur im Speicher)
    pub fn api_key_valid_setzen(&self, valid: Option<bool>) {
        *self.api_key_valid.write() = valid;
    }

    /// Setzt den API-Key und persistiert
    pub fn api_key_setzen(&self, key: String) -> Result<()> {
        self.config.write().api_key = Some(key);
        self.persistieren()
    }

    /// Loescht den API-Key und persistiert
    pub fn api_key_loeschen(&self) -> Result<()> {
        self.config.write().api_key = None;
        *self.api_key_valid.write() = None;
        self.persistieren()
    }

    /// Schaltet den Ingenieur an/aus und persistiert
    pub fn engineer_enabled_setzen(&self, enabled: bool) -> Result<()> {
        self.config.write().engineer_enabled = enabled;
        self.persistieren()
    }

    fn persistieren(&self) -> Result<()> {
        let config = self.config.read().clone();
        let api_key = match &config.api_key {
            Some(key) => Some(verschluesseln(key, &self.schluessel)?),
            None => None,
        };
        let datei = KonfigDatei {
            api_key,
            engineer_enabled: config.engineer_enabled,
        };

        if let Some(eltern) = self.pfad.parent() {
            std::fs::create_dir_all(eltern)?;
        }
        let inhalt = serde_json::to_string_pretty(&datei)?;
        std::fs::write(&self.pfad, inhalt)?;
        tracing::debug!(pfad = %self.pfad.display(), "Konfiguration persistiert");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
