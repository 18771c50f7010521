//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Umgebungsvariablen uebersteuern einzelne Werte:
//! `PS5_IP` (Discovery umgehen), `WS_PORT` (Fan-out-Port).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Telemetrie-Empfang und Discovery
    pub telemetrie: TelemetrieEinstellungen,
    /// Client-Fan-out (WebSocket)
    pub fanout: FanoutEinstellungen,
    /// Renningenieur-Einstellungen
    pub engineer: EngineerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Dateipfade
    pub speicher: SpeicherEinstellungen,
}

/// Telemetrie-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrieEinstellungen {
    /// Port auf dem die Konsole Telemetrie sendet
    pub empfangs_port: u16,
    /// Port fuer Heartbeats Richtung Konsole
    pub sende_port: u16,
    /// Heartbeat-Intervall in Sekunden
    pub heartbeat_intervall_s: u64,
    /// Feste Konsolen-IP (leer = Broadcast-Discovery)
    pub konsole_ip: Option<IpAddr>,
}

impl Default for TelemetrieEinstellungen {
    fn default() -> Self {
        Self {
            empfangs_port: 33740,
            sende_port: 33739,
            heartbeat_intervall_s: 10,
            konsole_ip: None,
        }
    }
}

/// Fan-out-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutEinstellungen {
    /// Bind-Adresse des WebSocket-Listeners
    pub bind_adresse: String,
    /// Port des WebSocket-Listeners
    pub ws_port: u16,
}

impl Default for FanoutEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 4401,
        }
    }
}

/// Renningenieur-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineerEinstellungen {
    /// Start-Verbosity der Callout-Engine (1–3)
    pub verbosity: u8,
    /// Live-Modell beim Sprachprovider
    pub modell: String,
}

impl Default for EngineerEinstellungen {
    fn default() -> Self {
        Self {
            verbosity: 2,
            modell: "models/gemini-2.0-flash-live-001".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Dateipfade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeicherEinstellungen {
    /// Pfad der verschluesselten App-Konfiguration
    pub konfig_pfad: String,
    /// Verzeichnis der NDJSON-Session-Logs
    pub session_verzeichnis: String,
}

impl Default for SpeicherEinstellungen {
    fn default() -> Self {
        Self {
            konfig_pfad: "pitwall-config.json".into(),
            session_verzeichnis: "sessions".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(pfad = pfad, "Keine Konfigurationsdatei, Standardwerte");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.env_overrides_anwenden();
        Ok(config)
    }

    /// Wendet `PS5_IP` und `WS_PORT` aus der Umgebung an
    fn env_overrides_anwenden(&mut self) {
        if let Ok(ip) = std::env::var("PS5_IP") {
            match ip.parse() {
                Ok(adresse) => {
                    tracing::info!(adresse = %ip, "PS5_IP aus Umgebung uebernommen");
                    self.telemetrie.konsole_ip = Some(adresse);
                }
                Err(e) => tracing::warn!(wert = %ip, fehler = %e, "PS5_IP nicht parsebar"),
            }
        }
        if let Ok(port) = std::env::var("WS_PORT") {
            match port.parse() {
                Ok(port) => self.fanout.ws_port = port,
                Err(e) => tracing::warn!(wert = %port, fehler = %e, "WS_PORT nicht parsebar"),
            }
        }
    }

    /// Gibt die vollstaendige Bind-Adresse des WebSocket-Listeners zurueck
    pub fn ws_bind_adresse(&self) -> String {
        format!("{}:{}", self.fanout.bind_adresse, self.fanout.ws_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.telemetrie.empfangs_port, 33740);
        assert_eq!(cfg.telemetrie.sende_port, 33739);
        assert_eq!(cfg.fanout.ws_port, 4401);
        assert_eq!(cfg.engineer.verbosity, 2);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn ws_bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_adresse(), "0.0.0.0:4401");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [telemetrie]
            heartbeat_intervall_s = 5
            konsole_ip = "192.168.1.50"

            [fanout]
            ws_port = 5500
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.telemetrie.heartbeat_intervall_s, 5);
        assert_eq!(
            cfg.telemetrie.konsole_ip,
            Some("192.168.1.50".parse().unwrap())
        );
        assert_eq!(cfg.fanout.ws_port, 5500);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.telemetrie.empfangs_port, 33740);
        assert_eq!(cfg.engineer.verbosity, 2);
    }
}
