//! UDP-Discovery und Telemetrie-Empfang
//!
//! Die Konsole unicastet Telemetrie an den Absender des letzten Heartbeats.
//! Solange der Peer unbekannt ist, geht der Heartbeat an alle gerichteten
//! Broadcast-Adressen der lokalen IPv4-Interfaces; sobald das erste gueltige
//! Datagramm eintrifft, kollabieren die Ziele auf genau diesen Absender.
//!
//! ## Zustandsmaschine
//!
//! ```text
//! unlocked --[erster dekodierbarer Frame]--> locked
//!    |                                         |
//!    +--- Heartbeat an alle Broadcast-Ziele    +--- Heartbeat nur an Peer
//! ```
//!
//! `locked` wird innerhalb einer Prozesslebensdauer nie wieder verlassen.
//! Ein explizit konfigurierter Peer (PS5_IP) startet direkt in `locked`.

use pitwall_core::{Frame, PitwallError, Result};
use pitwall_protocol::{frame_dekodieren, FRAME_GROESSE};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

/// Heartbeat-Nutzlast: ein einzelnes ASCII-'A' (Paketvariante A)
const HEARTBEAT: [u8; 1] = [b'A'];

/// Empfangspuffer – grosszuegig ueber der Frame-Groesse
const UDP_BUFFER_SIZE: usize = 2048;

/// Alle wie viele Heartbeats die Verwerfungszaehler geloggt werden
const STATS_INTERVALL: u64 = 6;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Telemetrie-Empfaengers
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Port auf dem die Konsole Telemetrie sendet (wir binden hier)
    pub empfangs_port: u16,
    /// Port auf dem die Konsole Heartbeats erwartet
    pub sende_port: u16,
    /// Heartbeat-Intervall (die Konsole vergisst den Empfaenger nach ~20 s)
    pub heartbeat_intervall: Duration,
    /// Expliziter Peer – ueberspringt die Broadcast-Discovery
    pub expliziter_peer: Option<IpAddr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            empfangs_port: 33740,
            sende_port: 33739,
            heartbeat_intervall: Duration::from_secs(10),
            expliziter_peer: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Broadcast-Ziele
// ---------------------------------------------------------------------------

/// Gerichtete Broadcast-Adresse eines Interfaces: `addr | !maske`
fn gerichtete_broadcast_adresse(addr: Ipv4Addr, maske: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) | !u32::from(maske))
}

/// Berechnet die Heartbeat-Ziele aus den lokalen IPv4-Interfaces.
///
/// Loopback-Interfaces werden uebersprungen. Ohne verwertbares Interface
/// bleibt die Limited-Broadcast-Adresse 255.255.255.255 als Rueckfall.
fn broadcast_ziele(sende_port: u16) -> Vec<SocketAddr> {
    let mut ziele = Vec::new();

    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if iface.is_loopback() {
                    continue;
                }
                if let if_addrs::IfAddr::V4(v4) = iface.addr {
                    let broadcast = gerichtete_broadcast_adresse(v4.ip, v4.netmask);
                    ziele.push(SocketAddr::new(IpAddr::V4(broadcast), sende_port));
                }
            }
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Interface-Enumeration fehlgeschlagen");
        }
    }

    if ziele.is_empty() {
        ziele.push(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::BROADCAST),
            sende_port,
        ));
    }
    ziele
}

// ---------------------------------------------------------------------------
// TelemetrieEmpfaenger
// ---------------------------------------------------------------------------

/// Bindet den Telemetrie-Socket, sendet Heartbeats und liefert dekodierte
/// Frames in den Frames-Kanal.
pub struct TelemetrieEmpfaenger {
    socket: UdpSocket,
    config: DiscoveryConfig,
    /// Aktuelle Heartbeat-Ziele (Broadcast-Adressen oder der Peer)
    ziele: Vec<SocketAddr>,
    /// Nach dem ersten gueltigen Frame dauerhaft true
    gesperrt: bool,
    frames_tx: mpsc::Sender<Arc<Frame>>,
    /// Zu kurze oder nicht dekodierbare Datagramme
    verworfen: u64,
    /// Frames die wegen vollem Kanal fallengelassen wurden
    ueberlauf: u64,
}

impl TelemetrieEmpfaenger {
    /// Bindet den UDP-Socket und bereitet die Discovery vor.
    ///
    /// Ein Bind-Fehler ist fatal – ohne Empfangsport gibt es keine Pipeline.
    pub async fn binden(
        config: DiscoveryConfig,
        frames_tx: mpsc::Sender<Arc<Frame>>,
    ) -> Result<Self> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.empfangs_port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| PitwallError::Bind {
                adresse: bind_addr.to_string(),
                quelle: e,
            })?;
        socket
            .set_broadcast(true)
            .map_err(|e| PitwallError::Netzwerk(format!("set_broadcast: {e}")))?;

        let (ziele, gesperrt) = match config.expliziter_peer {
            Some(peer) => {
                tracing::info!(peer = %peer, "Expliziter Peer konfiguriert, Discovery uebersprungen");
                (vec![SocketAddr::new(peer, config.sende_port)], true)
            }
            None => (broadcast_ziele(config.sende_port), false),
        };

        tracing::info!(
            addr = %bind_addr,
            ziele = ?ziele,
            "Telemetrie-Socket gebunden"
        );

        Ok(Self {
            socket,
            config,
            ziele,
            gesperrt,
            frames_tx,
            verworfen: 0,
            ueberlauf: 0,
        })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Aktuelle Heartbeat-Ziele (fuer Tests und Diagnose)
    pub fn ziele(&self) -> &[SocketAddr] {
        &self.ziele
    }

    /// Discovery abgeschlossen?
    pub fn ist_gesperrt(&self) -> bool {
        self.gesperrt
    }

    /// Startet Empfangs-Loop und Heartbeat-Ticker (laeuft bis Shutdown).
    ///
    /// Der erste Heartbeat geht sofort raus, danach im konfigurierten
    /// Intervall. Verpasste Ticks werden nicht nachgeholt.
    pub async fn starten(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_intervall);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut heartbeat_zaehler: u64 = 0;

        tracing::info!("Telemetrie-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.heartbeat_senden().await;
                    heartbeat_zaehler += 1;
                    if heartbeat_zaehler % STATS_INTERVALL == 0 && self.verworfen + self.ueberlauf > 0 {
                        tracing::debug!(
                            verworfen = self.verworfen,
                            ueberlauf = self.ueberlauf,
                            "Datagramm-Statistik"
                        );
                    }
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, absender)) => {
                            self.datagramm_verarbeiten(&buf[..len], absender);
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Telemetrie-Empfaenger: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!(
            verworfen = self.verworfen,
            ueberlauf = self.ueberlauf,
            "Telemetrie-Empfangs-Loop beendet"
        );
    }

    /// Sendet den Heartbeat an alle aktuellen Ziele.
    ///
    /// Einzelne Sendefehler werden geloggt und ignoriert – waehrend der
    /// Discovery ist das Netz oft asymmetrisch.
    async fn heartbeat_senden(&self) {
        for ziel in &self.ziele {
            if let Err(e) = self.socket.send_to(&HEARTBEAT, ziel).await {
                tracing::debug!(ziel = %ziel, fehler = %e, "Heartbeat-Sendefehler");
            } else {
                tracing::trace!(ziel = %ziel, gesperrt = self.gesperrt, "Heartbeat gesendet");
            }
        }
    }

    /// Verarbeitet ein eingehendes Datagramm.
    ///
    /// Hot Path: zu kurze Datagramme werden ohne Log verworfen (gezaehlt),
    /// der erste dekodierbare Frame sperrt die Discovery auf den Absender.
    fn datagramm_verarbeiten(&mut self, daten: &[u8], absender: SocketAddr) {
        if daten.len() < FRAME_GROESSE {
            self.verworfen += 1;
            return;
        }

        let frame = match frame_dekodieren(daten) {
            Some(f) => f,
            None => {
                self.verworfen += 1;
                return;
            }
        };

        if !self.gesperrt {
            self.gesperrt = true;
            self.ziele = vec![SocketAddr::new(absender.ip(), self.config.sende_port)];
            tracing::info!(peer = %absender.ip(), "Konsole entdeckt, Discovery gesperrt");
        }

        // Drop-newest: Echtzeitdaten veralten schneller als der Kanal leert
        if self.frames_tx.try_send(Arc::new(frame)).is_err() {
            self.ueberlauf += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
