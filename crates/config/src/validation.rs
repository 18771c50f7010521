//! API-Key-Validierung
//!
//! Ein billiger, nicht abgerechneter GET auf die Modell-Liste des
//! Providers. Das Ergebnis wird in eine der festen Fehlerkategorien
//! uebersetzt die das Dashboard anzeigen kann.

use pitwall_core::KeyFehlerKategorie;
use std::time::Duration;

/// Endpunkt der Modell-Liste (Key als Query-Parameter)
const MODELS_ENDPUNKT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Zeitlimit des Validierungs-Requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordnet einen HTTP-Status einer Fehlerkategorie zu (None = Key gueltig)
fn status_kategorisieren(status: u16) -> Option<KeyFehlerKategorie> {
    match status {
        200..=299 => None,
        400 | 401 => Some(KeyFehlerKategorie::Invalid),
        403 => Some(KeyFehlerKategorie::PermissionDenied),
        429 => Some(KeyFehlerKategorie::Quota),
        _ => Some(KeyFehlerKategorie::Unknown),
    }
}

/// Prueft einen API-Key gegen den Provider.
///
/// Gibt `Ok(())` fuer einen gueltigen Key zurueck, sonst die Kategorie.
/// Netzwerkprobleme sind `Network` – der Key kann trotzdem gueltig sein.
pub async fn api_key_pruefen(api_key: &str) -> std::result::Result<(), KeyFehlerKategorie> {
    if api_key.trim().is_empty() {
        return Err(KeyFehlerKategorie::Empty);
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|_| KeyFehlerKategorie::Unknown)?;

    let antwort = client
        .get(MODELS_ENDPUNKT)
        .query(&[("key", api_key), ("pageSize", "1")])
        .send()
        .await
        .map_err(|e| {
            tracing::debug!(fehler = %e, "Key-Validierung: Netzwerkfehler");
            KeyFehlerKategorie::Network
        })?;

    let status = antwort.status().as_u16();
    match status_kategorisieren(status) {
        None => {
            tracing::info!("API-Key-Validierung erfolgreich");
            Ok(())
        }
        Some(kategorie) => {
            tracing::info!(status, kategorie = %kategorie, "API-Key abgelehnt");
            Err(kategorie)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
