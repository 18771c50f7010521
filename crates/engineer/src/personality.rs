//! Persoenlichkeiten und System-Anweisung
//!
//! Die System-Anweisung einer Session ist die Verkettung aus festem
//! Basis-Block, Stil-Prompt der Persoenlichkeit und optionalen freien
//! Anweisungen des Benutzers. Der Basis-Block ist nicht ueberschreibbar;
//! Persoenlichkeit und Zusatztext duerfen nur den Stil veraendern.

use pitwall_core::Personality;

/// Fester Basis-Block der System-Anweisung.
///
/// Beschreibt Rolle, Laengenbudget, Funksprache und die Konventionen der
/// eingehenden Nachrichten (`[CONTEXT UPDATE]`, `[CALLOUT: <typ>]`).
const BASIS_ANWEISUNG: &str = "\
You are a race engineer on the pit wall, speaking to your driver over team radio \
during a live session. Keep every transmission to one or two short sentences; the \
driver is at racing speed and cannot process more. Use natural motorsport radio \
language: lap times as 'one forty-two three', deltas as 'five tenths', fuel in laps, \
tyres by corner of the car.\n\
\n\
You receive two kinds of system messages. Lines starting with [CONTEXT UPDATE] are \
background telemetry; absorb them silently and do not reply. Lines starting with \
[CALLOUT: <type>] are information you must relay to the driver now, rephrased in \
your own voice. Everything else is the driver talking to you on the radio: answer \
helpfully and concretely from the latest telemetry you have.\n\
\n\
Never invent numbers that were not given to you. If the driver asks for data you \
do not have, say so briefly.";

/// Eingebaute Persoenlichkeiten.
///
/// Id, Anzeigename, Stil-Prompt und Provider-Stimme; der Stil-Prompt wird
/// hinter den Basis-Block gehaengt.
pub fn eingebaute_persoenlichkeiten() -> Vec<Personality> {
    vec![
        Personality {
            id: "professional".into(),
            display_name: "The Professional".into(),
            prompt: "Your style: calm, precise, unflappable. Short factual calls, \
                     no exclamation, the occasional dry understatement. Think \
                     veteran endurance-racing engineer."
                .into(),
            voice: "Charon".into(),
        },
        Personality {
            id: "enthusiastic".into(),
            display_name: "The Motivator".into(),
            prompt: "Your style: energetic and encouraging. Celebrate good laps, \
                     frame problems as challenges, keep the driver's spirits up \
                     without ever drowning them in words."
                .into(),
            voice: "Puck".into(),
        },
        Personality {
            id: "laconic".into(),
            display_name: "The Laconic".into(),
            prompt: "Your style: minimal words, maximum signal. Single clipped \
                     phrases where possible. You only elaborate when the driver \
                     explicitly asks."
                .into(),
            voice: "Kore".into(),
        },
    ]
}

/// Findet eine eingebaute Persoenlichkeit per Id
pub fn persoenlichkeit_finden(id: &str) -> Option<Personality> {
    eingebaute_persoenlichkeiten()
        .into_iter()
        .find(|p| p.id == id)
}

/// Standard-Persoenlichkeit wenn der Client nichts waehlt
pub fn standard_persoenlichkeit() -> Personality {
    eingebaute_persoenlichkeiten()
        .into_iter()
        .next()
        .expect("Roster darf nicht leer sein")
}

/// Setzt die System-Anweisung einer Session zusammen:
/// Basis-Block, dann Stil-Prompt, dann optionale freie Anweisungen.
pub fn system_anweisung(personality: &Personality, custom: Option<&str>) -> String {
    let mut anweisung = String::from(BASIS_ANWEISUNG);
    anweisung.push_str("\n\n");
    anweisung.push_str(&personality.prompt);
    if let Some(zusatz) = custom {
        let zusatz = zusatz.trim();
        if !zusatz.is_empty() {
            anweisung.push_str("\n\nAdditional instructions from the driver:\n");
            anweisung.push_str(zusatz);
        }
    }
    anweisung
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
