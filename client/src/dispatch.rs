//! Outbound intent dispatcher: turns user actions into wire messages.
//!
//! Each constructor produces exactly one [`WireMessage`]. Time-sensitive
//! intents (guess, leave, rematch proposal) are stamped with the client send
//! time; double-submission guards live in the session state machine, not
//! here.

use rand::Rng;
use shared::{GameEventType, Participant, WireMessage, GAME_CODE_LEN};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const GAME_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Generates a fresh game code for a Create intent.
pub fn generate_game_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GAME_CODE_LEN)
        .map(|_| GAME_CODE_ALPHABET[rng.gen_range(0..GAME_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Join or Create: announce the local player to the session.
pub fn join_message(game_code: &str, user: &Participant) -> WireMessage {
    WireMessage {
        event_type: GameEventType::PlayerJoined,
        game_code: game_code.to_string(),
        user: user.clone(),
        data: None,
        timestamp: None,
    }
}

/// Submit a guess. `year` of `None` is the auto-submitted absent guess
/// produced when the deadline fires without a submission.
pub fn guess_message(game_code: &str, user: &Participant, year: Option<i32>) -> WireMessage {
    WireMessage {
        event_type: GameEventType::Guess,
        game_code: game_code.to_string(),
        user: user.clone(),
        data: year.map(|y| y.to_string()),
        timestamp: Some(now_ms()),
    }
}

/// Ask the server to begin the next round.
pub fn round_start_message(game_code: &str, user: &Participant) -> WireMessage {
    WireMessage {
        event_type: GameEventType::RoundStart,
        game_code: game_code.to_string(),
        user: user.clone(),
        data: None,
        timestamp: None,
    }
}

/// Leave the session.
pub fn leave_message(game_code: &str, user: &Participant) -> WireMessage {
    WireMessage {
        event_type: GameEventType::PlayerLeft,
        game_code: game_code.to_string(),
        user: user.clone(),
        data: None,
        timestamp: Some(now_ms()),
    }
}

/// Propose a rematch after the game is over.
pub fn rematch_proposal_message(game_code: &str, user: &Participant) -> WireMessage {
    WireMessage {
        event_type: GameEventType::RematchProposal,
        game_code: game_code.to_string(),
        user: user.clone(),
        data: None,
        timestamp: Some(now_ms()),
    }
}
