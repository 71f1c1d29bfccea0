//! Wire-protocol vocabulary shared by the session layer and its tests.
//!
//! The server pushes complete game-state snapshots as JSON objects with
//! camelCase keys and screaming-snake enum values; the client answers with
//! [`WireMessage`] intents. Everything here mirrors that contract exactly so
//! round-trips are bit-for-bit stable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod codec;

/// Seconds between liveness probes on an open connection.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;
/// Delay before a reconnection attempt after an abnormal closure.
pub const RECONNECT_DELAY_SECS: u64 = 2;
/// Consecutive reconnection attempts before the session is declared dead.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Local countdown before the first round starts.
pub const START_COUNTDOWN_SECS: u32 = 3;
/// How long the round result stays on screen before the next round.
pub const RESULTS_COUNTDOWN_SECS: u32 = 5;
/// Per-round deadline for submitting a guess once the server starts the clock.
pub const GUESS_DEADLINE_SECS: u32 = 30;
/// Window for the opponent to answer a rematch proposal.
pub const REMATCH_WINDOW_SECS: u32 = 10;

/// Bare liveness probe token, distinct from any JSON message.
pub const HEARTBEAT_PROBE: &str = "PING";
/// Liveness reply token sent back by the server.
pub const HEARTBEAT_REPLY: &str = "PONG";

/// Length of a generated game code.
pub const GAME_CODE_LEN: usize = 4;

/// Score a player needs to take the game. Display only; the server decides
/// when the game is over.
pub const WINNING_SCORE: u32 = 4;

/// One player as the server describes them, including the cumulative
/// win/loss record carried across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            wins: 0,
            losses: 0,
        }
    }
}

/// Event types of outbound client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventType {
    Guess,
    PlayerJoined,
    PlayerLeft,
    RoundStart,
    RematchProposal,
    Rematch,
}

/// Outbound intent on the wire.
///
/// `data` carries intent-specific payload (the guessed year as a string, or
/// nothing); `timestamp` is the client send time in milliseconds for
/// time-sensitive intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub event_type: GameEventType,
    pub game_code: String,
    pub user: Participant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Phase names the server uses in snapshots. The client never assumes these
/// arrive in order; the latest snapshot always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerPhase {
    GameStart,
    WaitingForGuesses,
    TimerStart,
    RoundOver,
    GameOver,
    RematchProposed,
    GameExit,
}

/// The historical event being guessed this round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub event: String,
    pub year: i32,
}

/// One participant's guess record: value-or-absent plus submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRecord {
    pub guess: Option<i32>,
    pub timestamp: u64,
}

/// Authoritative, complete round/score state pushed by the server.
/// Superseded wholesale by the next snapshot, never patched field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub game_code: String,
    pub users: Vec<Participant>,
    pub current_state: ServerPhase,
    #[serde(default)]
    pub current_event: Option<HistoricalEvent>,
    #[serde(default)]
    pub player_scores: HashMap<String, u32>,
    #[serde(default)]
    pub current_guesses: HashMap<String, GuessRecord>,
}
