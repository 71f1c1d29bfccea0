//! Session state machine: reconciles server snapshots with local countdowns.
//!
//! [`Session::apply`] is the single reducer every event goes through:
//! server snapshots, timer ticks and expirations, and user intents. It
//! returns the side effects to perform (messages to send, timers to arm or
//! cancel) and never touches the transport itself, so the whole transition
//! table is testable without a socket.
//!
//! Three hazards shape the design: snapshots for a stale game code are
//! dropped, timer expirations that outlive the phase that armed them are
//! ignored via a monotonically increasing phase epoch, and a momentarily
//! absent opponent stays an explicit `None` instead of a crash.

use crate::dispatch;
use log::{debug, info, warn};
use shared::{
    GuessRecord, HistoricalEvent, Participant, ServerPhase, Snapshot, WireMessage,
    GUESS_DEADLINE_SECS, REMATCH_WINDOW_SECS, RESULTS_COUNTDOWN_SECS, START_COUNTDOWN_SECS,
};

/// Local session phase. Exactly one is active; the server's snapshot phase
/// always overwrites it, even when it "jumps".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForPlayers,
    Starting,
    AwaitingGuesses,
    RoundOver,
    GameOver,
    Exited,
}

/// Named local countdowns. Owned by the session; the timer subsystem only
/// ticks and reports expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    StartCountdown,
    ResultsCountdown,
    GuessDeadline,
    RematchWindow,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::StartCountdown,
        TimerKind::ResultsCountdown,
        TimerKind::GuessDeadline,
        TimerKind::RematchWindow,
    ];
}

/// A user action requested through the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Create,
    Join { code: String },
    SubmitGuess { year: i32 },
    Leave,
    ProposeRematch,
}

/// Everything the reducer consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Snapshot(Snapshot),
    TimerTick {
        kind: TimerKind,
        remaining: u32,
        epoch: u64,
    },
    TimerExpired {
        kind: TimerKind,
        epoch: u64,
    },
    Intent(UserIntent),
    /// The transport gave up reconnecting; the session is over.
    ConnectionLost,
}

/// Side effects the runner performs after a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(WireMessage),
    Arm {
        kind: TimerKind,
        seconds: u32,
        epoch: u64,
    },
    Cancel(TimerKind),
}

/// Outcome of a finished round, from the local player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    PlayerWins,
    OpponentWins,
    Tie,
}

/// What the rendering layer consumes: one consistent answer to "what round
/// are we in and what should the player see right now".
#[derive(Debug, Clone, PartialEq)]
pub struct RoundView {
    pub phase: Phase,
    pub game_code: Option<String>,
    /// 1-based round number for display, derived from the score sum.
    pub round: u32,
    pub event: Option<String>,
    pub player_score: u32,
    pub opponent_score: u32,
    pub player_guess: Option<i32>,
    pub opponent_guess: Option<i32>,
    pub opponent_name: Option<String>,
    pub result: Option<String>,
    pub countdown: Option<u32>,
    pub rematch_votes: u32,
    pub waiting_for_opponent: bool,
}

/// The single session state struct, mutated only through [`Session::apply`].
#[derive(Debug)]
pub struct Session {
    identity: Participant,
    game_code: Option<String>,
    phase: Phase,
    epoch: u64,
    opponent: Option<Participant>,
    event: Option<HistoricalEvent>,
    player_score: u32,
    opponent_score: u32,
    player_guess: Option<GuessRecord>,
    opponent_guess: Option<GuessRecord>,
    has_submitted: bool,
    result: Option<String>,
    round: u32,
    countdown: Option<u32>,
    rematch_votes: u32,
}

impl Session {
    pub fn new(identity: Participant) -> Self {
        Self {
            identity,
            game_code: None,
            phase: Phase::WaitingForPlayers,
            epoch: 0,
            opponent: None,
            event: None,
            player_score: 0,
            opponent_score: 0,
            player_guess: None,
            opponent_guess: None,
            has_submitted: false,
            result: None,
            round: 0,
            countdown: None,
            rematch_votes: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn game_code(&self) -> Option<&str> {
        self.game_code.as_deref()
    }

    pub fn view(&self) -> RoundView {
        RoundView {
            phase: self.phase,
            game_code: self.game_code.clone(),
            round: self.round + 1,
            event: self.event.as_ref().map(|e| e.event.clone()),
            player_score: self.player_score,
            opponent_score: self.opponent_score,
            player_guess: guess_value(self.player_guess.as_ref()).map(|(year, _)| year),
            opponent_guess: guess_value(self.opponent_guess.as_ref()).map(|(year, _)| year),
            opponent_name: self.opponent.as_ref().map(|o| o.name.clone()),
            result: self.result.clone(),
            countdown: self.countdown,
            rematch_votes: self.rematch_votes,
            waiting_for_opponent: self.waiting_for_opponent(),
        }
    }

    /// Applies one event and returns the effects to perform.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            SessionEvent::TimerTick {
                kind,
                remaining,
                epoch,
            } => self.on_tick(kind, remaining, epoch),
            SessionEvent::TimerExpired { kind, epoch } => self.on_expiry(kind, epoch),
            SessionEvent::Intent(intent) => self.on_intent(intent),
            SessionEvent::ConnectionLost => self.on_connection_lost(),
        }
    }

    fn on_snapshot(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        let Some(active) = self.game_code.clone() else {
            debug!("snapshot dropped: no active session");
            return Vec::new();
        };
        if snapshot.game_code != active {
            debug!(
                "stale snapshot for game {} (active {})",
                snapshot.game_code, active
            );
            return Vec::new();
        }

        // Resolve both participant slots once, by identity, never by
        // array position.
        let me = snapshot
            .users
            .iter()
            .find(|u| u.name == self.identity.name)
            .cloned();
        self.opponent = snapshot
            .users
            .iter()
            .find(|u| u.name != self.identity.name)
            .cloned();

        let my_id = match me {
            Some(me) => {
                self.identity.id = me.id.clone();
                self.identity.wins = me.wins;
                self.identity.losses = me.losses;
                me.id
            }
            None => {
                warn!("snapshot missing self participant {}", self.identity.name);
                self.identity.id.clone()
            }
        };

        // Scores and guesses are taken verbatim, keyed by participant id.
        self.player_score = snapshot.player_scores.get(&my_id).copied().unwrap_or(0);
        self.opponent_score = self
            .opponent
            .as_ref()
            .and_then(|o| snapshot.player_scores.get(&o.id))
            .copied()
            .unwrap_or(0);
        self.player_guess = snapshot.current_guesses.get(&my_id).copied();
        self.opponent_guess = self
            .opponent
            .as_ref()
            .and_then(|o| snapshot.current_guesses.get(&o.id))
            .copied();
        if guess_value(self.player_guess.as_ref()).is_some() {
            self.has_submitted = true;
        }
        if let Some(event) = snapshot.current_event {
            self.event = Some(event);
        }

        let mut effects = Vec::new();
        match snapshot.current_state {
            ServerPhase::GameStart => {
                if self.transition(Phase::Starting, &mut effects) {
                    self.arm(TimerKind::StartCountdown, START_COUNTDOWN_SECS, &mut effects);
                }
            }
            ServerPhase::WaitingForGuesses => {
                if self.transition(Phase::AwaitingGuesses, &mut effects) {
                    self.begin_round();
                }
            }
            ServerPhase::TimerStart => {
                if self.transition(Phase::AwaitingGuesses, &mut effects) {
                    self.begin_round();
                }
                if !self.has_submitted {
                    self.arm(TimerKind::GuessDeadline, GUESS_DEADLINE_SECS, &mut effects);
                }
            }
            ServerPhase::RoundOver => {
                if self.transition(Phase::RoundOver, &mut effects) {
                    match &self.event {
                        Some(event) => {
                            let (_, text) = round_outcome(
                                self.player_guess.as_ref(),
                                self.opponent_guess.as_ref(),
                                event.year,
                            );
                            self.result = Some(text);
                        }
                        None => {
                            warn!("round over without a current event; result unknown");
                            self.result = None;
                        }
                    }
                    self.arm(
                        TimerKind::ResultsCountdown,
                        RESULTS_COUNTDOWN_SECS,
                        &mut effects,
                    );
                }
            }
            ServerPhase::GameOver => {
                if self.transition(Phase::GameOver, &mut effects) {
                    self.result = Some(if self.player_score > self.opponent_score {
                        "You won the game!".to_string()
                    } else {
                        match &self.opponent {
                            Some(opponent) => format!("{} has won the game.", opponent.name),
                            None => "You lost the game.".to_string(),
                        }
                    });
                }
            }
            ServerPhase::RematchProposed => {
                self.transition(Phase::GameOver, &mut effects);
                self.rematch_votes = (self.rematch_votes + 1).min(2);
                self.arm(TimerKind::RematchWindow, REMATCH_WINDOW_SECS, &mut effects);
            }
            ServerPhase::GameExit => {
                info!("game {} ended by server, returning to lobby", active);
                self.reset(&mut effects);
            }
        }
        effects
    }

    fn on_tick(&mut self, kind: TimerKind, remaining: u32, epoch: u64) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("stale tick for {:?} ignored", kind);
            return Vec::new();
        }
        self.countdown = Some(remaining);
        Vec::new()
    }

    fn on_expiry(&mut self, kind: TimerKind, epoch: u64) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("stale expiry for {:?} ignored", kind);
            return Vec::new();
        }

        let mut effects = Vec::new();
        match (kind, self.phase) {
            (TimerKind::StartCountdown, Phase::Starting) => {
                self.transition(Phase::AwaitingGuesses, &mut effects);
                self.begin_round();
                if let Some(code) = &self.game_code {
                    effects.push(Effect::Send(dispatch::round_start_message(
                        code,
                        &self.identity,
                    )));
                }
            }
            (TimerKind::GuessDeadline, Phase::AwaitingGuesses) => {
                if !self.has_submitted {
                    // Auto-submit an absent guess exactly once.
                    self.has_submitted = true;
                    self.countdown = None;
                    if let Some(code) = &self.game_code {
                        info!("guess deadline reached, submitting absent guess");
                        effects.push(Effect::Send(dispatch::guess_message(
                            code,
                            &self.identity,
                            None,
                        )));
                    }
                }
            }
            (TimerKind::ResultsCountdown, Phase::RoundOver) => {
                self.transition(Phase::AwaitingGuesses, &mut effects);
                self.player_guess = None;
                self.opponent_guess = None;
                self.begin_round();
                if let Some(code) = &self.game_code {
                    effects.push(Effect::Send(dispatch::round_start_message(
                        code,
                        &self.identity,
                    )));
                }
            }
            (TimerKind::RematchWindow, Phase::GameOver) => {
                info!("rematch window closed, returning to lobby");
                self.reset(&mut effects);
            }
            (kind, phase) => {
                debug!("expiry of {:?} ignored in phase {:?}", kind, phase);
            }
        }
        effects
    }

    fn on_intent(&mut self, intent: UserIntent) -> Vec<Effect> {
        match intent {
            UserIntent::Create => {
                let mut effects = Vec::new();
                self.reset(&mut effects);
                let code = dispatch::generate_game_code();
                info!("creating game {}", code);
                effects.push(Effect::Send(dispatch::join_message(&code, &self.identity)));
                self.game_code = Some(code);
                effects
            }
            UserIntent::Join { code } => {
                let mut effects = Vec::new();
                self.reset(&mut effects);
                let code = code.trim().to_uppercase();
                info!("joining game {}", code);
                effects.push(Effect::Send(dispatch::join_message(&code, &self.identity)));
                self.game_code = Some(code);
                effects
            }
            UserIntent::SubmitGuess { year } => {
                if self.phase != Phase::AwaitingGuesses || self.has_submitted {
                    debug!("guess ignored in phase {:?}", self.phase);
                    return Vec::new();
                }
                let Some(code) = self.game_code.clone() else {
                    return Vec::new();
                };
                self.has_submitted = true;
                self.countdown = None;
                let message = dispatch::guess_message(&code, &self.identity, Some(year));
                self.player_guess = Some(GuessRecord {
                    guess: Some(year),
                    timestamp: message.timestamp.unwrap_or_else(dispatch::now_ms),
                });
                vec![
                    Effect::Cancel(TimerKind::GuessDeadline),
                    Effect::Send(message),
                ]
            }
            UserIntent::Leave => {
                let mut effects = Vec::new();
                if let Some(code) = self.game_code.clone() {
                    info!("leaving game {}", code);
                    effects.push(Effect::Send(dispatch::leave_message(&code, &self.identity)));
                }
                self.reset(&mut effects);
                effects
            }
            UserIntent::ProposeRematch => {
                if self.phase != Phase::GameOver {
                    debug!("rematch proposal ignored in phase {:?}", self.phase);
                    return Vec::new();
                }
                let Some(code) = self.game_code.clone() else {
                    return Vec::new();
                };
                self.rematch_votes = (self.rematch_votes + 1).min(2);
                vec![Effect::Send(dispatch::rematch_proposal_message(
                    &code,
                    &self.identity,
                ))]
            }
        }
    }

    fn on_connection_lost(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for kind in TimerKind::ALL {
            effects.push(Effect::Cancel(kind));
        }
        self.epoch += 1;
        self.phase = Phase::Exited;
        self.countdown = None;
        effects
    }

    /// Moves to `next` if different: cancels the timer the old phase owned
    /// and bumps the epoch so racing expirations are ignored.
    fn transition(&mut self, next: Phase, effects: &mut Vec<Effect>) -> bool {
        if self.phase == next {
            return false;
        }
        if let Some(kind) = owned_timer(self.phase) {
            effects.push(Effect::Cancel(kind));
        }
        debug!("phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.epoch += 1;
        self.countdown = None;
        true
    }

    fn arm(&mut self, kind: TimerKind, seconds: u32, effects: &mut Vec<Effect>) {
        effects.push(Effect::Arm {
            kind,
            seconds,
            epoch: self.epoch,
        });
        self.countdown = Some(seconds);
    }

    fn begin_round(&mut self) {
        // Display-only approximation; the server never sends a round number.
        self.round = self.player_score + self.opponent_score;
        self.result = None;
        self.has_submitted = guess_value(self.player_guess.as_ref()).is_some();
    }

    fn reset(&mut self, effects: &mut Vec<Effect>) {
        for kind in TimerKind::ALL {
            effects.push(Effect::Cancel(kind));
        }
        self.epoch += 1;
        self.phase = Phase::WaitingForPlayers;
        self.game_code = None;
        self.opponent = None;
        self.event = None;
        self.player_score = 0;
        self.opponent_score = 0;
        self.player_guess = None;
        self.opponent_guess = None;
        self.has_submitted = false;
        self.result = None;
        self.round = 0;
        self.countdown = None;
        self.rematch_votes = 0;
    }

    fn waiting_for_opponent(&self) -> bool {
        match self.phase {
            Phase::WaitingForPlayers => self.game_code.is_some() && self.opponent.is_none(),
            Phase::AwaitingGuesses => {
                self.has_submitted && guess_value(self.opponent_guess.as_ref()).is_none()
            }
            _ => false,
        }
    }
}

fn owned_timer(phase: Phase) -> Option<TimerKind> {
    match phase {
        Phase::Starting => Some(TimerKind::StartCountdown),
        Phase::AwaitingGuesses => Some(TimerKind::GuessDeadline),
        Phase::RoundOver => Some(TimerKind::ResultsCountdown),
        Phase::GameOver => Some(TimerKind::RematchWindow),
        Phase::WaitingForPlayers | Phase::Exited => None,
    }
}

fn guess_value(record: Option<&GuessRecord>) -> Option<(i32, u64)> {
    record.and_then(|r| r.guess.map(|g| (g, r.timestamp)))
}

/// Computes the round outcome from both guess records and the event year.
///
/// Absent beats nobody: a missing record or a null guess counts as absent.
/// Distances tie-break on submission timestamp; equal timestamps are a
/// perfect tie.
pub fn round_outcome(
    player: Option<&GuessRecord>,
    opponent: Option<&GuessRecord>,
    year: i32,
) -> (RoundOutcome, String) {
    let player = guess_value(player);
    let opponent = guess_value(opponent);

    let win = || (RoundOutcome::PlayerWins, "You won the round!".to_string());
    let loss = || (RoundOutcome::OpponentWins, "You lost the round.".to_string());

    match (player, opponent) {
        (None, None) => (
            RoundOutcome::Tie,
            "Both players ran out of time.".to_string(),
        ),
        (Some(_), None) => win(),
        (None, Some(_)) => loss(),
        (Some((my_year, my_ts)), Some((their_year, their_ts))) => {
            let my_distance = (i64::from(my_year) - i64::from(year)).abs();
            let their_distance = (i64::from(their_year) - i64::from(year)).abs();
            if my_distance < their_distance {
                win()
            } else if my_distance > their_distance {
                loss()
            } else if my_ts < their_ts {
                win()
            } else if my_ts > their_ts {
                loss()
            } else {
                (RoundOutcome::Tie, "Perfect tie!".to_string())
            }
        }
    }
}
