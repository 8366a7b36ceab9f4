//! Game state machine: states, events, and the transition table.
//!
//! [`transition`] is pure. It names the actions to run; the controller runs
//! them. Every (state, event) pair is spelled out, and pairs without a
//! transition are no-ops.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    #[default]
    Uninitialized,
    Initializing,
    Active,
    Paused,
    Win,
}

impl GameState {
    pub const ALL: [GameState; 5] = [
        GameState::Uninitialized,
        GameState::Initializing,
        GameState::Active,
        GameState::Paused,
        GameState::Win,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, GameState::Win)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Win => write!(f, "win"),
        }
    }
}

impl FromStr for GameState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(Self::Uninitialized),
            "initializing" => Ok(Self::Initializing),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "win" => Ok(Self::Win),
            _ => Err(format!("unknown game state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEvent {
    /// Presentation asks to load the model and camera
    Init,
    /// Session setup finished successfully
    SetupSucceeded,
    /// Session setup failed
    SetupFailed,
    Pause,
    Play,
    /// The current target was identified
    Score,
    /// Forced win
    Win,
}

impl GameEvent {
    pub const ALL: [GameEvent; 7] = [
        GameEvent::Init,
        GameEvent::SetupSucceeded,
        GameEvent::SetupFailed,
        GameEvent::Pause,
        GameEvent::Play,
        GameEvent::Score,
        GameEvent::Win,
    ];
}

/// Side effects of a transition, run in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BeginSetup,
    /// Keep the new session; targets become its labels
    StoreSession,
    /// Report the setup failure to presentation
    SurfaceError,
    /// Install the identify handler (cancelling any previous one first)
    Subscribe,
    Unsubscribe,
    PlaySession,
    PauseSession,
    /// round += 1
    AdvanceRound,
    /// round = number of targets
    CompleteRounds,
}

/// Position in the target sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub round: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { round: 0, total }
    }

    /// True when scoring now would finish the game
    pub fn on_last_round(&self) -> bool {
        self.round + 1 >= self.total
    }

    pub fn is_complete(&self) -> bool {
        self.round == self.total
    }

    pub fn advance(&mut self) {
        self.round = (self.round + 1).min(self.total);
    }

    pub fn complete(&mut self) {
        self.round = self.total;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: GameState,
    pub actions: &'static [Action],
}

impl Transition {
    const fn new(to: GameState, actions: &'static [Action]) -> Self {
        Self { to, actions }
    }
}

/// Look up the transition for `event` in `from`. `None` means the event is
/// ignored in that state.
pub fn transition(from: GameState, event: GameEvent, progress: Progress) -> Option<Transition> {
    use Action::*;
    use GameEvent as E;
    use GameState as S;

    match (from, event) {
        (S::Uninitialized, E::Init) => Some(Transition::new(S::Initializing, &[BeginSetup])),
        (
            S::Uninitialized,
            E::SetupSucceeded | E::SetupFailed | E::Pause | E::Play | E::Score | E::Win,
        ) => None,

        (S::Initializing, E::SetupSucceeded) => Some(Transition::new(
            S::Active,
            &[StoreSession, Subscribe, PlaySession],
        )),
        (S::Initializing, E::SetupFailed) => {
            Some(Transition::new(S::Uninitialized, &[SurfaceError]))
        }
        (S::Initializing, E::Init | E::Pause | E::Play | E::Score | E::Win) => None,

        (S::Active, E::Pause) => Some(Transition::new(S::Paused, &[Unsubscribe, PauseSession])),
        (S::Active, E::Score) if progress.on_last_round() => Some(Transition::new(
            S::Win,
            &[Unsubscribe, PauseSession, AdvanceRound],
        )),
        (S::Active, E::Score) => Some(Transition::new(S::Active, &[AdvanceRound])),
        (S::Active, E::Win) => Some(Transition::new(
            S::Win,
            &[Unsubscribe, PauseSession, CompleteRounds],
        )),
        (S::Active, E::Init | E::SetupSucceeded | E::SetupFailed | E::Play) => None,

        (S::Paused, E::Play) => Some(Transition::new(S::Active, &[Subscribe, PlaySession])),
        (
            S::Paused,
            E::Init | E::SetupSucceeded | E::SetupFailed | E::Pause | E::Score | E::Win,
        ) => None,

        (
            S::Win,
            E::Init
            | E::SetupSucceeded
            | E::SetupFailed
            | E::Pause
            | E::Play
            | E::Score
            | E::Win,
        ) => None,
    }
}
