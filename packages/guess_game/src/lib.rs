//! Guess Game - show the camera each target in turn
//!
//! The game walks through the classifier's labels one round at a time. Each
//! round is won by holding the current target in front of the camera until
//! the classifier recognizes it; recognizing the last target wins the game.
//!
//! - [`machine`] is the pure transition table.
//! - [`controller`] executes it against a [`cam_model::ClassifierSession`].
//! - [`config`] layers defaults, `guess-game.toml` and `GUESS_*` env vars.

pub mod config;
pub mod controller;
pub mod machine;
pub mod targets;

pub use config::{ConfigError, DEFAULT_CONFIG_FILE, FileConfig, GameConfig, load_config};
pub use controller::{GameController, GameSnapshot};
pub use machine::{Action, GameEvent, GameState, Progress, Transition, transition};
pub use targets::{TargetArrangement, TargetOrder};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
