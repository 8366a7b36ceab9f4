//! Cam Model - camera classification session library
//!
//! This crate owns the classifier and the video source for a single game and
//! runs the per-frame polling loop over them. It knows nothing about rounds or
//! scoring: consumers receive debounced identification events through a
//! single-slot callback and drive the session with `play`/`pause`.
//!
//! # Example
//!
//! ```no_run
//! use cam_model::{ClassifierSession, ContainerHandle, ReplayLoader, SessionConfig, SyntheticCamera};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let session = ClassifierSession::setup(
//!         &ReplayLoader::files(),
//!         &SyntheticCamera::new(),
//!         &ContainerHandle::new("webcam-container"),
//!         &SessionConfig::default(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let _subscription = session.on_identify(|label| println!("identified {label}"));
//!     session.play();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     session.pause();
//! }
//! ```

mod backend;
mod error;
mod identify;
pub mod replay;
mod session;
mod types;

pub use backend::{Classifier, ModelLoader, VideoDevice, VideoSource};
pub use error::{PermissionError, PredictError, SetupError};
pub use identify::{Identifier, Subscription};
pub use replay::{ModelMetadata, ReplayLoader, ReplayModel, SyntheticCamera, SyntheticFeed};
pub use session::{ClassifierSession, DEFAULT_FRAME_INTERVAL, DEFAULT_THRESHOLD, SessionConfig};
pub use types::{CaptureOptions, ClassLabel, Classification, ContainerHandle, Frame, ModelRef};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
