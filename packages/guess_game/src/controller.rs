//! Game controller: drives the classifier session from the state machine.
//!
//! The controller owns the session for its whole lifetime. While `active` it
//! keeps exactly one identify subscription on the session; the handler reads
//! the live round from the same core the commands mutate, so there is one
//! authoritative round counter.

use cam_model::{
    ClassLabel, Classification, ClassifierSession, ContainerHandle, ModelLoader, SetupError,
    Subscription, VideoDevice,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::lock;
use crate::machine::{Action, GameEvent, GameState, Progress, transition};
use crate::targets::TargetArrangement;

/// What presentation needs to render the game
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub state: GameState,
    /// 0-based; presentation may show `round + 1`
    pub round: usize,
    pub total_rounds: usize,
    pub current_target: Option<ClassLabel>,
    pub last_error: Option<String>,
}

impl GameSnapshot {
    pub fn is_win(&self) -> bool {
        self.state == GameState::Win
    }
}

/// A machine event together with its payload
enum Signal {
    Init,
    SetupFinished(Result<ClassifierSession, SetupError>),
    Pause,
    Play,
    Score,
    Win,
}

impl Signal {
    fn event(&self) -> GameEvent {
        match self {
            Signal::Init => GameEvent::Init,
            Signal::SetupFinished(Ok(_)) => GameEvent::SetupSucceeded,
            Signal::SetupFinished(Err(_)) => GameEvent::SetupFailed,
            Signal::Pause => GameEvent::Pause,
            Signal::Play => GameEvent::Play,
            Signal::Score => GameEvent::Score,
            Signal::Win => GameEvent::Win,
        }
    }
}

struct Core {
    me: Weak<Mutex<Core>>,
    state: GameState,
    progress: Progress,
    targets: Vec<ClassLabel>,
    arrangement: TargetArrangement,
    session: Option<ClassifierSession>,
    subscription: Option<Subscription>,
    last_error: Option<SetupError>,
    snapshot_tx: watch::Sender<GameSnapshot>,
}

impl Core {
    /// Run `signal` through the transition table. Returns false for no-ops.
    fn apply(&mut self, signal: Signal) -> bool {
        let event = signal.event();
        let Some(t) = transition(self.state, event, self.progress) else {
            debug!("Ignoring {:?} while {}", event, self.state);
            return false;
        };

        let (mut incoming, mut failure) = match signal {
            Signal::SetupFinished(Ok(session)) => (Some(session), None),
            Signal::SetupFinished(Err(e)) => (None, Some(e)),
            _ => (None, None),
        };

        let from = self.state;
        self.state = t.to;
        for action in t.actions {
            self.run(*action, &mut incoming, &mut failure);
        }
        debug!("{} --{:?}--> {}", from, event, self.state);

        if self.state == GameState::Win {
            info!("All {} targets found", self.progress.total);
        }
        self.publish();
        true
    }

    fn run(
        &mut self,
        action: Action,
        incoming: &mut Option<ClassifierSession>,
        failure: &mut Option<SetupError>,
    ) {
        match action {
            Action::BeginSetup => info!("Setting up classifier session"),
            Action::StoreSession => {
                if let Some(session) = incoming.take() {
                    self.targets = self.arrangement.arrange(session.labels().to_vec());
                    self.progress = Progress::new(self.targets.len());
                    self.last_error = None;
                    self.session = Some(session);
                    info!("Targets: {:?}", self.targets);
                }
            }
            Action::SurfaceError => {
                if let Some(e) = failure.take() {
                    error!("Classifier session setup failed: {}", e);
                    self.last_error = Some(e);
                }
            }
            Action::Subscribe => self.subscribe(),
            Action::Unsubscribe => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.cancel();
                }
            }
            Action::PlaySession => {
                if let Some(session) = &self.session {
                    session.play();
                }
            }
            Action::PauseSession => {
                if let Some(session) = &self.session {
                    session.pause();
                }
            }
            Action::AdvanceRound => {
                self.progress.advance();
                if !self.progress.is_complete() {
                    info!(
                        "Round {} of {}: looking for {}",
                        self.progress.round + 1,
                        self.progress.total,
                        self.targets[self.progress.round]
                    );
                }
            }
            Action::CompleteRounds => self.progress.complete(),
        }
    }

    fn subscribe(&mut self) {
        if let Some(previous) = self.subscription.take() {
            previous.cancel();
        }
        let Some(session) = &self.session else {
            warn!("No classifier session to subscribe to");
            return;
        };

        let core = self.me.clone();
        self.subscription = Some(session.on_identify(move |label| {
            if let Some(core) = core.upgrade() {
                lock(&core).on_identified(label);
            }
        }));
    }

    fn on_identified(&mut self, label: &ClassLabel) {
        if self.state != GameState::Active {
            debug!("Identified {} while {}", label, self.state);
            return;
        }
        let Some(expected) = self.targets.get(self.progress.round) else {
            return;
        };
        if expected != label {
            debug!("Saw {} while looking for {}", label, expected);
            return;
        }

        info!(
            "Found {} (round {} of {})",
            label,
            self.progress.round + 1,
            self.progress.total
        );
        self.apply(Signal::Score);
    }

    fn snapshot(&self) -> GameSnapshot {
        let current_target = match self.state {
            GameState::Active | GameState::Paused => {
                self.targets.get(self.progress.round).cloned()
            }
            _ => None,
        };
        GameSnapshot {
            state: self.state,
            round: self.progress.round,
            total_rounds: self.progress.total,
            current_target,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Returns an interrupted setup to `uninitialized` if `init` is dropped
/// before the session is ready.
struct SetupGuard<'a> {
    core: &'a Mutex<Core>,
    armed: bool,
}

impl Drop for SetupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Classifier session setup interrupted");
            lock(self.core).apply(Signal::SetupFinished(Err(SetupError::Interrupted)));
        }
    }
}

/// State machine controller for one game
pub struct GameController<L, D> {
    loader: L,
    device: D,
    config: GameConfig,
    core: Arc<Mutex<Core>>,
}

impl<L: ModelLoader, D: VideoDevice> GameController<L, D> {
    pub fn new(loader: L, device: D, config: GameConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(GameSnapshot::default());
        let arrangement = config.targets.clone();
        let core = Arc::new_cyclic(|me| {
            Mutex::new(Core {
                me: me.clone(),
                state: GameState::Uninitialized,
                progress: Progress::default(),
                targets: Vec::new(),
                arrangement,
                session: None,
                subscription: None,
                last_error: None,
                snapshot_tx,
            })
        });

        Self {
            loader,
            device,
            config,
            core,
        }
    }

    /// INIT: set up the classifier session and start playing.
    ///
    /// Ignored unless the game is `uninitialized`. On failure the game goes
    /// back to `uninitialized` and the error is both returned and kept in
    /// [`GameController::last_error`]; a later `init` may retry.
    pub async fn init(&self, container: ContainerHandle) -> Result<(), SetupError> {
        if !lock(&self.core).apply(Signal::Init) {
            return Ok(());
        }

        let mut guard = SetupGuard {
            core: &self.core,
            armed: true,
        };
        let outcome =
            ClassifierSession::setup(&self.loader, &self.device, &container, &self.config.session)
                .await;
        guard.armed = false;

        let failure = outcome.as_ref().err().cloned();
        lock(&self.core).apply(Signal::SetupFinished(outcome));
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// PAUSE. Returns false if ignored in the current state.
    pub fn pause(&self) -> bool {
        lock(&self.core).apply(Signal::Pause)
    }

    /// PLAY (resume). Returns false if ignored in the current state.
    pub fn play(&self) -> bool {
        lock(&self.core).apply(Signal::Play)
    }

    /// SCORE, as raised by the identify handler on a correct answer
    pub fn score(&self) -> bool {
        lock(&self.core).apply(Signal::Score)
    }

    /// Forced WIN
    pub fn win(&self) -> bool {
        lock(&self.core).apply(Signal::Win)
    }

    pub fn state(&self) -> GameState {
        lock(&self.core).state
    }

    pub fn round(&self) -> usize {
        lock(&self.core).progress.round
    }

    pub fn is_win(&self) -> bool {
        self.state() == GameState::Win
    }

    pub fn targets(&self) -> Vec<ClassLabel> {
        lock(&self.core).targets.clone()
    }

    pub fn current_target(&self) -> Option<ClassLabel> {
        lock(&self.core).snapshot().current_target
    }

    /// The most recent setup failure, cleared by a successful setup
    pub fn last_error(&self) -> Option<SetupError> {
        lock(&self.core).last_error.clone()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        lock(&self.core).snapshot()
    }

    /// Receives a snapshot after every transition
    pub fn watch(&self) -> watch::Receiver<GameSnapshot> {
        lock(&self.core).snapshot_tx.subscribe()
    }

    /// Per-frame classifications, once a session exists
    pub fn watch_predictions(&self) -> Option<watch::Receiver<Vec<Classification>>> {
        lock(&self.core)
            .session
            .as_ref()
            .map(|session| session.watch_predictions())
    }

    /// Tear the game down, releasing the classifier and the video source
    pub fn shutdown(self) {
        let mut core = lock(&self.core);
        if let Some(subscription) = core.subscription.take() {
            subscription.cancel();
        }
        if let Some(session) = core.session.take() {
            session.pause();
        }
        info!("Game controller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetOrder;
    use cam_model::{
        CaptureOptions, ModelRef, PermissionError, ReplayLoader, ReplayModel, SessionConfig,
        SyntheticCamera, SyntheticFeed,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(10);

    fn config() -> GameConfig {
        GameConfig {
            session: SessionConfig {
                frame_interval: FRAME,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn labels() -> Vec<ClassLabel> {
        vec![ClassLabel::new("cat"), ClassLabel::new("dog")]
    }

    fn row(cat: f32, dog: f32) -> Vec<Classification> {
        vec![Classification::new("cat", cat), Classification::new("dog", dog)]
    }

    fn replay(frames: Vec<Vec<Classification>>) -> ReplayLoader {
        ReplayLoader::preset(ReplayModel::new(labels(), frames))
    }

    fn controller(
        frames: Vec<Vec<Classification>>,
    ) -> GameController<ReplayLoader, SyntheticCamera> {
        GameController::new(replay(frames), SyntheticCamera::new(), config())
    }

    fn container() -> ContainerHandle {
        ContainerHandle::new("webcam-container")
    }

    fn has_subscriber<L: ModelLoader, D: VideoDevice>(ctrl: &GameController<L, D>) -> bool {
        lock(&ctrl.core)
            .session
            .as_ref()
            .is_some_and(|s| s.has_subscriber())
    }

    fn is_playing<L: ModelLoader, D: VideoDevice>(ctrl: &GameController<L, D>) -> bool {
        lock(&ctrl.core)
            .session
            .as_ref()
            .is_some_and(|s| s.is_playing())
    }

    fn identify<L: ModelLoader, D: VideoDevice>(ctrl: &GameController<L, D>, label: &str) {
        lock(&ctrl.core).on_identified(&ClassLabel::new(label));
    }

    /// Refuses the first permission prompt, grants the rest
    struct FlakyCamera {
        attempts: AtomicUsize,
    }

    impl VideoDevice for FlakyCamera {
        type Source = SyntheticFeed;

        async fn setup(&self, options: &CaptureOptions) -> Result<SyntheticFeed, PermissionError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PermissionError::Denied("prompt dismissed".to_string()))
            } else {
                Ok(SyntheticFeed::new(options.clone()))
            }
        }
    }

    /// Never finishes loading
    struct StalledLoader;

    impl ModelLoader for StalledLoader {
        type Model = ReplayModel;

        async fn load(&self, _model: &ModelRef) -> Result<ReplayModel, SetupError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_starts_uninitialized() {
        let ctrl = controller(vec![]);
        assert_eq!(ctrl.state(), GameState::Uninitialized);
        assert_eq!(ctrl.round(), 0);
        assert!(!ctrl.is_win());
        assert!(!ctrl.pause());
        assert!(!ctrl.play());
        assert!(!ctrl.score());
        assert!(!ctrl.win());
    }

    #[tokio::test]
    async fn test_init_enters_active_and_plays() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();

        assert_eq!(ctrl.state(), GameState::Active);
        assert_eq!(ctrl.targets(), labels());
        assert_eq!(ctrl.current_target(), Some(ClassLabel::new("cat")));
        assert!(has_subscriber(&ctrl));
        assert!(is_playing(&ctrl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cat_then_dog_wins() {
        let ctrl = controller(vec![row(0.9, 0.1), row(0.1, 0.1), row(0.05, 0.95)]);
        ctrl.init(container()).await.unwrap();

        tokio::time::sleep(FRAME * 10).await;

        assert_eq!(ctrl.state(), GameState::Win);
        assert_eq!(ctrl.round(), 2);
        assert!(ctrl.is_win());
        assert!(!has_subscriber(&ctrl));
        assert!(!is_playing(&ctrl));
        assert_eq!(ctrl.current_target(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_answer_does_not_score() {
        let ctrl = controller(vec![row(0.1, 0.9), row(0.1, 0.1), row(0.1, 0.9)]);
        ctrl.init(container()).await.unwrap();

        tokio::time::sleep(FRAME * 10).await;

        assert_eq!(ctrl.state(), GameState::Active);
        assert_eq!(ctrl.round(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_does_not_score() {
        let ctrl = controller(vec![row(0.65, 0.35); 5]);
        ctrl.init(container()).await.unwrap();

        tokio::time::sleep(FRAME * 10).await;

        assert_eq!(ctrl.round(), 0);
    }

    #[tokio::test]
    async fn test_handler_reads_live_round() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();

        identify(&ctrl, "dog");
        assert_eq!(ctrl.round(), 0);
        identify(&ctrl, "cat");
        assert_eq!(ctrl.round(), 1);
        identify(&ctrl, "cat");
        assert_eq!(ctrl.round(), 1);
        identify(&ctrl, "dog");
        assert_eq!(ctrl.state(), GameState::Win);
        assert_eq!(ctrl.round(), 2);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_setup_error() {
        let ctrl = GameController::new(
            replay(vec![]),
            SyntheticCamera::denied("blocked"),
            config(),
        );
        let err = ctrl.init(container()).await.unwrap_err();

        assert!(matches!(err, SetupError::Permission(_)));
        assert_eq!(ctrl.state(), GameState::Uninitialized);
        assert_eq!(ctrl.last_error(), Some(err));
        assert_eq!(
            ctrl.snapshot().last_error.as_deref(),
            Some("camera access denied: blocked")
        );
    }

    #[tokio::test]
    async fn test_init_retry_after_failure() {
        let ctrl = GameController::new(
            replay(vec![]),
            FlakyCamera {
                attempts: AtomicUsize::new(0),
            },
            config(),
        );
        assert!(ctrl.init(container()).await.is_err());
        assert_eq!(ctrl.state(), GameState::Uninitialized);

        ctrl.init(container()).await.unwrap();
        assert_eq!(ctrl.state(), GameState::Active);
        assert_eq!(ctrl.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_init_returns_to_uninitialized() {
        let ctrl = GameController::new(StalledLoader, SyntheticCamera::new(), config());
        let result = tokio::time::timeout(Duration::from_secs(1), ctrl.init(container())).await;

        assert!(result.is_err());
        assert_eq!(ctrl.state(), GameState::Uninitialized);
        assert_eq!(ctrl.last_error(), Some(SetupError::Interrupted));
    }

    #[tokio::test]
    async fn test_init_ignored_once_active() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();
        identify(&ctrl, "cat");

        ctrl.init(container()).await.unwrap();
        assert_eq!(ctrl.state(), GameState::Active);
        assert_eq!(ctrl.round(), 1);
    }

    #[tokio::test]
    async fn test_pause_unsubscribes_and_stops_session() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();

        assert!(ctrl.pause());
        assert_eq!(ctrl.state(), GameState::Paused);
        assert!(!has_subscriber(&ctrl));
        assert!(!is_playing(&ctrl));

        assert!(ctrl.play());
        assert_eq!(ctrl.state(), GameState::Active);
        assert!(has_subscriber(&ctrl));
        assert!(is_playing(&ctrl));
    }

    #[tokio::test]
    async fn test_events_without_transition_are_noops() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();
        ctrl.pause();

        assert!(!ctrl.score());
        assert!(!ctrl.win());
        assert!(!ctrl.pause());
        identify(&ctrl, "cat");
        assert_eq!(ctrl.round(), 0);
        assert_eq!(ctrl.state(), GameState::Paused);

        ctrl.play();
        assert!(!ctrl.play());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_pause_resume_keeps_one_subscription() {
        let ctrl = controller(vec![row(0.9, 0.1); 20]);
        ctrl.init(container()).await.unwrap();

        for _ in 0..10 {
            ctrl.pause();
            ctrl.play();
        }
        assert!(has_subscriber(&ctrl));
        assert!(lock(&ctrl.core).subscription.as_ref().is_some_and(|s| s.is_live()));

        tokio::time::sleep(FRAME * 10).await;

        // "cat" held in view scores exactly once
        assert_eq!(ctrl.round(), 1);
        assert_eq!(ctrl.state(), GameState::Active);
    }

    #[tokio::test]
    async fn test_forced_win_is_terminal() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();

        assert!(ctrl.win());
        assert!(ctrl.is_win());
        assert_eq!(ctrl.round(), 2);
        assert!(!has_subscriber(&ctrl));

        assert!(!ctrl.play());
        assert!(!ctrl.pause());
        assert!(!ctrl.score());
        ctrl.init(container()).await.unwrap();
        assert!(ctrl.is_win());
    }

    #[tokio::test]
    async fn test_score_command_advances_round() {
        let ctrl = controller(vec![]);
        ctrl.init(container()).await.unwrap();

        assert!(ctrl.score());
        assert_eq!(ctrl.round(), 1);
        assert_eq!(ctrl.current_target(), Some(ClassLabel::new("dog")));
        assert!(ctrl.score());
        assert!(ctrl.is_win());
    }

    #[tokio::test]
    async fn test_watch_publishes_snapshots() {
        let ctrl = controller(vec![]);
        let rx = ctrl.watch();
        assert_eq!(rx.borrow().state, GameState::Uninitialized);

        ctrl.init(container()).await.unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.state, GameState::Active);
        assert_eq!(snapshot.total_rounds, 2);
        assert_eq!(snapshot.current_target, Some(ClassLabel::new("cat")));

        ctrl.pause();
        assert_eq!(rx.borrow().state, GameState::Paused);
    }

    #[tokio::test]
    async fn test_shuffled_targets_are_fixed_at_setup() {
        let mut cfg = config();
        cfg.targets = TargetArrangement {
            order: TargetOrder::Shuffled,
            seed: Some(3),
        };
        let expected = cfg.targets.arrange(labels());
        let ctrl = GameController::new(replay(vec![]), SyntheticCamera::new(), cfg);
        ctrl.init(container()).await.unwrap();

        assert_eq!(ctrl.targets(), expected);
        ctrl.pause();
        ctrl.play();
        assert_eq!(ctrl.targets(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_session() {
        let ctrl = controller(vec![]);
        assert!(ctrl.watch_predictions().is_none());
        ctrl.init(container()).await.unwrap();
        let mut rx = ctrl.watch_predictions().unwrap();

        ctrl.shutdown();
        // the frame loop is aborted, so the publisher goes away
        assert!(rx.changed().await.is_err());
    }
}
