use proptest::prelude::*;

use cam_model::{ClassLabel, ContainerHandle, ReplayLoader, ReplayModel, SyntheticCamera};
use guess_game::{GameConfig, GameController, GameEvent, GameState, Progress, transition};

// --- Pure transition table ---

fn arb_state() -> impl Strategy<Value = GameState> {
    prop::sample::select(GameState::ALL.to_vec())
}

fn arb_event() -> impl Strategy<Value = GameEvent> {
    prop::sample::select(GameEvent::ALL.to_vec())
}

fn arb_progress() -> impl Strategy<Value = Progress> {
    (1usize..8)
        .prop_flat_map(|total| (0..total).prop_map(move |round| Progress { round, total }))
}

proptest! {
    #[test]
    fn win_absorbs_every_event(event in arb_event(), progress in arb_progress()) {
        prop_assert_eq!(transition(GameState::Win, event, progress), None);
    }

    #[test]
    fn only_active_reaches_win(
        from in arb_state(),
        event in arb_event(),
        progress in arb_progress(),
    ) {
        if let Some(t) = transition(from, event, progress) {
            if t.to == GameState::Win {
                prop_assert_eq!(from, GameState::Active);
            }
        }
    }

    #[test]
    fn score_wins_exactly_on_last_round(progress in arb_progress()) {
        let t = transition(GameState::Active, GameEvent::Score, progress).unwrap();
        prop_assert_eq!(t.to == GameState::Win, progress.round + 1 == progress.total);
    }
}

// --- Controller over random command sequences ---

#[derive(Debug, Clone, Copy)]
enum Command {
    Init,
    Pause,
    Play,
    Score,
    Win,
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        1 => Just(Command::Init),
        3 => Just(Command::Pause),
        3 => Just(Command::Play),
        6 => Just(Command::Score),
        1 => Just(Command::Win),
    ]
}

fn arb_labels() -> impl Strategy<Value = Vec<ClassLabel>> {
    prop::collection::hash_set("[a-z]{3,6}", 1..6)
        .prop_map(|set| set.into_iter().map(ClassLabel::new).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_stays_in_bounds(
        labels in arb_labels(),
        commands in prop::collection::vec(arb_command(), 0..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let total = labels.len();
            let ctrl = GameController::new(
                ReplayLoader::preset(ReplayModel::new(labels, vec![])),
                SyntheticCamera::new(),
                GameConfig::default(),
            );

            let mut last_round = 0;
            for command in commands {
                match command {
                    Command::Init => {
                        ctrl.init(ContainerHandle::new("webcam-container")).await.unwrap();
                    }
                    Command::Pause => {
                        ctrl.pause();
                    }
                    Command::Play => {
                        ctrl.play();
                    }
                    Command::Score => {
                        ctrl.score();
                    }
                    Command::Win => {
                        ctrl.win();
                    }
                }

                let snapshot = ctrl.snapshot();
                prop_assert!(snapshot.round <= total);
                prop_assert!(snapshot.round >= last_round, "round went backwards");
                prop_assert_eq!(
                    snapshot.is_win(),
                    snapshot.total_rounds > 0 && snapshot.round == snapshot.total_rounds
                );
                last_round = snapshot.round;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
