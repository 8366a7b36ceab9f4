use anyhow::{Context, Result};
use cam_model::{Classification, ContainerHandle, ModelMetadata, ReplayLoader, SyntheticCamera};
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

use guess_game::{GameConfig, GameController, GameSnapshot, GameState};

/// A line typed by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Start,
    Pause,
    Resume,
    Status,
    Quit,
}

impl FromStr for PlayerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "init" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" | "play" => Ok(Self::Resume),
            "status" => Ok(Self::Status),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command '{other}' (try start, pause, resume, status, quit)"
            )),
        }
    }
}

/// One line describing where the game stands
pub fn render(snapshot: &GameSnapshot) -> String {
    match snapshot.state {
        GameState::Uninitialized => match &snapshot.last_error {
            Some(e) => format!("Not started ({e}). Type 'start' to retry."),
            None => "Not started. Type 'start' to begin.".to_string(),
        },
        GameState::Initializing => "Loading model and camera...".to_string(),
        GameState::Active | GameState::Paused => {
            let target = snapshot
                .current_target
                .as_ref()
                .map(|t| t.as_str())
                .unwrap_or("?");
            let paused = if snapshot.state == GameState::Paused {
                " (paused)"
            } else {
                ""
            };
            format!(
                "Round {}/{}: show me {}{}",
                snapshot.round + 1,
                snapshot.total_rounds,
                target,
                paused
            )
        }
        GameState::Win => format!("You found all {} targets!", snapshot.total_rounds),
    }
}

/// One frame's classifications as `label: probability` pairs
pub fn render_predictions(classifications: &[Classification]) -> String {
    classifications
        .iter()
        .map(|c| format!("{}: {:.2}", c.label, c.probability))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Next frame's classifications, or `None` once the session is gone.
/// Never resolves while there is nothing to watch.
async fn next_predictions(
    rx: &mut Option<watch::Receiver<Vec<Classification>>>,
) -> Option<Vec<Classification>> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

/// Replay recorded classifier output through a full game, driven from stdin.
pub async fn play_command(
    mut config: GameConfig,
    metadata: &Path,
    frames: &Path,
    container: &str,
    show_predictions: bool,
) -> Result<()> {
    config.session.model.metadata_url = metadata.to_string_lossy().to_string();
    config.session.model.model_url = frames.to_string_lossy().to_string();

    let controller = GameController::new(ReplayLoader::files(), SyntheticCamera::new(), config);
    let container = ContainerHandle::new(container);
    let mut snapshots = controller.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut predictions = None;

    println!("{}", render(&controller.snapshot()));
    info!("Waiting for player commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<PlayerCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };

                match command {
                    PlayerCommand::Start => {
                        if controller.state() != GameState::Uninitialized {
                            eprintln!("Game already started");
                        } else if let Err(e) = controller.init(container.clone()).await {
                            eprintln!("Setup failed: {e}");
                        } else if show_predictions {
                            predictions = controller.watch_predictions();
                        }
                    }
                    PlayerCommand::Pause => {
                        if !controller.pause() {
                            eprintln!("Nothing to pause while {}", controller.state());
                        }
                    }
                    PlayerCommand::Resume => {
                        if !controller.play() {
                            eprintln!("Nothing to resume while {}", controller.state());
                        }
                    }
                    PlayerCommand::Status => {
                        let snapshot = controller.snapshot();
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&snapshot)
                                .context("Failed to serialize game status")?
                        );
                    }
                    PlayerCommand::Quit => break,
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", render(&snapshot));
                if snapshot.is_win() {
                    break;
                }
            }
            row = next_predictions(&mut predictions) => match row {
                Some(row) => println!("{}", render_predictions(&row)),
                None => predictions = None,
            },
        }
    }

    controller.shutdown();
    Ok(())
}

/// Print the labels a model would use as targets
pub fn labels_command(metadata: &Path) -> Result<()> {
    let text = std::fs::read_to_string(metadata)
        .with_context(|| format!("Failed to read {}", metadata.display()))?;
    let metadata = ModelMetadata::from_json(&text)
        .with_context(|| format!("Failed to parse {}", metadata.display()))?;

    if let Some(name) = &metadata.model_name {
        println!("{name}");
    }
    for (i, label) in metadata.labels.iter().enumerate() {
        println!("{:>3}  {}", i + 1, label);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_model::ClassLabel;

    #[test]
    fn test_parse_commands() {
        assert_eq!("start".parse(), Ok(PlayerCommand::Start));
        assert_eq!("  Pause\n".parse(), Ok(PlayerCommand::Pause));
        assert_eq!("resume".parse(), Ok(PlayerCommand::Resume));
        assert_eq!("play".parse(), Ok(PlayerCommand::Resume));
        assert_eq!("status".parse(), Ok(PlayerCommand::Status));
        assert_eq!("q".parse(), Ok(PlayerCommand::Quit));
        assert!("jump".parse::<PlayerCommand>().is_err());
    }

    #[test]
    fn test_render_active_round_is_one_based() {
        let snapshot = GameSnapshot {
            state: GameState::Active,
            round: 0,
            total_rounds: 2,
            current_target: Some(ClassLabel::new("cat")),
            last_error: None,
        };
        assert_eq!(render(&snapshot), "Round 1/2: show me cat");
    }

    #[test]
    fn test_render_paused_and_win() {
        let paused = GameSnapshot {
            state: GameState::Paused,
            round: 1,
            total_rounds: 2,
            current_target: Some(ClassLabel::new("dog")),
            last_error: None,
        };
        assert_eq!(render(&paused), "Round 2/2: show me dog (paused)");

        let win = GameSnapshot {
            state: GameState::Win,
            round: 2,
            total_rounds: 2,
            ..Default::default()
        };
        assert_eq!(render(&win), "You found all 2 targets!");
    }

    #[test]
    fn test_render_predictions_lists_every_label() {
        let row = vec![
            Classification::new("cat", 0.923),
            Classification::new("dog", 0.077),
        ];
        assert_eq!(render_predictions(&row), "cat: 0.92  dog: 0.08");
        assert_eq!(render_predictions(&[]), "");
    }

    #[tokio::test]
    async fn test_next_predictions_ends_when_session_drops() {
        let (tx, rx) = watch::channel(Vec::new());
        let mut rx = Some(rx);

        tx.send_replace(vec![Classification::new("cat", 0.5)]);
        assert_eq!(
            next_predictions(&mut rx).await,
            Some(vec![Classification::new("cat", 0.5)])
        );

        drop(tx);
        assert_eq!(next_predictions(&mut rx).await, None);
    }

    #[test]
    fn test_render_setup_failure() {
        let snapshot = GameSnapshot {
            last_error: Some("no camera available".to_string()),
            ..Default::default()
        };
        assert!(render(&snapshot).contains("no camera available"));
    }

    #[test]
    fn test_labels_command_reads_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, r#"{"labels": ["cat", "dog"], "modelName": "pets"}"#).unwrap();
        labels_command(&path).unwrap();

        std::fs::write(&path, "not json").unwrap();
        assert!(labels_command(&path).is_err());
    }
}
