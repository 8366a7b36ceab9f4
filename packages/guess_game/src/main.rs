use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use guess_game::{DEFAULT_CONFIG_FILE, GameConfig, TargetOrder};

mod cli;

#[derive(Parser)]
#[command(name = "guess-game")]
#[command(about = "Show the camera each target class in turn")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./guess-game.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a game against recorded classifier output
    Play(PlayArgs),

    /// List the target labels of a model
    Labels(LabelsArgs),
}

#[derive(Parser)]
struct PlayArgs {
    /// Model metadata JSON (labels)
    #[arg(long)]
    metadata: PathBuf,

    /// Recorded per-frame classifications, one JSON array per line
    #[arg(long)]
    frames: PathBuf,

    /// Element the live view is mounted into
    #[arg(long, default_value = "webcam-container")]
    container: String,

    /// Target order (overrides config)
    #[arg(long, value_enum)]
    order: Option<TargetOrder>,

    /// Shuffle seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Print every frame's classifications once the game is running
    #[arg(long)]
    show_predictions: bool,
}

#[derive(Parser)]
struct LabelsArgs {
    /// Model metadata JSON
    #[arg(long)]
    metadata: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Labels(args) => cli::labels_command(&args.metadata),
        Commands::Play(args) => {
            let config_file = cli
                .config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            let mut config = GameConfig::load(&config_file)
                .with_context(|| format!("Failed to load {}", config_file.display()))?;
            if let Some(order) = args.order {
                config.targets.order = order;
            }
            if args.seed.is_some() {
                config.targets.seed = args.seed;
            }

            info!("Starting guess game");
            cli::play_command(
                config,
                &args.metadata,
                &args.frames,
                &args.container,
                args.show_predictions,
            )
            .await
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "guess_game=debug,cam_model=debug,info"
    } else {
        "guess_game=info,cam_model=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
