//! Terminal chess trainer.
//!
//! Spawns a UCI engine, lets it play one side, and coaches every human move.
//! Game output goes to stdout; logs go to stderr (`RUST_LOG` controls them).

mod display;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coach::{HttpAdviceClient, Trainer, TrainerConfig, TrainerHandle, TrainerOutputs};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trainer_core::{Position, PositionStore, Side};
use uci_session::{envelope, EngineSession, ProcessTransport};

#[derive(Debug, Parser)]
#[command(name = "chess_trainer", version, about = "Play a UCI engine with move-by-move coaching")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine executable
    #[arg(short, long)]
    engine: Option<String>,

    /// Side the engine plays
    #[arg(long, value_parser = parse_side)]
    engine_side: Option<Side>,

    /// Engine skill level (0-20)
    #[arg(long)]
    skill: Option<u8>,

    /// Engine thinking time per move in milliseconds
    #[arg(long)]
    movetime: Option<u64>,

    /// Coaching analysis depth
    #[arg(short, long)]
    depth: Option<u32>,

    /// Play both sides yourself
    #[arg(long)]
    no_auto_play: bool,

    /// Skip coaching analysis
    #[arg(long)]
    no_coaching: bool,

    /// Endpoint for natural-language advice
    #[arg(long)]
    advice_url: Option<String>,

    /// Start from this position
    #[arg(long)]
    fen: Option<String>,

    /// The engine command speaks JSON envelopes instead of raw UCI
    #[arg(long)]
    envelope: bool,
}

fn parse_side(text: &str) -> Result<Side, String> {
    match text.to_ascii_lowercase().as_str() {
        "white" | "w" => Ok(Side::White),
        "black" | "b" => Ok(Side::Black),
        _ => Err(format!("expected white or black, got `{text}`")),
    }
}

fn load_config(args: &Args) -> Result<TrainerConfig> {
    let mut config = match &args.config {
        Some(path) => TrainerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TrainerConfig::default(),
    };

    if let Some(engine) = &args.engine {
        config.engine.command = engine.clone();
    }
    if let Some(side) = args.engine_side {
        config.play.engine_side = side;
    }
    if let Some(skill) = args.skill {
        config.play.skill = Some(skill.min(20));
    }
    if let Some(movetime) = args.movetime {
        config.play.movetime_ms = movetime;
    }
    if let Some(depth) = args.depth {
        config.coaching.depth = depth;
    }
    if args.no_auto_play {
        config.play.auto_play = false;
    }
    if args.no_coaching {
        config.coaching.enabled = false;
    }
    if let Some(url) = &args.advice_url {
        config.coaching.advice_url = Some(url.clone());
    }
    Ok(config)
}

const HELP: &str = "\
Commands:
  <move>        play a move (e2e4, e7e8q, Nf3, O-O)
  show          print the board
  analyze       ask the engine about the current position
  stop          make the engine move now
  auto on|off   toggle engine auto-play
  new           start a new game
  help          this text
  quit          leave";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let store = match &args.fen {
        Some(fen) => PositionStore::with_position(Position::from_fen(fen)?),
        None => PositionStore::new(),
    };

    let channel = ProcessTransport::spawn(&config.engine.command, &config.engine.args)
        .with_context(|| format!("starting engine `{}`", config.engine.command))?;
    let channel = if args.envelope {
        envelope::relay(channel)
    } else {
        channel
    };
    let session = EngineSession::connect(channel, config.engine.session_config())
        .await
        .context("engine handshake")?;

    let mut trainer = Trainer::new(session, config.clone()).with_store(store);
    if let Some(url) = &config.coaching.advice_url {
        let timeout = Duration::from_millis(config.coaching.advice_timeout_ms);
        let client = HttpAdviceClient::new(url.clone(), timeout).context("building advice client")?;
        trainer = trainer.with_advice(Arc::new(client));
    }

    let (handle, outputs) = trainer.spawn();
    let TrainerOutputs { mut events, mut faults, task } = outputs;
    info!(engine = %config.engine.command, "Trainer ready");

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = display::describe(&event) {
                println!("{line}");
            }
        }
    });
    tokio::spawn(async move {
        while let Some(fault) = faults.recv().await {
            println!("! {fault}");
        }
    });

    println!("{HELP}\n");
    println!("{}", display::render(&handle.snapshot().await?));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !command(&handle, line.trim()).await? {
            break;
        }
    }

    handle.shutdown()?;
    task.await?;
    Ok(())
}

/// Run one input line. Returns `false` to quit.
async fn command(handle: &TrainerHandle, input: &str) -> Result<bool> {
    match input {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "help" => println!("{HELP}"),
        "show" => println!("{}", display::render(&handle.snapshot().await?)),
        "analyze" => handle.analyze()?,
        "stop" => handle.stop()?,
        "new" => handle.reset()?,
        "auto on" => handle.set_auto_play(true)?,
        "auto off" => handle.set_auto_play(false)?,
        text => {
            if let Err(e) = handle.play_move(text).await {
                println!("{e}");
            }
        }
    }
    Ok(true)
}
