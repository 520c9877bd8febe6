use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use tick_it::pomodoro::PresetCatalog;
use tick_it::settings::{JsonSettingsStore, SettingsRepository};
use tick_it::ws::{MirrorOptions, TerminalSurfaceHost};
use tick_it::{Command, PrimaryConfig, PrimarySurface};

/// Focus timer with a detachable mirror view
#[derive(Parser, Debug)]
#[clap(version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Mode>,

    #[clap(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// run the focus timer (default)
    Run(RunArgs),
    /// run a detached mirror view connected to a running timer
    Mirror(MirrorArgs),
    /// list built-in and saved presets
    Presets {
        /// settings file holding saved presets
        #[clap(long)]
        settings: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// preset to start with, overriding the saved selection
    #[clap(short, long)]
    preset: Option<String>,

    /// settings file holding saved presets and the selected preset
    #[clap(long)]
    settings: Option<PathBuf>,

    /// command prefix that opens the mirror in its own window, e.g. "kitty -e"
    #[clap(long, env = "TICK_IT_TERMINAL")]
    mirror_terminal: Option<String>,

    /// address the primary listens on for its mirror
    #[clap(long, default_value = "127.0.0.1:0")]
    mirror_bind: Option<SocketAddr>,

    /// how long to wait for a mirror to connect, in milliseconds
    #[clap(long, default_value_t = 10_000)]
    mirror_timeout_ms: u64,

    /// open the mirror right away
    #[clap(long)]
    open_mirror: bool,

    /// disable desktop notifications
    #[clap(long)]
    no_notify: bool,
}

#[derive(clap::Args, Debug)]
struct MirrorArgs {
    /// WebSocket address of the primary timer
    #[clap(long)]
    connect: String,

    /// window title
    #[clap(long, default_value = "tick_it")]
    title: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Mode::Run(cli.run)) {
        Mode::Run(args) => run_primary(args).await,
        Mode::Mirror(args) => {
            let input = BufReader::new(tokio::io::stdin());
            tick_it::mirror::run_mirror(&args.connect, &args.title, input).await
        }
        Mode::Presets { settings } => {
            list_presets(settings);
            Ok(())
        }
    }
}

fn settings_store(path: Option<PathBuf>) -> JsonSettingsStore {
    JsonSettingsStore::new(path.unwrap_or_else(JsonSettingsStore::default_path))
}

fn list_presets(path: Option<PathBuf>) {
    let store = settings_store(path);
    let stored = store
        .load_pomodoro_settings()
        .map(|settings| settings.presets)
        .unwrap_or_else(|e| {
            warn!("Failed to load settings from {}: {e}", store.path().display());
            Vec::new()
        });
    for preset in PresetCatalog::from_stored(stored).all() {
        println!(
            "{:<14} {:<14} {}",
            preset.id(),
            preset.name(),
            preset.summary()
        );
    }
}

async fn run_primary(args: RunArgs) -> Result<()> {
    let store = settings_store(args.settings);
    info!("Settings file: {}", store.path().display());

    let launcher = args
        .mirror_terminal
        .map(|prefix| prefix.split_whitespace().map(str::to_string).collect());
    let program = std::env::current_exe().context("Cannot locate the tick_it executable")?;
    let bind = args
        .mirror_bind
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
    let host = TerminalSurfaceHost::new(launcher, program, bind);

    let config = PrimaryConfig {
        preset: args.preset,
        mirror: MirrorOptions {
            title: "tick_it".to_string(),
            connect_timeout: Duration::from_millis(args.mirror_timeout_ms),
        },
        notifications: !args.no_notify,
    };

    println!("🍅 tick_it - Focus Timer");
    println!("======================================================");
    println!("Commands: start, stop, reset, skip, focus, short, long, presets,");
    println!("          preset <id>, mirror, unmirror, home, ambient, timer, quit\n");

    let mut primary = PrimarySurface::new(host, store, config);
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();

    if args.open_mirror {
        let _ = command_tx.send(Command::OpenMirror);
    }
    let _ = command_tx.send(Command::Status);

    tokio::spawn(read_commands(command_tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = command_tx.send(Command::Quit);
        }
    });

    primary.run(&mut command_rx).await;
    primary.shutdown();
    println!();
    Ok(())
}

async fn read_commands(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => println!("{e}"),
            },
            Ok(None) => {
                info!("Input closed; Ctrl+C to quit");
                break;
            }
            Err(e) => {
                warn!("Failed to read input: {e}");
                break;
            }
        }
    }
}
