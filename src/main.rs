#![allow(clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

mod cli;

use cli::Cli;
use glasstokey::config::EngineConfig;
use glasstokey::keymap::Keymap;
use glasstokey::layout::Layout;
use glasstokey::runtime::{run_headless_replay, spawn_dispatch_backend, EngineRuntime, LoggingBackend};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(cli::Commands::Daemon { config }) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .init();

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_daemon(config.as_deref()))?;
        }
        Some(cli::Commands::Replay { path }) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .init();

            let config = EngineConfig::default();
            let check = run_headless_replay(path, &config)?;
            println!(
                "{} frames, {} dispatch events",
                check.frames, check.events
            );
            println!(
                "pass 1 fingerprint: {:016x}\npass 2 fingerprint: {:016x}",
                check.fingerprint_first, check.fingerprint_second
            );
            if check.deterministic() {
                println!("{}", "deterministic".green().bold());
            } else {
                println!("{}", "NON-DETERMINISTIC".red().bold());
                std::process::exit(1);
            }
        }
        Some(cli::Commands::Capture { path }) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .init();

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_capture(path))?;
        }
        Some(cli::Commands::Validate { config }) => {
            glasstokey::config::validate_config(config.as_deref())?;
        }
        Some(cli::Commands::Completion { shell }) => {
            cli::generate_completion(*shell);
        }
        None => {
            cli::print_help();
        }
    }

    Ok(())
}

/// Engine daemon: worker plus logging backend. The host attaches a frame
/// source to the ingest hub; without one the engine just idles.
async fn run_daemon(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default_path()
            .map(|p| EngineConfig::load_or_default(&p))
            .unwrap_or_default(),
    };

    let layout = Layout::standard_split();
    let keymap = Keymap::from_layout(&layout);
    let (runtime, dispatch_rx) = EngineRuntime::start(config, layout, keymap, 0);
    let backend = spawn_dispatch_backend(dispatch_rx, LoggingBackend);

    println!("engine running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown();
    let _ = backend.join();
    Ok(())
}

/// Headless capture until Ctrl-C, then write the file.
async fn run_capture(path: &std::path::Path) -> Result<()> {
    let config = EngineConfig::default();
    let layout = Layout::standard_split();
    let keymap = Keymap::from_layout(&layout);
    let (mut runtime, dispatch_rx) = EngineRuntime::start(config, layout, keymap, 0);
    let backend = spawn_dispatch_backend(dispatch_rx, LoggingBackend);

    runtime.start_capture(path)?;
    println!("capturing to {}; press Ctrl-C to stop", path.display());
    tokio::signal::ctrl_c().await?;

    let summary = runtime.stop_capture()?;
    println!(
        "{} {} frames -> {}",
        "✓".green().bold(),
        summary.frames_captured,
        summary.path.display()
    );
    if summary.frames_over_limit > 0 {
        println!(
            "{} {} frames discarded over the buffer limit",
            "!".yellow().bold(),
            summary.frames_over_limit
        );
    }

    runtime.shutdown();
    let _ = backend.join();
    Ok(())
}
