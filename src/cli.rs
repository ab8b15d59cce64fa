use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glasstokey")]
#[command(about = "Trackpad-as-keyboard touch processing engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine daemon (frame source and backend attach externally)
    Daemon {
        /// Path to the engine config (RON); defaults to the user config dir
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Headless deterministic replay: exits 0 iff two passes over the
    /// capture produce identical transcripts
    Replay {
        /// Path to a .atpcap capture
        path: PathBuf,
    },
    /// Headless capture of the live frame stream until Ctrl-C
    Capture {
        /// Output .atpcap path
        path: PathBuf,
    },
    /// Validate a config file
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn generate_completion(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

pub fn print_help() {
    let mut cmd = Cli::command();
    let _ = cmd.print_help();
    println!();
}
