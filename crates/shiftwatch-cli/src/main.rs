use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shiftwatch", version, about = "Photo-activity inactivity monitor")]
struct Cli {
    /// Config file (defaults to ~/.config/shiftwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: poll Telegram and sweep on the configured interval
    Run,
    /// Minutes since each participant's last photo
    Status,
    /// Activity in the current shift, or in `YYYY-MM-DD <shift>`
    Report {
        /// Date and shift label, e.g. "2024-05-01 morning"
        spec: Option<String>,
        /// Print the chat-formatted text instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Stop monitoring a participant
    Ignore {
        /// Numeric user id
        id: String,
    },
    /// Resume monitoring a participant
    Unignore {
        /// Numeric user id
        id: String,
    },
    /// List ignored participants
    Ignored,
    /// Delete all activity data and the ignore list
    Reset {
        #[arg(long)]
        confirm: bool,
    },
    /// Run one inactivity sweep now
    Sweep,
    /// Show or change the inactivity timeout
    Timeout {
        /// New timeout in minutes
        minutes: Option<String>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let debug_enabled = std::env::var("SHIFTWATCH_DEBUG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so JSON on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let path = cli.config.as_deref();
    let result = match commands::load_config(path) {
        Ok(config) => match cli.command {
            Commands::Run => commands::run::run(&config).await,
            Commands::Status => commands::participants::status(&config),
            Commands::Report { spec, text } => {
                commands::report::report(&config, spec.as_deref(), text)
            }
            Commands::Ignore { id } => commands::participants::ignore(&config, &id),
            Commands::Unignore { id } => commands::participants::unignore(&config, &id),
            Commands::Ignored => commands::participants::ignored(&config),
            Commands::Reset { confirm } => commands::participants::reset(&config, confirm),
            Commands::Sweep => commands::report::sweep(&config).await,
            Commands::Timeout { minutes } => {
                commands::config::timeout(&config, minutes.as_deref())
            }
            Commands::Config { action } => commands::config::run(action, &config, path),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
