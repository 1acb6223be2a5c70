// cohort CLI - size-bounded group formation from a roster CSV

mod exit_codes;
mod group;

use std::process::ExitCode;

use clap::Parser;
use cohort_grouping::GroupingError;
use tracing_subscriber::EnvFilter;

use exit_codes::{grouping_exit_code, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};
use group::GroupCommands;

#[derive(Parser)]
#[command(name = "cohort")]
#[command(about = "Form size-bounded groups from a roster, honouring declared groups")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug logging (COHORT_LOG takes precedence when set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: GroupCommands,
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  cohort-grouping ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  cohort-grouping ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Logs go to stderr so `--json` stdout stays clean. Library `log` records
/// are bridged into the subscriber.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("COHORT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match group::cmd_group(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<GroupingError> for CliError {
    fn from(err: GroupingError) -> Self {
        let code = grouping_exit_code(&err);
        let hint = match &err {
            GroupingError::InfeasibleSplit { .. } => Some(
                "rerun with a different --seed, raise split.max_trials, \
                 or widen min_group_size..max_group_size"
                    .to_string(),
            ),
            GroupingError::MissingColumn { .. } => {
                Some("column titles match exactly first, then as a substring of the header".to_string())
            }
            GroupingError::DuplicateKey(_) => {
                Some("set roster.dedupe_key to keep one response per person".to_string())
            }
            GroupingError::WeightMismatch { .. } => {
                Some("this is a bug; rerun with --debug and report the log".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}
