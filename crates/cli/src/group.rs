//! `cohort run` and `cohort validate`: config-driven group formation.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use cohort_grouping::config::CohortConfig;
use cohort_grouping::export::{next_free_path, to_csv};
use cohort_grouping::model::{GroupingResult, ItemStore};
use cohort_grouping::roster::{load_roster, read_file_as_utf8};

use crate::exit_codes::EXIT_ERROR;
use crate::CliError;

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Form groups from a roster CSV using a TOML config
    #[command(after_help = "\
Examples:
  cohort run groups.toml responses.csv
  cohort run groups.toml responses.csv --json
  cohort run groups.toml responses.csv --csv groups.csv --output result.json
  cohort run groups.toml responses.csv --seed 7 --debug
  COHORT_SEED=7 cohort run groups.toml responses.csv")]
    Run {
        /// Path to the grouping config (.toml)
        config: PathBuf,

        /// Roster CSV, one row per person
        roster: PathBuf,

        /// Output JSON to stdout instead of only the human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write group assignments as CSV (default: output.csv from the
        /// config, else the first free out-private[-N].csv)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Override split.seed from the config
        #[arg(long, env = "COHORT_SEED")]
        seed: Option<u64>,
    },

    /// Validate a grouping config without running
    #[command(after_help = "\
Examples:
  cohort validate groups.toml")]
    Validate {
        /// Path to the grouping config (.toml)
        config: PathBuf,
    },
}

pub fn cmd_group(cmd: GroupCommands) -> Result<(), CliError> {
    match cmd {
        GroupCommands::Run { config, roster, json, output, csv, seed } => {
            cmd_run(config, roster, json, output, csv, seed)
        }
        GroupCommands::Validate { config } => cmd_validate(config),
    }
}

fn read_config(config_path: &Path) -> Result<CohortConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::io(format!("cannot read config {}: {e}", config_path.display()))
            .with_hint("the first argument is the grouping config, the second the roster CSV")
    })?;
    Ok(CohortConfig::from_toml(&config_str)?)
}

fn cmd_run(
    config_path: PathBuf,
    roster_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    csv_file: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<(), CliError> {
    let mut config = read_config(&config_path)?;
    if let Some(seed) = seed {
        config.grouping.split.seed = seed;
    }

    // Output paths named in the config are relative to the config file
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let json_path = output_file.or_else(|| config.output.json.as_ref().map(|p| base_dir.join(p)));
    let csv_path = csv_file
        .or_else(|| config.output.csv.as_ref().map(|p| base_dir.join(p)))
        .unwrap_or_else(|| next_free_path(Path::new("."), "out-private"));
    if json_path.as_ref() == Some(&csv_path) {
        return Err(CliError::usage(format!(
            "JSON and CSV output both point at {}",
            csv_path.display()
        )));
    }

    let csv_data = read_file_as_utf8(&roster_path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", roster_path.display())))?;
    let items = load_roster(&csv_data, &config.roster)?;
    let store = ItemStore::from_items(items);
    log::debug!(
        "roster {}: {} items, total weight {}",
        roster_path.display(),
        store.len(),
        store.total_weight()
    );

    let result = cohort_grouping::run(&config, &store)?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError {
            code: EXIT_ERROR,
            message: format!("JSON serialization error: {e}"),
            hint: None,
        })?;

    if let Some(ref path) = json_path {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    let csv_out = to_csv(&result)?;
    std::fs::write(&csv_path, csv_out)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", csv_path.display())))?;
    eprintln!("wrote {}", csv_path.display());

    if json_output {
        println!("{json_str}");
    }

    print_summary(&result);
    Ok(())
}

/// Human summary to stderr.
fn print_summary(result: &GroupingResult) {
    let s = &result.summary;
    eprintln!(
        "'{}': {} people (weight {}) in {} groups: {} declared, {} formed",
        result.meta.config_name,
        s.total_items,
        s.total_weight,
        s.matches,
        s.existing_matches,
        s.path_matches,
    );
    eprintln!(
        "sizes: {} in range, {} undersized, {} oversized (seed {})",
        s.in_range, s.undersized, s.oversized, result.meta.seed,
    );
    let histogram: Vec<String> = s
        .size_histogram
        .iter()
        .map(|(size, count)| format!("{size}x{count}"))
        .collect();
    if !histogram.is_empty() {
        eprintln!("histogram (size x count): {}", histogram.join(" "));
    }
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let g = &config.grouping;
    eprintln!(
        "valid: '{}' groups of {}-{} partitioned on [{}], {} roster column(s)",
        config.name,
        g.min_group_size,
        g.max_group_size,
        g.partition.join(", "),
        config.roster.columns.len(),
    );
    if let Some(ref existing) = g.existing {
        eprintln!(
            "existing groups: {:?} via '{}'",
            existing.mode, existing.flag
        );
    }
    Ok(())
}
