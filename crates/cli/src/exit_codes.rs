//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | CLI usage error (bad args)                           |
//! | 3    | Invalid config (TOML parse or validation)            |
//! | 4    | Roster error (missing column, bad value, duplicate)  |
//! | 5    | A group could not be split into the size range       |
//! | 6    | Weight conservation violated                         |
//! | 7    | IO error (read/write failure)                        |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `grouping_exit_code` or the relevant command

use cohort_grouping::GroupingError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Roster CSV did not match the configured schema.
pub const EXIT_ROSTER: u8 = 4;

/// The splitter exhausted its trials on some group.
pub const EXIT_INFEASIBLE: u8 = 5;

/// Emitted weight differs from ingested weight.
pub const EXIT_INVARIANT: u8 = 6;

/// File could not be read or written.
pub const EXIT_IO: u8 = 7;

/// Map an engine error to its exit code.
pub fn grouping_exit_code(err: &GroupingError) -> u8 {
    match err {
        GroupingError::ConfigParse(_) | GroupingError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        GroupingError::MissingColumn { .. }
        | GroupingError::InvalidValue { .. }
        | GroupingError::DuplicateKey(_)
        | GroupingError::Csv(_) => EXIT_ROSTER,
        GroupingError::InfeasibleSplit { .. } => EXIT_INFEASIBLE,
        GroupingError::WeightMismatch { .. } => EXIT_INVARIANT,
        GroupingError::Io(_) => EXIT_IO,
    }
}
