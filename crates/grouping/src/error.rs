use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupingError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad bounds, empty partition list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A configured roster column is not present in the CSV header.
    #[error("no column title containing '{title}' (column '{column}') was found in the roster")]
    MissingColumn { column: String, title: String },

    /// A cell could not be coerced to its configured type.
    #[error("row {row}, column '{column}': '{value}' is not a valid {kind}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
        kind: String,
    },

    /// Two opted-in people share the same id in explicit-key grouping.
    #[error("duplicate group key '{0}' among members requesting an existing group")]
    DuplicateKey(String),

    /// The randomized splitter exhausted its trial budget.
    #[error(
        "unable to split a group of size {weight} comprised of {members} items into groups \
         within [{min}, {max}] inclusive after {trials} trials"
    )]
    InfeasibleSplit {
        weight: u64,
        members: usize,
        min: u64,
        max: u64,
        trials: u32,
    },

    /// Emitted weight differs from ingested weight.
    #[error("weight conservation violated: ingested {ingested}, emitted {emitted}")]
    WeightMismatch { ingested: u64, emitted: u64 },

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// IO error (file read, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl From<csv::Error> for GroupingError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

impl From<std::io::Error> for GroupingError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
