use std::collections::HashSet;

use serde::Deserialize;

use crate::error::GroupingError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CohortConfig {
    pub name: String,
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    pub min_group_size: u64,
    pub max_group_size: u64,
    /// Partition search stops descending once a branch weighs less than this.
    pub min_partition_size: u64,
    /// Ordered partition attributes, most significant first.
    pub partition: Vec<String>,
    #[serde(default)]
    pub existing: Option<ExistingConfig>,
    #[serde(default)]
    pub split: SplitConfig,
}

impl GroupingConfig {
    pub fn bounds(&self) -> SizeBounds {
        SizeBounds {
            min: self.min_group_size,
            max: self.max_group_size,
        }
    }
}

/// Inclusive group weight range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: u64,
    pub max: u64,
}

impl SizeBounds {
    pub fn contains(&self, weight: u64) -> bool {
        self.min <= weight && weight <= self.max
    }
}

/// Pre-declared grouping: people who already have a group in mind.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingConfig {
    pub mode: ExistingMode,
    /// Attribute whose truthiness opts a person in.
    pub flag: String,
    /// Unique person key (explicit_keys only).
    #[serde(default)]
    pub id_key: Option<String>,
    /// min_sid: `data[0]` is the shared group key.
    /// explicit_keys: attributes naming the other members.
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingMode {
    MinSid,
    ExplicitKeys,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_trials")]
    pub max_trials: u32,
    /// Chance of extending a prefix that is already a valid cut when one
    /// more item would still fit.
    #[serde(default = "default_extend_probability")]
    pub extend_probability: f64,
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Emit groups that end up below `min_group_size` as-is instead of
    /// sending them through the splitter.
    #[serde(default = "default_true")]
    pub allow_undersized: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_trials: default_max_trials(),
            extend_probability: default_extend_probability(),
            parallel: true,
            allow_undersized: true,
        }
    }
}

fn default_seed() -> u64 {
    100
}

fn default_max_trials() -> u32 {
    1000
}

fn default_extend_probability() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterConfig {
    /// Drop rows whose value for this column is not truthy.
    #[serde(default)]
    pub include_flag: Option<String>,
    /// Keep one row per key; later rows replace earlier ones in place.
    #[serde(default)]
    pub dedupe_key: Option<String>,
    /// Integer column holding the item weight (default weight 1).
    #[serde(default)]
    pub weight_column: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    /// Header text, or a substring of it.
    pub title: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub transform: Option<ColumnTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Ignore,
    Text,
    Sid,
    Email,
    Boolean,
    Checkbox,
    Radio,
    Dropdown,
    Scale,
    Float,
    Int,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ignore => "ignore",
            Self::Text => "text",
            Self::Sid => "sid",
            Self::Email => "email",
            Self::Boolean => "boolean",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Dropdown => "dropdown",
            Self::Scale => "scale",
            Self::Float => "float",
            Self::Int => "int",
        };
        f.write_str(name)
    }
}

/// Post-coercion rewrite applied to text values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    Lowercase,
    /// Boolean: value equals `value` exactly.
    Equals { value: String },
    /// Boolean: value contains `value`. Case-insensitive unless
    /// `case_sensitive` is set.
    Contains {
        value: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// First rule whose needle occurs in the value wins.
    Bucket {
        rules: Vec<BucketRule>,
        default: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BucketRule {
    pub contains: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CohortConfig {
    pub fn from_toml(input: &str) -> Result<Self, GroupingError> {
        let config: CohortConfig =
            toml::from_str(input).map_err(|e| GroupingError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GroupingError> {
        self.grouping.validate()?;
        self.roster.validate()?;

        // With a roster schema, every referenced attribute must be a column id
        if !self.roster.columns.is_empty() {
            let ids: HashSet<&str> = self.roster.columns.iter().map(|c| c.id.as_str()).collect();
            let mut referenced: Vec<(&str, &str)> = self
                .grouping
                .partition
                .iter()
                .map(|a| ("partition", a.as_str()))
                .collect();
            if let Some(ref existing) = self.grouping.existing {
                referenced.push(("existing.flag", existing.flag.as_str()));
                if let Some(ref id_key) = existing.id_key {
                    referenced.push(("existing.id_key", id_key.as_str()));
                }
                referenced.extend(existing.data.iter().map(|d| ("existing.data", d.as_str())));
            }
            for field in [
                &self.roster.include_flag,
                &self.roster.dedupe_key,
                &self.roster.weight_column,
            ]
            .into_iter()
            .flatten()
            {
                referenced.push(("roster", field.as_str()));
            }
            for (what, attr) in referenced {
                if !ids.contains(attr) {
                    return Err(GroupingError::ConfigValidation(format!(
                        "{what}: '{attr}' is not a roster column id"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<(), GroupingError> {
        if self.min_group_size == 0 {
            return Err(GroupingError::ConfigValidation(
                "min_group_size must be at least 1".into(),
            ));
        }
        if self.max_group_size < self.min_group_size {
            return Err(GroupingError::ConfigValidation(format!(
                "max_group_size ({}) must be >= min_group_size ({})",
                self.max_group_size, self.min_group_size
            )));
        }
        if self.min_partition_size == 0 {
            return Err(GroupingError::ConfigValidation(
                "min_partition_size must be at least 1".into(),
            ));
        }
        if self.partition.is_empty() {
            return Err(GroupingError::ConfigValidation(
                "at least one partition attribute is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for attr in &self.partition {
            if !seen.insert(attr.as_str()) {
                return Err(GroupingError::ConfigValidation(format!(
                    "partition attribute '{attr}' listed twice"
                )));
            }
        }

        if let Some(ref existing) = self.existing {
            if existing.data.is_empty() {
                return Err(GroupingError::ConfigValidation(
                    "existing.data must name at least one attribute".into(),
                ));
            }
            if existing.mode == ExistingMode::ExplicitKeys && existing.id_key.is_none() {
                return Err(GroupingError::ConfigValidation(
                    "existing.id_key is required for mode = \"explicit_keys\"".into(),
                ));
            }
        }

        let split = &self.split;
        if split.max_trials == 0 {
            return Err(GroupingError::ConfigValidation(
                "split.max_trials must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&split.extend_probability) {
            return Err(GroupingError::ConfigValidation(format!(
                "split.extend_probability must be within [0, 1], got {}",
                split.extend_probability
            )));
        }

        Ok(())
    }
}

impl RosterConfig {
    pub fn validate(&self) -> Result<(), GroupingError> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.id.as_str()) {
                return Err(GroupingError::ConfigValidation(format!(
                    "roster column id '{}' listed twice",
                    col.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
