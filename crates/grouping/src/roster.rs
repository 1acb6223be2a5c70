//! Roster ingestion: typed columns out of a survey-style CSV export.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::config::{ColumnConfig, ColumnTransform, ColumnType, RosterConfig};
use crate::error::GroupingError;
use crate::model::{AttrValue, Item, Record, Scalar};

/// Read a file as UTF-8, falling back to Windows-1252 (Excel exports).
pub fn read_file_as_utf8(path: &Path) -> Result<String, GroupingError> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Locate a header: exact title first, then the first header containing it.
fn resolve_column(headers: &[String], col: &ColumnConfig) -> Result<usize, GroupingError> {
    headers
        .iter()
        .position(|h| h == &col.title)
        .or_else(|| headers.iter().position(|h| h.contains(col.title.as_str())))
        .ok_or_else(|| GroupingError::MissingColumn {
            column: col.id.clone(),
            title: col.title.clone(),
        })
}

/// Parse roster CSV into items.
///
/// With no configured columns every header becomes a text attribute.
/// Rows failing `include_flag` are dropped, and with `dedupe_key` a later
/// row replaces an earlier one carrying the same non-empty key. Row numbers
/// in errors are CSV line numbers (the header is line 1).
pub fn load_roster(csv_data: &str, config: &RosterConfig) -> Result<Vec<Item>, GroupingError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let columns: Vec<ColumnConfig> = if config.columns.is_empty() {
        headers
            .iter()
            .map(|h| ColumnConfig {
                title: h.clone(),
                id: h.clone(),
                kind: ColumnType::Text,
                optional: true,
                transform: None,
            })
            .collect()
    } else {
        config.columns.clone()
    };

    let indices = columns
        .iter()
        .map(|c| resolve_column(&headers, c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut items: Vec<Item> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut dropped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let row = i + 2;
        let raw = result?;

        let mut record = Record::new();
        for (col, &idx) in columns.iter().zip(&indices) {
            let cell = raw.get(idx).unwrap_or("");
            record.insert(col.id.clone(), coerce(cell, col, row)?);
        }

        if let Some(ref flag) = config.include_flag {
            if !record.value(flag).is_truthy() {
                dropped += 1;
                continue;
            }
        }

        let weight = match config.weight_column {
            Some(ref column) => parse_weight(record.value(column), column, row)?,
            None => 1,
        };
        let item = Item::with_weight(record, weight);

        let key = config
            .dedupe_key
            .as_ref()
            .map(|k| item.attribute(k).to_string())
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => match positions.get(&key) {
                Some(&pos) => {
                    log::debug!("roster line {row}: replacing earlier entry for '{key}'");
                    items[pos] = item;
                }
                None => {
                    positions.insert(key, items.len());
                    items.push(item);
                }
            },
            None => items.push(item),
        }
    }

    log::info!(
        "roster: {} items loaded, {} rows excluded",
        items.len(),
        dropped
    );
    Ok(items)
}

/// Largest weight a single roster row may carry.
pub const MAX_ITEM_WEIGHT: u64 = u32::MAX as u64;

fn parse_weight(value: &AttrValue, column: &str, row: usize) -> Result<u64, GroupingError> {
    let invalid = || GroupingError::InvalidValue {
        row,
        column: column.to_string(),
        value: value.to_string(),
        kind: "weight".into(),
    };
    let weight = match value {
        AttrValue::One(Scalar::Int(n)) => u64::try_from(*n).map_err(|_| invalid())?,
        AttrValue::One(Scalar::Text(s)) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if (1..=MAX_ITEM_WEIGHT).contains(&weight) {
        Ok(weight)
    } else {
        Err(invalid())
    }
}

/// Coerce one cell to its column type, then apply the column transform.
fn coerce(cell: &str, col: &ColumnConfig, row: usize) -> Result<AttrValue, GroupingError> {
    if col.optional && cell.trim().is_empty() {
        return Ok(AttrValue::One(Scalar::Null));
    }

    let invalid = || GroupingError::InvalidValue {
        row,
        column: col.id.clone(),
        value: cell.to_string(),
        kind: col.kind.to_string(),
    };

    let value = match col.kind {
        ColumnType::Ignore | ColumnType::Radio | ColumnType::Dropdown => {
            AttrValue::One(Scalar::Text(cell.to_string()))
        }
        ColumnType::Text => AttrValue::One(Scalar::Text(cell.trim().to_string())),
        ColumnType::Email => {
            let email = cell.trim();
            if email.is_empty() {
                return Err(invalid());
            }
            AttrValue::One(Scalar::Text(email.to_string()))
        }
        ColumnType::Sid | ColumnType::Scale | ColumnType::Int => {
            let digits = cell.trim();
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            AttrValue::One(Scalar::Int(digits.parse().map_err(|_| invalid())?))
        }
        ColumnType::Float => match cell.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => AttrValue::One(Scalar::from(x)),
            _ => return Err(invalid()),
        },
        ColumnType::Boolean => match cell.trim() {
            "Yes" => AttrValue::One(Scalar::Bool(true)),
            "No" => AttrValue::One(Scalar::Bool(false)),
            _ => return Err(invalid()),
        },
        ColumnType::Checkbox => AttrValue::Many(
            cell.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Scalar::from)
                .collect(),
        ),
    };

    Ok(match col.transform {
        Some(ref transform) => apply_transform(value, transform),
        None => value,
    })
}

fn texts(value: &AttrValue) -> Vec<String> {
    match value {
        AttrValue::One(s) => vec![s.to_string()],
        AttrValue::Many(vs) => vs.iter().map(|s| s.to_string()).collect(),
    }
}

fn apply_transform(value: AttrValue, transform: &ColumnTransform) -> AttrValue {
    match transform {
        ColumnTransform::Lowercase => match value {
            AttrValue::One(Scalar::Text(s)) => AttrValue::One(Scalar::Text(s.to_lowercase())),
            AttrValue::Many(vs) => AttrValue::Many(
                vs.into_iter()
                    .map(|s| match s {
                        Scalar::Text(t) => Scalar::Text(t.to_lowercase()),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        },
        ColumnTransform::Equals { value: expected } => {
            AttrValue::One(Scalar::Bool(texts(&value).iter().any(|t| t == expected)))
        }
        ColumnTransform::Contains {
            value: needle,
            case_sensitive: true,
        } => AttrValue::One(Scalar::Bool(
            texts(&value).iter().any(|t| t.contains(needle.as_str())),
        )),
        ColumnTransform::Contains { value: needle, .. } => {
            let needle = needle.to_lowercase();
            AttrValue::One(Scalar::Bool(
                texts(&value).iter().any(|t| t.to_lowercase().contains(&needle)),
            ))
        }
        ColumnTransform::Bucket { rules, default } => {
            let haystack = texts(&value);
            let chosen = rules
                .iter()
                .find(|r| haystack.iter().any(|t| t.contains(r.contains.as_str())))
                .map(|r| r.value.as_str())
                .unwrap_or(default.as_str());
            AttrValue::One(bucket_value(chosen))
        }
    }
}

/// Bucket labels that look like integers become integers.
fn bucket_value(label: &str) -> Scalar {
    match label.parse::<i64>() {
        Ok(n) => Scalar::Int(n),
        Err(_) => Scalar::Text(label.to_string()),
    }
}
