use std::path::{Path, PathBuf};

use crate::error::GroupingError;
use crate::model::GroupingResult;

/// Flatten matches to CSV: one row per record, `group_num` first, then
/// every attribute in the order it was first seen.
pub fn to_csv(result: &GroupingResult) -> Result<String, GroupingError> {
    let mut columns: Vec<&str> = Vec::new();
    for m in &result.matches {
        for record in &m.item.records {
            for (name, _) in record.iter() {
                if name != "group_num" && !columns.contains(&name) {
                    columns.push(name);
                }
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(std::iter::once("group_num").chain(columns.iter().copied()))?;

    for (group_num, m) in result.matches.iter().enumerate() {
        for record in &m.item.records {
            let mut row = Vec::with_capacity(columns.len() + 1);
            row.push(group_num.to_string());
            row.extend(columns.iter().map(|c| record.value(c).to_string()));
            writer.write_record(&row)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| GroupingError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GroupingError::Csv(e.to_string()))
}

/// `<stem>.csv` in `dir`, or `<stem>-2.csv`, `<stem>-3.csv`, ... if taken.
pub fn next_free_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.csv"));
    if !first.exists() {
        return first;
    }
    (2u32..)
        .map(|i| dir.join(format!("{stem}-{i}.csv")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
