use crate::config::{CohortConfig, GroupingConfig};
use crate::error::GroupingError;
use crate::existing::form_existing;
use crate::merge::repair;
use crate::model::{Claims, GroupingResult, ItemStore, Match, RunMeta};
use crate::partition::{collect_values, search};
use crate::select::select;
use crate::split::split_all;
use crate::summary::compute_summary;

/// Run the full grouping pipeline and wrap the matches with run metadata.
pub fn run(config: &CohortConfig, store: &ItemStore) -> Result<GroupingResult, GroupingError> {
    let matches = group_items(&config.grouping, store)?;
    let summary = compute_summary(&matches, config.grouping.bounds(), store.len());

    Ok(GroupingResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            seed: config.grouping.split.seed,
        },
        summary,
        matches,
    })
}

/// Existing groups, then partition search, selection, merge repair and
/// splitting. Every item of `store` lands in exactly one match.
pub fn group_items(config: &GroupingConfig, store: &ItemStore) -> Result<Vec<Match>, GroupingError> {
    let bounds = config.bounds();
    let ids = store.ids();

    let (mut matches, residual, claims) = match config.existing {
        Some(ref existing) => {
            let outcome = form_existing(store, &ids, existing)?;
            (outcome.matches, outcome.residual, outcome.claims)
        }
        None => (Vec::new(), ids, Claims::new()),
    };

    let columns = collect_values(store, &residual, &config.partition);
    let candidates = search(store, &residual, &columns, config.min_partition_size, &claims);
    let candidate_count = candidates.len();

    let selection = select(candidates, store, bounds, claims);
    log::debug!(
        "selected {} of {} candidate groups",
        selection.groups.len(),
        candidate_count
    );

    let repaired = repair(selection.groups, bounds);
    matches.extend(split_all(store, &repaired, bounds, &config.split)?);

    let ingested = store.total_weight();
    let emitted: u64 = matches.iter().map(Match::weight).sum();
    if ingested != emitted {
        return Err(GroupingError::WeightMismatch { ingested, emitted });
    }

    log::info!(
        "grouped {} items (weight {}) into {} matches",
        store.len(),
        ingested,
        matches.len()
    );
    Ok(matches)
}
