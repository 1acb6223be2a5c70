use std::collections::BTreeMap;

use crate::config::SizeBounds;
use crate::model::{Match, MatchSource, Summary};

/// Compute summary statistics over the emitted matches.
pub fn compute_summary(matches: &[Match], bounds: SizeBounds, total_items: usize) -> Summary {
    let mut size_histogram: BTreeMap<u64, usize> = BTreeMap::new();
    let mut existing_matches = 0;
    let mut path_matches = 0;
    let mut in_range = 0;
    let mut undersized = 0;
    let mut oversized = 0;
    let mut total_weight = 0;

    for m in matches {
        let weight = m.weight();
        total_weight += weight;
        *size_histogram.entry(weight).or_insert(0) += 1;

        match m.source {
            MatchSource::Existing => existing_matches += 1,
            MatchSource::Path => path_matches += 1,
        }

        if weight < bounds.min {
            undersized += 1;
        } else if weight > bounds.max {
            oversized += 1;
        } else {
            in_range += 1;
        }
    }

    Summary {
        total_items,
        total_weight,
        matches: matches.len(),
        existing_matches,
        path_matches,
        in_range,
        undersized,
        oversized,
        size_histogram,
    }
}
