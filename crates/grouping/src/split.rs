use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::{SizeBounds, SplitConfig};
use crate::error::GroupingError;
use crate::model::{FinalizedGroup, ItemId, ItemStore, Match, MatchSource};

/// Splitter knobs for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParams {
    pub bounds: SizeBounds,
    pub max_trials: u32,
    pub extend_probability: f64,
}

impl SplitParams {
    pub fn new(bounds: SizeBounds, config: &SplitConfig) -> Self {
        Self {
            bounds,
            max_trials: config.max_trials,
            extend_probability: config.extend_probability,
        }
    }
}

/// No valid cut found. `trials` is 0 when the input was too light to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitFailure {
    pub trials: u32,
}

/// Partition `weights` into runs that each weigh within `params.bounds`.
///
/// Returns index lists into `weights`. Input already within bounds comes
/// back as a single run, as does input weighing exactly `min - 1`. Otherwise
/// each trial reshuffles the order and greedily cuts prefixes: once a prefix
/// is within bounds it is cut unless one more item still fits and a coin
/// with `extend_probability` says to keep going. A trial fails when a prefix
/// overshoots `max` or the remainder never reaches `min`.
pub fn split_weights<R: Rng + ?Sized>(
    weights: &[u64],
    params: &SplitParams,
    rng: &mut R,
) -> Result<Vec<Vec<usize>>, SplitFailure> {
    if weights.is_empty() {
        return Ok(Vec::new());
    }

    let SizeBounds { min, max } = params.bounds;
    let total: u64 = weights.iter().sum();
    let everything: Vec<usize> = (0..weights.len()).collect();

    if total < min {
        if total + 1 == min {
            return Ok(vec![everything]);
        }
        return Err(SplitFailure { trials: 0 });
    }
    if total <= max {
        return Ok(vec![everything]);
    }

    let mut order = everything;
    for _ in 0..params.max_trials {
        order.shuffle(rng);
        if let Some(runs) = try_cuts(&order, weights, params, rng) {
            return Ok(runs);
        }
    }
    Err(SplitFailure {
        trials: params.max_trials,
    })
}

fn try_cuts<R: Rng + ?Sized>(
    order: &[usize],
    weights: &[u64],
    params: &SplitParams,
    rng: &mut R,
) -> Option<Vec<Vec<usize>>> {
    let mut runs = Vec::new();
    let mut rest = order;
    while !rest.is_empty() {
        let len = next_cut(rest, weights, params, rng)?;
        runs.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Some(runs)
}

/// Length of the next prefix of `rest` to cut.
fn next_cut<R: Rng + ?Sized>(
    rest: &[usize],
    weights: &[u64],
    params: &SplitParams,
    rng: &mut R,
) -> Option<usize> {
    let SizeBounds { min, max } = params.bounds;
    let mut sum = 0u64;
    for (i, &idx) in rest.iter().enumerate() {
        sum += weights[idx];
        if sum > max {
            return None;
        }
        if sum >= min {
            let next_fits = rest
                .get(i + 1)
                .map_or(false, |&n| sum + weights[n] <= max);
            if !next_fits || !rng.gen_bool(params.extend_probability) {
                return Some(i + 1);
            }
        }
    }
    None
}

/// Split one group's members, or report why it cannot be done.
pub fn split_group<R: Rng + ?Sized>(
    store: &ItemStore,
    group: &FinalizedGroup,
    params: &SplitParams,
    rng: &mut R,
) -> Result<Vec<Vec<ItemId>>, GroupingError> {
    let weights: Vec<u64> = group.members.iter().map(|&id| store[id].weight).collect();
    match split_weights(&weights, params, rng) {
        Ok(runs) => Ok(runs
            .into_iter()
            .map(|run| run.into_iter().map(|i| group.members[i]).collect())
            .collect()),
        Err(failure) => Err(GroupingError::InfeasibleSplit {
            weight: group.weight,
            members: group.members.len(),
            min: params.bounds.min,
            max: params.bounds.max,
            trials: failure.trials,
        }),
    }
}

/// Per-group seed so each group's outcome is independent of scheduling.
/// splitmix64 over the master seed and the group index.
pub fn derive_seed(master: u64, index: usize) -> u64 {
    let mut z = master.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Split every group into in-range matches, in group order.
///
/// With `allow_undersized`, groups lighter than `bounds.min` are emitted
/// as-is. Fails on the first group (by index) that cannot be split.
pub fn split_all(
    store: &ItemStore,
    groups: &[FinalizedGroup],
    bounds: SizeBounds,
    config: &SplitConfig,
) -> Result<Vec<Match>, GroupingError> {
    let params = SplitParams::new(bounds, config);

    let split_one = |(index, group): (usize, &FinalizedGroup)| -> Result<Vec<Match>, GroupingError> {
        if group.weight < bounds.min && config.allow_undersized {
            log::warn!(
                "group at {} has weight {} below minimum {}; keeping as-is",
                group.path,
                group.weight,
                bounds.min
            );
            return Ok(vec![path_match(store, group, group.members.clone())]);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(config.seed, index));
        let runs = split_group(store, group, &params, &mut rng)?;
        if runs.len() > 1 {
            log::debug!("split group at {} into {} parts", group.path, runs.len());
        }
        Ok(runs
            .into_iter()
            .map(|members| path_match(store, group, members))
            .collect())
    };

    let nested: Vec<Vec<Match>> = if config.parallel {
        groups
            .par_iter()
            .enumerate()
            .map(split_one)
            .collect::<Result<_, _>>()?
    } else {
        groups
            .iter()
            .enumerate()
            .map(split_one)
            .collect::<Result<_, _>>()?
    };

    Ok(nested.into_iter().flatten().collect())
}

fn path_match(store: &ItemStore, group: &FinalizedGroup, members: Vec<ItemId>) -> Match {
    Match {
        source: MatchSource::Path,
        path: Some(group.path.clone()),
        item: store.combine(&members),
        members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrPath, Item, Record};

    fn params(min: u64, max: u64) -> SplitParams {
        SplitParams {
            bounds: SizeBounds { min, max },
            max_trials: 1000,
            extend_probability: 0.5,
        }
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(100)
    }

    fn run_weights(weights: &[u64], runs: &[Vec<usize>]) -> Vec<u64> {
        runs.iter()
            .map(|r| r.iter().map(|&i| weights[i]).sum())
            .collect()
    }

    fn assert_partition(n: usize, runs: &[Vec<usize>]) {
        let mut all: Vec<usize> = runs.iter().flatten().copied().collect();
        all.sort();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn twelve_into_four_to_eight() {
        let weights = [2, 2, 2, 2, 2, 2];
        let runs = split_weights(&weights, &params(4, 8), &mut rng()).unwrap();
        assert!(runs.len() >= 2);
        assert_partition(weights.len(), &runs);
        for w in run_weights(&weights, &runs) {
            assert!((4..=8).contains(&w), "run weight {w} out of range");
        }
    }

    #[test]
    fn in_range_is_untouched() {
        let runs = split_weights(&[1, 2, 3], &params(4, 8), &mut rng()).unwrap();
        assert_eq!(runs, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn one_below_min_is_tolerated() {
        let runs = split_weights(&[1, 2], &params(4, 8), &mut rng()).unwrap();
        assert_eq!(runs, vec![vec![0, 1]]);
    }

    #[test]
    fn too_light_fails_without_trials() {
        let err = split_weights(&[1], &params(4, 8), &mut rng()).unwrap_err();
        assert_eq!(err, SplitFailure { trials: 0 });
    }

    #[test]
    fn empty_input() {
        assert!(split_weights(&[], &params(4, 8), &mut rng()).unwrap().is_empty());
    }

    #[test]
    fn infeasible_exhausts_trials() {
        let mut p = params(3, 4);
        p.max_trials = 25;
        let err = split_weights(&[5, 5], &p, &mut rng()).unwrap_err();
        assert_eq!(err.trials, 25);
    }

    #[test]
    fn never_extending_can_strand_a_remainder() {
        let weights = [1u64; 10];
        let mut p = params(3, 5);
        p.extend_probability = 0.0;
        // Always cutting at 3 leaves 3 + 3 + 3 + 1.
        assert!(split_weights(&weights, &p, &mut rng()).is_err());

        p.extend_probability = 0.5;
        let runs = split_weights(&weights, &p, &mut rng()).unwrap();
        assert_partition(weights.len(), &runs);
        for w in run_weights(&weights, &runs) {
            assert!((3..=5).contains(&w));
        }
    }

    #[test]
    fn same_seed_same_cuts() {
        let weights: Vec<u64> = (0..40).map(|i| 1 + i % 3).collect();
        let a = split_weights(&weights, &params(5, 9), &mut rng()).unwrap();
        let b = split_weights(&weights, &params(5, 9), &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derived_seeds_differ_per_index() {
        assert_ne!(derive_seed(100, 0), derive_seed(100, 1));
        assert_eq!(derive_seed(100, 3), derive_seed(100, 3));
        assert_ne!(derive_seed(100, 0), derive_seed(101, 0));
    }

    fn group_of(store: &mut ItemStore, weights: &[u64]) -> FinalizedGroup {
        let members: Vec<ItemId> = weights
            .iter()
            .map(|&w| store.push(Item::with_weight(Record::new(), w)))
            .collect();
        FinalizedGroup {
            path: AttrPath::root().extended("cohort", "a".into()),
            level: 1,
            weight: store.weight_of(&members),
            members,
        }
    }

    #[test]
    fn infeasible_error_reports_group() {
        let mut store = ItemStore::new();
        let group = group_of(&mut store, &[1, 1]);
        let err = split_group(&store, &group, &params(4, 8), &mut rng()).unwrap_err();
        match err {
            GroupingError::InfeasibleSplit {
                weight,
                members,
                min,
                max,
                ..
            } => {
                assert_eq!((weight, members, min, max), (2, 2, 4, 8));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn split_all_parallel_matches_sequential() {
        let mut store = ItemStore::new();
        let groups: Vec<FinalizedGroup> = (0..6)
            .map(|_| group_of(&mut store, &[1; 23]))
            .collect();
        let mut config = SplitConfig::default();
        let bounds = SizeBounds { min: 4, max: 6 };

        config.parallel = true;
        let par = split_all(&store, &groups, bounds, &config).unwrap();
        config.parallel = false;
        let seq = split_all(&store, &groups, bounds, &config).unwrap();

        let members = |ms: &[Match]| ms.iter().map(|m| m.members.clone()).collect::<Vec<_>>();
        assert_eq!(members(&par), members(&seq));
        assert_eq!(par.iter().map(Match::weight).sum::<u64>(), 6 * 23);
        assert!(par.iter().all(|m| bounds.contains(m.weight())));
        assert!(par.iter().all(|m| m.source == MatchSource::Path));
    }

    #[test]
    fn undersized_kept_or_rejected() {
        let mut store = ItemStore::new();
        let groups = vec![group_of(&mut store, &[1])];
        let bounds = SizeBounds { min: 4, max: 6 };
        let mut config = SplitConfig::default();

        let kept = split_all(&store, &groups, bounds, &config).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].weight(), 1);

        config.allow_undersized = false;
        assert!(matches!(
            split_all(&store, &groups, bounds, &config),
            Err(GroupingError::InfeasibleSplit { weight: 1, .. })
        ));
    }
}
