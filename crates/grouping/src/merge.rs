use crate::config::SizeBounds;
use crate::model::{AttrPath, FinalizedGroup};

/// Result of walking a group's path toward the root in search of groups
/// to absorb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorSearch {
    /// The prefix the walk stopped at.
    pub prefix: AttrPath,
    /// Indices into the pool of every group under `prefix`.
    pub ancestors: Vec<usize>,
    /// Combined weight of `ancestors`.
    pub weight: u64,
}

/// Shorten `path` one step at a time until the pooled groups under the
/// prefix, together with `own_weight`, exceed `min`. The walk never goes
/// past a single-step prefix unless `path` is already the root.
pub fn find_ancestors(
    pool: &[FinalizedGroup],
    path: &AttrPath,
    own_weight: u64,
    min: u64,
) -> AncestorSearch {
    let mut prefix = path.clone();
    loop {
        let ancestors: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, g)| prefix.is_prefix_of(&g.path))
            .map(|(i, _)| i)
            .collect();
        let weight: u64 = ancestors.iter().map(|&i| pool[i].weight).sum();

        if own_weight + weight > min || prefix.len() <= 1 {
            return AncestorSearch {
                prefix,
                ancestors,
                weight,
            };
        }
        prefix = prefix.truncated(prefix.len() - 1);
    }
}

/// Lightest-first subset of the found ancestors, just large enough to lift
/// `own_weight` above `min` (or all of them if that is impossible).
fn adopt(pool: &[FinalizedGroup], search: &AncestorSearch, own_weight: u64, min: u64) -> Vec<usize> {
    let mut order = search.ancestors.clone();
    order.sort_by_key(|&i| pool[i].weight);

    let mut taken = Vec::new();
    let mut total = own_weight;
    for i in order {
        if total > min {
            break;
        }
        total += pool[i].weight;
        taken.push(i);
    }
    taken
}

/// Fold undersized groups into groups sharing a partition prefix.
///
/// Groups are processed deepest path first, heaviest first within a depth,
/// so a sibling that already clears the minimum is settled before lighter
/// siblings look for groups to absorb. A group heavier than
/// `bounds.min` (or at least `bounds.max`) passes through. Any other group
/// absorbs enough groups under its nearest viable prefix to exceed
/// `bounds.min`; the merged group takes that prefix as its path and is not
/// revisited. Weight is conserved.
pub fn repair(groups: Vec<FinalizedGroup>, bounds: SizeBounds) -> Vec<FinalizedGroup> {
    let mut pool = groups;
    // Popped from the back: deepest, then heaviest.
    pool.sort_by_key(|g| (g.path.len(), g.weight));

    let mut out = Vec::with_capacity(pool.len());
    let mut merged = 0usize;

    while let Some(group) = pool.pop() {
        if group.weight > bounds.min || group.weight >= bounds.max {
            out.push(group);
            continue;
        }

        let search = find_ancestors(&pool, &group.path, group.weight, bounds.min);
        let adopted = adopt(&pool, &search, group.weight, bounds.min);
        if adopted.is_empty() {
            out.push(group);
            continue;
        }

        let mut absorbed: Vec<(usize, FinalizedGroup)> = Vec::with_capacity(adopted.len());
        let mut kept = Vec::with_capacity(pool.len() - adopted.len());
        for (i, g) in pool.into_iter().enumerate() {
            match adopted.iter().position(|&a| a == i) {
                Some(rank) => absorbed.push((rank, g)),
                None => kept.push(g),
            }
        }
        pool = kept;
        absorbed.sort_by_key(|(rank, _)| *rank);

        let mut members = Vec::new();
        let mut weight = group.weight;
        for (_, g) in absorbed {
            weight += g.weight;
            members.extend(g.members);
        }
        members.extend(group.members);

        log::debug!(
            "merged group at {} into {} (weight {})",
            group.path,
            search.prefix,
            weight
        );
        merged += 1;

        out.push(FinalizedGroup {
            level: search.prefix.len().saturating_sub(1),
            path: search.prefix,
            members,
            weight,
        });
    }

    log::debug!("merge repair: {} merges, {} groups out", merged, out.len());
    out
}
