use crate::config::SizeBounds;
use crate::model::{CandidateGroup, Claims, FinalizedGroup, ItemStore};

/// Acceptance window for one selection phase. `max` of `u64::MAX` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub min: u64,
    pub max: u64,
}

impl Phase {
    fn admits(&self, weight: u64) -> bool {
        self.min <= weight && weight <= self.max
    }
}

/// Strict bounds first, then half the minimum up to three times the
/// maximum, then anything non-empty.
pub fn phases(bounds: SizeBounds) -> [Phase; 3] {
    [
        Phase {
            min: bounds.min,
            max: bounds.max,
        },
        Phase {
            min: bounds.min / 2,
            max: bounds.max.saturating_mul(3),
        },
        Phase {
            min: 1,
            max: u64::MAX,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub groups: Vec<FinalizedGroup>,
    pub claims: Claims,
}

/// Turn overlapping candidates into disjoint groups.
///
/// Each step strips already-claimed members from every candidate, then
/// claims the lightest candidate admitted by the current phase (earliest
/// on ties). When nothing is admitted the phase relaxes; it never tightens
/// again.
pub fn select(
    mut candidates: Vec<CandidateGroup>,
    store: &ItemStore,
    bounds: SizeBounds,
    mut claims: Claims,
) -> Selection {
    let schedule = phases(bounds);
    let mut phase = 0;
    let mut groups = Vec::new();

    while phase < schedule.len() {
        for candidate in candidates.iter_mut() {
            candidate.members.retain(|&id| !claims.is_claimed(id));
            candidate.weight = store.weight_of(&candidate.members);
        }
        candidates.retain(|c| !c.members.is_empty());

        let window = schedule[phase];
        let mut best: Option<usize> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if !window.admits(candidate.weight) {
                continue;
            }
            if best.map_or(true, |b| candidate.weight < candidates[b].weight) {
                best = Some(i);
            }
        }

        match best {
            Some(i) => {
                let chosen = candidates.remove(i);
                claims.claim_all(&chosen.members);
                groups.push(FinalizedGroup::from(chosen));
            }
            None => {
                log::debug!(
                    "selection phase {} exhausted with {} groups claimed",
                    phase,
                    groups.len()
                );
                phase += 1;
            }
        }
    }

    Selection { groups, claims }
}
