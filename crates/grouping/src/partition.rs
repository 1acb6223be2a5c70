use rustc_hash::FxHashSet;

use crate::model::{AttrPath, CandidateGroup, Claims, ItemId, ItemStore, Scalar};

/// Distinct values observed for one partition attribute, in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionColumn {
    pub attribute: String,
    pub values: Vec<Scalar>,
}

/// Collect the candidate values of each partition attribute across `ids`.
/// Multi-valued attributes contribute each of their elements.
pub fn collect_values(store: &ItemStore, ids: &[ItemId], attributes: &[String]) -> Vec<PartitionColumn> {
    attributes
        .iter()
        .map(|attribute| {
            let mut seen: FxHashSet<&Scalar> = FxHashSet::default();
            let mut values = Vec::new();
            for &id in ids {
                for value in store[id].attribute(attribute).partition_values() {
                    if seen.insert(value) {
                        values.push(value.clone());
                    }
                }
            }
            PartitionColumn {
                attribute: attribute.clone(),
                values,
            }
        })
        .collect()
}

/// Depth-first enumeration of candidate groups along `columns`.
///
/// A branch becomes a candidate once it runs out of columns or weighs less
/// than `min_partition_size`. Candidates overlap whenever an item carries
/// several values of a multi-valued attribute; every unclaimed item lands
/// in at least one candidate.
pub fn search(
    store: &ItemStore,
    ids: &[ItemId],
    columns: &[PartitionColumn],
    min_partition_size: u64,
    claims: &Claims,
) -> Vec<CandidateGroup> {
    let members: Vec<ItemId> = ids.iter().copied().filter(|&id| !claims.is_claimed(id)).collect();
    if members.is_empty() {
        return Vec::new();
    }

    let search = Search {
        store,
        columns,
        min_partition_size,
        claims,
    };
    let mut out = Vec::new();
    search.descend(members, AttrPath::root(), 0, &mut out);

    log::debug!(
        "partition search produced {} candidate groups over {} columns",
        out.len(),
        columns.len()
    );
    out
}

struct Search<'a> {
    store: &'a ItemStore,
    columns: &'a [PartitionColumn],
    min_partition_size: u64,
    claims: &'a Claims,
}

impl Search<'_> {
    fn descend(&self, members: Vec<ItemId>, path: AttrPath, level: usize, out: &mut Vec<CandidateGroup>) {
        let weight = self.store.weight_of(&members);

        if level >= self.columns.len() || weight < self.min_partition_size {
            out.push(CandidateGroup {
                path,
                level,
                members,
                weight,
            });
            return;
        }

        let column = &self.columns[level];
        for value in &column.values {
            let filtered: Vec<ItemId> = members
                .iter()
                .copied()
                .filter(|&id| {
                    !self.claims.is_claimed(id)
                        && self.store[id].attribute(&column.attribute).matches(value)
                })
                .collect();
            if filtered.is_empty() {
                continue;
            }

            self.descend(
                filtered,
                path.extended(&column.attribute, value.clone()),
                level + 1,
                out,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrValue, Item, Record};

    fn person(year: i64, days: &[&str]) -> Item {
        Item::new(
            Record::new()
                .with("year", year)
                .with("days", AttrValue::Many(days.iter().map(|&d| d.into()).collect())),
        )
    }

    fn attrs() -> Vec<String> {
        vec!["year".into(), "days".into()]
    }

    #[test]
    fn values_in_first_seen_order() {
        let store = ItemStore::from_items(vec![
            person(2, &["Tue", "Mon"]),
            person(1, &["Mon"]),
            person(2, &[]),
        ]);
        let cols = collect_values(&store, &store.ids(), &attrs());
        assert_eq!(cols[0].values, vec![Scalar::Int(2), Scalar::Int(1)]);
        assert_eq!(
            cols[1].values,
            vec!["Tue".into(), "Mon".into(), Scalar::Null]
        );
    }

    #[test]
    fn every_item_is_covered() {
        let store = ItemStore::from_items(vec![
            person(1, &["Mon"]),
            person(1, &["Mon", "Wed"]),
            person(2, &["Wed"]),
            person(2, &[]),
            person(3, &["Fri"]),
        ]);
        let ids = store.ids();
        let cols = collect_values(&store, &ids, &attrs());
        let groups = search(&store, &ids, &cols, 1, &Claims::new());

        for id in ids {
            assert!(
                groups.iter().any(|g| g.members.contains(&id)),
                "{id} not in any candidate"
            );
        }
    }

    #[test]
    fn multi_valued_items_appear_in_several_branches() {
        let store = ItemStore::from_items(vec![
            person(1, &["Mon", "Wed"]),
            person(1, &["Mon"]),
            person(1, &["Wed"]),
        ]);
        let ids = store.ids();
        let cols = collect_values(&store, &ids, &attrs());
        let groups = search(&store, &ids, &cols, 1, &Claims::new());

        let holding_first = groups.iter().filter(|g| g.members.contains(&ItemId(0))).count();
        assert_eq!(holding_first, 2);
        for g in &groups {
            assert_eq!(g.level, 2);
            assert_eq!(g.path.len(), 2);
            assert_eq!(g.weight, g.members.len() as u64);
        }
    }

    #[test]
    fn stops_below_min_partition_size() {
        let store = ItemStore::from_items(vec![
            person(1, &["Mon"]),
            person(1, &["Tue"]),
            person(1, &["Wed"]),
            person(2, &["Mon"]),
        ]);
        let ids = store.ids();
        let cols = collect_values(&store, &ids, &attrs());
        let groups = search(&store, &ids, &cols, 2, &Claims::new());

        // year=2 weighs 1 < 2: emitted at level 1 without splitting on days.
        let year2 = groups
            .iter()
            .find(|g| g.path.steps()[0].value == Scalar::Int(2))
            .unwrap();
        assert_eq!(year2.level, 1);
        assert_eq!(year2.path.len(), 1);
        // year=1 weighs 3, so it descends into single-day leaves of weight 1.
        let year1: Vec<_> = groups
            .iter()
            .filter(|g| g.path.steps()[0].value == Scalar::Int(1))
            .collect();
        assert_eq!(year1.len(), 3);
        assert!(year1.iter().all(|g| g.level == 2 && g.weight == 1));
    }

    #[test]
    fn small_population_yields_root_group() {
        let store = ItemStore::from_items(vec![person(1, &["Mon"]), person(2, &["Tue"])]);
        let ids = store.ids();
        let cols = collect_values(&store, &ids, &attrs());
        let groups = search(&store, &ids, &cols, 3, &Claims::new());
        assert_eq!(groups.len(), 1);
        assert!(groups[0].path.is_empty());
        assert_eq!(groups[0].weight, 2);
    }

    #[test]
    fn claimed_items_are_skipped() {
        let store = ItemStore::from_items(vec![person(1, &["Mon"]), person(1, &["Mon"])]);
        let ids = store.ids();
        let cols = collect_values(&store, &ids, &attrs());
        let mut claims = Claims::new();
        claims.claim(ItemId(0));
        let groups = search(&store, &ids, &cols, 1, &claims);
        assert!(groups.iter().all(|g| !g.members.contains(&ItemId(0))));
        assert_eq!(groups.iter().map(|g| g.weight).sum::<u64>(), 1);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let store = ItemStore::new();
        assert!(search(&store, &[], &[], 1, &Claims::new()).is_empty());
    }
}
