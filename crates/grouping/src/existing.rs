use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ExistingConfig, ExistingMode};
use crate::error::GroupingError;
use crate::model::{AttrValue, Claims, Item, ItemId, ItemStore, Match, MatchSource, Record, Scalar};

/// Appended to outgoing partners who did not opt in themselves.
pub const UNKNOWN_PARTNER_NOTE: &str = " (this person did not fill out the form, did not request \
     an existing group, or this is an incorrect email (check for typos)!)";

#[derive(Debug, Clone)]
pub struct ExistingOutcome {
    pub matches: Vec<Match>,
    /// Ids left for partition search, in input order.
    pub residual: Vec<ItemId>,
    pub claims: Claims,
}

/// Form member-declared groups before any partitioning.
///
/// Only weight-1 items whose `flag` attribute is truthy take part. Every
/// participant ends up in exactly one match and is claimed; everything else
/// is returned as residual.
pub fn form_existing(
    store: &ItemStore,
    ids: &[ItemId],
    config: &ExistingConfig,
) -> Result<ExistingOutcome, GroupingError> {
    let (opted, residual): (Vec<ItemId>, Vec<ItemId>) = ids.iter().copied().partition(|&id| {
        let item = &store[id];
        item.weight == 1 && item.attribute(&config.flag).is_truthy()
    });

    let matches = match config.mode {
        ExistingMode::MinSid => by_shared_key(store, &opted, config),
        ExistingMode::ExplicitKeys => by_explicit_keys(store, &opted, config)?,
    };

    let mut claims = Claims::new();
    for m in &matches {
        claims.claim_all(&m.members);
    }

    log::info!(
        "existing groups: {} participants formed {} groups",
        opted.len(),
        matches.len()
    );

    Ok(ExistingOutcome {
        matches,
        residual,
        claims,
    })
}

fn existing_match(members: Vec<ItemId>, item: Item) -> Match {
    Match {
        source: MatchSource::Existing,
        path: None,
        members,
        item,
    }
}

/// One group per distinct value of `data[0]`.
fn by_shared_key(store: &ItemStore, opted: &[ItemId], config: &ExistingConfig) -> Vec<Match> {
    let Some(key_attr) = config.data.first() else {
        return Vec::new();
    };

    let mut groups: BTreeMap<Scalar, Vec<ItemId>> = BTreeMap::new();
    for &id in opted {
        let key = match store[id].attribute(key_attr) {
            AttrValue::One(s) => s.clone(),
            many => Scalar::Text(many.to_string()),
        };
        groups.entry(key).or_default().push(id);
    }

    groups
        .into_values()
        .map(|members| {
            let item = store.combine(&members);
            existing_match(members, item)
        })
        .collect()
}

/// Connected components of the "names as partner" graph, restricted to
/// participants. Each member's record copy is annotated with who named
/// them and whom they named.
fn by_explicit_keys(
    store: &ItemStore,
    opted: &[ItemId],
    config: &ExistingConfig,
) -> Result<Vec<Match>, GroupingError> {
    let id_key = config.id_key.as_deref().unwrap_or_default();

    let mut by_key: BTreeMap<String, ItemId> = BTreeMap::new();
    for &id in opted {
        let key = store[id].attribute(id_key).to_string();
        if by_key.insert(key.clone(), id).is_some() {
            return Err(GroupingError::DuplicateKey(key));
        }
    }

    let mut outgoing: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for key in by_key.keys() {
        let item = &store[by_key[key]];
        let partners = config
            .data
            .iter()
            .flat_map(|attr| partner_keys(item.attribute(attr)))
            .collect();
        outgoing.insert(key.as_str(), partners);
    }

    // Everyone a participant names, themselves included, points back at them.
    let mut incoming: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (&key, partners) in &outgoing {
        let mut targets: BTreeSet<&str> = partners.iter().map(String::as_str).collect();
        targets.insert(key);
        for target in targets {
            incoming.entry(target.to_string()).or_default().push(key.to_string());
        }
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut matches = Vec::new();
    for start in incoming.keys() {
        if seen.contains(start.as_str()) || !by_key.contains_key(start) {
            continue;
        }

        let mut component: Vec<&str> = Vec::new();
        let mut stack: Vec<&str> = vec![start.as_str()];
        while let Some(at) = stack.pop() {
            if seen.contains(at) || !by_key.contains_key(at) {
                continue;
            }
            seen.insert(at);
            component.push(at);

            let neighbours = incoming
                .get(at)
                .into_iter()
                .chain(outgoing.get(at))
                .flatten()
                .map(String::as_str);
            stack.extend(neighbours.filter(|n| !seen.contains(n)));
        }

        let members: Vec<ItemId> = component.iter().map(|k| by_key[*k]).collect();
        let records = component
            .iter()
            .map(|&key| annotate(store, by_key[key], &incoming, &outgoing, &by_key, key))
            .collect();
        let item = Item {
            weight: members.iter().map(|&id| store[id].weight).sum(),
            records,
        };
        matches.push(existing_match(members, item));
    }

    Ok(matches)
}

fn partner_keys(value: &AttrValue) -> Vec<String> {
    let scalars: Vec<&Scalar> = match value {
        AttrValue::One(s) => vec![s],
        AttrValue::Many(vs) => vs.iter().collect(),
    };
    scalars
        .into_iter()
        .filter(|s| s.is_truthy())
        .map(|s| s.to_string())
        .collect()
}

fn annotate(
    store: &ItemStore,
    id: ItemId,
    incoming: &BTreeMap<String, Vec<String>>,
    outgoing: &BTreeMap<&str, Vec<String>>,
    by_key: &BTreeMap<String, ItemId>,
    key: &str,
) -> Record {
    let mut record = store[id].records.first().cloned().unwrap_or_default();

    let named_by: Vec<Scalar> = incoming
        .get(key)
        .into_iter()
        .flatten()
        .map(|k| Scalar::Text(k.clone()))
        .collect();
    let names: Vec<Scalar> = outgoing
        .get(key)
        .into_iter()
        .flatten()
        .map(|k| {
            if by_key.contains_key(k) {
                Scalar::Text(k.clone())
            } else {
                Scalar::Text(format!("{k}{UNKNOWN_PARTNER_NOTE}"))
            }
        })
        .collect();

    record.insert("incoming_partners", AttrValue::Many(named_by));
    record.insert("outgoing_partners", AttrValue::Many(names));
    record
}
