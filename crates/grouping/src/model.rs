use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// A single coerced attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
}

static NULL_SCALAR: Scalar = Scalar::Null;

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => x.0 != 0.0,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{}", x.0),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(OrderedFloat(x))
    }
}

/// An attribute as stored on a record: scalar, or a set of values
/// (e.g. every weekday a person is available).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

pub static NULL_VALUE: AttrValue = AttrValue::One(Scalar::Null);

impl AttrValue {
    /// Scalar equality, or membership for multi-valued attributes.
    /// An empty set behaves as `Null` so that people who left a checkbox
    /// question blank still land on some partition branch.
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Self::One(s) => s == value,
            Self::Many(vs) if vs.is_empty() => value.is_null(),
            Self::Many(vs) => vs.contains(value),
        }
    }

    /// The values this attribute contributes to a partition column.
    pub fn partition_values(&self) -> Vec<&Scalar> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(vs) if vs.is_empty() => vec![&NULL_SCALAR],
            Self::Many(vs) => vs.iter().collect(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::One(s) => s.is_truthy(),
            Self::Many(vs) => !vs.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::One(Scalar::Null))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::One(s) => Some(s),
            Self::Many(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(s) => write!(f, "{s}"),
            Self::Many(vs) => {
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<Scalar> for AttrValue {
    fn from(s: Scalar) -> Self {
        Self::One(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::One(s.into())
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::One(n.into())
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::One(b.into())
    }
}

impl From<Vec<Scalar>> for AttrValue {
    fn from(vs: Vec<Scalar>) -> Self {
        Self::Many(vs)
    }
}

// ---------------------------------------------------------------------------
// Records and items
// ---------------------------------------------------------------------------

/// One person's attributes, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, AttrValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Attribute value, or `Null` when the attribute is absent.
    pub fn value(&self, name: &str) -> &AttrValue {
        self.get(name).unwrap_or(&NULL_VALUE)
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, AttrValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A weighted unit to be grouped. A merged item keeps every constituent
/// record so reports can still list each person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub weight: u64,
    pub records: Vec<Record>,
}

impl Item {
    pub fn new(record: Record) -> Self {
        Self::with_weight(record, 1)
    }

    pub fn with_weight(record: Record, weight: u64) -> Self {
        Self {
            weight,
            records: vec![record],
        }
    }

    /// Partition attributes are read from the first record.
    pub fn attribute(&self, name: &str) -> &AttrValue {
        self.records
            .first()
            .map(|r| r.value(name))
            .unwrap_or(&NULL_VALUE)
    }

    pub fn merge(&self, other: &Item) -> Item {
        let mut records = self.records.clone();
        records.extend(other.records.iter().cloned());
        Item {
            weight: self.weight + other.weight,
            records,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub usize);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only arena of items. Ids stay valid for the life of the store.
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    items: Vec<Item>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: Item) -> ItemId {
        self.items.push(item);
        ItemId(self.items.len() - 1)
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id.0)
    }

    pub fn ids(&self) -> Vec<ItemId> {
        (0..self.items.len()).map(ItemId).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.items.iter().map(|i| i.weight).sum()
    }

    pub fn weight_of(&self, ids: &[ItemId]) -> u64 {
        ids.iter().map(|&id| self[id].weight).sum()
    }

    /// Merge the given items, in order, into one combined item.
    pub fn combine(&self, ids: &[ItemId]) -> Item {
        let mut records = Vec::new();
        let mut weight = 0u64;
        for &id in ids {
            let item = &self[id];
            weight += item.weight;
            records.extend(item.records.iter().cloned());
        }
        Item { weight, records }
    }
}

impl Index<ItemId> for ItemStore {
    type Output = Item;

    fn index(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }
}

/// Ids claimed by some finalized group. Claims are only ever added.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    claimed: FxHashSet<ItemId>,
}

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already claimed.
    pub fn claim(&mut self, id: ItemId) -> bool {
        self.claimed.insert(id)
    }

    pub fn claim_all(&mut self, ids: &[ItemId]) {
        self.claimed.extend(ids.iter().copied());
    }

    pub fn is_claimed(&self, id: ItemId) -> bool {
        self.claimed.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Partition paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathStep {
    pub attribute: String,
    pub value: Scalar,
}

/// The branch of the partition tree a group came from, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AttrPath(Vec<PathStep>);

impl AttrPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extended(&self, attribute: &str, value: Scalar) -> Self {
        let mut steps = self.0.clone();
        steps.push(PathStep {
            attribute: attribute.to_string(),
            value,
        });
        Self(steps)
    }

    /// The first `len` steps (the whole path if `len` is past the end).
    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.truncated(self.0.len() - 1))
        }
    }

    pub fn is_prefix_of(&self, other: &AttrPath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", step.attribute, step.value)?;
        }
        f.write_str(")")
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Provisional group from partition search. Members may overlap with
/// other candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub path: AttrPath,
    pub level: usize,
    pub members: Vec<ItemId>,
    pub weight: u64,
}

/// Group whose members are exclusively claimed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedGroup {
    pub path: AttrPath,
    pub level: usize,
    pub members: Vec<ItemId>,
    pub weight: u64,
}

impl From<CandidateGroup> for FinalizedGroup {
    fn from(c: CandidateGroup) -> Self {
        Self {
            path: c.path,
            level: c.level,
            members: c.members,
            weight: c.weight,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Members declared each other as partners.
    Existing,
    /// Formed by partition search.
    Path,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing => write!(f, "existing"),
            Self::Path => write!(f, "path"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub source: MatchSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<AttrPath>,
    pub members: Vec<ItemId>,
    pub item: Item,
}

impl Match {
    pub fn weight(&self) -> u64 {
        self.item.weight
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match of size {}", self.weight())?;
        match (&self.source, &self.path) {
            (MatchSource::Path, Some(path)) => write!(f, " from partition path {path}"),
            (MatchSource::Existing, _) => write!(f, " from a member-declared group"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_items: usize,
    pub total_weight: u64,
    pub matches: usize,
    pub existing_matches: usize,
    pub path_matches: usize,
    pub in_range: usize,
    pub undersized: usize,
    pub oversized: usize,
    /// Match weight -> number of matches of that weight.
    pub size_histogram: BTreeMap<u64, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupingResult {
    pub meta: RunMeta,
    pub summary: Summary,
    pub matches: Vec<Match>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(attribute: &str, value: &str) -> PathStep {
        PathStep {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    #[test]
    fn many_matches_membership_and_empty_as_null() {
        let days = AttrValue::Many(vec!["Mon".into(), "Wed".into()]);
        assert!(days.matches(&"Wed".into()));
        assert!(!days.matches(&"Fri".into()));

        let blank = AttrValue::Many(vec![]);
        assert!(blank.matches(&Scalar::Null));
        assert_eq!(blank.partition_values(), vec![&Scalar::Null]);
    }

    #[test]
    fn record_insert_replaces_in_place() {
        let mut r = Record::new().with("a", 1i64).with("b", 2i64);
        r.insert("a", 3i64);
        let keys: Vec<&str> = r.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(r.value("a"), &AttrValue::from(3i64));
        assert!(r.value("missing").is_null());
    }

    #[test]
    fn merge_concatenates_records() {
        let a = Item::new(Record::new().with("name", "ann"));
        let b = Item::with_weight(Record::new().with("name", "ann"), 2);
        let merged = a.merge(&b);
        assert_eq!(merged.weight, 3);
        // Never deduplicated.
        assert_eq!(merged.records.len(), 2);
    }

    #[test]
    fn path_prefix_and_truncation() {
        let long = AttrPath::from_steps(vec![step("year", "1"), step("days", "Mon")]);
        let short = long.truncated(1);
        assert!(short.is_prefix_of(&long));
        assert!(!long.is_prefix_of(&short));
        assert!(AttrPath::root().is_prefix_of(&long));
        assert_eq!(long.parent(), Some(short.clone()));
        assert_eq!(AttrPath::root().parent(), None);
        assert_eq!(long.to_string(), "(year=1, days=Mon)");

        let sibling = AttrPath::from_steps(vec![step("year", "2")]);
        assert!(!sibling.is_prefix_of(&long));
    }

    #[test]
    fn store_combine_and_weights() {
        let mut store = ItemStore::new();
        let a = store.push(Item::new(Record::new().with("n", 1i64)));
        let b = store.push(Item::with_weight(Record::new().with("n", 2i64), 3));
        assert_eq!(store.total_weight(), 4);
        assert_eq!(store.weight_of(&[b]), 3);
        let combined = store.combine(&[a, b]);
        assert_eq!(combined.weight, 4);
        assert_eq!(combined.records.len(), 2);
    }

    #[test]
    fn heavy_items_combine_without_overflow() {
        let heavy = u64::from(u32::MAX);
        let store = ItemStore::from_items(vec![
            Item::with_weight(Record::new(), heavy),
            Item::with_weight(Record::new(), 1),
        ]);
        let combined = store.combine(&store.ids());
        assert_eq!(combined.weight, heavy + 1);
        assert_eq!(store.total_weight(), heavy + 1);
        assert_eq!(store[ItemId(0)].merge(&store[ItemId(1)]).weight, heavy + 1);
    }

    #[test]
    fn claims_are_monotonic() {
        let mut claims = Claims::new();
        assert!(claims.claim(ItemId(1)));
        assert!(!claims.claim(ItemId(1)));
        assert!(claims.is_claimed(ItemId(1)));
        assert_eq!(claims.len(), 1);
    }
}
