//! Forward-fill lookups over index-stamped metadata.
//!
//! A property recorded at sample index `i` stays valid for every index
//! `>= i` until a later record supersedes it. [`ForwardFill`] stores one
//! property's history sorted by index and answers "value at or before `n`"
//! with a binary search; [`MetadataSeries`] keeps one history per key so
//! partial records only supersede the keys they carry.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// How a metadata lookup treats indices between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// Most recent value at or before the index.
    #[default]
    Forward,
    /// Only values recorded exactly at the index.
    Exact,
}

/// Sorted history of a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardFill<V> {
    entries: Vec<(u64, V)>,
}

impl<V> ForwardFill<V> {
    /// Build from unsorted entries. When two entries share an index the one
    /// given last wins.
    pub fn new(entries: impl IntoIterator<Item = (u64, V)>) -> Self {
        let mut entries: Vec<(u64, V)> = entries.into_iter().collect();
        entries.sort_by_key(|(idx, _)| *idx);
        let mut deduped: Vec<(u64, V)> = Vec::with_capacity(entries.len());
        for (idx, v) in entries {
            match deduped.last_mut() {
                Some(last) if last.0 == idx => last.1 = v,
                _ => deduped.push((idx, v)),
            }
        }
        Self { entries: deduped }
    }

    /// Floor lookup: the value recorded at the greatest index `<= index`.
    pub fn value_at(&self, index: u64) -> Option<&V> {
        let pos = self.entries.partition_point(|(idx, _)| *idx <= index);
        if pos == 0 {
            None
        } else {
            Some(&self.entries[pos - 1].1)
        }
    }

    pub fn exact_at(&self, index: u64) -> Option<&V> {
        self.entries
            .binary_search_by_key(&index, |(idx, _)| *idx)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    pub fn lookup(&self, index: u64, policy: FillPolicy) -> Option<&V> {
        match policy {
            FillPolicy::Forward => self.value_at(index),
            FillPolicy::Exact => self.exact_at(index),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-key forward-fill histories built from index-stamped partial records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataSeries {
    series: BTreeMap<String, ForwardFill<Value>>,
}

impl MetadataSeries {
    pub fn from_records(records: impl IntoIterator<Item = (u64, Map<String, Value>)>) -> Self {
        let mut per_key: BTreeMap<String, Vec<(u64, Value)>> = BTreeMap::new();
        for (idx, record) in records {
            for (k, v) in record {
                per_key.entry(k).or_default().push((idx, v));
            }
        }
        Self {
            series: per_key
                .into_iter()
                .map(|(k, entries)| (k, ForwardFill::new(entries)))
                .collect(),
        }
    }

    /// Snapshot of every key's value at `index` under `policy`.
    pub fn snapshot(&self, index: u64, policy: FillPolicy) -> Map<String, Value> {
        self.series
            .iter()
            .filter_map(|(k, fill)| fill.lookup(index, policy).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floor_lookup() {
        let fill = ForwardFill::new(vec![(100, "b"), (10, "a"), (200, "c")]);
        assert_eq!(fill.value_at(5), None);
        assert_eq!(fill.value_at(10), Some(&"a"));
        assert_eq!(fill.value_at(99), Some(&"a"));
        assert_eq!(fill.value_at(150), Some(&"b"));
        assert_eq!(fill.value_at(u64::MAX), Some(&"c"));
    }

    #[test]
    fn exact_lookup() {
        let fill = ForwardFill::new(vec![(10, 1), (20, 2)]);
        assert_eq!(fill.exact_at(10), Some(&1));
        assert_eq!(fill.exact_at(15), None);
        assert_eq!(fill.lookup(15, FillPolicy::Forward), Some(&1));
    }

    #[test]
    fn later_duplicate_index_wins() {
        let fill = ForwardFill::new(vec![(10, "old"), (10, "new")]);
        assert_eq!(fill.len(), 1);
        assert_eq!(fill.value_at(10), Some(&"new"));
    }

    #[test]
    fn partial_records_only_supersede_their_keys() {
        let series = MetadataSeries::from_records(vec![
            (0, json!({ "gain": 10, "antenna": "a1" }).as_object().cloned().unwrap()),
            (500, json!({ "gain": 20 }).as_object().cloned().unwrap()),
        ]);
        let at_600 = series.snapshot(600, FillPolicy::Forward);
        assert_eq!(at_600["gain"], json!(20));
        assert_eq!(at_600["antenna"], json!("a1"));

        let at_100 = series.snapshot(100, FillPolicy::Forward);
        assert_eq!(at_100["gain"], json!(10));

        assert!(series.snapshot(100, FillPolicy::Exact).is_empty());
    }
}
