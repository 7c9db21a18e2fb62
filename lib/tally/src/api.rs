use serde::Serialize;
use std::collections::hash_map::{self, HashMap};
use std::path::PathBuf;

// ========== Records and batches ==========

/// One observation: a categorical key and the value to average.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: f64,
}

impl Record {
    pub fn new(key: impl Into<String>, value: f64) -> Self { Self { key: key.into(), value } }
}

/// All records of a single input file, in file order.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub source: PathBuf,
    pub records: Vec<Record>,
    /// Size of the source file; zero for batches built in memory.
    pub bytes: u64,
}

impl Batch {
    pub fn new(source: impl Into<PathBuf>, records: Vec<Record>) -> Self { Self { source: source.into(), records, bytes: 0 } }
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

// ========== Aggregation algebra ==========

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KeySummary {
    pub sum: f64,
    pub count: u64,
}

impl KeySummary {
    pub fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn combine(&mut self, other: KeySummary) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Per-key `(sum, count)` over one batch or over a merge of several.
///
/// Merging is associative and commutative on `count` and, up to IEEE-754
/// rounding, on `sum`. Entries are only created by observing a value, so
/// every stored key has `count > 0`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialAggregate {
    groups: HashMap<String, KeySummary>,
}

impl PartialAggregate {
    pub fn new() -> Self { Self::default() }

    /// Single-pass group-reduce over a batch.
    pub fn from_batch(batch: &Batch) -> Self {
        let mut agg = Self::new();
        for record in &batch.records {
            agg.observe(&record.key, record.value);
        }
        agg
    }

    pub fn observe(&mut self, key: &str, value: f64) {
        match self.groups.get_mut(key) {
            Some(summary) => summary.observe(value),
            None => {
                let mut summary = KeySummary::default();
                summary.observe(value);
                self.groups.insert(key.to_owned(), summary);
            }
        }
    }

    /// Folds `other` into `self`: `sum += other.sum; count += other.count` per key.
    pub fn merge(&mut self, other: PartialAggregate) {
        if self.groups.is_empty() {
            self.groups = other.groups;
            return;
        }
        for (key, summary) in other.groups {
            if summary.count == 0 { continue; }
            match self.groups.entry(key) {
                hash_map::Entry::Occupied(mut e) => e.get_mut().combine(summary),
                hash_map::Entry::Vacant(e) => { e.insert(summary); }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<KeySummary> { self.groups.get(key).copied() }
    pub fn len(&self) -> usize { self.groups.len() }
    pub fn is_empty(&self) -> bool { self.groups.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = (&str, KeySummary)> { self.groups.iter().map(|(k, s)| (k.as_str(), *s)) }

    /// Total number of observations across all keys.
    pub fn observations(&self) -> u64 { self.groups.values().map(|s| s.count).sum() }

    /// Derives per-key averages, sorted by key.
    pub fn finalize(self) -> FinalAverage {
        let mut rows: Vec<KeyAverage> = self
            .groups
            .into_iter()
            .filter_map(|(key, s)| s.mean().map(|average| KeyAverage { key, average, count: s.count }))
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        FinalAverage { rows }
    }
}

impl FromIterator<PartialAggregate> for PartialAggregate {
    fn from_iter<I: IntoIterator<Item = PartialAggregate>>(iter: I) -> Self {
        let mut acc = PartialAggregate::new();
        for partial in iter { acc.merge(partial); }
        acc
    }
}

// ========== Final result ==========

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyAverage {
    pub key: String,
    pub average: f64,
    pub count: u64,
}

/// Per-key averages sorted by key. Every row has `count > 0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FinalAverage {
    rows: Vec<KeyAverage>,
}

impl FinalAverage {
    pub fn rows(&self) -> &[KeyAverage] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.rows
            .binary_search_by(|row| row.key.as_str().cmp(key))
            .ok()
            .map(|i| self.rows[i].average)
    }

    /// True when both results hold the same keys and counts, and every average
    /// agrees within `rel_tol` relative to the larger magnitude.
    pub fn approx_eq(&self, other: &FinalAverage, rel_tol: f64) -> bool {
        self.rows.len() == other.rows.len()
            && self.rows.iter().zip(&other.rows).all(|(a, b)| {
                let scale = a.average.abs().max(b.average.abs()).max(1.0);
                a.key == b.key && a.count == b.count && (a.average - b.average).abs() <= rel_tol * scale
            })
    }
}
