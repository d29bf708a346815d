//! Insertion-ordered set backing `Value::Set` and frozenset constants.

use std::fmt::{self, Write};

use ahash::RandomState;
use indexmap::IndexMap;

use crate::{
    exception::RunResult,
    value::{HashKey, Value},
};

#[derive(Debug, Clone, Default)]
pub struct Set {
    items: IndexMap<HashKey, Value, RandomState>,
}

impl Set {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from values, failing on the first unhashable one.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> RunResult<Self> {
        let mut set = Self::new();
        for value in values {
            set.add(value)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds `value`; re-adding an equal value keeps the first one.
    pub fn add(&mut self, value: Value) -> RunResult<()> {
        let hash_key = value.hash_key()?;
        self.items.entry(hash_key).or_insert(value);
        Ok(())
    }

    pub fn contains(&self, value: &Value) -> RunResult<bool> {
        Ok(self.items.contains_key(&value.hash_key()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut items = self.items.clone();
        for (k, v) in &other.items {
            items.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Self { items }
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.filtered(|k| other.items.contains_key(k))
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.filtered(|k| !other.items.contains_key(k))
    }

    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let mut result = self.difference(other);
        for (k, v) in &other.items {
            if !self.items.contains_key(k) {
                result.items.insert(k.clone(), v.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.items.keys().all(|k| other.items.contains_key(k))
    }

    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }

    fn filtered(&self, keep: impl Fn(&HashKey) -> bool) -> Self {
        let items = self
            .items
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { items }
    }

    pub fn py_repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("set()");
        }
        f.write_char('{')?;
        for (i, v) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            v.py_repr_fmt(f)?;
        }
        f.write_char('}')
    }
}
