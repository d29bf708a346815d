//! Insertion-ordered mapping backing `Value::Dict`.

use std::fmt::{self, Write};

use ahash::{AHashSet, RandomState};
use indexmap::IndexMap;

use crate::{
    exception::RunResult,
    value::{HashKey, TooDeep, Value},
};

/// Python dict: keys are hashed through `HashKey`, while the original key
/// value is kept alongside the mapped value for iteration and repr.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    map: IndexMap<HashKey, (Value, Value), RandomState>,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up `key`; fails only if the key is unhashable.
    pub fn get(&self, key: &Value) -> RunResult<Option<&Value>> {
        let hash_key = key.hash_key()?;
        Ok(self.map.get(&hash_key).map(|(_, v)| v))
    }

    /// Inserts or overwrites; an existing entry keeps its original key object.
    pub fn insert(&mut self, key: Value, value: Value) -> RunResult<()> {
        let hash_key = key.hash_key()?;
        match self.map.get_mut(&hash_key) {
            Some(entry) => entry.1 = value,
            None => {
                self.map.insert(hash_key, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> RunResult<Option<Value>> {
        let hash_key = key.hash_key()?;
        Ok(self.map.shift_remove(&hash_key).map(|(_, v)| v))
    }

    pub fn contains_key(&self, key: &Value) -> RunResult<bool> {
        Ok(self.map.contains_key(&key.hash_key()?))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.map.values().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.map.values().map(|(k, v)| (k, v))
    }

    /// Same length, and every key maps to an equal value in `other`.
    pub(crate) fn eq_at(&self, other: &Self, depth: usize) -> Result<bool, TooDeep> {
        if self.len() != other.len() {
            return Ok(false);
        }
        for (hash_key, (_, v)) in &self.map {
            match other.map.get(hash_key) {
                Some((_, ov)) if v.eq_at(ov, depth)? => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    pub(crate) fn repr_fmt(&self, f: &mut impl Write, seen: &mut AHashSet<usize>) -> fmt::Result {
        f.write_char('{')?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            k.repr_fmt(f, seen)?;
            f.write_str(": ")?;
            v.repr_fmt(f, seen)?;
        }
        f.write_char('}')
    }
}
