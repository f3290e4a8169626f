//! Child slots with declared cardinality

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, RandomState};

/// How many values a slot keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one; a second value overwrites the first
    ZeroOrOne,
    /// Zero or more, in arrival order
    List,
    /// Zero or more, in arrival order, without duplicates
    Set,
}

/// Holder for a builder's child values.
#[derive(Clone)]
pub struct Slot<T> {
    cardinality: Cardinality,
    values: Vec<T>,
    index: Option<HashIndex<T>>,
}

/// Positions in `values` bucketed by hash.
#[derive(Clone)]
struct HashIndex<T> {
    hash: fn(&RandomState, &T) -> u64,
    state: RandomState,
    buckets: HashMap<u64, Vec<usize>>,
}

fn hash_one<T: Hash>(state: &RandomState, value: &T) -> u64 {
    state.hash_one(value)
}

impl<T: Hash> HashIndex<T> {
    fn new() -> Self {
        Self {
            hash: hash_one::<T>,
            state: RandomState::new(),
            buckets: HashMap::new(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("cardinality", &self.cardinality)
            .field("values", &self.values)
            .field("hashed", &self.index.is_some())
            .finish()
    }
}

impl<T: PartialEq> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cardinality == other.cardinality && self.values == other.values
    }
}

impl<T: Eq> Eq for Slot<T> {}

impl<T: PartialEq> Default for Slot<T> {
    fn default() -> Self {
        Self::single()
    }
}

impl<T: PartialEq> Slot<T> {
    /// Slot with the given cardinality.
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            values: Vec::new(),
            index: None,
        }
    }

    /// Zero-or-one slot.
    pub fn single() -> Self {
        Self::new(Cardinality::ZeroOrOne)
    }

    /// Ordered list slot.
    pub fn list() -> Self {
        Self::new(Cardinality::List)
    }

    /// Ordered deduplicating slot.
    ///
    /// Each insert compares against every stored value, so `n` inserts cost
    /// O(n²) comparisons. Prefer [`Slot::hashed_set`] for large sets of
    /// `Eq + Hash` values.
    pub fn set() -> Self {
        Self::new(Cardinality::Set)
    }

    /// Declared cardinality.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Store a value. Returns `false` when a set already held an equal value.
    pub fn put(&mut self, value: T) -> bool {
        match self.cardinality {
            Cardinality::ZeroOrOne => {
                self.values.clear();
                self.values.push(value);
                true
            }
            Cardinality::List => {
                self.values.push(value);
                true
            }
            Cardinality::Set => {
                if let Some(index) = &mut self.index {
                    let bucket = index.buckets.entry((index.hash)(&index.state, &value)).or_default();
                    if bucket.iter().any(|&at| self.values.get(at) == Some(&value)) {
                        return false;
                    }
                    bucket.push(self.values.len());
                    self.values.push(value);
                    return true;
                }
                if self.values.contains(&value) {
                    false
                } else {
                    self.values.push(value);
                    true
                }
            }
        }
    }

    /// First stored value.
    pub fn get(&self) -> Option<&T> {
        self.values.first()
    }

    /// All stored values.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the slot is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the single value, leaving the slot empty.
    pub fn take_one(&mut self) -> Option<T> {
        let value = self.values.pop();
        self.clear();
        value
    }

    /// Take every value, leaving the slot empty.
    pub fn take_all(&mut self) -> Vec<T> {
        self.forget();
        std::mem::take(&mut self.values)
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.forget();
        self.values.clear();
    }

    fn forget(&mut self) {
        if let Some(index) = &mut self.index {
            index.buckets.clear();
        }
    }
}

impl<T: Eq + Hash> Slot<T> {
    /// Ordered deduplicating slot with a hash index, so each insert costs
    /// O(1) expected comparisons.
    pub fn hashed_set() -> Self {
        Self {
            index: Some(HashIndex::new()),
            ..Self::set()
        }
    }
}
