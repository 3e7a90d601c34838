//! Name-keyed registries with explicit duplicate handling

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// What a registry does with a key it already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The first entry stays; later ones are dropped whole
    KeepFirst,
    /// The latest entry replaces the earlier one
    Overwrite,
}

/// Result of one insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Inserted,
    Skipped,
    Replaced,
}

/// Map that remembers first-discovery order of its keys
#[derive(Debug, Clone)]
pub struct Registry<V> {
    policy: MergePolicy,
    order: Vec<String>,
    entries: HashMap<String, V>,
}

impl<V> Registry<V> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn keep_first() -> Self {
        Self::new(MergePolicy::KeepFirst)
    }

    pub fn overwrite() -> Self {
        Self::new(MergePolicy::Overwrite)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Merge {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return match self.policy {
                MergePolicy::KeepFirst => Merge::Skipped,
                MergePolicy::Overwrite => {
                    self.entries.insert(key, value);
                    Merge::Replaced
                }
            };
        }
        self.order.push(key.clone());
        self.entries.insert(key, value);
        Merge::Inserted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Keys in first-discovery order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in first-discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.as_str(), v)))
    }
}

impl<V: Serialize> Serialize for Registry<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
