//! HybridTable: public surface over the raw engine.
//!
//! Adds the shared hash registry, construction-time configuration, a
//! debug-only reentrancy guard on the mutating entry points, and typed
//! helpers for tables holding type-erased [`Value`]s. Reads never touch the
//! arena's links, so `query` and `contains_key` stay unguarded and may run
//! while another operation is in progress.

use crate::error::Result;
use crate::key::Key;
use crate::raw_table::{Iter, RawTable, Slot};
use crate::reentrancy::DebugReentrancy;
use crate::registry::HashRegistry;
use crate::sizing::MAX_ARRAY_LOG2;
use crate::value::Value;
use core::any::Any;
use std::sync::Arc;

/// Initial segment sizes, as base-2 logarithms.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableConfig {
    pub array_size_log2: u32,
    pub hash_size_log2: u32,
}

impl TableConfig {
    /// Clamps both sizes into the supported range: the hash segment has at
    /// least two slots, neither segment starts above `2^31` slots.
    pub fn new(array_size_log2: u32, hash_size_log2: u32) -> Self {
        Self {
            array_size_log2: array_size_log2.min(MAX_ARRAY_LOG2),
            hash_size_log2: hash_size_log2.clamp(1, MAX_ARRAY_LOG2),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            array_size_log2: 0,
            hash_size_log2: 1,
        }
    }
}

/// Occupancy snapshot, mostly useful in tests and benchmarks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableStats {
    pub len: usize,
    pub array_size: usize,
    pub hash_size: usize,
    pub array_len: usize,
    pub hash_len: usize,
}

pub struct HybridTable<V = Value> {
    raw: RawTable<V>,
    registry: Arc<HashRegistry>,
    config: TableConfig,
    reentrancy: DebugReentrancy,
}

impl<V> HybridTable<V> {
    /// An empty table with no extensible key types registered.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(HashRegistry::new()))
    }

    pub fn with_registry(registry: Arc<HashRegistry>) -> Self {
        Self::with_config(TableConfig::default(), registry)
    }

    pub fn with_config(config: TableConfig, registry: Arc<HashRegistry>) -> Self {
        let config = TableConfig::new(config.array_size_log2, config.hash_size_log2);
        Self {
            raw: RawTable::new(config.array_size_log2, config.hash_size_log2),
            registry,
            config,
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn registry(&self) -> &Arc<HashRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn array_size(&self) -> usize {
        self.raw.array_size()
    }

    pub fn hash_size(&self) -> usize {
        self.raw.hash_size()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            len: self.raw.len(),
            array_size: self.raw.array_size(),
            hash_size: self.raw.hash_size(),
            array_len: self.raw.array_len(),
            hash_len: self.raw.hash_len(),
        }
    }

    /// Returns the value stored under `key`. Fails only for extensible keys
    /// whose type is not registered.
    pub fn query(&self, key: &Key) -> Result<Option<&V>> {
        let slot = self.raw.locate(&self.registry, key)?;
        Ok(slot.and_then(|s| self.raw.value(s)))
    }

    pub fn query_mut(&mut self, key: &Key) -> Result<Option<&mut V>> {
        let _g = self.reentrancy.enter("query_mut");
        let slot = self.raw.locate(&self.registry, key)?;
        Ok(slot.and_then(|s| self.raw.value_mut(s)))
    }

    pub fn contains_key(&self, key: &Key) -> Result<bool> {
        Ok(self.raw.locate(&self.registry, key)?.is_some())
    }

    /// Stores `value` under `key`, replacing any value already there.
    pub fn insert(&mut self, key: Key, value: V) -> Result<()> {
        let _g = self.reentrancy.enter("insert");
        self.raw.insert(&self.registry, key, value)?;
        Ok(())
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn erase(&mut self, key: &Key) -> Result<Option<V>> {
        let _g = self.reentrancy.enter("erase");
        self.raw.erase(&self.registry, key)
    }

    /// Returns the value under `key`, first inserting `V::default()` if absent.
    pub fn get_or_insert_default(&mut self, key: Key) -> Result<&mut V>
    where
        V: Default,
    {
        let _g = self.reentrancy.enter("get_or_insert_default");
        let slot = match self.raw.locate(&self.registry, &key)? {
            Some(slot) => slot,
            None => self.raw.insert(&self.registry, key, V::default())?,
        };
        Ok(self
            .raw
            .value_mut(slot)
            .expect("located slot holds a value"))
    }

    /// Drops every entry and returns to the configured initial sizes.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        self.raw = RawTable::new(self.config.array_size_log2, self.config.hash_size_log2);
    }

    /// Live entries in unspecified order. Array-segment keys are yielded as
    /// owned `Key::Integer`s.
    pub fn iter(&self) -> Iter<'_, V> {
        self.raw.iter()
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &RawTable<V> {
        &self.raw
    }
}

impl<V> Default for HybridTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: core::fmt::Debug> core::fmt::Debug for HybridTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Typed access for tables of type-erased values.
impl HybridTable<Value> {
    /// Stores `value` as a [`Value`] under `key`.
    pub fn set<T: Any + Send>(&mut self, key: Key, value: T) -> Result<()> {
        self.insert(key, Value::new(value))
    }

    /// Borrows the value under `key` as a `T`. A present value of another
    /// type is a `TypeMismatch`.
    pub fn get_as<T: Any>(&self, key: &Key) -> Result<Option<&T>> {
        self.query(key)?.map(|v| v.downcast_ref::<T>()).transpose()
    }

    /// Mutable `T` under `key`. Absent keys and placeholders start out as
    /// `T::default()`.
    pub fn entry_as<T: Any + Default + Send>(&mut self, key: Key) -> Result<&mut T> {
        self.get_or_insert_default(key)?.get_or_default_mut::<T>()
    }

    /// Applies `f` to the `T` under `key`, see [`HybridTable::entry_as`].
    pub fn update<T, F>(&mut self, key: Key, f: F) -> Result<()>
    where
        T: Any + Default + Send,
        F: FnOnce(&mut T),
    {
        f(self.entry_as::<T>(key)?);
        Ok(())
    }
}
