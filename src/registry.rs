//! HashRegistry: runtime dispatch from a key payload's type to its hash function.
//!
//! Keyed by [`TypeId`] so each extensible key type has exactly one dispatcher.
//! A registry is built up front, then shared with tables behind an `Arc`.

use crate::error::{Result, TableError};
use crate::key::{ExtKey, Key};
use core::any::{Any, TypeId};
use core::fmt;
use hashbrown::HashMap;

/// A user type that computes its own key hash.
pub trait HashKey: Any + Clone + PartialEq + fmt::Debug + Send {
    fn hash_key(&self) -> u64;
}

type Dispatcher = Box<dyn Fn(&dyn Any) -> Option<u64> + Send + Sync>;

#[derive(Default)]
pub struct HashRegistry {
    dispatchers: HashMap<TypeId, Dispatcher>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self {
            dispatchers: HashMap::new(),
        }
    }

    /// Installs `T::hash_key` as the hash of keys wrapping a `T`.
    /// Replaces any earlier registration for `T`.
    pub fn register<T: HashKey>(&mut self) {
        self.register_with::<T, _>(T::hash_key);
    }

    /// Installs `hash_fn` as the hash of keys wrapping a `T`.
    pub fn register_with<T, F>(&mut self, hash_fn: F)
    where
        T: Any,
        F: Fn(&T) -> u64 + Send + Sync + 'static,
    {
        let dispatch: Dispatcher =
            Box::new(move |v: &dyn Any| v.downcast_ref::<T>().map(&hash_fn));
        self.dispatchers.insert(TypeId::of::<T>(), dispatch);
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.dispatchers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Returns the hash of `key`, computing and caching it on first use.
    /// A computed hash of 0 is indistinguishable from "not cached" and is
    /// recomputed on every call.
    pub fn get_hash(&self, key: &ExtKey) -> Result<u64> {
        let cached = key.cached_hash();
        if cached != 0 {
            return Ok(cached);
        }
        let hash = self
            .dispatchers
            .get(&key.type_id())
            .and_then(|dispatch| dispatch(key.payload()))
            .ok_or(TableError::UnregisteredHashType {
                type_name: key.type_name(),
            })?;
        key.cache_hash(hash);
        Ok(hash)
    }

    /// Wraps `value` as an extensible key with its hash already cached.
    pub fn key<T>(&self, value: T) -> Result<Key>
    where
        T: Any + Clone + PartialEq + fmt::Debug + Send,
    {
        let ext = ExtKey::new(value);
        self.get_hash(&ext)?;
        Ok(Key::Extensible(ext))
    }
}

impl fmt::Debug for HashRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRegistry")
            .field("registered", &self.dispatchers.len())
            .finish()
    }
}
