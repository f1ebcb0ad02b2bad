//! hybrid-table: an associative table that keeps small non-negative integer
//! keys in a dense array and everything else in a chained hash segment.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: array-speed access for sequential integer keys, while still
//!   accepting numbers, strings, opaque addresses and user-defined keys in
//!   the same table.
//! - Layers:
//!   - `Key` / `HashRegistry`: the key model. Built-in kinds hash by fixed
//!     formulas; extensible keys are hashed through a registry keyed by
//!     `TypeId` and cache their hash in place.
//!   - `RawTable<V>`: the storage engine. An array segment plus a hash
//!     segment whose collision chains are always rooted at their main
//!     position, with a vacancy list and a backward scan cursor for free
//!     slots. A full hash segment triggers a resize sized from a census of
//!     live keys.
//!   - `HybridTable<V>`: public API. Holds the shared registry, the initial
//!     configuration and a debug-only reentrancy guard.
//!
//! Constraints
//! - No internal locking. Tables and keys are `Send` but `!Sync` (hash
//!   caches live in `Cell`s), so a table shared across threads goes behind a
//!   lock such as `Arc<Mutex<HybridTable<V>>>`. Extensible key payloads and
//!   stored [`Value`]s must be `Send`.
//! - Resizing is the only way either segment changes size; growth and
//!   shrinkage both come out of the same occupancy census.
//! - Iteration order is unspecified and not stable across resizes.
//!
//! Errors
//! - `TableError::UnregisteredHashType` when an extensible key's type has no
//!   registered hash function.
//! - `TableError::TypeMismatch` when a stored [`Value`] or key payload is
//!   read as the wrong type.
//! - Reading [`Key::integer`] on a non-integer key panics.
//!
//! Logging
//! - Resizes are reported at `debug` level through `tracing`, slot scans at
//!   `trace`. The crate never installs a subscriber.
//!
//! Example
//! ```
//! use hybrid_table::{HybridTable, Key};
//!
//! let mut t: HybridTable<i32> = HybridTable::new();
//! t.insert(Key::from("a"), 10).unwrap();
//! t.insert(Key::from(1), 20).unwrap();
//! assert_eq!(t.query(&Key::from("a")).unwrap(), Some(&10));
//! t.erase(&Key::from("a")).unwrap();
//! assert_eq!(t.query(&Key::from("a")).unwrap(), None);
//! ```

mod error;
mod key;
mod raw_table;
mod reentrancy;
mod registry;
mod sizing;
mod table;
mod table_proptest;
mod value;

// Public surface
pub use error::{Result, TableError};
pub use key::{ExtKey, Key, KeyKind};
pub use raw_table::Iter;
pub use registry::{HashKey, HashRegistry};
pub use table::{HybridTable, TableConfig, TableStats};
pub use value::Value;
