//! Debug-only guard against re-entering a table from user callbacks.
//!
//! Mutating table operations call into user code while the arena may be
//! mid-splice: extensible keys run their own `PartialEq` during chain walks
//! and their hash functions on first use. In debug builds a nested mutating
//! operation on the same table panics and names both operations. Reads take
//! no guard and may nest freely. Release builds compile the guard away.

use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // May move between threads with its table, never shared between them.
    _nosync: PhantomData<Cell<()>>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosync: PhantomData,
        }
    }

    /// Marks `op` as running until the returned guard drops.
    #[inline]
    pub fn enter(&self, op: &'static str) -> Entered<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("reentrant `{op}` on a table while `{outer}` is in progress");
            }
            self.active.set(Some(op));
            Entered { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            Entered { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Entered<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.active.set(None);
    }
}
