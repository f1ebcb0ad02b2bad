//! Value: the type-erased payload stored by a default `HybridTable`.
//!
//! A `Value` is either holding some `T: Any + Send` or is a placeholder. Placeholders
//! come from `Default` (e.g. `get_or_insert_default`) and turn into
//! `T::default()` on the first typed mutable access.

use crate::error::{Result, TableError};
use core::any::{type_name, Any};
use core::fmt;

const PLACEHOLDER: &str = "<placeholder>";

pub struct Value {
    inner: Option<Box<dyn Any + Send>>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            inner: Some(Box::new(value)),
            type_name: type_name::<T>(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.inner.is_none()
    }

    /// Name of the stored type, or `<placeholder>`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.as_ref().is_some_and(|b| b.is::<T>())
    }

    pub fn downcast_ref<T: Any>(&self) -> Result<&T> {
        let found = self.type_name;
        self.inner
            .as_ref()
            .and_then(|b| b.downcast_ref::<T>())
            .ok_or_else(|| mismatch::<T>(found))
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T> {
        let found = self.type_name;
        self.inner
            .as_mut()
            .and_then(|b| b.downcast_mut::<T>())
            .ok_or_else(|| mismatch::<T>(found))
    }

    /// Mutable access as `T`, first replacing a placeholder with `T::default()`.
    pub fn get_or_default_mut<T: Any + Default + Send>(&mut self) -> Result<&mut T> {
        if self.inner.is_none() {
            *self = Value::new(T::default());
        }
        self.downcast_mut::<T>()
    }

    /// Replaces the contents, whatever their type.
    pub fn set<T: Any + Send>(&mut self, value: T) {
        *self = Value::new(value);
    }

    /// Unpacks the value; on a type mismatch the value is handed back intact.
    pub fn into_inner<T: Any>(self) -> core::result::Result<T, Self> {
        let type_name = self.type_name;
        match self.inner {
            Some(b) => b.downcast::<T>().map(|v| *v).map_err(|b| Self {
                inner: Some(b),
                type_name,
            }),
            None => Err(Self::default()),
        }
    }
}

fn mismatch<T: Any>(found: &'static str) -> TableError {
    TableError::TypeMismatch {
        expected: type_name::<T>(),
        found,
    }
}

impl Default for Value {
    fn default() -> Self {
        Self {
            inner: None,
            type_name: PLACEHOLDER,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.type_name).finish()
    }
}
