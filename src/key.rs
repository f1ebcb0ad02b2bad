//! Key model: the closed set of built-in key kinds plus the extensible kind.
//!
//! Hashes of the built-in kinds are fixed formulas so that equal keys always
//! land in the same main position, across tables and across runs. Extensible
//! keys are hashed through a [`HashRegistry`] and cache the result in place.

use crate::error::{Result, TableError};
use crate::registry::HashRegistry;
use core::any::{Any, TypeId};
use core::cell::Cell;
use core::fmt;

const STRING_SEED: u64 = 1_829_732;
// Magnitude of i32::MIN; the significand of a number is scaled by this.
const NUMBER_SCALE: f64 = 2_147_483_648.0;

/// Tag of a [`Key`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyKind {
    Integer,
    Number,
    String,
    OpaqueCursor,
    Extensible,
}

/// A table key.
#[derive(Clone, Debug, PartialEq)]
pub enum Key {
    Integer(i64),
    Number(f64),
    String(String),
    /// Address-sized identifier. Compared and hashed by bit pattern, never
    /// dereferenced.
    OpaqueCursor(usize),
    Extensible(ExtKey),
}

impl Key {
    /// Wraps a user-defined value. Its type must be registered with the
    /// [`HashRegistry`] of any table the key is used with.
    pub fn extensible<T>(value: T) -> Self
    where
        T: Any + Clone + PartialEq + fmt::Debug + Send,
    {
        Key::Extensible(ExtKey::new(value))
    }

    /// Identifies a key by the address of `ptr`.
    pub fn opaque<T: ?Sized>(ptr: *const T) -> Self {
        Key::OpaqueCursor(ptr as *const () as usize)
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Integer(_) => KeyKind::Integer,
            Key::Number(_) => KeyKind::Number,
            Key::String(_) => KeyKind::String,
            Key::OpaqueCursor(_) => KeyKind::OpaqueCursor,
            Key::Extensible(_) => KeyKind::Extensible,
        }
    }

    /// Integer payload of an `Integer` key.
    ///
    /// # Panics
    /// Panics if the key is of any other kind. Callers check the tag first;
    /// use [`Key::as_integer`] when that is not known.
    #[inline]
    pub fn integer(&self) -> i64 {
        match self {
            Key::Integer(i) => *i,
            other => panic!("integer payload read from a {:?} key", other.kind()),
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Key::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Computes this key's hash. Only extensible keys consult `registry`
    /// and only they can fail.
    pub fn hash(&self, registry: &HashRegistry) -> Result<u64> {
        Ok(match self {
            Key::Integer(i) => hash_integer(*i),
            Key::Number(n) => hash_number(*n),
            Key::String(s) => hash_string(s.as_bytes()),
            Key::OpaqueCursor(p) => *p as u64,
            Key::Extensible(ext) => return registry.get_hash(ext),
        })
    }
}

#[inline]
pub(crate) fn hash_integer(i: i64) -> u64 {
    if i >= 0 {
        i as u64
    } else {
        !i as u64
    }
}

pub(crate) fn hash_number(n: f64) -> u64 {
    let (significand, exponent) = frexp(n);
    let tail = significand * NUMBER_SCALE;
    if !tail.is_finite() {
        return 0;
    }
    (tail as i64 as u64).wrapping_add(exponent as i64 as u64)
}

pub(crate) fn hash_string(bytes: &[u8]) -> u64 {
    bytes.iter().fold(STRING_SEED, |h, &c| {
        // Bytes add as unsigned so hashes agree on every platform, whatever
        // the signedness of a C `char`.
        h ^ (h << 5).wrapping_add(h >> 2).wrapping_add(c as u64)
    })
}

/// Splits `x` into a significand in `[0.5, 1)` (sign preserved) and a base-2
/// exponent with `x == significand * 2^exponent`. Zero, NaN and infinities
/// are returned unchanged with exponent 0.
pub(crate) fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: normalize first.
        let (m, e) = frexp(x * 2f64.powi(64));
        return (m, e - 64);
    }
    let significand = f64::from_bits((bits & !(0x7ff_u64 << 52)) | (1022_u64 << 52));
    (significand, biased - 1022)
}

macro_rules! key_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key {
                #[inline]
                fn from(v: $t) -> Self {
                    Key::Integer(v as i64)
                }
            }
        )*
    };
}

key_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f32> for Key {
    fn from(v: f32) -> Self {
        Key::Number(v as f64)
    }
}

impl From<f64> for Key {
    fn from(v: f64) -> Self {
        Key::Number(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::String(v.to_owned())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::String(v)
    }
}

/// Object-safe view over an extensible key's payload.
pub(crate) trait Payload: fmt::Debug + Send {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Payload) -> bool;
    fn clone_box(&self) -> Box<dyn Payload>;
}

impl<T> Payload for T
where
    T: Any + Clone + PartialEq + fmt::Debug + Send,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Payload) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map(|o| self == o)
            .unwrap_or(false)
    }

    fn clone_box(&self) -> Box<dyn Payload> {
        Box::new(self.clone())
    }
}

/// An owned, type-erased user value used as a key, with its cached hash.
pub struct ExtKey {
    payload: Box<dyn Payload>,
    type_id: TypeId,
    type_name: &'static str,
    // 0 means "not yet computed".
    hash: Cell<u64>,
}

impl ExtKey {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Clone + PartialEq + fmt::Debug + Send,
    {
        Self {
            payload: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            hash: Cell::new(0),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Result<&T> {
        self.payload
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| TableError::TypeMismatch {
                expected: core::any::type_name::<T>(),
                found: self.type_name,
            })
    }

    pub(crate) fn payload(&self) -> &dyn Any {
        self.payload.as_any()
    }

    pub(crate) fn cached_hash(&self) -> u64 {
        self.hash.get()
    }

    pub(crate) fn cache_hash(&self, hash: u64) {
        self.hash.set(hash);
    }
}

impl Clone for ExtKey {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone_box(),
            type_id: self.type_id,
            type_name: self.type_name,
            hash: Cell::new(self.hash.get()),
        }
    }
}

impl PartialEq for ExtKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.payload.dyn_eq(other.payload.as_ref())
    }
}

impl fmt::Debug for ExtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtKey")
            .field("type", &self.type_name)
            .field("value", &self.payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pair(i32, i32);

    #[test]
    fn integer_hash_complements_negatives() {
        assert_eq!(hash_integer(0), 0);
        assert_eq!(hash_integer(42), 42);
        assert_eq!(hash_integer(-1), 0);
        assert_eq!(hash_integer(-43), 42);
        assert_eq!(hash_integer(i64::MIN), i64::MAX as u64);
    }

    #[test]
    fn frexp_matches_classic_split() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(0.75), (0.75, 0));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.0), (0.0, 0));
        let tiny = f64::from_bits(1);
        let (m, e) = frexp(tiny);
        assert_eq!(m, 0.5);
        assert_eq!(e, -1073);
    }

    #[test]
    fn number_hash_values() {
        assert_eq!(hash_number(1.0), (1u64 << 30) + 1);
        assert_eq!(hash_number(0.0), 0);
        assert_eq!(hash_number(-0.0), 0);
        assert_eq!(hash_number(f64::NAN), 0);
        assert_eq!(hash_number(f64::INFINITY), 0);
        assert_eq!(hash_number(f64::NEG_INFINITY), 0);
        // -0.75 * 2^31 truncates to -1610612736, then + 2.
        assert_eq!(hash_number(-3.0), (-1_610_612_736_i64 + 2) as u64);
    }

    #[test]
    fn string_hash_is_seeded_and_byte_driven() {
        assert_eq!(hash_string(b""), STRING_SEED);
        let h = STRING_SEED;
        let expect = h ^ ((h << 5) + (h >> 2) + b'a' as u64);
        assert_eq!(hash_string(b"a"), expect);
        assert_ne!(hash_string(b"ab"), hash_string(b"ba"));
    }

    #[test]
    fn string_hash_adds_high_bytes_unsigned() {
        let h = STRING_SEED;
        let expect = h ^ ((h << 5) + (h >> 2) + 0xC3);
        assert_eq!(hash_string(&[0xC3]), expect);
        // "é" is 0xC3 0xA9 in UTF-8.
        let expect = expect ^ (expect << 5).wrapping_add(expect >> 2).wrapping_add(0xA9);
        assert_eq!(hash_string("é".as_bytes()), expect);
        assert_eq!(Key::from("é").hash(&HashRegistry::new()).unwrap(), expect);
    }

    #[test]
    fn cross_kind_keys_are_unequal() {
        assert_ne!(Key::from(1), Key::from(1.0));
        assert_ne!(Key::from("1"), Key::from(1));
        assert_ne!(Key::OpaqueCursor(1), Key::Integer(1));
        assert_ne!(Key::extensible(1i64), Key::Integer(1));
    }

    #[test]
    fn extensible_equality_requires_same_type() {
        assert_eq!(Key::extensible(Pair(1, 2)), Key::extensible(Pair(1, 2)));
        assert_ne!(Key::extensible(Pair(1, 2)), Key::extensible(Pair(1, 3)));
        assert_ne!(Key::extensible(7i32), Key::extensible(7i64));
    }

    #[test]
    fn ext_key_downcast() {
        let k = ExtKey::new(Pair(3, 4));
        assert_eq!(k.downcast_ref::<Pair>().unwrap(), &Pair(3, 4));
        match k.downcast_ref::<String>() {
            Err(TableError::TypeMismatch { found, .. }) => assert!(found.contains("Pair")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn clone_keeps_cached_hash() {
        let k = ExtKey::new(Pair(1, 1));
        k.cache_hash(99);
        assert_eq!(k.clone().cached_hash(), 99);
    }

    #[test]
    fn opaque_keys_compare_by_address() {
        let a = 1u8;
        let b = 2u8;
        assert_eq!(Key::opaque(&a as *const u8), Key::opaque(&a as *const u8));
        assert_ne!(Key::opaque(&a as *const u8), Key::opaque(&b as *const u8));
    }

    #[test]
    fn integer_accessor() {
        assert_eq!(Key::from(-5).integer(), -5);
        assert_eq!(Key::from("x").as_integer(), None);
    }

    #[test]
    #[should_panic(expected = "integer payload read from a String key")]
    fn integer_accessor_panics_on_wrong_tag() {
        let _ = Key::from("x").integer();
    }
}
