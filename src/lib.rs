//! # SDON
//!
//! SDON (Serenity Data Object Notation) is a dynamic, self-describing value
//! model with a multi-format serialization engine. A [`Value`] is a tagged
//! tree of scalars, byte-strings, arrays and dictionaries; the engine
//! encodes it as JSON text, a CBOR-derived binary format, or the bracketed
//! "Serenity" text format, with optional LZ4 compression layered on top and
//! format auto-detection on the way back in.
//!
//! # Usage
//!
//! ```
//! use sdon::prelude::*;
//!
//! let mut doc = Value::Null;
//! doc.set("stappler", "name");
//! doc.set(42i64, "answer");
//! doc.set(vec![Value::from(1i64), Value::from(2i64)], "values");
//!
//! // encode
//! let bytes = write(&doc, EncodeFormat::CBOR);
//!
//! // decode; the format is sniffed from the leading bytes
//! let back = read(&bytes);
//!
//! assert_eq!(doc, back);
//! ```
//!
//! Decoding is total: malformed input never panics and never returns an
//! error. Bad tokens are skipped, truncated documents produce the
//! well-formed part of the tree, and completely undecodable input yields
//! [`Value::Null`]. Callers detect failure by checking emptiness.
//!
//! # Formats
//!
//! | format | leading bytes | notes |
//! | ---    | ---           | ---   |
//! | CBOR | `d9 d9 f7` | self-describe CBOR prefix |
//! | base64 CBOR | `"2dn3"` | base64 of the CBOR prefix; decoded then re-dispatched |
//! | LZ4 frame | `"LZ4S"` / `"LZ4W"` | 2- or 4-byte original-length prefix follows |
//! | Brotli | `"SPBr"` | reserved; decoding yields `Null` |
//! | Serenity | `(` | bracketed text format |
//! | JSON | anything else | lenient text JSON |
//!
//! ## CBOR subset
//!
//! The first byte of an item is `major_type << 5 | additional_info`.
//! Additional info below 24 is the value itself; 24/25/26/27 mean "read the
//! next 1/2/4/8 bytes, big endian"; 31 starts an indefinite-length item
//! terminated by the break byte `0xff`. Integers are encoded at the
//! smallest width that holds them; negative `n` is the Negative major type
//! with payload `-1 - n`. Floats are encoded at the smallest IEEE 754 width
//! that round-trips (half, then single, then double); NaN is always the
//! half-precision NaN. Tags are read and discarded on decode.
//!
//! ## Serenity
//!
//! `(k1:v1;k2:v2)` is a dictionary, `~(a,b,c)` an array, `~token` a
//! percent-encoded byte-string. Bare tokens are typed by a fixed literal
//! table (`true`, `false`, `null`, `nan`, `inf`, `-inf`, numbers); anything
//! else is a percent-decoded string. An un-bracketed comma-separated run is
//! a "plain list": it becomes an array on the first `,` and is converted to
//! a dictionary retroactively if a `key:` pair appears later.
//!
//! ## Compressed frames
//!
//! `[magic:4]["LZ4S": u16 | "LZ4W": u32, little endian original size][LZ4 block]`.
//! Compression is conditional by default: when the frame would not be
//! smaller than the raw encoding, the raw encoding is written instead.

#![warn(
    deprecated_in_future,
    unsafe_code,
    unused_labels,
    keyword_idents,
    missing_copy_implementations,
    missing_debug_implementations,
    macro_use_extern_crate,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]

pub mod cbor;
pub mod compress;
pub mod errors;
pub mod format;
pub mod json;
pub mod prelude;
pub mod serenity;
pub mod stream;
mod util;

use std::collections::BTreeMap;
use std::fmt;

pub use crate::errors::Error;
pub use crate::format::{
    detect_data_format, read, read_file, read_with_key, save, write, write_to, Compression,
    DataFormat, EncodeFormat, Encryption, Format,
};
pub use crate::stream::StreamingDecoder;

/// An ordered sequence of values.
pub type Array = Vec<Value>;

/// A string-keyed mapping with unique, ordered keys.
pub type Dictionary = BTreeMap<String, Value>;

static NULL: Value = Value::Null;
static ARRAY_NULL: Array = Vec::new();
static DICTIONARY_NULL: Dictionary = BTreeMap::new();

/// [`Value`] and its variants.
///
/// Every payload is exclusively owned: cloning a value deep-copies the
/// tree, moving it transfers ownership, and dropping it drops the tree
/// recursively. There is no reference counting and no aliasing.
///
/// # Example
///
/// ```
/// use sdon::Value;
///
/// let v = Value::from(true);
///
/// assert!(v.as_bool());
/// ```
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The empty value. Missing keys and failed decodes read as `Null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Raw byte-string.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Array(Array),
    /// String-keyed dictionary.
    Dictionary(Dictionary),
}

/// Keys a [`Value`] can be indexed by: `usize` for arrays, `&str` /
/// `String` for dictionaries.
///
/// This trait is sealed; the two key shapes above are the whole story.
pub trait ValueIndex: private::Sealed {
    #[doc(hidden)]
    fn index_into<'a>(&self, v: &'a Value) -> Option<&'a Value>;
    #[doc(hidden)]
    fn index_into_mut<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value>;
    #[doc(hidden)]
    fn index_or_insert<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value>;
    #[doc(hidden)]
    fn remove_from(&self, v: &mut Value) -> bool;
}

mod private {
    pub trait Sealed {}
    impl Sealed for usize {}
    impl Sealed for str {}
    impl Sealed for String {}
    impl<'a, T: Sealed + ?Sized> Sealed for &'a T {}
}

impl ValueIndex for usize {
    fn index_into<'a>(&self, v: &'a Value) -> Option<&'a Value> {
        match v {
            Value::Array(a) => a.get(*self),
            _ => None,
        }
    }

    fn index_into_mut<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        match v {
            Value::Array(a) => a.get_mut(*self),
            _ => None,
        }
    }

    fn index_or_insert<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        if v.is_null() {
            *v = Value::Array(Array::new());
        }
        match v {
            Value::Array(a) => {
                if *self >= a.len() {
                    a.resize(*self + 1, Value::Null);
                }
                a.get_mut(*self)
            }
            _ => None,
        }
    }

    fn remove_from(&self, v: &mut Value) -> bool {
        match v {
            Value::Array(a) if *self < a.len() => {
                a.remove(*self);
                true
            }
            _ => false,
        }
    }
}

impl ValueIndex for str {
    fn index_into<'a>(&self, v: &'a Value) -> Option<&'a Value> {
        match v {
            Value::Dictionary(d) => d.get(self),
            _ => None,
        }
    }

    fn index_into_mut<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        match v {
            Value::Dictionary(d) => d.get_mut(self),
            _ => None,
        }
    }

    fn index_or_insert<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        if v.is_null() {
            *v = Value::Dictionary(Dictionary::new());
        }
        match v {
            Value::Dictionary(d) => Some(d.entry(self.to_owned()).or_insert(Value::Null)),
            _ => None,
        }
    }

    fn remove_from(&self, v: &mut Value) -> bool {
        match v {
            Value::Dictionary(d) => d.remove(self).is_some(),
            _ => false,
        }
    }
}

impl ValueIndex for String {
    fn index_into<'a>(&self, v: &'a Value) -> Option<&'a Value> { self[..].index_into(v) }

    fn index_into_mut<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        self[..].index_into_mut(v)
    }

    fn index_or_insert<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        self[..].index_or_insert(v)
    }

    fn remove_from(&self, v: &mut Value) -> bool { self[..].remove_from(v) }
}

impl<'b, T: ValueIndex + ?Sized> ValueIndex for &'b T {
    fn index_into<'a>(&self, v: &'a Value) -> Option<&'a Value> { (**self).index_into(v) }

    fn index_into_mut<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        (**self).index_into_mut(v)
    }

    fn index_or_insert<'a>(&self, v: &'a mut Value) -> Option<&'a mut Value> {
        (**self).index_or_insert(v)
    }

    fn remove_from(&self, v: &mut Value) -> bool { (**self).remove_from(v) }
}

impl Value {
    /// Borrows the value under `key`, or the shared `Null` sentinel when
    /// the key is missing or the value is not the matching container.
    ///
    /// Lookups never fail, which keeps generic tree-walking code free of
    /// error branches.
    ///
    /// # Example
    ///
    /// ```
    /// use sdon::Value;
    ///
    /// let mut v = Value::Null;
    /// v.set(1i64, "a");
    ///
    /// assert_eq!(v.get("a").as_integer(), 1);
    /// assert!(v.get("missing").is_null());
    /// assert!(v.get(99).is_null());
    /// ```
    pub fn get<K: ValueIndex>(&self, key: K) -> &Value { key.index_into(self).unwrap_or(&NULL) }

    /// Mutably borrows the value under `key` if it exists.
    pub fn get_mut<K: ValueIndex>(&mut self, key: K) -> Option<&mut Value> {
        key.index_into_mut(self)
    }

    /// Stores `value` under `key`, returning a reference to the stored
    /// value.
    ///
    /// A `Null` receiver is converted into the container the key shape
    /// requires: an integer key makes it an array (extended with `Null` up
    /// to the index), a string key makes it a dictionary. Returns `None`
    /// when the receiver is an incompatible non-null value.
    pub fn set<V: Into<Value>, K: ValueIndex>(&mut self, value: V, key: K) -> Option<&mut Value> {
        let slot = key.index_or_insert(self)?;
        *slot = value.into();
        Some(slot)
    }

    /// Appends `value` to an array, converting a `Null` receiver into an
    /// empty array first.
    pub fn add<V: Into<Value>>(&mut self, value: V) -> Option<&mut Value> {
        if self.is_null() {
            *self = Value::Array(Array::new());
        }
        match self {
            Value::Array(a) => {
                a.push(value.into());
                a.last_mut()
            }
            _ => None,
        }
    }

    /// Removes the value under `key`. Returns `false` when there was
    /// nothing to remove.
    pub fn erase<K: ValueIndex>(&mut self, key: K) -> bool { key.remove_from(self) }

    /// Indicates whether `key` is present.
    pub fn has<K: ValueIndex>(&self, key: K) -> bool { key.index_into(self).is_some() }

    pub fn set_bool<K: ValueIndex>(&mut self, value: bool, key: K) { self.set(value, key); }

    pub fn set_integer<K: ValueIndex>(&mut self, value: i64, key: K) { self.set(value, key); }

    pub fn set_double<K: ValueIndex>(&mut self, value: f64, key: K) { self.set(value, key); }

    pub fn set_string<K: ValueIndex>(&mut self, value: impl Into<String>, key: K) {
        self.set(Value::String(value.into()), key);
    }

    pub fn set_bytes<K: ValueIndex>(&mut self, value: Vec<u8>, key: K) {
        self.set(Value::Bytes(value), key);
    }

    pub fn set_array<K: ValueIndex>(&mut self, value: Array, key: K) {
        self.set(Value::Array(value), key);
    }

    pub fn set_dict<K: ValueIndex>(&mut self, value: Dictionary, key: K) {
        self.set(Value::Dictionary(value), key);
    }

    pub fn add_bool(&mut self, value: bool) { self.add(value); }

    pub fn add_integer(&mut self, value: i64) { self.add(value); }

    pub fn add_double(&mut self, value: f64) { self.add(value); }

    pub fn add_string(&mut self, value: impl Into<String>) { self.add(Value::String(value.into())); }

    pub fn add_bytes(&mut self, value: Vec<u8>) { self.add(Value::Bytes(value)); }

    pub fn add_array(&mut self, value: Array) { self.add(Value::Array(value)); }

    pub fn add_dict(&mut self, value: Dictionary) { self.add(Value::Dictionary(value)); }

    pub fn get_bool<K: ValueIndex>(&self, key: K) -> bool { self.get(key).as_bool() }

    pub fn get_integer<K: ValueIndex>(&self, key: K) -> i64 { self.get(key).as_integer() }

    pub fn get_double<K: ValueIndex>(&self, key: K) -> f64 { self.get(key).as_double() }

    pub fn get_string<K: ValueIndex>(&self, key: K) -> &str {
        match self.get(key) {
            Value::String(s) => s,
            _ => "",
        }
    }

    pub fn get_bytes<K: ValueIndex>(&self, key: K) -> &[u8] {
        match self.get(key) {
            Value::Bytes(b) => b,
            _ => &[],
        }
    }

    pub fn get_array<K: ValueIndex>(&self, key: K) -> &Array { self.get(key).as_array() }

    pub fn get_dict<K: ValueIndex>(&self, key: K) -> &Dictionary { self.get(key).as_dict() }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn is_bool(&self) -> bool { matches!(self, Value::Bool(_)) }

    pub fn is_integer(&self) -> bool { matches!(self, Value::Integer(_)) }

    pub fn is_double(&self) -> bool { matches!(self, Value::Double(_)) }

    pub fn is_string(&self) -> bool { matches!(self, Value::String(_)) }

    pub fn is_bytes(&self) -> bool { matches!(self, Value::Bytes(_)) }

    pub fn is_array(&self) -> bool { matches!(self, Value::Array(_)) }

    pub fn is_dictionary(&self) -> bool { matches!(self, Value::Dictionary(_)) }

    /// Indicates whether the value is a scalar or `Null` (not a container).
    pub fn is_basic_type(&self) -> bool { !self.is_array() && !self.is_dictionary() }

    /// Coerces to an integer.
    ///
    /// Strings parse as decimal (falling back through a float parse);
    /// doubles truncate; booleans map to 0/1; everything else is 0.
    pub fn as_integer(&self) -> i64 {
        match self {
            Value::Integer(i) => *i,
            Value::Double(d) => *d as i64,
            Value::Bool(b) => *b as i64,
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|d| d as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Coerces to a double. Same table as [`as_integer`](Value::as_integer).
    pub fn as_double(&self) -> f64 {
        match self {
            Value::Double(d) => *d,
            Value::Integer(i) => *i as f64,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Coerces to a boolean.
    ///
    /// The strings `"0"` and `"false"` are false, every other string is
    /// true; numbers are false at zero; containers and `Null` are false.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::String(s) => !(s == "0" || s == "false"),
            _ => false,
        }
    }

    /// Coerces to a string. Scalars print through their display form,
    /// byte-strings print as `BASE64:<b64>`, containers print empty.
    pub fn as_string(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Bool(b) => (if *b { "true" } else { "false" }).to_owned(),
            Value::Bytes(b) => format!("BASE64:{}", STANDARD.encode(b)),
            _ => String::new(),
        }
    }

    /// Coerces to bytes: numbers as their little-endian image, booleans as
    /// a single byte, strings as UTF-8, containers and `Null` as empty.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b.clone(),
            Value::Integer(i) => i.to_le_bytes().to_vec(),
            Value::Double(d) => d.to_le_bytes().to_vec(),
            Value::Bool(b) => vec![*b as u8],
            Value::String(s) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Borrows the array payload, or a shared empty array for any other
    /// type.
    pub fn as_array(&self) -> &Array {
        match self {
            Value::Array(a) => a,
            _ => &ARRAY_NULL,
        }
    }

    /// Borrows the dictionary payload, or a shared empty dictionary for
    /// any other type.
    pub fn as_dict(&self) -> &Dictionary {
        match self {
            Value::Dictionary(d) => d,
            _ => &DICTIONARY_NULL,
        }
    }

    /// Element or byte count for containers and strings; 0 for scalars.
    pub fn size(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Array(a) => a.len(),
            Value::Dictionary(d) => d.len(),
            _ => 0,
        }
    }

    /// True when [`size`](Value::size) is 0.
    pub fn is_empty(&self) -> bool { self.size() == 0 }

    /// Resets the value to `Null`, dropping any payload.
    pub fn clear(&mut self) { *self = Value::Null; }

    /// Moves `count` elements starting at `start` out of an array into a
    /// new array value. Returns `Null` when the receiver is not an array
    /// or the range is out of bounds.
    pub fn slice(&mut self, start: usize, count: usize) -> Value {
        match self {
            Value::Array(a) if start + count <= a.len() => {
                Value::Array(a.drain(start..start + count).collect())
            }
            _ => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => (a - b).abs() <= f64::EPSILON,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                // key lookup, not entry order
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map_or(false, |o| v == o))
            }
            _ => false,
        }
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool { self.is_basic_type() && self.as_bool() == *other }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool { self.is_basic_type() && self.as_integer() == *other }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        self.is_basic_type() && (self.as_double() - *other).abs() <= f64::EPSILON
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        match self {
            Value::String(s) => s == other,
            _ => false,
        }
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool { self == *other }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", json::encode(self))
    }
}

from_fn!(Value, bool, Value::Bool);
from_fn!(Value, i64, Value::Integer);
from_fn!(Value, f64, Value::Double);
from_fn!(Value, String, Value::String);
from_fn!(Value, Vec<u8>, Value::Bytes);
from_fn!(Value, Array, Value::Array);
from_fn!(Value, Dictionary, Value::Dictionary);

from_fn!(Value, &str, |s: &str| Value::String(s.to_owned()));
from_fn!(Value, &[u8], |b: &[u8]| Value::Bytes(b.to_vec()));

// integer primitives
from_as!(Value, i8, i64);
from_as!(Value, i16, i64);
from_as!(Value, i32, i64);
from_as!(Value, u8, i64);
from_as!(Value, u16, i64);
from_as!(Value, u32, i64);
from_as!(Value, u64, i64);
from_as!(Value, usize, i64);
from_as!(Value, isize, i64);

// floats
from_as!(Value, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinels() {
        let v = Value::from(5i64);

        assert!(v.get("key").is_null());
        assert!(v.get(0).is_null());
        assert!(v.as_array().is_empty());
        assert!(v.as_dict().is_empty());
    }

    #[test]
    fn auto_convert_on_write() {
        let mut v = Value::Null;
        v.set(1i64, "a");
        assert!(v.is_dictionary());

        let mut v = Value::Null;
        v.set("x", 2);
        assert!(v.is_array());
        assert_eq!(v.size(), 3);
        assert!(v.get(0).is_null());
        assert_eq!(v.get_string(2), "x");

        // a populated scalar refuses to become a container
        let mut v = Value::from(true);
        assert!(v.set(1i64, "a").is_none());
        assert!(v.is_bool());
    }

    #[test]
    fn add_appends() {
        let mut v = Value::Null;
        v.add_integer(1);
        v.add_string("two");
        assert_eq!(v.size(), 2);
        assert_eq!(v.get_integer(0), 1);
    }

    #[test]
    fn erase() {
        let mut v = Value::Null;
        v.set(1i64, "a");
        v.set(2i64, "b");

        assert!(v.erase("a"));
        assert!(!v.erase("a"));
        assert_eq!(v.size(), 1);
    }

    #[test]
    fn coercions() {
        assert_eq!(Value::from("42").as_integer(), 42);
        assert_eq!(Value::from("2.5").as_integer(), 2);
        assert_eq!(Value::from(2.9f64).as_integer(), 2);
        assert_eq!(Value::from(true).as_integer(), 1);

        assert!(!Value::from("false").as_bool());
        assert!(!Value::from("0").as_bool());
        assert!(Value::from("no").as_bool());
        assert!(!Value::from(0.0f64).as_bool());
        assert!(!Value::Null.as_bool());

        assert_eq!(Value::from(3i64).as_string(), "3");
        assert_eq!(Value::from(vec![0u8]).as_string(), "BASE64:AA==");
    }

    #[test]
    fn double_equality_uses_epsilon() {
        let a = Value::from(1.0f64);
        let b = Value::from(1.0f64 + f64::EPSILON / 2.0);
        assert_eq!(a, b);
        assert_ne!(Value::from(1.0f64), Value::from(1i64));
    }

    #[test]
    fn dictionary_equality_ignores_order() {
        let mut a = Value::Null;
        a.set(1i64, "x");
        a.set(2i64, "y");

        let mut b = Value::Null;
        b.set(2i64, "y");
        b.set(1i64, "x");

        assert_eq!(a, b);
    }

    #[test]
    fn slice_moves_elements() {
        let mut v = Value::Null;
        for i in 0..5i64 {
            v.add_integer(i);
        }

        let s = v.slice(1, 2);
        assert_eq!(s.size(), 2);
        assert_eq!(s.get_integer(0), 1);
        assert_eq!(v.size(), 3);

        assert!(v.slice(2, 5).is_null());
    }
}
