//! Field framing protocol
//!
//! Every supported shape has exactly one encode rule and one matching decode
//! rule, selected statically through the [`Encode`] and [`Decode`] traits:
//!
//! ```text
//! scalar            u32 len ++ len raw bytes (native layout)
//! str / bytes       u32 len ++ len raw bytes
//! (A, B)            frame(A) ++ frame(B)
//! sequence / set    u32 count ++ count * frame(T)
//! map               u32 count ++ count * (frame(K) ++ frame(V))
//! composite         frame(field_0) ++ frame(field_1) ++ ...
//! ```
//!
//! The format carries no field tags. Encode and decode must issue the same
//! sequence of calls in the same order with the same types; a mismatch yields
//! garbage values (or a framing error when a length check happens to catch
//! it), never a detectable schema error.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::mem;

use tracing::warn;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Result;

/// A value that can be framed into an [`Encoder`]
pub trait Encode {
    /// Append this value's frame
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()>;
}

/// A value that can be reconstructed from a [`Decoder`]
pub trait Decode: Sized {
    /// Extract one value, consuming exactly the bytes its frame occupies
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self>;
}

/// Fixed-width value written as its native in-memory bit pattern
pub trait Scalar: Copy {
    /// Byte array holding the native representation
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Name reported in framing errors
    const TYPE_NAME: &'static str;

    /// Width of the record payload
    const WIDTH: usize = mem::size_of::<Self::Bytes>();

    /// Native-endian bytes of this value
    fn to_native(self) -> Self::Bytes;

    /// Rebuild a value, `None` if the bits are not a valid `Self`
    fn from_native(bytes: Self::Bytes) -> Option<Self>;
}

/// User-declared aggregate framed as its fields in declared order
///
/// Usually implemented through the [`composite!`](crate::composite) macro.
/// `write_fields` and `read_fields` must visit the same fields in the same
/// order.
pub trait Composite: Sized {
    /// Append every field, in declared order
    fn write_fields(&self, encoder: &mut Encoder<'_>) -> Result<()>;

    /// Extract every field, in declared order
    fn read_fields(decoder: &mut Decoder<'_>) -> Result<Self>;
}

/// Declare the field order of a struct and derive its framing
///
/// ```rust
/// use std::collections::BTreeMap;
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Message {
///     id: i32,
///     text: String,
///     table: BTreeMap<i32, String>,
/// }
///
/// archbit::composite!(Message { id, text, table });
///
/// let msg = Message { id: 7, text: "hi".into(), table: BTreeMap::new() };
/// let bytes = archbit::to_vec(&msg)?;
/// assert_eq!(archbit::from_slice::<Message>(&bytes)?, msg);
/// # Ok::<(), archbit::Error>(())
/// ```
#[macro_export]
macro_rules! composite {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Composite for $ty {
            fn write_fields(&self, encoder: &mut $crate::Encoder<'_>) -> $crate::Result<()> {
                $( encoder.append(&self.$field)?; )*
                Ok(())
            }

            fn read_fields(decoder: &mut $crate::Decoder<'_>) -> $crate::Result<Self> {
                Ok(Self {
                    $( $field: decoder.extract()?, )*
                })
            }
        }

        impl $crate::Encode for $ty {
            fn encode(&self, encoder: &mut $crate::Encoder<'_>) -> $crate::Result<()> {
                encoder.append_composite(self).map(|_| ())
            }
        }

        impl $crate::Decode for $ty {
            fn decode(decoder: &mut $crate::Decoder<'_>) -> $crate::Result<Self> {
                decoder.extract_composite()
            }
        }
    };
}

macro_rules! numeric_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                type Bytes = [u8; mem::size_of::<$ty>()];
                const TYPE_NAME: &'static str = stringify!($ty);

                #[inline]
                fn to_native(self) -> Self::Bytes {
                    self.to_ne_bytes()
                }

                #[inline]
                fn from_native(bytes: Self::Bytes) -> Option<Self> {
                    Some(<$ty>::from_ne_bytes(bytes))
                }
            }
        )*
    };
}

numeric_scalar!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

impl Scalar for bool {
    type Bytes = [u8; 1];
    const TYPE_NAME: &'static str = "bool";

    #[inline]
    fn to_native(self) -> Self::Bytes {
        [self as u8]
    }

    #[inline]
    fn from_native(bytes: Self::Bytes) -> Option<Self> {
        match bytes[0] {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }
}

impl Scalar for char {
    type Bytes = [u8; 4];
    const TYPE_NAME: &'static str = "char";

    #[inline]
    fn to_native(self) -> Self::Bytes {
        (self as u32).to_ne_bytes()
    }

    #[inline]
    fn from_native(bytes: Self::Bytes) -> Option<Self> {
        char::from_u32(u32::from_ne_bytes(bytes))
    }
}

macro_rules! scalar_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                #[inline]
                fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
                    encoder.append_scalar(*self).map(|_| ())
                }
            }

            impl Decode for $ty {
                #[inline]
                fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
                    decoder.extract_scalar()
                }
            }
        )*
    };
}

scalar_codec!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

impl Encode for str {
    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_str(self).map(|_| ())
    }
}

impl Encode for String {
    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_str(self).map(|_| ())
    }
}

impl Decode for String {
    #[inline]
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.extract_string()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        (**self).encode(encoder)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        (**self).encode(encoder)
    }
}

impl<T: Decode> Decode for Box<T> {
    #[inline]
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        T::decode(decoder).map(Box::new)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    #[inline]
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_pair(&self.0, &self.1).map(|_| ())
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    #[inline]
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.extract_pair()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_seq(self).map(|_| ())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_seq(self).map(|_| ())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut items = Vec::with_capacity(decoder.capacity_hint(count));
        for _ in 0..count {
            items.push(T::decode(decoder)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_seq(self).map(|_| ())
    }
}

impl<T: Decode> Decode for VecDeque<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut items = VecDeque::with_capacity(decoder.capacity_hint(count));
        for _ in 0..count {
            items.push_back(T::decode(decoder)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_seq(self).map(|_| ())
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut items = BTreeSet::new();
        for _ in 0..count {
            if !items.insert(T::decode(decoder)?) {
                warn!(count, "duplicate element in decoded set");
            }
        }
        Ok(items)
    }
}

impl<T: Encode, S> Encode for HashSet<T, S> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_seq(self).map(|_| ())
    }
}

impl<T, S> Decode for HashSet<T, S>
where
    T: Decode + Eq + Hash,
    S: BuildHasher + Default,
{
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut items = HashSet::with_capacity_and_hasher(decoder.capacity_hint(count), S::default());
        for _ in 0..count {
            if !items.insert(T::decode(decoder)?) {
                warn!(count, "duplicate element in decoded set");
            }
        }
        Ok(items)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_map(self).map(|_| ())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(decoder)?;
            let value = V::decode(decoder)?;
            if entries.insert(key, value).is_some() {
                warn!(count, "duplicate key in decoded map, keeping the last value");
            }
        }
        Ok(entries)
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.append_map(self).map(|_| ())
    }
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash,
    V: Decode,
    S: BuildHasher + Default,
{
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let count = decoder.extract_count()?;
        let mut entries =
            HashMap::with_capacity_and_hasher(decoder.capacity_hint(count), S::default());
        for _ in 0..count {
            let key = K::decode(decoder)?;
            let value = V::decode(decoder)?;
            if entries.insert(key, value).is_some() {
                warn!(count, "duplicate key in decoded map, keeping the last value");
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FramingFault};
    use crate::PREFIX_SIZE;

    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: i16,
        y: i16,
        label: String,
    }

    composite!(Point { x, y, label });

    #[test]
    fn test_scalar_widths() {
        assert_eq!(<u8 as Scalar>::WIDTH, 1);
        assert_eq!(<bool as Scalar>::WIDTH, 1);
        assert_eq!(<char as Scalar>::WIDTH, 4);
        assert_eq!(<f64 as Scalar>::WIDTH, 8);
        assert_eq!(<u128 as Scalar>::WIDTH, 16);
        assert_eq!(<usize as Scalar>::WIDTH, mem::size_of::<usize>());
    }

    #[test]
    fn test_scalar_native_layout() {
        let mut encoder = Encoder::new();
        encoder.append(&0x0102_0304u32).unwrap();

        let mut expected = 4u32.to_ne_bytes().to_vec();
        expected.extend_from_slice(&0x0102_0304u32.to_ne_bytes());
        assert_eq!(encoder.get().as_ref(), expected.as_slice());
    }

    #[test]
    fn test_invalid_bool_and_char() {
        assert_eq!(bool::from_native([2]), None);
        assert_eq!(char::from_native(0xD800u32.to_ne_bytes()), None);

        let mut encoder = Encoder::new();
        encoder.append(&7u8).unwrap();
        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        let err = decoder.extract::<bool>().unwrap_err();
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::InvalidScalar { type_name: "bool" })
        );
    }

    #[test]
    fn test_composite_has_no_wrapper() {
        let point = Point {
            x: 3,
            y: -4,
            label: "p".to_string(),
        };
        let mut encoder = Encoder::new();
        encoder.append(&point).unwrap();

        // three field records back to back
        assert_eq!(encoder.len(), (PREFIX_SIZE + 2) * 2 + PREFIX_SIZE + 1);

        let mut manual = Encoder::new();
        manual.append(&3i16).unwrap().append(&-4i16).unwrap().append("p").unwrap();
        assert_eq!(encoder.get(), manual.get());
    }

    #[test]
    fn test_nested_containers() {
        let mut value: BTreeMap<String, Vec<(u8, Point)>> = BTreeMap::new();
        value.insert(
            "a".to_string(),
            vec![(1, Point::default()), (2, Point { x: 1, y: 1, label: "q".into() })],
        );
        value.insert("empty".to_string(), Vec::new());

        let bytes = crate::to_vec(&value).unwrap();
        let decoded: BTreeMap<String, Vec<(u8, Point)>> = crate::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_sets_and_hash_containers() {
        let set: HashSet<u32> = [5, 9, 11].into_iter().collect();
        let map: HashMap<char, Vec<String>> =
            [('x', vec!["1".to_string()]), ('y', vec![])].into_iter().collect();
        let deque: VecDeque<bool> = [true, false, true].into_iter().collect();

        let mut encoder = Encoder::new();
        encoder.append(&set).unwrap().append(&map).unwrap().append(&deque).unwrap();

        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        assert_eq!(decoder.extract::<HashSet<u32>>().unwrap(), set);
        assert_eq!(decoder.extract::<HashMap<char, Vec<String>>>().unwrap(), map);
        assert_eq!(decoder.extract::<VecDeque<bool>>().unwrap(), deque);
        assert!(decoder.is_exhausted());
    }

    #[test]
    fn test_duplicate_map_key_keeps_last() {
        // hand-framed map with key 1 twice
        let mut raw = Vec::new();
        raw.extend_from_slice(&2u32.to_ne_bytes());
        for (k, v) in [(1i32, 10i32), (1, 20)] {
            raw.extend_from_slice(&4u32.to_ne_bytes());
            raw.extend_from_slice(&k.to_ne_bytes());
            raw.extend_from_slice(&4u32.to_ne_bytes());
            raw.extend_from_slice(&v.to_ne_bytes());
        }

        let decoded: BTreeMap<i32, i32> = crate::from_slice(&raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[&1], 20);
    }

    #[test]
    fn test_type_mismatch_detected_by_width() {
        let bytes = crate::to_vec(&1u64).unwrap();
        let err = crate::from_slice::<u32>(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing);
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::WidthMismatch {
                expected: 4,
                found: 8
            })
        );
    }
}
