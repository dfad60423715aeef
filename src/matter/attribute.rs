//! Attribute storage cells.
//!
//! A cell owns the byte image of one attribute value and knows how to copy
//! it in and out of flat buffers. Integers are copied verbatim in host byte
//! order; wire endianness belongs to the protocol engine.
//!
//! Two families exist:
//! - [`Primitive`]: fixed-width values. Reads and writes must use exactly
//!   the value's size.
//! - [`OctetString`]: length-prefixed byte or character strings with a
//!   compile-time capacity. The image is one length byte followed by the
//!   content.

use super::status::AttributeError;
use super::types::{Access, AttrId, AttributeType};
use std::fmt;

/// Byte-level storage for a single attribute value.
pub trait AttributeCell: Send + Sync + fmt::Debug {
    fn attr_type(&self) -> AttributeType;

    /// Largest byte image this cell can hold.
    fn max_size(&self) -> usize;

    /// Size of the current byte image.
    fn size(&self) -> usize;

    /// Check that `buf` holds an image this cell would accept.
    fn validate(&self, buf: &[u8]) -> Result<(), AttributeError>;

    /// Copy the current byte image into `buf`, returning the bytes written.
    fn read(&self, buf: &mut [u8]) -> Result<usize, AttributeError>;

    /// Overwrite the stored value from `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<(), AttributeError>;

    /// Whether `buf` holds the same value as the cell.
    fn matches(&self, buf: &[u8]) -> bool;

    /// Write only if the value differs. Returns `true` when it changed.
    fn try_write(&mut self, buf: &[u8]) -> Result<bool, AttributeError> {
        self.validate(buf)?;
        if self.matches(buf) {
            return Ok(false);
        }
        self.write(buf)?;
        Ok(true)
    }

    /// Copy of the current byte image.
    fn to_bytes(&self) -> Result<Vec<u8>, AttributeError> {
        let mut out = vec![0; self.size()];
        let len = self.read(&mut out)?;
        out.truncate(len);
        Ok(out)
    }
}

/// Fixed-width value that can live in a [`Primitive`] cell.
pub trait PrimitiveValue: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const SIZE: usize;
    const TYPE: AttributeType;

    /// Encode into `out`, which is exactly `SIZE` bytes.
    fn encode(self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;

    fn is_valid(_bytes: &[u8]) -> bool {
        true
    }
}

macro_rules! primitive_value {
    ($($ty:ty => $attr_type:ident),* $(,)?) => {
        $(
            impl PrimitiveValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const TYPE: AttributeType = AttributeType::$attr_type;

                fn encode(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

primitive_value!(
    u8 => Int8u,
    u16 => Int16u,
    u32 => Int32u,
    u64 => Int64u,
    i8 => Int8s,
    i16 => Int16s,
    i32 => Int32s,
    i64 => Int64s,
);

impl PrimitiveValue for bool {
    const SIZE: usize = 1;
    const TYPE: AttributeType = AttributeType::Boolean;

    fn encode(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn is_valid(bytes: &[u8]) -> bool {
        bytes[0] <= 1
    }
}

/// Fixed-width attribute cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive<T: PrimitiveValue> {
    value: T,
}

impl<T: PrimitiveValue> Primitive<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> T {
        self.value
    }

    /// Store `value`, returning `true` if it differs from the previous one.
    pub fn set(&mut self, value: T) -> bool {
        let changed = self.value != value;
        self.value = value;
        changed
    }

    /// Byte image of `value` as this cell would store it.
    pub fn encode(value: T) -> Vec<u8> {
        let mut out = vec![0; T::SIZE];
        value.encode(&mut out);
        out
    }
}

impl<T: PrimitiveValue> AttributeCell for Primitive<T> {
    fn attr_type(&self) -> AttributeType {
        T::TYPE
    }

    fn max_size(&self) -> usize {
        T::SIZE
    }

    fn size(&self) -> usize {
        T::SIZE
    }

    fn validate(&self, buf: &[u8]) -> Result<(), AttributeError> {
        if buf.len() != T::SIZE {
            return Err(AttributeError::SizeMismatch {
                expected: T::SIZE,
                actual: buf.len(),
            });
        }
        if !T::is_valid(buf) {
            return Err(AttributeError::ConstraintError(format!(
                "invalid {} image {:02X?}",
                T::TYPE,
                buf
            )));
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, AttributeError> {
        if buf.len() != T::SIZE {
            return Err(AttributeError::SizeMismatch {
                expected: T::SIZE,
                actual: buf.len(),
            });
        }
        self.value.encode(buf);
        Ok(T::SIZE)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), AttributeError> {
        self.validate(buf)?;
        self.value = T::decode(buf);
        Ok(())
    }

    fn matches(&self, buf: &[u8]) -> bool {
        buf.len() == T::SIZE && T::is_valid(buf) && T::decode(buf) == self.value
    }
}

/// Length-prefixed string cell holding at most `N` content bytes.
///
/// `N` must stay below 255; a length byte of 0xFF is reserved for null.
#[derive(Clone, PartialEq, Eq)]
pub struct OctetString<const N: usize> {
    kind: AttributeType,
    bytes: heapless::Vec<u8, N>,
}

impl<const N: usize> OctetString<N> {
    const CAPACITY_CHECK: () = assert!(N < 0xFF, "length-prefixed strings hold at most 254 bytes");

    /// Build a UTF-8 character string cell.
    pub fn char_string(value: &str) -> Result<Self, AttributeError> {
        Self::with_kind(AttributeType::CharString, value.as_bytes())
    }

    /// Build a raw octet string cell.
    pub fn octets(value: &[u8]) -> Result<Self, AttributeError> {
        Self::with_kind(AttributeType::OctetString, value)
    }

    fn with_kind(kind: AttributeType, value: &[u8]) -> Result<Self, AttributeError> {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        let bytes = heapless::Vec::from_slice(value).map_err(|_| Self::too_long(value.len()))?;
        Ok(Self { kind, bytes })
    }

    pub const fn capacity() -> usize {
        N
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content as text, if this is a character string.
    pub fn as_str(&self) -> Option<&str> {
        match self.kind {
            AttributeType::CharString => std::str::from_utf8(&self.bytes).ok(),
            _ => None,
        }
    }

    /// Replace the content, returning `true` if it changed.
    pub fn set(&mut self, value: &[u8]) -> Result<bool, AttributeError> {
        if value.len() > N {
            return Err(Self::too_long(value.len()));
        }
        if self.kind == AttributeType::CharString && std::str::from_utf8(value).is_err() {
            return Err(AttributeError::ConstraintError(
                "character string is not valid UTF-8".into(),
            ));
        }
        if self.bytes.as_slice() == value {
            return Ok(false);
        }
        self.bytes.clear();
        // Length checked above.
        let _ = self.bytes.extend_from_slice(value);
        Ok(true)
    }

    /// Build the length-prefixed image of `value`.
    pub fn encode(value: &[u8]) -> Result<Vec<u8>, AttributeError> {
        if value.len() > N {
            return Err(Self::too_long(value.len()));
        }
        let mut out = Vec::with_capacity(value.len() + 1);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        Ok(out)
    }

    /// Split a length-prefixed image into its content.
    fn content(buf: &[u8]) -> Result<&[u8], AttributeError> {
        let Some((&len, rest)) = buf.split_first() else {
            return Err(AttributeError::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        };
        let len = len as usize;
        if len > N {
            return Err(Self::too_long(len));
        }
        if rest.len() < len {
            return Err(AttributeError::SizeMismatch {
                expected: len + 1,
                actual: buf.len(),
            });
        }
        Ok(&rest[..len])
    }

    fn too_long(len: usize) -> AttributeError {
        AttributeError::ConstraintError(format!("{} bytes exceeds capacity of {}", len, N))
    }
}

impl<const N: usize> fmt::Debug for OctetString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => write!(f, "{:?}", text),
            None => write!(f, "{:02X?}", self.bytes.as_slice()),
        }
    }
}

impl<const N: usize> AttributeCell for OctetString<N> {
    fn attr_type(&self) -> AttributeType {
        self.kind
    }

    fn max_size(&self) -> usize {
        N + 1
    }

    fn size(&self) -> usize {
        self.bytes.len() + 1
    }

    fn validate(&self, buf: &[u8]) -> Result<(), AttributeError> {
        let content = Self::content(buf)?;
        if self.kind == AttributeType::CharString && std::str::from_utf8(content).is_err() {
            return Err(AttributeError::ConstraintError(
                "character string is not valid UTF-8".into(),
            ));
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, AttributeError> {
        let needed = self.size();
        if buf.len() < needed {
            return Err(AttributeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[0] = self.bytes.len() as u8;
        buf[1..needed].copy_from_slice(&self.bytes);
        Ok(needed)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), AttributeError> {
        self.validate(buf)?;
        let content = Self::content(buf)?;
        self.set(content).map(|_| ())
    }

    fn matches(&self, buf: &[u8]) -> bool {
        Self::content(buf).is_ok_and(|content| content == self.bytes.as_slice())
    }
}

/// One attribute of a cluster: id, access mask and storage.
#[derive(Debug)]
pub struct Attribute {
    id: AttrId,
    access: Access,
    cell: Box<dyn AttributeCell>,
}

impl Attribute {
    pub fn new(id: AttrId, access: Access, cell: impl AttributeCell + 'static) -> Self {
        Self {
            id,
            access,
            cell: Box::new(cell),
        }
    }

    pub fn id(&self) -> AttrId {
        self.id
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn cell(&self) -> &dyn AttributeCell {
        self.cell.as_ref()
    }

    pub fn cell_mut(&mut self) -> &mut dyn AttributeCell {
        self.cell.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_write_then_read_full_size() {
        let mut cell = Primitive::new(0u32);
        let image = 0xDEAD_BEEFu32.to_ne_bytes();
        cell.write(&image).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(cell.read(&mut out).unwrap(), 4);
        assert_eq!(out, image);
        assert_eq!(cell.get(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_primitive_read_requires_exact_size() {
        let cell = Primitive::new(-5i16);
        let mut short = [0u8; 1];
        assert_eq!(
            cell.read(&mut short),
            Err(AttributeError::SizeMismatch {
                expected: 2,
                actual: 1
            })
        );
        let mut long = [0u8; 4];
        assert!(cell.read(&mut long).is_err());
    }

    #[test]
    fn test_primitive_write_rejects_wrong_size() {
        let mut cell = Primitive::new(7u16);
        assert!(cell.write(&[1, 2, 3]).is_err());
        assert_eq!(cell.get(), 7);
    }

    #[test]
    fn test_try_write_reports_change_only_once() {
        let mut cell = Primitive::new(false);
        assert_eq!(cell.try_write(&[1]), Ok(true));
        assert_eq!(cell.try_write(&[1]), Ok(false));
        assert_eq!(cell.try_write(&[0]), Ok(true));
        assert!(!cell.get());
    }

    #[test]
    fn test_bool_rejects_non_canonical_image() {
        let mut cell = Primitive::new(false);
        assert!(matches!(
            cell.try_write(&[2]),
            Err(AttributeError::ConstraintError(_))
        ));
        assert!(!cell.get());
    }

    #[test]
    fn test_typed_set_detects_change() {
        let mut cell = Primitive::new(10u8);
        assert!(!cell.set(10));
        assert!(cell.set(11));
        assert_eq!(Primitive::<u8>::encode(11), vec![11]);
    }

    #[test]
    fn test_string_write_then_read() {
        let mut cell = OctetString::<16>::char_string("").unwrap();
        let image = OctetString::<16>::encode(b"Kitchen").unwrap();
        cell.write(&image).unwrap();
        assert_eq!(cell.as_str(), Some("Kitchen"));

        let mut out = [0u8; 17];
        let len = cell.read(&mut out).unwrap();
        assert_eq!(len, 8);
        assert_eq!(&out[..len], image.as_slice());
    }

    #[test]
    fn test_string_read_buffer_too_small() {
        let cell = OctetString::<16>::char_string("Office").unwrap();
        let mut out = [0u8; 4];
        assert_eq!(
            cell.read(&mut out),
            Err(AttributeError::BufferTooSmall {
                needed: 7,
                available: 4
            })
        );
    }

    #[test]
    fn test_string_capacity_is_enforced() {
        assert!(OctetString::<4>::char_string("too long").is_err());

        let mut cell = OctetString::<4>::octets(&[1, 2]).unwrap();
        // Prefix claims more than the capacity.
        assert!(cell.write(&[5, 1, 2, 3, 4, 5]).is_err());
        // Prefix claims more than the buffer holds.
        assert!(cell.write(&[3, 1]).is_err());
        assert_eq!(cell.as_bytes(), &[1, 2]);
    }

    #[test]
    fn test_string_try_write_suppresses_same_value() {
        let mut cell = OctetString::<8>::char_string("Den").unwrap();
        let same = OctetString::<8>::encode(b"Den").unwrap();
        assert_eq!(cell.try_write(&same), Ok(false));
        let other = OctetString::<8>::encode(b"Hall").unwrap();
        assert_eq!(cell.try_write(&other), Ok(true));
    }

    #[test]
    fn test_char_string_rejects_invalid_utf8() {
        let mut cell = OctetString::<8>::char_string("").unwrap();
        assert!(cell.write(&[2, 0xFF, 0xFE]).is_err());
        let mut raw = OctetString::<8>::octets(&[]).unwrap();
        assert!(raw.write(&[2, 0xFF, 0xFE]).is_ok());
    }

    #[test]
    fn test_attribute_wraps_cell() {
        let attr = Attribute::new(0x0000, Access::RV, Primitive::new(3u8));
        assert_eq!(attr.id(), 0);
        assert!(!attr.access().is_writable());
        assert_eq!(attr.cell().to_bytes(), Ok(vec![3]));
    }

    fn assert_round_trip(cell: &mut dyn AttributeCell, image: &[u8]) {
        cell.write(image).unwrap();
        let mut out = vec![0u8; cell.max_size()];
        let len = cell.read(&mut out).unwrap();
        assert_eq!(&out[..len], image, "{} round trip", cell.attr_type());
        assert_eq!(cell.to_bytes(), Ok(image.to_vec()));
        assert!(cell.matches(image));
    }

    #[test]
    fn test_write_then_read_every_cell_type() {
        let cases: Vec<(Box<dyn AttributeCell>, Vec<u8>)> = vec![
            (Box::new(Primitive::new(false)), Primitive::encode(true)),
            (Box::new(Primitive::new(0u8)), Primitive::encode(0xA5u8)),
            (Box::new(Primitive::new(0u16)), Primitive::encode(0xBEEFu16)),
            (Box::new(Primitive::new(0u32)), Primitive::encode(u32::MAX)),
            (Box::new(Primitive::new(0u64)), Primitive::encode(0x0123_4567_89AB_CDEFu64)),
            (Box::new(Primitive::new(0i8)), Primitive::encode(i8::MIN)),
            (Box::new(Primitive::new(0i16)), Primitive::encode(-2150i16)),
            (Box::new(Primitive::new(0i32)), Primitive::encode(-1i32)),
            (Box::new(Primitive::new(0i64)), Primitive::encode(i64::MIN)),
            (
                Box::new(OctetString::<8>::char_string("").unwrap()),
                OctetString::<8>::encode(b"Den").unwrap(),
            ),
            (
                Box::new(OctetString::<8>::octets(&[]).unwrap()),
                OctetString::<8>::encode(&[]).unwrap(),
            ),
        ];
        for (mut cell, image) in cases {
            assert!(image.len() <= cell.max_size());
            assert_round_trip(&mut *cell, &image);
        }
    }

    #[test]
    fn test_string_filled_to_capacity() {
        let full = [0x5Au8; 16];
        let image = OctetString::<16>::encode(&full).unwrap();
        assert_eq!(image.len(), 17);

        let mut cell = OctetString::<16>::octets(&[]).unwrap();
        assert_round_trip(&mut cell, &image);
        assert_eq!(cell.as_bytes(), &full);
        assert_eq!(cell.size(), cell.max_size());

        let mut text = OctetString::<16>::char_string("").unwrap();
        assert_round_trip(&mut text, &OctetString::<16>::encode(b"ABCDEFGHIJKLMNOP").unwrap());
        assert_eq!(text.as_str(), Some("ABCDEFGHIJKLMNOP"));

        // One past capacity is refused and leaves the cell alone.
        assert!(OctetString::<16>::encode(&[0u8; 17]).is_err());
        let mut over = vec![17u8];
        over.extend_from_slice(&[1u8; 17]);
        assert!(cell.write(&over).is_err());
        assert_eq!(cell.as_bytes(), &full);
    }
}
