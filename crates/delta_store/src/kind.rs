//! Numeric element kinds and tagged values.
//!
//! Every column stores elements of exactly one [`NumericKind`]. The kind fixes
//! the element width in bytes; neither the kind nor the width is ever written
//! to a packet, so both ends must agree on it through their component
//! definitions.

use serde::{Deserialize, Serialize};

/// The closed set of element types a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl NumericKind {
    /// Width of one element in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Decode one big-endian element. `bytes` must hold at least
    /// [`width`](Self::width) bytes.
    #[must_use]
    pub fn decode_be(self, bytes: &[u8]) -> Value {
        match self {
            Self::U8 => Value::U8(bytes[0]),
            Self::I8 => Value::I8(i8::from_be_bytes([bytes[0]])),
            Self::U16 => Value::U16(u16::from_be_bytes(take(bytes))),
            Self::I16 => Value::I16(i16::from_be_bytes(take(bytes))),
            Self::U32 => Value::U32(u32::from_be_bytes(take(bytes))),
            Self::I32 => Value::I32(i32::from_be_bytes(take(bytes))),
            Self::F32 => Value::F32(f32::from_be_bytes(take(bytes))),
            Self::F64 => Value::F64(f64::from_be_bytes(take(bytes))),
        }
    }

    /// Decode one little-endian element, the in-memory column layout.
    #[must_use]
    pub fn decode_le(self, bytes: &[u8]) -> Value {
        match self {
            Self::U8 => Value::U8(bytes[0]),
            Self::I8 => Value::I8(i8::from_le_bytes([bytes[0]])),
            Self::U16 => Value::U16(u16::from_le_bytes(take(bytes))),
            Self::I16 => Value::I16(i16::from_le_bytes(take(bytes))),
            Self::U32 => Value::U32(u32::from_le_bytes(take(bytes))),
            Self::I32 => Value::I32(i32::from_le_bytes(take(bytes))),
            Self::F32 => Value::F32(f32::from_le_bytes(take(bytes))),
            Self::F64 => Value::F64(f64::from_le_bytes(take(bytes))),
        }
    }
}

fn take<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// A single numeric element tagged with its kind.
///
/// Equality follows the numeric types: `NaN` never equals itself, so a `NaN`
/// value is always considered changed by the diffing serializer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
}

impl Value {
    /// The kind of this value.
    #[must_use]
    pub const fn kind(self) -> NumericKind {
        match self {
            Self::U8(_) => NumericKind::U8,
            Self::I8(_) => NumericKind::I8,
            Self::U16(_) => NumericKind::U16,
            Self::I16(_) => NumericKind::I16,
            Self::U32(_) => NumericKind::U32,
            Self::I32(_) => NumericKind::I32,
            Self::F32(_) => NumericKind::F32,
            Self::F64(_) => NumericKind::F64,
        }
    }

    /// Write this value big-endian into the front of `out`.
    pub fn encode_be(self, out: &mut [u8]) {
        match self {
            Self::U8(v) => out[0] = v,
            Self::I8(v) => out[..1].copy_from_slice(&v.to_be_bytes()),
            Self::U16(v) => out[..2].copy_from_slice(&v.to_be_bytes()),
            Self::I16(v) => out[..2].copy_from_slice(&v.to_be_bytes()),
            Self::U32(v) => out[..4].copy_from_slice(&v.to_be_bytes()),
            Self::I32(v) => out[..4].copy_from_slice(&v.to_be_bytes()),
            Self::F32(v) => out[..4].copy_from_slice(&v.to_be_bytes()),
            Self::F64(v) => out[..8].copy_from_slice(&v.to_be_bytes()),
        }
    }

    /// Write this value little-endian into the front of `out`.
    pub fn encode_le(self, out: &mut [u8]) {
        match self {
            Self::U8(v) => out[0] = v,
            Self::I8(v) => out[..1].copy_from_slice(&v.to_le_bytes()),
            Self::U16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            Self::I16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
}

/// Width of the index and count fields that accompany array elements on the
/// wire. It is the smallest unsigned width that can address every slot of the
/// array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// Picks the index width for an array of `len` elements.
    #[must_use]
    pub const fn for_len(len: u32) -> Self {
        if len <= u8::MAX as u32 {
            Self::U8
        } else if len <= u16::MAX as u32 {
            Self::U16
        } else {
            Self::U32
        }
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}
