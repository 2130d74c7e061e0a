//! Low-level little-endian reading and writing helpers.
//!
//! Every table row, schema field and stream header in the metadata format is stored
//! little-endian. The helpers here are bounds-checked and advance a caller supplied offset,
//! so parsers can walk a buffer sequentially without manual index arithmetic.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Trait implemented by the primitive types the format stores
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Fixed-size reads
//! - [`crate::file::io::read_le_at_dyn`] - Reads a 1, 2 or 4 byte column value
//! - [`crate::file::io::write_le_at`] / [`crate::file::io::write_le_at_dyn`] - The write side
//! - [`crate::file::io::read_compressed_uint`] / [`crate::file::io::write_compressed_uint`] -
//!   The ECMA-335 II.23.2 length prefix used by the blob and user-string heaps
//!
//! # Examples
//!
//! ```rust
//! use mdstore::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0x0102_u16)?;
//! write_le_at(&mut data, &mut offset, 0x0304_0506_u32)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0x0102);
//! assert_eq!(read_le_at::<u32>(&data, &mut offset)?, 0x0304_0506);
//! # Ok::<(), mdstore::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be decoded from and encoded into little-endian bytes.
pub trait CilIO: Sized + Copy {
    /// Byte representation of the type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode a value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode a value into its little-endian representation
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Read a value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a value at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Read a column value of `width` bytes (1, 2 or 4) at `offset` and advance the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, width: u8) -> Result<u32> {
    let res = match width {
        1 => u32::from(read_le_at::<u8>(data, offset)?),
        2 => u32::from(read_le_at::<u16>(data, offset)?),
        _ => read_le_at::<u32>(data, offset)?,
    };

    Ok(res)
}

/// Write a value at the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn write_le<T: CilIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Write a value at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;

    Ok(())
}

/// Write a column value of `width` bytes (1, 2 or 4) at `offset` and advance the offset.
///
/// The value is truncated to the width; callers check that it fits beforehand.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
#[allow(clippy::cast_possible_truncation)]
pub fn write_le_at_dyn(data: &mut [u8], offset: &mut usize, value: u32, width: u8) -> Result<()> {
    match width {
        1 => write_le_at(data, offset, value as u8),
        2 => write_le_at(data, offset, value as u16),
        _ => write_le_at(data, offset, value),
    }
}

/// Decode an ECMA-335 compressed unsigned integer, returning the value and its encoded length.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input, or [`crate::Error::Malformed`]
/// for an invalid leading byte.
pub fn read_compressed_uint(data: &[u8]) -> Result<(u32, usize)> {
    let Some(&first) = data.first() else {
        return Err(OutOfBounds);
    };

    if first & 0x80 == 0 {
        Ok((u32::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        if data.len() < 2 {
            return Err(OutOfBounds);
        }
        Ok(((u32::from(first & 0x3F) << 8) | u32::from(data[1]), 2))
    } else if first & 0xE0 == 0xC0 {
        if data.len() < 4 {
            return Err(OutOfBounds);
        }
        Ok((
            (u32::from(first & 0x1F) << 24)
                | (u32::from(data[1]) << 16)
                | (u32::from(data[2]) << 8)
                | u32::from(data[3]),
            4,
        ))
    } else {
        Err(malformed_error!("Invalid compressed integer lead byte - {:#x}", first))
    }
}

/// Append `value` as an ECMA-335 compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Overflow`] if `value` exceeds `0x1FFF_FFFF`.
#[allow(clippy::cast_possible_truncation)]
pub fn write_compressed_uint(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else if value < 0x2000_0000 {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else {
        return Err(crate::Error::Overflow {
            value: u64::from(value),
            width: 4,
        });
    }

    Ok(())
}

/// Number of bytes `write_compressed_uint` emits for `value`.
#[must_use]
pub fn compressed_uint_size(value: u32) -> usize {
    if value < 0x80 {
        1
    } else if value < 0x4000 {
        2
    } else {
        4
    }
}

/// Round `value` up to the next multiple of four.
#[must_use]
pub fn align4(value: usize) -> usize {
    (value + 3) & !3
}
