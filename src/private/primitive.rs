// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! Little-endian access to fixed-width values stored at byte offsets.

pub trait Primitive: Copy + Default + PartialEq + core::fmt::Debug {
    /// Width of the value on the wire, in bytes.
    const BYTES: usize;

    /// Reads the value from exactly `Self::BYTES` little-endian bytes.
    fn get(raw: &[u8]) -> Self;

    /// Writes the value into exactly `Self::BYTES` bytes, little-endian.
    fn set(raw: &mut [u8], value: Self);
}

macro_rules! primitive_impl(
    ($typ:ty, $n:expr) => (
        impl Primitive for $typ {
            const BYTES: usize = $n;

            #[inline]
            fn get(raw: &[u8]) -> Self {
                let mut bytes = [0u8; $n];
                bytes.copy_from_slice(&raw[..$n]);
                <$typ>::from_le_bytes(bytes)
            }

            #[inline]
            fn set(raw: &mut [u8], value: Self) {
                raw[..$n].copy_from_slice(&value.to_le_bytes());
            }
        }
        );
    );

primitive_impl!(u8, 1);
primitive_impl!(i8, 1);
primitive_impl!(u16, 2);
primitive_impl!(i16, 2);
primitive_impl!(u32, 4);
primitive_impl!(i32, 4);
primitive_impl!(u64, 8);
primitive_impl!(i64, 8);
primitive_impl!(f32, 4);
primitive_impl!(f64, 8);

/// Reads a `T` at `byte_offset`. Returns `None` if the value would extend past the end
/// of `segment`.
#[inline]
pub fn read_primitive<T: Primitive>(segment: &[u8], byte_offset: usize) -> Option<T> {
    let end = byte_offset.checked_add(T::BYTES)?;
    segment.get(byte_offset..end).map(T::get)
}

/// Writes a `T` at `byte_offset`. The range must already be in bounds.
#[inline]
pub fn write_primitive<T: Primitive>(segment: &mut [u8], byte_offset: usize, value: T) {
    let len = segment.len();
    match segment.get_mut(byte_offset..byte_offset + T::BYTES) {
        Some(raw) => T::set(raw, value),
        None => panic!(
            "write of {} bytes at offset {} is outside of the {} allocated bytes",
            T::BYTES,
            byte_offset,
            len
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{read_primitive, write_primitive};

    #[test]
    fn little_endian() {
        let mut bytes = [0u8; 8];
        write_primitive::<i64>(&mut bytes, 0, 0x1234ABCD);
        assert_eq!(bytes, [0xCD, 0xAB, 0x34, 0x12, 0, 0, 0, 0]);
        assert_eq!(read_primitive::<u16>(&bytes, 2), Some(0x1234));
        assert_eq!(read_primitive::<u32>(&bytes, 6), None);
        write_primitive::<f32>(&mut bytes, 4, 1.5);
        assert_eq!(read_primitive::<f32>(&bytes, 4), Some(1.5));
    }

    #[test]
    #[should_panic(expected = "outside of the 8 allocated bytes")]
    fn write_past_end() {
        let mut bytes = [0u8; 8];
        write_primitive::<u32>(&mut bytes, 6, 1);
    }
}
