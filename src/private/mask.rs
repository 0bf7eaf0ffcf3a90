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

//! Default values are stored XOR-ed with the field's value, so that a field holding its
//! default encodes as zero. A default is carried as the raw bits of the value, zero-extended
//! to 64 bits; each type uses as many low bits as it is wide.

pub trait Mask: Sized {
    fn mask(self, default_bits: u64) -> Self;
}

macro_rules! int_mask(
    ($t:ty, $unsigned:ty) => (
        impl Mask for $t {
            #[inline]
            fn mask(self, default_bits: u64) -> $t {
                self ^ (default_bits as $unsigned as $t)
            }
        }
    )
);

int_mask!(i8, u8);
int_mask!(i16, u16);
int_mask!(i32, u32);
int_mask!(i64, u64);
int_mask!(u8, u8);
int_mask!(u16, u16);
int_mask!(u32, u32);
int_mask!(u64, u64);

impl Mask for f32 {
    #[inline]
    fn mask(self, default_bits: u64) -> Self {
        Self::from_bits(self.to_bits() ^ default_bits as u32)
    }
}

impl Mask for f64 {
    #[inline]
    fn mask(self, default_bits: u64) -> Self {
        Self::from_bits(self.to_bits() ^ default_bits)
    }
}

impl Mask for bool {
    #[inline]
    fn mask(self, default_bits: u64) -> Self {
        self ^ (default_bits & 1 != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::Mask;

    #[test]
    fn mask_is_an_involution() {
        assert_eq!(42i64.mask(7).mask(7), 42);
        assert_eq!(0i32.mask(123), 123);
        assert_eq!(0i8.mask(0xff), -1);
        assert_eq!(0u16.mask(0x1_0001), 1);
        let m = 2.5f64.to_bits();
        assert_eq!(0.0f64.mask(m), 2.5);
        assert_eq!(2.5f64.mask(m), 0.0);
        assert!(false.mask(1));
    }
}
