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

//! The write buffer that messages are built into.
//!
//! A `BuilderArena` is a single growable segment with an append-only allocation
//! cursor. Every allocation is a whole number of words and starts zeroed, so a fresh
//! object reads as all-default. Objects are addressed by byte offset, never by
//! reference, and stay valid when the buffer grows.

use crate::private::layout::{
    wire_helpers, ElementSize, ListReader, PointerReader, StructReader, StructSize, WirePointer,
};
use crate::private::primitive::{read_primitive, write_primitive, Primitive};
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::Result;

pub struct BuilderArena {
    segment: Vec<u8>,
    // Start of unallocated space. Word-aligned unless `allocate` was given an odd size.
    allocated: usize,
}

impl BuilderArena {
    /// An arena with room for `capacity` bytes before it needs to grow.
    pub fn new(capacity: usize) -> Self {
        Self {
            segment: Vec::with_capacity(capacity),
            allocated: 0,
        }
    }

    /// Number of bytes allocated so far.
    pub fn len(&self) -> usize {
        self.allocated
    }

    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    pub fn capacity(&self) -> usize {
        self.segment.capacity()
    }

    /// Reserves exactly `amount` bytes at the end of the buffer and returns the offset of
    /// the first one. Alignment is up to the caller. When the buffer is full it grows to
    /// twice its size, or to exactly what is needed if that is more.
    pub fn allocate(&mut self, amount: ByteCount) -> usize {
        let start = self.allocated;
        let end = start + amount;
        if end > self.segment.capacity() {
            let new_capacity = usize::max(self.segment.capacity() * 2, end);
            self.segment.reserve_exact(new_capacity - self.segment.len());
        }
        self.segment.resize(end, 0);
        self.allocated = end;
        start
    }

    /// Reserves `amount` words starting on a word boundary, zero-padding after any
    /// unaligned allocation that came before.
    pub fn allocate_words(&mut self, amount: WordCount) -> usize {
        let padding = (BYTES_PER_WORD - self.allocated % BYTES_PER_WORD) % BYTES_PER_WORD;
        self.allocate(padding + amount * BYTES_PER_WORD) + padding
    }

    /// Offset from the end of the pointer at `pointer_position` to `target`, in words.
    fn pointer_offset(pointer_position: usize, target: usize) -> i32 {
        let delta = (target as i64 - pointer_position as i64) / BYTES_PER_WORD as i64 - 1;
        delta as i32
    }

    /// Allocates a struct body and writes a pointer to it at `pointer_position`. Returns
    /// the offset of the body. A zero-sized struct allocates nothing.
    pub fn alloc_struct(&mut self, pointer_position: usize, size: StructSize) -> usize {
        if size.total() == 0 {
            self.set_pointer(pointer_position, WirePointer::empty_struct_pointer());
            return self.allocated;
        }
        let body = self.allocate_words(size.total() as WordCount);
        let offset = Self::pointer_offset(pointer_position, body);
        self.set_pointer(pointer_position, WirePointer::struct_pointer(offset, size));
        body
    }

    /// Allocates a list of primitives or pointers and writes a pointer to it at
    /// `pointer_position`. Returns the offset of the first element.
    pub fn alloc_list(
        &mut self,
        pointer_position: usize,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> usize {
        assert!(
            element_size != ElementSize::InlineComposite,
            "use alloc_struct_list for lists of structs"
        );
        let step = crate::private::layout::data_bits_per_element(element_size)
            + crate::private::layout::pointers_per_element(element_size) * BITS_PER_POINTER as u32;
        let words = round_bits_up_to_words(u64::from(element_count) * u64::from(step));
        let body = self.allocate_words(words as WordCount);
        let offset = Self::pointer_offset(pointer_position, body);
        self.set_pointer(
            pointer_position,
            WirePointer::list_pointer(offset, element_size, element_count),
        );
        body
    }

    /// Allocates an inline composite list, writing the list pointer at
    /// `pointer_position` and the tag word. Returns the offset of the first element.
    pub fn alloc_struct_list(
        &mut self,
        pointer_position: usize,
        size: StructSize,
        element_count: ElementCount32,
    ) -> usize {
        let word_count = size.total() * element_count;
        let tag = self.allocate_words(POINTER_SIZE_IN_WORDS + word_count as WordCount);
        let offset = Self::pointer_offset(pointer_position, tag);
        self.set_pointer(
            pointer_position,
            WirePointer::inline_composite_list_pointer(offset, word_count),
        );
        self.set_pointer(tag, WirePointer::inline_composite_tag(element_count, size));
        tag + BYTES_PER_WORD
    }

    /// Allocates a `Byte` list holding `value` followed by a NUL terminator.
    pub fn alloc_text(&mut self, pointer_position: usize, value: &[u8]) -> usize {
        let body = self.alloc_list(pointer_position, ElementSize::Byte, value.len() as u32 + 1);
        self.write_bytes(body, value);
        body
    }

    /// Allocates a `Byte` list holding `value`.
    pub fn alloc_data(&mut self, pointer_position: usize, value: &[u8]) -> usize {
        let body = self.alloc_list(pointer_position, ElementSize::Byte, value.len() as u32);
        self.write_bytes(body, value);
        body
    }

    #[inline]
    pub fn set_pointer(&mut self, position: usize, pointer: WirePointer) {
        write_primitive(&mut self.segment[..self.allocated], position, pointer.raw());
    }

    #[inline]
    pub fn get_pointer(&self, position: usize) -> WirePointer {
        WirePointer::from_raw(self.get(position))
    }

    /// Copies `bytes` into already allocated space starting at `position`.
    pub fn write_bytes(&mut self, position: usize, bytes: &[u8]) {
        self.segment[position..position + bytes.len()].copy_from_slice(bytes);
    }

    #[inline]
    pub fn set<T: Primitive>(&mut self, position: usize, value: T) {
        write_primitive(&mut self.segment[..self.allocated], position, value)
    }

    /// Reads a value from allocated space. Positions past the allocation read as zero.
    #[inline]
    pub fn get<T: Primitive>(&self, position: usize) -> T {
        read_primitive(self.as_bytes(), position).unwrap_or_default()
    }

    #[inline]
    pub fn set_bool(&mut self, byte_position: usize, bit: usize, value: bool) {
        let mask = 1u8 << bit;
        let byte: u8 = self.get(byte_position);
        self.set(
            byte_position,
            if value { byte | mask } else { byte & !mask },
        );
    }

    #[inline]
    pub fn get_bool(&self, byte_position: usize, bit: usize) -> bool {
        (self.get::<u8>(byte_position) >> bit) & 1 != 0
    }

    /// Deep-copies the object `value` points to and writes a pointer to the copy at
    /// `pointer_position`.
    pub fn copy_from(
        &mut self,
        pointer_position: usize,
        value: PointerReader,
        traversal_limit_in_words: Option<usize>,
    ) -> Result<()> {
        let limiter = ReadLimiter::new(traversal_limit_in_words);
        wire_helpers::copy_pointer(
            self,
            pointer_position,
            value.segment(),
            value.position().map_or(0, |pos| pos as i64),
            value.wire_pointer(),
            &limiter,
            value.nesting_limit(),
        )
    }

    /// Deep-copies the struct `value`, which need not have a pointer leading to it, and
    /// writes a pointer to the copy at `pointer_position`.
    pub fn copy_struct_from(
        &mut self,
        pointer_position: usize,
        value: &StructReader,
        read_limiter: &ReadLimiter,
        nesting_limit: i32,
    ) -> Result<()> {
        let size = value.struct_size();
        if size.total() == 0 {
            self.set_pointer(pointer_position, WirePointer::empty_struct_pointer());
            return Ok(());
        }
        // Pretend the pointer sits in the word just before the body.
        wire_helpers::copy_pointer(
            self,
            pointer_position,
            value.segment(),
            value.offset() as i64 - BYTES_PER_WORD as i64,
            WirePointer::struct_pointer(0, size),
            read_limiter,
            nesting_limit,
        )
    }

    /// Deep-copies the list `value` and writes a pointer to the copy at `pointer_position`.
    pub fn copy_list_from(
        &mut self,
        pointer_position: usize,
        value: &ListReader,
        read_limiter: &ReadLimiter,
        nesting_limit: i32,
    ) -> Result<()> {
        if value.segment().is_empty() {
            self.set_pointer(pointer_position, WirePointer::NULL);
            return Ok(());
        }
        let (position, pointer) = value.synthesize_pointer();
        wire_helpers::copy_pointer(
            self,
            pointer_position,
            value.segment(),
            position,
            pointer,
            read_limiter,
            nesting_limit,
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.segment[..self.allocated]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.segment.truncate(self.allocated);
        self.segment
    }
}

impl Default for BuilderArena {
    fn default() -> Self {
        Self::new(0)
    }
}
