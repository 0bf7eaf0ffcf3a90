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

//! Untyped root container for a Cap'n Proto value.
//!
//! A message is a single segment whose first word is the root pointer.

use crate::any_pointer;
use crate::private::arena::BuilderArena;
use crate::private::layout::{self, PointerReader, StructBuilder, StructReader, StructSize};
use crate::private::ReadLimiter;
use crate::private::units::BYTES_PER_WORD;
use crate::traits::FromPointerReader;
use crate::Result;

/// Options controlling how data is read.
#[derive(Clone, Copy, Debug)]
pub struct ReaderOptions {
    /// Limits how many total words of data are allowed to be traversed by a copy. Once the
    /// traversal limit is reached, an error will be reported.
    ///
    /// This limit exists for security reasons. It is possible for an attacker to construct a message
    /// in which multiple pointers point at the same location. This is technically invalid, but hard
    /// to detect. Using such a message, an attacker could cause a message which is small on the wire
    /// to appear much larger when actually traversed, possibly exhausting server resources leading to
    /// denial-of-service.
    ///
    /// `None` disables the limit.
    pub traversal_limit_in_words: Option<usize>,

    /// Limits how deeply nested a message structure can be, e.g. structs containing other structs or
    /// lists of structs.
    ///
    /// Like the traversal limit, this limit exists for security reasons. Since it is common to use
    /// recursive code to traverse recursive data structures, an attacker could easily cause a stack
    /// overflow by sending a very-deeply-nested (or even cyclic) message, without the message even
    /// being very large. The default limit of 64 is probably low enough to prevent any chance of
    /// stack overflow, yet high enough that it is never a problem in practice.
    pub nesting_limit: i32,
}

pub const DEFAULT_READER_OPTIONS: ReaderOptions = ReaderOptions {
    traversal_limit_in_words: Some(layout::DEFAULT_TRAVERSAL_LIMIT_IN_WORDS),
    nesting_limit: layout::DEFAULT_NESTING_LIMIT,
};

impl Default for ReaderOptions {
    fn default() -> Self {
        DEFAULT_READER_OPTIONS
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        DEFAULT_READER_OPTIONS
    }

    pub fn nesting_limit(&mut self, value: i32) -> &mut Self {
        self.nesting_limit = value;
        self
    }

    pub fn traversal_limit_in_words(&mut self, value: Option<usize>) -> &mut Self {
        self.traversal_limit_in_words = value;
        self
    }
}

/// Options controlling how messages are built.
#[derive(Clone, Copy, Debug)]
pub struct BuilderOptions {
    /// Initial capacity of the arena, in words. The arena doubles whenever it runs out.
    pub first_segment_words: u32,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            first_segment_words: SUGGESTED_FIRST_SEGMENT_WORDS,
        }
    }
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_segment_words(&mut self, value: u32) -> &mut Self {
        self.first_segment_words = value;
        self
    }
}

/// A container used to read a message.
pub struct Reader<S>
where
    S: AsRef<[u8]>,
{
    segment: S,
    options: ReaderOptions,
}

impl<S> Reader<S>
where
    S: AsRef<[u8]>,
{
    pub fn new(segment: S, options: ReaderOptions) -> Self {
        Self { segment, options }
    }

    fn get_root_internal(&self) -> Result<PointerReader<'_>> {
        PointerReader::get_root(self.segment.as_ref(), 0, self.options.nesting_limit)
    }

    /// Gets the root of the message, interpreting it as the given type.
    pub fn get_root<'a, T: FromPointerReader<'a>>(&'a self) -> Result<T> {
        FromPointerReader::get_from_pointer(&self.get_root_internal()?)
    }

    pub fn get_root_as_any(&self) -> Result<any_pointer::Reader<'_>> {
        Ok(any_pointer::Reader::new(self.get_root_internal()?))
    }

    pub fn get_root_struct(&self) -> Result<StructReader<'_>> {
        self.get_root_internal()?.get_struct()
    }

    /// Size of everything reachable from the root, in words.
    pub fn size_in_words(&self) -> Result<usize> {
        let read_limiter = ReadLimiter::new(self.options.traversal_limit_in_words);
        Ok(self
            .get_root_internal()?
            .total_size_with_limit(&read_limiter)?
            .word_count as usize)
    }

    /// Copies everything reachable from the root into a fresh, compacted message.
    pub fn copy_root(&self) -> Result<Vec<u8>> {
        copy_pointer_with_options(self.segment.as_ref(), 0, self.options)
    }

    pub fn into_segment(self) -> S {
        self.segment
    }
}

/// A container used to build a message.
pub struct Builder {
    arena: BuilderArena,
}

impl Builder {
    pub fn new(options: BuilderOptions) -> Self {
        let mut arena =
            BuilderArena::new(options.first_segment_words.max(1) as usize * BYTES_PER_WORD);
        arena.allocate_words(1);
        Self { arena }
    }

    pub fn new_default() -> Self {
        Self::new(BuilderOptions::default())
    }

    /// Allocates a new root struct. Anything the root pointed to before stays in the
    /// message but is no longer reachable.
    pub fn init_root(&mut self, size: StructSize) -> StructBuilder<'_> {
        let body = self.arena.alloc_struct(0, size);
        StructBuilder::new(&mut self.arena, body, size)
    }

    /// Sets the root to a deep copy of `value`.
    pub fn set_root(&mut self, value: PointerReader) -> Result<()> {
        self.arena.copy_from(0, value, None)
    }

    /// Sets the root to a deep copy of the struct `value`.
    pub fn set_root_struct(&mut self, value: &StructReader) -> Result<()> {
        let limiter = ReadLimiter::new(None);
        self.arena
            .copy_struct_from(0, value, &limiter, layout::DEFAULT_NESTING_LIMIT)
    }

    pub fn get_root_as_reader(&self) -> Result<StructReader<'_>> {
        PointerReader::get_root(self.arena.as_bytes(), 0, layout::DEFAULT_NESTING_LIMIT)?
            .get_struct()
    }

    pub fn get_root_as_any(&self) -> Result<any_pointer::Reader<'_>> {
        Ok(any_pointer::Reader::new(PointerReader::get_root(
            self.arena.as_bytes(),
            0,
            layout::DEFAULT_NESTING_LIMIT,
        )?))
    }

    pub fn size_in_words(&self) -> usize {
        self.arena.len() / BYTES_PER_WORD
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.arena.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.arena.into_bytes()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new_default()
    }
}

/// Deep-copies the object pointed to by the pointer at byte `pointer_offset` of `src`.
///
/// The result is a new message: a root pointer at byte 0 followed by the copied objects,
/// depth-first and without gaps.
pub fn copy_message(src: &[u8], pointer_offset: usize) -> Result<Vec<u8>> {
    copy_pointer_with_options(src, pointer_offset, ReaderOptions::new())
}

pub fn copy_pointer_with_options(
    src: &[u8],
    pointer_offset: usize,
    options: ReaderOptions,
) -> Result<Vec<u8>> {
    let reader = PointerReader::get_root(src, pointer_offset, options.nesting_limit)?;
    let mut arena = BuilderArena::new(src.len() + BYTES_PER_WORD);
    let root = arena.allocate_words(1);
    arena.copy_from(root, reader, options.traversal_limit_in_words)?;
    Ok(arena.into_bytes())
}

/// Deep-copies the struct whose body starts at byte `body_offset` of `src`.
pub fn copy_struct(
    src: &[u8],
    body_offset: usize,
    data_size: u16,
    ptrs_size: u16,
) -> Result<Vec<u8>> {
    copy_struct_with_options(src, body_offset, data_size, ptrs_size, ReaderOptions::new())
}

pub fn copy_struct_with_options(
    src: &[u8],
    body_offset: usize,
    data_size: u16,
    ptrs_size: u16,
    options: ReaderOptions,
) -> Result<Vec<u8>> {
    let value = StructReader::new(src, body_offset, data_size, ptrs_size)?;
    let limiter = ReadLimiter::new(options.traversal_limit_in_words);
    let mut arena = BuilderArena::new(src.len() + BYTES_PER_WORD);
    let root = arena.allocate_words(1);
    arena.copy_struct_from(root, &value, &limiter, options.nesting_limit)?;
    Ok(arena.into_bytes())
}
