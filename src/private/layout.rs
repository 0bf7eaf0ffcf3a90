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

use crate::data;
use crate::private::arena::BuilderArena;
use crate::private::mask::Mask;
use crate::private::primitive::{read_primitive, Primitive};
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::text;
use crate::{Error, ErrorKind, MessageSize, Result};

pub use self::ElementSize::{
    Bit, Byte, EightBytes, FourBytes, InlineComposite, Pointer, TwoBytes, Void,
};

/// Nesting budget of readers that were not created from a `message::Reader`.
pub const DEFAULT_NESTING_LIMIT: i32 = 64;
pub const DEFAULT_TRAVERSAL_LIMIT_IN_WORDS: usize = 8 * 1024 * 1024;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    /// Interprets the low three bits of `val`.
    pub fn from(val: u8) -> Self {
        match val & 7 {
            0 => Self::Void,
            1 => Self::Bit,
            2 => Self::Byte,
            3 => Self::TwoBytes,
            4 => Self::FourBytes,
            5 => Self::EightBytes,
            6 => Self::Pointer,
            _ => Self::InlineComposite,
        }
    }
}

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        Void => 0,
        Bit => 1,
        Byte => 8,
        TwoBytes => 16,
        FourBytes => 32,
        EightBytes => 64,
        Pointer => 0,
        InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> WirePointerCount32 {
    match size {
        Pointer => 1,
        _ => 0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StructSize {
    pub data: WordCount16,
    pub pointers: WirePointerCount16,
}

impl StructSize {
    pub fn new(data: WordCount16, pointers: WirePointerCount16) -> Self {
        Self { data, pointers }
    }

    pub fn total(&self) -> WordCount32 {
        u32::from(self.data) + u32::from(self.pointers) * WORDS_PER_POINTER as WordCount32
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

impl WirePointerKind {
    fn from(val: u8) -> Self {
        match val & 3 {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerType {
    Null,
    Struct,
    List,
    Capability,
}

/// The decoded form of a pointer word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerView {
    Null,
    Struct {
        offset: i32,
        data_size: WordCount16,
        ptrs_size: WirePointerCount16,
    },
    /// For `InlineComposite` lists, `element_count` is the word count of the list body,
    /// not counting the tag word.
    List {
        offset: i32,
        element_size: ElementSize,
        element_count: ElementCount32,
    },
    Far,
    Other,
}

/// One 64-bit pointer word.
///
/// The low 32 bits hold the kind (two bits) and a signed word offset (30 bits) measured
/// from the end of the pointer. The high 32 bits hold the struct sizes or the list
/// element size and count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct WirePointer(u64);

impl WirePointer {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reads the pointer word at byte `position` of `segment`.
    pub fn read(segment: &[u8], position: usize) -> Result<Self> {
        match read_primitive::<u64>(segment, position) {
            Some(raw) => Ok(Self(raw)),
            None => Err(Error::out_of_bounds(
                position as i64,
                position as i64 + BYTES_PER_POINTER as i64,
                segment.len(),
            )),
        }
    }

    #[inline]
    fn offset_and_kind(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    fn upper32bits(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    fn from_parts(offset_and_kind: u32, upper32bits: u32) -> Self {
        Self(u64::from(offset_and_kind) | (u64::from(upper32bits) << 32))
    }

    #[inline]
    pub fn kind(self) -> WirePointerKind {
        WirePointerKind::from(self.offset_and_kind() as u8)
    }

    #[inline]
    pub fn is_positional(self) -> bool {
        (self.offset_and_kind() & 2) == 0 // match Struct and List but not Far and Other.
    }

    #[inline]
    pub fn is_capability(self) -> bool {
        self.offset_and_kind() == WirePointerKind::Other as u32
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Signed offset in words, relative to the word following the pointer.
    #[inline]
    pub fn offset(self) -> i32 {
        (self.offset_and_kind() as i32) >> 2
    }

    /// Byte position of the target, given the byte position of the pointer itself.
    #[inline]
    pub fn target(self, position: i64) -> i64 {
        position + (1 + i64::from(self.offset())) * BYTES_PER_WORD as i64
    }

    #[inline]
    pub fn struct_data_size(self) -> WordCount16 {
        (self.upper32bits() & 0xffff) as WordCount16
    }

    #[inline]
    pub fn struct_ptr_count(self) -> WirePointerCount16 {
        (self.upper32bits() >> 16) as WirePointerCount16
    }

    #[inline]
    pub fn struct_size(self) -> StructSize {
        StructSize::new(self.struct_data_size(), self.struct_ptr_count())
    }

    #[inline]
    pub fn struct_word_size(self) -> WordCount32 {
        self.struct_size().total()
    }

    #[inline]
    pub fn list_element_size(self) -> ElementSize {
        ElementSize::from(self.upper32bits() as u8)
    }

    #[inline]
    pub fn list_element_count(self) -> ElementCount32 {
        self.upper32bits() >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(self) -> WordCount32 {
        self.list_element_count()
    }

    /// Element count stored in the offset field of an inline composite tag word.
    #[inline]
    pub fn inline_composite_list_element_count(self) -> ElementCount32 {
        self.offset_and_kind() >> 2
    }

    #[inline]
    pub fn cap_index(self) -> u32 {
        self.upper32bits()
    }

    pub fn decode(self) -> PointerView {
        if self.is_null() {
            return PointerView::Null;
        }
        match self.kind() {
            WirePointerKind::Struct => PointerView::Struct {
                offset: self.offset(),
                data_size: self.struct_data_size(),
                ptrs_size: self.struct_ptr_count(),
            },
            WirePointerKind::List => PointerView::List {
                offset: self.offset(),
                element_size: self.list_element_size(),
                element_count: self.list_element_count(),
            },
            WirePointerKind::Far => PointerView::Far,
            WirePointerKind::Other => PointerView::Other,
        }
    }

    pub fn struct_pointer(offset: i32, size: StructSize) -> Self {
        Self::from_parts(
            encode_offset(offset) | WirePointerKind::Struct as u32,
            u32::from(size.data) | (u32::from(size.pointers) << 16),
        )
    }

    /// A struct pointer with no body. The offset is -1, as if the struct were allocated
    /// immediately before the pointer, so that the word is not mistaken for null.
    pub fn empty_struct_pointer() -> Self {
        Self::from_parts(0xfffffffc, 0)
    }

    /// For `InlineComposite`, `element_count` is the word count of the list body
    /// excluding the tag.
    pub fn list_pointer(offset: i32, element_size: ElementSize, element_count: ElementCount32) -> Self {
        assert!(
            element_count < (1 << 29),
            "Lists are limited to 2**29 elements"
        );
        Self::from_parts(
            encode_offset(offset) | WirePointerKind::List as u32,
            (element_count << 3) | element_size as u32,
        )
    }

    /// A pointer to an inline composite list whose body, not counting the tag, is
    /// `word_count` words long.
    pub fn inline_composite_list_pointer(offset: i32, word_count: WordCount32) -> Self {
        Self::list_pointer(offset, InlineComposite, word_count)
    }

    /// The tag word that starts the body of an inline composite list.
    pub fn inline_composite_tag(element_count: ElementCount32, size: StructSize) -> Self {
        assert!(
            element_count < (1 << 30),
            "Inline composite lists are limited to 2**30 elements"
        );
        Self::from_parts(
            (element_count << 2) | WirePointerKind::Struct as u32,
            u32::from(size.data) | (u32::from(size.pointers) << 16),
        )
    }
}

#[inline]
fn encode_offset(offset: i32) -> u32 {
    assert!(
        (-(1 << 29)..(1 << 29)).contains(&offset),
        "pointer offset {offset} does not fit in 30 bits"
    );
    (offset << 2) as u32
}

pub(crate) mod wire_helpers {
    use super::*;

    /// Checks that `size_in_bytes` bytes starting at `start` lie inside `segment`, and
    /// returns `start` as an index.
    #[inline]
    pub fn bounds_check(segment: &[u8], start: i64, size_in_bytes: u64) -> Result<usize> {
        let end = start.saturating_add(size_in_bytes.min(i64::MAX as u64) as i64);
        if start < 0 || end > segment.len() as i64 {
            Err(Error::out_of_bounds(start, end, segment.len()))
        } else {
            Ok(start as usize)
        }
    }

    fn check_positional(reff: WirePointer) -> Result<()> {
        match reff.kind() {
            WirePointerKind::Struct | WirePointerKind::List => Ok(()),
            WirePointerKind::Far => Err(Error::from_kind(ErrorKind::MessageContainsFarPointer)),
            WirePointerKind::Other if reff.is_capability() => Err(Error::from_kind(
                ErrorKind::MessageContainsCapabilityPointer,
            )),
            WirePointerKind::Other => Err(Error::from_kind(ErrorKind::UnknownPointerType)),
        }
    }

    fn too_deep() -> Error {
        Error::from_kind(ErrorKind::MessageIsTooDeeplyNested)
    }

    pub fn read_struct_pointer<'a>(
        segment: &'a [u8],
        position: i64,
        reff: WirePointer,
        nesting_limit: i32,
    ) -> Result<StructReader<'a>> {
        if reff.is_null() {
            return Ok(StructReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(too_deep());
        }

        check_positional(reff)?;
        if reff.kind() != WirePointerKind::Struct {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected,
            ));
        }

        let data_size_words = reff.struct_data_size();
        let start = bounds_check(
            segment,
            reff.target(position),
            u64::from(reff.struct_word_size()) * BYTES_PER_WORD as u64,
        )?;

        Ok(StructReader {
            segment,
            data: start,
            pointers: start + usize::from(data_size_words) * BYTES_PER_WORD,
            data_size: u32::from(data_size_words) * BITS_PER_WORD as BitCount32,
            pointer_count: reff.struct_ptr_count(),
            nesting_limit: nesting_limit - 1,
        })
    }

    pub fn read_list_pointer<'a>(
        segment: &'a [u8],
        position: i64,
        reff: WirePointer,
        expected_element_size: Option<ElementSize>,
        nesting_limit: i32,
    ) -> Result<ListReader<'a>> {
        if reff.is_null() {
            return Ok(ListReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(too_deep());
        }

        check_positional(reff)?;
        if reff.kind() != WirePointerKind::List {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonListPointerWhereListPointerWasExpected,
            ));
        }

        let element_size = reff.list_element_size();
        match element_size {
            InlineComposite => {
                let word_count = reff.list_inline_composite_word_count();
                let tag_position = bounds_check(
                    segment,
                    reff.target(position),
                    (u64::from(word_count) + 1) * BYTES_PER_WORD as u64,
                )?;
                let tag = WirePointer::read(segment, tag_position)?;
                let ptr = tag_position + BYTES_PER_WORD;

                if tag.kind() != WirePointerKind::Struct {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                    ));
                }

                let size = tag.inline_composite_list_element_count();
                let data_size = tag.struct_data_size();
                let ptr_count = tag.struct_ptr_count();
                let words_per_element = tag.struct_word_size();

                if u64::from(size) * u64::from(words_per_element) > u64::from(word_count) {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                    ));
                }

                // A struct list may stand in for a list of primitives or pointers that was
                // upgraded to structs. The first field of each element is the value.
                match expected_element_size {
                    None | Some(Void | InlineComposite) => (),
                    Some(Bit) => {
                        return Err(Error::from_kind(
                            ErrorKind::MessageContainsListWithIncompatibleElementType,
                        ));
                    }
                    Some(Byte | TwoBytes | FourBytes | EightBytes) => {
                        if data_size == 0 {
                            return Err(Error::from_kind(
                                ErrorKind::MessageContainsListWithIncompatibleElementType,
                            ));
                        }
                    }
                    Some(Pointer) => {
                        if ptr_count == 0 {
                            return Err(Error::from_kind(
                                ErrorKind::MessageContainsListWithIncompatibleElementType,
                            ));
                        }
                    }
                }

                Ok(ListReader {
                    segment,
                    ptr,
                    element_count: size,
                    element_size,
                    step: words_per_element * BITS_PER_WORD as u32,
                    struct_data_size: u32::from(data_size) * BITS_PER_WORD as u32,
                    struct_pointer_count: ptr_count,
                    nesting_limit: nesting_limit - 1,
                })
            }
            _ => {
                // This is a primitive or pointer list, but all such lists can also be interpreted
                // as struct lists. We need to compute the data size and pointer count for such
                // structs.
                let data_size = data_bits_per_element(element_size);
                let pointer_count = pointers_per_element(element_size);
                let element_count = reff.list_element_count();
                let step = data_size + pointer_count * BITS_PER_POINTER as u32;

                let word_count = round_bits_up_to_words(u64::from(element_count) * u64::from(step));
                let ptr = bounds_check(
                    segment,
                    reff.target(position),
                    u64::from(word_count) * BYTES_PER_WORD as u64,
                )?;

                if let Some(expected_element_size) = expected_element_size {
                    if (element_size == Bit) != (expected_element_size == Bit) {
                        return Err(Error::from_kind(
                            ErrorKind::MessageContainsListWithIncompatibleElementType,
                        ));
                    }

                    // Verify that the elements are at least as large as the expected type. Note that if
                    // we expected InlineComposite, the expected sizes here will be zero, because bounds
                    // checking will be performed at field access time.
                    let expected_data_bits_per_element =
                        data_bits_per_element(expected_element_size);
                    let expected_pointers_per_element = pointers_per_element(expected_element_size);

                    if expected_data_bits_per_element > data_size
                        || expected_pointers_per_element > pointer_count
                    {
                        return Err(Error::from_kind(
                            ErrorKind::MessageContainsListWithIncompatibleElementType,
                        ));
                    }
                }

                Ok(ListReader {
                    segment,
                    ptr,
                    element_count,
                    element_size,
                    step,
                    struct_data_size: data_size,
                    struct_pointer_count: pointer_count as u16,
                    nesting_limit: nesting_limit - 1,
                })
            }
        }
    }

    /// Returns the bytes of a `Byte` list, bounds-checked.
    fn read_byte_list(segment: &[u8], position: i64, reff: WirePointer) -> Result<&[u8]> {
        check_positional(reff)?;
        if reff.kind() != WirePointerKind::List {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonListPointerWhereListPointerWasExpected,
            ));
        }
        if reff.list_element_size() != Byte {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsListWithIncompatibleElementType,
            ));
        }
        let size = reff.list_element_count();
        let start = bounds_check(
            segment,
            reff.target(position),
            u64::from(round_bytes_up_to_words(size)) * BYTES_PER_WORD as u64,
        )?;
        Ok(&segment[start..start + size as usize])
    }

    pub fn read_text_pointer(
        segment: &[u8],
        position: i64,
        reff: WirePointer,
    ) -> Result<text::Reader<'_>> {
        if reff.is_null() {
            return Ok(text::Reader::default());
        }

        let bytes = read_byte_list(segment, position, reff)?;
        match bytes.split_last() {
            Some((0, text)) => Ok(text::Reader(text)),
            _ => Err(Error::from_kind(
                ErrorKind::MessageContainsTextThatIsNotNULTerminated,
            )),
        }
    }

    pub fn read_data_pointer(
        segment: &[u8],
        position: i64,
        reff: WirePointer,
    ) -> Result<data::Reader<'_>> {
        if reff.is_null() {
            return Ok(&[]);
        }
        read_byte_list(segment, position, reff)
    }

    pub fn total_size(
        segment: &[u8],
        position: i64,
        reff: WirePointer,
        read_limiter: &ReadLimiter,
        nesting_limit: i32,
    ) -> Result<MessageSize> {
        let mut result = MessageSize { word_count: 0 };

        if reff.is_null() {
            return Ok(result);
        }

        if nesting_limit <= 0 {
            return Err(too_deep());
        }

        check_positional(reff)?;
        match reff.kind() {
            WirePointerKind::Struct => {
                let start = bounds_check(
                    segment,
                    reff.target(position),
                    u64::from(reff.struct_word_size()) * BYTES_PER_WORD as u64,
                )?;
                read_limiter.can_read(reff.struct_word_size() as usize)?;
                result.word_count += u64::from(reff.struct_word_size());

                let pointers = start + usize::from(reff.struct_data_size()) * BYTES_PER_WORD;
                for i in 0..usize::from(reff.struct_ptr_count()) {
                    let pos = pointers + i * BYTES_PER_POINTER;
                    result += total_size(
                        segment,
                        pos as i64,
                        WirePointer::read(segment, pos)?,
                        read_limiter,
                        nesting_limit - 1,
                    )?;
                }
            }
            WirePointerKind::List => match reff.list_element_size() {
                Void => {
                    read_limiter.can_read(reff.list_element_count() as usize)?;
                }
                Bit | Byte | TwoBytes | FourBytes | EightBytes => {
                    let total_words = round_bits_up_to_words(
                        u64::from(reff.list_element_count())
                            * u64::from(data_bits_per_element(reff.list_element_size())),
                    );
                    bounds_check(
                        segment,
                        reff.target(position),
                        u64::from(total_words) * BYTES_PER_WORD as u64,
                    )?;
                    read_limiter.can_read(total_words as usize)?;
                    result.word_count += u64::from(total_words);
                }
                Pointer => {
                    let count = reff.list_element_count();
                    let start = bounds_check(
                        segment,
                        reff.target(position),
                        u64::from(count) * BYTES_PER_POINTER as u64,
                    )?;
                    read_limiter.can_read(count as usize)?;
                    result.word_count += u64::from(count);

                    for i in 0..count as usize {
                        let pos = start + i * BYTES_PER_POINTER;
                        result += total_size(
                            segment,
                            pos as i64,
                            WirePointer::read(segment, pos)?,
                            read_limiter,
                            nesting_limit - 1,
                        )?;
                    }
                }
                InlineComposite => {
                    let word_count = reff.list_inline_composite_word_count();
                    let tag_position = bounds_check(
                        segment,
                        reff.target(position),
                        (u64::from(word_count) + 1) * BYTES_PER_WORD as u64,
                    )?;
                    let tag = WirePointer::read(segment, tag_position)?;
                    if tag.kind() != WirePointerKind::Struct {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                        ));
                    }

                    let count = tag.inline_composite_list_element_count();
                    let words_per_element = tag.struct_word_size();
                    if u64::from(count) * u64::from(words_per_element) > u64::from(word_count) {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                        ));
                    }

                    read_limiter.can_read(word_count as usize + POINTER_SIZE_IN_WORDS)?;
                    if words_per_element == 0 {
                        read_limiter.can_read(count as usize)?;
                    }

                    result.word_count +=
                        u64::from(count) * u64::from(words_per_element) + POINTER_SIZE_IN_WORDS as u64;

                    let data_bytes = usize::from(tag.struct_data_size()) * BYTES_PER_WORD;
                    let step = words_per_element as usize * BYTES_PER_WORD;
                    for element in 0..count as usize {
                        let pointers = tag_position + BYTES_PER_WORD + element * step + data_bytes;
                        for i in 0..usize::from(tag.struct_ptr_count()) {
                            let pos = pointers + i * BYTES_PER_POINTER;
                            result += total_size(
                                segment,
                                pos as i64,
                                WirePointer::read(segment, pos)?,
                                read_limiter,
                                nesting_limit - 1,
                            )?;
                        }
                    }
                }
            },
            WirePointerKind::Far | WirePointerKind::Other => unreachable!(),
        }

        Ok(result)
    }

    /// Deep-copies the object that `src_ptr` (located at byte `src_position` of `src`)
    /// points to into `dst`, writing the new pointer at byte `dst_position`.
    ///
    /// Objects are laid out depth-first in `dst`, so the copy is densely packed no matter
    /// how the source interleaves its objects. `src_position` may be negative when the
    /// pointer is synthesized rather than stored in `src`.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_pointer(
        dst: &mut BuilderArena,
        dst_position: usize,
        src: &[u8],
        src_position: i64,
        src_ptr: WirePointer,
        read_limiter: &ReadLimiter,
        nesting_limit: i32,
    ) -> Result<()> {
        if src_ptr.is_null() {
            dst.set_pointer(dst_position, WirePointer::NULL);
            return Ok(());
        }

        if nesting_limit <= 0 {
            return Err(too_deep());
        }

        check_positional(src_ptr)?;
        match src_ptr.kind() {
            WirePointerKind::Struct => {
                let size = src_ptr.struct_size();
                if size.total() == 0 {
                    dst.set_pointer(dst_position, WirePointer::empty_struct_pointer());
                    return Ok(());
                }

                let start = bounds_check(
                    src,
                    src_ptr.target(src_position),
                    u64::from(size.total()) * BYTES_PER_WORD as u64,
                )?;
                read_limiter.can_read(size.total() as usize)?;

                let body = dst.alloc_struct(dst_position, size);
                copy_struct_body(dst, body, src, start, size, read_limiter, nesting_limit)
            }
            WirePointerKind::List => {
                let element_size = src_ptr.list_element_size();
                match element_size {
                    Void => {
                        // Lists of void can claim to be arbitrarily large without
                        // having sent actual data.
                        let count = src_ptr.list_element_count();
                        read_limiter.can_read(count as usize)?;
                        dst.alloc_list(dst_position, Void, count);
                        Ok(())
                    }
                    Bit | Byte | TwoBytes | FourBytes | EightBytes => {
                        let count = src_ptr.list_element_count();
                        let bits = u64::from(count) * u64::from(data_bits_per_element(element_size));
                        let words = round_bits_up_to_words(bits);
                        let start = bounds_check(
                            src,
                            src_ptr.target(src_position),
                            u64::from(words) * BYTES_PER_WORD as u64,
                        )?;
                        read_limiter.can_read(words as usize)?;

                        let body = dst.alloc_list(dst_position, element_size, count);
                        let bytes = round_bits_up_to_bytes(bits) as usize;
                        dst.write_bytes(body, &src[start..start + bytes]);
                        Ok(())
                    }
                    Pointer => {
                        let count = src_ptr.list_element_count();
                        let start = bounds_check(
                            src,
                            src_ptr.target(src_position),
                            u64::from(count) * BYTES_PER_POINTER as u64,
                        )?;
                        read_limiter.can_read(count as usize)?;

                        let body = dst.alloc_list(dst_position, Pointer, count);
                        for i in 0..count as usize {
                            let pos = start + i * BYTES_PER_POINTER;
                            copy_pointer(
                                dst,
                                body + i * BYTES_PER_POINTER,
                                src,
                                pos as i64,
                                WirePointer::read(src, pos)?,
                                read_limiter,
                                nesting_limit - 1,
                            )?;
                        }
                        Ok(())
                    }
                    InlineComposite => {
                        let word_count = src_ptr.list_inline_composite_word_count();
                        let tag_position = bounds_check(
                            src,
                            src_ptr.target(src_position),
                            (u64::from(word_count) + 1) * BYTES_PER_WORD as u64,
                        )?;
                        let tag = WirePointer::read(src, tag_position)?;

                        if tag.kind() != WirePointerKind::Struct {
                            return Err(Error::from_kind(
                                ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                            ));
                        }

                        let element_count = tag.inline_composite_list_element_count();
                        let size = tag.struct_size();
                        let words_per_element = size.total();

                        if u64::from(words_per_element) * u64::from(element_count)
                            > u64::from(word_count)
                        {
                            return Err(Error::from_kind(
                                ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                            ));
                        }

                        read_limiter.can_read(word_count as usize + POINTER_SIZE_IN_WORDS)?;
                        if words_per_element == 0 {
                            // Watch out for lists of zero-sized structs, which can claim to be
                            // arbitrarily large without having sent actual data.
                            read_limiter.can_read(element_count as usize)?;
                        }

                        let body = dst.alloc_struct_list(dst_position, size, element_count);
                        let step = words_per_element as usize * BYTES_PER_WORD;
                        let src_body = tag_position + BYTES_PER_WORD;
                        for i in 0..element_count as usize {
                            copy_struct_body(
                                dst,
                                body + i * step,
                                src,
                                src_body + i * step,
                                size,
                                read_limiter,
                                nesting_limit,
                            )?;
                        }
                        Ok(())
                    }
                }
            }
            WirePointerKind::Far | WirePointerKind::Other => unreachable!(),
        }
    }

    /// Copies the data section verbatim, then each pointer of the pointer section.
    /// `src_start..src_start + size` has already been bounds-checked.
    fn copy_struct_body(
        dst: &mut BuilderArena,
        dst_start: usize,
        src: &[u8],
        src_start: usize,
        size: StructSize,
        read_limiter: &ReadLimiter,
        nesting_limit: i32,
    ) -> Result<()> {
        let data_bytes = usize::from(size.data) * BYTES_PER_WORD;
        dst.write_bytes(dst_start, &src[src_start..src_start + data_bytes]);

        for i in 0..usize::from(size.pointers) {
            let pos = src_start + data_bytes + i * BYTES_PER_POINTER;
            copy_pointer(
                dst,
                dst_start + data_bytes + i * BYTES_PER_POINTER,
                src,
                pos as i64,
                WirePointer::read(src, pos)?,
                read_limiter,
                nesting_limit - 1,
            )?;
        }
        Ok(())
    }
}

pub use self::wire_helpers::bounds_check;

/// A pointer word somewhere in a segment, not yet dereferenced.
#[derive(Clone, Copy)]
pub struct PointerReader<'a> {
    segment: &'a [u8],
    // None for the default (null) pointer.
    pointer: Option<usize>,
    nesting_limit: i32,
}

impl<'a> PointerReader<'a> {
    pub fn new_default<'b>() -> PointerReader<'b> {
        PointerReader {
            segment: &[],
            pointer: None,
            nesting_limit: DEFAULT_NESTING_LIMIT,
        }
    }

    /// The pointer stored at byte `location` of `segment`.
    pub fn get_root(segment: &'a [u8], location: usize, nesting_limit: i32) -> Result<Self> {
        bounds_check(segment, location as i64, BYTES_PER_POINTER as u64)?;
        Ok(PointerReader {
            segment,
            pointer: Some(location),
            nesting_limit,
        })
    }

    pub fn segment(&self) -> &'a [u8] {
        self.segment
    }

    /// Byte position of the pointer word, or `None` for the default pointer.
    pub fn position(&self) -> Option<usize> {
        self.pointer
    }

    pub fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }

    /// The raw pointer word. The position was bounds-checked when this reader was made.
    pub fn wire_pointer(&self) -> WirePointer {
        self.pointer
            .and_then(|pos| read_primitive::<u64>(self.segment, pos))
            .map_or(WirePointer::NULL, WirePointer::from_raw)
    }

    fn position_i64(&self) -> i64 {
        self.pointer.map_or(0, |pos| pos as i64)
    }

    pub fn is_null(&self) -> bool {
        self.wire_pointer().is_null()
    }

    /// Size of everything this pointer reaches, within the default traversal limit.
    pub fn total_size(&self) -> Result<MessageSize> {
        self.total_size_with_limit(&ReadLimiter::new(Some(DEFAULT_TRAVERSAL_LIMIT_IN_WORDS)))
    }

    /// Like [`PointerReader::total_size`], charging every region walked to `read_limiter`.
    pub fn total_size_with_limit(&self, read_limiter: &ReadLimiter) -> Result<MessageSize> {
        wire_helpers::total_size(
            self.segment,
            self.position_i64(),
            self.wire_pointer(),
            read_limiter,
            self.nesting_limit,
        )
    }

    pub fn get_struct(self) -> Result<StructReader<'a>> {
        wire_helpers::read_struct_pointer(
            self.segment,
            self.position_i64(),
            self.wire_pointer(),
            self.nesting_limit,
        )
    }

    pub fn get_list(self, expected_element_size: Option<ElementSize>) -> Result<ListReader<'a>> {
        wire_helpers::read_list_pointer(
            self.segment,
            self.position_i64(),
            self.wire_pointer(),
            expected_element_size,
            self.nesting_limit,
        )
    }

    pub fn get_text(self) -> Result<text::Reader<'a>> {
        wire_helpers::read_text_pointer(self.segment, self.position_i64(), self.wire_pointer())
    }

    pub fn get_data(self) -> Result<data::Reader<'a>> {
        wire_helpers::read_data_pointer(self.segment, self.position_i64(), self.wire_pointer())
    }

    pub fn get_pointer_type(&self) -> Result<PointerType> {
        let reff = self.wire_pointer();
        if reff.is_null() {
            return Ok(PointerType::Null);
        }
        match reff.kind() {
            WirePointerKind::Struct => Ok(PointerType::Struct),
            WirePointerKind::List => Ok(PointerType::List),
            WirePointerKind::Far => Err(Error::from_kind(ErrorKind::MessageContainsFarPointer)),
            WirePointerKind::Other if reff.is_capability() => Ok(PointerType::Capability),
            WirePointerKind::Other => Err(Error::from_kind(ErrorKind::UnknownPointerType)),
        }
    }
}

/// A struct located in a segment: base offset, data section size and pointer count.
#[derive(Clone, Copy, Debug)]
pub struct StructReader<'a> {
    segment: &'a [u8],
    data: usize,
    pointers: usize,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
    nesting_limit: i32,
}

impl<'a> StructReader<'a> {
    pub fn new_default<'b>() -> StructReader<'b> {
        StructReader {
            segment: &[],
            data: 0,
            pointers: 0,
            data_size: 0,
            pointer_count: 0,
            nesting_limit: DEFAULT_NESTING_LIMIT,
        }
    }

    /// A struct whose body starts at byte `offset` of `segment`, with no pointer leading
    /// to it.
    pub fn new(
        segment: &'a [u8],
        offset: usize,
        data_size: WordCount16,
        ptrs_size: WirePointerCount16,
    ) -> Result<Self> {
        let size = StructSize::new(data_size, ptrs_size);
        let start = bounds_check(
            segment,
            offset as i64,
            u64::from(size.total()) * BYTES_PER_WORD as u64,
        )?;
        Ok(StructReader {
            segment,
            data: start,
            pointers: start + usize::from(data_size) * BYTES_PER_WORD,
            data_size: u32::from(data_size) * BITS_PER_WORD as u32,
            pointer_count: ptrs_size,
            nesting_limit: DEFAULT_NESTING_LIMIT,
        })
    }

    pub fn segment(&self) -> &'a [u8] {
        self.segment
    }

    /// Byte offset of the data section.
    pub fn offset(&self) -> usize {
        self.data
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    pub fn struct_size(&self) -> StructSize {
        StructSize::new(
            (self.data_size / BITS_PER_WORD as u32) as WordCount16,
            self.pointer_count,
        )
    }

    pub fn get_data_section_as_blob(&self) -> &'a [u8] {
        &self.segment[self.data..self.data + self.data_size as usize / BITS_PER_BYTE]
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        // We need to check the offset because the struct may have
        // been created with an old version of the protocol that did
        // not contain the field.
        if (offset + 1) * T::BYTES * BITS_PER_BYTE <= self.data_size as usize {
            read_primitive(self.segment, self.data + offset * T::BYTES).unwrap_or_default()
        } else {
            T::default()
        }
    }

    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        if offset < self.data_size as usize {
            let byte = read_primitive::<u8>(self.segment, self.data + offset / BITS_PER_BYTE)
                .unwrap_or_default();
            (byte & (1u8 << (offset % BITS_PER_BYTE))) != 0
        } else {
            false
        }
    }

    #[inline]
    pub fn get_data_field_mask<T: Primitive + Mask>(
        &self,
        offset: ElementCount,
        default_bits: u64,
    ) -> T {
        self.get_data_field::<T>(offset).mask(default_bits)
    }

    #[inline]
    pub fn get_bool_field_mask(&self, offset: ElementCount, mask: bool) -> bool {
        self.get_bool_field(offset) ^ mask
    }

    /// The union discriminant stored at `discriminant_offset`, in units of 16 bits.
    #[inline]
    pub fn which(&self, discriminant_offset: ElementCount) -> u16 {
        self.get_data_field::<u16>(discriminant_offset)
    }

    #[inline]
    pub fn get_pointer_field(&self, ptr_index: WirePointerCount) -> PointerReader<'a> {
        if ptr_index < self.pointer_count as WirePointerCount {
            PointerReader {
                segment: self.segment,
                pointer: Some(self.pointers + ptr_index * BYTES_PER_POINTER),
                nesting_limit: self.nesting_limit,
            }
        } else {
            PointerReader::new_default()
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        let read_limiter = ReadLimiter::new(Some(DEFAULT_TRAVERSAL_LIMIT_IN_WORDS));
        let mut result = MessageSize {
            word_count: u64::from(self.struct_size().total()),
        };

        for i in 0..self.pointer_count as usize {
            result += self.get_pointer_field(i).total_size_with_limit(&read_limiter)?;
        }

        Ok(result)
    }
}

/// A list located in a segment. Every kind of list can be read as a list of structs:
/// `step` is the distance between elements and `struct_data_size` the size of the part
/// of an element that is data.
#[derive(Clone, Copy)]
pub struct ListReader<'a> {
    segment: &'a [u8],
    ptr: usize,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
    nesting_limit: i32,
}

impl<'a> ListReader<'a> {
    pub fn new_default<'b>() -> ListReader<'b> {
        ListReader {
            segment: &[],
            ptr: 0,
            element_count: 0,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
            element_size: Void,
            nesting_limit: DEFAULT_NESTING_LIMIT,
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    pub fn get_step_size_in_bits(&self) -> BitCount32 {
        self.step
    }

    pub fn segment(&self) -> &'a [u8] {
        self.segment
    }

    /// Byte offset of the first element.
    pub fn offset(&self) -> usize {
        self.ptr
    }

    /// Element shape of an inline composite list.
    pub fn struct_size(&self) -> StructSize {
        StructSize::new(
            (self.struct_data_size / BITS_PER_WORD as u32) as WordCount16,
            self.struct_pointer_count,
        )
    }

    /// A pointer to this list, as it would be stored in the word at `position`.
    /// Returns that position, which for inline composite lists lies before the tag.
    pub(crate) fn synthesize_pointer(&self) -> (i64, WirePointer) {
        match self.element_size {
            InlineComposite => (
                self.ptr as i64 - 2 * BYTES_PER_WORD as i64,
                WirePointer::inline_composite_list_pointer(
                    0,
                    self.element_count * (self.step / BITS_PER_WORD as u32),
                ),
            ),
            element_size => (
                self.ptr as i64 - BYTES_PER_WORD as i64,
                WirePointer::list_pointer(0, element_size, self.element_count),
            ),
        }
    }

    /// The bytes spanned by the elements, without the tag of an inline composite list.
    pub fn into_raw_bytes(self) -> &'a [u8] {
        if self.element_count == 0 {
            &[]
        } else {
            let num_bytes = round_bits_up_to_bytes(
                u64::from(self.step) * u64::from(self.element_count),
            ) as usize;
            &self.segment[self.ptr..self.ptr + num_bytes]
        }
    }

    #[inline]
    fn element_position(&self, index: ElementCount32) -> usize {
        self.ptr + (index as u64 * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    fn check_index(&self, index: ElementCount32) -> Result<()> {
        if index < self.element_count {
            Ok(())
        } else {
            Err(Error::from_kind(ErrorKind::IndexOutOfRange {
                index,
                len: self.element_count,
            }))
        }
    }

    /// Panics if `index` is out of range.
    #[inline]
    pub fn get_struct_element(&self, index: ElementCount32) -> StructReader<'a> {
        assert!(index < self.element_count, "index out of bounds");
        let index_byte = self.element_position(index);
        StructReader {
            segment: self.segment,
            data: index_byte,
            pointers: index_byte + self.struct_data_size as usize / BITS_PER_BYTE,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
            nesting_limit: self.nesting_limit - 1,
        }
    }

    pub fn try_get_struct_element(&self, index: ElementCount32) -> Result<StructReader<'a>> {
        self.check_index(index)?;
        Ok(self.get_struct_element(index))
    }

    /// Panics if `index` is out of range. In a list of structs, this is the first pointer
    /// of the element.
    #[inline]
    pub fn get_pointer_element(&self, index: ElementCount32) -> PointerReader<'a> {
        assert!(index < self.element_count, "index out of bounds");
        PointerReader {
            segment: self.segment,
            pointer: Some(
                self.element_position(index) + self.struct_data_size as usize / BITS_PER_BYTE,
            ),
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn try_get_pointer_element(&self, index: ElementCount32) -> Result<PointerReader<'a>> {
        self.check_index(index)?;
        if self.struct_pointer_count == 0 {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsListWithIncompatibleElementType,
            ));
        }
        Ok(self.get_pointer_element(index))
    }
}

pub trait PrimitiveElement: Sized {
    fn get(list_reader: &ListReader, index: ElementCount32) -> Self;

    fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self;

    fn set(list_builder: &mut ListBuilder, index: ElementCount32, value: Self);

    fn element_size() -> ElementSize;
}

macro_rules! primitive_element_impl(
    ($typ:ty, $size:ident) => (
        impl PrimitiveElement for $typ {
            #[inline]
            fn get(list_reader: &ListReader, index: ElementCount32) -> Self {
                read_primitive(list_reader.segment, list_reader.element_position(index))
                    .unwrap_or_default()
            }

            #[inline]
            fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self {
                list_builder.arena.get(list_builder.element_position(index))
            }

            #[inline]
            fn set(list_builder: &mut ListBuilder, index: ElementCount32, value: Self) {
                let position = list_builder.element_position(index);
                list_builder.arena.set(position, value)
            }

            fn element_size() -> ElementSize {
                $size
            }
        }
        );
    );

primitive_element_impl!(u8, Byte);
primitive_element_impl!(i8, Byte);
primitive_element_impl!(u16, TwoBytes);
primitive_element_impl!(i16, TwoBytes);
primitive_element_impl!(u32, FourBytes);
primitive_element_impl!(i32, FourBytes);
primitive_element_impl!(f32, FourBytes);
primitive_element_impl!(u64, EightBytes);
primitive_element_impl!(i64, EightBytes);
primitive_element_impl!(f64, EightBytes);

impl PrimitiveElement for bool {
    #[inline]
    fn get(list: &ListReader, index: ElementCount32) -> Self {
        let bindex = index as u64 * u64::from(list.step);
        let byte = read_primitive::<u8>(list.segment, list.ptr + (bindex / BITS_PER_BYTE as u64) as usize)
            .unwrap_or_default();
        ((byte >> (bindex % BITS_PER_BYTE as u64)) & 1) != 0
    }

    #[inline]
    fn get_from_builder(list: &ListBuilder, index: ElementCount32) -> Self {
        let bindex = index as usize * list.step as usize;
        list.arena.get_bool(list.ptr + bindex / BITS_PER_BYTE, bindex % BITS_PER_BYTE)
    }

    #[inline]
    fn set(list: &mut ListBuilder, index: ElementCount32, value: Self) {
        let bindex = index as usize * list.step as usize;
        list.arena
            .set_bool(list.ptr + bindex / BITS_PER_BYTE, bindex % BITS_PER_BYTE, value);
    }

    fn element_size() -> ElementSize {
        Bit
    }
}

impl PrimitiveElement for () {
    #[inline]
    fn get(_list: &ListReader, _index: ElementCount32) {}

    #[inline]
    fn get_from_builder(_list: &ListBuilder, _index: ElementCount32) {}

    #[inline]
    fn set(_list: &mut ListBuilder, _index: ElementCount32, _value: ()) {}

    fn element_size() -> ElementSize {
        Void
    }
}

/// Writes the fields of a struct that was allocated in a `BuilderArena`.
pub struct StructBuilder<'a> {
    arena: &'a mut BuilderArena,
    data: usize,
    pointers: usize,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
}

impl<'a> StructBuilder<'a> {
    /// The struct whose body starts at byte `data` of the arena.
    pub fn new(arena: &'a mut BuilderArena, data: usize, size: StructSize) -> Self {
        StructBuilder {
            arena,
            data,
            pointers: data + usize::from(size.data) * BYTES_PER_WORD,
            data_size: u32::from(size.data) * BITS_PER_WORD as u32,
            pointer_count: size.pointers,
        }
    }

    pub fn reborrow(&mut self) -> StructBuilder<'_> {
        StructBuilder {
            arena: &mut *self.arena,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
        }
    }

    /// Byte offset of the data section.
    pub fn offset(&self) -> usize {
        self.data
    }

    pub fn struct_size(&self) -> StructSize {
        StructSize::new(
            (self.data_size / BITS_PER_WORD as u32) as WordCount16,
            self.pointer_count,
        )
    }

    #[inline]
    pub fn set_data_field<T: Primitive>(&mut self, offset: ElementCount, value: T) {
        assert!(
            (offset + 1) * T::BYTES * BITS_PER_BYTE <= self.data_size as usize,
            "data field {offset} is outside of the data section"
        );
        self.arena.set(self.data + offset * T::BYTES, value)
    }

    #[inline]
    pub fn set_data_field_mask<T: Primitive + Mask>(
        &mut self,
        offset: ElementCount,
        value: T,
        default_bits: u64,
    ) {
        self.set_data_field(offset, value.mask(default_bits));
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        self.arena.get(self.data + offset * T::BYTES)
    }

    #[inline]
    pub fn set_bool_field(&mut self, offset: ElementCount, value: bool) {
        assert!(
            offset < self.data_size as usize,
            "bool field {offset} is outside of the data section"
        );
        self.arena.set_bool(
            self.data + offset / BITS_PER_BYTE,
            offset % BITS_PER_BYTE,
            value,
        )
    }

    #[inline]
    pub fn set_bool_field_mask(&mut self, offset: ElementCount, value: bool, mask: bool) {
        self.set_bool_field(offset, value ^ mask);
    }

    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        self.arena
            .get_bool(self.data + offset / BITS_PER_BYTE, offset % BITS_PER_BYTE)
    }

    fn pointer_position(&self, ptr_index: WirePointerCount) -> usize {
        assert!(
            ptr_index < self.pointer_count as usize,
            "pointer field {ptr_index} is outside of the pointer section"
        );
        self.pointers + ptr_index * BYTES_PER_POINTER
    }

    /// Allocates a new struct and points field `ptr_index` at it. Whatever the field
    /// pointed to before is left behind in the arena.
    pub fn init_struct_field(&mut self, ptr_index: WirePointerCount, size: StructSize) -> StructBuilder<'_> {
        let position = self.pointer_position(ptr_index);
        let body = self.arena.alloc_struct(position, size);
        StructBuilder::new(&mut *self.arena, body, size)
    }

    pub fn init_list_field(
        &mut self,
        ptr_index: WirePointerCount,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> ListBuilder<'_> {
        let position = self.pointer_position(ptr_index);
        let ptr = self.arena.alloc_list(position, element_size, element_count);
        ListBuilder::new(&mut *self.arena, ptr, element_size, element_count)
    }

    pub fn init_struct_list_field(
        &mut self,
        ptr_index: WirePointerCount,
        size: StructSize,
        element_count: ElementCount32,
    ) -> ListBuilder<'_> {
        let position = self.pointer_position(ptr_index);
        let ptr = self.arena.alloc_struct_list(position, size, element_count);
        ListBuilder::new_struct_list(&mut *self.arena, ptr, size, element_count)
    }

    pub fn set_text_field(&mut self, ptr_index: WirePointerCount, value: &str) {
        let position = self.pointer_position(ptr_index);
        self.arena.alloc_text(position, value.as_bytes());
    }

    pub fn set_data_blob_field(&mut self, ptr_index: WirePointerCount, value: &[u8]) {
        let position = self.pointer_position(ptr_index);
        self.arena.alloc_data(position, value);
    }

    /// Deep-copies whatever `value` points to into field `ptr_index`.
    pub fn copy_field_from(&mut self, ptr_index: WirePointerCount, value: PointerReader) -> Result<()> {
        let position = self.pointer_position(ptr_index);
        self.arena.copy_from(position, value, None)
    }

    pub fn clear_pointer_field(&mut self, ptr_index: WirePointerCount) {
        let position = self.pointer_position(ptr_index);
        self.arena.set_pointer(position, WirePointer::NULL);
    }
}

/// Writes the elements of a list that was allocated in a `BuilderArena`.
pub struct ListBuilder<'a> {
    arena: &'a mut BuilderArena,
    ptr: usize,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
}

impl<'a> ListBuilder<'a> {
    /// A list of primitives or pointers whose first element is at byte `ptr`.
    pub fn new(
        arena: &'a mut BuilderArena,
        ptr: usize,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Self {
        let data_size = data_bits_per_element(element_size);
        let pointer_count = pointers_per_element(element_size);
        ListBuilder {
            arena,
            ptr,
            element_count,
            step: data_size + pointer_count * BITS_PER_POINTER as u32,
            struct_data_size: data_size,
            struct_pointer_count: pointer_count as u16,
            element_size,
        }
    }

    /// An inline composite list whose first element (just past the tag) is at byte `ptr`.
    pub fn new_struct_list(
        arena: &'a mut BuilderArena,
        ptr: usize,
        size: StructSize,
        element_count: ElementCount32,
    ) -> Self {
        ListBuilder {
            arena,
            ptr,
            element_count,
            step: size.total() * BITS_PER_WORD as u32,
            struct_data_size: u32::from(size.data) * BITS_PER_WORD as u32,
            struct_pointer_count: size.pointers,
            element_size: InlineComposite,
        }
    }

    pub fn reborrow(&mut self) -> ListBuilder<'_> {
        ListBuilder {
            arena: &mut *self.arena,
            ptr: self.ptr,
            element_count: self.element_count,
            step: self.step,
            struct_data_size: self.struct_data_size,
            struct_pointer_count: self.struct_pointer_count,
            element_size: self.element_size,
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    #[inline]
    fn element_position(&self, index: ElementCount32) -> usize {
        assert!(index < self.element_count, "index out of bounds");
        self.ptr + (index as u64 * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    pub fn set<T: PrimitiveElement>(&mut self, index: ElementCount32, value: T) {
        PrimitiveElement::set(self, index, value)
    }

    pub fn get<T: PrimitiveElement>(&self, index: ElementCount32) -> T {
        PrimitiveElement::get_from_builder(self, index)
    }

    pub fn get_struct_element(&mut self, index: ElementCount32) -> StructBuilder<'_> {
        let data = self.element_position(index);
        StructBuilder {
            arena: &mut *self.arena,
            data,
            pointers: data + self.struct_data_size as usize / BITS_PER_BYTE,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
        }
    }

    fn pointer_position(&self, index: ElementCount32) -> usize {
        assert!(
            self.element_size == Pointer,
            "pointer elements are only valid in a list of pointers"
        );
        self.element_position(index)
    }

    pub fn init_struct_element(&mut self, index: ElementCount32, size: StructSize) -> StructBuilder<'_> {
        let position = self.pointer_position(index);
        let body = self.arena.alloc_struct(position, size);
        StructBuilder::new(&mut *self.arena, body, size)
    }

    pub fn set_text_element(&mut self, index: ElementCount32, value: &str) {
        let position = self.pointer_position(index);
        self.arena.alloc_text(position, value.as_bytes());
    }

    pub fn copy_element_from(&mut self, index: ElementCount32, value: PointerReader) -> Result<()> {
        let position = self.pointer_position(index);
        self.arena.copy_from(position, value, None)
    }
}
