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

//! # Cap'n Proto flat runtime
//!
//! A runtime for the single-segment [Cap'n Proto](https://capnproto.org) wire format.
//! A message is one contiguous byte buffer, interpreted in place: typed accessors are
//! computed from pointer arithmetic over the buffer rather than decoded into
//! intermediate objects.
//!
//! The crate covers the binary runtime only:
//!
//!  * the 64-bit pointer encoding ([`private::layout::WirePointer`]),
//!  * a growable, append-only write buffer ([`private::arena::BuilderArena`]),
//!  * zero-copy readers for structs and lists ([`private::layout::StructReader`],
//!    [`private::layout::ListReader`] and the typed wrappers in [`primitive_list`],
//!    [`struct_list`] and [`text_list`]),
//!  * a bounds-checked deep copy of any sub-message into a fresh, compacted buffer
//!    ([`message::copy_message`]),
//!  * a layout-driven struct constructor ([`structor::Structor`]).
//!
//! Multi-segment messages, capabilities and transport are not supported: far pointers
//! and capability pointers are reported as errors.

pub mod any_pointer;
pub mod data;
pub mod message;
pub mod primitive_list;
pub mod private;
pub mod schema;
pub mod struct_list;
pub mod structor;
pub mod text;
pub mod text_list;
pub mod traits;

pub use crate::private::layout::{ElementSize, StructSize};

/// Eight bytes of memory with opaque interior.
///
/// Used to build aligned fixtures and to express sizes; the runtime itself addresses
/// buffers by byte index and imposes no alignment requirement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Word {
    raw_content: [u8; 8],
}

/// Constructs a word with the given bytes.
#[allow(clippy::too_many_arguments)]
pub const fn word(b0: u8, b1: u8, b2: u8, b3: u8, b4: u8, b5: u8, b6: u8, b7: u8) -> Word {
    Word {
        raw_content: [b0, b1, b2, b3, b4, b5, b6, b7],
    }
}

impl Word {
    /// Does this, but faster:
    /// `::std::iter::repeat(Word(0)).take(length).collect()`
    pub fn allocate_zeroed_vec(length: usize) -> Vec<Self> {
        vec![Self::default(); length]
    }

    pub fn words_to_bytes(words: &[Self]) -> Vec<u8> {
        words.iter().flat_map(|w| w.raw_content).collect()
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            raw_content: value.to_le_bytes(),
        }
    }
}

/// Size of a message. Every generated struct has a method of this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MessageSize {
    pub word_count: u64,
}

impl core::ops::AddAssign for MessageSize {
    fn add_assign(&mut self, rhs: Self) {
        self.word_count += rhs.word_count;
    }
}

/// Because messages are lazily validated, the return type of any method that reads a pointer field
/// must be wrapped in a Result.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// The general kind of the error. Code that decides how to respond to an error
    /// should read only this field in making its decision.
    pub kind: ErrorKind,

    /// Extra context about error
    pub extra: String,
}

/// The general nature of an error. The purpose of this enum is not to describe the error itself,
/// but rather to describe how the client might want to respond to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong
    Failed,

    /// A computed byte range falls outside of the segment. `position` and `end` delimit the
    /// range (`end` exclusive); `available` is the segment length.
    OffsetOutOfBounds {
        position: i64,
        end: i64,
        available: usize,
    },

    /// Far pointers require multiple segments, which this runtime does not support.
    MessageContainsFarPointer,

    /// Capabilities are not part of the single-segment format.
    MessageContainsCapabilityPointer,

    /// Unknown pointer type.
    UnknownPointerType,

    /// Message contains non-struct pointer where struct pointer was expected.
    MessageContainsNonStructPointerWhereStructPointerWasExpected,

    /// Message contains non-list pointer where list pointer was expected.
    MessageContainsNonListPointerWhereListPointerWasExpected,

    /// InlineComposite lists of non-STRUCT type are not supported.
    InlineCompositeListsOfNonStructTypeAreNotSupported,

    /// InlineComposite list's elements overrun its word count.
    InlineCompositeListsElementsOverrunItsWordCount,

    /// Message contains list with incompatible element type.
    MessageContainsListWithIncompatibleElementType,

    /// Message contains text that is not NUL-terminated.
    MessageContainsTextThatIsNotNULTerminated,

    /// Text contains non-utf8 data.
    TextContainsNonUtf8Data,

    /// List element access past the end of the list.
    IndexOutOfRange { index: u32, len: u32 },

    /// Message is too deeply nested or contains cycles.
    MessageIsTooDeeplyNested,

    /// Read limit exceeded.
    ReadLimitExceeded,

    /// The layout was flagged as unsupported.
    Unimplemented,

    /// No field with the given name.
    FieldNotFound,

    /// Value does not match the declared type of the field.
    TypeMismatch,

    /// More positional arguments than fields.
    TooManyArguments,

    /// A field was bound more than once.
    DuplicateArgument,

    /// Two data fields claim the same bytes, or a field lies outside the data section.
    OverlappingFields,
}

impl Error {
    /// Appends formatted context to `extra`, so that `write!(err, ...)` works on an
    /// `Error` the way it does on a `String`.
    pub fn write_fmt(&mut self, fmt: core::fmt::Arguments<'_>) {
        use core::fmt::Write;
        let _ = self.extra.write_fmt(fmt);
    }

    pub fn failed(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Failed,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            extra: String::new(),
            kind,
        }
    }

    pub fn unimplemented(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Unimplemented,
        }
    }

    pub(crate) fn out_of_bounds(position: i64, end: i64, available: usize) -> Self {
        Self::from_kind(ErrorKind::OffsetOutOfBounds {
            position,
            end,
            available,
        })
    }

    /// True for errors caused by a malformed message, as opposed to misuse of the API.
    pub fn is_data_corruption(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::IndexOutOfRange { .. }
                | ErrorKind::Unimplemented
                | ErrorKind::FieldNotFound
                | ErrorKind::TypeMismatch
                | ErrorKind::TooManyArguments
                | ErrorKind::DuplicateArgument
                | ErrorKind::OverlappingFields
        )
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Failed => write!(fmt, "Failed"),
            Self::OffsetOutOfBounds { position, end, available } => write!(
                fmt,
                "Invalid capnproto message: offset out of bound at position {position} ({end} > {available})"
            ),
            Self::MessageContainsFarPointer => write!(fmt, "Message contains a far pointer; multi-segment messages are not supported"),
            Self::MessageContainsCapabilityPointer => write!(fmt, "Message contains a capability pointer"),
            Self::UnknownPointerType => write!(fmt, "Unknown pointer type."),
            Self::MessageContainsNonStructPointerWhereStructPointerWasExpected => write!(fmt, "Message contains non-struct pointer where struct pointer was expected."),
            Self::MessageContainsNonListPointerWhereListPointerWasExpected => write!(fmt, "Message contains non-list pointer where list pointer was expected"),
            Self::InlineCompositeListsOfNonStructTypeAreNotSupported => write!(fmt, "InlineComposite lists of non-STRUCT type are not supported."),
            Self::InlineCompositeListsElementsOverrunItsWordCount => write!(fmt, "InlineComposite list's elements overrun its word count."),
            Self::MessageContainsListWithIncompatibleElementType => write!(fmt, "Message contains list with incompatible element type."),
            Self::MessageContainsTextThatIsNotNULTerminated => write!(fmt, "Message contains text that is not NUL-terminated"),
            Self::TextContainsNonUtf8Data => write!(fmt, "Text contains non-utf8 data"),
            Self::IndexOutOfRange { index, len } => write!(fmt, "index {index} out of range for list of length {len}"),
            Self::MessageIsTooDeeplyNested => write!(fmt, "Message is too deeply nested or contains cycles. See ReaderOptions."),
            Self::ReadLimitExceeded => write!(fmt, "read limit exceeded"),
            Self::Unimplemented => write!(fmt, "Not implemented"),
            Self::FieldNotFound => write!(fmt, "Field not found"),
            Self::TypeMismatch => write!(fmt, "Value does not match the declared type of the field"),
            Self::TooManyArguments => write!(fmt, "Too many positional arguments"),
            Self::DuplicateArgument => write!(fmt, "Field bound more than once"),
            Self::OverlappingFields => write!(fmt, "Field layout has overlapping or out-of-range fields"),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        if self.extra.is_empty() {
            write!(fmt, "{}", self.kind)
        } else {
            write!(fmt, "{}: {}", self.kind, self.extra)
        }
    }
}

impl std::error::Error for Error {}

impl From<core::str::Utf8Error> for Error {
    fn from(err: core::str::Utf8Error) -> Self {
        let mut error = Self::from_kind(ErrorKind::TextContainsNonUtf8Data);
        write!(error, "{err}");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn out_of_bounds_message() {
        let e = Error::out_of_bounds(16, 96, 88);
        assert_eq!(
            e.to_string(),
            "Invalid capnproto message: offset out of bound at position 16 (96 > 88)"
        );
        assert!(e.is_data_corruption());
    }

    #[test]
    fn usage_errors_are_not_corruption() {
        let e = Error::from_kind(ErrorKind::IndexOutOfRange { index: 3, len: 3 });
        assert!(!e.is_data_corruption());
        assert!(!Error::unimplemented("nope".into()).is_data_corruption());
        assert_eq!(Error::unimplemented("nope".into()).to_string(), "Not implemented: nope");
    }

    #[test]
    fn write_appends_context() {
        let mut e = Error::from_kind(ErrorKind::FieldNotFound);
        write!(e, "Point.{}", "z");
        write!(e, " (of {} fields)", 2);
        assert_eq!(e.extra, "Point.z (of 2 fields)");
        assert_eq!(e.to_string(), "Field not found: Point.z (of 2 fields)");
    }
}
