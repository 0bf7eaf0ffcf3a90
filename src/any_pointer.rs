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

//! Untyped pointer.

use crate::private::layout::{ElementSize, PointerReader, StructReader, WirePointerKind};
use crate::traits::FromPointerReader;
use crate::{text, Result};

/// What an untyped pointer refers to, as far as the pointer word alone can tell.
#[derive(Clone, Copy)]
pub enum AnyPointer<'a> {
    Null,
    Struct(StructReader<'a>),
    /// A list of any element size other than `Byte`.
    List(crate::private::layout::ListReader<'a>),
    /// A `Byte` list read as text.
    Text(text::Reader<'a>),
}

#[derive(Copy, Clone)]
pub struct Reader<'a> {
    reader: PointerReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: PointerReader<'_>) -> Reader<'_> {
        Reader { reader }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.reader.is_null()
    }

    pub fn is_struct(&self) -> bool {
        let ptr = self.reader.wire_pointer();
        !ptr.is_null() && ptr.kind() == WirePointerKind::Struct
    }

    pub fn is_list(&self) -> bool {
        self.reader.wire_pointer().kind() == WirePointerKind::List
    }

    /// True for lists of bytes. Text and data share this encoding.
    pub fn is_text(&self) -> bool {
        let ptr = self.reader.wire_pointer();
        ptr.kind() == WirePointerKind::List && ptr.list_element_size() == ElementSize::Byte
    }

    /// Gets the total size of the target and all of its children.
    pub fn target_size(&self) -> Result<crate::MessageSize> {
        self.reader.total_size()
    }

    #[inline]
    pub fn get_as<T: FromPointerReader<'a>>(&self) -> Result<T> {
        FromPointerReader::get_from_pointer(&self.reader)
    }

    pub fn as_struct(&self) -> Result<StructReader<'a>> {
        self.reader.get_struct()
    }

    pub fn as_text(&self) -> Result<text::Reader<'a>> {
        self.reader.get_text()
    }

    /// Dereferences the pointer according to its kind.
    pub fn classify(&self) -> Result<AnyPointer<'a>> {
        if self.is_null() {
            Ok(AnyPointer::Null)
        } else if self.is_text() {
            Ok(AnyPointer::Text(self.reader.get_text()?))
        } else if self.is_list() {
            Ok(AnyPointer::List(self.reader.get_list(None)?))
        } else {
            Ok(AnyPointer::Struct(self.reader.get_struct()?))
        }
    }

    pub fn into_pointer_reader(self) -> PointerReader<'a> {
        self.reader
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader { reader: *reader })
    }
}
