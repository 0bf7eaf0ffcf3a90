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

//! List of structs, stored inline after a tag word that gives every element's size.

use crate::private::layout::{InlineComposite, ListReader, PointerReader, StructReader, StructSize};
use crate::traits::{FromPointerReader, IndexMove, ListIter};
use crate::Result;

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: ListReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new<'b>(reader: ListReader<'b>) -> Reader<'b> {
        Reader::<'b> { reader }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The size every element was written with, as recorded in the tag word.
    pub fn element_size(&self) -> StructSize {
        self.reader.struct_size()
    }

    pub fn iter(self) -> ListIter<Reader<'a>, StructReader<'a>> {
        ListIter::new(self, self.len())
    }

    /// The struct at `index`, or `IndexOutOfRange`.
    pub fn get(self, index: u32) -> Result<StructReader<'a>> {
        self.reader.try_get_struct_element(index)
    }

    pub fn try_get(self, index: u32) -> Option<StructReader<'a>> {
        self.get(index).ok()
    }

    pub fn into_list_reader(self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader {
            reader: reader.get_list(Some(InlineComposite))?,
        })
    }
}

impl<'a> IndexMove<u32, StructReader<'a>> for Reader<'a> {
    fn index_move(&self, index: u32) -> StructReader<'a> {
        self.reader.get_struct_element(index)
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::private::layout::{PointerReader, StructSize, DEFAULT_NESTING_LIMIT};
    use crate::traits::FromPointerReader;
    use crate::{word, ErrorKind, Word};

    #[test]
    fn points() {
        let data = Word::words_to_bytes(&[
            word(0x01, 0, 0, 0, 0x27, 0, 0, 0), // inline composite, 4 words
            word(0x08, 0, 0, 0, 0x01, 0, 0x01, 0), // tag: 2 elements of 1 data word, 1 pointer
            word(0x0a, 0, 0, 0, 0, 0, 0, 0),
            word(0, 0, 0, 0, 0, 0, 0, 0),
            word(0x0b, 0, 0, 0, 0, 0, 0, 0),
            word(0, 0, 0, 0, 0, 0, 0, 0),
        ]);
        let root = PointerReader::get_root(&data, 0, DEFAULT_NESTING_LIMIT).unwrap();
        let list = Reader::get_from_pointer(&root).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.element_size(), StructSize::new(1, 1));
        let xs: Vec<u8> = list.iter().map(|s| s.get_data_field::<u8>(0)).collect();
        assert_eq!(xs, [0x0a, 0x0b]);
        assert!(list.get(1).unwrap().get_pointer_field(0).is_null());
        assert_eq!(
            list.get(2).unwrap_err().kind,
            ErrorKind::IndexOutOfRange { index: 2, len: 2 }
        );
        assert!(list.try_get(2).is_none());
    }
}
