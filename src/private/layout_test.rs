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

use crate::private::arena::BuilderArena;
use crate::private::layout::{
    ElementSize, PointerReader, PointerType, PointerView, PrimitiveElement, StructReader,
    StructSize, WirePointer, WirePointerKind, DEFAULT_NESTING_LIMIT,
};
use crate::{word, ErrorKind, Word};

fn root(data: &[u8]) -> PointerReader<'_> {
    PointerReader::get_root(data, 0, DEFAULT_NESTING_LIMIT).unwrap()
}

#[test]
fn simple_raw_data_struct() {
    let data = Word::words_to_bytes(&[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef),
    ]);

    let reader = root(&data).get_struct().unwrap();

    assert_eq!(0xefcdab8967452301u64, reader.get_data_field::<u64>(0));
    assert_eq!(0, reader.get_data_field::<u64>(1)); // past end of struct --> default value

    assert_eq!(0x67452301u32, reader.get_data_field::<u32>(0));
    assert_eq!(0xefcdab89u32, reader.get_data_field::<u32>(1));
    assert_eq!(0, reader.get_data_field::<u32>(2)); // past end of struct --> default value

    assert_eq!(0x2301u16, reader.get_data_field::<u16>(0));
    assert_eq!(0x6745u16, reader.get_data_field::<u16>(1));
    assert_eq!(0xab89u16, reader.get_data_field::<u16>(2));
    assert_eq!(0xefcdu16, reader.get_data_field::<u16>(3));
    assert_eq!(0u16, reader.get_data_field::<u16>(4)); // past end of struct --> default value

    assert_eq!(0x01u8, reader.get_data_field::<u8>(0));
    assert_eq!(0xefu8, reader.get_data_field::<u8>(7));
    assert_eq!(0u8, reader.get_data_field::<u8>(8));

    // Bits.
    assert!(reader.get_bool_field(0));
    assert!(!reader.get_bool_field(1));
    assert!(!reader.get_bool_field(7));
    assert!(reader.get_bool_field(8));
    assert!(reader.get_bool_field(9));
    assert!(!reader.get_bool_field(10));
    assert!(reader.get_bool_field(13));
    assert!(reader.get_bool_field(63));
    assert!(!reader.get_bool_field(64)); // past end of struct --> default value
}

#[test]
fn masked_fields() {
    let data = Word::words_to_bytes(&[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);
    let reader = root(&data).get_struct().unwrap();
    assert_eq!(reader.get_data_field_mask::<i32>(0, 42), 42);
    assert_eq!(reader.get_data_field_mask::<i32>(5, 42), 42);
    assert_eq!(reader.get_data_field_mask::<f64>(0, 1.5f64.to_bits()), 1.5);
    assert!(reader.get_bool_field_mask(3, true));
}

#[test]
fn bool_list() {
    use crate::traits::FromPointerReader;

    // [true, false, true, false,
    //  true, true, true, false,
    //  false, true]

    let data = Word::words_to_bytes(&[
        word(0x01, 0x00, 0x00, 0x00, 0x51, 0x00, 0x00, 0x00),
        word(0x75, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);

    let pointer_reader = root(&data);

    let reader = pointer_reader.get_list(Some(ElementSize::Bit)).unwrap();

    assert_eq!(reader.len(), 10);
    let expected = [true, false, true, false, true, true, true, false, false, true];
    for (i, &value) in expected.iter().enumerate() {
        assert_eq!(bool::get(&reader, i as u32), value);
    }

    let reader = crate::primitive_list::Reader::<bool>::get_from_pointer(&pointer_reader).unwrap();

    assert_eq!(reader.len(), 10);
    assert_eq!(reader.iter().collect::<Vec<_>>(), expected);
}

#[test]
fn struct_list() {
    // A list of two {u16, text} structs: {7, "hi"} and {9, null}.
    let data = Word::words_to_bytes(&[
        word(0x01, 0x00, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00), // list, composite, 4 words
        word(0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00), // tag: 2 elements, (1, 1)
        word(0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x09, 0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00), // -> text "hi" at offset 2
        word(0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(b'h', b'i', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);

    let list = root(&data).get_list(None).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.get_element_size(), ElementSize::InlineComposite);

    let first = list.get_struct_element(0);
    assert_eq!(first.get_data_field::<u16>(0), 7);
    assert_eq!(first.get_pointer_field(0).get_text().unwrap(), "hi");

    let second = list.get_struct_element(1);
    assert_eq!(second.get_data_field::<u16>(0), 9);
    assert!(second.get_pointer_field(0).is_null());
    assert_eq!(second.get_pointer_field(0).get_text().unwrap(), "");

    assert_eq!(
        list.try_get_struct_element(2).unwrap_err().kind,
        ErrorKind::IndexOutOfRange { index: 2, len: 2 }
    );

    // Tag, two elements and the text.
    assert_eq!(root(&data).total_size().unwrap().word_count, 6);
}

#[test]
fn pointer_codec() {
    let size = StructSize::new(2, 3);
    let ptr = WirePointer::struct_pointer(5, size);
    assert_eq!(ptr.kind(), WirePointerKind::Struct);
    assert_eq!(ptr.offset(), 5);
    assert_eq!(ptr.struct_data_size(), 2);
    assert_eq!(ptr.struct_ptr_count(), 3);
    assert_eq!(ptr.raw(), 0x0003_0002_0000_0014);
    assert_eq!(
        ptr.decode(),
        PointerView::Struct { offset: 5, data_size: 2, ptrs_size: 3 }
    );

    let ptr = WirePointer::list_pointer(-3, ElementSize::FourBytes, 10);
    assert_eq!(ptr.kind(), WirePointerKind::List);
    assert_eq!(ptr.offset(), -3);
    assert_eq!(ptr.list_element_size(), ElementSize::FourBytes);
    assert_eq!(ptr.list_element_count(), 10);
    assert_eq!(ptr.target(80), 80 + 8 * (1 - 3));

    assert_eq!(WirePointer::NULL.decode(), PointerView::Null);
    assert_eq!(WirePointer::from_raw(2).decode(), PointerView::Far);
    assert_eq!(WirePointer::from_raw(3).decode(), PointerView::Other);

    let empty = WirePointer::empty_struct_pointer();
    assert!(!empty.is_null());
    assert_eq!(empty.offset(), -1);
    assert_eq!(empty.struct_word_size(), 0);

    let tag = WirePointer::inline_composite_tag(4, StructSize::new(1, 2));
    assert_eq!(tag.inline_composite_list_element_count(), 4);
    assert_eq!(tag.struct_size(), StructSize::new(1, 2));
}

#[test]
#[should_panic(expected = "does not fit in 30 bits")]
fn pointer_offset_overflow() {
    WirePointer::struct_pointer(1 << 29, StructSize::new(1, 0));
}

#[test]
fn out_of_bounds_struct() {
    // Claims a two-word body but only one word follows.
    let data = Word::words_to_bytes(&[
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);
    let err = root(&data).get_struct().err().unwrap();
    assert_eq!(
        err.kind,
        ErrorKind::OffsetOutOfBounds { position: 8, end: 24, available: 16 }
    );
}

#[test]
fn pointer_types() {
    let data = Word::words_to_bytes(&[
        word(0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x03, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00),
        word(0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);
    let far = PointerReader::get_root(&data, 0, 64).unwrap();
    assert_eq!(
        far.get_pointer_type().unwrap_err().kind,
        ErrorKind::MessageContainsFarPointer
    );
    assert_eq!(
        far.get_struct().err().unwrap().kind,
        ErrorKind::MessageContainsFarPointer
    );

    let cap = PointerReader::get_root(&data, 8, 64).unwrap();
    assert_eq!(cap.get_pointer_type().unwrap(), PointerType::Capability);
    assert_eq!(
        cap.get_list(None).err().unwrap().kind,
        ErrorKind::MessageContainsCapabilityPointer
    );

    let list = PointerReader::get_root(&data, 16, 64).unwrap();
    assert_eq!(list.get_pointer_type().unwrap(), PointerType::List);
    assert_eq!(
        list.get_struct().err().unwrap().kind,
        ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected
    );
}

#[test]
fn text_must_be_nul_terminated() {
    let data = Word::words_to_bytes(&[
        word(0x01, 0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00),
        word(b'a', b'b', b'c', 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);
    assert_eq!(
        root(&data).get_text().err().unwrap().kind,
        ErrorKind::MessageContainsTextThatIsNotNULTerminated
    );
    assert_eq!(root(&data).get_data().unwrap(), b"abc");
}

#[test]
fn nesting_limit() {
    // A struct whose only pointer points back at itself.
    let data = Word::words_to_bytes(&[
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00),
        word(0xfc, 0xff, 0xff, 0xff, 0x00, 0x00, 0x01, 0x00),
    ]);
    let mut reader = root(&data).get_struct().unwrap();
    for _ in 0..(DEFAULT_NESTING_LIMIT - 1) {
        reader = reader.get_pointer_field(0).get_struct().unwrap();
    }
    assert_eq!(
        reader.get_pointer_field(0).get_struct().err().unwrap().kind,
        ErrorKind::MessageIsTooDeeplyNested
    );

    let mut arena = BuilderArena::new(64);
    let pos = arena.allocate_words(1);
    assert_eq!(
        arena.copy_from(pos, root(&data), None).unwrap_err().kind,
        ErrorKind::MessageIsTooDeeplyNested
    );
}

#[test]
fn struct_reader_from_offset() {
    let data = Word::words_to_bytes(&[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00),
        word(0x2a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ]);
    let reader = StructReader::new(&data, 8, 1, 1).unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 42);
    assert!(reader.get_pointer_field(0).is_null());
    assert!(reader.get_pointer_field(1).is_null()); // past end of struct --> null
    assert_eq!(reader.get_data_section_as_blob(), &data[8..16]);
    assert!(StructReader::new(&data, 16, 1, 1).is_err());
}

#[test]
fn builder_round_trip() {
    let mut arena = BuilderArena::new(8);
    let root_pos = arena.allocate_words(1);
    let size = StructSize::new(1, 2);
    let body = arena.alloc_struct(root_pos, size);
    {
        let mut builder = crate::private::layout::StructBuilder::new(&mut arena, body, size);
        builder.set_data_field::<i32>(0, -7);
        builder.set_bool_field(32, true);
        builder.set_text_field(0, "abc");
        let mut list = builder.init_list_field(1, ElementSize::TwoBytes, 3);
        list.set::<u16>(0, 10);
        list.set::<u16>(2, 30);
        assert_eq!(list.get::<u16>(2), 30);
    }

    let bytes = arena.into_bytes();
    let reader = root(&bytes).get_struct().unwrap();
    assert_eq!(reader.get_data_field::<i32>(0), -7);
    assert!(reader.get_bool_field(32));
    assert_eq!(reader.get_pointer_field(0).get_text().unwrap(), "abc");
    let list = reader.get_pointer_field(1).get_list(Some(ElementSize::TwoBytes)).unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(u16::get(&list, 0), 10);
    assert_eq!(u16::get(&list, 1), 0);
    assert_eq!(u16::get(&list, 2), 30);
}
