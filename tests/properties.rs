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

use quickcheck::{quickcheck, TestResult};

use capnp_flat::message::{self, ReaderOptions};
use capnp_flat::private::arena::BuilderArena;
use capnp_flat::private::layout::{PointerView, WirePointer};
use capnp_flat::traits::FromPointerReader;
use capnp_flat::{struct_list, text_list, ElementSize, ErrorKind, StructSize};

const POINT: StructSize = StructSize { data: 2, pointers: 1 };

fn build(points: &[(i64, i64, String)], labels: &[String]) -> Vec<u8> {
    let mut message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(0, 2));
    {
        let mut list = root.init_struct_list_field(0, POINT, points.len() as u32);
        for (i, (x, y, name)) in points.iter().enumerate() {
            let mut point = list.get_struct_element(i as u32);
            point.set_data_field(0, *x);
            point.set_data_field(1, *y);
            point.set_text_field(0, name);
        }
    }
    {
        let mut list = root.init_list_field(1, ElementSize::Pointer, labels.len() as u32);
        for (i, label) in labels.iter().enumerate() {
            list.set_text_element(i as u32, label);
        }
    }
    message.into_bytes()
}

type Contents = (Vec<(i64, i64, String)>, Vec<String>);

fn read(buf: &[u8]) -> capnp_flat::Result<Contents> {
    let message = message::Reader::new(buf, ReaderOptions::new());
    let root = message.get_root_struct()?;
    let mut points = Vec::new();
    for point in struct_list::Reader::get_from_pointer(&root.get_pointer_field(0))?.iter() {
        points.push((
            point.get_data_field::<i64>(0),
            point.get_data_field::<i64>(1),
            point.get_pointer_field(0).get_text()?.to_string()?,
        ));
    }
    let mut labels = Vec::new();
    for label in text_list::Reader::get_from_pointer(&root.get_pointer_field(1))?.iter() {
        labels.push(label?.to_string()?);
    }
    Ok((points, labels))
}

#[test]
fn check_struct_pointer_round_trip() {
    fn round_trip(offset: i32, data: u16, pointers: u16) -> TestResult {
        let offset = offset % (1 << 29);
        if offset == 0 && data == 0 && pointers == 0 {
            // Indistinguishable from null.
            return TestResult::discard();
        }
        let ptr = WirePointer::struct_pointer(offset, StructSize::new(data, pointers));
        TestResult::from_bool(
            ptr.decode()
                == PointerView::Struct {
                    offset,
                    data_size: data,
                    ptrs_size: pointers,
                }
                && WirePointer::from_raw(ptr.raw()) == ptr,
        )
    }

    quickcheck(round_trip as fn(i32, u16, u16) -> TestResult);
}

#[test]
fn check_list_pointer_round_trip() {
    fn round_trip(offset: i32, tag: u8, count: u32) -> TestResult {
        let offset = offset % (1 << 29);
        let count = count % (1 << 29);
        let element_size = ElementSize::from(tag);
        let ptr = WirePointer::list_pointer(offset, element_size, count);
        TestResult::from_bool(
            ptr.decode()
                == PointerView::List {
                    offset,
                    element_size,
                    element_count: count,
                },
        )
    }

    quickcheck(round_trip as fn(i32, u8, u32) -> TestResult);
}

#[test]
fn check_allocations_survive_growth() {
    fn allocations(sizes: Vec<u8>) -> TestResult {
        let mut arena = BuilderArena::new(8);
        let mut written = Vec::new();
        let mut expected_end = 0;
        for (i, size) in sizes.iter().enumerate() {
            let words = usize::from(size % 16) + 1;
            let offset = arena.allocate_words(words);
            if offset != expected_end {
                return TestResult::failed();
            }
            expected_end += words * 8;
            arena.set::<u64>(offset, i as u64 + 1);
            written.push((offset, i as u64 + 1));
        }
        TestResult::from_bool(
            arena.len() == expected_end
                && written.iter().all(|&(offset, value)| arena.get::<u64>(offset) == value),
        )
    }

    quickcheck(allocations as fn(Vec<u8>) -> TestResult);
}

#[test]
fn check_copy_is_faithful() {
    fn copy(points: Vec<(i64, i64, String)>, labels: Vec<String>) -> TestResult {
        let buf = build(&points, &labels);
        let Ok(copy) = message::copy_message(&buf, 0) else {
            return TestResult::failed();
        };
        let Ok(again) = message::copy_message(&copy, 0) else {
            return TestResult::failed();
        };
        TestResult::from_bool(
            copy == again
                && copy.len() <= buf.len()
                && read(&buf).ok() == Some((points.clone(), labels.clone()))
                && read(&copy).ok() == Some((points, labels)),
        )
    }

    quickcheck(copy as fn(Vec<(i64, i64, String)>, Vec<String>) -> TestResult);
}

#[test]
fn check_truncated_copy_fails() {
    fn truncated(points: Vec<(i64, i64, String)>, labels: Vec<String>, cut: usize) -> TestResult {
        let Ok(buf) = message::copy_message(&build(&points, &labels), 0) else {
            return TestResult::failed();
        };
        let words = buf.len() / 8;
        let keep = 8 * (cut % words);
        match message::copy_message(&buf[..keep], 0) {
            Err(e) => TestResult::from_bool(matches!(
                e.kind,
                ErrorKind::OffsetOutOfBounds { available, .. } if available == keep
            )),
            Ok(_) => TestResult::failed(),
        }
    }

    quickcheck(truncated as fn(Vec<(i64, i64, String)>, Vec<String>, usize) -> TestResult);
}
