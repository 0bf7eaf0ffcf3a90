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

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use capnp_flat::message;
use capnp_flat::schema::{Field, Type, Value};
use capnp_flat::structor::Structor;
use capnp_flat::{ElementSize, StructSize};

const POINT: StructSize = StructSize { data: 2, pointers: 1 };

fn points(count: u32) -> Vec<u8> {
    let mut message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(1, 2));
    root.set_data_field::<u64>(0, u64::from(count));
    {
        let mut list = root.init_struct_list_field(0, POINT, count);
        for i in 0..count {
            let mut point = list.get_struct_element(i);
            point.set_data_field::<i64>(0, i64::from(i));
            point.set_data_field::<i64>(1, -i64::from(i));
            point.set_text_field(0, "a point with a name");
        }
    }
    {
        let mut list = root.init_list_field(1, ElementSize::FourBytes, count);
        for i in 0..count {
            list.set::<u32>(i, i);
        }
    }
    message.into_bytes()
}

fn bench_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_message");
    for count in [1u32, 16, 256, 4096] {
        let buf = points(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &buf, |b, buf| {
            b.iter(|| message::copy_message(black_box(buf), 0).unwrap());
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let buf = points(256);
    c.bench_function("read_points", |b| {
        b.iter(|| {
            let reader = message::Reader::new(black_box(&buf[..]), Default::default());
            let root = reader.get_root_struct().unwrap();
            let list = root
                .get_pointer_field(0)
                .get_list(Some(ElementSize::InlineComposite))
                .unwrap();
            let mut sum = 0i64;
            for i in 0..list.len() {
                sum += list.get_struct_element(i).get_data_field::<i64>(0);
            }
            black_box(sum)
        });
    });
}

fn bench_construct(c: &mut Criterion) {
    let fields = vec![
        Field::new("x", 0, Type::Int64),
        Field::new("y", 1, Type::Int64),
        Field::new("name", 0, Type::Text),
    ];
    let structor = Structor::new("Point", 2, 1, fields, None).unwrap();
    c.bench_function("construct_point", |b| {
        b.iter(|| {
            structor
                .construct(&[
                    Value::Int64(black_box(1)),
                    Value::Int64(black_box(2)),
                    Value::from("origin"),
                ])
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_copy, bench_read, bench_construct);
criterion_main!(benches);
