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

//! Layout-driven struct constructor.
//!
//! A [`Structor`] is computed once from a struct's field layout and then used to build
//! any number of instances from argument values, bound by position or by name.

use crate::private::arena::BuilderArena;
use crate::private::layout::{StructSize, DEFAULT_NESTING_LIMIT};
use crate::private::mask::Mask;
use crate::private::ReadLimiter;
use crate::private::units::{BITS_PER_BYTE, BITS_PER_WORD, BYTES_PER_POINTER, BYTES_PER_WORD};
use crate::schema::{Discriminant, Field, Type, Value};
use crate::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Void,
    Bit(usize),
    Bytes { offset: usize, width: usize },
    Pointer(usize),
}

#[derive(Clone, Debug)]
struct Slot {
    field: Field,
    location: Location,
    mask: u64,
}

pub struct Structor {
    name: String,
    size: StructSize,
    slots: Vec<Slot>,
    discriminant: Option<Discriminant>,
    format: String,
    unsupported: Option<String>,
}

fn format_char(typ: Type) -> char {
    match typ {
        Type::Int8 => 'b',
        Type::UInt8 => 'B',
        Type::Int16 => 'h',
        Type::UInt16 | Type::Enum => 'H',
        Type::Int32 => 'i',
        Type::UInt32 => 'I',
        Type::Int64 => 'q',
        Type::UInt64 => 'Q',
        Type::Float32 => 'f',
        Type::Float64 => 'd',
        _ => 'x',
    }
}

/// Tracks which bits of the data section and which pointers are taken.
struct Occupancy {
    bits: Vec<bool>,
    pointers: Vec<bool>,
}

impl Occupancy {
    fn claim_bits(&mut self, name: &str, start: usize, len: usize) -> Result<()> {
        match self.bits.get_mut(start..start + len) {
            Some(bits) if bits.iter().all(|taken| !taken) => {
                bits.iter_mut().for_each(|taken| *taken = true);
                Ok(())
            }
            _ => Err(overlap(name, start / BITS_PER_BYTE)),
        }
    }

    fn claim_pointer(&mut self, name: &str, index: usize) -> Result<()> {
        match self.pointers.get_mut(index) {
            Some(taken) if !*taken => {
                *taken = true;
                Ok(())
            }
            _ => {
                let mut err = Error::from_kind(ErrorKind::OverlappingFields);
                write!(err, "field {name} at pointer {index}");
                Err(err)
            }
        }
    }
}

fn overlap(name: &str, byte: usize) -> Error {
    let mut err = Error::from_kind(ErrorKind::OverlappingFields);
    write!(err, "field {name} at byte {byte}");
    err
}

impl Structor {
    /// Plans the layout of `fields` in a struct of `data_size` words of data and
    /// `ptrs_size` pointers. `discriminant`, if given, is written into every struct built.
    pub fn new(
        name: impl Into<String>,
        data_size: u16,
        ptrs_size: u16,
        fields: Vec<Field>,
        discriminant: Option<Discriminant>,
    ) -> Result<Self> {
        let name = name.into();
        let size = StructSize::new(data_size, ptrs_size);
        let data_bytes = usize::from(data_size) * BYTES_PER_WORD;
        let mut occupancy = Occupancy {
            bits: vec![false; usize::from(data_size) * BITS_PER_WORD],
            pointers: vec![false; usize::from(ptrs_size)],
        };
        // One entry per byte: the type starting there, `None` for padding, `Some(None)`
        // for bytes covered by a wider value.
        let mut layout: Vec<Option<Option<char>>> = vec![None; data_bytes];
        let mut unsupported = None;
        let mut slots = Vec::with_capacity(fields.len());

        for field in fields {
            let offset = field.offset as usize;
            let location = match field.typ {
                Type::Void => Location::Void,
                Type::Bool => {
                    occupancy.claim_bits(&field.name, offset, 1)?;
                    layout[offset / BITS_PER_BYTE].get_or_insert(Some('B'));
                    Location::Bit(offset)
                }
                typ if typ.is_pointer() => {
                    occupancy.claim_pointer(&field.name, offset)?;
                    if field.default.is_some() {
                        unsupported = Some(format!(
                            "default value for pointer field {}",
                            field.name
                        ));
                    }
                    Location::Pointer(offset)
                }
                typ => {
                    let (start, width) = field.byte_range().unwrap_or((0, 0));
                    occupancy.claim_bits(&field.name, start * BITS_PER_BYTE, width * BITS_PER_BYTE)?;
                    layout[start] = Some(Some(format_char(typ)));
                    for byte in &mut layout[start + 1..start + width] {
                        *byte = Some(None);
                    }
                    Location::Bytes { offset: start, width }
                }
            };
            let mask = field.default_bits()?;
            slots.push(Slot { field, location, mask });
        }

        if let Some(discriminant) = discriminant {
            let start = discriminant.byte_offset();
            occupancy.claim_bits("(discriminant)", start * BITS_PER_BYTE, 16)?;
            layout[start] = Some(Some('H'));
            layout[start + 1] = Some(None);
        }

        let format = layout
            .iter()
            .filter_map(|byte| match byte {
                None => Some('x'),
                Some(c) => *c,
            })
            .collect();

        Ok(Self {
            name,
            size,
            slots,
            discriminant,
            format,
            unsupported,
        })
    }

    /// A structor for a layout that cannot be built. Every construction fails with
    /// `Unimplemented`, carrying `reason`.
    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: StructSize::default(),
            slots: Vec::new(),
            discriminant: None,
            format: String::new(),
            unsupported: Some(reason.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn struct_size(&self) -> StructSize {
        self.size
    }

    /// The packed layout of the data section, one character per value in the style of
    /// Python's `struct` module. `x` is a byte of padding and `B` a byte of booleans.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn is_supported(&self) -> bool {
        self.unsupported.is_none()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.slots.iter().map(|slot| &slot.field)
    }

    fn check_supported(&self) -> Result<()> {
        match &self.unsupported {
            Some(reason) => Err(Error::unimplemented(reason.clone())),
            None => Ok(()),
        }
    }

    /// Pairs each slot with its argument. Positional arguments go to the fields in the
    /// order they were declared, skipping `Void` fields.
    fn bind<'a>(
        &self,
        positional: &[Value<'a>],
        named: &[(&str, Value<'a>)],
    ) -> Result<Vec<Option<Value<'a>>>> {
        let mut args = vec![None; self.slots.len()];

        let targets: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.location != Location::Void)
            .map(|(i, _)| i)
            .collect();
        if positional.len() > targets.len() {
            let mut err = Error::from_kind(ErrorKind::TooManyArguments);
            write!(
                err,
                "{} takes {} positional arguments but {} were given",
                self.name,
                targets.len(),
                positional.len()
            );
            return Err(err);
        }
        for (&i, value) in targets.iter().zip(positional) {
            args[i] = Some(*value);
        }

        for (name, value) in named {
            let Some(i) = self.slots.iter().position(|slot| slot.field.name == *name) else {
                let mut err = Error::from_kind(ErrorKind::FieldNotFound);
                write!(err, "{}.{name}", self.name);
                return Err(err);
            };
            if args[i].is_some() {
                let mut err = Error::from_kind(ErrorKind::DuplicateArgument);
                write!(err, "{}.{name}", self.name);
                return Err(err);
            }
            args[i] = Some(*value);
        }

        Ok(args)
    }

    fn write(&self, arena: &mut BuilderArena, body: usize, args: &[Option<Value>]) -> Result<()> {
        let pointers = body + usize::from(self.size.data) * BYTES_PER_WORD;
        let limiter = ReadLimiter::new(None);

        for (slot, arg) in self.slots.iter().zip(args) {
            let Some(value) = arg else { continue };
            let typ = slot.field.typ;
            match slot.location {
                Location::Void => (),
                Location::Bit(bit) => {
                    let bit_value = value.to_bits(typ)? != 0;
                    arena.set_bool(
                        body + bit / BITS_PER_BYTE,
                        bit % BITS_PER_BYTE,
                        bit_value.mask(slot.mask),
                    );
                }
                Location::Bytes { offset, width } => {
                    let bits = value.to_bits(typ)? ^ slot.mask;
                    let position = body + offset;
                    match width {
                        1 => arena.set::<u8>(position, bits as u8),
                        2 => arena.set::<u16>(position, bits as u16),
                        4 => arena.set::<u32>(position, bits as u32),
                        _ => arena.set::<u64>(position, bits),
                    }
                }
                Location::Pointer(index) => {
                    let position = pointers + index * BYTES_PER_POINTER;
                    match (typ, value) {
                        (Type::Text | Type::AnyPointer, Value::Text(text)) => {
                            arena.alloc_text(position, text.as_bytes());
                        }
                        (Type::Data | Type::AnyPointer, Value::Data(data)) => {
                            arena.alloc_data(position, data);
                        }
                        (Type::Struct | Type::AnyPointer, Value::Struct(reader)) => {
                            arena.copy_struct_from(position, reader, &limiter, DEFAULT_NESTING_LIMIT)?;
                        }
                        (Type::List(_) | Type::AnyPointer, Value::List(reader)) => {
                            arena.copy_list_from(position, reader, &limiter, DEFAULT_NESTING_LIMIT)?;
                        }
                        (Type::AnyPointer, Value::AnyPointer(reader)) => {
                            arena.copy_from(position, reader.into_pointer_reader(), None)?;
                        }
                        (_, Value::Void) => (),
                        _ => {
                            let mut err = Error::from_kind(ErrorKind::TypeMismatch);
                            write!(err, "{value:?} for field {} of type {typ:?}", slot.field.name);
                            return Err(err);
                        }
                    }
                }
            }
        }

        if let Some(discriminant) = self.discriminant {
            arena.set::<u16>(body + discriminant.byte_offset(), discriminant.value);
        }
        Ok(())
    }

    /// Builds a struct from positional arguments. See [`Structor::construct_with`].
    pub fn construct(&self, positional: &[Value]) -> Result<Vec<u8>> {
        self.construct_with(positional, &[])
    }

    /// Builds a struct. The result starts with the struct itself (data section, then
    /// pointer section) followed by the objects its pointers refer to. Fields without an
    /// argument hold their default.
    pub fn construct_with(&self, positional: &[Value], named: &[(&str, Value)]) -> Result<Vec<u8>> {
        self.check_supported()?;
        let args = self.bind(positional, named)?;
        let mut arena = BuilderArena::new(self.size.total() as usize * BYTES_PER_WORD);
        let body = arena.allocate_words(self.size.total() as usize);
        self.write(&mut arena, body, &args)?;
        Ok(arena.into_bytes())
    }

    /// Like [`Structor::construct_with`], but the result is a message: a root pointer
    /// followed by the struct.
    pub fn construct_message(
        &self,
        positional: &[Value],
        named: &[(&str, Value)],
    ) -> Result<Vec<u8>> {
        self.check_supported()?;
        let args = self.bind(positional, named)?;
        let mut arena = BuilderArena::new((self.size.total() as usize + 1) * BYTES_PER_WORD);
        let root = arena.allocate_words(1);
        let body = arena.alloc_struct(root, self.size);
        self.write(&mut arena, body, &args)?;
        Ok(arena.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::Structor;
    use crate::schema::{Discriminant, Field, Type, Value};
    use crate::ErrorKind;

    #[test]
    fn compute_format_simple() {
        let fields = vec![Field::new("x", 0, Type::Int64), Field::new("y", 1, Type::Int64)];
        let s = Structor::new("fake", 2, 0, fields, None).unwrap();
        assert_eq!(s.format(), "qq");
    }

    #[test]
    fn compute_format_holes() {
        let fields = vec![Field::new("x", 0, Type::Int32), Field::new("y", 1, Type::Int64)];
        let s = Structor::new("fake", 2, 0, fields, None).unwrap();
        assert_eq!(s.format(), "ixxxxq");
    }

    #[test]
    fn compute_format_mixed() {
        let fields = vec![
            Field::new("flag", 3, Type::Bool),
            Field::new("small", 1, Type::UInt8),
            Field::new("kind", 1, Type::Enum),
            Field::new("ratio", 1, Type::Float32),
            Field::new("name", 0, Type::Text),
        ];
        let s = Structor::new("fake", 2, 1, fields, Some(Discriminant::new(4, 0))).unwrap();
        assert_eq!(s.format(), "BBHfHxxxxxx");
    }

    #[test]
    fn overlapping_fields() {
        let fields = vec![Field::new("x", 0, Type::Int64), Field::new("y", 1, Type::Int32)];
        let err = Structor::new("fake", 1, 0, fields, None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::OverlappingFields);

        let fields = vec![Field::new("x", 1, Type::Int64)];
        let err = Structor::new("fake", 1, 0, fields, None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::OverlappingFields);

        let fields = vec![Field::new("t", 0, Type::Text), Field::new("d", 0, Type::Data)];
        let err = Structor::new("fake", 0, 1, fields, None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::OverlappingFields);

        let fields = vec![Field::new("x", 0, Type::Int16)];
        let err = Structor::new("fake", 1, 0, fields, Some(Discriminant::new(0, 1)))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::OverlappingFields);
    }

    #[test]
    fn unsupported() {
        let ctor = Structor::unsupported("ctor", "fake");
        assert!(!ctor.is_supported());
        let err = ctor.construct(&[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unimplemented);
        assert_eq!(err.extra, "fake");

        let fields = vec![Field::new("t", 0, Type::Text).with_default(Value::Text("x".into()))];
        let ctor = Structor::new("ctor", 0, 1, fields, None).unwrap();
        assert_eq!(
            ctor.construct(&[Value::from("y")]).unwrap_err().kind,
            ErrorKind::Unimplemented
        );
    }

    #[test]
    fn argument_errors() {
        let fields = vec![Field::new("x", 0, Type::Int64), Field::new("y", 1, Type::Int64)];
        let ctor = Structor::new("ctor", 2, 0, fields, None).unwrap();
        let one = Value::Int64(1);
        assert_eq!(
            ctor.construct(&[one, one, one]).unwrap_err().kind,
            ErrorKind::TooManyArguments
        );
        assert_eq!(
            ctor.construct_with(&[one], &[("x", one)]).unwrap_err().kind,
            ErrorKind::DuplicateArgument
        );
        assert_eq!(
            ctor.construct_with(&[], &[("z", one)]).unwrap_err().kind,
            ErrorKind::FieldNotFound
        );
        assert_eq!(
            ctor.construct(&[Value::Int32(1)]).unwrap_err().kind,
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn void_fields_do_not_count_as_positional() {
        let fields = vec![
            Field::new("x", 0, Type::Int64),
            Field::new("nothing", 0, Type::Void),
            Field::new("y", 1, Type::Int64),
        ];
        let ctor = Structor::new("ctor", 2, 0, fields, None).unwrap();
        let one = Value::Int64(1);
        let err = ctor.construct(&[one, one, one]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooManyArguments);
        assert_eq!(err.extra, "ctor takes 2 positional arguments but 3 were given");
        assert!(ctor.construct(&[one, one]).is_ok());
    }
}
