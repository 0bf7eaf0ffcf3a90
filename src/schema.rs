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

//! Field layouts, as produced ahead of time by a schema compiler, and reading fields
//! through them.
//!
//! A [`Field`] names a slot of a struct and says where it lives: data fields are
//! addressed in units of their own width (bits for `Bool`), pointer fields by their index
//! in the pointer section. Defaults are XOR-ed into the stored value, so a field that
//! holds its default is encoded as zero and a field that is missing altogether reads as
//! its default.

use crate::any_pointer;
use crate::private::layout::{ElementSize, ListReader, StructReader};
use crate::private::units::BITS_PER_BYTE;
use crate::{text, Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Enum,
    Text,
    Data,
    Struct,
    List(ElementSize),
    AnyPointer,
}

impl Type {
    /// Width in the data section, or `None` for types stored in the pointer section.
    pub fn data_bits(self) -> Option<u32> {
        match self {
            Self::Void => Some(0),
            Self::Bool => Some(1),
            Self::Int8 | Self::UInt8 => Some(8),
            Self::Int16 | Self::UInt16 | Self::Enum => Some(16),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(32),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(64),
            Self::Text | Self::Data | Self::Struct | Self::List(_) | Self::AnyPointer => None,
        }
    }

    pub fn is_pointer(self) -> bool {
        self.data_bits().is_none()
    }
}

/// A field value, borrowed from a message or supplied by the caller.
#[derive(Clone, Copy)]
pub enum Value<'a> {
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Enum(u16),
    Text(text::Reader<'a>),
    Data(&'a [u8]),
    Struct(StructReader<'a>),
    List(ListReader<'a>),
    AnyPointer(any_pointer::Reader<'a>),
}

fn type_mismatch(typ: Type, value: &Value) -> Error {
    let mut err = Error::from_kind(ErrorKind::TypeMismatch);
    write!(err, "{value:?} is not a value of type {typ:?}");
    err
}

impl<'a> Value<'a> {
    /// The raw bits of a data value of type `typ`, zero-extended to 64 bits.
    pub fn to_bits(&self, typ: Type) -> Result<u64> {
        Ok(match (typ, *self) {
            (Type::Void, _) => 0,
            (Type::Bool, Value::Bool(v)) => u64::from(v),
            (Type::Int8, Value::Int8(v)) => u64::from(v as u8),
            (Type::Int16, Value::Int16(v)) => u64::from(v as u16),
            (Type::Int32, Value::Int32(v)) => u64::from(v as u32),
            (Type::Int64, Value::Int64(v)) => v as u64,
            (Type::UInt8, Value::UInt8(v)) => u64::from(v),
            (Type::UInt16, Value::UInt16(v)) => u64::from(v),
            (Type::UInt32, Value::UInt32(v)) => u64::from(v),
            (Type::UInt64, Value::UInt64(v)) => v,
            (Type::Float32, Value::Float32(v)) => u64::from(v.to_bits()),
            (Type::Float64, Value::Float64(v)) => v.to_bits(),
            (Type::Enum, Value::Enum(v) | Value::UInt16(v)) => u64::from(v),
            (typ, value) => return Err(type_mismatch(typ, &value)),
        })
    }

    /// Inverse of [`Value::to_bits`] for data types. Pointer types yield `Void`.
    pub fn from_bits(typ: Type, bits: u64) -> Value<'static> {
        match typ {
            Type::Bool => Value::Bool(bits & 1 != 0),
            Type::Int8 => Value::Int8(bits as u8 as i8),
            Type::Int16 => Value::Int16(bits as u16 as i16),
            Type::Int32 => Value::Int32(bits as u32 as i32),
            Type::Int64 => Value::Int64(bits as i64),
            Type::UInt8 => Value::UInt8(bits as u8),
            Type::UInt16 => Value::UInt16(bits as u16),
            Type::UInt32 => Value::UInt32(bits as u32),
            Type::UInt64 => Value::UInt64(bits),
            Type::Float32 => Value::Float32(f32::from_bits(bits as u32)),
            Type::Float64 => Value::Float64(f64::from_bits(bits)),
            Type::Enum => Value::Enum(bits as u16),
            _ => Value::Void,
        }
    }

    pub fn as_struct(&self) -> Option<StructReader<'a>> {
        match self {
            Value::Struct(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListReader<'a>> {
        match self {
            Value::List(l) => Some(*l),
            _ => None,
        }
    }
}

impl core::fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int8(v) => write!(f, "Int8({v})"),
            Value::Int16(v) => write!(f, "Int16({v})"),
            Value::Int32(v) => write!(f, "Int32({v})"),
            Value::Int64(v) => write!(f, "Int64({v})"),
            Value::UInt8(v) => write!(f, "UInt8({v})"),
            Value::UInt16(v) => write!(f, "UInt16({v})"),
            Value::UInt32(v) => write!(f, "UInt32({v})"),
            Value::UInt64(v) => write!(f, "UInt64({v})"),
            Value::Float32(v) => write!(f, "Float32({v})"),
            Value::Float64(v) => write!(f, "Float64({v})"),
            Value::Enum(v) => write!(f, "Enum({v})"),
            Value::Text(v) => write!(f, "Text({v:?})"),
            Value::Data(v) => write!(f, "Data({v:?})"),
            Value::Struct(s) => write!(f, "Struct(@{})", s.offset()),
            Value::List(l) => write!(f, "List(@{}, len {})", l.offset(), l.len()),
            Value::AnyPointer(p) => write!(f, "AnyPointer(null: {})", p.is_null()),
        }
    }
}

/// Scalars and blobs compare by value. Structs and lists compare by location: two
/// readers are equal when they view the same bytes of the same segment.
impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::UInt8(a), Value::UInt8(b)) => a == b,
            (Value::UInt16(a), Value::UInt16(b)) => a == b,
            (Value::UInt32(a), Value::UInt32(b)) => a == b,
            (Value::UInt64(a), Value::UInt64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => {
                core::ptr::eq(a.segment(), b.segment())
                    && a.offset() == b.offset()
                    && a.struct_size() == b.struct_size()
            }
            (Value::List(a), Value::List(b)) => {
                core::ptr::eq(a.segment(), b.segment())
                    && a.offset() == b.offset()
                    && a.len() == b.len()
                    && a.get_element_size() == b.get_element_size()
            }
            _ => false,
        }
    }
}

macro_rules! value_from(
    ($typ:ty, $variant:ident) => (
        impl From<$typ> for Value<'_> {
            fn from(value: $typ) -> Self {
                Value::$variant(value)
            }
        }
        );
    );

value_from!(bool, Bool);
value_from!(i8, Int8);
value_from!(i16, Int16);
value_from!(i32, Int32);
value_from!(i64, Int64);
value_from!(u8, UInt8);
value_from!(u16, UInt16);
value_from!(u32, UInt32);
value_from!(u64, UInt64);
value_from!(f32, Float32);
value_from!(f64, Float64);

impl<'a> From<&'a str> for Value<'a> {
    fn from(value: &'a str) -> Self {
        Value::Text(value.into())
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(value: &'a [u8]) -> Self {
        Value::Data(value)
    }
}

impl<'a> From<StructReader<'a>> for Value<'a> {
    fn from(value: StructReader<'a>) -> Self {
        Value::Struct(value)
    }
}

/// One slot of a struct layout.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    /// In units of the field's width for data fields, bits for `Bool`, the pointer index
    /// for pointer fields. Ignored for `Void`.
    pub offset: u32,
    pub typ: Type,
    pub default: Option<Value<'static>>,
    /// Set for members of a union: the discriminant value that selects this field.
    pub discriminant_value: Option<u16>,
}

impl Field {
    pub fn new(name: impl Into<String>, offset: u32, typ: Type) -> Self {
        Self {
            name: name.into(),
            offset,
            typ,
            default: None,
            discriminant_value: None,
        }
    }

    pub fn with_default(mut self, default: Value<'static>) -> Self {
        self.default = Some(default);
        self
    }

    pub fn in_union(mut self, discriminant_value: u16) -> Self {
        self.discriminant_value = Some(discriminant_value);
        self
    }

    /// The bits that a stored value is XOR-ed with.
    pub fn default_bits(&self) -> Result<u64> {
        match (&self.default, self.typ.is_pointer()) {
            (None, _) => Ok(0),
            (Some(default), false) => default.to_bits(self.typ),
            (Some(_), true) => Ok(0),
        }
    }

    /// Byte offset of a data field within the data section, and its width in bytes.
    /// `None` for `Void`, `Bool` and pointer fields.
    pub fn byte_range(&self) -> Option<(usize, usize)> {
        match self.typ.data_bits() {
            Some(bits) if bits >= 8 => {
                let width = bits as usize / BITS_PER_BYTE;
                Some((self.offset as usize * width, width))
            }
            _ => None,
        }
    }
}

/// Location of a union's discriminant, in units of 16 bits, and the value that selects
/// a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discriminant {
    pub offset: u32,
    pub value: u16,
}

impl Discriminant {
    pub fn new(offset: u32, value: u16) -> Self {
        Self { offset, value }
    }

    pub fn byte_offset(&self) -> usize {
        self.offset as usize * 2
    }
}

impl<'a> StructReader<'a> {
    /// Reads `field`, applying its default. Fields beyond the end of a short struct read
    /// as their default.
    pub fn read_field(&self, field: &Field) -> Result<Value<'a>> {
        let offset = field.offset as usize;
        let mask = field.default_bits()?;
        let value = match field.typ {
            Type::Void => Value::Void,
            Type::Bool => Value::Bool(self.get_bool_field_mask(offset, mask != 0)),
            Type::Int8 | Type::UInt8 => {
                Value::from_bits(field.typ, u64::from(self.get_data_field_mask::<u8>(offset, mask)))
            }
            Type::Int16 | Type::UInt16 | Type::Enum => Value::from_bits(
                field.typ,
                u64::from(self.get_data_field_mask::<u16>(offset, mask)),
            ),
            Type::Int32 | Type::UInt32 | Type::Float32 => Value::from_bits(
                field.typ,
                u64::from(self.get_data_field_mask::<u32>(offset, mask)),
            ),
            Type::Int64 | Type::UInt64 | Type::Float64 => {
                Value::from_bits(field.typ, self.get_data_field_mask::<u64>(offset, mask))
            }
            Type::Text => {
                let pointer = self.get_pointer_field(offset);
                match field.default {
                    Some(Value::Text(default)) if pointer.is_null() => Value::Text(default),
                    _ => Value::Text(pointer.get_text()?),
                }
            }
            Type::Data => {
                let pointer = self.get_pointer_field(offset);
                match field.default {
                    Some(Value::Data(default)) if pointer.is_null() => Value::Data(default),
                    _ => Value::Data(pointer.get_data()?),
                }
            }
            Type::Struct => Value::Struct(self.get_pointer_field(offset).get_struct()?),
            Type::List(element_size) => {
                Value::List(self.get_pointer_field(offset).get_list(Some(element_size))?)
            }
            Type::AnyPointer => {
                Value::AnyPointer(any_pointer::Reader::new(self.get_pointer_field(offset)))
            }
        };
        Ok(value)
    }

    /// Reads the field called `name`.
    pub fn read_field_by_name(&self, fields: &[Field], name: &str) -> Result<Value<'a>> {
        match fields.iter().find(|f| f.name == name) {
            Some(field) => self.read_field(field),
            None => {
                let mut err = Error::from_kind(ErrorKind::FieldNotFound);
                write!(err, "{name}");
                Err(err)
            }
        }
    }

    /// True if `field` is not a union member, or is the member `discriminant` selects.
    pub fn is_active(&self, field: &Field, discriminant: &Discriminant) -> bool {
        match field.discriminant_value {
            None => true,
            Some(value) => self.which(discriminant.offset as usize) == value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Discriminant, Field, Type, Value};
    use crate::private::layout::{ElementSize, StructReader};
    use crate::{word, ErrorKind, Word};

    #[test]
    fn defaults_are_masked() {
        let data = Word::words_to_bytes(&[
            word(0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
            word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        ]);
        let reader = StructReader::new(&data, 0, 1, 1).unwrap();

        let plain = Field::new("plain", 0, Type::Int32);
        let with_default = Field::new("d", 0, Type::Int32).with_default(Value::Int32(5));
        let zero = Field::new("zero", 1, Type::Int32).with_default(Value::Int32(-3));
        let missing = Field::new("missing", 3, Type::Float64).with_default(Value::Float64(2.5));
        let flag = Field::new("flag", 33, Type::Bool).with_default(Value::Bool(true));

        assert_eq!(reader.read_field(&plain).unwrap(), Value::Int32(5));
        assert_eq!(reader.read_field(&with_default).unwrap(), Value::Int32(0));
        assert_eq!(reader.read_field(&zero).unwrap(), Value::Int32(-3));
        assert_eq!(reader.read_field(&missing).unwrap(), Value::Float64(2.5));
        assert_eq!(reader.read_field(&flag).unwrap(), Value::Bool(true));
    }

    #[test]
    fn pointer_fields() {
        let data = Word::words_to_bytes(&[
            word(0x05, 0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00), // "hi"
            word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
            word(b'h', b'i', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        ]);
        let reader = StructReader::new(&data, 0, 0, 2).unwrap();
        let fields = [
            Field::new("name", 0, Type::Text),
            Field::new("nick", 1, Type::Text).with_default(Value::Text("anon".into())),
            Field::new("items", 1, Type::List(ElementSize::FourBytes)),
        ];

        assert_eq!(
            reader.read_field_by_name(&fields, "name").unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            reader.read_field_by_name(&fields, "nick").unwrap(),
            Value::from("anon")
        );
        match reader.read_field_by_name(&fields, "items").unwrap() {
            Value::List(list) => assert!(list.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            reader.read_field_by_name(&fields, "age").unwrap_err().kind,
            ErrorKind::FieldNotFound
        );
    }

    #[test]
    fn type_mismatch() {
        let err = Value::Int64(1).to_bits(Type::Int32).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(Value::UInt16(3).to_bits(Type::Enum).unwrap(), 3);
        assert_eq!(Value::Int8(-1).to_bits(Type::Int8).unwrap(), 0xff);
    }

    #[test]
    fn union_members() {
        let data = Word::words_to_bytes(&[
            word(0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
            word(0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
            word(0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        ]);
        let reader = StructReader::new(&data, 0, 3, 0).unwrap();
        let tag = Discriminant::new(8, 0);
        let circle = Field::new("circle", 1, Type::Int64).in_union(0);
        let square = Field::new("square", 1, Type::Int64).in_union(1);
        assert_eq!(reader.which(tag.offset as usize), 1);
        assert!(!reader.is_active(&circle, &tag));
        assert!(reader.is_active(&square, &tag));
        assert_eq!(tag.byte_offset(), 16);
    }
}
