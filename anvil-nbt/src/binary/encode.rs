use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::Result;
use crate::tag::Tag;
use crate::{Compound, List, Value};

/// Encodes a named root compound as uncompressed NBT binary data.
///
/// Typically the empty string `""` is used for `root_name`.
pub fn to_binary<W: Write>(comp: &Compound, writer: &mut W, root_name: &str) -> Result<()> {
    let mut state = Encoder { writer };
    state.write_tag(Tag::Compound)?;
    state.write_string(root_name)?;
    state.write_compound(comp)?;
    Ok(())
}

struct Encoder<'w, W> {
    writer: &'w mut W,
}

impl<'w, W: Write> Encoder<'w, W> {
    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        let byte = match tag {
            Tag::End => 0,
            Tag::Byte => 1,
            Tag::Short => 2,
            Tag::Int => 3,
            Tag::Long => 4,
            Tag::Float => 5,
            Tag::Double => 6,
            Tag::ByteArray => 7,
            Tag::String => 8,
            Tag::List => 9,
            Tag::Compound => 10,
            Tag::IntArray => 11,
            Tag::LongArray => 12,
        };
        Ok(self.writer.write_u8(byte)?)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = cesu8::to_java_cesu8(s);
        self.writer.write_u16::<BigEndian>(bytes.len() as u16)?;
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Byte(v) => self.writer.write_i8(*v)?,
            Value::Short(v) => self.writer.write_i16::<BigEndian>(*v)?,
            Value::Int(v) => self.writer.write_i32::<BigEndian>(*v)?,
            Value::Long(v) => self.writer.write_i64::<BigEndian>(*v)?,
            Value::Float(v) => self.writer.write_f32::<BigEndian>(*v)?,
            Value::Double(v) => self.writer.write_f64::<BigEndian>(*v)?,
            Value::ByteArray(v) => self.write_byte_array(v)?,
            Value::String(v) => self.write_string(v)?,
            Value::List(v) => self.write_any_list(v)?,
            Value::Compound(v) => self.write_compound(v)?,
            Value::IntArray(v) => self.write_int_array(v)?,
            Value::LongArray(v) => self.write_long_array(v)?,
        }
        Ok(())
    }

    fn write_byte_array(&mut self, v: &[i8]) -> Result<()> {
        self.writer.write_i32::<BigEndian>(v.len() as i32)?;
        for b in v {
            self.writer.write_i8(*b)?;
        }
        Ok(())
    }

    fn write_int_array(&mut self, v: &[i32]) -> Result<()> {
        self.writer.write_i32::<BigEndian>(v.len() as i32)?;
        for i in v {
            self.writer.write_i32::<BigEndian>(*i)?;
        }
        Ok(())
    }

    fn write_long_array(&mut self, v: &[i64]) -> Result<()> {
        self.writer.write_i32::<BigEndian>(v.len() as i32)?;
        for l in v {
            self.writer.write_i64::<BigEndian>(*l)?;
        }
        Ok(())
    }

    fn write_compound(&mut self, comp: &Compound) -> Result<()> {
        for (key, value) in comp.iter() {
            self.write_tag(value.tag())?;
            self.write_string(key)?;
            self.write_value(value)?;
        }
        self.write_tag(Tag::End)
    }

    fn write_any_list(&mut self, list: &List) -> Result<()> {
        self.write_tag(list.element_tag())?;
        self.writer.write_i32::<BigEndian>(list.len() as i32)?;
        match list {
            List::End => {}
            List::Byte(v) => v.iter().try_for_each(|x| Ok(self.writer.write_i8(*x)?))?,
            List::Short(v) => v
                .iter()
                .try_for_each(|x| Ok(self.writer.write_i16::<BigEndian>(*x)?))?,
            List::Int(v) => v
                .iter()
                .try_for_each(|x| Ok(self.writer.write_i32::<BigEndian>(*x)?))?,
            List::Long(v) => v
                .iter()
                .try_for_each(|x| Ok(self.writer.write_i64::<BigEndian>(*x)?))?,
            List::Float(v) => v
                .iter()
                .try_for_each(|x| Ok(self.writer.write_f32::<BigEndian>(*x)?))?,
            List::Double(v) => v
                .iter()
                .try_for_each(|x| Ok(self.writer.write_f64::<BigEndian>(*x)?))?,
            List::ByteArray(v) => v.iter().try_for_each(|x| self.write_byte_array(x))?,
            List::String(v) => v.iter().try_for_each(|x| self.write_string(x))?,
            List::List(v) => v.iter().try_for_each(|x| self.write_any_list(x))?,
            List::Compound(v) => v.iter().try_for_each(|x| self.write_compound(x))?,
            List::IntArray(v) => v.iter().try_for_each(|x| self.write_int_array(x))?,
            List::LongArray(v) => v.iter().try_for_each(|x| self.write_long_array(x))?,
        }
        Ok(())
    }
}
