use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::tag::Tag;
use crate::{Compound, List, Value};

/// Maximum recursion depth to prevent overflowing the call stack on
/// maliciously deep input.
const MAX_DEPTH: usize = 512;

/// Decodes an NBT value from the given reader.
///
/// Returns the root name and root value. If the first tag read is
/// `TAG_End`, `None` is returned.
pub fn from_binary<R: Read>(reader: &mut R) -> Result<Option<(String, Value)>> {
    let mut state = Decoder { reader, depth: 0 };

    let tag = state.read_tag()?;
    if tag == Tag::End {
        return Ok(None);
    }

    let name = state.read_string()?;
    let value = state.read_value(tag)?;

    Ok(Some((name, value)))
}

struct Decoder<'r, R> {
    reader: &'r mut R,
    depth: usize,
}

impl<'r, R: Read> Decoder<'r, R> {
    fn check_depth<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::malformed("reached maximum recursion depth"));
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    fn read_tag(&mut self) -> Result<Tag> {
        match self.reader.read_u8()? {
            0 => Ok(Tag::End),
            1 => Ok(Tag::Byte),
            2 => Ok(Tag::Short),
            3 => Ok(Tag::Int),
            4 => Ok(Tag::Long),
            5 => Ok(Tag::Float),
            6 => Ok(Tag::Double),
            7 => Ok(Tag::ByteArray),
            8 => Ok(Tag::String),
            9 => Ok(Tag::List),
            10 => Ok(Tag::Compound),
            11 => Ok(Tag::IntArray),
            12 => Ok(Tag::LongArray),
            byte => Err(Error::malformed(format!("invalid tag byte of {byte:#x}"))),
        }
    }

    fn read_value(&mut self, tag: Tag) -> Result<Value> {
        Ok(match tag {
            Tag::End => return Err(Error::malformed("cannot read value of TAG_End")),
            Tag::Byte => Value::Byte(self.reader.read_i8()?),
            Tag::Short => Value::Short(self.reader.read_i16::<BigEndian>()?),
            Tag::Int => Value::Int(self.reader.read_i32::<BigEndian>()?),
            Tag::Long => Value::Long(self.reader.read_i64::<BigEndian>()?),
            Tag::Float => Value::Float(self.reader.read_f32::<BigEndian>()?),
            Tag::Double => Value::Double(self.reader.read_f64::<BigEndian>()?),
            Tag::ByteArray => Value::ByteArray(self.read_byte_array()?),
            Tag::String => Value::String(self.read_string()?),
            Tag::List => self.check_depth(|st| st.read_any_list())?.into(),
            Tag::Compound => Value::Compound(self.check_depth(|st| st.read_compound())?),
            Tag::IntArray => Value::IntArray(self.read_int_array()?),
            Tag::LongArray => Value::LongArray(self.read_long_array()?),
        })
    }

    fn read_byte_array(&mut self) -> Result<Vec<i8>> {
        let len = self.reader.read_i32::<BigEndian>()?;
        if len.is_negative() {
            return Err(Error::malformed(format!(
                "negative byte array length of {len}"
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact(&mut buf)?;
        // SAFETY-free reinterpret: i8 and u8 have the same layout.
        Ok(buf.into_iter().map(|b| b as i8).collect())
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.reader.read_u16::<BigEndian>()? as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        cesu8::from_java_cesu8(&buf)
            .map(|s| s.into_owned())
            .map_err(|_| Error::malformed("could not decode modified UTF-8 string"))
    }

    fn read_any_list(&mut self) -> Result<List> {
        match self.read_tag()? {
            Tag::End => match self.reader.read_i32::<BigEndian>()? {
                0 => Ok(List::End),
                len => Err(Error::malformed(format!(
                    "TAG_End list with nonzero length of {len}"
                ))),
            },
            Tag::Byte => Ok(List::Byte(self.read_list(|st| Ok(st.reader.read_i8()?))?)),
            Tag::Short => Ok(List::Short(
                self.read_list(|st| Ok(st.reader.read_i16::<BigEndian>()?))?,
            )),
            Tag::Int => Ok(List::Int(
                self.read_list(|st| Ok(st.reader.read_i32::<BigEndian>()?))?,
            )),
            Tag::Long => Ok(List::Long(
                self.read_list(|st| Ok(st.reader.read_i64::<BigEndian>()?))?,
            )),
            Tag::Float => Ok(List::Float(
                self.read_list(|st| Ok(st.reader.read_f32::<BigEndian>()?))?,
            )),
            Tag::Double => Ok(List::Double(
                self.read_list(|st| Ok(st.reader.read_f64::<BigEndian>()?))?,
            )),
            Tag::ByteArray => Ok(List::ByteArray(self.read_list(|st| st.read_byte_array())?)),
            Tag::String => Ok(List::String(self.read_list(|st| st.read_string())?)),
            Tag::List => {
                self.check_depth(|st| Ok(List::List(st.read_list(|st| st.read_any_list())?)))
            }
            Tag::Compound => {
                self.check_depth(|st| Ok(List::Compound(st.read_list(|st| st.read_compound())?)))
            }
            Tag::IntArray => Ok(List::IntArray(self.read_list(|st| st.read_int_array())?)),
            Tag::LongArray => Ok(List::LongArray(self.read_list(|st| st.read_long_array())?)),
        }
    }

    fn read_list<T>(&mut self, mut read_elem: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.reader.read_i32::<BigEndian>()?;
        if len.is_negative() {
            return Err(Error::malformed(format!("negative list length of {len}")));
        }
        let mut list = Vec::with_capacity((len as usize).min(4096));
        for _ in 0..len {
            list.push(read_elem(self)?);
        }
        Ok(list)
    }

    fn read_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::new();
        loop {
            let tag = self.read_tag()?;
            if tag == Tag::End {
                return Ok(compound);
            }
            let name = self.read_string()?;
            let value = self.read_value(tag)?;
            compound.insert(name, value);
        }
    }

    fn read_int_array(&mut self) -> Result<Vec<i32>> {
        let len = self.reader.read_i32::<BigEndian>()?;
        if len.is_negative() {
            return Err(Error::malformed(format!(
                "negative int array length of {len}"
            )));
        }
        let mut array = Vec::with_capacity((len as usize).min(4096));
        for _ in 0..len {
            array.push(self.reader.read_i32::<BigEndian>()?);
        }
        Ok(array)
    }

    fn read_long_array(&mut self) -> Result<Vec<i64>> {
        let len = self.reader.read_i32::<BigEndian>()?;
        if len.is_negative() {
            return Err(Error::malformed(format!(
                "negative long array length of {len}"
            )));
        }
        let mut array = Vec::with_capacity((len as usize).min(4096));
        for _ in 0..len {
            array.push(self.reader.read_i64::<BigEndian>()?);
        }
        Ok(array)
    }
}
