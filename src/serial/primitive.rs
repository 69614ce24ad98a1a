//! Utilities for serialize/deserialize integers.
#![cfg(target_pointer_width = "64")]

use std::io::{Read, Write};

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Serializable;

macro_rules! common_def {
    ($int:ident, $write:ident, $read:ident) => {
        impl Serializable for $int {
            fn serialize_into<W: Write>(&self, mut writer: W) -> Result<usize> {
                writer.$write::<LittleEndian>(*self)?;
                Ok(std::mem::size_of::<Self>())
            }

            fn deserialize_from<R: Read>(mut reader: R) -> Result<Self> {
                Ok(reader.$read::<LittleEndian>()?)
            }

            fn size_in_bytes(&self) -> usize {
                std::mem::size_of::<Self>()
            }

            fn size_of() -> Option<usize> {
                Some(std::mem::size_of::<Self>())
            }
        }
    };
}

common_def!(u16, write_u16, read_u16);
common_def!(u32, write_u32, read_u32);
common_def!(u64, write_u64, read_u64);
common_def!(i16, write_i16, read_i16);
common_def!(i32, write_i32, read_i32);
common_def!(i64, write_i64, read_i64);

impl Serializable for u8 {
    fn serialize_into<W: Write>(&self, mut writer: W) -> Result<usize> {
        writer.write_u8(*self)?;
        Ok(1)
    }

    fn deserialize_from<R: Read>(mut reader: R) -> Result<Self> {
        Ok(reader.read_u8()?)
    }

    fn size_in_bytes(&self) -> usize {
        1
    }

    fn size_of() -> Option<usize> {
        Some(1)
    }
}

impl Serializable for usize {
    fn serialize_into<W: Write>(&self, writer: W) -> Result<usize> {
        (*self as u64).serialize_into(writer)
    }

    fn deserialize_from<R: Read>(reader: R) -> Result<Self> {
        u64::deserialize_from(reader).map(|x| x as usize)
    }

    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<u64>()
    }

    fn size_of() -> Option<usize> {
        Some(std::mem::size_of::<u64>())
    }
}

impl Serializable for bool {
    fn serialize_into<W: Write>(&self, writer: W) -> Result<usize> {
        (*self as u8).serialize_into(writer)
    }

    fn deserialize_from<R: Read>(reader: R) -> Result<Self> {
        u8::deserialize_from(reader).map(|x| x != 0)
    }

    fn size_in_bytes(&self) -> usize {
        1
    }

    fn size_of() -> Option<usize> {
        Some(1)
    }
}
