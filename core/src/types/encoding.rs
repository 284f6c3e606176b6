//! # Binary encoding primitives
//!
//! Shared by the type dump, the value dump and the chunk dump.
//!
//! - Counts, lengths and ordinals are LEB128 varints.
//! - Strings are `[varint: utf-8 byte length][bytes]` (see [`write_string`]).
//! - Signed integers are zigzag varints; floats are little-endian IEEE-754.
//!
//! ## Type format
//!
//! Every type starts with its [`TypeCode`] byte. Primitive types are that
//! byte alone. Composite types continue with a payload:
//!
//! ```text
//! Function:  [13][varint:n][generic name]*n [varint:m][param type]*m [return type]
//! Generic:   [14][name]
//! Object:    [15][name]
//! Enum:      [16][name][varint:n][EnumChild]*n
//! EnumChild: [17][name][parent name][varint:ordinal][varint:n][property name]*n
//! ```

use smallvec::SmallVec;
use thiserror::Error;

use super::{Type, TypeCode, manager::TypeManager};

/// Deepest type nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

pub type TypeBuffer = SmallVec<[u8; 16]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("unknown tag 0x{tag:02X} at offset {offset}")]
    InvalidWireTag { offset: usize, tag: u8 },
    #[error("invalid instruction 0x{tag:02X} 0x{operand:02X} at offset {offset}")]
    InvalidInstruction { offset: usize, tag: u8, operand: u8 },
    #[error("invalid utf-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("invalid varint at offset {offset}")]
    InvalidVarint { offset: usize },
    #[error("nesting deeper than {depth}")]
    TooDeep { depth: usize },
    #[error("{remaining} trailing byte(s) at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
    #[error("{what} index {index} out of range at offset {offset}")]
    OutOfRange {
        offset: usize,
        what: &'static str,
        index: usize,
    },
}

// ============================================================================
// Writing
// ============================================================================

pub fn write_varint(buf: &mut impl Extend<u8>, mut n: u64) {
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            buf.extend([byte]);
            break;
        } else {
            buf.extend([byte | 0x80]);
        }
    }
}

pub fn write_zigzag(buf: &mut impl Extend<u8>, n: i64) {
    write_varint(buf, ((n << 1) ^ (n >> 63)) as u64);
}

/// Length-prefixed UTF-8 string, used by every structure that embeds a name.
pub fn write_string(buf: &mut impl Extend<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

pub fn write_bytes(buf: &mut impl Extend<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend(bytes.iter().copied());
}

// ============================================================================
// Reading
// ============================================================================

/// Cursor over an encoded buffer that tracks offsets for error reporting.
#[derive(Debug, Clone)]
pub struct Reader<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated {
            offset: self.pos,
            needed: 1,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'b [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(DecodeError::InvalidVarint { offset: start });
            }
        }
    }

    /// Varint used as a length or count.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let start = self.pos;
        let n = self.read_varint()?;
        usize::try_from(n).map_err(|_| DecodeError::InvalidVarint { offset: start })
    }

    pub fn read_zigzag(&mut self) -> Result<i64, DecodeError> {
        let n = self.read_varint()?;
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    pub fn read_bytes(&mut self) -> Result<&'b [u8], DecodeError> {
        let len = self.read_len()?;
        self.read_slice(len)
    }

    pub fn read_string(&mut self) -> Result<&'b str, DecodeError> {
        let offset = self.pos;
        let bytes = self.read_bytes()?;
        core::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Fails if anything is left after a complete structure.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(DecodeError::TrailingBytes {
                offset: self.pos,
                remaining,
            }),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

impl<'a> Type<'a> {
    pub fn dump(&self) -> TypeBuffer {
        let mut buf = TypeBuffer::new();
        self.dump_into(&mut buf);
        buf
    }

    pub fn dump_into(&self, buf: &mut impl Extend<u8>) {
        buf.extend([self.code() as u8]);
        match self {
            Type::Function {
                generics,
                params,
                ret,
            } => {
                write_varint(buf, generics.len() as u64);
                for name in generics.iter() {
                    write_string(buf, name);
                }
                write_varint(buf, params.len() as u64);
                for param in params.iter() {
                    param.dump_into(buf);
                }
                ret.dump_into(buf);
            }
            Type::Generic(name) | Type::Object(name) => write_string(buf, name),
            Type::Enum { name, children } => {
                write_string(buf, name);
                write_varint(buf, children.len() as u64);
                for child in children.iter() {
                    child.dump_into(buf);
                }
            }
            Type::EnumChild {
                name,
                parent,
                ordinal,
                properties,
            } => {
                write_string(buf, name);
                write_string(buf, parent);
                write_varint(buf, *ordinal as u64);
                write_varint(buf, properties.len() as u64);
                for property in properties.iter() {
                    write_string(buf, property);
                }
            }
            _ => {}
        }
    }
}

impl<'a> TypeManager<'a> {
    /// Decodes a complete buffer holding exactly one type.
    pub fn load_type(&self, bytes: &[u8]) -> Result<&'a Type<'a>, DecodeError> {
        let mut reader = Reader::new(bytes);
        let ty = self.read_type(&mut reader)?;
        reader.finish()?;
        Ok(ty)
    }

    pub fn read_type(&self, reader: &mut Reader<'_>) -> Result<&'a Type<'a>, DecodeError> {
        self.read_type_at(reader, 0)
    }

    fn read_type_at(
        &self,
        reader: &mut Reader<'_>,
        depth: usize,
    ) -> Result<&'a Type<'a>, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep { depth: MAX_DEPTH });
        }
        let offset = reader.position();
        let tag = reader.read_u8()?;
        let code = TypeCode::from_u8(tag).ok_or(DecodeError::InvalidWireTag { offset, tag })?;
        let ty = match code {
            TypeCode::Any => self.any(),
            TypeCode::Null => self.null(),
            TypeCode::Bool => self.bool(),
            TypeCode::Byte => self.byte(),
            TypeCode::Short => self.short(),
            TypeCode::Int => self.int(),
            TypeCode::Long => self.long(),
            TypeCode::Float => self.float(),
            TypeCode::Double => self.double(),
            TypeCode::Str => self.str(),
            TypeCode::Bytes => self.bytes(),
            TypeCode::List => self.list(),
            TypeCode::Map => self.map(),
            TypeCode::Function => {
                let count = reader.read_len()?;
                let mut generics = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    generics.push(reader.read_string()?);
                }
                let count = reader.read_len()?;
                let mut params = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    params.push(self.read_type_at(reader, depth + 1)?);
                }
                let ret = self.read_type_at(reader, depth + 1)?;
                self.generic_function(&generics, &params, ret)
            }
            TypeCode::Generic => self.generic(reader.read_string()?),
            TypeCode::Object => self.object(reader.read_string()?),
            TypeCode::Enum => {
                let name = reader.read_string()?;
                let count = reader.read_len()?;
                let mut children = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    let child_offset = reader.position();
                    let child = self.read_type_at(reader, depth + 1)?;
                    if !matches!(child, Type::EnumChild { .. }) {
                        return Err(DecodeError::InvalidWireTag {
                            offset: child_offset,
                            tag: child.code() as u8,
                        });
                    }
                    children.push(child);
                }
                self.enum_from_children(name, &children)
            }
            TypeCode::EnumChild => {
                let name = reader.read_string()?;
                let parent = reader.read_string()?;
                let ordinal_offset = reader.position();
                let ordinal = u32::try_from(reader.read_varint()?).map_err(|_| {
                    DecodeError::InvalidVarint {
                        offset: ordinal_offset,
                    }
                })?;
                let count = reader.read_len()?;
                let mut properties = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    properties.push(reader.read_string()?);
                }
                self.enum_child(parent, name, ordinal, &properties)
            }
        };
        Ok(ty)
    }
}
