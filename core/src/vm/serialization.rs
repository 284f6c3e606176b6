//! # Chunk dump format
//!
//! Built on the primitives in [`crate::types::encoding`].
//!
//! ```text
//! chunk:     [varint:n][constant]*n
//!            [varint:n][tag operand]*n
//!            [varint:n]([varint:ip][varint:start][varint:end])*n
//!            [varint:num_locals][varint:max_stack_size]
//! constant:  [0][value] | [1][type] | [2][function] | [3][native]
//! value:     [type code][payload]
//! function:  [name][arity][upvalues][varint:locals][varint:max_stack][varint:entry]
//! native:    [library][method][arity]
//! ```
//!
//! Values start with the [`TypeCode`] of their runtime kind. Integers are
//! zigzag varints, floats little-endian, strings and bytes length-prefixed.

use std::rc::Rc;

use tracing::debug;

use crate::{
    ast::Span,
    types::{
        TypeCode, TypeManager,
        encoding::{DecodeError, Reader, write_bytes, write_string, write_varint, write_zigzag},
    },
    values::{FunctionProto, Number, Value},
    vm::{Chunk, Constant, Instruction},
};

fn dump_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Bool(b) => {
            buf.push(TypeCode::Bool as u8);
            buf.push(*b as u8);
        }
        Value::Number(n) => match *n {
            Number::Byte(v) => {
                buf.push(TypeCode::Byte as u8);
                write_zigzag(buf, v as i64);
            }
            Number::Short(v) => {
                buf.push(TypeCode::Short as u8);
                write_zigzag(buf, v as i64);
            }
            Number::Int(v) => {
                buf.push(TypeCode::Int as u8);
                write_zigzag(buf, v as i64);
            }
            Number::Long(v) => {
                buf.push(TypeCode::Long as u8);
                write_zigzag(buf, v);
            }
            Number::Float(v) => {
                buf.push(TypeCode::Float as u8);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Number::Double(v) => {
                buf.push(TypeCode::Double as u8);
                buf.extend_from_slice(&v.to_le_bytes());
            }
        },
        Value::Str(s) => {
            buf.push(TypeCode::Str as u8);
            write_string(buf, s);
        }
        Value::Bytes(b) => {
            buf.push(TypeCode::Bytes as u8);
            write_bytes(buf, b);
        }
        other => {
            debug_assert!(
                other.is_null(),
                "{} values are not poolable",
                other.type_name()
            );
            buf.push(TypeCode::Null as u8);
        }
    }
}

fn read_value(reader: &mut Reader<'_>) -> Result<Value, DecodeError> {
    let offset = reader.position();
    let tag = reader.read_u8()?;
    let invalid = DecodeError::InvalidWireTag { offset, tag };
    let value = match TypeCode::from_u8(tag).ok_or(invalid.clone())? {
        TypeCode::Null => Value::Null,
        TypeCode::Bool => match reader.read_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            tag => {
                return Err(DecodeError::InvalidWireTag {
                    offset: offset + 1,
                    tag,
                });
            }
        },
        TypeCode::Byte => Value::byte(narrow(reader)?),
        TypeCode::Short => Value::short(narrow(reader)?),
        TypeCode::Int => Value::int(narrow(reader)?),
        TypeCode::Long => Value::long(reader.read_zigzag()?),
        TypeCode::Float => Value::float(f32::from_le_bytes(reader.read_array()?)),
        TypeCode::Double => Value::double(f64::from_le_bytes(reader.read_array()?)),
        TypeCode::Str => Value::str(reader.read_string()?),
        TypeCode::Bytes => Value::bytes(reader.read_bytes()?),
        _ => return Err(invalid),
    };
    Ok(value)
}

/// Reads a zigzag varint that must fit the target width.
fn narrow<T: TryFrom<i64>>(reader: &mut Reader<'_>) -> Result<T, DecodeError> {
    let offset = reader.position();
    T::try_from(reader.read_zigzag()?).map_err(|_| DecodeError::InvalidVarint { offset })
}

fn read_u16(reader: &mut Reader<'_>) -> Result<u16, DecodeError> {
    let offset = reader.position();
    u16::try_from(reader.read_varint()?).map_err(|_| DecodeError::InvalidVarint { offset })
}

fn read_u32(reader: &mut Reader<'_>) -> Result<u32, DecodeError> {
    let offset = reader.position();
    u32::try_from(reader.read_varint()?).map_err(|_| DecodeError::InvalidVarint { offset })
}

impl<'t> Chunk<'t> {
    pub fn dump(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.instructions.len() * Instruction::SIZE + 64);

        write_varint(&mut buf, self.constants.len() as u64);
        for constant in &self.constants {
            buf.push(constant.tag());
            match constant {
                Constant::Value(value) => dump_value(&mut buf, value),
                Constant::Type(ty) => ty.dump_into(&mut buf),
                Constant::Function(proto) => {
                    write_string(&mut buf, &proto.name);
                    buf.push(proto.arity);
                    buf.push(proto.upvalue_count);
                    write_varint(&mut buf, proto.num_locals as u64);
                    write_varint(&mut buf, proto.max_stack as u64);
                    write_varint(&mut buf, proto.entry as u64);
                }
                Constant::Native {
                    library,
                    method,
                    arity,
                } => {
                    write_string(&mut buf, library);
                    write_string(&mut buf, method);
                    buf.push(*arity);
                }
            }
        }

        write_varint(&mut buf, self.instructions.len() as u64);
        for instruction in &self.instructions {
            buf.extend_from_slice(&instruction.to_bytes());
        }

        write_varint(&mut buf, self.positions.len() as u64);
        for (ip, span) in &self.positions {
            write_varint(&mut buf, *ip as u64);
            write_varint(&mut buf, span.start() as u64);
            write_varint(&mut buf, span.end() as u64);
        }

        write_varint(&mut buf, self.num_locals as u64);
        write_varint(&mut buf, self.max_stack_size as u64);
        debug!(
            constants = self.constants.len(),
            instructions = self.instructions.len(),
            bytes = buf.len(),
            "dumped chunk"
        );
        buf
    }

    /// Decodes a complete dump. Types are interned into `types`.
    pub fn load(types: &'t TypeManager<'t>, bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let count = reader.read_len()?;
        let mut constants = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let offset = reader.position();
            let constant = match reader.read_u8()? {
                0 => Constant::Value(read_value(&mut reader)?),
                1 => Constant::Type(types.read_type(&mut reader)?),
                2 => {
                    let name = Rc::from(reader.read_string()?);
                    let arity = reader.read_u8()?;
                    let upvalue_count = reader.read_u8()?;
                    let num_locals = read_u16(&mut reader)?;
                    let max_stack = read_u16(&mut reader)?;
                    let entry = read_u32(&mut reader)?;
                    Constant::Function(Rc::new(FunctionProto {
                        name,
                        arity,
                        upvalue_count,
                        num_locals,
                        max_stack,
                        entry,
                    }))
                }
                3 => Constant::Native {
                    library: Rc::from(reader.read_string()?),
                    method: Rc::from(reader.read_string()?),
                    arity: reader.read_u8()?,
                },
                tag => return Err(DecodeError::InvalidWireTag { offset, tag }),
            };
            constants.push(constant);
        }

        let count = reader.read_len()?;
        let mut instructions = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let offset = reader.position();
            instructions.push(Instruction::decode(reader.read_array()?, offset)?);
        }

        let count = reader.read_len()?;
        let mut positions = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let ip = read_u32(&mut reader)?;
            let start = reader.read_len()?;
            let end = reader.read_len()?;
            positions.push((ip, Span::new(start, end)));
        }

        let num_locals = read_u16(&mut reader)?;
        let max_stack_size = read_u16(&mut reader)?;
        reader.finish()?;

        let chunk = Chunk {
            constants,
            instructions,
            positions,
            num_locals,
            max_stack_size,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Checks that every operand referring to the constant pool or to an
    /// instruction stays in range.
    fn validate(&self) -> Result<(), DecodeError> {
        let out_of_range = |addr: usize, what, index| DecodeError::OutOfRange {
            offset: addr * Instruction::SIZE,
            what,
            index,
        };
        let mut wide_arg: usize = 0;
        for (addr, instr) in self.instructions.iter().enumerate() {
            use Instruction::*;
            match *instr {
                WideArg(high) => {
                    wide_arg = (wide_arg | high as usize) << 8;
                    continue;
                }
                ConstLoad(a) | LoadGlobal(a) | StoreGlobal(a) | GetField(a) | SetField(a)
                | CallNative(a) | MakeClosure(a) | MakeEnum(a) => {
                    let index = wide_arg | a as usize;
                    if index >= self.constants.len() {
                        return Err(out_of_range(addr, "constant", index));
                    }
                }
                _ => {}
            }
            wide_arg = 0;
        }
        for proto in self.functions() {
            if proto.entry as usize >= self.instructions.len() {
                return Err(DecodeError::OutOfRange {
                    offset: 0,
                    what: "function entry",
                    index: proto.entry as usize,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use bumpalo::Bump;
    use pretty_assertions::assert_eq;

    fn sample<'t>(types: &'t TypeManager<'t>) -> Chunk<'t> {
        use Instruction::*;
        let shape = types.enum_type("Shape", &[("Circle", vec!["r"]), ("Square", vec!["s"])]);
        Chunk {
            constants: vec![
                Constant::Value(Value::long(-70_000)),
                Constant::Value(Value::double(2.5)),
                Constant::Value(Value::str("héllo")),
                Constant::Value(Value::bytes(&[0, 1, 255])),
                Constant::Value(Value::float(-0.5)),
                Constant::Value(Value::short(-2)),
                Constant::Value(Value::byte(7)),
                Constant::Value(Value::Bool(true)),
                Constant::Value(Value::Null),
                Constant::Type(shape),
                Constant::Function(Rc::new(FunctionProto {
                    name: Rc::from("square"),
                    arity: 1,
                    upvalue_count: 0,
                    num_locals: 2,
                    max_stack: 3,
                    entry: 4,
                })),
                Constant::Native {
                    library: Rc::from("Math"),
                    method: Rc::from("sqrt"),
                    arity: 1,
                },
            ],
            instructions: vec![
                MakeClosure(10),
                ConstLoad(1),
                Call(1),
                Return,
                LoadLocal(1),
                DupN(0),
                BinOp(Operator::Mul),
                Return,
            ],
            positions: vec![(2, Span::new(0, 9)), (6, Span::new(20, 25))],
            num_locals: 0,
            max_stack_size: 3,
        }
    }

    #[test]
    fn test_round_trip() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        let chunk = sample(types);

        let loaded = Chunk::load(types, &chunk.dump()).unwrap();
        assert_eq!(loaded, chunk);
        // Interned types come back as the same reference.
        let (Constant::Type(a), Constant::Type(b)) = (&chunk.constants[9], &loaded.constants[9])
        else {
            panic!("expected type constants");
        };
        assert!(core::ptr::eq(*a, *b));
    }

    #[test]
    fn test_round_trip_into_fresh_manager() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        let dumped = sample(types).dump();

        let other_bump = Bump::new();
        let other = TypeManager::new(&other_bump);
        let loaded = Chunk::load(other, &dumped).unwrap();
        assert_eq!(loaded.dump(), dumped);
    }

    #[test]
    fn test_value_layout() {
        let mut buf = Vec::new();
        dump_value(&mut buf, &Value::int(-1));
        assert_eq!(buf, vec![TypeCode::Int as u8, 1]);

        buf.clear();
        dump_value(&mut buf, &Value::str("ab"));
        assert_eq!(buf, vec![TypeCode::Str as u8, 2, b'a', b'b']);
    }

    #[test]
    fn test_load_rejects_truncated_input() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        let dumped = sample(types).dump();

        for len in [0, 1, dumped.len() / 2, dumped.len() - 1] {
            assert!(
                Chunk::load(types, &dumped[..len]).is_err(),
                "prefix of {len} bytes loaded"
            );
        }
    }

    #[test]
    fn test_load_rejects_trailing_bytes() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        let mut dumped = sample(types).dump();
        dumped.push(0);
        assert!(matches!(
            Chunk::load(types, &dumped),
            Err(DecodeError::TrailingBytes { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_load_rejects_bad_constant_tag() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        // One constant with tag 9.
        assert_eq!(
            Chunk::load(types, &[1, 9]),
            Err(DecodeError::InvalidWireTag { offset: 1, tag: 9 })
        );
    }

    #[test]
    fn test_load_rejects_dangling_constant_reference() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        let chunk = Chunk {
            instructions: vec![Instruction::ConstLoad(3), Instruction::Return],
            ..Chunk::default()
        };
        assert!(matches!(
            Chunk::load(types, &chunk.dump()),
            Err(DecodeError::OutOfRange {
                what: "constant",
                index: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_utf8() {
        let bump = Bump::new();
        let types = TypeManager::new(&bump);
        // One value constant: str of length 1 holding 0xFF.
        let bytes = [1, 0, TypeCode::Str as u8, 1, 0xFF];
        assert!(matches!(
            Chunk::load(types, &bytes),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
    }
}
