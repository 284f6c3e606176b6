//! Memory Package
//!
//! Functions: alloc, realloc, free, copy, size,
//!            loadByte/Short/Int/Long/Float/Double,
//!            storeByte/Short/Int/Long/Float/Double
//!
//! A flat byte-addressable heap owned by each VM. An address packs the block
//! id in its upper 32 bits and the byte offset in the lower 32 bits. Block ids
//! start at 1 so that 0 is never a valid address. Multi-byte values are
//! little-endian.

use tracing::trace;

use super::{NativeError, NativeFn, NativeFunction, NativeRegistry, arg_f64, arg_i64, arg_usize};
use crate::{values::Value, vm::Vm};

const OFFSET_BITS: u32 = 32;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

#[derive(Debug, Default)]
pub struct Heap {
    /// Freed blocks stay as `None`; ids are never reused.
    blocks: Vec<Option<Vec<u8>>>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a zeroed block and returns its base address.
    pub fn alloc(&mut self, size: usize) -> Result<i64, NativeError> {
        check_size("Memory.alloc", size)?;
        self.blocks.push(Some(vec![0; size]));
        let id = self.blocks.len() as u64;
        trace!(id, size, "heap alloc");
        Ok((id << OFFSET_BITS) as i64)
    }

    /// Resizes the block at `addr` in place, zero-filling any growth.
    pub fn realloc(&mut self, addr: i64, size: usize) -> Result<i64, NativeError> {
        check_size("Memory.realloc", size)?;
        let (block, offset) = self.block_mut("Memory.realloc", addr)?;
        if offset != 0 {
            return Err(not_a_base("Memory.realloc", addr));
        }
        block.resize(size, 0);
        Ok(addr)
    }

    pub fn free(&mut self, addr: i64) -> Result<(), NativeError> {
        let (id, offset) = split(addr);
        if offset != 0 {
            return Err(not_a_base("Memory.free", addr));
        }
        match id.checked_sub(1).and_then(|i| self.blocks.get_mut(i)) {
            Some(block) if block.is_some() => {
                *block = None;
                trace!(id, "heap free");
                Ok(())
            }
            _ => Err(invalid("Memory.free", addr)),
        }
    }

    /// Size of the block containing `addr`.
    pub fn size(&self, addr: i64) -> Result<usize, NativeError> {
        self.block("Memory.size", addr).map(|(block, _)| block.len())
    }

    /// Number of blocks not yet freed.
    pub fn live_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    pub fn read<const N: usize>(&self, addr: i64) -> Result<[u8; N], NativeError> {
        let (block, offset) = self.block("Memory.load", addr)?;
        let bytes = range(block.len(), offset, N).map(|r| &block[r])?;
        let mut out = [0; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn write(&mut self, addr: i64, bytes: &[u8]) -> Result<(), NativeError> {
        let (block, offset) = self.block_mut("Memory.store", addr)?;
        let r = range(block.len(), offset, bytes.len())?;
        block[r].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies `len` bytes; the ranges may overlap.
    pub fn copy(&mut self, dst: i64, src: i64, len: usize) -> Result<(), NativeError> {
        let (block, offset) = self.block("Memory.copy", src)?;
        let bytes = block[range(block.len(), offset, len)?].to_vec();
        self.write(dst, &bytes)
    }

    fn block(&self, name: &str, addr: i64) -> Result<(&Vec<u8>, usize), NativeError> {
        let (id, offset) = split(addr);
        id.checked_sub(1)
            .and_then(|i| self.blocks.get(i))
            .and_then(Option::as_ref)
            .map(|block| (block, offset))
            .ok_or_else(|| invalid(name, addr))
    }

    fn block_mut(&mut self, name: &str, addr: i64) -> Result<(&mut Vec<u8>, usize), NativeError> {
        let (id, offset) = split(addr);
        id.checked_sub(1)
            .and_then(|i| self.blocks.get_mut(i))
            .and_then(Option::as_mut)
            .map(|block| (block, offset))
            .ok_or_else(|| invalid(name, addr))
    }
}

/// Offsets must fit the lower half of an address.
fn check_size(name: &str, size: usize) -> Result<(), NativeError> {
    if size as u64 > OFFSET_MASK {
        return Err(NativeError::failed(name, format!("block size {size} too large")));
    }
    Ok(())
}

fn split(addr: i64) -> (usize, usize) {
    let addr = addr as u64;
    ((addr >> OFFSET_BITS) as usize, (addr & OFFSET_MASK) as usize)
}

fn range(len: usize, offset: usize, width: usize) -> Result<core::ops::Range<usize>, NativeError> {
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(NativeError::OutOfBounds {
            index: offset as i64,
            len,
        }),
    }
}

fn invalid(name: &str, addr: i64) -> NativeError {
    NativeError::failed(name, format!("invalid address {addr:#x}"))
}

fn not_a_base(name: &str, addr: i64) -> NativeError {
    NativeError::failed(name, format!("{addr:#x} is not the start of a block"))
}

// ============================================================================
// Allocation
// ============================================================================

fn memory_alloc(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let size = arg_usize("Memory.alloc", args, 0)?;
    Ok(Value::long(vm.heap_mut().alloc(size)?))
}

fn memory_realloc(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let addr = arg_i64("Memory.realloc", args, 0)?;
    let size = arg_usize("Memory.realloc", args, 1)?;
    Ok(Value::long(vm.heap_mut().realloc(addr, size)?))
}

fn memory_free(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    vm.heap_mut().free(arg_i64("Memory.free", args, 0)?)?;
    Ok(Value::Null)
}

fn memory_copy(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let dst = arg_i64("Memory.copy", args, 0)?;
    let src = arg_i64("Memory.copy", args, 1)?;
    let len = arg_usize("Memory.copy", args, 2)?;
    vm.heap_mut().copy(dst, src, len)?;
    Ok(Value::Null)
}

fn memory_size(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let size = vm.heap().size(arg_i64("Memory.size", args, 0)?)?;
    Ok(super::len_value(size))
}

// ============================================================================
// Loads and Stores
// ============================================================================

macro_rules! load {
    ($name:ident, $ty:ty, $ctor:expr) => {
        fn $name(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
            let addr = arg_i64("Memory.load", args, 0)?;
            let bytes = vm.heap().read::<{ size_of::<$ty>() }>(addr)?;
            Ok($ctor(<$ty>::from_le_bytes(bytes)))
        }
    };
}

load!(memory_load_byte, i8, Value::byte);
load!(memory_load_short, i16, Value::short);
load!(memory_load_int, i32, Value::int);
load!(memory_load_long, i64, Value::long);
load!(memory_load_float, f32, Value::float);
load!(memory_load_double, f64, Value::double);

/// Integer stores truncate to the target width.
macro_rules! store_int {
    ($name:ident, $ty:ty) => {
        fn $name(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
            let addr = arg_i64("Memory.store", args, 0)?;
            let value = arg_i64("Memory.store", args, 1)? as $ty;
            vm.heap_mut().write(addr, &value.to_le_bytes())?;
            Ok(Value::Null)
        }
    };
}

store_int!(memory_store_byte, i8);
store_int!(memory_store_short, i16);
store_int!(memory_store_int, i32);
store_int!(memory_store_long, i64);

fn memory_store_float(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let addr = arg_i64("Memory.storeFloat", args, 0)?;
    let value = arg_f64("Memory.storeFloat", args, 1)? as f32;
    vm.heap_mut().write(addr, &value.to_le_bytes())?;
    Ok(Value::Null)
}

fn memory_store_double(vm: &mut Vm<'_, '_>, args: &[Value]) -> Result<Value, NativeError> {
    let addr = arg_i64("Memory.storeDouble", args, 0)?;
    let value = arg_f64("Memory.storeDouble", args, 1)?;
    vm.heap_mut().write(addr, &value.to_le_bytes())?;
    Ok(Value::Null)
}

pub fn register(registry: &mut NativeRegistry) {
    registry.register(
        "Memory",
        "alloc",
        NativeFunction::new(&["int"], "long", memory_alloc),
    );
    registry.register(
        "Memory",
        "realloc",
        NativeFunction::new(&["long", "int"], "long", memory_realloc),
    );
    registry.register(
        "Memory",
        "free",
        NativeFunction::new(&["long"], "null", memory_free),
    );
    registry.register(
        "Memory",
        "copy",
        NativeFunction::new(&["long", "long", "int"], "null", memory_copy),
    );
    registry.register(
        "Memory",
        "size",
        NativeFunction::new(&["long"], "int", memory_size),
    );

    let loads: [(&'static str, &'static str, NativeFn); 6] = [
        ("loadByte", "byte", memory_load_byte),
        ("loadShort", "short", memory_load_short),
        ("loadInt", "int", memory_load_int),
        ("loadLong", "long", memory_load_long),
        ("loadFloat", "float", memory_load_float),
        ("loadDouble", "double", memory_load_double),
    ];
    for (method, ret, func) in loads {
        registry.register("Memory", method, NativeFunction::new(&["long"], ret, func));
    }

    let stores: [(&'static str, NativeFn); 6] = [
        ("storeByte", memory_store_byte),
        ("storeShort", memory_store_short),
        ("storeInt", memory_store_int),
        ("storeLong", memory_store_long),
        ("storeFloat", memory_store_float),
        ("storeDouble", memory_store_double),
    ];
    for (method, func) in stores {
        registry.register(
            "Memory",
            method,
            NativeFunction::new(&["long", "any"], "null", func),
        );
    }
}
