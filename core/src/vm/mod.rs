mod chunk;
mod instruction_set;
mod runtime;
mod serialization;
mod stack;

pub use chunk::{Chunk, Constant};
pub use instruction_set::Instruction;
pub use runtime::Vm;

pub(crate) use stack::Stack;
