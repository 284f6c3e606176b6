pub mod encoding;
pub mod manager;
mod operators;
mod types;


pub use manager::TypeManager;
pub use operators::Substitution;
pub use types::{Type, TypeCode};
