//! Constant pool, both as read from a class file and as built up by a writer

mod pool_reader;
mod pool_writer;
mod type_table;
mod values;

pub use pool_reader::*;
pub use pool_writer::*;
pub use type_table::*;
pub use values::*;
