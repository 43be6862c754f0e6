mod byte_vector;
mod cursor;

pub use byte_vector::*;
pub use cursor::*;

/// Elements with a width
///
/// This shows up in a couple places when modelling class files: constant pool entries and
/// verification types are usually one slot wide, but `long` and `double` take up two slots.
pub trait Width {
    fn width(&self) -> usize;
}
