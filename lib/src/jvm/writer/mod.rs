//! Class file writer driven by the visitor protocol

mod annotation;
mod class;
mod field;
mod method;
mod options;

pub use annotation::AnnotationWriter;
pub use class::ClassWriter;
pub use field::FieldWriter;
pub use method::MethodWriter;
pub use options::{FrameComputation, WriterOptions};
