//! Read and write JVM class files
//!
//! Classes are processed as a stream of visitor events: a [`ClassReader`] decodes a class file
//! and reports it to any [`ClassVisitor`], and a [`ClassWriter`] is a class visitor which
//! encodes whatever it is told back into a class file. Transformations sit in between,
//! forwarding (and altering) events from one to the other.
//!
//! The writer recomputes the maximum stack size of every method body, as well as its stack
//! map frames when the class version needs them (see [`WriterOptions`]). Instructions are
//! therefore visited without any frame information.
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Flag {
//!     public static int f(boolean b) {
//!         return b ? 1 : 0;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file, then reading it back, can be done as follows:
//!
//! ```
//! use classweave::jvm::*;
//! use classweave::jvm::opcodes::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let mut writer = ClassWriter::new(WriterOptions::default());
//! writer.visit(
//!     Version::JAVA8,
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     "Flag",
//!     None,
//!     Some("java/lang/Object"),
//!     &[],
//! );
//! if let Some(mut method) = writer.visit_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "f",
//!     "(Z)I",
//!     None,
//!     &[],
//! ) {
//!     let zero = Label::new();
//!     method.visit_var_insn(ILOAD, 0);
//!     method.visit_jump_insn(IFEQ, zero);
//!     method.visit_insn(ICONST_1);
//!     method.visit_insn(IRETURN);
//!     method.visit_label(zero);
//!     method.visit_insn(ICONST_0);
//!     method.visit_insn(IRETURN);
//!     method.visit_end();
//! }
//! writer.visit_end();
//! let class_bytes: Vec<u8> = writer.to_bytes()?;
//!
//! // Read it back, counting methods
//! struct CountMethods(usize);
//! impl ClassVisitor for CountMethods {
//!     fn visit_method(
//!         &mut self,
//!         _access: MethodAccessFlags,
//!         _name: &str,
//!         _descriptor: &str,
//!         _signature: Option<&str>,
//!         _exceptions: &[&str],
//!     ) -> Option<Box<dyn MethodVisitor + '_>> {
//!         self.0 += 1;
//!         None
//!     }
//! }
//! let mut counter = CountMethods(0);
//! ClassReader::new(&class_bytes)?.accept(&mut counter, ReaderFlags::default())?;
//! assert_eq!(counter.0, 1);
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod analysis;
pub mod attributes;
mod binary_format;
pub mod constants;
pub mod descriptors;
mod errors;
mod hierarchy;
mod modified_utf8;
pub mod opcodes;
mod reader;
mod version;
mod visitor;
mod writer;

pub use access_flags::*;
pub use binary_format::*;
pub use constants::*;
pub use errors::*;
pub use hierarchy::*;
pub use modified_utf8::*;
pub use reader::{ClassMetadataReader, ClassReader, MemberInfo, ReaderFlags, MAGIC};
pub use version::*;
pub use visitor::*;
pub use writer::*;
