//! Structural visitor protocol shared by readers and writers
//!
//! A [`crate::jvm::ClassReader`] drives a [`ClassVisitor`] with one call per element of the class
//! file, in class file order. A [`crate::jvm::ClassWriter`] is a [`ClassVisitor`] which turns
//! those calls back into bytes. Anything in between (filtering, renaming, injecting code) is just
//! another visitor forwarding calls.
//!
//! Methods returning a sub-visitor may return `None` to skip the nested structure entirely.
//! Every method has a default implementation that ignores its input, so visitors only implement
//! what they care about.

use crate::jvm::{
    ClassAccessFlags, ConstantValue, FieldAccessFlags, InnerClassAccessFlags, MethodAccessFlags,
    MethodHandle, Version,
};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_LABEL: AtomicUsize = AtomicUsize::new(0);
static NEXT_SOURCE: AtomicUsize = AtomicUsize::new(1);

/// Position in a method body
///
/// Labels are cheap opaque handles. The writer resolves them to bytecode offsets when they are
/// visited and patches any earlier jumps to them.
///
/// Debug labels only mark positions for local variable and line number tables. Unlike regular
/// labels, they never start a new basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label {
    id: usize,
    debug: bool,
}

impl Label {
    pub fn new() -> Label {
        Label {
            id: NEXT_LABEL.fetch_add(1, Ordering::Relaxed),
            debug: false,
        }
    }

    pub fn new_debug() -> Label {
        Label {
            debug: true,
            ..Label::new()
        }
    }

    pub fn is_debug(self) -> bool {
        self.debug
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::new()
    }
}

/// Token identifying one [`crate::jvm::ClassReader`]
///
/// A writer built from a reader remembers the reader's token. When a method visitor is then
/// offered raw method bytes tagged with the same token, it knows the constant pool indices in
/// those bytes are still valid.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SourceId(usize);

impl SourceId {
    pub(crate) fn fresh() -> SourceId {
        SourceId(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Element value of an annotation, other than enums, nested annotations and arrays of those
///
/// Arrays of primitives are delivered as one value instead of through an array visitor.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    Byte(i8),
    Char(u16),
    Short(i16),
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),

    /// Class literal, as a descriptor (`Ljava/lang/String;`, `I`, `V`, ...)
    Class(String),

    ByteArray(Vec<i8>),
    CharArray(Vec<u16>),
    ShortArray(Vec<i16>),
    BooleanArray(Vec<bool>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

/// Visitor for the element values of an annotation (or of an array element value)
///
/// Inside arrays, `name` is always `None`.
#[allow(unused_variables)]
pub trait AnnotationVisitor {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) {}

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) {}

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

/// Visitor for a class
///
/// Calls happen in this order: `visit`, `visit_source`, `visit_outer_class`, `visit_nest_host`,
/// `visit_nest_member`*, `visit_annotation`*, `visit_inner_class`*, `visit_field`*,
/// `visit_method`*, then `visit_end`.
#[allow(unused_variables)]
pub trait ClassVisitor {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) {
    }

    /// Source file name and SMAP debug extension
    fn visit_source(&mut self, file: Option<&str>, debug: Option<&str>) {}

    /// Enclosing class, and enclosing method for local and anonymous classes
    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, descriptor: Option<&str>) {}

    fn visit_nest_host(&mut self, host: &str) {}

    fn visit_nest_member(&mut self, member: &str) {}

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) {
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        None
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

/// Visitor for a field
#[allow(unused_variables)]
pub trait FieldVisitor {
    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

/// Visitor for a method
///
/// Annotations come first, then the code: instructions and labels interleaved in order, with
/// try-catch blocks visited before the labels they refer to, then local variables, then
/// `visit_max_stack`, then `visit_end`.
#[allow(unused_variables)]
pub trait MethodVisitor {
    /// Offer the raw bytes of an unmodified method (everything after its descriptor index)
    ///
    /// Returning `true` means the visitor took the bytes as they are. No further calls happen for
    /// that method, not even `visit_end`. The default declines.
    fn copy_method(&mut self, source: SourceId, attributes: &[u8]) -> bool {
        false
    }

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    /// Instruction without operands
    fn visit_insn(&mut self, opcode: u8) {}

    /// `BIPUSH`, `SIPUSH` or `NEWARRAY`
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {}

    /// Load, store or `RET` (always with the general opcode, never `ILOAD_0` and friends)
    fn visit_var_insn(&mut self, opcode: u8, var: u16) {}

    /// `NEW`, `ANEWARRAY`, `CHECKCAST` or `INSTANCEOF`
    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) {}

    fn visit_field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {}

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) {
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &MethodHandle,
        bootstrap_arguments: &[ConstantValue],
    ) {
    }

    /// Conditional jump, `GOTO` or `JSR` (wide forms are never delivered)
    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {}

    fn visit_label(&mut self, label: Label) {}

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) {}

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) {}

    fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) {}

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) {}

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) {}

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) {
    }

    /// Line number of the instruction just after `start`
    fn visit_line_number(&mut self, line: u16, start: Label) {}

    /// Maximum stack size declared by the `Code` attribute
    fn visit_max_stack(&mut self, max_stack: u16) {}

    fn visit_end(&mut self) {}
}
