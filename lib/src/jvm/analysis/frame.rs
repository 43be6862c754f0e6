use super::types::{FrameType, BASE, BASE_KIND, DIM, LOCAL, UNINITIALIZED};
use crate::jvm::descriptors::{argument_and_return_sizes, parameter_types};
use crate::jvm::opcodes::array_type::*;
use crate::jvm::opcodes::*;
use crate::jvm::{ClassHierarchy, ConstantValue, Error, TypeTable};

/// Input and output state of a basic block
///
/// The input frame holds concrete types, once the block has been reached by the fixed point
/// iteration. The output frame is computed while instructions are being written, before the
/// input is known: its types may refer back to input slots (see [`FrameType::local`] and
/// [`FrameType::stack`]). Output locals which were never touched are left unset and read
/// through to the input.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub input_locals: Vec<FrameType>,
    pub input_stack: Vec<FrameType>,

    /// Whether an input frame has been set, since an empty input stack is meaningful
    has_input: bool,

    output_locals: Vec<FrameType>,
    output_stack: Vec<FrameType>,

    /// Number of input stack slots popped by the block, as a non-positive number
    pub input_stack_top: i32,

    /// Maximum height of the stack relative to the input stack, reached inside the block
    pub output_stack_max: i32,

    /// Types on which a constructor was called in this block
    initializations: Vec<FrameType>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    /// Set up the input frame of the first block of a method
    pub fn init_input_frame(
        &mut self,
        class_name: &str,
        is_static: bool,
        is_constructor: bool,
        descriptor: &str,
        max_locals: usize,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        self.input_locals.clear();
        self.input_stack.clear();
        self.has_input = true;

        if !is_static {
            self.input_locals.push(if is_constructor {
                FrameType::UNINITIALIZED_THIS
            } else {
                FrameType::object(types.add_normal_type(class_name))
            });
        }
        for parameter in parameter_types(descriptor) {
            let frame_type = FrameType::from_descriptor(parameter, types)?;
            self.input_locals.push(frame_type);
            if frame_type.is_wide() {
                self.input_locals.push(FrameType::TOP);
            }
        }
        if self.input_locals.len() < max_locals {
            self.input_locals.resize(max_locals, FrameType::TOP);
        }
        Ok(())
    }

    fn get(&mut self, local: usize) -> FrameType {
        match self.output_locals.get_mut(local) {
            Some(slot) => {
                if slot.is_unset() {
                    *slot = FrameType::local(local as u32);
                }
                *slot
            }
            None => FrameType::local(local as u32),
        }
    }

    fn set(&mut self, local: usize, frame_type: FrameType) {
        if local >= self.output_locals.len() {
            let len = (local + 1).max(2 * self.output_locals.len()).max(10);
            self.output_locals.resize(len, FrameType::UNSET);
        }
        self.output_locals[local] = frame_type;
    }

    fn push(&mut self, frame_type: FrameType) {
        self.output_stack.push(frame_type);
        let size = self.input_stack_top + self.output_stack.len() as i32;
        self.output_stack_max = self.output_stack_max.max(size);
    }

    /// Push a value of the given descriptor (or return type of a method descriptor)
    fn push_descriptor(&mut self, descriptor: &str, types: &mut TypeTable) -> Result<(), Error> {
        let frame_type = FrameType::from_descriptor(descriptor, types)?;
        if !frame_type.is_unset() {
            self.push(frame_type);
            if frame_type.is_wide() {
                self.push(FrameType::TOP);
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> FrameType {
        match self.output_stack.pop() {
            Some(frame_type) => frame_type,
            None => {
                self.input_stack_top -= 1;
                FrameType::stack(-self.input_stack_top as u32)
            }
        }
    }

    fn pop_n(&mut self, elements: usize) {
        let output = self.output_stack.len();
        if output >= elements {
            self.output_stack.truncate(output - elements);
        } else {
            self.input_stack_top -= (elements - output) as i32;
            self.output_stack.clear();
        }
    }

    /// Pop a value of the given descriptor, or the arguments of a method descriptor
    fn pop_descriptor(&mut self, descriptor: &str) {
        match descriptor.as_bytes().first() {
            Some(b'(') => {
                let arguments = (argument_and_return_sizes(descriptor) >> 2) as usize;
                self.pop_n(arguments.saturating_sub(1));
            }
            Some(b'J' | b'D') => self.pop_n(2),
            _ => self.pop_n(1),
        }
    }

    fn store(&mut self, local: usize, frame_type: FrameType, wide: bool) {
        self.set(local, frame_type);
        if wide {
            self.set(local + 1, FrameType::TOP);
        }
        if local > 0 {
            // Overwriting the second half of a long or double kills the first half
            let previous = self.get(local - 1);
            if previous.is_wide() {
                self.set(local - 1, FrameType::TOP);
            } else if previous.kind() != BASE {
                self.set(local - 1, previous.top_if_long_or_double());
            }
        }
    }

    /// Simulate an instruction without operands
    pub fn execute_insn(&mut self, opcode: u8) {
        match opcode {
            NOP | INEG | LNEG | FNEG | DNEG | I2B | I2C | I2S | GOTO | RETURN => (),
            ACONST_NULL => self.push(FrameType::NULL),
            ICONST_M1..=ICONST_5 => self.push(FrameType::INTEGER),
            LCONST_0 | LCONST_1 => {
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            FCONST_0..=FCONST_2 => self.push(FrameType::FLOAT),
            DCONST_0 | DCONST_1 => {
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
            }
            IALOAD | BALOAD | CALOAD | SALOAD => {
                self.pop_n(2);
                self.push(FrameType::INTEGER);
            }
            LALOAD | D2L => {
                self.pop_n(2);
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            FALOAD => {
                self.pop_n(2);
                self.push(FrameType::FLOAT);
            }
            DALOAD | L2D => {
                self.pop_n(2);
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
            }
            AALOAD => {
                self.pop_n(1);
                let array = self.pop();
                self.push(array.element_of());
            }
            IASTORE | BASTORE | CASTORE | SASTORE | FASTORE | AASTORE => self.pop_n(3),
            LASTORE | DASTORE => self.pop_n(4),
            POP | IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
                self.pop_n(1)
            }
            POP2 | LRETURN | DRETURN => self.pop_n(2),
            DUP => {
                let t1 = self.pop();
                self.push(t1);
                self.push(t1);
            }
            DUP_X1 => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t1);
                self.push(t2);
                self.push(t1);
            }
            DUP_X2 => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                self.push(t1);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            DUP2 => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t2);
                self.push(t1);
            }
            DUP2_X1 => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            DUP2_X2 => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                let t4 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t4);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            SWAP => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t1);
                self.push(t2);
            }
            IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR | ISHL | ISHR | IUSHR | L2I
            | D2I | FCMPL | FCMPG => {
                self.pop_n(2);
                self.push(FrameType::INTEGER);
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                self.pop_n(4);
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            FADD | FSUB | FMUL | FDIV | FREM | L2F | D2F => {
                self.pop_n(2);
                self.push(FrameType::FLOAT);
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                self.pop_n(4);
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
            }
            LSHL | LSHR | LUSHR => {
                self.pop_n(3);
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            I2L | F2L => {
                self.pop_n(1);
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            I2F => {
                self.pop_n(1);
                self.push(FrameType::FLOAT);
            }
            I2D | F2D => {
                self.pop_n(1);
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
            }
            F2I | ARRAYLENGTH => {
                self.pop_n(1);
                self.push(FrameType::INTEGER);
            }
            LCMP | DCMPL | DCMPG => {
                self.pop_n(4);
                self.push(FrameType::INTEGER);
            }
            _ => (),
        }
    }

    /// Simulate `BIPUSH`, `SIPUSH` or `NEWARRAY`
    pub fn execute_int_insn(&mut self, opcode: u8, operand: i32) {
        if opcode == NEWARRAY {
            self.pop_n(1);
            let element = match operand as u8 {
                T_BOOLEAN => FrameType::BOOLEAN,
                T_CHAR => FrameType::CHAR,
                T_BYTE => FrameType::BYTE,
                T_SHORT => FrameType::SHORT,
                T_INT => FrameType::INTEGER,
                T_FLOAT => FrameType::FLOAT,
                T_DOUBLE => FrameType::DOUBLE,
                _ => FrameType::LONG,
            };
            self.push(element.array_of());
        } else {
            self.push(FrameType::INTEGER);
        }
    }

    /// Simulate a load or store
    pub fn execute_var_insn(&mut self, opcode: u8, var: u16) {
        let var = var as usize;
        match opcode {
            ILOAD => self.push(FrameType::INTEGER),
            FLOAD => self.push(FrameType::FLOAT),
            LLOAD => {
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
            }
            DLOAD => {
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
            }
            ALOAD => {
                let frame_type = self.get(var);
                self.push(frame_type);
            }
            ISTORE | FSTORE | ASTORE => {
                let frame_type = self.pop();
                self.store(var, frame_type, false);
            }
            LSTORE | DSTORE => {
                self.pop_n(1);
                let frame_type = self.pop();
                self.store(var, frame_type, true);
            }
            // Subroutines are not modelled
            _ => (),
        }
    }

    pub fn execute_iinc(&mut self, var: u16) {
        self.set(var as usize, FrameType::INTEGER);
    }

    /// Simulate `NEW`, `ANEWARRAY`, `CHECKCAST` or `INSTANCEOF`
    ///
    /// `offset` is the position of the instruction, which identifies the type created by `NEW`.
    pub fn execute_type_insn(
        &mut self,
        opcode: u8,
        type_name: &str,
        offset: usize,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        match opcode {
            NEW => self.push(FrameType::uninitialized(
                types.add_uninitialized_type(type_name, offset),
            )),
            ANEWARRAY => {
                self.pop();
                if type_name.starts_with('[') {
                    self.push_descriptor(&format!("[{}", type_name), types)?;
                } else {
                    self.push(FrameType::object(types.add_normal_type(type_name)).array_of());
                }
            }
            CHECKCAST => {
                self.pop();
                if type_name.starts_with('[') {
                    self.push_descriptor(type_name, types)?;
                } else {
                    self.push(FrameType::object(types.add_normal_type(type_name)));
                }
            }
            _ => {
                self.pop_n(1);
                self.push(FrameType::INTEGER);
            }
        }
        Ok(())
    }

    pub fn execute_field_insn(
        &mut self,
        opcode: u8,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        match opcode {
            GETSTATIC => self.push_descriptor(descriptor, types)?,
            PUTSTATIC => self.pop_descriptor(descriptor),
            GETFIELD => {
                self.pop_n(1);
                self.push_descriptor(descriptor, types)?;
            }
            _ => {
                self.pop_descriptor(descriptor);
                self.pop();
            }
        }
        Ok(())
    }

    pub fn execute_method_insn(
        &mut self,
        opcode: u8,
        name: &str,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        self.pop_descriptor(descriptor);
        if opcode != INVOKESTATIC {
            let receiver = self.pop();
            if opcode == INVOKESPECIAL && name.starts_with('<') {
                self.initializations.push(receiver);
            }
        }
        self.push_descriptor(descriptor, types)
    }

    pub fn execute_invoke_dynamic(
        &mut self,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        self.pop_descriptor(descriptor);
        self.push_descriptor(descriptor, types)
    }

    pub fn execute_ldc(
        &mut self,
        constant: &ConstantValue,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        let class = match constant {
            ConstantValue::Integer(_) => {
                self.push(FrameType::INTEGER);
                return Ok(());
            }
            ConstantValue::Float(_) => {
                self.push(FrameType::FLOAT);
                return Ok(());
            }
            ConstantValue::Long(_) => {
                self.push(FrameType::LONG);
                self.push(FrameType::TOP);
                return Ok(());
            }
            ConstantValue::Double(_) => {
                self.push(FrameType::DOUBLE);
                self.push(FrameType::TOP);
                return Ok(());
            }
            ConstantValue::Dynamic(dynamic) => {
                return self.push_descriptor(&dynamic.descriptor, types);
            }
            ConstantValue::String(_) => "java/lang/String",
            ConstantValue::Class(_) => "java/lang/Class",
            ConstantValue::MethodType(_) => "java/lang/invoke/MethodType",
            ConstantValue::MethodHandle(_) => "java/lang/invoke/MethodHandle",
        };
        self.push(FrameType::object(types.add_normal_type(class)));
        Ok(())
    }

    /// Simulate a jump (the condition operands are consumed)
    pub fn execute_jump(&mut self, opcode: u8) {
        match opcode {
            IFEQ..=IFLE | IFNULL | IFNONNULL => self.pop_n(1),
            IF_ICMPEQ..=IF_ACMPNE => self.pop_n(2),
            _ => (),
        }
    }

    /// Simulate `TABLESWITCH` or `LOOKUPSWITCH`
    pub fn execute_switch(&mut self) {
        self.pop_n(1);
    }

    pub fn execute_multi_anew_array(
        &mut self,
        descriptor: &str,
        dimensions: u8,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        self.pop_n(dimensions as usize);
        self.push_descriptor(descriptor, types)
    }

    /// Replace an output type by the concrete type it stands for, given this block's input
    fn resolve(&self, frame_type: FrameType) -> FrameType {
        if frame_type.kind() == BASE || frame_type.is_unset() {
            return frame_type;
        }
        let input = if frame_type.kind() == LOCAL {
            self.input_locals.get(frame_type.slot()).copied()
        } else {
            self.input_stack
                .len()
                .checked_sub(frame_type.slot())
                .and_then(|index| self.input_stack.get(index).copied())
        };
        let resolved = input.unwrap_or(FrameType::TOP).with_dimensions_of(frame_type);
        if frame_type.wants_top_if_long_or_double() && resolved.is_wide() {
            FrameType::TOP
        } else {
            resolved
        }
    }

    /// Type an uninitialized type becomes if one of this block's constructor calls initialized it
    fn initialized(
        &self,
        frame_type: FrameType,
        class_name: &str,
        types: &mut TypeTable,
    ) -> FrameType {
        if self.initializations.is_empty() {
            return frame_type;
        }
        let initialized = if frame_type == FrameType::UNINITIALIZED_THIS {
            FrameType::object(types.add_normal_type(class_name))
        } else if frame_type.bits() & (DIM | BASE_KIND) == UNINITIALIZED {
            let name = types.name(frame_type.type_index()).to_owned();
            FrameType::object(types.add_normal_type(&name))
        } else {
            return frame_type;
        };
        for initialization in &self.initializations {
            if self.resolve(*initialization) == frame_type {
                return initialized;
            }
        }
        frame_type
    }

    /// Propagate this block's output frame into the input frame of a successor
    ///
    /// For an exception edge, `exception` is the type of the caught exception: the successor
    /// sees the input locals of this block (as well as its output locals, since the exception
    /// may be thrown anywhere in the block) and a stack holding only the exception. Returns
    /// whether the successor's input frame changed, or `None` if its input stack was already set
    /// to a different height than the one this block hands over.
    pub fn merge(
        &self,
        target: &mut Frame,
        exception: Option<FrameType>,
        class_name: &str,
        types: &mut TypeTable,
        hierarchy: &dyn ClassHierarchy,
    ) -> Option<bool> {
        let mut changed = false;
        let local_count = self.input_locals.len();
        let fresh = !target.has_input;

        if fresh {
            target.has_input = true;
            target.input_locals = vec![FrameType::UNSET; local_count];
            target.input_stack.clear();
            changed = true;
        }
        if target.input_locals.len() < local_count {
            target.input_locals.resize(local_count, FrameType::UNSET);
            changed = true;
        }

        for i in 0..local_count {
            let frame_type = match self.output_locals.get(i) {
                Some(output) if !output.is_unset() => self.resolve(*output),
                _ => self.input_locals[i],
            };
            let frame_type = self.initialized(frame_type, class_name, types);
            changed |=
                FrameType::merge_into(&mut target.input_locals[i], frame_type, types, hierarchy);
        }

        if let Some(exception) = exception {
            for i in 0..local_count {
                changed |= FrameType::merge_into(
                    &mut target.input_locals[i],
                    self.input_locals[i],
                    types,
                    hierarchy,
                );
            }
            if target.input_stack.is_empty() {
                target.input_stack.push(FrameType::UNSET);
                changed = true;
            }
            changed |=
                FrameType::merge_into(&mut target.input_stack[0], exception, types, hierarchy);
            return Some(changed);
        }

        let input_count = (self.input_stack.len() as i32 + self.input_stack_top).max(0) as usize;
        let stack_count = input_count + self.output_stack.len();
        if fresh {
            target.input_stack.resize(stack_count, FrameType::UNSET);
        } else if target.input_stack.len() != stack_count {
            return None;
        }

        for i in 0..input_count {
            let frame_type = self.initialized(self.input_stack[i], class_name, types);
            changed |=
                FrameType::merge_into(&mut target.input_stack[i], frame_type, types, hierarchy);
        }
        for (i, output) in self.output_stack.iter().enumerate() {
            let frame_type = self.initialized(self.resolve(*output), class_name, types);
            changed |= FrameType::merge_into(
                &mut target.input_stack[input_count + i],
                frame_type,
                types,
                hierarchy,
            );
        }
        Some(changed)
    }
}
