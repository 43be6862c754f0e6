use super::{read_annotation, ClassReader, CommonAttributes, ReaderFlags};
use crate::jvm::opcodes::*;
use crate::jvm::{ClassVisitor, Error, Label, MethodAccessFlags, MethodVisitor};
use crate::util::Cursor;
use log::trace;
use std::collections::HashMap;

/// Labels of a method body, keyed by bytecode offset
///
/// Offsets come straight from the class file, so they are kept signed and wide: a bogus jump
/// gets a label that is simply never visited.
#[derive(Default)]
struct CodeLabels {
    labels: HashMap<i64, Label>,
    lines: HashMap<i64, u16>,
}

impl CodeLabels {
    /// Label at `offset`, created if needed
    fn label(&mut self, offset: i64) -> Label {
        *self.labels.entry(offset).or_insert_with(Label::new)
    }

    /// Label at `offset` which only matters for debug information
    fn debug_label(&mut self, offset: i64) -> Label {
        *self.labels.entry(offset).or_insert_with(Label::new_debug)
    }

    fn get(&self, offset: i64) -> Label {
        self.labels.get(&offset).copied().unwrap_or_default()
    }
}

/// Number of padding bytes after a switch opcode at `offset`
fn switch_padding(offset: i64) -> usize {
    (3 - (offset & 3)) as usize
}

impl<'b> ClassReader<'b> {
    pub(super) fn read_method(
        &self,
        visitor: &mut dyn ClassVisitor,
        cursor: &mut Cursor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let access = cursor.u16()? as u32;
        let name = self.pool.utf8(cursor.u16()?)?;
        let descriptor = self.pool.utf8(cursor.u16()?)?;
        let attributes_start = cursor.position();

        let mut common = CommonAttributes::default();
        let mut code = None;
        let mut exceptions = vec![];
        let mut parameter_annotations = None;
        for attribute in self.read_attribute_table(cursor)? {
            if common.read(&self.pool, self.bytes, &attribute)? {
                continue;
            }
            match attribute.name {
                "Code" => code = Some(attribute.start),
                "Exceptions" => {
                    let mut data = Cursor::new(self.bytes, attribute.start);
                    for _ in 0..data.u16()? {
                        exceptions.push(self.pool.class_name(data.u16()?)?);
                    }
                }
                "RuntimeVisibleParameterAnnotations" => {
                    parameter_annotations = Some(attribute.start);
                }
                _ => (),
            }
        }
        let attributes_end = cursor.position();

        let access = MethodAccessFlags::from_bits_truncate(access | common.access_bits());
        let mut method_visitor =
            match visitor.visit_method(access, name, descriptor, common.signature, &exceptions) {
                Some(method_visitor) => method_visitor,
                None => return Ok(()),
            };

        let raw = &self.bytes[attributes_start..attributes_end];
        if method_visitor.copy_method(self.source, raw) {
            trace!("copied method {}{} as is", name, descriptor);
            return Ok(());
        }

        self.read_annotation_list(common.annotations, &mut *method_visitor)?;
        if let Some(offset) = parameter_annotations {
            let mut data = Cursor::new(self.bytes, offset);
            for parameter in 0..data.u8()? {
                for _ in 0..data.u16()? {
                    let descriptor = self.pool.utf8(data.u16()?)?;
                    let annotation =
                        method_visitor.visit_parameter_annotation(parameter, descriptor);
                    read_annotation(&self.pool, &mut data, annotation)?;
                }
            }
        }

        if let Some(offset) = code {
            if !flags.contains(ReaderFlags::SKIP_CODE) {
                self.read_code(&mut *method_visitor, offset, flags)?;
            }
        }

        method_visitor.visit_end();
        Ok(())
    }

    /// Report the contents of a `Code` attribute
    fn read_code(
        &self,
        visitor: &mut dyn MethodVisitor,
        offset: usize,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let mut cursor = Cursor::new(self.bytes, offset);
        let max_stack = cursor.u16()?;
        cursor.skip(2)?;
        let code_length = cursor.u32()? as usize;
        let code_start = cursor.position();
        cursor.skip(code_length)?;

        let mut labels = CodeLabels::default();
        self.find_labels(code_start, code_length, &mut labels)?;

        for _ in 0..cursor.u16()? {
            let start = labels.label(cursor.u16()? as i64);
            let end = labels.label(cursor.u16()? as i64);
            let handler = labels.label(cursor.u16()? as i64);
            let catch_type = self.pool.opt_class_name(cursor.u16()?)?;
            visitor.visit_try_catch_block(start, end, handler, catch_type);
        }

        let skip_debug = flags.contains(ReaderFlags::SKIP_DEBUG);
        let mut local_variables = None;
        let mut local_variable_types = HashMap::new();
        for attribute in self.read_attribute_table(&mut cursor)? {
            let mut data = Cursor::new(self.bytes, attribute.start);
            match attribute.name {
                "LocalVariableTable" if !skip_debug => {
                    local_variables = Some(attribute.start);
                    for _ in 0..data.u16()? {
                        let start_pc = data.u16()? as i64;
                        let length = data.u16()? as i64;
                        data.skip(6)?;
                        labels.debug_label(start_pc);
                        labels.debug_label(start_pc + length);
                    }
                }
                "LocalVariableTypeTable" if !skip_debug => {
                    for _ in 0..data.u16()? {
                        let start_pc = data.u16()?;
                        data.skip(4)?;
                        let signature = self.pool.utf8(data.u16()?)?;
                        let index = data.u16()?;
                        local_variable_types.insert((start_pc, index), signature);
                    }
                }
                "LineNumberTable" if !skip_debug => {
                    for _ in 0..data.u16()? {
                        let start_pc = data.u16()? as i64;
                        let line = data.u16()?;
                        labels.debug_label(start_pc);
                        labels.lines.insert(start_pc, line);
                    }
                }
                _ => (),
            }
        }

        self.read_instructions(visitor, code_start, code_length, &labels)?;
        if let Some(end) = labels.labels.get(&(code_length as i64)) {
            visitor.visit_label(*end);
        }

        if let Some(offset) = local_variables {
            let mut data = Cursor::new(self.bytes, offset);
            for _ in 0..data.u16()? {
                let start_pc = data.u16()?;
                let length = data.u16()?;
                let name = self.pool.utf8(data.u16()?)?;
                let descriptor = self.pool.utf8(data.u16()?)?;
                let index = data.u16()?;
                let signature = local_variable_types.get(&(start_pc, index)).copied();
                visitor.visit_local_variable(
                    name,
                    descriptor,
                    signature,
                    labels.get(start_pc as i64),
                    labels.get(start_pc as i64 + length as i64),
                    index,
                );
            }
        }

        visitor.visit_max_stack(max_stack);
        Ok(())
    }

    /// First pass over the code: create labels for every branch target
    fn find_labels(
        &self,
        code_start: usize,
        code_length: usize,
        labels: &mut CodeLabels,
    ) -> Result<(), Error> {
        let mut cursor = Cursor::new(self.bytes, code_start);
        let code_end = code_start + code_length;
        while cursor.position() < code_end {
            let offset = (cursor.position() - code_start) as i64;
            let opcode = cursor.u8()?;
            match InsnKind::of(opcode) {
                InsnKind::NoArg | InsnKind::ImplicitVar => (),
                InsnKind::Var | InsnKind::SignedByte | InsnKind::Ldc => cursor.skip(1)?,
                InsnKind::SignedShort
                | InsnKind::LdcWide
                | InsnKind::Type
                | InsnKind::FieldOrMethod
                | InsnKind::Iinc => cursor.skip(2)?,
                InsnKind::MultiANewArray => cursor.skip(3)?,
                InsnKind::InterfaceMethod | InsnKind::InvokeDynamic => cursor.skip(4)?,
                InsnKind::Label => {
                    labels.label(offset + cursor.i16()? as i64);
                }
                InsnKind::WideLabel => {
                    labels.label(offset + cursor.i32()? as i64);
                }
                InsnKind::Wide => {
                    let opcode = cursor.u8()?;
                    cursor.skip(if opcode == IINC { 4 } else { 2 })?;
                }
                InsnKind::TableSwitch => {
                    cursor.skip(switch_padding(offset))?;
                    labels.label(offset + cursor.i32()? as i64);
                    let low = cursor.i32()? as i64;
                    let high = cursor.i32()? as i64;
                    for _ in low..=high {
                        labels.label(offset + cursor.i32()? as i64);
                    }
                }
                InsnKind::LookupSwitch => {
                    cursor.skip(switch_padding(offset))?;
                    labels.label(offset + cursor.i32()? as i64);
                    let pairs = cursor.i32()?;
                    for _ in 0..pairs {
                        cursor.skip(4)?;
                        labels.label(offset + cursor.i32()? as i64);
                    }
                }
            }
        }
        Ok(())
    }

    /// Second pass over the code: report instructions, labels and line numbers
    fn read_instructions(
        &self,
        visitor: &mut dyn MethodVisitor,
        code_start: usize,
        code_length: usize,
        labels: &CodeLabels,
    ) -> Result<(), Error> {
        let mut cursor = Cursor::new(self.bytes, code_start);
        let code_end = code_start + code_length;
        while cursor.position() < code_end {
            let offset = (cursor.position() - code_start) as i64;
            if let Some(label) = labels.labels.get(&offset) {
                visitor.visit_label(*label);
                if let Some(line) = labels.lines.get(&offset) {
                    visitor.visit_line_number(*line, *label);
                }
            }

            let opcode = cursor.u8()?;
            match InsnKind::of(opcode) {
                InsnKind::NoArg => visitor.visit_insn(opcode),
                InsnKind::ImplicitVar => {
                    let (base, implicit) = if opcode > ISTORE {
                        (ISTORE, opcode - ISTORE_0)
                    } else {
                        (ILOAD, opcode - ILOAD_0)
                    };
                    visitor.visit_var_insn(base + (implicit >> 2), (implicit & 3) as u16);
                }
                InsnKind::Var => {
                    let var = cursor.u8()?;
                    visitor.visit_var_insn(opcode, var as u16);
                }
                InsnKind::SignedByte => {
                    let operand = cursor.i8()?;
                    visitor.visit_int_insn(opcode, operand as i32);
                }
                InsnKind::SignedShort => {
                    let operand = cursor.i16()?;
                    visitor.visit_int_insn(opcode, operand as i32);
                }
                InsnKind::Ldc => {
                    let constant = self.pool.constant(cursor.u8()? as u16)?;
                    visitor.visit_ldc_insn(&constant);
                }
                InsnKind::LdcWide => {
                    let constant = self.pool.constant(cursor.u16()?)?;
                    visitor.visit_ldc_insn(&constant);
                }
                InsnKind::Iinc => {
                    let var = cursor.u8()?;
                    let increment = cursor.i8()?;
                    visitor.visit_iinc_insn(var as u16, increment as i16);
                }
                InsnKind::Wide => {
                    let opcode = cursor.u8()?;
                    let var = cursor.u16()?;
                    if opcode == IINC {
                        let increment = cursor.i16()?;
                        visitor.visit_iinc_insn(var, increment);
                    } else {
                        visitor.visit_var_insn(opcode, var);
                    }
                }
                InsnKind::Type => {
                    let type_name = self.pool.class_name(cursor.u16()?)?;
                    visitor.visit_type_insn(opcode, type_name);
                }
                InsnKind::FieldOrMethod | InsnKind::InterfaceMethod => {
                    let member = self.pool.member_ref(cursor.u16()?)?;
                    if opcode < INVOKEVIRTUAL {
                        visitor.visit_field_insn(
                            opcode,
                            member.owner,
                            member.name,
                            member.descriptor,
                        );
                    } else {
                        visitor.visit_method_insn(
                            opcode,
                            member.owner,
                            member.name,
                            member.descriptor,
                            member.interface,
                        );
                    }
                    if opcode == INVOKEINTERFACE {
                        cursor.skip(2)?;
                    }
                }
                InsnKind::InvokeDynamic => {
                    let index = cursor.u16()?;
                    cursor.skip(2)?;
                    let (name, descriptor, handle, arguments) = self.pool.invoke_dynamic(index)?;
                    visitor.visit_invoke_dynamic_insn(name, descriptor, &handle, &arguments);
                }
                InsnKind::Label => {
                    let target = offset + cursor.i16()? as i64;
                    visitor.visit_jump_insn(opcode, labels.get(target));
                }
                InsnKind::WideLabel => {
                    let target = offset + cursor.i32()? as i64;
                    visitor.visit_jump_insn(opcode - (GOTO_W - GOTO), labels.get(target));
                }
                InsnKind::TableSwitch => {
                    cursor.skip(switch_padding(offset))?;
                    let default = labels.get(offset + cursor.i32()? as i64);
                    let min = cursor.i32()?;
                    let max = cursor.i32()?;
                    let mut targets = vec![];
                    for _ in min as i64..=max as i64 {
                        targets.push(labels.get(offset + cursor.i32()? as i64));
                    }
                    visitor.visit_table_switch_insn(min, max, default, &targets);
                }
                InsnKind::LookupSwitch => {
                    cursor.skip(switch_padding(offset))?;
                    let default = labels.get(offset + cursor.i32()? as i64);
                    let pairs = cursor.i32()?.max(0) as usize;
                    let mut keys = Vec::with_capacity(pairs.min(code_length));
                    let mut targets = Vec::with_capacity(pairs.min(code_length));
                    for _ in 0..pairs {
                        keys.push(cursor.i32()?);
                        targets.push(labels.get(offset + cursor.i32()? as i64));
                    }
                    visitor.visit_lookup_switch_insn(default, &keys, &targets);
                }
                InsnKind::MultiANewArray => {
                    let descriptor = self.pool.class_name(cursor.u16()?)?;
                    let dimensions = cursor.u8()?;
                    visitor.visit_multi_anew_array_insn(descriptor, dimensions);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::switch_padding;

    #[test]
    fn switch_operands_are_aligned() {
        assert_eq!(switch_padding(0), 3);
        assert_eq!(switch_padding(1), 2);
        assert_eq!(switch_padding(2), 1);
        assert_eq!(switch_padding(3), 0);
        assert_eq!(switch_padding(4), 3);
    }
}
