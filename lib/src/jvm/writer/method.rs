use super::annotation::AnnotationWriter;
use super::class::ClassContext;
use crate::jvm::access_flags::AccessBits;
use crate::jvm::analysis::stack_map::{compress_frames, legacy_frames};
use crate::jvm::analysis::{Compute, ControlFlow, Handler, MethodContext};
use crate::jvm::attributes::{
    AnnotationList, Attribute, Code, Deprecated, ExceptionHandler, Exceptions, LineNumber,
    LineNumberTable, LocalVariable, LocalVariableTable, LocalVariableTypeTable,
    RuntimeVisibleAnnotations, RuntimeVisibleParameterAnnotations, Signature, Synthetic,
};
use crate::jvm::constants::{ClassConstantIndex, Utf8ConstantIndex};
use crate::jvm::descriptors::{argument_and_return_sizes, parameter_types};
use crate::jvm::opcodes::*;
use crate::jvm::{
    AnnotationVisitor, ConstantValue, Error, Label, MethodAccessFlags, MethodHandle,
    MethodVisitor, Serialize, SourceId,
};
use crate::util::ByteVector;
use log::trace;

/// Largest code array a method can have
const MAX_CODE_LENGTH: usize = 0xFFFF;

/// Local variable table entry, waiting for its labels to be resolved
struct PendingLocal {
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    signature: Option<Utf8ConstantIndex>,
    start: Label,
    end: Label,
    index: u16,
}

/// Writer for one `method_info`, including its bytecode
///
/// Instructions are encoded as they are visited and fed to a [`ControlFlow`], so that the
/// maximum stack size (and, depending on the class version and writer options, the stack map
/// frames) can be computed once the body is complete. The finished method is appended to the
/// class on `visit_end` (or when the writer is dropped).
pub struct MethodWriter<'w, 'h> {
    context: &'w mut ClassContext<'h>,
    out: &'w mut Vec<ByteVector>,

    access: MethodAccessFlags,
    name: String,
    descriptor: String,
    name_index: u16,
    descriptor_index: u16,
    signature: Option<Utf8ConstantIndex>,
    exceptions: Vec<ClassConstantIndex>,
    annotations: AnnotationList,
    parameter_annotations: Vec<AnnotationList>,

    code: ByteVector,
    flow: ControlFlow,
    handlers: Vec<Handler>,
    declared_max_stack: u16,
    max_locals: usize,
    local_variables: Vec<PendingLocal>,
    line_numbers: Vec<(Label, u16)>,

    finished: bool,
}

impl<'w, 'h> MethodWriter<'w, 'h> {
    pub(super) fn new(
        context: &'w mut ClassContext<'h>,
        out: &'w mut Vec<ByteVector>,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> MethodWriter<'w, 'h> {
        let pool = &mut context.pool;
        let name_index = pool.get_utf8(name).index();
        let descriptor_index = pool.get_utf8(descriptor).index();
        let signature = signature.map(|signature| pool.get_utf8(signature));
        let exceptions = exceptions
            .iter()
            .map(|exception| pool.get_class(exception))
            .collect();

        let mut max_locals = (argument_and_return_sizes(descriptor) >> 2) as usize;
        if access.contains(MethodAccessFlags::STATIC) {
            max_locals -= 1;
        }

        let compute = context.options.frames.for_version(context.version);
        let mut code = ByteVector::new();
        let flow = ControlFlow::new(compute, &mut code);

        MethodWriter {
            context,
            out,
            access,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            name_index,
            descriptor_index,
            signature,
            exceptions,
            annotations: AnnotationList::default(),
            parameter_annotations: vec![],
            code,
            flow,
            handlers: vec![],
            declared_max_stack: 0,
            max_locals,
            local_variables: vec![],
            line_numbers: vec![],
            finished: false,
        }
    }

    /// Name and descriptor of the method, qualified with the class name
    fn qualified_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.context.class_name, self.name, self.descriptor
        )
    }

    fn update_max_locals(&mut self, slots: usize) {
        self.max_locals = self.max_locals.max(slots);
    }

    fn report_overflow(&mut self, overflow: Option<isize>) {
        if let Some(offset) = overflow {
            let method = self.qualified_name();
            self.context.fail(Error::JumpOffsetOverflow { method, offset });
        }
    }

    fn check(&mut self, result: Result<(), Error>) {
        if let Err(err) = result {
            self.context.fail(err);
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match self.assemble() {
            Ok(method) => self.out.push(method),
            Err(err) => self.context.fail(err),
        }
    }

    /// Encode the whole `method_info`
    fn assemble(&mut self) -> Result<ByteVector, Error> {
        let major_version = self.context.version.major_version;
        let access = AccessBits {
            bits: self.access.bits(),
        };

        let mut attributes: Vec<Attribute> = vec![];
        if !self.code.is_empty() {
            attributes.push(self.code_attribute()?);
        }

        let pool = &mut self.context.pool;
        if !self.exceptions.is_empty() {
            let exceptions = std::mem::take(&mut self.exceptions);
            attributes.push(pool.get_attribute(Exceptions(exceptions)));
        }
        if access.synthetic_attribute(major_version) {
            attributes.push(pool.get_attribute(Synthetic));
        }
        if access.deprecated() {
            attributes.push(pool.get_attribute(Deprecated));
        }
        if let Some(signature) = self.signature {
            attributes.push(pool.get_attribute(Signature { signature }));
        }
        if !self.annotations.is_empty() {
            let annotations = std::mem::take(&mut self.annotations);
            attributes.push(pool.get_attribute(RuntimeVisibleAnnotations(annotations)));
        }
        if !self.parameter_annotations.is_empty() {
            let mut parameters = std::mem::take(&mut self.parameter_annotations);
            let parameter_count = parameter_types(&self.descriptor).len();
            if parameters.len() < parameter_count {
                parameters.resize_with(parameter_count, AnnotationList::default);
            }
            attributes.push(pool.get_attribute(RuntimeVisibleParameterAnnotations(parameters)));
        }

        let mut method = ByteVector::new();
        method
            .put_short(access.class_file_flags(major_version))
            .put_short(self.name_index)
            .put_short(self.descriptor_index);
        attributes.serialize(&mut method)?;
        Ok(method)
    }

    /// Finish the analysis and encode the `Code` attribute
    fn code_attribute(&mut self) -> Result<Attribute, Error> {
        if self.code.len() > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow {
                method: self.qualified_name(),
                length: self.code.len(),
            });
        }

        let mut exception_table = self.exception_table();
        let mut stack_map = None;
        let max_stack = match self.flow.compute() {
            Compute::MaxStack => {
                let computed = self.flow.compute_max_stack(&self.handlers);
                computed.max(self.declared_max_stack as i32)
            }
            Compute::Frames => {
                trace!("computing frames for {}{}", self.name, self.descriptor);
                let context = &mut *self.context;
                let method = MethodContext {
                    class_name: &context.class_name,
                    name: &self.name,
                    descriptor: &self.descriptor,
                    is_static: self.access.contains(MethodAccessFlags::STATIC),
                    is_constructor: self.name == "<init>",
                    max_locals: self.max_locals,
                };
                let analysis = self.flow.compute_frames(
                    &self.handlers,
                    &method,
                    self.code.len(),
                    &mut context.types,
                    &*context.hierarchy,
                )?;

                for (start, end) in &analysis.dead_code {
                    let code = self.code.as_mut_slice();
                    for byte in &mut code[*start..*end - 1] {
                        *byte = NOP;
                    }
                    code[*end - 1] = ATHROW;
                    remove_range(&mut exception_table, *start as u16, *end as u16);
                }

                if analysis.frames.len() > 1 {
                    let pool = &mut context.pool;
                    stack_map = Some(if context.version.supports_stack_map_table() {
                        let table = compress_frames(&analysis.frames, &context.types, pool);
                        pool.get_attribute(table)
                    } else {
                        let table = legacy_frames(&analysis.frames, &context.types, pool);
                        pool.get_attribute(table)
                    });
                }
                analysis.max_stack
            }
        };

        let mut attributes = vec![];
        let mut local_variables = vec![];
        let mut local_variable_types = vec![];
        for local in &self.local_variables {
            let blocks = self.flow.blocks();
            let (start, end) = match (blocks.position(local.start), blocks.position(local.end)) {
                (Some(start), Some(end)) if end >= start => (start, end),
                _ => continue,
            };
            let entry = LocalVariable {
                start_pc: start as u16,
                length: (end - start) as u16,
                name: local.name,
                descriptor: local.descriptor,
                index: local.index,
            };
            if let Some(signature) = local.signature {
                local_variable_types.push(LocalVariable {
                    descriptor: signature,
                    ..entry.clone()
                });
            }
            local_variables.push(entry);
        }
        let line_numbers: Vec<LineNumber> = self
            .line_numbers
            .iter()
            .filter_map(|(label, line)| {
                let start_pc = self.flow.blocks().position(*label)?;
                Some(LineNumber {
                    start_pc: start_pc as u16,
                    line_number: *line,
                })
            })
            .collect();

        let pool = &mut self.context.pool;
        if !local_variables.is_empty() {
            attributes.push(pool.get_attribute(LocalVariableTable(local_variables)));
        }
        if !local_variable_types.is_empty() {
            attributes.push(pool.get_attribute(LocalVariableTypeTable(local_variable_types)));
        }
        if !line_numbers.is_empty() {
            attributes.push(pool.get_attribute(LineNumberTable(line_numbers)));
        }
        attributes.extend(stack_map);

        let code = Code {
            max_stack: max_stack.max(0) as u16,
            max_locals: self.max_locals as u16,
            code_array: self.code.as_slice().to_vec(),
            exception_table,
            attributes,
        };
        Ok(pool.get_attribute(code))
    }

    /// Exception handlers with resolved offsets, in visiting order
    fn exception_table(&mut self) -> Vec<ExceptionHandler> {
        let mut table = vec![];
        for handler in &self.handlers {
            let blocks = self.flow.blocks();
            let positions = (
                blocks.position(handler.start),
                blocks.position(handler.end),
                blocks.position(handler.handler),
            );
            if let (Some(start), Some(end), Some(handler_pc)) = positions {
                let catch_type = handler
                    .catch_type
                    .as_deref()
                    .map(|catch_type| self.context.pool.get_class(catch_type));
                table.push(ExceptionHandler {
                    start_pc: start as u16,
                    end_pc: end as u16,
                    handler_pc: handler_pc as u16,
                    catch_type,
                });
            }
        }
        table
    }

    fn put_switch_labels(&mut self, source: usize, labels: &[Label]) {
        for label in labels {
            self.flow
                .blocks_mut()
                .put_reference(*label, source, &mut self.code, true);
        }
    }
}

/// Take `[start, end)` out of every exception handler range, splitting ranges when needed
fn remove_range(handlers: &mut Vec<ExceptionHandler>, start: u16, end: u16) {
    let mut index = 0;
    while index < handlers.len() {
        let handler = &mut handlers[index];
        index += 1;
        if end <= handler.start_pc || start >= handler.end_pc {
            continue;
        }
        if start <= handler.start_pc {
            if end >= handler.end_pc {
                index -= 1;
                handlers.remove(index);
            } else {
                handler.start_pc = end;
            }
        } else if end >= handler.end_pc {
            handler.end_pc = start;
        } else {
            let tail = ExceptionHandler {
                start_pc: end,
                ..handler.clone()
            };
            handler.end_pc = start;
            handlers.insert(index, tail);
            index += 1;
        }
    }
}

impl<'w, 'h> MethodVisitor for MethodWriter<'w, 'h> {
    fn copy_method(&mut self, source: SourceId, attributes: &[u8]) -> bool {
        let untouched = self.code.is_empty()
            && self.annotations.is_empty()
            && self.parameter_annotations.is_empty();
        if self.context.source != Some(source) || !untouched {
            return false;
        }
        let access = AccessBits {
            bits: self.access.bits(),
        };
        let mut method = ByteVector::with_capacity(6 + attributes.len());
        method
            .put_short(access.class_file_flags(self.context.version.major_version))
            .put_short(self.name_index)
            .put_short(self.descriptor_index)
            .put_byte_array(attributes);
        self.out.push(method);
        self.finished = true;
        true
    }

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationWriter::new(
            &mut self.context.pool,
            &mut self.annotations,
            descriptor,
        )))
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let parameter = parameter as usize;
        if self.parameter_annotations.len() <= parameter {
            self.parameter_annotations
                .resize_with(parameter + 1, AnnotationList::default);
        }
        Some(Box::new(AnnotationWriter::new(
            &mut self.context.pool,
            &mut self.parameter_annotations[parameter],
            descriptor,
        )))
    }

    fn visit_insn(&mut self, opcode: u8) {
        self.code.put_byte(opcode);
        self.flow.insn(opcode, &mut self.code);
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        self.flow.int_insn(opcode, operand);
        if opcode == SIPUSH {
            self.code.put12(opcode, operand as u16);
        } else {
            self.code.put11(opcode, operand as u8);
        }
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        let wide = matches!(opcode, LLOAD | DLOAD | LSTORE | DSTORE);
        self.update_max_locals(var as usize + if wide { 2 } else { 1 });

        if var < 4 && opcode != RET {
            let implicit = if opcode < ISTORE {
                ILOAD_0 + ((opcode - ILOAD) << 2)
            } else {
                ISTORE_0 + ((opcode - ISTORE) << 2)
            };
            self.code.put_byte(implicit + var as u8);
        } else if var >= 256 {
            self.code.put_byte(WIDE).put12(opcode, var);
        } else {
            self.code.put11(opcode, var as u8);
        }
        self.flow.var_insn(opcode, var, &mut self.code);

        // A store inside a try block changes the locals seen by its handlers
        if opcode >= ISTORE && self.flow.compute() == Compute::Frames && !self.handlers.is_empty()
        {
            self.visit_label(Label::new());
        }
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) {
        let offset = self.code.len();
        let result = self
            .flow
            .type_insn(opcode, type_name, offset, &mut self.context.types);
        self.check(result);
        let class = self.context.pool.get_class(type_name);
        self.code.put12(opcode, class.index());
    }

    fn visit_field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        let result = self
            .flow
            .field_insn(opcode, descriptor, &mut self.context.types);
        self.check(result);
        let field = self.context.pool.get_field_ref(owner, name, descriptor);
        self.code.put12(opcode, field.index());
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) {
        let result = self
            .flow
            .method_insn(opcode, name, descriptor, &mut self.context.types);
        self.check(result);
        let method = self
            .context
            .pool
            .get_method_ref(owner, name, descriptor, interface);
        if opcode == INVOKEINTERFACE {
            let argument_size = argument_and_return_sizes(descriptor) >> 2;
            self.code
                .put12(opcode, method.index())
                .put11(argument_size as u8, 0);
        } else {
            self.code.put12(opcode, method.index());
        }
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &MethodHandle,
        bootstrap_arguments: &[ConstantValue],
    ) {
        let result = self
            .flow
            .invoke_dynamic_insn(descriptor, &mut self.context.types);
        self.check(result);
        let call_site = self.context.pool.get_invoke_dynamic(
            name,
            descriptor,
            bootstrap_method,
            bootstrap_arguments,
        );
        self.code
            .put12(INVOKEDYNAMIC, call_site.index())
            .put_short(0);
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        let next = self.flow.jump(opcode, label);
        let source = self.code.len();
        let backward = self.flow.blocks().position(label);
        let far = backward.map_or(false, |target| {
            (target as isize - source as isize) < i16::MIN as isize
        });

        if far {
            if opcode == GOTO {
                self.code.put_byte(GOTO_W);
            } else if opcode == JSR {
                self.code.put_byte(JSR_W);
            } else {
                // Jump over an unconditional wide jump when the condition does not hold
                if let Some(next) = next {
                    self.flow.mark_label_target(next);
                }
                self.code.put_byte(invert_jump(opcode)).put_short(8);
                self.code.put_byte(GOTO_W);
            }
            let source = self.code.len() - 1;
            self.flow
                .blocks_mut()
                .put_reference(label, source, &mut self.code, true);
        } else {
            self.code.put_byte(opcode);
            self.flow
                .blocks_mut()
                .put_reference(label, source, &mut self.code, false);
        }

        let overflow = self.flow.end_jump(opcode, next, &mut self.code);
        self.report_overflow(overflow);
    }

    fn visit_label(&mut self, label: Label) {
        let overflow = self.flow.visit_label(label, &mut self.code);
        self.report_overflow(overflow);
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) {
        let result = self.flow.ldc(constant, &mut self.context.types);
        self.check(result);
        let index = self.context.pool.get_constant(constant).0;
        if constant.is_wide() {
            self.code.put12(LDC2_W, index);
        } else if index >= 256 {
            self.code.put12(LDC_W, index);
        } else {
            self.code.put11(LDC, index as u8);
        }
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) {
        self.flow.iinc(var);
        self.update_max_locals(var as usize + 1);
        if var > 255 || increment > 127 || increment < -128 {
            self.code
                .put_byte(WIDE)
                .put12(IINC, var)
                .put_short(increment as u16);
        } else {
            self.code
                .put_byte(IINC)
                .put11(var as u8, increment as u8);
        }
    }

    fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) {
        let source = self.code.len();
        self.code.put_byte(TABLESWITCH).pad_to_multiple_of_4();
        self.put_switch_labels(source, &[default]);
        self.code.put_int(min).put_int(max);
        self.put_switch_labels(source, labels);
        self.flow.switch(default, labels, &mut self.code);
    }

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) {
        let source = self.code.len();
        self.code.put_byte(LOOKUPSWITCH).pad_to_multiple_of_4();
        self.put_switch_labels(source, &[default]);
        self.code.put_int(labels.len() as i32);
        for (key, label) in keys.iter().zip(labels) {
            self.code.put_int(*key);
            self.put_switch_labels(source, &[*label]);
        }
        self.flow.switch(default, labels, &mut self.code);
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) {
        let result = self
            .flow
            .multi_anew_array(descriptor, dimensions, &mut self.context.types);
        self.check(result);
        let class = self.context.pool.get_class(descriptor);
        self.code
            .put12(MULTIANEWARRAY, class.index())
            .put_byte(dimensions);
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
        self.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        });
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
        let wide = matches!(descriptor.as_bytes().first(), Some(b'J' | b'D'));
        self.update_max_locals(index as usize + if wide { 2 } else { 1 });
        let pool = &mut self.context.pool;
        let local = PendingLocal {
            name: pool.get_utf8(name),
            descriptor: pool.get_utf8(descriptor),
            signature: signature.map(|signature| pool.get_utf8(signature)),
            start,
            end,
            index,
        };
        self.local_variables.push(local);
    }

    fn visit_line_number(&mut self, line: u16, start: Label) {
        self.line_numbers.push((start, line));
    }

    fn visit_max_stack(&mut self, max_stack: u16) {
        self.declared_max_stack = max_stack;
    }

    fn visit_end(&mut self) {
        self.finish();
    }
}

impl<'w, 'h> Drop for MethodWriter<'w, 'h> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn handler(start_pc: u16, end_pc: u16) -> ExceptionHandler {
        ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc: 50,
            catch_type: None,
        }
    }

    fn ranges(handlers: &[ExceptionHandler]) -> Vec<(u16, u16)> {
        handlers.iter().map(|h| (h.start_pc, h.end_pc)).collect()
    }

    #[test]
    fn dead_ranges_leave_handlers() {
        let mut handlers = vec![handler(0, 10), handler(5, 8), handler(20, 30)];
        remove_range(&mut handlers, 4, 9);
        assert_eq!(ranges(&handlers), [(0, 4), (9, 10), (20, 30)]);

        let mut handlers = vec![handler(0, 10)];
        remove_range(&mut handlers, 0, 6);
        assert_eq!(ranges(&handlers), [(6, 10)]);

        remove_range(&mut handlers, 8, 12);
        assert_eq!(ranges(&handlers), [(6, 8)]);
    }
}
