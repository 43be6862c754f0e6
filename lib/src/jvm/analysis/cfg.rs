use super::{BlockStatus, Blocks, Edge, EdgeKind, Frame, FrameType};
use crate::jvm::descriptors::argument_and_return_sizes;
use crate::jvm::opcodes::*;
use crate::jvm::{ClassHierarchy, ConstantValue, Error, Label, TypeTable};
use crate::util::ByteVector;
use log::trace;

/// What the control flow analysis of a method computes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compute {
    /// Only the maximum stack size
    MaxStack,

    /// Stack map frames, and the maximum stack size along the way
    Frames,
}

/// Exception handler of a method, as visited
#[derive(Clone, Debug)]
pub struct Handler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}

/// What the analysis needs to know about the method itself
pub struct MethodContext<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
    pub is_constructor: bool,
    pub max_locals: usize,
}

/// Input frame of a block, as it needs to appear in the stack map
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedFrame {
    pub offset: usize,
    pub locals: Vec<FrameType>,
    pub stack: Vec<FrameType>,
}

/// Result of a frame computation
#[derive(Debug)]
pub struct FrameAnalysis {
    pub max_stack: i32,

    /// Implicit initial frame, followed by the frames to write in code order
    pub frames: Vec<ComputedFrame>,

    /// Unreachable code ranges `[start, end)`, to be replaced with `nop ... athrow`
    pub dead_code: Vec<(usize, usize)>,
}

/// Control flow graph of one method, built as instructions are written
///
/// Between blocks (after a return, throw or unconditional jump and before the next label) there
/// is no current block and instructions are not analyzed at all.
pub struct ControlFlow {
    compute: Compute,
    blocks: Blocks,
    first: usize,

    /// Block instructions are being added to
    current: Option<usize>,

    /// Last block in code order
    previous: Option<usize>,

    /// Stack size in the current block, relative to its input (when computing only max stack)
    stack_size: i32,
    max_stack_size: i32,
}

impl ControlFlow {
    pub fn new(compute: Compute, code: &mut ByteVector) -> ControlFlow {
        let mut blocks = Blocks::new();
        let first = blocks.fresh();
        blocks.get_mut(first).status |= BlockStatus::PUSHED;
        let mut flow = ControlFlow {
            compute,
            blocks,
            first,
            current: None,
            previous: None,
            stack_size: 0,
            max_stack_size: 0,
        };
        flow.visit_block(first, code);
        flow
    }

    pub fn compute(&self) -> Compute {
        self.compute
    }

    pub fn blocks(&self) -> &Blocks {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Blocks {
        &mut self.blocks
    }

    /// Whether instructions are currently reachable by fall through or a label
    pub fn in_block(&self) -> bool {
        self.current.is_some()
    }

    fn current_frame(&mut self) -> Option<&mut Frame> {
        let current = self.current?;
        self.blocks.get_mut(current).frame.as_mut()
    }

    fn grow(&mut self, delta: i32) {
        let size = self.stack_size + delta;
        self.max_stack_size = self.max_stack_size.max(size);
        self.stack_size = size;
    }

    fn add_edge(&mut self, kind: EdgeKind, target: usize) {
        if let Some(current) = self.current {
            self.blocks
                .get_mut(current)
                .edges
                .push(Edge { kind, target });
        }
    }

    fn mark_target(&mut self, index: usize) {
        let first = self.blocks.first(index);
        self.blocks.get_mut(first).status |= BlockStatus::TARGET;
    }

    /// Mark the block starting at `label` as needing a frame
    pub fn mark_label_target(&mut self, label: Label) {
        let index = self.blocks.index(label);
        self.mark_target(index);
    }

    /// End the current block without a fall through successor
    fn no_successor(&mut self, code: &mut ByteVector) {
        match self.compute {
            Compute::Frames => {
                let index = self.blocks.fresh();
                self.blocks.get_mut(index).frame = Some(Frame::new());
                self.blocks.resolve(index, code.len(), code);
                if let Some(previous) = self.previous {
                    self.blocks.get_mut(previous).successor = Some(index);
                }
                self.previous = Some(index);
            }
            Compute::MaxStack => {
                if let Some(current) = self.current {
                    self.blocks.get_mut(current).output_stack_max = self.max_stack_size;
                }
            }
        }
        self.current = None;
    }

    /// Place a label at the end of the code
    ///
    /// Returns the offset of a forward jump to the label which does not fit in 16 bits, if any.
    pub fn visit_label(&mut self, label: Label, code: &mut ByteVector) -> Option<isize> {
        let index = self.blocks.index(label);
        self.visit_block(index, code)
    }

    fn visit_block(&mut self, index: usize, code: &mut ByteVector) -> Option<isize> {
        let position = code.len();
        let overflow = self.blocks.resolve(index, position, code);
        if self.blocks.get(index).status.contains(BlockStatus::DEBUG) {
            return overflow;
        }

        match self.compute {
            Compute::Frames => {
                if let Some(current) = self.current {
                    if self.blocks.get(current).position == position {
                        // Same position as the current block: share it
                        let target = self.blocks.get(index).status & BlockStatus::TARGET;
                        self.blocks.get_mut(current).status |= target;
                        self.blocks.get_mut(index).owner = current;
                        return overflow;
                    }
                    self.add_edge(EdgeKind::Normal(0), index);
                }
                self.current = Some(index);
                let block = self.blocks.get_mut(index);
                if block.frame.is_none() {
                    block.frame = Some(Frame::new());
                }
                if let Some(previous) = self.previous {
                    if self.blocks.get(previous).position == position {
                        let target = self.blocks.get(index).status & BlockStatus::TARGET;
                        self.blocks.get_mut(previous).status |= target;
                        let block = self.blocks.get_mut(index);
                        block.owner = previous;
                        block.frame = None;
                        self.current = Some(previous);
                        return overflow;
                    }
                    self.blocks.get_mut(previous).successor = Some(index);
                }
                self.previous = Some(index);
            }
            Compute::MaxStack => {
                if let Some(current) = self.current {
                    self.blocks.get_mut(current).output_stack_max = self.max_stack_size;
                    self.add_edge(EdgeKind::Normal(self.stack_size), index);
                }
                self.current = Some(index);
                self.stack_size = 0;
                self.max_stack_size = 0;
                if let Some(previous) = self.previous {
                    self.blocks.get_mut(previous).successor = Some(index);
                }
                self.previous = Some(index);
            }
        }
        overflow
    }

    /// Account for an instruction without operands, after it has been written
    pub fn insn(&mut self, opcode: u8, code: &mut ByteVector) {
        if self.current.is_none() {
            return;
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_insn(opcode);
                }
            }
            Compute::MaxStack => self.grow(stack_size_delta(opcode)),
        }
        if is_return(opcode) || opcode == ATHROW {
            self.no_successor(code);
        }
    }

    pub fn int_insn(&mut self, opcode: u8, operand: i32) {
        if self.current.is_none() {
            return;
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_int_insn(opcode, operand);
                }
            }
            Compute::MaxStack => {
                if opcode != NEWARRAY {
                    self.grow(1);
                }
            }
        }
    }

    pub fn var_insn(&mut self, opcode: u8, var: u16, code: &mut ByteVector) {
        if self.current.is_none() {
            return;
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_var_insn(opcode, var);
                }
            }
            Compute::MaxStack => self.grow(stack_size_delta(opcode)),
        }
        if opcode == RET {
            self.no_successor(code);
        }
    }

    pub fn iinc(&mut self, var: u16) {
        if let Some(frame) = self.current_frame() {
            frame.execute_iinc(var);
        }
    }

    /// Account for a type instruction, before it is written at `offset`
    pub fn type_insn(
        &mut self,
        opcode: u8,
        type_name: &str,
        offset: usize,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_type_insn(opcode, type_name, offset, types)?;
                }
            }
            Compute::MaxStack => {
                if opcode == NEW {
                    self.grow(1);
                }
            }
        }
        Ok(())
    }

    pub fn field_insn(
        &mut self,
        opcode: u8,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_field_insn(opcode, descriptor, types)?;
                }
            }
            Compute::MaxStack => {
                let wide = matches!(descriptor.as_bytes().first(), Some(b'J' | b'D'));
                let delta = match (opcode, wide) {
                    (GETSTATIC, true) => 2,
                    (GETSTATIC, false) => 1,
                    (PUTSTATIC, true) => -2,
                    (PUTSTATIC, false) => -1,
                    (GETFIELD, true) => 1,
                    (GETFIELD, false) => 0,
                    (_, true) => -3,
                    (_, false) => -2,
                };
                self.grow(delta);
            }
        }
        Ok(())
    }

    pub fn method_insn(
        &mut self,
        opcode: u8,
        name: &str,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_method_insn(opcode, name, descriptor, types)?;
                }
            }
            Compute::MaxStack => {
                self.grow(invoke_delta(descriptor, opcode == INVOKESTATIC));
            }
        }
        Ok(())
    }

    pub fn invoke_dynamic_insn(
        &mut self,
        descriptor: &str,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_invoke_dynamic(descriptor, types)?;
                }
            }
            Compute::MaxStack => self.grow(invoke_delta(descriptor, true)),
        }
        Ok(())
    }

    /// Account for a jump, before it is written
    ///
    /// Returns the label which [`ControlFlow::end_jump`] must place right after the jump, if
    /// the jump falls through to a new block.
    pub fn jump(&mut self, opcode: u8, label: Label) -> Option<Label> {
        self.current?;
        let target = self.blocks.index(label);
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_jump(opcode);
                }
                self.mark_target(target);
                self.add_edge(EdgeKind::Normal(0), target);
                if opcode != GOTO {
                    return Some(Label::new());
                }
            }
            Compute::MaxStack => {
                self.grow(stack_size_delta(opcode));
                self.add_edge(EdgeKind::Normal(self.stack_size), target);
            }
        }
        None
    }

    /// Finish a jump, after it has been written
    pub fn end_jump(
        &mut self,
        opcode: u8,
        next: Option<Label>,
        code: &mut ByteVector,
    ) -> Option<isize> {
        if self.current.is_none() {
            return None;
        }
        let overflow = next.and_then(|next| self.visit_label(next, code));
        if opcode == GOTO {
            self.no_successor(code);
        }
        overflow
    }

    pub fn ldc(&mut self, constant: &ConstantValue, types: &mut TypeTable) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_ldc(constant, types)?;
                }
            }
            Compute::MaxStack => self.grow(if constant.is_wide() { 2 } else { 1 }),
        }
        Ok(())
    }

    /// Account for a switch, after it has been written
    pub fn switch(&mut self, default: Label, labels: &[Label], code: &mut ByteVector) {
        if self.current.is_none() {
            return;
        }
        let kind = match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_switch();
                }
                EdgeKind::Normal(0)
            }
            Compute::MaxStack => {
                self.stack_size -= 1;
                EdgeKind::Normal(self.stack_size)
            }
        };
        for label in std::iter::once(&default).chain(labels) {
            let target = self.blocks.index(*label);
            self.add_edge(kind, target);
            if self.compute == Compute::Frames {
                self.mark_target(target);
            }
        }
        self.no_successor(code);
    }

    pub fn multi_anew_array(
        &mut self,
        descriptor: &str,
        dimensions: u8,
        types: &mut TypeTable,
    ) -> Result<(), Error> {
        if self.current.is_none() {
            return Ok(());
        }
        match self.compute {
            Compute::Frames => {
                if let Some(frame) = self.current_frame() {
                    frame.execute_multi_anew_array(descriptor, dimensions, types)?;
                }
            }
            Compute::MaxStack => self.grow(1 - dimensions as i32),
        }
        Ok(())
    }

    /// Blocks from `start` (inclusive) to `end` (exclusive), in code order
    fn covered_blocks(&mut self, start: Label, end: Label) -> Vec<usize> {
        let start = self.blocks.index(start);
        let end = self.blocks.index(end);
        let start = self.blocks.first(start);
        let end = self.blocks.first(end);
        self.blocks
            .chain(start)
            .take_while(|block| *block != end)
            .collect()
    }

    /// Compute the maximum stack size, from the stack sizes recorded on every edge
    pub fn compute_max_stack(&mut self, handlers: &[Handler]) -> i32 {
        if let Some(current) = self.current {
            self.blocks.get_mut(current).output_stack_max = self.max_stack_size;
        }

        for handler in handlers {
            let target = self.blocks.index(handler.handler);
            for block in self.covered_blocks(handler.start, handler.end) {
                self.blocks.get_mut(block).edges.push(Edge {
                    kind: EdgeKind::Exception(FrameType::TOP),
                    target,
                });
            }
        }

        let mut max = 0;
        let mut stack = vec![self.first];
        while let Some(index) = stack.pop() {
            let block = self.blocks.get(index);
            let start = block.input_stack_top;
            max = max.max(start + block.output_stack_max);

            let edges = block.edges.clone();
            for edge in edges {
                let target = self.blocks.get_mut(edge.target);
                if !target.status.contains(BlockStatus::PUSHED) {
                    target.input_stack_top = match edge.kind {
                        EdgeKind::Exception(_) => 1,
                        EdgeKind::Normal(size) => start + size,
                    };
                    target.status |= BlockStatus::PUSHED;
                    stack.push(edge.target);
                }
            }
        }
        max
    }

    /// Compute the input frame of every reachable block with a fixed point iteration
    pub fn compute_frames(
        &mut self,
        handlers: &[Handler],
        method: &MethodContext,
        code_length: usize,
        types: &mut TypeTable,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<FrameAnalysis, Error> {
        for handler in handlers {
            let catch_type = handler.catch_type.as_deref().unwrap_or("java/lang/Throwable");
            let catch_type = FrameType::object(types.add_normal_type(catch_type));
            let target = self.blocks.index(handler.handler);
            self.mark_target(target);
            let target = self.blocks.first(target);
            for block in self.covered_blocks(handler.start, handler.end) {
                self.blocks.get_mut(block).edges.push(Edge {
                    kind: EdgeKind::Exception(catch_type),
                    target,
                });
            }
        }

        let initial = {
            let frame = self.blocks.get_mut(self.first).frame.get_or_insert_with(Frame::new);
            frame.init_input_frame(
                method.class_name,
                method.is_static,
                method.is_constructor,
                method.descriptor,
                method.max_locals,
                types,
            )?;
            ComputedFrame {
                offset: 0,
                locals: frame.input_locals.clone(),
                stack: frame.input_stack.clone(),
            }
        };

        let mut max_stack = 0;
        let mut queue = vec![self.first];
        let mut queued = vec![false; self.blocks.len()];
        queued[self.first] = true;
        while let Some(index) = queue.pop() {
            queued[index] = false;
            let block = self.blocks.get_mut(index);
            if block.status.contains(BlockStatus::TARGET) {
                block.status |= BlockStatus::STORE;
            }
            block.status |= BlockStatus::REACHABLE;
            let mut frame = match block.frame.take() {
                Some(frame) => frame,
                None => continue,
            };
            max_stack = max_stack.max(frame.input_stack.len() as i32 + frame.output_stack_max);

            let edges = block.edges.clone();
            for edge in edges {
                let target = self.blocks.first(edge.target);
                let exception = match edge.kind {
                    EdgeKind::Exception(catch_type) => Some(catch_type),
                    EdgeKind::Normal(_) => None,
                };
                let merged = if target == index {
                    let mut updated = frame.clone();
                    let merged =
                        frame.merge(&mut updated, exception, method.class_name, types, hierarchy);
                    frame = updated;
                    merged
                } else {
                    match self.blocks.get_mut(target).frame.as_mut() {
                        Some(target_frame) => frame.merge(
                            target_frame,
                            exception,
                            method.class_name,
                            types,
                            hierarchy,
                        ),
                        None => Some(false),
                    }
                };
                let changed = match merged {
                    Some(changed) => changed,
                    None => {
                        return Err(Error::InconsistentStackHeight {
                            method: format!(
                                "{}.{}{}",
                                method.class_name, method.name, method.descriptor
                            ),
                            offset: self.blocks.get(target).position,
                        })
                    }
                };
                if changed && !queued[target] {
                    queued[target] = true;
                    queue.push(target);
                }
            }
            self.blocks.get_mut(index).frame = Some(frame);
        }

        let mut frames = vec![initial];
        let mut dead_code = vec![];
        let chain: Vec<usize> = self.blocks.chain(self.first).collect();
        for index in chain {
            let block = self.blocks.get(index);
            if block.status.contains(BlockStatus::STORE) {
                if let Some(frame) = &block.frame {
                    frames.push(ComputedFrame {
                        offset: block.position,
                        locals: frame.input_locals.clone(),
                        stack: frame.input_stack.clone(),
                    });
                }
            }
            if !block.status.contains(BlockStatus::REACHABLE) {
                let start = block.position;
                let end = block
                    .successor
                    .map_or(code_length, |next| self.blocks.get(next).position);
                if end > start {
                    trace!("unreachable code at {}..{}", start, end);
                    max_stack = max_stack.max(1);
                    dead_code.push((start, end));
                    let throwable = types.add_normal_type("java/lang/Throwable");
                    frames.push(ComputedFrame {
                        offset: start,
                        locals: vec![],
                        stack: vec![FrameType::object(throwable)],
                    });
                }
            }
        }

        Ok(FrameAnalysis {
            max_stack,
            frames,
            dead_code,
        })
    }
}

/// Stack size change of an invocation
fn invoke_delta(descriptor: &str, is_static: bool) -> i32 {
    let sizes = argument_and_return_sizes(descriptor) as i32;
    let delta = (sizes & 3) - (sizes >> 2);
    if is_static {
        delta + 1
    } else {
        delta
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::SuperClassMap;

    #[test]
    fn invoke_deltas() {
        assert_eq!(invoke_delta("()V", true), 0);
        assert_eq!(invoke_delta("()V", false), -1);
        assert_eq!(invoke_delta("(IJ)D", true), -1);
        assert_eq!(invoke_delta("(Ljava/lang/String;)I", false), -1);
    }

    #[test]
    fn max_stack_across_blocks() {
        let mut code = ByteVector::new();
        let mut flow = ControlFlow::new(Compute::MaxStack, &mut code);
        let target = Label::new();

        // iconst_1; iconst_1; if_icmpeq target; iconst_1; iconst_1; iconst_1; pop; pop; pop
        for _ in 0..2 {
            code.put_byte(ICONST_1);
            flow.insn(ICONST_1, &mut code);
        }
        let next = flow.jump(IF_ICMPEQ, target);
        code.put_byte(IF_ICMPEQ);
        flow.blocks_mut().put_reference(target, 2, &mut code, false);
        flow.end_jump(IF_ICMPEQ, next, &mut code);
        for _ in 0..3 {
            code.put_byte(ICONST_1);
            flow.insn(ICONST_1, &mut code);
        }
        for _ in 0..3 {
            code.put_byte(POP);
            flow.insn(POP, &mut code);
        }
        flow.visit_label(target, &mut code);
        code.put_byte(RETURN);
        flow.insn(RETURN, &mut code);

        assert_eq!(flow.compute_max_stack(&[]), 3);
    }

    #[test]
    fn frames_only_at_jump_targets() {
        let hierarchy = SuperClassMap::new();
        let mut types = TypeTable::new();
        let mut code = ByteVector::new();
        let mut flow = ControlFlow::new(Compute::Frames, &mut code);
        let otherwise = Label::new();

        // iload_1; ifeq otherwise; iconst_1; ireturn; otherwise: iconst_2; ireturn
        code.put_byte(ILOAD_0 + 1);
        flow.var_insn(ILOAD, 1, &mut code);
        let next = flow.jump(IFEQ, otherwise);
        code.put_byte(IFEQ);
        flow.blocks_mut().put_reference(otherwise, 1, &mut code, false);
        flow.end_jump(IFEQ, next, &mut code);
        code.put_byte(ICONST_1);
        flow.insn(ICONST_1, &mut code);
        code.put_byte(IRETURN);
        flow.insn(IRETURN, &mut code);
        flow.visit_label(otherwise, &mut code);
        code.put_byte(ICONST_2);
        flow.insn(ICONST_2, &mut code);
        code.put_byte(IRETURN);
        flow.insn(IRETURN, &mut code);

        let method = MethodContext {
            class_name: "A",
            name: "f",
            descriptor: "(Z)I",
            is_static: false,
            is_constructor: false,
            max_locals: 2,
        };
        let analysis = flow
            .compute_frames(&[], &method, code.len(), &mut types, &hierarchy)
            .unwrap();
        assert_eq!(analysis.max_stack, 1);
        assert!(analysis.dead_code.is_empty());
        assert_eq!(analysis.frames.len(), 2);
        assert_eq!(analysis.frames[1].offset, 6);
        assert_eq!(analysis.frames[1].locals, analysis.frames[0].locals);
        assert!(analysis.frames[1].stack.is_empty());
    }

    #[test]
    fn unreachable_code_is_reported() {
        let hierarchy = SuperClassMap::new();
        let mut types = TypeTable::new();
        let mut code = ByteVector::new();
        let mut flow = ControlFlow::new(Compute::Frames, &mut code);

        // return; dead: iconst_0; pop; return
        code.put_byte(RETURN);
        flow.insn(RETURN, &mut code);
        flow.visit_label(Label::new(), &mut code);
        for opcode in [ICONST_0, POP, RETURN] {
            code.put_byte(opcode);
            flow.insn(opcode, &mut code);
        }

        let method = MethodContext {
            class_name: "A",
            name: "f",
            descriptor: "()V",
            is_static: true,
            is_constructor: false,
            max_locals: 0,
        };
        let analysis = flow
            .compute_frames(&[], &method, code.len(), &mut types, &hierarchy)
            .unwrap();
        assert_eq!(analysis.dead_code, [(1, 4)]);
        assert_eq!(analysis.frames.len(), 2);
        assert_eq!(analysis.frames[1].offset, 1);
        assert_eq!(analysis.frames[1].stack.len(), 1);
        assert_eq!(analysis.max_stack, 1);
    }
}
