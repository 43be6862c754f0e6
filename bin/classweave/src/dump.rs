use classweave::jvm::opcodes::mnemonic;
use classweave::jvm::*;
use std::collections::HashMap;

/// Class visitor printing one line per event
pub struct Dump;

impl ClassVisitor for Dump {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) {
        println!("class {} (version {}, {:?})", name, version, access);
        if let Some(super_name) = super_name {
            println!("  extends {}", super_name);
        }
        for interface in interfaces {
            println!("  implements {}", interface);
        }
        if let Some(signature) = signature {
            println!("  signature {}", signature);
        }
    }

    fn visit_source(&mut self, file: Option<&str>, debug: Option<&str>) {
        if let Some(file) = file {
            println!("  source {}", file);
        }
        if let Some(debug) = debug {
            println!("  source debug ({} chars)", debug.len());
        }
    }

    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, descriptor: Option<&str>) {
        match (name, descriptor) {
            (Some(name), Some(descriptor)) => {
                println!("  enclosing method {}.{}{}", owner, name, descriptor)
            }
            _ => println!("  enclosing class {}", owner),
        }
    }

    fn visit_nest_host(&mut self, host: &str) {
        println!("  nest host {}", host);
    }

    fn visit_nest_member(&mut self, member: &str) {
        println!("  nest member {}", member);
    }

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        println!("  @{}", descriptor);
        Some(Box::new(DumpAnnotation { indent: 4 }))
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) {
        println!(
            "  inner class {} (outer {}, simple name {}, {:?})",
            name,
            outer_name.unwrap_or("-"),
            inner_name.unwrap_or("-"),
            access
        );
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        _signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        match value {
            Some(value) => println!("  field {} {} = {:?} ({:?})", name, descriptor, value, access),
            None => println!("  field {} {} ({:?})", name, descriptor, access),
        }
        None
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        _signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        println!("  method {}{} ({:?})", name, descriptor, access);
        for exception in exceptions {
            println!("    throws {}", exception);
        }
        Some(Box::new(DumpMethod::default()))
    }

    fn visit_end(&mut self) {
        println!("end");
    }
}

struct DumpAnnotation {
    indent: usize,
}

impl DumpAnnotation {
    fn line(&self, name: Option<&str>, text: std::fmt::Arguments) {
        match name {
            Some(name) => println!("{:indent$}{} = {}", "", name, text, indent = self.indent),
            None => println!("{:indent$}{}", "", text, indent = self.indent),
        }
    }
}

impl AnnotationVisitor for DumpAnnotation {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) {
        self.line(name, format_args!("{:?}", value));
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) {
        self.line(name, format_args!("{}.{}", descriptor, value));
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.line(name, format_args!("@{}", descriptor));
        Some(Box::new(DumpAnnotation {
            indent: self.indent + 2,
        }))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.line(name, format_args!("["));
        Some(Box::new(DumpAnnotation {
            indent: self.indent + 2,
        }))
    }
}

/// Method visitor printing instructions, naming labels `L0`, `L1`, ... as they show up
#[derive(Default)]
struct DumpMethod {
    labels: HashMap<Label, usize>,
}

impl DumpMethod {
    fn label(&mut self, label: Label) -> String {
        let next = self.labels.len();
        format!("L{}", self.labels.entry(label).or_insert(next))
    }

    fn insn(&self, opcode: u8, operands: std::fmt::Arguments) {
        println!("      {} {}", mnemonic(opcode), operands);
    }
}

impl MethodVisitor for DumpMethod {
    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        println!("    @{}", descriptor);
        Some(Box::new(DumpAnnotation { indent: 6 }))
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        println!("    parameter {} @{}", parameter, descriptor);
        Some(Box::new(DumpAnnotation { indent: 6 }))
    }

    fn visit_insn(&mut self, opcode: u8) {
        println!("      {}", mnemonic(opcode));
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        self.insn(opcode, format_args!("{}", operand));
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        self.insn(opcode, format_args!("{}", var));
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) {
        self.insn(opcode, format_args!("{}", type_name));
    }

    fn visit_field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        self.insn(opcode, format_args!("{}.{} {}", owner, name, descriptor));
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        _interface: bool,
    ) {
        self.insn(opcode, format_args!("{}.{}{}", owner, name, descriptor));
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &MethodHandle,
        bootstrap_arguments: &[ConstantValue],
    ) {
        println!(
            "      invokedynamic {}{} via {}.{} ({} arguments)",
            name,
            descriptor,
            bootstrap_method.owner,
            bootstrap_method.name,
            bootstrap_arguments.len()
        );
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        let label = self.label(label);
        self.insn(opcode, format_args!("{}", label));
    }

    fn visit_label(&mut self, label: Label) {
        println!("    {}:", self.label(label));
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) {
        println!("      ldc {:?}", constant);
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) {
        println!("      iinc {} {}", var, increment);
    }

    fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) {
        let default = self.label(default);
        let labels: Vec<String> = labels.iter().map(|label| self.label(*label)).collect();
        println!(
            "      tableswitch {}..={} [{}] default {}",
            min,
            max,
            labels.join(", "),
            default
        );
    }

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) {
        let default = self.label(default);
        let cases: Vec<String> = keys
            .iter()
            .zip(labels)
            .map(|(key, label)| format!("{}: {}", key, self.label(*label)))
            .collect();
        println!(
            "      lookupswitch [{}] default {}",
            cases.join(", "),
            default
        );
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) {
        println!("      multianewarray {} {}", descriptor, dimensions);
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
        let (start, end, handler) = (self.label(start), self.label(end), self.label(handler));
        println!(
            "    try {}..{} catch {} -> {}",
            start,
            end,
            catch_type.unwrap_or("any"),
            handler
        );
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        _signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) {
        let (start, end) = (self.label(start), self.label(end));
        println!(
            "    local {} {} {} ({}..{})",
            index, name, descriptor, start, end
        );
    }

    fn visit_line_number(&mut self, line: u16, start: Label) {
        println!("    line {} at {}", line, self.label(start));
    }

    fn visit_max_stack(&mut self, max_stack: u16) {
        println!("    max stack {}", max_stack);
    }
}
