#![allow(dead_code)]

use classweave::jvm::*;
use classweave::util::Cursor;
use std::collections::HashMap;

/// Contents of a `Code` attribute, with its sub-attributes left encoded
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<[u16; 4]>,
    pub attributes: HashMap<String, Vec<u8>>,
}

/// Find the `Code` attribute of the method called `method`
pub fn method_code(bytes: &[u8], method: &str) -> Option<MethodCode> {
    let pool = ConstantPoolReader::parse(bytes, 8).unwrap();
    let mut cursor = Cursor::new(bytes, pool.end() + 6);
    let interface_count = cursor.u16().unwrap() as usize;
    cursor.skip(2 * interface_count).unwrap();

    for _ in 0..cursor.u16().unwrap() {
        cursor.skip(6).unwrap();
        read_attributes(&pool, &mut cursor);
    }
    for _ in 0..cursor.u16().unwrap() {
        cursor.skip(2).unwrap();
        let name = pool.utf8(cursor.u16().unwrap()).unwrap().to_owned();
        cursor.skip(2).unwrap();
        let attributes = read_attributes(&pool, &mut cursor);
        if name != method {
            continue;
        }
        let code = attributes.get("Code")?;
        let mut data = Cursor::new(code, 0);
        let max_stack = data.u16().unwrap();
        let max_locals = data.u16().unwrap();
        let code_length = data.u32().unwrap() as usize;
        let code_bytes = data.bytes(code_length).unwrap().to_vec();
        let exception_table = (0..data.u16().unwrap())
            .map(|_| {
                [
                    data.u16().unwrap(),
                    data.u16().unwrap(),
                    data.u16().unwrap(),
                    data.u16().unwrap(),
                ]
            })
            .collect();
        let attributes = read_attributes(&pool, &mut data);
        return Some(MethodCode {
            max_stack,
            max_locals,
            code: code_bytes,
            exception_table,
            attributes,
        });
    }
    None
}

fn read_attributes(pool: &ConstantPoolReader, cursor: &mut Cursor) -> HashMap<String, Vec<u8>> {
    let mut attributes = HashMap::new();
    for _ in 0..cursor.u16().unwrap() {
        let name = pool.utf8(cursor.u16().unwrap()).unwrap().to_owned();
        let len = cursor.u32().unwrap() as usize;
        attributes.insert(name, cursor.bytes(len).unwrap().to_vec());
    }
    attributes
}

/// Start a class extending `java/lang/Object`
pub fn class_writer(name: &str, version: Version, frames: FrameComputation) -> ClassWriter<'static> {
    let mut writer = ClassWriter::new(WriterOptions { frames });
    writer.visit(
        version,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name,
        None,
        Some("java/lang/Object"),
        &[],
    );
    writer
}

/// Class visitor recording every event as a line of text
///
/// Labels are named after the order in which they first show up in a method, so two logs of
/// the same class compare equal even though the label handles differ.
#[derive(Default)]
pub struct EventLog {
    pub events: Vec<String>,
}

impl EventLog {
    pub fn of(bytes: &[u8]) -> Vec<String> {
        let mut log = EventLog::default();
        ClassReader::new(bytes)
            .unwrap()
            .accept(&mut log, ReaderFlags::default())
            .unwrap();
        log.events
    }
}

impl ClassVisitor for EventLog {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) {
        self.events.push(format!(
            "class {} {:?} {:?} {:?} {:?} {:?}",
            version, access, name, signature, super_name, interfaces
        ));
    }

    fn visit_source(&mut self, file: Option<&str>, debug: Option<&str>) {
        self.events.push(format!("source {:?} {:?}", file, debug));
    }

    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, descriptor: Option<&str>) {
        self.events
            .push(format!("outer {} {:?} {:?}", owner, name, descriptor));
    }

    fn visit_nest_host(&mut self, host: &str) {
        self.events.push(format!("nest host {}", host));
    }

    fn visit_nest_member(&mut self, member: &str) {
        self.events.push(format!("nest member {}", member));
    }

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("annotation {}", descriptor));
        Some(Box::new(AnnotationLog {
            events: &mut self.events,
        }))
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) {
        self.events.push(format!(
            "inner {} {:?} {:?} {:?}",
            name, outer_name, inner_name, access
        ));
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        self.events.push(format!(
            "field {:?} {} {} {:?} {:?}",
            access, name, descriptor, signature, value
        ));
        Some(Box::new(FieldLog {
            events: &mut self.events,
        }))
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        self.events.push(format!(
            "method {:?} {}{} {:?} {:?}",
            access, name, descriptor, signature, exceptions
        ));
        Some(Box::new(MethodLog {
            events: &mut self.events,
            labels: HashMap::new(),
        }))
    }

    fn visit_end(&mut self) {
        self.events.push(String::from("end"));
    }
}

struct AnnotationLog<'a> {
    events: &'a mut Vec<String>,
}

impl<'a> AnnotationVisitor for AnnotationLog<'a> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) {
        self.events.push(format!("  {:?} = {:?}", name, value));
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) {
        self.events
            .push(format!("  {:?} = enum {} {}", name, descriptor, value));
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events
            .push(format!("  {:?} = annotation {}", name, descriptor));
        Some(Box::new(AnnotationLog {
            events: &mut *self.events,
        }))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("  {:?} = array", name));
        Some(Box::new(AnnotationLog {
            events: &mut *self.events,
        }))
    }

    fn visit_end(&mut self) {
        self.events.push(String::from("  end"));
    }
}

struct FieldLog<'a> {
    events: &'a mut Vec<String>,
}

impl<'a> FieldVisitor for FieldLog<'a> {
    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!(" annotation {}", descriptor));
        Some(Box::new(AnnotationLog {
            events: &mut *self.events,
        }))
    }

    fn visit_end(&mut self) {
        self.events.push(String::from(" field end"));
    }
}

struct MethodLog<'a> {
    events: &'a mut Vec<String>,
    labels: HashMap<Label, usize>,
}

impl<'a> MethodLog<'a> {
    fn label(&mut self, label: Label) -> String {
        let next = self.labels.len();
        format!("L{}", self.labels.entry(label).or_insert(next))
    }
}

impl<'a> MethodVisitor for MethodLog<'a> {
    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!(" annotation {}", descriptor));
        Some(Box::new(AnnotationLog {
            events: &mut *self.events,
        }))
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events
            .push(format!(" parameter {} annotation {}", parameter, descriptor));
        Some(Box::new(AnnotationLog {
            events: &mut *self.events,
        }))
    }

    fn visit_insn(&mut self, opcode: u8) {
        self.events.push(format!(" insn {}", opcode));
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) {
        self.events.push(format!(" int {} {}", opcode, operand));
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) {
        self.events.push(format!(" var {} {}", opcode, var));
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) {
        self.events.push(format!(" type {} {}", opcode, type_name));
    }

    fn visit_field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        self.events
            .push(format!(" field {} {}.{} {}", opcode, owner, name, descriptor));
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) {
        self.events.push(format!(
            " invoke {} {}.{}{} {}",
            opcode, owner, name, descriptor, interface
        ));
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &MethodHandle,
        bootstrap_arguments: &[ConstantValue],
    ) {
        self.events.push(format!(
            " indy {}{} {:?} {:?}",
            name, descriptor, bootstrap_method, bootstrap_arguments
        ));
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) {
        let label = self.label(label);
        self.events.push(format!(" jump {} {}", opcode, label));
    }

    fn visit_label(&mut self, label: Label) {
        let label = self.label(label);
        self.events.push(format!(" {}:", label));
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) {
        self.events.push(format!(" ldc {:?}", constant));
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) {
        self.events.push(format!(" iinc {} {}", var, increment));
    }

    fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) {
        let default = self.label(default);
        let labels: Vec<String> = labels.iter().map(|label| self.label(*label)).collect();
        self.events.push(format!(
            " tableswitch {} {} {} {:?}",
            min, max, default, labels
        ));
    }

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) {
        let default = self.label(default);
        let labels: Vec<String> = labels.iter().map(|label| self.label(*label)).collect();
        self.events.push(format!(
            " lookupswitch {} {:?} {:?}",
            default, keys, labels
        ));
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) {
        self.events
            .push(format!(" multianewarray {} {}", descriptor, dimensions));
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
        let (start, end, handler) = (self.label(start), self.label(end), self.label(handler));
        self.events.push(format!(
            " try {} {} {} {:?}",
            start, end, handler, catch_type
        ));
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
        let (start, end) = (self.label(start), self.label(end));
        self.events.push(format!(
            " local {} {} {:?} {} {} {}",
            name, descriptor, signature, start, end, index
        ));
    }

    fn visit_line_number(&mut self, line: u16, start: Label) {
        let start = self.label(start);
        self.events.push(format!(" line {} {}", line, start));
    }

    fn visit_max_stack(&mut self, max_stack: u16) {
        self.events.push(format!(" max stack {}", max_stack));
    }

    fn visit_end(&mut self) {
        self.events.push(String::from(" method end"));
    }
}
