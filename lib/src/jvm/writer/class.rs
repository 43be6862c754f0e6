use super::annotation::AnnotationWriter;
use super::field::FieldWriter;
use super::method::MethodWriter;
use super::options::WriterOptions;
use crate::jvm::access_flags::AccessBits;
use crate::jvm::attributes::{
    AnnotationList, Attribute, BootstrapMethods, Deprecated, EnclosingMethod, InnerClass,
    InnerClasses, NestHost, NestMembers, RuntimeVisibleAnnotations, Signature,
    SourceDebugExtension, SourceFile, Synthetic,
};
use crate::jvm::constants::{ClassConstantIndex, Utf8ConstantIndex};
use crate::jvm::reader::{ClassReader, MAGIC};
use crate::jvm::{
    encode_modified_utf8, AnnotationVisitor, ClassAccessFlags, ClassHierarchy, ClassVisitor,
    ConstantValue, ConstantsPool, Error, FieldAccessFlags, FieldVisitor, InnerClassAccessFlags,
    MethodAccessFlags, MethodVisitor, Serialize, SourceId, SuperClassMap, TypeTable, Version,
};
use crate::util::ByteVector;
use log::debug;
use std::collections::HashSet;

/// State shared by the class writer and the field and method writers it hands out
pub(crate) struct ClassContext<'h> {
    pub pool: ConstantsPool,
    pub types: TypeTable,
    pub hierarchy: Box<dyn ClassHierarchy + 'h>,
    pub version: Version,
    pub class_name: String,
    pub options: WriterOptions,

    /// Reader whose constant pool was copied, if any
    pub source: Option<SourceId>,

    error: Option<Error>,
}

impl<'h> ClassContext<'h> {
    /// Record an error to be returned by [`ClassWriter::to_bytes`] (the first one sticks)
    pub fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Class visitor producing a class file
///
/// Fields and methods are encoded as soon as their visitors finish, and the class is assembled
/// by [`ClassWriter::to_bytes`]. Visitor methods cannot return errors, so problems detected on
/// the way (oversized methods, jumps that do not fit, unknown types) are held back and returned
/// from `to_bytes`.
///
/// ```
/// use classweave::jvm::*;
///
/// # fn main() -> Result<(), Error> {
/// let mut writer = ClassWriter::new(WriterOptions::default());
/// writer.visit(
///     Version::JAVA8,
///     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
///     "Empty",
///     None,
///     Some("java/lang/Object"),
///     &[],
/// );
/// writer.visit_end();
/// let bytes = writer.to_bytes()?;
/// assert_eq!(&bytes[..4], [0xCA, 0xFE, 0xBA, 0xBE]);
/// # Ok(())
/// # }
/// ```
pub struct ClassWriter<'h> {
    context: ClassContext<'h>,

    access: ClassAccessFlags,
    this_class: Option<ClassConstantIndex>,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    signature: Option<Utf8ConstantIndex>,
    source_file: Option<Utf8ConstantIndex>,
    source_debug: Option<Vec<u8>>,
    enclosing_method: Option<EnclosingMethod>,
    nest_host: Option<ClassConstantIndex>,
    nest_members: Vec<ClassConstantIndex>,
    annotations: AnnotationList,
    inner_classes: Vec<InnerClass>,
    inner_class_names: HashSet<ClassConstantIndex>,

    fields: Vec<ByteVector>,
    methods: Vec<ByteVector>,
}

impl<'h> ClassWriter<'h> {
    /// Writer resolving common superclasses among the JDK exception classes and boxed numbers
    /// (see [`SuperClassMap::with_java_lang`]), as well as the classes it writes itself
    pub fn new(options: WriterOptions) -> ClassWriter<'h> {
        ClassWriter::with_hierarchy(options, SuperClassMap::with_java_lang())
    }

    pub fn with_hierarchy(
        options: WriterOptions,
        hierarchy: impl ClassHierarchy + 'h,
    ) -> ClassWriter<'h> {
        ClassWriter::with_pool(options, Box::new(hierarchy), ConstantsPool::new(), None)
    }

    /// Writer starting from the constant pool of `reader`
    ///
    /// Methods visited straight from `reader` are then copied as raw bytes instead of being
    /// decoded and re-encoded (see [`MethodVisitor::copy_method`]), and every original constant
    /// keeps its index. Class attributes are still written in this writer's own order, which
    /// need not be the order of the original class file.
    pub fn from_reader(
        reader: &ClassReader,
        options: WriterOptions,
        hierarchy: impl ClassHierarchy + 'h,
    ) -> Result<ClassWriter<'h>, Error> {
        let pool = ConstantsPool::copy_from(reader.constant_pool())?;
        debug!("copied constant pool ({} entries)", pool.len());
        Ok(ClassWriter::with_pool(
            options,
            Box::new(hierarchy),
            pool,
            Some(reader.source_id()),
        ))
    }

    fn with_pool(
        options: WriterOptions,
        hierarchy: Box<dyn ClassHierarchy + 'h>,
        pool: ConstantsPool,
        source: Option<SourceId>,
    ) -> ClassWriter<'h> {
        ClassWriter {
            context: ClassContext {
                pool,
                types: TypeTable::new(),
                hierarchy,
                version: Version::JAVA8,
                class_name: String::new(),
                options,
                source,
                error: None,
            },
            access: ClassAccessFlags::empty(),
            this_class: None,
            super_class: None,
            interfaces: vec![],
            signature: None,
            source_file: None,
            source_debug: None,
            enclosing_method: None,
            nest_host: None,
            nest_members: vec![],
            annotations: AnnotationList::default(),
            inner_classes: vec![],
            inner_class_names: HashSet::new(),
            fields: vec![],
            methods: vec![],
        }
    }

    /// Constant pool being built
    pub fn constants(&self) -> &ConstantsPool {
        &self.context.pool
    }

    /// Assemble the class file
    ///
    /// Returns the first error met while visiting the class, if any.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, Error> {
        if let Some(error) = self.context.error.take() {
            return Err(error);
        }

        // Attributes first: their names must be in the pool before it gets written
        let attributes = self.class_attributes();
        let pool = &self.context.pool;
        pool.check_size()?;

        let major_version = self.context.version.major_version;
        let access = AccessBits {
            bits: self.access.bits(),
        };
        let member_len = |members: &[ByteVector]| -> usize {
            members.iter().map(ByteVector::len).sum::<usize>()
        };
        let size = 10
            + pool.size()
            + 6
            + 2 * self.interfaces.len()
            + 2
            + member_len(&self.fields)
            + 2
            + member_len(&self.methods)
            + 2
            + attributes.iter().map(Attribute::size).sum::<usize>();

        let mut class = ByteVector::with_capacity(size);
        class
            .put_int(MAGIC as i32)
            .put_short(self.context.version.minor_version)
            .put_short(major_version);
        pool.serialize_into(&mut class)?;
        class
            .put_short(access.class_file_flags(major_version))
            .put_short(self.this_class.map_or(0, ClassConstantIndex::index))
            .put_short(self.super_class.map_or(0, ClassConstantIndex::index));
        self.interfaces.serialize(&mut class)?;

        class.put_short(self.fields.len() as u16);
        for field in &self.fields {
            class.put_byte_vector(field);
        }
        class.put_short(self.methods.len() as u16);
        for method in &self.methods {
            class.put_byte_vector(method);
        }
        attributes.serialize(&mut class)?;

        debug!(
            "wrote class {} ({} fields, {} methods, {} bytes)",
            self.context.class_name,
            self.fields.len(),
            self.methods.len(),
            class.len()
        );
        Ok(class.into_vec())
    }

    fn class_attributes(&mut self) -> Vec<Attribute> {
        let major_version = self.context.version.major_version;
        let access = AccessBits {
            bits: self.access.bits(),
        };
        let pool = &mut self.context.pool;
        let mut attributes = vec![];

        if !self.inner_classes.is_empty() {
            let inner_classes = std::mem::take(&mut self.inner_classes);
            attributes.push(pool.get_attribute(InnerClasses(inner_classes)));
        }
        if let Some(enclosing_method) = self.enclosing_method.take() {
            attributes.push(pool.get_attribute(enclosing_method));
        }
        if access.synthetic_attribute(major_version) {
            attributes.push(pool.get_attribute(Synthetic));
        }
        if let Some(signature) = self.signature {
            attributes.push(pool.get_attribute(Signature { signature }));
        }
        if let Some(source_file) = self.source_file {
            attributes.push(pool.get_attribute(SourceFile(source_file)));
        }
        if let Some(debug) = self.source_debug.take() {
            attributes.push(pool.get_attribute(SourceDebugExtension(debug)));
        }
        if access.deprecated() {
            attributes.push(pool.get_attribute(Deprecated));
        }
        if !self.annotations.is_empty() {
            let annotations = std::mem::take(&mut self.annotations);
            attributes.push(pool.get_attribute(RuntimeVisibleAnnotations(annotations)));
        }
        if let Some(host) = self.nest_host {
            attributes.push(pool.get_attribute(NestHost(host)));
        }
        if !self.nest_members.is_empty() {
            let members = std::mem::take(&mut self.nest_members);
            attributes.push(pool.get_attribute(NestMembers(members)));
        }
        if !pool.bootstrap_methods().is_empty() {
            let bootstrap_methods = BootstrapMethods(pool.bootstrap_methods().to_vec());
            attributes.push(pool.get_attribute(bootstrap_methods));
        }
        attributes
    }
}

impl<'h> ClassVisitor for ClassWriter<'h> {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) {
        debug!("writing class {} (version {})", name, version);
        let pool = &mut self.context.pool;
        self.access = access;
        self.this_class = Some(pool.get_class(name));
        self.super_class = super_name.map(|super_name| pool.get_class(super_name));
        self.interfaces = interfaces
            .iter()
            .map(|interface| pool.get_class(interface))
            .collect();
        self.signature = signature.map(|signature| pool.get_utf8(signature));

        self.context.version = version;
        self.context.class_name = name.to_owned();
        if let Some(super_name) = super_name {
            self.context.hierarchy.record(name, super_name);
        }
    }

    fn visit_source(&mut self, file: Option<&str>, debug: Option<&str>) {
        self.source_file = file.map(|file| self.context.pool.get_utf8(file));
        self.source_debug = debug.map(encode_modified_utf8);
    }

    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, descriptor: Option<&str>) {
        let pool = &mut self.context.pool;
        let class = pool.get_class(owner);
        let method = match (name, descriptor) {
            (Some(name), Some(descriptor)) => Some(pool.get_name_and_type(name, descriptor)),
            _ => None,
        };
        self.enclosing_method = Some(EnclosingMethod { class, method });
    }

    fn visit_nest_host(&mut self, host: &str) {
        self.nest_host = Some(self.context.pool.get_class(host));
    }

    fn visit_nest_member(&mut self, member: &str) {
        let member = self.context.pool.get_class(member);
        self.nest_members.push(member);
    }

    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationWriter::new(
            &mut self.context.pool,
            &mut self.annotations,
            descriptor,
        )))
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) {
        let pool = &mut self.context.pool;
        let inner_class = pool.get_class(name);
        // One entry per inner class, the first one wins
        if !self.inner_class_names.insert(inner_class) {
            return;
        }
        self.inner_classes.push(InnerClass {
            inner_class,
            outer_class: outer_name.map(|outer_name| pool.get_class(outer_name)),
            inner_name: inner_name.map(|inner_name| pool.get_utf8(inner_name)),
            access_flags: access,
        });
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        Some(Box::new(FieldWriter::new(
            &mut self.context,
            &mut self.fields,
            access,
            name,
            descriptor,
            signature,
            value,
        )))
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        Some(Box::new(MethodWriter::new(
            &mut self.context,
            &mut self.methods,
            access,
            name,
            descriptor,
            signature,
            exceptions,
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::opcodes::*;
    use crate::jvm::Label;

    fn begin(writer: &mut ClassWriter, version: Version) {
        writer.visit(
            version,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "Sample",
            None,
            Some("java/lang/Object"),
            &[],
        );
    }

    #[test]
    fn header_and_counts() {
        let mut writer = ClassWriter::new(WriterOptions::default());
        begin(&mut writer, Version::JAVA8);
        writer.visit_end();
        let bytes = writer.to_bytes().unwrap();

        assert_eq!(&bytes[..4], [0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(&bytes[4..8], [0, 0, 0, 52]);
        // Utf8 "Sample", Class, Utf8 "java/lang/Object", Class
        assert_eq!(&bytes[8..10], [0, 5]);
        // interfaces, fields, methods, attributes
        assert_eq!(&bytes[bytes.len() - 8..], [0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn first_error_is_reported() {
        let mut writer = ClassWriter::new(WriterOptions::default());
        begin(&mut writer, Version::JAVA8);
        if let Some(mut method) = writer.visit_method(
            MethodAccessFlags::STATIC,
            "huge",
            "()V",
            None,
            &[],
        ) {
            for _ in 0..0x10000 {
                method.visit_insn(NOP);
            }
            method.visit_insn(RETURN);
            method.visit_end();
        }
        writer.visit_end();
        match writer.to_bytes() {
            Err(Error::MethodCodeOverflow { method, length }) => {
                assert_eq!(method, "Sample.huge()V");
                assert_eq!(length, 0x10001);
            }
            other => panic!("expected code overflow, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn superclasses_are_recorded() {
        let mut hierarchy = SuperClassMap::new();
        {
            let mut writer = ClassWriter::with_hierarchy(WriterOptions::default(), &mut hierarchy);
            begin(&mut writer, Version::JAVA8);
            writer.visit_end();
            writer.to_bytes().unwrap();
        }
        assert_eq!(
            hierarchy.super_class("Sample").as_deref(),
            Some("java/lang/Object")
        );
    }

    #[test]
    fn method_without_visit_end_is_still_written() {
        let mut writer = ClassWriter::new(WriterOptions::default());
        begin(&mut writer, Version::JAVA8);
        if let Some(mut method) =
            writer.visit_method(MethodAccessFlags::STATIC, "f", "()V", None, &[])
        {
            let end = Label::new();
            method.visit_jump_insn(GOTO, end);
            method.visit_label(end);
            method.visit_insn(RETURN);
        }
        writer.visit_end();
        assert_eq!(writer.methods.len(), 1);
    }
}
