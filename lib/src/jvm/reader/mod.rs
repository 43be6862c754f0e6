//! Class file reader driving the visitor protocol

mod annotation;
mod metadata;
mod method;

use crate::jvm::{
    decode_modified_utf8, AnnotationVisitor, ClassAccessFlags, ClassVisitor, ConstantPoolReader,
    Error, FieldAccessFlags, FieldVisitor, InnerClassAccessFlags, MethodVisitor, SourceId,
    Version,
};
use crate::util::Cursor;
use bitflags::bitflags;
use log::debug;

pub(crate) use annotation::*;
pub use metadata::*;

/// Every class file starts with this
pub const MAGIC: u32 = 0xCAFE_BABE;

bitflags! {
    /// Parts of the class file that [`ClassReader::accept`] leaves out
    ///
    /// Methods are offered for copying (see [`crate::jvm::MethodVisitor::copy_method`]) before
    /// these flags are looked at. A method copied as is into a writer built with
    /// [`crate::jvm::ClassWriter::from_reader`] therefore keeps its code and debug tables even
    /// with `SKIP_CODE` or `SKIP_DEBUG` set.
    pub struct ReaderFlags: u8 {
        /// Method bodies: no instruction, label, try-catch or max stack events
        const SKIP_CODE = 0x01;

        /// `SourceFile`, `SourceDebugExtension`, `LocalVariableTable`, `LocalVariableTypeTable`
        /// and `LineNumberTable`
        const SKIP_DEBUG = 0x02;

        /// `InnerClasses`
        const SKIP_INNER_CLASSES = 0x04;
    }
}

impl Default for ReaderFlags {
    fn default() -> Self {
        ReaderFlags::empty()
    }
}

/// Parser for a class file held in memory
///
/// Construction only indexes the constant pool and locates the class attributes. Everything
/// else is decoded as [`ClassReader::accept`] walks the class and feeds a visitor.
pub struct ClassReader<'b> {
    bytes: &'b [u8],
    pool: ConstantPoolReader<'b>,

    /// Offset of `access_flags`, just after the constant pool
    header: usize,

    /// Offset of the class `attributes_count`
    attributes: usize,

    source: SourceId,
}

/// Name and location of one entry in an attribute table
struct RawAttribute<'a> {
    name: &'a str,

    /// Offset of the attribute payload
    start: usize,
    len: usize,
}

/// Attributes every class, field and method can carry
#[derive(Default)]
struct CommonAttributes<'a> {
    signature: Option<&'a str>,
    deprecated: bool,
    synthetic: bool,

    /// Offset of `RuntimeVisibleAnnotations`
    annotations: Option<usize>,
}

impl<'a> CommonAttributes<'a> {
    /// Returns whether the attribute was one of the common ones
    fn read(
        &mut self,
        pool: &'a ConstantPoolReader,
        bytes: &[u8],
        attribute: &RawAttribute,
    ) -> Result<bool, Error> {
        match attribute.name {
            "Signature" => {
                let index = Cursor::new(bytes, attribute.start).u16()?;
                self.signature = Some(pool.utf8(index)?);
            }
            "Deprecated" => self.deprecated = true,
            "Synthetic" => self.synthetic = true,
            "RuntimeVisibleAnnotations" => self.annotations = Some(attribute.start),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Access flag bits standing in for the marker attributes
    fn access_bits(&self) -> u32 {
        let mut bits = 0;
        if self.deprecated {
            bits |= ClassAccessFlags::DEPRECATED.bits();
        }
        if self.synthetic {
            bits |= ClassAccessFlags::SYNTHETIC.bits();
        }
        bits
    }
}

/// Anything annotations can be reported to
trait Annotated {
    fn annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>>;
}

impl Annotated for dyn ClassVisitor + '_ {
    fn annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(descriptor)
    }
}

impl Annotated for dyn FieldVisitor + '_ {
    fn annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(descriptor)
    }
}

impl Annotated for dyn MethodVisitor + '_ {
    fn annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.visit_annotation(descriptor)
    }
}

impl<'b> ClassReader<'b> {
    pub fn new(bytes: &'b [u8]) -> Result<ClassReader<'b>, Error> {
        let mut cursor = Cursor::new(bytes, 0);
        let magic = cursor.u32()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        cursor.skip(4)?;

        let mut pool = ConstantPoolReader::parse(bytes, cursor.position())?;
        let header = pool.end();

        // Skip to the class attributes
        cursor.seek(header + 6);
        let interface_count = cursor.u16()? as usize;
        cursor.skip(2 * interface_count)?;
        for _ in 0..2 {
            let member_count = cursor.u16()?;
            for _ in 0..member_count {
                cursor.skip(6)?;
                Self::skip_attribute_table(&mut cursor)?;
            }
        }
        let attributes = cursor.position();

        // Index the bootstrap methods, since `invokedynamic` needs them while reading methods
        let attribute_count = cursor.u16()?;
        for _ in 0..attribute_count {
            let name = pool.utf8(cursor.u16()?)?;
            let len = cursor.u32()? as usize;
            if name == "BootstrapMethods" {
                let mut table = cursor.clone();
                let count = table.u16()?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(table.position());
                    table.skip(2)?;
                    let argument_count = table.u16()? as usize;
                    table.skip(2 * argument_count)?;
                }
                pool.set_bootstrap_methods(offsets);
            }
            cursor.skip(len)?;
        }

        Ok(ClassReader {
            bytes,
            pool,
            header,
            attributes,
            source: SourceId::fresh(),
        })
    }

    fn skip_attribute_table(cursor: &mut Cursor) -> Result<(), Error> {
        let attribute_count = cursor.u16()?;
        for _ in 0..attribute_count {
            cursor.skip(2)?;
            let len = cursor.u32()? as usize;
            cursor.skip(len)?;
        }
        Ok(())
    }

    /// Read an attribute table, leaving the cursor just after it
    fn read_attribute_table(&self, cursor: &mut Cursor) -> Result<Vec<RawAttribute<'_>>, Error> {
        let attribute_count = cursor.u16()?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let name = self.pool.utf8(cursor.u16()?)?;
            let len = cursor.u32()? as usize;
            let start = cursor.position();
            cursor.skip(len)?;
            attributes.push(RawAttribute { name, start, len });
        }
        Ok(attributes)
    }

    /// Token identifying this reader (see [`MethodVisitor::copy_method`])
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    pub fn bytes(&self) -> &'b [u8] {
        self.bytes
    }

    pub fn constant_pool(&self) -> &ConstantPoolReader<'b> {
        &self.pool
    }

    pub fn version(&self) -> Result<Version, Error> {
        let mut cursor = Cursor::new(self.bytes, 4);
        let minor_version = cursor.u16()?;
        let major_version = cursor.u16()?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }

    /// Class access flags, as in the class file (no pseudo flags)
    pub fn access(&self) -> Result<ClassAccessFlags, Error> {
        let bits = Cursor::new(self.bytes, self.header).u16()?;
        Ok(ClassAccessFlags::from_bits_truncate(bits as u32))
    }

    pub fn class_name(&self) -> Result<&str, Error> {
        let index = Cursor::new(self.bytes, self.header + 2).u16()?;
        self.pool.class_name(index)
    }

    /// Superclass name (absent only for `java/lang/Object` and modules)
    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        let index = Cursor::new(self.bytes, self.header + 4).u16()?;
        self.pool.opt_class_name(index)
    }

    pub fn interfaces(&self) -> Result<Vec<&str>, Error> {
        let mut cursor = Cursor::new(self.bytes, self.header + 6);
        let count = cursor.u16()?;
        let mut interfaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            interfaces.push(self.pool.class_name(cursor.u16()?)?);
        }
        Ok(interfaces)
    }

    /// Walk the whole class, reporting it to `visitor`
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, flags: ReaderFlags) -> Result<(), Error> {
        let version = self.version()?;
        let name = self.class_name()?;
        let super_name = self.super_name()?;
        let interfaces = self.interfaces()?;
        let access = Cursor::new(self.bytes, self.header).u16()? as u32;

        let mut common = CommonAttributes::default();
        let mut source_file = None;
        let mut source_debug = None;
        let mut enclosing_method = None;
        let mut nest_host = None;
        let mut nest_members = vec![];
        let mut inner_classes = None;

        let mut cursor = Cursor::new(self.bytes, self.attributes);
        for attribute in self.read_attribute_table(&mut cursor)? {
            if common.read(&self.pool, self.bytes, &attribute)? {
                continue;
            }
            let mut data = Cursor::new(self.bytes, attribute.start);
            match attribute.name {
                "SourceFile" => source_file = Some(self.pool.utf8(data.u16()?)?),
                "SourceDebugExtension" => {
                    source_debug = Some(decode_modified_utf8(data.bytes(attribute.len)?));
                }
                "EnclosingMethod" => {
                    let owner = self.pool.class_name(data.u16()?)?;
                    let method = match data.u16()? {
                        0 => None,
                        index => Some(self.pool.name_and_type(index)?),
                    };
                    enclosing_method = Some((owner, method));
                }
                "NestHost" => nest_host = Some(self.pool.class_name(data.u16()?)?),
                "NestMembers" => {
                    for _ in 0..data.u16()? {
                        nest_members.push(self.pool.class_name(data.u16()?)?);
                    }
                }
                "InnerClasses" => {
                    if !flags.contains(ReaderFlags::SKIP_INNER_CLASSES) {
                        inner_classes = Some(attribute.start);
                    }
                }
                _ => (),
            }
        }

        debug!("reading class {} (version {})", name, version);
        let access = ClassAccessFlags::from_bits_truncate(access | common.access_bits());
        visitor.visit(version, access, name, common.signature, super_name, &interfaces);

        if !flags.contains(ReaderFlags::SKIP_DEBUG)
            && (source_file.is_some() || source_debug.is_some())
        {
            visitor.visit_source(source_file, source_debug.as_deref());
        }
        if let Some((owner, method)) = enclosing_method {
            visitor.visit_outer_class(
                owner,
                method.map(|(name, _)| name),
                method.map(|(_, descriptor)| descriptor),
            );
        }
        if let Some(host) = nest_host {
            visitor.visit_nest_host(host);
        }
        for member in nest_members {
            visitor.visit_nest_member(member);
        }
        self.read_annotation_list(common.annotations, &mut *visitor)?;

        if let Some(offset) = inner_classes {
            let mut data = Cursor::new(self.bytes, offset);
            for _ in 0..data.u16()? {
                let name = self.pool.class_name(data.u16()?)?;
                let outer_name = self.pool.opt_class_name(data.u16()?)?;
                let inner_name = self.pool.opt_utf8(data.u16()?)?;
                let access = InnerClassAccessFlags::from_bits_truncate(data.u16()?);
                visitor.visit_inner_class(name, outer_name, inner_name, access);
            }
        }

        let mut cursor = Cursor::new(self.bytes, self.header + 8 + 2 * interfaces.len());
        for _ in 0..cursor.u16()? {
            self.read_field(visitor, &mut cursor)?;
        }
        for _ in 0..cursor.u16()? {
            self.read_method(visitor, &mut cursor, flags)?;
        }

        visitor.visit_end();
        Ok(())
    }

    /// Report a `RuntimeVisibleAnnotations` attribute
    fn read_annotation_list<A: Annotated + ?Sized>(
        &self,
        offset: Option<usize>,
        target: &mut A,
    ) -> Result<(), Error> {
        if let Some(offset) = offset {
            let mut cursor = Cursor::new(self.bytes, offset);
            for _ in 0..cursor.u16()? {
                let descriptor = self.pool.utf8(cursor.u16()?)?;
                let visitor = target.annotation(descriptor);
                read_annotation(&self.pool, &mut cursor, visitor)?;
            }
        }
        Ok(())
    }

    fn read_field(&self, visitor: &mut dyn ClassVisitor, cursor: &mut Cursor) -> Result<(), Error> {
        let access = cursor.u16()? as u32;
        let name = self.pool.utf8(cursor.u16()?)?;
        let descriptor = self.pool.utf8(cursor.u16()?)?;

        let mut common = CommonAttributes::default();
        let mut value = None;
        for attribute in self.read_attribute_table(cursor)? {
            if common.read(&self.pool, self.bytes, &attribute)? {
                continue;
            }
            if attribute.name == "ConstantValue" {
                let index = Cursor::new(self.bytes, attribute.start).u16()?;
                value = Some(self.pool.constant(index)?);
            }
        }

        let access = FieldAccessFlags::from_bits_truncate(access | common.access_bits());
        let field_visitor =
            visitor.visit_field(access, name, descriptor, common.signature, value.as_ref());
        if let Some(mut field_visitor) = field_visitor {
            self.read_annotation_list(common.annotations, &mut *field_visitor)?;
            field_visitor.visit_end();
        }
        Ok(())
    }
}
