use super::{ClassReader, MAGIC};
use crate::jvm::{
    ClassAccessFlags, ConstantPoolReader, Error, FieldAccessFlags, MethodAccessFlags, Version,
};
use crate::util::Cursor;

/// Name, descriptor and access flags of a field or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo<'a, F> {
    pub access: F,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Quick scan of a class file header and member list
///
/// Only the constant pool and the member headers are looked at: no attribute is decoded and no
/// visitor is involved. Useful for building a [`crate::jvm::SuperClassMap`] from a set of class
/// files before rewriting any of them.
pub struct ClassMetadataReader<'b> {
    bytes: &'b [u8],
    pool: ConstantPoolReader<'b>,

    /// Offset of `access_flags`
    header: usize,
}

impl<'b> ClassMetadataReader<'b> {
    pub fn new(bytes: &'b [u8]) -> Result<ClassMetadataReader<'b>, Error> {
        let mut cursor = Cursor::new(bytes, 0);
        let magic = cursor.u32()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let pool = ConstantPoolReader::parse(bytes, 8)?;
        let header = pool.end();
        Ok(ClassMetadataReader {
            bytes,
            pool,
            header,
        })
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

    /// Class access flags (the `Deprecated` and `Synthetic` attributes are not looked at)
    pub fn access(&self) -> Result<ClassAccessFlags, Error> {
        let bits = Cursor::new(self.bytes, self.header).u16()?;
        Ok(ClassAccessFlags::from_bits_truncate(bits as u32))
    }

    pub fn class_name(&self) -> Result<&str, Error> {
        let index = Cursor::new(self.bytes, self.header + 2).u16()?;
        self.pool.class_name(index)
    }

    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        let index = Cursor::new(self.bytes, self.header + 4).u16()?;
        self.pool.opt_class_name(index)
    }

    pub fn interfaces(&self) -> Result<Vec<&str>, Error> {
        let mut cursor = Cursor::new(self.bytes, self.header + 6);
        let count = cursor.u16()?;
        (0..count)
            .map(|_| self.pool.class_name(cursor.u16()?))
            .collect()
    }

    pub fn fields(&self) -> Result<Vec<MemberInfo<'_, FieldAccessFlags>>, Error> {
        let mut cursor = self.members_start()?;
        self.read_members(&mut cursor, |bits| {
            FieldAccessFlags::from_bits_truncate(bits as u32)
        })
    }

    pub fn methods(&self) -> Result<Vec<MemberInfo<'_, MethodAccessFlags>>, Error> {
        let mut cursor = self.members_start()?;
        self.read_members(&mut cursor, |_| ())?;
        self.read_members(&mut cursor, |bits| {
            MethodAccessFlags::from_bits_truncate(bits as u32)
        })
    }

    /// Cursor on `fields_count`
    fn members_start(&self) -> Result<Cursor<'b>, Error> {
        let mut cursor = Cursor::new(self.bytes, self.header + 6);
        let interface_count = cursor.u16()? as usize;
        cursor.skip(2 * interface_count)?;
        Ok(cursor)
    }

    fn read_members<F>(
        &self,
        cursor: &mut Cursor,
        flags: impl Fn(u16) -> F,
    ) -> Result<Vec<MemberInfo<'_, F>>, Error> {
        let count = cursor.u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access = flags(cursor.u16()?);
            let name = self.pool.utf8(cursor.u16()?)?;
            let descriptor = self.pool.utf8(cursor.u16()?)?;
            ClassReader::skip_attribute_table(cursor)?;
            members.push(MemberInfo {
                access,
                name,
                descriptor,
            });
        }
        Ok(members)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{ClassVisitor, ClassWriter, MethodVisitor, WriterOptions};
    use crate::jvm::opcodes::RETURN;

    #[test]
    fn header_and_members() {
        let mut writer = ClassWriter::new(WriterOptions::default());
        writer.visit(
            Version::JAVA11,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "pkg/Thing",
            None,
            Some("pkg/Base"),
            &["java/lang/Runnable"],
        );
        writer.visit_field(FieldAccessFlags::PRIVATE, "count", "I", None, None);
        if let Some(mut method) =
            writer.visit_method(MethodAccessFlags::PUBLIC, "run", "()V", None, &[])
        {
            method.visit_insn(RETURN);
            method.visit_end();
        }
        writer.visit_end();
        let bytes = writer.to_bytes().unwrap();

        let metadata = ClassMetadataReader::new(&bytes).unwrap();
        assert_eq!(metadata.version().unwrap(), Version::JAVA11);
        assert_eq!(metadata.class_name().unwrap(), "pkg/Thing");
        assert_eq!(metadata.super_name().unwrap(), Some("pkg/Base"));
        assert_eq!(metadata.interfaces().unwrap(), ["java/lang/Runnable"]);

        let fields = metadata.fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "count");
        assert_eq!(fields[0].access, FieldAccessFlags::PRIVATE);

        let methods = metadata.methods().unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!((methods[0].name, methods[0].descriptor), ("run", "()V"));
    }

    #[test]
    fn rejects_other_files() {
        assert!(matches!(
            ClassMetadataReader::new(b"PK\x03\x04 not a class"),
            Err(Error::BadMagic(0x504B_0304))
        ));
    }
}
