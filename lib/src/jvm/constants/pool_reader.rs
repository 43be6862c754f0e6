use super::pool_writer::{
    ClassConstantIndex, Constant, ConstantIndex, NameAndTypeConstantIndex, Utf8ConstantIndex,
};
use super::values::{tag, ConstantValue, DynamicConstant, HandleKind, MethodHandle};
use crate::jvm::{decode_modified_utf8, Error};
use crate::util::Cursor;
use elsa::FrozenMap;

/// Read side of a class file's constant pool
///
/// Construction does a single pass over the pool, recording where each entry starts. Entries
/// are decoded on demand. Decoded `Utf8` entries are cached in a frozen map so that they can be
/// handed out as `&str` from behind a shared reference.
pub struct ConstantPoolReader<'b> {
    bytes: &'b [u8],

    /// Offset of the tag byte for each index (`0` for index 0 and unusable slots)
    offsets: Vec<usize>,

    /// Offset just past the last entry
    end: usize,

    utf8s: FrozenMap<u16, String>,

    /// Offset of each entry of the `BootstrapMethods` attribute, if any
    bootstrap_methods: Vec<usize>,
}

/// Symbolic reference to a field or method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub interface: bool,
}

impl<'b> ConstantPoolReader<'b> {
    /// Scan the pool starting at the `constant_pool_count` field at `start`
    pub fn parse(bytes: &'b [u8], start: usize) -> Result<ConstantPoolReader<'b>, Error> {
        let mut cursor = Cursor::new(bytes, start);
        let count = cursor.u16()? as usize;
        let mut offsets = vec![0; count.max(1)];

        let mut index = 1;
        while index < count {
            let offset = cursor.position();
            offsets[index] = offset;
            let tag = cursor.u8()?;
            let payload = match tag {
                tag::UTF8 => cursor.u16()? as usize,
                tag::INTEGER
                | tag::FLOAT
                | tag::FIELD_REF
                | tag::METHOD_REF
                | tag::INTERFACE_METHOD_REF
                | tag::NAME_AND_TYPE
                | tag::DYNAMIC
                | tag::INVOKE_DYNAMIC => 4,
                tag::LONG | tag::DOUBLE => {
                    index += 1;
                    8
                }
                tag::CLASS | tag::STRING | tag::METHOD_TYPE | tag::MODULE | tag::PACKAGE => 2,
                tag::METHOD_HANDLE => 3,
                _ => return Err(Error::UnknownConstantTag { tag, offset }),
            };
            cursor.skip(payload)?;
            index += 1;
        }

        Ok(ConstantPoolReader {
            bytes,
            offsets,
            end: cursor.position(),
            utf8s: FrozenMap::new(),
            bootstrap_methods: vec![],
        })
    }

    /// Value of `constant_pool_count` (one more than the largest index)
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.len() <= 1
    }

    /// Offset of the first byte after the pool
    pub fn end(&self) -> usize {
        self.end
    }

    /// Byte offset of an entry's tag
    pub fn offset(&self, index: u16) -> Result<usize, Error> {
        match self.offsets.get(index as usize) {
            Some(offset) if *offset != 0 => Ok(*offset),
            _ => Err(Error::BadConstantIndex { index }),
        }
    }

    /// Cursor positioned just after the tag of an entry
    fn entry(&self, index: u16) -> Result<(u8, Cursor<'b>), Error> {
        let mut cursor = Cursor::new(self.bytes, self.offset(index)?);
        let tag = cursor.u8()?;
        Ok((tag, cursor))
    }

    pub fn tag(&self, index: u16) -> Result<u8, Error> {
        self.entry(index).map(|(tag, _)| tag)
    }

    pub fn utf8(&self, index: u16) -> Result<&str, Error> {
        if let Some(string) = self.utf8s.get(&index) {
            return Ok(string);
        }
        let (_, mut cursor) = self.entry(index)?;
        let len = cursor.u16()? as usize;
        let string = decode_modified_utf8(cursor.bytes(len)?);
        Ok(self.utf8s.insert(index, string))
    }

    /// Like [`ConstantPoolReader::utf8`], with index 0 meaning absent
    pub fn opt_utf8(&self, index: u16) -> Result<Option<&str>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(Some)
        }
    }

    /// `Utf8` referenced by a `Class`, `String`, `MethodType`, `Module` or `Package` entry
    fn indirect_utf8(&self, index: u16) -> Result<&str, Error> {
        let (_, mut cursor) = self.entry(index)?;
        let utf8 = cursor.u16()?;
        self.utf8(utf8)
    }

    pub fn class_name(&self, index: u16) -> Result<&str, Error> {
        self.indirect_utf8(index)
    }

    /// Like [`ConstantPoolReader::class_name`], with index 0 meaning absent
    pub fn opt_class_name(&self, index: u16) -> Result<Option<&str>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), Error> {
        let (_, mut cursor) = self.entry(index)?;
        let name = cursor.u16()?;
        let descriptor = cursor.u16()?;
        Ok((self.utf8(name)?, self.utf8(descriptor)?))
    }

    /// `Fieldref`, `Methodref` or `InterfaceMethodref`
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, Error> {
        let (tag, mut cursor) = self.entry(index)?;
        let owner = cursor.u16()?;
        let name_and_type = cursor.u16()?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(owner)?,
            name,
            descriptor,
            interface: tag == tag::INTERFACE_METHOD_REF,
        })
    }

    pub fn method_handle(&self, index: u16) -> Result<MethodHandle, Error> {
        let (tag, mut cursor) = self.entry(index)?;
        let kind = cursor.u8()?;
        let kind = HandleKind::from_u8(kind).ok_or(Error::NotLoadableConstant { tag, index })?;
        let member = self.member_ref(cursor.u16()?)?;
        Ok(MethodHandle {
            kind,
            owner: member.owner.to_owned(),
            name: member.name.to_owned(),
            descriptor: member.descriptor.to_owned(),
            interface: member.interface,
        })
    }

    pub fn integer(&self, index: u16) -> Result<i32, Error> {
        let (_, mut cursor) = self.entry(index)?;
        cursor.i32()
    }

    pub fn long(&self, index: u16) -> Result<i64, Error> {
        let (_, mut cursor) = self.entry(index)?;
        cursor.i64()
    }

    pub fn float(&self, index: u16) -> Result<f32, Error> {
        let (_, mut cursor) = self.entry(index)?;
        Ok(f32::from_bits(cursor.u32()?))
    }

    pub fn double(&self, index: u16) -> Result<f64, Error> {
        let (_, mut cursor) = self.entry(index)?;
        Ok(f64::from_bits(cursor.i64()? as u64))
    }

    /// Decode a loadable constant (operand of `ldc`, bootstrap argument, `ConstantValue`)
    pub fn constant(&self, index: u16) -> Result<ConstantValue, Error> {
        let (tag, mut cursor) = self.entry(index)?;
        Ok(match tag {
            tag::INTEGER => ConstantValue::Integer(cursor.i32()?),
            tag::FLOAT => ConstantValue::Float(f32::from_bits(cursor.u32()?)),
            tag::LONG => ConstantValue::Long(cursor.i64()?),
            tag::DOUBLE => ConstantValue::Double(f64::from_bits(cursor.i64()? as u64)),
            tag::STRING => ConstantValue::String(self.indirect_utf8(index)?.to_owned()),
            tag::CLASS => ConstantValue::Class(self.class_name(index)?.to_owned()),
            tag::METHOD_TYPE => ConstantValue::MethodType(self.indirect_utf8(index)?.to_owned()),
            tag::METHOD_HANDLE => ConstantValue::MethodHandle(self.method_handle(index)?),
            tag::DYNAMIC => {
                let bootstrap = cursor.u16()?;
                let (name, descriptor) = self.name_and_type(cursor.u16()?)?;
                let (bootstrap_method, arguments) = self.bootstrap_method(bootstrap as usize)?;
                ConstantValue::Dynamic(Box::new(DynamicConstant {
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    bootstrap_method,
                    arguments,
                }))
            }
            _ => return Err(Error::NotLoadableConstant { tag, index }),
        })
    }

    /// Call site of an `InvokeDynamic` entry: name, descriptor, bootstrap method and arguments
    pub fn invoke_dynamic(
        &self,
        index: u16,
    ) -> Result<(&str, &str, MethodHandle, Vec<ConstantValue>), Error> {
        let (_, mut cursor) = self.entry(index)?;
        let bootstrap = cursor.u16()?;
        let (name, descriptor) = self.name_and_type(cursor.u16()?)?;
        let (handle, arguments) = self.bootstrap_method(bootstrap as usize)?;
        Ok((name, descriptor, handle, arguments))
    }

    /// Record where the entries of the `BootstrapMethods` attribute start
    pub(crate) fn set_bootstrap_methods(&mut self, offsets: Vec<usize>) {
        self.bootstrap_methods = offsets;
    }

    pub fn bootstrap_method_count(&self) -> usize {
        self.bootstrap_methods.len()
    }

    fn bootstrap_cursor(&self, index: usize) -> Result<Cursor<'b>, Error> {
        match self.bootstrap_methods.get(index) {
            Some(offset) => Ok(Cursor::new(self.bytes, *offset)),
            None => Err(Error::BadConstantIndex {
                index: index as u16,
            }),
        }
    }

    /// Bootstrap method handle and its static arguments
    pub fn bootstrap_method(
        &self,
        index: usize,
    ) -> Result<(MethodHandle, Vec<ConstantValue>), Error> {
        let mut cursor = self.bootstrap_cursor(index)?;
        let handle = self.method_handle(cursor.u16()?)?;
        let count = cursor.u16()?;
        let mut arguments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            arguments.push(self.constant(cursor.u16()?)?);
        }
        Ok((handle, arguments))
    }

    /// Bootstrap method as raw pool indices
    pub fn raw_bootstrap_method(
        &self,
        index: usize,
    ) -> Result<(ConstantIndex, Vec<ConstantIndex>), Error> {
        let mut cursor = self.bootstrap_cursor(index)?;
        let handle = ConstantIndex(cursor.u16()?);
        let count = cursor.u16()?;
        let mut arguments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            arguments.push(ConstantIndex(cursor.u16()?));
        }
        Ok((handle, arguments))
    }

    /// Decode an entry without resolving the indices it contains
    pub fn raw_constant(&self, index: u16) -> Result<Constant, Error> {
        let (tag, mut cursor) = self.entry(index)?;
        let utf8 = |cursor: &mut Cursor| cursor.u16().map(|i| Utf8ConstantIndex(ConstantIndex(i)));
        Ok(match tag {
            tag::UTF8 => Constant::Utf8(self.utf8(index)?.to_owned()),
            tag::INTEGER => Constant::Integer(cursor.i32()?),
            tag::FLOAT => Constant::Float(f32::from_bits(cursor.u32()?)),
            tag::LONG => Constant::Long(cursor.i64()?),
            tag::DOUBLE => Constant::Double(f64::from_bits(cursor.i64()? as u64)),
            tag::CLASS => Constant::Class(utf8(&mut cursor)?),
            tag::STRING => Constant::String(utf8(&mut cursor)?),
            tag::METHOD_TYPE => Constant::MethodType {
                descriptor: utf8(&mut cursor)?,
            },
            tag::MODULE => Constant::Module(utf8(&mut cursor)?),
            tag::PACKAGE => Constant::Package(utf8(&mut cursor)?),
            tag::NAME_AND_TYPE => Constant::NameAndType {
                name: utf8(&mut cursor)?,
                descriptor: utf8(&mut cursor)?,
            },
            tag::FIELD_REF | tag::METHOD_REF | tag::INTERFACE_METHOD_REF => {
                let class = ClassConstantIndex(ConstantIndex(cursor.u16()?));
                let name_and_type = NameAndTypeConstantIndex(ConstantIndex(cursor.u16()?));
                if tag == tag::FIELD_REF {
                    Constant::FieldRef(class, name_and_type)
                } else {
                    Constant::MethodRef {
                        class,
                        name_and_type,
                        is_interface: tag == tag::INTERFACE_METHOD_REF,
                    }
                }
            }
            tag::METHOD_HANDLE => {
                let kind = cursor.u8()?;
                Constant::MethodHandle {
                    handle_kind: HandleKind::from_u8(kind)
                        .ok_or(Error::NotLoadableConstant { tag, index })?,
                    member: ConstantIndex(cursor.u16()?),
                }
            }
            tag::DYNAMIC => Constant::Dynamic {
                bootstrap_method: cursor.u16()?,
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(cursor.u16()?)),
            },
            tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap_method: cursor.u16()?,
                method_descriptor: NameAndTypeConstantIndex(ConstantIndex(cursor.u16()?)),
            },
            _ => {
                return Err(Error::UnknownConstantTag {
                    tag,
                    offset: cursor.position() - 1,
                })
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ConstantsPool;
    use crate::util::ByteVector;

    fn round_trip(pool: &ConstantsPool) -> Vec<u8> {
        let mut out = ByteVector::new();
        pool.serialize_into(&mut out).unwrap();
        out.into_vec()
    }

    #[test]
    fn reads_back_written_pool() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_long(1 << 40);
        let field = pool.get_field_ref("a/B", "c", "[J");
        let string = pool.get_string("\u{0}nul");
        let bytes = round_trip(&pool);

        let reader = ConstantPoolReader::parse(&bytes, 0).unwrap();
        assert_eq!(reader.len(), pool.len());
        assert_eq!(reader.end(), bytes.len());
        assert_eq!(reader.long(long.0).unwrap(), 1 << 40);
        assert!(matches!(
            reader.offset(long.0 + 1),
            Err(Error::BadConstantIndex { .. })
        ));

        let member = reader.member_ref(field.index()).unwrap();
        assert_eq!(member.owner, "a/B");
        assert_eq!(member.name, "c");
        assert_eq!(member.descriptor, "[J");
        assert!(!member.interface);

        assert_eq!(
            reader.constant(string.index()).unwrap(),
            ConstantValue::String(String::from("\u{0}nul"))
        );
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let bytes = [0x00, 0x02, 0x02, 0x00, 0x00];
        assert!(matches!(
            ConstantPoolReader::parse(&bytes, 0),
            Err(Error::UnknownConstantTag { tag: 2, offset: 2 })
        ));
    }

    #[test]
    fn copied_pool_keeps_indices() {
        let mut pool = ConstantsPool::new();
        let double = pool.get_double(2.5);
        let method = pool.get_method_ref("a/B", "m", "()V", true);
        let bytes = round_trip(&pool);

        let reader = ConstantPoolReader::parse(&bytes, 0).unwrap();
        let mut copy = ConstantsPool::copy_from(&reader).unwrap();
        assert_eq!(copy.len(), pool.len());
        assert_eq!(copy.get_double(2.5), double);
        assert_eq!(copy.get_method_ref("a/B", "m", "()V", true), method);
        assert_eq!(round_trip(&copy), bytes);
    }
}
