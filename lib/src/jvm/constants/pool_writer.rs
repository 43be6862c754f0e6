use super::values::{tag, ConstantValue, DynamicConstant, HandleKind, MethodHandle};
use super::ConstantPoolReader;
use crate::jvm::attributes::{Attribute, AttributeLike, BootstrapMethod};
use crate::jvm::{Error, Serialize};
use crate::util::{ByteVector, Width};
use byteorder::WriteBytesExt;
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

/// Class file constants pool builder
///
/// The pool is append only and canonicalizing: asking twice for the same constant yields the
/// same index. Since every sub-writer of a class interns into the same pool, interning never
/// fails; the 65535 slot limit is checked once, when the pool is serialized (see
/// [`ConstantsPool::check_size`]).
///
/// Bootstrap methods are tracked here too, since `invokedynamic` and dynamic constants refer to
/// them by index and they are deduplicated the same way as constants.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: Vec<Constant>,

    /// Index the next constant will get (long and double take two slots)
    next_index: usize,

    /// Serialized size of all constants so far
    byte_len: usize,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    modules: HashMap<Utf8ConstantIndex, ConstantIndex>,
    packages: HashMap<Utf8ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    dynamics: HashMap<(u16, NameAndTypeConstantIndex), ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), InvokeDynamicConstantIndex>,

    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_lookup: HashMap<BootstrapMethod, u16>,
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: vec![],
            next_index: 1,
            byte_len: 0,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            method_types: HashMap::new(),
            modules: HashMap::new(),
            packages: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            method_handles: HashMap::new(),
            dynamics: HashMap::new(),
            invoke_dynamics: HashMap::new(),
            bootstrap_methods: vec![],
            bootstrap_lookup: HashMap::new(),
        }
    }

    /// Rebuild a pool with exactly the entries (and indices) of an existing class file
    ///
    /// Constants added afterwards go after the copied ones, so raw bytecode from the original
    /// class keeps referring to the right entries. When the original pool has duplicates, lookups
    /// resolve to the first one.
    pub fn copy_from(reader: &ConstantPoolReader) -> Result<ConstantsPool, Error> {
        let mut pool = ConstantsPool::new();
        let mut index: u16 = 1;
        while (index as usize) < reader.len() {
            let constant = reader.raw_constant(index)?;
            let key = ConstantIndex(pool.next_index as u16);
            pool.register(&constant, key);
            index += constant.width() as u16;
            pool.push_constant(constant);
        }
        for i in 0..reader.bootstrap_method_count() {
            let (method, arguments) = reader.raw_bootstrap_method(i)?;
            let bootstrap = BootstrapMethod {
                bootstrap_method: method,
                bootstrap_arguments: arguments,
            };
            pool.bootstrap_lookup
                .entry(bootstrap.clone())
                .or_insert(i as u16);
            pool.bootstrap_methods.push(bootstrap);
        }
        Ok(pool)
    }

    /// Record a copied constant in the deduplication maps (first occurrence wins)
    fn register(&mut self, constant: &Constant, index: ConstantIndex) {
        match constant {
            Constant::Utf8(string) => {
                self.utf8s
                    .entry(string.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Integer(value) => {
                self.integers.entry(*value).or_insert(index);
            }
            Constant::Float(value) => {
                self.floats.entry(value.to_bits()).or_insert(index);
            }
            Constant::Long(value) => {
                self.longs.entry(*value).or_insert(index);
            }
            Constant::Double(value) => {
                self.doubles.entry(value.to_bits()).or_insert(index);
            }
            Constant::Class(name) => {
                self.classes
                    .entry(*name)
                    .or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings
                    .entry(*utf8)
                    .or_insert(StringConstantIndex(index));
            }
            Constant::FieldRef(class, name_and_type) => {
                self.fieldrefs
                    .entry((*class, *name_and_type))
                    .or_insert(FieldRefConstantIndex(index));
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.methodrefs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(MethodRefConstantIndex(index));
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                self.method_handles
                    .entry((*handle_kind, *member))
                    .or_insert(index);
            }
            Constant::MethodType { descriptor } => {
                self.method_types.entry(*descriptor).or_insert(index);
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                self.dynamics
                    .entry((*bootstrap_method, *name_and_type))
                    .or_insert(index);
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                self.invoke_dynamics
                    .entry((*bootstrap_method, *method_descriptor))
                    .or_insert(InvokeDynamicConstantIndex(index));
            }
            Constant::Module(name) => {
                self.modules.entry(*name).or_insert(index);
            }
            Constant::Package(name) => {
                self.packages.entry(*name).or_insert(index);
            }
        }
    }

    /// Push a constant into the constant pool
    ///
    /// Past the 16-bit limit, the returned index is meaningless, but [`ConstantsPool::check_size`]
    /// will report the overflow before anything is serialized.
    fn push_constant(&mut self, constant: Constant) -> ConstantIndex {
        let index = ConstantIndex(self.next_index as u16);
        self.next_index += constant.width();
        self.byte_len += constant.serialized_len();
        self.constants.push(constant);
        index
    }

    /// Value of the `constant_pool_count` field (one more than the largest index)
    pub fn len(&self) -> usize {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Bytes taken by `constant_pool_count` and all of the entries
    pub fn size(&self) -> usize {
        2 + self.byte_len
    }

    /// Ensure the pool fits in 16-bit indices
    pub fn check_size(&self) -> Result<(), Error> {
        if self.next_index > 0xFFFF {
            Err(Error::ConstantPoolOverflow {
                count: self.next_index,
            })
        } else {
            Ok(())
        }
    }

    /// Write `constant_pool_count` followed by every entry
    pub fn serialize_into(&self, out: &mut ByteVector) -> Result<(), Error> {
        self.check_size()?;
        out.put_short(self.next_index as u16);
        for constant in &self.constants {
            match constant {
                Constant::Utf8(string) => {
                    out.put_byte(tag::UTF8).put_utf8(string)?;
                }
                other => other.serialize(out)?,
            }
        }
        Ok(())
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(&mut self, utf8: S) -> Utf8ConstantIndex {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            *idx
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant));
            self.utf8s.insert(owned, idx);
            idx
        }
    }

    /// Get or insert a class constant (internal name, or descriptor for array classes)
    pub fn get_class(&mut self, name: &str) -> ClassConstantIndex {
        let utf8 = self.get_utf8(name);
        if let Some(idx) = self.classes.get(&utf8) {
            *idx
        } else {
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(utf8)));
            self.classes.insert(utf8, idx);
            idx
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: &str) -> StringConstantIndex {
        let utf8 = self.get_utf8(string);
        if let Some(idx) = self.strings.get(&utf8) {
            *idx
        } else {
            let idx = StringConstantIndex(self.push_constant(Constant::String(utf8)));
            self.strings.insert(utf8, idx);
            idx
        }
    }

    pub fn get_integer(&mut self, value: i32) -> ConstantIndex {
        if let Some(idx) = self.integers.get(&value) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Integer(value));
            self.integers.insert(value, idx);
            idx
        }
    }

    /// Floats are compared by bit pattern, so `-0.0` and each `NaN` payload get their own entry
    pub fn get_float(&mut self, value: f32) -> ConstantIndex {
        let bits = value.to_bits();
        if let Some(idx) = self.floats.get(&bits) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Float(value));
            self.floats.insert(bits, idx);
            idx
        }
    }

    pub fn get_long(&mut self, value: i64) -> ConstantIndex {
        if let Some(idx) = self.longs.get(&value) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Long(value));
            self.longs.insert(value, idx);
            idx
        }
    }

    pub fn get_double(&mut self, value: f64) -> ConstantIndex {
        let bits = value.to_bits();
        if let Some(idx) = self.doubles.get(&bits) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Double(value));
            self.doubles.insert(bits, idx);
            idx
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(&mut self, name: &str, descriptor: &str) -> NameAndTypeConstantIndex {
        let name = self.get_utf8(name);
        let descriptor = self.get_utf8(descriptor);
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            *idx
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant));
            self.name_and_types.insert(name_and_type_key, idx);
            idx
        }
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> FieldRefConstantIndex {
        let class = self.get_class(owner);
        let name_and_type = self.get_name_and_type(name, descriptor);
        let key = (class, name_and_type);
        if let Some(idx) = self.fieldrefs.get(&key) {
            *idx
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            let idx = FieldRefConstantIndex(self.push_constant(constant));
            self.fieldrefs.insert(key, idx);
            idx
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> MethodRefConstantIndex {
        let class = self.get_class(owner);
        let name_and_type = self.get_name_and_type(name, descriptor);
        let key = (class, name_and_type, is_interface);
        if let Some(idx) = self.methodrefs.get(&key) {
            *idx
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant));
            self.methodrefs.insert(key, idx);
            idx
        }
    }

    /// Get or insert a method handle constant from the constant pool
    pub fn get_method_handle(&mut self, handle: &MethodHandle) -> ConstantIndex {
        let member: ConstantIndex = if handle.kind.is_field() {
            self.get_field_ref(&handle.owner, &handle.name, &handle.descriptor)
                .into()
        } else {
            self.get_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.interface,
            )
            .into()
        };
        let handle_key = (handle.kind, member);
        if let Some(idx) = self.method_handles.get(&handle_key) {
            *idx
        } else {
            let constant = Constant::MethodHandle {
                handle_kind: handle.kind,
                member,
            };
            let idx = self.push_constant(constant);
            self.method_handles.insert(handle_key, idx);
            idx
        }
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> ConstantIndex {
        let descriptor = self.get_utf8(descriptor);
        if let Some(idx) = self.method_types.get(&descriptor) {
            *idx
        } else {
            let idx = self.push_constant(Constant::MethodType { descriptor });
            self.method_types.insert(descriptor, idx);
            idx
        }
    }

    pub fn get_module(&mut self, name: &str) -> ConstantIndex {
        let name = self.get_utf8(name);
        if let Some(idx) = self.modules.get(&name) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Module(name));
            self.modules.insert(name, idx);
            idx
        }
    }

    pub fn get_package(&mut self, name: &str) -> ConstantIndex {
        let name = self.get_utf8(name);
        if let Some(idx) = self.packages.get(&name) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Package(name));
            self.packages.insert(name, idx);
            idx
        }
    }

    /// Get or insert an entry in the `BootstrapMethods` attribute
    ///
    /// Two call sites with the same handle and the same arguments share one entry.
    pub fn get_bootstrap_method(
        &mut self,
        handle: &MethodHandle,
        arguments: &[ConstantValue],
    ) -> u16 {
        let bootstrap_method = self.get_method_handle(handle);
        let bootstrap_arguments = arguments
            .iter()
            .map(|argument| self.get_constant(argument))
            .collect();
        let bootstrap = BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments,
        };
        if let Some(idx) = self.bootstrap_lookup.get(&bootstrap) {
            *idx
        } else {
            let idx = self.bootstrap_methods.len() as u16;
            self.bootstrap_methods.push(bootstrap.clone());
            self.bootstrap_lookup.insert(bootstrap, idx);
            idx
        }
    }

    /// Get or insert a dynamically-computed constant
    pub fn get_dynamic(&mut self, dynamic: &DynamicConstant) -> ConstantIndex {
        let bootstrap_method =
            self.get_bootstrap_method(&dynamic.bootstrap_method, &dynamic.arguments);
        let name_and_type = self.get_name_and_type(&dynamic.name, &dynamic.descriptor);
        let key = (bootstrap_method, name_and_type);
        if let Some(idx) = self.dynamics.get(&key) {
            *idx
        } else {
            let idx = self.push_constant(Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            });
            self.dynamics.insert(key, idx);
            idx
        }
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        handle: &MethodHandle,
        arguments: &[ConstantValue],
    ) -> InvokeDynamicConstantIndex {
        let bootstrap_method = self.get_bootstrap_method(handle, arguments);
        let method_descriptor = self.get_name_and_type(name, descriptor);
        let indy_key = (bootstrap_method, method_descriptor);
        if let Some(idx) = self.invoke_dynamics.get(&indy_key) {
            *idx
        } else {
            let constant = Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            };
            let idx = InvokeDynamicConstantIndex(self.push_constant(constant));
            self.invoke_dynamics.insert(indy_key, idx);
            idx
        }
    }

    /// Get or insert any loadable constant
    pub fn get_constant(&mut self, constant: &ConstantValue) -> ConstantIndex {
        match constant {
            ConstantValue::Integer(value) => self.get_integer(*value),
            ConstantValue::Float(value) => self.get_float(*value),
            ConstantValue::Long(value) => self.get_long(*value),
            ConstantValue::Double(value) => self.get_double(*value),
            ConstantValue::String(string) => self.get_string(string).into(),
            ConstantValue::Class(name) => self.get_class(name).into(),
            ConstantValue::MethodType(descriptor) => self.get_method_type(descriptor),
            ConstantValue::MethodHandle(handle) => self.get_method_handle(handle),
            ConstantValue::Dynamic(dynamic) => self.get_dynamic(dynamic),
        }
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Attribute {
        let name_index = self.get_utf8(A::NAME);
        let info = attribute.to_bytes();
        Attribute { name_index, info }
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Bytes taken in the class file, including the tag
    fn serialized_len(&self) -> usize {
        match self {
            Constant::Utf8(string) => 3 + crate::jvm::modified_utf8_len(string),
            Constant::Class(_)
            | Constant::String(_)
            | Constant::MethodType { .. }
            | Constant::Module(_)
            | Constant::Package(_) => 3,
            Constant::MethodHandle { .. } => 4,
            Constant::Long(_) | Constant::Double(_) => 9,
            _ => 5,
        }
    }
}

/// `Utf8` entries are written by [`ConstantsPool::serialize_into`], which checks their length
impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                tag::UTF8.serialize(writer)?;
                let buffer: Vec<u8> = crate::jvm::encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                tag::INTEGER.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                tag::FLOAT.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                tag::LONG.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                tag::DOUBLE.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                tag::CLASS.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                tag::STRING.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                tag::FIELD_REF.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let tag = if *is_interface {
                    tag::INTERFACE_METHOD_REF
                } else {
                    tag::METHOD_REF
                };
                tag.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                tag::NAME_AND_TYPE.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                tag::METHOD_HANDLE.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                tag::METHOD_TYPE.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                tag::DYNAMIC.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                tag::INVOKE_DYNAMIC.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                tag::MODULE.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                tag::PACKAGE.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// `long` and `double` entries take two pool indices (JVMS 4.4.5), the second one unusable
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Typed wrappers around [`ConstantIndex`], recording which kind of entry they point to
macro_rules! typed_constant_index {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl $name {
                /// Raw 16-bit index
                pub fn index(self) -> u16 {
                    (self.0).0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }
        )*
    };
}

typed_constant_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex,
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_canonical() {
        let mut pool = ConstantsPool::new();
        let object = pool.get_class("java/lang/Object");
        let string = pool.get_class("java/lang/String");
        assert_ne!(object, string);
        assert_eq!(pool.get_class("java/lang/Object"), object);

        let a = pool.get_method_ref("java/lang/Object", "<init>", "()V", false);
        let b = pool.get_method_ref("java/lang/Object", "<init>", "()V", false);
        let c = pool.get_method_ref("java/lang/Object", "<init>", "()V", true);
        assert_eq!(a, b);
        assert_ne!(a, c);

        // The string constant reuses the `Utf8` made for the class name
        let len = pool.len();
        pool.get_string("java/lang/Object");
        assert_eq!(pool.len(), len + 1);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_long(42);
        let int = pool.get_integer(42);
        let double = pool.get_double(1.5);
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
        assert_eq!(double, ConstantIndex(4));
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.get_double(1.5), double);
        assert_ne!(pool.get_float(0.0), pool.get_float(-0.0));
    }

    #[test]
    fn serialized_size_matches_size() {
        let mut pool = ConstantsPool::new();
        pool.get_field_ref("Foo", "bar", "I");
        pool.get_long(-1);
        pool.get_string("h\u{e9}llo\0");
        pool.get_method_handle(&MethodHandle {
            kind: HandleKind::InvokeStatic,
            owner: String::from("Foo"),
            name: String::from("baz"),
            descriptor: String::from("()V"),
            interface: false,
        });

        let mut out = ByteVector::new();
        pool.serialize_into(&mut out).unwrap();
        assert_eq!(out.len(), pool.size());
        assert_eq!(&out.as_slice()[..2], &(pool.len() as u16).to_be_bytes());
    }

    #[test]
    fn bootstrap_methods_are_shared() {
        let mut pool = ConstantsPool::new();
        let handle = MethodHandle {
            kind: HandleKind::InvokeStatic,
            owner: String::from("java/lang/invoke/LambdaMetafactory"),
            name: String::from("metafactory"),
            descriptor: String::from("(Ljava/lang/invoke/MethodHandles$Lookup;)Ljava/lang/invoke/CallSite;"),
            interface: false,
        };
        let args = [ConstantValue::MethodType(String::from("()V"))];
        let first = pool.get_invoke_dynamic("run", "()Ljava/lang/Runnable;", &handle, &args);
        let second = pool.get_invoke_dynamic("call", "()Ljava/lang/Runnable;", &handle, &args);
        assert_ne!(first, second);
        assert_eq!(pool.bootstrap_methods().len(), 1);

        let other_args = [ConstantValue::Integer(1)];
        pool.get_invoke_dynamic("run", "()Ljava/lang/Runnable;", &handle, &other_args);
        assert_eq!(pool.bootstrap_methods().len(), 2);
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantsPool::new();
        for i in 0..0x8000 {
            pool.get_long(i);
        }
        assert!(matches!(
            pool.check_size(),
            Err(Error::ConstantPoolOverflow { count: 0x10001 })
        ));
        let mut out = ByteVector::new();
        assert!(pool.serialize_into(&mut out).is_err());
    }
}
