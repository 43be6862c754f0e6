use crate::jvm::Serialize;
use byteorder::WriteBytesExt;

/// Constant pool tags
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4-140
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_u8(kind: u8) -> Option<HandleKind> {
        Some(match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    /// Field handles point at a `FieldRef`, the rest at a method reference
    pub fn is_field(self) -> bool {
        matches!(
            self,
            HandleKind::GetField
                | HandleKind::GetStatic
                | HandleKind::PutField
                | HandleKind::PutStatic
        )
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.as_u8().serialize(writer)
    }
}

/// Symbolic `java.lang.invoke.MethodHandle` constant
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct MethodHandle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,

    /// Whether `owner` is an interface (picks `InterfaceMethodref` over `Methodref`)
    pub interface: bool,
}

/// Dynamically-computed constant (`CONSTANT_Dynamic_info`)
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicConstant {
    pub name: String,
    pub descriptor: String,
    pub bootstrap_method: MethodHandle,
    pub arguments: Vec<ConstantValue>,
}

/// Loadable constants: the operands of `ldc`, field initial values and bootstrap arguments
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Internal name of a class, or a descriptor for array classes
    Class(String),

    /// Method descriptor
    MethodType(String),
    MethodHandle(MethodHandle),
    Dynamic(Box<DynamicConstant>),
}

impl ConstantValue {
    /// `long`, `double` and dynamic constants of those types need `ldc2_w`
    pub fn is_wide(&self) -> bool {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => true,
            ConstantValue::Dynamic(dynamic) => {
                matches!(dynamic.descriptor.as_str(), "J" | "D")
            }
            _ => false,
        }
    }
}
