use bitflags::bitflags;

// Flags above bit 15 never reach a class file directly. They ride along with the real access
// flags so that marker attributes survive a trip through the visitor protocol.

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;

        /// Class carries a `Deprecated` attribute
        const DEPRECATED = 0x2_0000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;

        /// Method carries a `Deprecated` attribute
        const DEPRECATED = 0x2_0000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;

        /// Field carries a `Deprecated` attribute
        const DEPRECATED = 0x2_0000;
    }
}

bitflags! {
    /// Access flags on inner classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6-300-D.1-D.1
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

/// Bits shared by the class, field and method flag sets that matter when emitting them
const SYNTHETIC: u32 = 0x1000;
const DEPRECATED: u32 = 0x2_0000;

/// First class file version where `ACC_SYNTHETIC` is a real access flag
const SYNTHETIC_FLAG_MAJOR_VERSION: u16 = 49;

/// Marker attributes and class file bits implied by a set of flags
pub(crate) struct AccessBits {
    pub bits: u32,
}

impl AccessBits {
    /// The 16 bits that go in the class file
    pub fn class_file_flags(&self, major_version: u16) -> u16 {
        let mut bits = self.bits & 0xFFFF;
        if self.synthetic_attribute(major_version) {
            bits &= !SYNTHETIC;
        }
        bits as u16
    }

    pub fn deprecated(&self) -> bool {
        self.bits & DEPRECATED != 0
    }

    /// Old class files mark synthetic members with an attribute instead of a flag
    pub fn synthetic_attribute(&self, major_version: u16) -> bool {
        self.bits & SYNTHETIC != 0 && major_version < SYNTHETIC_FLAG_MAJOR_VERSION
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pseudo_flags_are_stripped() {
        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::DEPRECATED;
        let bits = AccessBits { bits: flags.bits() };
        assert!(bits.deprecated());
        assert_eq!(bits.class_file_flags(52), 0x0001);
    }

    #[test]
    fn synthetic_attribute_only_for_old_versions() {
        let bits = AccessBits {
            bits: FieldAccessFlags::SYNTHETIC.bits(),
        };
        assert!(bits.synthetic_attribute(48));
        assert_eq!(bits.class_file_flags(48), 0);
        assert!(!bits.synthetic_attribute(49));
        assert_eq!(bits.class_file_flags(49), 0x1000);
    }
}
