use std::fmt;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
///
/// Ordering compares the major version first.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    pub const JAVA1_1: Version = Version::new(45);
    pub const JAVA1_2: Version = Version::new(46);
    pub const JAVA1_4: Version = Version::new(48);
    pub const JAVA5: Version = Version::new(49);
    pub const JAVA6: Version = Version::new(50);
    pub const JAVA7: Version = Version::new(51);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::new(52);
    pub const JAVA11: Version = Version::new(55);
    pub const JAVA17: Version = Version::new(61);

    pub const fn new(major_version: u16) -> Version {
        Version {
            major_version,
            minor_version: 0,
        }
    }

    /// Stack map frames are mandatory from Java 7 onwards
    pub fn requires_stack_map_frames(self) -> bool {
        self >= Version::JAVA7
    }

    /// Java 6 introduced the compressed `StackMapTable` attribute
    pub fn supports_stack_map_table(self) -> bool {
        self >= Version::JAVA6
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}
