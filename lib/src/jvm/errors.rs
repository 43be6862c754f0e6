use std::fmt;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Input ended before a value could be read
    Truncated {
        offset: usize,
        needed: usize,
    },

    /// Input does not start with `0xCAFEBABE`
    BadMagic(u32),

    /// Constant pool tag that doesn't correspond to any known constant kind
    ///
    /// This is not recoverable, since the size of the entry (and so the offsets of every
    /// following entry) is unknown.
    UnknownConstantTag {
        tag: u8,
        offset: usize,
    },

    /// Constant pool index that is zero, unusable, or past the end of the pool
    BadConstantIndex {
        index: u16,
    },

    /// Constant pool entry used where a loadable constant was expected
    NotLoadableConstant {
        tag: u8,
        index: u16,
    },

    /// Annotation element value with an unrecognized tag
    UnknownElementValueTag {
        tag: u8,
        offset: usize,
    },

    BadDescriptor(String),

    /// The constant pool needs more slots than 16-bit indices can address
    ConstantPoolOverflow {
        count: usize,
    },

    /// Modified UTF-8 encoding of a string exceeds the 65535 byte limit
    Utf8TooLong {
        encoded_len: usize,
    },

    /// Method body exceeds the 65535 byte limit
    MethodCodeOverflow {
        method: String,
        length: usize,
    },

    /// Forward branch whose offset does not fit in 16 bits
    JumpOffsetOverflow {
        method: String,
        offset: isize,
    },

    /// Code reaching the same offset with different operand stack heights
    InconsistentStackHeight {
        method: String,
        offset: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Truncated { offset, needed } => write!(
                f,
                "class file truncated: needed {} byte(s) at offset {}",
                needed, offset
            ),
            Error::BadMagic(magic) => write!(f, "bad class file magic {:#010x}", magic),
            Error::UnknownConstantTag { tag, offset } => {
                write!(f, "unknown constant pool tag {} at offset {}", tag, offset)
            }
            Error::BadConstantIndex { index } => {
                write!(f, "constant pool index {} does not name an entry", index)
            }
            Error::NotLoadableConstant { tag, index } => write!(
                f,
                "constant pool entry {} (tag {}) is not a loadable constant",
                index, tag
            ),
            Error::UnknownElementValueTag { tag, offset } => write!(
                f,
                "unknown annotation element value tag '{}' at offset {}",
                *tag as char, offset
            ),
            Error::BadDescriptor(desc) => write!(f, "invalid type descriptor '{}'", desc),
            Error::ConstantPoolOverflow { count } => write!(
                f,
                "constant pool has {} slots, more than the 65535 allowed",
                count
            ),
            Error::Utf8TooLong { encoded_len } => write!(
                f,
                "string encodes to {} bytes, more than the 65535 allowed",
                encoded_len
            ),
            Error::MethodCodeOverflow { method, length } => write!(
                f,
                "code of method {} is {} bytes, more than the 65535 allowed",
                method, length
            ),
            Error::JumpOffsetOverflow { method, offset } => write!(
                f,
                "branch offset {} in method {} does not fit in 16 bits",
                offset, method
            ),
            Error::InconsistentStackHeight { method, offset } => write!(
                f,
                "stack heights differ at offset {} of method {}",
                offset, method
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
