use crate::jvm::{ClassHierarchy, Error, TypeTable};
use std::fmt;

// Layout of an encoded type:
//
//   DIM (4 bits) | KIND (4 bits) | payload (24 bits)
//
// For the BASE kind, the payload splits into a 4 bit base kind (plain, object, uninitialized)
// and a 20 bit value (a primitive constant or a type table index). For the LOCAL and STACK
// kinds, the low 23 bits are a slot index relative to the input frame of the block and bit 23
// asks for TOP when that slot turns out to hold a long or double.

pub(crate) const DIM: u32 = 0xF000_0000;
pub(crate) const ARRAY_OF: u32 = 0x1000_0000;
pub(crate) const ELEMENT_OF: u32 = 0xF000_0000;
pub(crate) const KIND: u32 = 0x0F00_0000;
pub(crate) const TOP_IF_LONG_OR_DOUBLE: u32 = 0x0080_0000;
pub(crate) const VALUE: u32 = 0x007F_FFFF;
pub(crate) const BASE_KIND: u32 = 0x0FF0_0000;
pub(crate) const BASE_VALUE: u32 = 0x000F_FFFF;
pub(crate) const BASE: u32 = 0x0100_0000;
pub(crate) const OBJECT: u32 = BASE | 0x0070_0000;
pub(crate) const UNINITIALIZED: u32 = BASE | 0x0080_0000;
pub(crate) const LOCAL: u32 = 0x0200_0000;
pub(crate) const STACK: u32 = 0x0300_0000;

const MAX_DIMENSIONS: usize = 7;

/// Abstract type of a stack or local variable slot, packed into 32 bits
///
/// Besides concrete types, a frame type can refer to "whatever local `n` (or stack slot `n`
/// from the top) held at the start of the block", optionally with extra array dimensions. This
/// lets the output frame of a block be computed before its input frame is known.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct FrameType(u32);

impl FrameType {
    /// Slot not assigned yet
    pub const UNSET: FrameType = FrameType(0);

    pub const TOP: FrameType = FrameType(BASE);
    pub const INTEGER: FrameType = FrameType(BASE | 1);
    pub const FLOAT: FrameType = FrameType(BASE | 2);
    pub const DOUBLE: FrameType = FrameType(BASE | 3);
    pub const LONG: FrameType = FrameType(BASE | 4);
    pub const NULL: FrameType = FrameType(BASE | 5);
    pub const UNINITIALIZED_THIS: FrameType = FrameType(BASE | 6);

    /// Only used as array element types
    pub const BOOLEAN: FrameType = FrameType(BASE | 9);
    pub const BYTE: FrameType = FrameType(BASE | 10);
    pub const CHAR: FrameType = FrameType(BASE | 11);
    pub const SHORT: FrameType = FrameType(BASE | 12);

    pub const fn from_bits(bits: u32) -> FrameType {
        FrameType(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Object type, from a type table index
    pub const fn object(index: u32) -> FrameType {
        FrameType(OBJECT | index)
    }

    /// Uninitialized type, from a type table index
    pub const fn uninitialized(index: u32) -> FrameType {
        FrameType(UNINITIALIZED | index)
    }

    /// Input local `index` of the block
    pub const fn local(index: u32) -> FrameType {
        FrameType(LOCAL | index)
    }

    /// Input stack slot `index`, counting from the top starting at 1
    pub const fn stack(index: u32) -> FrameType {
        FrameType(STACK | index)
    }

    /// Signed number of array dimensions
    pub fn dimensions(self) -> i32 {
        (self.0 as i32) >> 28
    }

    pub(crate) fn kind(self) -> u32 {
        self.0 & KIND
    }

    pub(crate) fn base_kind(self) -> u32 {
        self.0 & BASE_KIND
    }

    /// Type table index of an object or uninitialized type
    pub fn type_index(self) -> u32 {
        self.0 & BASE_VALUE
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    pub fn is_wide(self) -> bool {
        self == FrameType::LONG || self == FrameType::DOUBLE
    }

    /// Object or array (`null` and uninitialized types are not included)
    pub fn is_reference(self) -> bool {
        self.base_kind() == OBJECT || self.0 & DIM != 0
    }

    pub fn array_of(self) -> FrameType {
        FrameType(self.0.wrapping_add(ARRAY_OF))
    }

    pub fn element_of(self) -> FrameType {
        FrameType(self.0.wrapping_add(ELEMENT_OF))
    }

    /// Add the array dimensions of `reference` (a local or stack reference)
    pub(crate) fn with_dimensions_of(self, reference: FrameType) -> FrameType {
        FrameType((reference.0 & DIM).wrapping_add(self.0))
    }

    pub(crate) fn top_if_long_or_double(self) -> FrameType {
        FrameType(self.0 | TOP_IF_LONG_OR_DOUBLE)
    }

    pub(crate) fn wants_top_if_long_or_double(self) -> bool {
        self.0 & TOP_IF_LONG_OR_DOUBLE != 0
    }

    /// Slot index of a local or stack reference
    pub(crate) fn slot(self) -> usize {
        (self.0 & VALUE) as usize
    }

    /// Type of a value of a field descriptor, or of the return value of a method descriptor
    ///
    /// `void` maps to [`FrameType::UNSET`].
    pub fn from_descriptor(descriptor: &str, types: &mut TypeTable) -> Result<FrameType, Error> {
        let value = match descriptor.rfind(')') {
            Some(paren) => &descriptor[paren + 1..],
            None => descriptor,
        };
        let bad_descriptor = || Error::BadDescriptor(descriptor.to_owned());

        let frame_type = match value.as_bytes().first() {
            Some(b'V') => FrameType::UNSET,
            Some(b'Z' | b'C' | b'B' | b'S' | b'I') => FrameType::INTEGER,
            Some(b'F') => FrameType::FLOAT,
            Some(b'J') => FrameType::LONG,
            Some(b'D') => FrameType::DOUBLE,
            Some(b'L') => match value[1..].strip_suffix(';') {
                Some(name) => FrameType::object(types.add_normal_type(name)),
                None => return Err(bad_descriptor()),
            },
            Some(b'[') => {
                let element = value.trim_start_matches('[');
                let dimensions = value.len() - element.len();
                if dimensions > MAX_DIMENSIONS {
                    return Err(bad_descriptor());
                }
                let element = match element.as_bytes().first() {
                    Some(b'Z') => FrameType::BOOLEAN,
                    Some(b'C') => FrameType::CHAR,
                    Some(b'B') => FrameType::BYTE,
                    Some(b'S') => FrameType::SHORT,
                    Some(b'I') => FrameType::INTEGER,
                    Some(b'F') => FrameType::FLOAT,
                    Some(b'J') => FrameType::LONG,
                    Some(b'D') => FrameType::DOUBLE,
                    Some(b'L') => match element[1..].strip_suffix(';') {
                        Some(name) => FrameType::object(types.add_normal_type(name)),
                        None => return Err(bad_descriptor()),
                    },
                    _ => return Err(bad_descriptor()),
                };
                FrameType(((dimensions as u32) << 28) | element.0)
            }
            _ => return Err(bad_descriptor()),
        };
        Ok(frame_type)
    }

    /// Join `incoming` into `slot`, returning whether `slot` changed
    ///
    /// `incoming` must be a concrete type (no local or stack references). The join is the least
    /// upper bound in the verifier's type lattice: equal types stay, `null` joins into any
    /// reference, objects meet at their common superclass, and anything else becomes TOP.
    pub fn merge_into(
        slot: &mut FrameType,
        incoming: FrameType,
        types: &mut TypeTable,
        hierarchy: &dyn ClassHierarchy,
    ) -> bool {
        let current = *slot;
        if current == incoming {
            return false;
        }

        let mut incoming = incoming;
        if incoming.0 & !DIM == FrameType::NULL.0 {
            if current == FrameType::NULL {
                return false;
            }
            incoming = FrameType::NULL;
        }

        if current.is_unset() {
            *slot = incoming;
            return true;
        }

        let merged = if current.is_reference() {
            if incoming == FrameType::NULL {
                return false;
            } else if incoming.0 & (DIM | BASE_KIND) == current.0 & (DIM | BASE_KIND) {
                if current.base_kind() == OBJECT {
                    let common =
                        types.merged_type(incoming.type_index(), current.type_index(), hierarchy);
                    FrameType((incoming.0 & DIM) | OBJECT | common)
                } else {
                    // Arrays of different primitives: Object, one dimension down
                    let dimensions = ELEMENT_OF.wrapping_add(incoming.0 & DIM);
                    FrameType(dimensions | OBJECT | object_index(types))
                }
            } else if incoming.is_reference() {
                let dimensions = reference_dimensions(incoming).min(reference_dimensions(current));
                FrameType(dimensions as u32 | OBJECT | object_index(types))
            } else {
                FrameType::TOP
            }
        } else if current == FrameType::NULL {
            if incoming.is_reference() {
                incoming
            } else {
                FrameType::TOP
            }
        } else {
            FrameType::TOP
        };

        if merged != current {
            *slot = merged;
            true
        } else {
            false
        }
    }
}

fn object_index(types: &mut TypeTable) -> u32 {
    types.add_normal_type("java/lang/Object")
}

/// Dimension bits of the `Object` array a reference can be widened to
///
/// Arrays of primitives lose a dimension (`int[][]` is an `Object[]`, `int[]` is an `Object`).
fn reference_dimensions(frame_type: FrameType) -> i32 {
    let dimensions = frame_type.0 & DIM;
    let widened = if dimensions == 0 || frame_type.base_kind() == OBJECT {
        dimensions
    } else {
        ELEMENT_OF.wrapping_add(dimensions)
    };
    widened as i32
}

impl fmt::Debug for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            return f.write_str("unset");
        }
        for _ in 0..self.dimensions().max(0) {
            f.write_str("[")?;
        }
        let element = FrameType(self.0 & !DIM);
        match element.kind() {
            LOCAL => write!(f, "local{}", element.slot())?,
            STACK => write!(f, "stack{}", element.slot())?,
            _ => match element.base_kind() {
                OBJECT => write!(f, "object#{}", element.type_index())?,
                UNINITIALIZED => write!(f, "uninitialized#{}", element.type_index())?,
                _ => {
                    let name = match element {
                        FrameType::TOP => "top",
                        FrameType::INTEGER => "int",
                        FrameType::FLOAT => "float",
                        FrameType::DOUBLE => "double",
                        FrameType::LONG => "long",
                        FrameType::NULL => "null",
                        FrameType::UNINITIALIZED_THIS => "uninitializedThis",
                        FrameType::BOOLEAN => "boolean",
                        FrameType::BYTE => "byte",
                        FrameType::CHAR => "char",
                        FrameType::SHORT => "short",
                        _ => "?",
                    };
                    f.write_str(name)?;
                }
            },
        }
        if self.wants_top_if_long_or_double() {
            f.write_str("!")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::SuperClassMap;

    fn merge(
        current: FrameType,
        incoming: FrameType,
        types: &mut TypeTable,
        hierarchy: &SuperClassMap,
    ) -> (FrameType, bool) {
        let mut slot = current;
        let changed = FrameType::merge_into(&mut slot, incoming, types, hierarchy);
        (slot, changed)
    }

    fn sample(types: &mut TypeTable) -> Vec<FrameType> {
        let string = FrameType::object(types.add_normal_type("java/lang/String"));
        let integer = FrameType::object(types.add_normal_type("java/lang/Integer"));
        vec![
            FrameType::INTEGER,
            FrameType::FLOAT,
            FrameType::NULL,
            string,
            integer,
            FrameType::INTEGER.array_of(),
            FrameType::INTEGER.array_of().array_of(),
            string.array_of(),
            FrameType::FLOAT.array_of(),
        ]
    }

    #[test]
    fn descriptors() {
        let mut types = TypeTable::new();
        assert_eq!(FrameType::from_descriptor("I", &mut types).unwrap(), FrameType::INTEGER);
        assert_eq!(FrameType::from_descriptor("(JZ)D", &mut types).unwrap(), FrameType::DOUBLE);
        assert!(FrameType::from_descriptor("()V", &mut types).unwrap().is_unset());

        let string = FrameType::from_descriptor("Ljava/lang/String;", &mut types).unwrap();
        assert_eq!(types.name(string.type_index()), "java/lang/String");

        let matrix = FrameType::from_descriptor("[[Z", &mut types).unwrap();
        assert_eq!(matrix.dimensions(), 2);
        assert_eq!(matrix.element_of().element_of(), FrameType::BOOLEAN);

        assert!(FrameType::from_descriptor("Ljava/lang/String", &mut types).is_err());
        assert!(FrameType::from_descriptor("[[[[[[[[I", &mut types).is_err());
    }

    #[test]
    fn merge_is_idempotent() {
        let hierarchy = SuperClassMap::new();
        let mut types = TypeTable::new();
        for frame_type in sample(&mut types) {
            assert_eq!(
                merge(frame_type, frame_type, &mut types, &hierarchy),
                (frame_type, false)
            );
        }
    }

    #[test]
    fn merge_is_commutative() {
        let mut hierarchy = SuperClassMap::new();
        hierarchy.insert("java/lang/Integer", "java/lang/Number");
        let mut types = TypeTable::new();
        let sample = sample(&mut types);
        for a in &sample {
            for b in &sample {
                let (ab, _) = merge(*a, *b, &mut types, &hierarchy);
                let (ba, _) = merge(*b, *a, &mut types, &hierarchy);
                assert_eq!(ab, ba, "merging {:?} and {:?}", a, b);
            }
        }
    }

    #[test]
    fn merge_results() {
        let hierarchy = SuperClassMap::new();
        let mut types = TypeTable::new();
        let object = FrameType::object(types.add_normal_type("java/lang/Object"));
        let string = FrameType::object(types.add_normal_type("java/lang/String"));

        assert_eq!(
            merge(string, FrameType::NULL, &mut types, &hierarchy),
            (string, false)
        );
        assert_eq!(
            merge(FrameType::NULL, string, &mut types, &hierarchy),
            (string, true)
        );
        assert_eq!(
            merge(FrameType::INTEGER, FrameType::FLOAT, &mut types, &hierarchy),
            (FrameType::TOP, true)
        );
        assert_eq!(
            merge(FrameType::UNSET, FrameType::LONG, &mut types, &hierarchy),
            (FrameType::LONG, true)
        );

        // int[] and float[] meet at Object, int[][] and float[][] at Object[]
        let ints = FrameType::INTEGER.array_of();
        let floats = FrameType::FLOAT.array_of();
        assert_eq!(merge(ints, floats, &mut types, &hierarchy).0, object);
        assert_eq!(
            merge(ints.array_of(), floats.array_of(), &mut types, &hierarchy).0,
            object.array_of()
        );

        // String[] and String[][] meet at Object[]
        assert_eq!(
            merge(string.array_of(), string.array_of().array_of(), &mut types, &hierarchy).0,
            object.array_of()
        );
    }
}
