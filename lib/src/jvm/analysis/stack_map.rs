use super::types::{DIM, OBJECT, UNINITIALIZED};
use super::{ComputedFrame, FrameType};
use crate::jvm::attributes::AttributeLike;
use crate::jvm::constants::{ClassConstantIndex, TypeEntry};
use crate::jvm::{ConstantsPool, Serialize, TypeTable};
use byteorder::WriteBytesExt;

/// Type of a local or stack slot, as written in a stack map
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In a constructor, the `this` parameter has this type until `<init>` is called on it
    UninitializedThis,

    /// Class or array type
    Object(ClassConstantIndex),

    /// Result of the `new` instruction at this offset, before `<init>` is called on it
    Uninitialized(u16),
}

impl VerificationType {
    /// Convert a concrete frame type, adding the class constants it needs
    pub fn from_frame_type(
        frame_type: FrameType,
        types: &TypeTable,
        pool: &mut ConstantsPool,
    ) -> VerificationType {
        let dimensions = frame_type.dimensions();
        if dimensions > 0 {
            let mut descriptor = "[".repeat(dimensions as usize);
            let element = FrameType::from_bits(frame_type.bits() & !DIM);
            match element {
                FrameType::INTEGER => descriptor.push('I'),
                FrameType::FLOAT => descriptor.push('F'),
                FrameType::DOUBLE => descriptor.push('D'),
                FrameType::LONG => descriptor.push('J'),
                FrameType::BOOLEAN => descriptor.push('Z'),
                FrameType::BYTE => descriptor.push('B'),
                FrameType::CHAR => descriptor.push('C'),
                FrameType::SHORT => descriptor.push('S'),
                _ => {
                    descriptor.push('L');
                    descriptor.push_str(types.name(element.type_index()));
                    descriptor.push(';');
                }
            }
            return VerificationType::Object(pool.get_class(&descriptor));
        }

        match frame_type {
            FrameType::INTEGER
            | FrameType::BOOLEAN
            | FrameType::BYTE
            | FrameType::CHAR
            | FrameType::SHORT => VerificationType::Integer,
            FrameType::FLOAT => VerificationType::Float,
            FrameType::DOUBLE => VerificationType::Double,
            FrameType::LONG => VerificationType::Long,
            FrameType::NULL => VerificationType::Null,
            FrameType::UNINITIALIZED_THIS => VerificationType::UninitializedThis,
            other if other.base_kind() == OBJECT => {
                VerificationType::Object(pool.get_class(types.name(other.type_index())))
            }
            other if other.base_kind() == UNINITIALIZED => match types.get(other.type_index()) {
                Some(TypeEntry::Uninitialized { offset, .. }) => {
                    VerificationType::Uninitialized(*offset as u16)
                }
                _ => VerificationType::Top,
            },
            _ => VerificationType::Top,
        }
    }
}

impl Serialize for VerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(class) => {
                7u8.serialize(writer)?;
                class.serialize(writer)?;
            }
            VerificationType::Uninitialized(offset) => {
                8u8.serialize(writer)?;
                offset.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Same locals as the previous frame and an empty stack
    /// Tags: 0-63 or 251
    Same { offset_delta: u16 },

    /// Same locals as the previous frame and one stack item
    /// Tags: 64-126 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType,
    },

    /// Previous frame without its last `chopped_k` locals (1 to 3) and an empty stack
    /// Tags: 248-250
    Chop { offset_delta: u16, chopped_k: u8 },

    /// Previous frame with 1 to 3 extra locals and an empty stack
    /// Tags: 252-254
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta < 64 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta < 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::Chop {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Entry of the pre-Java 6 `StackMap` attribute: an absolute offset and full frame contents
#[derive(Debug, PartialEq, Eq)]
pub struct StackMapEntry {
    pub offset: u16,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl Serialize for StackMapEntry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.offset.serialize(writer)?;
        self.locals.serialize(writer)?;
        self.stack.serialize(writer)?;
        Ok(())
    }
}

/// Stack map attribute read by the CLDC preverifier and by old split verifiers
#[derive(Debug, Default)]
pub struct StackMap(pub Vec<StackMapEntry>);

impl AttributeLike for StackMap {
    const NAME: &'static str = "StackMap";
}

impl Serialize for StackMap {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Slots of a frame as the stack map lists them
///
/// The slot following a `long` or `double` is implicit. For locals, trailing `TOP`s are dropped.
fn significant_types(
    slots: &[FrameType],
    trim_top: bool,
    types: &TypeTable,
    pool: &mut ConstantsPool,
) -> Vec<VerificationType> {
    let mut listed = vec![];
    let mut significant = 0;
    let mut index = 0;
    while index < slots.len() {
        let slot = slots[index];
        let verification_type = VerificationType::from_frame_type(slot, types, pool);
        listed.push(verification_type);
        if verification_type != VerificationType::Top {
            significant = listed.len();
        }
        index += if slot.is_wide() { 2 } else { 1 };
    }
    if trim_top {
        listed.truncate(significant);
    }
    listed
}

/// Turn computed frames into `StackMapTable` entries
///
/// The first frame is the implicit frame of the method entry: it only serves as the base for
/// compressing the frame after it and is not written.
pub fn compress_frames(
    frames: &[ComputedFrame],
    types: &TypeTable,
    pool: &mut ConstantsPool,
) -> StackMapTable {
    let mut table = vec![];
    let (first, rest) = match frames.split_first() {
        Some(split) => split,
        None => return StackMapTable(table),
    };
    let mut previous_offset = None;
    let mut previous_locals = significant_types(&first.locals, true, types, pool);

    for frame in rest {
        let locals = significant_types(&frame.locals, true, types, pool);
        let mut stack = significant_types(&frame.stack, false, types, pool);
        let offset_delta = match previous_offset {
            None => frame.offset,
            Some(previous) => frame.offset - previous - 1,
        } as u16;
        previous_offset = Some(frame.offset);

        let shared = locals.len().min(previous_locals.len());
        let same_prefix = locals[..shared] == previous_locals[..shared];
        let added = locals.len() as isize - previous_locals.len() as isize;

        let compressed = if !same_prefix {
            None
        } else if stack.is_empty() {
            match added {
                -3..=-1 => Some(StackMapFrame::Chop {
                    offset_delta,
                    chopped_k: (-added) as u8,
                }),
                0 => Some(StackMapFrame::Same { offset_delta }),
                1..=3 => Some(StackMapFrame::Append {
                    offset_delta,
                    locals: locals[shared..].to_vec(),
                }),
                _ => None,
            }
        } else if added == 0 && stack.len() == 1 {
            stack.pop().map(|stack| StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            })
        } else {
            None
        };

        table.push(match compressed {
            Some(compressed) => compressed,
            None => StackMapFrame::Full {
                offset_delta,
                locals: locals.clone(),
                stack,
            },
        });
        previous_locals = locals;
    }
    StackMapTable(table)
}

/// Turn computed frames into `StackMap` entries, skipping the implicit first frame
pub fn legacy_frames(
    frames: &[ComputedFrame],
    types: &TypeTable,
    pool: &mut ConstantsPool,
) -> StackMap {
    let entries = frames
        .iter()
        .skip(1)
        .map(|frame| StackMapEntry {
            offset: frame.offset as u16,
            locals: significant_types(&frame.locals, true, types, pool),
            stack: significant_types(&frame.stack, false, types, pool),
        })
        .collect();
    StackMap(entries)
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(offset: usize, locals: &[FrameType], stack: &[FrameType]) -> ComputedFrame {
        ComputedFrame {
            offset,
            locals: locals.to_vec(),
            stack: stack.to_vec(),
        }
    }

    #[test]
    fn frame_kinds() {
        let types = TypeTable::new();
        let mut pool = ConstantsPool::new();
        let int = FrameType::INTEGER;
        let frames = [
            frame(0, &[int], &[]),
            frame(5, &[int], &[]),
            frame(9, &[int, int, FrameType::LONG, FrameType::TOP], &[]),
            frame(12, &[int], &[]),
            frame(80, &[int], &[int]),
            frame(90, &[FrameType::FLOAT], &[]),
        ];
        let table = compress_frames(&frames, &types, &mut pool);
        assert_eq!(
            table.0,
            vec![
                StackMapFrame::Same { offset_delta: 5 },
                StackMapFrame::Append {
                    offset_delta: 3,
                    locals: vec![VerificationType::Integer, VerificationType::Long],
                },
                StackMapFrame::Chop {
                    offset_delta: 2,
                    chopped_k: 2,
                },
                StackMapFrame::SameLocalsOneStack {
                    offset_delta: 67,
                    stack: VerificationType::Integer,
                },
                StackMapFrame::Full {
                    offset_delta: 9,
                    locals: vec![VerificationType::Float],
                    stack: vec![],
                },
            ]
        );
    }

    #[test]
    fn trailing_tops_are_dropped() {
        let types = TypeTable::new();
        let mut pool = ConstantsPool::new();
        let frames = [
            frame(0, &[FrameType::INTEGER, FrameType::TOP], &[]),
            frame(3, &[FrameType::INTEGER, FrameType::TOP, FrameType::TOP], &[]),
        ];
        let table = compress_frames(&frames, &types, &mut pool);
        assert_eq!(table.0, vec![StackMapFrame::Same { offset_delta: 3 }]);
    }

    #[test]
    fn same_frame_encoding() {
        assert_eq!(StackMapFrame::Same { offset_delta: 3 }.to_bytes(), [3]);
        assert_eq!(
            StackMapFrame::Same { offset_delta: 64 }.to_bytes(),
            [251, 0, 64]
        );
        let one_stack = StackMapFrame::SameLocalsOneStack {
            offset_delta: 63,
            stack: VerificationType::Null,
        };
        assert_eq!(one_stack.to_bytes(), [247, 0, 63, 5]);
    }

    #[test]
    fn array_types_become_class_constants() {
        let mut types = TypeTable::new();
        let mut pool = ConstantsPool::new();
        let string = FrameType::object(types.add_normal_type("java/lang/String"));
        let converted = VerificationType::from_frame_type(string.array_of(), &types, &mut pool);
        let expected = pool.get_class("[Ljava/lang/String;");
        assert_eq!(converted, VerificationType::Object(expected));

        let ints = FrameType::INTEGER.array_of().array_of();
        let converted = VerificationType::from_frame_type(ints, &types, &mut pool);
        assert_eq!(converted, VerificationType::Object(pool.get_class("[[I")));
    }
}
