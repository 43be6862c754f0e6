use crate::jvm::{AnnotationValue, AnnotationVisitor, ConstantPoolReader, Error};
use crate::util::Cursor;

/// Read `num_element_value_pairs` pairs (or, for arrays, unnamed values) and end the visitor
///
/// A missing visitor still consumes the values, so this doubles as a way to skip annotations.
pub(crate) fn read_element_values(
    pool: &ConstantPoolReader,
    cursor: &mut Cursor,
    named: bool,
    mut visitor: Option<Box<dyn AnnotationVisitor + '_>>,
) -> Result<(), Error> {
    let count = cursor.u16()?;
    for _ in 0..count {
        let name = if named {
            Some(pool.utf8(cursor.u16()?)?)
        } else {
            None
        };
        read_element_value(pool, cursor, name, visitor.as_deref_mut())?;
    }
    if let Some(visitor) = visitor.as_deref_mut() {
        visitor.visit_end();
    }
    Ok(())
}

/// Read one `annotation` structure whose type has already been visited
pub(crate) fn read_annotation(
    pool: &ConstantPoolReader,
    cursor: &mut Cursor,
    visitor: Option<Box<dyn AnnotationVisitor + '_>>,
) -> Result<(), Error> {
    read_element_values(pool, cursor, true, visitor)
}

fn is_primitive_tag(tag: u8) -> bool {
    matches!(tag, b'B' | b'C' | b'S' | b'Z' | b'I' | b'J' | b'F' | b'D')
}

fn primitive_value(pool: &ConstantPoolReader, tag: u8, index: u16) -> Result<AnnotationValue, Error> {
    Ok(match tag {
        b'B' => AnnotationValue::Byte(pool.integer(index)? as i8),
        b'C' => AnnotationValue::Char(pool.integer(index)? as u16),
        b'S' => AnnotationValue::Short(pool.integer(index)? as i16),
        b'Z' => AnnotationValue::Boolean(pool.integer(index)? != 0),
        b'I' => AnnotationValue::Int(pool.integer(index)?),
        b'J' => AnnotationValue::Long(pool.long(index)?),
        b'F' => AnnotationValue::Float(pool.float(index)?),
        _ => AnnotationValue::Double(pool.double(index)?),
    })
}

fn read_element_value(
    pool: &ConstantPoolReader,
    cursor: &mut Cursor,
    name: Option<&str>,
    visitor: Option<&mut (dyn AnnotationVisitor + '_)>,
) -> Result<(), Error> {
    let tag = cursor.u8()?;
    match tag {
        tag if is_primitive_tag(tag) => {
            let value = primitive_value(pool, tag, cursor.u16()?)?;
            if let Some(visitor) = visitor {
                visitor.visit(name, &value);
            }
        }
        b's' => {
            let value = AnnotationValue::String(pool.utf8(cursor.u16()?)?.to_owned());
            if let Some(visitor) = visitor {
                visitor.visit(name, &value);
            }
        }
        b'c' => {
            let value = AnnotationValue::Class(pool.utf8(cursor.u16()?)?.to_owned());
            if let Some(visitor) = visitor {
                visitor.visit(name, &value);
            }
        }
        b'e' => {
            let descriptor = pool.utf8(cursor.u16()?)?;
            let value = pool.utf8(cursor.u16()?)?;
            if let Some(visitor) = visitor {
                visitor.visit_enum(name, descriptor, value);
            }
        }
        b'@' => {
            let descriptor = pool.utf8(cursor.u16()?)?;
            let nested = match visitor {
                Some(visitor) => visitor.visit_annotation(name, descriptor),
                None => None,
            };
            read_annotation(pool, cursor, nested)?;
        }
        b'[' => read_array_value(pool, cursor, name, visitor)?,
        _ => {
            return Err(Error::UnknownElementValueTag {
                tag,
                offset: cursor.position() - 1,
            })
        }
    }
    Ok(())
}

/// Arrays of primitives are delivered as a single value, anything else through `visit_array`
fn read_array_value(
    pool: &ConstantPoolReader,
    cursor: &mut Cursor,
    name: Option<&str>,
    visitor: Option<&mut (dyn AnnotationVisitor + '_)>,
) -> Result<(), Error> {
    let start = cursor.position();
    let count = cursor.u16()?;
    let first_tag = if count > 0 {
        Some(cursor.clone().u8()?)
    } else {
        None
    };

    match first_tag {
        Some(tag) if is_primitive_tag(tag) => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let tag = cursor.u8()?;
                values.push(primitive_value(pool, tag, cursor.u16()?)?);
            }
            if let Some(visitor) = visitor {
                visitor.visit(name, &collect_primitive_array(tag, values));
            }
        }
        _ => {
            cursor.seek(start);
            let nested = match visitor {
                Some(visitor) => visitor.visit_array(name),
                None => None,
            };
            read_element_values(pool, cursor, false, nested)?;
        }
    }
    Ok(())
}

fn collect_primitive_array(tag: u8, values: Vec<AnnotationValue>) -> AnnotationValue {
    macro_rules! collect {
        ($variant:ident, $array:ident) => {
            AnnotationValue::$array(
                values
                    .into_iter()
                    .filter_map(|value| match value {
                        AnnotationValue::$variant(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )
        };
    }
    match tag {
        b'B' => collect!(Byte, ByteArray),
        b'C' => collect!(Char, CharArray),
        b'S' => collect!(Short, ShortArray),
        b'Z' => collect!(Boolean, BooleanArray),
        b'I' => collect!(Int, IntArray),
        b'J' => collect!(Long, LongArray),
        b'F' => collect!(Float, FloatArray),
        _ => collect!(Double, DoubleArray),
    }
}
