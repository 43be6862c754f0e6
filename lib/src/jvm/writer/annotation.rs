use crate::jvm::attributes::AnnotationList;
use crate::jvm::{AnnotationValue, AnnotationVisitor, ConstantsPool};
use crate::util::ByteVector;

/// Encodes one annotation (or one array element value) straight into the bytes of its list
///
/// Nested annotations and arrays borrow their parent, so they are necessarily complete before
/// the parent writes its next element. The element count is patched after every element.
pub struct AnnotationWriter<'a> {
    pool: &'a mut ConstantsPool,
    bytes: &'a mut ByteVector,

    /// Annotations have named element values, arrays don't
    named: bool,
    count_position: usize,
    count: u16,
}

impl<'a> AnnotationWriter<'a> {
    /// Start a new annotation at the end of `list`
    pub fn new(
        pool: &'a mut ConstantsPool,
        list: &'a mut AnnotationList,
        descriptor: &str,
    ) -> AnnotationWriter<'a> {
        list.count += 1;
        let bytes = &mut list.bytes;
        bytes.put_short(pool.get_utf8(descriptor).index());
        Self::with_count(pool, bytes, true)
    }

    fn with_count(
        pool: &'a mut ConstantsPool,
        bytes: &'a mut ByteVector,
        named: bool,
    ) -> AnnotationWriter<'a> {
        let count_position = bytes.len();
        bytes.put_short(0);
        AnnotationWriter {
            pool,
            bytes,
            named,
            count_position,
            count: 0,
        }
    }

    /// Write the element name (if any) of the next element value
    fn start_element(&mut self, name: Option<&str>) {
        if self.named {
            let name = self.pool.get_utf8(name.unwrap_or("value"));
            self.bytes.put_short(name.index());
        }
        self.count += 1;
        self.bytes.set_short(self.count_position, self.count);
    }

    fn put_int_value(&mut self, tag: u8, value: i32) {
        let index = self.pool.get_integer(value);
        self.bytes.put12(tag, index.0);
    }

    fn put_value(&mut self, value: &AnnotationValue) {
        match value {
            AnnotationValue::Byte(value) => self.put_int_value(b'B', *value as i32),
            AnnotationValue::Char(value) => self.put_int_value(b'C', *value as i32),
            AnnotationValue::Short(value) => self.put_int_value(b'S', *value as i32),
            AnnotationValue::Boolean(value) => self.put_int_value(b'Z', *value as i32),
            AnnotationValue::Int(value) => self.put_int_value(b'I', *value),
            AnnotationValue::Long(value) => {
                let index = self.pool.get_long(*value);
                self.bytes.put12(b'J', index.0);
            }
            AnnotationValue::Float(value) => {
                let index = self.pool.get_float(*value);
                self.bytes.put12(b'F', index.0);
            }
            AnnotationValue::Double(value) => {
                let index = self.pool.get_double(*value);
                self.bytes.put12(b'D', index.0);
            }
            AnnotationValue::String(value) => {
                let index = self.pool.get_utf8(value.as_str());
                self.bytes.put12(b's', index.index());
            }
            AnnotationValue::Class(descriptor) => {
                let index = self.pool.get_utf8(descriptor.as_str());
                self.bytes.put12(b'c', index.index());
            }
            AnnotationValue::ByteArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Byte(*v)), values.len())
            }
            AnnotationValue::CharArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Char(*v)), values.len())
            }
            AnnotationValue::ShortArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Short(*v)), values.len())
            }
            AnnotationValue::BooleanArray(values) => self.put_array(
                values.iter().map(|v| AnnotationValue::Boolean(*v)),
                values.len(),
            ),
            AnnotationValue::IntArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Int(*v)), values.len())
            }
            AnnotationValue::LongArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Long(*v)), values.len())
            }
            AnnotationValue::FloatArray(values) => {
                self.put_array(values.iter().map(|v| AnnotationValue::Float(*v)), values.len())
            }
            AnnotationValue::DoubleArray(values) => self.put_array(
                values.iter().map(|v| AnnotationValue::Double(*v)),
                values.len(),
            ),
        }
    }

    fn put_array(&mut self, values: impl Iterator<Item = AnnotationValue>, len: usize) {
        self.bytes.put12(b'[', len as u16);
        for value in values {
            self.put_value(&value);
        }
    }
}

impl<'a> AnnotationVisitor for AnnotationWriter<'a> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) {
        self.start_element(name);
        self.put_value(value);
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) {
        self.start_element(name);
        let descriptor = self.pool.get_utf8(descriptor);
        let value = self.pool.get_utf8(value);
        self.bytes
            .put12(b'e', descriptor.index())
            .put_short(value.index());
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.start_element(name);
        let descriptor = self.pool.get_utf8(descriptor);
        self.bytes.put12(b'@', descriptor.index());
        Some(Box::new(AnnotationWriter::with_count(
            self.pool, self.bytes, true,
        )))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.start_element(name);
        self.bytes.put_byte(b'[');
        Some(Box::new(AnnotationWriter::with_count(
            self.pool, self.bytes, false,
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_values_are_counted() {
        let mut pool = ConstantsPool::new();
        let mut list = AnnotationList::default();
        {
            let mut annotation = AnnotationWriter::new(&mut pool, &mut list, "LA;");
            annotation.visit(Some("x"), &AnnotationValue::Int(3));
            if let Some(mut array) = annotation.visit_array(Some("names")) {
                array.visit(None, &AnnotationValue::String(String::from("a")));
                array.visit(None, &AnnotationValue::String(String::from("b")));
                array.visit_end();
            }
            annotation.visit_end();
        }
        assert_eq!(list.count, 1);

        let bytes = list.bytes.as_slice();
        // type index, then two element value pairs
        assert_eq!(&bytes[2..4], [0, 2]);
        // `x = 3`: name, tag, constant
        assert_eq!(bytes[6], b'I');
        // `names = {"a", "b"}`: name, tag, two elements
        assert_eq!(bytes[11], b'[');
        assert_eq!(&bytes[12..14], [0, 2]);
        assert_eq!(bytes.len(), 14 + 2 * 3);
    }

    #[test]
    fn primitive_arrays_are_inlined() {
        let mut pool = ConstantsPool::new();
        let mut list = AnnotationList::default();
        let mut annotation = AnnotationWriter::new(&mut pool, &mut list, "LA;");
        annotation.visit(None, &AnnotationValue::IntArray(vec![1, 2]));
        drop(annotation);

        let bytes = list.bytes.as_slice();
        assert_eq!(&bytes[2..4], [0, 1]);
        assert_eq!(&bytes[6..9], [b'[', 0, 2]);
        assert_eq!(bytes[9], b'I');
        assert_eq!(bytes[12], b'I');
    }
}
