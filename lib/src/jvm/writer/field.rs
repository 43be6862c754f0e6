use super::annotation::AnnotationWriter;
use super::class::ClassContext;
use crate::jvm::access_flags::AccessBits;
use crate::jvm::attributes::{
    AnnotationList, Attribute, ConstantValue as ConstantValueAttribute, Deprecated,
    RuntimeVisibleAnnotations, Signature, Synthetic,
};
use crate::jvm::{AnnotationVisitor, ConstantValue, FieldAccessFlags, FieldVisitor, Serialize};
use crate::util::ByteVector;

/// Writer for one `field_info`, appended to the class once the field is complete
pub struct FieldWriter<'w, 'h> {
    context: &'w mut ClassContext<'h>,
    out: &'w mut Vec<ByteVector>,
    access: FieldAccessFlags,
    name: u16,
    descriptor: u16,
    signature: Option<String>,
    value: Option<ConstantValue>,
    annotations: AnnotationList,
    finished: bool,
}

impl<'w, 'h> FieldWriter<'w, 'h> {
    pub(super) fn new(
        context: &'w mut ClassContext<'h>,
        out: &'w mut Vec<ByteVector>,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> FieldWriter<'w, 'h> {
        let name = context.pool.get_utf8(name).index();
        let descriptor = context.pool.get_utf8(descriptor).index();
        FieldWriter {
            context,
            out,
            access,
            name,
            descriptor,
            signature: signature.map(str::to_owned),
            value: value.cloned(),
            annotations: AnnotationList::default(),
            finished: false,
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let pool = &mut self.context.pool;
        let major_version = self.context.version.major_version;
        let access = AccessBits {
            bits: self.access.bits(),
        };

        let mut attributes: Vec<Attribute> = vec![];
        if let Some(value) = &self.value {
            let index = pool.get_constant(value);
            attributes.push(pool.get_attribute(ConstantValueAttribute(index)));
        }
        if access.synthetic_attribute(major_version) {
            attributes.push(pool.get_attribute(Synthetic));
        }
        if access.deprecated() {
            attributes.push(pool.get_attribute(Deprecated));
        }
        if let Some(signature) = &self.signature {
            let signature = pool.get_utf8(signature.as_str());
            attributes.push(pool.get_attribute(Signature { signature }));
        }
        if !self.annotations.is_empty() {
            let annotations = std::mem::take(&mut self.annotations);
            attributes.push(pool.get_attribute(RuntimeVisibleAnnotations(annotations)));
        }

        let mut field = ByteVector::new();
        field
            .put_short(access.class_file_flags(major_version))
            .put_short(self.name)
            .put_short(self.descriptor);
        if let Err(err) = attributes.serialize(&mut field) {
            self.context.fail(err.into());
        }
        self.out.push(field);
    }
}

impl<'w, 'h> FieldVisitor for FieldWriter<'w, 'h> {
    fn visit_annotation(&mut self, descriptor: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationWriter::new(
            &mut self.context.pool,
            &mut self.annotations,
            descriptor,
        )))
    }

    fn visit_end(&mut self) {
        self.finish();
    }
}

impl<'w, 'h> Drop for FieldWriter<'w, 'h> {
    fn drop(&mut self) {
        self.finish();
    }
}
