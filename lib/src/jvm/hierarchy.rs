use crate::jvm::{ClassMetadataReader, Error};
use std::collections::HashMap;

/// Superclass lookups used when merging two object types in a stack map frame
///
/// Computing frames requires knowing the nearest common superclass of two classes. This is the
/// only place where the writer needs to know anything about classes other than the one being
/// written.
pub trait ClassHierarchy {
    /// Internal name of the superclass, or `None` if unknown (or for `java/lang/Object`)
    fn super_class(&self, class: &str) -> Option<String>;

    /// Learn about a class being written. Hierarchies that cannot learn ignore this.
    #[allow(unused_variables)]
    fn record(&mut self, class: &str, super_class: &str) {}
}

/// `java/lang` classes with a superclass other than `java/lang/Object` that compiled code
/// routinely merges: the throwable hierarchy (for handlers and rethrows) and boxed numbers
const JAVA_LANG_SUPERS: &[(&str, &str)] = &[
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/Error", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    ("java/lang/InstantiationException", "java/lang/ReflectiveOperationException"),
    ("java/lang/IllegalAccessException", "java/lang/ReflectiveOperationException"),
    ("java/lang/NoSuchFieldException", "java/lang/ReflectiveOperationException"),
    ("java/lang/NoSuchMethodException", "java/lang/ReflectiveOperationException"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    ("java/io/IOException", "java/lang/Exception"),
    ("java/io/UncheckedIOException", "java/lang/RuntimeException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/StringIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/SecurityException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/util/NoSuchElementException", "java/lang/RuntimeException"),
    ("java/util/ConcurrentModificationException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    ("java/lang/AssertionError", "java/lang/Error"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/lang/Byte", "java/lang/Number"),
    ("java/lang/Short", "java/lang/Number"),
    ("java/lang/Integer", "java/lang/Number"),
    ("java/lang/Long", "java/lang/Number"),
    ("java/lang/Float", "java/lang/Number"),
    ("java/lang/Double", "java/lang/Number"),
];

/// Hierarchy backed by a map from class to superclass
///
/// The class writer records every class it writes, so classes written earlier through the same
/// map are known to later ones. Other classes can be added from their class files with
/// [`SuperClassMap::add_class_file`].
#[derive(Debug, Default, Clone)]
pub struct SuperClassMap {
    supers: HashMap<String, String>,
}

impl SuperClassMap {
    /// Empty map: every class outside of it merges to `java/lang/Object`
    pub fn new() -> SuperClassMap {
        SuperClassMap::default()
    }

    /// Map already knowing the common exception classes and boxed numbers of the JDK
    pub fn with_java_lang() -> SuperClassMap {
        let mut map = SuperClassMap::new();
        for (class, super_class) in JAVA_LANG_SUPERS {
            map.insert(*class, *super_class);
        }
        map
    }

    /// Record the class defined by a class file, returning its name
    pub fn add_class_file(&mut self, bytes: &[u8]) -> Result<String, Error> {
        let reader = ClassMetadataReader::new(bytes)?;
        let class = reader.class_name()?;
        if let Some(super_class) = reader.super_name()? {
            self.insert(class, super_class);
        }
        Ok(class.to_owned())
    }

    pub fn insert(&mut self, class: impl Into<String>, super_class: impl Into<String>) {
        self.supers.insert(class.into(), super_class.into());
    }

    pub fn len(&self) -> usize {
        self.supers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supers.is_empty()
    }
}

impl ClassHierarchy for SuperClassMap {
    fn super_class(&self, class: &str) -> Option<String> {
        self.supers.get(class).cloned()
    }

    fn record(&mut self, class: &str, super_class: &str) {
        self.insert(class, super_class);
    }
}

impl<H: ClassHierarchy + ?Sized> ClassHierarchy for &H {
    fn super_class(&self, class: &str) -> Option<String> {
        (**self).super_class(class)
    }
}

impl<H: ClassHierarchy + ?Sized> ClassHierarchy for &mut H {
    fn super_class(&self, class: &str) -> Option<String> {
        (**self).super_class(class)
    }

    fn record(&mut self, class: &str, super_class: &str) {
        (**self).record(class, super_class)
    }
}

impl<H: ClassHierarchy + ?Sized> ClassHierarchy for Box<H> {
    fn super_class(&self, class: &str) -> Option<String> {
        (**self).super_class(class)
    }

    fn record(&mut self, class: &str, super_class: &str) {
        (**self).record(class, super_class)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::common_super_class;

    #[test]
    fn exceptions_meet_below_object() {
        let map = SuperClassMap::with_java_lang();
        assert_eq!(
            common_super_class(
                "java/lang/IllegalArgumentException",
                "java/lang/ArithmeticException",
                &map
            ),
            "java/lang/RuntimeException"
        );
        assert_eq!(
            common_super_class("java/io/IOException", "java/lang/AssertionError", &map),
            "java/lang/Throwable"
        );
        assert_eq!(
            common_super_class("java/lang/Integer", "java/lang/Double", &map),
            "java/lang/Number"
        );
    }

    #[test]
    fn class_files_are_added() {
        use crate::jvm::{ClassAccessFlags, ClassVisitor, ClassWriter, Version, WriterOptions};

        let mut writer = ClassWriter::new(WriterOptions::default());
        writer.visit(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "p/Sub",
            None,
            Some("p/Base"),
            &[],
        );
        writer.visit_end();
        let bytes = writer.to_bytes().unwrap();

        let mut map = SuperClassMap::new();
        assert_eq!(map.add_class_file(&bytes).unwrap(), "p/Sub");
        assert_eq!(map.super_class("p/Sub").as_deref(), Some("p/Base"));

        assert!(map.add_class_file(&[0xCA, 0xFE]).is_err());
        assert_eq!(map.len(), 1);
    }
}
