use crate::jvm::ClassHierarchy;
use std::collections::{HashMap, HashSet};

const OBJECT: &str = "java/lang/Object";

/// Entry of the [`TypeTable`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeEntry {
    /// Class or array type (internal name, or descriptor for arrays)
    Normal(String),

    /// Result of a `new` instruction at `offset`, before its constructor has run
    Uninitialized { name: String, offset: usize },
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        match self {
            TypeEntry::Normal(name) => name,
            TypeEntry::Uninitialized { name, .. } => name,
        }
    }
}

/// Side table of class types used by frame computation
///
/// Object types in frames are stored as small integers indexing into this table. It has its own
/// index space, separate from the constant pool, and is never serialized. Uninitialized types
/// are keyed by both name and `new` offset, since two allocation sites are two distinct types
/// to the verifier.
#[derive(Debug, Default)]
pub struct TypeTable {
    entries: Vec<TypeEntry>,
    lookup: HashMap<TypeEntry, u32>,

    /// Common superclass of two normal entries, keyed with the smaller index first
    merged: HashMap<(u32, u32), u32>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    fn add(&mut self, entry: TypeEntry) -> u32 {
        if let Some(index) = self.lookup.get(&entry) {
            return *index;
        }
        let index = self.entries.len() as u32;
        self.entries.push(entry.clone());
        self.lookup.insert(entry, index);
        index
    }

    pub fn add_normal_type(&mut self, name: &str) -> u32 {
        self.add(TypeEntry::Normal(name.to_owned()))
    }

    pub fn add_uninitialized_type(&mut self, name: &str, offset: usize) -> u32 {
        self.add(TypeEntry::Uninitialized {
            name: name.to_owned(),
            offset,
        })
    }

    pub fn get(&self, index: u32) -> Option<&TypeEntry> {
        self.entries.get(index as usize)
    }

    /// Class name of an entry (normal or uninitialized)
    pub fn name(&self, index: u32) -> &str {
        self.entries
            .get(index as usize)
            .map_or(OBJECT, TypeEntry::name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for the nearest common superclass of two normal entries
    pub fn merged_type(&mut self, type1: u32, type2: u32, hierarchy: &dyn ClassHierarchy) -> u32 {
        let key = (type1.min(type2), type1.max(type2));
        if let Some(merged) = self.merged.get(&key) {
            return *merged;
        }
        let common = common_super_class(self.name(key.0), self.name(key.1), hierarchy);
        let merged = self.add_normal_type(&common);
        self.merged.insert(key, merged);
        merged
    }
}

/// Walk the superclass chain of `class2` looking for a class on the chain of `class1`
///
/// Classes missing from the hierarchy (including interfaces, which have no superclass chain worth
/// following) end up at `java/lang/Object`.
pub fn common_super_class(class1: &str, class2: &str, hierarchy: &dyn ClassHierarchy) -> String {
    if class1 == class2 {
        return class1.to_owned();
    }

    let mut ancestors: HashSet<String> = HashSet::new();
    let mut current = Some(class1.to_owned());
    while let Some(class) = current {
        if !ancestors.insert(class.clone()) {
            break;
        }
        current = hierarchy.super_class(&class);
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut current = Some(class2.to_owned());
    while let Some(class) = current {
        if ancestors.contains(&class) {
            return class;
        }
        if !visited.insert(class.clone()) {
            break;
        }
        current = hierarchy.super_class(&class);
    }
    String::from(OBJECT)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::SuperClassMap;

    fn hierarchy() -> SuperClassMap {
        let mut map = SuperClassMap::new();
        map.insert("java/lang/Integer", "java/lang/Number");
        map.insert("java/lang/Long", "java/lang/Number");
        map.insert("java/lang/Number", "java/lang/Object");
        map.insert("a/Cycle", "a/Cycle");
        map
    }

    #[test]
    fn uninitialized_types_are_per_offset() {
        let mut table = TypeTable::new();
        let a = table.add_uninitialized_type("a/B", 3);
        let b = table.add_uninitialized_type("a/B", 10);
        let c = table.add_normal_type("a/B");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.add_uninitialized_type("a/B", 3), a);
        assert_eq!(table.name(b), "a/B");
    }

    #[test]
    fn merged_types() {
        let hierarchy = hierarchy();
        let mut table = TypeTable::new();
        let int = table.add_normal_type("java/lang/Integer");
        let long = table.add_normal_type("java/lang/Long");
        let number = table.add_normal_type("java/lang/Number");

        assert_eq!(table.merged_type(int, long, &hierarchy), number);
        assert_eq!(table.merged_type(long, int, &hierarchy), number);
        assert_eq!(table.merged_type(int, number, &hierarchy), number);

        let unknown = table.add_normal_type("x/Unknown");
        let merged = table.merged_type(unknown, int, &hierarchy);
        assert_eq!(table.name(merged), "java/lang/Object");
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        assert_eq!(
            common_super_class("a/Cycle", "java/lang/Long", &hierarchy()),
            "java/lang/Object"
        );
    }
}
