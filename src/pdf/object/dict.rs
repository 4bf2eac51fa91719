//! Ordered dictionaries

use indexmap::IndexMap;

use super::cache::ContentCache;
use super::{Array, Name, ObjRef, Object, PdfString, Stream};

/// Ordered name → object map.
///
/// Insertion order is kept so serialization is deterministic. All writes
/// go through [`insert`](Self::insert), [`remove`](Self::remove) or
/// [`update`](Self::update) so the content cache stays in step.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<Name, Object>,
    cache: ContentCache,
    indirect: bool,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<Name>, value: impl Into<Object>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<Object>) -> Option<Object> {
        let value = value.into();
        self.cache.absorb_object(&value);
        let old = self.entries.insert(key.into(), value);
        if let Some(old) = &old {
            self.cache.release_object(old);
        }
        old
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        let old = self.entries.shift_remove(key)?;
        self.cache.release_object(&old);
        Some(old)
    }

    /// Mutate a value in place. The child's cache contribution is released
    /// before `f` runs and re-absorbed afterwards.
    pub fn update<R>(&mut self, key: &str, f: impl FnOnce(&mut Object) -> R) -> Option<R> {
        let value = self.entries.get_mut(key)?;
        self.cache.release_object(value);
        let result = f(value);
        self.cache.absorb_object(value);
        Some(result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Object)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Object> {
        self.entries.values()
    }

    pub fn key_list(&self) -> Vec<Name> {
        self.entries.keys().cloned().collect()
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Whether the writer should hoist this dictionary into its own
    /// indirect object when it is found nested inside another container.
    pub fn is_indirect(&self) -> bool {
        self.indirect
    }

    pub fn set_indirect(&mut self, indirect: bool) {
        self.indirect = indirect;
    }

    pub fn into_indirect(mut self) -> Self {
        self.indirect = true;
        self
    }

    // Typed getters

    pub fn get_name(&self, key: &str) -> Option<&Name> {
        self.get(key).and_then(Object::as_name)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_int)
    }

    pub fn get_ref(&self, key: &str) -> Option<ObjRef> {
        self.get(key).and_then(Object::as_ref)
    }

    pub fn get_array(&self, key: &str) -> Option<&Array> {
        self.get(key).and_then(Object::as_array)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Self> {
        self.get(key).and_then(Object::as_dict)
    }

    pub fn get_string(&self, key: &str) -> Option<&PdfString> {
        self.get(key).and_then(Object::as_string)
    }

    pub fn get_stream(&self, key: &str) -> Option<&Stream> {
        self.get(key).and_then(Object::as_stream)
    }

    /// `/Type` value, the usual structural fingerprint.
    pub fn type_name(&self) -> Option<&str> {
        self.get_name("Type").map(Name::as_str)
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.type_name() == Some(type_name)
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Into<Name>, V: Into<Object>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a Object);
    type IntoIter = indexmap::map::Iter<'a, Name, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_preserves_order() {
        let dict = Dictionary::new()
            .with("Type", Name::new("XRef"))
            .with("Size", 4)
            .with("Root", ObjRef::new(1, 0));
        let keys: Vec<&str> = dict.keys().map(Name::as_str).collect();
        assert_eq!(keys, vec!["Type", "Size", "Root"]);
    }

    #[test]
    fn test_dict_replace_updates_cache() {
        let mut dict = Dictionary::new();
        dict.insert("T", PdfString::from("old"));
        let old = dict.insert("T", PdfString::from("new"));
        assert_eq!(old, Some(Object::from(PdfString::from("old"))));
        assert!(!dict.cache().contains_string(b"old"));
        assert_eq!(dict.cache().string_count(b"new"), 1);
    }

    #[test]
    fn test_dict_remove_keeps_order() {
        let mut dict: Dictionary = [("A", 1), ("B", 2), ("C", 3)].into_iter().collect();
        assert_eq!(dict.remove("B"), Some(Object::Int(2)));
        assert!(dict.remove("B").is_none());
        let keys: Vec<&str> = dict.keys().map(Name::as_str).collect();
        assert_eq!(keys, vec!["A", "C"]);
    }

    #[test]
    fn test_dict_update_nested() {
        let mut dict = Dictionary::new().with("Kids", Array::new());
        dict.update("Kids", |kids| {
            if let Object::Array(a) = kids {
                a.push(ObjRef::new(3, 0));
            }
        });
        assert_eq!(dict.cache().reference_count(ObjRef::new(3, 0)), 1);
        assert!(dict.update("Missing", |_| ()).is_none());
    }

    #[test]
    fn test_dict_equality_ignores_order_and_marker() {
        let a = Dictionary::new().with("A", 1).with("B", 2);
        let b = Dictionary::new().with("B", 2).with("A", 1).into_indirect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dict_typed_getters() {
        let dict = Dictionary::new()
            .with("Type", Name::new("Catalog"))
            .with("Pages", ObjRef::new(2, 0));
        assert!(dict.is_type("Catalog"));
        assert_eq!(dict.get_ref("Pages"), Some(ObjRef::new(2, 0)));
        assert_eq!(dict.get_int("Pages"), None);
    }
}
