//! Arrays

use super::cache::ContentCache;
use super::{Object, ObjectKind};
use super::schema::{SchemaWarning, WarningKind};

/// Expected shape of a typed array: homogeneous element kind and an
/// optional fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySchema {
    pub element: ObjectKind,
    pub length: Option<usize>,
}

impl ArraySchema {
    pub const fn of(element: ObjectKind) -> Self {
        Self { element, length: None }
    }

    pub const fn fixed(element: ObjectKind, length: usize) -> Self {
        Self {
            element,
            length: Some(length),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Array {
    items: Vec<Object>,
    cache: ContentCache,
    indirect: bool,
    schema: Option<ArraySchema>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn typed(schema: ArraySchema) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn from_vec(items: Vec<Object>) -> Self {
        let mut cache = ContentCache::new();
        for item in &items {
            cache.absorb_object(item);
        }
        Self {
            items,
            cache,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Object> {
        self.items.get(index)
    }

    pub fn push(&mut self, value: impl Into<Object>) {
        let value = value.into();
        self.cache.absorb_object(&value);
        self.items.push(value);
    }

    pub fn pop(&mut self) -> Option<Object> {
        let value = self.items.pop()?;
        self.cache.release_object(&value);
        Some(value)
    }

    /// Insert at `index`, clamped to the end of the array.
    pub fn insert(&mut self, index: usize, value: impl Into<Object>) {
        let value = value.into();
        self.cache.absorb_object(&value);
        let index = index.min(self.items.len());
        self.items.insert(index, value);
    }

    pub fn remove(&mut self, index: usize) -> Option<Object> {
        if index >= self.items.len() {
            return None;
        }
        let value = self.items.remove(index);
        self.cache.release_object(&value);
        Some(value)
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&mut self, index: usize, value: impl Into<Object>) -> Option<Object> {
        let slot = self.items.get_mut(index)?;
        let value = value.into();
        self.cache.absorb_object(&value);
        let old = std::mem::replace(slot, value);
        self.cache.release_object(&old);
        Some(old)
    }

    pub fn update<R>(&mut self, index: usize, f: impl FnOnce(&mut Object) -> R) -> Option<R> {
        let value = self.items.get_mut(index)?;
        self.cache.release_object(value);
        let result = f(value);
        self.cache.absorb_object(value);
        Some(result)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Object> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Object] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Object> {
        self.items
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

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

    pub fn schema(&self) -> Option<ArraySchema> {
        self.schema
    }

    pub fn set_schema(&mut self, schema: Option<ArraySchema>) {
        self.schema = schema;
    }

    /// Integers of an all-integer array, `None` if any element is not one.
    pub fn to_ints(&self) -> Option<Vec<i64>> {
        self.items.iter().map(Object::as_int).collect()
    }

    /// Check elements against the array's own schema, if it has one.
    pub fn validate(&self, path: &str) -> Vec<SchemaWarning> {
        match self.schema {
            Some(schema) => self.validate_against(schema, path),
            None => Vec::new(),
        }
    }

    pub fn validate_against(&self, schema: ArraySchema, path: &str) -> Vec<SchemaWarning> {
        let mut warnings = Vec::new();
        if let Some(expected) = schema.length {
            if expected != self.items.len() {
                warnings.push(SchemaWarning::new(
                    path,
                    WarningKind::Length {
                        expected,
                        found: self.items.len(),
                    },
                ));
            }
        }
        for (i, item) in self.items.iter().enumerate() {
            if !schema.element.accepts(item) {
                warnings.push(SchemaWarning::new(
                    format!("{path}[{i}]"),
                    WarningKind::WrongType {
                        expected: schema.element,
                        found: item.kind(),
                    },
                ));
            }
        }
        warnings
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl From<Vec<Object>> for Array {
    fn from(items: Vec<Object>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Into<Object>> FromIterator<T> for Array {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Object;
    type IntoIter = std::slice::Iter<'a, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
