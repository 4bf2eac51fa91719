//! Content caches kept by compound objects
//!
//! Each [`Array`](super::Array) and [`Dictionary`](super::Dictionary) owns a
//! [`ContentCache`] summarizing every string, name and reference in its
//! subtree. Containers absorb a child's contribution when it is inserted
//! and release it when it is removed, so maintenance cost is proportional
//! to the size of the subtree being moved, never to the whole graph.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use super::{Name, ObjRef, Object, PdfString};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentCache {
    strings: HashMap<PdfString, usize>,
    names: HashMap<Name, usize>,
    refs: HashMap<ObjRef, usize>,
}

fn add<K: Hash + Eq + Clone>(map: &mut HashMap<K, usize>, key: &K, count: usize) {
    if count > 0 {
        *map.entry(key.clone()).or_insert(0) += count;
    }
}

fn sub<K: Hash + Eq + Clone>(map: &mut HashMap<K, usize>, key: &K, count: usize) {
    if let Entry::Occupied(mut slot) = map.entry(key.clone()) {
        if *slot.get() <= count {
            slot.remove();
        } else {
            *slot.get_mut() -= count;
        }
    }
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.names.is_empty() && self.refs.is_empty()
    }

    /// Merge another cache into this one. Merging an empty cache is a no-op.
    pub fn absorb(&mut self, other: &Self) {
        for (s, n) in &other.strings {
            add(&mut self.strings, s, *n);
        }
        for (name, n) in &other.names {
            add(&mut self.names, name, *n);
        }
        for (r, n) in &other.refs {
            add(&mut self.refs, r, *n);
        }
    }

    /// Inverse of [`absorb`](Self::absorb).
    pub fn release(&mut self, other: &Self) {
        for (s, n) in &other.strings {
            sub(&mut self.strings, s, *n);
        }
        for (name, n) in &other.names {
            sub(&mut self.names, name, *n);
        }
        for (r, n) in &other.refs {
            sub(&mut self.refs, r, *n);
        }
    }

    /// Account for `obj` becoming a direct child of the owning container.
    pub fn absorb_object(&mut self, obj: &Object) {
        match obj {
            Object::String(s) => add(&mut self.strings, s, 1),
            Object::Name(n) => add(&mut self.names, n, 1),
            Object::Ref(r) => add(&mut self.refs, r, 1),
            Object::Array(a) => self.absorb(a.cache()),
            Object::Dict(d) => self.absorb(d.cache()),
            Object::Stream(s) => self.absorb(s.dict().cache()),
            _ => {}
        }
    }

    /// Account for `obj` leaving the owning container.
    pub fn release_object(&mut self, obj: &Object) {
        match obj {
            Object::String(s) => sub(&mut self.strings, s, 1),
            Object::Name(n) => sub(&mut self.names, n, 1),
            Object::Ref(r) => sub(&mut self.refs, r, 1),
            Object::Array(a) => self.release(a.cache()),
            Object::Dict(d) => self.release(d.cache()),
            Object::Stream(s) => self.release(s.dict().cache()),
            _ => {}
        }
    }

    pub fn string_count(&self, s: &[u8]) -> usize {
        self.strings.get(&PdfString::from(s)).copied().unwrap_or(0)
    }

    pub fn name_count(&self, name: &str) -> usize {
        self.names.get(name).copied().unwrap_or(0)
    }

    pub fn reference_count(&self, target: ObjRef) -> usize {
        self.refs.get(&target).copied().unwrap_or(0)
    }

    pub fn contains_string(&self, s: &[u8]) -> bool {
        self.string_count(s) > 0
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn references(&self, target: ObjRef) -> bool {
        self.refs.contains_key(&target)
    }

    pub fn strings(&self) -> impl Iterator<Item = &PdfString> {
        self.strings.keys()
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.names.keys()
    }

    pub fn targets(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.refs.keys().copied()
    }
}
