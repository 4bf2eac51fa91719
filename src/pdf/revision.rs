//! Revisions: one body, index and trailer per incremental update

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Diagnostic, Error, Result};
use crate::pdf::object::{Array, Dictionary, Name, ObjRef, Object};
use crate::pdf::xref::{CrossRefIndex, XrefEntry, XrefStream, XrefTable};

/// Where an indirect object came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Created or copied in memory.
    New,
    /// Read from this byte offset.
    Offset(u64),
    /// Read from a container stream.
    Container { stream: u64, index: u32 },
}

/// An object owned by a revision body.
#[derive(Debug, Clone)]
pub struct IndirectObject {
    pub id: ObjRef,
    pub object: Object,
    pub location: Location,
    /// Damage noticed while reading; see [`check`](Self::check).
    pub diagnostic: Option<Diagnostic>,
}

impl IndirectObject {
    pub fn new(id: ObjRef, object: Object) -> Self {
        Self {
            id,
            object,
            location: Location::New,
            diagnostic: None,
        }
    }

    pub fn loaded(id: ObjRef, object: Object, location: Location, diagnostic: Option<Diagnostic>) -> Self {
        Self {
            id,
            object,
            location,
            diagnostic,
        }
    }

    /// The object, or the damage recorded when it was read.
    pub fn check(&self) -> Result<&Object> {
        match &self.diagnostic {
            Some(d) => Err(Error::structural(d.offset.unwrap_or(0), d.message.clone())),
            None => Ok(&self.object),
        }
    }
}

/// Typed view over a trailer dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer(Dictionary);

impl Trailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dict(dict: Dictionary) -> Self {
        Self(dict)
    }

    pub fn dict(&self) -> &Dictionary {
        &self.0
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.0
    }

    pub fn into_dict(self) -> Dictionary {
        self.0
    }

    pub fn size(&self) -> Option<u64> {
        self.0.get_int("Size").and_then(|s| u64::try_from(s).ok())
    }

    pub fn set_size(&mut self, size: u64) {
        self.0.insert("Size", size as i64);
    }

    pub fn root(&self) -> Option<ObjRef> {
        self.0.get_ref("Root")
    }

    pub fn set_root(&mut self, root: ObjRef) {
        self.0.insert("Root", root);
    }

    /// Offset of the previous section; `0` means there is none.
    pub fn prev(&self) -> Option<u64> {
        self.0.get_int("Prev").and_then(|p| u64::try_from(p).ok()).filter(|&p| p != 0)
    }

    pub fn encrypt(&self) -> Option<ObjRef> {
        self.0.get_ref("Encrypt")
    }

    pub fn info(&self) -> Option<ObjRef> {
        self.0.get_ref("Info")
    }

    pub fn id(&self) -> Option<&Array> {
        self.0.get_array("ID")
    }

    /// First half of the document identifier.
    pub fn id_first(&self) -> Option<&[u8]> {
        self.id()?.get(0)?.as_string().map(|s| s.as_bytes())
    }

    pub fn xref_stm(&self) -> Option<u64> {
        self.0.get_int("XRefStm").and_then(|p| u64::try_from(p).ok())
    }

    /// Entries that describe the document rather than one section, used
    /// to seed the trailer of a new revision.
    pub fn carried_over(&self) -> Self {
        let mut next = Dictionary::new();
        for key in ["Root", "Info", "ID", "Encrypt"] {
            if let Some(value) = self.0.get(key) {
                next.insert(Name::new(key), value.clone());
            }
        }
        Self(next)
    }
}

/// One incremental update.
#[derive(Debug, Clone, Default)]
pub struct Revision {
    pub(crate) body: BTreeMap<ObjRef, IndirectObject>,
    pub(crate) xref: Option<CrossRefIndex>,
    pub(crate) trailer: Trailer,
    /// Numbers freed here, mapped to the generation a revived object gets.
    pub(crate) freed: BTreeMap<u64, u32>,
    /// Offset of this revision's cross-reference section in the source.
    pub(crate) xref_offset: Option<u64>,
}

/// What a revision says about an object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Body(ObjRef),
    Freed(u32),
    Entry(XrefEntry),
}

impl Revision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailer(trailer: Trailer) -> Self {
        Self {
            trailer,
            ..Self::default()
        }
    }

    /// Revision read from a cross-reference section. Free entries other
    /// than the list head become freed numbers.
    pub fn from_index(xref: CrossRefIndex, trailer: Trailer, offset: Option<u64>) -> Self {
        let mut freed = BTreeMap::new();
        for num in xref.numbers() {
            if let Some(XrefEntry::Free { generation, .. }) = xref.lookup(num) {
                if num != 0 {
                    freed.insert(num, generation);
                }
            }
        }
        Self {
            body: BTreeMap::new(),
            xref: Some(xref),
            trailer,
            freed,
            xref_offset: offset,
        }
    }

    /// Attach a classic table read for this revision.
    pub(crate) fn attach_table(&mut self, table: XrefTable) {
        match &mut self.xref {
            Some(xref) => xref.table = Some(table),
            None => self.xref = Some(CrossRefIndex::from_table(table)),
        }
        self.refresh_freed();
    }

    /// Attach a cross-reference stream read for this revision. Alongside
    /// a table it becomes the hybrid companion.
    pub(crate) fn attach_stream(&mut self, stream: XrefStream) {
        match &mut self.xref {
            Some(xref) => xref.stream = Some(stream),
            None => self.xref = Some(CrossRefIndex::from_stream(stream)),
        }
        self.refresh_freed();
    }

    /// Derive freed numbers from the combined index. A number a hybrid
    /// table lists as free but its stream places in a container is live.
    fn refresh_freed(&mut self) {
        let Some(xref) = &self.xref else {
            return;
        };
        for num in xref.numbers() {
            match xref.lookup(num) {
                Some(XrefEntry::Free { generation, .. }) if num != 0 => {
                    if self.body_generations(num).next().is_none() {
                        self.freed.insert(num, generation);
                    }
                }
                _ => {
                    self.freed.remove(&num);
                }
            }
        }
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Trailer {
        &mut self.trailer
    }

    pub fn xref(&self) -> Option<&CrossRefIndex> {
        self.xref.as_ref()
    }

    pub fn xref_offset(&self) -> Option<u64> {
        self.xref_offset
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.freed.is_empty()
    }

    pub fn get(&self, id: ObjRef) -> Option<&IndirectObject> {
        self.body.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjRef) -> Option<&mut IndirectObject> {
        self.body.get_mut(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &IndirectObject> {
        self.body.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.body.keys().copied()
    }

    /// Add an object, reviving its number if it was freed here.
    pub fn insert(&mut self, entry: IndirectObject) -> Option<IndirectObject> {
        self.freed.remove(&entry.id.num);
        self.body.insert(entry.id, entry)
    }

    pub fn remove(&mut self, id: ObjRef) -> Option<IndirectObject> {
        self.body.remove(&id)
    }

    /// Free `num`; a later object with this number gets `next_generation`.
    pub fn free(&mut self, num: u64, next_generation: u32) {
        let stale: Vec<ObjRef> = self.body_generations(num).collect();
        for id in stale {
            self.body.remove(&id);
        }
        self.freed.insert(num, next_generation);
    }

    pub fn freed(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.freed.iter().map(|(n, g)| (*n, *g))
    }

    fn body_generations(&self, num: u64) -> impl Iterator<Item = ObjRef> + '_ {
        self.body
            .range(ObjRef::new(num, 0)..=ObjRef::new(num, u32::MAX))
            .map(|(id, _)| *id)
    }

    /// What this revision declares about `num`, if anything. The body is
    /// consulted before the index; the highest generation wins.
    pub fn slot(&self, num: u64) -> Option<Slot> {
        if let Some(id) = self.body_generations(num).last() {
            return Some(Slot::Body(id));
        }
        if let Some(generation) = self.freed.get(&num) {
            return Some(Slot::Freed(*generation));
        }
        self.xref.as_ref()?.lookup(num).map(Slot::Entry)
    }

    /// Every number this revision says something about.
    pub fn numbers(&self) -> BTreeSet<u64> {
        let mut out: BTreeSet<u64> = self.body.keys().map(|id| id.num).collect();
        out.extend(self.freed.keys().copied());
        if let Some(xref) = &self.xref {
            out.extend(xref.numbers());
        }
        out.remove(&0);
        out
    }

    pub fn max_num(&self) -> Option<u64> {
        self.numbers().last().copied()
    }
}
