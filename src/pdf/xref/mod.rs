//! Cross-reference indexes
//!
//! A revision is indexed by a classic table, a compressed stream, or both
//! (hybrid). All three decode into the same [`XrefTable`] representation;
//! [`CrossRefIndex`] combines them with the hybrid precedence rules.

pub mod stream;
pub mod table;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::pdf::object::ObjRef;

/// Generation written for the head of the free list.
pub const FREE_HEAD_GENERATION: u32 = 65535;

/// Generation a freed number gets for its next use. 65535 is the ceiling:
/// a number that reaches it is never reused.
pub fn next_generation(generation: u32) -> u32 {
    generation.saturating_add(1).min(FREE_HEAD_GENERATION)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrefEntry {
    /// Unused number; `next` links the free list, `generation` is the one
    /// to use if the number is revived.
    Free { next: u64, generation: u32 },
    /// Stored at a byte offset in the file.
    InUse { offset: u64, generation: u32 },
    /// Stored inside container stream `stream` at position `index`.
    Compressed { stream: u64, index: u32 },
}

impl XrefEntry {
    pub const fn free(next: u64, generation: u32) -> Self {
        Self::Free { next, generation }
    }

    pub const fn in_use(offset: u64, generation: u32) -> Self {
        Self::InUse { offset, generation }
    }

    pub const fn compressed(stream: u64, index: u32) -> Self {
        Self::Compressed { stream, index }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, Self::InUse { .. })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed { .. })
    }

    /// Generation of the object this entry describes. Objects inside
    /// container streams always have generation 0.
    pub fn generation(&self) -> u32 {
        match self {
            Self::Free { generation, .. } | Self::InUse { generation, .. } => *generation,
            Self::Compressed { .. } => 0,
        }
    }

    /// Does this entry describe the live object `id`?
    pub fn describes(&self, id: ObjRef) -> bool {
        !self.is_free() && self.generation() == id.generation
    }

    /// `(type, field1, field2)` as laid out in a cross-reference stream.
    pub fn fields(&self) -> (u8, u64, u64) {
        match *self {
            Self::Free { next, generation } => (0, next, u64::from(generation)),
            Self::InUse { offset, generation } => (1, offset, u64::from(generation)),
            Self::Compressed { stream, index } => (2, stream, u64::from(index)),
        }
    }

    /// Inverse of [`fields`](Self::fields); `None` for unknown types.
    pub fn from_fields(kind: u64, field1: u64, field2: u64) -> Option<Self> {
        let narrow = u32::try_from(field2).ok()?;
        match kind {
            0 => Some(Self::free(field1, narrow)),
            1 => Some(Self::in_use(field1, narrow)),
            2 => Some(Self::compressed(field1, narrow)),
            _ => None,
        }
    }
}

/// A run of consecutive object numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefSubsection {
    pub start: u64,
    pub entries: Vec<XrefEntry>,
}

impl XrefSubsection {
    pub fn new(start: u64, count: usize) -> Self {
        Self {
            start,
            entries: Vec::with_capacity(count),
        }
    }

    pub fn add(&mut self, entry: XrefEntry) {
        self.entries.push(entry);
    }

    pub fn get_by_num(&self, num: u64) -> Option<&XrefEntry> {
        let index = usize::try_from(num.checked_sub(self.start)?).ok()?;
        self.entries.get(index)
    }

    /// Half-open range of numbers covered.
    pub fn range(&self) -> (u64, u64) {
        (self.start, self.start + self.entries.len() as u64)
    }
}

/// Decoded entries of one table or stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XrefTable {
    subsections: Vec<XrefSubsection>,
    lookup: HashMap<u64, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group sorted entries into maximal runs of consecutive numbers.
    pub fn from_entries(entries: &BTreeMap<u64, XrefEntry>) -> Self {
        let mut table = Self::new();
        let mut current: Option<XrefSubsection> = None;
        for (&num, &entry) in entries {
            match current.as_mut() {
                Some(sub) if sub.range().1 == num => sub.add(entry),
                _ => {
                    if let Some(done) = current.take() {
                        table.add_subsection(done);
                    }
                    let mut sub = XrefSubsection::new(num, 1);
                    sub.add(entry);
                    current = Some(sub);
                }
            }
        }
        if let Some(done) = current {
            table.add_subsection(done);
        }
        table
    }

    /// Later subsections win when numbers overlap.
    pub fn add_subsection(&mut self, subsection: XrefSubsection) {
        for (i, entry) in subsection.entries.iter().enumerate() {
            self.lookup.insert(subsection.start + i as u64, *entry);
        }
        self.subsections.push(subsection);
    }

    pub fn subsections(&self) -> &[XrefSubsection] {
        &self.subsections
    }

    pub fn get(&self, num: u64) -> Option<XrefEntry> {
        self.lookup.get(&num).copied()
    }

    pub fn contains(&self, num: u64) -> bool {
        self.lookup.contains_key(&num)
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn max_num(&self) -> Option<u64> {
        self.lookup.keys().max().copied()
    }

    /// Entries ordered by object number.
    pub fn entries(&self) -> BTreeMap<u64, XrefEntry> {
        self.lookup.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Numbers of the free list, in chain order, starting after the head.
    ///
    /// Fails if the chain revisits a number or points at an entry that is
    /// not free.
    pub fn free_chain(&self) -> Result<Vec<u64>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = match self.get(0) {
            Some(XrefEntry::Free { next, .. }) => next,
            Some(_) => return Err(Error::index("entry 0 is not free")),
            None => return Ok(chain),
        };
        while next != 0 {
            if !seen.insert(next) {
                return Err(Error::index(format!("free list revisits object {next}")));
            }
            match self.get(next) {
                Some(XrefEntry::Free { next: after, .. }) => {
                    chain.push(next);
                    next = after;
                }
                _ => return Err(Error::index(format!("free list points at live object {next}"))),
            }
        }
        Ok(chain)
    }
}

/// Decoded cross-reference stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefStream {
    /// Identity of the stream object itself.
    pub id: ObjRef,
    pub offset: u64,
    pub table: XrefTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    Table,
    Stream,
    Hybrid,
    /// Index rebuilt by scanning the file.
    Reconstructed,
}

/// Per-revision index: a table, a stream, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRefIndex {
    pub table: Option<XrefTable>,
    pub stream: Option<XrefStream>,
    pub reconstructed: bool,
}

impl CrossRefIndex {
    pub fn from_table(table: XrefTable) -> Self {
        Self {
            table: Some(table),
            stream: None,
            reconstructed: false,
        }
    }

    pub fn from_stream(stream: XrefStream) -> Self {
        Self {
            table: None,
            stream: Some(stream),
            reconstructed: false,
        }
    }

    pub fn reconstructed(table: XrefTable) -> Self {
        Self {
            table: Some(table),
            stream: None,
            reconstructed: true,
        }
    }

    pub fn kind(&self) -> XrefKind {
        match (&self.table, &self.stream) {
            _ if self.reconstructed => XrefKind::Reconstructed,
            (Some(_), Some(_)) => XrefKind::Hybrid,
            (None, Some(_)) => XrefKind::Stream,
            _ => XrefKind::Table,
        }
    }

    /// Combined lookup. In a hybrid index the stream augments the table:
    /// a live table entry wins, then any stream entry, then a free table
    /// entry.
    pub fn lookup(&self, num: u64) -> Option<XrefEntry> {
        let from_table = self.table.as_ref().and_then(|t| t.get(num));
        if let Some(entry @ XrefEntry::InUse { .. }) = from_table {
            return Some(entry);
        }
        self.stream
            .as_ref()
            .and_then(|s| s.table.get(num))
            .or(from_table)
    }

    pub fn declares(&self, num: u64) -> bool {
        self.lookup(num).is_some()
    }

    pub fn numbers(&self) -> BTreeSet<u64> {
        let mut out = BTreeSet::new();
        if let Some(t) = &self.table {
            out.extend(t.lookup.keys().copied());
        }
        if let Some(s) = &self.stream {
            out.extend(s.table.lookup.keys().copied());
        }
        out
    }

    pub fn max_num(&self) -> Option<u64> {
        self.numbers().last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(u64, XrefEntry)]) -> XrefTable {
        XrefTable::from_entries(&entries.iter().copied().collect())
    }

    #[test]
    fn test_entry_fields_roundtrip() {
        for entry in [
            XrefEntry::free(3, 1),
            XrefEntry::in_use(1234, 0),
            XrefEntry::compressed(9, 4),
        ] {
            let (t, a, b) = entry.fields();
            assert_eq!(XrefEntry::from_fields(u64::from(t), a, b), Some(entry));
        }
        assert_eq!(XrefEntry::from_fields(7, 0, 0), None);
    }

    #[test]
    fn test_from_entries_groups_runs() {
        let t = table(&[
            (0, XrefEntry::free(0, 65535)),
            (1, XrefEntry::in_use(15, 0)),
            (5, XrefEntry::in_use(99, 0)),
        ]);
        let ranges: Vec<_> = t.subsections().iter().map(XrefSubsection::range).collect();
        assert_eq!(ranges, vec![(0, 2), (5, 6)]);
        assert_eq!(t.get(5), Some(XrefEntry::in_use(99, 0)));
        assert_eq!(t.get(3), None);
        assert_eq!(t.max_num(), Some(5));
    }

    #[test]
    fn test_subsection_get_by_num() {
        let mut sub = XrefSubsection::new(10, 2);
        sub.add(XrefEntry::in_use(1, 0));
        assert!(sub.get_by_num(9).is_none());
        assert!(sub.get_by_num(10).is_some());
        assert!(sub.get_by_num(11).is_none());
    }

    #[test]
    fn test_free_chain() {
        let t = table(&[
            (0, XrefEntry::free(2, 65535)),
            (1, XrefEntry::in_use(9, 0)),
            (2, XrefEntry::free(3, 1)),
            (3, XrefEntry::free(0, 1)),
        ]);
        assert_eq!(t.free_chain().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_free_chain_cycle_is_error() {
        let t = table(&[(0, XrefEntry::free(1, 65535)), (1, XrefEntry::free(1, 0))]);
        assert!(t.free_chain().is_err());
        let t = table(&[(0, XrefEntry::free(1, 65535)), (1, XrefEntry::in_use(5, 0))]);
        assert!(t.free_chain().is_err());
    }

    #[test]
    fn test_hybrid_lookup_precedence() {
        let t = table(&[(1, XrefEntry::in_use(100, 0)), (2, XrefEntry::free(0, 0))]);
        let s = table(&[(1, XrefEntry::compressed(7, 0)), (2, XrefEntry::compressed(7, 1))]);
        let index = CrossRefIndex {
            table: Some(t),
            stream: Some(XrefStream {
                id: ObjRef::new(8, 0),
                offset: 0,
                table: s,
            }),
            reconstructed: false,
        };
        assert_eq!(index.kind(), XrefKind::Hybrid);
        assert_eq!(index.lookup(1), Some(XrefEntry::in_use(100, 0)));
        assert_eq!(index.lookup(2), Some(XrefEntry::compressed(7, 1)));
        assert_eq!(index.lookup(3), None);
        assert_eq!(index.numbers().len(), 2);
    }

    #[test]
    fn test_entry_describes() {
        assert!(XrefEntry::in_use(10, 2).describes(ObjRef::new(4, 2)));
        assert!(!XrefEntry::in_use(10, 2).describes(ObjRef::new(4, 0)));
        assert!(XrefEntry::compressed(3, 0).describes(ObjRef::new(4, 0)));
        assert!(!XrefEntry::free(0, 0).describes(ObjRef::new(4, 0)));
    }
}
