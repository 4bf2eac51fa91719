//! Build pipeline: turn the edited graph back into bytes
//!
//! Each revision goes through three passes. Flatten hoists direct values
//! the editor marked indirect (and direct streams) into the body under
//! fresh numbers. Finalize runs the build hooks. Emit writes the objects
//! in ascending order, the revision's container stream last, then the
//! cross-reference section in the requested style.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use tracing::{debug, info};

use super::{BuildHook, EncodeStreams};
use crate::config::{SaveOptions, XrefStyle};
use crate::error::{Error, Result};
use crate::pdf::crypt::{self, Direction};
use crate::pdf::document::{Document, is_index_structure};
use crate::pdf::object::schema::Version;
use crate::pdf::object::{Dictionary, ObjRef, Object};
use crate::pdf::objstm::ObjectStreamBuilder;
use crate::pdf::revision::{IndirectObject, Trailer};
use crate::pdf::writer::serialize;
use crate::pdf::xref::{
    CrossRefIndex, FREE_HEAD_GENERATION, XrefEntry, XrefStream, XrefTable, next_generation, stream,
    table,
};

/// Binary comment after the header so transfer tools treat the file as binary.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Streams-based sections need at least this version.
const STREAM_VERSION: Version = Version::new(1, 5);

/// A section written for revision `revision`, kept so the document can
/// index the bytes it was just saved to.
struct Section {
    revision: usize,
    offset: u64,
    index: CrossRefIndex,
}

/// Serialize `doc`. Afterwards the document reads from the new bytes and
/// further edits go to a fresh revision.
pub fn build(doc: &mut Document, options: &SaveOptions) -> Result<Vec<u8>> {
    let mut hooks = std::mem::take(&mut doc.hooks);
    let result = if can_append(doc, options) {
        append(doc, options, &mut hooks)
    } else {
        rewrite(doc, options, &mut hooks)
    };
    hooks.append(&mut doc.hooks);
    doc.hooks = hooks;

    let (out, sections) = result?;
    for section in sections {
        let revision = &mut doc.revisions[section.revision];
        revision.xref = Some(section.index);
        revision.xref_offset = Some(section.offset);
    }
    info!(len = out.len(), revisions = doc.revisions.len(), "document built");
    doc.rebase(out.clone());
    Ok(out)
}

fn can_append(doc: &Document, options: &SaveOptions) -> bool {
    if !options.incremental {
        return false;
    }
    let anchored = doc.source.is_some()
        && doc.parsed_revisions > 0
        && !doc.history_rewritten
        && doc.revisions[doc.parsed_revisions - 1].xref_offset.is_some();
    if !anchored {
        debug!("no usable loaded section to append to, rewriting the whole file");
    }
    anchored
}

/// Full save: header plus every revision.
fn rewrite(
    doc: &mut Document,
    options: &SaveOptions,
    hooks: &mut [Box<dyn BuildHook>],
) -> Result<(Vec<u8>, Vec<Section>)> {
    doc.load_all()?;
    if options.xref_style != XrefStyle::Table && doc.version < STREAM_VERSION {
        debug!(from = %doc.version, to = %STREAM_VERSION, "raising version for stream sections");
        doc.version = STREAM_VERSION;
    }

    let mut out = Vec::new();
    writeln!(out, "%PDF-{}.{}", doc.version.major, doc.version.minor)?;
    out.extend_from_slice(BINARY_MARKER);

    let mut emitter = Emitter::new(options, hooks, out);
    for r in 0..doc.revisions.len() {
        emitter.emit_revision(doc, r)?;
    }
    doc.header_offset = 0;
    Ok((emitter.out, emitter.sections))
}

/// Incremental save: the loaded bytes untouched, new revisions appended.
fn append(
    doc: &mut Document,
    options: &SaveOptions,
    hooks: &mut [Box<dyn BuildHook>],
) -> Result<(Vec<u8>, Vec<Section>)> {
    let mut out = doc.source.as_deref().unwrap_or_default().to_vec();
    let parsed = doc.parsed_revisions;
    if parsed == doc.revisions.len() {
        debug!("nothing to append");
        return Ok((out, Vec::new()));
    }
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let mut emitter = Emitter::new(options, hooks, out);
    emitter.prev = doc.revisions[parsed - 1].xref_offset;
    for revision in &doc.revisions[..parsed] {
        let numbers = revision.numbers();
        let declared_size = revision.trailer().size().unwrap_or(0);
        let seen = numbers.last().map_or(0, |max| max + 1);
        emitter.size = emitter.size.max(declared_size).max(seen);
        emitter.declared.extend(numbers);
    }
    for r in parsed..doc.revisions.len() {
        emitter.emit_revision(doc, r)?;
    }
    debug!(appended = doc.revisions.len() - parsed, "revisions appended");
    Ok((emitter.out, emitter.sections))
}

struct Emitter<'a> {
    options: &'a SaveOptions,
    hooks: &'a mut [Box<dyn BuildHook>],
    out: Vec<u8>,
    /// Numbers some section so far has an entry for.
    declared: BTreeSet<u64>,
    /// Cumulative `Size`.
    size: u64,
    prev: Option<u64>,
    sections: Vec<Section>,
}

impl<'a> Emitter<'a> {
    fn new(options: &'a SaveOptions, hooks: &'a mut [Box<dyn BuildHook>], out: Vec<u8>) -> Self {
        Self {
            options,
            hooks,
            out,
            declared: BTreeSet::new(),
            size: 1,
            prev: None,
            sections: Vec::new(),
        }
    }

    fn emit_revision(&mut self, doc: &mut Document, r: usize) -> Result<()> {
        let hoisted = flatten(doc, r);

        let mut ids = Vec::new();
        let mut skipped = Vec::new();
        for entry in doc.revisions[r].objects() {
            if is_index_structure(&entry.object) {
                skipped.push(entry.id);
            } else {
                ids.push(entry.id);
            }
        }
        check_unique(&ids)?;
        for id in &ids {
            self.finalize(doc, r, *id)?;
        }

        let style = self.options.xref_style;
        let pack = self.options.object_streams && style != XrefStyle::Table;
        let (packed, direct): (Vec<ObjRef>, Vec<ObjRef>) =
            ids.iter().partition(|id| pack && packable(doc, r, **id));

        let mut entries = BTreeMap::new();
        for id in direct {
            let object = &doc.revisions[r].get(id).ok_or(Error::Resolution(id))?.object;
            let offset = self.write_object(doc, id, object)?;
            entries.insert(id.num, XrefEntry::in_use(offset, id.generation));
        }
        if !packed.is_empty() {
            let mut builder = ObjectStreamBuilder::new();
            let mut slots = Vec::with_capacity(packed.len());
            for id in &packed {
                let object = &doc.revisions[r].get(*id).ok_or(Error::Resolution(*id))?.object;
                slots.push((id.num, builder.add(id.num, object)?));
            }
            let container = ObjRef::new(doc.allocate(), 0);
            let stream = Object::Stream(builder.build(doc.registry())?);
            let offset = self.write_object(doc, container, &stream)?;
            entries.insert(container.num, XrefEntry::in_use(offset, 0));
            for (num, index) in slots {
                entries.insert(num, XrefEntry::compressed(container.num, index as u32));
            }
            debug!(revision = r, %container, objects = packed.len(), "objects packed");
        }

        for (num, generation) in doc.revisions[r].freed() {
            entries.entry(num).or_insert(XrefEntry::free(0, generation));
        }
        for id in skipped {
            entries
                .entry(id.num)
                .or_insert(XrefEntry::free(0, next_generation(id.generation)));
        }

        let has_compressed = entries.values().any(XrefEntry::is_compressed);
        let index_stream = match style {
            XrefStyle::Table => None,
            XrefStyle::Hybrid if !has_compressed => None,
            XrefStyle::Stream | XrefStyle::Hybrid => Some(ObjRef::new(doc.allocate(), 0)),
        };

        self.declared.extend(entries.keys().copied());
        if let Some(id) = index_stream {
            self.declared.insert(id.num);
        }
        if let Some(max) = self.declared.last() {
            self.size = self.size.max(max + 1);
        }
        for num in 1..self.size {
            if !self.declared.contains(&num) {
                entries.insert(num, XrefEntry::free(0, 0));
            }
        }

        let trailer = section_trailer(doc.revisions[r].trailer(), self.size, self.prev);
        let (offset, index) = match (style, index_stream) {
            (XrefStyle::Stream, Some(id)) => self.write_stream_section(doc, id, entries, &trailer)?,
            (XrefStyle::Hybrid, Some(id)) => self.write_hybrid_section(doc, id, entries, trailer)?,
            _ => self.write_table_section(entries, &trailer)?,
        };
        write!(self.out, "startxref\n{offset}\n%%EOF\n")?;
        debug!(revision = r, offset, hoisted, kind = ?index.kind(), "section written");

        self.prev = Some(offset);
        self.sections.push(Section {
            revision: r,
            offset,
            index,
        });
        Ok(())
    }

    /// Run the built-in stream encoder and the user hooks on one object.
    fn finalize(&mut self, doc: &mut Document, r: usize, id: ObjRef) -> Result<()> {
        let Some(mut entry) = doc.revisions[r].remove(id) else {
            return Ok(());
        };
        let result = pre_build(self.hooks, doc, id, &mut entry.object);
        doc.revisions[r].insert(entry);
        result
    }

    /// Serialize `object` as `id` (encrypted when the document is) and
    /// hand the placed bytes to the hooks. Returns the object's offset.
    fn write_object(&mut self, doc: &Document, id: ObjRef, object: &Object) -> Result<u64> {
        let start = self.out.len();
        match doc.security.as_deref() {
            Some(handler) if Some(id) != doc.encrypt_ref => {
                let mut sealed = object.copy();
                crypt::apply(handler, id, &mut sealed, Direction::Encrypt)?;
                serialize::write_indirect(id, &sealed, &mut self.out)?;
            }
            _ => serialize::write_indirect(id, object, &mut self.out)?,
        }
        let end = self.out.len();
        for hook in self.hooks.iter_mut() {
            hook.post_build(id, start..end, &mut self.out[start..end])?;
        }
        Ok(start as u64)
    }

    fn write_table_section(
        &mut self,
        entries: BTreeMap<u64, XrefEntry>,
        trailer: &Dictionary,
    ) -> Result<(u64, CrossRefIndex)> {
        let table = XrefTable::from_entries(&link_free_list(entries));
        let offset = self.out.len() as u64;
        table::write(&table, &mut self.out)?;
        self.out.extend_from_slice(b"trailer\n");
        serialize::write_object(&Object::Dict(trailer.clone()), &mut self.out)?;
        self.out.push(b'\n');
        Ok((offset, CrossRefIndex::from_table(table)))
    }

    fn write_stream_section(
        &mut self,
        doc: &Document,
        id: ObjRef,
        mut entries: BTreeMap<u64, XrefEntry>,
        trailer: &Dictionary,
    ) -> Result<(u64, CrossRefIndex)> {
        let offset = self.out.len() as u64;
        entries.insert(id.num, XrefEntry::in_use(offset, 0));
        let table = XrefTable::from_entries(&link_free_list(entries));
        let xref = stream::build(&table, trailer, doc.registry())?;
        serialize::write_indirect(id, &Object::Stream(xref), &mut self.out)?;
        Ok((offset, CrossRefIndex::from_stream(XrefStream { id, offset, table })))
    }

    /// Companion stream for the compressed entries, then a table in which
    /// those numbers read as free.
    fn write_hybrid_section(
        &mut self,
        doc: &Document,
        id: ObjRef,
        entries: BTreeMap<u64, XrefEntry>,
        mut trailer: Dictionary,
    ) -> Result<(u64, CrossRefIndex)> {
        let (compressed, mut plain): (BTreeMap<u64, XrefEntry>, BTreeMap<u64, XrefEntry>) =
            entries.into_iter().partition(|(_, entry)| entry.is_compressed());
        let companion_offset = self.out.len() as u64;
        let companion = XrefTable::from_entries(&compressed);
        let dict = Dictionary::new().with("Size", self.size as i64);
        let xref = stream::build(&companion, &dict, doc.registry())?;
        serialize::write_indirect(id, &Object::Stream(xref), &mut self.out)?;

        plain.insert(id.num, XrefEntry::in_use(companion_offset, 0));
        for num in compressed.keys() {
            plain.insert(*num, XrefEntry::free(0, 0));
        }
        trailer.insert("XRefStm", companion_offset as i64);
        let (offset, index) = self.write_table_section(plain, &trailer)?;
        let index = CrossRefIndex {
            stream: Some(XrefStream {
                id,
                offset: companion_offset,
                table: companion,
            }),
            ..index
        };
        Ok((offset, index))
    }
}

fn pre_build(hooks: &mut [Box<dyn BuildHook>], doc: &Document, id: ObjRef, object: &mut Object) -> Result<()> {
    EncodeStreams::new(doc.registry()).pre_build(id, object)?;
    for hook in hooks.iter_mut() {
        hook.pre_build(id, object)?;
    }
    Ok(())
}

/// Two generations of one number cannot both be live in a section.
fn check_unique(ids: &[ObjRef]) -> Result<()> {
    for pair in ids.windows(2) {
        if pair[0].num == pair[1].num {
            return Err(Error::invariant(format!(
                "object {} is present as both {} and {}",
                pair[0].num, pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

fn packable(doc: &Document, r: usize, id: ObjRef) -> bool {
    id.generation == 0
        && Some(id) != doc.encrypt_ref
        && doc.revisions[r]
            .get(id)
            .is_some_and(|entry| !matches!(entry.object, Object::Stream(_)))
}

/// Chain the free entries in ascending order from the head at 0.
fn link_free_list(mut entries: BTreeMap<u64, XrefEntry>) -> BTreeMap<u64, XrefEntry> {
    let free: Vec<u64> = entries
        .iter()
        .filter(|(num, entry)| **num != 0 && entry.is_free())
        .map(|(num, _)| *num)
        .collect();
    let head_next = free.first().copied().unwrap_or(0);
    entries.insert(0, XrefEntry::free(head_next, FREE_HEAD_GENERATION));
    for (i, num) in free.iter().enumerate() {
        let next = free.get(i + 1).copied().unwrap_or(0);
        if let Some(entry) = entries.get_mut(num) {
            *entry = XrefEntry::free(next, entry.generation());
        }
    }
    entries
}

fn section_trailer(trailer: &Trailer, size: u64, prev: Option<u64>) -> Dictionary {
    let mut dict = trailer.dict().clone();
    for key in ["Prev", "XRefStm", "Size"] {
        dict.remove(key);
    }
    dict.insert("Size", size as i64);
    if let Some(prev) = prev {
        dict.insert("Prev", prev as i64);
    }
    dict
}

/// Hoist marked values into revision `r`. Returns how many objects were
/// added.
fn flatten(doc: &mut Document, r: usize) -> usize {
    let mut hoister = Hoister {
        next: doc.max_object_number() + 1,
        found: Vec::new(),
    };
    let ids: Vec<ObjRef> = doc.revisions[r].ids().collect();
    for id in ids {
        if let Some(entry) = doc.revisions[r].get_mut(id) {
            hoister.children_of(&mut entry.object);
        }
    }
    let mut added = 0;
    while let Some((id, mut object)) = hoister.found.pop() {
        hoister.children_of(&mut object);
        doc.revisions[r].insert(IndirectObject::new(id, object));
        added += 1;
    }
    doc.reserve(hoister.next);
    added
}

struct Hoister {
    next: u64,
    found: Vec<(ObjRef, Object)>,
}

impl Hoister {
    fn children_of(&mut self, value: &mut Object) {
        match value {
            Object::Array(array) => {
                for i in 0..array.len() {
                    array.update(i, |item| self.visit(item));
                }
            }
            Object::Dict(_) | Object::Stream(_) => {
                let Some(dict) = value.dict_mut() else {
                    return;
                };
                for key in dict.key_list() {
                    dict.update(key.as_str(), |item| self.visit(item));
                }
            }
            _ => {}
        }
    }

    fn visit(&mut self, item: &mut Object) {
        if item.is_marked_indirect() {
            let id = ObjRef::new(self.next, 0);
            self.next += 1;
            let mut child = std::mem::replace(item, Object::Ref(id));
            child.clear_indirect_mark();
            self.found.push((id, child));
        } else {
            self.children_of(item);
        }
    }
}
