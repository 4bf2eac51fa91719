//! Index reconstruction by linear scan
//!
//! Used when the cross-reference chain cannot be read, and on demand when
//! a recorded offset does not hold the object it should.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{ObjectParser, rfind};
use crate::error::{Diagnostic, Error, Result};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::lexer::{is_regular, is_whitespace};
use crate::pdf::object::{Dictionary, ObjRef, Object};
use crate::pdf::objstm::ObjectStreamIndex;
use crate::pdf::xref::{FREE_HEAD_GENERATION, XrefEntry, XrefTable};

/// Result of a reconstruction scan.
#[derive(Debug)]
pub struct Reconstructed {
    pub table: XrefTable,
    pub trailer: Dictionary,
    pub diagnostics: Vec<Diagnostic>,
}

/// If an `n g obj` marker starts at `pos`, return its identity and the
/// position just past `obj`.
pub fn object_marker_at(data: &[u8], pos: usize) -> Option<(ObjRef, usize)> {
    if pos > 0 && is_regular(data[pos - 1]) {
        return None;
    }
    let (num, mut at) = digits(data, pos)?;
    let gap = skip_spaces(data, at);
    if gap == at {
        return None;
    }
    let (generation, end) = digits(data, gap)?;
    at = skip_spaces(data, end);
    if at == end || !data[at..].starts_with(b"obj") {
        return None;
    }
    at += 3;
    if data.get(at).copied().is_some_and(is_regular) {
        return None;
    }
    Some((ObjRef::new(num, u32::try_from(generation).ok()?), at))
}

fn digits(data: &[u8], pos: usize) -> Option<(u64, usize)> {
    let len = data[pos.min(data.len())..].iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 || len > 19 {
        return None;
    }
    let text = std::str::from_utf8(&data[pos..pos + len]).ok()?;
    Some((text.parse().ok()?, pos + len))
}

fn skip_spaces(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos).copied().is_some_and(is_whitespace) {
        pos += 1;
    }
    pos
}

/// Every `n g obj` marker in `data`, last definition of a number winning.
pub fn scan_markers(data: &[u8]) -> BTreeMap<u64, (u32, u64)> {
    let mut found = BTreeMap::new();
    let mut pos = 0;
    while pos < data.len() {
        if data[pos].is_ascii_digit() {
            if let Some((id, end)) = object_marker_at(data, pos) {
                found.insert(id.num, (id.generation, pos as u64));
                pos = end;
                continue;
            }
            // skip the rest of this digit run
            while pos < data.len() && data[pos].is_ascii_digit() {
                pos += 1;
            }
            continue;
        }
        pos += 1;
    }
    found
}

/// Start of the next object marker or section keyword after `from`, or
/// the end of `data`.
pub fn next_marker(data: &[u8], from: usize) -> usize {
    let mut pos = from;
    while pos < data.len() {
        let at = &data[pos..];
        let boundary = pos == 0 || !is_regular(data[pos - 1]);
        if boundary
            && (at.starts_with(b"xref")
                || at.starts_with(b"trailer")
                || at.starts_with(b"startxref")
                || at.starts_with(b"%%EOF")
                || (at[0].is_ascii_digit() && object_marker_at(data, pos).is_some()))
        {
            return pos;
        }
        pos += 1;
    }
    data.len()
}

/// Rebuild a single index for the whole file.
pub fn reconstruct(data: &[u8], registry: &FilterRegistry, max_depth: usize) -> Result<Reconstructed> {
    let markers = scan_markers(data);
    if markers.is_empty() {
        return Err(Error::structural(0, "no objects found while rebuilding the index"));
    }
    warn!(objects = markers.len(), "rebuilding cross-reference index by scanning");
    let mut diagnostics = vec![Diagnostic::new(format!(
        "cross-reference index rebuilt from {} object markers",
        markers.len()
    ))];

    let mut entries: BTreeMap<u64, XrefEntry> = markers
        .iter()
        .map(|(&num, &(generation, offset))| (num, XrefEntry::in_use(offset, generation)))
        .collect();

    let mut catalog = None;
    let mut xref_trailer = None;
    for (&num, &(generation, offset)) in &markers {
        let mut parser = ObjectParser::at(data, offset as usize).with_max_depth(max_depth);
        let Ok(parsed) = parser.parse_indirect() else {
            debug!(num, offset, "unreadable object during reconstruction");
            continue;
        };
        let Some(dict) = parsed.object.dict() else {
            continue;
        };
        match dict.type_name() {
            Some("Catalog") => catalog = Some(ObjRef::new(num, generation)),
            Some("XRef") => xref_trailer = Some(dict.clone()),
            Some("ObjStm") => {
                let Object::Stream(stream) = &parsed.object else {
                    continue;
                };
                match ObjectStreamIndex::parse(stream, registry) {
                    Ok(index) => {
                        for (i, inner) in index.numbers().enumerate() {
                            entries
                                .entry(inner)
                                .or_insert(XrefEntry::compressed(num, i as u32));
                        }
                    }
                    Err(e) => diagnostics.push(Diagnostic::at(offset, format!("object stream {num}: {e}"))),
                }
            }
            _ => {}
        }
    }
    if catalog.is_none() {
        catalog = find_catalog_in_containers(data, &entries, registry, max_depth);
    }

    let mut trailer = last_trailer(data).or(xref_trailer).unwrap_or_default();
    for key in ["Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev", "XRefStm"] {
        trailer.remove(key);
    }
    if trailer.get_ref("Root").is_none() {
        match catalog {
            Some(root) => {
                diagnostics.push(Diagnostic::new(format!("trailer Root synthesized as {root}")));
                trailer.insert("Root", root);
            }
            None => diagnostics.push(Diagnostic::new("no catalog found while rebuilding the index")),
        }
    }

    entries.insert(0, XrefEntry::free(0, FREE_HEAD_GENERATION));
    let size = entries.keys().last().copied().unwrap_or(0) + 1;
    trailer.insert("Size", size as i64);

    Ok(Reconstructed {
        table: XrefTable::from_entries(&entries),
        trailer,
        diagnostics,
    })
}

/// The dictionary following the last `trailer` keyword, if it parses.
fn last_trailer(data: &[u8]) -> Option<Dictionary> {
    let at = rfind(data, b"trailer")?;
    ObjectParser::at(data, at).parse_trailer().ok()
}

fn find_catalog_in_containers(
    data: &[u8],
    entries: &BTreeMap<u64, XrefEntry>,
    registry: &FilterRegistry,
    max_depth: usize,
) -> Option<ObjRef> {
    let mut indexes: BTreeMap<u64, ObjectStreamIndex> = BTreeMap::new();
    for (&num, entry) in entries {
        let XrefEntry::Compressed { stream, index } = *entry else {
            continue;
        };
        if !indexes.contains_key(&stream) {
            let Some(XrefEntry::InUse { offset, .. }) = entries.get(&stream) else {
                continue;
            };
            let parsed = ObjectParser::at(data, *offset as usize).parse_indirect().ok()?;
            let container = parsed.object.as_stream()?;
            indexes.insert(stream, ObjectStreamIndex::parse(container, registry).ok()?);
        }
        let (_, object) = indexes.get(&stream)?.object_at(index as usize, max_depth).ok()?;
        if object.dict().is_some_and(|d| d.is_type("Catalog")) {
            return Some(ObjRef::new(num, 0));
        }
    }
    None
}
