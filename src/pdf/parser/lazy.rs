//! Loading from the end of the file
//!
//! Reads the last `startxref`, then follows `Prev` links back to the first
//! section. Only cross-reference data is read here; objects are parsed the
//! first time they are resolved.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::{Loaded, ObjectParser, find_startxref, read_header, recover};
use crate::config::Config;
use crate::error::{Diagnostic, Error, Result};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::lexer::Token;
use crate::pdf::object::{Dictionary, Object};
use crate::pdf::revision::{Revision, Trailer};
use crate::pdf::xref::{CrossRefIndex, XrefStream, stream, table};

pub fn load(data: &[u8], config: &Config) -> Result<Loaded> {
    let mut diagnostics = Vec::new();
    let (version, header_offset) = read_header(data, config.recover, &mut diagnostics)?;

    let revisions = match read_chain(data, header_offset, config, &mut diagnostics) {
        Ok(revisions) => revisions,
        Err(e) if config.recover && e.is_recoverable() => {
            warn!(error = %e, "cross-reference chain unreadable, rebuilding");
            diagnostics.push(Diagnostic::new(format!("cross-reference chain unreadable: {e}")));
            vec![rebuild(data, config, &mut diagnostics)?]
        }
        Err(e) => return Err(e),
    };

    Ok(Loaded {
        version,
        header_offset,
        revisions,
        diagnostics,
    })
}

/// Single revision indexed by a reconstruction scan.
pub fn rebuild(data: &[u8], config: &Config, diagnostics: &mut Vec<Diagnostic>) -> Result<Revision> {
    let rebuilt = recover::reconstruct(data, FilterRegistry::standard(), config.max_depth)?;
    diagnostics.extend(rebuilt.diagnostics);
    Ok(Revision::from_index(
        CrossRefIndex::reconstructed(rebuilt.table),
        Trailer::from_dict(rebuilt.trailer),
        None,
    ))
}

/// All sections, oldest first.
fn read_chain(
    data: &[u8],
    header_offset: usize,
    config: &Config,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Revision>> {
    let mut offset = find_startxref(data)?;
    let mut visited = HashSet::new();
    let mut revisions = Vec::new();
    loop {
        if !visited.insert(offset) {
            warn!(offset, "Prev chain loops back");
            diagnostics.push(Diagnostic::at(offset, "Prev chain loops back to a section already read"));
            break;
        }
        let revision = read_section(data, offset, header_offset, config, diagnostics)?;
        let prev = revision.trailer().prev();
        debug!(offset, ?prev, "read cross-reference section");
        revisions.push(revision);
        match prev {
            Some(p) => offset = p,
            None => break,
        }
    }
    revisions.reverse();
    Ok(revisions)
}

fn read_section(
    data: &[u8],
    offset: u64,
    header_offset: usize,
    config: &Config,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Revision> {
    match read_section_at(data, offset, config, diagnostics) {
        Ok(revision) => Ok(revision),
        // offsets in files with leading junk are sometimes relative to the header
        Err(e) if header_offset > 0 => {
            read_section_at(data, offset + header_offset as u64, config, diagnostics).map_err(|_| e)
        }
        Err(e) => Err(e),
    }
}

fn read_section_at(
    data: &[u8],
    offset: u64,
    config: &Config,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Revision> {
    let pos = position(data, offset)?;
    let mut parser = ObjectParser::at(data, pos).with_max_depth(config.max_depth);
    match parser.peek_token()? {
        Token::Xref => {
            let (table, end) = table::parse(data, pos)?;
            let trailer = ObjectParser::at(data, end)
                .with_max_depth(config.max_depth)
                .parse_trailer()
                .map_err(|e| Error::index(format!("trailer of section at {offset}: {e}")))?;
            let trailer = Trailer::from_dict(trailer);
            let mut index = CrossRefIndex::from_table(table);
            if let Some(stm) = trailer.xref_stm() {
                match read_xref_stream(data, stm, config) {
                    Ok((companion, _)) => index.stream = Some(companion),
                    Err(e) => {
                        debug!(offset = stm, error = %e, "XRefStm companion unreadable");
                        diagnostics.push(Diagnostic::at(stm, format!("XRefStm companion unreadable: {e}")));
                    }
                }
            }
            Ok(Revision::from_index(index, trailer, Some(offset)))
        }
        Token::Int => {
            let (xref, dict) = read_xref_stream(data, offset, config)?;
            Ok(Revision::from_index(
                CrossRefIndex::from_stream(xref),
                Trailer::from_dict(dict),
                Some(offset),
            ))
        }
        other => Err(Error::index(format!(
            "no cross-reference section at offset {offset} (found {other:?})"
        ))),
    }
}

fn position(data: &[u8], offset: u64) -> Result<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|&p| p < data.len())
        .ok_or_else(|| Error::index(format!("offset {offset} is outside the file")))
}

/// Read the `/Type /XRef` stream object at `offset`.
pub fn read_xref_stream(data: &[u8], offset: u64, config: &Config) -> Result<(XrefStream, Dictionary)> {
    let pos = position(data, offset)?;
    let parsed = ObjectParser::at(data, pos)
        .with_max_depth(config.max_depth)
        .parse_indirect()?;
    match &parsed.object {
        Object::Stream(s) if s.dict().is_type("XRef") => {
            stream::read(parsed.id, offset, s, FilterRegistry::standard())
        }
        other => Err(Error::index(format!(
            "object at offset {offset} is a {}, not a cross-reference stream",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::object::ObjRef;
    use crate::pdf::xref::XrefKind;

    /// Build a file from (object body) records with a table section.
    fn single_revision(prev: Option<u64>) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let first = out.len();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let xref = out.len();
        out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f\r\n");
        out.extend_from_slice(format!("{first:010} 00000 n\r\n").as_bytes());
        let prev = prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        out.extend_from_slice(format!("trailer\n<< /Size 2 /Root 1 0 R{prev} >>\nstartxref\n{xref}\n%%EOF\n").as_bytes());
        out
    }

    #[test]
    fn test_single_section() {
        let data = single_revision(None);
        let loaded = load(&data, &Config::default()).unwrap();
        assert_eq!(loaded.revisions.len(), 1);
        let rev = &loaded.revisions[0];
        assert_eq!(rev.trailer().root(), Some(ObjRef::new(1, 0)));
        assert_eq!(rev.xref().map(CrossRefIndex::kind), Some(XrefKind::Table));
        assert!(rev.is_empty());
    }

    #[test]
    fn test_prev_zero_terminates() {
        let data = single_revision(Some(0));
        let loaded = load(&data, &Config::strict()).unwrap();
        assert_eq!(loaded.revisions.len(), 1);
        assert!(loaded.diagnostics.is_empty());
    }

    #[test]
    fn test_prev_cycle_is_detected() {
        let data = single_revision(None);
        let xref = find_startxref(&data).unwrap();
        let looped = single_revision(Some(xref));
        let loaded = load(&looped, &Config::default()).unwrap();
        assert_eq!(loaded.revisions.len(), 1);
        assert_eq!(loaded.diagnostics.len(), 1);
    }

    #[test]
    fn test_bad_startxref_rebuilds() {
        let mut data = single_revision(None);
        let at = super::super::rfind(&data, b"startxref").unwrap();
        data.truncate(at);
        data.extend_from_slice(b"startxref\n3\n%%EOF\n");
        let loaded = load(&data, &Config::default()).unwrap();
        assert_eq!(loaded.revisions[0].xref().map(CrossRefIndex::kind), Some(XrefKind::Reconstructed));
        assert_eq!(loaded.revisions[0].trailer().root(), Some(ObjRef::new(1, 0)));
        assert!(load(&data, &Config::strict()).is_err());
    }
}
