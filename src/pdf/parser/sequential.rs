//! Front-to-back loading
//!
//! Every object is read in file order and assigned to the revision being
//! read; `%%EOF` closes a revision. `Prev` links are never followed, so
//! broken backward chains do not matter here.

use tracing::debug;

use super::{Loaded, ObjectParser, read_header, recover};
use crate::config::Config;
use crate::error::{Diagnostic, Error, Result};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::lexer::{Token, is_whitespace};
use crate::pdf::object::{Dictionary, Object};
use crate::pdf::revision::{IndirectObject, Location, Revision, Trailer};
use crate::pdf::xref::{stream, table};

pub fn load(data: &[u8], config: &Config) -> Result<Loaded> {
    let mut diagnostics = Vec::new();
    let (version, header_offset) = read_header(data, config.recover, &mut diagnostics)?;

    let mut revisions = Vec::new();
    let mut current = Revision::new();
    let mut touched = false;
    let mut pos = header_offset;

    while pos < data.len() {
        pos = skip_whitespace(data, pos);
        if pos >= data.len() {
            break;
        }
        if data[pos..].starts_with(b"%%EOF") {
            pos += 5;
            if touched {
                revisions.push(std::mem::take(&mut current));
                touched = false;
            }
            continue;
        }
        if data[pos] == b'%' {
            pos = end_of_line(data, pos);
            continue;
        }

        let mut parser = ObjectParser::at(data, pos).with_max_depth(config.max_depth);
        let step = match parser.peek_token() {
            Ok(Token::Int) => read_object(&mut parser, &mut current, &mut diagnostics),
            Ok(Token::Xref) => table::parse(data, pos).map(|(table, end)| {
                current.attach_table(table);
                end
            }),
            Ok(Token::Trailer) => parser.parse_trailer().map(|dict| {
                merge_trailer(&mut current, dict);
                parser.pos()
            }),
            Ok(Token::StartXref) => read_startxref(&mut parser, &mut current),
            Ok(Token::Eof) => break,
            Ok(other) => Err(Error::structural(pos as u64, format!("unexpected {other:?} between objects"))),
            Err(e) => Err(e),
        };

        match step {
            Ok(next) => {
                pos = next.max(pos + 1);
                touched = true;
            }
            Err(e) if config.recover && e.is_recoverable() => {
                debug!(offset = pos, error = %e, "skipping to the next marker");
                diagnostics.push(Diagnostic::at(pos as u64, e.to_string()));
                pos = recover::next_marker(data, pos + 1);
            }
            Err(e) => return Err(e),
        }
    }
    if touched {
        revisions.push(current);
    }
    if revisions.is_empty() {
        return Err(Error::structural(header_offset as u64, "no objects or sections found"));
    }

    Ok(Loaded {
        version,
        header_offset,
        revisions,
        diagnostics,
    })
}

fn read_object(
    parser: &mut ObjectParser<'_>,
    current: &mut Revision,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<usize> {
    let parsed = parser.parse_indirect()?;
    if let Some(d) = &parsed.diagnostic {
        diagnostics.push(d.clone());
    }
    if let Object::Stream(s) = &parsed.object {
        if s.dict().is_type("XRef") {
            let (xref, dict) = stream::read(parsed.id, parsed.start as u64, s, FilterRegistry::standard())?;
            current.attach_stream(xref);
            // a table's trailer, read later in a hybrid section, takes precedence
            let mut trailer = dict;
            for (key, value) in current.trailer().dict().iter() {
                trailer.insert(key.clone(), value.clone());
            }
            *current.trailer_mut() = Trailer::from_dict(trailer);
            return Ok(parsed.end);
        }
    }
    current.insert(IndirectObject::loaded(
        parsed.id,
        parsed.object,
        Location::Offset(parsed.start as u64),
        parsed.diagnostic,
    ));
    Ok(parsed.end)
}

fn merge_trailer(current: &mut Revision, dict: Dictionary) {
    let trailer = current.trailer_mut().dict_mut();
    for (key, value) in dict.iter() {
        trailer.insert(key.clone(), value.clone());
    }
}

fn read_startxref(parser: &mut ObjectParser<'_>, current: &mut Revision) -> Result<usize> {
    parser.expect_token(Token::StartXref)?;
    let offset = parser.expect_int()?;
    current.xref_offset = u64::try_from(offset).ok();
    Ok(parser.pos())
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos).copied().is_some_and(is_whitespace) {
        pos += 1;
    }
    pos
}

fn end_of_line(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && data[pos] != b'\n' && data[pos] != b'\r' {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::object::ObjRef;
    use crate::pdf::revision::Slot;

    const TWO_REVISIONS: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog >>\nendobj\n\
5 0 obj\n(A)\nendobj\n\
xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n60\n%%EOF\n\
5 0 obj\n(B)\nendobj\n\
trailer\n<< /Size 6 /Root 1 0 R /Prev 60 >>\n%%EOF\n";

    #[test]
    fn test_revisions_split_at_eof() {
        let loaded = load(TWO_REVISIONS, &Config::default()).unwrap();
        assert_eq!(loaded.revisions.len(), 2);
        let first = &loaded.revisions[0];
        let second = &loaded.revisions[1];
        assert_eq!(first.len(), 2);
        assert_eq!(first.xref_offset(), Some(60));
        assert_eq!(second.len(), 1);
        assert_eq!(second.slot(5), Some(Slot::Body(ObjRef::new(5, 0))));
        assert_eq!(
            second.get(ObjRef::new(5, 0)).map(|o| &o.object),
            Some(&Object::string("B"))
        );
        assert_eq!(second.trailer().prev(), Some(60));
    }

    #[test]
    fn test_skips_garbage_between_objects() {
        let data = b"%PDF-1.4\n1 0 obj\n(ok)\nendobj\n) ) junk ]\n2 0 obj\n(fine)\nendobj\n%%EOF\n";
        let loaded = load(data, &Config::default()).unwrap();
        assert_eq!(loaded.revisions[0].len(), 2);
        assert!(!loaded.diagnostics.is_empty());
        assert!(load(data, &Config::strict()).is_err());
    }

    #[test]
    fn test_object_without_endobj_is_kept() {
        let data = b"%PDF-1.4\n1 0 obj\n(kept)\n2 0 obj\n(next)\nendobj\n%%EOF\n";
        let loaded = load(data, &Config::default()).unwrap();
        let rev = &loaded.revisions[0];
        let damaged = rev.get(ObjRef::new(1, 0)).unwrap();
        assert_eq!(damaged.object, Object::string("kept"));
        assert!(damaged.check().is_err());
        assert!(rev.get(ObjRef::new(2, 0)).unwrap().check().is_ok());
    }

    #[test]
    fn test_no_objects_is_error() {
        assert!(load(b"%PDF-1.4\n%%EOF\n", &Config::default()).is_err());
    }
}
