//! Classic `xref` tables

use std::io::Write;

use tracing::debug;

use super::{FREE_HEAD_GENERATION, XrefEntry, XrefSubsection, XrefTable};
use crate::error::{Error, Result};
use crate::pdf::lexer::{LexBuf, Lexer, Token};

/// Parse an `xref` table whose keyword starts at `pos`.
///
/// Returns the table and the position just past its last entry, where the
/// `trailer` keyword is expected. Entry lines are read token by token, so
/// 19 and 21 byte lines are accepted as well.
pub fn parse(data: &[u8], pos: usize) -> Result<(XrefTable, usize)> {
    let mut lexer = Lexer::at(data, pos);
    let mut buf = LexBuf::new();
    if lexer.lex(&mut buf)? != Token::Xref {
        return Err(Error::structural(pos as u64, "expected 'xref'"));
    }

    let mut table = XrefTable::new();
    loop {
        let before = lexer.pos();
        if lexer.peek(&mut buf)? != Token::Int {
            lexer.set_pos(before);
            break;
        }
        let start = read_uint(&mut lexer, &mut buf, "subsection start")?;
        let count = read_uint(&mut lexer, &mut buf, "subsection count")?;
        let count = usize::try_from(count)
            .map_err(|_| Error::index(format!("subsection count {count} out of range")))?;

        let mut sub = XrefSubsection::new(start, count.min(1 << 16));
        for _ in 0..count {
            sub.add(read_entry(&mut lexer, &mut buf)?);
        }
        table.add_subsection(fix_off_by_one(sub));
    }
    Ok((table, lexer.pos()))
}

fn read_uint(lexer: &mut Lexer<'_>, buf: &mut LexBuf, what: &str) -> Result<u64> {
    let at = lexer.pos();
    match lexer.lex(buf)? {
        Token::Int if buf.int_value >= 0 => Ok(buf.int_value as u64),
        _ => Err(Error::index(format!("bad {what} at offset {at}"))),
    }
}

fn read_entry(lexer: &mut Lexer<'_>, buf: &mut LexBuf) -> Result<XrefEntry> {
    let field1 = read_uint(lexer, buf, "entry offset")?;
    let field2 = read_uint(lexer, buf, "entry generation")?;
    let generation = u32::try_from(field2)
        .map_err(|_| Error::index(format!("generation {field2} out of range")))?;
    let at = lexer.pos();
    if lexer.lex(buf)? != Token::Keyword {
        return Err(Error::index(format!("missing entry type at offset {at}")));
    }
    match buf.as_bytes() {
        b"n" => Ok(XrefEntry::in_use(field1, generation)),
        b"f" => Ok(XrefEntry::free(field1, generation)),
        other => Err(Error::index(format!(
            "unknown entry type '{}' at offset {at}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Some writers number the first subsection from 1 while still listing
/// the free-list head first.
fn fix_off_by_one(mut sub: XrefSubsection) -> XrefSubsection {
    if sub.start == 1
        && matches!(
            sub.entries.first(),
            Some(XrefEntry::Free { generation, .. }) if *generation == FREE_HEAD_GENERATION
        )
    {
        debug!("xref subsection starts at 1 with free head; renumbering from 0");
        sub.start = 0;
    }
    sub
}

const MAX_FIELD1: u64 = 9_999_999_999;
const MAX_FIELD2: u32 = 65535;

/// Write `table` in the fixed 20-byte-per-line format. Compressed entries
/// and values too wide for their column are rejected.
pub fn write<W: Write>(table: &XrefTable, out: &mut W) -> Result<()> {
    out.write_all(b"xref\n")?;
    for sub in table.subsections() {
        writeln!(out, "{} {}", sub.start, sub.entries.len())?;
        for entry in &sub.entries {
            match *entry {
                XrefEntry::InUse { offset, generation } => {
                    check_width(offset, generation)?;
                    write!(out, "{offset:010} {generation:05} n\r\n")?;
                }
                XrefEntry::Free { next, generation } => {
                    check_width(next, generation)?;
                    write!(out, "{next:010} {generation:05} f\r\n")?;
                }
                XrefEntry::Compressed { .. } => {
                    return Err(Error::invariant(
                        "compressed entry cannot be written to an xref table",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_width(field1: u64, generation: u32) -> Result<()> {
    if field1 > MAX_FIELD1 || generation > MAX_FIELD2 {
        return Err(Error::invariant(format!(
            "xref entry {field1} {generation} does not fit a 20-byte line"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &[u8] = b"xref\n0 3\n0000000000 65535 f\r\n0000000015 00000 n\r\n0000000079 00001 n\r\ntrailer\n<< >>";

    #[test]
    fn test_parse_table() {
        let (table, end) = parse(SAMPLE, 0).unwrap();
        assert_eq!(table.get(0), Some(XrefEntry::free(0, 65535)));
        assert_eq!(table.get(1), Some(XrefEntry::in_use(15, 0)));
        assert_eq!(table.get(2), Some(XrefEntry::in_use(79, 1)));
        assert!(SAMPLE[end..].trim_ascii_start().starts_with(b"trailer"));
    }

    #[test]
    fn test_parse_multiple_subsections() {
        let data = b"xref\n0 1\n0000000000 65535 f \n4 2\n0000000100 00000 n \n0000000200 00000 n \ntrailer";
        let (table, _) = parse(data, 0).unwrap();
        assert_eq!(table.subsections().len(), 2);
        assert_eq!(table.get(5), Some(XrefEntry::in_use(200, 0)));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn test_parse_short_lines() {
        let data = b"xref\n0 2\n0000000000 65535 f\n0000000015 00000 n\ntrailer";
        let (table, _) = parse(data, 0).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_off_by_one_start() {
        let data = b"xref\n1 2\n0000000000 65535 f \n0000000015 00000 n \ntrailer";
        let (table, _) = parse(data, 0).unwrap();
        assert_eq!(table.get(1), Some(XrefEntry::in_use(15, 0)));
    }

    #[test]
    fn test_parse_truncated_is_error() {
        let data = b"xref\n0 3\n0000000000 65535 f \ntrailer";
        assert!(parse(data, 0).is_err());
        assert!(parse(b"startxref", 0).is_err());
    }

    #[test]
    fn test_write_line_width() {
        let (table, _) = parse(SAMPLE, 0).unwrap();
        let mut out = Vec::new();
        write(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        assert_eq!(lines[0], "xref\n");
        assert_eq!(lines[1], "0 3\n");
        assert_eq!(lines[2], "0000000000 65535 f\r\n");
        for line in &lines[2..] {
            assert_eq!(line.len(), 20);
        }
    }

    #[test]
    fn test_write_rejects_overwide_fields() {
        let mut sub = XrefSubsection::new(0, 1);
        sub.add(XrefEntry::free(0, 65536));
        let mut table = XrefTable::new();
        table.add_subsection(sub);
        assert!(matches!(write(&table, &mut Vec::new()), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_write_rejects_compressed() {
        let mut sub = XrefSubsection::new(0, 1);
        sub.add(XrefEntry::compressed(3, 0));
        let mut table = XrefTable::new();
        table.add_subsection(sub);
        assert!(write(&table, &mut Vec::new()).is_err());
    }
}
