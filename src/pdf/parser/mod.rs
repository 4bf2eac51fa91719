//! Parsers
//!
//! [`ObjectParser`] reads individual objects and sections from a byte
//! buffer. The two loading strategies build on it: [`sequential`] reads
//! the file front to back, [`lazy`] starts from the last `startxref` and
//! walks the `Prev` chain. [`recover`] rebuilds an index by scanning when
//! neither works.

pub mod lazy;
pub mod recover;
pub mod sequential;

use tracing::debug;

use crate::error::{Diagnostic, Error, Result};
use crate::pdf::lexer::{LexBuf, Lexer, Token};
use crate::pdf::object::schema::Version;
use crate::pdf::object::{Array, Dictionary, Name, ObjRef, Object, PdfString, Stream};
use crate::pdf::revision::Revision;

/// How far into the file the header may start.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// Default nesting limit for arrays and dictionaries.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Output of a loading strategy.
#[derive(Debug)]
pub struct Loaded {
    pub version: Version,
    /// Bytes of junk before `%PDF-`.
    pub header_offset: usize,
    /// Oldest first.
    pub revisions: Vec<Revision>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read the header, tolerating its absence when recovering.
pub(crate) fn read_header(data: &[u8], recover: bool, diagnostics: &mut Vec<Diagnostic>) -> Result<(Version, usize)> {
    match parse_header(data) {
        Ok(found) => Ok(found),
        Err(e) if recover => {
            diagnostics.push(Diagnostic::at(0, e.to_string()));
            Ok((Version::default(), 0))
        }
        Err(e) => Err(e),
    }
}

/// An indirect object read from the buffer.
#[derive(Debug, Clone)]
pub struct ParsedObject {
    pub id: ObjRef,
    pub object: Object,
    /// Offset of the object number.
    pub start: usize,
    /// Offset just past `endobj` (or wherever parsing stopped).
    pub end: usize,
    /// Set when the record was damaged but a value could still be read.
    pub diagnostic: Option<Diagnostic>,
}

/// Recursive descent parser over a byte buffer.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    buf: LexBuf,
    max_depth: usize,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            buf: LexBuf::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn pos(&self) -> usize {
        self.lexer.pos()
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lexer.set_pos(pos);
    }

    pub fn data(&self) -> &'a [u8] {
        self.lexer.data()
    }

    pub fn is_eof(&mut self) -> bool {
        self.lexer.skip_whitespace_and_comments();
        self.lexer.is_eof()
    }

    fn error(&self, msg: impl Into<String>) -> Error {
        Error::structural(self.pos() as u64, msg)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.lexer.lex(&mut self.buf)
    }

    pub fn peek_token(&mut self) -> Result<Token> {
        self.lexer.peek(&mut self.buf)
    }

    pub fn expect_token(&mut self, expected: Token) -> Result<()> {
        let token = self.next_token()?;
        if token != expected {
            return Err(self.error(format!("expected {expected:?}, found {token:?}")));
        }
        Ok(())
    }

    pub fn expect_int(&mut self) -> Result<i64> {
        match self.next_token()? {
            Token::Int => Ok(self.buf.int_value),
            other => Err(self.error(format!("expected integer, found {other:?}"))),
        }
    }

    /// Parse one direct object, folding `n g R` into a reference.
    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_value(0)
    }

    fn parse_value(&mut self, depth: usize) -> Result<Object> {
        if depth >= self.max_depth {
            return Err(self.error("objects nested too deeply"));
        }
        let token = self.next_token()?;
        match token {
            Token::Null => Ok(Object::Null),
            Token::True => Ok(Object::Bool(true)),
            Token::False => Ok(Object::Bool(false)),
            Token::Int => {
                let value = self.buf.int_value;
                Ok(self.try_reference(value).unwrap_or(Object::Int(value)))
            }
            Token::Real => Ok(Object::Real(self.buf.real_value)),
            Token::String | Token::HexString => {
                Ok(Object::String(PdfString::new(std::mem::take(&mut self.buf.buffer))))
            }
            Token::Name => Ok(Object::Name(Name::from_bytes(self.buf.as_bytes()))),
            Token::OpenArray => self.parse_array(depth + 1).map(Object::Array),
            Token::OpenDict => self.parse_dict(depth + 1).map(Object::Dict),
            Token::Eof => Err(Error::Eof),
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }

    /// After an integer: consume `g R` if present.
    fn try_reference(&mut self, num: i64) -> Option<Object> {
        let saved = self.pos();
        let reference = self.reference_tail(num);
        if reference.is_none() {
            self.set_pos(saved);
        }
        reference
    }

    fn reference_tail(&mut self, num: i64) -> Option<Object> {
        let num = u64::try_from(num).ok()?;
        if self.next_token().ok()? != Token::Int {
            return None;
        }
        let generation = u32::try_from(self.buf.int_value).ok()?;
        if self.next_token().ok()? != Token::R {
            return None;
        }
        Some(Object::Ref(ObjRef::new(num, generation)))
    }

    fn parse_array(&mut self, depth: usize) -> Result<Array> {
        let mut array = Array::new();
        loop {
            match self.peek_token()? {
                Token::CloseArray => {
                    self.next_token()?;
                    return Ok(array);
                }
                Token::Eof => return Err(self.error("unterminated array")),
                _ => array.push(self.parse_value(depth)?),
            }
        }
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let key = match self.next_token()? {
                Token::CloseDict => return Ok(dict),
                Token::Name => Name::from_bytes(self.buf.as_bytes()),
                Token::Eof => return Err(self.error("unterminated dictionary")),
                other => return Err(self.error(format!("dictionary key must be a name, found {other:?}"))),
            };
            if self.peek_token()? == Token::CloseDict {
                // odd entry count: the last key has no value
                self.next_token()?;
                dict.insert(key, Object::Null);
                return Ok(dict);
            }
            let value = self.parse_value(depth)?;
            dict.insert(key, value);
        }
    }

    /// Parse `n g obj <object> [stream ... endstream] endobj` at the
    /// current position.
    ///
    /// A missing `endobj` is tolerated: the object is returned with a
    /// diagnostic attached.
    pub fn parse_indirect(&mut self) -> Result<ParsedObject> {
        self.lexer.skip_whitespace_and_comments();
        let start = self.pos();
        let num = self.expect_int()?;
        let generation = self.expect_int()?;
        let (Ok(num), Ok(generation)) = (u64::try_from(num), u32::try_from(generation)) else {
            return Err(Error::structural(start as u64, "invalid object identity"));
        };
        self.expect_token(Token::Obj)?;
        let id = ObjRef::new(num, generation);

        let mut object = match self.peek_token()? {
            // `n g obj endobj` is a null object
            Token::EndObj => Object::Null,
            _ => self.parse_object()?,
        };
        let mut diagnostic = None;

        if self.peek_token()? == Token::Stream {
            self.next_token()?;
            let Object::Dict(dict) = object else {
                return Err(self.error("stream keyword after a non-dictionary"));
            };
            let (data, note) = self.read_stream_data(&dict)?;
            diagnostic = note;
            object = Object::Stream(Stream::from_encoded(dict, data));
        }

        if self.peek_token()? == Token::EndObj {
            self.next_token()?;
        } else {
            debug!(%id, offset = start, "object has no endobj");
            diagnostic = Some(Diagnostic::at(start as u64, format!("object {id} has no endobj")));
        }

        Ok(ParsedObject {
            id,
            object,
            start,
            end: self.pos(),
            diagnostic,
        })
    }

    /// Read a stream payload. The position is just past the `stream`
    /// keyword. A direct `Length` is trusted only when `endstream`
    /// follows it; otherwise the payload runs to the next `endstream`.
    fn read_stream_data(&mut self, dict: &Dictionary) -> Result<(Vec<u8>, Option<Diagnostic>)> {
        let data = self.data();
        let mut begin = self.pos();
        if data.get(begin) == Some(&b'\r') {
            begin += 1;
        }
        if data.get(begin) == Some(&b'\n') {
            begin += 1;
        }

        let declared = dict.get_int("Length").and_then(|l| usize::try_from(l).ok());
        if let Some(end) = declared.and_then(|len| begin.checked_add(len)) {
            if end <= data.len() {
                let mut after = Lexer::at(data, end);
                after.skip_whitespace();
                if data[after.pos()..].starts_with(b"endstream") {
                    self.set_pos(after.pos() + b"endstream".len());
                    return Ok((data[begin..end].to_vec(), None));
                }
            }
        }

        let Some(found) = find(&data[begin..], b"endstream") else {
            return Err(Error::structural(begin as u64, "stream has no endstream"));
        };
        let mut end = begin + found;
        if end > begin && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > begin && data[end - 1] == b'\r' {
            end -= 1;
        }
        self.set_pos(begin + found + b"endstream".len());
        debug!(offset = begin, length = end - begin, "stream length recovered by scanning");
        let note = declared.map(|len| {
            Diagnostic::at(
                begin as u64,
                format!("stream Length {len} is wrong, payload is {} bytes", end - begin),
            )
        });
        Ok((data[begin..end].to_vec(), note))
    }

    /// Parse `trailer << ... >>`.
    pub fn parse_trailer(&mut self) -> Result<Dictionary> {
        self.expect_token(Token::Trailer)?;
        match self.parse_object()? {
            Object::Dict(dict) => Ok(dict),
            other => Err(self.error(format!("trailer must be a dictionary, found {}", other.kind()))),
        }
    }
}

/// First occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Last occurrence of `needle` in `haystack`.
pub fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Locate `%PDF-M.m` within the first kilobyte. Returns the version and
/// the offset of the `%`, which is where byte offsets are measured from
/// in files with leading junk.
pub fn parse_header(data: &[u8]) -> Result<(Version, usize)> {
    let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
    let start = find(window, b"%PDF-").ok_or_else(|| Error::structural(0, "missing %PDF- header"))?;
    let rest = &data[start + 5..];
    let digits = |s: &[u8]| -> Option<(u8, usize)> {
        let len = s.iter().take_while(|b| b.is_ascii_digit()).count();
        let text = std::str::from_utf8(&s[..len]).ok()?;
        Some((text.parse().ok()?, len))
    };
    let (major, used) =
        digits(rest).ok_or_else(|| Error::structural(start as u64, "malformed header version"))?;
    let minor = match rest.get(used) {
        Some(b'.') => digits(&rest[used + 1..]).map_or(0, |(m, _)| m),
        _ => 0,
    };
    if start > 0 {
        debug!(junk = start, "header preceded by junk");
    }
    Ok((Version::new(major, minor), start))
}

/// Offset named by the last `startxref` in the file.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let at = rfind(data, b"startxref")
        .ok_or_else(|| Error::structural(data.len() as u64, "no startxref"))?;
    let mut lexer = Lexer::at(data, at + b"startxref".len());
    let mut buf = LexBuf::new();
    match lexer.lex(&mut buf)? {
        Token::Int if buf.int_value >= 0 => Ok(buf.int_value as u64),
        _ => Err(Error::structural(at as u64, "startxref is not followed by an offset")),
    }
}
