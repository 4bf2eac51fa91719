//! Tokenizer for the literal object syntax

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Eof,
    /// '['
    OpenArray,
    /// ']'
    CloseArray,
    /// '<<'
    OpenDict,
    /// '>>'
    CloseDict,
    Name,
    Int,
    Real,
    /// `( ... )`
    String,
    /// `< ... >`
    HexString,
    /// Any bare word not listed below
    Keyword,
    R,
    True,
    False,
    Null,
    Obj,
    EndObj,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
}

/// Scratch space filled by [`Lexer::lex`].
#[derive(Debug, Default)]
pub struct LexBuf {
    /// Decoded bytes of a name, string or keyword token
    pub buffer: Vec<u8>,
    pub int_value: i64,
    pub real_value: f64,
}

impl LexBuf {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            int_value: 0,
            real_value: 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.int_value = 0;
        self.real_value = 0.0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_str_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

pub const fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

pub const fn is_delimiter(ch: u8) -> bool {
    matches!(ch, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

pub const fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn error(&self, msg: impl Into<String>) -> Error {
        Error::structural(self.pos as u64, msg)
    }

    pub fn lex(&mut self, buf: &mut LexBuf) -> Result<Token> {
        buf.clear();
        self.skip_whitespace_and_comments();

        let Some(ch) = self.peek_byte() else {
            return Ok(Token::Eof);
        };

        match ch {
            b'[' => {
                self.pos += 1;
                Ok(Token::OpenArray)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::CloseArray)
            }
            b'<' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'<') {
                    self.pos += 1;
                    Ok(Token::OpenDict)
                } else {
                    self.lex_hex_string(buf)
                }
            }
            b'>' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'>') {
                    self.pos += 1;
                    Ok(Token::CloseDict)
                } else {
                    Err(self.error("unexpected '>'"))
                }
            }
            b'/' => {
                self.pos += 1;
                self.lex_name(buf);
                Ok(Token::Name)
            }
            b'(' => {
                self.pos += 1;
                self.lex_string(buf)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.lex_number(buf),
            b')' | b'{' | b'}' => {
                self.pos += 1;
                Err(self.error(format!("unexpected '{}'", ch as char)))
            }
            _ => Ok(self.lex_keyword(buf)),
        }
    }

    /// Token kind of the next token without consuming it.
    pub fn peek(&mut self, buf: &mut LexBuf) -> Result<Token> {
        let saved = self.pos;
        let token = self.lex(buf);
        self.pos = saved;
        token
    }

    pub fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) {
                self.pos += 1;
            } else if ch == b'%' {
                while let Some(c) = self.peek_byte() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek_byte().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    fn lex_name(&mut self, buf: &mut LexBuf) {
        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            if ch == b'#' {
                let hex = self.data.get(self.pos + 1..self.pos + 3);
                if let Some(byte) = hex.and_then(|h| {
                    std::str::from_utf8(h).ok().and_then(|s| u8::from_str_radix(s, 16).ok())
                }) {
                    buf.buffer.push(byte);
                    self.pos += 3;
                    continue;
                }
            }
            buf.buffer.push(ch);
            self.pos += 1;
        }
    }

    fn lex_string(&mut self, buf: &mut LexBuf) -> Result<Token> {
        let start = self.pos;
        let mut depth = 1;
        while let Some(ch) = self.peek_byte() {
            self.pos += 1;
            match ch {
                b'(' => {
                    depth += 1;
                    buf.buffer.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Token::String);
                    }
                    buf.buffer.push(ch);
                }
                b'\\' => self.lex_escape(buf),
                b'\r' => {
                    // end-of-line in a literal string reads as '\n'
                    if self.peek_byte() == Some(b'\n') {
                        self.pos += 1;
                    }
                    buf.buffer.push(b'\n');
                }
                _ => buf.buffer.push(ch),
            }
        }
        Err(Error::structural(start as u64, "unterminated string"))
    }

    fn lex_escape(&mut self, buf: &mut LexBuf) {
        let Some(next) = self.peek_byte() else {
            return;
        };
        self.pos += 1;
        match next {
            b'n' => buf.buffer.push(b'\n'),
            b'r' => buf.buffer.push(b'\r'),
            b't' => buf.buffer.push(b'\t'),
            b'b' => buf.buffer.push(0x08),
            b'f' => buf.buffer.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                for _ in 0..2 {
                    match self.peek_byte() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                buf.buffer.push((value & 0xFF) as u8);
            }
            b'\r' => {
                if self.peek_byte() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            // \( \) \\ and unknown escapes stand for the character itself
            other => buf.buffer.push(other),
        }
    }

    fn lex_hex_string(&mut self, buf: &mut LexBuf) -> Result<Token> {
        let start = self.pos;
        let mut high: Option<u8> = None;
        while let Some(ch) = self.peek_byte() {
            self.pos += 1;
            if ch == b'>' {
                if let Some(h) = high {
                    buf.buffer.push(h << 4);
                }
                return Ok(Token::HexString);
            }
            if is_whitespace(ch) {
                continue;
            }
            let nibble = match ch {
                b'0'..=b'9' => ch - b'0',
                b'a'..=b'f' => ch - b'a' + 10,
                b'A'..=b'F' => ch - b'A' + 10,
                _ => return Err(self.error(format!("invalid hex digit '{}'", ch as char))),
            };
            match high.take() {
                Some(h) => buf.buffer.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        Err(Error::structural(start as u64, "unterminated hex string"))
    }

    fn lex_number(&mut self, buf: &mut LexBuf) -> Result<Token> {
        let start = self.pos;
        let mut is_real = false;
        if matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(ch) = self.peek_byte() {
            match ch {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_real => {
                    is_real = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = &self.data[start..self.pos];
        buf.buffer.extend_from_slice(text);
        let digits = text.iter().filter(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(Error::structural(start as u64, "malformed number"));
        }
        // Tokens are ASCII by construction, from_utf8 cannot fail here.
        let text = std::str::from_utf8(text).unwrap_or("0");
        if !is_real {
            if let Ok(value) = text.parse::<i64>() {
                buf.int_value = value;
                return Ok(Token::Int);
            }
        }
        let normalized = if text.ends_with('.') { format!("{text}0") } else { text.to_string() };
        buf.real_value = normalized
            .parse()
            .map_err(|_| Error::structural(start as u64, "malformed real"))?;
        Ok(Token::Real)
    }

    fn lex_keyword(&mut self, buf: &mut LexBuf) -> Token {
        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            buf.buffer.push(ch);
            self.pos += 1;
        }
        match buf.buffer.as_slice() {
            b"R" => Token::R,
            b"true" => Token::True,
            b"false" => Token::False,
            b"null" => Token::Null,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"xref" => Token::Xref,
            b"trailer" => Token::Trailer,
            b"startxref" => Token::StartXref,
            _ => Token::Keyword,
        }
    }
}
