//! ASCII85Decode and ASCIIHexDecode

use super::StreamFilter;
use crate::error::{Error, Result};
use crate::pdf::object::Dictionary;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii85;

#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiHex;

impl StreamFilter for Ascii85 {
    fn name(&self) -> &str {
        "ASCII85Decode"
    }

    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4 / 5);
        let mut group: u64 = 0;
        let mut count = 0;

        for &byte in data {
            match byte {
                b'~' => break,
                b if b.is_ascii_whitespace() => {}
                b'z' if count == 0 => out.extend_from_slice(&[0; 4]),
                b'!'..=b'u' => {
                    group = group * 85 + u64::from(byte - b'!');
                    count += 1;
                    if count == 5 {
                        let word = u32::try_from(group)
                            .map_err(|_| Error::filter("ASCII85 group overflow"))?;
                        out.extend_from_slice(&word.to_be_bytes());
                        group = 0;
                        count = 0;
                    }
                }
                other => {
                    return Err(Error::filter(format!("invalid ASCII85 character 0x{other:02x}")));
                }
            }
        }

        if count == 1 {
            return Err(Error::filter("ASCII85 final group has a single character"));
        }
        if count > 0 {
            for _ in count..5 {
                group = group * 85 + 84;
            }
            let word = u32::try_from(group).map_err(|_| Error::filter("ASCII85 group overflow"))?;
            out.extend_from_slice(&word.to_be_bytes()[..count - 1]);
        }
        Ok(out)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let mut group = u32::from_be_bytes(word);
            if group == 0 && chunk.len() == 4 {
                out.push(b'z');
                continue;
            }
            let mut digits = [0u8; 5];
            for digit in digits.iter_mut().rev() {
                *digit = (group % 85) as u8 + b'!';
                group /= 85;
            }
            out.extend_from_slice(&digits[..=chunk.len()]);
        }
        out.extend_from_slice(b"~>");
        Ok(out)
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

impl StreamFilter for AsciiHex {
    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }

    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2);
        let mut high: Option<u8> = None;
        for &byte in data {
            if byte == b'>' {
                break;
            }
            if byte.is_ascii_whitespace() {
                continue;
            }
            let nibble = hex_value(byte)
                .ok_or_else(|| Error::filter(format!("invalid hex character 0x{byte:02x}")))?;
            match high.take() {
                None => high = Some(nibble),
                Some(h) => out.push((h << 4) | nibble),
            }
        }
        // odd digit count: the last one is followed by an implicit 0
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(out)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        let mut out = Vec::with_capacity(data.len() * 2 + 1);
        for &byte in data {
            out.push(DIGITS[usize::from(byte >> 4)]);
            out.push(DIGITS[usize::from(byte & 0x0F)]);
        }
        out.push(b'>');
        Ok(out)
    }
}
