//! RunLengthDecode

use super::StreamFilter;
use crate::error::{Error, Result};
use crate::pdf::object::Dictionary;

const EOD: u8 = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunLength;

impl StreamFilter for RunLength {
    fn name(&self) -> &str {
        "RunLengthDecode"
    }

    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        let mut rest = data;
        while let Some((&len, tail)) = rest.split_first() {
            match len {
                EOD => break,
                0..=127 => {
                    let count = usize::from(len) + 1;
                    let literal = tail
                        .get(..count)
                        .ok_or_else(|| Error::filter("RunLengthDecode: truncated literal run"))?;
                    out.extend_from_slice(literal);
                    rest = &tail[count..];
                }
                _ => {
                    let (&byte, after) = tail
                        .split_first()
                        .ok_or_else(|| Error::filter("RunLengthDecode: truncated repeat run"))?;
                    out.resize(out.len() + 257 - usize::from(len), byte);
                    rest = after;
                }
            }
        }
        Ok(out)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
        let mut literal: Vec<u8> = Vec::new();
        let mut i = 0;

        let flush = |literal: &mut Vec<u8>, out: &mut Vec<u8>| {
            for chunk in literal.chunks(128) {
                out.push((chunk.len() - 1) as u8);
                out.extend_from_slice(chunk);
            }
            literal.clear();
        };

        while i < data.len() {
            let byte = data[i];
            let run = data[i..].iter().take(128).take_while(|&&b| b == byte).count();
            if run >= 2 {
                flush(&mut literal, &mut out);
                out.push((257 - run) as u8);
                out.push(byte);
                i += run;
            } else {
                literal.push(byte);
                i += 1;
            }
        }
        flush(&mut literal, &mut out);
        out.push(EOD);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runlength_roundtrip() {
        let original = b"AAAAAABBBCCCCCCCCCCDDDDDDxyz";
        let encoded = RunLength.encode(original, None).unwrap();
        assert_eq!(RunLength.decode(&encoded, None).unwrap(), original);
    }

    #[test]
    fn test_runlength_long_run() {
        let original = [b'X'; 300];
        let encoded = RunLength.encode(&original, None).unwrap();
        assert!(encoded.len() < 10);
        assert_eq!(RunLength.decode(&encoded, None).unwrap(), original);
    }

    #[test]
    fn test_runlength_truncated() {
        assert!(RunLength.decode(&[5, b'a'], None).is_err());
        assert!(RunLength.decode(&[200], None).is_err());
    }

    #[test]
    fn test_runlength_stops_at_eod() {
        assert_eq!(RunLength.decode(&[0, b'a', 128, 0, b'b'], None).unwrap(), b"a");
    }
}
