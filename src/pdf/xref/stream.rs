//! Cross-reference streams (`/Type /XRef`)
//!
//! Entries are packed as three big-endian fields whose widths come from
//! `/W`. `/Index` lists `[start count ...]` pairs; it defaults to
//! `[0 Size]`.

use tracing::debug;

use super::{XrefEntry, XrefStream, XrefSubsection, XrefTable};
use crate::error::{Error, Result};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::object::{Dictionary, Name, ObjRef, Object, Stream};

/// Largest accepted field width, in bytes.
const MAX_FIELD_WIDTH: usize = 8;

/// Keys that describe the stream itself rather than the document.
const STREAM_KEYS: &[&str] = &["Type", "W", "Index", "Length", "Filter", "DecodeParms", "DL"];

/// Decodes packed entries according to `/W` and `/Index`.
pub struct XrefStreamDecoder {
    widths: [usize; 3],
    ranges: Vec<(u64, u64)>,
}

impl XrefStreamDecoder {
    pub fn new(w: &[i64], index: Option<&[i64]>, size: u64) -> Result<Self> {
        if w.len() != 3 {
            return Err(Error::index(format!("W must have 3 entries, found {}", w.len())));
        }
        let mut widths = [0usize; 3];
        for (slot, &width) in widths.iter_mut().zip(w) {
            *slot = usize::try_from(width)
                .ok()
                .filter(|&v| v <= MAX_FIELD_WIDTH)
                .ok_or_else(|| Error::index(format!("invalid W field width {width}")))?;
        }

        let ranges = match index {
            Some(pairs) => {
                if pairs.len() % 2 != 0 {
                    return Err(Error::index("Index must have an even number of entries"));
                }
                pairs
                    .chunks_exact(2)
                    .map(|pair| match (u64::try_from(pair[0]), u64::try_from(pair[1])) {
                        (Ok(start), Ok(count)) => Ok((start, count)),
                        _ => Err(Error::index("negative value in Index")),
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            None => vec![(0, size)],
        };

        Ok(Self { widths, ranges })
    }

    pub fn entry_size(&self) -> usize {
        self.widths.iter().sum()
    }

    /// Decode one packed entry. A zero-width type field means type 1.
    pub fn decode_entry(&self, data: &[u8]) -> Option<XrefEntry> {
        let [w0, w1, w2] = self.widths;
        let kind = if w0 == 0 { 1 } else { read_uint(&data[..w0]) };
        let field1 = read_uint(&data[w0..w0 + w1]);
        let field2 = read_uint(&data[w0 + w1..w0 + w1 + w2]);
        XrefEntry::from_fields(kind, field1, field2)
    }

    pub fn decode_all(&self, data: &[u8]) -> Result<XrefTable> {
        let entry_size = self.entry_size();
        if entry_size == 0 {
            return Err(Error::index("W describes zero-width entries"));
        }
        let mut table = XrefTable::new();
        let mut chunks = data.chunks_exact(entry_size);
        for &(start, count) in &self.ranges {
            let mut sub = XrefSubsection::new(start, count.min(1 << 16) as usize);
            for i in 0..count {
                let chunk = chunks.next().ok_or_else(|| {
                    Error::index("xref stream data exhausted before Index ranges")
                })?;
                match self.decode_entry(chunk) {
                    Some(entry) => sub.add(entry),
                    None => {
                        // unknown types are reserved; read them as absent
                        debug!(num = start + i, "ignoring xref stream entry of unknown type");
                        sub.add(XrefEntry::free(0, 0));
                    }
                }
            }
            table.add_subsection(sub);
        }
        if chunks.next().is_some() || !chunks.remainder().is_empty() {
            debug!("xref stream has trailing data past its Index ranges");
        }
        Ok(table)
    }
}

/// Packs entries with the narrowest widths that fit.
pub struct XrefStreamEncoder {
    widths: [usize; 3],
}

impl XrefStreamEncoder {
    pub fn new(table: &XrefTable) -> Self {
        Self {
            widths: optimal_widths(table),
        }
    }

    pub fn widths(&self) -> [usize; 3] {
        self.widths
    }

    pub fn w_array(&self) -> Vec<Object> {
        self.widths.iter().map(|&w| Object::Int(w as i64)).collect()
    }

    pub fn encode_entry(&self, entry: &XrefEntry, out: &mut Vec<u8>) {
        let (kind, field1, field2) = entry.fields();
        write_uint(u64::from(kind), self.widths[0], out);
        write_uint(field1, self.widths[1], out);
        write_uint(field2, self.widths[2], out);
    }

    pub fn encode_all(&self, table: &XrefTable) -> Vec<u8> {
        let mut out = Vec::with_capacity(table.len() * self.widths.iter().sum::<usize>());
        for sub in table.subsections() {
            for entry in &sub.entries {
                self.encode_entry(entry, &mut out);
            }
        }
        out
    }
}

fn optimal_widths(table: &XrefTable) -> [usize; 3] {
    let (mut max1, mut max2) = (0u64, 0u64);
    for sub in table.subsections() {
        for entry in &sub.entries {
            let (_, f1, f2) = entry.fields();
            max1 = max1.max(f1);
            max2 = max2.max(f2);
        }
    }
    [1, bytes_needed(max1).max(1), bytes_needed(max2).max(1)]
}

fn bytes_needed(value: u64) -> usize {
    (64 - value.leading_zeros() as usize).div_ceil(8)
}

fn read_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn write_uint(value: u64, width: usize, out: &mut Vec<u8>) {
    for i in (0..width).rev() {
        out.push((value >> (i * 8)) as u8);
    }
}

fn build_index(table: &XrefTable) -> Vec<Object> {
    table
        .subsections()
        .iter()
        .flat_map(|sub| [Object::Int(sub.start as i64), Object::Int(sub.entries.len() as i64)])
        .collect()
}

fn int_array(dict: &Dictionary, key: &str) -> Result<Option<Vec<i64>>> {
    match dict.get(key) {
        None => Ok(None),
        Some(Object::Array(a)) => a
            .to_ints()
            .map(Some)
            .ok_or_else(|| Error::index(format!("{key} must contain only integers"))),
        Some(other) => Err(Error::index(format!("{key} must be an array, found {}", other.kind()))),
    }
}

/// Decode the stream object `id` found at `offset`. Returns the index and
/// the trailer dictionary it carries.
pub fn read(
    id: ObjRef,
    offset: u64,
    stream: &Stream,
    registry: &FilterRegistry,
) -> Result<(XrefStream, Dictionary)> {
    let dict = stream.dict();
    let size = dict
        .get_int("Size")
        .and_then(|s| u64::try_from(s).ok())
        .ok_or_else(|| Error::index("xref stream lacks a valid Size"))?;
    let w = int_array(dict, "W")?.ok_or_else(|| Error::index("xref stream lacks W"))?;
    let index = int_array(dict, "Index")?;
    let decoder = XrefStreamDecoder::new(&w, index.as_deref(), size)?;
    let data = stream.decoded_bytes(registry)?;
    let table = decoder.decode_all(&data)?;

    let mut trailer = dict.clone();
    for key in STREAM_KEYS {
        trailer.remove(key);
    }
    Ok((XrefStream { id, offset, table }, trailer))
}

/// Build an `/XRef` stream for `table`, carrying the entries of `trailer`.
pub fn build(table: &XrefTable, trailer: &Dictionary, registry: &FilterRegistry) -> Result<Stream> {
    let encoder = XrefStreamEncoder::new(table);
    let mut dict = trailer.clone();
    for key in STREAM_KEYS {
        dict.remove(key);
    }
    dict.insert("Type", Name::new("XRef"));
    dict.insert("W", encoder.w_array());
    dict.insert("Index", build_index(table));
    let mut stream = Stream::new(dict, encoder.encode_all(table));
    stream.set_filters(registry, &["FlateDecode"])?;
    stream.encode_with(registry)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_mixed_entries() {
        let decoder = XrefStreamDecoder::new(&[1, 2, 1], Some(&[0, 3]), 3).unwrap();
        let data = [0, 0, 0, 0, 1, 0, 10, 0, 2, 0, 4, 1];
        let table = decoder.decode_all(&data).unwrap();
        assert_eq!(table.get(0), Some(XrefEntry::free(0, 0)));
        assert_eq!(table.get(1), Some(XrefEntry::in_use(10, 0)));
        assert_eq!(table.get(2), Some(XrefEntry::compressed(4, 1)));
    }

    #[test]
    fn test_zero_type_width_defaults_to_in_use() {
        let decoder = XrefStreamDecoder::new(&[0, 2, 0], None, 2).unwrap();
        let table = decoder.decode_all(&[0, 9, 1, 0]).unwrap();
        assert_eq!(table.get(0), Some(XrefEntry::in_use(9, 0)));
        assert_eq!(table.get(1), Some(XrefEntry::in_use(256, 0)));
    }

    #[test]
    fn test_index_ranges() {
        let decoder = XrefStreamDecoder::new(&[1, 1, 1], Some(&[3, 1, 10, 1]), 11).unwrap();
        let table = decoder.decode_all(&[1, 5, 0, 1, 6, 0]).unwrap();
        assert_eq!(table.get(3), Some(XrefEntry::in_use(5, 0)));
        assert_eq!(table.get(10), Some(XrefEntry::in_use(6, 0)));
        assert!(!table.contains(4));
    }

    #[test]
    fn test_malformed_w_and_index() {
        assert!(XrefStreamDecoder::new(&[1, 2], None, 1).is_err());
        assert!(XrefStreamDecoder::new(&[1, -2, 1], None, 1).is_err());
        assert!(XrefStreamDecoder::new(&[1, 9, 1], None, 1).is_err());
        assert!(XrefStreamDecoder::new(&[1, 2, 1], Some(&[0, 1, 4]), 1).is_err());
    }

    #[test]
    fn test_exhausted_data() {
        let decoder = XrefStreamDecoder::new(&[1, 2, 1], Some(&[0, 3]), 3).unwrap();
        let err = decoder.decode_all(&[1, 0, 10, 0]).unwrap_err();
        assert!(matches!(err, Error::Index(_)));
    }

    #[test]
    fn test_encoder_widths() {
        let mut sub = XrefSubsection::new(0, 3);
        sub.add(XrefEntry::free(0, 65535));
        sub.add(XrefEntry::in_use(70_000, 0));
        sub.add(XrefEntry::compressed(5, 2));
        let mut table = XrefTable::new();
        table.add_subsection(sub);
        let encoder = XrefStreamEncoder::new(&table);
        assert_eq!(encoder.widths(), [1, 3, 2]);
        let data = encoder.encode_all(&table);
        assert_eq!(data.len(), 18);

        let decoder = XrefStreamDecoder::new(&[1, 3, 2], None, 3).unwrap();
        assert_eq!(decoder.decode_all(&data).unwrap().entries(), table.entries());
    }

    #[test]
    fn test_build_then_read() {
        let mut sub = XrefSubsection::new(0, 2);
        sub.add(XrefEntry::free(0, 65535));
        sub.add(XrefEntry::in_use(15, 0));
        let mut table = XrefTable::new();
        table.add_subsection(sub);
        let trailer = Dictionary::new().with("Size", 2).with("Root", ObjRef::new(1, 0));

        let registry = FilterRegistry::standard();
        let stream = build(&table, &trailer, registry).unwrap();
        assert!(stream.dict().is_type("XRef"));
        assert!(stream.is_encoded());

        let encoded = Stream::from_encoded(
            stream.dict().clone(),
            stream.encoded_data().unwrap().to_vec(),
        );
        let (xref, recovered) = read(ObjRef::new(2, 0), 40, &encoded, registry).unwrap();
        assert_eq!(xref.table.get(1), Some(XrefEntry::in_use(15, 0)));
        assert_eq!(recovered.get_ref("Root"), Some(ObjRef::new(1, 0)));
        assert!(!recovered.contains_key("W"));
        assert!(!recovered.contains_key("Type"));
    }
}
