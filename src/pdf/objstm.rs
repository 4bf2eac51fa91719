//! Object streams (`/Type /ObjStm`)
//!
//! A container stream packs several generation-0 objects. Its decoded
//! payload starts with `N` pairs `num offset`, followed at `/First` by the
//! objects themselves; offsets are relative to `/First`.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::object::{Dictionary, Name, ObjRef, Object, Stream};
use crate::pdf::parser::ObjectParser;
use crate::pdf::writer::serialize;

/// Decoded inner table of one container. Built once per container and
/// kept by the document.
#[derive(Debug, Clone)]
pub struct ObjectStreamIndex {
    first: usize,
    entries: Vec<(u64, usize)>,
    data: Bytes,
}

impl ObjectStreamIndex {
    pub fn parse(stream: &Stream, registry: &FilterRegistry) -> Result<Self> {
        let dict = stream.dict();
        let count = dict
            .get_int("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::structural(0, "object stream lacks N"))?;
        let first = dict
            .get_int("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::structural(0, "object stream lacks First"))?;
        let data = stream.decoded_bytes(registry)?;
        if first > data.len() {
            return Err(Error::structural(first as u64, "object stream First is past its data"));
        }

        let mut parser = ObjectParser::new(&data[..first]);
        let mut entries = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let num = parser.expect_int()?;
            let offset = parser.expect_int()?;
            match (u64::try_from(num), usize::try_from(offset)) {
                (Ok(num), Ok(offset)) => entries.push((num, offset)),
                _ => return Err(Error::structural(parser.pos() as u64, "negative entry in object stream header")),
            }
        }
        Ok(Self { first, entries, data })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn number_at(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|(num, _)| *num)
    }

    /// Position of object `num` inside the container.
    pub fn find(&self, num: u64) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == num)
    }

    pub fn numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|(num, _)| *num)
    }

    /// Parse the object stored at `index`.
    pub fn object_at(&self, index: usize, max_depth: usize) -> Result<(ObjRef, Object)> {
        let (num, offset) = *self
            .entries
            .get(index)
            .ok_or_else(|| Error::index(format!("object stream has no entry {index}")))?;
        let mut parser = ObjectParser::at(&self.data, self.first + offset).with_max_depth(max_depth);
        let object = parser.parse_object()?;
        Ok((ObjRef::new(num, 0), object))
    }
}

/// Accumulates objects and produces a container stream.
#[derive(Debug, Default)]
pub struct ObjectStreamBuilder {
    header: Vec<u8>,
    body: Vec<u8>,
    numbers: Vec<u64>,
}

impl ObjectStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append object `num`. Streams cannot be stored in a container.
    pub fn add(&mut self, num: u64, object: &Object) -> Result<usize> {
        if matches!(object, Object::Stream(_)) {
            return Err(Error::invariant(format!("object {num} is a stream and cannot be packed")));
        }
        if !self.header.is_empty() {
            self.header.push(b' ');
        }
        self.header.extend_from_slice(format!("{} {}", num, self.body.len()).as_bytes());
        serialize::write_object(object, &mut self.body)?;
        self.body.push(b'\n');
        self.numbers.push(num);
        Ok(self.numbers.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn numbers(&self) -> &[u64] {
        &self.numbers
    }

    pub fn build(self, registry: &FilterRegistry) -> Result<Stream> {
        let mut data = self.header;
        data.push(b'\n');
        let first = data.len();
        data.extend_from_slice(&self.body);

        let dict = Dictionary::new()
            .with("Type", Name::new("ObjStm"))
            .with("N", self.numbers.len())
            .with("First", first);
        let mut stream = Stream::new(dict, data);
        stream.set_filters(registry, &["FlateDecode"])?;
        stream.encode_with(registry)?;
        Ok(stream)
    }
}
