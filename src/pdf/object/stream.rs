//! Streams: a dictionary plus a byte payload

use bytes::Bytes;

use super::{Dictionary, Name, Object};
use crate::error::{Error, Result};
use crate::pdf::filter::FilterRegistry;

/// A stream object.
///
/// The payload is held in encoded form (as stored in the file), decoded
/// form (as produced by the filter chain), or both once one has been
/// derived from the other. At least one is always present.
#[derive(Debug, Clone)]
pub struct Stream {
    dict: Dictionary,
    encoded: Option<Bytes>,
    decoded: Option<Bytes>,
}

impl Stream {
    /// Stream authored in memory from raw (decoded) content.
    pub fn new(dict: Dictionary, data: impl Into<Bytes>) -> Self {
        Self {
            dict,
            encoded: None,
            decoded: Some(data.into()),
        }
    }

    /// Stream as read from a file; `data` is still filtered.
    pub fn from_encoded(mut dict: Dictionary, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        dict.insert("Length", data.len() as i64);
        Self {
            dict,
            encoded: Some(data),
            decoded: None,
        }
    }

    pub fn dict(&self) -> &Dictionary {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.dict
    }

    pub fn into_parts(self) -> (Dictionary, Option<Bytes>, Option<Bytes>) {
        (self.dict, self.encoded, self.decoded)
    }

    pub fn encoded_data(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }

    pub fn decoded_data(&self) -> Option<&[u8]> {
        self.decoded.as_deref()
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded.is_some()
    }

    /// Declared filter names, in decode order.
    pub fn filters(&self) -> Vec<Name> {
        match self.dict.get("Filter") {
            Some(Object::Name(n)) => vec![n.clone()],
            Some(Object::Array(a)) => a.iter().filter_map(Object::as_name).cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Replace the decoded content. The encoded form is dropped and will be
    /// regenerated by [`encode`](Self::encode) or at save time.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.decoded = Some(data.into());
        self.encoded = None;
    }

    /// Replace the encoded content, dropping any decoded form.
    pub fn set_encoded(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        self.dict.insert("Length", data.len() as i64);
        self.encoded = Some(data);
        self.decoded = None;
    }

    /// Change the filter chain. Content is decoded first with the current
    /// chain so it can be re-encoded with the new one.
    pub fn set_filters(&mut self, registry: &FilterRegistry, filters: &[&str]) -> Result<()> {
        self.decode_with(registry)?;
        self.encoded = None;
        self.dict.remove("DecodeParms");
        match filters {
            [] => {
                self.dict.remove("Filter");
            }
            [single] => {
                self.dict.insert("Filter", Name::new(single));
            }
            many => {
                let names: Vec<Object> = many.iter().map(|f| Object::Name(Name::new(f))).collect();
                self.dict.insert("Filter", names);
            }
        }
        Ok(())
    }

    pub fn decode(&mut self) -> Result<&[u8]> {
        self.decode_with(FilterRegistry::standard())
    }

    /// Run the filter chain over the encoded payload. Idempotent: once a
    /// decoded form exists it is returned as is.
    pub fn decode_with(&mut self, registry: &FilterRegistry) -> Result<&[u8]> {
        if self.decoded.is_none() {
            let raw = self
                .encoded
                .as_ref()
                .ok_or_else(|| Error::filter("stream has no payload"))?;
            let out = registry.decode(&self.dict, raw)?;
            self.decoded = Some(Bytes::from(out));
        }
        Ok(self.decoded.as_deref().unwrap_or_default())
    }

    pub fn encode(&mut self) -> Result<&[u8]> {
        self.encode_with(FilterRegistry::standard())
    }

    /// Apply the filter chain in reverse to produce the encoded payload
    /// and refresh `Length`.
    pub fn encode_with(&mut self, registry: &FilterRegistry) -> Result<&[u8]> {
        if self.encoded.is_none() {
            let raw = self
                .decoded
                .as_ref()
                .ok_or_else(|| Error::filter("stream has no payload"))?;
            let out = Bytes::from(registry.encode(&self.dict, raw)?);
            self.dict.insert("Length", out.len() as i64);
            self.encoded = Some(out);
        }
        Ok(self.encoded.as_deref().unwrap_or_default())
    }

    /// Decoded content without caching it, for read-only contexts.
    pub fn decoded_bytes(&self, registry: &FilterRegistry) -> Result<Bytes> {
        match (&self.decoded, &self.encoded) {
            (Some(d), _) => Ok(d.clone()),
            (None, Some(e)) => Ok(Bytes::from(registry.decode(&self.dict, e)?)),
            (None, None) => Err(Error::filter("stream has no payload")),
        }
    }

    /// Drop whichever side can be regenerated, keeping the encoded form.
    pub fn release_decoded(&mut self) {
        if self.encoded.is_some() {
            self.decoded = None;
        }
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        if self.dict != other.dict {
            return false;
        }
        match (&self.decoded, &other.decoded, &self.encoded, &other.encoded) {
            (Some(a), Some(b), _, _) => a == b,
            (_, _, Some(a), Some(b)) => a == b,
            _ => {
                let registry = FilterRegistry::standard();
                match (self.decoded_bytes(registry), other.decoded_bytes(registry)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_encode_sets_length() {
        let mut stream = Stream::new(Dictionary::new(), &b"hello"[..]);
        assert!(!stream.is_encoded());
        let encoded = stream.encode().unwrap().to_vec();
        assert_eq!(encoded, b"hello");
        assert_eq!(stream.dict().get_int("Length"), Some(5));
    }

    #[test]
    fn test_stream_decode_is_idempotent() {
        let dict = Dictionary::new().with("Filter", Name::new("ASCIIHexDecode"));
        let mut stream = Stream::from_encoded(dict, &b"48656C6C6F>"[..]);
        assert_eq!(stream.decode().unwrap(), b"Hello");
        assert_eq!(stream.decode().unwrap(), b"Hello");
    }

    #[test]
    fn test_stream_set_filters_roundtrip() {
        let registry = FilterRegistry::standard();
        let mut stream = Stream::new(Dictionary::new(), &b"aaaaaaaaaabbbbbbbbbb"[..]);
        stream.set_filters(registry, &["FlateDecode"]).unwrap();
        let encoded = stream.encode().unwrap().to_vec();
        let mut copy = Stream::from_encoded(stream.dict().clone(), encoded);
        assert_eq!(copy.decode().unwrap(), b"aaaaaaaaaabbbbbbbbbb");
        assert_eq!(copy.filters(), vec![Name::new("FlateDecode")]);
    }

    #[test]
    fn test_stream_equality_across_forms() {
        let dict = Dictionary::new().with("Filter", Name::new("ASCIIHexDecode"));
        let mut authored = Stream::new(dict.clone(), &b"AB"[..]);
        authored.encode().unwrap();
        let parsed = Stream::from_encoded(authored.dict().clone(), authored.encoded_data().unwrap().to_vec());
        assert_eq!(authored, parsed);
    }

    #[test]
    fn test_stream_without_payload_errors_on_decode() {
        let mut stream = Stream::new(Dictionary::new(), Bytes::new());
        stream.decoded = None;
        assert!(stream.decode().is_err());
    }
}
