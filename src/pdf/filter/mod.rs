//! Stream filters
//!
//! Codecs are plugged in through the [`StreamFilter`] trait and selected by
//! the `Filter` chain declared in a stream's dictionary. Decoding applies
//! the chain in order, encoding applies it in reverse.

mod ascii;
mod flate;
mod lzw;
pub mod params;
pub mod predictor;
mod runlength;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::{Error, Result};
use crate::pdf::object::{Dictionary, Object};

pub use ascii::{Ascii85, AsciiHex};
pub use flate::Flate;
pub use lzw::Lzw;
pub use runlength::RunLength;

/// A byte transform selected by name.
pub trait StreamFilter: Send + Sync {
    /// Canonical filter name, without the leading slash.
    fn name(&self) -> &str;

    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>>;

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>>;
}

/// Filters built into the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    FlateDecode,
    LZWDecode,
    ASCII85Decode,
    ASCIIHexDecode,
    RunLengthDecode,
}

impl FilterType {
    /// Parse a filter name, accepting the inline-image abbreviations.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FlateDecode" | "Fl" => Some(Self::FlateDecode),
            "LZWDecode" | "LZW" => Some(Self::LZWDecode),
            "ASCII85Decode" | "A85" => Some(Self::ASCII85Decode),
            "ASCIIHexDecode" | "AHx" => Some(Self::ASCIIHexDecode),
            "RunLengthDecode" | "RL" => Some(Self::RunLengthDecode),
            _ => None,
        }
    }

    pub fn to_name(self) -> &'static str {
        match self {
            Self::FlateDecode => "FlateDecode",
            Self::LZWDecode => "LZWDecode",
            Self::ASCII85Decode => "ASCII85Decode",
            Self::ASCIIHexDecode => "ASCIIHexDecode",
            Self::RunLengthDecode => "RunLengthDecode",
        }
    }
}

static STANDARD: LazyLock<FilterRegistry> = LazyLock::new(FilterRegistry::new);

#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn StreamFilter>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    /// Registry with the built-in codecs.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Flate::default()));
        registry.register(Arc::new(Lzw));
        registry.register(Arc::new(Ascii85));
        registry.register(Arc::new(AsciiHex));
        registry.register(Arc::new(RunLength));
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Shared registry with the built-in codecs.
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Add or replace a filter under its canonical name.
    pub fn register(&mut self, filter: Arc<dyn StreamFilter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&dyn StreamFilter> {
        let canonical = match FilterType::from_name(name) {
            Some(t) => t.to_name(),
            None => name,
        };
        self.filters.get(canonical).map(AsRef::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Resolve the `Filter`/`DecodeParms` pair of a stream dictionary into
    /// codecs and their parameters, in decode order.
    pub fn chain<'a>(
        &'a self,
        dict: &'a Dictionary,
    ) -> Result<Vec<(&'a dyn StreamFilter, Option<&'a Dictionary>)>> {
        let names: Vec<&str> = match dict.get("Filter") {
            None | Some(Object::Null) => return Ok(Vec::new()),
            Some(Object::Name(n)) => vec![n.as_str()],
            Some(Object::Array(a)) => a
                .iter()
                .map(|o| {
                    o.as_name()
                        .map(|n| n.as_str())
                        .ok_or_else(|| Error::filter(format!("filter entry {o} is not a name")))
                })
                .collect::<Result<_>>()?,
            Some(other) => return Err(Error::filter(format!("invalid /Filter {other}"))),
        };
        let params: Vec<Option<&Dictionary>> = match dict.get("DecodeParms") {
            Some(Object::Dict(d)) => vec![Some(d)],
            Some(Object::Array(a)) => a.iter().map(Object::as_dict).collect(),
            _ => Vec::new(),
        };
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let filter = self
                    .get(name)
                    .ok_or_else(|| Error::filter(format!("unsupported filter /{name}")))?;
                Ok((filter, params.get(i).copied().flatten()))
            })
            .collect()
    }

    pub fn decode(&self, dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
        let chain = self.chain(dict)?;
        let mut out = data.to_vec();
        for (filter, params) in chain {
            out = filter.decode(&out, params)?;
        }
        Ok(out)
    }

    pub fn encode(&self, dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
        let chain = self.chain(dict)?;
        let mut out = data.to_vec();
        for (filter, params) in chain.into_iter().rev() {
            out = filter.encode(&out, params)?;
        }
        Ok(out)
    }
}
