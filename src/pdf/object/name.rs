//! Interned names

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Interned name with shared storage.
///
/// Names repeat constantly (`Type`, `Length`, `Filter`, ...). Common ones
/// share a single `Arc<str>` so cloning and comparing them is cheap.
///
/// Names read from a file are byte sequences. When those bytes are not
/// UTF-8, `raw` keeps them so the name is written back unchanged, while
/// the text form is used for display and `&str` lookups.
#[derive(Debug, Clone, Eq)]
pub struct Name {
    text: Arc<str>,
    raw: Option<Arc<[u8]>>,
}

/// Keys and values the engine itself touches on every document.
const CORE_NAMES: &[&str] = &[
    "Type", "Subtype", "Length", "Filter", "DecodeParms", "DL",
    "Root", "Info", "Size", "Prev", "ID", "Encrypt", "XRefStm",
    "XRef", "W", "Index", "ObjStm", "N", "First", "Extends",
    "Catalog", "Pages", "Page", "Kids", "Parent", "Count", "Version",
    "FlateDecode", "LZWDecode", "ASCII85Decode", "ASCIIHexDecode", "RunLengthDecode",
    "Predictor", "Colors", "BitsPerComponent", "Columns", "EarlyChange",
    "Standard", "V", "R", "O", "U", "P", "CF", "StmF", "StrF", "Identity",
];

static COMMON_NAMES: LazyLock<HashMap<&'static str, Arc<str>>> =
    LazyLock::new(|| CORE_NAMES.iter().map(|name| (*name, Arc::from(*name))).collect());

impl Name {
    pub fn new(s: &str) -> Self {
        let text = match COMMON_NAMES.get(s) {
            Some(arc) => Arc::clone(arc),
            None => Arc::from(s),
        };
        Self { text, raw: None }
    }

    pub fn from_string(s: String) -> Self {
        let text = match COMMON_NAMES.get(s.as_str()) {
            Some(arc) => Arc::clone(arc),
            None => Arc::from(s),
        };
        Self { text, raw: None }
    }

    /// Name from its decoded bytes, as found after `#xx` unescaping.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => Self::new(s),
            Err(_) => Self {
                text: Arc::from(&*String::from_utf8_lossy(bytes)),
                raw: Some(Arc::from(bytes)),
            },
        }
    }

    /// Text form. Lossy for names whose bytes are not UTF-8.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Exact bytes of the name.
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_deref().unwrap_or(self.text.as_bytes())
    }

    /// Check if this shares storage with a pre-interned name
    pub fn is_interned(&self) -> bool {
        self.raw.is_none()
            && COMMON_NAMES
                .get(self.as_str())
                .is_some_and(|arc| Arc::ptr_eq(arc, &self.text))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.text, &other.text) && self.raw.is_none() && other.raw.is_none())
            || self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.as_ref().hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.text)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<&Name> for Name {
    fn from(n: &Name) -> Self {
        n.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_interned() {
        let a = Name::new("Type");
        let b = Name::from_string("Type".to_string());
        assert!(a.is_interned());
        assert!(Arc::ptr_eq(&a.text, &b.text));
    }

    #[test]
    fn test_name_not_interned() {
        let a = Name::new("MyCustomKey");
        assert!(!a.is_interned());
        assert_eq!(a, Name::new("MyCustomKey"));
    }

    #[test]
    fn test_name_display() {
        assert_eq!(Name::new("Catalog").to_string(), "/Catalog");
    }

    #[test]
    fn test_name_borrow_lookup() {
        let mut map = HashMap::new();
        map.insert(Name::new("Size"), 3);
        assert_eq!(map.get("Size"), Some(&3));
    }

    #[test]
    fn test_name_compare_str() {
        assert!(Name::new("XRef") == "XRef");
        assert!(Name::new("A") < Name::new("B"));
    }

    #[test]
    fn test_non_utf8_name_keeps_bytes() {
        let name = Name::from_bytes(b"Caf\xE9");
        assert_eq!(name.as_bytes(), b"Caf\xE9");
        assert_eq!(name.as_str(), "Caf\u{FFFD}");
        assert_ne!(name, Name::new("Caf\u{FFFD}"));
        assert_eq!(name, Name::from_bytes(b"Caf\xE9"));
        assert!(!name.is_interned());
    }

    #[test]
    fn test_utf8_bytes_make_plain_name() {
        let name = Name::from_bytes(b"Type");
        assert!(name.is_interned());
        assert_eq!(name, Name::new("Type"));
    }
}
