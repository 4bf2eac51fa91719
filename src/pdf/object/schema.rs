//! Schemas for the structural dictionaries the engine relies on
//!
//! A schema is a static table of fields. Specialization is a `parent` link
//! to the more general schema, and lookups walk child first. Casting checks
//! the native representation and the fingerprint fields (fixed name values
//! such as `/Type /ObjStm`); validation reports problems as
//! [`SchemaWarning`]s, never as errors.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ArraySchema, Dictionary, Name, Object, ObjectKind};
use crate::error::{Error, Result};

/// Format version, as written in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(1, 7)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Name(&'static str),
    Int(i64),
    Bool(bool),
}

impl DefaultValue {
    pub fn to_object(self) -> Object {
        match self {
            Self::Name(n) => Object::Name(Name::new(n)),
            Self::Int(i) => Object::Int(i),
            Self::Bool(b) => Object::Bool(b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: ObjectKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    /// Fixed name value identifying the schema.
    pub fingerprint: Option<&'static str>,
    pub since: Option<Version>,
    pub array: Option<ArraySchema>,
    /// Schema of a nested dictionary, followed when propagating.
    pub schema: Option<&'static Schema>,
}

const fn field(key: &'static str, kind: ObjectKind) -> FieldSpec {
    FieldSpec {
        key,
        kind,
        required: false,
        default: None,
        fingerprint: None,
        since: None,
        array: None,
        schema: None,
    }
}

impl FieldSpec {
    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    const fn fingerprint(mut self, value: &'static str) -> Self {
        self.fingerprint = Some(value);
        self
    }

    const fn since(mut self, major: u8, minor: u8) -> Self {
        self.since = Some(Version::new(major, minor));
        self
    }

    const fn array(mut self, schema: ArraySchema) -> Self {
        self.array = Some(schema);
        self
    }

    const fn schema(mut self, schema: &'static Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    /// `Dict` or `Stream`.
    pub native: ObjectKind,
    pub parent: Option<&'static Schema>,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    /// Field lookup, most specific schema first.
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        let mut current = Some(self);
        while let Some(schema) = current {
            if let Some(f) = schema.fields.iter().find(|f| f.key == key) {
                return Some(f);
            }
            current = schema.parent;
        }
        None
    }

    /// Every field visible through this schema, overridden ones once.
    pub fn all_fields(&self) -> Vec<&'static FieldSpec> {
        let mut out: Vec<&'static FieldSpec> = Vec::new();
        let mut current = Some(self);
        while let Some(schema) = current {
            for f in schema.fields {
                if !out.iter().any(|seen| seen.key == f.key) {
                    out.push(f);
                }
            }
            current = schema.parent;
        }
        out
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent;
        while let Some(schema) = current {
            depth += 1;
            current = schema.parent;
        }
        depth
    }

    pub fn is_a(&self, other: &Self) -> bool {
        let mut current = Some(self);
        while let Some(schema) = current {
            if std::ptr::eq(schema, other) {
                return true;
            }
            current = schema.parent;
        }
        false
    }

    fn fingerprints(&self) -> Vec<(&'static str, &'static str)> {
        self.all_fields()
            .into_iter()
            .filter_map(|f| f.fingerprint.map(|v| (f.key, v)))
            .collect()
    }

    fn native_matches(&self, obj: &Object) -> bool {
        match self.native {
            ObjectKind::Stream => matches!(obj, Object::Stream(_)),
            _ => matches!(obj, Object::Dict(_)),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub static TRAILER: Schema = Schema {
    name: "Trailer",
    native: ObjectKind::Dict,
    parent: None,
    fields: &[
        field("Size", ObjectKind::Int).required(),
        field("Root", ObjectKind::Dict).required().schema(&CATALOG),
        field("Prev", ObjectKind::Int),
        field("Encrypt", ObjectKind::Dict).schema(&ENCRYPT),
        field("Info", ObjectKind::Dict),
        field("ID", ObjectKind::Array).array(ArraySchema::fixed(ObjectKind::String, 2)),
        field("XRefStm", ObjectKind::Int).since(1, 5),
    ],
};

pub static CATALOG: Schema = Schema {
    name: "Catalog",
    native: ObjectKind::Dict,
    parent: None,
    fields: &[
        field("Type", ObjectKind::Name).required().fingerprint("Catalog"),
        field("Version", ObjectKind::Name).since(1, 4),
        field("Pages", ObjectKind::Dict).required().schema(&PAGES),
    ],
};

pub static PAGES: Schema = Schema {
    name: "Pages",
    native: ObjectKind::Dict,
    parent: None,
    fields: &[
        field("Type", ObjectKind::Name).required().fingerprint("Pages"),
        field("Parent", ObjectKind::Dict),
        field("Kids", ObjectKind::Array).required().array(ArraySchema::of(ObjectKind::Dict)),
        field("Count", ObjectKind::Int).required().default(DefaultValue::Int(0)),
    ],
};

pub static PAGE: Schema = Schema {
    name: "Page",
    native: ObjectKind::Dict,
    parent: None,
    fields: &[
        field("Type", ObjectKind::Name).required().fingerprint("Page"),
        field("Parent", ObjectKind::Dict).required(),
        field("Resources", ObjectKind::Dict),
        field("MediaBox", ObjectKind::Array).array(ArraySchema::fixed(ObjectKind::Number, 4)),
    ],
};

pub static STREAM: Schema = Schema {
    name: "Stream",
    native: ObjectKind::Stream,
    parent: None,
    fields: &[
        field("Length", ObjectKind::Int).required(),
        field("Filter", ObjectKind::Any),
        field("DecodeParms", ObjectKind::Any),
        field("DL", ObjectKind::Int).since(1, 5),
    ],
};

pub static OBJECT_STREAM: Schema = Schema {
    name: "ObjStm",
    native: ObjectKind::Stream,
    parent: Some(&STREAM),
    fields: &[
        field("Type", ObjectKind::Name).required().fingerprint("ObjStm").since(1, 5),
        field("N", ObjectKind::Int).required(),
        field("First", ObjectKind::Int).required(),
        field("Extends", ObjectKind::Stream),
    ],
};

pub static XREF_STREAM: Schema = Schema {
    name: "XRef",
    native: ObjectKind::Stream,
    parent: Some(&STREAM),
    fields: &[
        field("Type", ObjectKind::Name).required().fingerprint("XRef").since(1, 5),
        field("Size", ObjectKind::Int).required(),
        field("Index", ObjectKind::Array).array(ArraySchema::of(ObjectKind::Int)),
        field("Prev", ObjectKind::Int),
        field("W", ObjectKind::Array).required().array(ArraySchema::fixed(ObjectKind::Int, 3)),
        field("Root", ObjectKind::Dict).schema(&CATALOG),
        field("Encrypt", ObjectKind::Dict).schema(&ENCRYPT),
        field("Info", ObjectKind::Dict),
        field("ID", ObjectKind::Array).array(ArraySchema::fixed(ObjectKind::String, 2)),
    ],
};

pub static ENCRYPT: Schema = Schema {
    name: "Encrypt",
    native: ObjectKind::Dict,
    parent: None,
    fields: &[
        field("Filter", ObjectKind::Name).required().default(DefaultValue::Name("Standard")),
        field("V", ObjectKind::Int).default(DefaultValue::Int(0)),
        field("Length", ObjectKind::Int).default(DefaultValue::Int(40)).since(1, 4),
        field("R", ObjectKind::Int).required(),
        field("O", ObjectKind::String).required(),
        field("U", ObjectKind::String).required(),
        field("P", ObjectKind::Int).required(),
        field("EncryptMetadata", ObjectKind::Bool).default(DefaultValue::Bool(true)).since(1, 5),
    ],
};

/// Schemas considered when guessing a type, most specific first.
pub static KNOWN_SCHEMAS: &[&Schema] = &[&OBJECT_STREAM, &XREF_STREAM, &CATALOG, &PAGES, &PAGE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    Missing,
    WrongType { expected: ObjectKind, found: ObjectKind },
    Length { expected: usize, found: usize },
    Version { required: Version, actual: Version },
}

/// Non-fatal schema problem at a key path such as `Root.Pages.Count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWarning {
    pub path: String,
    pub kind: WarningKind,
}

impl SchemaWarning {
    pub fn new(path: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::Missing => write!(f, "{}: required field missing", self.path),
            WarningKind::WrongType { expected, found } => {
                write!(f, "{}: expected {}, found {}", self.path, expected, found)
            }
            WarningKind::Length { expected, found } => {
                write!(f, "{}: expected {} elements, found {}", self.path, expected, found)
            }
            WarningKind::Version { required, actual } => {
                write!(f, "{}: requires version {}, document is {}", self.path, required, actual)
            }
        }
    }
}

/// An object viewed through a schema.
#[derive(Debug, Clone)]
pub struct Typed {
    schema: &'static Schema,
    object: Object,
}

/// Narrow `object` to `schema`.
///
/// Fails with [`Error::Type`] when the native representation differs (an
/// array cannot become a catalog, a dictionary cannot become a stream
/// type) or when a fingerprint field holds a different value.
pub fn cast(object: Object, schema: &'static Schema) -> Result<Typed> {
    if !schema.native_matches(&object) {
        return Err(Error::type_error(format!(
            "cannot cast {} to {} (expected {})",
            object.kind(),
            schema.name,
            schema.native
        )));
    }
    if let Some(dict) = object.dict() {
        for (key, value) in schema.fingerprints() {
            if let Some(found) = dict.get(key) {
                if found.as_name().map(Name::as_str) != Some(value) {
                    return Err(Error::type_error(format!(
                        "{} has /{} {}, not /{}",
                        schema.name, key, found, value
                    )));
                }
            }
        }
    }
    Ok(Typed { schema, object })
}

/// Most specific known schema whose fingerprints all match `object`.
pub fn guess(object: &Object) -> Option<&'static Schema> {
    let dict = object.dict()?;
    KNOWN_SCHEMAS
        .iter()
        .copied()
        .filter(|schema| schema.native_matches(object))
        .filter(|schema| {
            let prints = schema.fingerprints();
            !prints.is_empty()
                && prints
                    .iter()
                    .all(|(key, value)| dict.get_name(key).is_some_and(|n| n == value))
        })
        .max_by_key(|schema| schema.depth())
}

/// Check `dict` against `schema`, prefixing paths with `path`.
pub fn validate(
    dict: &Dictionary,
    schema: &'static Schema,
    version: Option<Version>,
    propagate: bool,
    path: &str,
) -> Vec<SchemaWarning> {
    let mut warnings = Vec::new();
    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };
    for spec in schema.all_fields() {
        let Some(value) = dict.get(spec.key) else {
            if spec.required && spec.default.is_none() {
                warnings.push(SchemaWarning::new(join(spec.key), WarningKind::Missing));
            }
            continue;
        };
        if !spec.kind.accepts(value) {
            warnings.push(SchemaWarning::new(
                join(spec.key),
                WarningKind::WrongType {
                    expected: spec.kind,
                    found: value.kind(),
                },
            ));
            continue;
        }
        if let (Some(required), Some(actual)) = (spec.since, version) {
            if actual < required {
                warnings.push(SchemaWarning::new(
                    join(spec.key),
                    WarningKind::Version { required, actual },
                ));
            }
        }
        if let (Some(array_schema), Object::Array(arr)) = (spec.array, value) {
            warnings.extend(arr.validate_against(array_schema, &join(spec.key)));
        }
        if propagate {
            if let (Some(nested), Some(sub)) = (spec.schema, value.as_dict()) {
                warnings.extend(validate(sub, nested, version, propagate, &join(spec.key)));
            }
        }
    }
    warnings
}

impl Typed {
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn into_inner(self) -> Object {
        self.object
    }

    /// Field value, falling back to the declared default.
    pub fn get(&self, key: &str) -> Option<Cow<'_, Object>> {
        if let Some(value) = self.object.dict().and_then(|d| d.get(key)) {
            return Some(Cow::Borrowed(value));
        }
        self.schema
            .field(key)
            .and_then(|f| f.default)
            .map(|d| Cow::Owned(d.to_object()))
    }

    pub fn validate(&self, version: Option<Version>, propagate: bool) -> Vec<SchemaWarning> {
        match self.object.dict() {
            Some(dict) => validate(dict, self.schema, version, propagate, ""),
            None => Vec::new(),
        }
    }

    /// Write defaults of missing required fields into the object.
    /// Returns how many fields were added.
    pub fn apply_defaults(&mut self) -> usize {
        let Some(dict) = self.object.dict_mut() else {
            return 0;
        };
        let mut added = 0;
        for spec in self.schema.all_fields() {
            if let (true, Some(default)) = (spec.required, spec.default) {
                if !dict.contains_key(spec.key) {
                    dict.insert(spec.key, default.to_object());
                    added += 1;
                }
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::object::{Array, ObjRef, Stream};

    fn obj_stream_dict() -> Dictionary {
        Dictionary::new()
            .with("Type", Name::new("ObjStm"))
            .with("N", 2)
            .with("First", 10)
    }

    #[test]
    fn test_cast_native_mismatch_is_error() {
        let err = cast(Object::from(Array::new()), &CATALOG).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        let err = cast(Object::from(obj_stream_dict()), &OBJECT_STREAM).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_cast_fingerprint_mismatch_is_error() {
        let dict = Dictionary::new().with("Type", Name::new("Pages"));
        assert!(cast(Object::from(dict), &CATALOG).is_err());
    }

    #[test]
    fn test_cast_and_default() {
        let dict = Dictionary::new().with("Type", Name::new("Pages")).with("Kids", Array::new());
        let mut typed = cast(Object::from(dict), &PAGES).unwrap();
        assert_eq!(typed.get("Count").as_deref(), Some(&Object::Int(0)));
        assert_eq!(typed.apply_defaults(), 1);
        assert_eq!(typed.object().dict().and_then(|d| d.get_int("Count")), Some(0));
        assert!(typed.validate(None, false).is_empty());
    }

    #[test]
    fn test_guess_prefers_specific_stream_schema() {
        let stream = Object::from(Stream::new(obj_stream_dict(), &b""[..]));
        assert_eq!(guess(&stream).map(|s| s.name), Some("ObjStm"));
        assert!(OBJECT_STREAM.is_a(&STREAM));
        assert_eq!(OBJECT_STREAM.field("Length").map(|f| f.key), Some("Length"));
    }

    #[test]
    fn test_guess_requires_fingerprint() {
        let dict = Object::from(Dictionary::new().with("Size", 3));
        assert!(guess(&dict).is_none());
        let catalog = Object::from(Dictionary::new().with("Type", Name::new("Catalog")));
        assert_eq!(guess(&catalog).map(|s| s.name), Some("Catalog"));
    }

    #[test]
    fn test_validate_missing_and_wrong_type() {
        let dict = Dictionary::new().with("Type", Name::new("Catalog")).with("Version", 5);
        let warnings = validate(&dict, &CATALOG, None, false, "Root");
        assert!(warnings.iter().any(|w| w.path == "Root.Pages" && w.kind == WarningKind::Missing));
        assert!(warnings.iter().any(|w| w.path == "Root.Version"
            && matches!(w.kind, WarningKind::WrongType { .. })));
    }

    #[test]
    fn test_validate_version() {
        let dict = Dictionary::new()
            .with("Size", 3)
            .with("Root", ObjRef::new(1, 0))
            .with("XRefStm", 100);
        let warnings = validate(&dict, &TRAILER, Some(Version::new(1, 4)), false, "");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("requires version 1.5"));
    }

    #[test]
    fn test_validate_propagates_into_direct_dicts() {
        let catalog = Dictionary::new()
            .with("Type", Name::new("Catalog"))
            .with("Pages", Dictionary::new().with("Type", Name::new("Pages")));
        let shallow = validate(&catalog, &CATALOG, None, false, "");
        let deep = validate(&catalog, &CATALOG, None, true, "");
        assert!(shallow.is_empty());
        assert_eq!(deep, vec![SchemaWarning::new("Pages.Kids", WarningKind::Missing)]);
    }
}
