//! Object model
//!
//! Direct objects are owned by exactly one container; moving a subtree into
//! another container moves it. The only repeatable edge in the graph is a
//! [`ObjRef`], which is a plain `Copy` value resolved through a
//! [`Document`](crate::pdf::document::Document).

mod array;
pub mod cache;
mod dict;
mod name;
pub mod schema;
mod stream;
mod string;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use array::{Array, ArraySchema};
pub use cache::ContentCache;
pub use dict::Dictionary;
pub use name::Name;
pub use stream::Stream;
pub use string::PdfString;

/// Reference to an indirect object: `(number, generation)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjRef {
    pub num: u64,
    pub generation: u32,
}

impl ObjRef {
    pub const fn new(num: u64, generation: u32) -> Self {
        Self { num, generation }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

/// Native representation of an object, used by schemas and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Null,
    Bool,
    Int,
    Real,
    /// Integer or real.
    Number,
    String,
    Name,
    Array,
    Dict,
    Stream,
    Ref,
    Any,
}

impl ObjectKind {
    /// Whether a value of this kind is acceptable. References are accepted
    /// everywhere since their target is not known without a document.
    pub fn accepts(self, obj: &Object) -> bool {
        let found = obj.kind();
        self == Self::Any
            || self == found
            || found == Self::Ref
            || (self == Self::Number && matches!(found, Self::Int | Self::Real))
            || (self == Self::Dict && found == Self::Stream)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Real => "real",
            Self::Number => "number",
            Self::String => "string",
            Self::Name => "name",
            Self::Array => "array",
            Self::Dict => "dictionary",
            Self::Stream => "stream",
            Self::Ref => "reference",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Object {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(PdfString),
    Name(Name),
    Array(Array),
    Dict(Dictionary),
    Stream(Stream),
    Ref(ObjRef),
}

impl Object {
    pub fn name(s: &str) -> Self {
        Object::Name(Name::new(s))
    }

    pub fn string(s: impl Into<PdfString>) -> Self {
        Object::String(s.into())
    }

    /// Explicit deep copy. The copy shares no mutable state with `self`.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Null => ObjectKind::Null,
            Object::Bool(_) => ObjectKind::Bool,
            Object::Int(_) => ObjectKind::Int,
            Object::Real(_) => ObjectKind::Real,
            Object::String(_) => ObjectKind::String,
            Object::Name(_) => ObjectKind::Name,
            Object::Array(_) => ObjectKind::Array,
            Object::Dict(_) => ObjectKind::Dict,
            Object::Stream(_) => ObjectKind::Stream,
            Object::Ref(_) => ObjectKind::Ref,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Object::Array(_) | Object::Dict(_) | Object::Stream(_))
    }

    /// Marked by the editor for hoisting into its own indirect object.
    /// Streams can never be direct, so they always count.
    pub fn is_marked_indirect(&self) -> bool {
        match self {
            Object::Array(a) => a.is_indirect(),
            Object::Dict(d) => d.is_indirect(),
            Object::Stream(_) => true,
            _ => false,
        }
    }

    pub fn clear_indirect_mark(&mut self) {
        match self {
            Object::Array(a) => a.set_indirect(false),
            Object::Dict(d) => d.set_indirect(false),
            _ => {}
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Object::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Option<ObjRef> {
        match self {
            Object::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or a stream.
    pub fn dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dict(d) => Some(d),
            Object::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    pub fn dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dict(d) => Some(d),
            Object::Stream(s) => Some(s.dict_mut()),
            _ => None,
        }
    }

    /// Content cache of a compound object, `None` for leaves.
    pub fn cache(&self) -> Option<&ContentCache> {
        match self {
            Object::Array(a) => Some(a.cache()),
            Object::Dict(d) => Some(d.cache()),
            Object::Stream(s) => Some(s.dict().cache()),
            _ => None,
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Bool(b)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Int(i64::from(i))
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Int(i)
    }
}

impl From<u32> for Object {
    fn from(i: u32) -> Self {
        Object::Int(i64::from(i))
    }
}

impl From<usize> for Object {
    fn from(i: usize) -> Self {
        Object::Int(i as i64)
    }
}

impl From<f64> for Object {
    fn from(r: f64) -> Self {
        Object::Real(r)
    }
}

impl From<Name> for Object {
    fn from(n: Name) -> Self {
        Object::Name(n)
    }
}

impl From<PdfString> for Object {
    fn from(s: PdfString) -> Self {
        Object::String(s)
    }
}

impl From<Array> for Object {
    fn from(a: Array) -> Self {
        Object::Array(a)
    }
}

impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(Array::from_vec(v))
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dict(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<ObjRef> for Object {
    fn from(r: ObjRef) -> Self {
        Object::Ref(r)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match crate::pdf::writer::serialize::to_bytes(self) {
            Ok(bytes) => f.write_str(&String::from_utf8_lossy(&bytes)),
            Err(e) => write!(f, "<{e}>"),
        }
    }
}
