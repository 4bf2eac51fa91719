//! Writer: serialization and the build pipeline

pub mod physicalize;
pub mod serialize;

use std::ops::Range;

use crate::error::Result;
use crate::pdf::filter::FilterRegistry;
use crate::pdf::object::{ObjRef, Object};

pub use crate::config::{SaveOptions, XrefStyle};

/// Per-object lifecycle callbacks run while saving.
///
/// `pre_build` runs once numbers are assigned and before the object is
/// serialized; it may change the object. `post_build` runs after the
/// object's bytes are placed in the output and may patch them in place,
/// for content that depends on its own byte range.
pub trait BuildHook {
    fn pre_build(&mut self, _id: ObjRef, _object: &mut Object) -> Result<()> {
        Ok(())
    }

    fn post_build(&mut self, _id: ObjRef, _range: Range<usize>, _bytes: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// Built-in hook: encode pending stream payloads and set `Length`.
pub struct EncodeStreams<'a> {
    registry: &'a FilterRegistry,
}

impl<'a> EncodeStreams<'a> {
    pub fn new(registry: &'a FilterRegistry) -> Self {
        Self { registry }
    }
}

impl BuildHook for EncodeStreams<'_> {
    fn pre_build(&mut self, _id: ObjRef, object: &mut Object) -> Result<()> {
        if let Object::Stream(stream) = object {
            let length = stream.encode_with(self.registry)?.len();
            stream.dict_mut().insert("Length", length as i64);
        }
        Ok(())
    }
}
