// Clippy lints that are too pedantic for this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]

//! pdfgraph - object graph, revision chain and cross-reference engine
//!
//! This library reads, represents, mutates and re-serializes documents in
//! the PDF container format. It covers the in-memory object model, the
//! revision chain used for incremental updates, cross-reference indexes
//! (classic tables, compressed streams and hybrids), two parsing
//! strategies and the build pipeline that turns an edited graph back into
//! bytes.
//!
//! # Modules
//!
//! - `pdf` - objects, documents, parsers, cross-reference indexes and the writer
//! - `config` - parser and writer settings
//! - `error` - error taxonomy and diagnostics
//!
//! # Example
//!
//! ```
//! use pdfgraph::pdf::document::Document;
//! use pdfgraph::pdf::object::{Dictionary, Name, Object};
//!
//! let mut doc = Document::new();
//! let catalog = doc.insert(Dictionary::new().with("Type", Name::new("Catalog")));
//! doc.trailer_mut().set_root(catalog);
//!
//! let bytes = doc.save().unwrap();
//! let mut reloaded = Document::load(bytes).unwrap();
//! let root = reloaded.resolve(catalog).unwrap();
//! assert_eq!(root.dict().and_then(|d| d.get_name("Type")).map(Name::as_str), Some("Catalog"));
//! # let _ = Object::Null;
//! ```

pub mod config;
pub mod error;
pub mod pdf;

pub use config::Config;
pub use error::{Diagnostic, Error, Result};
pub use pdf::document::Document;
pub use pdf::object::{Array, Dictionary, Name, ObjRef, Object, PdfString, Stream};
