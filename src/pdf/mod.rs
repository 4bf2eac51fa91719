//! Object model, documents, parsers and the writer

pub mod crypt;
pub mod document;
pub mod filter;
pub mod graph;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod revision;
pub mod writer;
pub mod xref;
