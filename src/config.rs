//! Parser and writer settings
//!
//! Everything that used to be a process-wide switch lives here and is
//! handed to [`Document`](crate::pdf::document::Document) at construction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Which parsing strategy to use when loading a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ParserMode {
    /// Front-to-back pass, every object materialized up front.
    Sequential,
    /// Walk the cross-reference chain from the end, load objects on demand.
    #[default]
    Lazy,
}

/// Shape of the cross-reference section written for each revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum XrefStyle {
    /// Classic `xref` table followed by a `trailer` dictionary.
    #[default]
    Table,
    /// Cross-reference stream whose dictionary doubles as the trailer.
    Stream,
    /// Table plus a companion stream reachable through `XRefStm`.
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    pub xref_style: XrefStyle,
    /// Pack eligible objects into a container stream per revision.
    /// Ignored for [`XrefStyle::Table`].
    pub object_streams: bool,
    /// Append new revisions to the loaded bytes instead of rewriting.
    pub incremental: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            xref_style: XrefStyle::Table,
            object_streams: false,
            incremental: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parser: ParserMode,
    /// Unresolvable references are errors instead of null substitutes.
    pub strict_references: bool,
    /// Skip malformed objects and rebuild broken indexes instead of aborting.
    pub recover: bool,
    /// Guess a schema for loaded dictionaries and record schema warnings.
    pub guess_types: bool,
    /// Validation descends into direct sub-dictionaries with a declared schema.
    pub propagate_types: bool,
    pub max_depth: usize,
    pub save: SaveOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parser: ParserMode::Lazy,
            strict_references: false,
            recover: true,
            guess_types: true,
            propagate_types: true,
            max_depth: 256,
            save: SaveOptions::default(),
        }
    }
}

impl Config {
    /// Fail loudly: strict references, no recovery.
    pub fn strict() -> Self {
        Self {
            strict_references: true,
            recover: false,
            ..Self::default()
        }
    }

    /// Best-effort extraction from damaged input.
    pub fn lenient() -> Self {
        Self {
            strict_references: false,
            recover: true,
            ..Self::default()
        }
    }

    pub fn with_parser(mut self, parser: ParserMode) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_save_options(mut self, save: SaveOptions) -> Self {
        self.save = save;
        self
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.parser, ParserMode::Lazy);
        assert!(!config.strict_references);
        assert!(config.recover);
        assert_eq!(config.save.xref_style, XrefStyle::Table);
    }

    #[test]
    fn test_config_partial_json() {
        let config = Config::from_json(r#"{"strict_references": true, "save": {"xref_style": "Hybrid"}}"#).unwrap();
        assert!(config.strict_references);
        assert!(config.recover);
        assert_eq!(config.save.xref_style, XrefStyle::Hybrid);
        assert!(!config.save.object_streams);
    }

    #[test]
    fn test_config_bad_json() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn test_config_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdfgraph.json");
        let config = Config::strict().with_parser(ParserMode::Sequential);
        config.store(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
