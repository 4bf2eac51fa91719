//! Document: the revision chain plus everything needed to resolve it
//!
//! A document owns its revisions (oldest first), the source bytes they were
//! read from, and the collaborators used while loading and saving: filter
//! registry, security handler and build hooks.
//!
//! References are resolved newest revision first. The first revision that
//! says anything about an object number decides: a body object, a free
//! mark or an index entry. Objects found through an index are parsed on
//! demand and cached in the body of the revision that declared them, so a
//! second lookup is a body hit.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use md5::{Digest, Md5};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ParserMode, SaveOptions};
use crate::error::{Diagnostic, Error, Result};
use crate::pdf::crypt::{self, CryptMethod, Direction, SecurityHandler, StandardSecurity};
use crate::pdf::filter::FilterRegistry;
use crate::pdf::object::schema::{self, Version};
use crate::pdf::object::{Dictionary, ObjRef, Object, PdfString};
use crate::pdf::objstm::ObjectStreamIndex;
use crate::pdf::parser::{ObjectParser, ParsedObject, lazy, recover, sequential};
use crate::pdf::revision::{IndirectObject, Location, Revision, Slot, Trailer};
use crate::pdf::writer::{BuildHook, physicalize};
use crate::pdf::xref::{self, XrefEntry};

static NULL: Object = Object::Null;

/// Containers nested inside containers deeper than this are rejected.
const MAX_CONTAINER_DEPTH: usize = 32;

/// Where resolved objects came from, for tests and tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Lookups answered from a revision body.
    pub body_hits: u64,
    /// Objects parsed at an index offset.
    pub offset_loads: u64,
    /// Objects parsed out of a container stream.
    pub container_loads: u64,
    /// Lookups no revision declared, answered by scanning containers.
    pub fallback_scans: u64,
}

pub struct Document {
    pub(crate) version: Version,
    pub(crate) header_offset: usize,
    /// Oldest first. Never empty.
    pub(crate) revisions: Vec<Revision>,
    pub(crate) config: Config,
    pub(crate) source: Option<Bytes>,
    /// How many leading revisions exist in `source`.
    pub(crate) parsed_revisions: usize,
    /// A parsed revision was removed or merged; `source` no longer matches.
    pub(crate) history_rewritten: bool,
    pub(crate) security: Option<Box<dyn SecurityHandler>>,
    pub(crate) encrypt_ref: Option<ObjRef>,
    pub(crate) hooks: Vec<Box<dyn BuildHook>>,
    registry: Option<Arc<FilterRegistry>>,
    containers: HashMap<u64, ObjectStreamIndex>,
    markers: Option<BTreeMap<u64, (u32, u64)>>,
    diagnostics: Vec<Diagnostic>,
    next_number: u64,
    stats: Stats,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("revisions", &self.revisions.len())
            .field("parsed_revisions", &self.parsed_revisions)
            .field("encrypted", &self.security.is_some())
            .field("hooks", &self.hooks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document with a single, empty revision.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            version: Version::default(),
            header_offset: 0,
            revisions: vec![Revision::new()],
            config,
            source: None,
            parsed_revisions: 0,
            history_rewritten: false,
            security: None,
            encrypt_ref: None,
            hooks: Vec::new(),
            registry: None,
            containers: HashMap::new(),
            markers: None,
            diagnostics: Vec::new(),
            next_number: 1,
            stats: Stats::default(),
        }
    }

    /// Use `registry` instead of the standard filters.
    pub fn with_registry(mut self, registry: FilterRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn registry(&self) -> &FilterRegistry {
        match &self.registry {
            Some(registry) => registry,
            None => FilterRegistry::standard(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    // ---- loading ----

    pub fn load(data: impl Into<Bytes>) -> Result<Self> {
        Self::load_with(data, Config::default())
    }

    pub fn load_with(data: impl Into<Bytes>, config: Config) -> Result<Self> {
        Self::load_inner(data.into(), config, None)
    }

    /// Load an encrypted document, authenticating with `password`.
    pub fn load_encrypted(data: impl Into<Bytes>, password: &[u8], config: Config) -> Result<Self> {
        Self::load_inner(data.into(), config, Some(password))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, Config::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), len = data.len(), "read document");
        Self::load_with(data, config)
    }

    fn load_inner(data: Bytes, config: Config, password: Option<&[u8]>) -> Result<Self> {
        let loaded = match config.parser {
            ParserMode::Sequential => sequential::load(&data, &config)?,
            ParserMode::Lazy => lazy::load(&data, &config)?,
        };
        info!(
            revisions = loaded.revisions.len(),
            version = %loaded.version,
            mode = ?config.parser,
            diagnostics = loaded.diagnostics.len(),
            "document loaded"
        );

        let next_number = loaded
            .revisions
            .iter()
            .map(|r| {
                let declared = r.trailer().size().unwrap_or(0);
                r.max_num().map_or(declared, |m| declared.max(m + 1))
            })
            .max()
            .unwrap_or(0)
            .max(1);
        let parsed_revisions = loaded.revisions.len();

        let mut doc = Self {
            version: loaded.version,
            header_offset: loaded.header_offset,
            revisions: loaded.revisions,
            parsed_revisions,
            source: Some(data),
            diagnostics: loaded.diagnostics,
            next_number,
            ..Self::with_config(config)
        };
        doc.open_security(password)?;
        if doc.config.parser == ParserMode::Sequential {
            doc.prepare_parsed_bodies()?;
        }
        Ok(doc)
    }

    fn open_security(&mut self, password: Option<&[u8]>) -> Result<()> {
        let trailer = self.trailer().dict();
        let encrypt_ref = trailer.get_ref("Encrypt");
        let direct = trailer.get_dict("Encrypt").cloned();
        if encrypt_ref.is_none() && direct.is_none() {
            if password.is_some() {
                debug!("password given for a document that is not encrypted");
            }
            return Ok(());
        }
        let document_id = self.trailer().id_first().map(<[u8]>::to_vec).unwrap_or_default();

        let dict = match (direct, encrypt_ref) {
            (Some(dict), _) => dict,
            (None, Some(id)) => self
                .resolve(id)?
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::encryption("Encrypt is not a dictionary"))?,
            (None, None) => return Ok(()),
        };

        let handler = match StandardSecurity::open(&dict, password.unwrap_or_default(), &document_id) {
            Ok(handler) => handler,
            Err(e) if password.is_none() => {
                debug!(error = %e, "empty password rejected");
                return Err(Error::encryption("document is encrypted and needs a password"));
            }
            Err(e) => return Err(e),
        };
        debug!(method = ?handler.method(), "security handler opened");
        self.security = Some(Box::new(handler));
        self.encrypt_ref = encrypt_ref;
        Ok(())
    }

    /// Decrypt and type-check objects a sequential load put in the bodies.
    fn prepare_parsed_bodies(&mut self) -> Result<()> {
        for r in 0..self.revisions.len() {
            let ids: Vec<ObjRef> = self.revisions[r].ids().collect();
            for id in ids {
                let Some(entry) = self.revisions[r].get_mut(id) else {
                    continue;
                };
                if let Some(handler) = self.security.as_deref() {
                    if Some(id) != self.encrypt_ref {
                        crypt::apply(handler, id, &mut entry.object, Direction::Decrypt)?;
                    }
                }
                let offset = match entry.location {
                    Location::Offset(offset) => Some(offset),
                    _ => None,
                };
                let found = type_check(&self.config, self.version, id, &entry.object, offset);
                self.diagnostics.extend(found);
            }
        }
        Ok(())
    }

    // ---- revisions ----

    /// Oldest first.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    /// Revisions that already exist in the loaded bytes.
    pub fn parsed_revision_count(&self) -> usize {
        self.parsed_revisions
    }

    fn newest(&self) -> &Revision {
        &self.revisions[self.revisions.len() - 1]
    }

    /// Start a new, empty revision on top of the chain. The trailer's
    /// document-level keys carry over.
    pub fn add_revision(&mut self) -> usize {
        let trailer = self.newest().trailer().carried_over();
        self.revisions.push(Revision::with_trailer(trailer));
        debug!(revision = self.revisions.len() - 1, "revision added");
        self.revisions.len() - 1
    }

    /// Index of the revision edits go to. Parsed revisions are never
    /// edited in place; a fresh one is started on top.
    pub fn editable_revision(&mut self) -> usize {
        if self.revisions.len() <= self.parsed_revisions {
            return self.add_revision();
        }
        self.revisions.len() - 1
    }

    /// Drop revision `index`. Objects it shadowed become visible again.
    pub fn remove_revision(&mut self, index: usize) -> Result<Revision> {
        if index >= self.revisions.len() {
            return Err(Error::index(format!(
                "no revision {index}, document has {}",
                self.revisions.len()
            )));
        }
        if self.revisions.len() == 1 {
            return Err(Error::invariant("a document keeps at least one revision"));
        }
        let removed = self.revisions.remove(index);
        if index < self.parsed_revisions {
            self.parsed_revisions -= 1;
            self.history_rewritten = true;
        }
        self.containers.clear();
        debug!(revision = index, "revision removed");
        Ok(removed)
    }

    /// Merge every revision into one. All objects are loaded first; old
    /// containers and index streams are dropped with the indexes.
    pub fn squash(&mut self) -> Result<()> {
        self.load_all()?;
        let revisions = std::mem::take(&mut self.revisions);
        let mut merged = Revision::new();
        let mut trailer = Trailer::new();
        for revision in revisions {
            let Revision { body, freed, trailer: t, .. } = revision;
            for (num, generation) in freed {
                merged.free(num, generation);
            }
            for (id, entry) in body {
                if is_index_structure(&entry.object) {
                    continue;
                }
                let stale: Vec<ObjRef> = merged.ids().filter(|other| other.num == id.num).collect();
                for other in stale {
                    merged.remove(other);
                }
                merged.insert(IndirectObject::new(id, entry.object));
            }
            trailer = t;
        }
        *merged.trailer_mut() = trailer.carried_over();
        if self.parsed_revisions > 0 {
            self.history_rewritten = true;
        }
        self.revisions = vec![merged];
        self.parsed_revisions = 0;
        self.containers.clear();
        debug!(objects = self.revisions[0].len(), "revisions squashed");
        Ok(())
    }

    // ---- trailer ----

    /// Trailer of the newest revision.
    pub fn trailer(&self) -> &Trailer {
        self.newest().trailer()
    }

    /// Trailer of the editable revision.
    pub fn trailer_mut(&mut self) -> &mut Trailer {
        let target = self.editable_revision();
        self.revisions[target].trailer_mut()
    }

    /// The document catalog, through the trailer's `Root`.
    pub fn catalog(&mut self) -> Result<&Dictionary> {
        let root = self
            .trailer()
            .root()
            .ok_or_else(|| Error::index("trailer has no Root"))?;
        self.resolve(root)?
            .as_dict()
            .ok_or_else(|| Error::type_error(format!("Root {root} is not a dictionary")))
    }

    // ---- resolution ----

    /// The newest revision that says anything about `num`.
    fn locate(&self, num: u64) -> Option<(usize, Slot)> {
        self.revisions
            .iter()
            .enumerate()
            .rev()
            .find_map(|(r, revision)| revision.slot(num).map(|slot| (r, slot)))
    }

    /// Make sure `id` is in a body. Returns the revision holding it, or
    /// `None` when it does not resolve.
    fn materialize(&mut self, id: ObjRef, depth: usize) -> Result<Option<usize>> {
        if depth > MAX_CONTAINER_DEPTH {
            return Err(Error::index(format!("containers nested too deeply resolving {id}")));
        }
        let Some((r, slot)) = self.locate(id.num) else {
            return self.scan_containers(id, depth);
        };
        match slot {
            Slot::Body(found) if found == id => {
                self.stats.body_hits += 1;
                Ok(Some(r))
            }
            Slot::Body(_) | Slot::Freed(_) => Ok(None),
            Slot::Entry(entry) => self.load_entry(r, id, entry, depth),
        }
    }

    fn load_entry(&mut self, r: usize, id: ObjRef, entry: XrefEntry, depth: usize) -> Result<Option<usize>> {
        if !entry.describes(id) {
            return Ok(None);
        }
        match entry {
            XrefEntry::InUse { offset, .. } => self.load_at_offset(r, id, offset),
            XrefEntry::Compressed { stream, index } => self.load_from_container(r, id, stream, index as usize, depth),
            XrefEntry::Free { .. } => Ok(None),
        }
    }

    fn load_at_offset(&mut self, r: usize, id: ObjRef, offset: u64) -> Result<Option<usize>> {
        let data = self
            .source
            .clone()
            .ok_or_else(|| Error::index(format!("no source bytes to read {id} from")))?;
        let parsed = match self.parse_at(&data, id, offset) {
            Ok(parsed) => parsed,
            Err(e) if self.config.recover && e.is_recoverable() => {
                warn!(%id, offset, error = %e, "index offset is wrong, scanning for the object");
                self.diagnostics.push(Diagnostic::at(offset, e.to_string()));
                let known = self
                    .markers
                    .get_or_insert_with(|| recover::scan_markers(&data))
                    .get(&id.num)
                    .copied();
                match known {
                    Some((generation, found)) if generation == id.generation && found != offset => {
                        self.parse_at(&data, id, found)?
                    }
                    _ => return Ok(None),
                }
            }
            Err(e) => return Err(e),
        };

        let mut object = parsed.object;
        if let Some(handler) = self.security.as_deref() {
            if Some(id) != self.encrypt_ref {
                crypt::apply(handler, id, &mut object, Direction::Decrypt)?;
            }
        }
        let start = parsed.start as u64;
        let found = type_check(&self.config, self.version, id, &object, Some(start));
        self.diagnostics.extend(found);
        if let Some(d) = &parsed.diagnostic {
            self.diagnostics.push(d.clone());
        }
        self.revisions[r].insert(IndirectObject::loaded(
            id,
            object,
            Location::Offset(start),
            parsed.diagnostic,
        ));
        self.stats.offset_loads += 1;
        Ok(Some(r))
    }

    /// Parse the object at `offset`, also trying the offset shifted by
    /// leading junk before the header.
    fn parse_at(&self, data: &[u8], id: ObjRef, offset: u64) -> Result<ParsedObject> {
        let mut attempts = vec![offset as usize];
        if self.header_offset > 0 {
            attempts.push(offset as usize + self.header_offset);
        }
        let mut last = Error::index(format!("offset {offset} is past the end of the data"));
        for pos in attempts {
            if pos >= data.len() {
                continue;
            }
            let mut parser = ObjectParser::at(data, pos).with_max_depth(self.config.max_depth);
            match parser.parse_indirect() {
                Ok(parsed) if parsed.id == id => return Ok(parsed),
                Ok(parsed) => {
                    last = Error::index(format!("offset {pos} holds {} instead of {id}", parsed.id));
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    fn load_from_container(
        &mut self,
        r: usize,
        id: ObjRef,
        stream: u64,
        index: usize,
        depth: usize,
    ) -> Result<Option<usize>> {
        if id.generation != 0 || !self.open_container(stream, depth + 1)? {
            return Ok(None);
        }
        let Some(container) = self.containers.get(&stream) else {
            return Ok(None);
        };
        let position = match container.number_at(index) {
            Some(num) if num == id.num => index,
            _ => match container.find(id.num) {
                Some(position) => position,
                None => return Ok(None),
            },
        };
        let (_, object) = container.object_at(position, self.config.max_depth)?;
        let found = type_check(&self.config, self.version, id, &object, None);
        self.diagnostics.extend(found);
        self.revisions[r].insert(IndirectObject::loaded(
            id,
            object,
            Location::Container {
                stream,
                index: position as u32,
            },
            None,
        ));
        self.stats.container_loads += 1;
        Ok(Some(r))
    }

    /// Parse and memoize the index of container `num`.
    fn open_container(&mut self, num: u64, depth: usize) -> Result<bool> {
        if self.containers.contains_key(&num) {
            return Ok(true);
        }
        let container_ref = ObjRef::new(num, 0);
        let Some(r) = self.materialize(container_ref, depth)? else {
            return Ok(false);
        };
        let stream = self.revisions[r]
            .get(container_ref)
            .and_then(|entry| entry.object.as_stream())
            .ok_or_else(|| Error::index(format!("container {container_ref} is not a stream")))?;
        let index = ObjectStreamIndex::parse(stream, self.registry())?;
        debug!(container = num, objects = index.len(), "container indexed");
        self.containers.insert(num, index);
        Ok(true)
    }

    /// Last resort for numbers no revision declares: look inside every
    /// container already in a body.
    fn scan_containers(&mut self, id: ObjRef, depth: usize) -> Result<Option<usize>> {
        if id.generation != 0 {
            return Ok(None);
        }
        self.stats.fallback_scans += 1;
        let candidates: Vec<(usize, u64)> = self
            .revisions
            .iter()
            .enumerate()
            .flat_map(|(r, revision)| {
                revision
                    .objects()
                    .filter(|entry| entry.id.generation == 0 && entry.object.dict().is_some_and(|d| d.is_type("ObjStm")))
                    .map(move |entry| (r, entry.id.num))
            })
            .collect();
        for (r, num) in candidates.into_iter().rev() {
            if !self.open_container(num, depth + 1)? {
                continue;
            }
            let position = self.containers.get(&num).and_then(|c| c.find(id.num));
            if let Some(position) = position {
                debug!(%id, container = num, "found by container scan");
                return self.load_from_container(r, id, num, position, depth);
            }
        }
        Ok(None)
    }

    fn unresolved(&mut self, id: ObjRef) -> Result<&'static Object> {
        if self.config.strict_references {
            return Err(Error::Resolution(id));
        }
        debug!(%id, "unresolved reference reads as null");
        self.diagnostics
            .push(Diagnostic::new(format!("unresolved reference {id} read as null")));
        Ok(&NULL)
    }

    /// The object `id` refers to. An unresolvable reference is null, or
    /// [`Error::Resolution`] with `strict_references`.
    pub fn resolve(&mut self, id: ObjRef) -> Result<&Object> {
        match self.materialize(id, 0)? {
            Some(r) => self.revisions[r]
                .get(id)
                .map(|entry| &entry.object)
                .ok_or(Error::Resolution(id)),
            None => self.unresolved(id),
        }
    }

    /// Like [`resolve`](Self::resolve) but an object that was damaged when
    /// read is an error.
    pub fn resolve_checked(&mut self, id: ObjRef) -> Result<&Object> {
        match self.materialize(id, 0)? {
            Some(r) => self.revisions[r].get(id).ok_or(Error::Resolution(id))?.check(),
            None => Err(Error::Resolution(id)),
        }
    }

    /// Follow `object` if it is a reference; otherwise a copy of it.
    pub fn deref(&mut self, object: &Object) -> Result<Object> {
        match object {
            Object::Ref(id) => Ok(self.resolve(*id)?.copy()),
            other => Ok(other.copy()),
        }
    }

    /// Already-loaded object `id`, without touching the source.
    pub fn get(&self, id: ObjRef) -> Option<&Object> {
        match self.locate(id.num)? {
            (r, Slot::Body(found)) if found == id => self.revisions[r].get(id).map(|entry| &entry.object),
            _ => None,
        }
    }

    /// Mutable access to `id`. An object owned by an older revision is
    /// copied into the editable one first.
    pub fn get_mut(&mut self, id: ObjRef) -> Result<&mut Object> {
        let r = self.materialize(id, 0)?.ok_or(Error::Resolution(id))?;
        let target = self.editable_revision();
        if r != target {
            let copy = self.revisions[r]
                .get(id)
                .map(|entry| entry.object.copy())
                .ok_or(Error::Resolution(id))?;
            self.revisions[target].insert(IndirectObject::new(id, copy));
        }
        self.containers.remove(&id.num);
        self.revisions[target]
            .get_mut(id)
            .map(|entry| &mut entry.object)
            .ok_or(Error::Resolution(id))
    }

    // ---- editing ----

    /// Next unused object number.
    pub(crate) fn allocate(&mut self) -> u64 {
        let num = self.next_number;
        self.next_number += 1;
        num
    }

    /// Make sure numbers below `next` are never handed out again.
    pub(crate) fn reserve(&mut self, next: u64) {
        self.next_number = self.next_number.max(next);
    }

    /// Highest object number handed out or seen so far.
    pub fn max_object_number(&self) -> u64 {
        self.next_number.saturating_sub(1)
    }

    /// Add `object` as a new indirect object in the editable revision.
    pub fn insert(&mut self, object: impl Into<Object>) -> ObjRef {
        let mut object = object.into();
        object.clear_indirect_mark();
        let id = ObjRef::new(self.allocate(), 0);
        let target = self.editable_revision();
        self.revisions[target].insert(IndirectObject::new(id, object));
        id
    }

    /// Store `object` as `id` in the editable revision, shadowing any older
    /// definition.
    pub fn set(&mut self, id: ObjRef, object: impl Into<Object>) -> Result<()> {
        if id.num == 0 {
            return Err(Error::invariant("object number 0 is reserved for the free list head"));
        }
        let mut object = object.into();
        object.clear_indirect_mark();
        let target = self.editable_revision();
        let stale: Vec<ObjRef> = self.revisions[target]
            .ids()
            .filter(|other| other.num == id.num && *other != id)
            .collect();
        for other in stale {
            self.revisions[target].remove(other);
        }
        self.revisions[target].insert(IndirectObject::new(id, object));
        self.containers.remove(&id.num);
        self.next_number = self.next_number.max(id.num + 1);
        Ok(())
    }

    /// Free `id` in the editable revision. Its number becomes reusable
    /// with the next generation.
    pub fn delete(&mut self, id: ObjRef) -> Result<()> {
        if self.materialize(id, 0)?.is_none() {
            if self.config.strict_references {
                return Err(Error::Resolution(id));
            }
            debug!(%id, "deleting an object that does not resolve");
        }
        let target = self.editable_revision();
        self.revisions[target].free(id.num, xref::next_generation(id.generation));
        self.containers.remove(&id.num);
        Ok(())
    }

    /// Parse every object each revision's index declares into that
    /// revision's body. Returns how many objects were read.
    pub fn load_all(&mut self) -> Result<usize> {
        let mut loaded = 0;
        for r in 0..self.revisions.len() {
            let pending: Vec<(ObjRef, XrefEntry)> = match self.revisions[r].xref() {
                Some(xref) => xref
                    .numbers()
                    .into_iter()
                    .filter(|num| *num != 0)
                    .filter_map(|num| xref.lookup(num).map(|entry| (num, entry)))
                    .filter(|(_, entry)| !entry.is_free())
                    .map(|(num, entry)| (ObjRef::new(num, entry.generation()), entry))
                    .filter(|(id, _)| self.revisions[r].get(*id).is_none())
                    .collect(),
                None => continue,
            };
            for (id, entry) in pending {
                if !matches!(self.revisions[r].slot(id.num), Some(Slot::Entry(_))) {
                    continue;
                }
                match self.load_entry(r, id, entry, 0) {
                    Ok(Some(_)) => loaded += 1,
                    Ok(None) => {}
                    Err(e) if self.config.recover && e.is_recoverable() => {
                        warn!(%id, error = %e, "object skipped");
                        self.diagnostics.push(Diagnostic::new(format!("{id}: {e}")));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        debug!(loaded, "all revisions loaded");
        Ok(loaded)
    }

    /// References to every object visible through the newest revisions,
    /// after loading everything.
    pub fn live_ids(&mut self) -> Result<Vec<ObjRef>> {
        self.load_all()?;
        let numbers: std::collections::BTreeSet<u64> =
            self.revisions.iter().flat_map(Revision::numbers).collect();
        Ok(numbers
            .into_iter()
            .filter_map(|num| match self.locate(num) {
                Some((_, Slot::Body(id))) => Some(id),
                _ => None,
            })
            .collect())
    }

    // ---- security ----

    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    pub fn security(&self) -> Option<&dyn SecurityHandler> {
        self.security.as_deref()
    }

    /// Install a handler. `encrypt` is the object holding its dictionary,
    /// which is never itself encrypted.
    pub fn set_security(&mut self, handler: Box<dyn SecurityHandler>, encrypt: Option<ObjRef>) {
        self.security = Some(handler);
        self.encrypt_ref = encrypt;
    }

    /// Encrypt the document with the standard handler on the next save.
    pub fn encrypt(
        &mut self,
        method: CryptMethod,
        user_password: &[u8],
        owner_password: &[u8],
        permissions: i32,
    ) -> ObjRef {
        let document_id = self.ensure_document_id();
        let (handler, dict) =
            StandardSecurity::create(method, user_password, owner_password, permissions, &document_id);
        let encrypt = self.insert(dict);
        self.trailer_mut().dict_mut().insert("Encrypt", encrypt);
        self.set_security(Box::new(handler), Some(encrypt));
        debug!(?method, %encrypt, "encryption enabled");
        encrypt
    }

    /// First `ID` string, created when missing.
    fn ensure_document_id(&mut self) -> Vec<u8> {
        if let Some(id) = self.trailer().id_first() {
            return id.to_vec();
        }
        let mut hasher = Md5::new();
        hasher.update(self.version.to_string().as_bytes());
        hasher.update(self.next_number.to_le_bytes());
        hasher.update(self.revisions.len().to_le_bytes());
        if let Some(root) = self.trailer().root() {
            hasher.update(root.to_string().as_bytes());
        }
        let id = hasher.finalize().to_vec();
        let pair = vec![
            Object::String(PdfString::new(id.clone())),
            Object::String(PdfString::new(id.clone())),
        ];
        self.trailer_mut().dict_mut().insert("ID", pair);
        id
    }

    // ---- saving ----

    /// Register a hook run for every object written.
    pub fn add_hook(&mut self, hook: impl BuildHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Serialize with the configured save options.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        let options = self.config.save.clone();
        self.save_with(&options)
    }

    pub fn save_with(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        physicalize::build(self, options)
    }

    pub fn save_to<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.save()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(path = %path.as_ref().display(), len = bytes.len(), "document saved");
        Ok(())
    }

    /// Adopt the bytes just written as the new source.
    pub(crate) fn rebase(&mut self, data: Vec<u8>) {
        self.source = Some(Bytes::from(data));
        self.parsed_revisions = self.revisions.len();
        self.history_rewritten = false;
        self.markers = None;
        self.containers.clear();
    }

    // ---- diagnostics ----

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }
}

/// Old containers and index streams; their content lives elsewhere once
/// loaded.
pub(crate) fn is_index_structure(object: &Object) -> bool {
    object
        .as_stream()
        .is_some_and(|s| s.dict().is_type("ObjStm") || s.dict().is_type("XRef"))
}

/// Schema warnings for a freshly loaded object.
fn type_check(config: &Config, version: Version, id: ObjRef, object: &Object, offset: Option<u64>) -> Vec<Diagnostic> {
    if !config.guess_types {
        return Vec::new();
    }
    let (Some(found), Some(dict)) = (schema::guess(object), object.dict()) else {
        return Vec::new();
    };
    let path = format!("{} {}", id.num, id.generation);
    schema::validate(dict, found, Some(version), config.propagate_types, &path)
        .into_iter()
        .map(|warning| Diagnostic {
            offset,
            message: warning.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::object::{Array, Name};

    fn catalog() -> Dictionary {
        Dictionary::new().with("Type", Name::new("Catalog"))
    }

    #[test]
    fn test_new_document_has_one_revision() {
        let doc = Document::new();
        assert_eq!(doc.revision_count(), 1);
        assert_eq!(doc.parsed_revision_count(), 0);
        assert!(doc.trailer().root().is_none());
    }

    #[test]
    fn test_insert_allocates_increasing_numbers() {
        let mut doc = Document::new();
        let a = doc.insert(Object::Int(1));
        let b = doc.insert(Object::Int(2));
        assert_eq!(a, ObjRef::new(1, 0));
        assert_eq!(b, ObjRef::new(2, 0));
        assert_eq!(doc.resolve(b).unwrap(), &Object::Int(2));
        assert_eq!(doc.max_object_number(), 2);
    }

    #[test]
    fn test_unresolved_is_null_when_lenient() {
        let mut doc = Document::new();
        assert_eq!(doc.resolve(ObjRef::new(9, 0)).unwrap(), &Object::Null);
        assert_eq!(doc.diagnostics().len(), 1);
    }

    #[test]
    fn test_unresolved_is_error_when_strict() {
        let mut doc = Document::with_config(Config::strict());
        assert!(matches!(doc.resolve(ObjRef::new(9, 0)), Err(Error::Resolution(_))));
    }

    #[test]
    fn test_generation_mismatch_does_not_resolve() {
        let mut doc = Document::new();
        let id = doc.insert(Object::Int(1));
        let other = ObjRef::new(id.num, 1);
        assert_eq!(doc.resolve(other).unwrap(), &Object::Null);
        assert!(doc.get(other).is_none());
    }

    #[test]
    fn test_delete_frees_with_next_generation() {
        let mut doc = Document::new();
        let id = doc.insert(catalog());
        doc.delete(id).unwrap();
        assert!(doc.get(id).is_none());
        assert_eq!(doc.revisions()[0].freed().collect::<Vec<_>>(), vec![(id.num, 1)]);
    }

    #[test]
    fn test_delete_at_last_generation_stays_at_ceiling() {
        let mut doc = Document::new();
        let id = ObjRef::new(4, 65535);
        doc.set(id, Object::Int(1)).unwrap();
        doc.delete(id).unwrap();
        assert_eq!(doc.revisions()[0].freed().collect::<Vec<_>>(), vec![(4, 65535)]);

        let bytes = doc.save().unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("0000000000 65535 f\r\ntrailer"));
        let reloaded = Document::load(bytes).unwrap();
        let table = reloaded.revisions()[0].xref().unwrap().table.as_ref().unwrap();
        assert_eq!(table.get(4), Some(XrefEntry::free(0, 65535)));
    }

    #[test]
    fn test_newer_revision_shadows_older() {
        let mut doc = Document::new();
        let id = doc.insert(Object::Int(1));
        doc.add_revision();
        doc.set(id, Object::Int(2)).unwrap();
        assert_eq!(doc.resolve(id).unwrap(), &Object::Int(2));
        doc.remove_revision(1).unwrap();
        assert_eq!(doc.resolve(id).unwrap(), &Object::Int(1));
    }

    #[test]
    fn test_last_revision_cannot_be_removed() {
        let mut doc = Document::new();
        assert!(matches!(doc.remove_revision(0), Err(Error::Invariant(_))));
        assert!(matches!(doc.remove_revision(3), Err(Error::Index(_))));
    }

    #[test]
    fn test_get_mut_copies_into_newest_revision() {
        let mut doc = Document::new();
        let id = doc.insert(Array::from_vec(vec![Object::Int(1)]));
        doc.add_revision();
        doc.get_mut(id).unwrap().as_array_mut().unwrap().push(2);
        assert_eq!(doc.revisions()[0].get(id).unwrap().object.as_array().unwrap().len(), 1);
        assert_eq!(doc.revisions()[1].get(id).unwrap().object.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_set_rejects_object_zero() {
        let mut doc = Document::new();
        assert!(doc.set(ObjRef::new(0, 0), Object::Null).is_err());
    }

    #[test]
    fn test_squash_merges_revisions() {
        let mut doc = Document::new();
        let a = doc.insert(Object::Int(1));
        let b = doc.insert(Object::Int(2));
        doc.add_revision();
        doc.set(a, Object::Int(10)).unwrap();
        doc.delete(b).unwrap();
        doc.squash().unwrap();
        assert_eq!(doc.revision_count(), 1);
        assert_eq!(doc.resolve(a).unwrap(), &Object::Int(10));
        assert!(doc.get(b).is_none());
    }

    #[test]
    fn test_catalog_through_root() {
        let mut doc = Document::new();
        let root = doc.insert(catalog());
        doc.trailer_mut().set_root(root);
        assert!(doc.catalog().unwrap().is_type("Catalog"));
    }

    #[test]
    fn test_stats_count_body_hits() {
        let mut doc = Document::new();
        let id = doc.insert(Object::Int(1));
        doc.resolve(id).unwrap();
        doc.resolve(id).unwrap();
        assert_eq!(doc.stats().body_hits, 2);
        assert_eq!(doc.stats().offset_loads, 0);
    }

    #[test]
    fn test_deref_follows_references() {
        let mut doc = Document::new();
        let id = doc.insert(Object::Int(7));
        assert_eq!(doc.deref(&Object::Ref(id)).unwrap(), Object::Int(7));
        assert_eq!(doc.deref(&Object::Bool(true)).unwrap(), Object::Bool(true));
    }
}
