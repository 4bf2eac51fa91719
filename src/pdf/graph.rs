//! Whole-graph operations: traversal, search, logicalize, tree checks

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::pdf::document::Document;
use crate::pdf::object::{Array, Dictionary, ObjRef, Object};
use crate::pdf::revision::Location;

/// One object reached by [`Document::each_object`].
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    /// The indirect object this value lives in.
    pub owner: ObjRef,
    /// Key path from the owner, empty for the indirect object itself.
    pub path: &'a str,
    pub object: &'a Object,
}

/// Owned form of a visit path, kept while the borrow of the graph is built.
struct Step<'a> {
    owner: ObjRef,
    path: String,
    object: &'a Object,
}

fn walk<'a>(owner: ObjRef, path: String, object: &'a Object, out: &mut Vec<Step<'a>>) {
    let join = |key: &str| if path.is_empty() { key.to_string() } else { format!("{path}.{key}") };
    match object {
        Object::Array(array) => {
            for (i, item) in array.iter().enumerate() {
                if item.is_compound() {
                    let child = format!("{path}[{i}]");
                    out.push(Step { owner, path: child.clone(), object: item });
                    walk(owner, child, item, out);
                }
            }
        }
        Object::Dict(_) | Object::Stream(_) => {
            let Some(dict) = object.dict() else {
                return;
            };
            for (key, value) in dict.iter() {
                if value.is_compound() {
                    let child = join(key.as_str());
                    out.push(Step { owner, path: child.clone(), object: value });
                    walk(owner, child, value, out);
                }
            }
        }
        _ => {}
    }
}

/// Visits collected by [`Document::each_object`]. Paths are owned here so
/// each [`Visit`] can borrow them.
pub struct Visits<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Visits<'a> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Visit<'_>> {
        self.steps.iter().map(|step| Visit {
            owner: step.owner,
            path: &step.path,
            object: step.object,
        })
    }
}

impl Document {
    /// Every live object, oldest number first. With `recursive`, direct
    /// compound values inside each object follow their owner. Objects read
    /// out of container streams are skipped unless `through_containers`.
    pub fn each_object(&mut self, recursive: bool, through_containers: bool) -> Result<Visits<'_>> {
        let ids = self.live_ids()?;
        let mut steps = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entry) = self.revisions.iter().rev().find_map(|r| r.get(id)) else {
                continue;
            };
            if !through_containers && matches!(entry.location, Location::Container { .. }) {
                continue;
            }
            steps.push(Step {
                owner: id,
                path: String::new(),
                object: &entry.object,
            });
            if recursive {
                walk(id, String::new(), &entry.object, &mut steps);
            }
        }
        Ok(Visits { steps })
    }

    /// Live objects that hold a reference to `target`.
    pub fn referrers(&mut self, target: ObjRef) -> Result<Vec<ObjRef>> {
        let visits = self.each_object(false, true)?;
        Ok(visits
            .iter()
            .filter(|v| {
                v.object.as_ref() == Some(target) || v.object.cache().is_some_and(|c| c.references(target))
            })
            .map(|v| v.owner)
            .collect())
    }

    /// Live objects containing the string `needle` anywhere inside them.
    pub fn find_string(&mut self, needle: &[u8]) -> Result<Vec<ObjRef>> {
        let visits = self.each_object(false, true)?;
        Ok(visits
            .iter()
            .filter(|v| {
                v.object.as_string().is_some_and(|s| s.as_bytes() == needle)
                    || v.object.cache().is_some_and(|c| c.contains_string(needle))
            })
            .map(|v| v.owner)
            .collect())
    }

    /// Copy of `object` with every reference replaced by a copy of its
    /// target. A target already inlined once stays a reference, as do
    /// `Catalog` and `Pages` dictionaries.
    pub fn logicalize(&mut self, object: &Object) -> Result<Object> {
        let mut visited = HashSet::new();
        self.inline(object, &mut visited, 0)
    }

    fn inline(&mut self, object: &Object, visited: &mut HashSet<ObjRef>, depth: usize) -> Result<Object> {
        if depth > self.config.max_depth {
            return Err(Error::invariant(format!("graph deeper than {} levels", self.config.max_depth)));
        }
        match object {
            Object::Ref(id) => {
                if !visited.insert(*id) {
                    return Ok(object.copy());
                }
                let target = self.resolve(*id)?.copy();
                if target.dict().is_some_and(|d| d.is_type("Catalog") || d.is_type("Pages")) {
                    return Ok(object.copy());
                }
                self.inline(&target, visited, depth + 1)
            }
            Object::Array(array) => {
                let mut items = Vec::with_capacity(array.len());
                for item in array.iter() {
                    items.push(self.inline(item, visited, depth + 1)?);
                }
                Ok(Object::Array(Array::from_vec(items)))
            }
            Object::Dict(dict) => Ok(Object::Dict(self.inline_dict(dict, visited, depth)?)),
            Object::Stream(stream) => {
                let dict = self.inline_dict(stream.dict(), visited, depth)?;
                let mut copy = stream.clone();
                *copy.dict_mut() = dict;
                Ok(Object::Stream(copy))
            }
            other => Ok(other.copy()),
        }
    }

    fn inline_dict(&mut self, dict: &Dictionary, visited: &mut HashSet<ObjRef>, depth: usize) -> Result<Dictionary> {
        let mut out = Dictionary::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            out.insert(key.clone(), self.inline(value, visited, depth + 1)?);
        }
        Ok(out)
    }

    /// Walk the tree under `root` through `key` (such as `Kids`) and fail
    /// if a node is reached twice. Returns the number of nodes.
    pub fn check_tree(&mut self, root: ObjRef, key: &str) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                return Err(Error::invariant(format!("{id} is reached twice through /{key}")));
            }
            let node = self.resolve(id)?;
            let Some(children) = node.dict().and_then(|d| d.get_array(key)) else {
                continue;
            };
            let kids: Vec<ObjRef> = children.iter().filter_map(Object::as_ref).collect();
            pending.extend(kids.into_iter().rev());
        }
        debug!(%root, key, nodes = seen.len(), "tree checked");
        Ok(seen.len())
    }
}
