//! Post-processing passes over finished compound trees.
//!
//! `flatten` decides which flattened sub-compounds are inlined and which are
//! kept as recursion anchors; `name_compounds` assigns stable names to every
//! nested compound shape, deduplicating structurally identical ones into a
//! shared registry.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::common::error::{Error, Result};

use super::compound::{NameHandle, NbtCompound};
use super::element::{new_ref, MergeStrategy, NbtElement, NbtRef};

/// Output of the naming pass: the registry of named compound definitions and
/// the resolution of recursion handles to registry names.
#[derive(Debug, Default)]
pub struct NamedCompounds {
    pub registry: IndexMap<String, NbtCompound>,
    pub assigned: HashMap<NameHandle, String>,
}

pub struct CompoundNamer {
    /// Recursion-hit call identities collected by the memoizer; compounds
    /// with these handles must survive as registered definitions.
    boxed: HashSet<NameHandle>,
    registry: IndexMap<String, NbtCompound>,
    assigned: HashMap<NameHandle, String>,
}

impl CompoundNamer {
    pub fn new(boxed: HashSet<NameHandle>) -> Self {
        Self {
            boxed,
            registry: IndexMap::new(),
            assigned: HashMap::new(),
        }
    }

    pub fn finish(self) -> NamedCompounds {
        NamedCompounds {
            registry: self.registry,
            assigned: self.assigned,
        }
    }

    /// Resolve the flattened lists of every compound under `root`:
    /// recursion-critical members and boxed back-references stay, everything
    /// else inlines into its parent.
    pub fn flatten(&self, root: &NbtRef) -> Result<()> {
        self.flatten_walk(root, &mut Vec::new())
    }

    fn flatten_walk(&self, node: &NbtRef, seen: &mut Vec<*const ()>) -> Result<()> {
        let key = NbtRef::as_ptr(node) as *const ();
        if seen.contains(&key) {
            return Ok(());
        }
        seen.push(key);

        let children = child_refs(node);
        for child in &children {
            self.flatten_walk(child, seen)?;
        }

        if let NbtElement::Compound(c) = &mut *node.borrow_mut() {
            let mut pending: std::collections::VecDeque<NbtRef> =
                std::mem::take(&mut c.flattened).into();
            let mut kept: Vec<NbtRef> = Vec::new();
            while let Some(member) = pending.pop_front() {
                let inline = match &*member.borrow() {
                    NbtElement::Boxed(_) => None,
                    NbtElement::Compound(mc) => {
                        let critical = mc
                            .name
                            .as_ref()
                            .is_some_and(|handle| self.boxed.contains(handle));
                        if critical {
                            None
                        } else {
                            Some(mc.clone())
                        }
                    }
                    other => {
                        return Err(Error::invariant(format!(
                            "flattened member of kind {}",
                            other.kind_name()
                        )))
                    }
                };
                match inline {
                    None => kept.push(member),
                    Some(mc) => {
                        for (k, entry) in &mc.entries {
                            c.put(k, entry.value.clone(), entry.optional, MergeStrategy::SameDataSet)
                                .map_err(|e| Error::invariant(e.to_string()))?;
                        }
                        if let Some(unknown) = &mc.unknown_keys {
                            c.put_unknown(unknown);
                        }
                        // nested flattened members bubble up for the same treatment
                        for nested in &mc.flattened {
                            pending.push_back(nested.clone());
                        }
                    }
                }
            }
            c.flattened = kept;
        }
        Ok(())
    }

    /// Replace every compound *below* `root` with a named reference,
    /// registering its definition. `root` itself stays structural (it is the
    /// per-class compound emitted inline in the type list).
    pub fn name_compounds(&mut self, root: &NbtRef) -> Result<()> {
        let children = child_refs(root);
        for child in &children {
            self.name_value(child)?;
        }
        Ok(())
    }

    fn name_value(&mut self, node: &NbtRef) -> Result<()> {
        // post-order: children first, so registered shapes are already in
        // terms of named references
        let children = child_refs(node);
        for child in &children {
            self.name_value(child)?;
        }

        loop {
            let compound = match &*node.borrow() {
                NbtElement::Compound(c) => c.clone(),
                _ => return Ok(()),
            };
            let critical = compound
                .name
                .as_ref()
                .is_some_and(|handle| self.boxed.contains(handle));

            if !critical {
                // a wrapper holding nothing but one flattened member is that member
                if compound.entries.is_empty()
                    && compound.unknown_keys.is_none()
                    && compound.flattened.len() == 1
                {
                    let member = compound.flattened[0].clone();
                    let replacement = member.borrow().clone();
                    *node.borrow_mut() = replacement;
                    // the member may itself be an unnamed compound; re-run
                    continue;
                }
                if compound.entries.is_empty() && compound.flattened.is_empty() {
                    let value = compound
                        .unknown_keys
                        .clone()
                        .unwrap_or_else(|| new_ref(NbtElement::Any));
                    *node.borrow_mut() = NbtElement::AnyCompound(value);
                    return Ok(());
                }
            }

            let name = self.register(&compound);
            *node.borrow_mut() = NbtElement::Named(name);
            return Ok(());
        }
    }

    /// Find a structurally equal registered compound or register this one
    /// under a fresh (possibly suffixed) name.
    fn register(&mut self, compound: &NbtCompound) -> String {
        if let Some((name, _)) = self
            .registry
            .iter()
            .find(|(_, existing)| existing.structural_eq(compound))
        {
            let name = name.clone();
            if let Some(handle) = &compound.name {
                self.assigned.entry(handle.clone()).or_insert(name.clone());
            }
            return name;
        }

        let base = match &compound.name {
            Some(handle) => handle.base_name(),
            None => format!("Compound{}", self.registry.len()),
        };
        let mut name = base.clone();
        let mut n = 2;
        while self.registry.contains_key(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.registry.insert(name.clone(), compound.clone());
        if let Some(handle) = &compound.name {
            self.assigned.entry(handle.clone()).or_insert(name.clone());
        }
        name
    }
}

/// Child cells of a node, in deterministic traversal order.
fn child_refs(node: &NbtRef) -> Vec<NbtRef> {
    match &*node.borrow() {
        NbtElement::List(inner) => vec![inner.clone()],
        NbtElement::Either(l, r) => vec![l.clone(), r.clone()],
        NbtElement::AnyCompound(v) => vec![v.clone()],
        NbtElement::Compound(c) => {
            let mut refs: Vec<NbtRef> = c.entries.values().map(|e| e.value.clone()).collect();
            if let Some(u) = &c.unknown_keys {
                refs.push(u.clone());
            }
            refs.extend(c.flattened.iter().cloned());
            refs
        }
        _ => Vec::new(),
    }
}
