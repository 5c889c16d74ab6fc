//! The structured compound node and its naming handle.

use indexmap::IndexMap;

use super::element::{encompass, merge, new_ref, MergeError, MergeStrategy, NbtElement, NbtRef};

/// Identity of the call that first materialized a compound. Doubles as the
/// recursion-detection key and the seed for the naming pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameHandle {
    /// Internal name of the declaring class.
    pub class: String,
    /// Method name.
    pub method: String,
    /// Canonical rendering of the erased argument list, so two
    /// specializations of one method stay distinct.
    pub args_key: String,
}

impl NameHandle {
    /// Human-readable base name derived from the call site, e.g.
    /// `Save_save` for `a/b/Save.save`.
    pub fn base_name(&self) -> String {
        let simple = self
            .class
            .rsplit('/')
            .next()
            .unwrap_or(&self.class)
            .rsplit('$')
            .next()
            .unwrap_or(&self.class);
        format!("{simple}_{}", self.method)
    }
}

/// One keyed field of a compound.
#[derive(Debug, Clone)]
pub struct NbtEntry {
    pub value: NbtRef,
    pub optional: bool,
}

/// A structured compound: ordered named fields, an optional unknown-keys
/// channel, and sub-compounds awaiting flattening.
#[derive(Debug, Clone, Default)]
pub struct NbtCompound {
    pub entries: IndexMap<String, NbtEntry>,
    pub name: Option<NameHandle>,
    pub unknown_keys: Option<NbtRef>,
    /// Members to be inlined into this compound's fields by the flatten
    /// pass. Restricted to `Compound` and `Boxed` nodes.
    pub flattened: Vec<NbtRef>,
}

impl NbtCompound {
    /// Record a write of `key`. An existing entry merges value-wise and
    /// combines optionality per `strategy`.
    pub fn put(
        &mut self,
        key: &str,
        value: NbtRef,
        optional: bool,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        if let Some(entry) = self.entries.get_mut(key) {
            let merged = merge(&entry.value, &value, strategy)?;
            entry.value = merged;
            entry.optional = strategy.combine_optional(entry.optional, optional);
        } else {
            self.entries
                .insert(key.to_string(), NbtEntry { value, optional });
        }
        Ok(())
    }

    /// Admit arbitrary extra keys of (at least) `value`'s type.
    pub fn put_unknown(&mut self, value: &NbtRef) {
        let current = self
            .unknown_keys
            .clone()
            .unwrap_or_else(|| new_ref(NbtElement::Any));
        self.unknown_keys = Some(encompass(&current, value));
    }

    /// Key-wise merge of another compound into this one: entries merge per
    /// strategy, unknown-keys join via encompass, flattened lists
    /// concatenate, first non-null name wins.
    pub fn merge_from(
        &mut self,
        other: &NbtCompound,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        for (key, entry) in &other.entries {
            self.put(key, entry.value.clone(), entry.optional, strategy)?;
        }
        if let Some(other_unknown) = &other.unknown_keys {
            self.put_unknown(other_unknown);
        }
        self.flattened.extend(other.flattened.iter().cloned());
        if self.name.is_none() {
            self.name = other.name.clone();
        }
        Ok(())
    }

    pub fn deep_clone(&self) -> NbtCompound {
        NbtCompound {
            entries: self
                .entries
                .iter()
                .map(|(k, e)| {
                    (
                        k.clone(),
                        NbtEntry {
                            value: super::element::deep_clone(&e.value),
                            optional: e.optional,
                        },
                    )
                })
                .collect(),
            name: self.name.clone(),
            unknown_keys: self.unknown_keys.as_ref().map(super::element::deep_clone),
            flattened: self.flattened.iter().map(super::element::deep_clone).collect(),
        }
    }

    /// Structural equality including entry order; the naming handle is
    /// ignored so the registry can deduplicate shapes from different sites.
    pub fn structural_eq(&self, other: &NbtCompound) -> bool {
        use super::element::element_eq;
        if self.entries.len() != other.entries.len()
            || self.flattened.len() != other.flattened.len()
            || self.unknown_keys.is_some() != other.unknown_keys.is_some()
        {
            return false;
        }
        for ((ka, ea), (kb, eb)) in self.entries.iter().zip(other.entries.iter()) {
            if ka != kb || ea.optional != eb.optional || !element_eq(&ea.value, &eb.value) {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.unknown_keys, &other.unknown_keys) {
            if !element_eq(a, b) {
                return false;
            }
        }
        self.flattened
            .iter()
            .zip(other.flattened.iter())
            .all(|(a, b)| element_eq(a, b))
    }
}
