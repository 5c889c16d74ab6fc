//! The portable JSON schema model.
//!
//! Field names and tags here are the output contract consumed by downstream
//! code generation; the structures round-trip losslessly through serde_json.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::error::{Error, Result};

use super::compound::NbtCompound;
use super::element::{NbtElement, NbtRef};
use super::naming::NamedCompounds;

/// A schema value as serialized. `Compound` is the *named reference* form;
/// structural compounds only ever appear as [`CompoundDef`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NbtType {
    Any,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    ByteArray,
    IntArray,
    LongArray,
    Uuid,
    Boolean,
    List {
        inner: Box<NbtType>,
    },
    Either {
        left: Box<NbtType>,
        right: Box<NbtType>,
    },
    AnyCompound {
        #[serde(rename = "valueType")]
        value_type: Box<NbtType>,
    },
    Compound {
        name: String,
    },
    Boxed {
        name: String,
    },
    NestedEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDef {
    pub value: NbtType,
    pub optional: bool,
}

/// Structural compound body shared by type records and named definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundDef {
    pub entries: IndexMap<String, EntryDef>,
    #[serde(rename = "unknownKeys")]
    pub unknown_keys: Option<NbtType>,
    pub flattened: Vec<NbtType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub experimental: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub parent: Option<String>,
    pub nbt: CompoundDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundTypeDef {
    pub name: String,
    pub entries: IndexMap<String, EntryDef>,
    #[serde(rename = "unknownKeys")]
    pub unknown_keys: Option<NbtType>,
    pub flattened: Vec<NbtType>,
}

/// The whole emitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub entities: Vec<EntityDef>,
    pub types: Vec<TypeDef>,
    #[serde(rename = "compoundTypes")]
    pub compound_types: Vec<CompoundTypeDef>,
}

/// Convert a post-naming schema node. Raw compounds must not remain.
pub fn element_to_json(node: &NbtRef, names: &NamedCompounds) -> Result<NbtType> {
    Ok(match &*node.borrow() {
        NbtElement::Any => NbtType::Any,
        NbtElement::Byte => NbtType::Byte,
        NbtElement::Short => NbtType::Short,
        NbtElement::Int => NbtType::Int,
        NbtElement::Long => NbtType::Long,
        NbtElement::Float => NbtType::Float,
        NbtElement::Double => NbtType::Double,
        NbtElement::String => NbtType::String,
        NbtElement::ByteArray => NbtType::ByteArray,
        NbtElement::IntArray => NbtType::IntArray,
        NbtElement::LongArray => NbtType::LongArray,
        NbtElement::Uuid => NbtType::Uuid,
        NbtElement::Boolean => NbtType::Boolean,
        NbtElement::List(inner) => NbtType::List {
            inner: Box::new(element_to_json(inner, names)?),
        },
        NbtElement::Either(left, right) => NbtType::Either {
            left: Box::new(element_to_json(left, names)?),
            right: Box::new(element_to_json(right, names)?),
        },
        NbtElement::AnyCompound(value) => NbtType::AnyCompound {
            value_type: Box::new(element_to_json(value, names)?),
        },
        NbtElement::Named(name) => NbtType::Compound { name: name.clone() },
        NbtElement::Boxed(handle) => {
            let name = names.assigned.get(handle).ok_or_else(|| {
                Error::invariant(format!(
                    "boxed reference to {} has no registered compound",
                    handle.base_name()
                ))
            })?;
            NbtType::Boxed { name: name.clone() }
        }
        NbtElement::NestedEntity => NbtType::NestedEntity,
        NbtElement::Compound(_) => {
            return Err(Error::invariant(
                "structural compound survived the naming pass",
            ))
        }
    })
}

/// Convert a post-naming compound body (a type root or registry member).
pub fn compound_to_json(compound: &NbtCompound, names: &NamedCompounds) -> Result<CompoundDef> {
    let mut entries = IndexMap::with_capacity(compound.entries.len());
    for (key, entry) in &compound.entries {
        entries.insert(
            key.clone(),
            EntryDef {
                value: element_to_json(&entry.value, names)?,
                optional: entry.optional,
            },
        );
    }
    let unknown_keys = compound
        .unknown_keys
        .as_ref()
        .map(|u| element_to_json(u, names))
        .transpose()?;
    let flattened = compound
        .flattened
        .iter()
        .map(|f| element_to_json(f, names))
        .collect::<Result<_>>()?;
    Ok(CompoundDef {
        entries,
        unknown_keys,
        flattened,
    })
}
