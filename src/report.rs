//! Drivers: walk the dumper-produced entity lists, analyze one save method
//! per class, run the post passes, and assemble the deterministic output
//! document.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{info, warn};
use serde::Deserialize;

use crate::analysis::{Analyzer, MethodPointer};
use crate::common::error::{Error, Result};
use crate::common::loader::ClassLoader;
use crate::consts;
use crate::schema::json::{
    compound_to_json, CompoundTypeDef, EntityDef, SchemaDocument, TypeDef,
};
use crate::schema::naming::CompoundNamer;
use crate::schema::{NbtElement, NbtRef};

/// The reflection dumper's output: entity ids with class names, plus the
/// superclass map (dot-separated binary names).
#[derive(Debug, Clone, Deserialize)]
pub struct EntityList {
    pub entities: Vec<EntityEntry>,
    pub classes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityEntry {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub experimental: bool,
}

impl EntityList {
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// What to analyze and through which save hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Entities,
    BlockEntities { legacy_save: bool },
}

/// Block entities switched their save hook in 1.18.
pub fn block_entity_mode(version: &str) -> AnalysisMode {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    AnalysisMode::BlockEntities {
        legacy_save: (major, minor) < consts::BLOCK_ENTITY_SPLIT_VERSION,
    }
}

fn internal_name(binary: &str) -> String {
    binary.replace('.', "/")
}

fn simple_name(binary: &str) -> &str {
    let after_dot = binary.rsplit(['.', '/']).next().unwrap_or(binary);
    after_dot.rsplit('$').next().unwrap_or(after_dot)
}

/// Analyze every class reachable from the list and emit the schema document.
pub fn analyze(loader: ClassLoader, list: &EntityList, mode: AnalysisMode) -> Result<SchemaDocument> {
    let mut analyzer = Analyzer::new(loader);

    // the parent map's keys, values and the entity classes together form the
    // analyzed set; sorted iteration keeps naming deterministic
    let mut class_names: BTreeSet<String> = BTreeSet::new();
    for entry in &list.entities {
        class_names.insert(entry.class.clone());
    }
    for (child, parent) in &list.classes {
        class_names.insert(child.clone());
        class_names.insert(parent.clone());
    }

    let mut types: BTreeMap<String, (Option<String>, NbtRef)> = BTreeMap::new();
    for binary in &class_names {
        let parent = list.classes.get(binary).map(|p| simple_name(p).to_string());
        let is_root = !list.classes.contains_key(binary);
        let nbt = analyze_class(&mut analyzer, binary, is_root, mode)?;
        let name = simple_name(binary).to_string();
        if types.insert(name.clone(), (parent, nbt)).is_some() {
            warn!("duplicate simple class name {name}; keeping the later class");
        }
    }

    // post passes share one registry across all types
    let mut namer = CompoundNamer::new(analyzer.boxed_types.clone());
    for (_, (_, nbt)) in types.iter() {
        namer.flatten(nbt)?;
    }
    for (_, (_, nbt)) in types.iter() {
        namer.name_compounds(nbt)?;
    }
    let named = namer.finish();

    let mut entities: Vec<EntityDef> = list
        .entities
        .iter()
        .map(|e| EntityDef {
            id: e.id.clone(),
            type_name: simple_name(&e.class).to_string(),
            experimental: e.experimental,
        })
        .collect();
    entities.sort_by(|a, b| a.id.cmp(&b.id));

    let mut type_defs = Vec::with_capacity(types.len());
    for (name, (parent, nbt)) in &types {
        let compound = match &*nbt.borrow() {
            NbtElement::Compound(c) => c.clone(),
            other => {
                return Err(Error::invariant(format!(
                    "type root for {name} is {}, expected a compound",
                    other.kind_name()
                )))
            }
        };
        type_defs.push(TypeDef {
            name: name.clone(),
            parent: parent.clone(),
            nbt: compound_to_json(&compound, &named)?,
        });
    }

    let mut compound_types = Vec::with_capacity(named.registry.len());
    for (name, compound) in &named.registry {
        let def = compound_to_json(compound, &named)?;
        compound_types.push(CompoundTypeDef {
            name: name.clone(),
            entries: def.entries,
            unknown_keys: def.unknown_keys,
            flattened: def.flattened,
        });
    }
    compound_types.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(SchemaDocument {
        entities,
        types: type_defs,
        compound_types,
    })
}

/// One class's own contribution: the root is entered through its top-level
/// save method, every other class through its declared per-class hook with
/// super-calls skipped.
fn analyze_class(
    analyzer: &mut Analyzer,
    binary: &str,
    is_root: bool,
    mode: AnalysisMode,
) -> Result<NbtRef> {
    let internal = internal_name(binary);
    let hook = match mode {
        AnalysisMode::Entities if is_root => consts::SAVE_WITHOUT_ID,
        AnalysisMode::Entities => consts::ADD_ADDITIONAL_SAVE_DATA,
        AnalysisMode::BlockEntities { legacy_save: true } => consts::SAVE_LEGACY,
        AnalysisMode::BlockEntities { legacy_save: false } => consts::SAVE_ADDITIONAL,
    };

    let Some(class) = analyzer.resolve_class(&internal)? else {
        warn!("class {internal} not in archive; emitting an empty type");
        return Ok(crate::schema::new_ref(NbtElement::Compound(Default::default())));
    };
    let Some(method) = class.find_method_named(hook) else {
        // not overriding the hook means contributing no fields of its own
        return Ok(crate::schema::new_ref(NbtElement::Compound(Default::default())));
    };
    if method.code.is_none() {
        return Ok(crate::schema::new_ref(NbtElement::Compound(Default::default())));
    }

    info!("analyzing {binary} via {hook}");
    let ptr = MethodPointer::new(internal, hook, method.descriptor.clone());
    let ignore_super = !(mode == AnalysisMode::Entities && is_root);
    analyzer.analyze_entry(&ptr, ignore_super)
}
