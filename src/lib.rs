//! NBT schema extraction from JVM class archives (nbtex)
//!
//! Infers a static schema (a typed tree of field names, primitive tags,
//! lists and compound structures) for the NBT payload each save method in a
//! class archive produces, by abstractly executing its bytecode.
//!
//! ## Architecture
//!
//! The pipeline, leaves first:
//!
//! - **classfile**: minimal class-file parsing (constant pool, methods with
//!   bytecode, stack-map tables, bootstrap methods) and bytecode decoding
//! - **common**: errors, class sources (jar/directory) and the parse-once
//!   class loader
//! - **schema**: the `NbtElement` lattice with merge/encompass/clone, the
//!   compound container, the flatten and naming post passes, and the JSON
//!   output model
//! - **analysis**: the symbolic value domain, the per-method runner with
//!   stack-map-driven linear traversal, and the memoizing `Analyzer` with
//!   recursion boxing
//! - **report**: the entity / block-entity drivers assembling the final
//!   document
//!
//! ## Flow
//!
//! ```text
//! archive → ClassLoader → Analyzer.call(entry) → MethodRunner walk
//!                              ↓ nested calls (memoized)
//!             compound trees → flatten → name compounds → SchemaDocument
//! ```

pub mod analysis;
pub mod classfile;
pub mod common;
pub mod consts;
pub mod report;
pub mod schema;

use std::path::Path;

pub use common::{Error, Result};
pub use report::{AnalysisMode, EntityList};
pub use schema::json::SchemaDocument;

/// Analyze the entity hierarchy of an archive.
pub fn analyze_entities(archive: &Path, list: &EntityList) -> Result<SchemaDocument> {
    let loader = common::loader::ClassLoader::from_path(archive)?;
    report::analyze(loader, list, AnalysisMode::Entities)
}

/// Analyze the block-entity hierarchy of an archive; `version` selects the
/// save hook generation (e.g. `"1.17.1"` vs `"1.20"`).
pub fn analyze_block_entities(
    archive: &Path,
    version: &str,
    list: &EntityList,
) -> Result<SchemaDocument> {
    let loader = common::loader::ClassLoader::from_path(archive)?;
    report::analyze(loader, list, report::block_entity_mode(version))
}
