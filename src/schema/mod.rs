//! Schema algebra: the `NbtElement` lattice, compound container, the
//! post-processing passes and the serialized model.

pub mod compound;
pub mod element;
pub mod json;
pub mod naming;

pub use compound::{NameHandle, NbtCompound, NbtEntry};
pub use element::{
    deep_clone, element_eq, encompass, merge, new_ref, MergeError, MergeStrategy, NbtElement,
    NbtRef,
};
