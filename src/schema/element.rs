//! The schema value lattice.
//!
//! Schema nodes are shared mutable cells (`NbtRef`): the interpreter aliases
//! one compound from several frame slots and across call boundaries, and a
//! write through any alias must be visible through all of them. `merge`,
//! `encompass` and `deep_clone` are the only operations that combine or copy
//! nodes.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::consts;

use super::compound::{NameHandle, NbtCompound};

pub type NbtRef = Rc<RefCell<NbtElement>>;

pub fn new_ref(element: NbtElement) -> NbtRef {
    Rc::new(RefCell::new(element))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge {left} with {right}")]
    Incompatible { left: String, right: String },
}

/// How two entries for the same key combine.
///
/// Within one observed dataset, two writes of the same key mean the key is
/// written on every path that performs either write, so optionality cancels
/// (XOR). Across datasets (distinct return paths) a key optional anywhere
/// stays optional (OR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    SameDataSet,
    DifferentDataSet,
}

impl MergeStrategy {
    pub fn combine_optional(self, a: bool, b: bool) -> bool {
        match self {
            MergeStrategy::SameDataSet => a != b,
            MergeStrategy::DifferentDataSet => a || b,
        }
    }
}

/// A schema value.
#[derive(Debug, Clone, Default)]
pub enum NbtElement {
    /// Unknown; absorbs into the other side of any merge.
    #[default]
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
    /// Serialized as an int array downstream, kept distinct here.
    Uuid,
    /// Serialized as a byte downstream, kept distinct here.
    Boolean,
    /// Homogeneous list; the inner element merges across adds.
    List(NbtRef),
    /// Value-level two-way branch.
    Either(NbtRef, NbtRef),
    /// Compound with statically unknown keys, all values of one type.
    AnyCompound(NbtRef),
    Compound(NbtCompound),
    /// Back-reference breaking a recursion cycle; resolved to a registry
    /// name by the naming pass.
    Boxed(NameHandle),
    /// Back-reference to the polymorphic entity enum (passenger relation).
    NestedEntity,
    /// Reference to a named compound definition; appears only after naming.
    Named(String),
}

impl NbtElement {
    pub fn is_any(&self) -> bool {
        matches!(self, NbtElement::Any)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, NbtElement::Compound(_))
    }

    /// Short tag name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NbtElement::Any => "Any",
            NbtElement::Byte => "Byte",
            NbtElement::Short => "Short",
            NbtElement::Int => "Int",
            NbtElement::Long => "Long",
            NbtElement::Float => "Float",
            NbtElement::Double => "Double",
            NbtElement::String => "String",
            NbtElement::ByteArray => "ByteArray",
            NbtElement::IntArray => "IntArray",
            NbtElement::LongArray => "LongArray",
            NbtElement::Uuid => "Uuid",
            NbtElement::Boolean => "Boolean",
            NbtElement::List(_) => "List",
            NbtElement::Either(..) => "Either",
            NbtElement::AnyCompound(_) => "AnyCompound",
            NbtElement::Compound(_) => "Compound",
            NbtElement::Boxed(_) => "Boxed",
            NbtElement::NestedEntity => "NestedEntity",
            NbtElement::Named(_) => "Named",
        }
    }

    /// Leaf element for a concrete tag class, `None` for the container and
    /// root types which need context to interpret.
    pub fn for_tag_class(class: &str) -> Option<NbtElement> {
        Some(match class {
            consts::BYTE_TAG => NbtElement::Byte,
            consts::SHORT_TAG => NbtElement::Short,
            consts::INT_TAG => NbtElement::Int,
            consts::LONG_TAG => NbtElement::Long,
            consts::FLOAT_TAG => NbtElement::Float,
            consts::DOUBLE_TAG => NbtElement::Double,
            consts::STRING_TAG => NbtElement::String,
            consts::BYTE_ARRAY_TAG => NbtElement::ByteArray,
            consts::INT_ARRAY_TAG => NbtElement::IntArray,
            consts::LONG_ARRAY_TAG => NbtElement::LongArray,
            _ => return None,
        })
    }
}

fn incompatible(a: &NbtElement, b: &NbtElement) -> MergeError {
    MergeError::Incompatible {
        left: a.kind_name().to_string(),
        right: b.kind_name().to_string(),
    }
}

/// Fold two schemas describing the same position.
pub fn merge(a: &NbtRef, b: &NbtRef, strategy: MergeStrategy) -> Result<NbtRef, MergeError> {
    if Rc::ptr_eq(a, b) {
        return Ok(a.clone());
    }
    if a.borrow().is_any() {
        return Ok(b.clone());
    }
    if b.borrow().is_any() {
        return Ok(a.clone());
    }

    // `Either` always leads the match, whichever side it arrived on.
    let b_is_either = matches!(&*b.borrow(), NbtElement::Either(..));
    if b_is_either && !matches!(&*a.borrow(), NbtElement::Either(..)) {
        return merge(b, a, strategy);
    }

    let bval = b.borrow().clone();
    let mut aval = a.borrow_mut();
    match (&mut *aval, bval) {
        (NbtElement::Byte, NbtElement::Byte)
        | (NbtElement::Short, NbtElement::Short)
        | (NbtElement::Int, NbtElement::Int)
        | (NbtElement::Long, NbtElement::Long)
        | (NbtElement::Float, NbtElement::Float)
        | (NbtElement::Double, NbtElement::Double)
        | (NbtElement::String, NbtElement::String)
        | (NbtElement::ByteArray, NbtElement::ByteArray)
        | (NbtElement::IntArray, NbtElement::IntArray)
        | (NbtElement::LongArray, NbtElement::LongArray)
        | (NbtElement::Uuid, NbtElement::Uuid)
        | (NbtElement::Boolean, NbtElement::Boolean)
        | (NbtElement::NestedEntity, NbtElement::NestedEntity) => {}

        (NbtElement::List(inner), NbtElement::List(other_inner)) => {
            let merged = merge(&inner.clone(), &other_inner, strategy)?;
            *inner = merged;
        }

        (NbtElement::Either(left, right), NbtElement::Either(other_left, other_right)) => {
            let l = merge(&left.clone(), &other_left, strategy)?;
            let r = merge(&right.clone(), &other_right, strategy)?;
            *left = l;
            *right = r;
        }
        (NbtElement::Either(left, right), ref other) => {
            // A plain value folding into a sum must already be one of the
            // sides; anything else is a genuine shape conflict.
            let matches_side =
                element_matches(&left.borrow(), other) || element_matches(&right.borrow(), other);
            if !matches_side {
                return Err(MergeError::Incompatible {
                    left: "Either".to_string(),
                    right: other.kind_name().to_string(),
                });
            }
        }

        (NbtElement::AnyCompound(value), NbtElement::AnyCompound(other_value)) => {
            let joined = encompass(&value.clone(), &other_value);
            *value = joined;
        }
        // Structure is strictly more informative than an unknown-key record.
        (NbtElement::AnyCompound(_), other @ NbtElement::Compound(_)) => {
            *aval = other;
        }
        (NbtElement::Compound(_), NbtElement::AnyCompound(_)) => {}

        (NbtElement::Compound(c), NbtElement::Compound(other_c)) => {
            c.merge_from(&other_c, strategy)?;
        }

        (NbtElement::Boxed(h1), NbtElement::Boxed(ref h2)) => {
            if h1 != h2 {
                return Err(MergeError::Incompatible {
                    left: format!("Boxed({})", h1.base_name()),
                    right: format!("Boxed({})", h2.base_name()),
                });
            }
        }

        (NbtElement::Named(n1), NbtElement::Named(ref n2)) => {
            if n1 != n2 {
                return Err(MergeError::Incompatible {
                    left: format!("Named({n1})"),
                    right: format!("Named({n2})"),
                });
            }
        }

        (a_el, ref b_el) => return Err(incompatible(a_el, b_el)),
    }
    drop(aval);
    Ok(a.clone())
}

/// Shallow shape test used by the `Either ⊕ plain` rule.
fn element_matches(side: &NbtElement, candidate: &NbtElement) -> bool {
    match (side, candidate) {
        (NbtElement::Compound(a), NbtElement::Compound(b)) => match (&a.name, &b.name) {
            (Some(n1), Some(n2)) => n1 == n2,
            _ => true,
        },
        _ => side.kind_name() == candidate.kind_name(),
    }
}

/// Least upper bound used for the unknown-keys channel. Lossy by design:
/// compounds collapse to their value fold.
pub fn encompass(a: &NbtRef, b: &NbtRef) -> NbtRef {
    if Rc::ptr_eq(a, b) || element_eq(a, b) {
        return a.clone();
    }
    if a.borrow().is_any() {
        return b.clone();
    }
    if b.borrow().is_any() {
        return a.clone();
    }

    let result = {
        let av = a.borrow();
        let bv = b.borrow();
        match (&*av, &*bv) {
            (NbtElement::List(ai), NbtElement::List(bi)) => {
                Some(NbtElement::List(encompass(ai, bi)))
            }
            (NbtElement::AnyCompound(avt), NbtElement::AnyCompound(bvt)) => {
                Some(NbtElement::AnyCompound(encompass(avt, bvt)))
            }
            (NbtElement::Compound(_), _) | (_, NbtElement::Compound(_))
            | (NbtElement::AnyCompound(_), _) | (_, NbtElement::AnyCompound(_)) => None,
            _ => Some(NbtElement::Any),
        }
    };
    match result {
        Some(el) => new_ref(el),
        None => {
            // at least one compound-shaped side: collapse both to value folds
            let av = collapse_values(a);
            let bv = collapse_values(b);
            new_ref(NbtElement::AnyCompound(encompass(&av, &bv)))
        }
    }
}

/// Fold of every value a compound-shaped node can hold.
fn collapse_values(x: &NbtRef) -> NbtRef {
    let xv = x.borrow();
    match &*xv {
        NbtElement::AnyCompound(v) => v.clone(),
        NbtElement::Compound(c) => {
            let mut acc = c
                .unknown_keys
                .clone()
                .unwrap_or_else(|| new_ref(NbtElement::Any));
            for entry in c.entries.values() {
                acc = encompass(&acc, &entry.value);
            }
            acc
        }
        _ => new_ref(NbtElement::Any),
    }
}

/// Deep structural copy; result shares no cells with the input.
pub fn deep_clone(x: &NbtRef) -> NbtRef {
    let xv = x.borrow();
    new_ref(match &*xv {
        NbtElement::List(inner) => NbtElement::List(deep_clone(inner)),
        NbtElement::Either(l, r) => NbtElement::Either(deep_clone(l), deep_clone(r)),
        NbtElement::AnyCompound(v) => NbtElement::AnyCompound(deep_clone(v)),
        NbtElement::Compound(c) => NbtElement::Compound(c.deep_clone()),
        other => other.clone(),
    })
}

/// Structural equality over the whole tree (insertion order of compound
/// entries included, since output order is part of the contract).
pub fn element_eq(a: &NbtRef, b: &NbtRef) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    let av = a.borrow();
    let bv = b.borrow();
    match (&*av, &*bv) {
        (NbtElement::List(ai), NbtElement::List(bi)) => element_eq(ai, bi),
        (NbtElement::Either(al, ar), NbtElement::Either(bl, br)) => {
            element_eq(al, bl) && element_eq(ar, br)
        }
        (NbtElement::AnyCompound(ai), NbtElement::AnyCompound(bi)) => element_eq(ai, bi),
        (NbtElement::Compound(ac), NbtElement::Compound(bc)) => ac.structural_eq(bc),
        (NbtElement::Boxed(ah), NbtElement::Boxed(bh)) => ah == bh,
        (NbtElement::Named(an), NbtElement::Named(bn)) => an == bn,
        (x, y) => {
            std::mem::discriminant(x) == std::mem::discriminant(y)
                && !matches!(
                    x,
                    NbtElement::List(_)
                        | NbtElement::Either(..)
                        | NbtElement::AnyCompound(_)
                        | NbtElement::Compound(_)
                        | NbtElement::Boxed(_)
                        | NbtElement::Named(_)
                )
        }
    }
}
