//! The symbolic value domain.
//!
//! Frame cells hold plain descriptor values or one of the enriched variants
//! that carry extra static information through the interpreter: known string
//! and int constants, string arrays with known slots, lambda values bound to
//! their backing method, and NBT-typed tags. Equality and hashing are
//! canonical under *untyping*: a tagged value keys the same as its bare
//! reference descriptor, which is the invariance the memoizer needs.

use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::classfile::descriptor;
use crate::classfile::insn::JKind;
use crate::schema::{new_ref, NbtCompound, NbtElement, NbtRef};
use crate::consts;

use super::MethodPointer;

/// A functional-interface value remembering its backing static method and
/// captured arguments (already extended with placeholder parameters).
#[derive(Debug, Clone)]
pub struct LambdaValue {
    pub iface: String,
    pub target: MethodPointer,
    pub bound: Vec<Value>,
}

/// An NBT-typed value: the concrete tag class, the schema being built, and
/// the branch-scope boundary for optionality.
#[derive(Debug, Clone)]
pub struct TypedTag {
    pub class: String,
    pub nbt: NbtRef,
    /// Writes recorded while `pc < optional_until` are branch-scoped and
    /// therefore optional.
    pub optional_until: u32,
}

/// One frame cell.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Unused or unknowable slot.
    #[default]
    Uninitialized,
    /// High half of a long/double occupying the following local slot.
    Second,
    Null,
    Int,
    Long,
    Float,
    Double,
    /// Plain reference; internal class name or array descriptor.
    Ref(String),
    IntConst(i32),
    StrConst(String),
    /// String array with some concretely known slots, shared across copies
    /// so stores through one alias are seen by all.
    StrArray(Rc<RefCell<Vec<Option<String>>>>),
    /// A string known to be one of the (non-null) slots of an array.
    StrOneOf(Rc<RefCell<Vec<Option<String>>>>),
    Lambda(LambdaValue),
    Tagged(TypedTag),
}

impl Value {
    /// Operand-stack width; 2 for long/double.
    pub fn width(&self) -> usize {
        match self {
            Value::Long | Value::Double => 2,
            _ => 1,
        }
    }

    /// Plain frame value for a field descriptor; sub-int types collapse to
    /// int per stack width rules.
    pub fn from_descriptor(desc: &str) -> Value {
        match desc {
            "B" | "C" | "S" | "Z" | "I" => Value::Int,
            "J" => Value::Long,
            "F" => Value::Float,
            "D" => Value::Double,
            _ => match descriptor::reference_name(desc) {
                Some(name) => Value::Ref(name.to_string()),
                None => Value::Uninitialized,
            },
        }
    }

    pub fn plain_of(kind: JKind) -> Value {
        match kind {
            JKind::Int => Value::Int,
            JKind::Long => Value::Long,
            JKind::Float => Value::Float,
            JKind::Double => Value::Double,
            JKind::Ref => Value::Ref("java/lang/Object".to_string()),
        }
    }

    /// The descriptor-level type token used for stack-map reconciliation:
    /// class/array name for references, a primitive letter otherwise.
    pub fn type_token(&self) -> Option<String> {
        Some(match self {
            Value::Int | Value::IntConst(_) => "I".to_string(),
            Value::Long => "J".to_string(),
            Value::Float => "F".to_string(),
            Value::Double => "D".to_string(),
            Value::Ref(name) => name.clone(),
            Value::StrConst(_) => "java/lang/String".to_string(),
            Value::StrArray(_) => "[Ljava/lang/String;".to_string(),
            Value::StrOneOf(_) => "java/lang/String".to_string(),
            Value::Lambda(l) => l.iface.clone(),
            Value::Tagged(t) => t.class.clone(),
            Value::Uninitialized | Value::Second | Value::Null => return None,
        })
    }

    /// Strip attached schema information, yielding the clean descriptor
    /// value used in memoization keys.
    pub fn untyped(&self) -> Value {
        match self {
            Value::Tagged(t) => Value::Ref(t.class.clone()),
            Value::Lambda(l) => Value::Lambda(LambdaValue {
                iface: l.iface.clone(),
                target: l.target.clone(),
                bound: l.bound.iter().map(Value::untyped).collect(),
            }),
            other => other.clone(),
        }
    }

    /// Compact rendering for naming keys; stable across runs.
    pub fn key_fragment(&self) -> String {
        match self {
            Value::Uninitialized => "?".to_string(),
            Value::Second => "^".to_string(),
            Value::Null => "null".to_string(),
            Value::Int => "I".to_string(),
            Value::Long => "J".to_string(),
            Value::Float => "F".to_string(),
            Value::Double => "D".to_string(),
            Value::Ref(name) => name.clone(),
            Value::IntConst(v) => format!("I={v}"),
            Value::StrConst(s) => format!("S={s}"),
            Value::StrArray(slots) => format!("[S;{}", slots.borrow().len()),
            Value::StrOneOf(slots) => format!("S|{}", slots.borrow().len()),
            Value::Lambda(l) => format!(
                "\\{}:{}{}",
                l.target.class, l.target.name, l.target.descriptor
            ),
            Value::Tagged(t) => t.class.clone(),
        }
    }
}

// Canonical equality: a tagged value equals its stripped form, so the memo
// key is invariant under untyping by construction.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Uninitialized, Uninitialized)
            | (Second, Second)
            | (Null, Null)
            | (Int, Int)
            | (Long, Long)
            | (Float, Float)
            | (Double, Double) => true,
            (Ref(a), Ref(b)) => a == b,
            (IntConst(a), IntConst(b)) => a == b,
            (StrConst(a), StrConst(b)) => a == b,
            (StrArray(a), StrArray(b)) | (StrOneOf(a), StrOneOf(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Lambda(a), Lambda(b)) => {
                a.iface == b.iface && a.target == b.target && a.bound == b.bound
            }
            (Tagged(a), Tagged(b)) => a.class == b.class,
            (Tagged(t), Ref(c)) | (Ref(c), Tagged(t)) => &t.class == c,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        match self {
            Uninitialized => 0u8.hash(state),
            Second => 1u8.hash(state),
            Null => 2u8.hash(state),
            Int => 3u8.hash(state),
            Long => 4u8.hash(state),
            Float => 5u8.hash(state),
            Double => 6u8.hash(state),
            Ref(name) => {
                7u8.hash(state);
                name.hash(state);
            }
            IntConst(v) => {
                8u8.hash(state);
                v.hash(state);
            }
            StrConst(s) => {
                9u8.hash(state);
                s.hash(state);
            }
            StrArray(slots) => {
                10u8.hash(state);
                slots.borrow().hash(state);
            }
            StrOneOf(slots) => {
                11u8.hash(state);
                slots.borrow().hash(state);
            }
            Lambda(l) => {
                12u8.hash(state);
                l.iface.hash(state);
                l.target.hash(state);
                l.bound.hash(state);
            }
            // hashes like its stripped Ref form
            Tagged(t) => {
                7u8.hash(state);
                t.class.hash(state);
            }
        }
    }
}

/// Whether `class` is part of the NBT tag hierarchy.
pub fn is_nbt_class(class: &str) -> bool {
    class.starts_with("net/minecraft/nbt/")
}

/// Fresh schema seed for a value of the given tag class.
pub fn seed_element(class: &str) -> NbtElement {
    if class == consts::COMPOUND_TAG {
        NbtElement::Compound(NbtCompound::default())
    } else if class == consts::LIST_TAG {
        NbtElement::List(new_ref(NbtElement::Any))
    } else {
        NbtElement::for_tag_class(class).unwrap_or(NbtElement::Any)
    }
}

/// Wrap a bare NBT reference in a typed tag so writes through it are
/// recorded. Already-typed values and non-NBT values pass through.
pub fn ensure_typed(value: Value, optional_until: u32) -> Value {
    match value {
        Value::Ref(class) if is_nbt_class(&class) => {
            let nbt = new_ref(seed_element(&class));
            Value::Tagged(TypedTag {
                class,
                nbt,
                optional_until,
            })
        }
        other => other,
    }
}
