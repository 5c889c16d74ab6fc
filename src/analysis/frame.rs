//! The runner's frame and the stack-map reconciliation discipline.
//!
//! The declared stack map gives correct but plain types at every join point;
//! the extra map carries full enriched snapshots along forward edges. At a
//! join the declared shape is authoritative and enrichment survives exactly
//! where a snapshot or the live frame agrees with it class-wise.

use crate::classfile::attribute::{StackMapEntry, VType};

use super::value::Value;

/// Locals plus operand stack. Locals are slot-indexed (wide values occupy a
/// value cell followed by a [`Value::Second`] filler); the stack holds one
/// cell per value regardless of width.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
}

impl Frame {
    /// Entry frame: arguments laid out from slot 0, the rest uninitialized.
    pub fn entry(max_locals: usize, args: &[Value]) -> Frame {
        let mut locals = Vec::with_capacity(max_locals);
        for arg in args {
            let width = arg.width();
            locals.push(arg.clone());
            if width == 2 {
                locals.push(Value::Second);
            }
        }
        while locals.len() < max_locals {
            locals.push(Value::Uninitialized);
        }
        Frame {
            locals,
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn peek(&self, depth: usize) -> Option<&Value> {
        let len = self.stack.len();
        if depth < len {
            self.stack.get(len - 1 - depth)
        } else {
            None
        }
    }

    pub fn get_local(&self, idx: u16) -> Value {
        self.locals
            .get(idx as usize)
            .cloned()
            .unwrap_or(Value::Uninitialized)
    }

    pub fn set_local(&mut self, idx: u16, value: Value) {
        let idx = idx as usize;
        if self.locals.len() <= idx + 1 {
            self.locals.resize(idx + 2, Value::Uninitialized);
        }
        let wide = value.width() == 2;
        self.locals[idx] = value;
        if wide {
            self.locals[idx + 1] = Value::Second;
        }
    }

    /// Every live tagged value, including those captured inside lambdas.
    pub fn for_each_tag_mut(&mut self, f: &mut impl FnMut(&mut super::value::TypedTag)) {
        fn walk(value: &mut Value, f: &mut impl FnMut(&mut super::value::TypedTag)) {
            match value {
                Value::Tagged(t) => f(t),
                Value::Lambda(l) => {
                    for bound in &mut l.bound {
                        walk(bound, f);
                    }
                }
                _ => {}
            }
        }
        for v in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            walk(v, f);
        }
    }
}

/// Plain frame value for a declared verification type.
pub fn plain_value(vtype: &VType, current_class: &str) -> Value {
    match vtype {
        VType::Top => Value::Uninitialized,
        VType::Integer => Value::Int,
        VType::Float => Value::Float,
        VType::Double => Value::Double,
        VType::Long => Value::Long,
        VType::Null => Value::Null,
        VType::UninitializedThis => Value::Ref(current_class.to_string()),
        VType::Object(name) => Value::Ref(name.clone()),
        VType::Uninitialized(_) => Value::Uninitialized,
    }
}

fn declared_token(vtype: &VType, current_class: &str) -> Option<String> {
    match vtype {
        VType::Integer => Some("I".to_string()),
        VType::Float => Some("F".to_string()),
        VType::Double => Some("D".to_string()),
        VType::Long => Some("J".to_string()),
        VType::Object(name) => Some(name.clone()),
        VType::UninitializedThis => Some(current_class.to_string()),
        _ => None,
    }
}

fn pick(declared: &VType, extra: Option<&Value>, live: Option<&Value>, current_class: &str) -> Value {
    if let Some(token) = declared_token(declared, current_class) {
        if let Some(candidate) = extra {
            if candidate.type_token().as_deref() == Some(token.as_str()) {
                return candidate.clone();
            }
        }
        if let Some(candidate) = live {
            if candidate.type_token().as_deref() == Some(token.as_str()) {
                return candidate.clone();
            }
        }
    }
    plain_value(declared, current_class)
}

/// Rebuild the frame at a stack-map entry, preserving enrichment wherever a
/// snapshot or the previous live frame matches the declared slot class.
pub fn reconcile(
    live: &Frame,
    declared: &StackMapEntry,
    extra: Option<&Frame>,
    current_class: &str,
    max_locals: usize,
) -> Frame {
    let mut locals = Vec::with_capacity(max_locals);
    for vtype in &declared.locals {
        let slot = locals.len();
        let value = pick(
            vtype,
            extra.and_then(|e| e.locals.get(slot)),
            live.locals.get(slot),
            current_class,
        );
        locals.push(value);
        if vtype.width() == 2 {
            locals.push(Value::Second);
        }
    }
    while locals.len() < max_locals {
        locals.push(Value::Uninitialized);
    }

    let stack = declared
        .stack
        .iter()
        .enumerate()
        .map(|(i, vtype)| {
            pick(
                vtype,
                extra.and_then(|e| e.stack.get(i)),
                live.stack.get(i),
                current_class,
            )
        })
        .collect();

    Frame { locals, stack }
}
