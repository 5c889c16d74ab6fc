//! The per-invocation symbolic executor.
//!
//! Walks the instruction list once in address order. At every declared
//! stack-map entry the frame is reconciled against the table (preserving
//! enrichment via forward-edge snapshots); unreachable stretches after an
//! unconditional transfer are skipped until the next entry. Branches widen
//! the `optional_until` scope of every live tag, which is what turns writes
//! inside conditionals into optional schema entries.

use std::collections::HashMap;
use std::rc::Rc;

use crate::classfile::attribute::StackMapEntry;
use crate::classfile::insn::{self, Insn, JKind};
use crate::classfile::{ClassFile, MethodInfo};
use crate::common::error::{Error, Result};
use crate::schema::{merge, MergeStrategy, NbtRef};

use super::frame::{reconcile, Frame};
use super::invoke;
use super::value::{ensure_typed, Value};
use super::Analyzer;

pub struct MethodRunner {
    pub class: Rc<ClassFile>,
    pub method_name: String,
    pub method_desc: String,
    pub ignore_super: bool,
    pub frame: Frame,
    pub pc: u32,
    max_locals: usize,
    insns: Vec<(u32, Insn)>,
    /// Declared stack map in absolute form, keyed by pc.
    declared: HashMap<u32, StackMapEntry>,
    /// Enriched snapshots stored along forward branches, keyed by target pc.
    extra: HashMap<u32, Frame>,
    /// Values observed at return instructions.
    return_values: Vec<Value>,
    dead: bool,
}

impl MethodRunner {
    pub fn new(
        class: Rc<ClassFile>,
        method: &MethodInfo,
        args: &[Value],
        ignore_super: bool,
    ) -> Result<Self> {
        let code = method.code.as_ref().ok_or_else(|| {
            Error::invariant(format!(
                "runner over abstract method {}.{}",
                class.name, method.name
            ))
        })?;
        let insns = insn::decode(&code.code, &class.pool, &class.name)?;
        let declared = code
            .stack_map
            .iter()
            .map(|entry| (entry.pc, entry.clone()))
            .collect();
        let frame = Frame::entry(code.max_locals as usize, args);
        Ok(Self {
            max_locals: code.max_locals as usize,
            class,
            method_name: method.name.clone(),
            method_desc: method.descriptor.clone(),
            ignore_super,
            frame,
            pc: 0,
            insns,
            declared,
            extra: HashMap::new(),
            return_values: Vec::new(),
            dead: false,
        })
    }

    pub fn err(&self, message: impl Into<String>) -> Error {
        Error::Interpreter {
            class: self.class.name.clone(),
            method: self.method_name.clone(),
            pc: self.pc,
            message: message.into(),
        }
    }

    pub fn merge_err(&self, source: crate::schema::MergeError) -> Error {
        Error::SchemaMergeFailure {
            class: self.class.name.clone(),
            method: self.method_name.clone(),
            pc: self.pc,
            source,
        }
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.frame
            .pop()
            .ok_or_else(|| self.err("operand stack underflow"))
    }

    pub fn push(&mut self, value: Value) {
        self.frame.push(value);
    }

    /// Pop `n` argument slots worth of values (one cell per value), returned
    /// in declaration order.
    pub fn pop_args(&mut self, descriptors: &[String]) -> Result<Vec<Value>> {
        let mut args = Vec::with_capacity(descriptors.len());
        for _ in descriptors {
            args.push(self.pop()?);
        }
        args.reverse();
        Ok(args)
    }

    pub fn run(&mut self, an: &mut Analyzer) -> Result<()> {
        let insns = std::mem::take(&mut self.insns);
        for (pc, insn) in &insns {
            self.pc = *pc;
            if let Some(declared) = self.declared.get(pc) {
                self.frame = reconcile(
                    &self.frame,
                    declared,
                    self.extra.get(pc),
                    &self.class.name,
                    self.max_locals,
                );
                self.dead = false;
            } else if self.dead {
                continue;
            }
            self.step(an, insn)?;
        }
        self.insns = insns;
        Ok(())
    }

    /// Merged schema of all observed returns; multiple return paths are
    /// distinct datasets.
    pub fn merged_return(&self) -> Result<Option<NbtRef>> {
        let mut acc: Option<NbtRef> = None;
        for v in &self.return_values {
            let Value::Tagged(tag) = v else { continue };
            acc = Some(match acc {
                None => tag.nbt.clone(),
                Some(prev) => merge(&prev, &tag.nbt, MergeStrategy::DifferentDataSet)
                    .map_err(|e| self.merge_err(e))?,
            });
        }
        Ok(acc)
    }

    /// Branch bookkeeping: snapshot the enriched frame along forward edges
    /// and widen every live tag's branch scope to the jump target.
    fn branch_to(&mut self, target: u32) {
        if target > self.pc {
            self.extra.insert(target, self.frame.clone());
        }
        self.frame.for_each_tag_mut(&mut |tag| {
            tag.optional_until = tag.optional_until.max(target);
        });
    }

    fn step(&mut self, an: &mut Analyzer, insn: &Insn) -> Result<()> {
        match insn {
            Insn::Nop => {}
            Insn::AConstNull => self.push(Value::Null),
            Insn::IConst(v) => self.push(Value::IntConst(*v)),
            Insn::LConst(_) => self.push(Value::Long),
            Insn::FConst(_) => self.push(Value::Float),
            Insn::DConst(_) => self.push(Value::Double),
            Insn::Ldc(constant) => {
                use crate::classfile::constpool::LoadableConstant::*;
                self.push(match constant {
                    Integer(v) => Value::IntConst(*v),
                    Float(_) => Value::Float,
                    Long(_) => Value::Long,
                    Double(_) => Value::Double,
                    Str(s) => Value::StrConst(s.clone()),
                    ClassRef(_) => Value::Ref("java/lang/Class".to_string()),
                    Other(_) => Value::Ref("java/lang/Object".to_string()),
                });
            }

            Insn::Load(kind, idx) => {
                let local = self.frame.get_local(*idx);
                let value = match local {
                    Value::Uninitialized | Value::Second => Value::plain_of(*kind),
                    v => v,
                };
                self.push(value);
            }
            Insn::Store(kind, idx) => {
                let mut value = self.pop()?;
                if *kind == JKind::Ref {
                    value = ensure_typed(value, 0);
                }
                self.frame.set_local(*idx, value);
            }

            Insn::ArrayLoad(kind) => {
                let index = self.pop()?;
                let array = self.pop()?;
                let value = match (kind, &array) {
                    (JKind::Ref, Value::StrArray(slots)) => match index {
                        Value::IntConst(i) => {
                            let slot = slots.borrow().get(i as usize).cloned().flatten();
                            match slot {
                                Some(s) => Value::StrConst(s),
                                None => Value::StrOneOf(slots.clone()),
                            }
                        }
                        _ => Value::StrOneOf(slots.clone()),
                    },
                    (JKind::Ref, Value::Ref(name)) => {
                        match crate::classfile::descriptor::array_element(name) {
                            Some(elem) => Value::Ref(elem.to_string()),
                            None => Value::Ref("java/lang/Object".to_string()),
                        }
                    }
                    (JKind::Ref, _) => Value::Ref("java/lang/Object".to_string()),
                    (k, _) => Value::plain_of(*k),
                };
                self.push(value);
            }
            Insn::ArrayStore(kind) => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop()?;
                if *kind == JKind::Ref {
                    if let (Value::StrArray(slots), Value::IntConst(i), Value::StrConst(s)) =
                        (&array, &index, &value)
                    {
                        let mut slots = slots.borrow_mut();
                        let i = *i as usize;
                        if i < slots.len() {
                            slots[i] = Some(s.clone());
                        }
                    }
                }
            }

            Insn::Pop => {
                self.pop()?;
            }
            Insn::Pop2 => {
                let v1 = self.pop()?;
                if v1.width() == 1 {
                    self.pop()?;
                }
            }
            Insn::Dup => {
                let v = self.peek_clone(0)?;
                self.push(v);
            }
            Insn::DupX1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.push(v1.clone());
                self.push(v2);
                self.push(v1);
            }
            Insn::DupX2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                if v2.width() == 2 {
                    self.push(v1.clone());
                    self.push(v2);
                    self.push(v1);
                } else {
                    let v3 = self.pop()?;
                    self.push(v1.clone());
                    self.push(v3);
                    self.push(v2);
                    self.push(v1);
                }
            }
            Insn::Dup2 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    self.push(v1.clone());
                    self.push(v1);
                } else {
                    let v2 = self.pop()?;
                    self.push(v2.clone());
                    self.push(v1.clone());
                    self.push(v2);
                    self.push(v1);
                }
            }
            Insn::Dup2X1 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    let v2 = self.pop()?;
                    self.push(v1.clone());
                    self.push(v2);
                    self.push(v1);
                } else {
                    let v2 = self.pop()?;
                    let v3 = self.pop()?;
                    self.push(v2.clone());
                    self.push(v1.clone());
                    self.push(v3);
                    self.push(v2);
                    self.push(v1);
                }
            }
            Insn::Dup2X2 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    let v2 = self.pop()?;
                    if v2.width() == 2 {
                        self.push(v1.clone());
                        self.push(v2);
                        self.push(v1);
                    } else {
                        let v3 = self.pop()?;
                        self.push(v1.clone());
                        self.push(v3);
                        self.push(v2);
                        self.push(v1);
                    }
                } else {
                    let v2 = self.pop()?;
                    let v3 = self.pop()?;
                    if v3.width() == 2 {
                        self.push(v2.clone());
                        self.push(v1.clone());
                        self.push(v3);
                        self.push(v2);
                        self.push(v1);
                    } else {
                        let v4 = self.pop()?;
                        self.push(v2.clone());
                        self.push(v1.clone());
                        self.push(v4);
                        self.push(v3);
                        self.push(v2);
                        self.push(v1);
                    }
                }
            }
            Insn::Swap => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.push(v1);
                self.push(v2);
            }

            Insn::Binary(kind) => {
                self.pop()?;
                self.pop()?;
                self.push(Value::plain_of(*kind));
            }
            Insn::Shift(kind) => {
                self.pop()?; // shift amount
                self.pop()?;
                self.push(Value::plain_of(*kind));
            }
            Insn::Neg(kind) => {
                self.pop()?;
                self.push(Value::plain_of(*kind));
            }
            Insn::IInc(idx, _) => {
                // a changed counter is no longer a known constant
                self.frame.set_local(*idx, Value::Int);
            }
            Insn::Convert(_, to) => {
                self.pop()?;
                self.push(Value::plain_of(*to));
            }
            Insn::Cmp(_) => {
                self.pop()?;
                self.pop()?;
                self.push(Value::Int);
            }

            Insn::If(target) | Insn::IfNull(target) => {
                self.pop()?;
                self.branch_to(*target);
            }
            Insn::IfICmp(target) | Insn::IfACmp(target) => {
                self.pop()?;
                self.pop()?;
                self.branch_to(*target);
            }
            Insn::Goto(target) => {
                self.branch_to(*target);
                self.dead = true;
            }
            Insn::TableSwitch { default, targets } | Insn::LookupSwitch { default, targets } => {
                self.pop()?;
                self.branch_to(*default);
                for t in targets.clone() {
                    self.branch_to(t);
                }
                self.dead = true;
            }

            Insn::Return(kind) => {
                if kind.is_some() {
                    let v = self.pop()?;
                    self.return_values.push(v);
                }
                self.dead = true;
            }
            Insn::AThrow => {
                self.pop()?;
                self.dead = true;
            }

            Insn::GetStatic(member) => {
                let key = format!("{}.{}:{}", member.class, member.name, member.descriptor);
                match an.statics.get(&key) {
                    Some(v) => {
                        let v = v.clone();
                        self.push(v);
                    }
                    None => self.push(Value::from_descriptor(&member.descriptor)),
                }
            }
            Insn::PutStatic(member) => {
                let value = self.pop()?;
                let key = format!("{}.{}:{}", member.class, member.name, member.descriptor);
                an.statics.insert(key, value);
            }
            Insn::GetField(member) => {
                self.pop()?; // receiver
                let value = ensure_typed(Value::from_descriptor(&member.descriptor), 0);
                self.push(value);
            }
            Insn::PutField(member) => {
                let _ = member;
                self.pop()?; // value
                self.pop()?; // receiver
            }

            Insn::InvokeVirtual(member) => {
                invoke::invoke(self, an, invoke::InvokeKind::Virtual, member)?
            }
            Insn::InvokeInterface(member) => {
                invoke::invoke(self, an, invoke::InvokeKind::Interface, member)?
            }
            Insn::InvokeSpecial(member) => {
                invoke::invoke(self, an, invoke::InvokeKind::Special, member)?
            }
            Insn::InvokeStatic(member) => {
                invoke::invoke(self, an, invoke::InvokeKind::Static, member)?
            }
            Insn::InvokeDynamic {
                bootstrap,
                name,
                descriptor,
            } => invoke::invoke_dynamic(self, an, *bootstrap, name, descriptor)?,

            Insn::New(name) => self.push(Value::Ref(name.clone())),
            Insn::NewArray(name) => {
                let size = self.pop()?;
                if name == "[Ljava/lang/String;" {
                    if let Value::IntConst(len) = size {
                        let slots = vec![None; len.max(0) as usize];
                        self.push(Value::StrArray(Rc::new(std::cell::RefCell::new(slots))));
                        return Ok(());
                    }
                }
                self.push(Value::Ref(name.clone()));
            }
            Insn::ArrayLength => {
                self.pop()?;
                self.push(Value::Int);
            }
            Insn::CheckCast(name) => {
                let value = self.pop()?;
                let keep = match &value {
                    // casts between NBT types keep the inferred schema
                    Value::Tagged(_) => super::value::is_nbt_class(name),
                    v => v.type_token().as_deref() == Some(name.as_str()),
                };
                if keep {
                    self.push(value);
                } else {
                    self.push(Value::Ref(name.clone()));
                }
            }
            Insn::InstanceOf(_) => {
                self.pop()?;
                self.push(Value::Int);
            }
            Insn::MonitorEnter | Insn::MonitorExit => {
                self.pop()?;
            }
            Insn::MultiANewArray { name, dims } => {
                for _ in 0..*dims {
                    self.pop()?;
                }
                self.push(Value::Ref(name.clone()));
            }
        }
        Ok(())
    }

    fn peek_clone(&self, depth: usize) -> Result<Value> {
        self.frame
            .peek(depth)
            .cloned()
            .ok_or_else(|| self.err("operand stack underflow"))
    }
}
