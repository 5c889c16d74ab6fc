//! The symbolic executor and its memoizer.
//!
//! [`Analyzer`] owns all cross-method state: the class loader, the memoized
//! call results, the active call stack used for recursion detection, the set
//! of recursion-hit call identities, and the process-wide statics map. Each
//! [`call`](Analyzer::call) instantiates a [`runner::MethodRunner`] over a
//! fresh frame; nested calls recurse through the memoizer.

pub mod frame;
pub mod invoke;
pub mod runner;
pub mod value;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, warn};

use crate::classfile::{descriptor, ClassFile};
use crate::common::error::{Error, Result};
use crate::common::loader::ClassLoader;
use crate::consts;
use crate::schema::{
    deep_clone, merge, new_ref, MergeError, MergeStrategy, NameHandle, NbtCompound, NbtElement,
    NbtRef,
};

use value::{ensure_typed, TypedTag, Value};

/// Identity of a method declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodPointer {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodPointer {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl std::fmt::Display for MethodPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// Memoization key: a method pointer plus its erased argument values and the
/// branch-scope override. Construction strips attached schema information,
/// so equality is invariant under tagging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCall {
    pub ptr: MethodPointer,
    pub args: Vec<Value>,
    pub override_optional: bool,
}

impl MethodCall {
    pub fn new(ptr: MethodPointer, args: &[Value], override_optional: bool) -> Self {
        Self {
            ptr,
            args: args.iter().map(Value::untyped).collect(),
            override_optional,
        }
    }

    /// Naming handle for compounds born at this call.
    pub fn name_handle(&self) -> NameHandle {
        NameHandle {
            class: self.ptr.class.clone(),
            method: self.ptr.name.clone(),
            args_key: self
                .args
                .iter()
                .map(Value::key_fragment)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// A method's memoized effect: per-argument schema deltas and the merged
/// return schema.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    pub args_nbt: Vec<Option<NbtRef>>,
    pub return_nbt: Option<NbtRef>,
}

impl CallResult {
    /// No-effect result for an unresolvable callee.
    pub fn pass_through(arg_count: usize) -> Self {
        Self {
            args_nbt: vec![None; arg_count],
            return_nbt: None,
        }
    }

    /// Re-merge this result's deltas onto the caller's live tags at call pc.
    /// A delta received while the caller's tag is still inside a branch
    /// scope is cloned with every entry forced optional first.
    pub fn apply_to(&self, actuals: &[Value], pc: u32) -> std::result::Result<(), MergeError> {
        for (delta, actual) in self.args_nbt.iter().zip(actuals) {
            let Some(delta) = delta else { continue };
            let Value::Tagged(tag) = actual else { continue };
            apply_delta(tag, delta, pc)?;
        }
        Ok(())
    }
}

fn apply_delta(tag: &TypedTag, delta: &NbtRef, pc: u32) -> std::result::Result<(), MergeError> {
    if delta.borrow().is_any() {
        return Ok(());
    }
    let delta = deep_clone(delta);

    // live tag still carrying Any takes the delta wholesale
    if tag.nbt.borrow().is_any() {
        let content = delta.borrow().clone();
        *tag.nbt.borrow_mut() = content;
        return Ok(());
    }

    enum Action {
        FlattenCompound,
        FlattenBoxed,
        ListMerge,
        Incompatible(String, String),
    }
    let action = {
        let live = tag.nbt.borrow();
        let delta_view = delta.borrow();
        match (&*live, &*delta_view) {
            (NbtElement::Compound(_), NbtElement::Compound(_)) => Action::FlattenCompound,
            (NbtElement::Compound(_), NbtElement::Boxed(_)) => Action::FlattenBoxed,
            (NbtElement::List(_), NbtElement::List(_)) => Action::ListMerge,
            (l, d) => Action::Incompatible(l.kind_name().to_string(), d.kind_name().to_string()),
        }
    };
    match action {
        Action::FlattenCompound => {
            if pc < tag.optional_until {
                if let NbtElement::Compound(delta_c) = &mut *delta.borrow_mut() {
                    for entry in delta_c.entries.values_mut() {
                        entry.optional = true;
                    }
                }
            }
            if let NbtElement::Compound(live_c) = &mut *tag.nbt.borrow_mut() {
                live_c.flattened.push(delta);
            }
            Ok(())
        }
        Action::FlattenBoxed => {
            if let NbtElement::Compound(live_c) = &mut *tag.nbt.borrow_mut() {
                live_c.flattened.push(delta);
            }
            Ok(())
        }
        Action::ListMerge => {
            merge(&tag.nbt, &delta, MergeStrategy::SameDataSet)?;
            Ok(())
        }
        Action::Incompatible(left, right) => Err(MergeError::Incompatible { left, right }),
    }
}

/// The method-call memoizer and owner of all shared analysis state.
pub struct Analyzer {
    loader: ClassLoader,
    cache: HashMap<MethodCall, CallResult>,
    active: Vec<MethodCall>,
    /// Call identities that were hit recursively; their compounds must stay
    /// registered so boxed back-references resolve.
    pub boxed_types: HashSet<NameHandle>,
    /// Process-wide static fields, keyed `owner.name:descriptor`.
    pub statics: HashMap<String, Value>,
    clinit_done: HashSet<String>,
}

impl Analyzer {
    pub fn new(loader: ClassLoader) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
            active: Vec::new(),
            boxed_types: HashSet::new(),
            statics: HashMap::new(),
            clinit_done: HashSet::new(),
        }
    }

    /// True when the top-level call has fully unwound.
    pub fn idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Look up a class, running its static initializer on first sight so
    /// constant key tables are visible to later `getstatic`s.
    pub fn resolve_class(&mut self, name: &str) -> Result<Option<Rc<ClassFile>>> {
        let class = self.loader.find_class(name)?;
        if let Some(class) = &class {
            if !self.clinit_done.contains(name) {
                self.clinit_done.insert(name.to_string());
                if class.find_method("<clinit>", "()V").is_some() {
                    debug!("running <clinit> of {name}");
                    let ptr = MethodPointer::new(name, "<clinit>", "()V");
                    self.call(ptr, Vec::new(), false, false)?;
                }
            }
        }
        Ok(class)
    }

    /// The memoized call operation: erase, consult the cache, detect
    /// recursion, run, harvest.
    pub fn call(
        &mut self,
        ptr: MethodPointer,
        args: Vec<Value>,
        override_optional: bool,
        ignore_super: bool,
    ) -> Result<CallResult> {
        let key = MethodCall::new(ptr.clone(), &args, override_optional);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        if self.active.contains(&key) {
            return Ok(self.boxed_result(&key));
        }

        let Some(class) = self.resolve_class(&ptr.class)? else {
            debug!("class {} not found, pass-through for {ptr}", ptr.class);
            return Ok(CallResult::pass_through(args.len()));
        };
        let Some(method) = class.find_method(&ptr.name, &ptr.descriptor) else {
            warn!("method {ptr} not found in resolved class");
            return Ok(CallResult::pass_through(args.len()));
        };
        if method.code.is_none() {
            return Ok(CallResult::pass_through(args.len()));
        }

        // fresh typed seeds; callee effects accumulate in these, the caller
        // re-merges them through apply_to
        let optional_until = if override_optional { u32::MAX } else { 0 };
        let seeded: Vec<Value> = key
            .args
            .iter()
            .map(|v| ensure_typed(v.clone(), optional_until))
            .collect();

        let mut unnamed_compounds: Vec<&Value> = seeded
            .iter()
            .filter(|v| {
                matches!(v, Value::Tagged(t)
                    if matches!(&*t.nbt.borrow(), NbtElement::Compound(c) if c.name.is_none()))
            })
            .collect();
        if unnamed_compounds.len() > 1 {
            warn!("{ptr}: more than one compound argument, naming seed skipped");
        } else if let Some(Value::Tagged(tag)) = unnamed_compounds.pop() {
            if let NbtElement::Compound(c) = &mut *tag.nbt.borrow_mut() {
                c.name = Some(key.name_handle());
            }
        }

        self.active.push(key.clone());
        let run = (|| -> Result<CallResult> {
            let mut runner =
                runner::MethodRunner::new(class.clone(), method, &seeded, ignore_super)?;
            runner.run(self)?;
            let return_nbt = runner.merged_return()?;
            let args_nbt = seeded
                .iter()
                .map(|v| match v {
                    Value::Tagged(t) => Some(t.nbt.clone()),
                    _ => None,
                })
                .collect();
            Ok(CallResult {
                args_nbt,
                return_nbt,
            })
        })();
        self.active.pop();

        let result = run?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Synthesize the boxed-shaped result for a recursion hit: compound
    /// positions become back-references to the call's type name.
    fn boxed_result(&mut self, key: &MethodCall) -> CallResult {
        let handle = key.name_handle();
        self.boxed_types.insert(handle.clone());

        let args_nbt = key
            .args
            .iter()
            .map(|v| match v {
                Value::Ref(class) | Value::Tagged(TypedTag { class, .. })
                    if class == consts::COMPOUND_TAG =>
                {
                    Some(new_ref(NbtElement::Boxed(handle.clone())))
                }
                _ => None,
            })
            .collect();
        let return_nbt = descriptor::parse_method_descriptor(&key.ptr.descriptor)
            .ok()
            .and_then(|(_, ret)| ret)
            .and_then(|ret| descriptor::reference_name(&ret).map(str::to_string))
            .filter(|ret| ret == consts::COMPOUND_TAG)
            .map(|_| new_ref(NbtElement::Boxed(handle.clone())));

        CallResult {
            args_nbt,
            return_nbt,
        }
    }

    /// Run a driver-selected entry point and return the schema of its save
    /// target: a fresh compound threaded through the first compound-typed
    /// parameter (or, failing that, the returned compound).
    pub fn analyze_entry(&mut self, ptr: &MethodPointer, ignore_super: bool) -> Result<NbtRef> {
        let class = self.resolve_class(&ptr.class)?;
        let is_static = class
            .as_ref()
            .and_then(|c| c.find_method(&ptr.name, &ptr.descriptor))
            .map(|m| m.is_static())
            .unwrap_or(false);

        let (params, _) = descriptor::parse_method_descriptor(&ptr.descriptor)?;
        let mut actuals: Vec<Value> = Vec::new();
        if !is_static {
            actuals.push(Value::Ref(ptr.class.clone()));
        }
        let mut target: Option<NbtRef> = None;
        for p in &params {
            let mut v = Value::from_descriptor(p);
            if descriptor::reference_name(p) == Some(consts::COMPOUND_TAG) && target.is_none() {
                v = ensure_typed(v, 0);
                if let Value::Tagged(t) = &v {
                    target = Some(t.nbt.clone());
                }
            }
            actuals.push(v);
        }

        let result = self.call(ptr.clone(), actuals.clone(), false, ignore_super)?;
        result.apply_to(&actuals, 0).map_err(|source| {
            Error::SchemaMergeFailure {
                class: ptr.class.clone(),
                method: ptr.name.clone(),
                pc: 0,
                source,
            }
        })?;

        if !self.idle() {
            return Err(Error::invariant(
                "call stack not empty after top-level analysis",
            ));
        }

        Ok(match target {
            Some(t) => t,
            None => match result.return_nbt {
                Some(ret) if ret.borrow().is_compound() => deep_clone(&ret),
                _ => new_ref(NbtElement::Compound(NbtCompound::default())),
            },
        })
    }
}
