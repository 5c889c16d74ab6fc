//! Call-site semantics: the NBT API special cases, lambda dispatch, the
//! pinned entity-root methods, and the generic memoized call path with JVMS
//! 5.4.6 virtual resolution.

use log::warn;

use crate::classfile::constpool::MemberRef;
use crate::classfile::descriptor::{self, parse_method_descriptor};
use crate::common::error::{Error, Result};
use crate::consts;
use crate::schema::{deep_clone, merge, new_ref, MergeStrategy, NbtElement, NbtRef};

use super::runner::MethodRunner;
use super::value::{ensure_typed, is_nbt_class, LambdaValue, TypedTag, Value};
use super::{Analyzer, MethodPointer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Interface,
    Special,
    Static,
}

pub fn invoke(
    runner: &mut MethodRunner,
    an: &mut Analyzer,
    kind: InvokeKind,
    member: &MemberRef,
) -> Result<()> {
    if matches!(kind, InvokeKind::Virtual | InvokeKind::Interface) {
        if member.class == consts::COMPOUND_TAG {
            return compound_invoke(runner, member);
        }
        if member.class == consts::LIST_TAG {
            return list_invoke(runner, member);
        }
        if (member.class == consts::OPTIONAL && member.name == consts::IF_PRESENT)
            || (member.class == consts::INT2OBJECT_MAP && member.name == consts::FOR_EACH)
        {
            return lambda_scope_invoke(runner, an, member);
        }
        if member.class == consts::EITHER && member.name == consts::EITHER_MAP {
            return either_map_invoke(runner, an, member);
        }
        if member.class == consts::ENTITY && member.name == consts::SAVE_AS_PASSENGER {
            return save_as_passenger(runner, member);
        }
    }
    if member.class == consts::ENTITY && member.name == consts::SAVE_WITHOUT_ID {
        return Err(unsafe_reentry(runner, member));
    }

    // super-call of the method under analysis: the parent's writes are its
    // own type's business, skip re-entering it
    if kind == InvokeKind::Special
        && runner.ignore_super
        && member.name == runner.method_name
        && member.descriptor == runner.method_desc
        && member.class != runner.class.name
    {
        return plain_effect(runner, member, true);
    }

    generic_invoke(runner, an, kind, member)
}

fn unsafe_reentry(runner: &MethodRunner, member: &MemberRef) -> Error {
    Error::UnsafeReentry {
        class: member.class.clone(),
        name: member.name.clone(),
        caller: format!("{}.{}", runner.class.name, runner.method_name),
        pc: runner.pc,
    }
}

/// Default stack effect with no analysis: pop arguments (and receiver),
/// push the declared return.
fn plain_effect(runner: &mut MethodRunner, member: &MemberRef, instance: bool) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    runner.pop_args(&params)?;
    if instance {
        runner.pop()?;
    }
    if let Some(ret) = ret {
        let value = ensure_typed(Value::from_descriptor(&ret), 0);
        runner.push(value);
    }
    Ok(())
}

/// The generic call path: resolve the concrete target, call through the
/// memoizer, apply the result, push the converted return.
fn generic_invoke(
    runner: &mut MethodRunner,
    an: &mut Analyzer,
    kind: InvokeKind,
    member: &MemberRef,
) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    let instance = kind != InvokeKind::Static;
    let involves_nbt = params
        .iter()
        .chain(ret.iter())
        .any(|d| descriptor::reference_name(d).is_some_and(is_nbt_class));
    if !involves_nbt {
        return plain_effect(runner, member, instance);
    }

    let mut args = runner.pop_args(&params)?;
    let receiver = if instance { Some(runner.pop()?) } else { None };

    let target_class = match kind {
        InvokeKind::Static | InvokeKind::Special => Some(member.class.clone()),
        InvokeKind::Virtual | InvokeKind::Interface => {
            resolve_virtual(an, member, receiver.as_ref())?
        }
    };
    let Some(target_class) = target_class else {
        // abstract declaration with no concrete target: pass-through
        push_return(runner, ret.as_deref(), None);
        return Ok(());
    };
    if target_class == consts::ENTITY && member.name == consts::SAVE_WITHOUT_ID {
        return Err(unsafe_reentry(runner, member));
    }

    let mut full_args = Vec::with_capacity(args.len() + 1);
    if let Some(r) = receiver {
        full_args.push(r);
    }
    full_args.append(&mut args);

    let ptr = MethodPointer::new(target_class, &member.name, &member.descriptor);
    let result = an.call(ptr, full_args.clone(), false, false)?;
    result
        .apply_to(&full_args, runner.pc)
        .map_err(|e| runner.merge_err(e))?;
    push_return(runner, ret.as_deref(), result.return_nbt.as_ref());
    Ok(())
}

fn push_return(runner: &mut MethodRunner, ret: Option<&str>, nbt: Option<&NbtRef>) {
    let Some(ret) = ret else { return };
    match nbt {
        Some(nbt) => {
            let class = descriptor::reference_name(ret)
                .unwrap_or("java/lang/Object")
                .to_string();
            runner.push(Value::Tagged(TypedTag {
                class,
                nbt: deep_clone(nbt),
                optional_until: 0,
            }));
        }
        None => {
            let value = ensure_typed(Value::from_descriptor(ret), 0);
            runner.push(value);
        }
    }
}

/// JVMS 5.4.6 selection: the receiver's class chain first, then a unique
/// non-abstract maximally-specific superinterface method. `None` means the
/// call has no concrete target and should pass through.
fn resolve_virtual(
    an: &mut Analyzer,
    member: &MemberRef,
    receiver: Option<&Value>,
) -> Result<Option<String>> {
    let start = receiver
        .and_then(Value::type_token)
        .filter(|t| t.len() > 1 && !t.starts_with('['))
        .unwrap_or_else(|| member.class.clone());

    let mut chain_interfaces: Vec<String> = Vec::new();
    let mut cur = Some(start.clone());
    let mut abstract_hit = false;
    while let Some(cname) = cur {
        let Some(cf) = an.resolve_class(&cname)? else {
            // the chain leaves the archive; the memoizer will pass through
            return Ok(Some(cname));
        };
        chain_interfaces.extend(cf.interfaces.iter().cloned());
        if let Some(m) = cf.find_method(&member.name, &member.descriptor) {
            if !m.is_abstract() {
                return Ok(Some(cname));
            }
            abstract_hit = true;
            break;
        }
        cur = cf.super_name.clone();
    }

    // superinterface search for a unique default method
    let mut found: Vec<String> = Vec::new();
    let mut queue = chain_interfaces;
    while let Some(iname) = queue.pop() {
        let Some(icf) = an.resolve_class(&iname)? else {
            continue;
        };
        if let Some(m) = icf.find_method(&member.name, &member.descriptor) {
            if !m.is_abstract() {
                if !found.contains(&iname) {
                    found.push(iname);
                }
                continue;
            }
        }
        queue.extend(icf.interfaces.iter().cloned());
    }
    if found.len() == 1 {
        return Ok(found.pop());
    }

    let declared = an.resolve_class(&member.class)?;
    match declared {
        None => Ok(Some(member.class.clone())),
        Some(decl) => {
            let declared_abstract = decl
                .find_method(&member.name, &member.descriptor)
                .map(|m| m.is_abstract())
                .unwrap_or(abstract_hit);
            if (decl.is_abstract() || decl.is_interface()) && declared_abstract {
                return Ok(None);
            }
            Err(Error::VirtualResolution {
                class: member.class.clone(),
                name: member.name.clone(),
                descriptor: member.descriptor.clone(),
            })
        }
    }
}

/// Element recorded for a `put`-family call; the method name selects the
/// leaf, `put` itself takes the value's own schema.
fn put_element(runner: &MethodRunner, member: &MemberRef, args: &[Value]) -> Option<NbtRef> {
    let leaf = match member.name.as_str() {
        "putByte" => NbtElement::Byte,
        "putShort" => NbtElement::Short,
        "putInt" => NbtElement::Int,
        "putLong" => NbtElement::Long,
        "putFloat" => NbtElement::Float,
        "putDouble" => NbtElement::Double,
        "putString" => NbtElement::String,
        "putByteArray" => NbtElement::ByteArray,
        "putIntArray" => NbtElement::IntArray,
        "putLongArray" => NbtElement::LongArray,
        "putUUID" => NbtElement::Uuid,
        "putBoolean" => NbtElement::Boolean,
        "put" => {
            return Some(match args.get(1) {
                Some(Value::Tagged(t)) => t.nbt.clone(),
                Some(v) => {
                    warn!(
                        "untyped tag value written in {}.{} at pc {}",
                        runner.class.name, runner.method_name, runner.pc
                    );
                    new_ref(untyped_fallback(v))
                }
                None => new_ref(NbtElement::Any),
            })
        }
        _ => return None,
    };
    Some(new_ref(leaf))
}

/// Best-effort element for a value that lost its tag.
fn untyped_fallback(value: &Value) -> NbtElement {
    match value.type_token().as_deref() {
        Some(consts::LIST_TAG) => NbtElement::List(new_ref(NbtElement::Any)),
        Some(consts::COMPOUND_TAG) => NbtElement::AnyCompound(new_ref(NbtElement::Any)),
        Some(class) => NbtElement::for_tag_class(class).unwrap_or(NbtElement::Any),
        None => NbtElement::Any,
    }
}

fn compound_invoke(runner: &mut MethodRunner, member: &MemberRef) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    if !member.name.starts_with("put") || params.is_empty() {
        return plain_effect(runner, member, true);
    }
    let args = runner.pop_args(&params)?;
    let receiver = runner.pop()?;
    let Some(element) = put_element(runner, member, &args) else {
        // a put-prefixed method we do not know; treat as opaque
        if let Some(ret) = ret {
            let value = ensure_typed(Value::from_descriptor(&ret), 0);
            runner.push(value);
        }
        return Ok(());
    };

    match &receiver {
        Value::Tagged(tag) => {
            let optional = runner.pc < tag.optional_until;
            let mut record = || -> std::result::Result<(), crate::schema::MergeError> {
                let mut nbt = tag.nbt.borrow_mut();
                let NbtElement::Compound(compound) = &mut *nbt else {
                    warn!(
                        "compound write into non-compound schema in {}.{} at pc {}",
                        runner.class.name, runner.method_name, runner.pc
                    );
                    return Ok(());
                };
                match args.first() {
                    Some(Value::StrConst(key)) => {
                        compound.put(key, element.clone(), optional, MergeStrategy::SameDataSet)?;
                    }
                    Some(Value::StrOneOf(slots)) => {
                        for key in slots.borrow().iter().flatten() {
                            compound.put(
                                key,
                                element.clone(),
                                optional,
                                MergeStrategy::SameDataSet,
                            )?;
                        }
                    }
                    _ => {
                        if runner.class.name == consts::SIGN_BLOCK_ENTITY {
                            // historical message loop the linear walk cannot
                            // trace; the key set is fixed
                            for key in consts::SIGN_TEXT_KEYS {
                                compound.put(
                                    key,
                                    element.clone(),
                                    false,
                                    MergeStrategy::SameDataSet,
                                )?;
                            }
                        } else {
                            compound.put_unknown(&element);
                        }
                    }
                }
                Ok(())
            };
            record().map_err(|e| runner.merge_err(e))?;
        }
        _ => warn!(
            "write through untyped compound in {}.{} at pc {}",
            runner.class.name, runner.method_name, runner.pc
        ),
    }

    if let Some(ret) = ret {
        runner.push(Value::from_descriptor(&ret));
    }
    Ok(())
}

const LIST_ADD_METHODS: &[&str] = &["add", "addTag", "addFirst", "addLast", "set", "setTag"];

fn list_invoke(runner: &mut MethodRunner, member: &MemberRef) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;

    if LIST_ADD_METHODS.contains(&member.name.as_str()) {
        let args = runner.pop_args(&params)?;
        let receiver = runner.pop()?;
        let value_idx = params
            .iter()
            .rposition(|p| descriptor::reference_name(p).is_some_and(is_nbt_class));
        let element = match value_idx.and_then(|i| args.get(i)) {
            Some(Value::Tagged(t)) => t.nbt.clone(),
            Some(v) => {
                warn!(
                    "untyped element added to list in {}.{} at pc {}",
                    runner.class.name, runner.method_name, runner.pc
                );
                new_ref(untyped_fallback(v))
            }
            None => new_ref(NbtElement::Any),
        };
        match &receiver {
            Value::Tagged(tag) => {
                let inner = match &*tag.nbt.borrow() {
                    NbtElement::List(inner) => Some(inner.clone()),
                    _ => None,
                };
                match inner {
                    Some(inner) => {
                        let merged = merge(&inner, &element, MergeStrategy::SameDataSet)
                            .map_err(|e| runner.merge_err(e))?;
                        if let NbtElement::List(slot) = &mut *tag.nbt.borrow_mut() {
                            *slot = merged;
                        }
                    }
                    None => warn!(
                        "list write into non-list schema in {}.{} at pc {}",
                        runner.class.name, runner.method_name, runner.pc
                    ),
                }
            }
            _ => warn!(
                "write through untyped list in {}.{} at pc {}",
                runner.class.name, runner.method_name, runner.pc
            ),
        }
        if let Some(ret) = ret {
            runner.push(Value::from_descriptor(&ret));
        }
        return Ok(());
    }

    if member.name == "addAll" {
        // under-approximation: element types of the other collection are not
        // tracked
        warn!(
            "addAll on list in {}.{} at pc {}; elements not recorded",
            runner.class.name, runner.method_name, runner.pc
        );
        return plain_effect(runner, member, true);
    }

    let tag_return = ret
        .as_deref()
        .and_then(descriptor::reference_name)
        .filter(|c| is_nbt_class(c));
    if let (true, Some(class)) = (member.name.starts_with("get"), tag_return) {
        let class = class.to_string();
        runner.pop_args(&params)?;
        let receiver = runner.pop()?;
        let element = match &receiver {
            Value::Tagged(tag) => match &*tag.nbt.borrow() {
                NbtElement::List(inner) => Some(inner.clone()),
                _ => None,
            },
            _ => None,
        };
        match element {
            // the element schema is shared: writes into the result refine
            // the list's element type
            Some(inner) => {
                if inner.borrow().is_any() {
                    *inner.borrow_mut() = super::value::seed_element(&class);
                }
                runner.push(Value::Tagged(TypedTag {
                    class,
                    nbt: inner,
                    optional_until: 0,
                }));
            }
            None => {
                let value = ensure_typed(Value::Ref(class), 0);
                runner.push(value);
            }
        }
        return Ok(());
    }

    plain_effect(runner, member, true)
}

/// `Optional.ifPresent` / primitive-map `forEach`: the functional argument
/// runs under branch scope, so every write it records is optional.
fn lambda_scope_invoke(
    runner: &mut MethodRunner,
    an: &mut Analyzer,
    member: &MemberRef,
) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    let args = runner.pop_args(&params)?;
    runner.pop()?; // receiver

    match args.last() {
        Some(Value::Lambda(lambda)) => {
            let result = an.call(lambda.target.clone(), lambda.bound.clone(), true, false)?;
            result
                .apply_to(&lambda.bound, runner.pc)
                .map_err(|e| runner.merge_err(e))?;
        }
        _ => warn!(
            "opaque functional argument to {}.{} in {}.{}",
            member.class, member.name, runner.class.name, runner.method_name
        ),
    }

    if let Some(ret) = ret {
        runner.push(Value::from_descriptor(&ret));
    }
    Ok(())
}

/// `Either.map`: both arms contribute, the result is their sum.
fn either_map_invoke(
    runner: &mut MethodRunner,
    an: &mut Analyzer,
    member: &MemberRef,
) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    let args = runner.pop_args(&params)?;
    runner.pop()?; // receiver

    fn arm(runner: &mut MethodRunner, an: &mut Analyzer, value: Option<&Value>) -> Result<NbtRef> {
        match value {
            Some(Value::Lambda(lambda)) => {
                let result = an.call(lambda.target.clone(), lambda.bound.clone(), false, false)?;
                result
                    .apply_to(&lambda.bound, runner.pc)
                    .map_err(|e| runner.merge_err(e))?;
                Ok(match &result.return_nbt {
                    Some(nbt) => deep_clone(nbt),
                    None => new_ref(NbtElement::Any),
                })
            }
            _ => {
                warn!(
                    "opaque mapping arm in {}.{} at pc {}",
                    runner.class.name, runner.method_name, runner.pc
                );
                Ok(new_ref(NbtElement::Any))
            }
        }
    }

    let left = arm(runner, an, args.first())?;
    let right = arm(runner, an, args.get(1))?;

    let class = ret
        .as_deref()
        .and_then(descriptor::reference_name)
        .unwrap_or("java/lang/Object")
        .to_string();
    runner.push(Value::Tagged(TypedTag {
        class,
        nbt: new_ref(NbtElement::Either(left, right)),
        optional_until: 0,
    }));
    Ok(())
}

/// The passenger recursion injection point: the compound argument becomes a
/// nested-entity back-reference.
fn save_as_passenger(runner: &mut MethodRunner, member: &MemberRef) -> Result<()> {
    let (params, ret) = parse_method_descriptor(&member.descriptor)?;
    let args = runner.pop_args(&params)?;
    runner.pop()?; // receiver
    if let Some(Value::Tagged(tag)) = args.first() {
        *tag.nbt.borrow_mut() = NbtElement::NestedEntity;
    }
    if let Some(ret) = ret {
        runner.push(Value::from_descriptor(&ret));
    }
    Ok(())
}

/// Invokedynamic: model only the standard lambda metafactory shape, turning
/// the produced functional value into a [`LambdaValue`] bound to its backing
/// static method.
pub fn invoke_dynamic(
    runner: &mut MethodRunner,
    _an: &mut Analyzer,
    bootstrap: u16,
    _name: &str,
    descriptor_str: &str,
) -> Result<()> {
    let (params, ret) = parse_method_descriptor(descriptor_str)?;
    let captured = runner.pop_args(&params)?;
    let iface = ret
        .as_deref()
        .and_then(descriptor::reference_name)
        .unwrap_or("java/lang/Object")
        .to_string();

    let mut produced = Value::Ref(iface.clone());
    if let Some(row) = runner.class.bootstrap_methods.get(bootstrap as usize) {
        let pool = &runner.class.pool;
        let is_metafactory = pool
            .method_handle(row.method_handle)
            .map(|(_, bsm)| {
                bsm.class == consts::LAMBDA_METAFACTORY && bsm.name == consts::METAFACTORY
            })
            .unwrap_or(false);
        if is_metafactory && row.args.len() >= 3 {
            if let Ok((handle_kind, impl_member)) = pool.method_handle(row.args[1]) {
                if handle_kind == consts::REF_INVOKE_STATIC {
                    if let Ok(signature) = pool.method_type(row.args[2]) {
                        let (lambda_params, _) = parse_method_descriptor(signature)?;
                        let mut bound = captured.clone();
                        bound.extend(lambda_params.iter().map(|p| Value::from_descriptor(p)));
                        produced = Value::Lambda(LambdaValue {
                            iface,
                            target: MethodPointer::new(
                                &impl_member.class,
                                &impl_member.name,
                                &impl_member.descriptor,
                            ),
                            bound,
                        });
                    }
                }
            }
        }
    }
    runner.push(produced);
    Ok(())
}
