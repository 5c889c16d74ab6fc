//! Utilities to take method/field descriptors apart.

use crate::common::error::{Error, Result};

/// Split a method descriptor into its parameter descriptors and return
/// descriptor (`None` for `V`).
pub fn parse_method_descriptor(desc: &str) -> Result<(Vec<String>, Option<String>)> {
    let bytes = desc.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(Error::invariant(format!("bad method descriptor '{desc}'")));
    }
    let mut params = Vec::new();
    let mut i = 1;
    while i < bytes.len() && bytes[i] != b')' {
        let start = i;
        i = skip_field_type(desc, i)?;
        params.push(desc[start..i].to_string());
    }
    if i >= bytes.len() {
        return Err(Error::invariant(format!("bad method descriptor '{desc}'")));
    }
    let ret = &desc[i + 1..];
    let ret = match ret {
        "V" => None,
        "" => return Err(Error::invariant(format!("bad method descriptor '{desc}'"))),
        _ => Some(ret.to_string()),
    };
    Ok((params, ret))
}

fn skip_field_type(desc: &str, mut i: usize) -> Result<usize> {
    let bytes = desc.as_bytes();
    while i < bytes.len() && bytes[i] == b'[' {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(i + 1),
        Some(b'L') => {
            let end = desc[i..]
                .find(';')
                .ok_or_else(|| Error::invariant(format!("bad field type in '{desc}'")))?;
            Ok(i + end + 1)
        }
        _ => Err(Error::invariant(format!("bad field type in '{desc}'"))),
    }
}

/// Frame slots a value of this field type occupies (2 for long/double).
pub fn slot_width(desc: &str) -> usize {
    match desc {
        "J" | "D" => 2,
        _ => 1,
    }
}

/// Total argument slot count of a method descriptor, receiver excluded.
pub fn arg_slots(desc: &str) -> Result<usize> {
    let (params, _) = parse_method_descriptor(desc)?;
    Ok(params.iter().map(|p| slot_width(p)).sum())
}

/// Canonical reference name of a field descriptor: the internal class name
/// for `L...;` types, the descriptor itself for arrays, `None` for primitives.
pub fn reference_name(desc: &str) -> Option<&str> {
    if let Some(stripped) = desc.strip_prefix('L') {
        stripped.strip_suffix(';')
    } else if desc.starts_with('[') {
        Some(desc)
    } else {
        None
    }
}

/// Descriptor for an array of `element`, where `element` is already a
/// canonical reference name.
pub fn array_of(element: &str) -> String {
    if element.starts_with('[') {
        format!("[{element}")
    } else {
        format!("[L{element};")
    }
}

/// Element reference name of an array reference name, if it is an array of
/// references.
pub fn array_element(name: &str) -> Option<&str> {
    let inner = name.strip_prefix('[')?;
    reference_name(inner).or(if inner.starts_with('[') {
        Some(inner)
    } else {
        None
    })
}
