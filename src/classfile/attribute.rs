//! Method attributes the analyzer consumes: `Code`, `StackMapTable` and
//! `BootstrapMethods`. Everything else is skipped over.

use crate::common::error::{Error, Result};

use super::constpool::ConstantPool;
use super::reader::ByteReader;

/// VerificationTypeInfo as defined in JVMS 4.7.4, with class references
/// resolved to internal names at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(String),
    Uninitialized(u16),
}

impl VType {
    fn parse(r: &mut ByteReader<'_>, pool: &ConstantPool, class: &str) -> Result<Self> {
        let tag = r.u8().map_err(|e| Error::malformed(class, e.to_string()))?;
        Ok(match tag {
            0 => VType::Top,
            1 => VType::Integer,
            2 => VType::Float,
            3 => VType::Double,
            4 => VType::Long,
            5 => VType::Null,
            6 => VType::UninitializedThis,
            7 => {
                let idx = r.u16().map_err(|e| Error::malformed(class, e.to_string()))?;
                VType::Object(pool.class_name(idx)?.to_string())
            }
            8 => {
                let off = r.u16().map_err(|e| Error::malformed(class, e.to_string()))?;
                VType::Uninitialized(off)
            }
            other => {
                return Err(Error::malformed(
                    class,
                    format!("bad verification type tag {other}"),
                ))
            }
        })
    }

    /// Frame slots this verification type spans.
    pub fn width(&self) -> usize {
        match self {
            VType::Long | VType::Double => 2,
            _ => 1,
        }
    }
}

/// One stack-map entry in absolute form: the expected frame at `pc`.
/// Locals hold one element per value (wide values count once).
#[derive(Debug, Clone)]
pub struct StackMapEntry {
    pub pc: u32,
    pub locals: Vec<VType>,
    pub stack: Vec<VType>,
}

/// One row of the `BootstrapMethods` class attribute.
#[derive(Debug, Clone)]
pub struct BootstrapMethod {
    pub method_handle: u16,
    pub args: Vec<u16>,
}

/// The parts of a `Code` attribute the runner needs.
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Absolute-form stack map, ascending by pc. Empty when the method has
    /// no branches (javac omits the table entirely then).
    pub stack_map: Vec<StackMapEntry>,
}

impl CodeAttribute {
    /// Parse a `Code` attribute body. `initial_locals` is the entry frame
    /// derived from the method descriptor; it anchors the diff-to-absolute
    /// conversion of the stack map table.
    pub fn parse(
        r: &mut ByteReader<'_>,
        pool: &ConstantPool,
        class: &str,
        method: &str,
        initial_locals: &[VType],
    ) -> Result<Self> {
        let trunc = |e: super::reader::Truncated| Error::malformed(class, e.to_string());
        let max_stack = r.u16().map_err(trunc)?;
        let max_locals = r.u16().map_err(trunc)?;
        let code_len = r.u32().map_err(trunc)? as usize;
        let code = r.bytes(code_len).map_err(trunc)?;

        // exception table: not modeled
        let handlers = r.u16().map_err(trunc)?;
        r.skip(handlers as usize * 8).map_err(trunc)?;

        let mut stack_map = Vec::new();
        let attr_count = r.u16().map_err(trunc)?;
        for _ in 0..attr_count {
            let name_idx = r.u16().map_err(trunc)?;
            let len = r.u32().map_err(trunc)? as usize;
            if pool.utf8(name_idx)? == "StackMapTable" {
                stack_map = parse_stack_map(r, pool, class, method, initial_locals)?;
            } else {
                r.skip(len).map_err(trunc)?;
            }
        }

        Ok(Self {
            max_stack,
            max_locals,
            code,
            stack_map,
        })
    }
}

/// Convert the diff-encoded table into absolute entries, threading the
/// running locals through chop/append/full frames.
fn parse_stack_map(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    class: &str,
    method: &str,
    initial_locals: &[VType],
) -> Result<Vec<StackMapEntry>> {
    let trunc = |e: super::reader::Truncated| Error::malformed(class, e.to_string());
    let count = r.u16().map_err(trunc)?;
    let mut entries = Vec::with_capacity(count as usize);
    let mut locals: Vec<VType> = initial_locals.to_vec();
    let mut pc: u32 = 0;

    for i in 0..count {
        let frame_type = r.u8().map_err(trunc)?;
        let (delta, stack) = match frame_type {
            0..=63 => (frame_type as u32, Vec::new()),
            64..=127 => {
                let stack = vec![VType::parse(r, pool, class)?];
                ((frame_type - 64) as u32, stack)
            }
            247 => {
                let delta = r.u16().map_err(trunc)? as u32;
                let stack = vec![VType::parse(r, pool, class)?];
                (delta, stack)
            }
            248..=250 => {
                let delta = r.u16().map_err(trunc)? as u32;
                let k = (251 - frame_type) as usize;
                let keep = locals.len().saturating_sub(k);
                locals.truncate(keep);
                (delta, Vec::new())
            }
            251 => (r.u16().map_err(trunc)? as u32, Vec::new()),
            252..=254 => {
                let delta = r.u16().map_err(trunc)? as u32;
                for _ in 0..(frame_type - 251) {
                    locals.push(VType::parse(r, pool, class)?);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = r.u16().map_err(trunc)? as u32;
                let n_locals = r.u16().map_err(trunc)?;
                locals = (0..n_locals)
                    .map(|_| VType::parse(r, pool, class))
                    .collect::<Result<_>>()?;
                let n_stack = r.u16().map_err(trunc)?;
                let stack = (0..n_stack)
                    .map(|_| VType::parse(r, pool, class))
                    .collect::<Result<_>>()?;
                (delta, stack)
            }
            other => {
                return Err(Error::MalformedFrame {
                    class: class.to_string(),
                    method: method.to_string(),
                    frame_type: other,
                })
            }
        };
        pc = if i == 0 { delta } else { pc + delta + 1 };
        entries.push(StackMapEntry {
            pc,
            locals: locals.clone(),
            stack,
        });
    }
    Ok(entries)
}

/// Parse the class-level `BootstrapMethods` attribute body.
pub fn parse_bootstrap_methods(
    r: &mut ByteReader<'_>,
    class: &str,
) -> Result<Vec<BootstrapMethod>> {
    let trunc = |e: super::reader::Truncated| Error::malformed(class, e.to_string());
    let count = r.u16().map_err(trunc)?;
    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method_handle = r.u16().map_err(trunc)?;
        let arg_count = r.u16().map_err(trunc)?;
        let args = (0..arg_count)
            .map(|_| r.u16().map_err(trunc))
            .collect::<Result<_>>()?;
        rows.push(BootstrapMethod { method_handle, args });
    }
    Ok(rows)
}
