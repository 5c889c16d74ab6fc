//! A minimal class-file front end.
//!
//! Parses just enough of the JVMS 4 format for abstract execution: the
//! constant pool, the super/interface names, methods with their `Code` and
//! `StackMapTable` attributes, and the class-level `BootstrapMethods` table.
//! Fields and every other attribute are skipped.

pub mod attribute;
pub mod constpool;
pub mod descriptor;
pub mod insn;
pub mod opcodes;
pub mod reader;

use crate::common::error::{Error, Result};

use attribute::{parse_bootstrap_methods, BootstrapMethod, CodeAttribute, VType};
use constpool::ConstantPool;
use reader::ByteReader;

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// A parsed method.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub methods: Vec<MethodInfo>,
    pub bootstrap_methods: Vec<BootstrapMethod>,
    pub pool: ConstantPool,
}

impl ClassFile {
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// First method with the given name; save hooks are not overloaded in
    /// practice, so name lookup is what the drivers use.
    pub fn find_method_named(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let trunc = |e: reader::Truncated| Error::malformed("<class>", e.to_string());

        if r.u32().map_err(trunc)? != 0xCAFE_BABE {
            return Err(Error::malformed("<class>", "bad magic"));
        }
        let _minor = r.u16().map_err(trunc)?;
        let _major = r.u16().map_err(trunc)?;

        let pool = ConstantPool::parse(&mut r, "<class>")?;

        let access_flags = r.u16().map_err(trunc)?;
        let this_idx = r.u16().map_err(trunc)?;
        let name = pool.class_name(this_idx)?.to_string();
        let trunc = |e: reader::Truncated| Error::malformed(name.clone(), e.to_string());

        let super_idx = r.u16().map_err(trunc)?;
        let super_name = if super_idx == 0 {
            None
        } else {
            Some(pool.class_name(super_idx)?.to_string())
        };

        let iface_count = r.u16().map_err(trunc)?;
        let mut interfaces = Vec::with_capacity(iface_count as usize);
        for _ in 0..iface_count {
            let idx = r.u16().map_err(trunc)?;
            interfaces.push(pool.class_name(idx)?.to_string());
        }

        // fields: names and types are irrelevant here, skip the records
        let field_count = r.u16().map_err(trunc)?;
        for _ in 0..field_count {
            r.skip(6).map_err(trunc)?;
            skip_attributes(&mut r, &name)?;
        }

        let method_count = r.u16().map_err(trunc)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access = r.u16().map_err(trunc)?;
            let name_idx = r.u16().map_err(trunc)?;
            let desc_idx = r.u16().map_err(trunc)?;
            let m_name = pool.utf8(name_idx)?.to_string();
            let m_desc = pool.utf8(desc_idx)?.to_string();

            let mut code = None;
            let attr_count = r.u16().map_err(trunc)?;
            for _ in 0..attr_count {
                let attr_name_idx = r.u16().map_err(trunc)?;
                let len = r.u32().map_err(trunc)? as usize;
                if pool.utf8(attr_name_idx)? == "Code" {
                    let initial = entry_locals(&name, &m_desc, access & ACC_STATIC != 0)?;
                    code = Some(CodeAttribute::parse(&mut r, &pool, &name, &m_name, &initial)?);
                } else {
                    r.skip(len).map_err(trunc)?;
                }
            }
            methods.push(MethodInfo {
                access_flags: access,
                name: m_name,
                descriptor: m_desc,
                code,
            });
        }

        let mut bootstrap_methods = Vec::new();
        let attr_count = r.u16().map_err(trunc)?;
        for _ in 0..attr_count {
            let attr_name_idx = r.u16().map_err(trunc)?;
            let len = r.u32().map_err(trunc)? as usize;
            if pool.utf8(attr_name_idx)? == "BootstrapMethods" {
                bootstrap_methods = parse_bootstrap_methods(&mut r, &name)?;
            } else {
                r.skip(len).map_err(trunc)?;
            }
        }

        Ok(Self {
            name,
            super_name,
            interfaces,
            access_flags,
            methods,
            bootstrap_methods,
            pool,
        })
    }
}

fn skip_attributes(r: &mut ByteReader<'_>, class: &str) -> Result<()> {
    let trunc = |e: reader::Truncated| Error::malformed(class, e.to_string());
    let count = r.u16().map_err(trunc)?;
    for _ in 0..count {
        r.skip(2).map_err(trunc)?;
        let len = r.u32().map_err(trunc)? as usize;
        r.skip(len).map_err(trunc)?;
    }
    Ok(())
}

/// The verification-type view of a method's entry locals, one element per
/// value. Anchors stack-map diff decoding.
pub fn entry_locals(class: &str, desc: &str, is_static: bool) -> Result<Vec<VType>> {
    let mut locals = Vec::new();
    if !is_static {
        locals.push(VType::Object(class.to_string()));
    }
    let (params, _) = descriptor::parse_method_descriptor(desc)?;
    for p in &params {
        locals.push(match p.as_str() {
            "B" | "C" | "S" | "Z" | "I" => VType::Integer,
            "J" => VType::Long,
            "F" => VType::Float,
            "D" => VType::Double,
            other => VType::Object(
                descriptor::reference_name(other)
                    .ok_or_else(|| Error::invariant(format!("bad parameter type '{other}'")))?
                    .to_string(),
            ),
        });
    }
    Ok(locals)
}
