//! Parsed constant pool for Java class files.

use crate::common::error::{Error, Result};

use super::reader::ByteReader;

/// Constant pool entry shapes per JVMS 4.4. Indices are raw pool indices.
#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Phantom slot following a `Long` or `Double` entry.
    Unusable,
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_DYNAMIC: u8 = 17;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
    pub const CONSTANT_MODULE: u8 = 19;
    pub const CONSTANT_PACKAGE: u8 = 20;
}

/// A fully resolved field/method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// Loadable constants as pushed by `ldc` family instructions.
#[derive(Debug, Clone)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(String),
    ClassRef(String),
    /// MethodType/MethodHandle/Dynamic; pushed as an opaque reference.
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    constants: Vec<Constant>, // index 0 unused; 1-based like the wire format
}

impl ConstantPool {
    pub fn parse(r: &mut ByteReader<'_>, class_hint: &str) -> Result<Self> {
        use constant_tags::*;
        let count = r
            .u16()
            .map_err(|e| Error::malformed(class_hint, e.to_string()))?;
        let mut constants = vec![Constant::Unusable];
        while constants.len() < count as usize {
            let tag = r
                .u8()
                .map_err(|e| Error::malformed(class_hint, e.to_string()))?;
            if !matches!(tag, 1 | 3..=12 | 15..=20) {
                return Err(Error::malformed(
                    class_hint,
                    format!("bad constant pool tag {tag}"),
                ));
            }
            let entry = (|| -> super::reader::ReadResult<Constant> {
                Ok(match tag {
                    CONSTANT_UTF8 => {
                        let len = r.u16()? as usize;
                        let bytes = r.bytes(len)?;
                        // Modified UTF-8 deviates from standard UTF-8 only for
                        // NUL and supplementary characters; descriptors and
                        // the identifiers we care about are plain ASCII.
                        Constant::Utf8(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    CONSTANT_INTEGER => Constant::Integer(r.i32()?),
                    CONSTANT_FLOAT => Constant::Float(f32::from_bits(r.u32()?)),
                    CONSTANT_LONG => {
                        Constant::Long(((r.u32()? as u64) << 32 | r.u32()? as u64) as i64)
                    }
                    CONSTANT_DOUBLE => {
                        Constant::Double(f64::from_bits((r.u32()? as u64) << 32 | r.u32()? as u64))
                    }
                    CONSTANT_CLASS => Constant::Class(r.u16()?),
                    CONSTANT_STRING => Constant::String(r.u16()?),
                    CONSTANT_FIELDREF => Constant::FieldRef(r.u16()?, r.u16()?),
                    CONSTANT_METHODREF => Constant::MethodRef(r.u16()?, r.u16()?),
                    CONSTANT_INTERFACEMETHODREF => {
                        Constant::InterfaceMethodRef(r.u16()?, r.u16()?)
                    }
                    CONSTANT_NAMEANDTYPE => Constant::NameAndType(r.u16()?, r.u16()?),
                    CONSTANT_METHODHANDLE => Constant::MethodHandle(r.u8()?, r.u16()?),
                    CONSTANT_METHODTYPE => Constant::MethodType(r.u16()?),
                    CONSTANT_DYNAMIC => Constant::Dynamic(r.u16()?, r.u16()?),
                    CONSTANT_INVOKEDYNAMIC => Constant::InvokeDynamic(r.u16()?, r.u16()?),
                    CONSTANT_MODULE => Constant::Module(r.u16()?),
                    CONSTANT_PACKAGE => Constant::Package(r.u16()?),
                    _ => {
                        return Err(super::reader::Truncated { offset: r.pos() });
                    }
                })
            })()
            .map_err(|e| {
                Error::malformed(class_hint, format!("constant pool entry (tag {tag}): {e}"))
            })?;
            let two_slots = matches!(entry, Constant::Long(_) | Constant::Double(_));
            constants.push(entry);
            if two_slots {
                constants.push(Constant::Unusable);
            }
        }
        Ok(Self { constants })
    }

    fn get(&self, idx: u16) -> Result<&Constant> {
        self.constants
            .get(idx as usize)
            .ok_or_else(|| Error::invariant(format!("constant pool index {idx} out of range")))
    }

    pub fn utf8(&self, idx: u16) -> Result<&str> {
        match self.get(idx)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected Utf8"
            ))),
        }
    }

    pub fn class_name(&self, idx: u16) -> Result<&str> {
        match self.get(idx)? {
            Constant::Class(name_idx) => self.utf8(*name_idx),
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected Class"
            ))),
        }
    }

    pub fn name_and_type(&self, idx: u16) -> Result<(&str, &str)> {
        match self.get(idx)? {
            Constant::NameAndType(name_idx, desc_idx) => {
                Ok((self.utf8(*name_idx)?, self.utf8(*desc_idx)?))
            }
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected NameAndType"
            ))),
        }
    }

    /// Resolve a FieldRef/MethodRef/InterfaceMethodRef into owner + name + descriptor.
    pub fn member_ref(&self, idx: u16) -> Result<MemberRef> {
        let (class_idx, nt_idx) = match self.get(idx)? {
            Constant::FieldRef(c, nt)
            | Constant::MethodRef(c, nt)
            | Constant::InterfaceMethodRef(c, nt) => (*c, *nt),
            other => {
                return Err(Error::invariant(format!(
                    "constant {idx} is {other:?}, expected a member ref"
                )))
            }
        };
        let (name, descriptor) = self.name_and_type(nt_idx)?;
        Ok(MemberRef {
            class: self.class_name(class_idx)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Resolve a MethodHandle into its reference kind and target member.
    pub fn method_handle(&self, idx: u16) -> Result<(u8, MemberRef)> {
        match self.get(idx)? {
            Constant::MethodHandle(kind, ref_idx) => Ok((*kind, self.member_ref(*ref_idx)?)),
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected MethodHandle"
            ))),
        }
    }

    /// Descriptor string of a MethodType entry.
    pub fn method_type(&self, idx: u16) -> Result<&str> {
        match self.get(idx)? {
            Constant::MethodType(desc_idx) => self.utf8(*desc_idx),
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected MethodType"
            ))),
        }
    }

    /// NameAndType behind an InvokeDynamic entry, plus its bootstrap row.
    pub fn invoke_dynamic(&self, idx: u16) -> Result<(u16, &str, &str)> {
        match self.get(idx)? {
            Constant::InvokeDynamic(bsm_idx, nt_idx) => {
                let (name, desc) = self.name_and_type(*nt_idx)?;
                Ok((*bsm_idx, name, desc))
            }
            other => Err(Error::invariant(format!(
                "constant {idx} is {other:?}, expected InvokeDynamic"
            ))),
        }
    }

    /// The constant pushed by `ldc`/`ldc_w`/`ldc2_w` for pool slot `idx`.
    pub fn loadable(&self, idx: u16) -> Result<LoadableConstant> {
        Ok(match self.get(idx)? {
            Constant::Integer(v) => LoadableConstant::Integer(*v),
            Constant::Float(v) => LoadableConstant::Float(*v),
            Constant::Long(v) => LoadableConstant::Long(*v),
            Constant::Double(v) => LoadableConstant::Double(*v),
            Constant::String(utf8_idx) => LoadableConstant::Str(self.utf8(*utf8_idx)?.to_string()),
            Constant::Class(name_idx) => {
                LoadableConstant::ClassRef(self.utf8(*name_idx)?.to_string())
            }
            Constant::MethodType(desc_idx) => {
                LoadableConstant::Other(self.utf8(*desc_idx)?.to_string())
            }
            Constant::MethodHandle(..) | Constant::Dynamic(..) => {
                LoadableConstant::Other(String::new())
            }
            other => {
                return Err(Error::invariant(format!(
                    "constant {idx} is {other:?}, not loadable"
                )))
            }
        })
    }
}
