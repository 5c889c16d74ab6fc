//! Bytecode decoder.
//!
//! Turns the raw `Code` array into an address-ordered instruction list with
//! constant-pool operands resolved to strings and branch offsets resolved to
//! absolute targets, so the runner never touches the pool or raw offsets.

use crate::common::error::{Error, Result};

use super::constpool::{ConstantPool, LoadableConstant, MemberRef};
use super::opcodes as op;
use super::reader::ByteReader;

/// Computational kinds used to drive default stack effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JKind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

impl JKind {
    /// Operand-stack width (2 for long/double).
    pub fn width(self) -> usize {
        match self {
            JKind::Long | JKind::Double => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Insn {
    Nop,
    AConstNull,
    IConst(i32),
    LConst(i64),
    FConst(f32),
    DConst(f64),
    Ldc(LoadableConstant),
    Load(JKind, u16),
    Store(JKind, u16),
    /// Element kind pushed; byte/char/short element loads collapse to int.
    ArrayLoad(JKind),
    ArrayStore(JKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    /// add/sub/mul/div/rem/and/or/xor: two operands of `kind`, one result.
    Binary(JKind),
    /// shl/shr/ushr: value of `kind` plus an int amount.
    Shift(JKind),
    Neg(JKind),
    IInc(u16, i32),
    Convert(JKind, JKind),
    /// lcmp/fcmpl/fcmpg/dcmpl/dcmpg: two operands of `kind`, int result.
    Cmp(JKind),
    /// ifeq..ifle: one int operand.
    If(u32),
    /// ifnull/ifnonnull: one reference operand.
    IfNull(u32),
    /// if_icmp*: two int operands.
    IfICmp(u32),
    /// if_acmp*: two reference operands.
    IfACmp(u32),
    Goto(u32),
    TableSwitch { default: u32, targets: Vec<u32> },
    LookupSwitch { default: u32, targets: Vec<u32> },
    Return(Option<JKind>),
    GetStatic(MemberRef),
    PutStatic(MemberRef),
    GetField(MemberRef),
    PutField(MemberRef),
    InvokeVirtual(MemberRef),
    InvokeSpecial(MemberRef),
    InvokeStatic(MemberRef),
    InvokeInterface(MemberRef),
    InvokeDynamic {
        bootstrap: u16,
        name: String,
        descriptor: String,
    },
    New(String),
    /// Array allocation; operand is the canonical array reference name.
    NewArray(String),
    ArrayLength,
    AThrow,
    CheckCast(String),
    InstanceOf(String),
    MonitorEnter,
    MonitorExit,
    MultiANewArray { name: String, dims: u8 },
}

fn kind4(base: u8, opcode: u8) -> JKind {
    match opcode - base {
        0 => JKind::Int,
        1 => JKind::Long,
        2 => JKind::Float,
        _ => JKind::Double,
    }
}

fn kind5(base: u8, opcode: u8) -> JKind {
    match opcode - base {
        0 => JKind::Int,
        1 => JKind::Long,
        2 => JKind::Float,
        3 => JKind::Double,
        _ => JKind::Ref,
    }
}

/// Decode a whole `Code` array. Returns `(pc, insn)` pairs in address order.
pub fn decode(code: &[u8], pool: &ConstantPool, class: &str) -> Result<Vec<(u32, Insn)>> {
    let mut r = ByteReader::new(code);
    let trunc = |e: super::reader::Truncated| Error::malformed(class, e.to_string());
    let mut out = Vec::new();

    while r.remaining() > 0 {
        let pc = r.pos() as u32;
        let opcode = r.u8().map_err(trunc)?;
        let target16 = |r: &mut ByteReader<'_>| -> Result<u32> {
            let off = r.i16().map_err(trunc)?;
            Ok((pc as i64 + off as i64) as u32)
        };
        let insn = match opcode {
            op::NOP => Insn::Nop,
            op::ACONST_NULL => Insn::AConstNull,
            op::ICONST_M1..=op::ICONST_5 => Insn::IConst(opcode as i32 - op::ICONST_0 as i32),
            op::LCONST_0 | op::LCONST_1 => Insn::LConst((opcode - op::LCONST_0) as i64),
            op::FCONST_0..=op::FCONST_2 => Insn::FConst((opcode - op::FCONST_0) as f32),
            op::DCONST_0 | op::DCONST_1 => Insn::DConst((opcode - op::DCONST_0) as f64),
            op::BIPUSH => Insn::IConst(r.i8().map_err(trunc)? as i32),
            op::SIPUSH => Insn::IConst(r.i16().map_err(trunc)? as i32),
            op::LDC => Insn::Ldc(pool.loadable(r.u8().map_err(trunc)? as u16)?),
            op::LDC_W | op::LDC2_W => Insn::Ldc(pool.loadable(r.u16().map_err(trunc)?)?),

            op::ILOAD..=op::ALOAD => {
                Insn::Load(kind5(op::ILOAD, opcode), r.u8().map_err(trunc)? as u16)
            }
            op::ILOAD_0..=op::ALOAD_3 => {
                let rel = opcode - op::ILOAD_0;
                Insn::Load(kind5_by_group(rel / 4), (rel % 4) as u16)
            }
            op::IALOAD..=op::SALOAD => Insn::ArrayLoad(array_kind(opcode - op::IALOAD)),
            op::ISTORE..=op::ASTORE => {
                Insn::Store(kind5(op::ISTORE, opcode), r.u8().map_err(trunc)? as u16)
            }
            op::ISTORE_0..=op::ASTORE_3 => {
                let rel = opcode - op::ISTORE_0;
                Insn::Store(kind5_by_group(rel / 4), (rel % 4) as u16)
            }
            op::IASTORE..=op::SASTORE => Insn::ArrayStore(array_kind(opcode - op::IASTORE)),

            op::POP => Insn::Pop,
            op::POP2 => Insn::Pop2,
            op::DUP => Insn::Dup,
            op::DUP_X1 => Insn::DupX1,
            op::DUP_X2 => Insn::DupX2,
            op::DUP2 => Insn::Dup2,
            op::DUP2_X1 => Insn::Dup2X1,
            op::DUP2_X2 => Insn::Dup2X2,
            op::SWAP => Insn::Swap,

            op::IADD..=op::DREM => Insn::Binary(kind4(op::IADD, (opcode - op::IADD) % 4 + op::IADD)),
            op::INEG..=op::DNEG => Insn::Neg(kind4(op::INEG, opcode)),
            op::ISHL..=op::LUSHR => Insn::Shift(if (opcode - op::ISHL) % 2 == 0 {
                JKind::Int
            } else {
                JKind::Long
            }),
            op::IAND..=op::LXOR => Insn::Binary(if (opcode - op::IAND) % 2 == 0 {
                JKind::Int
            } else {
                JKind::Long
            }),
            op::IINC => {
                let idx = r.u8().map_err(trunc)? as u16;
                let delta = r.i8().map_err(trunc)? as i32;
                Insn::IInc(idx, delta)
            }
            op::I2L..=op::I2S => convert_insn(opcode),
            op::LCMP => Insn::Cmp(JKind::Long),
            op::FCMPL | op::FCMPG => Insn::Cmp(JKind::Float),
            op::DCMPL | op::DCMPG => Insn::Cmp(JKind::Double),

            op::IFEQ..=op::IFLE => Insn::If(target16(&mut r)?),
            op::IF_ICMPEQ..=op::IF_ICMPLE => Insn::IfICmp(target16(&mut r)?),
            op::IF_ACMPEQ | op::IF_ACMPNE => Insn::IfACmp(target16(&mut r)?),
            op::IFNULL | op::IFNONNULL => Insn::IfNull(target16(&mut r)?),
            op::GOTO => Insn::Goto(target16(&mut r)?),
            op::GOTO_W => {
                let off = r.i32().map_err(trunc)?;
                Insn::Goto((pc as i64 + off as i64) as u32)
            }
            op::JSR | op::JSR_W | op::RET => {
                return Err(Error::malformed(
                    class,
                    format!("jsr/ret at pc {pc} (pre-StackMapTable bytecode)"),
                ))
            }
            op::TABLESWITCH => {
                r.skip((4 - (r.pos() % 4)) % 4).map_err(trunc)?;
                let default = (pc as i64 + r.i32().map_err(trunc)? as i64) as u32;
                let low = r.i32().map_err(trunc)?;
                let high = r.i32().map_err(trunc)?;
                let n = (high as i64 - low as i64 + 1) as usize;
                let mut targets = Vec::with_capacity(n);
                for _ in 0..n {
                    targets.push((pc as i64 + r.i32().map_err(trunc)? as i64) as u32);
                }
                Insn::TableSwitch { default, targets }
            }
            op::LOOKUPSWITCH => {
                r.skip((4 - (r.pos() % 4)) % 4).map_err(trunc)?;
                let default = (pc as i64 + r.i32().map_err(trunc)? as i64) as u32;
                let n = r.i32().map_err(trunc)? as usize;
                let mut targets = Vec::with_capacity(n);
                for _ in 0..n {
                    let _match = r.i32().map_err(trunc)?;
                    targets.push((pc as i64 + r.i32().map_err(trunc)? as i64) as u32);
                }
                Insn::LookupSwitch { default, targets }
            }

            op::IRETURN..=op::ARETURN => Insn::Return(Some(kind5(op::IRETURN, opcode))),
            op::RETURN => Insn::Return(None),

            op::GETSTATIC => Insn::GetStatic(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::PUTSTATIC => Insn::PutStatic(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::GETFIELD => Insn::GetField(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::PUTFIELD => Insn::PutField(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::INVOKEVIRTUAL => Insn::InvokeVirtual(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::INVOKESPECIAL => Insn::InvokeSpecial(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::INVOKESTATIC => Insn::InvokeStatic(pool.member_ref(r.u16().map_err(trunc)?)?),
            op::INVOKEINTERFACE => {
                let m = pool.member_ref(r.u16().map_err(trunc)?)?;
                r.skip(2).map_err(trunc)?; // count + zero byte
                Insn::InvokeInterface(m)
            }
            op::INVOKEDYNAMIC => {
                let idx = r.u16().map_err(trunc)?;
                r.skip(2).map_err(trunc)?;
                let (bootstrap, name, descriptor) = pool.invoke_dynamic(idx)?;
                Insn::InvokeDynamic {
                    bootstrap,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }

            op::NEW => Insn::New(pool.class_name(r.u16().map_err(trunc)?)?.to_string()),
            op::NEWARRAY => Insn::NewArray(primitive_array(r.u8().map_err(trunc)?, class)?),
            op::ANEWARRAY => {
                let elem = pool.class_name(r.u16().map_err(trunc)?)?;
                Insn::NewArray(super::descriptor::array_of(elem))
            }
            op::ARRAYLENGTH => Insn::ArrayLength,
            op::ATHROW => Insn::AThrow,
            op::CHECKCAST => Insn::CheckCast(pool.class_name(r.u16().map_err(trunc)?)?.to_string()),
            op::INSTANCEOF => {
                Insn::InstanceOf(pool.class_name(r.u16().map_err(trunc)?)?.to_string())
            }
            op::MONITORENTER => Insn::MonitorEnter,
            op::MONITOREXIT => Insn::MonitorExit,
            op::WIDE => {
                let wide_op = r.u8().map_err(trunc)?;
                let idx = r.u16().map_err(trunc)?;
                match wide_op {
                    op::ILOAD..=op::ALOAD => Insn::Load(kind5(op::ILOAD, wide_op), idx),
                    op::ISTORE..=op::ASTORE => Insn::Store(kind5(op::ISTORE, wide_op), idx),
                    op::IINC => Insn::IInc(idx, r.i16().map_err(trunc)? as i32),
                    other => {
                        return Err(Error::malformed(
                            class,
                            format!("bad wide opcode {other:#04x} at pc {pc}"),
                        ))
                    }
                }
            }
            op::MULTIANEWARRAY => {
                let name = pool.class_name(r.u16().map_err(trunc)?)?.to_string();
                let dims = r.u8().map_err(trunc)?;
                Insn::MultiANewArray { name, dims }
            }
            other => {
                return Err(Error::malformed(
                    class,
                    format!("unknown opcode {other:#04x} at pc {pc}"),
                ))
            }
        };
        out.push((pc, insn));
    }
    Ok(out)
}

fn kind5_by_group(group: u8) -> JKind {
    match group {
        0 => JKind::Int,
        1 => JKind::Long,
        2 => JKind::Float,
        3 => JKind::Double,
        _ => JKind::Ref,
    }
}

fn array_kind(rel: u8) -> JKind {
    // iaload laload faload daload aaload baload caload saload
    match rel {
        0 => JKind::Int,
        1 => JKind::Long,
        2 => JKind::Float,
        3 => JKind::Double,
        4 => JKind::Ref,
        _ => JKind::Int, // byte/char/short widen to int
    }
}

fn convert_insn(opcode: u8) -> Insn {
    use JKind::*;
    // i2l i2f i2d l2i l2f l2d f2i f2l f2d d2i d2l d2f i2b i2c i2s
    let (from, to) = match opcode - op::I2L {
        0 => (Int, Long),
        1 => (Int, Float),
        2 => (Int, Double),
        3 => (Long, Int),
        4 => (Long, Float),
        5 => (Long, Double),
        6 => (Float, Int),
        7 => (Float, Long),
        8 => (Float, Double),
        9 => (Double, Int),
        10 => (Double, Long),
        11 => (Double, Float),
        _ => (Int, Int), // i2b/i2c/i2s stay int-width
    };
    Insn::Convert(from, to)
}

fn primitive_array(atype: u8, class: &str) -> Result<String> {
    Ok(match atype {
        4 => "[Z",
        5 => "[C",
        6 => "[F",
        7 => "[D",
        8 => "[B",
        9 => "[S",
        10 => "[I",
        11 => "[J",
        other => {
            return Err(Error::malformed(
                class,
                format!("bad newarray element type {other}"),
            ))
        }
    }
    .to_string())
}
