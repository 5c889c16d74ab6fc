//! Class-file front end: parsing, decoding, stack-map conversion.

mod common;

use common::*;
use nbtex::classfile::insn::{decode, Insn, JKind};
use nbtex::classfile::{entry_locals, ClassFile};
use nbtex::classfile::attribute::VType;
use nbtex::classfile::constpool::LoadableConstant;
use nbtex::common::Error;

#[test]
fn parses_names_methods_and_code() {
    let mut cb = ClassBuilder::new("p/Sample");
    cb.super_name = "p/Base".to_string();
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let key = cb.pool.string("a");
    let mut code = vec![0x2b, 0x12, key as u8, 0x04, 0xb6];
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    cb.method(
        "write",
        "(Lnet/minecraft/nbt/CompoundTag;)V",
        CodeDef {
            max_stack: 3,
            max_locals: 2,
            code,
            frames: vec![],
        },
    );

    let class = cb.parse();
    assert_eq!(class.name, "p/Sample");
    assert_eq!(class.super_name.as_deref(), Some("p/Base"));
    let method = class
        .find_method("write", "(Lnet/minecraft/nbt/CompoundTag;)V")
        .expect("method present");
    let code = method.code.as_ref().expect("code present");
    assert_eq!(code.max_stack, 3);
    assert_eq!(code.max_locals, 2);
    assert!(code.stack_map.is_empty());
}

#[test]
fn decodes_constants_and_member_refs() {
    let mut cb = ClassBuilder::new("p/Decode");
    let key = cb.pool.string("key");
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let mut code = vec![0x2b, 0x12, key as u8, 0x10, 0x2a, 0xb6];
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    cb.method(
        "write",
        "(Lnet/minecraft/nbt/CompoundTag;)V",
        CodeDef {
            max_stack: 3,
            max_locals: 2,
            code: code.clone(),
            frames: vec![],
        },
    );
    let class = cb.parse();

    let insns = decode(&code, &class.pool, "p/Decode").unwrap();
    assert!(matches!(insns[0].1, Insn::Load(JKind::Ref, 1)));
    assert!(matches!(insns[1].1, Insn::Ldc(LoadableConstant::Str(ref s)) if s == "key"));
    assert!(matches!(insns[2].1, Insn::IConst(42)));
    match &insns[3].1 {
        Insn::InvokeVirtual(member) => {
            assert_eq!(member.class, COMPOUND_TAG);
            assert_eq!(member.name, "putInt");
            assert_eq!(member.descriptor, "(Ljava/lang/String;I)V");
        }
        other => panic!("expected an invokevirtual, got {other:?}"),
    }
    assert!(matches!(insns[4].1, Insn::Return(None)));

    // pcs follow instruction widths
    let pcs: Vec<u32> = insns.iter().map(|(pc, _)| *pc).collect();
    assert_eq!(pcs, vec![0, 1, 3, 5, 8]);
}

#[test]
fn branch_targets_resolve_absolutely() {
    // 0: iload_2; 1: ifeq 11; 4: goto 11; 7: nop*4; 11: return
    let code = vec![
        0x1c, 0x99, 0x00, 0x0a, 0xa7, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0xb1,
    ];
    let cb = &mut ClassBuilder::new("p/Branchy");
    let class = {
        cb.method(
            "m",
            "(Lnet/minecraft/nbt/CompoundTag;Z)V",
            CodeDef {
                max_stack: 1,
                max_locals: 3,
                code: code.clone(),
                frames: vec![same_frame(11)],
            },
        );
        cb.parse()
    };
    let insns = decode(&code, &class.pool, "p/Branchy").unwrap();
    assert!(matches!(insns[1].1, Insn::If(11)));
    assert!(matches!(insns[2].1, Insn::Goto(11)));
}

#[test]
fn stack_map_diff_frames_become_absolute_entries() {
    let mut cb = ClassBuilder::new("p/Frames");
    // 0: iload_2; 1: ifeq 14; 4..10: put; 11: goto 21; 14..20: put; 21: return
    let key = cb.pool.string("k");
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let mut code = vec![0x1c, 0x99, 0x00, 0x0d, 0x2b, 0x12, key as u8, 0x04, 0xb6];
    code.extend_from_slice(&b2(put_int));
    code.extend_from_slice(&[0xa7, 0x00, 0x0a, 0x2b, 0x12, key as u8, 0x05, 0xb6]);
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    cb.method(
        "write",
        "(Lnet/minecraft/nbt/CompoundTag;Z)V",
        CodeDef {
            max_stack: 3,
            max_locals: 3,
            code,
            frames: vec![same_frame(14), same_frame(6)],
        },
    );

    let class = cb.parse();
    let code = class.methods[0].code.as_ref().unwrap();
    let pcs: Vec<u32> = code.stack_map.iter().map(|e| e.pc).collect();
    assert_eq!(pcs, vec![14, 21]);
    // same-frame entries carry the method entry locals forward
    assert_eq!(
        code.stack_map[0].locals,
        entry_locals("p/Frames", "(Lnet/minecraft/nbt/CompoundTag;Z)V", false).unwrap()
    );
    assert!(code.stack_map[0].stack.is_empty());
}

#[test]
fn entry_locals_widen_and_resolve_references() {
    let locals = entry_locals("p/T", "(IJLjava/lang/String;[I)V", false).unwrap();
    assert_eq!(
        locals,
        vec![
            VType::Object("p/T".to_string()),
            VType::Integer,
            VType::Long,
            VType::Object("java/lang/String".to_string()),
            VType::Object("[I".to_string()),
        ]
    );
}

#[test]
fn bootstrap_methods_round_trip() {
    let mut cb = ClassBuilder::new("p/Bsm");
    let mf = cb.pool.method_ref("java/lang/invoke/LambdaMetafactory", "metafactory", "()V");
    let handle = cb.pool.method_handle(6, mf);
    let arg = cb.pool.method_type("(Ljava/lang/String;)V");
    cb.bootstrap.push((handle, vec![arg]));
    cb.method(
        "m",
        "()V",
        CodeDef {
            max_stack: 0,
            max_locals: 1,
            code: vec![0xb1],
            frames: vec![],
        },
    );

    let class = cb.parse();
    assert_eq!(class.bootstrap_methods.len(), 1);
    let row = &class.bootstrap_methods[0];
    let (kind, member) = class.pool.method_handle(row.method_handle).unwrap();
    assert_eq!(kind, 6);
    assert_eq!(member.class, "java/lang/invoke/LambdaMetafactory");
    assert_eq!(class.pool.method_type(row.args[0]).unwrap(), "(Ljava/lang/String;)V");
}

#[test]
fn rejects_bad_magic() {
    let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52];
    match ClassFile::parse(&bytes) {
        Err(Error::MalformedClass { message, .. }) => assert!(message.contains("magic")),
        other => panic!("expected a malformed-class failure, got {other:?}"),
    }
}
