//! Runner coverage beyond the core scenarios: static key tables, list
//! semantics, the passenger pin, super-call skipping and the reentry guard.

mod common;

use common::*;
use nbtex::analysis::{Analyzer, MethodPointer};
use nbtex::common::loader::ClassLoader;
use nbtex::common::Error;
use nbtex::schema::NbtElement;

const WRITE_DESC: &str = "(Lnet/minecraft/nbt/CompoundTag;)V";
const ENTITY: &str = "net/minecraft/world/entity/Entity";

fn keys_class() -> ClassBuilder {
    // static final String[] KEYS = {"A", "B"};
    let mut cb = ClassBuilder::new("test/Keys");
    let string_cls = cb.pool.class("java/lang/String");
    let lit_a = cb.pool.string("A");
    let lit_b = cb.pool.string("B");
    let keys_field = cb.pool.field_ref("test/Keys", "KEYS", "[Ljava/lang/String;");
    // iconst_2; anewarray String; dup; iconst_0; ldc "A"; aastore;
    // dup; iconst_1; ldc "B"; aastore; putstatic; return
    let mut clinit = vec![0x05, 0xbd];
    clinit.extend_from_slice(&b2(string_cls));
    clinit.extend_from_slice(&[0x59, 0x03, 0x12, lit_a as u8, 0x53]);
    clinit.extend_from_slice(&[0x59, 0x04, 0x12, lit_b as u8, 0x53]);
    clinit.push(0xb3);
    clinit.extend_from_slice(&b2(keys_field));
    clinit.push(0xb1);
    cb.static_method(
        "<clinit>",
        "()V",
        CodeDef {
            max_stack: 4,
            max_locals: 0,
            code: clinit,
            frames: vec![],
        },
    );
    cb
}

#[test]
fn static_key_table_with_unknown_index_fans_out() {
    let mut cb = keys_class();
    let keys_field = cb.pool.field_ref("test/Keys", "KEYS", "[Ljava/lang/String;");
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    // aload_1; getstatic KEYS; iload_2; aaload; iconst_3; putInt; return
    let mut code = vec![0x2b, 0xb2];
    code.extend_from_slice(&b2(keys_field));
    code.extend_from_slice(&[0x1c, 0x32, 0x06, 0xb6]);
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    let desc = "(Lnet/minecraft/nbt/CompoundTag;I)V";
    cb.method(
        "write",
        desc,
        CodeDef {
            max_stack: 3,
            max_locals: 3,
            code,
            frames: vec![],
        },
    );

    let (_, root) = analyze_flat(vec![cb.parse()], "test/Keys", "write", desc);
    assert_eq!(entry_kind(&root, "A"), ("Int".to_string(), false));
    assert_eq!(entry_kind(&root, "B"), ("Int".to_string(), false));
}

#[test]
fn static_key_table_with_known_index_records_one_key() {
    let mut cb = keys_class();
    let keys_field = cb.pool.field_ref("test/Keys", "KEYS", "[Ljava/lang/String;");
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    // aload_1; getstatic KEYS; iconst_0; aaload; iconst_3; putInt; return
    let mut code = vec![0x2b, 0xb2];
    code.extend_from_slice(&b2(keys_field));
    code.extend_from_slice(&[0x03, 0x32, 0x06, 0xb6]);
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    cb.method(
        "writeOne",
        WRITE_DESC,
        CodeDef {
            max_stack: 3,
            max_locals: 2,
            code,
            frames: vec![],
        },
    );

    let (_, root) = analyze_flat(vec![cb.parse()], "test/Keys", "writeOne", WRITE_DESC);
    let compound = as_compound(&root);
    assert_eq!(compound.entries.len(), 1);
    assert_eq!(entry_kind(&root, "A"), ("Int".to_string(), false));
}

#[test]
fn passengers_list_records_a_nested_entity_backref() {
    // ListTag list = new ListTag(); CompoundTag tag2 = new CompoundTag();
    // this.saveAsPassenger(tag2); list.add(tag2); tag.put("Passengers", list);
    let mut cb = ClassBuilder::new("test/Carrier");
    let list_cls = cb.pool.class(LIST_TAG);
    let list_init = cb.pool.method_ref(LIST_TAG, "<init>", "()V");
    let tag_cls = cb.pool.class(COMPOUND_TAG);
    let tag_init = cb.pool.method_ref(COMPOUND_TAG, "<init>", "()V");
    let save_as_passenger = cb.pool.method_ref(
        ENTITY,
        "saveAsPassenger",
        "(Lnet/minecraft/nbt/CompoundTag;)Z",
    );
    let list_add = cb.pool.method_ref(LIST_TAG, "add", "(Lnet/minecraft/nbt/Tag;)Z");
    let key = cb.pool.string("Passengers");
    let put = cb.pool.method_ref(
        COMPOUND_TAG,
        "put",
        "(Ljava/lang/String;Lnet/minecraft/nbt/Tag;)Lnet/minecraft/nbt/Tag;",
    );

    let mut code = vec![0xbb];
    code.extend_from_slice(&b2(list_cls));
    code.extend_from_slice(&[0x59, 0xb7]);
    code.extend_from_slice(&b2(list_init));
    code.push(0x4d); // astore_2
    code.push(0xbb);
    code.extend_from_slice(&b2(tag_cls));
    code.extend_from_slice(&[0x59, 0xb7]);
    code.extend_from_slice(&b2(tag_init));
    code.push(0x4e); // astore_3
    code.extend_from_slice(&[0x2a, 0x2d, 0xb6]);
    code.extend_from_slice(&b2(save_as_passenger));
    code.push(0x57); // pop the boolean
    code.extend_from_slice(&[0x2c, 0x2d, 0xb6]);
    code.extend_from_slice(&b2(list_add));
    code.push(0x57);
    code.extend_from_slice(&[0x2b, 0x12, key as u8, 0x2c, 0xb6]);
    code.extend_from_slice(&b2(put));
    code.extend_from_slice(&[0x57, 0xb1]);
    cb.method(
        "write",
        WRITE_DESC,
        CodeDef {
            max_stack: 3,
            max_locals: 4,
            code,
            frames: vec![],
        },
    );

    let (_, root) = analyze_flat(vec![cb.parse()], "test/Carrier", "write", WRITE_DESC);
    let compound = as_compound(&root);
    let entry = compound.entries.get("Passengers").expect("Passengers entry");
    match &*entry.value.borrow() {
        NbtElement::List(inner) => {
            assert!(matches!(&*inner.borrow(), NbtElement::NestedEntity))
        }
        other => panic!("expected a list, got {}", other.kind_name()),
    };
}

fn hierarchy() -> Vec<nbtex::classfile::ClassFile> {
    let hook = "addAdditionalSaveData";

    let mut base = ClassBuilder::new("test/Base");
    let key = base.pool.string("base");
    let put_int = base.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let mut code = vec![0x2b, 0x12, key as u8, 0x04, 0xb6];
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    base.method(
        hook,
        WRITE_DESC,
        CodeDef {
            max_stack: 3,
            max_locals: 2,
            code,
            frames: vec![],
        },
    );

    let mut child = ClassBuilder::new("test/Child");
    child.super_name = "test/Base".to_string();
    let super_ref = child.pool.method_ref("test/Base", hook, WRITE_DESC);
    let key = child.pool.string("child");
    let put_int = child.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let mut code = vec![0x2a, 0x2b, 0xb7];
    code.extend_from_slice(&b2(super_ref));
    code.extend_from_slice(&[0x2b, 0x12, key as u8, 0x04, 0xb6]);
    code.extend_from_slice(&b2(put_int));
    code.push(0xb1);
    child.method(
        hook,
        WRITE_DESC,
        CodeDef {
            max_stack: 3,
            max_locals: 2,
            code,
            frames: vec![],
        },
    );

    vec![base.parse(), child.parse()]
}

#[test]
fn ignore_super_skips_the_parents_contribution() {
    let loader = ClassLoader::preloaded(hierarchy());
    let mut analyzer = Analyzer::new(loader);
    let ptr = MethodPointer::new("test/Child", "addAdditionalSaveData", WRITE_DESC);
    let root = analyzer.analyze_entry(&ptr, true).unwrap();
    let namer = nbtex::schema::naming::CompoundNamer::new(analyzer.boxed_types.clone());
    namer.flatten(&root).unwrap();

    let compound = as_compound(&root);
    assert!(compound.entries.contains_key("child"));
    assert!(!compound.entries.contains_key("base"));
}

#[test]
fn without_ignore_super_the_parent_flows_in() {
    let loader = ClassLoader::preloaded(hierarchy());
    let mut analyzer = Analyzer::new(loader);
    let ptr = MethodPointer::new("test/Child", "addAdditionalSaveData", WRITE_DESC);
    let root = analyzer.analyze_entry(&ptr, false).unwrap();
    let namer = nbtex::schema::naming::CompoundNamer::new(analyzer.boxed_types.clone());
    namer.flatten(&root).unwrap();

    let compound = as_compound(&root);
    assert!(compound.entries.contains_key("child"));
    assert!(compound.entries.contains_key("base"));
}

#[test]
fn generic_entry_into_save_without_id_is_fatal() {
    let mut cb = ClassBuilder::new("test/Evil");
    let reentry = cb.pool.method_ref(
        ENTITY,
        "saveWithoutId",
        "(Lnet/minecraft/nbt/CompoundTag;)Lnet/minecraft/nbt/CompoundTag;",
    );
    let mut code = vec![0x2a, 0x2b, 0xb6];
    code.extend_from_slice(&b2(reentry));
    code.extend_from_slice(&[0x57, 0xb1]);
    cb.method(
        "write",
        WRITE_DESC,
        CodeDef {
            max_stack: 2,
            max_locals: 2,
            code,
            frames: vec![],
        },
    );

    let loader = ClassLoader::preloaded(vec![cb.parse()]);
    let mut analyzer = Analyzer::new(loader);
    let ptr = MethodPointer::new("test/Evil", "write", WRITE_DESC);
    match analyzer.analyze_entry(&ptr, false) {
        Err(Error::UnsafeReentry { name, .. }) => assert_eq!(name, "saveWithoutId"),
        other => panic!("expected an unsafe-reentry failure, got {other:?}"),
    }
}

#[test]
fn either_map_produces_a_two_arm_sum() {
    let mut cb = ClassBuilder::new("test/Forked");
    let metafactory = cb.pool.method_ref(
        "java/lang/invoke/LambdaMetafactory",
        "metafactory",
        "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
    );
    let bsm_handle = cb.pool.method_handle(6, metafactory);
    let erased = cb.pool.method_type("(Ljava/lang/Object;)Ljava/lang/Object;");
    let lambda_desc = "(Ljava/lang/Object;)Lnet/minecraft/nbt/CompoundTag;";
    let instantiated = cb.pool.method_type(lambda_desc);
    let left_ref = cb.pool.method_ref("test/Forked", "lambda$write$0", lambda_desc);
    let left_handle = cb.pool.method_handle(6, left_ref);
    let right_ref = cb.pool.method_ref("test/Forked", "lambda$write$1", lambda_desc);
    let right_handle = cb.pool.method_handle(6, right_ref);
    cb.bootstrap
        .push((bsm_handle, vec![erased, left_handle, instantiated]));
    cb.bootstrap
        .push((bsm_handle, vec![erased, right_handle, instantiated]));
    let indy_left =
        cb.pool
            .invoke_dynamic(0, "apply", "()Ljava/util/function/Function;");
    let indy_right =
        cb.pool
            .invoke_dynamic(1, "apply", "()Ljava/util/function/Function;");
    let either_map = cb.pool.method_ref(
        "com/mojang/datafixers/util/Either",
        "map",
        "(Ljava/util/function/Function;Ljava/util/function/Function;)Ljava/lang/Object;",
    );
    let tag_cls = cb.pool.class(TAG);
    let key = cb.pool.string("e");
    let put = cb.pool.method_ref(
        COMPOUND_TAG,
        "put",
        "(Ljava/lang/String;Lnet/minecraft/nbt/Tag;)Lnet/minecraft/nbt/Tag;",
    );

    // aload_1; ldc "e"; aload_2; indy left; indy right; Either.map;
    // checkcast Tag; put; pop; return
    let mut code = vec![0x2b, 0x12, key as u8, 0x2c, 0xba];
    code.extend_from_slice(&b2(indy_left));
    code.extend_from_slice(&[0x00, 0x00, 0xba]);
    code.extend_from_slice(&b2(indy_right));
    code.extend_from_slice(&[0x00, 0x00, 0xb6]);
    code.extend_from_slice(&b2(either_map));
    code.push(0xc0);
    code.extend_from_slice(&b2(tag_cls));
    code.push(0xb6);
    code.extend_from_slice(&b2(put));
    code.extend_from_slice(&[0x57, 0xb1]);
    let desc = "(Lnet/minecraft/nbt/CompoundTag;Lcom/mojang/datafixers/util/Either;)V";
    cb.method(
        "write",
        desc,
        CodeDef {
            max_stack: 5,
            max_locals: 3,
            code,
            frames: vec![],
        },
    );

    for (name, field) in [("lambda$write$0", "x"), ("lambda$write$1", "y")] {
        let key = cb.pool.string(field);
        let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
        let tag_cls = cb.pool.class(COMPOUND_TAG);
        // aload_0; checkcast CompoundTag; astore_1; aload_1; ldc; iconst_1;
        // putInt; aload_1; areturn
        let mut code = vec![0x2a, 0xc0];
        code.extend_from_slice(&b2(tag_cls));
        code.extend_from_slice(&[0x4c, 0x2b, 0x12, key as u8, 0x04, 0xb6]);
        code.extend_from_slice(&b2(put_int));
        code.extend_from_slice(&[0x2b, 0xb0]);
        cb.static_method(
            name,
            lambda_desc,
            CodeDef {
                max_stack: 3,
                max_locals: 2,
                code,
                frames: vec![],
            },
        );
    }

    let (_, root) = analyze_flat(vec![cb.parse()], "test/Forked", "write", desc);
    let compound = as_compound(&root);
    let entry = compound.entries.get("e").expect("entry e");
    let value = entry.value.borrow();
    let NbtElement::Either(left, right) = &*value else {
        panic!("expected a sum, got {}", value.kind_name());
    };
    for (side, field) in [(left, "x"), (right, "y")] {
        match &*side.borrow() {
            NbtElement::Compound(c) => assert!(c.entries.contains_key(field)),
            other => panic!("expected a compound arm, got {}", other.kind_name()),
        }
    }
}

#[test]
fn list_element_reads_share_the_element_schema() {
    // ListTag list = new ListTag(); list.getCompound(0).putInt("n", 1);
    // tag.put("items", list);
    let mut cb = ClassBuilder::new("test/Items");
    let list_cls = cb.pool.class(LIST_TAG);
    let list_init = cb.pool.method_ref(LIST_TAG, "<init>", "()V");
    let get_compound = cb.pool.method_ref(
        LIST_TAG,
        "getCompound",
        "(I)Lnet/minecraft/nbt/CompoundTag;",
    );
    let key_n = cb.pool.string("n");
    let put_int = cb.pool.method_ref(COMPOUND_TAG, "putInt", "(Ljava/lang/String;I)V");
    let key_items = cb.pool.string("items");
    let put = cb.pool.method_ref(
        COMPOUND_TAG,
        "put",
        "(Ljava/lang/String;Lnet/minecraft/nbt/Tag;)Lnet/minecraft/nbt/Tag;",
    );

    let mut code = vec![0xbb];
    code.extend_from_slice(&b2(list_cls));
    code.extend_from_slice(&[0x59, 0xb7]);
    code.extend_from_slice(&b2(list_init));
    code.push(0x4d); // astore_2
    code.extend_from_slice(&[0x2c, 0x03, 0xb6]);
    code.extend_from_slice(&b2(get_compound));
    code.extend_from_slice(&[0x12, key_n as u8, 0x04, 0xb6]);
    code.extend_from_slice(&b2(put_int));
    code.extend_from_slice(&[0x2b, 0x12, key_items as u8, 0x2c, 0xb6]);
    code.extend_from_slice(&b2(put));
    code.extend_from_slice(&[0x57, 0xb1]);
    cb.method(
        "write",
        WRITE_DESC,
        CodeDef {
            max_stack: 3,
            max_locals: 3,
            code,
            frames: vec![],
        },
    );

    let (_, root) = analyze_flat(vec![cb.parse()], "test/Items", "write", WRITE_DESC);
    let compound = as_compound(&root);
    let entry = compound.entries.get("items").expect("items entry");
    let value = entry.value.borrow();
    let NbtElement::List(inner) = &*value else {
        panic!("expected a list, got {}", value.kind_name());
    };
    match &*inner.borrow() {
        NbtElement::Compound(c) => assert!(c.entries.contains_key("n")),
        other => panic!("expected a compound element, got {}", other.kind_name()),
    };
}
