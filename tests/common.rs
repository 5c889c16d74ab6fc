//! Shared test fixtures: a small class-file assembler producing real bytes
//! for the parser, plus helpers for driving the analyzer over them.
#![allow(dead_code)]

use std::collections::HashMap;

use nbtex::analysis::{Analyzer, MethodPointer};
use nbtex::classfile::ClassFile;
use nbtex::common::loader::ClassLoader;
use nbtex::schema::naming::CompoundNamer;
use nbtex::schema::{NbtCompound, NbtElement, NbtRef};

pub const COMPOUND_TAG: &str = "net/minecraft/nbt/CompoundTag";
pub const LIST_TAG: &str = "net/minecraft/nbt/ListTag";
pub const TAG: &str = "net/minecraft/nbt/Tag";

/// Writing constant pool for fixtures; entries are emitted in insertion
/// order and deduplicated per kind.
#[derive(Default)]
pub struct TestPool {
    entries: Vec<Vec<u8>>,
    utf8_map: HashMap<String, u16>,
    class_map: HashMap<String, u16>,
    string_map: HashMap<String, u16>,
    nat_map: HashMap<(String, String), u16>,
    ref_map: HashMap<(u8, String, String, String), u16>,
}

impl TestPool {
    fn push(&mut self, bytes: Vec<u8>) -> u16 {
        self.entries.push(bytes);
        self.entries.len() as u16
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        if let Some(idx) = self.utf8_map.get(value) {
            return *idx;
        }
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());
        let idx = self.push(bytes);
        self.utf8_map.insert(value.to_string(), idx);
        idx
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(&value.to_be_bytes());
        self.push(bytes)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.class_map.get(name) {
            return *idx;
        }
        let name_idx = self.utf8(name);
        let mut bytes = vec![7u8];
        bytes.extend_from_slice(&name_idx.to_be_bytes());
        let idx = self.push(bytes);
        self.class_map.insert(name.to_string(), idx);
        idx
    }

    pub fn string(&mut self, value: &str) -> u16 {
        if let Some(idx) = self.string_map.get(value) {
            return *idx;
        }
        let utf8_idx = self.utf8(value);
        let mut bytes = vec![8u8];
        bytes.extend_from_slice(&utf8_idx.to_be_bytes());
        let idx = self.push(bytes);
        self.string_map.insert(value.to_string(), idx);
        idx
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(idx) = self.nat_map.get(&key) {
            return *idx;
        }
        let name_idx = self.utf8(name);
        let desc_idx = self.utf8(descriptor);
        let mut bytes = vec![12u8];
        bytes.extend_from_slice(&name_idx.to_be_bytes());
        bytes.extend_from_slice(&desc_idx.to_be_bytes());
        let idx = self.push(bytes);
        self.nat_map.insert(key, idx);
        idx
    }

    fn member(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let key = (tag, class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(idx) = self.ref_map.get(&key) {
            return *idx;
        }
        let class_idx = self.class(class);
        let nat_idx = self.name_and_type(name, descriptor);
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&class_idx.to_be_bytes());
        bytes.extend_from_slice(&nat_idx.to_be_bytes());
        let idx = self.push(bytes);
        self.ref_map.insert(key, idx);
        idx
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, class, name, descriptor)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, class, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(11, class, name, descriptor)
    }

    pub fn method_handle(&mut self, kind: u8, ref_idx: u16) -> u16 {
        let mut bytes = vec![15u8, kind];
        bytes.extend_from_slice(&ref_idx.to_be_bytes());
        self.push(bytes)
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let desc_idx = self.utf8(descriptor);
        let mut bytes = vec![16u8];
        bytes.extend_from_slice(&desc_idx.to_be_bytes());
        self.push(bytes)
    }

    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nat_idx = self.name_and_type(name, descriptor);
        let mut bytes = vec![18u8];
        bytes.extend_from_slice(&bootstrap.to_be_bytes());
        bytes.extend_from_slice(&nat_idx.to_be_bytes());
        self.push(bytes)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = ((self.entries.len() + 1) as u16).to_be_bytes().to_vec();
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
        out
    }
}

pub struct MethodDef {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<CodeDef>,
}

pub struct CodeDef {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Raw frame bytes (without the count), e.g. from [`same_frame`].
    pub frames: Vec<Vec<u8>>,
}

/// Assembles a complete class file.
pub struct ClassBuilder {
    pub pool: TestPool,
    pub name: String,
    pub super_name: String,
    pub access: u16,
    pub methods: Vec<MethodDef>,
    pub bootstrap: Vec<(u16, Vec<u16>)>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            pool: TestPool::default(),
            name: name.to_string(),
            super_name: "java/lang/Object".to_string(),
            access: 0x0021, // public super
            methods: Vec::new(),
            bootstrap: Vec::new(),
        }
    }

    pub fn method(&mut self, name: &str, descriptor: &str, code: CodeDef) -> &mut Self {
        self.methods.push(MethodDef {
            access: 0x0001,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(code),
        });
        self
    }

    pub fn static_method(&mut self, name: &str, descriptor: &str, code: CodeDef) -> &mut Self {
        self.methods.push(MethodDef {
            access: 0x0009, // public static
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(code),
        });
        self
    }

    pub fn build(&mut self) -> Vec<u8> {
        let this_idx = self.pool.class(&self.name.clone());
        let super_idx = self.pool.class(&self.super_name.clone());
        let code_name = self.pool.utf8("Code");
        let smt_name = self.pool.utf8("StackMapTable");
        let bsm_name = if self.bootstrap.is_empty() {
            0
        } else {
            self.pool.utf8("BootstrapMethods")
        };
        let mut method_blobs = Vec::new();
        for m in &self.methods {
            let name_idx = self.pool.utf8(&m.name.clone());
            let desc_idx = self.pool.utf8(&m.descriptor.clone());
            method_blobs.push((name_idx, desc_idx));
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        out.extend_from_slice(&self.pool.to_bytes());
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&this_idx.to_be_bytes());
        out.extend_from_slice(&super_idx.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields

        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for (m, (name_idx, desc_idx)) in self.methods.iter().zip(&method_blobs) {
            out.extend_from_slice(&m.access.to_be_bytes());
            out.extend_from_slice(&name_idx.to_be_bytes());
            out.extend_from_slice(&desc_idx.to_be_bytes());
            match &m.code {
                None => out.extend_from_slice(&0u16.to_be_bytes()),
                Some(code) => {
                    out.extend_from_slice(&1u16.to_be_bytes());
                    let mut body = Vec::new();
                    body.extend_from_slice(&code.max_stack.to_be_bytes());
                    body.extend_from_slice(&code.max_locals.to_be_bytes());
                    body.extend_from_slice(&(code.code.len() as u32).to_be_bytes());
                    body.extend_from_slice(&code.code);
                    body.extend_from_slice(&0u16.to_be_bytes()); // handlers
                    if code.frames.is_empty() {
                        body.extend_from_slice(&0u16.to_be_bytes());
                    } else {
                        body.extend_from_slice(&1u16.to_be_bytes());
                        let mut table = (code.frames.len() as u16).to_be_bytes().to_vec();
                        for frame in &code.frames {
                            table.extend_from_slice(frame);
                        }
                        body.extend_from_slice(&smt_name.to_be_bytes());
                        body.extend_from_slice(&(table.len() as u32).to_be_bytes());
                        body.extend_from_slice(&table);
                    }
                    out.extend_from_slice(&code_name.to_be_bytes());
                    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                    out.extend_from_slice(&body);
                }
            }
        }

        if self.bootstrap.is_empty() {
            out.extend_from_slice(&0u16.to_be_bytes());
        } else {
            out.extend_from_slice(&1u16.to_be_bytes());
            let mut body = (self.bootstrap.len() as u16).to_be_bytes().to_vec();
            for (handle, args) in &self.bootstrap {
                body.extend_from_slice(&handle.to_be_bytes());
                body.extend_from_slice(&(args.len() as u16).to_be_bytes());
                for arg in args {
                    body.extend_from_slice(&arg.to_be_bytes());
                }
            }
            out.extend_from_slice(&bsm_name.to_be_bytes());
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(&body);
        }

        out
    }

    pub fn parse(&mut self) -> ClassFile {
        let bytes = self.build();
        ClassFile::parse(&bytes).expect("fixture class must parse")
    }
}

pub fn same_frame(offset_delta: u8) -> Vec<u8> {
    assert!(offset_delta <= 63);
    vec![offset_delta]
}

pub fn same_frame_extended(offset_delta: u16) -> Vec<u8> {
    let mut bytes = vec![251u8];
    bytes.extend_from_slice(&offset_delta.to_be_bytes());
    bytes
}

pub fn b2(idx: u16) -> [u8; 2] {
    [(idx >> 8) as u8, (idx & 0xFF) as u8]
}

/// Run one entry point over preloaded classes and return the raw (pre-pass)
/// root compound together with the analyzer.
pub fn analyze(
    classes: Vec<ClassFile>,
    class: &str,
    method: &str,
    descriptor: &str,
) -> (Analyzer, NbtRef) {
    let loader = ClassLoader::preloaded(classes);
    let mut analyzer = Analyzer::new(loader);
    let ptr = MethodPointer::new(class, method, descriptor);
    let root = analyzer
        .analyze_entry(&ptr, false)
        .expect("analysis must succeed");
    (analyzer, root)
}

/// Like [`analyze`] but with the flatten pass applied, which inlines the
/// per-call deltas into the root compound.
pub fn analyze_flat(
    classes: Vec<ClassFile>,
    class: &str,
    method: &str,
    descriptor: &str,
) -> (Analyzer, NbtRef) {
    let (analyzer, root) = analyze(classes, class, method, descriptor);
    let namer = CompoundNamer::new(analyzer.boxed_types.clone());
    namer.flatten(&root).expect("flatten must succeed");
    (analyzer, root)
}

pub fn as_compound(root: &NbtRef) -> NbtCompound {
    match &*root.borrow() {
        NbtElement::Compound(c) => c.clone(),
        other => panic!("expected a compound, got {}", other.kind_name()),
    }
}

/// Entry lookup: (kind name, optional flag).
pub fn entry_kind(root: &NbtRef, key: &str) -> (String, bool) {
    let compound = as_compound(root);
    let entry = compound
        .entries
        .get(key)
        .unwrap_or_else(|| panic!("missing entry '{key}'"));
    let kind = entry.value.borrow().kind_name().to_string();
    let optional = entry.optional;
    (kind, optional)
}
