//! The parse-once class cache.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::classfile::ClassFile;
use crate::common::classpath::{open_source, ClassSource, NullSource};
use crate::common::error::Result;

/// Resolves internal class names to parsed class files. Every class is
/// parsed at most once; misses are cached as absent and reported as `None`.
pub struct ClassLoader {
    source: Box<dyn ClassSource>,
    cache: HashMap<String, Option<Rc<ClassFile>>>,
}

impl ClassLoader {
    pub fn new(source: Box<dyn ClassSource>) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(open_source(path)?))
    }

    /// Loader over a fixed set of already-parsed classes; the backbone of
    /// the synthetic-fixture tests.
    pub fn preloaded(classes: impl IntoIterator<Item = ClassFile>) -> Self {
        let mut loader = Self::new(Box::new(NullSource));
        for class in classes {
            loader.insert(class);
        }
        loader
    }

    pub fn insert(&mut self, class: ClassFile) {
        self.cache
            .insert(class.name.clone(), Some(Rc::new(class)));
    }

    pub fn find_class(&mut self, internal_name: &str) -> Result<Option<Rc<ClassFile>>> {
        if let Some(cached) = self.cache.get(internal_name) {
            return Ok(cached.clone());
        }
        let parsed = match self.source.class_bytes(internal_name)? {
            Some(bytes) => Some(Rc::new(ClassFile::parse(&bytes)?)),
            None => {
                debug!("class {internal_name} not found");
                None
            }
        };
        self.cache.insert(internal_name.to_string(), parsed.clone());
        Ok(parsed)
    }
}
