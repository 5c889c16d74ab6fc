//! Sources of raw class bytes.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::info;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::common::error::{Error, Result};

/// Yields raw class-file bytes per internal name (`a/b/C`). Absence is not
/// an error.
pub trait ClassSource {
    fn class_bytes(&mut self, internal_name: &str) -> Result<Option<Vec<u8>>>;
}

/// A source with nothing in it; used when every class is preloaded.
pub struct NullSource;

impl ClassSource for NullSource {
    fn class_bytes(&mut self, _internal_name: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// A `.jar`/`.zip` archive.
pub struct JarSource {
    archive: ZipArchive<File>,
}

impl JarSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        info!(
            "opened archive {} ({} entries)",
            path.display(),
            archive.len()
        );
        Ok(Self { archive })
    }
}

impl ClassSource for JarSource {
    fn class_bytes(&mut self, internal_name: &str) -> Result<Option<Vec<u8>>> {
        let entry_name = format!("{internal_name}.class");
        match self.archive.by_name(&entry_name) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// An exploded class directory, indexed once up front.
pub struct DirSource {
    index: HashMap<String, PathBuf>,
}

impl DirSource {
    pub fn open(root: &Path) -> Result<Self> {
        let mut index = HashMap::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| Error::config(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "class") {
                if let Ok(rel) = path.strip_prefix(root) {
                    let internal = rel
                        .with_extension("")
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    index.insert(internal, path.to_path_buf());
                }
            }
        }
        info!("indexed {} classes under {}", index.len(), root.display());
        Ok(Self { index })
    }
}

impl ClassSource for DirSource {
    fn class_bytes(&mut self, internal_name: &str) -> Result<Option<Vec<u8>>> {
        match self.index.get(internal_name) {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }
}

/// Pick the right source for a path: an archive file or an exploded
/// directory.
pub fn open_source(path: &Path) -> Result<Box<dyn ClassSource>> {
    if path.is_dir() {
        Ok(Box::new(DirSource::open(path)?))
    } else {
        Ok(Box::new(JarSource::open(path)?))
    }
}
