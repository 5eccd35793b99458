//! Zip package access: part lookup on the way in, verbatim repackaging on the way out

use crate::error::{PatchError, Result};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, HasZipMetadata, ZipArchive, ZipWriter};

/// Host system id of Unix in the "version made by" field
const UNIX_HOST: u8 = 3;

/// Metadata of one entry as stored in the original package
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    pub name: String,
    pub compression: CompressionMethod,
    /// Mode recorded by a Unix archiver; `None` for entries made elsewhere
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
    pub size: u64,
}

/// An opened template package.
///
/// The template bytes are shared and never modified; [`Package::write`]
/// builds a new archive from them.
pub struct Package {
    archive: ZipArchive<Cursor<Arc<[u8]>>>,
    parts: Vec<PartInfo>,
}

impl Package {
    /// Open a package from its raw bytes
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        Self::from_shared(Arc::from(bytes))
    }

    /// Open a package over bytes that other packages may be reading too
    pub fn from_shared(bytes: Arc<[u8]>) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(PatchError::NotAZipPackage)?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(PatchError::NotAZipPackage)?;
            // zip synthesizes a mode from MS-DOS attributes; only a real one is worth keeping
            let unix_made = u8::from(file.get_metadata().system) == UNIX_HOST;
            parts.push(PartInfo {
                name: file.name().to_string(),
                compression: file.compression(),
                unix_mode: file.unix_mode().filter(|_| unix_made),
                is_dir: file.is_dir(),
                size: file.size(),
            });
        }

        Ok(Self { archive, parts })
    }

    /// Every entry in original archive order
    pub fn parts(&self) -> &[PartInfo] {
        &self.parts
    }

    pub fn contains(&self, path: &str) -> bool {
        self.parts.iter().any(|p| p.name == path)
    }

    /// Decompressed content of a part
    pub fn read_part(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(PatchError::MissingPart(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Like [`Package::read_part`] but `None` when the part does not exist
    pub fn read_optional_part(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        if !self.contains(path) {
            return Ok(None);
        }
        self.read_part(path).map(Some)
    }

    /// Re-serialize the package, substituting `overrides` by part path.
    ///
    /// Parts without an override are copied raw: compressed data, local
    /// headers and attributes stay as they were. Overridden parts keep
    /// their original compression method, and their permissions when a
    /// Unix archiver made them; the writer marks every rewritten entry as
    /// Unix-made either way. Override paths absent from the original are
    /// appended at the end.
    pub fn write(&mut self, overrides: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written = HashSet::new();

        for (i, part) in self.parts.iter().enumerate() {
            match overrides.get(&part.name) {
                Some(content) if !part.is_dir => {
                    let mut options =
                        SimpleFileOptions::default().compression_method(part.compression);
                    if let Some(mode) = part.unix_mode {
                        options = options.unix_permissions(mode);
                    }
                    zip_writer.start_file(part.name.as_str(), options)?;
                    zip_writer.write_all(content)?;
                    written.insert(part.name.as_str());
                }
                _ => {
                    let file = self.archive.by_index_raw(i)?;
                    zip_writer.raw_copy_file(file)?;
                }
            }
        }

        for (name, content) in overrides {
            if written.contains(name.as_str()) || self.contains(name) {
                continue;
            }
            log::debug!("Appending new part '{}'", name);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(content)?;
        }

        let cursor = zip_writer.finish()?;
        Ok(cursor.into_inner())
    }
}
