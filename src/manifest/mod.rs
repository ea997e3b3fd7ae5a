//! Manifest files and their managers
//!
//! A manifest is a JSON Lines file: a short header followed by one entry
//! per line. [`ManifestIndex`] records the byte offset of every entry so
//! single entries can be read without scanning the file.
//!
//! - `types`: header and entry records
//! - `index`: the offset index and its persisted form
//! - `store`: file, index and index lifecycle shared by both managers
//! - `video`, `images`: the two manager flavours
//! - `hierarchy`: directory listing emulation over image names
//! - `validator`: cheap structural checks

pub mod hierarchy;
pub mod images;
pub mod index;
pub mod store;
pub mod types;
pub mod validator;
pub mod video;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

pub use hierarchy::{EntryKind, HierarchyPage, HierarchyQuery, ListingEntry};
pub use images::ImageManifestManager;
pub use index::ManifestIndex;
pub use store::{Entries, IndexState, ManifestStore};
pub use types::{ImageProperties, ManifestEntry, ManifestType, VideoFrameEntry, VideoProperties};
pub use validator::{is_dataset_manifest, is_manifest, is_video_manifest, validate_manifest};
pub use video::VideoManifestManager;

use crate::config::IndexConfig;
use crate::error::{ManifestError, Result};
use types::{TypeLine, VersionLine};

/// Behaviour shared by the video and image managers
pub trait ManifestManager {
    type Entry: ManifestEntry;

    fn store(&self) -> &ManifestStore;

    fn store_mut(&mut self) -> &mut ManifestStore;

    /// Build the manifest from the linked reader, replacing any previous file
    fn create(&mut self) -> Result<()>;

    /// Entry at ordinal `index`
    fn get(&mut self, index: usize) -> Result<Self::Entry> {
        self.store_mut().read_entry(index)
    }

    fn get_range(&mut self, range: Range<usize>) -> Result<Vec<Self::Entry>> {
        self.store_mut().entries(range)?.collect()
    }

    /// All entries in order
    fn iter(&mut self) -> Result<Entries<'_, Self::Entry>> {
        let len = self.store_mut().len()?;
        self.store_mut().entries(0..len)
    }

    /// Number of entries
    fn len(&mut self) -> Result<usize> {
        self.store_mut().len()
    }

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete the manifest and its index
    fn remove(&mut self) -> Result<()> {
        self.store_mut().remove()
    }

    fn manifest_path(&self) -> &Path {
        self.store().manifest_path()
    }

    fn exists(&self) -> bool {
        self.store().exists()
    }

    /// Format version from the header
    fn version(&self) -> Result<String> {
        let line: VersionLine = self.store().header(0)?;
        Ok(line.version)
    }

    fn manifest_type(&self) -> ManifestType {
        self.store().manifest_type()
    }

    fn index_state(&self) -> IndexState {
        self.store().index_state()
    }
}

/// A manager for an existing manifest of either type
#[derive(Debug)]
pub enum Manifest {
    Video(VideoManifestManager),
    Images(ImageManifestManager),
}

impl Manifest {
    /// Open an existing manifest, choosing the manager from its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &IndexConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Result<Self> {
        let manifest_path = config.manifest_path(path.as_ref());
        let line: TypeLine = store::read_header_line(&manifest_path, 1)?;
        tracing::debug!("Opened {} manifest {:?}", line.manifest_type, manifest_path);
        Ok(match line.manifest_type {
            ManifestType::Video => {
                Manifest::Video(VideoManifestManager::with_config(&manifest_path, config))
            }
            ManifestType::Images => {
                Manifest::Images(ImageManifestManager::with_config(&manifest_path, config))
            }
        })
    }

    pub fn manifest_type(&self) -> ManifestType {
        match self {
            Manifest::Video(manager) => manager.manifest_type(),
            Manifest::Images(manager) => manager.manifest_type(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        match self {
            Manifest::Video(manager) => manager.manifest_path(),
            Manifest::Images(manager) => manager.manifest_path(),
        }
    }

    pub fn version(&self) -> Result<String> {
        match self {
            Manifest::Video(manager) => manager.version(),
            Manifest::Images(manager) => manager.version(),
        }
    }

    pub fn len(&mut self) -> Result<usize> {
        match self {
            Manifest::Video(manager) => manager.len(),
            Manifest::Images(manager) => manager.len(),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Entry `index` as a JSON value, whatever the manifest type
    pub fn get_value(&mut self, index: usize) -> Result<serde_json::Value> {
        Ok(match self {
            Manifest::Video(manager) => serde_json::to_value(manager.get(index)?)?,
            Manifest::Images(manager) => serde_json::to_value(manager.get(index)?)?,
        })
    }

    pub fn remove(&mut self) -> Result<()> {
        match self {
            Manifest::Video(manager) => manager.remove(),
            Manifest::Images(manager) => manager.remove(),
        }
    }
}

/// Write `path` through a temporary sibling file that is renamed into place
/// once `write` succeeded.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file_name = path
        .file_name()
        .ok_or_else(|| ManifestError::InvalidInput(format!("{:?} is not a file path", path)))?;
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let written: Result<()> = (|| {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    let result = written.and_then(|()| fs::rename(&tmp_path, path).map_err(Into::into));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomically_leaves_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let result = write_atomically(&path, |writer| {
            writer.write_all(b"partial")?;
            Err(ManifestError::InvalidImage("broken".to_string()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomically_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "old").unwrap();
        write_atomically(&path, |writer| Ok(writer.write_all(b"new")?)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_open_unknown_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::open(dir.path().join("missing.jsonl")).is_err());
    }
}
