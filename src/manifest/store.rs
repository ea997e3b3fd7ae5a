//! File and index handling shared by the video and image managers

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use super::index::ManifestIndex;
use super::types::{self, ManifestEntry, ManifestType, TypeLine, VersionLine, MANIFEST_VERSION};
use super::write_atomically;
use crate::config::IndexConfig;
use crate::error::{ManifestError, Result};

/// Where the in-memory index stands relative to the manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Nothing read yet; a persisted index may be reused
    Unloaded,
    /// Offsets match the manifest on disk
    Loaded,
    /// The manifest was rewritten or removed; rebuild before reading
    Stale,
}

/// A manifest file, its index and the index's lifecycle
#[derive(Debug)]
pub struct ManifestStore {
    manifest_path: PathBuf,
    index_path: PathBuf,
    manifest_type: ManifestType,
    persist_index: bool,
    index: ManifestIndex,
    state: IndexState,
}

impl ManifestStore {
    pub fn new(path: &Path, manifest_type: ManifestType, config: &IndexConfig) -> Self {
        let manifest_path = config.manifest_path(path);
        let index_path = config.index_path(&manifest_path);
        Self {
            manifest_path,
            index_path,
            manifest_type,
            persist_index: config.persist,
            index: ManifestIndex::new(),
            state: IndexState::Unloaded,
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn manifest_type(&self) -> ManifestType {
        self.manifest_type
    }

    pub fn index_state(&self) -> IndexState {
        self.state
    }

    pub fn exists(&self) -> bool {
        self.manifest_path.is_file()
    }

    fn manifest_name(&self) -> String {
        self.manifest_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Bring the index to [`IndexState::Loaded`]
    pub fn ensure_index(&mut self) -> Result<&ManifestIndex> {
        match self.state {
            IndexState::Loaded => {}
            IndexState::Unloaded => {
                self.index = self.load_or_build(true)?;
                self.state = IndexState::Loaded;
            }
            IndexState::Stale => {
                self.index = self.load_or_build(false)?;
                self.state = IndexState::Loaded;
            }
        }
        Ok(&self.index)
    }

    fn load_or_build(&self, reuse_persisted: bool) -> Result<ManifestIndex> {
        if !self.exists() {
            return Err(ManifestError::InvalidManifest(format!(
                "{:?} does not exist",
                self.manifest_path
            )));
        }

        if reuse_persisted && self.persist_index && self.index_path.is_file() {
            let manifest_len = fs::metadata(&self.manifest_path)?.len();
            match ManifestIndex::load(&self.index_path) {
                Ok(index) if index.is_consistent_with(manifest_len) => {
                    tracing::debug!("Reusing index {:?}", self.index_path);
                    return Ok(index);
                }
                Ok(_) => tracing::warn!(
                    "Index {:?} does not match {:?}, rebuilding",
                    self.index_path,
                    self.manifest_path
                ),
                Err(e) => tracing::warn!("{}, rebuilding", e),
            }
        }

        let index = ManifestIndex::create(&self.manifest_path, self.manifest_type.header_lines())?;
        if self.persist_index {
            index.dump(&self.index_path)?;
        }
        Ok(index)
    }

    /// Drop the in-memory index; the next read rebuilds it
    pub fn invalidate(&mut self) {
        self.index = ManifestIndex::new();
        self.state = IndexState::Stale;
    }

    /// Replace the manifest with the common header followed by whatever
    /// `write_body` emits, then re-index.
    ///
    /// The file only appears once `write_body` succeeded.
    pub fn write<F>(&mut self, write_body: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        if let Some(parent) = self.manifest_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manifest_type = self.manifest_type;
        write_atomically(&self.manifest_path, |writer| {
            types::write_line(
                writer,
                &VersionLine {
                    version: MANIFEST_VERSION.to_string(),
                },
            )?;
            types::write_line(writer, &TypeLine { manifest_type })?;
            write_body(writer)
        })?;

        self.invalidate();
        self.ensure_index()?;
        Ok(())
    }

    /// Parse header line `line_number` (0-based) without touching the index
    pub fn header<T: DeserializeOwned>(&self, line_number: usize) -> Result<T> {
        read_header_line(&self.manifest_path, line_number)
    }

    /// Read and parse entry `index`
    pub fn read_entry<E: ManifestEntry>(&mut self, index: usize) -> Result<E> {
        let offset = self.ensure_index()?.get(index)?;
        let mut reader = BufReader::new(File::open(&self.manifest_path)?);
        reader.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        reader.read_line(&mut line)?;
        types::parse_entry(&line, &self.manifest_name())
    }

    /// Iterate entries in `range`
    pub fn entries<E: ManifestEntry>(&mut self, range: Range<usize>) -> Result<Entries<'_, E>> {
        let len = self.ensure_index()?.len();
        if range.end > len || range.start > range.end {
            return Err(ManifestError::IndexOutOfRange {
                index: range.end.max(range.start),
                len,
            });
        }

        let file = File::open(&self.manifest_path)?;
        Ok(Entries {
            index: &self.index,
            reader: BufReader::new(file),
            range,
            manifest_name: self.manifest_name(),
            _entry: PhantomData,
        })
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.ensure_index()?.len())
    }

    /// Delete the manifest and its persisted index
    pub fn remove(&mut self) -> Result<()> {
        match fs::remove_file(&self.manifest_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        ManifestIndex::remove(&self.index_path)?;
        self.invalidate();
        tracing::debug!("Removed {:?}", self.manifest_path);
        Ok(())
    }
}

/// Parse line `line_number` of a manifest's header
pub(crate) fn read_header_line<T: DeserializeOwned>(path: &Path, line_number: usize) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    let line = reader.lines().nth(line_number).transpose()?.ok_or_else(|| {
        ManifestError::InvalidManifest(format!(
            "{:?} has no header line {}",
            path, line_number
        ))
    })?;
    serde_json::from_str(&line).map_err(|e| {
        ManifestError::InvalidManifest(format!("Invalid header in {:?}: {}", path, e))
    })
}

/// Iterator over manifest entries, see [`ManifestStore::entries`]
pub struct Entries<'a, E> {
    index: &'a ManifestIndex,
    reader: BufReader<File>,
    range: Range<usize>,
    manifest_name: String,
    _entry: PhantomData<E>,
}

impl<E: ManifestEntry> Entries<'_, E> {
    fn read(&mut self, position: usize) -> Result<E> {
        let offset = self.index.get(position)?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        types::parse_entry(&line, &self.manifest_name)
    }
}

impl<E: ManifestEntry> Iterator for Entries<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.range.next()?;
        Some(self.read(position))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::types::ImageProperties;
    use std::io::Write;

    fn write_images(store: &mut ManifestStore, names: &[&str]) {
        store
            .write(|writer| {
                for name in names {
                    types::write_line(writer, &ImageProperties::new(*name, ".jpg"))?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::new(dir.path(), ManifestType::Images, &IndexConfig::default());
        assert_eq!(store.index_state(), IndexState::Unloaded);
        assert!(!store.exists());

        write_images(&mut store, &["a", "b", "c"]);
        assert_eq!(store.index_state(), IndexState::Loaded);
        assert!(store.index_path().is_file());
        assert_eq!(store.len().unwrap(), 3);

        let entry: ImageProperties = store.read_entry(1).unwrap();
        assert_eq!(entry.name, "b");

        store.remove().unwrap();
        assert_eq!(store.index_state(), IndexState::Stale);
        assert!(!store.exists());
        assert!(!store.index_path().exists());
        assert!(store.len().is_err());
    }

    #[test]
    fn test_stale_persisted_index_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::default();
        let mut store = ManifestStore::new(dir.path(), ManifestType::Images, &config);
        write_images(&mut store, &["a", "b"]);

        // offsets past the end of the file
        ManifestIndex::from(vec![10, 20_000]).dump(store.index_path()).unwrap();

        let mut reopened = ManifestStore::new(dir.path(), ManifestType::Images, &config);
        let entry: ImageProperties = reopened.read_entry(1).unwrap();
        assert_eq!(entry.name, "b");
    }

    #[test]
    fn test_entries_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::new(dir.path(), ManifestType::Images, &IndexConfig::default());
        write_images(&mut store, &["a", "b", "c", "d"]);

        let names: Vec<String> = store
            .entries::<ImageProperties>(1..3)
            .unwrap()
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(matches!(
            store.entries::<ImageProperties>(2..5),
            Err(ManifestError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unpersisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig {
            persist: false,
            ..Default::default()
        };
        let mut store = ManifestStore::new(dir.path(), ManifestType::Images, &config);
        write_images(&mut store, &["a"]);
        assert!(!store.index_path().exists());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_header_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::new(dir.path(), ManifestType::Images, &IndexConfig::default());
        write_images(&mut store, &[]);
        let version: VersionLine = store.header(0).unwrap();
        assert_eq!(version.version, "1.1");
        let kind: TypeLine = store.header(1).unwrap();
        assert_eq!(kind.manifest_type, ManifestType::Images);
        assert!(store.header::<TypeLine>(2).is_err());
    }

    #[test]
    fn test_corrupted_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{{\"version\":\"1.1\"}}\n{{\"type\":\"images\"}}\n{{\"name\":\"a\",").unwrap();
        drop(file);

        let mut store = ManifestStore::new(&path, ManifestType::Images, &IndexConfig::default());
        assert!(matches!(
            store.read_entry::<ImageProperties>(0),
            Err(ManifestError::InvalidManifest(_))
        ));
    }
}
