//! Byte offset index over the entry lines of a manifest

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::write_atomically;
use crate::error::{ManifestError, Result};

/// Maps entry ordinals to the byte offset where that entry's line starts.
///
/// Persisted as a JSON object `{"0": offset, "1": offset, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestIndex {
    offsets: Vec<u64>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a manifest, skipping `skip` header lines and blank lines
    pub fn create<P: AsRef<Path>>(manifest_path: P, skip: usize) -> Result<Self> {
        let mut reader = BufReader::new(File::open(manifest_path.as_ref())?);
        let mut offset = 0u64;
        let mut line = Vec::new();

        for _ in 0..skip {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            offset += read as u64;
        }

        let mut index = Self::new();
        index.scan_from(&mut reader, offset)?;
        tracing::debug!(
            "Indexed {} entries of {:?}",
            index.len(),
            manifest_path.as_ref()
        );
        Ok(index)
    }

    fn scan_from<R: BufRead>(&mut self, reader: &mut R, mut offset: u64) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                return Ok(());
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                self.offsets.push(offset);
            }
            offset += read as u64;
        }
    }

    /// Write the index as compact JSON
    pub fn dump<P: AsRef<Path>>(&self, index_path: P) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        write_atomically(index_path.as_ref(), |writer| {
            writer.write_all(&data)?;
            Ok(())
        })
    }

    /// Read a persisted index
    pub fn load<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let path = index_path.as_ref();
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ManifestError::InvalidManifest(format!("Invalid index file {:?}: {}", path, e))
        })
    }

    /// Re-scan the manifest from entry `start` on, keeping earlier offsets
    pub fn partial_update<P: AsRef<Path>>(&mut self, manifest_path: P, start: usize) -> Result<()> {
        let offset = self.get(start)?;
        let mut file = File::open(manifest_path.as_ref())?;
        file.seek(SeekFrom::Start(offset))?;
        self.offsets.truncate(start);
        self.scan_from(&mut BufReader::new(file), offset)
    }

    /// Byte offset of entry `index`
    pub fn get(&self, index: usize) -> Result<u64> {
        self.offsets
            .get(index)
            .copied()
            .ok_or(ManifestError::IndexOutOfRange {
                index,
                len: self.offsets.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.offsets.iter().copied()
    }

    /// Whether the offsets could belong to a manifest of `manifest_len` bytes
    pub fn is_consistent_with(&self, manifest_len: u64) -> bool {
        self.offsets.windows(2).all(|w| w[0] < w[1])
            && self.offsets.last().map_or(true, |&last| last < manifest_len)
    }

    /// Delete a persisted index; a missing file is not an error
    pub fn remove<P: AsRef<Path>>(index_path: P) -> Result<()> {
        match std::fs::remove_file(index_path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Serialize for ManifestIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.offsets.iter().enumerate())
    }
}

impl<'de> Deserialize<'de> for ManifestIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // serde_json parses the quoted keys back into integers
        let map = BTreeMap::<usize, u64>::deserialize(deserializer)?;
        if let Some((position, (key, _))) =
            map.iter().enumerate().find(|(position, (key, _))| *position != **key)
        {
            return Err(serde::de::Error::custom(format!(
                "index keys are not contiguous: expected {}, found {}",
                position, key
            )));
        }
        Ok(Self {
            offsets: map.into_values().collect(),
        })
    }
}

impl From<Vec<u64>> for ManifestIndex {
    fn from(offsets: Vec<u64>) -> Self {
        Self { offsets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_create_skips_header_and_blank_lines() {
        let content = "{\"version\":\"1.1\"}\n{\"type\":\"images\"}\n{\"name\":\"a\"}\n\n{\"name\":\"b\"}\n";
        let file = manifest_file(content);
        let index = ManifestIndex::create(file.path(), 2).unwrap();

        assert_eq!(index.len(), 2);
        let first = content.find("{\"name\":\"a\"}").unwrap() as u64;
        let second = content.find("{\"name\":\"b\"}").unwrap() as u64;
        assert_eq!(index.get(0).unwrap(), first);
        assert_eq!(index.get(1).unwrap(), second);
        assert!(matches!(
            index.get(2),
            Err(ManifestError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_dump_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = ManifestIndex::from((0..12).map(|i| i * 10).collect::<Vec<u64>>());
        index.dump(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\"0\":0,\"1\":10,"));
        assert_eq!(ManifestIndex::load(&path).unwrap(), index);
    }

    #[test]
    fn test_load_rejects_gaps() {
        let file = manifest_file(r#"{"0":10,"2":30}"#);
        assert!(matches!(
            ManifestIndex::load(file.path()),
            Err(ManifestError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_partial_update() {
        let mut file = manifest_file("h1\nh2\nA\nB\n");
        let mut index = ManifestIndex::create(file.path(), 2).unwrap();
        assert_eq!(index.len(), 2);

        file.write_all(b"C\nD\n").unwrap();
        file.flush().unwrap();
        index.partial_update(file.path(), 1).unwrap();
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![6, 8, 10, 12]);
    }

    #[test]
    fn test_consistency() {
        let index = ManifestIndex::from(vec![5, 9, 20]);
        assert!(index.is_consistent_with(30));
        assert!(!index.is_consistent_with(20));
        assert!(!ManifestIndex::from(vec![5, 5]).is_consistent_with(30));
        assert!(ManifestIndex::new().is_consistent_with(0));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        ManifestIndex::remove(dir.path().join("index.json")).unwrap();
    }
}
