//! Manifest manager for image and point cloud collections

use std::collections::HashMap;
use std::path::Path;

use super::hierarchy::{self, HierarchyPage, HierarchyQuery};
use super::store::ManifestStore;
use super::types::{self, ImageProperties, ManifestType};
use super::ManifestManager;
use crate::config::IndexConfig;
use crate::error::{ManifestError, Result};
use crate::reader::images::{ImageCollectionReader, ImageReaderOptions};
use crate::reader::source::ImageSources;

/// Builds, reads and reshapes image manifests
#[derive(Debug)]
pub struct ImageManifestManager {
    store: ManifestStore,
    reader: Option<ImageCollectionReader>,
}

impl ImageManifestManager {
    /// Manager for `path`, a manifest file or the directory holding one
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, &IndexConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Self {
        Self {
            store: ManifestStore::new(path.as_ref(), ManifestType::Images, config),
            reader: None,
        }
    }

    /// Set the sources of the next [`create`](ManifestManager::create)
    pub fn link(&mut self, sources: ImageSources, options: ImageReaderOptions) -> Result<()> {
        self.reader = Some(ImageCollectionReader::new(sources, options)?);
        Ok(())
    }

    /// Write a manifest holding exactly `content`, in order
    pub fn create_from<I>(&mut self, content: I) -> Result<()>
    where
        I: IntoIterator<Item = ImageProperties>,
    {
        let mut count = 0usize;
        self.store.write(|writer| {
            for props in content {
                types::write_line(writer, &props)?;
                count += 1;
            }
            Ok(())
        })?;
        tracing::info!(
            "Created image manifest {:?} with {} entries",
            self.store.manifest_path(),
            count
        );
        Ok(())
    }

    /// Replace the manifest with new content
    pub fn partial_update<I>(&mut self, content: I) -> Result<()>
    where
        I: IntoIterator<Item = ImageProperties>,
    {
        self.create_from(content)
    }

    /// Full names (`name` + `extension`) of all entries, in order
    pub fn data(&mut self) -> Result<Vec<String>> {
        self.iter()?
            .map(|entry| entry.map(|props| props.full_name()))
            .collect()
    }

    /// Entries whose full name is in `names`.
    ///
    /// Returns, in manifest order, each match's position in `names` and its
    /// properties without empty optional fields.
    pub fn get_subset(&mut self, names: &[String]) -> Result<(Vec<usize>, Vec<ImageProperties>)> {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            positions.entry(name.as_str()).or_insert(position);
        }

        let mut index_list = Vec::new();
        let mut subset = Vec::new();
        for entry in self.iter()? {
            let props = entry?;
            if let Some(&position) = positions.get(props.full_name().as_str()) {
                index_list.push(position);
                subset.push(props.without_empty_optionals());
            }
        }
        Ok((index_list, subset))
    }

    /// Rewrite the manifest with its entries in the order of `names`.
    ///
    /// Every name is resolved before anything is written, so an unknown
    /// name leaves the manifest untouched.
    pub fn reorder(&mut self, names: &[String]) -> Result<()> {
        let mut by_name: HashMap<String, ImageProperties> = HashMap::new();
        for entry in self.iter()? {
            let props = entry?;
            by_name.entry(props.full_name()).or_insert(props);
        }

        let reordered = names
            .iter()
            .map(|name| {
                by_name.get(name).cloned().ok_or_else(|| {
                    ManifestError::InvalidManifest(format!(
                        "previous manifest does not contain {} image",
                        name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.create_from(reordered)
    }

    /// One page of a directory-style listing of the manifest's names
    pub fn emulate_hierarchical_structure(&mut self, query: &HierarchyQuery<'_>) -> Result<HierarchyPage> {
        let names = self.data()?;
        hierarchy::emulate_hierarchical_structure(names, query)
    }
}

impl ManifestManager for ImageManifestManager {
    type Entry = ImageProperties;

    fn store(&self) -> &ManifestStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut ManifestStore {
        &mut self.store
    }

    /// Write one line per absolute index of the linked reader; indices
    /// outside its range become `{}` placeholders
    fn create(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            ManifestError::Config("no images are linked to this manifest".to_string())
        })?;

        let mut count = 0usize;
        let entries = reader.entries()?;
        self.store.write(|writer| {
            for entry in entries {
                match entry? {
                    Some(props) => {
                        types::write_line(writer, &props)?;
                        count += 1;
                    }
                    None => std::io::Write::write_all(writer, b"{}\n")?,
                }
            }
            Ok(())
        })?;

        tracing::info!(
            "Created image manifest {:?} with {} entries",
            self.store.manifest_path(),
            count
        );
        Ok(())
    }
}
