//! Detection of context images that belong to a frame
//!
//! Context images are extra views shipped next to the main frames (other
//! cameras of a rig, or camera images for a point cloud). They are found
//! purely by directory layout conventions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{ManifestError, Result};

const RELATED_DIR: &str = "related_images";

/// Extensions that mark a point cloud
const POINT_CLOUD_EXTENSIONS: &[&str] = &["pcd", "bin"];

/// Camera directories of a KITTI raw sequence
const CAMERA_DIR_PATTERN: &str = r"(?i)^image_\d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataKind {
    Images,
    PointClouds,
}

/// Map every path (relative to `root`) to its sorted context images.
///
/// Images and point clouds cannot be mixed in one call.
pub fn detect_related_images<P: AsRef<Path>>(
    paths: &[PathBuf],
    root: P,
) -> Result<BTreeMap<String, Vec<String>>> {
    let root = root.as_ref();
    let kind = data_kind(paths)?;

    let mut detector = Detector::new()?;
    let mut related = BTreeMap::new();
    for path in paths {
        let found = match kind {
            DataKind::Images => detector.for_image(path),
            DataKind::PointClouds => detector.for_point_cloud(path),
        };
        let mut found: Vec<String> = found.iter().map(|p| relative(p, root)).collect();
        found.sort();
        found.dedup();
        tracing::debug!("{:?}: {} related images", path, found.len());
        related.insert(relative(path, root), found);
    }
    Ok(related)
}

/// Walk `root` and detect context images for every frame found in it.
///
/// Files inside `related_images` directories and image files that belong
/// to a point cloud layout are context, not frames.
pub fn detect_in_directory<P: AsRef<Path>>(root: P) -> Result<BTreeMap<String, Vec<String>>> {
    let root = root.as_ref();
    let mut clouds = Vec::new();
    let mut images = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::InvalidInput(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let in_related_dir = path
            .strip_prefix(root)
            .map(|rel| rel.components().any(|c| c.as_os_str() == RELATED_DIR))
            .unwrap_or(false);
        if in_related_dir {
            continue;
        }
        if is_point_cloud(&path) {
            clouds.push(path);
        } else if is_image(&path) {
            images.push(path);
        }
    }

    if clouds.is_empty() {
        detect_related_images(&images, root)
    } else {
        detect_related_images(&clouds, root)
    }
}

fn data_kind(paths: &[PathBuf]) -> Result<DataKind> {
    let clouds = paths.iter().filter(|p| is_point_cloud(p)).count();
    match clouds {
        0 => Ok(DataKind::Images),
        n if n == paths.len() => Ok(DataKind::PointClouds),
        _ => Err(ManifestError::InvalidInput(
            "images and point clouds cannot be mixed".to_string(),
        )),
    }
}

fn is_point_cloud(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| POINT_CLOUD_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn is_image(path: &Path) -> bool {
    image::ImageFormat::from_path(path).is_ok()
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// `a.b.jpg` -> `a_b_jpg`
fn context_dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().replace('.', "_"))
}

/// Image files directly inside `dir`
fn images_in(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image(path))
        .collect()
}

#[derive(Debug)]
struct Detector {
    /// Whether a directory holds a `related_images` directory
    has_related_dir: HashMap<PathBuf, bool>,
    camera_dir: Regex,
}

impl Detector {
    fn new() -> Result<Self> {
        Ok(Self {
            has_related_dir: HashMap::new(),
            camera_dir: Regex::new(CAMERA_DIR_PATTERN)
                .map_err(|e| ManifestError::Config(e.to_string()))?,
        })
    }

    fn related_dir_for(&mut self, dir: &Path, file: &Path) -> Option<PathBuf> {
        let has = *self
            .has_related_dir
            .entry(dir.to_path_buf())
            .or_insert_with(|| dir.join(RELATED_DIR).is_dir());
        if !has {
            return None;
        }
        context_dir_name(file).map(|name| dir.join(RELATED_DIR).join(name))
    }

    fn for_image(&mut self, path: &Path) -> BTreeSet<PathBuf> {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.related_dir_for(dir, path)
            .map(|context| images_in(&context).into_iter().collect())
            .unwrap_or_default()
    }

    fn for_point_cloud(&mut self, path: &Path) -> BTreeSet<PathBuf> {
        let mut found = BTreeSet::new();
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let Some(stem) = path.file_stem() else {
            return found;
        };

        // directory named after the cloud
        found.extend(images_in(&dir.join(stem)));

        // images sharing the cloud's stem
        found.extend(
            images_in(dir)
                .into_iter()
                .filter(|image| image.file_stem() == Some(stem)),
        );

        // related_images beside the cloud and beside its directory
        if let Some(context) = self.related_dir_for(dir, path) {
            found.extend(images_in(&context));
        }
        if let Some(parent) = dir.parent() {
            if let Some(context) = self.related_dir_for(parent, path) {
                found.extend(images_in(&context));
            }
        }

        // KITTI raw layout: velodyne_points/data/<stem>.bin with camera
        // frames in image_XX/data/<stem>.png
        if dir.ends_with("velodyne_points/data") {
            if let Some(sequence_dir) = dir.parent().and_then(Path::parent) {
                for camera in camera_dirs(sequence_dir, &self.camera_dir) {
                    found.extend(
                        images_in(&camera.join("data"))
                            .into_iter()
                            .filter(|image| image.file_stem() == Some(stem)),
                    );
                }
            }
        }

        found
    }
}

fn camera_dirs(sequence_dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    WalkDir::new(sequence_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.is_match(name))
        })
        .map(|entry| entry.into_path())
        .collect()
}
