//! Readers for image collections and point cloud sets
//!
//! Both readers walk absolute frame indices `0..=stop` and emit a
//! placeholder for every index excluded by `start`/`step`, so the
//! manifest's line numbers keep matching frame numbers.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use serde_json::Value;

use super::source::{ImageSource, ImageSources};
use crate::error::{ManifestError, Result};
use crate::hashing;
use crate::manifest::types::ImageProperties;
use crate::sorting::SortingMethod;

/// Whether entries describe flat images or point clouds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimension {
    #[default]
    D2,
    D3,
}

/// Range and extraction settings of an [`ImageCollectionReader`]
#[derive(Debug, Clone)]
pub struct ImageReaderOptions {
    pub start: usize,
    pub step: usize,
    /// Last absolute index; defaults to the last source of a sequence.
    /// Ignored for streams, which carry their own.
    pub stop: Option<usize>,
    /// Per-file metadata keyed by the relative file name
    pub meta: HashMap<String, Value>,
    pub use_image_hash: bool,
    /// Root that entry names are made relative to
    pub data_dir: Option<PathBuf>,
    pub dimension: Dimension,
    /// Applied to a sequence built in predefined order
    pub sorting_method: SortingMethod,
}

impl Default for ImageReaderOptions {
    fn default() -> Self {
        Self {
            start: 0,
            step: 1,
            stop: None,
            meta: HashMap::new(),
            use_image_hash: false,
            data_dir: None,
            dimension: Dimension::D2,
            sorting_method: SortingMethod::Predefined,
        }
    }
}

/// Per-item property extraction, split from the source cursor so both can
/// be borrowed while iterating
#[derive(Debug)]
struct PropertyExtractor {
    meta: HashMap<String, Value>,
    use_image_hash: bool,
    data_dir: Option<PathBuf>,
    dimension: Dimension,
}

impl PropertyExtractor {
    fn extract(&self, source: &ImageSource) -> Result<ImageProperties> {
        let relative = relative_name(source.path(), self.data_dir.as_deref());
        let (name, extension) = split_extension(&relative);
        let mut props = ImageProperties::new(name, extension);
        props.meta = self.meta.get(&relative).cloned();

        match self.dimension {
            Dimension::D2 => self.extract_image(source, &mut props)?,
            Dimension::D3 => {
                if let ImageSource::Path(path) = source {
                    if !path.is_file() {
                        return Err(ManifestError::InvalidPcd(format!(
                            "Cannot read point cloud {:?}",
                            path
                        )));
                    }
                }
            }
        }

        tracing::debug!("Extracted properties of {}", relative);
        Ok(props)
    }

    fn extract_image(&self, source: &ImageSource, props: &mut ImageProperties) -> Result<()> {
        let data = source.read()?;
        let reader = ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(|e| {
                ManifestError::InvalidImage(format!("{:?}: {}", source.path(), e))
            })?;
        let mut decoder = reader.into_decoder()?;

        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let (width, height) = oriented_dimensions(width, height, orientation);
        props.width = Some(width);
        props.height = Some(height);

        if self.use_image_hash {
            let image = DynamicImage::from_decoder(decoder)?;
            props.checksum = Some(hashing::hash_image(&image));
        }
        Ok(())
    }
}

enum SourceCursor {
    Sequence(Vec<ImageSource>),
    /// `None` after the stream has been handed out
    Stream(Option<Box<dyn Iterator<Item = ImageSource>>>),
}

/// Reader producing [`ImageProperties`] for a collection of images or
/// point clouds
pub struct ImageCollectionReader {
    sources: SourceCursor,
    extractor: PropertyExtractor,
    start: usize,
    step: usize,
    /// `None` only for an empty sequence
    stop: Option<usize>,
}

impl ImageCollectionReader {
    pub fn new(sources: ImageSources, options: ImageReaderOptions) -> Result<Self> {
        if options.step == 0 {
            return Err(ManifestError::Config("step must be greater than zero".to_string()));
        }

        let sources = match sources {
            ImageSources::Sequence {
                items,
                sorting: SortingMethod::Predefined,
            } => ImageSources::Sequence {
                items,
                sorting: options.sorting_method,
            },
            ImageSources::Stream { .. } if options.sorting_method != SortingMethod::Predefined => {
                return Err(ManifestError::Config(format!(
                    "A stream of images cannot be sorted with the '{}' method",
                    options.sorting_method
                )));
            }
            other => other,
        };

        let (cursor, stop) = match sources.into_ordered() {
            ImageSources::Sequence { items, .. } => {
                let last = items.len().checked_sub(1);
                let stop = match (options.stop, last) {
                    (Some(stop), Some(last)) if stop > last => {
                        return Err(ManifestError::Config(format!(
                            "stop {} is past the last of {} images",
                            stop,
                            items.len()
                        )));
                    }
                    (Some(_), None) => {
                        return Err(ManifestError::Config(
                            "stop is set but there are no images".to_string(),
                        ));
                    }
                    (Some(stop), Some(_)) => Some(stop),
                    (None, last) => last,
                };
                (SourceCursor::Sequence(items), stop)
            }
            ImageSources::Stream { items, stop } => (SourceCursor::Stream(Some(items)), Some(stop)),
        };

        if let Some(stop) = stop {
            if stop < options.start {
                return Err(ManifestError::Config(format!(
                    "stop {} is before start {}",
                    stop, options.start
                )));
            }
        }

        Ok(Self {
            sources: cursor,
            extractor: PropertyExtractor {
                meta: options.meta,
                use_image_hash: options.use_image_hash,
                data_dir: options.data_dir,
                dimension: options.dimension,
            },
            start: options.start,
            step: options.step,
            stop,
        })
    }

    /// Reader over point clouds; entries carry no size or checksum
    pub fn new_3d(sources: ImageSources, options: ImageReaderOptions) -> Result<Self> {
        Self::new(
            sources,
            ImageReaderOptions {
                dimension: Dimension::D3,
                ..options
            },
        )
    }

    pub fn dimension(&self) -> Dimension {
        self.extractor.dimension
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn stop(&self) -> Option<usize> {
        self.stop
    }

    /// Absolute indices that produce real entries
    pub fn frame_range(&self) -> impl Iterator<Item = usize> {
        let end = self.stop.map_or(0, |stop| stop + 1);
        (self.start..end).step_by(self.step)
    }

    /// Number of real (non-placeholder) entries
    pub fn len(&self) -> usize {
        self.frame_range().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One item per absolute index `0..=stop`, `None` for placeholders.
    ///
    /// Sequences can be walked repeatedly; a stream only once, after which
    /// this fails with [`ManifestError::ReaderConsumed`].
    pub fn entries(&mut self) -> Result<ImageEntries<'_>> {
        let sources = match &mut self.sources {
            SourceCursor::Sequence(items) => EntrySources::Sequence(items),
            SourceCursor::Stream(stream) => {
                EntrySources::Stream(stream.take().ok_or(ManifestError::ReaderConsumed)?)
            }
        };

        Ok(ImageEntries {
            sources,
            extractor: &self.extractor,
            start: self.start,
            step: self.step,
            end: self.stop.map_or(0, |stop| stop + 1),
            index: 0,
        })
    }
}

impl std::fmt::Debug for ImageCollectionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCollectionReader")
            .field("dimension", &self.extractor.dimension)
            .field("start", &self.start)
            .field("step", &self.step)
            .field("stop", &self.stop)
            .finish()
    }
}

enum EntrySources<'a> {
    Sequence(&'a [ImageSource]),
    Stream(Box<dyn Iterator<Item = ImageSource>>),
}

/// Iterator returned by [`ImageCollectionReader::entries`]
pub struct ImageEntries<'a> {
    sources: EntrySources<'a>,
    extractor: &'a PropertyExtractor,
    start: usize,
    step: usize,
    end: usize,
    index: usize,
}

impl ImageEntries<'_> {
    fn in_range(&self, index: usize) -> bool {
        index >= self.start && (index - self.start) % self.step == 0
    }
}

impl Iterator for ImageEntries<'_> {
    type Item = Result<Option<ImageProperties>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let index = self.index;
        self.index += 1;
        let in_range = self.in_range(index);

        // both modes map absolute index i to the i-th source; a stream is
        // advanced past the frames outside the range
        let source = match &mut self.sources {
            EntrySources::Sequence(_) if !in_range => return Some(Ok(None)),
            EntrySources::Sequence(items) => match items.get(index) {
                Some(source) => source.clone(),
                None => {
                    self.index = self.end;
                    return Some(Err(ManifestError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    }));
                }
            },
            EntrySources::Stream(items) => match items.next() {
                Some(source) => source,
                None => {
                    self.index = self.end;
                    return Some(Err(ManifestError::InvalidImage(format!(
                        "the image stream ended before index {}",
                        index
                    ))));
                }
            },
        };
        if !in_range {
            return Some(Ok(None));
        }

        let result = self.extractor.extract(&source).map(Some);
        if result.is_err() {
            self.index = self.end;
        }
        Some(result)
    }
}

/// Name of `path` relative to `root`, `/`-separated.
///
/// Falls back to the bare file name when there is no root or the path lies
/// outside it.
pub(crate) fn relative_name(path: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .or_else(|| path.file_name().map(PathBuf::from))
        .unwrap_or_else(|| path.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

/// Split `name.ext` into `("name", ".ext")`.
///
/// Only the last path component is considered, and leading dots do not
/// start an extension (`.hidden` has none).
pub(crate) fn split_extension(path: &str) -> (String, String) {
    let base_start = path.rfind('/').map_or(0, |i| i + 1);
    let base = &path[base_start..];
    match base.rfind('.') {
        Some(dot) if base[..dot].chars().any(|c| c != '.') => {
            let split = base_start + dot;
            (path[..split].to_string(), path[split..].to_string())
        }
        _ => (path.to_string(), String::new()),
    }
}

/// Stored dimensions with EXIF orientations that transpose the picture
/// applied
fn oriented_dimensions(width: u32, height: u32, orientation: Orientation) -> (u32, u32) {
    match orientation {
        Orientation::Rotate90
        | Orientation::Rotate270
        | Orientation::Rotate90FlipH
        | Orientation::Rotate270FlipH => (height, width),
        _ => (width, height),
    }
}
