//! Image sources fed to the collection readers

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{ManifestError, Result};
use crate::sorting::{self, SortingMethod};

/// A single image: a file on disk, or an in-memory upload with its name
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Blob { name: PathBuf, data: Bytes },
}

impl ImageSource {
    pub fn blob(name: impl Into<PathBuf>, data: impl Into<Bytes>) -> Self {
        ImageSource::Blob {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The path this image is known by
    pub fn path(&self) -> &Path {
        match self {
            ImageSource::Path(path) => path,
            ImageSource::Blob { name, .. } => name,
        }
    }

    /// Load the encoded image bytes
    pub fn read(&self) -> Result<Bytes> {
        match self {
            ImageSource::Path(path) => std::fs::read(path).map(Bytes::from).map_err(|e| {
                ManifestError::InvalidImage(format!("Failed to read {:?}: {}", path, e))
            }),
            ImageSource::Blob { data, .. } => Ok(data.clone()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        ImageSource::Path(PathBuf::from(path))
    }
}

/// Where a reader takes its images from.
///
/// A `Sequence` is materialised and can be sorted and iterated any number
/// of times. A `Stream` is consumed once, in the order it arrives; sorting
/// would require materialising it, so it has no sorting option and its
/// last index must be given up front.
pub enum ImageSources {
    Sequence {
        items: Vec<ImageSource>,
        sorting: SortingMethod,
    },
    Stream {
        items: Box<dyn Iterator<Item = ImageSource>>,
        stop: usize,
    },
}

impl ImageSources {
    /// A sequence in the caller's order
    pub fn sequence<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        Self::sorted(items, SortingMethod::Predefined)
    }

    /// A sequence to be ordered with `sorting`
    pub fn sorted<I, S>(items: I, sorting: SortingMethod) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        ImageSources::Sequence {
            items: items.into_iter().map(Into::into).collect(),
            sorting,
        }
    }

    /// A single-pass stream whose last absolute index is `stop`
    pub fn stream<I>(items: I, stop: usize) -> Self
    where
        I: Iterator<Item = ImageSource> + 'static,
    {
        ImageSources::Stream {
            items: Box::new(items),
            stop,
        }
    }

    /// Sort a sequence once; streams are left untouched
    pub(crate) fn into_ordered(self) -> Self {
        match self {
            ImageSources::Sequence { items, sorting } => ImageSources::Sequence {
                items: sorting::sort_by_key(items, sorting, |s| {
                    s.path().to_string_lossy().into_owned()
                }),
                sorting,
            },
            stream => stream,
        }
    }
}

impl std::fmt::Debug for ImageSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSources::Sequence { items, sorting } => f
                .debug_struct("Sequence")
                .field("items", &items.len())
                .field("sorting", sorting)
                .finish(),
            ImageSources::Stream { stop, .. } => {
                f.debug_struct("Stream").field("stop", stop).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_read_returns_data() {
        let source = ImageSource::blob("a/b.png", vec![1u8, 2, 3]);
        assert_eq!(source.path(), Path::new("a/b.png"));
        assert_eq!(&source.read().unwrap()[..], &[1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_invalid_image() {
        let source = ImageSource::from("/nonexistent/dir/img.jpg");
        assert!(matches!(source.read(), Err(ManifestError::InvalidImage(_))));
    }

    #[test]
    fn test_sequence_is_sorted_once() {
        let sources = ImageSources::sorted(["b10.jpg", "b9.jpg", "a.jpg"], SortingMethod::Natural)
            .into_ordered();
        match sources {
            ImageSources::Sequence { items, .. } => {
                let names: Vec<_> = items.iter().map(|s| s.path().to_path_buf()).collect();
                assert_eq!(
                    names,
                    vec![
                        PathBuf::from("a.jpg"),
                        PathBuf::from("b9.jpg"),
                        PathBuf::from("b10.jpg")
                    ]
                );
            }
            ImageSources::Stream { .. } => panic!("expected a sequence"),
        }
    }
}
