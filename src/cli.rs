//! Command line interface

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use walkdir::WalkDir;

use dataset_manifest::config::ManifestConfig;
use dataset_manifest::config_file;
use dataset_manifest::error::{ManifestError, Result};
use dataset_manifest::manifest::{
    validate_manifest, ImageManifestManager, Manifest, ManifestManager, ManifestType,
    VideoManifestManager,
};
use dataset_manifest::reader::{Dimension, ImageSources};
use dataset_manifest::related;
use dataset_manifest::sorting::SortingMethod;

#[derive(Parser, Debug)]
#[command(name = "dataset-manifest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the manifest of a video file
    Video {
        file: PathBuf,

        /// Manifest file or directory (defaults to the video's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Accept videos with sparse keyframes
        #[arg(long)]
        force: bool,
    },

    /// Build the manifest of an image or point cloud collection
    Images {
        /// A directory to scan, or a list of files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Manifest file or directory (defaults to the scanned directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// lexicographical, natural, predefined or random
        #[arg(long)]
        sorting: Option<SortingMethod>,

        /// Store a content checksum per image
        #[arg(long)]
        hash: bool,

        /// Root for relative entry names
        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(long, default_value_t = 0)]
        start: usize,

        #[arg(long, default_value_t = 1)]
        step: usize,

        #[arg(long)]
        stop: Option<usize>,

        /// Attach detected context images as entry metadata
        #[arg(long)]
        related: bool,
    },

    /// Check the structure of a manifest
    Validate { manifest: PathBuf },

    /// Print the header and size of a manifest
    Info {
        manifest: PathBuf,

        /// Also print every entry
        #[arg(long)]
        entries: bool,
    },

    /// Print the context images found under a directory
    Related { root: PathBuf },

    /// Write a configuration file with default values
    InitConfig { path: PathBuf },
}

pub fn run(command: Command, config: &ManifestConfig) -> Result<()> {
    match command {
        Command::Video {
            file,
            output,
            chunk_size,
            force,
        } => {
            let mut video = config.video.clone();
            if let Some(chunk_size) = chunk_size {
                video.chunk_size = chunk_size;
            }
            video.force |= force;

            let output = match output {
                Some(output) => output,
                None => parent_dir(&file),
            };
            let mut manager =
                VideoManifestManager::with_config(prepare_output(&output)?, &config.index);
            manager.link(&file, &video.reader_options(None))?;
            manager.create()?;
            println!("{}", manager.manifest_path().display());
            Ok(())
        }
        Command::Images {
            inputs,
            output,
            sorting,
            hash,
            data_dir,
            start,
            step,
            stop,
            related,
        } => {
            let scanned_dir = match inputs.as_slice() {
                [single] if single.is_dir() => Some(single.clone()),
                _ => None,
            };
            let files = match &scanned_dir {
                Some(dir) => collect_media(dir)?,
                None => inputs,
            };

            let mut options = config.images.reader_options();
            if let Some(sorting) = sorting {
                options.sorting_method = sorting;
            }
            options.use_image_hash |= hash;
            options.data_dir = data_dir.or(options.data_dir).or_else(|| scanned_dir.clone());
            options.start = start;
            options.step = step;
            options.stop = stop;
            if files.iter().all(|f| is_point_cloud(f)) && !files.is_empty() {
                options.dimension = Dimension::D3;
            }
            if related {
                options.meta = related_meta(&files, options.data_dir.as_deref())?;
            }

            let output = output
                .or(scanned_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            let mut manager =
                ImageManifestManager::with_config(prepare_output(&output)?, &config.index);
            manager.link(ImageSources::sequence(files), options)?;
            manager.create()?;
            println!("{}", manager.manifest_path().display());
            Ok(())
        }
        Command::Validate { manifest } => {
            let path = config.index.manifest_path(&manifest);
            let video = validate_manifest(&path, ManifestType::Video);
            let images = validate_manifest(&path, ManifestType::Images);
            match (video, images) {
                (Ok(()), _) => println!("{}: valid video manifest", path.display()),
                (_, Ok(())) => println!("{}: valid images manifest", path.display()),
                (Err(video), Err(images)) => {
                    return Err(ManifestError::InvalidManifest(format!(
                        "{}: not a video manifest ({}), not an images manifest ({})",
                        path.display(),
                        video,
                        images
                    )));
                }
            }
            Ok(())
        }
        Command::Info { manifest, entries } => {
            let mut manifest = Manifest::open_with_config(&manifest, &config.index)?;
            let mut info = json!({
                "path": manifest.manifest_path(),
                "version": manifest.version()?,
                "type": manifest.manifest_type(),
                "entries": manifest.len()?,
            });
            if let Manifest::Video(video) = &manifest {
                info["name"] = json!(video.video_name()?);
                info["resolution"] = json!(video.video_resolution()?);
                info["length"] = json!(video.video_length()?);
            }
            println!("{}", serde_json::to_string_pretty(&info)?);

            if entries {
                for i in 0..manifest.len()? {
                    println!("{}", manifest.get_value(i)?);
                }
            }
            Ok(())
        }
        Command::Related { root } => {
            let related = related::detect_in_directory(&root)?;
            println!("{}", serde_json::to_string_pretty(&related)?);
            Ok(())
        }
        Command::InitConfig { path } => {
            config_file::generate_default_config(&path)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create the output directory unless `output` names a `.jsonl` file
fn prepare_output(output: &Path) -> Result<PathBuf> {
    let is_file = output.extension().is_some_and(|ext| ext == "jsonl");
    let dir = if is_file { parent_dir(output) } else { output.to_path_buf() };
    std::fs::create_dir_all(&dir)?;
    Ok(output.to_path_buf())
}

fn is_point_cloud(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pcd") || ext.eq_ignore_ascii_case("bin"))
}

/// Frames under `dir`, skipping context image directories
fn collect_media(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::InvalidInput(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let in_related_dir = entry
            .path()
            .strip_prefix(dir)
            .map(|rel| rel.components().any(|c| c.as_os_str() == "related_images"))
            .unwrap_or(false);
        let path = entry.into_path();
        if !in_related_dir
            && (is_point_cloud(&path) || image::ImageFormat::from_path(&path).is_ok())
        {
            files.push(path);
        }
    }
    tracing::info!("Found {} files under {:?}", files.len(), dir);
    Ok(files)
}

/// `{"related_images": [...]}` per file, keyed by relative file name
fn related_meta(
    files: &[PathBuf],
    data_dir: Option<&Path>,
) -> Result<HashMap<String, serde_json::Value>> {
    let root = data_dir.unwrap_or_else(|| Path::new(""));
    let related = related::detect_related_images(files, root)?;
    Ok(related
        .into_iter()
        .filter(|(_, images)| !images.is_empty())
        .map(|(name, images)| {
            // without a root the reader keys metadata by bare file name
            let key = match data_dir {
                Some(_) => name,
                None => Path::new(&name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or(name),
            };
            (key, json!({ "related_images": images }))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images_command() {
        let cli = Cli::parse_from([
            "dataset-manifest",
            "images",
            "a.jpg",
            "b.jpg",
            "--sorting",
            "natural",
            "--step",
            "2",
        ]);
        match cli.command {
            Command::Images {
                inputs,
                sorting,
                step,
                ..
            } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(sorting, Some(SortingMethod::Natural));
                assert_eq!(step, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_config() {
        let cli = Cli::parse_from(["dataset-manifest", "validate", "m.jsonl", "--config", "c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_prepare_output() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out/manifest.jsonl");
        assert_eq!(prepare_output(&nested).unwrap(), nested);
        assert!(dir.path().join("out").is_dir());

        let as_dir = dir.path().join("other");
        prepare_output(&as_dir).unwrap();
        assert!(as_dir.is_dir());
    }
}
