use super::fixtures::{try_write_video, TestVideo};
use crate::error::ManifestError;
use crate::manifest::{
    is_dataset_manifest, is_video_manifest, IndexState, Manifest, ManifestManager, ManifestType,
    VideoManifestManager,
};
use crate::reader::video::{VideoFrameRecord, VideoReaderOptions, VideoStreamReader};

#[test]
fn test_video_manifest_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let Some(video) = try_write_video(dir.path(), "clip.mp4", TestVideo::default()) else {
        return;
    };

    let mut manager = VideoManifestManager::new(dir.path());
    manager.link(&video, &VideoReaderOptions::default()).unwrap();
    manager.create().unwrap();

    assert!(manager.exists());
    assert!(manager.manifest_path().ends_with("manifest.jsonl"));
    assert!(dir.path().join("index.json").is_file());
    assert!(is_video_manifest(manager.manifest_path()));
    assert!(!is_dataset_manifest(manager.manifest_path()));

    assert_eq!(manager.version().unwrap(), "1.1");
    assert_eq!(manager.manifest_type(), ManifestType::Video);
    assert_eq!(manager.video_name().unwrap(), "clip.mp4");
    assert_eq!(manager.video_resolution().unwrap(), (64, 48));
    assert_eq!(manager.video_length().unwrap(), 10);

    let entries: Vec<_> = manager.iter().unwrap().map(Result::unwrap).collect();
    assert!(!entries.is_empty());
    assert!(entries.len() <= 10);
    let numbers: Vec<_> = entries.iter().map(|e| e.number).collect();
    assert_eq!(numbers, (0..entries.len()).collect::<Vec<_>>());
    for pair in entries.windows(2) {
        assert!(pair[0].pts < pair[1].pts);
    }
    assert!(entries.iter().all(|e| e.checksum.as_ref().is_some_and(|c| c.len() == 64)));

    let len = manager.len().unwrap();
    assert_eq!(len, entries.len());
    assert_eq!(manager.get(len - 1).unwrap(), entries[len - 1]);
    assert_eq!(manager.get_range(0..len).unwrap(), entries);
    assert!(matches!(
        manager.get(len),
        Err(ManifestError::IndexOutOfRange { .. })
    ));

    let last = &entries[len - 1];
    assert_eq!(manager.keyframe_before(last.pts).unwrap().as_ref(), Some(last));
    assert_eq!(manager.keyframe_before(last.pts + 1).unwrap().as_ref(), Some(last));
    assert_eq!(manager.keyframe_before(entries[0].pts - 1).unwrap(), None);

    assert!(matches!(
        manager.get_subset(&["x".to_string()]),
        Err(ManifestError::NotImplemented(_))
    ));
    manager.partial_update().unwrap();

    manager.remove().unwrap();
    assert!(!manager.exists());
    assert!(!dir.path().join("index.json").exists());
}

#[test]
fn test_entry_numbers_are_contiguous_with_sparse_keyframes() {
    let dir = tempfile::tempdir().unwrap();
    let spaced = TestVideo {
        frames: 10,
        gop: 5,
        ..Default::default()
    };
    let Some(video) = try_write_video(dir.path(), "spaced.mp4", spaced) else {
        return;
    };

    let mut manager = VideoManifestManager::new(dir.path());
    manager.link(&video, &VideoReaderOptions::default()).unwrap();
    manager.create().unwrap();
    assert_eq!(manager.video_length().unwrap(), 10);

    let entries: Vec<_> = manager.iter().unwrap().map(Result::unwrap).collect();
    assert!(!entries.is_empty());
    let numbers: Vec<_> = entries.iter().map(|e| e.number).collect();
    assert_eq!(numbers, (0..entries.len()).collect::<Vec<_>>());
    for pair in entries.windows(2) {
        assert!(pair[0].pts < pair[1].pts);
    }

    // a frame between two keyframes seeks back to the earlier one
    if let [first, second, ..] = entries.as_slice() {
        let between = first.pts + (second.pts - first.pts) / 2;
        assert_eq!(manager.keyframe_before(between).unwrap().as_ref(), Some(first));
    }
}

#[test]
fn test_reopened_manifest_reuses_index() {
    let dir = tempfile::tempdir().unwrap();
    let Some(video) = try_write_video(dir.path(), "clip.mp4", TestVideo::default()) else {
        return;
    };

    let mut manager = VideoManifestManager::new(dir.path());
    manager.link(&video, &VideoReaderOptions::default()).unwrap();
    manager.create().unwrap();
    let first = manager.get(0).unwrap();

    let mut opened = Manifest::open(dir.path()).unwrap();
    assert_eq!(opened.manifest_type(), ManifestType::Video);
    let Manifest::Video(reopened) = &mut opened else {
        panic!("expected a video manifest");
    };
    assert_eq!(reopened.index_state(), IndexState::Unloaded);
    assert_eq!(reopened.get(0).unwrap(), first);
    assert_eq!(reopened.index_state(), IndexState::Loaded);
}

#[test]
fn test_sparse_keyframes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sparse = TestVideo {
        frames: 20,
        gop: 100,
        ..Default::default()
    };
    let Some(video) = try_write_video(dir.path(), "sparse.mp4", sparse) else {
        return;
    };

    let options = VideoReaderOptions {
        chunk_size: 1,
        ..Default::default()
    };
    let mut manager = VideoManifestManager::new(dir.path());
    manager.link(&video, &options).unwrap();
    let err = manager.create().unwrap_err();
    assert!(matches!(err, ManifestError::InvalidVideo(ref m) if m.contains("keyframes")));
    assert!(!manager.exists());

    let forced = VideoReaderOptions {
        chunk_size: 1,
        force: true,
        ..Default::default()
    };
    manager.link(&video, &forced).unwrap();
    manager.create().unwrap();
    assert_eq!(manager.video_length().unwrap(), 20);
}

#[test]
fn test_reader_is_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let Some(video) = try_write_video(dir.path(), "clip.mp4", TestVideo::default()) else {
        return;
    };

    let mut reader = VideoStreamReader::open(&video, 36, false).unwrap();
    assert_eq!(reader.resolution(), (64, 48));
    assert!(matches!(reader.len(), Err(ManifestError::LengthUnavailable)));

    let records: Vec<_> = reader.frames().unwrap().map(Result::unwrap).collect();
    assert_eq!(records.len(), 10);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.index(), i);
    }
    assert!(matches!(records[0], VideoFrameRecord::KeyFrame { .. }));
    assert_eq!(reader.len().unwrap(), 10);

    assert!(matches!(reader.frames(), Err(ManifestError::ReaderConsumed)));
}

#[test]
fn test_relative_path_resolves_against_upload_dir() {
    let dir = tempfile::tempdir().unwrap();
    let Some(_) = try_write_video(dir.path(), "clip.mp4", TestVideo::default()) else {
        return;
    };

    let options = VideoReaderOptions {
        upload_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let mut manager = VideoManifestManager::new(dir.path().join("out.jsonl"));
    manager.link("clip.mp4", &options).unwrap();
    manager.create().unwrap();
    assert!(dir.path().join("out.jsonl").is_file());
}

#[test]
fn test_create_without_link() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = VideoManifestManager::new(dir.path());
    assert!(matches!(manager.create(), Err(ManifestError::Config(_))));
}

#[test]
fn test_not_a_video() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.mp4");
    std::fs::write(&path, b"definitely not a video").unwrap();
    assert!(VideoStreamReader::open(&path, 36, false).is_err());
}
