//! File discovery and output path resolution: walks an input tree looking
//! for video files and decides where each one's converted output belongs.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "mpg", "mpeg"];

/// Walks `input_root` recursively, returning every file whose extension
/// looks like a video container.
pub fn discover_video_files(input_root: &Path) -> Vec<PathBuf> {
  WalkDir::new(input_root)
    .into_iter()
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_type().is_file())
    .filter(|entry| has_video_extension(entry.path()))
    .map(|entry| entry.into_path())
    .collect()
}

fn has_video_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

/// The final output container extension, independent of the source's.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Resolves the final output path for `input`, either mirroring its
/// relative position under `input_root` (structure-preserving) or flattening
/// it directly into `output_root`.
pub fn resolve_output_path(input: &Path, input_root: &Path, output_root: &Path, keep_structure: bool) -> PathBuf {
  if keep_structure {
    let relative = input.strip_prefix(input_root).unwrap_or(input);
    output_root.join(relative).with_extension(OUTPUT_EXTENSION)
  } else {
    let base_name = input.file_stem().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("output"));
    output_root.join(base_name).with_extension(OUTPUT_EXTENSION)
  }
}

/// Scans `output_root` once for orphaned `tmp_*` files left behind by a
/// prior crashed run and deletes them. Returns the count removed.
pub fn cleanup_orphaned_tmp_files(output_root: &Path) -> usize {
  let mut removed = 0;
  for entry in WalkDir::new(output_root).into_iter().filter_map(|e| e.ok()) {
    if !entry.file_type().is_file() {
      continue;
    }
    let is_tmp = entry.file_name().to_str().map(|name| name.starts_with("tmp_")).unwrap_or(false);
    if is_tmp {
      if std::fs::remove_file(entry.path()).is_ok() {
        removed += 1;
      } else {
        log::warn!("failed to remove orphaned temp file {:?}", entry.path());
      }
    }
  }
  removed
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn discovers_only_video_extensions() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.mp4"), b"").unwrap();
    fs::write(dir.path().join("b.txt"), b"").unwrap();
    let found = discover_video_files(dir.path());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].file_name().unwrap(), "a.mp4");
  }

  #[test]
  fn preserves_structure_when_configured() {
    let input_root = PathBuf::from("/videos/in");
    let output_root = PathBuf::from("/videos/out");
    let input = input_root.join("season1/ep01.mkv");
    let resolved = resolve_output_path(&input, &input_root, &output_root, true);
    assert_eq!(resolved, PathBuf::from("/videos/out/season1/ep01.mp4"));
  }

  #[test]
  fn flattens_when_not_preserving_structure() {
    let input_root = PathBuf::from("/videos/in");
    let output_root = PathBuf::from("/videos/out");
    let input = input_root.join("season1/ep01.mkv");
    let resolved = resolve_output_path(&input, &input_root, &output_root, false);
    assert_eq!(resolved, PathBuf::from("/videos/out/ep01.mp4"));
  }

  #[test]
  fn cleanup_removes_only_tmp_prefixed_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tmp_video.mp4"), b"").unwrap();
    fs::write(dir.path().join("video.mp4"), b"").unwrap();
    let removed = cleanup_orphaned_tmp_files(dir.path());
    assert_eq!(removed, 1);
    assert!(!dir.path().join("tmp_video.mp4").exists());
    assert!(dir.path().join("video.mp4").exists());
  }
}
