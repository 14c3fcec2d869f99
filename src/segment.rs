//! Segment file naming and directory discovery.
//!
//! A log directory holds pairs of files per segment:
//!
//! ```text
//! {dir}/
//!   log-0         ← record frames + sentinel tail
//!   log-0.meta    ← checkpoint sidecar
//!   log-1
//!   log-1.meta
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;

pub fn segment_filename(file_id: u32) -> String {
    format!("log-{file_id}")
}

pub fn sidecar_filename(file_id: u32) -> String {
    format!("log-{file_id}.meta")
}

pub fn segment_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(segment_filename(file_id))
}

pub fn sidecar_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(sidecar_filename(file_id))
}

/// Sidecar path for a given segment file path.
pub fn sidecar_path_for(segment: &Path) -> PathBuf {
    segment.with_extension("meta")
}

/// Parse the file id out of a segment filename (`log-<id>`, no extension).
pub fn parse_file_id(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let id: u32 = name.strip_prefix("log-")?.parse().ok()?;
    if id > i32::MAX as u32 {
        return None;
    }
    Some(id)
}

/// List the segment ids present in `dir`, sorted ascending. Sidecars and
/// unrelated files are ignored.
pub fn discover_segments(dir: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some() {
            continue;
        }
        if let Some(id) = parse_file_id(&path) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Next unused file id in `dir`.
pub fn next_file_id(dir: &Path) -> Result<u32> {
    let ids = discover_segments(dir)?;
    Ok(ids.last().map_or(0, |last| last + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn filename_round_trip() {
        assert_eq!(segment_filename(7), "log-7");
        assert_eq!(sidecar_filename(7), "log-7.meta");
        assert_eq!(parse_file_id(Path::new("/data/log-7")), Some(7));
        assert_eq!(parse_file_id(Path::new("log-7.meta")), None);
        assert_eq!(parse_file_id(Path::new("checkpoint")), None);
        assert_eq!(parse_file_id(Path::new("log-4294967295")), None);
    }

    #[test]
    fn sidecar_path_tracks_segment() {
        assert_eq!(
            sidecar_path_for(Path::new("/data/log-12")),
            PathBuf::from("/data/log-12.meta")
        );
    }

    #[test]
    fn discovery_sorts_and_skips_sidecars() {
        let dir = tempdir().unwrap();
        for name in ["log-2", "log-0", "log-10", "log-0.meta", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(discover_segments(dir.path()).unwrap(), vec![0, 2, 10]);
        assert_eq!(next_file_id(dir.path()).unwrap(), 11);
    }

    #[test]
    fn next_file_id_starts_at_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(next_file_id(dir.path()).unwrap(), 0);
    }
}
