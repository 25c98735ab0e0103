//! Atomic record persistence.
//!
//! Records commit via stage-and-rename inside their own partition, so a
//! reader never observes a half-written strategy, validation bundle, or
//! journal entry.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Write a record's bytes atomically: stage into a sibling `.staged` file,
/// fsync, then rename over the target. The stage file lives next to the
/// record so the rename never crosses a filesystem, and a crash mid-write
/// leaves the previous record bytes untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let record_dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(record_dir)
        .with_context(|| format!("record partition {record_dir:?} is not writable"))?;

    let staged = path.with_extension("staged");
    let mut out = File::create(&staged)
        .with_context(|| format!("staging record write at {staged:?}"))?;
    out.write_all(bytes)
        .and_then(|()| out.sync_all())
        .with_context(|| format!("flushing staged record {staged:?}"))?;
    drop(out);

    fs::rename(&staged, path)
        .with_context(|| format!("committing staged record {staged:?} over {path:?}"))?;
    Ok(())
}

/// Serialize a record to YAML and write it atomically.
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text =
        serde_yaml::to_string(value).with_context(|| format!("Failed to serialize {:?}", path))?;
    write_atomic(path, text.as_bytes())
}

/// Read and deserialize a YAML record.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

/// Append one JSON line to a log file, creating it if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let line = serde_json::to_string(value)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        name: String,
        n: u32,
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.yaml");
        let rec = Rec {
            name: "alpha".into(),
            n: 3,
        };
        write_yaml_atomic(&path, &rec).unwrap();
        let back: Rec = read_yaml(&path).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_write_atomic_leaves_no_stage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"payload").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("staged").exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.yaml");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_append_jsonl_accumulates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        append_jsonl(&path, &Rec { name: "a".into(), n: 1 }).unwrap();
        append_jsonl(&path, &Rec { name: "b".into(), n: 2 }).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
