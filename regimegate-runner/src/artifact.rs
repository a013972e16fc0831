//! Artifact store: the file system as the message bus between stages.
//!
//! Every stage reads the JSON its predecessors finished writing and writes
//! its own decision record. Reads are forgiving (a missing or corrupt
//! artifact degrades to a default and is logged); writes are atomic
//! (write to `.tmp`, rename into place) so a reader never sees half a file.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Read a JSON artifact, falling back to `T::default()` when it is missing,
/// unreadable, or does not match the expected shape.
pub fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    read_json(path).unwrap_or_default()
}

/// Read a JSON artifact; `None` when missing or malformed.
pub fn read_json<T>(path: &Path) -> Option<T>
where
    T: DeserializeOwned,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "artifact missing");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "artifact unreadable");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "artifact malformed");
            None
        }
    }
}

/// Read a JSON object; anything that is not an object becomes an empty map.
pub fn read_object(path: &Path) -> Map<String, Value> {
    match read_json::<Value>(path) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            tracing::warn!(path = %path.display(), "artifact is not a JSON object");
            Map::new()
        }
        None => Map::new(),
    }
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize artifact {}", path.display()))?;
    write_text(path, &json)
}

/// Write a text artifact atomically, creating parent directories.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let tmp = tmp_path(path);
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move artifact into place at {}", path.display()))?;
    Ok(())
}

/// Set `key` in the JSON object stored at `path`, keeping every other key.
///
/// Re-running overwrites the same key; a missing or non-object file starts
/// from an empty object.
pub fn merge_key(path: &Path, key: &str, value: Value) -> Result<()> {
    let mut object = read_object(path);
    object.insert(key.to_string(), value);
    write_json(path, &Value::Object(object))
}

/// Immediate subdirectories of `root`, sorted by name.
///
/// A missing root is an empty listing.
pub fn sorted_subdirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    dirs
}

/// BLAKE3 content hash of a file, hex encoded.
pub fn file_digest(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(blake3::hash(&bytes).to_hex().to_string())
}

/// Final path component as a string (run id for a run directory).
pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        status: String,
    }

    #[test]
    fn missing_artifact_reads_as_default() {
        let tmp = TempDir::new().unwrap();
        let sample: Sample = read_json_or_default(&tmp.path().join("absent.json"));
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn corrupt_artifact_reads_as_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corrupt.json");
        std::fs::write(&path, "{\"status\": ").unwrap();
        let sample: Sample = read_json_or_default(&path);
        assert_eq!(sample, Sample::default());
        assert!(read_object(&path).is_empty());
    }

    #[test]
    fn non_object_reads_as_empty_map() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("list.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(read_object(&path).is_empty());
    }

    #[test]
    fn write_creates_parents_and_leaves_no_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/STATUS.json");
        write_json(&path, &json!({"status": "pass"})).unwrap();
        assert!(path.exists());
        assert!(!tmp.path().join("a/b/STATUS.json.tmp").exists());
        let sample: Sample = read_json_or_default(&path);
        assert_eq!(sample.status, "pass");
    }

    #[test]
    fn merge_key_is_idempotent_and_preserves_other_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.json");
        write_json(&path, &json!({"n_assets": 3})).unwrap();

        merge_key(&path, "deployment_gate", json!({"blocked": true})).unwrap();
        merge_key(&path, "deployment_gate", json!({"blocked": false})).unwrap();

        let object = read_object(&path);
        assert_eq!(object.len(), 2);
        assert_eq!(object["n_assets"], 3);
        assert_eq!(object["deployment_gate"], json!({"blocked": false}));
    }

    #[test]
    fn subdirs_sorted_by_name() {
        let tmp = TempDir::new().unwrap();
        for name in ["20240103", "20240101", "20240102"] {
            std::fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        std::fs::write(tmp.path().join("latest_run.json"), "{}").unwrap();

        let names: Vec<String> = sorted_subdirs(tmp.path()).iter().map(|p| dir_name(p)).collect();
        assert_eq!(names, vec!["20240101", "20240102", "20240103"]);
        assert!(sorted_subdirs(&tmp.path().join("missing")).is_empty());
    }

    #[test]
    fn digest_changes_with_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.csv");
        std::fs::write(&path, "asset\nSPY\n").unwrap();
        let first = file_digest(&path).unwrap();
        std::fs::write(&path, "asset\nQQQ\n").unwrap();
        assert_ne!(first, file_digest(&path).unwrap());
        assert!(file_digest(&tmp.path().join("none.csv")).is_none());
    }
}
