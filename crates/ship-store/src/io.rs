use std::path::Path;

use serde::Serialize;

use crate::error::StoreError;

/// Serialize `value` to pretty JSON and write it to `path` via a
/// write-to-tmp-then-rename so a crash mid-write never leaves a
/// truncated or partially-written document at `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let serialized = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
        path: path.display().to_string(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &serialized).map_err(|source| StoreError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

/// Read and deserialize a JSON document at `path`, or `None` if the file
/// does not exist or is empty (a fresh data directory).
pub fn read_json_if_present<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, StoreError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    if metadata.len() == 0 {
        return Ok(None);
    }

    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        n: u32,
        s: String,
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let value = Sample { n: 7, s: "hi".into() };
        write_json_atomic(&path, &value).unwrap();
        let loaded: Sample = read_json_if_present(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let loaded: Option<Sample> = read_json_if_present(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn no_tmp_file_left_behind_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        write_json_atomic(&path, &Sample { n: 1, s: "a".into() }).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
    }
}
