// src/store/persist.rs
//! JSON state files: atomic writes, forgiving reads.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;

/// Write JSON atomically (write to a temp file, then rename over the target).
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load a state file. A missing file yields the default; an unreadable or
/// malformed one is logged, moved aside to `<file>.corrupt`, and also yields
/// the default, so startup never fails on bad state.
pub(crate) async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(target: "store", path = %path.display(), "no state file yet, starting empty");
            return T::default();
        }
        Err(e) => {
            tracing::error!(target: "store", path = %path.display(), error = %e, "state file unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            let aside = corrupt_path(path);
            tracing::error!(
                target: "store",
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "state file corrupt, starting empty"
            );
            if let Err(e) = tokio::fs::rename(path, &aside).await {
                tracing::warn!(target: "store", error = %e, "could not move corrupt state aside");
            }
            T::default()
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Sample {
        items: Vec<String>,
    }

    #[tokio::test]
    async fn roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        let missing: Sample = load_json_or_default(&path).await;
        assert_eq!(missing, Sample::default());

        let s = Sample {
            items: vec!["a".into()],
        };
        write_json_atomic(&path, &s).await.unwrap();
        let back: Sample = load_json_or_default(&path).await;
        assert_eq!(back, s);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let v: Sample = load_json_or_default(&path).await;
        assert_eq!(v, Sample::default());
        assert!(!path.exists());
        assert!(dir.path().join("sample.json.corrupt").exists());
    }
}
