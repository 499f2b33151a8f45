//! Persisting job outputs: JSON snapshots and Markdown reports

use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

/// Create a directory and all of its parents
pub async fn ensure_directory(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    tracing::debug!(path = %path.display(), "Ensured directory exists");
    Ok(())
}

async fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent).await,
        _ => Ok(()),
    }
}

/// Write `data` as pretty-printed JSON, creating parent directories
pub async fn save_json<T: Serialize + ?Sized>(data: &T, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(data)?;
    ensure_parent(path).await?;
    if let Err(e) = tokio::fs::write(path, bytes).await {
        tracing::error!(path = %path.display(), error = %e, "Error saving JSON");
        return Err(e.into());
    }
    tracing::info!(path = %path.display(), "Saved JSON data");
    Ok(())
}

/// Read a JSON file; a missing file is `Ok(None)`
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "JSON file not found");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write a Markdown document, creating parent directories
pub async fn save_markdown(content: &str, path: &Path) -> Result<()> {
    ensure_parent(path).await?;
    if let Err(e) = tokio::fs::write(path, content).await {
        tracing::error!(path = %path.display(), error = %e, "Error saving markdown");
        return Err(e.into());
    }
    tracing::info!(path = %path.display(), "Saved markdown");
    Ok(())
}
