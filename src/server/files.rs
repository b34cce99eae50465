//! Tile file resolution and streaming
//!
//! Requested names are checked lexically before any filesystem access, then
//! resolved and compared against the canonical dataset root so symlinks
//! cannot lead outside it.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use std::path::{Component, Path, PathBuf};
use tokio_util::io::ReaderStream;

use crate::error::FileError;

/// Reject names that could address anything outside the root
///
/// Only plain relative paths made of normal components pass.
pub fn check_name(name: &str) -> Result<(), FileError> {
    if name.is_empty() || name.contains('\0') || name.contains('\\') {
        return Err(FileError::Forbidden);
    }
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(FileError::Forbidden);
    }
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(FileError::Forbidden);
    }
    Ok(())
}

/// Resolve `name` beneath `root`
pub async fn safe_join(root: &Path, name: &str) -> Result<PathBuf, FileError> {
    check_name(name)?;

    let root = tokio::fs::canonicalize(root).await.map_err(not_found_or_io)?;
    let resolved = tokio::fs::canonicalize(root.join(name))
        .await
        .map_err(not_found_or_io)?;

    if !resolved.starts_with(&root) {
        return Err(FileError::Forbidden);
    }
    Ok(resolved)
}

fn not_found_or_io(e: std::io::Error) -> FileError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileError::NotFound
    } else {
        FileError::Io(e)
    }
}

/// Open a file beneath `root` as a streaming download response
///
/// The file handle lives inside the body stream and is closed when the
/// client goes away.
pub async fn stream_file(root: &Path, name: &str) -> Result<Response, FileError> {
    let path = safe_join(root, name).await?;
    let file = tokio::fs::File::open(&path).await.map_err(not_found_or_io)?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(FileError::NotFound);
    }

    let download_name = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', ""))
        .unwrap_or_default();

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response())
}
