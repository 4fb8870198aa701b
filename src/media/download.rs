//! Streaming an asset to disk without leaving half-written files behind.

use crate::api::ByteStream;
use crate::cancel::CancelToken;
use crate::error::AppError;
use crate::output::sanitize_filename;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Bytes kept from the start of a download to sniff its type.
const SNIFF_LENGTH: usize = 16;

/// Streams `stream` into `<dir>/<token>.<ext>` through a `.part` file.
///
/// The extension comes from `extension_hint`, else from the leading bytes,
/// else `bin`. On failure or cancellation the `.part` file is removed.
pub async fn materialize(
    stream: ByteStream,
    dir: &Path,
    token: &str,
    extension_hint: Option<String>,
    cancel: &CancelToken,
) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir).await?;

    let stem = sanitize_filename(token);
    let part = dir.join(format!("{}.{}.part", stem, uuid::Uuid::new_v4().simple()));

    let head = match write_part(stream, &part, cancel).await {
        Ok(head) => head,
        Err(e) => {
            discard(&part).await;
            return Err(e);
        }
    };

    let extension = extension_hint
        .or_else(|| sniff_extension(&head).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string());
    let destination = dir.join(format!("{}.{}", stem, extension));

    if let Err(e) = tokio::fs::rename(&part, &destination).await {
        discard(&part).await;
        return Err(e.into());
    }
    log::debug!("Materialized {} at {}", token, destination.display());
    Ok(destination)
}

async fn write_part(
    mut stream: ByteStream,
    part: &Path,
    cancel: &CancelToken,
) -> Result<Vec<u8>, AppError> {
    let mut file = tokio::fs::File::create(part).await?;
    let mut head = Vec::with_capacity(SNIFF_LENGTH);

    while let Some(chunk) = cancel.guard(stream.next()).await? {
        let chunk = chunk?;
        if head.len() < SNIFF_LENGTH {
            let take = (SNIFF_LENGTH - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        cancel.guard(file.write_all(&chunk)).await??;
    }

    file.flush().await?;
    Ok(head)
}

async fn discard(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not remove partial download {}: {}", part.display(), e);
        }
    }
}

/// Recognizes common image formats by magic number.
fn sniff_extension(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some("gif")
    } else if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("webp")
    } else if head.starts_with(b"%PDF") {
        Some("pdf")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<Result<Vec<u8>, AppError>>) -> ByteStream {
        stream::iter(parts).boxed()
    }

    fn leftover_parts(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_sniffs_png_when_no_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = materialize(
            chunks(vec![Ok(b"\x89PNG\r\n".to_vec()), Ok(b"\x1a\nrest".to_vec())]),
            dir.path(),
            "imgToken",
            None,
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(path, dir.path().join("imgToken.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG\r\n\x1a\nrest");
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_stream_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = materialize(
            chunks(vec![
                Ok(vec![1, 2, 3]),
                Err(AppError::TransientFetch {
                    endpoint: "download".to_string(),
                    cause: "reset".to_string(),
                }),
            ]),
            dir.path(),
            "fileToken",
            Some("pdf".to_string()),
            &CancelToken::new(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(leftover_parts(dir.path()), 0);
        assert!(!dir.path().join("fileToken.pdf").exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = materialize(
            chunks(vec![Ok(vec![1, 2, 3])]),
            dir.path(),
            "fileToken",
            None,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[test]
    fn test_unknown_bytes_have_no_extension() {
        assert_eq!(sniff_extension(b"hello"), None);
        assert_eq!(sniff_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
    }
}
