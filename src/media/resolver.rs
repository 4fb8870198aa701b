//! Resolves media references, once per token per export.

use super::download::materialize;
use super::{MediaPolicy, ResolvedAsset};
use crate::api::FeishuRepository;
use crate::cancel::CancelToken;
use crate::error::AppError;
use crate::error_recovery::{retry_with_backoff, RetryPolicy};
use crate::model::{MediaKind, MediaReference};
use crate::progress::{NoopObserver, ProgressEvent, ProgressObserver};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A cached resolution: the asset, or why it is unavailable.
type CachedResolution = Result<ResolvedAsset, String>;

/// Resolves media tokens under one policy.
///
/// Concurrent requests for the same token share a single resolution.
/// Unavailability is cached too; fatal errors (`Auth`, `Cancelled`) are not.
pub struct MediaResolver {
    repository: Arc<dyn FeishuRepository>,
    policy: MediaPolicy,
    retry: RetryPolicy,
    cancel: CancelToken,
    observer: Arc<dyn ProgressObserver>,
    cache: DashMap<String, Arc<OnceCell<CachedResolution>>>,
}

impl MediaResolver {
    pub fn new(repository: Arc<dyn FeishuRepository>, policy: MediaPolicy) -> Self {
        Self {
            repository,
            policy,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
            observer: Arc::new(NoopObserver),
            cache: DashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    /// Resolves `reference` under this resolver's policy.
    ///
    /// Fails with `MediaUnavailable` when the platform will not hand the
    /// asset out; callers render a placeholder for that. Download failures
    /// with a remote URL available fall back to it, noting `download_error`.
    pub async fn resolve(&self, reference: &MediaReference) -> Result<ResolvedAsset, AppError> {
        let cell = self
            .cache
            .entry(reference.token.clone())
            .or_default()
            .clone();

        let cached = cell
            .get_or_try_init(|| self.resolve_uncached(reference))
            .await?;

        cached.clone().map_err(|reason| AppError::MediaUnavailable {
            token: reference.token.clone(),
            reason,
        })
    }

    /// Every file materialized so far, sorted.
    pub fn materialized_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .cache
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .get()
                    .and_then(|r| r.as_ref().ok())
                    .and_then(|a| a.local_file.clone())
            })
            .collect();
        files.sort();
        files
    }

    async fn resolve_uncached(
        &self,
        reference: &MediaReference,
    ) -> Result<CachedResolution, AppError> {
        let resolution = self.resolve_with_policy(reference).await?;

        self.observer.on_event(ProgressEvent::AssetResolved {
            token: reference.token.clone(),
            kind: reference.kind,
            local: resolution
                .as_ref()
                .map(|a| a.local_path.is_some())
                .unwrap_or(false),
            ok: resolution.is_ok(),
        });
        if let Err(reason) = &resolution {
            log::warn!("{} {} unavailable: {}", reference.kind.as_str(), reference.token, reason);
        }
        Ok(resolution)
    }

    async fn resolve_with_policy(
        &self,
        reference: &MediaReference,
    ) -> Result<CachedResolution, AppError> {
        let remote = if reference.kind == MediaKind::Board {
            None
        } else {
            let issued = retry_with_backoff(
                || self.repository.temporary_download_url(reference),
                self.retry,
            )
            .await;
            match issued {
                Ok(url) => Some(url),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(Err(e.to_string())),
            }
        };

        let mut asset = ResolvedAsset {
            token: reference.token.clone(),
            remote,
            local_path: None,
            local_file: None,
            download_error: None,
        };

        let MediaPolicy::DownloadAndEmbed {
            export_root,
            assets_dir,
        } = &self.policy
        else {
            return Ok(Ok(asset));
        };

        let target_dir = export_root.join(assets_dir);
        match retry_with_backoff(|| self.download(reference, &target_dir), self.retry).await {
            Ok(file) => {
                asset.local_path = Some(relative_reference(export_root, &file));
                asset.local_file = Some(file);
                Ok(Ok(asset))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) if asset.remote.is_some() => {
                log::warn!(
                    "Download of {} failed, linking remote URL instead: {}",
                    reference.token,
                    e
                );
                asset.download_error = Some(e.to_string());
                Ok(Ok(asset))
            }
            Err(e) => Ok(Err(e.to_string())),
        }
    }

    async fn download(&self, reference: &MediaReference, dir: &Path) -> Result<PathBuf, AppError> {
        let stream = self
            .cancel
            .guard(self.repository.download_media(reference))
            .await??;
        materialize(
            stream,
            dir,
            &reference.token,
            reference.extension_hint(),
            &self.cancel,
        )
        .await
    }
}

/// Forward-slash path of `file` relative to `root`.
fn relative_reference(root: &Path, file: &Path) -> String {
    pathdiff::diff_paths(file, root)
        .unwrap_or_else(|| file.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryRepository;
    use pretty_assertions::assert_eq;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nimage-bytes";

    fn resolver(repository: InMemoryRepository, policy: MediaPolicy) -> (MediaResolver, Arc<InMemoryRepository>) {
        let repository = Arc::new(repository);
        let resolver =
            MediaResolver::new(repository.clone(), policy).with_retry(RetryPolicy::immediate(2));
        (resolver, repository)
    }

    #[tokio::test]
    async fn test_link_only_uses_temporary_url() {
        let (resolver, _) = resolver(
            InMemoryRepository::new().with_media("img1", PNG),
            MediaPolicy::LinkOnly,
        );
        let asset = resolver
            .resolve(&MediaReference::new(MediaKind::Image, "img1"))
            .await
            .unwrap();

        assert_eq!(asset.href(), Some("https://files.example.test/img1"));
        assert!(asset.local_path.is_none());
    }

    #[tokio::test]
    async fn test_repeated_token_resolves_once() {
        let (resolver, repository) = resolver(
            InMemoryRepository::new().with_media("img1", PNG),
            MediaPolicy::LinkOnly,
        );
        let reference = MediaReference::new(MediaKind::Image, "img1");

        let (a, b) = tokio::join!(resolver.resolve(&reference), resolver.resolve(&reference));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(repository.request_count("tmp_url:img1"), 1);
    }

    #[tokio::test]
    async fn test_denied_asset_is_media_unavailable() {
        let (resolver, _) = resolver(
            InMemoryRepository::new()
                .with_media("img1", PNG)
                .failing("tmp_url:img1", 1061004),
            MediaPolicy::LinkOnly,
        );
        let result = resolver
            .resolve(&MediaReference::new(MediaKind::Image, "img1"))
            .await;
        assert!(matches!(result, Err(AppError::MediaUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_download_and_embed_writes_relative_asset() {
        let root = tempfile::tempdir().unwrap();
        let (resolver, _) = resolver(
            InMemoryRepository::new().with_media("img1", PNG),
            MediaPolicy::download_into(root.path()),
        );

        let asset = resolver
            .resolve(&MediaReference::new(MediaKind::Image, "img1"))
            .await
            .unwrap();

        assert_eq!(asset.href(), Some("assets/img1.png"));
        assert_eq!(std::fs::read(root.path().join("assets/img1.png")).unwrap(), PNG);
        assert_eq!(resolver.materialized_files(), vec![root.path().join("assets/img1.png")]);
    }

    #[tokio::test]
    async fn test_failed_download_falls_back_to_remote_url() {
        let root = tempfile::tempdir().unwrap();
        let (resolver, _) = resolver(
            InMemoryRepository::new()
                .with_media("file1", b"%PDF-1.7 body".to_vec())
                .failing("stream:file1", 1770032),
            MediaPolicy::download_into(root.path()),
        );

        let asset = resolver
            .resolve(&MediaReference::new(MediaKind::File, "file1").with_name("report.pdf"))
            .await
            .unwrap();

        assert_eq!(asset.href(), Some("https://files.example.test/file1"));
        assert!(asset.download_error.is_some());
        assert!(resolver.materialized_files().is_empty());
    }

    #[tokio::test]
    async fn test_board_without_download_has_no_href() {
        let (resolver, _) = resolver(
            InMemoryRepository::new().with_media("board1", PNG),
            MediaPolicy::LinkOnly,
        );
        let asset = resolver
            .resolve(&MediaReference::new(MediaKind::Board, "board1"))
            .await
            .unwrap();
        assert_eq!(asset.href(), None);
    }

    #[tokio::test]
    async fn test_board_download_failure_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let (resolver, _) = resolver(
            InMemoryRepository::new().failing("download:board1", 1770032),
            MediaPolicy::download_into(root.path()),
        );
        let result = resolver
            .resolve(&MediaReference::new(MediaKind::Board, "board1"))
            .await;
        assert!(matches!(result, Err(AppError::MediaUnavailable { .. })));
    }
}
