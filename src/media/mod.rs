//! Media resolution: turning asset tokens into links or local files.
//!
//! Images and files resolve to a temporary signed URL. Under
//! [`MediaPolicy::DownloadAndEmbed`] the bytes are also streamed to disk and
//! the Markdown points at the local copy instead.

mod download;
mod resolver;

pub use resolver::MediaResolver;

use crate::api::TemporaryUrl;
use crate::constants::DEFAULT_ASSETS_DIR;
use std::path::PathBuf;

/// Where rendered Markdown points for embedded assets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MediaPolicy {
    /// Link to the platform's temporary URLs.
    #[default]
    LinkOnly,
    /// Download into `<export_root>/<assets_dir>` and link relatively.
    DownloadAndEmbed {
        export_root: PathBuf,
        assets_dir: String,
    },
}

impl MediaPolicy {
    pub fn download_into(export_root: impl Into<PathBuf>) -> Self {
        MediaPolicy::DownloadAndEmbed {
            export_root: export_root.into(),
            assets_dir: DEFAULT_ASSETS_DIR.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MediaPolicy::DownloadAndEmbed { .. })
    }
}

/// The outcome of resolving one media token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub token: String,
    /// Absent for whiteboards, which have no temporary link.
    pub remote: Option<TemporaryUrl>,
    /// Path relative to the export root, forward slashes.
    pub local_path: Option<String>,
    /// Absolute location of the materialized file.
    pub local_file: Option<PathBuf>,
    /// Why a download fell back to the remote URL.
    pub download_error: Option<String>,
}

impl ResolvedAsset {
    /// The reference to write into Markdown: local copy first.
    pub fn href(&self) -> Option<&str> {
        self.local_path
            .as_deref()
            .or_else(|| self.remote.as_ref().map(|r| r.url.as_str()))
    }
}
