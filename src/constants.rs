// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains, not its
//! technical role.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Feishu API boundaries
// ---------------------------------------------------------------------------

/// Mainland Feishu Open Platform host.
pub const FEISHU_OPEN_BASE_URL: &str = "https://open.feishu.cn";

/// International Lark Open Platform host.
pub const LARK_OPEN_BASE_URL: &str = "https://open.larksuite.com";

/// How many blocks the block-listing endpoint returns per page (API maximum).
pub const BLOCK_PAGE_SIZE: u32 = 500;

/// How many wiki nodes the child-listing endpoint returns per page (API maximum).
pub const WIKI_PAGE_SIZE: u32 = 50;

/// Page size for bitable fields and records (API maximum for search).
pub const BITABLE_PAGE_SIZE: u32 = 100;

/// Upper bound on cursor pages for a single listing, guarding against a
/// server that never stops reporting `has_more`.
pub const MAX_PAGES_PER_LISTING: u32 = 10_000;

// ---------------------------------------------------------------------------
// Network behaviour
// ---------------------------------------------------------------------------

/// Per-request timeout unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts per request before a transient failure becomes terminal.
pub const FETCH_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles per attempt.
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Backoff ceiling.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Ceiling on concurrent media resolutions and wiki node exports.
pub const MAX_DEFAULT_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Fraction of a credential's lifetime, counted back from expiry, in which
/// it is considered expiring and refreshed ahead of use.
pub const TOKEN_REFRESH_MARGIN_FRACTION: f64 = 0.10;

/// Lifetime assumed for a user-supplied access token with no declared expiry.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 7200;

/// Validity window the platform grants temporary download URLs.
pub const TEMPORARY_URL_VALIDITY_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Formatting boundaries
// ---------------------------------------------------------------------------

/// Deepest heading Markdown can express.
pub const MAX_HEADING_LEVEL: usize = 6;

/// Spaces per nesting level under a list item.
pub const LIST_INDENT: &str = "    ";

/// Default directory, relative to the export root, for materialized media.
pub const DEFAULT_ASSETS_DIR: &str = "assets";

/// Emoji used for callouts that carry none.
pub const DEFAULT_CALLOUT_EMOJI: &str = "💡";

/// Estimated characters per block, used to pre-allocate output strings.
pub const CHARS_PER_BLOCK_ESTIMATE: usize = 128;
