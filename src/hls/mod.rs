pub mod classify;
pub mod rewrite;

pub use classify::{ResourceKind, classify};
pub use rewrite::rewrite_playlist;

/// MIME type for HLS playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
