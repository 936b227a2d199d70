//! HLS relay: rewrites origin playlists so every reference routes back
//! through the proxy, and relays segments to players with Range support.

pub mod config;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod origin;
pub mod relay;
pub mod server;
