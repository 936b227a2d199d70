use std::env;
use std::time::Duration;

/// Smallest relay chunk accepted from configuration.
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Default cap on a playlist body read into memory for rewriting.
pub const DEFAULT_MAX_PLAYLIST_BYTES: usize = 4 * 1024 * 1024;

/// Log output format
#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Prefix for rewritten playlist references. Empty keeps them root-relative
    /// (`/hls-proxy/segment?url=...`), which works behind any reverse proxy.
    pub public_base_url: String,
    /// Dial timeout for origin connections
    pub connect_timeout: Duration,
    /// Time allowed between sending a relayed request and receiving its headers
    pub response_timeout: Duration,
    /// Time allowed for a complete playlist fetch (headers and body)
    pub manifest_timeout: Duration,
    /// Upper bound on bytes handed to the client per relayed chunk
    pub chunk_size: usize,
    /// Maximum simultaneously streaming segment relays (0 = unlimited)
    pub max_concurrent_relays: usize,
    /// Largest playlist body buffered for rewriting
    pub max_playlist_bytes: usize,
    /// Bearer token required on the proxy routes when set
    pub access_token: Option<String>,
    /// Reject origin URLs whose host is a private or loopback IP literal
    pub block_private_origins: bool,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, `PORT` defaults to 5000. In PROD mode it is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_default();

        let connect_timeout = Duration::from_secs(parse_var("CONNECT_TIMEOUT_SECS", 15)?);
        let response_timeout = Duration::from_secs(parse_var("RESPONSE_TIMEOUT_SECS", 30)?);
        let manifest_timeout = Duration::from_secs(parse_var("MANIFEST_TIMEOUT_SECS", 15)?);

        let chunk_size: usize = parse_var("RELAY_CHUNK_SIZE", 8192)?;
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(format!("RELAY_CHUNK_SIZE must be at least {MIN_CHUNK_SIZE}").into());
        }

        let max_concurrent_relays = parse_var("MAX_CONCURRENT_RELAYS", 0)?;
        let max_playlist_bytes = parse_var("MAX_PLAYLIST_BYTES", DEFAULT_MAX_PLAYLIST_BYTES)?;

        let access_token = env::var("ACCESS_TOKEN").ok().filter(|t| !t.is_empty());

        let block_private_origins = env::var("BLOCK_PRIVATE_ORIGINS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            port,
            is_dev,
            public_base_url,
            connect_timeout,
            response_timeout,
            manifest_timeout,
            chunk_size,
            max_concurrent_relays,
            max_playlist_bytes,
            access_token,
            block_private_origins,
            log_format,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            is_dev: true,
            public_base_url: String::new(),
            connect_timeout: Duration::from_secs(15),
            response_timeout: Duration::from_secs(30),
            manifest_timeout: Duration::from_secs(15),
            chunk_size: 8192,
            max_concurrent_relays: 0,
            max_playlist_bytes: DEFAULT_MAX_PLAYLIST_BYTES,
            access_token: None,
            block_private_origins: false,
            log_format: LogFormat::Text,
        }
    }
}

/// Parse an optional numeric variable, failing loudly on malformed values.
fn parse_var<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("{name} is invalid ({raw}): {e}").into()),
        Err(_) => Ok(default),
    }
}
