use crate::error::RelayError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Parse and validate the `url` parameter of a proxy request.
///
/// Accepts only absolute `http://` and `https://` URLs with a host. With
/// `block_private` set, IP literals in private or reserved ranges are refused
/// as well (SSRF protection for deployments exposed to untrusted clients).
///
/// **Hostnames** are accepted without DNS resolution, so a public name
/// pointing at a private address is not caught here.
///
/// # Errors
/// Returns [`RelayError::MissingParameter`] for an absent or blank value and
/// [`RelayError::InvalidUrl`] for:
/// - Unparseable or relative URLs
/// - Non-HTTP(S) schemes
/// - Private/reserved IP literals when `block_private` is set
pub fn validate_origin_url(raw: Option<&str>, block_private: bool) -> Result<Url, RelayError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RelayError::MissingParameter("url"))?;

    let parsed = Url::parse(raw).map_err(|_| RelayError::InvalidUrl(raw.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(RelayError::InvalidUrl(format!(
                "scheme '{scheme}' not allowed, only http/https permitted"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| RelayError::InvalidUrl(format!("no host in {raw}")))?;

    if block_private {
        let blocked = match &host {
            Host::Ipv4(ip) => is_blocked_ipv4(*ip),
            Host::Ipv6(ip) => is_blocked_ipv6(*ip),
            Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        };
        if blocked {
            return Err(RelayError::InvalidUrl(format!(
                "private or reserved address not allowed: {host}"
            )));
        }
    }

    Ok(parsed)
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`: "this" network (RFC 1122)
/// - `10.0.0.0/8`: RFC 1918 private
/// - `127.0.0.0/8`: loopback
/// - `169.254.0.0/16`: link-local / cloud-metadata
/// - `172.16.0.0/12`: RFC 1918 private
/// - `192.168.0.0/16`: RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Returns `true` for IPv6 loopback, link-local (`fe80::/10`) and
/// unique-local (`fc00::/7`) addresses, and IPv4-mapped forms of blocked IPv4.
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }
    let s = ip.segments();

    ip.is_loopback() || (s[0] & 0xffc0) == 0xfe80 || (s[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(url: &str) -> Result<Url, RelayError> {
        validate_origin_url(Some(url), false)
    }

    fn guarded(url: &str) -> Result<Url, RelayError> {
        validate_origin_url(Some(url), true)
    }

    #[test]
    fn missing_or_blank_is_missing_parameter() {
        assert!(matches!(
            validate_origin_url(None, false),
            Err(RelayError::MissingParameter("url"))
        ));
        assert!(matches!(
            validate_origin_url(Some("   "), false),
            Err(RelayError::MissingParameter("url"))
        ));
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(open("http://iptv.example.net:8080/live/1.m3u8").is_ok());
        assert!(open("https://cdn.example.com/live/stream.m3u8?token=abc").is_ok());
    }

    #[test]
    fn keeps_query_string() {
        let url = open("https://cdn.example.com/s.ts?a=1&b=2").unwrap();
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(open("ftp://cdn.example.com/file.ts"), Err(RelayError::InvalidUrl(_))));
        assert!(open("file:///etc/passwd").is_err());
        assert!(open("rtmp://cdn.example.com/live").is_err());
    }

    #[test]
    fn rejects_relative_and_garbage() {
        assert!(open("cdn.example.com/stream").is_err());
        assert!(open("/hls-proxy/segment").is_err());
        assert!(open("not-a-url").is_err());
    }

    #[test]
    fn private_addresses_allowed_by_default() {
        assert!(open("http://127.0.0.1:9000/live.m3u8").is_ok());
        assert!(open("http://192.168.1.20/live.m3u8").is_ok());
    }

    #[test]
    fn blocks_private_ipv4_when_enabled() {
        assert!(guarded("http://127.0.0.1/stream").is_err());
        assert!(guarded("http://10.0.0.1/stream").is_err());
        assert!(guarded("http://172.16.0.1/stream").is_err());
        assert!(guarded("http://192.168.0.1/stream").is_err());
        assert!(guarded("http://169.254.169.254/latest/meta-data/").is_err());
        assert!(guarded("http://0.1.2.3/stream").is_err());
        assert!(guarded("http://localhost:8080/stream").is_err());
    }

    #[test]
    fn blocks_private_ipv6_when_enabled() {
        assert!(guarded("http://[::1]/stream").is_err());
        assert!(guarded("http://[fe80::1]/stream").is_err());
        assert!(guarded("http://[fd00::1]/stream").is_err());
        assert!(guarded("http://[::ffff:10.0.0.1]/stream").is_err());
    }

    #[test]
    fn public_addresses_pass_when_enabled() {
        assert!(guarded("http://1.2.3.4/stream").is_ok());
        assert!(guarded("http://172.15.255.255/stream").is_ok());
        assert!(guarded("http://172.32.0.0/stream").is_ok());
        assert!(guarded("https://cdn.example.com/stream.m3u8").is_ok());
    }
}
