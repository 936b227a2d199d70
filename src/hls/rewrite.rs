//! Playlist reference rewriting.
//!
//! HLS playlists are line oriented: lines starting with `#` are directives,
//! every other non-blank line is a URI. Rather than round-tripping through a
//! full M3U8 parser (which drops tags it does not know), the rewriter walks
//! the text line by line and replaces each URI with a proxied URL, leaving
//! directives and blank lines untouched and in place.

use crate::error::{RelayError, Result};
use tracing::{debug, info};
use url::Url;

/// Route serving rewritten top-level manifests.
pub const MANIFEST_ROUTE: &str = "/hls-proxy/manifest";

/// Route every rewritten playlist reference points at.
pub const SEGMENT_ROUTE: &str = "/hls-proxy/segment";

/// One line of a playlist, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistLine<'a> {
    Directive(&'a str),
    Blank,
    Reference(&'a str),
}

impl<'a> PlaylistLine<'a> {
    /// Classify a raw line. Surrounding whitespace (including the `\r` of
    /// CRLF playlists) is trimmed first.
    pub fn parse(raw: &'a str) -> Self {
        let line = raw.trim();
        if line.is_empty() {
            PlaylistLine::Blank
        } else if line.starts_with('#') {
            PlaylistLine::Directive(line)
        } else {
            PlaylistLine::Reference(line)
        }
    }
}

/// A URI taken from a playlist line, resolved to absolute form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginReference {
    /// The line as it appeared in the playlist (trimmed)
    pub raw: String,
    /// Absolute URL the origin serves the resource at
    pub absolute: String,
}

/// `true` when the reference already names an http(s) resource.
fn is_absolute_http(reference: &str) -> bool {
    let starts_with = |prefix: &str| {
        reference
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    starts_with("http://") || starts_with("https://")
}

/// Resolve one playlist reference against the URL of the playlist it came from.
///
/// Absolute http(s) references are kept byte-for-byte. Everything else goes
/// through RFC 3986 resolution, so `..` segments collapse and the reference's
/// own query string survives while the playlist's query is not inherited.
pub fn resolve_reference(reference: &str, playlist_url: &Url) -> Result<OriginReference> {
    let absolute = if is_absolute_http(reference) {
        reference.to_string()
    } else {
        playlist_url
            .join(reference)
            .map_err(|e| RelayError::InvalidReference {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?
            .to_string()
    };

    Ok(OriginReference {
        raw: reference.to_string(),
        absolute,
    })
}

/// Build the proxied URL for an absolute origin URL.
///
/// The whole origin URL, query and fragment included, is percent-encoded into
/// a single `url` parameter so its own delimiters cannot leak into ours.
pub fn proxied_url(public_base: &str, absolute: &str) -> String {
    format!(
        "{}{}?url={}",
        public_base,
        SEGMENT_ROUTE,
        urlencoding::encode(absolute)
    )
}

/// Recover the origin URL from a proxied URL produced by [`proxied_url`].
pub fn decode_proxied_url(proxied: &str) -> Option<String> {
    let (_, query) = proxied.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
}

/// Rewrite every reference line of `content` into a proxied URL.
///
/// `playlist_url` is the absolute URL `content` was fetched from and serves
/// as the base for relative references. Output lines are joined with `\n`.
pub fn rewrite_playlist(content: &str, playlist_url: &Url, public_base: &str) -> Result<String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut output = String::with_capacity(content.len() * 2);
    let mut rewritten = 0usize;

    for (index, raw) in content.split('\n').enumerate() {
        if index > 0 {
            output.push('\n');
        }

        match PlaylistLine::parse(raw) {
            PlaylistLine::Blank => {}
            PlaylistLine::Directive(line) => output.push_str(line),
            PlaylistLine::Reference(line) => {
                let reference = resolve_reference(line, playlist_url)?;
                let proxied = proxied_url(public_base, &reference.absolute);
                debug!("Rewrite: {} -> {}", reference.raw, proxied);
                output.push_str(&proxied);
                rewritten += 1;
            }
        }
    }

    info!("Rewrote {} references in playlist {}", rewritten, playlist_url);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://host/a/b/manifest.m3u8").unwrap()
    }

    fn resolve(reference: &str) -> String {
        resolve_reference(reference, &base()).unwrap().absolute
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(PlaylistLine::parse(""), PlaylistLine::Blank);
        assert_eq!(PlaylistLine::parse("   \r"), PlaylistLine::Blank);
        assert_eq!(
            PlaylistLine::parse("#EXTINF:6.0,\r"),
            PlaylistLine::Directive("#EXTINF:6.0,")
        );
        assert_eq!(
            PlaylistLine::parse("  seg_1.ts  "),
            PlaylistLine::Reference("seg_1.ts")
        );
    }

    #[test]
    fn resolves_sibling_reference() {
        assert_eq!(resolve("stream_0.ts"), "https://host/a/b/stream_0.ts");
    }

    #[test]
    fn resolves_parent_reference() {
        assert_eq!(resolve("../alt/stream_0.ts"), "https://host/a/alt/stream_0.ts");
    }

    #[test]
    fn resolves_dot_and_root_relative() {
        assert_eq!(resolve("./x/stream_0.ts"), "https://host/a/b/x/stream_0.ts");
        assert_eq!(resolve("/root/stream_0.ts"), "https://host/root/stream_0.ts");
    }

    #[test]
    fn resolves_protocol_relative() {
        assert_eq!(resolve("//cdn.other.net/s.ts"), "https://cdn.other.net/s.ts");
    }

    #[test]
    fn relative_reference_keeps_own_query() {
        assert_eq!(
            resolve("stream_0.ts?token=abc&exp=1"),
            "https://host/a/b/stream_0.ts?token=abc&exp=1"
        );
    }

    #[test]
    fn playlist_query_is_not_inherited() {
        let playlist = Url::parse("https://host/a/b/manifest.m3u8?session=42").unwrap();
        assert_eq!(
            resolve_reference("stream_0.ts", &playlist).unwrap().absolute,
            "https://host/a/b/stream_0.ts"
        );
    }

    #[test]
    fn absolute_reference_kept_verbatim() {
        let raw = "HTTPS://Other.Example.com/live/../seg.ts?a=1&b=%2F";
        assert_eq!(resolve(raw), raw);
    }

    #[test]
    fn proxied_url_encodes_whole_reference() {
        let proxied = proxied_url("", "https://cdn.example.com/s.ts?a=1&b=2#frag");
        assert_eq!(
            proxied,
            "/hls-proxy/segment?url=https%3A%2F%2Fcdn.example.com%2Fs.ts%3Fa%3D1%26b%3D2%23frag"
        );
    }

    #[test]
    fn proxied_url_uses_public_base() {
        let proxied = proxied_url("https://relay.example.com", "https://cdn/x.ts");
        assert!(proxied.starts_with("https://relay.example.com/hls-proxy/segment?url="));
    }

    #[test]
    fn decode_recovers_absolute_url() {
        for absolute in [
            "https://cdn.example.com/s.ts",
            "https://cdn.example.com/s.ts?a=1&b=two+three&c=%2F",
            "http://cdn.example.com:8080/live/ch 1/seg.ts?x=é",
            "https://cdn.example.com/s.ts#t=10",
        ] {
            let proxied = proxied_url("https://relay.example.com", absolute);
            assert_eq!(decode_proxied_url(&proxied).as_deref(), Some(absolute));
        }
    }

    #[test]
    fn decode_rejects_url_without_parameter() {
        assert_eq!(decode_proxied_url("/hls-proxy/segment"), None);
        assert_eq!(decode_proxied_url("/hls-proxy/segment?other=1"), None);
    }

    #[test]
    fn rewrites_media_playlist_in_order() {
        let input = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n\n#EXTINF:6.0,\nseg_0.ts\n#EXTINF:6.0,\nhttps://cdn.example.com/seg_1.ts?t=1\n#EXT-X-ENDLIST\n";
        let output = rewrite_playlist(input, &base(), "").unwrap();
        let lines: Vec<&str> = output.split('\n').collect();

        assert_eq!(lines.len(), input.split('\n').count());
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "#EXTINF:6.0,");
        assert_eq!(
            decode_proxied_url(lines[5]).as_deref(),
            Some("https://host/a/b/seg_0.ts")
        );
        assert_eq!(
            decode_proxied_url(lines[7]).as_deref(),
            Some("https://cdn.example.com/seg_1.ts?t=1")
        );
        assert_eq!(lines[8], "#EXT-X-ENDLIST");
        assert_eq!(lines[9], "");
    }

    #[test]
    fn reference_count_and_positions_preserved() {
        let input = "#EXTM3U\r\n#EXT-X-STREAM-INF:BANDWIDTH=800000\r\nlow/index.m3u8\r\n\r\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\r\nhigh/index.m3u8\r\n#EXT-X-STREAM-INF:BANDWIDTH=4000000\r\nhttps://other.example.com/4k/index.m3u8\r\n";
        let output = rewrite_playlist(input, &base(), "").unwrap();

        let in_lines: Vec<PlaylistLine> = input.split('\n').map(PlaylistLine::parse).collect();
        let out_lines: Vec<&str> = output.split('\n').collect();
        assert_eq!(in_lines.len(), out_lines.len());

        let mut references = Vec::new();
        for (input_line, out) in in_lines.iter().zip(&out_lines) {
            match input_line {
                PlaylistLine::Directive(d) => assert_eq!(out, d),
                PlaylistLine::Blank => assert_eq!(*out, ""),
                PlaylistLine::Reference(_) => {
                    assert!(out.starts_with(SEGMENT_ROUTE));
                    references.push(decode_proxied_url(out).unwrap());
                }
            }
        }

        assert_eq!(
            references,
            vec![
                "https://host/a/b/low/index.m3u8",
                "https://host/a/b/high/index.m3u8",
                "https://other.example.com/4k/index.m3u8",
            ]
        );
    }

    #[test]
    fn directive_uris_are_left_alone() {
        let input = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:4,\nseg.ts";
        let output = rewrite_playlist(input, &base(), "").unwrap();
        assert!(output.contains("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\""));
    }

    #[test]
    fn leading_bom_is_not_a_reference() {
        let output = rewrite_playlist("\u{feff}#EXTM3U\nseg.ts", &base(), "").unwrap();
        assert!(output.starts_with("#EXTM3U\n"));
    }

    #[test]
    fn unresolvable_reference_fails_rewrite() {
        let err = rewrite_playlist("#EXTM3U\n//[::1/seg.ts", &base(), "").unwrap_err();
        assert!(matches!(err, RelayError::InvalidReference { .. }), "got {err:?}");
    }

    #[test]
    fn output_parses_as_m3u8() {
        let input = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:6.0,\nseg_0.ts\n#EXTINF:6.0,\nseg_1.ts\n#EXT-X-ENDLIST\n";
        let output = rewrite_playlist(input, &base(), "http://relay.local").unwrap();

        let playlist = m3u8_rs::parse_playlist_res(output.as_bytes()).expect("valid M3U8");
        let m3u8_rs::Playlist::MediaPlaylist(media) = playlist else {
            panic!("expected a media playlist");
        };
        assert_eq!(media.segments.len(), 2);
        assert!(
            media.segments[0]
                .uri
                .starts_with("http://relay.local/hls-proxy/segment?url=")
        );
    }
}
