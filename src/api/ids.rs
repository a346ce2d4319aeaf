//! Normalization of user- or model-supplied ids, URIs and URLs

use url::Url;

const VIDEO_ID_LEN: usize = 11;
const PLAYLIST_ID_LEN: usize = 34;
const PLAYLIST_PREFIXES: [&str; 5] = ["PL", "RD", "OL", "LM", "VL"];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_loose_url(input: &str) -> Option<Url> {
    Url::parse(input)
        .ok()
        .or_else(|| Url::parse(&format!("https://{}", input)).ok())
        .filter(|u| u.host_str().is_some())
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Video id from a raw id or a YouTube / YouTube Music URL.
pub fn normalize_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.len() == VIDEO_ID_LEN && input.chars().all(is_id_char) {
        return Some(input.to_string());
    }

    let url = parse_loose_url(input)?;
    let host = url.host_str()?.trim_start_matches("www.");
    let candidate = match host {
        "youtu.be" => url.path_segments()?.next()?.to_string(),
        h if h.ends_with("youtube.com") => query_param(&url, "v")?,
        _ => return None,
    };

    let id: String = candidate.chars().take_while(|&c| is_id_char(c)).collect();
    (id.len() >= VIDEO_ID_LEN).then(|| id[..VIDEO_ID_LEN].to_string())
}

fn is_playlist_id(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(is_id_char)
        && (s.len() == PLAYLIST_ID_LEN || PLAYLIST_PREFIXES.iter().any(|p| s.starts_with(p)))
}

/// Playlist id from a raw id or a YouTube / YouTube Music playlist URL.
/// A `VL` browse prefix is removed.
pub fn normalize_playlist_id(input: &str) -> Option<String> {
    let input = input.trim();
    let id = if is_playlist_id(input) {
        input.to_string()
    } else {
        let url = parse_loose_url(input)?;
        if !url.host_str()?.ends_with("youtube.com") {
            return None;
        }
        let list = query_param(&url, "list")?;
        if !is_playlist_id(&list) {
            return None;
        }
        list
    };

    match id.strip_prefix("VL") {
        Some(rest) if !rest.is_empty() => Some(rest.to_string()),
        _ => Some(id),
    }
}

/// Spotify URI (`spotify:<type>:<id>`) from a URI or an open.spotify.com URL.
pub fn spotify_uri(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(rest) = input.strip_prefix("spotify:") {
        let mut parts = rest.split(':');
        let (kind, id) = (parts.next()?, parts.next()?);
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        return Some(input.to_string());
    }

    let url = parse_loose_url(input)?;
    if url.host_str()? != "open.spotify.com" {
        return None;
    }
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|s| !s.is_empty() && !s.starts_with("intl-"))
        .collect();
    match segments.as_slice() {
        [kind, id, ..] => Some(format!("spotify:{}:{}", kind, id)),
        _ => None,
    }
}

/// Spotify playlist id from a raw id, a playlist URI or a playlist URL.
pub fn spotify_playlist_id(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(input.to_string());
    }
    let uri = spotify_uri(input)?;
    uri.strip_prefix("spotify:playlist:").map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_ids() {
        assert_eq!(normalize_video_id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            normalize_video_id("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVM").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            normalize_video_id("https://youtu.be/dQw4w9WgXcQ?t=4").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            normalize_video_id("www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(normalize_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(normalize_video_id("short"), None);
        assert_eq!(normalize_video_id(""), None);
    }

    #[test]
    fn test_playlist_ids() {
        let pl = "PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI";
        assert_eq!(normalize_playlist_id(pl).as_deref(), Some(pl));
        assert_eq!(
            normalize_playlist_id(&format!("https://music.youtube.com/playlist?list={}", pl))
                .as_deref(),
            Some(pl)
        );
        assert_eq!(normalize_playlist_id(&format!("VL{}", pl)).as_deref(), Some(pl));
        assert_eq!(normalize_playlist_id("LM").as_deref(), Some("LM"));
        assert_eq!(normalize_playlist_id("not a playlist"), None);
        assert_eq!(normalize_playlist_id("https://example.com/?list=PLabc"), None);
    }

    #[test]
    fn test_spotify_uris() {
        assert_eq!(
            spotify_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC").as_deref(),
            Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(
            spotify_uri("https://open.spotify.com/intl-de/track/4uLU6hMCjMI75M1A2tKUQC?si=x")
                .as_deref(),
            Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(spotify_uri("spotify:"), None);
        assert_eq!(spotify_uri("https://example.com/track/1"), None);
    }

    #[test]
    fn test_spotify_playlist_ids() {
        assert_eq!(
            spotify_playlist_id("37i9dQZF1DXcBWIGoYBM5M").as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        assert_eq!(
            spotify_playlist_id("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        assert_eq!(
            spotify_playlist_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M")
                .as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        assert_eq!(spotify_playlist_id("spotify:album:abc"), None);
    }
}
