//! URL utilities for extracting and validating video and playlist IDs

use crate::error::ResolveError;
use crate::Result;
use url::Url;

/// Playlist ID prefixes used by the host for the different playlist kinds
const PLAYLIST_PREFIXES: &[&str] = &["PL", "RD", "UL", "UU", "PU", "OL", "LL", "FL", "WL"];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Check if a string is a well-formed video ID (11 URL-safe characters)
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11 && id.chars().all(is_id_char)
}

/// Check if a string is a well-formed playlist ID.
///
/// The watch-later and liked lists (`WL`, `LL`) are two characters long;
/// other playlists either carry a known prefix or are 13 to 42 characters.
pub fn is_valid_playlist_id(id: &str) -> bool {
    if id.len() < 2 || !id.chars().all(is_id_char) {
        return false;
    }
    PLAYLIST_PREFIXES.iter().any(|prefix| id.starts_with(prefix))
        || (13..=42).contains(&id.len())
}

fn is_video_host(host: Option<&str>) -> bool {
    matches!(
        host,
        Some("youtube.com") | Some("www.youtube.com") | Some("m.youtube.com")
    )
}

fn checked_video_id(candidate: &str, input: &str) -> Result<String> {
    if is_valid_video_id(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(ResolveError::InvalidVideoId(input.to_string()))
    }
}

/// Extract video ID from a raw ID or a watch, short, embed or youtu.be URL
pub fn extract_video_id(input: &str) -> Result<String> {
    let input = input.trim();
    if is_valid_video_id(input) {
        return Ok(input.to_string());
    }

    let parsed =
        Url::parse(input).map_err(|_| ResolveError::InvalidVideoId(input.to_string()))?;

    match parsed.host_str() {
        Some("youtu.be") => {
            let path = parsed.path().trim_start_matches('/');
            checked_video_id(path.split('/').next().unwrap_or_default(), input)
        }
        host if is_video_host(host) => {
            let path = parsed.path();
            if path.starts_with("/watch") {
                let id = parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.to_string())
                    .ok_or_else(|| ResolveError::InvalidVideoId(input.to_string()))?;
                checked_video_id(&id, input)
            } else if let Some(rest) = ["/shorts/", "/embed/", "/v/"]
                .iter()
                .find_map(|prefix| path.strip_prefix(prefix))
            {
                checked_video_id(rest.split('/').next().unwrap_or_default(), input)
            } else {
                Err(ResolveError::InvalidVideoId(input.to_string()))
            }
        }
        _ => Err(ResolveError::InvalidVideoId(input.to_string())),
    }
}

/// Extract playlist ID from a raw ID or any URL carrying a `list` parameter
pub fn extract_playlist_id(input: &str) -> Result<String> {
    let input = input.trim();

    match Url::parse(input) {
        Ok(parsed) => {
            let id = parsed
                .query_pairs()
                .find(|(key, _)| key == "list")
                .map(|(_, value)| value.to_string())
                .ok_or_else(|| ResolveError::InvalidPlaylistId(input.to_string()))?;
            if is_valid_playlist_id(&id) {
                Ok(id)
            } else {
                Err(ResolveError::InvalidPlaylistId(input.to_string()))
            }
        }
        Err(_) if is_valid_playlist_id(input) => Ok(input.to_string()),
        Err(_) => Err(ResolveError::InvalidPlaylistId(input.to_string())),
    }
}

/// Append `ratebypass=yes` unless the URL already carries it
pub fn with_rate_bypass(stream_url: &str) -> Result<String> {
    let mut parsed = Url::parse(stream_url)?;
    if !parsed.query_pairs().any(|(key, _)| key == "ratebypass") {
        parsed.query_pairs_mut().append_pair("ratebypass", "yes");
    }
    Ok(parsed.to_string())
}
