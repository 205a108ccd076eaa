//! Metadata extraction from watch pages and the video info endpoint
//!
//! Both sources reduce to a flat [`FieldMap`] of string values. The watch
//! page is the primary source; the video info document only fills keys the
//! primary lacks.

use crate::core::video_info::CaptionTrackInfo;
use crate::error::ResolveError;
use crate::platform::script::find_matching;
use crate::platform::streams::{parse_descriptor_list, RawDescriptor};
use crate::Result;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

/// Keys without which no usable video description can be built
pub const REQUIRED_FIELDS: &[&str] = &["title", "author", "length_seconds"];

/// Keys that carry stream descriptors; at least one is needed
pub const STREAM_FIELDS: &[&str] = &["url_encoded_fmt_stream_map", "adaptive_fmts", "dashmpd"];

/// Flat string view over one metadata source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: HashMap<String, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query-encoded document
    pub fn from_query(body: &str) -> Self {
        let fields = form_urlencoded::parse(body.trim().as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { fields }
    }

    /// Build from a JSON object, stringifying scalar values
    pub fn from_json(object: &serde_json::Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    Value::Bool(true) => "1".to_string(),
                    Value::Bool(false) => "0".to_string(),
                    other => other.to_string(),
                };
                Some((key.clone(), text))
            })
            .collect();
        Self { fields }
    }

    /// Non-blank value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy keys from `other` that are absent or blank here
    pub fn fill_missing(&mut self, other: &FieldMap) {
        for (key, value) in &other.fields {
            if !self.contains(key) && !value.trim().is_empty() {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// Required keys that are missing, including the stream key group
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|key| !self.contains(key))
            .collect();
        if !STREAM_FIELDS.iter().any(|key| self.contains(key)) {
            missing.push(STREAM_FIELDS[0]);
        }
        missing
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            _ => default,
        }
    }

    /// Nested player response document, if present and well formed
    pub fn player_response(&self) -> Option<Value> {
        let raw = self.get("player_response")?;
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed player_response: {}", e);
                None
            }
        }
    }

    /// Fill missing basic fields from `player_response.videoDetails`
    fn fill_from_player_response(&mut self) {
        let Some(response) = self.player_response() else {
            return;
        };
        let Some(details) = response.get("videoDetails").and_then(Value::as_object) else {
            return;
        };

        let mut from_details = FieldMap::new();
        for (source, target) in [
            ("title", "title"),
            ("author", "author"),
            ("lengthSeconds", "length_seconds"),
            ("viewCount", "view_count"),
            ("averageRating", "avg_rating"),
        ] {
            match details.get(source) {
                Some(Value::String(s)) => from_details.insert(target, s.clone()),
                Some(Value::Number(n)) => from_details.insert(target, n.to_string()),
                _ => {}
            }
        }
        if let Some(keywords) = details.get("keywords").and_then(Value::as_array) {
            let joined: Vec<&str> = keywords.iter().filter_map(Value::as_str).collect();
            from_details.insert("keywords", joined.join(","));
        }
        self.fill_missing(&from_details);
    }
}

/// Player configuration embedded in a watch page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPage {
    pub fields: FieldMap,
    /// Player script path from `assets.js`
    pub player_url: Option<String>,
}

/// Parse the `ytplayer.config` object out of a watch page.
///
/// A page without a player configuration is not an error: restricted videos
/// omit it and must be described by the video info endpoint instead.
pub fn parse_watch_page(html: &str) -> Result<Option<WatchPage>> {
    let marker = Regex::new(r"ytplayer\.config\s*=\s*\{")?;
    let Some(found) = marker.find(html) else {
        debug!("Watch page carries no player config");
        return Ok(None);
    };

    let open = found.end() - 1;
    let close = find_matching(html, open)
        .ok_or_else(|| ResolveError::Parse("unterminated player config".to_string()))?;
    let config: Value = serde_json::from_str(&html[open..=close])?;

    let mut fields = config
        .get("args")
        .and_then(Value::as_object)
        .map(FieldMap::from_json)
        .unwrap_or_default();
    fields.fill_from_player_response();

    let player_url = config
        .pointer("/assets/js")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Some(WatchPage { fields, player_url }))
}

/// Values read from the embed page that the video info request needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedPage {
    /// Signature timestamp of the current player
    pub sts: Option<String>,
    pub player_url: Option<String>,
}

/// Parse `"sts"` and `"js"` out of an embed page
pub fn parse_embed_page(html: &str) -> Result<EmbedPage> {
    let sts = Regex::new(r#""sts"\s*:\s*(\d+)"#)?
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let player_url = Regex::new(r#""js"\s*:\s*"([^"]+)""#)?
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"));

    Ok(EmbedPage { sts, player_url })
}

/// Parse the query-encoded video info document
pub fn parse_video_info(body: &str) -> FieldMap {
    let mut fields = FieldMap::from_query(body);
    fields.fill_from_player_response();
    fields
}

/// Fail if the fields describe an unavailable or restricted video
pub fn check_status(video_id: &str, fields: &FieldMap) -> Result<()> {
    check_status_with(video_id, fields, fields.player_response().as_ref())
}

fn check_status_with(
    video_id: &str,
    fields: &FieldMap,
    player_response: Option<&Value>,
) -> Result<()> {
    if fields.contains("ypc_vid") || fields.contains("ypc_video_rental_bar_text") {
        return Err(ResolveError::RequiresPurchase {
            video_id: video_id.to_string(),
            preview_video_id: fields.get("ypc_vid").map(str::to_string),
        });
    }

    if fields
        .get("status")
        .is_some_and(|s| s.eq_ignore_ascii_case("fail"))
    {
        let code = fields.get("errorcode").and_then(|c| c.parse().ok());
        let reason = fields.get("reason").unwrap_or_default();
        return Err(classify_failure(video_id, code, reason));
    }

    if let Some(playability) = player_response.and_then(|r| r.get("playabilityStatus")) {
        let status = playability
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if matches!(status, "ERROR" | "UNPLAYABLE") {
            let reason = playability
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(status);
            return Err(classify_failure(video_id, None, reason));
        }
    }

    Ok(())
}

/// Tell restriction apart from absence by the wording of the reason
fn classify_failure(video_id: &str, code: Option<u32>, reason: &str) -> ResolveError {
    let lower = reason.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |stems: &[&str]| words.iter().any(|w| stems.iter().any(|s| w.starts_with(s)));

    if mentions(&["country", "countries", "region"]) {
        ResolveError::RegionBlocked {
            video_id: video_id.to_string(),
            reason: reason.to_string(),
        }
    } else if mentions(&["purchase", "rent", "rental"]) {
        ResolveError::RequiresPurchase {
            video_id: video_id.to_string(),
            preview_video_id: None,
        }
    } else {
        ResolveError::VideoUnplayable {
            video_id: video_id.to_string(),
            code,
            reason: reason.to_string(),
        }
    }
}

/// Everything the metadata sources say about a video, before stream
/// descriptors are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration: Duration,
    pub view_count: u64,
    pub average_rating: f64,
    pub keywords: Vec<String>,
    pub watermarks: Vec<String>,
    pub has_closed_captions: bool,
    pub embedding_allowed: bool,
    pub is_listed: bool,
    pub rating_allowed: bool,
    pub is_muted: bool,
    /// Inline descriptors, muxed list first, in source order
    pub descriptors: Vec<RawDescriptor>,
    /// DASH manifest URL, possibly carrying a ciphered signature
    pub dash_manifest_url: Option<String>,
    pub caption_tracks: Vec<CaptionTrackInfo>,
}

/// Build [`VideoMetadata`] from merged fields.
///
/// Status is checked first. Malformed entries in list fields are skipped;
/// only a missing required field fails the extraction.
pub fn extract_metadata(video_id: &str, fields: &FieldMap) -> Result<VideoMetadata> {
    let player_response = fields.player_response();
    check_status_with(video_id, fields, player_response.as_ref())?;

    let required = |key: &'static str| {
        fields
            .get(key)
            .ok_or_else(|| ResolveError::Parse(format!("missing {} for video {}", key, video_id)))
    };
    let title = required("title")?.to_string();
    let author = required("author")?.to_string();
    let length_seconds: u64 = required("length_seconds")?
        .trim()
        .parse()
        .map_err(|_| ResolveError::Parse(format!("invalid length_seconds for {}", video_id)))?;

    let view_count = number_field(fields, "view_count").unwrap_or(0);
    let average_rating = fields
        .get("avg_rating")
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(0.0);

    let keywords = collect_entries("keywords", split_list(fields.get("keywords")), parse_keyword);
    let watermarks =
        collect_entries("watermark", split_list(fields.get("watermark")), parse_watermark);

    let mut descriptors = Vec::new();
    for key in ["url_encoded_fmt_stream_map", "adaptive_fmts"] {
        if let Some(list) = fields.get(key) {
            descriptors.extend(parse_descriptor_list(key, list));
        }
    }

    let mut caption_tracks = collect_entries(
        "caption_tracks",
        split_list(fields.get("caption_tracks")),
        parse_caption_track,
    );
    if caption_tracks.is_empty() {
        if let Some(response) = &player_response {
            caption_tracks = caption_tracks_from_player_response(response);
        }
    }

    debug!(
        "Extracted metadata for {}: {} descriptors, {} caption tracks",
        video_id,
        descriptors.len(),
        caption_tracks.len()
    );

    Ok(VideoMetadata {
        id: video_id.to_string(),
        title,
        author,
        duration: Duration::from_secs(length_seconds),
        view_count,
        average_rating,
        keywords,
        watermarks,
        has_closed_captions: fields.flag("has_cc", false) || !caption_tracks.is_empty(),
        embedding_allowed: fields.flag("allow_embed", true),
        is_listed: fields.flag("is_listed", true),
        rating_allowed: fields.flag("allow_ratings", true),
        is_muted: fields.flag("muted", false),
        descriptors,
        dash_manifest_url: fields.get("dashmpd").map(str::to_string),
        caption_tracks,
    })
}

fn number_field(fields: &FieldMap, key: &str) -> Option<u64> {
    let raw = fields.get(key)?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Skipping malformed {} value {:?}", key, raw);
            None
        }
    }
}

/// Comma-separated entries. Blank entries, such as the leading empty
/// watermark, are placeholders rather than malformed data.
fn split_list(value: Option<&str>) -> Vec<&str> {
    value
        .map(|v| v.split(',').filter(|entry| !entry.trim().is_empty()).collect())
        .unwrap_or_default()
}

/// Keep the successes of a per-entry parse, logging each skipped entry
pub(crate) fn collect_entries<I, T, F>(field: &'static str, entries: I, mut parse: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<T>,
{
    let mut parsed = Vec::new();
    for entry in entries {
        match parse(entry) {
            Ok(value) => parsed.push(value),
            Err(e) => warn!("Skipping malformed {} entry: {}", field, e),
        }
    }
    parsed
}

fn parse_keyword(raw: &str) -> Result<String> {
    let keyword = raw.trim();
    if keyword.is_empty() || keyword.chars().any(char::is_control) {
        return Err(ResolveError::malformed("keywords", format!("{:?}", raw)));
    }
    Ok(keyword.to_string())
}

fn parse_watermark(raw: &str) -> Result<String> {
    let candidate = raw.trim();
    let candidate = match candidate.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => candidate.to_string(),
    };
    let parsed = Url::parse(&candidate)
        .map_err(|e| ResolveError::malformed("watermark", format!("{:?}: {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ResolveError::malformed(
            "watermark",
            format!("unsupported scheme in {:?}", raw),
        ));
    }
    Ok(parsed.to_string())
}

fn parse_caption_track(record: &str) -> Result<CaptionTrackInfo> {
    let fields = FieldMap::from_query(record);
    let url = fields
        .get("u")
        .ok_or_else(|| ResolveError::malformed("caption_tracks", "missing url"))?;
    let language = fields
        .get("lc")
        .ok_or_else(|| ResolveError::malformed("caption_tracks", "missing language code"))?;
    let kind = fields.get("k").or_else(|| fields.get("v")).unwrap_or_default();

    Ok(CaptionTrackInfo {
        url: url.to_string(),
        language: language.to_string(),
        name: fields.get("n").unwrap_or(language).to_string(),
        is_auto_generated: kind.starts_with("a.") || kind == "asr",
    })
}

fn caption_tracks_from_player_response(response: &Value) -> Vec<CaptionTrackInfo> {
    let tracks = response
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    collect_entries("captionTracks", tracks, |track| {
        let url = track
            .get("baseUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolveError::malformed("captionTracks", "missing baseUrl"))?;
        let language = track
            .get("languageCode")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolveError::malformed("captionTracks", "missing languageCode"))?;
        let name = track
            .pointer("/name/simpleText")
            .and_then(Value::as_str)
            .unwrap_or(language);

        Ok(CaptionTrackInfo {
            url: url.to_string(),
            language: language.to_string(),
            name: name.to_string(),
            is_auto_generated: track.get("kind").and_then(Value::as_str) == Some("asr"),
        })
    })
}
