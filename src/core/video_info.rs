//! Video, stream, caption and playlist information structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Quality tier of a stream, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VideoQuality {
    Unknown,
    /// Audio-only stream
    NoVideo,
    Low144,
    Low240,
    Medium360,
    Medium480,
    High720,
    High1080,
    High1440,
    High2160,
    High2880,
    High3072,
    High4320,
}

impl VideoQuality {
    /// Tier for a frame height
    pub fn from_height(height: u32) -> Self {
        match height {
            0 => VideoQuality::Unknown,
            1..=144 => VideoQuality::Low144,
            145..=240 => VideoQuality::Low240,
            241..=360 => VideoQuality::Medium360,
            361..=480 => VideoQuality::Medium480,
            481..=720 => VideoQuality::High720,
            721..=1080 => VideoQuality::High1080,
            1081..=1440 => VideoQuality::High1440,
            1441..=2160 => VideoQuality::High2160,
            2161..=2880 => VideoQuality::High2880,
            2881..=3072 => VideoQuality::High3072,
            _ => VideoQuality::High4320,
        }
    }

    /// Parse a label such as `720p`, `1080p60` or `2160p HDR`
    pub fn from_label(label: &str) -> Self {
        let digits: String = label
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() || !label.trim()[digits.len()..].starts_with('p') {
            return VideoQuality::Unknown;
        }
        digits
            .parse()
            .map(Self::from_height)
            .unwrap_or(VideoQuality::Unknown)
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            VideoQuality::Unknown => "unknown",
            VideoQuality::NoVideo => "audio",
            VideoQuality::Low144 => "144p",
            VideoQuality::Low240 => "240p",
            VideoQuality::Medium360 => "360p",
            VideoQuality::Medium480 => "480p",
            VideoQuality::High720 => "720p",
            VideoQuality::High1080 => "1080p",
            VideoQuality::High1440 => "1440p",
            VideoQuality::High2160 => "2160p",
            VideoQuality::High2880 => "2880p",
            VideoQuality::High3072 => "3072p",
            VideoQuality::High4320 => "4320p",
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Container of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    Unknown,
    Mp4,
    M4A,
    WebM,
    TGpp,
    Flv,
    Ts,
}

impl ContainerType {
    /// File extension for the container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerType::Unknown => "bin",
            ContainerType::Mp4 => "mp4",
            ContainerType::M4A => "m4a",
            ContainerType::WebM => "webm",
            ContainerType::TGpp => "3gp",
            ContainerType::Flv => "flv",
            ContainerType::Ts => "ts",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Video and audio combined
    Muxed,
    VideoOnly,
    AudioOnly,
}

/// A resolved, directly playable stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Format code (itag)
    pub itag: u32,
    pub quality: VideoQuality,
    pub container: ContainerType,
    pub kind: StreamKind,
    /// Absolute URL with the signature already applied
    pub url: String,
    /// Declared quality label (e.g. "720p60")
    pub quality_label: String,
    pub extension: String,
    /// Size in bytes, always greater than zero
    pub size: u64,
}

impl StreamInfo {
    pub fn has_video(&self) -> bool {
        self.kind != StreamKind::AudioOnly
    }

    pub fn has_audio(&self) -> bool {
        self.kind != StreamKind::VideoOnly
    }

    pub fn is_muxed(&self) -> bool {
        self.kind == StreamKind::Muxed
    }
}

/// Reference to a caption track of a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrackInfo {
    pub url: String,
    /// Language code (e.g. "en")
    pub language: String,
    /// Display name (e.g. "English")
    pub name: String,
    pub is_auto_generated: bool,
}

/// Video information and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration: Duration,
    pub view_count: u64,
    pub average_rating: f64,
    /// Keywords; order is not significant
    pub keywords: Vec<String>,
    /// Watermark image URLs in source order
    pub watermarks: Vec<String>,
    pub has_closed_captions: bool,
    pub embedding_allowed: bool,
    pub is_listed: bool,
    pub rating_allowed: bool,
    pub is_muted: bool,
    pub streams: Vec<StreamInfo>,
    pub caption_tracks: Vec<CaptionTrackInfo>,
}

impl VideoInfo {
    /// Best stream of the requested kind
    pub fn best_stream(&self, kind: StreamKind) -> Option<&StreamInfo> {
        crate::platform::formats::best_stream(&self.streams, kind)
    }

    /// Stream with a given itag
    pub fn stream_by_itag(&self, itag: u32) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.itag == itag)
    }

    /// Caption track for a language code, preferring manual tracks
    pub fn caption_track(&self, language: &str) -> Option<&CaptionTrackInfo> {
        let mut matching = self
            .caption_tracks
            .iter()
            .filter(|t| t.language.eq_ignore_ascii_case(language));
        let first = matching.clone().next();
        matching.find(|t| !t.is_auto_generated).or(first)
    }

    /// Sum of all stream sizes
    pub fn total_size(&self) -> u64 {
        self.streams.iter().map(|s| s.size).sum()
    }
}

/// Playlist information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    /// Blank for mixes
    pub author: String,
    /// Blank for mixes
    pub description: String,
    pub view_count: u64,
    /// Video identifiers in playlist order
    pub video_ids: Vec<String>,
}

impl PlaylistInfo {
    /// Watch URL for the video at `index`
    pub fn video_url(&self, index: usize) -> Option<String> {
        self.video_ids
            .get(index)
            .map(|id| format!("https://www.youtube.com/watch?v={}&list={}", id, self.id))
    }
}
