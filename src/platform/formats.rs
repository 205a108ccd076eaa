//! Format code table and stream selection utilities

use crate::core::video_info::{ContainerType, StreamInfo, StreamKind, VideoQuality};
use crate::utils::mime::{container_from_mime, is_audio_mime, kind_from_mime};

/// What a format code (itag) denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatProfile {
    pub container: ContainerType,
    pub quality: VideoQuality,
    pub kind: StreamKind,
}

impl FormatProfile {
    const fn new(container: ContainerType, quality: VideoQuality, kind: StreamKind) -> Self {
        Self {
            container,
            quality,
            kind,
        }
    }

    fn muxed(container: ContainerType, quality: VideoQuality) -> Self {
        Self::new(container, quality, StreamKind::Muxed)
    }

    fn video(container: ContainerType, quality: VideoQuality) -> Self {
        Self::new(container, quality, StreamKind::VideoOnly)
    }

    fn audio(container: ContainerType) -> Self {
        Self::new(container, VideoQuality::NoVideo, StreamKind::AudioOnly)
    }
}

/// Look up a format code in the fixed table
pub fn lookup_itag(itag: u32) -> Option<FormatProfile> {
    use ContainerType::*;
    use VideoQuality::*;

    let profile = match itag {
        // Muxed
        5 | 6 => FormatProfile::muxed(Flv, Low240),
        13 | 17 => FormatProfile::muxed(TGpp, Low144),
        18 | 82 => FormatProfile::muxed(Mp4, Medium360),
        22 | 84 => FormatProfile::muxed(Mp4, High720),
        34 => FormatProfile::muxed(Flv, Medium360),
        35 => FormatProfile::muxed(Flv, Medium480),
        36 => FormatProfile::muxed(TGpp, Low240),
        37 | 85 => FormatProfile::muxed(Mp4, High1080),
        38 => FormatProfile::muxed(Mp4, High3072),
        43 | 100 => FormatProfile::muxed(WebM, Medium360),
        44 | 101 => FormatProfile::muxed(WebM, Medium480),
        45 | 102 => FormatProfile::muxed(WebM, High720),
        46 => FormatProfile::muxed(WebM, High1080),
        59 | 78 | 83 => FormatProfile::muxed(Mp4, Medium480),
        91 | 151 => FormatProfile::muxed(Ts, Low144),
        92 | 132 => FormatProfile::muxed(Ts, Low240),
        93 => FormatProfile::muxed(Ts, Medium360),
        94 => FormatProfile::muxed(Ts, Medium480),
        95 => FormatProfile::muxed(Ts, High720),
        96 => FormatProfile::muxed(Ts, High1080),

        // Video only, mp4
        160 | 394 => FormatProfile::video(Mp4, Low144),
        133 | 395 => FormatProfile::video(Mp4, Low240),
        134 | 396 => FormatProfile::video(Mp4, Medium360),
        135 | 212 | 397 => FormatProfile::video(Mp4, Medium480),
        136 | 298 | 398 => FormatProfile::video(Mp4, High720),
        137 | 299 | 399 => FormatProfile::video(Mp4, High1080),
        264 => FormatProfile::video(Mp4, High1440),
        266 => FormatProfile::video(Mp4, High2160),
        138 => FormatProfile::video(Mp4, High4320),

        // Video only, webm
        278 | 330 => FormatProfile::video(WebM, Low144),
        242 | 331 => FormatProfile::video(WebM, Low240),
        167 | 243 | 332 => FormatProfile::video(WebM, Medium360),
        168 | 218 | 219 | 244 | 245 | 246 | 333 => FormatProfile::video(WebM, Medium480),
        169 | 247 | 302 | 334 => FormatProfile::video(WebM, High720),
        170 | 248 | 303 | 335 => FormatProfile::video(WebM, High1080),
        271 | 308 | 336 => FormatProfile::video(WebM, High1440),
        313 | 315 | 337 => FormatProfile::video(WebM, High2160),
        272 => FormatProfile::video(WebM, High4320),

        // Audio only
        139 | 140 | 141 | 256 | 258 | 325 | 328 => FormatProfile::audio(M4A),
        171 | 172 | 249 | 250 | 251 => FormatProfile::audio(WebM),

        _ => return None,
    };
    Some(profile)
}

/// Classify a descriptor, falling back to its MIME type and quality label
/// for format codes missing from the table
pub fn classify(itag: u32, mime_type: &str, quality_label: &str) -> FormatProfile {
    if let Some(profile) = lookup_itag(itag) {
        return profile;
    }

    let container = container_from_mime(mime_type);
    let kind = kind_from_mime(mime_type).unwrap_or(StreamKind::Muxed);
    let quality = if is_audio_mime(mime_type) {
        VideoQuality::NoVideo
    } else {
        VideoQuality::from_label(quality_label)
    };
    FormatProfile::new(container, quality, kind)
}

/// Which stream to pick among the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualitySelector {
    #[default]
    Best,
    Worst,
    Itag(u32),
}

/// Criteria for choosing a stream
#[derive(Debug, Clone, Default)]
pub struct StreamSelector {
    pub kind: Option<StreamKind>,
    pub container: Option<ContainerType>,
    /// Upper bound on the quality tier
    pub max_quality: Option<VideoQuality>,
    pub quality: QualitySelector,
}

/// Select a stream based on selector criteria
pub fn select_stream<'a>(
    streams: &'a [StreamInfo],
    selector: &StreamSelector,
) -> Option<&'a StreamInfo> {
    let mut candidates: Vec<&StreamInfo> = streams.iter().collect();

    if let Some(kind) = selector.kind {
        candidates.retain(|s| s.kind == kind);
    }

    if let Some(container) = selector.container {
        candidates.retain(|s| s.container == container);
    }

    if let Some(max_quality) = selector.max_quality {
        candidates.retain(|s| s.quality <= max_quality);
    }

    match selector.quality {
        QualitySelector::Best => candidates.into_iter().max_by_key(|s| (s.quality, s.size)),
        QualitySelector::Worst => candidates.into_iter().min_by_key(|s| (s.quality, s.size)),
        QualitySelector::Itag(itag) => candidates.into_iter().find(|s| s.itag == itag),
    }
}

/// Get the best stream of a kind; size breaks ties within a tier
pub fn best_stream(streams: &[StreamInfo], kind: StreamKind) -> Option<&StreamInfo> {
    streams
        .iter()
        .filter(|s| s.kind == kind)
        .max_by_key(|s| (s.quality, s.size))
}

/// Get the worst stream of a kind
pub fn worst_stream(streams: &[StreamInfo], kind: StreamKind) -> Option<&StreamInfo> {
    streams
        .iter()
        .filter(|s| s.kind == kind)
        .min_by_key(|s| (s.quality, s.size))
}

/// Get streams by container type
pub fn streams_by_container(streams: &[StreamInfo], container: ContainerType) -> Vec<&StreamInfo> {
    streams.iter().filter(|s| s.container == container).collect()
}

/// Get streams by kind
pub fn streams_by_kind(streams: &[StreamInfo], kind: StreamKind) -> Vec<&StreamInfo> {
    streams.iter().filter(|s| s.kind == kind).collect()
}

/// Sort streams by quality (best first), then by size
pub fn sort_streams_by_quality(streams: &mut [StreamInfo]) {
    streams.sort_by(|a, b| (b.quality, b.size).cmp(&(a.quality, a.size)));
}

/// Stream statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub total_streams: usize,
    pub muxed_streams: usize,
    pub video_only_streams: usize,
    pub audio_only_streams: usize,
    pub total_size: u64,
    pub max_quality: Option<VideoQuality>,
}

/// Get stream statistics
pub fn stream_stats(streams: &[StreamInfo]) -> StreamStats {
    let mut stats = StreamStats::default();

    for stream in streams {
        stats.total_streams += 1;
        stats.total_size += stream.size;

        match stream.kind {
            StreamKind::Muxed => stats.muxed_streams += 1,
            StreamKind::VideoOnly => stats.video_only_streams += 1,
            StreamKind::AudioOnly => stats.audio_only_streams += 1,
        }

        if stream.has_video() && stats.max_quality.map_or(true, |q| stream.quality > q) {
            stats.max_quality = Some(stream.quality);
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(itag: u32, size: u64) -> StreamInfo {
        let profile = lookup_itag(itag).unwrap();
        StreamInfo {
            itag,
            quality: profile.quality,
            container: profile.container,
            kind: profile.kind,
            url: format!("http://example.com/{}", itag),
            quality_label: profile.quality.label().to_string(),
            extension: profile.container.extension().to_string(),
            size,
        }
    }

    fn create_test_streams() -> Vec<StreamInfo> {
        vec![
            stream(22, 100_000_000),
            stream(18, 50_000_000),
            stream(137, 200_000_000),
            stream(248, 180_000_000),
            stream(140, 5_000_000),
            stream(251, 6_000_000),
            stream(249, 2_000_000),
        ]
    }

    #[test]
    fn test_lookup_itag() {
        assert_eq!(
            lookup_itag(22),
            Some(FormatProfile::muxed(ContainerType::Mp4, VideoQuality::High720))
        );
        assert_eq!(
            lookup_itag(140),
            Some(FormatProfile::audio(ContainerType::M4A))
        );
        assert_eq!(lookup_itag(313).unwrap().kind, StreamKind::VideoOnly);
        assert_eq!(lookup_itag(36).unwrap().container, ContainerType::TGpp);
        assert!(lookup_itag(9999).is_none());
    }

    #[test]
    fn test_table_audio_entries_have_no_video_tier() {
        for itag in 0..1000 {
            if let Some(profile) = lookup_itag(itag) {
                assert_eq!(
                    profile.kind == StreamKind::AudioOnly,
                    profile.quality == VideoQuality::NoVideo,
                    "itag {}",
                    itag
                );
                assert_ne!(profile.container, ContainerType::Unknown);
                assert_ne!(profile.quality, VideoQuality::Unknown);
            }
        }
    }

    #[test]
    fn test_classify_falls_back_to_mime() {
        let profile = classify(9001, "video/webm; codecs=\"vp9\"", "1440p60");
        assert_eq!(profile.container, ContainerType::WebM);
        assert_eq!(profile.quality, VideoQuality::High1440);
        assert_eq!(profile.kind, StreamKind::VideoOnly);

        let audio = classify(9002, "audio/mp4; codecs=\"mp4a.40.5\"", "");
        assert_eq!(audio.quality, VideoQuality::NoVideo);
        assert_eq!(audio.kind, StreamKind::AudioOnly);

        let unknown = classify(9003, "", "");
        assert_eq!(unknown.container, ContainerType::Unknown);
        assert_eq!(unknown.quality, VideoQuality::Unknown);
    }

    #[test]
    fn test_classify_prefers_table() {
        let profile = classify(18, "video/webm", "1080p");
        assert_eq!(profile.container, ContainerType::Mp4);
        assert_eq!(profile.quality, VideoQuality::Medium360);
    }

    #[test]
    fn test_best_and_worst_stream() {
        let streams = create_test_streams();
        assert_eq!(best_stream(&streams, StreamKind::Muxed).unwrap().itag, 22);
        assert_eq!(worst_stream(&streams, StreamKind::Muxed).unwrap().itag, 18);
        assert_eq!(best_stream(&streams, StreamKind::VideoOnly).unwrap().itag, 137);
        assert_eq!(best_stream(&streams, StreamKind::AudioOnly).unwrap().itag, 251);
        assert_eq!(worst_stream(&streams, StreamKind::AudioOnly).unwrap().itag, 249);
        assert!(best_stream(&[], StreamKind::Muxed).is_none());
    }

    #[test]
    fn test_select_stream() {
        let streams = create_test_streams();

        let best = select_stream(&streams, &StreamSelector::default()).unwrap();
        assert_eq!(best.itag, 137);

        let selector = StreamSelector {
            container: Some(ContainerType::WebM),
            kind: Some(StreamKind::VideoOnly),
            ..Default::default()
        };
        assert_eq!(select_stream(&streams, &selector).unwrap().itag, 248);

        let capped = StreamSelector {
            max_quality: Some(VideoQuality::Medium480),
            kind: Some(StreamKind::Muxed),
            ..Default::default()
        };
        assert_eq!(select_stream(&streams, &capped).unwrap().itag, 18);

        let by_itag = StreamSelector {
            quality: QualitySelector::Itag(140),
            ..Default::default()
        };
        assert_eq!(select_stream(&streams, &by_itag).unwrap().itag, 140);

        let missing = StreamSelector {
            quality: QualitySelector::Itag(9999),
            ..Default::default()
        };
        assert!(select_stream(&streams, &missing).is_none());
    }

    #[test]
    fn test_streams_by_container_and_kind() {
        let streams = create_test_streams();
        assert_eq!(streams_by_container(&streams, ContainerType::WebM).len(), 3);
        assert_eq!(streams_by_container(&streams, ContainerType::Flv).len(), 0);
        assert_eq!(streams_by_kind(&streams, StreamKind::AudioOnly).len(), 3);
    }

    #[test]
    fn test_sort_streams_by_quality() {
        let mut streams = create_test_streams();
        sort_streams_by_quality(&mut streams);
        let order: Vec<u32> = streams.iter().map(|s| s.itag).collect();
        assert_eq!(order, vec![137, 248, 22, 18, 251, 140, 249]);
    }

    #[test]
    fn test_stream_stats() {
        let stats = stream_stats(&create_test_streams());
        assert_eq!(stats.total_streams, 7);
        assert_eq!(stats.muxed_streams, 2);
        assert_eq!(stats.video_only_streams, 2);
        assert_eq!(stats.audio_only_streams, 3);
        assert_eq!(stats.max_quality, Some(VideoQuality::High1080));
        assert_eq!(stats.total_size, 543_000_000);
        assert_eq!(stream_stats(&[]), StreamStats::default());
    }
}
