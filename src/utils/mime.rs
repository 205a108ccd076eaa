//! MIME type utilities for classifying stream descriptors

use crate::core::video_info::{ContainerType, StreamKind};

/// Strip codec parameters: `video/mp4; codecs="avc1.4d401e"` -> `video/mp4`
pub fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

/// Codec list declared in a MIME type, if any
pub fn codecs(mime_type: &str) -> Vec<String> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(|codec| codec.trim().to_string())
        .filter(|codec| !codec.is_empty())
        .collect()
}

/// Get container from MIME type
pub fn container_from_mime(mime_type: &str) -> ContainerType {
    match essence(mime_type).to_ascii_lowercase().as_str() {
        "video/mp4" => ContainerType::Mp4,
        "audio/mp4" => ContainerType::M4A,
        "video/webm" | "audio/webm" => ContainerType::WebM,
        "video/3gpp" => ContainerType::TGpp,
        "video/x-flv" => ContainerType::Flv,
        "video/mp2t" => ContainerType::Ts,
        _ => ContainerType::Unknown,
    }
}

/// Check if MIME type is a video format
pub fn is_video_mime(mime_type: &str) -> bool {
    essence(mime_type).starts_with("video/")
}

/// Check if MIME type is an audio format
pub fn is_audio_mime(mime_type: &str) -> bool {
    essence(mime_type).starts_with("audio/")
}

/// Guess stream kind from MIME type and codec list.
///
/// A video type with two codecs is muxed; with one it is video-only.
/// Without codec information the type alone cannot tell, so `None`.
pub fn kind_from_mime(mime_type: &str) -> Option<StreamKind> {
    if is_audio_mime(mime_type) {
        return Some(StreamKind::AudioOnly);
    }
    if !is_video_mime(mime_type) {
        return None;
    }
    match codecs(mime_type).len() {
        0 => None,
        1 => Some(StreamKind::VideoOnly),
        _ => Some(StreamKind::Muxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_essence() {
        assert_eq!(essence("video/mp4; codecs=\"avc1.4d401e\""), "video/mp4");
        assert_eq!(essence("audio/webm"), "audio/webm");
        assert_eq!(essence(""), "");
    }

    #[test]
    fn test_codecs() {
        assert_eq!(
            codecs("video/mp4; codecs=\"avc1.42001E, mp4a.40.2\""),
            vec!["avc1.42001E", "mp4a.40.2"]
        );
        assert_eq!(codecs("audio/webm; codecs=\"opus\""), vec!["opus"]);
        assert!(codecs("video/mp4").is_empty());
    }

    #[test]
    fn test_container_from_mime() {
        assert_eq!(container_from_mime("video/mp4"), ContainerType::Mp4);
        assert_eq!(
            container_from_mime("audio/mp4; codecs=\"mp4a.40.2\""),
            ContainerType::M4A
        );
        assert_eq!(container_from_mime("video/webm"), ContainerType::WebM);
        assert_eq!(container_from_mime("audio/webm"), ContainerType::WebM);
        assert_eq!(container_from_mime("video/3gpp"), ContainerType::TGpp);
        assert_eq!(container_from_mime("video/x-flv"), ContainerType::Flv);
        assert_eq!(container_from_mime("Video/MP4"), ContainerType::Mp4);
        assert_eq!(container_from_mime("unknown/type"), ContainerType::Unknown);
    }

    #[test]
    fn test_is_video_mime() {
        assert!(is_video_mime("video/mp4"));
        assert!(is_video_mime("video/webm; codecs=\"vp9\""));
        assert!(!is_video_mime("audio/mp4"));
        assert!(!is_video_mime("text/plain"));
    }

    #[test]
    fn test_is_audio_mime() {
        assert!(is_audio_mime("audio/mp4"));
        assert!(!is_audio_mime("video/mp4"));
    }

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(
            kind_from_mime("video/mp4; codecs=\"avc1.42001E, mp4a.40.2\""),
            Some(StreamKind::Muxed)
        );
        assert_eq!(
            kind_from_mime("video/webm; codecs=\"vp9\""),
            Some(StreamKind::VideoOnly)
        );
        assert_eq!(kind_from_mime("audio/mp4"), Some(StreamKind::AudioOnly));
        assert_eq!(kind_from_mime("video/mp4"), None);
        assert_eq!(kind_from_mime("text/plain"), None);
    }
}
