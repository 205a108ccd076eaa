//! Stream descriptor parsing and resolution
//!
//! Descriptors come from the inline query-encoded lists and from the DASH
//! manifest. Each one is turned into a [`StreamInfo`] or dropped with a
//! recorded cause; resolution fails only when nothing is left.

use crate::core::video_info::{ContainerType, StreamInfo};
use crate::error::ResolveError;
use crate::platform::cipher::CipherProgram;
use crate::platform::formats::classify;
use crate::platform::metadata::{collect_entries, FieldMap};
use crate::utils::url::with_rate_bypass;
use crate::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Query parameter that carries a deciphered signature by default
const DEFAULT_SIGNATURE_PARAM: &str = "signature";

/// Where a descriptor was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSource {
    Muxed,
    Adaptive,
    Manifest,
}

/// One candidate stream before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDescriptor {
    pub itag: u32,
    pub url: String,
    /// Ciphered signature (`s`)
    pub signature: Option<String>,
    /// Signature that is already usable (`sig`)
    pub plain_signature: Option<String>,
    /// Name of the query parameter the signature goes into (`sp`)
    pub signature_param: Option<String>,
    pub mime_type: String,
    pub quality_label: String,
    pub content_length: Option<u64>,
    pub source: DescriptorSource,
}

impl RawDescriptor {
    /// The URL is unusable until the signature is deciphered
    pub fn needs_deciphering(&self) -> bool {
        self.signature.as_deref().is_some_and(|s| !s.is_empty())
    }
}

fn url_content_length(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(key, _)| key == "clen")
        .and_then(|(_, value)| value.parse().ok())
}

/// Parse one query-encoded descriptor record
pub fn parse_descriptor(record: &str, source: DescriptorSource) -> Result<RawDescriptor> {
    let fields = FieldMap::from_query(record);

    let itag = fields
        .get("itag")
        .ok_or_else(|| ResolveError::malformed("itag", "missing"))?;
    let itag: u32 = itag
        .parse()
        .map_err(|_| ResolveError::malformed("itag", format!("{:?} is not a number", itag)))?;

    let raw_url = fields
        .get("url")
        .ok_or_else(|| ResolveError::malformed("url", format!("missing for itag {}", itag)))?;
    let url = Url::parse(raw_url)
        .map_err(|e| ResolveError::malformed("url", format!("itag {}: {}", itag, e)))?;

    let content_length = fields
        .get("clen")
        .and_then(|c| c.parse().ok())
        .or_else(|| url_content_length(&url));

    Ok(RawDescriptor {
        itag,
        url: url.to_string(),
        signature: fields.get("s").map(str::to_string),
        plain_signature: fields.get("sig").map(str::to_string),
        signature_param: fields.get("sp").map(str::to_string),
        mime_type: fields.get("type").unwrap_or_default().to_string(),
        quality_label: fields.get("quality_label").unwrap_or_default().to_string(),
        content_length,
        source,
    })
}

/// Parse a comma-separated descriptor list, skipping malformed records
pub fn parse_descriptor_list(field: &'static str, list: &str) -> Vec<RawDescriptor> {
    let source = if field == "adaptive_fmts" {
        DescriptorSource::Adaptive
    } else {
        DescriptorSource::Muxed
    };
    collect_entries(
        field,
        list.split(',').filter(|r| !r.trim().is_empty()),
        |record| parse_descriptor(record, source),
    )
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ResolveError::Parse(format!("selector {}: {}", css, e)))
}

/// Attribute whose (lowercased) name ends with `suffix`, for namespaced
/// attributes such as `yt:contentLength`
fn attr_with_suffix<'a>(element: &ElementRef<'a>, suffix: &str) -> Option<&'a str> {
    element
        .value()
        .attrs()
        .find(|(name, _)| name.ends_with(suffix))
        .map(|(_, value)| value)
}

/// Parse the `Representation` entries of a DASH manifest
pub fn parse_dash_manifest(xml: &str) -> Result<Vec<RawDescriptor>> {
    let document = Html::parse_document(xml);
    let representations = selector("representation")?;
    let base_urls = selector("baseurl")?;
    let clen = Regex::new(r"/clen/(\d+)")?;

    let descriptors = collect_entries("dash representation", document.select(&representations), |rep| {
        let itag: u32 = rep
            .attr("id")
            .and_then(|id| id.trim().parse().ok())
            .ok_or_else(|| ResolveError::malformed("dash representation", "missing numeric id"))?;

        let base = rep
            .select(&base_urls)
            .next()
            .ok_or_else(|| ResolveError::malformed("dash representation", format!("itag {} has no BaseURL", itag)))?;
        let url: String = base.text().collect::<String>().trim().to_string();
        let url = Url::parse(&url)
            .map_err(|e| ResolveError::malformed("dash representation", format!("itag {}: {}", itag, e)))?;

        let content_length = attr_with_suffix(&base, "contentlength")
            .or_else(|| attr_with_suffix(&rep, "contentlength"))
            .and_then(|c| c.trim().parse().ok())
            .or_else(|| {
                clen.captures(url.as_str())
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok())
            });

        let adaptation_set = rep
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "adaptationset");
        let mime = rep
            .attr("mimetype")
            .or_else(|| adaptation_set.and_then(|set| set.attr("mimetype")))
            .unwrap_or_default();
        let mime_type = match rep.attr("codecs") {
            Some(codecs) if !mime.is_empty() => format!("{}; codecs=\"{}\"", mime, codecs),
            _ => mime.to_string(),
        };

        let quality_label = match rep.attr("height") {
            Some(height) => {
                let fps: u32 = rep
                    .attr("framerate")
                    .and_then(|f| f.parse().ok())
                    .unwrap_or(0);
                if fps > 30 {
                    format!("{}p{}", height, fps)
                } else {
                    format!("{}p", height)
                }
            }
            None => String::new(),
        };

        Ok(RawDescriptor {
            itag,
            url: url.to_string(),
            signature: None,
            plain_signature: None,
            signature_param: None,
            mime_type,
            quality_label,
            content_length,
            source: DescriptorSource::Manifest,
        })
    });

    debug!("Parsed {} DASH representations", descriptors.len());
    Ok(descriptors)
}

/// Ciphered signature embedded in a manifest URL as `/s/<sig>/`
pub fn manifest_signature(manifest_url: &str) -> Result<Option<String>> {
    let pattern = Regex::new(r"/s/([^/?#]+)")?;
    Ok(pattern
        .captures(manifest_url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Rewrite `/s/<sig>` into `/signature/<deciphered>`
pub fn decipher_manifest_url(manifest_url: &str, program: &CipherProgram) -> Result<String> {
    let Some(signature) = manifest_signature(manifest_url)? else {
        return Ok(manifest_url.to_string());
    };
    let deciphered = program.apply(&signature);
    Ok(manifest_url.replacen(
        &format!("/s/{}", signature),
        &format!("/signature/{}", deciphered),
        1,
    ))
}

/// Combine inline and manifest descriptors.
///
/// The first occurrence of each itag wins, so inline entries take precedence
/// and first-seen order is kept.
pub fn merge_descriptors(
    inline: Vec<RawDescriptor>,
    manifest: Vec<RawDescriptor>,
) -> Vec<RawDescriptor> {
    let mut seen = HashSet::new();
    inline
        .into_iter()
        .chain(manifest)
        .filter(|d| seen.insert(d.itag))
        .collect()
}

fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(name, value);
}

/// Final playable URL for a descriptor.
///
/// A ciphered descriptor needs `program`; its deciphered signature goes into
/// the parameter named by `sp`.
pub fn signed_url(descriptor: &RawDescriptor, program: Option<&CipherProgram>) -> Result<String> {
    let mut url = Url::parse(&descriptor.url)?;
    let param = descriptor
        .signature_param
        .as_deref()
        .unwrap_or(DEFAULT_SIGNATURE_PARAM);

    if descriptor.needs_deciphering() {
        let program = program.ok_or_else(|| {
            ResolveError::Parse(format!("no cipher program for itag {}", descriptor.itag))
        })?;
        let signature = descriptor.signature.as_deref().unwrap_or_default();
        set_query_param(&mut url, param, &program.apply(signature));
    } else if let Some(signature) = &descriptor.plain_signature {
        if !url.query_pairs().any(|(key, _)| key == param) {
            set_query_param(&mut url, param, signature);
        }
    }

    with_rate_bypass(url.as_str())
}

/// Byte size declared by the descriptor or its URL
pub fn declared_size(descriptor: &RawDescriptor, url: &str) -> Option<u64> {
    descriptor
        .content_length
        .or_else(|| Url::parse(url).ok().and_then(|u| url_content_length(&u)))
        .filter(|size| *size > 0)
}

/// Build the canonical stream record
pub fn build_stream(descriptor: &RawDescriptor, url: String, size: Option<u64>) -> Result<StreamInfo> {
    let size = size.filter(|s| *s > 0).ok_or_else(|| {
        ResolveError::malformed("size", format!("unknown size for itag {}", descriptor.itag))
    })?;
    let profile = classify(descriptor.itag, &descriptor.mime_type, &descriptor.quality_label);
    if profile.container == ContainerType::Unknown {
        return Err(ResolveError::malformed(
            "type",
            format!("unknown container for itag {}", descriptor.itag),
        ));
    }
    let quality_label = if descriptor.quality_label.is_empty() {
        profile.quality.label().to_string()
    } else {
        descriptor.quality_label.clone()
    };

    Ok(StreamInfo {
        itag: descriptor.itag,
        quality: profile.quality,
        container: profile.container,
        kind: profile.kind,
        url,
        quality_label,
        extension: profile.container.extension().to_string(),
        size,
    })
}

/// Accumulates resolved streams and dropped descriptors
#[derive(Debug)]
pub struct StreamCollector {
    video_id: String,
    streams: Vec<StreamInfo>,
    dropped: usize,
    last_cause: Option<ResolveError>,
}

impl StreamCollector {
    pub fn new(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            streams: Vec::new(),
            dropped: 0,
            last_cause: None,
        }
    }

    /// Keep a resolved stream or record why the descriptor was dropped
    pub fn record(&mut self, itag: u32, outcome: Result<StreamInfo>) {
        match outcome {
            Ok(stream) => self.streams.push(stream),
            Err(e) => {
                warn!("Dropping stream {} of {}: {}", itag, self.video_id, e);
                self.dropped += 1;
                self.last_cause = Some(e);
            }
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Resolved streams, or `NoStreamsAvailable` if none survived
    pub fn finish(self) -> Result<Vec<StreamInfo>> {
        if self.streams.is_empty() {
            return Err(ResolveError::NoStreamsAvailable {
                video_id: self.video_id,
                dropped: self.dropped,
                cause: self.last_cause.map(Box::new),
            });
        }
        debug!(
            "Resolved {} streams for {} ({} dropped)",
            self.streams.len(),
            self.video_id,
            self.dropped
        );
        Ok(self.streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video_info::{ContainerType, StreamKind, VideoQuality};
    use crate::platform::cipher::CipherOperation;
    use url::form_urlencoded;

    fn record(pairs: &[(&str, &str)]) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    fn descriptor(itag: u32, source: DescriptorSource) -> RawDescriptor {
        RawDescriptor {
            itag,
            url: format!("https://r1.example.com/videoplayback?itag={}", itag),
            signature: None,
            plain_signature: None,
            signature_param: None,
            mime_type: String::new(),
            quality_label: String::new(),
            content_length: Some(1000),
            source,
        }
    }

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:DASH:schema:MPD:2011" xmlns:yt="http://youtube.com/yt/2012/10/10">
  <Period>
    <AdaptationSet id="0" mimeType="audio/mp4" subsegmentAlignment="true">
      <Representation id="140" codecs="mp4a.40.2" audioSamplingRate="44100" bandwidth="130268">
        <AudioChannelConfiguration schemeIdUri="urn:mpeg:dash:23003:3:audio_channel_configuration:2011" value="2"/>
        <BaseURL yt:contentLength="9518437">https://r1.example.com/videoplayback/id/abc/itag/140/clen/9518437/signature/AAA.BBB/</BaseURL>
        <SegmentBase indexRange="592-1351"><Initialization range="0-591"/></SegmentBase>
      </Representation>
    </AdaptationSet>
    <AdaptationSet id="1" mimeType="video/mp4" subsegmentAlignment="true">
      <Representation id="137" codecs="avc1.640028" width="1920" height="1080" frameRate="60" bandwidth="4372230">
        <BaseURL>https://r1.example.com/videoplayback/id/abc/itag/137/clen/89400123/signature/CCC.DDD/</BaseURL>
      </Representation>
      <Representation id="bogus" codecs="avc1.4d400d" height="144">
        <BaseURL>https://r1.example.com/videoplayback/itag/160/</BaseURL>
      </Representation>
      <Representation id="133" codecs="avc1.4d4015" height="240">
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn test_parse_descriptor() {
        let raw = record(&[
            ("itag", "22"),
            ("url", "https://r1.example.com/videoplayback?itag=22&clen=5000"),
            ("s", "ABCDEF"),
            ("sp", "sig"),
            ("type", "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\""),
            ("quality_label", "720p"),
        ]);
        let d = parse_descriptor(&raw, DescriptorSource::Muxed).unwrap();
        assert_eq!(d.itag, 22);
        assert!(d.needs_deciphering());
        assert_eq!(d.signature_param.as_deref(), Some("sig"));
        assert_eq!(d.content_length, Some(5000));
        assert_eq!(d.mime_type, "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"");
    }

    #[test]
    fn test_parse_descriptor_rejects_malformed() {
        assert!(matches!(
            parse_descriptor("url=https%3A%2F%2Fexample.com", DescriptorSource::Muxed),
            Err(ResolveError::MalformedEntry { field: "itag", .. })
        ));
        assert!(matches!(
            parse_descriptor("itag=x&url=https%3A%2F%2Fexample.com", DescriptorSource::Muxed),
            Err(ResolveError::MalformedEntry { field: "itag", .. })
        ));
        assert!(matches!(
            parse_descriptor("itag=18", DescriptorSource::Muxed),
            Err(ResolveError::MalformedEntry { field: "url", .. })
        ));
    }

    #[test]
    fn test_parse_descriptor_list_skips_bad_records() {
        let list = [
            record(&[("itag", "18"), ("url", "https://example.com/a")]),
            record(&[("itag", "oops"), ("url", "https://example.com/b")]),
            record(&[("itag", "43"), ("url", "https://example.com/c")]),
        ]
        .join(",");
        let descriptors = parse_descriptor_list("adaptive_fmts", &list);
        let itags: Vec<u32> = descriptors.iter().map(|d| d.itag).collect();
        assert_eq!(itags, vec![18, 43]);
        assert!(descriptors
            .iter()
            .all(|d| d.source == DescriptorSource::Adaptive));
    }

    #[test]
    fn test_parse_dash_manifest() {
        let descriptors = parse_dash_manifest(MANIFEST).unwrap();
        let itags: Vec<u32> = descriptors.iter().map(|d| d.itag).collect();
        assert_eq!(itags, vec![140, 137]);

        let audio = &descriptors[0];
        assert_eq!(audio.content_length, Some(9518437));
        assert_eq!(audio.mime_type, "audio/mp4; codecs=\"mp4a.40.2\"");
        assert!(audio.url.contains("/itag/140/"));

        let video = &descriptors[1];
        assert_eq!(video.content_length, Some(89400123));
        assert_eq!(video.quality_label, "1080p60");
        assert_eq!(video.source, DescriptorSource::Manifest);
        assert!(!video.needs_deciphering());
    }

    #[test]
    fn test_manifest_signature() {
        let program = CipherProgram::new(vec![CipherOperation::Reverse]);
        let url = "https://manifest.example.com/api/manifest/dash/id/abc/s/12345.678/expire/1";
        assert_eq!(manifest_signature(url).unwrap().as_deref(), Some("12345.678"));
        assert_eq!(
            decipher_manifest_url(url, &program).unwrap(),
            "https://manifest.example.com/api/manifest/dash/id/abc/signature/876.54321/expire/1"
        );

        let plain = "https://manifest.example.com/api/manifest/dash/id/abc";
        assert_eq!(manifest_signature(plain).unwrap(), None);
        assert_eq!(decipher_manifest_url(plain, &program).unwrap(), plain);
    }

    #[test]
    fn test_merge_prefers_inline() {
        let mut inline_140 = descriptor(140, DescriptorSource::Adaptive);
        inline_140.content_length = Some(42);
        let merged = merge_descriptors(
            vec![descriptor(18, DescriptorSource::Muxed), inline_140],
            vec![
                descriptor(140, DescriptorSource::Manifest),
                descriptor(137, DescriptorSource::Manifest),
                descriptor(18, DescriptorSource::Manifest),
            ],
        );

        let itags: Vec<u32> = merged.iter().map(|d| d.itag).collect();
        assert_eq!(itags, vec![18, 140, 137]);
        assert_eq!(merged[1].content_length, Some(42));
        assert_eq!(merged[0].source, DescriptorSource::Muxed);
    }

    #[test]
    fn test_signed_url_deciphers_into_param() {
        let program = CipherProgram::new(vec![
            CipherOperation::Reverse,
            CipherOperation::SpliceFromIndex(1),
        ]);
        let mut d = descriptor(22, DescriptorSource::Muxed);
        d.signature = Some("ABCDEF".to_string());

        let url = signed_url(&d, Some(&program)).unwrap();
        assert_eq!(
            url,
            "https://r1.example.com/videoplayback?itag=22&signature=EDCBA&ratebypass=yes"
        );

        d.signature_param = Some("sig".to_string());
        let url = signed_url(&d, Some(&program)).unwrap();
        assert!(url.contains("&sig=EDCBA"));
        assert!(!url.contains("signature="));
    }

    #[test]
    fn test_signed_url_without_program_fails() {
        let mut d = descriptor(22, DescriptorSource::Muxed);
        d.signature = Some("ABCDEF".to_string());
        assert!(signed_url(&d, None).is_err());
    }

    #[test]
    fn test_signed_url_plain_signature() {
        let mut d = descriptor(18, DescriptorSource::Muxed);
        d.plain_signature = Some("PLAIN".to_string());
        let url = signed_url(&d, None).unwrap();
        assert!(url.contains("signature=PLAIN"));
        assert!(url.ends_with("ratebypass=yes"));
    }

    #[test]
    fn test_declared_size() {
        let mut d = descriptor(18, DescriptorSource::Muxed);
        d.content_length = None;
        assert_eq!(declared_size(&d, "https://example.com/v?clen=77"), Some(77));
        assert_eq!(declared_size(&d, "https://example.com/v"), None);
        d.content_length = Some(0);
        assert_eq!(declared_size(&d, "https://example.com/v"), None);
    }

    #[test]
    fn test_build_stream() {
        let mut d = descriptor(22, DescriptorSource::Muxed);
        d.quality_label = "720p".to_string();
        let stream = build_stream(&d, d.url.clone(), Some(1000)).unwrap();
        assert_eq!(stream.quality, VideoQuality::High720);
        assert_eq!(stream.container, ContainerType::Mp4);
        assert_eq!(stream.kind, StreamKind::Muxed);
        assert_eq!(stream.extension, "mp4");

        let audio = build_stream(&descriptor(251, DescriptorSource::Adaptive), String::new(), Some(5))
            .unwrap();
        assert_eq!(audio.quality_label, "audio");

        assert!(matches!(
            build_stream(&d, d.url.clone(), None),
            Err(ResolveError::MalformedEntry { field: "size", .. })
        ));
        assert!(build_stream(&d, d.url.clone(), Some(0)).is_err());
    }

    #[test]
    fn test_unknown_itag_is_kept() {
        let mut d = descriptor(9999, DescriptorSource::Adaptive);
        d.mime_type = "video/webm; codecs=\"av01\"".to_string();
        d.quality_label = "480p".to_string();
        let stream = build_stream(&d, d.url.clone(), Some(10)).unwrap();
        assert_eq!(stream.container, ContainerType::WebM);
        assert_eq!(stream.quality, VideoQuality::Medium480);

        d.mime_type = "application/octet-stream".to_string();
        assert!(matches!(
            build_stream(&d, d.url.clone(), Some(10)),
            Err(ResolveError::MalformedEntry { field: "type", .. })
        ));
    }

    #[test]
    fn test_collector() {
        let d = descriptor(18, DescriptorSource::Muxed);
        let mut collector = StreamCollector::new("abc");
        collector.record(18, build_stream(&d, d.url.clone(), Some(10)));
        collector.record(22, Err(ResolveError::CipherProgramNotFound { version: "v".into() }));
        assert_eq!(collector.dropped(), 1);
        assert_eq!(collector.finish().unwrap().len(), 1);
    }

    #[test]
    fn test_collector_all_dropped() {
        let mut collector = StreamCollector::new("abc");
        collector.record(22, Err(ResolveError::CipherProgramNotFound { version: "v".into() }));
        collector.record(43, Err(ResolveError::malformed("size", "unknown")));

        match collector.finish() {
            Err(ResolveError::NoStreamsAvailable { dropped, cause, .. }) => {
                assert_eq!(dropped, 2);
                assert!(matches!(cause.as_deref(), Some(ResolveError::MalformedEntry { .. })));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            StreamCollector::new("empty").finish(),
            Err(ResolveError::NoStreamsAvailable { dropped: 0, cause: None, .. })
        ));
    }
}
