//! Caption documents and time-based cue lookup

use crate::core::video_info::CaptionTrackInfo;
use crate::error::ResolveError;
use crate::platform::metadata::collect_entries;
use crate::Result;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One timed caption entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionCue {
    /// Offset from the start of the track
    pub start: Duration,
    pub duration: Duration,
    /// Text, possibly spanning several lines
    pub text: String,
}

impl CaptionCue {
    pub fn new(start: Duration, duration: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            text: text.into(),
        }
    }

    /// End of the cue interval (exclusive)
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    fn contains(&self, offset: Duration) -> bool {
        self.start <= offset && offset < self.end()
    }
}

/// Caption cues of one track, sorted by start and non-overlapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub info: CaptionTrackInfo,
    cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    /// Index cues in any order.
    ///
    /// Cues are stable-sorted by start, then each one is clipped to end no
    /// later than the start of the next.
    pub fn new(info: CaptionTrackInfo, mut cues: Vec<CaptionCue>) -> Self {
        cues.sort_by_key(|cue| cue.start);
        for i in 1..cues.len() {
            let next_start = cues[i].start;
            let previous = &mut cues[i - 1];
            if previous.end() > next_start {
                previous.duration = next_start - previous.start;
            }
        }
        Self { info, cues }
    }

    pub fn cues(&self) -> &[CaptionCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Cue whose `[start, start + duration)` contains `offset`
    pub fn cue_at(&self, offset: Duration) -> Option<&CaptionCue> {
        let index = self.cues.partition_point(|cue| cue.start <= offset);
        let candidate = self.cues.get(index.checked_sub(1)?)?;
        candidate.contains(offset).then_some(candidate)
    }

    /// Total span from zero to the end of the last cue
    pub fn duration(&self) -> Duration {
        self.cues.last().map(CaptionCue::end).unwrap_or_default()
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ResolveError::Parse(format!("selector {}: {}", css, e)))
}

fn seconds_attr(element: &ElementRef<'_>, name: &str) -> Result<Duration> {
    let raw = element
        .attr(name)
        .ok_or_else(|| ResolveError::malformed("caption cue", format!("missing {}", name)))?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ResolveError::malformed("caption cue", format!("invalid {} {:?}", name, raw)))
}

fn millis_attr(element: &ElementRef<'_>, name: &str) -> Result<Duration> {
    let raw = element
        .attr(name)
        .ok_or_else(|| ResolveError::malformed("caption cue", format!("missing {}", name)))?;
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ResolveError::malformed("caption cue", format!("invalid {} {:?}", name, raw)))
}

/// Text content with `<br>` turned into line breaks
fn cue_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(nested) = ElementRef::wrap(child) {
                    cue_text(nested, out);
                }
            }
            _ => {}
        }
    }
}

/// Decode entities that were escaped twice, e.g. `&amp;#39;`. Literal
/// markup left by the first pass is kept as text.
fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn parse_cue(element: ElementRef<'_>) -> Result<Option<CaptionCue>> {
    let (start, duration) = if element.value().name() == "p" {
        (millis_attr(&element, "t")?, millis_attr(&element, "d")?)
    } else {
        (seconds_attr(&element, "start")?, seconds_attr(&element, "dur")?)
    };

    let mut raw = String::new();
    cue_text(element, &mut raw);
    let text = decode_entities(&raw).trim().to_string();

    Ok((!text.is_empty()).then(|| CaptionCue::new(start, duration, text)))
}

/// Parse a caption document into a track.
///
/// Accepts the `<transcript><text start dur>` form (seconds) and the
/// `<timedtext><body><p t d>` form (milliseconds). Blank cues are dropped and
/// cues with bad timing are skipped.
pub fn parse_caption_document(xml: &str, info: CaptionTrackInfo) -> Result<CaptionTrack> {
    let document = Html::parse_document(xml);
    let timed = selector("text, p")?;
    let roots = selector("transcript, timedtext")?;

    let elements: Vec<ElementRef<'_>> = document.select(&timed).collect();
    if elements.is_empty() && document.select(&roots).next().is_none() {
        return Err(ResolveError::Parse(format!(
            "not a caption document: {}",
            info.url
        )));
    }

    let cues: Vec<CaptionCue> = collect_entries("caption cue", elements, parse_cue)
        .into_iter()
        .flatten()
        .collect();
    debug!("Parsed {} cues for caption track {}", cues.len(), info.language);

    Ok(CaptionTrack::new(info, cues))
}
