//! Output formatting for resolved videos, streams, playlists and captions

use crate::cli::args::VerbosityLevel;
use crate::core::caption::{CaptionCue, CaptionTrack};
use crate::core::video_info::{PlaylistInfo, StreamInfo, VideoInfo};
use crate::platform::formats::StreamStats;
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;

/// Output formatter for the command line
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    json: bool,
}

impl OutputFormatter {
    pub fn new(verbosity: VerbosityLevel, json: bool) -> Self {
        Self { verbosity, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn visible(&self) -> bool {
        self.verbosity != VerbosityLevel::Quiet
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.visible() {
            println!("{} {}", "info:".cyan().bold(), message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.visible() {
            println!("{} {}", "ok:".green().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.visible() {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Print any result as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print video information
    pub fn print_video_info(&self, video: &VideoInfo) {
        println!("{}", video.title.bold());
        println!("  {} {}", "id:".dimmed(), video.id);
        println!("  {} {}", "author:".dimmed(), video.author);
        println!("  {} {}", "duration:".dimmed(), format_duration(video.duration));
        println!("  {} {}", "views:".dimmed(), video.view_count);
        println!("  {} {:.2}", "rating:".dimmed(), video.average_rating);
        if !video.keywords.is_empty() {
            println!("  {} {}", "keywords:".dimmed(), video.keywords.join(", "));
        }
        if self.verbosity == VerbosityLevel::Verbose {
            println!(
                "  {} embeddable={} listed={} ratings={} muted={} captions={}",
                "flags:".dimmed(),
                video.embedding_allowed,
                video.is_listed,
                video.rating_allowed,
                video.is_muted,
                video.has_closed_captions
            );
            for watermark in &video.watermarks {
                println!("  {} {}", "watermark:".dimmed(), watermark);
            }
        }
        for track in &video.caption_tracks {
            let auto = if track.is_auto_generated { " (auto)" } else { "" };
            println!(
                "  {} {} {}{}",
                "captions:".dimmed(),
                track.language,
                track.name,
                auto
            );
        }
        println!();
    }

    /// Print one line per stream
    pub fn print_streams(&self, streams: &[&StreamInfo]) {
        for stream in streams {
            self.print_stream(stream);
        }
    }

    /// Print format information
    pub fn print_stream(&self, stream: &StreamInfo) {
        println!(
            "  itag={:<4} {:<8} {:<5} {:<10} {:>10}",
            stream.itag.to_string().bold(),
            stream.quality_label,
            stream.extension,
            format!("{:?}", stream.kind),
            format_bytes(stream.size)
        );
        if self.verbosity == VerbosityLevel::Verbose {
            println!("    {}", stream.url.dimmed());
        }
    }

    /// Print stream statistics
    pub fn print_stream_stats(&self, stats: &StreamStats) {
        if !self.visible() {
            return;
        }
        let best = stats
            .max_quality
            .map(|q| q.label().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} streams ({} muxed, {} video, {} audio), best {}, {} total",
            stats.total_streams,
            stats.muxed_streams,
            stats.video_only_streams,
            stats.audio_only_streams,
            best,
            format_bytes(stats.total_size)
        );
    }

    /// Print playlist information
    pub fn print_playlist(&self, playlist: &PlaylistInfo) {
        println!("{}", playlist.title.bold());
        println!("  {} {}", "id:".dimmed(), playlist.id);
        if !playlist.author.is_empty() {
            println!("  {} {}", "author:".dimmed(), playlist.author);
        }
        println!("  {} {}", "views:".dimmed(), playlist.view_count);
        println!("  {} {}", "videos:".dimmed(), playlist.video_ids.len());
        println!();

        let total = playlist.video_ids.len();
        for (index, id) in playlist.video_ids.iter().enumerate() {
            println!("[{}/{}] {}", index + 1, total, id);
        }
    }

    /// Print every cue of a caption track
    pub fn print_caption_track(&self, track: &CaptionTrack) {
        if self.visible() {
            println!(
                "{} {} ({} cues, {})",
                "captions:".dimmed(),
                track.info.language,
                track.len(),
                format_duration(track.duration())
            );
        }
        for cue in track.cues() {
            self.print_cue(cue);
        }
    }

    pub fn print_cue(&self, cue: &CaptionCue) {
        println!(
            "{} --> {}",
            format_timestamp(cue.start).cyan(),
            format_timestamp(cue.end()).cyan()
        );
        println!("{}", cue.text);
        println!();
    }

    pub fn print_exists(&self, video_id: &str, exists: bool) {
        if exists {
            println!("{} {}", video_id, "exists".green());
        } else {
            println!("{} {}", video_id, "does not exist".red());
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let (hours, minutes, seconds) = (
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
    );

    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{}s", s),
        (0, m, 0) => format!("{}m", m),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, 0, _) => format!("{}h", h),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}

/// `HH:MM:SS.mmm` cue timestamp
pub fn format_timestamp(offset: Duration) -> String {
    let total = offset.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        offset.subsec_millis()
    )
}
