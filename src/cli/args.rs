//! Command line argument parsing

use crate::core::resolver::ResolverOptions;
use crate::core::video_info::{ContainerType, StreamKind, VideoQuality};
use crate::platform::client::HttpClientConfig;
use crate::platform::formats::{QualitySelector, StreamSelector};
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

/// Resolve video and playlist identifiers into playable streams, metadata and captions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "30s", global = true)]
    pub timeout: humantime::Duration,

    /// HTTP retries for transient errors
    #[arg(long, default_value = "3", global = true)]
    pub retries: u32,

    /// Override User-Agent header
    #[arg(long, value_name = "USER_AGENT", global = true)]
    pub user_agent: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, value_name = "URL", global = true)]
    pub proxy: Option<String>,

    /// Force HTTP/1.1
    #[arg(long, global = true)]
    pub http1: bool,

    /// Interface language sent to the host
    #[arg(long, value_name = "LANG", default_value = "en", global = true)]
    pub hl: String,

    /// Host front end to query
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Do not probe the size of streams that do not declare one
    #[arg(long, global = true)]
    pub no_probe: bool,

    /// Stream read rate limit (e.g., 2MiB/s, 500KiB/s)
    #[arg(long, value_name = "RATE", global = true)]
    pub rate_limit: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show video metadata and resolved streams
    Info {
        /// Video URL or ID
        input: String,
    },

    /// Check whether a video exists
    Exists {
        /// Video URL or ID
        input: String,
    },

    /// List the videos of a playlist
    Playlist {
        /// Playlist URL or ID
        input: String,

        /// Max items to list (0 means all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Fetch a caption track
    Captions {
        /// Video URL or ID
        input: String,

        /// Caption language code (first track if omitted)
        #[arg(long, value_name = "LANG")]
        lang: Option<String>,

        /// Only print the cue shown at this offset (e.g., 1m 30s)
        #[arg(long, value_name = "DURATION")]
        at: Option<humantime::Duration>,
    },

    /// List or pick resolved streams
    Streams {
        /// Video URL or ID
        input: String,

        /// Only streams of this kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Only streams in this container
        #[arg(long, value_enum)]
        container: Option<ContainerArg>,

        /// Upper bound on quality (e.g., 720p)
        #[arg(long, value_name = "QUALITY", value_parser = parse_quality)]
        max_quality: Option<VideoQuality>,

        /// Pick a single stream instead of listing
        #[arg(long, value_enum, conflicts_with = "itag")]
        pick: Option<PickArg>,

        /// Pick the stream with this format code
        #[arg(long)]
        itag: Option<u32>,

        /// Print only the URL of the picked stream
        #[arg(short = 'g', long)]
        print_url: bool,
    },
}

impl Command {
    /// Video or playlist reference the command operates on
    pub fn input(&self) -> &str {
        match self {
            Command::Info { input }
            | Command::Exists { input }
            | Command::Playlist { input, .. }
            | Command::Captions { input, .. }
            | Command::Streams { input, .. } => input,
        }
    }
}

/// Stream kind filter
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum KindArg {
    /// Audio and video together
    Muxed,
    /// Video without audio
    Video,
    /// Audio without video
    Audio,
}

impl From<KindArg> for StreamKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Muxed => StreamKind::Muxed,
            KindArg::Video => StreamKind::VideoOnly,
            KindArg::Audio => StreamKind::AudioOnly,
        }
    }
}

/// Container filter
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ContainerArg {
    Mp4,
    M4a,
    Webm,
    #[value(name = "3gp")]
    Tgpp,
    Flv,
    Ts,
}

impl From<ContainerArg> for ContainerType {
    fn from(container: ContainerArg) -> Self {
        match container {
            ContainerArg::Mp4 => ContainerType::Mp4,
            ContainerArg::M4a => ContainerType::M4A,
            ContainerArg::Webm => ContainerType::WebM,
            ContainerArg::Tgpp => ContainerType::TGpp,
            ContainerArg::Flv => ContainerType::Flv,
            ContainerArg::Ts => ContainerType::Ts,
        }
    }
}

/// Which single stream to pick
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PickArg {
    Best,
    Worst,
}

fn parse_quality(label: &str) -> Result<VideoQuality, String> {
    let label = if label.ends_with('p') {
        label.to_string()
    } else {
        format!("{}p", label)
    };
    match VideoQuality::from_label(&label) {
        VideoQuality::Unknown => Err(format!("invalid quality {:?}, expected e.g. 720p", label)),
        quality => Ok(quality),
    }
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Parse rate limit string to bytes per second
    pub fn parse_rate_limit(&self) -> Option<u64> {
        self.rate_limit
            .as_ref()
            .and_then(|rate| parse_rate_limit(rate))
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Transport configuration from the global flags
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.timeout_duration(),
            max_retries: self.retries,
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy.clone(),
            http1_only: self.http1,
        }
    }

    /// Resolver options from the global flags and the command
    pub fn resolver_options(&self) -> ResolverOptions {
        let mut options = ResolverOptions::new()
            .with_language(&self.hl)
            .with_probe_content_length(!self.no_probe);
        if let Some(base_url) = &self.base_url {
            options = options.with_base_url(base_url);
        }
        if let Some(rate) = self.parse_rate_limit() {
            options = options.with_rate_limit(rate);
        }
        if let Command::Playlist { limit, .. } = &self.command {
            if *limit > 0 {
                options = options.with_playlist_limit(*limit);
            }
        }
        options
    }

    /// Stream selection criteria, if the command picks a single stream
    pub fn stream_selector(&self) -> Option<StreamSelector> {
        let Command::Streams {
            kind,
            container,
            max_quality,
            pick,
            itag,
            ..
        } = &self.command
        else {
            return None;
        };

        let quality = match (itag, pick) {
            (Some(itag), _) => QualitySelector::Itag(*itag),
            (None, Some(PickArg::Best)) => QualitySelector::Best,
            (None, Some(PickArg::Worst)) => QualitySelector::Worst,
            (None, None) => return None,
        };

        Some(StreamSelector {
            kind: kind.map(Into::into),
            container: container.map(Into::into),
            max_quality: *max_quality,
            quality,
        })
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl VerbosityLevel {
    /// Default tracing filter for this level
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

/// Parse rate limit string to bytes per second
pub fn parse_rate_limit(rate: &str) -> Option<u64> {
    let rate = rate.trim().to_uppercase();
    let rate = rate.trim_end_matches("/S");

    let split = rate
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rate.len());
    let (number, unit) = rate.split_at(split);

    let number: f64 = number.parse().ok()?;
    if number <= 0.0 {
        return None;
    }

    let multiplier: u64 = match unit.trim() {
        "B" | "" => 1,
        "KB" => 1000,
        "KIB" => 1024,
        "MB" => 1000 * 1000,
        "MIB" => 1024 * 1024,
        "GB" => 1000 * 1000 * 1000,
        "GIB" => 1024 * 1024 * 1024,
        _ => return None,
    };

    Some((number * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vidresolve").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_rate_limit() {
        assert_eq!(parse_rate_limit("1MB/s"), Some(1000 * 1000));
        assert_eq!(parse_rate_limit("1MiB/s"), Some(1024 * 1024));
        assert_eq!(parse_rate_limit("500KB/s"), Some(500 * 1000));
        assert_eq!(parse_rate_limit("1.5MB/s"), Some(1500 * 1000));
        assert_eq!(parse_rate_limit("1024"), Some(1024));
        assert_eq!(parse_rate_limit(" 1mb/S "), Some(1000 * 1000));
        assert_eq!(parse_rate_limit("0"), None);
        assert_eq!(parse_rate_limit(""), None);
        assert_eq!(parse_rate_limit("-1MB"), None);
        assert_eq!(parse_rate_limit("1XB"), None);
        assert_eq!(parse_rate_limit("invalid"), None);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["info", "dQw4w9WgXcQ"]);
        assert_eq!(
            args.command,
            Command::Info {
                input: "dQw4w9WgXcQ".to_string()
            }
        );
        assert_eq!(args.timeout_duration(), Duration::from_secs(30));
        assert_eq!(args.retries, 3);
        assert_eq!(args.hl, "en");
        assert!(!args.json);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);
        assert!(args.stream_selector().is_none());

        let options = args.resolver_options();
        assert!(options.probe_content_length);
        assert_eq!(options.playlist_limit, None);
        assert_eq!(options.rate_limit_bps, None);
    }

    #[test]
    fn test_global_flags() {
        let args = parse(&[
            "exists",
            "dQw4w9WgXcQ",
            "--timeout",
            "1m",
            "--retries",
            "5",
            "--proxy",
            "http://proxy:8080",
            "--http1",
            "--hl",
            "de",
            "--rate-limit",
            "2MiB/s",
            "--no-probe",
            "-q",
        ]);

        let config = args.http_config();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:8080"));
        assert!(config.http1_only);

        let options = args.resolver_options();
        assert_eq!(options.language, "de");
        assert_eq!(options.rate_limit_bps, Some(2 * 1024 * 1024));
        assert!(!options.probe_content_length);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Quiet);
    }

    #[test]
    fn test_playlist_limit() {
        let args = parse(&["playlist", "PLtest1234567", "--limit", "10"]);
        assert_eq!(args.command.input(), "PLtest1234567");
        assert_eq!(args.resolver_options().playlist_limit, Some(10));

        let args = parse(&["playlist", "PLtest1234567"]);
        assert_eq!(args.resolver_options().playlist_limit, None);
    }

    #[test]
    fn test_captions_at() {
        let args = parse(&["captions", "dQw4w9WgXcQ", "--lang", "fr", "--at", "1m 30s"]);
        match args.command {
            Command::Captions { lang, at, .. } => {
                assert_eq!(lang.as_deref(), Some("fr"));
                assert_eq!(at.map(Duration::from), Some(Duration::from_secs(90)));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_stream_selector() {
        let args = parse(&[
            "streams",
            "dQw4w9WgXcQ",
            "--kind",
            "muxed",
            "--container",
            "mp4",
            "--max-quality",
            "720",
            "--pick",
            "worst",
        ]);
        let selector = args.stream_selector().unwrap();
        assert_eq!(selector.kind, Some(StreamKind::Muxed));
        assert_eq!(selector.container, Some(ContainerType::Mp4));
        assert_eq!(selector.max_quality, Some(VideoQuality::High720));
        assert_eq!(selector.quality, QualitySelector::Worst);

        let args = parse(&["streams", "dQw4w9WgXcQ", "--itag", "22", "-g"]);
        assert_eq!(args.stream_selector().unwrap().quality, QualitySelector::Itag(22));

        let args = parse(&["streams", "dQw4w9WgXcQ", "--container", "3gp"]);
        assert!(args.stream_selector().is_none());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(Args::try_parse_from(["vidresolve"]).is_err());
        assert!(Args::try_parse_from(["vidresolve", "streams", "x", "--max-quality", "big"]).is_err());
        assert!(
            Args::try_parse_from(["vidresolve", "streams", "x", "--pick", "best", "--itag", "22"])
                .is_err()
        );
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(parse(&["info", "x", "-v"]).verbosity_level().log_filter(), "debug");
        assert_eq!(VerbosityLevel::Normal.log_filter(), "info");
    }
}
