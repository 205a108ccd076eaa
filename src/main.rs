//! Main entry point for the vidresolve CLI

use anyhow::{anyhow, Context};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidresolve::cli::{exit_code, Args, Command, OutputFormatter, VerbosityLevel};
use vidresolve::platform::formats::{select_stream, sort_streams_by_quality, stream_stats};
use vidresolve::platform::HttpTransport;
use vidresolve::{ResolveError, Resolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity_level())?;
    debug!("Starting vidresolve with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level(), args.json);

    let transport =
        HttpTransport::with_config(args.http_config()).context("failed to create HTTP client")?;
    let resolver = Resolver::with_options(Arc::new(transport), args.resolver_options())?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    if let Err(error) = run(&args, &resolver, &formatter, &token).await {
        formatter.error(&format!("{:#}", error));
        let code = error.downcast_ref::<ResolveError>().map_or(1, exit_code);
        std::process::exit(code);
    }
    Ok(())
}

async fn run(
    args: &Args,
    resolver: &Resolver,
    formatter: &OutputFormatter,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    match &args.command {
        Command::Info { input } => {
            let video = resolver.resolve_video(input, token).await?;
            if formatter.is_json() {
                return Ok(formatter.print_json(&video)?);
            }
            formatter.print_video_info(&video);
            let mut streams = video.streams.clone();
            sort_streams_by_quality(&mut streams);
            formatter.print_streams(&streams.iter().collect::<Vec<_>>());
        }

        Command::Exists { input } => {
            let exists = resolver.check_exists(input, token).await?;
            if formatter.is_json() {
                return Ok(formatter.print_json(&exists)?);
            }
            formatter.print_exists(input, exists);
        }

        Command::Playlist { input, .. } => {
            let playlist = resolver.resolve_playlist(input, token).await?;
            if formatter.is_json() {
                return Ok(formatter.print_json(&playlist)?);
            }
            formatter.print_playlist(&playlist);
        }

        Command::Captions { input, lang, at } => {
            let video = resolver.resolve_video(input, token).await?;
            let info = match lang {
                Some(lang) => video.caption_track(lang),
                None => video.caption_tracks.first(),
            }
            .ok_or_else(|| anyhow!("no caption track for {}", lang.as_deref().unwrap_or(input)))?;
            let track = resolver.fetch_caption_track(info, token).await?;

            match at {
                Some(offset) => match track.cue_at(**offset) {
                    Some(cue) if formatter.is_json() => formatter.print_json(cue)?,
                    Some(cue) => formatter.print_cue(cue),
                    None => formatter.warning(&format!("no cue at {}", offset)),
                },
                None if formatter.is_json() => formatter.print_json(&track)?,
                None => formatter.print_caption_track(&track),
            }
        }

        Command::Streams { input, print_url, .. } => {
            let video = resolver.resolve_video(input, token).await?;

            if let Some(selector) = args.stream_selector() {
                let stream = select_stream(&video.streams, &selector)
                    .ok_or_else(|| anyhow!("no stream matches the selection"))?;
                if *print_url {
                    println!("{}", stream.url);
                } else if formatter.is_json() {
                    formatter.print_json(stream)?;
                } else {
                    formatter.print_stream(stream);
                }
                return Ok(());
            }

            let streams = filtered_streams(args, &video.streams);
            if formatter.is_json() {
                return Ok(formatter.print_json(&streams)?);
            }
            formatter.print_streams(&streams);
            formatter.print_stream_stats(&stream_stats(&video.streams));
        }
    }
    Ok(())
}

/// Streams matching the kind, container and quality filters, best first
fn filtered_streams<'a>(
    args: &Args,
    streams: &'a [vidresolve::StreamInfo],
) -> Vec<&'a vidresolve::StreamInfo> {
    use vidresolve::platform::formats::{streams_by_container, streams_by_kind};

    let Command::Streams {
        kind,
        container,
        max_quality,
        ..
    } = &args.command
    else {
        return streams.iter().collect();
    };

    let mut selected = match kind {
        Some(kind) => streams_by_kind(streams, (*kind).into()),
        None => streams.iter().collect(),
    };
    if let Some(container) = container {
        let allowed = streams_by_container(streams, (*container).into());
        selected.retain(|s| allowed.iter().any(|a| a.itag == s.itag));
    }
    if let Some(max) = max_quality {
        selected.retain(|s| s.quality <= *max);
    }
    selected.sort_by(|a, b| (b.quality, b.size).cmp(&(a.quality, a.size)));
    selected
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()
        .context("failed to initialize logging")?;

    Ok(())
}
