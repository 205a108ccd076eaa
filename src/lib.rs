//! # vidresolve
//!
//! Resolve video and playlist identifiers into directly playable stream
//! URLs, metadata and captions.
//!
//! ## Features
//!
//! - Metadata extraction from watch pages and the video info endpoint
//! - Signature deciphering from the player script, cached per player version
//! - DASH manifest streams merged with inline descriptors
//! - Caption tracks with time-based cue lookup
//! - Playlist listing
//! - Chunked, rate-limited stream reading
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vidresolve::{HttpTransport, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::new(Arc::new(HttpTransport::new()?))?;
//!     let video = resolver
//!         .resolve_video("dQw4w9WgXcQ", &CancellationToken::new())
//!         .await?;
//!     println!("{} ({} streams)", video.title, video.streams.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use core::{
    CaptionCue, CaptionTrack, CaptionTrackInfo, ContainerType, PlaylistInfo, Resolver,
    ResolverOptions, StreamInfo, StreamKind, VideoInfo, VideoQuality,
};
pub use download::MediaStream;
pub use error::{ResolveError, TransportError};
pub use platform::{
    CipherCache, CipherOperation, CipherProgram, HttpClientConfig, HttpTransport,
    PlayerVersionKey, Transport,
};

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;
