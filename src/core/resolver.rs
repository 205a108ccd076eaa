//! Video, playlist and caption resolution against the host front end

use crate::core::caption::{parse_caption_document, CaptionTrack};
use crate::core::video_info::{CaptionTrackInfo, PlaylistInfo, StreamInfo, VideoInfo};
use crate::download::stream::{MediaStream, DEFAULT_CHUNK_SIZE};
use crate::error::ResolveError;
use crate::platform::cipher::{CipherProgram, PlayerVersionKey};
use crate::platform::client::Transport;
use crate::platform::extractor::CipherExtractor;
use crate::platform::metadata::{
    check_status, extract_metadata, parse_embed_page, parse_video_info, parse_watch_page,
    FieldMap, VideoMetadata, STREAM_FIELDS,
};
use crate::platform::playlist::{parse_playlist_page, playlist_page_url, PlaylistAccumulator};
use crate::platform::streams::{
    build_stream, declared_size, decipher_manifest_url, manifest_signature, merge_descriptors,
    parse_dash_manifest, signed_url, RawDescriptor, StreamCollector,
};
use crate::utils::cache::CipherCache;
use crate::utils::cancel::{ensure_active, run_cancellable};
use crate::utils::url::{extract_playlist_id, extract_video_id};
use crate::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Default host front end
pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Size probes in flight at once for one resolution
const MAX_CONCURRENT_PROBES: usize = 4;

/// Outcome of loading the cipher program for one resolution. Extraction
/// failures are kept so each ciphered descriptor can be dropped with them.
type ProgramOutcome = std::result::Result<Arc<CipherProgram>, ResolveError>;

/// Resolver options
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Host front end, without trailing slash
    pub base_url: String,
    /// Interface language sent as `hl`
    pub language: String,
    /// Bytes per range request when streaming
    pub chunk_size: u64,
    /// Optional stream rate limit in bytes per second
    pub rate_limit_bps: Option<u64>,
    /// Ask the transport for sizes the descriptors do not declare
    pub probe_content_length: bool,
    /// Stop listing a playlist after this many videos
    pub playlist_limit: Option<usize>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "en".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            rate_limit_bps: None,
            probe_content_length: true,
            playlist_limit: None,
        }
    }
}

impl ResolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_rate_limit(mut self, bytes_per_second: u64) -> Self {
        self.rate_limit_bps = Some(bytes_per_second);
        self
    }

    pub fn with_probe_content_length(mut self, probe: bool) -> Self {
        self.probe_content_length = probe;
        self
    }

    pub fn with_playlist_limit(mut self, limit: usize) -> Self {
        self.playlist_limit = Some(limit);
        self
    }
}

/// Resolves identifiers into playable streams and metadata.
///
/// Holds the cipher cache; clone the cache into other resolvers with
/// [`Resolver::with_cache`] to share extracted programs.
pub struct Resolver {
    transport: Arc<dyn Transport>,
    options: ResolverOptions,
    cache: CipherCache,
    extractor: Arc<CipherExtractor>,
}

impl Resolver {
    /// Create a resolver with default options
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_options(transport, ResolverOptions::default())
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: ResolverOptions) -> Result<Self> {
        Ok(Self {
            transport,
            options,
            cache: CipherCache::new(),
            extractor: Arc::new(CipherExtractor::new()?),
        })
    }

    pub fn with_cache(mut self, cache: CipherCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_extractor(mut self, extractor: CipherExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn cache(&self) -> &CipherCache {
        &self.cache
    }

    pub(crate) fn watch_url(&self, video_id: &str) -> String {
        format!(
            "{}/watch?v={}&hl={}&bpctr=9999999999",
            self.options.base_url, video_id, self.options.language
        )
    }

    pub(crate) fn embed_url(&self, video_id: &str) -> String {
        format!("{}/embed/{}", self.options.base_url, video_id)
    }

    pub(crate) fn video_info_url(&self, video_id: &str, sts: Option<&str>) -> Result<String> {
        let eurl = format!("https://youtube.googleapis.com/v/{}", video_id);
        let url = Url::parse_with_params(
            &format!("{}/get_video_info", self.options.base_url),
            &[
                ("video_id", video_id),
                ("el", "embedded"),
                ("eurl", eurl.as_str()),
                ("sts", sts.unwrap_or_default()),
                ("hl", self.options.language.as_str()),
            ],
        )?;
        Ok(url.to_string())
    }

    /// Make a player script path absolute
    pub(crate) fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("//") {
            format!("https:{}", path)
        } else if path.starts_with('/') {
            format!("{}{}", self.options.base_url, path)
        } else {
            path.to_string()
        }
    }

    async fn fetch(&self, url: &str, token: &CancellationToken) -> Result<String> {
        run_cancellable(token, async { Ok(self.transport.fetch_text(url).await?) }).await
    }

    /// Resolve a video id or URL into metadata and playable streams
    pub async fn resolve_video(&self, input: &str, token: &CancellationToken) -> Result<VideoInfo> {
        let video_id = extract_video_id(input)?;
        ensure_active(token)?;
        info!("Resolving video {}", video_id);

        let (fields, player_url) = self.load_fields(&video_id, token).await?;
        let metadata = extract_metadata(&video_id, &fields)?;
        let streams = self
            .resolve_streams(&metadata, player_url.as_deref(), token)
            .await?;

        info!(
            "Resolved {} ({} streams, {} caption tracks)",
            video_id,
            streams.len(),
            metadata.caption_tracks.len()
        );

        Ok(VideoInfo {
            id: metadata.id,
            title: metadata.title,
            author: metadata.author,
            duration: metadata.duration,
            view_count: metadata.view_count,
            average_rating: metadata.average_rating,
            keywords: metadata.keywords,
            watermarks: metadata.watermarks,
            has_closed_captions: metadata.has_closed_captions,
            embedding_allowed: metadata.embedding_allowed,
            is_listed: metadata.is_listed,
            rating_allowed: metadata.rating_allowed,
            is_muted: metadata.is_muted,
            streams,
            caption_tracks: metadata.caption_tracks,
        })
    }

    /// Watch page fields, filled from the video info endpoint when the page
    /// lacks required or stream fields
    async fn load_fields(
        &self,
        video_id: &str,
        token: &CancellationToken,
    ) -> Result<(FieldMap, Option<String>)> {
        let page = self.fetch(&self.watch_url(video_id), token).await?;
        let (mut fields, mut player_url) = match parse_watch_page(&page)? {
            Some(watch) => (watch.fields, watch.player_url),
            None => (FieldMap::new(), None),
        };
        check_status(video_id, &fields)?;

        let missing = fields.missing_required();
        let has_streams = STREAM_FIELDS.iter().any(|key| fields.contains(key));
        if missing.is_empty() && has_streams {
            return Ok((fields, player_url));
        }

        debug!(
            "Watch page for {} lacks {:?} (streams: {}), querying video info",
            video_id, missing, has_streams
        );
        let embed = parse_embed_page(&self.fetch(&self.embed_url(video_id), token).await?)?;
        let info_url = self.video_info_url(video_id, embed.sts.as_deref())?;
        let secondary = parse_video_info(&self.fetch(&info_url, token).await?);

        fields.fill_missing(&secondary);
        if player_url.is_none() {
            player_url = embed.player_url;
        }
        Ok((fields, player_url))
    }

    async fn cipher_program(
        &self,
        player_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Arc<CipherProgram>> {
        let player_url = player_url.ok_or_else(|| ResolveError::CipherProgramNotFound {
            version: "unknown".to_string(),
        })?;
        let key = PlayerVersionKey::from_player_url(player_url);
        let script_url = self.absolute_url(player_url);

        run_cancellable(
            token,
            self.cache.get_or_extract(&key, || async {
                debug!("Fetching player script {}", script_url);
                let source = self.transport.fetch_text(&script_url).await?;
                let program = self.extractor.extract(&source, &key)?;
                info!("Extracted cipher program for player {}: {}", key, program);
                Ok(program)
            }),
        )
        .await
    }

    /// Load the program; only extraction failures are kept as an outcome
    async fn load_program(
        &self,
        player_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<ProgramOutcome> {
        match self.cipher_program(player_url, token).await {
            Ok(program) => Ok(Ok(program)),
            Err(e) if e.is_extraction_failure() => {
                warn!("Cipher program unavailable: {}", e);
                Ok(Err(e))
            }
            Err(e) => Err(e),
        }
    }

    async fn manifest_descriptors(
        &self,
        manifest_url: &str,
        program: &mut Option<ProgramOutcome>,
        player_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Vec<RawDescriptor>> {
        let manifest_url = if manifest_signature(manifest_url)?.is_some() {
            if program.is_none() {
                *program = Some(self.load_program(player_url, token).await?);
            }
            match program.as_ref() {
                Some(Ok(p)) => decipher_manifest_url(manifest_url, p)?,
                Some(Err(e)) => {
                    warn!("Skipping DASH manifest: {}", e);
                    return Ok(Vec::new());
                }
                None => manifest_url.to_string(),
            }
        } else {
            manifest_url.to_string()
        };

        let xml = self.fetch(&manifest_url, token).await?;
        match parse_dash_manifest(&xml) {
            Ok(descriptors) => Ok(descriptors),
            Err(e) => {
                warn!("Skipping unreadable DASH manifest: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn stream_size(
        &self,
        descriptor: &RawDescriptor,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Option<u64>> {
        if let Some(size) = declared_size(descriptor, url) {
            return Ok(Some(size));
        }
        if !self.options.probe_content_length {
            return Ok(None);
        }
        debug!("Probing size of itag {}", descriptor.itag);
        run_cancellable(token, async {
            Ok(self.transport.content_length(url).await?)
        })
        .await
    }

    async fn resolve_streams(
        &self,
        metadata: &VideoMetadata,
        player_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Vec<StreamInfo>> {
        let mut program: Option<ProgramOutcome> = None;

        let manifest = match &metadata.dash_manifest_url {
            Some(url) => {
                self.manifest_descriptors(url, &mut program, player_url, token)
                    .await?
            }
            None => Vec::new(),
        };
        let descriptors = merge_descriptors(metadata.descriptors.clone(), manifest);

        let mut pending = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let url = if descriptor.needs_deciphering() {
                if program.is_none() {
                    program = Some(self.load_program(player_url, token).await?);
                }
                match &program {
                    Some(Ok(p)) => signed_url(&descriptor, Some(p.as_ref())),
                    Some(Err(e)) => Err(e.clone()),
                    None => signed_url(&descriptor, None),
                }
            } else {
                signed_url(&descriptor, None)
            };
            pending.push((descriptor, url));
        }

        let sizes: Vec<Option<u64>> = stream::iter(pending.iter())
            .map(|(descriptor, url)| async move {
                match url {
                    Ok(url) => self.stream_size(descriptor, url, token).await,
                    Err(_) => Ok(None),
                }
            })
            .buffered(MAX_CONCURRENT_PROBES)
            .try_collect()
            .await?;

        let mut collector = StreamCollector::new(&metadata.id);
        for ((descriptor, url), size) in pending.into_iter().zip(sizes) {
            let outcome = url.and_then(|url| build_stream(&descriptor, url, size));
            collector.record(descriptor.itag, outcome);
        }
        collector.finish()
    }

    /// List the videos of a playlist id or URL
    pub async fn resolve_playlist(
        &self,
        input: &str,
        token: &CancellationToken,
    ) -> Result<PlaylistInfo> {
        let playlist_id = extract_playlist_id(input)?;
        info!("Resolving playlist {}", playlist_id);

        let mut pages = PlaylistAccumulator::new(&playlist_id, self.options.playlist_limit);
        while !pages.is_done() {
            let url = playlist_page_url(
                &self.options.base_url,
                &playlist_id,
                pages.next_index(),
                &self.options.language,
            );
            let page = parse_playlist_page(&self.fetch(&url, token).await?)?;
            if !pages.add_page(page) {
                break;
            }
        }

        let playlist = pages.finish();
        info!(
            "Resolved playlist {} ({} videos)",
            playlist.id,
            playlist.video_ids.len()
        );
        Ok(playlist)
    }

    /// Whether the video exists. Restricted videos exist; removed, private
    /// or unknown ones do not.
    pub async fn check_exists(&self, input: &str, token: &CancellationToken) -> Result<bool> {
        let video_id = extract_video_id(input)?;
        let info_url = self.video_info_url(&video_id, None)?;
        let fields = parse_video_info(&self.fetch(&info_url, token).await?);
        if fields.is_empty() {
            return Err(ResolveError::Parse(format!(
                "empty video info for {}",
                video_id
            )));
        }

        match check_status(&video_id, &fields) {
            Ok(()) => Ok(true),
            Err(e) if e.is_restriction() => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!("Video {} does not exist: {}", video_id, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a chunked reader over a resolved stream
    pub fn open_stream(&self, stream: &StreamInfo, token: CancellationToken) -> MediaStream {
        let media = MediaStream::new(Arc::clone(&self.transport), stream)
            .with_chunk_size(self.options.chunk_size)
            .with_cancellation(token);
        match self.options.rate_limit_bps {
            Some(bps) => media.with_rate_limit(bps),
            None => media,
        }
    }

    /// Fetch and index a caption track
    pub async fn fetch_caption_track(
        &self,
        track: &CaptionTrackInfo,
        token: &CancellationToken,
    ) -> Result<CaptionTrack> {
        let xml = self.fetch(&track.url, token).await?;
        parse_caption_document(&xml, track.clone())
    }
}
