//! Playlist page parsing and paging state

use crate::core::video_info::PlaylistInfo;
use crate::error::ResolveError;
use crate::platform::metadata::collect_entries;
use crate::utils::url::is_valid_video_id;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// URL of one playlist page starting at `index`
pub fn playlist_page_url(base_url: &str, playlist_id: &str, index: usize, language: &str) -> String {
    format!(
        "{}/list_ajax?style=json&action_get_list=1&list={}&index={}&hl={}",
        base_url.trim_end_matches('/'),
        playlist_id,
        index,
        language
    )
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    views: Option<Value>,
    #[serde(default)]
    video: Vec<Value>,
}

/// One page of a playlist listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub title: String,
    pub author: String,
    pub description: String,
    pub view_count: Option<u64>,
    pub video_ids: Vec<String>,
    /// Entries on the page, counting ones that were skipped
    pub entry_count: usize,
}

/// Views arrive as a number or as a formatted string like `"1,234 views"`
fn parse_views(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn parse_entry(entry: &Value) -> Result<String> {
    let id = entry
        .get("encrypted_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ResolveError::malformed("video", "missing encrypted_id"))?;
    if !is_valid_video_id(id) {
        return Err(ResolveError::malformed("video", format!("invalid id {:?}", id)));
    }
    Ok(id.to_string())
}

/// Parse a JSON playlist page
pub fn parse_playlist_page(body: &str) -> Result<PlaylistPage> {
    let raw: RawPage = serde_json::from_str(body)?;
    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ResolveError::Parse("playlist page has no title".to_string()))?;

    Ok(PlaylistPage {
        title,
        author: raw.author.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        view_count: raw.views.as_ref().and_then(parse_views),
        video_ids: collect_entries("video", raw.video.iter(), parse_entry),
        entry_count: raw.video.len(),
    })
}

/// Paging state while a playlist is being listed.
///
/// Ids are deduplicated in first-seen order. Paging stops once a page adds no
/// new ids or the optional limit is reached.
#[derive(Debug)]
pub struct PlaylistAccumulator {
    info: PlaylistInfo,
    seen: HashSet<String>,
    next_index: usize,
    limit: Option<usize>,
    done: bool,
}

impl PlaylistAccumulator {
    pub fn new(playlist_id: &str, limit: Option<usize>) -> Self {
        Self {
            info: PlaylistInfo {
                id: playlist_id.to_string(),
                ..PlaylistInfo::default()
            },
            seen: HashSet::new(),
            next_index: 0,
            limit,
            done: limit == Some(0),
        }
    }

    /// Index of the next page to request
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fold a page in. Returns `true` if another page should be requested.
    pub fn add_page(&mut self, page: PlaylistPage) -> bool {
        if self.info.title.is_empty() {
            self.info.title = page.title;
            self.info.author = page.author;
            self.info.description = page.description;
        }
        if let Some(views) = page.view_count {
            self.info.view_count = views;
        }

        let page_len = page.entry_count;
        let mut added = 0;
        for id in page.video_ids {
            if self.limit.is_some_and(|limit| self.info.video_ids.len() >= limit) {
                break;
            }
            if self.seen.insert(id.clone()) {
                self.info.video_ids.push(id);
                added += 1;
            }
        }
        debug!(
            "Playlist {} page at {}: {} ids, {} new",
            self.info.id, self.next_index, page_len, added
        );

        self.next_index += page_len;
        let limit_reached = self
            .limit
            .is_some_and(|limit| self.info.video_ids.len() >= limit);
        self.done = added == 0 || limit_reached;
        !self.done
    }

    pub fn finish(self) -> PlaylistInfo {
        self.info
    }
}
