//! Extended M3U parsing.
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-id="fox" tvg-logo="http://logo/fox.png" group-title="News",FOX TV
//! http://streams/fox.m3u8
//! ```
//!
//! Every `#EXTINF` line takes the line right after it as its stream URL,
//! whatever that line holds. Category and channel ids are the URL-safe,
//! unpadded base64 of the `group-title` and `tvg-id` (whitespace collapsed
//! to `_`), so they are stable across reloads and safe in paths and queries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::{CatalogError, Result};
use crate::logos::LogoCache;
use crate::model::{Channel, Playlist};

pub const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF";

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const DEFAULT_DESCRIPTION: &str = "No description available";

/// Logo downloads in flight during one parse.
const LOGO_CONCURRENCY: usize = 8;

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z0-9-]+)="([^"]+)""#).expect("attribute pattern is valid")
});

/// One `#EXTINF` entry with its stream URL, before ids and logos are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// 1-based line number of the `#EXTINF` line.
    pub line: usize,
    pub title: String,
    pub media_url: String,
    pub category: String,
    /// `tvg-id`, falling back to the title.
    pub identifier: String,
    /// `tvg-logo`, empty when absent.
    pub logo_url: String,
    pub description: String,
}

/// Derives a category or channel id.
pub fn encode_id(raw: &str) -> String {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join("_");
    URL_SAFE_NO_PAD.encode(normalized)
}

/// Splits an m3u document into entries without touching the network.
pub fn parse_entries(content: &str) -> Result<Vec<Entry>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.lines().enumerate();

    match lines.next() {
        Some((_, first)) if first.trim_start().starts_with(HEADER) => {}
        _ => {
            return Err(CatalogError::Format(format!(
                "expected {HEADER} file header"
            )))
        }
    }

    let mut entries = Vec::new();
    while let Some((idx, line)) = lines.next() {
        let Some(rest) = line.trim().strip_prefix(EXTINF) else {
            continue;
        };
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        let (attributes, title) = split_metadata(rest).ok_or_else(|| {
            CatalogError::Format(format!(
                "line {}: {EXTINF} must hold attributes and a channel name separated by ','",
                idx + 1
            ))
        })?;

        // The next line is the stream URL, unconditionally.
        let media_url = lines
            .next()
            .map(|(_, next)| next.trim().to_string())
            .unwrap_or_default();

        entries.push(entry_from(idx + 1, attributes, title, media_url));
    }

    Ok(entries)
}

/// Splits `-1 key="v, w",Title` at the first comma outside a quoted value.
fn split_metadata(rest: &str) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (i, ch) in rest.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => return Some((&rest[..i], rest[i + 1..].trim())),
            _ => {}
        }
    }
    None
}

fn entry_from(line: usize, attributes: &str, title: &str, media_url: String) -> Entry {
    let mut category = None;
    let mut identifier = None;
    let mut logo_url = None;
    let mut description = None;

    for caps in ATTRIBUTE_RE.captures_iter(attributes) {
        let value = caps[2].trim().to_string();
        match &caps[1] {
            "group-title" => category = Some(value),
            "tvg-id" => identifier = Some(value),
            "tvg-logo" => logo_url = Some(value),
            "tvg-url" => description = Some(value),
            _ => {}
        }
    }

    let identifier = identifier
        .filter(|id| !id.is_empty())
        .or_else(|| (!title.is_empty()).then(|| title.to_string()))
        .unwrap_or_else(|| media_url.clone());

    Entry {
        line,
        title: title.to_string(),
        media_url,
        category: category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        identifier,
        logo_url: logo_url.unwrap_or_default(),
        description: description.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    }
}

/// Builds the playlist from parsed entries, resolving every logo.
///
/// The first entry for a (category, channel) pair wins; later ones are
/// dropped with a warning. Logo failures only cost the channel its image.
pub async fn assemble(entries: Vec<Entry>, logos: &LogoCache) -> Playlist {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        let category_id = encode_id(&entry.category);
        let channel_id = encode_id(&entry.identifier);
        if !seen.insert((category_id.clone(), channel_id.clone())) {
            warn!(
                "Dropping duplicate channel '{}' in '{}' (line {})",
                entry.title, entry.category, entry.line
            );
            continue;
        }
        kept.push((category_id, channel_id, entry));
    }

    let channels: Vec<Channel> = stream::iter(kept)
        .map(|(category_id, channel_id, entry)| async move {
            let (logo, error) = logos.resolve(&channel_id, &entry.logo_url).await;
            if let Some(e) = error {
                warn!("Using fallback logo for '{}': {}", entry.title, e);
            }
            Channel {
                id: channel_id,
                title: entry.title,
                media_url: entry.media_url,
                logo,
                description: entry.description,
                category: entry.category,
                category_id,
                ..Channel::default()
            }
        })
        .buffered(LOGO_CONCURRENCY)
        .collect()
        .await;

    let mut playlist = Playlist::new();
    for channel in channels {
        playlist.insert(channel);
    }
    playlist
}

pub async fn parse_str(content: &str, logos: &LogoCache) -> Result<Playlist> {
    let entries = parse_entries(content)?;
    Ok(assemble(entries, logos).await)
}

/// Reads an m3u document from an http(s) URL or a local path.
pub async fn read_source(source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source)
            .await
            .map_err(|e| CatalogError::io(source, e))?;
        if !response.status().is_success() {
            return Err(CatalogError::io(
                source,
                format!("HTTP {}", response.status()),
            ));
        }
        response.text().await.map_err(|e| CatalogError::io(source, e))
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| CatalogError::io(source, e))
    }
}

/// Reads and parses `source`, resolving logos through `logos`.
pub async fn load_playlist(source: &str, logos: &LogoCache) -> Result<Playlist> {
    info!("Loading channels from m3u: {}", source);
    let content = read_source(source).await?;
    let entries = parse_entries(&content)?;
    let total = entries.len();
    let playlist = assemble(entries, logos).await;
    info!(
        "Loaded {} channels in {} categories ({} entries read)",
        playlist.channel_count(),
        playlist.categories.len(),
        total
    );
    Ok(playlist)
}
