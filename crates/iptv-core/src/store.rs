use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::logos::LogoCache;
use crate::m3u;
use crate::model::{Category, Channel, Playlist};

/// A recent channel as written to the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub category_id: String,
    pub channel_id: String,
    pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub category_id: String,
    pub channel_id: String,
}

/// Recents and favorites, kept across restarts and reloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub saved_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub recents: Vec<RecentEntry>,
    #[serde(default)]
    pub favorites: Vec<FavoriteEntry>,
}

impl PersistentState {
    pub fn from_playlist(playlist: &Playlist) -> Self {
        Self {
            saved_at: Some(Local::now()),
            recents: playlist
                .recent_channels()
                .into_iter()
                .map(|c| RecentEntry {
                    category_id: c.category_id.clone(),
                    channel_id: c.id.clone(),
                    ordinal: c.recent_ordinal,
                })
                .collect(),
            favorites: playlist
                .favorite_channels()
                .into_iter()
                .map(|c| FavoriteEntry {
                    category_id: c.category_id.clone(),
                    channel_id: c.id.clone(),
                })
                .collect(),
        }
    }

    /// Marks the saved channels on `playlist`, skipping the ones it no longer
    /// has. Restored recents are re-ranked 1..N in their saved order.
    pub fn apply_to(&self, playlist: &mut Playlist) {
        let mut recents: Vec<&RecentEntry> = self.recents.iter().collect();
        recents.sort_by_key(|r| r.ordinal);

        let mut rank = 0;
        for entry in recents {
            match playlist.get_channel(&entry.category_id, &entry.channel_id) {
                // listed twice
                Ok(channel) if channel.is_recent => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!("Skipping recent channel: {}", e);
                    continue;
                }
            }
            rank += 1;
            if let Err(e) = playlist.restore_recent(&entry.category_id, &entry.channel_id, rank) {
                warn!("Skipping recent channel: {}", e);
            }
        }

        for entry in &self.favorites {
            if let Err(e) = playlist.restore_favorite(&entry.category_id, &entry.channel_id) {
                warn!("Skipping favorite channel: {}", e);
            }
        }
    }
}

/// Counts and revision read under one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub loaded: bool,
    pub revision: u64,
    pub categories: usize,
    pub channels: usize,
    pub recent: usize,
    pub favorites: usize,
}

struct Catalog {
    playlist: Option<Playlist>,
    /// Incremented on every install and every mutation.
    rev: u64,
}

/// Owner of the active playlist.
///
/// A single lock covers the whole catalog: installing a new playlist is one
/// assignment under the write lock, and every mutation or multi-step read
/// holds the lock for its whole duration.
pub struct PlaylistStore {
    catalog: RwLock<Catalog>,
    state_file: Option<PathBuf>,
    /// Serializes state file writes; holds the last revision written.
    saved_rev: Mutex<u64>,
}

impl PlaylistStore {
    /// A store that keeps recents and favorites in `state_file`.
    pub fn new(state_file: PathBuf) -> Self {
        Self::with_state_file(Some(state_file))
    }

    /// A store without a state file; flags only survive reloads, not restarts.
    pub fn in_memory() -> Self {
        Self::with_state_file(None)
    }

    fn with_state_file(state_file: Option<PathBuf>) -> Self {
        Self {
            catalog: RwLock::new(Catalog {
                playlist: None,
                rev: 0,
            }),
            state_file,
            saved_rev: Mutex::new(0),
        }
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Makes `playlist` the active catalog and returns the new revision.
    ///
    /// Recents and favorites are carried over from the playlist being
    /// replaced, or from the state file when nothing is active yet.
    pub async fn install(&self, mut playlist: Playlist) -> u64 {
        let rev = {
            let mut catalog = self.catalog.write().await;
            let saved = match (&catalog.playlist, &self.state_file) {
                (Some(current), _) => Some(PersistentState::from_playlist(current)),
                (None, Some(state_file)) => Some(load_persistent(state_file).await),
                (None, None) => None,
            };
            if let Some(saved) = saved {
                saved.apply_to(&mut playlist);
            }
            info!(
                "Installing playlist: {} channels, {} recent, {} favorite",
                playlist.channel_count(),
                playlist.recent_count(),
                playlist.favorite_count()
            );
            catalog.playlist = Some(playlist);
            catalog.rev += 1;
            catalog.rev
        };
        self.persist().await;
        rev
    }

    /// Parses `source` and installs the result.
    ///
    /// On error or when `timeout` runs out the active catalog is left as it
    /// was. Returns the number of channels installed.
    pub async fn reload(&self, source: &str, logos: &LogoCache, timeout: Duration) -> Result<usize> {
        let playlist = match tokio::time::timeout(timeout, m3u::load_playlist(source, logos)).await
        {
            Ok(Ok(playlist)) => playlist,
            Ok(Err(e)) => {
                warn!("Keeping previous channels, reload failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("Keeping previous channels, reload timed out after {:?}", timeout);
                return Err(CatalogError::Timeout(timeout));
            }
        };
        let count = playlist.channel_count();
        self.install(playlist).await;
        Ok(count)
    }

    pub async fn revision(&self) -> u64 {
        self.catalog.read().await.rev
    }

    pub async fn stats(&self) -> CatalogStats {
        let catalog = self.catalog.read().await;
        let Some(playlist) = &catalog.playlist else {
            return CatalogStats {
                revision: catalog.rev,
                ..CatalogStats::default()
            };
        };
        CatalogStats {
            loaded: true,
            revision: catalog.rev,
            categories: playlist.categories.len(),
            channels: playlist.channel_count(),
            recent: playlist.recent_count(),
            favorites: playlist.favorite_count(),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.catalog.read().await.playlist.is_some()
    }

    /// Copy of the active playlist, if any.
    pub async fn snapshot(&self) -> Option<Playlist> {
        self.catalog.read().await.playlist.clone()
    }

    pub async fn get_category(&self, category_id: &str) -> Result<Category> {
        let catalog = self.catalog.read().await;
        active(&catalog)?.get_category(category_id).cloned()
    }

    pub async fn get_channel(&self, category_id: &str, channel_id: &str) -> Result<Channel> {
        let catalog = self.catalog.read().await;
        active(&catalog)?
            .get_channel(category_id, channel_id)
            .cloned()
    }

    pub async fn channel_count(&self) -> usize {
        self.count(Playlist::channel_count).await
    }

    pub async fn recent_count(&self) -> usize {
        self.count(Playlist::recent_count).await
    }

    pub async fn favorite_count(&self) -> usize {
        self.count(Playlist::favorite_count).await
    }

    async fn count(&self, f: fn(&Playlist) -> usize) -> usize {
        self.catalog.read().await.playlist.as_ref().map_or(0, f)
    }

    pub async fn recent_channels(&self) -> Vec<Channel> {
        let catalog = self.catalog.read().await;
        catalog
            .playlist
            .as_ref()
            .map(|p| p.recent_channels().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn favorite_channels(&self) -> Vec<Channel> {
        let catalog = self.catalog.read().await;
        catalog
            .playlist
            .as_ref()
            .map(|p| p.favorite_channels().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Channels whose title contains `term`, ignoring case, as a detached playlist.
    pub async fn search_channels(&self, term: &str) -> Playlist {
        let catalog = self.catalog.read().await;
        catalog
            .playlist
            .as_ref()
            .map(|p| p.search_channels(term))
            .unwrap_or_default()
    }

    /// Puts the channel on top of the recent stack and returns it.
    pub async fn set_recent_channel(&self, category_id: &str, channel_id: &str) -> Result<Channel> {
        let channel = {
            let mut catalog = self.catalog.write().await;
            let playlist = active_mut(&mut catalog)?;
            playlist.set_recent_channel(category_id, channel_id)?;
            let channel = playlist.get_channel(category_id, channel_id)?.clone();
            catalog.rev += 1;
            channel
        };
        debug!("Recent channel: {}", channel.title);
        self.persist().await;
        Ok(channel)
    }

    pub async fn clear_recent_channels(&self) -> usize {
        let cleared = {
            let mut catalog = self.catalog.write().await;
            let Some(playlist) = catalog.playlist.as_mut() else {
                return 0;
            };
            let cleared = playlist.clear_recent_channels();
            catalog.rev += 1;
            cleared
        };
        info!("Cleared {} recent channels", cleared);
        self.persist().await;
        cleared
    }

    /// Flips the favorite flag and returns its new value.
    pub async fn toggle_favorite_channel(&self, category_id: &str, channel_id: &str) -> Result<bool> {
        let is_favorite = {
            let mut catalog = self.catalog.write().await;
            let is_favorite =
                active_mut(&mut catalog)?.toggle_favorite_channel(category_id, channel_id)?;
            catalog.rev += 1;
            is_favorite
        };
        self.persist().await;
        Ok(is_favorite)
    }

    pub async fn clear_favorite_channels(&self) -> usize {
        let cleared = {
            let mut catalog = self.catalog.write().await;
            let Some(playlist) = catalog.playlist.as_mut() else {
                return 0;
            };
            let cleared = playlist.clear_favorite_channels();
            catalog.rev += 1;
            cleared
        };
        info!("Cleared {} favorite channels", cleared);
        self.persist().await;
        cleared
    }

    /// Writes the state file, logging instead of failing: the in-memory
    /// catalog stays authoritative.
    async fn persist(&self) {
        if let Err(e) = self.save().await {
            warn!("Failed to save channel state: {}", e);
        }
    }

    /// Writes the current flags to the state file.
    ///
    /// Writers queue on `saved_rev` and snapshot the catalog only once they
    /// hold it, so the last write always carries the newest state. A
    /// revision already on disk is not written again.
    pub async fn save(&self) -> Result<()> {
        let Some(state_file) = &self.state_file else {
            return Ok(());
        };
        let mut saved_rev = self.saved_rev.lock().await;
        let (rev, persistent) = {
            let catalog = self.catalog.read().await;
            match &catalog.playlist {
                Some(playlist) => (catalog.rev, PersistentState::from_playlist(playlist)),
                None => return Ok(()),
            }
        };
        if rev == *saved_rev {
            return Ok(());
        }

        if let Some(parent) = state_file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(state_error)?;
        }
        let json = serde_json::to_string_pretty(&persistent).map_err(state_error)?;

        let part = state_file.with_extension("json.part");
        tokio::fs::write(&part, json).await.map_err(state_error)?;
        if let Err(e) = tokio::fs::rename(&part, state_file).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(state_error(e));
        }

        *saved_rev = rev;
        debug!("Saved channel state at revision {}", rev);
        Ok(())
    }
}

fn active(catalog: &Catalog) -> Result<&Playlist> {
    catalog
        .playlist
        .as_ref()
        .ok_or_else(|| CatalogError::NotFound("playlist".to_string()))
}

fn active_mut(catalog: &mut Catalog) -> Result<&mut Playlist> {
    catalog
        .playlist
        .as_mut()
        .ok_or_else(|| CatalogError::NotFound("playlist".to_string()))
}

fn state_error(e: impl ToString) -> CatalogError {
    CatalogError::State(e.to_string())
}

async fn load_persistent(state_file: &Path) -> PersistentState {
    if let Ok(content) = tokio::fs::read_to_string(state_file).await {
        match serde_json::from_str::<PersistentState>(&content) {
            Ok(persistent) => return persistent,
            Err(e) => warn!("Ignoring unreadable state file {}: {}", state_file.display(), e),
        }
    }
    PersistentState::default()
}
