use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CatalogError, Result};

/// A parsed M3U playlist: categories keyed by category id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub categories: BTreeMap<String, Category>,
}

/// One `group-title` of the playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub channels: BTreeMap<String, Channel>,
}

/// A channel from an `#EXTINF` line and the locator line that follows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub title: String,
    pub media_url: String,
    /// Cached logo path, or the fallback image.
    pub logo: String,
    pub description: String,
    /// Display name of the owning category.
    pub category: String,
    pub category_id: String,
    #[serde(default)]
    pub is_recent: bool,
    /// 1 = most recently watched. Meaningless while `is_recent` is false.
    #[serde(default)]
    pub recent_ordinal: u32,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            channels: BTreeMap::new(),
        }
    }
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `channel` under its category, creating the category on first use.
    ///
    /// Returns `false` and leaves the playlist untouched when the
    /// (category id, channel id) pair is already present.
    pub fn insert(&mut self, channel: Channel) -> bool {
        let category = self
            .categories
            .entry(channel.category_id.clone())
            .or_insert_with(|| Category::new(&channel.category_id, &channel.category));
        if category.channels.contains_key(&channel.id) {
            return false;
        }
        category.channels.insert(channel.id.clone(), channel);
        true
    }

    pub fn get_category(&self, category_id: &str) -> Result<&Category> {
        self.categories
            .get(category_id)
            .ok_or_else(|| CatalogError::NotFound(format!("category {category_id}")))
    }

    pub fn get_channel(&self, category_id: &str, channel_id: &str) -> Result<&Channel> {
        self.get_category(category_id)?
            .channels
            .get(channel_id)
            .ok_or_else(|| not_found_channel(category_id, channel_id))
    }

    fn channel_mut(&mut self, category_id: &str, channel_id: &str) -> Result<&mut Channel> {
        self.categories
            .get_mut(category_id)
            .ok_or_else(|| CatalogError::NotFound(format!("category {category_id}")))?
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| not_found_channel(category_id, channel_id))
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.categories.values().flat_map(|c| c.channels.values())
    }

    fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.categories
            .values_mut()
            .flat_map(|c| c.channels.values_mut())
    }

    pub fn channel_count(&self) -> usize {
        self.categories.values().map(|c| c.channels.len()).sum()
    }

    pub fn recent_count(&self) -> usize {
        self.channels().filter(|c| c.is_recent).count()
    }

    pub fn favorite_count(&self) -> usize {
        self.channels().filter(|c| c.is_favorite).count()
    }

    /// Recent channels, most recent first.
    pub fn recent_channels(&self) -> Vec<&Channel> {
        let mut recent: Vec<&Channel> = self.channels().filter(|c| c.is_recent).collect();
        recent.sort_by_key(|c| c.recent_ordinal);
        recent
    }

    pub fn favorite_channels(&self) -> Vec<&Channel> {
        let mut favorites: Vec<&Channel> = self.channels().filter(|c| c.is_favorite).collect();
        favorites.sort_by(|a, b| a.category.cmp(&b.category).then(a.title.cmp(&b.title)));
        favorites
    }

    /// Moves a channel to the top of the recent stack.
    ///
    /// A channel entering the stack pushes every recent channel down one rank.
    /// A channel already in the stack only pushes down the channels ranked
    /// above it, which closes the gap it leaves behind.
    pub fn set_recent_channel(&mut self, category_id: &str, channel_id: &str) -> Result<()> {
        let previous = {
            let selected = self.get_channel(category_id, channel_id)?;
            selected.is_recent.then_some(selected.recent_ordinal)
        };

        for channel in self.channels_mut() {
            if !channel.is_recent || (channel.category_id == category_id && channel.id == channel_id)
            {
                continue;
            }
            match previous {
                Some(prev) if channel.recent_ordinal >= prev => {}
                _ => channel.recent_ordinal += 1,
            }
        }

        let selected = self.channel_mut(category_id, channel_id)?;
        selected.recent_ordinal = 1;
        selected.is_recent = true;
        Ok(())
    }

    /// Drops every channel from the recent stack. Returns how many were recent.
    pub fn clear_recent_channels(&mut self) -> usize {
        let mut cleared = 0;
        for channel in self.channels_mut().filter(|c| c.is_recent) {
            channel.is_recent = false;
            cleared += 1;
        }
        cleared
    }

    /// Flips the favorite flag and returns its new value.
    pub fn toggle_favorite_channel(&mut self, category_id: &str, channel_id: &str) -> Result<bool> {
        let channel = self.channel_mut(category_id, channel_id)?;
        channel.is_favorite = !channel.is_favorite;
        Ok(channel.is_favorite)
    }

    pub fn clear_favorite_channels(&mut self) -> usize {
        let mut cleared = 0;
        for channel in self.channels_mut().filter(|c| c.is_favorite) {
            channel.is_favorite = false;
            cleared += 1;
        }
        cleared
    }

    /// Builds a new playlist holding only channels whose title contains `term`,
    /// ignoring case. Categories without a match are left out.
    pub fn search_channels(&self, term: &str) -> Playlist {
        let needle = term.to_lowercase();
        let mut results = Playlist::new();
        for channel in self.channels() {
            if channel.title.to_lowercase().contains(&needle) {
                results.insert(channel.clone());
            }
        }
        results
    }

    /// Marks a channel recent at an explicit rank, used when restoring saved state.
    /// Callers are responsible for handing out dense ranks.
    pub(crate) fn restore_recent(
        &mut self,
        category_id: &str,
        channel_id: &str,
        ordinal: u32,
    ) -> Result<()> {
        let channel = self.channel_mut(category_id, channel_id)?;
        channel.is_recent = true;
        channel.recent_ordinal = ordinal;
        Ok(())
    }

    pub(crate) fn restore_favorite(&mut self, category_id: &str, channel_id: &str) -> Result<()> {
        self.channel_mut(category_id, channel_id)?.is_favorite = true;
        Ok(())
    }
}

fn not_found_channel(category_id: &str, channel_id: &str) -> CatalogError {
    CatalogError::NotFound(format!("channel {channel_id} in category {category_id}"))
}
