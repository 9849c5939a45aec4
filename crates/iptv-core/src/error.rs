use std::time::Duration;

/// Everything the catalog can fail with.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Malformed header or `#EXTINF` line.
    #[error("invalid m3u: {0}")]
    Format(String),

    /// Playlist source could not be opened, fetched or read.
    #[error("cannot read playlist source {source_name}: {reason}")]
    Io { source_name: String, reason: String },

    #[error("{0} could not be found")]
    NotFound(String),

    /// Logo could not be fetched, decoded or written. Never escapes a parse.
    #[error("logo for {id}: {reason}")]
    LogoFetch { id: String, reason: String },

    #[error("playlist reload exceeded {0:?}")]
    Timeout(Duration),

    /// The recents/favorites state file could not be written.
    #[error("state file: {0}")]
    State(String),
}

impl CatalogError {
    pub(crate) fn io(source_name: &str, reason: impl ToString) -> Self {
        Self::Io {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn logo(id: &str, reason: impl ToString) -> Self {
        Self::LogoFetch {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
