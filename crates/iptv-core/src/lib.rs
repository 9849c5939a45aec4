//! Channel catalog for an IPTV front-end.
//!
//! An M3U source is parsed into categories and channels ([`m3u`]), every
//! channel logo is resolved through an on-disk cache ([`logos`]), and the
//! resulting [`model::Playlist`] is served and mutated through a single
//! [`store::PlaylistStore`].

pub mod config;
pub mod error;
pub mod logos;
pub mod m3u;
pub mod model;
pub mod platform;
pub mod store;

pub use error::{CatalogError, Result};
pub use logos::LogoCache;
pub use model::{Category, Channel, Playlist};
pub use store::{CatalogStats, PlaylistStore};
