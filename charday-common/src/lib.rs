//! # Charday Common Library
//!
//! Shared code for the birthday posting bot:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - Reference time zone date helpers
//! - Data model (raw/canonical characters, daily posts, daily state)

pub mod config;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    CanonicalCharacter, CatalogImage, DailyPost, DailyState, PostStatus, RawCharacter,
    ResolvedImage, SkippedCharacter,
};
