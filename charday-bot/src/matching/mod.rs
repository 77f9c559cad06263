//! Character name matching
//!
//! Pure functions used to reconcile loosely spelled birthday-list names with
//! catalog records. No I/O happens here.

pub mod normalizer;
pub mod scorer;

pub use normalizer::{name_tokens, normalize_name};
pub use scorer::{series_confirmed, series_tokens, MatchTier, NameQuery};
