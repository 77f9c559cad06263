//! Name normalizer
//!
//! Canonicalizes a personal name for comparison. Steps, in order:
//! 1. Lower-case
//! 2. Unicode-decompose and strip combining marks (macrons, accents)
//! 3. "Family, Given" → "Given Family" when a comma is present
//! 4. Collapse whitespace runs and trim
//! 5. Fold transliteration variants: "ou" → "o", then any run of 2+
//!    identical letters → 1 (so "Shuukurou" and "Shukuro" agree)

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical comparison form of a name; empty input yields an empty string
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();

    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let reordered = match stripped.split_once(',') {
        Some((family, given)) if !given.trim().is_empty() => {
            format!("{} {}", given.trim(), family.trim())
        }
        Some((family, _)) => family.to_string(),
        None => stripped,
    };

    let collapsed = reordered.split_whitespace().collect::<Vec<_>>().join(" ");

    collapse_repeated_letters(&fold_long_vowels(&collapsed))
}

/// Normalized name split into comparison tokens (punctuation separates tokens)
pub fn name_tokens(name: &str) -> Vec<String> {
    normalize_name(name)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Hepburn long "o" is written ō, ou or oo; after diacritic stripping only
/// the "ou" spelling still differs
fn fold_long_vowels(value: &str) -> String {
    value.replace("ou", "o")
}

fn collapse_repeated_letters(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous: Option<char> = None;

    for c in value.chars() {
        if c.is_alphabetic() && previous == Some(c) {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }

    out
}
