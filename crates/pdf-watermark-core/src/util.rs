//! Utility functions shared across the crate.

use std::collections::HashSet;
use std::path::PathBuf;

/// Stem used when a phrase contains nothing filesystem-safe.
pub const FALLBACK_STEM: &str = "watermark";

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Turn a phrase into a filesystem-safe file stem.
///
/// Keeps ASCII letters, digits, underscores and whitespace, then collapses
/// every whitespace run into a single `_`. Applying it twice yields the same
/// string as applying it once.
pub fn sanitize_filename(phrase: &str) -> String {
    let kept: String = phrase
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Pick a stem not yet in `used`, appending `_2`, `_3`, ... on collision.
///
/// Empty stems fall back to [`FALLBACK_STEM`]. The chosen stem is recorded in
/// `used`.
pub fn unique_stem(stem: &str, used: &mut HashSet<String>) -> String {
    let base = if stem.is_empty() { FALLBACK_STEM } else { stem };

    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}_{n}");
        n += 1;
    }

    used.insert(candidate.clone());
    candidate
}
