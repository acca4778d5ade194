//! Locale code to service language name resolution.

use shared::domain::LanguageName;

const LANGUAGE_TABLE: &[(&str, LanguageName)] = &[
    ("en", LanguageName::English),
    ("hi", LanguageName::Hindi),
    ("te", LanguageName::Telugu),
];

pub const DEFAULT_LOCALE: &str = "en";

/// Maps a locale code such as `hi` or `te-IN` to the language name the
/// service expects. Unknown codes fall back to English.
pub fn language_name(locale: &str) -> LanguageName {
    let primary = locale
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    LANGUAGE_TABLE
        .iter()
        .find(|(code, _)| *code == primary)
        .map(|(_, name)| *name)
        .unwrap_or_default()
}
