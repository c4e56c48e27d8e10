//! Single-token classification: creature names and coordinate numbers.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::spawn::creature_names::CREATURE_NAMES;

static NAME_INDEX: Lazy<HashSet<String>> = Lazy::new(|| {
    CREATURE_NAMES
        .iter()
        .map(|n| n.trim().to_lowercase())
        .collect()
});

// ASCII digits only; chat clients happily paste full-width numerals.
static LAT_LONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+\.[0-9]+$").unwrap());

static COMBINED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+\.[0-9]+,-?[0-9]+\.[0-9]+$").unwrap());

/// Case-insensitive exact match against the creature registry.
pub fn is_creature_name(token: &str) -> bool {
    NAME_INDEX.contains(&token.trim().to_lowercase())
}

/// Signed decimal with at least one fractional digit, nothing else.
/// Expects a token already passed through [`normalize_coordinate_token`].
pub fn is_lat_long(token: &str) -> bool {
    LAT_LONG.is_match(token)
}

/// `lat,long` written as one token, checked on the raw token.
pub fn is_combined_coordinate(token: &str) -> bool {
    COMBINED.is_match(token)
}

/// Drop the first comma, then one leading and one trailing period, so that
/// `40.7128,` or `-74.0060.` still read as coordinates.
pub fn normalize_coordinate_token(token: &str) -> String {
    let without_comma = token.replacen(',', "", 1);
    let s = without_comma.strip_prefix('.').unwrap_or(&without_comma);
    let s = s.strip_suffix('.').unwrap_or(s);
    s.to_string()
}

/// `pIDGEY` → `Pidgey`.
pub fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_name_matches_under_any_casing() {
        for name in CREATURE_NAMES {
            assert!(is_creature_name(name), "{name}");
            assert!(is_creature_name(&name.to_uppercase()), "{name}");
            assert!(is_creature_name(&name.to_lowercase()), "{name}");
            assert!(is_creature_name(&format!("  {name}\t")), "{name}");
        }
    }

    #[test]
    fn unknown_words_are_not_names() {
        assert!(!is_creature_name("pidge"));
        assert!(!is_creature_name("agumon"));
        assert!(!is_creature_name(""));
    }

    #[test]
    fn lat_long_requires_fraction() {
        assert!(is_lat_long("40.7128"));
        assert!(is_lat_long("-74.0060"));
        assert!(is_lat_long("0.5"));
        assert!(!is_lat_long("40"));
        assert!(!is_lat_long("40."));
        assert!(!is_lat_long(".5"));
        assert!(!is_lat_long("+40.1"));
        assert!(!is_lat_long("40.1N"));
        assert!(!is_lat_long("--1.0"));
    }

    #[test]
    fn normalization_strips_punctuation_once() {
        assert_eq!(normalize_coordinate_token("40.7128,"), "40.7128");
        assert_eq!(normalize_coordinate_token(",40.7128"), "40.7128");
        assert_eq!(normalize_coordinate_token("-74.0060."), "-74.0060");
        assert_eq!(normalize_coordinate_token(".40.7128"), "40.7128");
        assert_eq!(normalize_coordinate_token("..1.5.."), ".1.5.");
        assert_eq!(normalize_coordinate_token("1.5,2.5"), "1.52.5");
    }

    #[test]
    fn combined_coordinate_is_checked_raw() {
        assert!(is_combined_coordinate("40.7128,-74.0060"));
        assert!(is_combined_coordinate("-1.5,-2.5"));
        assert!(!is_combined_coordinate("40.7128, -74.0060"));
        assert!(!is_combined_coordinate("40.7128,-74.0060,"));
        assert!(!is_combined_coordinate("40,74"));
    }

    #[test]
    fn title_case_lowers_the_tail() {
        assert_eq!(title_case("pIDGEY"), "Pidgey");
        assert_eq!(title_case("MEW"), "Mew");
        assert_eq!(title_case(""), "");
    }
}
