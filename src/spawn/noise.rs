/// Substrings that mark a message as a reaction to an earlier report
/// ("fake", "confirmed", "got it", "there is no …") or a pasted bot log
/// (bracketed timestamps / tags).  Matched against lowercased text.
pub const NOISE_MARKERS: &[&str] = &["fake", "confirm", "got it", "there is no", "[", "]"];

/// Returns `true` when the message should be dropped before parsing.
pub fn is_noise(text: &str) -> bool {
    let lower = text.to_lowercase();
    NOISE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_every_marker_in_any_case() {
        for text in [
            "FAKE pidgey",
            "Confirmed, it's there",
            "Got It thanks",
            "There Is No snorlax there",
            "[12:01] Dragonite 1.0 2.0",
            "bot] said so",
        ] {
            assert!(is_noise(text), "expected noise: {text}");
        }
    }

    #[test]
    fn plain_report_is_not_noise() {
        assert!(!is_noise("Pidgey 40.7128 -74.0060 95%"));
        assert!(!is_noise(""));
    }
}
