//! IV (0–100 quality percentage) extraction from a whole message.
//!
//! Reports write the IV in several shapes.  The shapes are tried in a fixed
//! order and the first one found anywhere in the message wins.

use once_cell::sync::Lazy;
use regex::Regex;

/// Which notation produced an IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvFormat {
    /// `95%`
    Percent,
    /// ` 95 iv` / ` 95iv`; the leading space keeps `20.999 iv` from
    /// yielding `999`.
    NumberThenIv,
    /// `iv 95` / `iv95`
    IvThenNumber,
    /// `95% iv` / `95%iv`
    PercentThenIv,
}

/// Ordered cascade: earlier entries take precedence.
static IV_PATTERNS: Lazy<Vec<(Regex, IvFormat)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"[0-9]{1,3}%").unwrap(), IvFormat::Percent),
        (Regex::new(r" [0-9]{1,3} ?iv").unwrap(), IvFormat::NumberThenIv),
        (Regex::new(r"iv ?[0-9]{1,3}").unwrap(), IvFormat::IvThenNumber),
        (Regex::new(r"[0-9]{1,3}% ?iv").unwrap(), IvFormat::PercentThenIv),
    ]
});

/// Find the IV and the notation it was written in.
pub fn detect_iv(text: &str) -> Option<(IvFormat, u32)> {
    let lower = text.to_lowercase();
    IV_PATTERNS.iter().find_map(|(re, format)| {
        let hit = re.find(&lower)?;
        let digits: String = hit.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok().map(|v| (*format, v))
    })
}

/// IV value written anywhere in `text`, or `None` when unknown.  Values
/// above 100 are returned as-is; the caller decides what they mean.
pub fn extract_iv(text: &str) -> Option<u32> {
    detect_iv(text).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_order_is_fixed() {
        let formats: Vec<IvFormat> = IV_PATTERNS.iter().map(|(_, f)| *f).collect();
        assert_eq!(
            formats,
            vec![
                IvFormat::Percent,
                IvFormat::NumberThenIv,
                IvFormat::IvThenNumber,
                IvFormat::PercentThenIv,
            ]
        );
    }

    #[test]
    fn percent_form() {
        assert_eq!(detect_iv("pidgey 1.0 2.0 95%"), Some((IvFormat::Percent, 95)));
        assert_eq!(extract_iv("100% perfect"), Some(100));
    }

    #[test]
    fn number_then_iv_needs_leading_space() {
        assert_eq!(
            detect_iv("Charmander 1.5 2.5 with 20 IV"),
            Some((IvFormat::NumberThenIv, 20))
        );
        assert_eq!(detect_iv("x 87iv"), Some((IvFormat::NumberThenIv, 87)));
        // ".999 IV" is part of a coordinate, not an IV.
        assert_eq!(extract_iv("pidgey 20.999 IV"), None);
    }

    #[test]
    fn iv_then_number() {
        assert_eq!(detect_iv("IV 101"), Some((IvFormat::IvThenNumber, 101)));
        assert_eq!(detect_iv("(iv98)"), Some((IvFormat::IvThenNumber, 98)));
    }

    #[test]
    fn percent_wins_over_later_patterns() {
        // The plain percent pattern already covers the digits of "96% IV".
        assert_eq!(detect_iv("snorlax 96% IV"), Some((IvFormat::Percent, 96)));
        assert_eq!(detect_iv("iv 12 and 34%"), Some((IvFormat::Percent, 34)));
    }

    #[test]
    fn overlong_numbers_keep_their_last_three_digits() {
        assert_eq!(extract_iv("1234%"), Some(234));
    }

    #[test]
    fn absent_iv_is_none_not_zero() {
        assert_eq!(extract_iv("Pidgey 40.7128 -74.0060"), None);
        assert_eq!(extract_iv(""), None);
    }
}
