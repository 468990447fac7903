//! Window specifier parsing.
//!
//! Policies describe their window as `<integer><unit>` (for example `"30s"`,
//! `"1m"`, `"2h"`, `"7d"`). A specifier that does not parse never disables
//! limiting: it falls back to [`DEFAULT_WINDOW`].

use std::time::Duration;

/// Window used when a specifier is malformed.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

/// Longest accepted window (365 days). Longer specifiers are malformed.
pub const MAX_WINDOW: Duration = Duration::from_millis(365 * 86_400_000);

/// Unit suffix of a window specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    /// `s`
    Second,
    /// `m`
    Minute,
    /// `h`
    Hour,
    /// `d`
    Day,
}

impl WindowUnit {
    /// Parse a unit suffix character.
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            's' => Some(WindowUnit::Second),
            'm' => Some(WindowUnit::Minute),
            'h' => Some(WindowUnit::Hour),
            'd' => Some(WindowUnit::Day),
            _ => None,
        }
    }

    /// Milliseconds in one unit.
    pub fn millis(&self) -> u64 {
        match self {
            WindowUnit::Second => 1_000,
            WindowUnit::Minute => 60_000,
            WindowUnit::Hour => 3_600_000,
            WindowUnit::Day => 86_400_000,
        }
    }
}

/// Parse a window specifier, returning `None` when it is malformed.
///
/// Zero-length windows and windows longer than [`MAX_WINDOW`] are rejected
/// along with anything that is not `<digits><unit>`.
pub fn try_parse_window(spec: &str) -> Option<Duration> {
    let suffix = spec.chars().last()?;
    let unit = WindowUnit::from_suffix(suffix)?;
    let digits = &spec[..spec.len() - suffix.len_utf8()];

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let amount: u64 = digits.parse().ok()?;
    let millis = amount.checked_mul(unit.millis())?;
    if millis == 0 || millis > MAX_WINDOW.as_millis() as u64 {
        return None;
    }

    Some(Duration::from_millis(millis))
}

/// Parse a window specifier, degrading to [`DEFAULT_WINDOW`] when malformed.
pub fn parse_window(spec: &str) -> Duration {
    try_parse_window(spec).unwrap_or(DEFAULT_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_unit() {
        assert_eq!(parse_window("30s"), Duration::from_millis(30_000));
        assert_eq!(parse_window("1m"), Duration::from_millis(60_000));
        assert_eq!(parse_window("2h"), Duration::from_millis(7_200_000));
        assert_eq!(parse_window("7d"), Duration::from_millis(604_800_000));
    }

    #[test]
    fn test_malformed_falls_back_to_default() {
        for spec in ["", "m", "10", "10x", "1.5m", "-5s", " 1m", "1m ", "1 m", "1M", "abc"] {
            assert_eq!(parse_window(spec), DEFAULT_WINDOW, "spec {:?}", spec);
            assert!(try_parse_window(spec).is_none(), "spec {:?}", spec);
        }
    }

    #[test]
    fn test_zero_and_overflow_are_malformed() {
        assert!(try_parse_window("0s").is_none());
        assert!(try_parse_window("99999999999999999999d").is_none());
        assert!(try_parse_window("18446744073709551615d").is_none());
        assert_eq!(parse_window("0m"), DEFAULT_WINDOW);
    }

    #[test]
    fn test_windows_longer_than_a_year_are_malformed() {
        assert_eq!(try_parse_window("365d"), Some(MAX_WINDOW));
        assert_eq!(try_parse_window("8760h"), Some(MAX_WINDOW));
        assert!(try_parse_window("366d").is_none());
        assert!(try_parse_window("31536001s").is_none());
        assert!(try_parse_window("213503982334d").is_none());
        assert_eq!(parse_window("213503982334d"), DEFAULT_WINDOW);
    }

    #[test]
    fn test_multibyte_suffix_does_not_panic() {
        assert!(try_parse_window("5µ").is_none());
        assert!(try_parse_window("é").is_none());
    }

    #[test]
    fn test_unit_millis() {
        assert_eq!(WindowUnit::Second.millis(), 1_000);
        assert_eq!(WindowUnit::Minute.millis(), 60_000);
        assert_eq!(WindowUnit::Hour.millis(), 3_600_000);
        assert_eq!(WindowUnit::Day.millis(), 86_400_000);
    }
}
