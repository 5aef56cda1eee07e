use std::sync::OnceLock;

use regex::Regex;

/// Floor used when a label carries no usable number.
pub const FALLBACK_FLOOR: u32 = 2;
pub const MIN_FLOOR: u32 = 1;
pub const MAX_FLOOR: u32 = 5;

fn floor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)(?:st|nd|rd|th)?(?:\s*floor)?").expect("floor pattern is valid")
    })
}

/// Parses labels such as "4th floor", "Floor 3" or "2ND FLOOR" into a floor
/// number. The first integer wins; anything missing or outside
/// `MIN_FLOOR..=MAX_FLOOR` maps to [`FALLBACK_FLOOR`].
pub fn extract_floor(label: &str) -> u32 {
    floor_pattern()
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
        .filter(|floor| (MIN_FLOOR..=MAX_FLOOR).contains(floor))
        .unwrap_or(FALLBACK_FLOOR)
}
