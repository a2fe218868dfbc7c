//! Hold-timer extraction from step text.
//!
//! A step like "Sit. Hold for 5 seconds." carries an embedded countdown. The
//! seconds form always wins over "count to N" when both appear.

use once_cell::sync::Lazy;
use regex::Regex;

/// "N second(s)" / "N sec" and their German and Spanish forms.
static SECONDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:second|sec|sekunde|segundo)").expect("valid seconds pattern")
});

/// "count to N" and its German and Spanish forms.
static COUNT_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:count\s+to\s+(\d+))|(?:zähle?\s+bis\s+(\d+))|(?:bis\s+(\d+)\s+zählen)|(?:cuenta\s+hasta\s+(\d+))",
    )
    .expect("valid count-to pattern")
});

/// Returns the hold duration in seconds embedded in `text`, if any.
///
/// The first match decides, seconds before "count to N". Only strictly positive
/// values count as a timer, so "0 seconds" means no timer at all.
pub fn extract_hold_seconds(text: &str) -> Option<u32> {
    let caps = SECONDS.captures(text).or_else(|| COUNT_TO.captures(text))?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_pattern() {
        assert_eq!(extract_hold_seconds("Hold for 5 seconds"), Some(5));
        assert_eq!(extract_hold_seconds("Stay 30 sec, then release."), Some(30));
        assert_eq!(extract_hold_seconds("Wait 1 second"), Some(1));
        assert_eq!(extract_hold_seconds("HOLD 12SECONDS"), Some(12));
    }

    #[test]
    fn count_to_pattern() {
        assert_eq!(extract_hold_seconds("Count to 10 slowly"), Some(10));
        assert_eq!(extract_hold_seconds("Then COUNT TO 3 before the treat."), Some(3));
    }

    #[test]
    fn no_timer() {
        assert_eq!(extract_hold_seconds("Sit and wait"), None);
        assert_eq!(extract_hold_seconds("Repeat 3 times"), None);
        assert_eq!(extract_hold_seconds(""), None);
    }

    #[test]
    fn seconds_beat_count_to() {
        assert_eq!(
            extract_hold_seconds("Count to 10, that is about 8 seconds"),
            Some(8)
        );
    }

    #[test]
    fn zero_is_not_a_timer() {
        assert_eq!(extract_hold_seconds("Hold for 0 seconds"), None);
        assert_eq!(extract_hold_seconds("0 seconds, then count to 4"), None);
        assert_eq!(extract_hold_seconds("Hold 0 seconds, then 5 seconds"), None);
    }

    #[test]
    fn german_and_spanish() {
        assert_eq!(extract_hold_seconds("Halte 5 Sekunden"), Some(5));
        assert_eq!(extract_hold_seconds("Zähle bis 7"), Some(7));
        assert_eq!(extract_hold_seconds("Langsam bis 6 zählen"), Some(6));
        assert_eq!(extract_hold_seconds("Mantén 4 segundos"), Some(4));
        assert_eq!(extract_hold_seconds("Cuenta hasta 9"), Some(9));
    }

    #[test]
    fn overflowing_number_is_ignored() {
        assert_eq!(extract_hold_seconds("Hold 99999999999 seconds"), None);
    }
}
