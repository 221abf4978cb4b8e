//! Coordinate normalization and plausibility checks.

/// Round a coordinate to 6 decimal places, the precision the server expects.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// GPS receivers do not produce more digits than this; anything longer is a
// spoofed or corrupted fix.
const MAX_LAT_DIGITS: usize = 9;
const MAX_LON_DIGITS: usize = 11;

fn digit_count(value: f64) -> usize {
    format!("{}", value.abs())
        .chars()
        .filter(|c| c.is_ascii_digit())
        .count()
}

/// Whether a raw fix is within plausible GPS precision: at most 9 digits in
/// the latitude magnitude and 11 in the longitude magnitude.
pub fn plausible_fix(latitude: f64, longitude: f64) -> bool {
    digit_count(latitude) <= MAX_LAT_DIGITS && digit_count(longitude) <= MAX_LON_DIGITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_six_decimals() {
        assert_eq!(round6(12.3456789), 12.345679);
        assert_eq!(round6(-77.59456715), -77.594567);
        assert_eq!(round6(13.0), 13.0);
    }

    #[test]
    fn accepts_ordinary_fixes() {
        assert!(plausible_fix(12.971599, 77.594566));
        assert!(plausible_fix(-33.86882, 151.20929));
        assert!(plausible_fix(0.0, 0.0));
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(!plausible_fix(12.971598765432, 77.594566));
        assert!(!plausible_fix(12.971599, 77.5945667890123));
    }
}
