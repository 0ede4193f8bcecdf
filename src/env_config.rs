//! Environment-variable parsing shared by the configuration layer.
//!
//! Every override goes through these helpers so truthy parsing and
//! numeric validation behave the same for all `SCREEN_SNAPSHOT_*` knobs.

/// `1`, `true`, `yes`, or `on`, case-insensitive, trimmed.
pub(crate) fn parse_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

/// Some only for a valid positive (> 0) integer.
pub(crate) fn parse_positive_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values_are_case_and_space_insensitive() {
        for raw in ["1", "true", " TRUE ", "Yes", "on"] {
            assert!(parse_truthy(raw), "{raw:?} should be truthy");
        }
        for raw in ["0", "false", "", "enabled"] {
            assert!(!parse_truthy(raw), "{raw:?} should not be truthy");
        }
    }

    #[test]
    fn positive_integers_reject_zero_and_garbage() {
        assert_eq!(parse_positive_u64(" 2500 "), Some(2500));
        assert_eq!(parse_positive_u64("0"), None);
        assert_eq!(parse_positive_u64("-5"), None);
        assert_eq!(parse_positive_u64("fast"), None);
    }
}
