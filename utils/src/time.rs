//! Duration formatting for log fields.

const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

/// Render seconds as the two most significant units, dropping a zero
/// second unit: `45s`, `5m`, `5m 1s`, `3h 2m`.
pub fn format_duration(secs: u64) -> String {
    let Some(i) = UNITS.iter().position(|(size, _)| secs >= *size) else {
        return "0s".to_string();
    };
    let (size, unit) = UNITS[i];
    let mut out = format!("{}{unit}", secs / size);
    if let Some((next, next_unit)) = UNITS.get(i + 1) {
        let rest = (secs % size) / next;
        if rest > 0 {
            out.push_str(&format!(" {rest}{next_unit}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_seconds() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
    }

    #[test]
    fn drops_empty_minor_unit() {
        assert_eq!(format_duration(300), "5m");
        assert_eq!(format_duration(86_400), "1d");
    }

    #[test]
    fn keeps_two_units() {
        assert_eq!(format_duration(301), "5m 1s");
        assert_eq!(format_duration(3 * 3600 + 120), "3h 2m");
        assert_eq!(format_duration(2 * 86_400 + 3600 + 59), "2d 1h");
    }
}
