//! Raw axis reading to command magnitude

/// Normalizes `raw` against `full_scale_offset` into a percentage in [-100, 100]
///
/// Pure and total: a non-positive or non-finite offset maps everything to 0.
/// Deadzones are the caller's business.
pub fn map(raw: f64, full_scale_offset: f64) -> f64 {
    if !(full_scale_offset.is_finite() && full_scale_offset > 0.0) || !raw.is_finite() {
        return 0.0;
    }
    (raw / full_scale_offset * 100.0).clamp(-100.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const OFFSET: f64 = 32767.0;

    #[test]
    fn zero_maps_to_zero() {
        assert_eq!(map(0.0, OFFSET), 0.0);
        assert_eq!(map(0.0, 1.0), 0.0);
    }

    #[test]
    fn scales_to_percent() {
        assert!((map(-5000.0, OFFSET) + 15.259).abs() < 0.01);
        assert_eq!(map(OFFSET, OFFSET), 100.0);
        assert_eq!(map(-OFFSET, OFFSET), -100.0);
    }

    #[test]
    fn clamps_beyond_full_scale() {
        assert_eq!(map(40000.0, OFFSET), 100.0);
        assert_eq!(map(-40000.0, OFFSET), -100.0);
    }

    #[test]
    fn degenerate_offset_is_neutral() {
        assert_eq!(map(1000.0, 0.0), 0.0);
        assert_eq!(map(1000.0, -5.0), 0.0);
        assert_eq!(map(1000.0, f64::NAN), 0.0);
    }

    proptest! {
        #[test]
        fn bounded(raw in -32767i32..=32767) {
            let m = map(f64::from(raw), OFFSET);
            prop_assert!((-100.0..=100.0).contains(&m));
        }

        #[test]
        fn monotonic(a in -32767i32..=32767, b in -32767i32..=32767) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(map(f64::from(lo), OFFSET) <= map(f64::from(hi), OFFSET));
        }
    }
}
