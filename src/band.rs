//! Amateur band lookup from a dial frequency.

use crate::record::ContactRecord;

/// Label used for frequencies outside every known band.
pub const OUT_OF_BAND: &str = "OOB";

/// Band edges in Hz, low edge inclusive, high edge exclusive.
const BANDS: &[(u64, u64, &str)] = &[
    (1_800_000, 2_000_000, "160m"),
    (3_500_000, 4_000_000, "80m"),
    (5_330_000, 5_404_000, "60m"),
    (7_000_000, 7_300_000, "40m"),
    (10_100_000, 10_150_000, "30m"),
    (14_000_000, 14_350_000, "20m"),
    (18_068_000, 18_168_000, "17m"),
    (21_000_000, 21_450_000, "15m"),
    (24_890_000, 24_990_000, "12m"),
    (28_000_000, 29_700_000, "10m"),
    (50_000_000, 54_000_000, "6m"),
    (144_000_000, 148_000_000, "2m"),
    (222_000_000, 225_000_000, "1.25m"),
    (420_000_000, 450_000_000, "70cm"),
    (902_000_000, 928_000_000, "33cm"),
    (1_240_000_000, 1_300_000_000, "23cm"),
];

/// Returns the band name for a frequency in Hz, or [`OUT_OF_BAND`].
///
/// # Example
///
/// ```
/// use js8_monitor::band::resolve_band;
///
/// assert_eq!(resolve_band(14_078_000), "20m");
/// assert_eq!(resolve_band(13_000_000), "OOB");
/// ```
pub fn resolve_band(hz: u64) -> &'static str {
    BANDS
        .iter()
        .find(|(low, high, _)| (*low..*high).contains(&hz))
        .map(|(_, _, band)| *band)
        .unwrap_or(OUT_OF_BAND)
}

/// Fill in the record's band from its frequency.
///
/// Does nothing when a band is already set or the frequency is zero,
/// missing, or not a number.
pub fn resolve_record_band(record: &mut ContactRecord) {
    if !record.band.is_empty() {
        return;
    }
    if let Some(hz) = record.frequency_hz() {
        record.band = resolve_band(hz).to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use proptest::prelude::*;

    #[test]
    fn test_common_frequencies() {
        assert_eq!(resolve_band(7_078_000), "40m");
        assert_eq!(resolve_band(14_078_000), "20m");
        assert_eq!(resolve_band(3_578_000), "80m");
        assert_eq!(resolve_band(144_178_000), "2m");
        assert_eq!(resolve_band(432_100_000), "70cm");
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(resolve_band(7_000_000), "40m");
        assert_eq!(resolve_band(7_299_999), "40m");
        assert_eq!(resolve_band(7_300_000), OUT_OF_BAND);
        assert_eq!(resolve_band(1_799_999), OUT_OF_BAND);
        assert_eq!(resolve_band(1_240_000_000), "23cm");
    }

    #[test]
    fn test_resolve_record_band() {
        let mut record = ContactRecord::new(&StationConfig::default());
        record.frequency = "14078000".to_string();
        resolve_record_band(&mut record);
        assert_eq!(record.band, "20m");
    }

    #[test]
    fn test_existing_band_not_overwritten() {
        let mut record = ContactRecord::new(&StationConfig::default());
        record.frequency = "7078000".to_string();
        record.band = "20m".to_string();
        resolve_record_band(&mut record);
        assert_eq!(record.band, "20m");
    }

    #[test]
    fn test_zero_or_bad_frequency_is_noop() {
        let mut record = ContactRecord::new(&StationConfig::default());
        resolve_record_band(&mut record);
        assert!(record.band.is_empty());

        record.frequency = "14.078".to_string();
        resolve_record_band(&mut record);
        assert!(record.band.is_empty());

        record.frequency = String::new();
        resolve_record_band(&mut record);
        assert!(record.band.is_empty());
    }

    proptest! {
        #[test]
        fn prop_inside_range_gets_label(idx in 0usize..BANDS.len(), frac in 0.0f64..1.0) {
            let (low, high, label) = BANDS[idx];
            let hz = low + ((high - low - 1) as f64 * frac) as u64;
            prop_assert_eq!(resolve_band(hz), label);
        }

        #[test]
        fn prop_outside_ranges_is_oob(hz in 0u64..2_000_000_000) {
            let inside = BANDS.iter().any(|(low, high, _)| hz >= *low && hz < *high);
            prop_assume!(!inside);
            prop_assert_eq!(resolve_band(hz), OUT_OF_BAND);
        }
    }
}
