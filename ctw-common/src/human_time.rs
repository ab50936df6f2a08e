//! Human-readable ticket age formatting
//!
//! Ages are tracked in fractional minutes; the dashboard shows them in the
//! coarsest unit that still reads naturally.

const MINUTES_PER_HOUR: f64 = 60.0;
const MINUTES_PER_DAY: f64 = 1440.0;

/// Format an age in minutes.
///
/// - under one hour: `"45 min"`
/// - under one day: `"2h 05m"`
/// - otherwise: `"3d 04h"`
///
/// Negative and non-finite values render as `"0 min"`.
///
/// # Examples
///
/// ```
/// use ctw_common::human_time::format_age_minutes;
///
/// assert_eq!(format_age_minutes(10.4), "10 min");
/// assert_eq!(format_age_minutes(125.0), "2h 05m");
/// assert_eq!(format_age_minutes(4560.0), "3d 04h");
/// ```
pub fn format_age_minutes(minutes: f64) -> String {
    if !minutes.is_finite() || minutes <= 0.0 {
        return "0 min".to_string();
    }

    if minutes < MINUTES_PER_HOUR {
        return format!("{:.0} min", minutes.floor());
    }

    let total = minutes.floor() as u64;
    if minutes < MINUTES_PER_DAY {
        let hours = total / 60;
        let mins = total % 60;
        format!("{}h {:02}m", hours, mins)
    } else {
        let days = total / 1440;
        let hours = (total % 1440) / 60;
        format!("{}d {:02}h", days, hours)
    }
}

/// Round to two decimal places, the precision shown for mean ages
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
