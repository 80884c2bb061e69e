//! Sectional solar terms (节), the boundaries of the sexagenary months.
//!
//! Sun positions use the low-precision solar theory of Meeus, *Astronomical
//! Algorithms* ch. 25 (about 0.01°, well under a minute of time). Term dates
//! are taken in Beijing time (UTC+8).

use chrono::{Datelike, NaiveDate};

/// Julian day at 2000-01-01 12:00 TT.
const J2000: f64 = 2_451_545.0;
/// `num_days_from_ce` of 2000-01-01.
const DAYS_FROM_CE_2000: i32 = 730_120;
const TROPICAL_YEAR: f64 = 365.242_2;
const BEIJING_OFFSET_DAYS: f64 = 8.0 / 24.0;
const MAX_ITERATIONS: usize = 10;

/// The twelve sectional terms of a Gregorian year, 小寒 first.
pub const JIE_NAMES: [&str; 12] = [
    "小寒", "立春", "惊蛰", "清明", "立夏", "芒种", "小暑", "立秋", "白露", "寒露", "立冬", "大雪",
];

/// Apparent solar longitude of each sectional term, degrees.
const JIE_LONGITUDES: [f64; 12] = [
    285.0, 315.0, 345.0, 15.0, 45.0, 75.0, 105.0, 135.0, 165.0, 195.0, 225.0, 255.0,
];

/// Approximate Gregorian (month, day) of each term, the starting guess.
const JIE_APPROX: [(u32, u32); 12] = [
    (1, 6),
    (2, 4),
    (3, 6),
    (4, 5),
    (5, 6),
    (6, 6),
    (7, 7),
    (8, 8),
    (9, 8),
    (10, 8),
    (11, 7),
    (12, 7),
];

/// Beijing date of sectional term `index` (0 = 小寒 ..= 11 = 大雪) in
/// Gregorian `year`.
///
/// ```
/// use chrono::NaiveDate;
/// use festplan_core::lunar::solar_terms::jie_date;
///
/// // 立春 2026
/// assert_eq!(NaiveDate::from_ymd_opt(2026, 2, 4), jie_date(2026, 1));
/// ```
pub fn jie_date(year: i32, index: usize) -> Option<NaiveDate> {
    let target = *JIE_LONGITUDES.get(index)?;
    let (month, day) = JIE_APPROX[index];
    let guess = NaiveDate::from_ymd_opt(year, month, day)?;

    let mut jde = julian_day_at_noon(guess);
    for _ in 0..MAX_ITERATIONS {
        let diff = (target - apparent_sun_longitude(jde) + 180.0).rem_euclid(360.0) - 180.0;
        jde += diff * TROPICAL_YEAR / 360.0;
        if diff.abs() < 1e-7 {
            break;
        }
    }
    beijing_date(jde, year)
}

/// Solar month containing `date`, as (year starting at 立春, month) with
/// 1 being the 寅 month that opens at 立春 and 12 the 丑 month that opens at
/// 小寒.
pub fn solar_month(date: NaiveDate) -> Option<(i32, u32)> {
    let year = date.year();
    let terms = (0..JIE_LONGITUDES.len())
        .map(|index| jie_date(year, index))
        .collect::<Option<Vec<_>>>()?;

    match terms.partition_point(|&start| start <= date) {
        // Still in the 子 month that opened at 大雪 last year.
        0 => Some((year - 1, 11)),
        1 => Some((year - 1, 12)),
        passed => Some((year, passed as u32 - 1)),
    }
}

fn julian_day_at_noon(date: NaiveDate) -> f64 {
    J2000 + f64::from(date.num_days_from_ce() - DAYS_FROM_CE_2000)
}

/// Apparent geocentric longitude of the sun in degrees, for a Julian
/// ephemeris day.
fn apparent_sun_longitude(jde: f64) -> f64 {
    let t = (jde - J2000) / 36_525.0;
    let mean_longitude = 280.466_46 + 36_000.769_83 * t + 0.000_303_2 * t * t;
    let mean_anomaly = (357.529_11 + 35_999.050_29 * t - 0.000_153_7 * t * t).to_radians();
    let center = (1.914_602 - 0.004_817 * t - 0.000_014 * t * t) * mean_anomaly.sin()
        + (0.019_993 - 0.000_101 * t) * (2.0 * mean_anomaly).sin()
        + 0.000_289 * (3.0 * mean_anomaly).sin();
    let omega = (125.04 - 1_934.136 * t).to_radians();
    (mean_longitude + center - 0.005_69 - 0.004_78 * omega.sin()).rem_euclid(360.0)
}

/// TT - UT in seconds, Espenak and Meeus polynomial fits.
fn delta_t_seconds(year: f64) -> f64 {
    if year < 2050.0 {
        let t = year - 2000.0;
        62.92 + 0.322_17 * t + 0.005_589 * t * t
    } else {
        let u = (year - 1820.0) / 100.0;
        -20.0 + 32.0 * u * u - 0.562_8 * (2150.0 - year)
    }
}

fn beijing_date(jde: f64, year: i32) -> Option<NaiveDate> {
    let ut = jde - delta_t_seconds(f64::from(year)) / 86_400.0;
    let days = (ut + BEIJING_OFFSET_DAYS + 0.5 - J2000).floor();
    let days = i32::try_from(days as i64).ok()?;
    NaiveDate::from_num_days_from_ce_opt(DAYS_FROM_CE_2000.checked_add(days)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn known_sectional_terms() {
        let data = [
            ((2025, 0), (2025, 1, 5)),
            ((2025, 1), (2025, 2, 3)),
            ((2025, 11), (2025, 12, 7)),
            ((2026, 1), (2026, 2, 4)),
            ((2026, 2), (2026, 3, 5)),
            ((2024, 1), (2024, 2, 4)),
        ];
        for ((year, index), (y, m, d)) in data {
            assert_eq!(Some(ymd(y, m, d)), jie_date(year, index), "{} {year}", JIE_NAMES[index]);
        }
        assert_eq!(None, jie_date(2026, 12));
    }

    #[test]
    fn months_change_on_sectional_terms() {
        let data = [
            ((2025, 1, 4), (2024, 11)),
            ((2025, 1, 5), (2024, 12)),
            ((2025, 1, 29), (2024, 12)),
            ((2025, 2, 2), (2024, 12)),
            ((2025, 2, 3), (2025, 1)),
            ((2025, 12, 7), (2025, 11)),
            ((2026, 2, 3), (2025, 12)),
            ((2026, 2, 4), (2026, 1)),
            ((2026, 3, 4), (2026, 1)),
            ((2026, 3, 5), (2026, 2)),
        ];
        for ((y, m, d), expected) in data {
            assert_eq!(Some(expected), solar_month(ymd(y, m, d)), "{y}-{m}-{d}");
        }
    }
}
