//! Solar ⇄ lunar calendar conversion.
//!
//! Backed by a compact table holding, for every lunar year 1900..=2100, which
//! months are long (30 days), which month (if any) is doubled as a leap month
//! and how long that leap month is. Lunar 1900-01-01 falls on 1900-01-31, so
//! the supported solar range is 1900-01-31 ..= 2101-01-28.
//!
//! ```
//! use chrono::NaiveDate;
//! use festplan_core::lunar::{Month, lunar_to_solar, solar_to_lunar};
//!
//! let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
//! let lunar = solar_to_lunar(date).unwrap();
//! assert_eq!((2026, 1, 1), (lunar.year, lunar.month, lunar.day));
//! assert_eq!(date, lunar_to_solar(2026, Month::Common(1), 1).unwrap());
//! ```

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::datetime::IntoSolarDate;
use crate::error::InvalidDateError;

pub mod names;
pub mod solar_terms;

pub const FIRST_LUNAR_YEAR: i32 = 1900;
pub const LAST_LUNAR_YEAR: i32 = 2100;

/// `num_days_from_ce` of 1900-01-31, lunar 1900-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 693_626;
/// `num_days_from_ce` of 1900-01-01, a 甲戌 day.
const JIAXU_DAYS_FROM_CE: i32 = 693_596;

const NO_DATE_LABEL: &str = "请选择日期";
const UNKNOWN_DATE_LABEL: &str = "未知日期";
const INVALID_DATE_LABEL: &str = "无效日期";

/// Per-year month lengths, lunar 1900 first.
///
/// - bits 0..4: leap month number, 0 when the year has none
/// - bits 4..16: month 12 down to month 1 (`0x8000`), set when 30 days long
/// - bit 16: set when the leap month is 30 days long
const LUNAR_INFO: [u32; 201] = [
    0x04bd8, 0x04ae0, 0x0a570, 0x054d5, 0x0d260, 0x0d950, 0x16554, 0x056a0, 0x09ad0, 0x055d2,
    0x04ae0, 0x0a5b6, 0x0a4d0, 0x0d250, 0x1d255, 0x0b540, 0x0d6a0, 0x0ada2, 0x095b0, 0x14977,
    0x04970, 0x0a4b0, 0x0b4b5, 0x06a50, 0x06d40, 0x1ab54, 0x02b60, 0x09570, 0x052f2, 0x04970,
    0x06566, 0x0d4a0, 0x0ea50, 0x16a95, 0x05ad0, 0x02b60, 0x186e3, 0x092e0, 0x1c8d7, 0x0c950,
    0x0d4a0, 0x1d8a6, 0x0b550, 0x056a0, 0x1a5b4, 0x025d0, 0x092d0, 0x0d2b2, 0x0a950, 0x0b557,
    0x06ca0, 0x0b550, 0x15355, 0x04da0, 0x0a5b0, 0x14573, 0x052b0, 0x0a9a8, 0x0e950, 0x06aa0,
    0x0aea6, 0x0ab50, 0x04b60, 0x0aae4, 0x0a570, 0x05260, 0x0f263, 0x0d950, 0x05b57, 0x056a0,
    0x096d0, 0x04dd5, 0x04ad0, 0x0a4d0, 0x0d4d4, 0x0d250, 0x0d558, 0x0b540, 0x0b6a0, 0x195a6,
    0x095b0, 0x049b0, 0x0a974, 0x0a4b0, 0x0b27a, 0x06a50, 0x06d40, 0x0af46, 0x0ab60, 0x09570,
    0x04af5, 0x04970, 0x064b0, 0x074a3, 0x0ea50, 0x06b58, 0x05ac0, 0x0ab60, 0x096d5, 0x092e0,
    0x0c960, 0x0d954, 0x0d4a0, 0x0da50, 0x07552, 0x056a0, 0x0abb7, 0x025d0, 0x092d0, 0x0cab5,
    0x0a950, 0x0b4a0, 0x0baa4, 0x0ad50, 0x055d9, 0x04ba0, 0x0a5b0, 0x15176, 0x052b0, 0x0a930,
    0x07954, 0x06aa0, 0x0ad50, 0x05b52, 0x04b60, 0x0a6e6, 0x0a4e0, 0x0d260, 0x0ea65, 0x0d530,
    0x05aa0, 0x076a3, 0x096d0, 0x04afb, 0x04ad0, 0x0a4d0, 0x1d0b6, 0x0d250, 0x0d520, 0x0dd45,
    0x0b5a0, 0x056d0, 0x055b2, 0x049b0, 0x0a577, 0x0a4b0, 0x0aa50, 0x1b255, 0x06d20, 0x0ada0,
    0x14b63, 0x09370, 0x049f8, 0x04970, 0x064b0, 0x168a6, 0x0ea50, 0x06aa0, 0x1a6c4, 0x0aae0,
    0x092e0, 0x0d2e3, 0x0c960, 0x0d557, 0x0d4a0, 0x0da50, 0x05d55, 0x056a0, 0x0a6d0, 0x055d4,
    0x052d0, 0x0a9b8, 0x0a950, 0x0b4a0, 0x0b6a6, 0x0ad50, 0x055a0, 0x0aba4, 0x0a5b0, 0x052b0,
    0x0b273, 0x06930, 0x07337, 0x06aa0, 0x0ad50, 0x14b55, 0x04b60, 0x0a570, 0x054e4, 0x0d160,
    0x0e968, 0x0d520, 0x0daa0, 0x16aa6, 0x056d0, 0x04ae0, 0x0a9d4, 0x0a2d0, 0x0d150, 0x0f252,
    0x0d520,
];

/// A lunar month: `Common` for a regular month, `Leap` for the doubled month
/// that follows the regular month with the same number.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Month {
    Common(u32),
    Leap(u32),
}

impl Month {
    /// Month number regardless of leap status.
    pub fn num(&self) -> u32 {
        match self {
            Month::Common(v) | Month::Leap(v) => *v,
        }
    }

    pub fn is_leap(&self) -> bool {
        matches!(self, Month::Leap(_))
    }

    pub fn name(&self) -> Option<String> {
        names::month(*self)
    }
}

impl From<u32> for Month {
    fn from(value: u32) -> Self {
        Month::Common(value)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Month::Common(m) => write!(f, "{m}"),
            Month::Leap(m) => write!(f, "leap {m}"),
        }
    }
}

/// Lunar representation of a solar day. Always derived, never stored on its
/// own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunarDate {
    pub year: i32,
    /// 1..=12; leap months share the number of the month they follow.
    pub month: u32,
    pub is_leap_month: bool,
    pub day: u32,
    pub month_name: String,
    pub day_name: String,
    pub year_name: String,
    pub ganzhi_year: String,
    pub ganzhi_month: String,
    pub ganzhi_day: String,
    pub zodiac: String,
}

impl LunarDate {
    fn new(
        year: i32,
        month: Month,
        day: u32,
        solar: NaiveDate,
    ) -> Result<Self, InvalidDateError> {
        let out_of_range = || InvalidDateError::OutOfRange(solar);
        let days_since_jiaxu = i64::from(solar.num_days_from_ce() - JIAXU_DAYS_FROM_CE);
        // The month pillar turns over at sectional terms, not at new moons.
        let (pillar_year, pillar_month) =
            solar_terms::solar_month(solar).ok_or_else(out_of_range)?;
        Ok(Self {
            year,
            month: month.num(),
            is_leap_month: month.is_leap(),
            day,
            month_name: month.name().ok_or_else(out_of_range)?,
            day_name: names::day(day).ok_or_else(out_of_range)?,
            year_name: names::year(year),
            ganzhi_year: names::sexagenary(names::year_sexagenary_index(year)),
            ganzhi_month: names::sexagenary(names::month_sexagenary_index(
                pillar_year,
                pillar_month,
            )),
            ganzhi_day: names::sexagenary(names::day_sexagenary_index(days_since_jiaxu)),
            zodiac: names::zodiac(year).to_string(),
        })
    }

    /// Month including its leap status, for feeding back into
    /// [`lunar_to_solar`].
    pub fn lunar_month(&self) -> Month {
        if self.is_leap_month {
            Month::Leap(self.month)
        } else {
            Month::Common(self.month)
        }
    }

    pub fn is_first_day_of_year(&self) -> bool {
        self.month == 1 && self.day == 1 && !self.is_leap_month
    }
}

fn info(year: i32) -> u32 {
    LUNAR_INFO[(year - FIRST_LUNAR_YEAR) as usize]
}

fn year_supported(year: i32) -> bool {
    (FIRST_LUNAR_YEAR..=LAST_LUNAR_YEAR).contains(&year)
}

/// Leap month of `year`, if it has one. `None` also for unsupported years.
pub fn leap_month(year: i32) -> Option<u32> {
    if !year_supported(year) {
        return None;
    }
    match info(year) & 0xf {
        0 => None,
        m => Some(m),
    }
}

/// Length of `month` in `year`, or `None` when that month does not exist.
pub fn month_days(year: i32, month: Month) -> Option<u32> {
    if !year_supported(year) || !(1..=12).contains(&month.num()) {
        return None;
    }
    let bits = info(year);
    match month {
        Month::Common(m) => Some(if bits & (0x10000 >> m) != 0 { 30 } else { 29 }),
        Month::Leap(m) if leap_month(year) == Some(m) => {
            Some(if bits & 0x10000 != 0 { 30 } else { 29 })
        }
        Month::Leap(_) => None,
    }
}

/// Months of `year` in calendar order, the leap month right after its
/// regular namesake.
fn months_of(year: i32) -> impl Iterator<Item = (Month, u32)> {
    let leap = leap_month(year);
    (1..=12u32)
        .flat_map(move |m| {
            let leap_after = (leap == Some(m)).then_some(Month::Leap(m));
            std::iter::once(Month::Common(m)).chain(leap_after)
        })
        .filter_map(move |month| month_days(year, month).map(|days| (month, days)))
}

/// Number of days in lunar `year`, 0 for unsupported years.
pub fn year_days(year: i32) -> u32 {
    months_of(year).map(|(_, days)| days).sum()
}

/// Converts a solar date to its lunar representation.
///
/// Fails with [`InvalidDateError`] when the input is missing, cannot be
/// parsed, or lies outside the table.
pub fn solar_to_lunar<D: IntoSolarDate>(date: D) -> Result<LunarDate, InvalidDateError> {
    let date = date.into_solar_date()?;
    let mut offset = date.num_days_from_ce() - EPOCH_DAYS_FROM_CE;
    if offset < 0 {
        return Err(InvalidDateError::OutOfRange(date));
    }

    let mut year = FIRST_LUNAR_YEAR;
    loop {
        if year > LAST_LUNAR_YEAR {
            return Err(InvalidDateError::OutOfRange(date));
        }
        let days = year_days(year) as i32;
        if offset < days {
            break;
        }
        offset -= days;
        year += 1;
    }

    for (month, days) in months_of(year) {
        let days = days as i32;
        if offset < days {
            return LunarDate::new(year, month, offset as u32 + 1, date);
        }
        offset -= days;
    }

    Err(InvalidDateError::OutOfRange(date))
}

/// Converts a lunar date to the solar calendar.
///
/// A plain `u32` month selects the regular month; pass [`Month::Leap`] to
/// address a leap month.
pub fn lunar_to_solar(
    year: i32,
    month: impl Into<Month>,
    day: u32,
) -> Result<NaiveDate, InvalidDateError> {
    let month = month.into();
    let missing = || InvalidDateError::NoSuchLunarDate { year, month, day };

    let length = month_days(year, month).ok_or_else(missing)?;
    if !(1..=length).contains(&day) {
        return Err(missing());
    }

    let mut offset: i64 = (FIRST_LUNAR_YEAR..year)
        .map(|y| i64::from(year_days(y)))
        .sum();
    offset += months_of(year)
        .take_while(|(m, _)| *m != month)
        .map(|(_, days)| i64::from(days))
        .sum::<i64>();
    offset += i64::from(day - 1);

    let days_from_ce = i64::from(EPOCH_DAYS_FROM_CE) + offset;
    i32::try_from(days_from_ce)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(missing)
}

/// Compact label such as `农历正初一`.
///
/// Never fails: a missing date renders as `请选择日期`, anything unparseable
/// or outside the table as `无效日期`.
pub fn format_lunar<D: IntoSolarDate>(date: D) -> String {
    match date.into_solar_date().and_then(solar_to_lunar) {
        Ok(lunar) => format!("农历{}{}", lunar.month_name, lunar.day_name),
        Err(InvalidDateError::Missing) => NO_DATE_LABEL.to_string(),
        Err(_) => INVALID_DATE_LABEL.to_string(),
    }
}

/// Long label such as `二〇二六年正初一`.
pub fn format_lunar_full<D: IntoSolarDate>(date: D) -> String {
    match date.into_solar_date().and_then(solar_to_lunar) {
        Ok(lunar) => format!("{}年{}{}", lunar.year_name, lunar.month_name, lunar.day_name),
        Err(InvalidDateError::Missing) => UNKNOWN_DATE_LABEL.to_string(),
        Err(_) => INVALID_DATE_LABEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn known_dates() {
        use Month::*;
        let data = [
            ((1900, 1, 31), (1900, Common(1), 1)),
            ((2000, 1, 1), (1999, Common(11), 25)),
            ((2017, 1, 27), (2016, Common(12), 30)),
            ((2017, 7, 22), (2017, Common(6), 29)),
            ((2017, 7, 23), (2017, Leap(6), 1)),
            ((2017, 12, 17), (2017, Common(10), 30)),
            ((2024, 2, 9), (2023, Common(12), 30)),
            ((2024, 2, 10), (2024, Common(1), 1)),
            ((2025, 1, 29), (2025, Common(1), 1)),
            ((2026, 2, 10), (2025, Common(12), 23)),
            ((2026, 2, 16), (2025, Common(12), 29)),
            ((2026, 2, 17), (2026, Common(1), 1)),
            ((2026, 3, 3), (2026, Common(1), 15)),
            ((2026, 9, 25), (2026, Common(8), 15)),
            ((2057, 9, 27), (2057, Common(8), 29)),
            ((2057, 9, 28), (2057, Common(9), 1)),
            ((2057, 10, 27), (2057, Common(9), 30)),
            ((2060, 4, 29), (2060, Common(3), 29)),
            ((2060, 4, 30), (2060, Common(4), 1)),
            ((2060, 5, 29), (2060, Common(4), 30)),
            ((2101, 1, 28), (2100, Common(12), 29)),
        ];
        for ((y, m, d), (ly, lm, ld)) in data {
            let lunar = solar_to_lunar(ymd(y, m, d)).expect("in range");
            assert_eq!(
                (ly, lm, ld),
                (lunar.year, lunar.lunar_month(), lunar.day),
                "{y}-{m}-{d}"
            );
        }
    }

    #[test]
    fn names_for_spring_festival_2026() {
        let lunar = solar_to_lunar(ymd(2026, 2, 17)).expect("in range");
        assert_eq!("正", lunar.month_name);
        assert_eq!("初一", lunar.day_name);
        assert_eq!("二〇二六", lunar.year_name);
        assert_eq!("丙午", lunar.ganzhi_year);
        assert_eq!("庚寅", lunar.ganzhi_month);
        assert_eq!("壬戌", lunar.ganzhi_day);
        assert_eq!("马", lunar.zodiac);
    }

    #[test]
    fn month_pillars_turn_over_at_lichun() {
        let data = [
            ((2025, 1, 29), "丁丑"),
            ((2025, 2, 2), "丁丑"),
            ((2025, 2, 3), "戊寅"),
            ((2026, 2, 3), "己丑"),
            ((2026, 2, 4), "庚寅"),
            ((2026, 2, 10), "庚寅"),
            ((2026, 3, 5), "辛卯"),
        ];
        for ((y, m, d), expected) in data {
            let lunar = solar_to_lunar(ymd(y, m, d)).expect("in range");
            assert_eq!(expected, lunar.ganzhi_month, "{y}-{m}-{d}");
        }
        // 2026-02-10 is still lunar 2025 but already in the 寅 month.
        assert_eq!(2025, solar_to_lunar(ymd(2026, 2, 10)).expect("in range").year);
    }

    #[test]
    fn day_pillars() {
        for ((y, m, d), expected) in [((2000, 1, 1), "戊午"), ((1949, 10, 1), "甲子")] {
            let lunar = solar_to_lunar(ymd(y, m, d)).expect("in range");
            assert_eq!(expected, lunar.ganzhi_day);
        }
    }

    #[test]
    fn round_trips_every_day_including_leap_months() {
        for date in ymd(2016, 1, 1).iter_days().take_while(|d| *d <= ymd(2027, 12, 31)) {
            let lunar = solar_to_lunar(date).expect("in range");
            let back = lunar_to_solar(lunar.year, lunar.lunar_month(), lunar.day)
                .expect("existing lunar date");
            assert_eq!(date, back);
        }
    }

    #[test]
    fn out_of_range_dates_fail() {
        assert_eq!(
            solar_to_lunar(ymd(1900, 1, 30)),
            Err(InvalidDateError::OutOfRange(ymd(1900, 1, 30)))
        );
        assert_eq!(
            solar_to_lunar(ymd(2101, 1, 29)),
            Err(InvalidDateError::OutOfRange(ymd(2101, 1, 29)))
        );
        assert_eq!(solar_to_lunar(None::<NaiveDate>), Err(InvalidDateError::Missing));
    }

    #[test]
    fn nonexistent_lunar_dates_fail() {
        assert!(lunar_to_solar(2025, Month::Common(12), 30).is_err());
        assert!(lunar_to_solar(2026, Month::Leap(6), 1).is_err());
        assert!(lunar_to_solar(2026, Month::Common(13), 1).is_err());
        assert!(lunar_to_solar(1899, Month::Common(1), 1).is_err());
        assert_eq!(lunar_to_solar(2025, Month::Leap(6), 1), Ok(ymd(2025, 7, 25)));
    }

    #[test]
    fn leap_table_matches_known_years() {
        assert_eq!(leap_month(2017), Some(6));
        assert_eq!(leap_month(2020), Some(4));
        assert_eq!(leap_month(2023), Some(2));
        assert_eq!(leap_month(2026), None);
        assert_eq!(year_days(2025), 384);
    }

    #[test]
    fn format_lunar_sentinels() {
        assert_eq!("农历正初一", format_lunar(ymd(2026, 2, 17)));
        assert_eq!("农历腊廿三", format_lunar(ymd(2026, 2, 10)));
        assert_eq!("请选择日期", format_lunar(None::<NaiveDate>));
        assert_eq!("请选择日期", format_lunar(""));
        assert_eq!("无效日期", format_lunar("not-a-date"));
        assert_eq!("无效日期", format_lunar(ymd(1800, 1, 1)));
        assert_eq!("二〇二六年正初一", format_lunar_full("2026-02-17T08:00:00"));
        assert_eq!("未知日期", format_lunar_full(None::<&str>));
    }
}
