use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::datetime::IntoSolarDate;
use crate::lunar::{LunarDate, solar_to_lunar};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FestivalName {
    SpringFestival,
    LanternFestival,
    DragonBoat,
    Qixi,
    MidAutumn,
    DoubleNinth,
    Laba,
    MinorNewYear,
    NewYearsEve,
}

impl FestivalName {
    pub const ALL: [FestivalName; 9] = [
        FestivalName::SpringFestival,
        FestivalName::LanternFestival,
        FestivalName::DragonBoat,
        FestivalName::Qixi,
        FestivalName::MidAutumn,
        FestivalName::DoubleNinth,
        FestivalName::Laba,
        FestivalName::MinorNewYear,
        FestivalName::NewYearsEve,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FestivalName::SpringFestival => "春节",
            FestivalName::LanternFestival => "元宵节",
            FestivalName::DragonBoat => "端午节",
            FestivalName::Qixi => "七夕节",
            FestivalName::MidAutumn => "中秋节",
            FestivalName::DoubleNinth => "重阳节",
            FestivalName::Laba => "腊八节",
            FestivalName::MinorNewYear => "小年",
            FestivalName::NewYearsEve => "除夕",
        }
    }

    /// Festivals that bound or anchor the holiday window.
    pub fn is_headline(self) -> bool {
        matches!(
            self,
            FestivalName::MinorNewYear
                | FestivalName::NewYearsEve
                | FestivalName::SpringFestival
                | FestivalName::LanternFestival
        )
    }

    /// Lunar (month, day) for festivals on a fixed lunar date.
    fn fixed_date(self) -> Option<(u32, u32)> {
        match self {
            FestivalName::SpringFestival => Some((1, 1)),
            FestivalName::LanternFestival => Some((1, 15)),
            FestivalName::DragonBoat => Some((5, 5)),
            FestivalName::Qixi => Some((7, 7)),
            FestivalName::MidAutumn => Some((8, 15)),
            FestivalName::DoubleNinth => Some((9, 9)),
            FestivalName::Laba => Some((12, 8)),
            FestivalName::MinorNewYear | FestivalName::NewYearsEve => None,
        }
    }
}

impl fmt::Display for FestivalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Regional convention for the date of Minor New Year.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MinorNewYearMode {
    /// 腊月廿三
    #[default]
    North,
    /// 腊月廿四
    South,
}

impl MinorNewYearMode {
    pub fn lunar_day(self) -> u32 {
        match self {
            MinorNewYearMode::North => 23,
            MinorNewYearMode::South => 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MinorNewYearMode::North => "north",
            MinorNewYearMode::South => "south",
        }
    }
}

impl fmt::Display for MinorNewYearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MinorNewYearMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(MinorNewYearMode::North),
            "south" | "s" => Ok(MinorNewYearMode::South),
            other => Err(anyhow::anyhow!(
                "invalid minor new year mode: {other} (expected north or south)"
            )),
        }
    }
}

/// Festival falling on `date`, if any.
///
/// Missing and invalid dates have no festival.
pub fn is_festival<D: IntoSolarDate>(date: D, mode: MinorNewYearMode) -> Option<FestivalName> {
    let date = date.into_solar_date().ok()?;
    let lunar = solar_to_lunar(date).ok()?;
    festival_for(date, &lunar, mode)
}

/// Same as [`is_festival`] for a day whose lunar form is already known.
pub fn festival_for(
    date: NaiveDate,
    lunar: &LunarDate,
    mode: MinorNewYearMode,
) -> Option<FestivalName> {
    // Leap months match by number, so a leap 5th month repeats 端午节.
    let fixed = FestivalName::ALL
        .into_iter()
        .find(|f| f.fixed_date() == Some((lunar.month, lunar.day)));
    if fixed.is_some() {
        return fixed;
    }

    if lunar.month == 12 && lunar.day == mode.lunar_day() {
        return Some(FestivalName::MinorNewYear);
    }

    if lunar.month == 12 && is_last_day_of_year(date) {
        return Some(FestivalName::NewYearsEve);
    }

    None
}

fn is_last_day_of_year(date: NaiveDate) -> bool {
    date.checked_add_days(Days::new(1))
        .and_then(|next| solar_to_lunar(next).ok())
        .is_some_and(|next| next.is_first_day_of_year())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn fixed_lunar_festivals() {
        let mode = MinorNewYearMode::North;
        assert_eq!(is_festival(ymd(2026, 2, 17), mode), Some(FestivalName::SpringFestival));
        assert_eq!(is_festival(ymd(2026, 3, 3), mode), Some(FestivalName::LanternFestival));
        assert_eq!(is_festival(ymd(2026, 6, 19), mode), Some(FestivalName::DragonBoat));
        assert_eq!(is_festival(ymd(2026, 9, 25), mode), Some(FestivalName::MidAutumn));
        assert_eq!(is_festival(ymd(2026, 3, 4), mode), None);
    }

    #[test]
    fn minor_new_year_follows_mode() {
        let north_day = ymd(2026, 2, 10);
        let south_day = ymd(2026, 2, 11);
        assert_eq!(
            is_festival(north_day, MinorNewYearMode::North),
            Some(FestivalName::MinorNewYear)
        );
        assert_eq!(is_festival(north_day, MinorNewYearMode::South), None);
        assert_eq!(
            is_festival(south_day, MinorNewYearMode::South),
            Some(FestivalName::MinorNewYear)
        );
        assert_eq!(is_festival(south_day, MinorNewYearMode::North), None);
    }

    #[test]
    fn new_years_eve_on_short_and_long_final_months() {
        // 2025's final month has 29 days, 2023's has 30.
        for eve in [ymd(2026, 2, 16), ymd(2024, 2, 9)] {
            assert_eq!(
                is_festival(eve, MinorNewYearMode::North),
                Some(FestivalName::NewYearsEve),
                "{eve}"
            );
        }
        assert_eq!(is_festival(ymd(2024, 2, 8), MinorNewYearMode::North), None);
    }

    #[test]
    fn invalid_input_has_no_festival() {
        assert_eq!(is_festival("garbage", MinorNewYearMode::North), None);
        assert_eq!(is_festival(None::<NaiveDate>, MinorNewYearMode::North), None);
        assert_eq!(is_festival(ymd(1850, 1, 1), MinorNewYearMode::North), None);
    }

    #[test]
    fn detection_is_deterministic() {
        let day = ymd(2026, 2, 16);
        let first = is_festival(day, MinorNewYearMode::South);
        for _ in 0..10 {
            assert_eq!(first, is_festival(day, MinorNewYearMode::South));
        }
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("South".parse::<MinorNewYearMode>().ok(), Some(MinorNewYearMode::South));
        assert_eq!("n".parse::<MinorNewYearMode>().ok(), Some(MinorNewYearMode::North));
        assert!("east".parse::<MinorNewYearMode>().is_err());
        assert_eq!(MinorNewYearMode::default(), MinorNewYearMode::North);
    }

    #[test]
    fn headline_set() {
        let headline: Vec<_> = FestivalName::ALL
            .into_iter()
            .filter(|f| f.is_headline())
            .collect();
        assert_eq!(headline.len(), 4);
        assert!(!FestivalName::MidAutumn.is_headline());
        assert_eq!(FestivalName::NewYearsEve.to_string(), "除夕");
    }
}
