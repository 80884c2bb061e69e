//! Chinese names for lunar dates: months, days, years, sexagenary cycle and
//! zodiac.

use super::Month;

const YEAR_DIGITS: [&str; 10] = ["〇", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

/// Units digit of a day name; index 0 is 十 for 初十, 二十 and 三十.
const DAY_DIGITS: [&str; 10] = ["十", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

const MONTHS: [&str; 12] = [
    "正", "二", "三", "四", "五", "六", "七", "八", "九", "十", "冬", "腊",
];

const STEMS: [&str; 10] = ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"];

const BRANCHES: [&str; 12] = [
    "子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥",
];

const ZODIAC: [&str; 12] = [
    "鼠", "牛", "虎", "兔", "龙", "蛇", "马", "羊", "猴", "鸡", "狗", "猪",
];

/// Bare month name as used in compact labels, prefixed by 闰 for a leap
/// month. `None` when the number is outside `1..=12`.
///
/// ```
/// use festplan_core::lunar::{names, Month};
///
/// assert_eq!(Some("正".to_string()), names::month(Month::Common(1)));
/// assert_eq!(Some("闰六".to_string()), names::month(Month::Leap(6)));
/// assert_eq!(Some("腊".to_string()), names::month(Month::Common(12)));
/// assert_eq!(None, names::month(Month::Common(13)));
/// ```
pub fn month(m: Month) -> Option<String> {
    let name = MONTHS.get(m.num().checked_sub(1)? as usize)?;
    let prefix = if m.is_leap() { "闰" } else { "" };
    Some(format!("{prefix}{name}"))
}

/// Day name, 初一 through 三十; `None` outside `1..=30`.
pub fn day(d: u32) -> Option<String> {
    let tens = match d {
        1..=10 => "初",
        11..=19 => "十",
        20 => "二",
        21..=29 => "廿",
        30 => "三",
        _ => return None,
    };
    Some(format!("{tens}{}", DAY_DIGITS[(d % 10) as usize]))
}

/// Year read digit by digit, e.g. `二〇二六`.
pub fn year(y: i32) -> String {
    y.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|digit| YEAR_DIGITS[digit as usize])
        .collect()
}

/// Stem-branch pair for a sexagenary index, 0 being 甲子.
pub fn sexagenary(index: u32) -> String {
    let index = index % 60;
    format!(
        "{}{}",
        STEMS[(index % 10) as usize],
        BRANCHES[(index % 12) as usize]
    )
}

/// Year pillar. Changes on lunar new year, not on 立春.
pub fn year_sexagenary_index(lunar_year: i32) -> u32 {
    (lunar_year - 4).rem_euclid(60) as u32
}

/// Month pillar of solar `month` (1 = 寅 ..= 12 = 丑) in the year that
/// starts at 立春 of `solar_year`, see [`super::solar_terms::solar_month`].
pub fn month_sexagenary_index(solar_year: i32, month: u32) -> u32 {
    let year_stem = (solar_year - 4).rem_euclid(10) as u32;
    (year_stem % 5 * 12 + 2 + month.saturating_sub(1)) % 60
}

/// Day pillar from the day count since a 甲戌 reference day.
pub fn day_sexagenary_index(days_since_jiaxu: i64) -> u32 {
    (days_since_jiaxu + 10).rem_euclid(60) as u32
}

pub fn zodiac(lunar_year: i32) -> &'static str {
    ZODIAC[(lunar_year - 4).rem_euclid(12) as usize]
}
