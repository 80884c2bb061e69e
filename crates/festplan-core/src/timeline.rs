use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::datetime::IntoSolarDate;
use crate::error::InvalidDateError;
use crate::festival::{FestivalName, MinorNewYearMode, festival_for};
use crate::lunar::{LunarDate, Month, lunar_to_solar, solar_to_lunar};
use crate::schedule::ScheduledEvent;

/// Holiday season of one lunar year: Minor New Year of the closing year
/// through the Lantern Festival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayWindow {
    pub lunar_year: i32,
    pub mode: MinorNewYearMode,
    pub start: NaiveDate,
    pub spring_festival: NaiveDate,
    pub end: NaiveDate,
}

impl HolidayWindow {
    pub fn for_lunar_year(
        lunar_year: i32,
        mode: MinorNewYearMode,
    ) -> Result<Self, InvalidDateError> {
        Ok(Self {
            lunar_year,
            mode,
            start: lunar_to_solar(lunar_year - 1, Month::Common(12), mode.lunar_day())?,
            spring_festival: lunar_to_solar(lunar_year, Month::Common(1), 1)?,
            end: lunar_to_solar(lunar_year, Month::Common(1), 15)?,
        })
    }

    /// Window of `today`'s lunar year, or the following one once that
    /// window has ended.
    pub fn upcoming(today: NaiveDate, mode: MinorNewYearMode) -> Result<Self, InvalidDateError> {
        let current = Self::for_lunar_year(solar_to_lunar(today)?.year, mode)?;
        if today > current.end {
            Self::for_lunar_year(current.lunar_year + 1, mode)
        } else {
            Ok(current)
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn notable_days(
        &self,
        events: &[ScheduledEvent],
    ) -> Result<Vec<NotableDay>, InvalidDateError> {
        build_notable_days(self.start, self.end, self.mode, events)
    }
}

/// A day worth showing on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotableDay {
    pub date: NaiveDate,
    pub lunar: LunarDate,
    pub festival: Option<FestivalName>,
    pub is_important: bool,
    pub events: Vec<ScheduledEvent>,
}

impl NotableDay {
    pub fn is_spring_festival(&self) -> bool {
        self.festival == Some(FestivalName::SpringFestival)
    }

    pub fn is_new_years_eve(&self) -> bool {
        self.festival == Some(FestivalName::NewYearsEve)
    }
}

/// Days of `[window_start, window_end]` that carry events or a headline
/// festival, ascending.
///
/// Each kept day lists the events starting on it, ordered by start time.
/// An inverted window yields no days.
#[tracing::instrument(skip(events), fields(events = events.len()))]
pub fn build_notable_days(
    window_start: NaiveDate,
    window_end: NaiveDate,
    mode: MinorNewYearMode,
    events: &[ScheduledEvent],
) -> Result<Vec<NotableDay>, InvalidDateError> {
    if window_start > window_end {
        return Ok(vec![]);
    }

    let mut buckets: BTreeMap<NaiveDate, Vec<&ScheduledEvent>> = BTreeMap::new();
    for event in events {
        let day = event.start.date();
        if (window_start..=window_end).contains(&day) {
            buckets.entry(day).or_default().push(event);
        }
    }

    let mut out = Vec::new();
    for date in window_start.iter_days().take_while(|d| *d <= window_end) {
        let lunar = solar_to_lunar(date)?;
        let festival = festival_for(date, &lunar, mode);
        let is_important = festival.is_some_and(FestivalName::is_headline);

        let mut day_events: Vec<ScheduledEvent> = buckets
            .remove(&date)
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect();
        day_events.sort_by_key(|e| e.start);

        if day_events.is_empty() && !is_important {
            continue;
        }
        out.push(NotableDay {
            date,
            lunar,
            festival,
            is_important,
            events: day_events,
        });
    }

    debug!(kept = out.len(), "compacted timeline");
    Ok(out)
}

/// Events starting on `date`, ordered by start.
pub fn events_on<D: IntoSolarDate>(date: D, events: &[ScheduledEvent]) -> Vec<&ScheduledEvent> {
    let Ok(date) = date.into_solar_date() else {
        return vec![];
    };
    let mut out: Vec<&ScheduledEvent> = events
        .iter()
        .filter(|e| e.start.date() == date)
        .collect();
    out.sort_by_key(|e| e.start);
    out
}

/// Days from `today` to lunar New Year's Day of `lunar_year`; negative once
/// it has passed.
pub fn days_until_spring_festival(
    today: NaiveDate,
    lunar_year: i32,
) -> Result<i64, InvalidDateError> {
    let spring_festival = lunar_to_solar(lunar_year, Month::Common(1), 1)?;
    Ok((spring_festival - today).num_days())
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDateTime};

    use super::*;
    use crate::schedule::ScheduleDraft;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(date: NaiveDate, h: u32) -> NaiveDateTime {
        date.and_hms_opt(h, 0, 0).expect("valid time")
    }

    fn event(title: &str, date: NaiveDate, h: u32) -> ScheduledEvent {
        ScheduleDraft::new(title, at(date, h), at(date, h + 1)).into_event(at(date, 0))
    }

    #[test]
    fn window_for_2026() {
        let north = HolidayWindow::for_lunar_year(2026, MinorNewYearMode::North)
            .expect("window in range");
        assert_eq!(north.start, ymd(2026, 2, 10));
        assert_eq!(north.spring_festival, ymd(2026, 2, 17));
        assert_eq!(north.end, ymd(2026, 3, 3));
        assert_eq!(north.len_days(), 22);

        let south = HolidayWindow::for_lunar_year(2026, MinorNewYearMode::South)
            .expect("window in range");
        assert_eq!(south.start, ymd(2026, 2, 11));
    }

    #[test]
    fn upcoming_rolls_over_after_lantern_festival() {
        let mode = MinorNewYearMode::North;
        let inside = HolidayWindow::upcoming(ymd(2026, 2, 20), mode).expect("in range");
        assert_eq!(inside.lunar_year, 2026);

        let before = HolidayWindow::upcoming(ymd(2026, 1, 20), mode).expect("in range");
        assert_eq!(before.lunar_year, 2026);

        let after = HolidayWindow::upcoming(ymd(2026, 10, 18), mode).expect("in range");
        assert_eq!(after.lunar_year, 2027);
        assert!(after.contains(after.spring_festival));
    }

    #[test]
    fn empty_window_keeps_only_headline_festivals() {
        let window = HolidayWindow::for_lunar_year(2026, MinorNewYearMode::North)
            .expect("window in range");
        let days = window.notable_days(&[]).expect("compaction");
        let festivals: Vec<_> = days.iter().filter_map(|d| d.festival).collect();
        assert_eq!(
            festivals,
            [
                FestivalName::MinorNewYear,
                FestivalName::NewYearsEve,
                FestivalName::SpringFestival,
                FestivalName::LanternFestival,
            ]
        );
        assert!(days.iter().all(|d| d.is_important && d.events.is_empty()));
        assert!(days.iter().any(NotableDay::is_spring_festival));
    }

    #[test]
    fn thirty_day_window_keeps_event_day_and_festival() {
        let start = ymd(2026, 2, 22);
        let end = start + Days::new(29);
        let lantern = start + Days::new(9);
        let busy = start + Days::new(19);
        assert_eq!(lantern, ymd(2026, 3, 3));

        let events = vec![event("探亲", busy, 10)];
        let days = build_notable_days(start, end, MinorNewYearMode::North, &events)
            .expect("compaction");

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, lantern);
        assert_eq!(days[0].festival, Some(FestivalName::LanternFestival));
        assert!(days[0].events.is_empty());
        assert_eq!(days[1].date, busy);
        assert!(!days[1].is_important);
        assert_eq!(days[1].events.len(), 1);
    }

    #[test]
    fn events_are_bucketed_by_start_day_and_sorted() {
        let eve = ymd(2026, 2, 16);
        let events = vec![
            event("守岁", eve, 22),
            event("年夜饭", eve, 18),
            event("逛街", ymd(2026, 2, 12), 15),
            event("outside", ymd(2026, 4, 1), 9),
        ];
        let days = build_notable_days(
            ymd(2026, 2, 10),
            ymd(2026, 3, 3),
            MinorNewYearMode::North,
            &events,
        )
        .expect("compaction");

        let dates: Vec<_> = days.iter().map(|d| d.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(days.len(), 5);

        let eve_day = days.iter().find(|d| d.date == eve).expect("eve kept");
        assert!(eve_day.is_new_years_eve());
        let titles: Vec<_> = eve_day.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["年夜饭", "守岁"]);
        assert_eq!(events_on(eve, &events).len(), 2);
    }

    #[test]
    fn inverted_window_is_empty() {
        let days = build_notable_days(
            ymd(2026, 3, 3),
            ymd(2026, 2, 10),
            MinorNewYearMode::North,
            &[],
        )
        .expect("compaction");
        assert!(days.is_empty());
    }

    #[test]
    fn window_outside_table_fails() {
        let err = build_notable_days(
            ymd(1899, 12, 1),
            ymd(1900, 3, 1),
            MinorNewYearMode::North,
            &[],
        );
        assert!(matches!(err, Err(InvalidDateError::OutOfRange(_))));
        assert!(HolidayWindow::for_lunar_year(1900, MinorNewYearMode::North).is_err());
    }

    #[test]
    fn countdown_is_signed() {
        assert_eq!(days_until_spring_festival(ymd(2026, 2, 10), 2026), Ok(7));
        assert_eq!(days_until_spring_festival(ymd(2026, 2, 17), 2026), Ok(0));
        assert_eq!(days_until_spring_festival(ymd(2026, 2, 20), 2026), Ok(-3));
    }
}
