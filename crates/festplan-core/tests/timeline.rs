use chrono::{Days, NaiveDate, NaiveDateTime};
use festplan_core::datastore::DataStore;
use festplan_core::planner::Planner;
use festplan_core::schedule::{ScheduleDraft, ScheduledEvent};
use festplan_core::settings::AppSettings;
use festplan_core::{
    FestivalName, HolidayWindow, MinorNewYearMode, build_notable_days, check_conflict,
    format_lunar, is_festival, lunar_to_solar, solar_to_lunar,
};
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(date: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
    date.and_hms_opt(h, min, 0).expect("valid time")
}

fn event(title: &str, start: NaiveDateTime, end: NaiveDateTime) -> ScheduledEvent {
    ScheduleDraft::new(title, start, end).into_event(at(ymd(2026, 1, 1), 0, 0))
}

#[test]
fn every_supported_day_round_trips() {
    let mut date = ymd(1900, 1, 31);
    let last = ymd(2101, 1, 28);
    while date <= last {
        let lunar = solar_to_lunar(date).expect("in range");
        let back = lunar_to_solar(lunar.year, lunar.lunar_month(), lunar.day).expect("exists");
        assert_eq!(back, date, "{lunar:?}");
        date = date + Days::new(11);
    }
    assert!(solar_to_lunar(ymd(1900, 1, 30)).is_err());
    assert!(solar_to_lunar(ymd(2101, 1, 29)).is_err());
}

#[test]
fn festivals_of_2026() {
    let north = MinorNewYearMode::North;
    let cases = [
        (ymd(2026, 2, 17), FestivalName::SpringFestival),
        (ymd(2026, 3, 3), FestivalName::LanternFestival),
        (ymd(2026, 6, 19), FestivalName::DragonBoat),
        (ymd(2026, 8, 19), FestivalName::Qixi),
        (ymd(2026, 9, 25), FestivalName::MidAutumn),
        (ymd(2026, 10, 18), FestivalName::DoubleNinth),
    ];
    for (date, festival) in cases {
        assert_eq!(is_festival(date, north), Some(festival), "{date}");
        assert_eq!(is_festival(date, north), is_festival(date, north));
    }
    assert_eq!(is_festival(ymd(2026, 10, 19), north), None);
}

#[test]
fn minor_new_year_follows_mode() {
    let day_23 = ymd(2026, 2, 10);
    let day_24 = ymd(2026, 2, 11);

    assert_eq!(is_festival(day_23, MinorNewYearMode::North), Some(FestivalName::MinorNewYear));
    assert_eq!(is_festival(day_23, MinorNewYearMode::South), None);
    assert_eq!(is_festival(day_24, MinorNewYearMode::South), Some(FestivalName::MinorNewYear));
    assert_eq!(is_festival(day_24, MinorNewYearMode::North), None);

    let north = HolidayWindow::for_lunar_year(2026, MinorNewYearMode::North).expect("window");
    let south = HolidayWindow::for_lunar_year(2026, MinorNewYearMode::South).expect("window");
    assert_eq!(south.start, north.start + Days::new(1));
    assert_eq!(north.end, south.end);
}

#[test]
fn new_years_eve_after_short_and_long_twelfth_months() {
    // 2024-01 ended a 30-day twelfth month, 2025-01 a 29-day one.
    for (eve, last_day) in [(ymd(2024, 2, 9), 30), (ymd(2025, 1, 28), 29)] {
        let lunar = solar_to_lunar(eve).expect("in range");
        assert_eq!((lunar.month, lunar.day), (12, last_day));
        for mode in [MinorNewYearMode::North, MinorNewYearMode::South] {
            assert_eq!(is_festival(eve, mode), Some(FestivalName::NewYearsEve));
        }
    }
}

#[test]
fn touching_intervals_do_not_conflict() {
    let day = ymd(2026, 2, 17);
    let events = vec![event("A", at(day, 8, 0), at(day, 9, 0))];

    assert_eq!(check_conflict(at(day, 8, 30), at(day, 9, 30), &events, None).len(), 1);
    assert!(check_conflict(at(day, 9, 0), at(day, 10, 0), &events, None).is_empty());
    assert!(
        check_conflict(at(day, 8, 30), at(day, 9, 30), &events, Some(events[0].id.as_str()))
            .is_empty()
    );
}

#[test]
fn thirty_day_window_keeps_only_event_day_and_headline_festival() {
    // Lantern Festival (2026-03-03) is day 10 of this window, the event
    // sits on day 20.
    let start = ymd(2026, 2, 22);
    let end = start + Days::new(29);
    let event_day = start + Days::new(19);
    let events = vec![event("踏青", at(event_day, 9, 0), at(event_day, 11, 0))];

    let days = build_notable_days(start, end, MinorNewYearMode::North, &events).expect("days");
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, ymd(2026, 3, 3));
    assert_eq!(days[0].festival, Some(FestivalName::LanternFestival));
    assert!(days[0].events.is_empty());
    assert_eq!(days[1].date, event_day);
    assert!(!days[1].is_important);
    assert_eq!(days[1].events.len(), 1);
}

#[test]
fn quiet_window_compacts_to_nothing() {
    let days = build_notable_days(ymd(2026, 4, 1), ymd(2026, 4, 30), MinorNewYearMode::North, &[])
        .expect("days");
    assert!(days.is_empty());

    let inverted =
        build_notable_days(ymd(2026, 3, 3), ymd(2026, 2, 10), MinorNewYearMode::North, &[])
            .expect("days");
    assert!(inverted.is_empty());
}

#[test]
fn sentinel_labels_never_fail() {
    assert_eq!(format_lunar(None::<NaiveDate>), "请选择日期");
    assert_eq!(format_lunar("not a date"), "无效日期");
    assert_eq!(format_lunar(ymd(1800, 1, 1)), "无效日期");
    assert_eq!(format_lunar(ymd(2026, 2, 17)), "农历正初一");
}

#[test]
fn planner_timeline_over_a_stored_window() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open");
    let mut planner = Planner::new(store, AppSettings::default());
    let eve = ymd(2026, 2, 16);
    let now = at(ymd(2026, 1, 20), 9, 0);

    planner
        .add_schedule(ScheduleDraft::new("年夜饭", at(eve, 18, 0), at(eve, 21, 0)), now)
        .expect("add dinner");
    planner
        .add_schedule(ScheduleDraft::new("贴春联", at(eve, 9, 0), at(eve, 10, 0)), now)
        .expect("add couplets");
    planner
        .add_schedule(
            ScheduleDraft::new("元宵后", at(ymd(2026, 3, 4), 9, 0), at(ymd(2026, 3, 4), 10, 0)),
            now,
        )
        .expect("add outside window");

    let (window, days) = planner.timeline(ymd(2026, 1, 20), None).expect("timeline");
    assert_eq!(window.lunar_year, 2026);
    assert_eq!(window.start, ymd(2026, 2, 10));
    assert_eq!(window.end, ymd(2026, 3, 3));

    let dates: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();
    assert_eq!(dates, [ymd(2026, 2, 10), eve, ymd(2026, 2, 17), ymd(2026, 3, 3)]);

    let eve_day = &days[1];
    assert!(eve_day.is_new_years_eve());
    let titles: Vec<&str> = eve_day.events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["贴春联", "年夜饭"]);

    planner.set_mode(MinorNewYearMode::South);
    let (window, days) = planner.timeline(ymd(2026, 1, 20), Some(2026)).expect("timeline");
    assert_eq!(window.start, ymd(2026, 2, 11));
    assert_eq!(days[0].date, ymd(2026, 2, 11));
}
