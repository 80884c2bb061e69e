use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::lunar::Month;

/// The only failure of the calendar core: a date that is absent, unparseable
/// or outside the lunar table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDateError {
    #[error("date is required")]
    Missing,
    #[error("date is invalid: {0:?}")]
    Unparseable(String),
    #[error("date {0} is outside the supported lunar calendar range")]
    OutOfRange(NaiveDate),
    #[error("lunar date {year}-{month}-{day} does not exist")]
    NoSuchLunarDate { year: i32, month: Month, day: u32 },
}

/// Record invariants checked on the repository write path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("schedule title cannot be empty")]
    EmptyTitle,
    #[error("contact name cannot be empty")]
    EmptyName,
    #[error("end time {end} must be after start time {start}")]
    EndNotAfterStart {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}
