use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};
use regex::Regex;

use crate::error::InvalidDateError;

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const DATETIME_FORMAT: &str =
  "%Y-%m-%d %H:%M";
const ISO_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M"
];

const NAIVE_DATE_FORMATS: &[&str] =
  &["%Y-%m-%d", "%Y/%m/%d"];

/// Anything the lunar converter accepts
/// as a solar date.
///
/// Missing and unparseable inputs are
/// reported as [`InvalidDateError`]
/// instead of panicking, so display code
/// can turn them into placeholders.
pub trait IntoSolarDate {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>;
}

impl IntoSolarDate for NaiveDate {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    Ok(self)
  }
}

impl IntoSolarDate for NaiveDateTime {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    Ok(self.date())
  }
}

impl IntoSolarDate for &str {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    parse_iso_datetime(self)
      .map(|dt| dt.date())
  }
}

impl IntoSolarDate for &String {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    self.as_str().into_solar_date()
  }
}

impl IntoSolarDate for String {
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    self.as_str().into_solar_date()
  }
}

impl<T: IntoSolarDate> IntoSolarDate
  for Option<T>
{
  fn into_solar_date(
    self
  ) -> Result<NaiveDate, InvalidDateError>
  {
    match self {
      | Some(value) => {
        value.into_solar_date()
      }
      | None => {
        Err(InvalidDateError::Missing)
      }
    }
  }
}

/// Parses an ISO-8601 timestamp into
/// local wall-clock time.
///
/// Offset forms such as browser exports
/// (`2026-02-17T00:30:00.000Z`) are
/// shifted into the local timezone;
/// naive forms are taken as local already.
pub fn parse_iso_datetime(
  raw: &str
) -> Result<NaiveDateTime, InvalidDateError>
{
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(
      InvalidDateError::Missing
    );
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Ok(
      dt.with_timezone(&Local)
        .naive_local()
    );
  }

  for fmt in NAIVE_DATETIME_FORMATS {
    if let Ok(dt) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return Ok(dt);
    }
  }

  for fmt in NAIVE_DATE_FORMATS {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        trimmed, fmt
      )
    {
      return Ok(start_of_day(date));
    }
  }

  Err(InvalidDateError::Unparseable(
    trimmed.to_string()
  ))
}

#[must_use]
pub fn now_local() -> NaiveDateTime {
  Local::now().naive_local()
}

#[must_use]
pub fn format_date(
  dt: NaiveDateTime
) -> String {
  dt.format(DATE_FORMAT).to_string()
}

#[must_use]
pub fn format_datetime(
  dt: NaiveDateTime
) -> String {
  dt.format(DATETIME_FORMAT)
    .to_string()
}

#[must_use]
pub fn is_same_day(
  a: NaiveDateTime,
  b: NaiveDateTime
) -> bool {
  a.date() == b.date()
}

#[must_use]
pub fn is_today(
  dt: NaiveDateTime,
  now: NaiveDateTime
) -> bool {
  is_same_day(dt, now)
}

#[must_use]
pub fn add_days(
  dt: NaiveDateTime,
  days: i64
) -> NaiveDateTime {
  dt + Duration::days(days)
}

/// `None` on overflow.
#[must_use]
pub fn add_hours(
  dt: NaiveDateTime,
  hours: i64
) -> Option<NaiveDateTime> {
  Duration::try_hours(hours).and_then(
    |delta| dt.checked_add_signed(delta)
  )
}

#[must_use]
pub fn start_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// Last millisecond of `date`.
#[must_use]
pub fn end_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  start_of_day(date)
    + Duration::days(1)
    - Duration::milliseconds(1)
}

/// Weeks start on Sunday.
#[must_use]
pub fn start_of_week(
  date: NaiveDate
) -> NaiveDate {
  date
    - Duration::days(i64::from(
      date
        .weekday()
        .num_days_from_sunday()
    ))
}

#[must_use]
pub fn end_of_week(
  date: NaiveDate
) -> NaiveDate {
  start_of_week(date)
    + Duration::days(6)
}

#[must_use]
pub fn start_of_month(
  date: NaiveDate
) -> NaiveDate {
  date
    - Duration::days(i64::from(
      date.day0()
    ))
}

#[must_use]
pub fn end_of_month(
  date: NaiveDate
) -> NaiveDate {
  start_of_month(date)
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .unwrap_or(date)
}

/// Resolves a CLI date expression
/// relative to `now`.
///
/// Accepted forms: `now`, `today`,
/// `tomorrow`, `yesterday`, ISO dates and
/// timestamps, a bare clock time (`8:30`,
/// `3pm`) meaning today, and
/// `<day>@<clock>` / `<date>T<clock>`
/// combinations such as `tomorrow@9am`.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_datetime_expr(
  input: &str,
  now: NaiveDateTime
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  if token.is_empty() {
    return Err(anyhow!(
      "date expression cannot be \
       empty"
    ));
  }

  if let Some(day) =
    parse_day_keyword(token, now)
  {
    return Ok(day);
  }

  if let Ok(dt) =
    parse_iso_datetime(token)
  {
    return Ok(dt);
  }

  if let Some(time) =
    parse_clock_time(token)
  {
    return Ok(now.date().and_time(time));
  }

  let split = token
    .split_once('@')
    .or_else(|| token.split_once('T'));
  if let Some((day_part, clock_part)) =
    split
  {
    let day = parse_day_keyword(
      day_part, now
    )
    .map(|dt| dt.date())
    .or_else(|| {
      parse_iso_datetime(day_part)
        .ok()
        .map(|dt| dt.date())
    });
    let time =
      parse_clock_time(clock_part);
    if let (Some(day), Some(time)) =
      (day, time)
    {
      return Ok(day.and_time(time));
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {token}"
  ))
}

fn parse_day_keyword(
  token: &str,
  now: NaiveDateTime
) -> Option<NaiveDateTime> {
  let today = start_of_day(now.date());
  match token
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "now" => Some(now),
    | "today" => Some(today),
    | "tomorrow" => {
      Some(add_days(today, 1))
    }
    | "yesterday" => {
      Some(add_days(today, -1))
    }
    | _ => None
  }
}

/// `HH:MM[:SS]` or an hour with an
/// am/pm suffix. A bare number is not a
/// clock time.
fn parse_clock_time(
  raw: &str
) -> Option<NaiveTime> {
  let clock_re = Regex::new(
    r"(?i)^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*(am|pm)?$"
  )
  .ok()?;
  let caps =
    clock_re.captures(raw.trim())?;
  let minute_part = caps.get(2);
  let meridiem = caps
    .get(4)
    .map(|m| m.as_str().to_ascii_lowercase());
  if minute_part.is_none()
    && meridiem.is_none()
  {
    return None;
  }

  let mut hour: u32 =
    caps.get(1)?.as_str().parse().ok()?;
  let minute: u32 = match minute_part {
    | Some(m) => m.as_str().parse().ok()?,
    | None => 0
  };
  let second: u32 = match caps.get(3) {
    | Some(s) => s.as_str().parse().ok()?,
    | None => 0
  };

  match meridiem.as_deref() {
    | Some("am") => {
      if !(1..=12).contains(&hour) {
        return None;
      }
      if hour == 12 {
        hour = 0;
      }
    }
    | Some("pm") => {
      if !(1..=12).contains(&hour) {
        return None;
      }
      if hour != 12 {
        hour += 12;
      }
    }
    | _ => {}
  }

  NaiveTime::from_hms_opt(
    hour, minute, second
  )
}

/// Serde adapter storing local
/// timestamps as ISO-8601 strings and
/// rehydrating both naive and offset
/// forms.
pub mod iso_datetime {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt
        .format(super::ISO_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso_datetime(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          crate::datetime::parse_iso_datetime(
            &raw
          )
          .map(Some)
          .map_err(
            serde::de::Error::custom
          )
        }
        | None => Ok(None)
      }
    }
  }
}
