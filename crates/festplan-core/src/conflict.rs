use chrono::NaiveDateTime;

use crate::schedule::ScheduledEvent;

/// Events whose interval overlaps `[start, end)`.
///
/// Intervals that merely touch do not conflict. `exclude_id` skips the
/// event being edited. Input order is preserved.
pub fn check_conflict<'a>(
    start: NaiveDateTime,
    end: NaiveDateTime,
    events: &'a [ScheduledEvent],
    exclude_id: Option<&str>,
) -> Vec<&'a ScheduledEvent> {
    events
        .iter()
        .filter(|event| exclude_id != Some(event.id.as_str()))
        .filter(|event| start < event.end && end > event.start)
        .collect()
}
