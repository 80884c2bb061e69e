use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::iso_datetime;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleCategory {
    Visit,
    Dinner,
    Family,
    Other,
}

impl ScheduleCategory {
    pub const ALL: [ScheduleCategory; 4] = [
        ScheduleCategory::Visit,
        ScheduleCategory::Dinner,
        ScheduleCategory::Family,
        ScheduleCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleCategory::Visit => "visit",
            ScheduleCategory::Dinner => "dinner",
            ScheduleCategory::Family => "family",
            ScheduleCategory::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScheduleCategory::Visit => "拜年",
            ScheduleCategory::Dinner => "聚餐",
            ScheduleCategory::Family => "家庭活动",
            ScheduleCategory::Other => "其他",
        }
    }

    /// Hex color used when the category is rendered.
    pub fn color(self) -> &'static str {
        match self {
            ScheduleCategory::Visit => "#ff4d4f",
            ScheduleCategory::Dinner => "#fa8c16",
            ScheduleCategory::Family => "#52c41a",
            ScheduleCategory::Other => "#1890ff",
        }
    }
}

impl fmt::Display for ScheduleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ScheduleCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == needle || c.label() == needle)
            .ok_or_else(|| anyhow!("unknown schedule type: {s} (expected visit, dinner, family or other)"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub id: String,

    pub title: String,

    #[serde(rename = "startDate", with = "iso_datetime")]
    pub start: NaiveDateTime,

    #[serde(rename = "endDate", with = "iso_datetime")]
    pub end: NaiveDateTime,

    #[serde(rename = "type")]
    pub category: ScheduleCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Lead time in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blessing_contacts: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_from_blessing: bool,

    #[serde(with = "iso_datetime")]
    pub created_at: NaiveDateTime,

    #[serde(with = "iso_datetime")]
    pub updated_at: NaiveDateTime,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ScheduledEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.end <= self.start {
            return Err(ValidationError::EndNotAfterStart {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// True when any of title, location or note contains `keyword`,
    /// ignoring case.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        std::iter::once(Some(self.title.as_str()))
            .chain([self.location.as_deref(), self.note.as_deref()])
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// User input for a new event. Id and timestamps are assigned on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleDraft {
    pub title: String,
    pub category: ScheduleCategory,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: Option<String>,
    pub note: Option<String>,
    pub reminder: Option<u32>,
    pub contacts: Vec<String>,
}

impl ScheduleDraft {
    pub fn new(title: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            category: ScheduleCategory::Other,
            start,
            end,
            location: None,
            note: None,
            reminder: None,
            contacts: vec![],
        }
    }

    pub fn into_event(self, now: NaiveDateTime) -> ScheduledEvent {
        ScheduledEvent {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            start: self.start,
            end: self.end,
            category: self.category,
            location: self.location,
            note: self.note,
            reminder: self.reminder,
            contacts: self.contacts,
            blessing_contacts: vec![],
            is_from_blessing: false,
            created_at: now,
            updated_at: now,
            extra: BTreeMap::new(),
        }
    }
}

/// Partial update. `Some(None)` on an optional field clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePatch {
    pub title: Option<String>,
    pub category: Option<ScheduleCategory>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub location: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub reminder: Option<Option<u32>>,
    pub contacts: Option<Vec<String>>,
}

impl SchedulePatch {
    pub fn is_empty(&self) -> bool {
        *self == SchedulePatch::default()
    }

    /// Returns the patched copy; `event` itself is left untouched so callers
    /// can validate before committing.
    pub fn applied_to(&self, event: &ScheduledEvent, now: NaiveDateTime) -> ScheduledEvent {
        let mut out = event.clone();
        if let Some(title) = &self.title {
            out.title = title.clone();
        }
        if let Some(category) = self.category {
            out.category = category;
        }
        if let Some(start) = self.start {
            out.start = start;
        }
        if let Some(end) = self.end {
            out.end = end;
        }
        if let Some(location) = &self.location {
            out.location = location.clone();
        }
        if let Some(note) = &self.note {
            out.note = note.clone();
        }
        if let Some(reminder) = self.reminder {
            out.reminder = reminder;
        }
        if let Some(contacts) = &self.contacts {
            out.contacts = contacts.clone();
        }
        out.updated_at = now;
        out
    }
}
