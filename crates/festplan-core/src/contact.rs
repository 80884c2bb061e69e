use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::iso_datetime;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BlessingMethod {
    InPerson,
    Phone,
    Video,
    Message,
    Batch,
}

impl BlessingMethod {
    pub const ALL: [BlessingMethod; 5] = [
        BlessingMethod::InPerson,
        BlessingMethod::Phone,
        BlessingMethod::Video,
        BlessingMethod::Message,
        BlessingMethod::Batch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlessingMethod::InPerson => "in-person",
            BlessingMethod::Phone => "phone",
            BlessingMethod::Video => "video",
            BlessingMethod::Message => "message",
            BlessingMethod::Batch => "batch",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BlessingMethod::InPerson => "当面",
            BlessingMethod::Phone => "电话",
            BlessingMethod::Video => "视频",
            BlessingMethod::Message => "消息",
            BlessingMethod::Batch => "批量",
        }
    }
}

impl fmt::Display for BlessingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlessingMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        BlessingMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == needle || m.label() == needle)
            .ok_or_else(|| anyhow!("unknown blessing method: {s}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlessingRecord {
    pub is_blessed: bool,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_datetime::option"
    )]
    pub blessing_time: Option<NaiveDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blessing_method: Option<BlessingMethod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_packet: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Event created for this blessing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub relationship: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blessing_record: Option<BlessingRecord>,

    #[serde(with = "iso_datetime")]
    pub created_at: NaiveDateTime,

    #[serde(with = "iso_datetime")]
    pub updated_at: NaiveDateTime,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Contact {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    pub fn is_blessed(&self) -> bool {
        self.blessing_record.as_ref().is_some_and(|r| r.is_blessed)
    }

    /// Case-insensitive match on name, relationship and address, plain
    /// substring match on phone. An empty keyword matches everything.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        if keyword.is_empty() {
            return true;
        }
        let lower = keyword.to_lowercase();
        let contains = |field: &str| field.to_lowercase().contains(&lower);
        contains(&self.name)
            || contains(&self.relationship)
            || self.phone.as_deref().is_some_and(|p| p.contains(keyword))
            || self.address.as_deref().is_some_and(contains)
    }

    /// Marks the contact as greeted. Fields already on the record that
    /// `blessing` leaves empty are kept.
    pub fn record_blessing(&mut self, blessing: BlessingRecord, now: NaiveDateTime) {
        let previous = self.blessing_record.take().unwrap_or_default();
        self.blessing_record = Some(BlessingRecord {
            is_blessed: true,
            blessing_time: blessing.blessing_time.or(Some(now)),
            blessing_method: blessing.blessing_method.or(previous.blessing_method),
            gift: blessing.gift.or(previous.gift),
            red_packet: blessing.red_packet.or(previous.red_packet),
            note: blessing.note.or(previous.note),
            schedule_id: blessing.schedule_id.or(previous.schedule_id),
        });
        self.updated_at = now;
    }

    pub fn clear_blessing(&mut self, now: NaiveDateTime) {
        if let Some(record) = self.blessing_record.as_mut() {
            record.is_blessed = false;
            record.blessing_time = None;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactDraft {
    pub name: String,
    pub relationship: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
}

impl ContactDraft {
    pub fn new(name: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relationship: relationship.into(),
            ..Self::default()
        }
    }

    pub fn into_contact(self, now: NaiveDateTime) -> Contact {
        Contact {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            relationship: self.relationship,
            phone: self.phone,
            address: self.address,
            note: self.note,
            blessing_record: None,
            created_at: now,
            updated_at: now,
            extra: BTreeMap::new(),
        }
    }
}
