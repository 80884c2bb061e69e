use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::festival::MinorNewYearMode;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Month,
    Week,
    Day,
}

/// Persisted user preferences. Only the Minor New Year mode affects the
/// calendar; theme and view mode are kept for exchange with other clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub theme: Theme,
    pub view_mode: ViewMode,
    #[serde(rename = "littleNewYearMode")]
    pub minor_new_year_mode: MinorNewYearMode,
}

impl AppSettings {
    /// Sets one field from a `key` / `value` pair as typed on the command
    /// line.
    pub fn set_field(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "theme" => self.theme = value.parse()?,
            "view" | "viewMode" | "view_mode" => self.view_mode = value.parse()?,
            "mode" | "littleNewYearMode" | "minor_new_year.mode" => {
                self.minor_new_year_mode = value.parse()?
            }
            other => return Err(anyhow!("unknown setting: {other}")),
        }
        Ok(())
    }
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Month => "month",
            ViewMode::Week => "week",
            ViewMode::Day => "day",
        }
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("invalid theme: {other} (expected light or dark)")),
        }
    }
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(ViewMode::Month),
            "week" => Ok(ViewMode::Week),
            "day" => Ok(ViewMode::Day),
            other => Err(anyhow!("invalid view mode: {other} (expected month, week or day)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"littleNewYearMode":"south"}"#).expect("parse settings");
        assert_eq!(settings.minor_new_year_mode, MinorNewYearMode::South);
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.view_mode, ViewMode::Month);

        let value = serde_json::to_value(&settings).expect("serialize");
        assert_eq!(value["viewMode"], "month");
        assert_eq!(value["littleNewYearMode"], "south");
    }

    #[test]
    fn set_field_validates_values() {
        let mut settings = AppSettings::default();
        settings.set_field("theme", "dark").expect("theme");
        settings.set_field("mode", "south").expect("mode");
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.minor_new_year_mode, MinorNewYearMode::South);
        assert!(settings.set_field("view", "year").is_err());
        assert!(settings.set_field("font", "serif").is_err());
    }
}
