use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::contact::Contact;
use crate::repo::{ContactRepository, EventRepository};
use crate::schedule::ScheduledEvent;
use crate::settings::AppSettings;

pub const SCHEDULES_KEY: &str = "schedules";
pub const CONTACTS_KEY: &str = "contacts";
pub const SETTINGS_KEY: &str = "settings";

const KEYS: [&str; 3] = [SCHEDULES_KEY, CONTACTS_KEY, SETTINGS_KEY];

/// File-backed key-value store: each key is one pretty-printed JSON file in
/// the data directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct ExportPayload {
    schedules: Vec<ScheduledEvent>,
    contacts: Vec<Contact>,
    settings: Option<AppSettings>,
}

#[derive(Debug, Deserialize)]
struct ImportPayload {
    #[serde(default)]
    schedules: Option<Vec<ScheduledEvent>>,
    #[serde(default)]
    contacts: Option<Vec<Contact>>,
    #[serde(default)]
    settings: Option<AppSettings>,
}

/// Sections written by [`DataStore::import_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub schedules: Option<usize>,
    pub contacts: Option<usize>,
    pub settings: bool,
    /// Records stored as given although they fail validation.
    pub invalid: usize,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Stored value for `key`, `None` when nothing has been stored yet.
    #[tracing::instrument(skip(self))]
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "key not stored");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", path.display()))?;
        Ok(Some(value))
    }

    /// Like [`DataStore::try_get`] but falls back to `default` when the key
    /// is missing or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!(key, error = %format!("{err:#}"), "unreadable key, using default");
                default
            }
        }
    }

    #[tracing::instrument(skip(self, value))]
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let path = self.path_for(key);
        write_json_atomic(&path, value)
            .with_context(|| format!("failed to save {}", path.display()))
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "removed key");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }

    /// Drops every key the planner stores.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        for key in KEYS {
            self.remove(key)?;
        }
        info!("cleared datastore");
        Ok(())
    }

    pub fn load_settings(&self) -> AppSettings {
        self.get(SETTINGS_KEY, AppSettings::default())
    }

    pub fn save_settings(&self, settings: &AppSettings) -> anyhow::Result<()> {
        self.set(SETTINGS_KEY, settings)
    }

    /// All data as pretty JSON `{schedules, contacts, settings}`.
    #[tracing::instrument(skip(self))]
    pub fn export_data(&self) -> anyhow::Result<String> {
        let payload = ExportPayload {
            schedules: self.load_events()?,
            contacts: self.load_contacts()?,
            settings: self.try_get(SETTINGS_KEY)?,
        };
        info!(
            schedules = payload.schedules.len(),
            contacts = payload.contacts.len(),
            "exporting data"
        );
        serde_json::to_string_pretty(&payload).context("failed to serialize export")
    }

    /// Writes whichever sections `text` carries, leaving the others alone.
    /// Nothing is written when any section fails to parse. Records that
    /// parse but fail validation are kept and counted in
    /// [`ImportSummary::invalid`].
    #[tracing::instrument(skip(self, text), fields(bytes = text.len()))]
    pub fn import_data(&self, text: &str) -> anyhow::Result<ImportSummary> {
        let payload: ImportPayload =
            serde_json::from_str(text).context("import data is not valid planner JSON")?;

        let mut summary = ImportSummary::default();
        if let Some(schedules) = payload.schedules {
            for event in &schedules {
                if let Err(err) = event.validate() {
                    warn!(id = %event.id, %err, "imported schedule is invalid");
                    summary.invalid += 1;
                }
            }
            self.set(SCHEDULES_KEY, &schedules)?;
            summary.schedules = Some(schedules.len());
        }
        if let Some(contacts) = payload.contacts {
            for contact in &contacts {
                if let Err(err) = contact.validate() {
                    warn!(id = %contact.id, %err, "imported contact is invalid");
                    summary.invalid += 1;
                }
            }
            self.set(CONTACTS_KEY, &contacts)?;
            summary.contacts = Some(contacts.len());
        }
        if let Some(settings) = payload.settings {
            self.save_settings(&settings)?;
            summary.settings = true;
        }

        info!(?summary, "imported data");
        Ok(summary)
    }
}

impl EventRepository for DataStore {
    fn load_events(&self) -> anyhow::Result<Vec<ScheduledEvent>> {
        Ok(self.try_get(SCHEDULES_KEY)?.unwrap_or_default())
    }

    fn save_events(&mut self, events: &[ScheduledEvent]) -> anyhow::Result<()> {
        self.set(SCHEDULES_KEY, events)
    }
}

impl ContactRepository for DataStore {
    fn load_contacts(&self) -> anyhow::Result<Vec<Contact>> {
        Ok(self.try_get(CONTACTS_KEY)?.unwrap_or_default())
    }

    fn save_contacts(&mut self, contacts: &[Contact]) -> anyhow::Result<()> {
        self.set(CONTACTS_KEY, contacts)
    }
}

#[tracing::instrument(skip(path, value))]
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(temp);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    let temp = writer
        .into_inner()
        .map_err(|err| anyhow!("failed to flush {}: {}", path.display(), err.error()))?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
