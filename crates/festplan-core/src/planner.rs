use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::conflict::check_conflict;
use crate::contact::{BlessingMethod, BlessingRecord, Contact};
use crate::festival::MinorNewYearMode;
use crate::repo::{ContactRepository, EventRepository};
use crate::schedule::{ScheduleCategory, ScheduleDraft, SchedulePatch, ScheduledEvent};
use crate::settings::AppSettings;
use crate::timeline::{HolidayWindow, NotableDay, build_notable_days};

/// Result of a committed add or edit. Conflicts are advisory: the event is
/// stored regardless.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutcome {
    pub event: ScheduledEvent,
    pub conflicts: Vec<ScheduledEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannerStats {
    pub total_schedules: usize,
    pub by_category: BTreeMap<ScheduleCategory, usize>,
    pub total_contacts: usize,
    pub blessed_contacts: usize,
}

impl PlannerStats {
    pub fn pending_blessings(&self) -> usize {
        self.total_contacts - self.blessed_contacts
    }
}

/// Application service over a repository and the user's settings.
#[derive(Debug)]
pub struct Planner<R> {
    repo: R,
    settings: AppSettings,
}

impl<R> Planner<R>
where
    R: EventRepository + ContactRepository,
{
    pub fn new(repo: R, settings: AppSettings) -> Self {
        Self { repo, settings }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut R {
        &mut self.repo
    }

    pub fn into_repo(self) -> R {
        self.repo
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn mode(&self) -> MinorNewYearMode {
        self.settings.minor_new_year_mode
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add_schedule(
        &mut self,
        draft: ScheduleDraft,
        now: NaiveDateTime,
    ) -> anyhow::Result<ScheduleOutcome> {
        let event = draft.into_event(now);
        event.validate()?;

        let existing = self.repo.load_events()?;
        let conflicts = owned(check_conflict(event.start, event.end, &existing, None));
        warn_conflicts(&event, &conflicts);

        let event = self.repo.add_event(event)?;
        Ok(ScheduleOutcome { event, conflicts })
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_schedule(
        &mut self,
        id: &str,
        patch: &SchedulePatch,
        now: NaiveDateTime,
    ) -> anyhow::Result<ScheduleOutcome> {
        let current = self.repo.get_event(id)?;
        let event = patch.applied_to(&current, now);
        event.validate()?;

        let existing = self.repo.load_events()?;
        let conflicts = owned(check_conflict(
            event.start,
            event.end,
            &existing,
            Some(event.id.as_str()),
        ));
        warn_conflicts(&event, &conflicts);

        self.repo.update_event(event.clone())?;
        Ok(ScheduleOutcome { event, conflicts })
    }

    pub fn delete_schedule(&mut self, id: &str) -> anyhow::Result<ScheduledEvent> {
        self.repo.delete_event(id)
    }

    /// Stored events overlapping `[start, end)`, skipping `exclude_id`.
    pub fn conflicts_for(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_id: Option<&str>,
    ) -> anyhow::Result<Vec<ScheduledEvent>> {
        let events = self.repo.load_events()?;
        Ok(owned(check_conflict(start, end, &events, exclude_id)))
    }

    pub fn window_for(&self, lunar_year: i32) -> anyhow::Result<HolidayWindow> {
        HolidayWindow::for_lunar_year(lunar_year, self.mode())
            .with_context(|| format!("no holiday window for lunar year {lunar_year}"))
    }

    /// Notable days of the holiday window of `lunar_year`, or of the
    /// upcoming window when no year is given.
    #[tracing::instrument(skip(self))]
    pub fn timeline(
        &self,
        today: NaiveDate,
        lunar_year: Option<i32>,
    ) -> anyhow::Result<(HolidayWindow, Vec<NotableDay>)> {
        let window = match lunar_year {
            Some(year) => self.window_for(year)?,
            None => HolidayWindow::upcoming(today, self.mode())
                .context("today is outside the lunar calendar table")?,
        };
        let days = self.days_between(window.start, window.end)?;
        Ok((window, days))
    }

    pub fn days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<NotableDay>> {
        let events = self.repo.load_events()?;
        Ok(build_notable_days(start, end, self.mode(), &events)?)
    }

    pub fn stats(&self) -> anyhow::Result<PlannerStats> {
        let events = self.repo.load_events()?;
        let contacts = self.repo.load_contacts()?;

        let mut by_category: BTreeMap<ScheduleCategory, usize> =
            ScheduleCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        for event in &events {
            *by_category.entry(event.category).or_default() += 1;
        }

        Ok(PlannerStats {
            total_schedules: events.len(),
            by_category,
            total_contacts: contacts.len(),
            blessed_contacts: contacts.iter().filter(|c| c.is_blessed()).count(),
        })
    }

    /// Records a blessing for one contact.
    #[tracing::instrument(skip(self, record))]
    pub fn bless(
        &mut self,
        contact_id: &str,
        record: BlessingRecord,
        now: NaiveDateTime,
    ) -> anyhow::Result<Contact> {
        let mut contact = self.repo.get_contact(contact_id)?;
        if let Some(schedule_id) = &record.schedule_id {
            self.repo
                .get_event(schedule_id)
                .with_context(|| format!("blessing refers to unknown schedule {schedule_id}"))?;
        }
        contact.record_blessing(record, now);
        self.repo.update_contact(contact.clone())?;
        info!(id = %contact.id, name = %contact.name, "blessing recorded");
        Ok(contact)
    }

    /// Marks every contact in `contact_ids` as greeted in one go.
    #[tracing::instrument(skip(self))]
    pub fn bless_batch(
        &mut self,
        contact_ids: &[String],
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<Contact>> {
        if contact_ids.is_empty() {
            return Err(anyhow!("no contacts selected"));
        }

        let resolved: Vec<String> = contact_ids
            .iter()
            .map(|id| self.repo.get_contact(id).map(|c| c.id))
            .collect::<anyhow::Result<_>>()?;

        let mut contacts = self.repo.load_contacts()?;
        let mut blessed = Vec::with_capacity(resolved.len());
        for contact in contacts.iter_mut().filter(|c| resolved.contains(&c.id)) {
            // A batch greeting replaces whatever details were recorded before.
            contact.blessing_record = Some(BlessingRecord {
                is_blessed: true,
                blessing_time: Some(now),
                blessing_method: Some(BlessingMethod::Batch),
                ..BlessingRecord::default()
            });
            contact.updated_at = now;
            blessed.push(contact.clone());
        }

        self.repo.save_contacts(&contacts)?;
        info!(count = blessed.len(), "batch blessing recorded");
        Ok(blessed)
    }

    pub fn unbless(&mut self, contact_id: &str, now: NaiveDateTime) -> anyhow::Result<Contact> {
        let mut contact = self.repo.get_contact(contact_id)?;
        contact.clear_blessing(now);
        self.repo.update_contact(contact.clone())?;
        info!(id = %contact.id, "blessing cleared");
        Ok(contact)
    }

    pub fn set_mode(&mut self, mode: MinorNewYearMode) {
        self.settings.minor_new_year_mode = mode;
    }
}

fn owned(events: Vec<&ScheduledEvent>) -> Vec<ScheduledEvent> {
    events.into_iter().cloned().collect()
}

fn warn_conflicts(event: &ScheduledEvent, conflicts: &[ScheduledEvent]) {
    if conflicts.is_empty() {
        return;
    }
    let ids: Vec<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
    warn!(
        title = %event.title,
        count = conflicts.len(),
        ?ids,
        "schedule overlaps existing schedules"
    );
}
