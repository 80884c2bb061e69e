//! Storage contracts for events and contacts.
//!
//! Implementors only load and save whole collections; the provided methods
//! build the record-level operations on top. Every write path validates the
//! record before anything is saved.

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use crate::contact::Contact;
use crate::schedule::ScheduledEvent;

/// Index of the single record whose id equals `query` or starts with it.
fn resolve_id<T>(
    items: &[T],
    id_of: impl Fn(&T) -> &str,
    query: &str,
    kind: &str,
) -> anyhow::Result<usize> {
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("{kind} id is required"));
    }
    if let Some(idx) = items.iter().position(|item| id_of(item) == query) {
        return Ok(idx);
    }

    let matches: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| id_of(item).starts_with(query))
        .map(|(idx, _)| idx)
        .collect();
    match matches.as_slice() {
        [idx] => Ok(*idx),
        [] => Err(anyhow!("no {kind} matches id {query}")),
        many => Err(anyhow!(
            "{kind} id {query} is ambiguous ({} matches)",
            many.len()
        )),
    }
}

pub trait EventRepository {
    fn load_events(&self) -> anyhow::Result<Vec<ScheduledEvent>>;

    fn save_events(&mut self, events: &[ScheduledEvent]) -> anyhow::Result<()>;

    fn get_event(&self, id: &str) -> anyhow::Result<ScheduledEvent> {
        let mut events = self.load_events()?;
        let idx = resolve_id(&events, |e| e.id.as_str(), id, "schedule")?;
        Ok(events.swap_remove(idx))
    }

    #[tracing::instrument(skip(self, event), fields(id = %event.id))]
    fn add_event(&mut self, event: ScheduledEvent) -> anyhow::Result<ScheduledEvent> {
        event.validate().context("refusing to store schedule")?;
        let mut events = self.load_events()?;
        if events.iter().any(|e| e.id == event.id) {
            return Err(anyhow!("schedule {} already exists", event.id));
        }
        events.push(event.clone());
        self.save_events(&events)?;
        info!(title = %event.title, "schedule added");
        Ok(event)
    }

    /// Replaces the stored event with the same id.
    #[tracing::instrument(skip(self, event), fields(id = %event.id))]
    fn update_event(&mut self, event: ScheduledEvent) -> anyhow::Result<()> {
        event.validate().context("refusing to store schedule")?;
        let mut events = self.load_events()?;
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| anyhow!("no schedule matches id {}", event.id))?;
        *slot = event;
        self.save_events(&events)?;
        debug!("schedule updated");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn delete_event(&mut self, id: &str) -> anyhow::Result<ScheduledEvent> {
        let mut events = self.load_events()?;
        let idx = resolve_id(&events, |e| e.id.as_str(), id, "schedule")?;
        let removed = events.remove(idx);
        self.save_events(&events)?;
        info!(id = %removed.id, title = %removed.title, "schedule deleted");
        Ok(removed)
    }
}

pub trait ContactRepository {
    fn load_contacts(&self) -> anyhow::Result<Vec<Contact>>;

    fn save_contacts(&mut self, contacts: &[Contact]) -> anyhow::Result<()>;

    fn get_contact(&self, id: &str) -> anyhow::Result<Contact> {
        let mut contacts = self.load_contacts()?;
        let idx = resolve_id(&contacts, |c| c.id.as_str(), id, "contact")?;
        Ok(contacts.swap_remove(idx))
    }

    /// Contacts matching `keyword`, all of them for an empty keyword.
    fn search_contacts(&self, keyword: &str) -> anyhow::Result<Vec<Contact>> {
        Ok(self
            .load_contacts()?
            .into_iter()
            .filter(|c| c.matches_keyword(keyword))
            .collect())
    }

    #[tracing::instrument(skip(self, contact), fields(id = %contact.id))]
    fn add_contact(&mut self, contact: Contact) -> anyhow::Result<Contact> {
        contact.validate().context("refusing to store contact")?;
        let mut contacts = self.load_contacts()?;
        if contacts.iter().any(|c| c.id == contact.id) {
            return Err(anyhow!("contact {} already exists", contact.id));
        }
        contacts.push(contact.clone());
        self.save_contacts(&contacts)?;
        info!(name = %contact.name, "contact added");
        Ok(contact)
    }

    #[tracing::instrument(skip(self, contact), fields(id = %contact.id))]
    fn update_contact(&mut self, contact: Contact) -> anyhow::Result<()> {
        contact.validate().context("refusing to store contact")?;
        let mut contacts = self.load_contacts()?;
        let slot = contacts
            .iter_mut()
            .find(|c| c.id == contact.id)
            .ok_or_else(|| anyhow!("no contact matches id {}", contact.id))?;
        *slot = contact;
        self.save_contacts(&contacts)?;
        debug!("contact updated");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn delete_contact(&mut self, id: &str) -> anyhow::Result<Contact> {
        let mut contacts = self.load_contacts()?;
        let idx = resolve_id(&contacts, |c| c.id.as_str(), id, "contact")?;
        let removed = contacts.remove(idx);
        self.save_contacts(&contacts)?;
        info!(id = %removed.id, name = %removed.name, "contact deleted");
        Ok(removed)
    }
}

/// Keeps both collections in memory. Used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    pub events: Vec<ScheduledEvent>,
    pub contacts: Vec<Contact>,
}

impl EventRepository for MemoryRepository {
    fn load_events(&self) -> anyhow::Result<Vec<ScheduledEvent>> {
        Ok(self.events.clone())
    }

    fn save_events(&mut self, events: &[ScheduledEvent]) -> anyhow::Result<()> {
        self.events = events.to_vec();
        Ok(())
    }
}

impl ContactRepository for MemoryRepository {
    fn load_contacts(&self) -> anyhow::Result<Vec<Contact>> {
        Ok(self.contacts.clone())
    }

    fn save_contacts(&mut self, contacts: &[Contact]) -> anyhow::Result<()> {
        self.contacts = contacts.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::contact::ContactDraft;
    use crate::schedule::ScheduleDraft;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 17)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid datetime")
    }

    fn event_with_id(id: &str) -> ScheduledEvent {
        let mut event = ScheduleDraft::new("拜年", at(9), at(10)).into_event(at(0));
        event.id = id.to_string();
        event
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let mut repo = MemoryRepository::default();
        repo.add_event(event_with_id("abc123")).expect("add");
        repo.add_event(event_with_id("abd456")).expect("add");

        assert_eq!(repo.get_event("abc").expect("prefix").id, "abc123");
        assert!(repo.get_event("ab").is_err());
        assert!(repo.get_event("zzz").is_err());
        assert!(repo.get_event("").is_err());

        let removed = repo.delete_event("abd").expect("delete");
        assert_eq!(removed.id, "abd456");
        assert_eq!(repo.events.len(), 1);
    }

    #[test]
    fn invalid_records_are_not_saved() {
        let mut repo = MemoryRepository::default();
        let mut bad = event_with_id("x");
        bad.end = bad.start;
        assert!(repo.add_event(bad).is_err());
        assert!(repo.events.is_empty());

        let good = repo.add_event(event_with_id("y")).expect("add");
        let mut broken = good.clone();
        broken.title.clear();
        assert!(repo.update_event(broken).is_err());
        assert_eq!(repo.get_event("y").expect("get").title, "拜年");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut repo = MemoryRepository::default();
        repo.add_event(event_with_id("same")).expect("add");
        assert!(repo.add_event(event_with_id("same")).is_err());
    }

    #[test]
    fn contact_crud_and_search() {
        let mut repo = MemoryRepository::default();
        let uncle = repo
            .add_contact(ContactDraft::new("Zhang Wei", "舅舅").into_contact(at(8)))
            .expect("add");
        repo.add_contact(ContactDraft::new("Chen Jing", "同事").into_contact(at(8)))
            .expect("add");

        assert_eq!(repo.search_contacts("zhang").expect("search").len(), 1);
        assert_eq!(repo.search_contacts("").expect("search").len(), 2);

        let mut renamed = uncle.clone();
        renamed.relationship = "大舅".to_string();
        repo.update_contact(renamed).expect("update");
        assert_eq!(repo.get_contact(&uncle.id).expect("get").relationship, "大舅");

        repo.delete_contact(&uncle.id).expect("delete");
        assert_eq!(repo.contacts.len(), 1);
        assert!(repo.add_contact(ContactDraft::new(" ", "").into_contact(at(8))).is_err());
    }
}
