use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use unicode_width::UnicodeWidthStr;

use crate::config::{COLOR_KEY, Config};
use crate::contact::Contact;
use crate::datetime::{format_date, format_datetime, is_today};
use crate::festival::FestivalName;
use crate::lunar::{LunarDate, format_lunar, format_lunar_full};
use crate::planner::PlannerStats;
use crate::schedule::{ScheduleCategory, ScheduledEvent};
use crate::timeline::{HolidayWindow, NotableDay};

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get(COLOR_KEY).unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, events, now))]
    pub fn print_schedule_table(
        &mut self,
        events: &[ScheduledEvent],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if events.is_empty() {
            writeln!(out, "No schedules.")?;
            return Ok(());
        }

        let headers = ["ID", "Date", "Time", "Lunar", "Type", "Title", "Location"]
            .map(String::from)
            .to_vec();

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let date = format_date(event.start);
            let date = if is_today(event.start, now) {
                self.paint(&date, "1")
            } else if event.end < now {
                self.paint(&date, "2")
            } else {
                date
            };
            rows.push(vec![
                self.paint(short_id(&event.id), "33"),
                date,
                format!("{}-{}", event.start.format("%H:%M"), event.end.format("%H:%M")),
                format_lunar(event.start),
                self.paint_category(event.category),
                event.title.clone(),
                event.location.clone().unwrap_or_default(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} schedule(s)", events.len())?;
        Ok(())
    }

    #[tracing::instrument(skip(self, event))]
    pub fn print_schedule_info(&mut self, event: &ScheduledEvent) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", event.id)?;
        writeln!(out, "title     {}", event.title)?;
        writeln!(out, "type      {}", self.paint_category(event.category))?;
        writeln!(out, "start     {}", format_datetime(event.start))?;
        writeln!(out, "end       {}", format_datetime(event.end))?;
        writeln!(out, "lunar     {}", format_lunar_full(event.start))?;
        if let Some(location) = &event.location {
            writeln!(out, "location  {location}")?;
        }
        if let Some(note) = &event.note {
            writeln!(out, "note      {note}")?;
        }
        if let Some(reminder) = event.reminder {
            writeln!(out, "reminder  {reminder} min before")?;
        }
        if !event.contacts.is_empty() {
            writeln!(out, "contacts  {}", event.contacts.join(", "))?;
        }
        writeln!(out, "created   {}", format_datetime(event.created_at))?;
        writeln!(out, "modified  {}", format_datetime(event.updated_at))?;

        Ok(())
    }

    pub fn print_conflicts(&mut self, conflicts: &[ScheduledEvent]) -> anyhow::Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        let warning = format!("检测到 {} 个时间冲突的日程", conflicts.len());
        writeln!(out, "{}", self.paint(&warning, "31"))?;
        for event in conflicts {
            writeln!(
                out,
                "  {} {} {}-{}",
                short_id(&event.id),
                event.title,
                format_datetime(event.start),
                event.end.format("%H:%M")
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, window, days))]
    pub fn print_timeline(
        &mut self,
        window: &HolidayWindow,
        days: &[NotableDay],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "{} 春节 {} .. {} ({} days, {})",
            window.lunar_year,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
            window.len_days(),
            window.mode
        )?;
        writeln!(out)?;

        for day in days {
            let mut heading = format!(
                "{} {} {}",
                day.date.format("%Y-%m-%d %a"),
                day.lunar.month_name,
                day.lunar.day_name
            );
            if let Some(festival) = day.festival {
                heading.push(' ');
                heading.push_str(festival.label());
            }
            if day.date == today {
                heading.push_str(" (today)");
            }
            let heading = if day.is_important {
                self.paint(&heading, "1;31")
            } else {
                self.paint(&heading, "1")
            };
            writeln!(out, "{heading}")?;

            for event in &day.events {
                writeln!(
                    out,
                    "  {}-{} {} {} {}",
                    event.start.format("%H:%M"),
                    event.end.format("%H:%M"),
                    self.paint_category(event.category),
                    event.title,
                    self.paint(short_id(&event.id), "33")
                )?;
            }
        }

        if days.iter().all(|d| d.events.is_empty()) {
            writeln!(out)?;
            writeln!(out, "No schedules in this window.")?;
        }
        Ok(())
    }

    pub fn print_lunar(
        &mut self,
        date: NaiveDate,
        lunar: &LunarDate,
        festival: Option<FestivalName>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let leap = if lunar.is_leap_month { " (leap)" } else { "" };
        writeln!(out, "solar     {}", date.format("%Y-%m-%d %A"))?;
        writeln!(
            out,
            "lunar     {}年{}{}{leap}",
            lunar.year_name, lunar.month_name, lunar.day_name
        )?;
        writeln!(out, "numeric   {}-{}-{}{leap}", lunar.year, lunar.month, lunar.day)?;
        writeln!(
            out,
            "ganzhi    {}年 {}月 {}日",
            lunar.ganzhi_year, lunar.ganzhi_month, lunar.ganzhi_day
        )?;
        writeln!(out, "zodiac    {}", lunar.zodiac)?;
        if let Some(festival) = festival {
            writeln!(out, "festival  {}", self.paint(festival.label(), "1;31"))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, contacts))]
    pub fn print_contact_table(&mut self, contacts: &[Contact]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if contacts.is_empty() {
            writeln!(out, "No contacts.")?;
            return Ok(());
        }

        let headers = ["ID", "Name", "Relationship", "Phone", "Blessed", "Method"]
            .map(String::from)
            .to_vec();

        let mut rows = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let record = contact.blessing_record.as_ref();
            let blessed = match record.filter(|r| r.is_blessed) {
                Some(r) => {
                    let when = r.blessing_time.map(format_datetime).unwrap_or_default();
                    self.paint(&format!("已拜年 {when}").trim_end().to_string(), "32")
                }
                None => "未拜年".to_string(),
            };
            let method = record
                .and_then(|r| r.blessing_method)
                .map(|m| m.label().to_string())
                .unwrap_or_default();
            rows.push(vec![
                self.paint(short_id(&contact.id), "33"),
                contact.name.clone(),
                contact.relationship.clone(),
                contact.phone.clone().unwrap_or_default(),
                blessed,
                method,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_stats(&mut self, stats: &PlannerStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec!["Category".to_string(), "Count".to_string()];
        let mut rows: Vec<Vec<String>> = stats
            .by_category
            .iter()
            .map(|(category, count)| vec![self.paint_category(*category), count.to_string()])
            .collect();
        rows.push(vec!["total".to_string(), stats.total_schedules.to_string()]);
        write_table(&mut out, headers, rows)?;

        writeln!(out)?;
        writeln!(out, "contacts  {}", stats.total_contacts)?;
        writeln!(out, "blessed   {}", stats.blessed_contacts)?;
        writeln!(out, "pending   {}", stats.pending_blessings())?;
        Ok(())
    }

    fn paint_category(&self, category: ScheduleCategory) -> String {
        let code = match category {
            ScheduleCategory::Visit => "31",
            ScheduleCategory::Dinner => "33",
            ScheduleCategory::Family => "32",
            ScheduleCategory::Other => "34",
        };
        self.paint(category.label(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
            })
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end()
            .to_string()
    };

    writeln!(writer, "{}", line(headers))?;
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(writer, "{}", line(rule))?;
    for row in rows {
        writeln!(writer, "{}", line(row))?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns_align_on_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Name".to_string(), "Rel".to_string()],
            vec![
                vec!["王叔".to_string(), "邻居".to_string()],
                vec!["\x1b[33mAnn\x1b[0m".to_string(), "friend".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name Rel");
        assert_eq!(lines[1], "---- ------");
        assert_eq!(lines[2], "王叔 邻居");
        assert_eq!(strip_ansi(lines[3]), "Ann  friend");
    }

    #[test]
    fn short_ids_keep_whole_characters() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("一二三四五六七八九十"), "一二三四五六七八");
    }

    #[test]
    fn color_setting_is_validated() {
        let mut cfg = Config::default();
        cfg.apply_overrides([(COLOR_KEY.to_string(), "maybe".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }
}
