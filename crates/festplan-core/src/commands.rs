use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::contact::{BlessingMethod, BlessingRecord, ContactDraft};
use crate::datastore::DataStore;
use crate::datetime::{add_hours, now_local, parse_datetime_expr};
use crate::festival::is_festival;
use crate::lunar::{Month, format_lunar, lunar_to_solar, solar_to_lunar};
use crate::planner::Planner;
use crate::render::{Renderer, short_id};
use crate::repo::{ContactRepository, EventRepository};
use crate::schedule::{ScheduleCategory, ScheduleDraft, SchedulePatch, ScheduledEvent};
use crate::timeline::{HolidayWindow, days_until_spring_festival, events_on};

/// Start time used when `add` gets no `start:` modifier.
const DEFAULT_START_HOUR: u32 = 8;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "modify",
        "delete",
        "list",
        "info",
        "timeline",
        "lunar",
        "festival",
        "conflicts",
        "contacts",
        "contact-add",
        "contact-delete",
        "bless",
        "bless-batch",
        "stats",
        "countdown",
        "settings",
        "export",
        "import",
        "clear",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(planner, cfg, renderer, inv))]
pub fn dispatch(
    planner: &mut Planner<DataStore>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = now_local();
    let command = inv.command.as_str();
    let args = inv.args.as_slice();

    debug!(command, ?args, "dispatching command");

    match command {
        "add" => cmd_add(planner, renderer, args, now),
        "modify" => cmd_modify(planner, renderer, args, now),
        "delete" => cmd_delete(planner, args),
        "list" => cmd_list(planner, renderer, args, now),
        "info" => cmd_info(planner, renderer, args),
        "timeline" => cmd_timeline(planner, cfg, renderer, args, now),
        "lunar" => cmd_lunar(renderer, planner, args, now),
        "festival" => cmd_festival(planner, args, now),
        "conflicts" => cmd_conflicts(planner, renderer, args, now),
        "contacts" => cmd_contacts(planner, renderer, args),
        "contact-add" => cmd_contact_add(planner, args, now),
        "contact-delete" => cmd_contact_delete(planner, args),
        "bless" => cmd_bless(planner, args, now),
        "bless-batch" => cmd_bless_batch(planner, args, now),
        "stats" => cmd_stats(planner, renderer),
        "countdown" => cmd_countdown(planner, cfg, args, now),
        "settings" => cmd_settings(planner, args),
        "export" => cmd_export(planner, args),
        "import" => cmd_import(planner, args),
        "clear" => cmd_clear(planner, args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(planner, renderer, args, now))]
fn cmd_add(
    planner: &mut Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, now)?;
    let draft = draft_from_mods(title, &mods, now)?;
    let outcome = planner.add_schedule(draft, now)?;

    println!(
        "Created schedule {} ({}).",
        short_id(&outcome.event.id),
        format_lunar(outcome.event.start)
    );
    renderer.print_conflicts(&outcome.conflicts)?;
    Ok(())
}

#[instrument(skip(planner, renderer, args, now))]
fn cmd_modify(
    planner: &mut Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command modify");

    let (id, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("modify: schedule id is required"))?;
    let mods = parse_mods(rest, now)?;
    if mods.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    let current = planner.repo().get_event(id)?;
    let patch = patch_from_mods(&mods, &current)?;
    let outcome = planner.update_schedule(&current.id, &patch, now)?;

    println!("Modified schedule {}.", short_id(&outcome.event.id));
    renderer.print_conflicts(&outcome.conflicts)?;
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_delete(planner: &mut Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    if args.is_empty() {
        return Err(anyhow!("delete: schedule id is required"));
    }
    for id in args {
        let removed = planner.delete_schedule(id)?;
        println!("Deleted schedule {} ({}).", short_id(&removed.id), removed.title);
    }
    Ok(())
}

#[instrument(skip(planner, renderer, args, now))]
fn cmd_list(
    planner: &Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command list");

    let mut events = planner.repo().load_events()?;
    let mut day: Option<NaiveDate> = None;
    let mut category: Option<ScheduleCategory> = None;
    let mut keywords = Vec::new();

    for arg in args {
        if let Some(raw) = arg.strip_prefix("type:") {
            category = Some(raw.parse()?);
        } else if let Ok(dt) = parse_datetime_expr(arg, now) {
            day = Some(dt.date());
        } else {
            keywords.push(arg.as_str());
        }
    }

    if let Some(day) = day {
        events = events_on(day, &events).into_iter().cloned().collect();
    }
    events.retain(|e| category.is_none_or(|c| e.category == c));
    events.retain(|e| keywords.iter().all(|k| e.matches_keyword(k)));
    events.sort_by_key(|e| e.start);

    renderer.print_schedule_table(&events, now)
}

#[instrument(skip(planner, renderer, args))]
fn cmd_info(
    planner: &Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");

    if args.is_empty() {
        return Err(anyhow!("info: schedule id is required"));
    }
    for (idx, id) in args.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        let event = planner.repo().get_event(id)?;
        renderer.print_schedule_info(&event)?;
    }
    Ok(())
}

#[instrument(skip(planner, cfg, renderer, args, now))]
fn cmd_timeline(
    planner: &Planner<DataStore>,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command timeline");

    let year = requested_year(cfg, args)?;
    let (window, days) = planner.timeline(now.date(), year)?;
    renderer.print_timeline(&window, &days, now.date())
}

/// `lunar [DATE]` shows the lunar form of a solar day; `lunar Y M D [leap]`
/// converts the other way.
#[instrument(skip(renderer, planner, args, now))]
fn cmd_lunar(
    renderer: &mut Renderer,
    planner: &Planner<DataStore>,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command lunar");

    let date = match args {
        [] => now.date(),
        [year, month, day] | [year, month, day, _] => {
            let year: i32 = year.parse().with_context(|| format!("invalid lunar year: {year}"))?;
            let month: u32 = month.parse().with_context(|| format!("invalid lunar month: {month}"))?;
            let day: u32 = day.parse().with_context(|| format!("invalid lunar day: {day}"))?;
            let month = match args.get(3).map(String::as_str) {
                Some("leap") | Some("闰") => Month::Leap(month),
                Some(other) => return Err(anyhow!("lunar: expected `leap`, got {other}")),
                None => Month::Common(month),
            };
            lunar_to_solar(year, month, day)?
        }
        [expr] => parse_datetime_expr(expr, now)?.date(),
        _ => return Err(anyhow!("usage: lunar [DATE] | lunar YEAR MONTH DAY [leap]")),
    };

    let lunar = solar_to_lunar(date)?;
    let festival = is_festival(date, planner.mode());
    renderer.print_lunar(date, &lunar, festival)
}

/// `festival [DATE]` names the festival of one day; `festival YEAR` lists the
/// festivals of a Gregorian year.
#[instrument(skip(planner, args, now))]
fn cmd_festival(
    planner: &Planner<DataStore>,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command festival");
    let mode = planner.mode();

    if let [arg] = args
        && arg.len() == 4
        && let Ok(year) = arg.parse::<i32>()
    {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| anyhow!("invalid year: {year}"))?;
        for date in first.iter_days().take_while(|d| d.year() == year) {
            if let Some(festival) = is_festival(date, mode) {
                println!("{} {}", date.format("%Y-%m-%d"), festival.label());
            }
        }
        return Ok(());
    }

    let date = match args.first() {
        Some(expr) => parse_datetime_expr(expr, now)?.date(),
        None => now.date(),
    };
    match is_festival(date, mode) {
        Some(festival) => println!("{} {}", date.format("%Y-%m-%d"), festival.label()),
        None => println!("{} no festival", date.format("%Y-%m-%d")),
    }
    Ok(())
}

/// With `START END [EXCLUDE-ID]`, lists stored schedules overlapping that
/// interval; without arguments, lists every overlapping pair.
#[instrument(skip(planner, renderer, args, now))]
fn cmd_conflicts(
    planner: &Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command conflicts");

    match args {
        [] => {
            let events = planner.repo().load_events()?;
            let pairs = overlapping_pairs(&events);
            if pairs.is_empty() {
                println!("No conflicts.");
            }
            for (a, b) in pairs {
                println!(
                    "{} {} <-> {} {}",
                    short_id(&a.id),
                    a.title,
                    short_id(&b.id),
                    b.title
                );
            }
            Ok(())
        }
        [start, end, rest @ ..] if rest.len() <= 1 => {
            let start = parse_datetime_expr(start, now)?;
            let end = parse_datetime_expr(end, now)?;
            let exclude = match rest.first() {
                Some(id) => Some(planner.repo().get_event(id)?.id),
                None => None,
            };
            let conflicts = planner.conflicts_for(start, end, exclude.as_deref())?;
            if conflicts.is_empty() {
                println!("No conflicts.");
            }
            renderer.print_conflicts(&conflicts)
        }
        _ => Err(anyhow!("usage: conflicts [START END [EXCLUDE-ID]]")),
    }
}

#[instrument(skip(planner, renderer, args))]
fn cmd_contacts(
    planner: &Planner<DataStore>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command contacts");
    let keyword = args.join(" ");
    let contacts = planner.repo().search_contacts(&keyword)?;
    renderer.print_contact_table(&contacts)
}

#[instrument(skip(planner, args, now))]
fn cmd_contact_add(
    planner: &mut Planner<DataStore>,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command contact-add");

    let mut draft = ContactDraft::default();
    let mut name_parts = Vec::new();
    for arg in args {
        match arg.split_once(':') {
            Some(("relationship" | "rel", v)) => draft.relationship = v.to_string(),
            Some(("phone", v)) => draft.phone = non_empty(v),
            Some(("address" | "addr", v)) => draft.address = non_empty(v),
            Some(("note", v)) => draft.note = non_empty(v),
            _ => name_parts.push(arg.as_str()),
        }
    }
    draft.name = name_parts.join(" ");
    if draft.name.trim().is_empty() {
        return Err(anyhow!("contact-add: name is required"));
    }

    let contact = planner.repo_mut().add_contact(draft.into_contact(now))?;
    println!("Created contact {} ({}).", short_id(&contact.id), contact.name);
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_contact_delete(planner: &mut Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    info!("command contact-delete");
    if args.is_empty() {
        return Err(anyhow!("contact-delete: contact id is required"));
    }
    for id in args {
        let removed = planner.repo_mut().delete_contact(id)?;
        println!("Deleted contact {} ({}).", short_id(&removed.id), removed.name);
    }
    Ok(())
}

#[instrument(skip(planner, args, now))]
fn cmd_bless(
    planner: &mut Planner<DataStore>,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command bless");

    let (id, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("bless: contact id is required"))?;

    let mut record = BlessingRecord {
        is_blessed: true,
        ..BlessingRecord::default()
    };
    for arg in rest {
        let (key, value) = arg
            .split_once(':')
            .ok_or_else(|| anyhow!("bless: expected key:value, got {arg}"))?;
        match key {
            "method" => record.blessing_method = Some(value.parse()?),
            "time" => record.blessing_time = Some(parse_datetime_expr(value, now)?),
            "gift" => record.gift = non_empty(value),
            "redpacket" | "red_packet" => record.red_packet = non_empty(value),
            "note" => record.note = non_empty(value),
            "schedule" => record.schedule_id = Some(planner.repo().get_event(value)?.id),
            "blessed" => record.is_blessed = parse_yes_no(value)?,
            other => return Err(anyhow!("bless: unknown field {other}")),
        }
    }

    let contact = if record.is_blessed {
        if record.blessing_method.is_none() {
            record.blessing_method = Some(BlessingMethod::InPerson);
        }
        planner.bless(id, record, now)?
    } else {
        planner.unbless(id, now)?
    };

    let state = if contact.is_blessed() { "blessed" } else { "not blessed" };
    println!("Contact {} ({}) {state}.", short_id(&contact.id), contact.name);
    Ok(())
}

#[instrument(skip(planner, args, now))]
fn cmd_bless_batch(
    planner: &mut Planner<DataStore>,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command bless-batch");
    let blessed = planner.bless_batch(args, now)?;
    println!("Blessed {} contact(s).", blessed.len());
    Ok(())
}

fn cmd_stats(planner: &Planner<DataStore>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let stats = planner.stats()?;
    renderer.print_stats(&stats)
}

#[instrument(skip(planner, cfg, args, now))]
fn cmd_countdown(
    planner: &Planner<DataStore>,
    cfg: &Config,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let today = now.date();
    let year = match requested_year(cfg, args)? {
        Some(year) => year,
        None => HolidayWindow::upcoming(today, planner.mode())?.lunar_year,
    };
    let days = days_until_spring_festival(today, year)?;
    let date = lunar_to_solar(year, Month::Common(1), 1)?;

    match days {
        0 => println!("{} 春节 is today. 新春快乐!", date.format("%Y-%m-%d")),
        d if d > 0 => println!("{} days until 春节 ({}).", d, date.format("%Y-%m-%d")),
        d => println!("春节 ({}) was {} days ago.", date.format("%Y-%m-%d"), -d),
    }
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_settings(planner: &Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    let mut settings = planner.repo().load_settings();

    if !args.is_empty() {
        for arg in args {
            let (key, value) = arg
                .split_once('=')
                .or_else(|| arg.split_once(':'))
                .ok_or_else(|| anyhow!("settings: expected key=value, got {arg}"))?;
            settings.set_field(key.trim(), value.trim())?;
        }
        planner.repo().save_settings(&settings)?;
        info!(?settings, "settings saved");
    }

    println!("theme             {}", settings.theme.as_str());
    println!("viewMode          {}", settings.view_mode.as_str());
    println!("littleNewYearMode {}", settings.minor_new_year_mode);
    if planner.mode() != settings.minor_new_year_mode && args.is_empty() {
        println!("(overridden to {} by configuration)", planner.mode());
    }
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_export(planner: &Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    info!("command export");
    let data = planner.repo().export_data()?;
    match args.first() {
        Some(path) => {
            fs::write(path, format!("{data}\n")).with_context(|| format!("failed writing {path}"))?;
            println!("Exported to {path}.");
        }
        None => println!("{data}"),
    }
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_import(planner: &Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    info!("command import");

    let text = match args.first().map(String::as_str) {
        None | Some("-") => {
            let mut stdin = String::new();
            io::stdin()
                .read_to_string(&mut stdin)
                .context("failed reading stdin")?;
            stdin
        }
        Some(path) => fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed reading {path}"))?,
    };
    if text.trim().is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let summary = planner.repo().import_data(&text)?;
    let mut parts = Vec::new();
    if let Some(n) = summary.schedules {
        parts.push(format!("{n} schedule(s)"));
    }
    if let Some(n) = summary.contacts {
        parts.push(format!("{n} contact(s)"));
    }
    if summary.settings {
        parts.push("settings".to_string());
    }
    if summary.invalid > 0 {
        println!("Warning: {} imported record(s) fail validation.", summary.invalid);
    }
    if parts.is_empty() {
        warn!("import data carried no known section");
        println!("Nothing imported.");
    } else {
        println!("Imported {}.", parts.join(", "));
    }
    Ok(())
}

#[instrument(skip(planner, args))]
fn cmd_clear(planner: &Planner<DataStore>, args: &[String]) -> anyhow::Result<()> {
    if args.first().map(String::as_str) != Some("yes") {
        return Err(anyhow!(
            "clear removes all schedules, contacts and settings; run `clear yes` to confirm"
        ));
    }
    planner.repo().clear()?;
    println!("All data cleared.");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("Commands: {}", known_command_names().join(", "));
    println!();
    println!("  add TITLE... [start:WHEN] [end:WHEN | dur:1h30m] [type:visit|dinner|family|other]");
    println!("      [location:TEXT] [note:TEXT] [reminder:MINUTES] [contacts:ID,ID]");
    println!("  modify ID MODIFIERS...      empty values clear a field, e.g. location:");
    println!("  list [DATE] [type:T] [KEYWORD...]");
    println!("  timeline [LUNAR-YEAR]       Minor New Year through the Lantern Festival");
    println!("  lunar [DATE] | lunar YEAR MONTH DAY [leap]");
    println!("  festival [DATE | YEAR]");
    println!("  conflicts [START END [EXCLUDE-ID]]");
    println!("  bless ID [method:M] [time:WHEN] [gift:G] [redpacket:R] [note:N] [blessed:no]");
    println!("  settings [theme=light|dark] [view=month|week|day] [mode=north|south]");
    println!("  export [FILE] | import [FILE|-] | clear yes");
    println!();
    println!("WHEN accepts YYYY-MM-DD[THH:MM], today, tomorrow, yesterday, 9am, 18:30, tomorrow@9am.");
    Ok(())
}

fn requested_year(cfg: &Config, args: &[String]) -> anyhow::Result<Option<i32>> {
    match args.first() {
        Some(raw) => {
            let year = raw
                .parse::<i32>()
                .with_context(|| format!("invalid lunar year: {raw}"))?;
            Ok(Some(year))
        }
        None => cfg.holiday_year(),
    }
}

fn overlapping_pairs(events: &[ScheduledEvent]) -> Vec<(&ScheduledEvent, &ScheduledEvent)> {
    let mut sorted: Vec<&ScheduledEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.start);

    let mut pairs = Vec::new();
    for (idx, event) in sorted.iter().enumerate() {
        for other in &sorted[idx + 1..] {
            if other.start >= event.end {
                break;
            }
            pairs.push((*event, *other));
        }
    }
    pairs
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_yes_no(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Ok(true),
        "0" | "n" | "no" | "off" | "false" => Ok(false),
        other => Err(anyhow!("expected yes or no, got {other}")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mod {
    Category(ScheduleCategory),
    Start(NaiveDateTime),
    End(NaiveDateTime),
    Duration(Duration),
    Title(String),
    Location(Option<String>),
    Note(Option<String>),
    Reminder(Option<u32>),
    Contacts(Vec<String>),
}

#[instrument(skip(args, now))]
fn parse_title_and_mods(
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    if title_parts.is_empty() {
        return Err(anyhow!("add: title is required"));
    }

    Ok((title_parts.join(" "), mods))
}

#[instrument(skip(args, now))]
fn parse_mods(args: &[String], now: NaiveDateTime) -> anyhow::Result<Vec<Mod>> {
    let mut mods = Vec::new();
    for arg in args {
        if let Some(one_mod) = parse_one_mod(arg, now)? {
            mods.push(one_mod);
        } else {
            warn!(arg = %arg, "unrecognized modifier token ignored");
        }
    }
    Ok(mods)
}

fn parse_one_mod(tok: &str, now: NaiveDateTime) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    let key = key.to_ascii_lowercase();
    let one_mod = match key.as_str() {
        "type" | "category" => Mod::Category(value.parse()?),
        "start" | "from" => Mod::Start(parse_datetime_expr(value, now)?),
        "end" | "until" => Mod::End(parse_datetime_expr(value, now)?),
        "dur" | "duration" => Mod::Duration(parse_duration(value)?),
        "title" => Mod::Title(value.to_string()),
        "location" | "loc" => Mod::Location(non_empty(value)),
        "note" => Mod::Note(non_empty(value)),
        "reminder" => Mod::Reminder(match non_empty(value) {
            Some(raw) => Some(
                raw.parse()
                    .with_context(|| format!("invalid reminder minutes: {raw}"))?,
            ),
            None => None,
        }),
        "contacts" => Mod::Contacts(
            value
                .split(',')
                .filter_map(non_empty)
                .collect(),
        ),
        _ => return Ok(None),
    };
    Ok(Some(one_mod))
}

/// `90`, `45m`, `2h` or `1h30m`.
fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    if let Ok(minutes) = raw.parse::<i64>() {
        return positive_minutes(minutes, raw);
    }

    let re = Regex::new(r"(?i)^(?:(\d+)h)?(?:(\d+)m(?:in)?)?$")?;
    let caps = re
        .captures(raw)
        .filter(|_| !raw.is_empty())
        .ok_or_else(|| anyhow!("invalid duration: {raw}"))?;
    let part = |idx: usize| -> anyhow::Result<i64> {
        match caps.get(idx) {
            Some(m) => Ok(m.as_str().parse::<i64>()?),
            None => Ok(0),
        }
    };
    let (hours, minutes) = (part(1)?, part(2)?);
    let minutes = hours
        .checked_mul(60)
        .and_then(|h| h.checked_add(minutes))
        .ok_or_else(|| anyhow!("duration too long: {raw}"))?;
    positive_minutes(minutes, raw)
}

fn positive_minutes(minutes: i64, raw: &str) -> anyhow::Result<Duration> {
    if minutes <= 0 {
        return Err(anyhow!("duration must be positive: {raw}"));
    }
    Duration::try_minutes(minutes).ok_or_else(|| anyhow!("duration too long: {raw}"))
}

fn end_after(start: NaiveDateTime, length: Duration) -> anyhow::Result<NaiveDateTime> {
    start
        .checked_add_signed(length)
        .ok_or_else(|| {
            anyhow!("end time out of range: {start} + {} minutes", length.num_minutes())
        })
}

fn draft_from_mods(
    title: String,
    mods: &[Mod],
    now: NaiveDateTime,
) -> anyhow::Result<ScheduleDraft> {
    let default_start = now
        .date()
        .and_time(NaiveTime::from_hms_opt(DEFAULT_START_HOUR, 0, 0).unwrap_or_default());
    let start = mods
        .iter()
        .rev()
        .find_map(|m| match m {
            Mod::Start(dt) => Some(*dt),
            _ => None,
        })
        .unwrap_or(default_start);

    let default_end =
        add_hours(start, 1).ok_or_else(|| anyhow!("end time out of range: {start} + 1 hour"))?;
    let mut draft = ScheduleDraft::new(title, start, default_end);
    for one_mod in mods {
        match one_mod {
            Mod::Category(c) => draft.category = *c,
            Mod::Start(_) => {}
            Mod::End(end) => draft.end = *end,
            Mod::Duration(d) => draft.end = end_after(start, *d)?,
            Mod::Title(t) => draft.title = t.clone(),
            Mod::Location(l) => draft.location = l.clone(),
            Mod::Note(n) => draft.note = n.clone(),
            Mod::Reminder(r) => draft.reminder = *r,
            Mod::Contacts(c) => draft.contacts = c.clone(),
        }
    }
    Ok(draft)
}

/// Moving the start without a new end keeps the event's length.
fn patch_from_mods(mods: &[Mod], current: &ScheduledEvent) -> anyhow::Result<SchedulePatch> {
    let mut patch = SchedulePatch::default();
    for one_mod in mods {
        match one_mod {
            Mod::Category(c) => patch.category = Some(*c),
            Mod::Start(dt) => patch.start = Some(*dt),
            Mod::End(dt) => patch.end = Some(*dt),
            Mod::Duration(_) => {}
            Mod::Title(t) => patch.title = Some(t.clone()),
            Mod::Location(l) => patch.location = Some(l.clone()),
            Mod::Note(n) => patch.note = Some(n.clone()),
            Mod::Reminder(r) => patch.reminder = Some(*r),
            Mod::Contacts(c) => patch.contacts = Some(c.clone()),
        }
    }

    let start = patch.start.unwrap_or(current.start);
    let duration = mods.iter().rev().find_map(|m| match m {
        Mod::Duration(d) => Some(*d),
        _ => None,
    });
    if let Some(d) = duration {
        patch.end = Some(end_after(start, d)?);
    } else if patch.start.is_some() && patch.end.is_none() {
        patch.end = Some(end_after(start, current.end - current.start)?);
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 10)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid datetime")
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, d)
            .and_then(|date| date.and_hms_opt(h, m, 0))
            .expect("valid datetime")
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("tim", &known), Some("timeline"));
        assert_eq!(expand_command_abbrev("bless", &known), Some("bless"));
        assert_eq!(expand_command_abbrev("bless-", &known), Some("bless-batch"));
        assert_eq!(expand_command_abbrev("c", &known), None);
        assert_eq!(expand_command_abbrev("xyz", &known), None);
    }

    #[test]
    fn add_arguments_split_into_title_and_modifiers() {
        let args = strings(&[
            "拜访",
            "外婆",
            "start:2026-02-17T10:00",
            "dur:90m",
            "type:visit",
            "loc:老家",
            "--",
            "note:literal",
        ]);
        let (title, mods) = parse_title_and_mods(&args, now()).expect("parse");
        assert_eq!(title, "拜访 外婆 note:literal");

        let draft = draft_from_mods(title, &mods, now()).expect("draft");
        assert_eq!(draft.start, at(17, 10, 0));
        assert_eq!(draft.end, at(17, 11, 30));
        assert_eq!(draft.category, ScheduleCategory::Visit);
        assert_eq!(draft.location.as_deref(), Some("老家"));
        assert_eq!(draft.note, None);
    }

    #[test]
    fn add_defaults_to_eight_oclock_for_one_hour() {
        let (title, mods) = parse_title_and_mods(&strings(&["聚会"]), now()).expect("parse");
        let draft = draft_from_mods(title, &mods, now()).expect("draft");
        assert_eq!(draft.start, at(10, 8, 0));
        assert_eq!(draft.end, at(10, 9, 0));
        assert_eq!(draft.category, ScheduleCategory::Other);
    }

    #[test]
    fn moving_start_keeps_length_and_empty_values_clear() {
        let mut draft = ScheduleDraft::new("饭局", at(18, 18, 0), at(18, 20, 0));
        draft.location = Some("酒楼".to_string());
        let current = draft.into_event(now());

        let mods = parse_mods(&strings(&["start:2026-02-19T17:00", "location:"]), now())
            .expect("mods");
        let patch = patch_from_mods(&mods, &current).expect("patch");
        assert_eq!(patch.start, Some(at(19, 17, 0)));
        assert_eq!(patch.end, Some(at(19, 19, 0)));
        assert_eq!(patch.location, Some(None));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90").expect("minutes"), Duration::minutes(90));
        assert_eq!(parse_duration("2h").expect("hours"), Duration::hours(2));
        assert_eq!(parse_duration("1h30m").expect("mixed"), Duration::minutes(90));
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("9999999999999999").is_err());
        assert!(parse_duration("9999999999999999h").is_err());
        assert!(parse_duration("99999999999999999999m").is_err());
    }

    #[test]
    fn huge_durations_fail_instead_of_overflowing() {
        let args = strings(&["x", "dur:999999999999"]);
        let built = parse_title_and_mods(&args, now())
            .and_then(|(title, mods)| draft_from_mods(title, &mods, now()));
        assert!(built.is_err());

        let current = ScheduleDraft::new("饭局", at(18, 18, 0), at(18, 20, 0)).into_event(now());
        // Roughly 270 000 years, past the last representable datetime.
        let long = [Mod::Duration(Duration::days(100_000_000))];
        assert!(patch_from_mods(&long, &current).is_err());
    }

    #[test]
    fn bad_modifier_values_are_errors() {
        assert!(parse_one_mod("type:party", now()).is_err());
        assert!(parse_one_mod("start:someday", now()).is_err());
        assert!(parse_one_mod("reminder:abc", now()).is_err());
        assert_eq!(parse_one_mod("weird:thing", now()).expect("ignored"), None);
        assert_eq!(parse_one_mod("plain", now()).expect("ignored"), None);
    }

    #[test]
    fn overlapping_pairs_are_found_once() {
        let mk = |id: &str, s: u32, e: u32| {
            let mut ev = ScheduleDraft::new(id, at(17, s, 0), at(17, e, 0)).into_event(now());
            ev.id = id.to_string();
            ev
        };
        let events = vec![mk("a", 9, 11), mk("b", 10, 12), mk("c", 12, 13), mk("d", 8, 9)];
        let pairs: Vec<_> = overlapping_pairs(&events)
            .into_iter()
            .map(|(x, y)| (x.id.as_str(), y.id.as_str()))
            .collect();
        assert_eq!(pairs, [("a", "b")]);
    }
}
