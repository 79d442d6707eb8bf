use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{DATE_FORMAT, TIME_FORMAT, days_in_month, format_due};
use crate::store::{RemoteChange, RemoteChangeKind};
use crate::task::{List, Priority, Task};
use crate::view::CalendarCursor;

const ID_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(title = title, count = tasks.len()))]
    pub fn print_view(
        &self,
        title: &str,
        tasks: &[&Task],
        lists: &[List],
        user: &str,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(title, "1"))?;
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }
        self.write_task_table(&mut out, tasks, lists, user, today)?;
        writeln!(out, "{} task(s)", tasks.len())?;
        Ok(())
    }

    pub fn write_task_table<W: Write>(
        &self,
        writer: W,
        tasks: &[&Task],
        lists: &[List],
        user: &str,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "", "Due", "Time", "Pri", "List", "Title", "Sub", "Owner"]
            .map(String::from)
            .to_vec();

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id: String = task.id.as_str().chars().take(ID_PREFIX_LEN).collect();
            let done = if task.completed { "[x]" } else { "[ ]" }.to_string();

            let mut due = task
                .due_date
                .map(|date| format_due(date, today))
                .unwrap_or_default();
            if task.due_date.is_some_and(|date| date < today) && !task.completed {
                due = self.paint(&due, "31");
            }

            let time = task
                .time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default();
            let list = task
                .list_id
                .as_ref()
                .and_then(|id| lists.iter().find(|l| &l.id == id))
                .map(|l| l.name.clone())
                .unwrap_or_default();
            let subtasks = match task.subtask_progress() {
                (_, 0) => String::new(),
                (done, total) => format!("{done}/{total}"),
            };
            let title = if task.completed {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&id, "33"),
                done,
                due,
                time,
                self.paint_priority(task.priority),
                list,
                title,
                subtasks,
                owner_label(task, user),
            ]);
        }

        write_table(writer, headers, rows)
    }

    #[tracing::instrument(skip_all, fields(id = %task.id))]
    pub fn print_task_info(
        &self,
        task: &Task,
        lists: &[List],
        user: &str,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", if task.completed { "completed" } else { "open" })?;
        writeln!(out, "priority  {}", task.priority.as_str())?;
        if let Some(date) = task.due_date {
            writeln!(
                out,
                "due       {} ({})",
                date.format(DATE_FORMAT),
                format_due(date, today)
            )?;
        }
        if let Some(time) = task.time {
            writeln!(out, "time      {}", time.format(TIME_FORMAT))?;
        }
        if let Some(list_id) = &task.list_id {
            let name = lists
                .iter()
                .find(|l| &l.id == list_id)
                .map(|l| l.name.as_str())
                .unwrap_or("(deleted list)");
            writeln!(out, "list      {name}")?;
        }
        writeln!(out, "owner     {}", owner_label(task, user))?;

        for (idx, subtask) in task.subtasks.iter().enumerate() {
            let mark = if subtask.done { "x" } else { " " };
            writeln!(out, "  {}. [{mark}] {}", idx + 1, subtask.text)?;
        }

        Ok(())
    }

    pub fn print_lists(&self, lists: &[List], tasks: &[Task], show_archived: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["ID", "Name", "Open", "Color", ""].map(String::from).to_vec();
        let rows = lists
            .iter()
            .filter(|list| show_archived || !list.archived)
            .map(|list| {
                let open = tasks
                    .iter()
                    .filter(|t| !t.completed && t.list_id.as_ref() == Some(&list.id))
                    .count();
                vec![
                    self.paint(list.id.as_str(), "33"),
                    format!("{}{}", list.icon.as_deref().map(|i| format!("{i} ")).unwrap_or_default(), list.name),
                    open.to_string(),
                    list.color.clone().unwrap_or_default(),
                    if list.archived { "archived".to_string() } else { String::new() },
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_calendar(
        &self,
        cursor: CalendarCursor,
        days: &BTreeMap<NaiveDate, Vec<&Task>>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        render_calendar(io::stdout().lock(), cursor, days, today)
    }

    /// One-line notice about a change made by another writer.
    pub fn toast(&self, change: &RemoteChange) -> anyhow::Result<()> {
        let message = match change.kind {
            RemoteChangeKind::TaskAdded => "New task added by teammate",
            RemoteChangeKind::Updated => "List updated by teammate",
        };
        let mut err = io::stderr().lock();
        writeln!(err, "{}", self.paint(message, "36"))?;
        Ok(())
    }

    pub fn message(&self, text: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{text}")?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        match priority {
            Priority::High => self.paint("H", "31"),
            Priority::Medium => "M".to_string(),
            Priority::Low => self.paint("L", "2"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn owner_label(task: &Task, user: &str) -> String {
    match task.owner.as_deref() {
        None => String::new(),
        Some(_) if task.is_owned_by(user) => "me".to_string(),
        Some(owner) => owner.to_string(),
    }
}

/// Month grid, Monday first, with a per-day count of due tasks (`12*3`).
pub fn render_calendar<W: Write>(
    mut writer: W,
    cursor: CalendarCursor,
    days: &BTreeMap<NaiveDate, Vec<&Task>>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let Some(first) = NaiveDate::from_ymd_opt(cursor.year, cursor.month, 1) else {
        return Err(anyhow!("invalid calendar month {}-{}", cursor.year, cursor.month));
    };

    writeln!(writer, "{}", first.format("%B %Y"))?;
    writeln!(writer, "{}", [" Mo", " Tu", " We", " Th", " Fr", " Sa", " Su"].map(|d| format!("{d:<5}")).concat())?;

    let lead = first.weekday().num_days_from_monday() as usize;
    let mut line = " ".repeat(lead * 5);
    for day in 1..=days_in_month(cursor.year, cursor.month) {
        let Some(date) = NaiveDate::from_ymd_opt(cursor.year, cursor.month, day) else {
            continue;
        };
        let count = days.get(&date).map_or(0, Vec::len);
        let marker = if date == today { '>' } else { ' ' };
        let cell = if count > 0 {
            format!("{marker}{day:>2}*{count}")
        } else {
            format!("{marker}{day:>2}")
        };
        line.push_str(&format!("{cell:<5}"));

        if date.weekday().num_days_from_monday() == 6 {
            writeln!(writer, "{}", line.trim_end())?;
            line.clear();
        }
    }
    if !line.trim().is_empty() {
        writeln!(writer, "{}", line.trim_end())?;
    }

    for (date, tasks) in days {
        writeln!(writer)?;
        writeln!(writer, "{}", date.format(DATE_FORMAT))?;
        for task in tasks {
            let time = task
                .time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "     ".to_string());
            let mark = if task.completed { "x" } else { " " };
            writeln!(writer, "  [{mark}] {time} {}", task.title)?;
        }
    }

    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
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
