use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::datetime::format_due_badge;
use crate::reminders::{Notification, Notify, Variant};
use crate::stats::{ChartPoint, Dashboard, TaskStats};
use crate::task::{Priority, Status, Task};

const BAR_WIDTH: usize = 30;

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

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Sink that prints notifications to stderr as they fire.
    pub fn toaster(&self) -> ToastPrinter {
        ToastPrinter {
            renderer: self.clone(),
        }
    }

    pub fn print_stats(&self, stats: &TaskStats) -> anyhow::Result<()> {
        let stdout = io::stdout();
        self.for_stream(&stdout).write_stats(&mut stdout.lock(), stats)
    }

    pub fn print_task_cards(&self, tasks: &[&Task], today: NaiveDate) -> anyhow::Result<()> {
        let stdout = io::stdout();
        self.for_stream(&stdout)
            .write_task_cards(&mut stdout.lock(), tasks, today)
    }

    pub fn print_empty_state(&self, has_filters: bool) -> anyhow::Result<()> {
        write_empty_state(&mut io::stdout().lock(), has_filters)
    }

    pub fn print_dashboard(&self, dash: &Dashboard) -> anyhow::Result<()> {
        let stdout = io::stdout();
        self.for_stream(&stdout).write_dashboard(&mut stdout.lock(), dash)
    }

    pub fn print_toast(&self, toast: &Notification) -> anyhow::Result<()> {
        let stderr = io::stderr();
        self.for_stream(&stderr).write_toast(&mut stderr.lock(), toast)
    }

    /// Colour stays on only when `stream` is a terminal.
    pub fn for_stream<T: IsTerminal>(&self, stream: &T) -> Self {
        Self {
            color: self.color && stream.is_terminal(),
        }
    }

    pub fn write_stats<W: Write>(&self, out: &mut W, stats: &TaskStats) -> anyhow::Result<()> {
        let cells = [
            ("Total", stats.total),
            ("To Do", stats.todo),
            ("In Progress", stats.in_progress),
            ("Completed", stats.done),
        ];
        let line = cells
            .iter()
            .map(|(label, value)| format!("{} {label}", self.paint(&value.to_string(), "1")))
            .collect::<Vec<_>>()
            .join("  |  ");
        writeln!(out, "{line}")?;
        writeln!(out)?;
        Ok(())
    }

    /// One card per task, numbered by list position.
    pub fn write_task_cards<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "".to_string(),
            "Title".to_string(),
            "Priority".to_string(),
            "Due".to_string(),
            "ID".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let glyph = match task.status {
                Status::Todo => self.paint("○", "2"),
                Status::InProgress => self.paint("◐", "36"),
                Status::Done => self.paint("●", "32"),
            };

            let title = if task.is_done() {
                self.paint(&task.title, "9;2")
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                glyph,
                title,
                self.priority_badge(task.priority),
                self.due_badge(task, today),
                short_id(&task.id).to_string(),
            ]);

            if let Some(description) = task.description.as_deref() {
                rows.push(vec![
                    String::new(),
                    String::new(),
                    self.paint(&clamp_text(description, 60), "2"),
                    String::new(),
                    String::new(),
                    String::new(),
                ]);
            }
        }

        write_table(out, headers, rows)
    }

    pub fn write_task_info<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id           {}", task.id)?;
        writeln!(out, "title        {}", task.title)?;
        writeln!(
            out,
            "description  {}",
            task.description.clone().unwrap_or_default()
        )?;
        writeln!(out, "status       {}", task.status.label())?;
        writeln!(out, "priority     {}", task.priority.label())?;
        if let Some(due) = task.due_date {
            writeln!(out, "due          {}", due.format("%Y-%m-%d"))?;
        }
        writeln!(out, "created      {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        if let Some(done) = task.completed_at {
            writeln!(out, "completed    {}", done.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }

    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        self.write_task_info(&mut io::stdout().lock(), task)
    }

    pub fn write_dashboard<W: Write>(&self, out: &mut W, dash: &Dashboard) -> anyhow::Result<()> {
        let stats = dash.stats;
        writeln!(out, "{}", self.paint("Dashboard", "1"))?;
        writeln!(out, "Track your productivity and task progress")?;
        writeln!(out)?;

        let headline = [
            ("Total Tasks", stats.total.to_string(), "All time tasks created".to_string()),
            (
                "Completion Rate",
                format!("{}%", dash.completion_rate),
                format!("{} of {} completed", stats.done, stats.total),
            ),
            ("In Progress", stats.in_progress.to_string(), "Currently working on".to_string()),
            ("Overdue", dash.overdue.to_string(), "Need attention".to_string()),
        ];
        let secondary = [
            (
                "Completed This Week",
                dash.completed_recently.to_string(),
                "Tasks finished in the last 7 days".to_string(),
            ),
            (
                "High Priority",
                dash.high_priority.to_string(),
                "Urgent tasks to focus on".to_string(),
            ),
            ("To Do", stats.todo.to_string(), "Waiting to be started".to_string()),
        ];

        let rows = headline
            .into_iter()
            .chain(secondary)
            .map(|(label, value, hint)| vec![label.to_string(), self.paint(&value, "1"), hint])
            .collect();
        write_table(
            &mut *out,
            vec!["Metric".to_string(), "Value".to_string(), "".to_string()],
            rows,
        )?;

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Task Status Distribution", "1"))?;
        if dash.status_series.is_empty() {
            writeln!(out, "  No tasks to display")?;
        } else {
            self.write_bars(&mut *out, &dash.status_series)?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Priority Breakdown", "1"))?;
        self.write_bars(&mut *out, &dash.priority_series)?;
        Ok(())
    }

    fn write_bars<W: Write>(&self, out: &mut W, series: &[ChartPoint]) -> anyhow::Result<()> {
        let max = series.iter().map(|p| p.value).max().unwrap_or(0);
        let label_width = series
            .iter()
            .map(|p| UnicodeWidthStr::width(p.label))
            .max()
            .unwrap_or(0);

        for point in series {
            let len = if max == 0 {
                0
            } else {
                (point.value * BAR_WIDTH).div_ceil(max)
            };
            let padding = label_width.saturating_sub(UnicodeWidthStr::width(point.label));
            writeln!(
                out,
                "  {}{} {} {}",
                point.label,
                " ".repeat(padding),
                self.paint(&"█".repeat(len), "36"),
                point.value
            )?;
        }
        Ok(())
    }

    pub fn write_toast<W: Write>(&self, out: &mut W, toast: &Notification) -> anyhow::Result<()> {
        let title = match toast.variant {
            Variant::Destructive => self.paint(&toast.title, "1;31"),
            Variant::Default => self.paint(&toast.title, "1"),
        };
        if toast.description.is_empty() {
            writeln!(out, "{title}")?;
        } else {
            writeln!(out, "{title}: {}", toast.description)?;
        }
        Ok(())
    }

    fn priority_badge(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::Low => "32",
            Priority::Medium => "33",
            Priority::High => "31",
        };
        self.paint(priority.label(), code)
    }

    fn due_badge(&self, task: &Task, today: NaiveDate) -> String {
        let Some(due) = task.due_date else {
            return String::new();
        };
        let text = format_due_badge(due);
        if task.is_overdue(today) {
            self.paint(&format!("! {text}"), "31")
        } else if task.is_due_on(today) {
            self.paint(&text, "33")
        } else {
            text
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Prints toasts to stderr; used as the reminder sink.
#[derive(Debug, Clone)]
pub struct ToastPrinter {
    renderer: Renderer,
}

impl Notify for ToastPrinter {
    fn notify(&self, notification: &Notification) {
        if let Err(err) = self.renderer.print_toast(notification) {
            tracing::warn!(error = %err, "failed to print notification");
        }
    }
}

pub fn write_empty_state<W: Write>(out: &mut W, has_filters: bool) -> anyhow::Result<()> {
    if has_filters {
        writeln!(out, "No matching tasks")?;
        writeln!(
            out,
            "Try adjusting your filters or search query to find what you're looking for."
        )?;
    } else {
        writeln!(out, "No tasks yet")?;
        writeln!(
            out,
            "Get started by creating your first task: taskdeck add <title>"
        )?;
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn clamp_text(text: &str, max_width: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if UnicodeWidthStr::width(first_line) <= max_width && !text.contains('\n') {
        return first_line.to_string();
    }

    let mut out = String::new();
    let mut width = 0;
    for ch in first_line.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
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

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
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

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::task::TaskDraft;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date")
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn cards_mark_overdue_and_due_today() {
        let late = Task::from_draft(
            TaskDraft::new("File taxes")
                .with_priority(Priority::High)
                .with_due_date(today().pred_opt().expect("yesterday")),
            Utc::now(),
        );
        let now_due = Task::from_draft(
            TaskDraft::new("Water plants")
                .with_description("the ferns")
                .with_due_date(today()),
            Utc::now(),
        );
        let renderer = Renderer::plain();
        let text = render(|out| renderer.write_task_cards(out, &[&late, &now_due], today()));

        assert!(text.contains("! Oct 17"));
        assert!(text.contains("Oct 18"));
        assert!(!text.contains("! Oct 18"));
        assert!(text.contains("the ferns"));
        assert!(text.contains("High"));
    }

    #[test]
    fn empty_state_depends_on_filters() {
        let filtered = render(|out| write_empty_state(out, true));
        assert!(filtered.starts_with("No matching tasks"));
        let fresh = render(|out| write_empty_state(out, false));
        assert!(fresh.starts_with("No tasks yet"));
    }

    #[test]
    fn dashboard_without_tasks_shows_placeholder() {
        let dash = Dashboard::compute(&[], Utc::now(), today());
        let text = render(|out| Renderer::plain().write_dashboard(out, &dash));
        assert!(text.contains("No tasks to display"));
        assert!(text.contains("Completion Rate"));
        assert!(text.contains("0%"));
    }

    #[test]
    fn destructive_toast_keeps_description() {
        let toast = Notification {
            kind: None,
            title: "⚠️ 1 overdue task".to_string(),
            description: "File taxes".to_string(),
            variant: Variant::Destructive,
        };
        let text = render(|out| Renderer::plain().write_toast(out, &toast));
        assert_eq!(text, "⚠️ 1 overdue task: File taxes\n");
    }

    #[test]
    fn colour_is_decided_per_stream() {
        let coloured = Renderer { color: true };
        let toast = Notification::info("Task created", "Your new task is ready.");
        let text = render(|out| coloured.write_toast(out, &toast));
        assert!(text.starts_with("\x1b[1m"));

        let file = tempfile::tempfile().expect("tempfile");
        let piped = coloured.for_stream(&file);
        let text = render(|out| piped.write_toast(out, &toast));
        assert_eq!(text, "Task created: Your new task is ready.\n");
        assert!(!Renderer::plain().for_stream(&io::stderr()).color);
    }

    #[test]
    fn clamps_long_descriptions() {
        let long = "x".repeat(100);
        let clamped = clamp_text(&long, 10);
        assert_eq!(UnicodeWidthStr::width(clamped.as_str()), 10);
        assert!(clamped.ends_with('…'));
    }
}
