use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::task::Task;

/// How many task titles a notification lists before "and N more".
const NAMED_TASKS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Overdue,
    DueToday,
    DueTomorrow,
}

impl ReminderKind {
    /// Delay after scheduling at which this kind fires when staggered.
    pub fn stagger_offset(self) -> Duration {
        match self {
            ReminderKind::Overdue => Duration::from_millis(500),
            ReminderKind::DueToday => Duration::from_millis(1500),
            ReminderKind::DueTomorrow => Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Default,
    Destructive,
}

/// A transient, toast-style message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: Option<ReminderKind>,
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: None,
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }
}

/// Receives notifications as they fire.
pub trait Notify: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Open tasks grouped by how their due date relates to `today`. The three
/// groups never share a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderDigest {
    pub overdue: Vec<String>,
    pub due_today: Vec<String>,
    pub due_tomorrow: Vec<String>,
}

impl ReminderDigest {
    pub fn collect(tasks: &[Task], today: NaiveDate) -> Self {
        let mut digest = Self::default();
        let tomorrow = today.succ_opt();

        for task in tasks {
            if task.is_done() {
                continue;
            }
            let Some(due) = task.due_date else {
                continue;
            };
            if due < today {
                digest.overdue.push(task.title.clone());
            } else if due == today {
                digest.due_today.push(task.title.clone());
            } else if Some(due) == tomorrow {
                digest.due_tomorrow.push(task.title.clone());
            }
        }

        digest
    }

    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.due_today.is_empty() && self.due_tomorrow.is_empty()
    }

    /// Notifications in firing order, one per non-empty group.
    pub fn notifications(&self) -> Vec<Notification> {
        let mut out = Vec::with_capacity(3);

        if !self.overdue.is_empty() {
            let n = self.overdue.len();
            out.push(Notification {
                kind: Some(ReminderKind::Overdue),
                title: format!("⚠️ {n} overdue task{}", plural(n)),
                description: summarize_titles(&self.overdue),
                variant: Variant::Destructive,
            });
        }
        if !self.due_today.is_empty() {
            let n = self.due_today.len();
            out.push(Notification {
                kind: Some(ReminderKind::DueToday),
                title: format!("📅 {n} task{} due today", plural(n)),
                description: summarize_titles(&self.due_today),
                variant: Variant::Default,
            });
        }
        if !self.due_tomorrow.is_empty() {
            let n = self.due_tomorrow.len();
            out.push(Notification {
                kind: Some(ReminderKind::DueTomorrow),
                title: format!("🔔 {n} task{} due tomorrow", plural(n)),
                description: summarize_titles(&self.due_tomorrow),
                variant: Variant::Default,
            });
        }

        out
    }
}

fn plural(n: usize) -> &'static str {
    if n > 1 { "s" } else { "" }
}

fn summarize_titles(titles: &[String]) -> String {
    let mut text = titles
        .iter()
        .take(NAMED_TASKS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if titles.len() > NAMED_TASKS {
        text.push_str(&format!(" and {} more", titles.len() - NAMED_TASKS));
    }
    text
}

/// Shows the due-date reminders once per session, after the store has
/// loaded.
#[derive(Debug)]
pub struct ReminderNotifier {
    shown: bool,
    stagger: bool,
}

impl Default for ReminderNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReminderNotifier {
    pub fn new(stagger: bool) -> Self {
        Self {
            shown: false,
            stagger,
        }
    }

    pub fn has_shown(&self) -> bool {
        self.shown
    }

    /// Schedules the reminders for `tasks` the first time it is called with
    /// `loaded` set. Later calls do nothing.
    #[tracing::instrument(skip(self, tasks, sink), fields(count = tasks.len()))]
    pub fn run(
        &mut self,
        tasks: &[Task],
        loaded: bool,
        today: NaiveDate,
        sink: Arc<dyn Notify>,
    ) -> Option<ScheduledReminders> {
        if !loaded {
            debug!("store not loaded yet; reminders deferred");
            return None;
        }
        if self.shown {
            debug!("reminders already shown this session");
            return None;
        }
        self.shown = true;

        let digest = ReminderDigest::collect(tasks, today);
        info!(
            overdue = digest.overdue.len(),
            due_today = digest.due_today.len(),
            due_tomorrow = digest.due_tomorrow.len(),
            "computed reminders"
        );
        if digest.is_empty() {
            return None;
        }

        let entries = digest
            .notifications()
            .into_iter()
            .map(|notification| {
                let offset = match (self.stagger, notification.kind) {
                    (true, Some(kind)) => kind.stagger_offset(),
                    _ => Duration::ZERO,
                };
                (offset, notification)
            })
            .collect();

        Some(ScheduledReminders::spawn(entries, sink))
    }
}

/// Pending staggered notifications. Dropping the handle cancels whatever has
/// not fired yet; [`ScheduledReminders::wait`] lets them all fire instead.
#[derive(Debug)]
pub struct ScheduledReminders {
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<usize>>,
}

impl ScheduledReminders {
    fn spawn(entries: Vec<(Duration, Notification)>, sink: Arc<dyn Notify>) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let started = Instant::now();
            let mut delivered = 0;
            for (offset, notification) in entries {
                let remaining = offset.saturating_sub(started.elapsed());
                match cancelled.recv_timeout(remaining) {
                    Err(RecvTimeoutError::Timeout) => {
                        sink.notify(&notification);
                        delivered += 1;
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(delivered, "reminder schedule cancelled");
                        return delivered;
                    }
                }
            }
            delivered
        });

        Self {
            cancel: Some(cancel),
            worker: Some(worker),
        }
    }

    /// Blocks until every notification has fired; returns how many did.
    pub fn wait(mut self) -> usize {
        let Some(worker) = self.worker.take() else {
            return 0;
        };
        match worker.join() {
            Ok(delivered) => delivered,
            Err(_) => {
                warn!("reminder worker panicked");
                0
            }
        }
    }

    /// Drops any notification that has not fired yet.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ScheduledReminders {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("reminder worker panicked");
        }
    }
}
