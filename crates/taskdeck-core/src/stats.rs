use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::task::{Priority, Status, Task};

/// Trailing window for the "completed this week" card.
pub const RECENT_COMPLETION_DAYS: i64 = 7;

/// Counts shown above the task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                Status::Todo => stats.todo += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Done => stats.done += 1,
            }
        }
        stats
    }
}

/// Rounded percentage of done tasks; zero for an empty list.
pub fn completion_rate(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub label: &'static str,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub stats: TaskStats,
    pub completion_rate: u32,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
    pub overdue: usize,
    pub completed_recently: usize,
    /// To Do / In Progress / Completed, without zero entries.
    pub status_series: Vec<ChartPoint>,
    /// High / Medium / Low, always all three.
    pub priority_series: Vec<ChartPoint>,
}

impl Dashboard {
    #[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, today: NaiveDate) -> Self {
        let stats = TaskStats::from_tasks(tasks);
        let by_priority =
            |priority: Priority| tasks.iter().filter(|t| t.priority == priority).count();
        let high_priority = by_priority(Priority::High);
        let medium_priority = by_priority(Priority::Medium);
        let low_priority = by_priority(Priority::Low);

        let overdue = tasks.iter().filter(|t| t.is_overdue(today)).count();

        let window_start = now - Duration::days(RECENT_COMPLETION_DAYS);
        let completed_recently = tasks
            .iter()
            .filter(|t| t.is_done() && t.completed_at.is_some_and(|at| at > window_start))
            .count();

        let status_series = [
            ("To Do", stats.todo),
            ("In Progress", stats.in_progress),
            ("Completed", stats.done),
        ]
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(label, value)| ChartPoint { label, value })
        .collect();

        let priority_series = vec![
            ChartPoint {
                label: Priority::High.label(),
                value: high_priority,
            },
            ChartPoint {
                label: Priority::Medium.label(),
                value: medium_priority,
            },
            ChartPoint {
                label: Priority::Low.label(),
                value: low_priority,
            },
        ];

        Self {
            stats,
            completion_rate: completion_rate(stats.done, stats.total),
            high_priority,
            medium_priority,
            low_priority,
            overdue,
            completed_recently,
            status_series,
            priority_series,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::task::TaskDraft;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date")
    }

    #[test]
    fn completion_rate_rounds_and_handles_empty() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(1, 8), 13);
        assert_eq!(completion_rate(4, 4), 100);
    }

    #[test]
    fn empty_dashboard_has_no_status_series() {
        let dash = Dashboard::compute(&[], now(), today());
        assert_eq!(dash.completion_rate, 0);
        assert!(dash.status_series.is_empty());
        assert_eq!(dash.priority_series.len(), 3);
        assert!(dash.priority_series.iter().all(|p| p.value == 0));
    }

    #[test]
    fn aggregates_counts_overdue_and_recent_completions() {
        let yesterday = today().pred_opt().expect("yesterday");
        let mut recent_done =
            Task::from_draft(TaskDraft::new("shipped").with_status(Status::Done), now());
        recent_done.completed_at = Some(now() - Duration::days(2));
        let mut old_done =
            Task::from_draft(TaskDraft::new("ancient").with_status(Status::Done), now());
        old_done.completed_at = Some(now() - Duration::days(10));
        old_done.due_date = Some(yesterday);

        let tasks = vec![
            Task::from_draft(
                TaskDraft::new("late")
                    .with_priority(Priority::High)
                    .with_due_date(yesterday),
                now(),
            ),
            Task::from_draft(
                TaskDraft::new("today")
                    .with_status(Status::InProgress)
                    .with_priority(Priority::High)
                    .with_due_date(today()),
                now(),
            ),
            recent_done,
            old_done,
        ];

        let dash = Dashboard::compute(&tasks, now(), today());
        assert_eq!(dash.stats.total, 4);
        assert_eq!(dash.stats.done, 2);
        assert_eq!(dash.completion_rate, 50);
        assert_eq!(dash.high_priority, 2);
        assert_eq!(dash.medium_priority, 2);
        assert_eq!(dash.low_priority, 0);
        assert_eq!(dash.overdue, 1);
        assert_eq!(dash.completed_recently, 1);
        assert_eq!(
            dash.status_series,
            vec![
                ChartPoint {
                    label: "To Do",
                    value: 1
                },
                ChartPoint {
                    label: "In Progress",
                    value: 1
                },
                ChartPoint {
                    label: "Completed",
                    value: 2
                },
            ]
        );
    }
}
