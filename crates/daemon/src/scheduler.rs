// Recurring trigger for the maintenance cycle.
//
// Sleeps until the next scheduled instant, then spawns the task and goes back
// to sleep. Firings are not serialized: a slow cycle can overlap the next one.
// Each firing runs behind its own boundary that logs errors and panics so a
// failing cycle never stops the schedule.

use std::collections::BTreeSet;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ── Schedules ───────────────────────────────────────────────────────

/// Source of firing instants.
pub trait Schedule: Send + Sync + 'static {
    /// Time to wait from now until the next firing, `None` when the schedule
    /// has no upcoming instant.
    fn next_delay(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression `{expression}`: {message}")]
    Invalid { expression: String, message: String },
}

/// Cron expression evaluated in the local timezone.
///
/// Accepts six or seven fields (seconds first, optional year). Classic
/// five-field expressions fire at second 0 of each matching minute.
/// Numeric days of week follow unix cron: 0 and 7 are Sunday, 1 is Monday.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize_expression(expression);
        let schedule = cron::Schedule::from_str(&normalized).map_err(|error| {
            ScheduleError::Invalid {
                expression: expression.to_string(),
                message: error.to_string(),
            }
        })?;

        Ok(Self { expression: expression.to_string(), schedule })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }
}

impl Schedule for CronSchedule {
    fn next_delay(&self) -> Option<Duration> {
        let now = Local::now();
        let next = self.next_after(&now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Position of the day-of-week field once the seconds field is present.
const DAY_OF_WEEK_FIELD: usize = 5;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn normalize_expression(expression: &str) -> String {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
    }
    if let Some(day_of_week) = fields.get_mut(DAY_OF_WEEK_FIELD) {
        *day_of_week = day_of_week_names(day_of_week);
    }
    fields.join(" ")
}

// The cron crate numbers weekdays 1-7 from Sunday. Numeric items are
// rewritten as day names so 0-7 keep their unix meaning. Items that are not
// plain numbers, ranges, or steps are passed through for the parser to judge.
fn day_of_week_names(field: &str) -> String {
    field
        .split(',')
        .map(|item| match unix_days(item) {
            Some(days) => {
                days.into_iter().map(|day| DAY_NAMES[day]).collect::<Vec<_>>().join(",")
            }
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Days (0 = Sunday) selected by one list item such as `3`, `1-5`, `*/2`, `0-7/2`.
fn unix_days(item: &str) -> Option<BTreeSet<usize>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|step| *step > 0)?),
        None => (item, 1),
    };

    let (start, end) = match range.split_once('-') {
        _ if range == "*" => {
            if step == 1 {
                return None;
            }
            (0, 6)
        }
        Some((start, end)) => (parse_unix_day(start)?, parse_unix_day(end)?),
        None if step > 1 => (parse_unix_day(range)?, 7),
        None => {
            let day = parse_unix_day(range)?;
            (day, day)
        }
    };
    if start > end {
        return None;
    }

    Some((start..=end).step_by(step).map(|day| day % 7).collect())
}

fn parse_unix_day(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|day| *day <= 7)
}

/// Fires every `period`, starting one period from now.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSchedule(pub Duration);

impl Schedule for IntervalSchedule {
    fn next_delay(&self) -> Option<Duration> {
        Some(self.0)
    }
}

// ── Scheduler loop ──────────────────────────────────────────────────

/// Handle for the scheduler background task.
/// Dropping the handle aborts the loop; cycles already running are left alone.
pub struct SchedulerHandle {
    task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    firings: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Number of times the task has been fired.
    pub fn firings(&self) -> u64 {
        self.firings.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop firing and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts firing `task` on `schedule` until the returned handle is shut down.
pub fn start_scheduler<S, F, Fut>(schedule: S, task: F) -> SchedulerHandle
where
    S: Schedule,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let firings = Arc::new(AtomicU64::new(0));

    let loop_firings = Arc::clone(&firings);
    let handle = tokio::spawn(async move {
        scheduler_loop(schedule, task, shutdown_rx, loop_firings).await;
    });

    SchedulerHandle { task: Some(handle), shutdown_tx, firings }
}

async fn scheduler_loop<S, F, Fut>(
    schedule: S,
    task: F,
    mut shutdown_rx: watch::Receiver<bool>,
    firings: Arc<AtomicU64>,
) where
    S: Schedule,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    loop {
        let Some(delay) = schedule.next_delay() else {
            warn!("schedule has no upcoming firing, stopping scheduler");
            break;
        };
        debug!(delay_ms = delay.as_millis() as u64, "next scheduled cycle");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown_rx.changed() => {
                debug!("scheduler shutting down");
                break;
            }
        }

        let firing = firings.fetch_add(1, Ordering::SeqCst) + 1;
        info!(firing, "scheduled cycle starting");
        tokio::spawn(run_guarded(firing, task()));
    }
}

async fn run_guarded<Fut>(firing: u64, cycle: Fut)
where
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    match tokio::spawn(cycle).await {
        Ok(Ok(())) => debug!(firing, "scheduled cycle finished"),
        Ok(Err(error)) => warn!(firing, error = %format!("{error:#}"), "scheduled cycle failed"),
        Err(join_error) => error!(firing, ?join_error, "scheduled cycle panicked"),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
