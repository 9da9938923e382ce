// Metrics registry for git actions and cycle activity.
//
// Explicitly constructed and shared via `Arc`; the engine writes, the
// `/metrics` endpoint reads.

mod process;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use glacier_common::types::GitAction;

pub use process::ProcessMetrics;

pub const ACTIVE_METRIC: &str = "git_glacier_active";
pub const GIT_BEGIN_METRIC: &str = "git_glacier_git_begin";
pub const GIT_SUCCESS_METRIC: &str = "git_glacier_git_success";
pub const GIT_ERROR_METRIC: &str = "git_glacier_git_error";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionKey {
    pub repo_name: String,
    pub action: GitAction,
}

impl ActionKey {
    pub fn new(repo_name: &str, action: GitAction) -> Self {
        Self { repo_name: repo_name.to_string(), action }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub begin: u64,
    pub success: u64,
    pub error: u64,
}

/// Point-in-time copy of every series in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active: i64,
    pub actions: BTreeMap<ActionKey, ActionCounts>,
}

impl MetricsSnapshot {
    pub fn counts(&self, repo_name: &str, action: GitAction) -> ActionCounts {
        self.actions.get(&ActionKey::new(repo_name, action)).copied().unwrap_or_default()
    }
}

pub struct GlacierMetrics {
    active: AtomicI64,
    git_begin: Mutex<HashMap<ActionKey, u64>>,
    git_success: Mutex<HashMap<ActionKey, u64>>,
    git_error: Mutex<HashMap<ActionKey, u64>>,
    process: Option<ProcessMetrics>,
}

impl Default for GlacierMetrics {
    fn default() -> Self {
        Self {
            active: AtomicI64::new(0),
            git_begin: Mutex::new(HashMap::new()),
            git_success: Mutex::new(HashMap::new()),
            git_error: Mutex::new(HashMap::new()),
            process: None,
        }
    }
}

impl GlacierMetrics {
    /// Registry that also exports metrics about the current process.
    pub fn with_process_metrics() -> Self {
        Self { process: Some(ProcessMetrics::for_current_process()), ..Self::default() }
    }

    /// Marks a cycle as running until the returned guard is dropped.
    pub fn enter_cycle(&self) -> ActiveGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard { metrics: self }
    }

    pub fn active(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn record_begin(&self, repo_name: &str, action: GitAction) {
        increment_counter(&self.git_begin, ActionKey::new(repo_name, action));
    }

    pub fn record_success(&self, repo_name: &str, action: GitAction) {
        increment_counter(&self.git_success, ActionKey::new(repo_name, action));
    }

    pub fn record_error(&self, repo_name: &str, action: GitAction) {
        increment_counter(&self.git_error, ActionKey::new(repo_name, action));
    }

    pub fn begin_count(&self, repo_name: &str, action: GitAction) -> u64 {
        read_counter(&self.git_begin, &ActionKey::new(repo_name, action))
    }

    pub fn success_count(&self, repo_name: &str, action: GitAction) -> u64 {
        read_counter(&self.git_success, &ActionKey::new(repo_name, action))
    }

    pub fn error_count(&self, repo_name: &str, action: GitAction) -> u64 {
        read_counter(&self.git_error, &ActionKey::new(repo_name, action))
    }

    /// Sum of `success` across repositories for one action.
    pub fn success_total(&self, action: GitAction) -> u64 {
        sum_for_action(&self.git_success, action)
    }

    /// Sum of `error` across repositories for one action.
    pub fn error_total(&self, action: GitAction) -> u64 {
        sum_for_action(&self.git_error, action)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut actions: BTreeMap<ActionKey, ActionCounts> = BTreeMap::new();
        for (key, value) in self.git_begin.lock().expect("metrics map lock poisoned").iter() {
            actions.entry(key.clone()).or_default().begin = *value;
        }
        for (key, value) in self.git_success.lock().expect("metrics map lock poisoned").iter() {
            actions.entry(key.clone()).or_default().success = *value;
        }
        for (key, value) in self.git_error.lock().expect("metrics map lock poisoned").iter() {
            actions.entry(key.clone()).or_default().error = *value;
        }

        MetricsSnapshot { active: self.active(), actions }
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        push_header(
            &mut output,
            ACTIVE_METRIC,
            "Number of reconciliation or maintenance cycles in progress.",
            "gauge",
        );
        output.push_str(&format!("{ACTIVE_METRIC} {}\n", self.active()));

        push_header(
            &mut output,
            GIT_BEGIN_METRIC,
            "Git actions started by repository and action.",
            "counter",
        );
        append_action_lines(&mut output, GIT_BEGIN_METRIC, &self.git_begin);

        push_header(
            &mut output,
            GIT_SUCCESS_METRIC,
            "Git actions that succeeded by repository and action.",
            "counter",
        );
        append_action_lines(&mut output, GIT_SUCCESS_METRIC, &self.git_success);

        push_header(
            &mut output,
            GIT_ERROR_METRIC,
            "Git actions that failed by repository and action.",
            "counter",
        );
        append_action_lines(&mut output, GIT_ERROR_METRIC, &self.git_error);

        if let Some(process) = &self.process {
            process.render(&mut output);
        }

        output
    }
}

/// Decrements the active gauge on drop, so every exit path releases it.
#[must_use = "the cycle is only counted as active while the guard is alive"]
pub struct ActiveGuard<'a> {
    metrics: &'a GlacierMetrics,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.metrics.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn increment_counter(map: &Mutex<HashMap<ActionKey, u64>>, key: ActionKey) {
    let mut guard = map.lock().expect("metrics map lock poisoned");
    let value = guard.entry(key).or_insert(0);
    *value = value.saturating_add(1);
}

fn read_counter(map: &Mutex<HashMap<ActionKey, u64>>, key: &ActionKey) -> u64 {
    map.lock().expect("metrics map lock poisoned").get(key).copied().unwrap_or(0)
}

fn sum_for_action(map: &Mutex<HashMap<ActionKey, u64>>, action: GitAction) -> u64 {
    let guard = map.lock().expect("metrics map lock poisoned");
    guard.iter().filter(|(key, _)| key.action == action).map(|(_, value)| *value).sum()
}

fn push_header(output: &mut String, metric_name: &str, help: &str, kind: &str) {
    output.push_str(&format!("# HELP {metric_name} {help}\n"));
    output.push_str(&format!("# TYPE {metric_name} {kind}\n"));
}

fn append_action_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<ActionKey, u64>>,
) {
    let guard = map.lock().expect("metrics map lock poisoned");
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{repoName=\"{}\",action=\"{}\"}} {value}\n",
            escape_label_value(&key.repo_name),
            key.action.as_str(),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn render_prometheus_includes_gauge_and_labeled_counters() {
        let metrics = GlacierMetrics::default();
        metrics.record_begin("alpha", GitAction::Clone);
        metrics.record_success("alpha", GitAction::Clone);
        metrics.record_begin("beta", GitAction::Update);
        metrics.record_error("beta", GitAction::Update);
        metrics.record_begin("beta", GitAction::Update);
        let _guard = metrics.enter_cycle();

        let rendered = metrics.render_prometheus();

        assert!(rendered.contains("# TYPE git_glacier_active gauge"));
        assert!(rendered.contains("git_glacier_active 1\n"));
        assert!(rendered.contains("# TYPE git_glacier_git_begin counter"));
        assert!(rendered.contains("git_glacier_git_begin{repoName=\"alpha\",action=\"clone\"} 1"));
        assert!(rendered.contains("git_glacier_git_begin{repoName=\"beta\",action=\"update\"} 2"));
        assert!(
            rendered.contains("git_glacier_git_success{repoName=\"alpha\",action=\"clone\"} 1")
        );
        assert!(rendered.contains("git_glacier_git_error{repoName=\"beta\",action=\"update\"} 1"));
        assert!(!rendered.contains("process_resident_memory_bytes"));
    }

    #[test]
    fn counter_lines_are_sorted_by_repo_then_action() {
        let metrics = GlacierMetrics::default();
        metrics.record_begin("beta", GitAction::Gc);
        metrics.record_begin("alpha", GitAction::Gc);
        metrics.record_begin("alpha", GitAction::Update);

        let rendered = metrics.render_prometheus();
        let lines: Vec<_> =
            rendered.lines().filter(|line| line.starts_with("git_glacier_git_begin{")).collect();
        assert_eq!(
            lines,
            vec![
                "git_glacier_git_begin{repoName=\"alpha\",action=\"update\"} 1",
                "git_glacier_git_begin{repoName=\"alpha\",action=\"gc\"} 1",
                "git_glacier_git_begin{repoName=\"beta\",action=\"gc\"} 1",
            ]
        );
    }

    #[test]
    fn active_guard_releases_on_drop() {
        let metrics = GlacierMetrics::default();
        {
            let _outer = metrics.enter_cycle();
            let _inner = metrics.enter_cycle();
            assert_eq!(metrics.active(), 2);
        }
        assert_eq!(metrics.active(), 0);
    }

    #[test]
    fn active_guard_releases_on_panic() {
        let metrics = Arc::new(GlacierMetrics::default());
        let worker = Arc::clone(&metrics);
        let result = std::thread::spawn(move || {
            let _guard = worker.enter_cycle();
            panic!("cycle blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(metrics.active(), 0);
    }

    #[test]
    fn snapshot_merges_series() {
        let metrics = GlacierMetrics::default();
        metrics.record_begin("alpha", GitAction::Gc);
        metrics.record_error("alpha", GitAction::Gc);
        metrics.record_begin("alpha", GitAction::Gc);
        metrics.record_success("alpha", GitAction::Gc);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active, 0);
        assert_eq!(
            snapshot.counts("alpha", GitAction::Gc),
            ActionCounts { begin: 2, success: 1, error: 1 }
        );
        assert_eq!(snapshot.counts("missing", GitAction::Gc), ActionCounts::default());
    }

    #[test]
    fn totals_sum_across_repositories() {
        let metrics = GlacierMetrics::default();
        metrics.record_error("alpha", GitAction::Update);
        metrics.record_error("beta", GitAction::Update);
        metrics.record_error("beta", GitAction::Gc);
        metrics.record_success("alpha", GitAction::Gc);

        assert_eq!(metrics.error_total(GitAction::Update), 2);
        assert_eq!(metrics.error_total(GitAction::Gc), 1);
        assert_eq!(metrics.success_total(GitAction::Gc), 1);
        assert_eq!(metrics.success_total(GitAction::Clone), 0);
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label_value("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn process_metrics_are_rendered_when_enabled() {
        let metrics = GlacierMetrics::with_process_metrics();
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("# TYPE process_resident_memory_bytes gauge"));
        assert!(rendered.contains("# TYPE process_start_time_seconds gauge"));
    }
}
