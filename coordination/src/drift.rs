//! Drift Monitor: rolling failure rate per task category
//!
//! A read-only consumer of validation verdicts. It never changes how a run
//! proceeds; it only answers "is this category degrading?" so the caller
//! can decide what to do (re-plan, page someone, switch models).

use crate::router::task_classifier::TaskCategory;
use crate::verifier::report::ValidationResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Sliding-window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Outcomes kept per category
    pub window: usize,
    /// Degraded when the failure rate is strictly above this
    pub failure_threshold: f64,
    /// No verdict until this many samples are in the window
    pub min_samples: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window: 20,
            failure_threshold: 0.5,
            min_samples: 5,
        }
    }
}

/// Point-in-time view of one category's window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftSnapshot {
    pub category: TaskCategory,
    pub samples: usize,
    pub failures: usize,
    pub failure_rate: f64,
    pub degraded: bool,
}

pub type SharedDriftMonitor = Arc<DriftMonitor>;

/// Per-category pass/fail ring buffers.
#[derive(Debug, Default)]
pub struct DriftMonitor {
    config: DriftConfig,
    windows: Mutex<HashMap<TaskCategory, VecDeque<bool>>>,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(self) -> SharedDriftMonitor {
        Arc::new(self)
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Record one verdict. Fire-and-forget.
    pub fn observe(&self, category: TaskCategory, result: &ValidationResult) {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let window = windows
            .entry(category)
            .or_insert_with(|| VecDeque::with_capacity(self.config.window));
        if window.len() >= self.config.window {
            window.pop_front();
        }
        window.push_back(result.passed);
        debug!(category = %category, passed = result.passed, samples = window.len(), "Drift sample");
    }

    pub fn snapshot(&self, category: TaskCategory) -> DriftSnapshot {
        let windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let (samples, failures) = windows
            .get(&category)
            .map(|w| (w.len(), w.iter().filter(|passed| !**passed).count()))
            .unwrap_or((0, 0));
        let failure_rate = if samples == 0 {
            0.0
        } else {
            failures as f64 / samples as f64
        };
        DriftSnapshot {
            category,
            samples,
            failures,
            failure_rate,
            degraded: samples > 0
                && samples >= self.config.min_samples
                && failure_rate > self.config.failure_threshold,
        }
    }

    /// Rolling failure rate, 0.0 with no samples.
    pub fn failure_rate(&self, category: TaskCategory) -> f64 {
        self.snapshot(category).failure_rate
    }

    pub fn is_degraded(&self, category: TaskCategory) -> bool {
        self.snapshot(category).degraded
    }

    /// Drop all samples for `category`, e.g. after the caller re-plans.
    pub fn reset(&self, category: TaskCategory) {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        windows.remove(&category);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(window: usize, threshold: f64, min_samples: usize) -> DriftMonitor {
        DriftMonitor::new(DriftConfig {
            window,
            failure_threshold: threshold,
            min_samples,
        })
    }

    fn pass() -> ValidationResult {
        ValidationResult::passed(1)
    }

    fn fail() -> ValidationResult {
        ValidationResult::failed("boom", 1)
    }

    #[test]
    fn test_empty_is_healthy() {
        let m = DriftMonitor::new(DriftConfig::default());
        assert!(!m.is_degraded(TaskCategory::Generate));
        assert_eq!(m.failure_rate(TaskCategory::Generate), 0.0);
    }

    #[test]
    fn test_degrades_above_threshold() {
        let m = monitor(4, 0.5, 1);
        m.observe(TaskCategory::Fix, &fail());
        m.observe(TaskCategory::Fix, &pass());
        // exactly 0.5 is not above the threshold
        assert!(!m.is_degraded(TaskCategory::Fix));
        m.observe(TaskCategory::Fix, &fail());
        assert!(m.is_degraded(TaskCategory::Fix));
    }

    #[test]
    fn test_window_slides() {
        let m = monitor(3, 0.5, 1);
        for _ in 0..3 {
            m.observe(TaskCategory::Generate, &fail());
        }
        assert!(m.is_degraded(TaskCategory::Generate));
        for _ in 0..3 {
            m.observe(TaskCategory::Generate, &pass());
        }
        let snap = m.snapshot(TaskCategory::Generate);
        assert_eq!(snap.samples, 3);
        assert_eq!(snap.failures, 0);
        assert!(!snap.degraded);
    }

    #[test]
    fn test_min_samples_gate() {
        let m = monitor(10, 0.5, 3);
        m.observe(TaskCategory::Test, &fail());
        m.observe(TaskCategory::Test, &fail());
        assert!(!m.is_degraded(TaskCategory::Test));
        m.observe(TaskCategory::Test, &fail());
        assert!(m.is_degraded(TaskCategory::Test));
    }

    #[test]
    fn test_categories_independent() {
        let m = monitor(5, 0.5, 1);
        m.observe(TaskCategory::Fix, &fail());
        m.observe(TaskCategory::Generate, &pass());
        assert!(m.is_degraded(TaskCategory::Fix));
        assert!(!m.is_degraded(TaskCategory::Generate));
        m.reset(TaskCategory::Fix);
        assert!(!m.is_degraded(TaskCategory::Fix));
    }

    #[test]
    fn test_concurrent_observers() {
        let m = monitor(1000, 0.5, 1).shared();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let r = if i % 2 == 0 { pass() } else { fail() };
                        m.observe(TaskCategory::Other, &r);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = m.snapshot(TaskCategory::Other);
        assert_eq!(snap.samples, 400);
        assert_eq!(snap.failures, 200);
    }
}
