//! Engine counters and Prometheus text export

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    seeds_committed: AtomicU64,
    seeds_revealed: AtomicU64,
    rounds_opened: AtomicU64,
    rounds_settled: AtomicU64,
    parameter_rejections: AtomicU64,
    verifications: AtomicU64,
    integrity_mismatches: AtomicU64,
    entropy_failures: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub seeds_committed: u64,
    pub seeds_revealed: u64,
    pub rounds_opened: u64,
    pub rounds_settled: u64,
    pub parameter_rejections: u64,
    pub verifications: u64,
    pub integrity_mismatches: u64,
    pub entropy_failures: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seed_committed(&self) {
        self.seeds_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seed_revealed(&self) {
        self.seeds_revealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_opened(&self) {
        self.rounds_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_settled(&self) {
        self.rounds_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parameter_rejection(&self) {
        self.parameter_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verification(&self, valid: bool) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.integrity_mismatches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_entropy_failure(&self) {
        self.entropy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            seeds_committed: self.seeds_committed.load(Ordering::Relaxed),
            seeds_revealed: self.seeds_revealed.load(Ordering::Relaxed),
            rounds_opened: self.rounds_opened.load(Ordering::Relaxed),
            rounds_settled: self.rounds_settled.load(Ordering::Relaxed),
            parameter_rejections: self.parameter_rejections.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            integrity_mismatches: self.integrity_mismatches.load(Ordering::Relaxed),
            entropy_failures: self.entropy_failures.load(Ordering::Relaxed),
        }
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("fairness_seeds_committed_total", "Server seeds committed", snapshot.seeds_committed),
            ("fairness_seeds_revealed_total", "Server seeds revealed", snapshot.seeds_revealed),
            ("fairness_rounds_opened_total", "Rounds opened", snapshot.rounds_opened),
            ("fairness_rounds_settled_total", "Rounds settled", snapshot.rounds_settled),
            (
                "fairness_parameter_rejections_total",
                "Rounds rejected for invalid parameters",
                snapshot.parameter_rejections,
            ),
            ("fairness_verifications_total", "Verification requests served", snapshot.verifications),
            (
                "fairness_integrity_mismatches_total",
                "Verifications that found a mismatch",
                snapshot.integrity_mismatches,
            ),
            ("fairness_entropy_failures_total", "Entropy source failures", snapshot.entropy_failures),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }
        output
    }
}
