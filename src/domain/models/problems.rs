//! Problem registry and the systemic-defect classifier.
//!
//! The registry counts, per root-cause key, how many rounds reported that
//! defect. The classifier reads it to spot retries that attack symptoms
//! instead of causes: a round dominated by critical problems, or a critical
//! root cause that keeps coming back.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::config::ProblemConfig;
use super::round::{ProblemReport, Severity};

/// Recurrence record for one root cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseRecord {
    /// Rounds in which the key was reported.
    pub occurrences: u32,
    /// Rounds in which the key was reported as critical.
    pub critical_occurrences: u32,
    pub first_round: u32,
    pub last_round: u32,
    pub last_severity: Severity,
}

/// Run-scoped mapping from root-cause key to recurrence record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRegistry {
    entries: BTreeMap<String, RootCauseRecord>,
}

impl ProblemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the round's problems. A key reported several times in the same
    /// round counts once, at its worst severity.
    pub fn record(&mut self, round_index: u32, problems: &[ProblemReport]) {
        let mut worst: BTreeMap<&str, Severity> = BTreeMap::new();
        for problem in problems {
            let entry = worst
                .entry(problem.root_cause_key.as_str())
                .or_insert(problem.severity);
            *entry = (*entry).max(problem.severity);
        }

        for (key, severity) in worst {
            let is_critical = severity == Severity::Critical;
            self.entries
                .entry(key.to_string())
                .and_modify(|record| {
                    record.occurrences += 1;
                    if is_critical {
                        record.critical_occurrences += 1;
                    }
                    record.last_round = round_index;
                    record.last_severity = severity;
                })
                .or_insert(RootCauseRecord {
                    occurrences: 1,
                    critical_occurrences: u32::from(is_critical),
                    first_round: round_index,
                    last_round: round_index,
                    last_severity: severity,
                });
        }
    }

    pub fn get(&self, key: &str) -> Option<&RootCauseRecord> {
        self.entries.get(key)
    }

    pub fn occurrences(&self, key: &str) -> u32 {
        self.entries.get(key).map_or(0, |r| r.occurrences)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RootCauseRecord)> {
        self.entries.iter()
    }
}

/// Outcome of classifying one round's problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub early_stop: bool,
    pub reason: String,
}

impl Classification {
    fn proceed() -> Self {
        Self {
            early_stop: false,
            reason: "no systemic defect".to_string(),
        }
    }
}

/// Pure classifier over a round's problems and the run's registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemClassifier {
    config: ProblemConfig,
}

impl ProblemClassifier {
    pub const fn new(config: ProblemConfig) -> Self {
        Self { config }
    }

    /// Fraction of `problems` that are critical; zero for an empty report.
    pub fn critical_fraction(problems: &[ProblemReport]) -> f64 {
        if problems.is_empty() {
            return 0.0;
        }
        let critical = problems
            .iter()
            .filter(|p| p.severity == Severity::Critical)
            .count();
        critical as f64 / problems.len() as f64
    }

    /// Classify `problems`; `registry` must already include them.
    pub fn classify(&self, problems: &[ProblemReport], registry: &ProblemRegistry) -> Classification {
        let fraction = Self::critical_fraction(problems);
        if fraction > self.config.critical_fraction_threshold {
            return Classification {
                early_stop: true,
                reason: format!(
                    "systemic defect: {:.0}% of problems are critical (threshold {:.0}%)",
                    fraction * 100.0,
                    self.config.critical_fraction_threshold * 100.0
                ),
            };
        }

        let repeated: BTreeSet<&str> = problems
            .iter()
            .filter(|p| p.severity == Severity::Critical)
            .filter(|p| registry.occurrences(&p.root_cause_key) >= self.config.repeated_critical_threshold)
            .map(|p| p.root_cause_key.as_str())
            .collect();
        if let Some(key) = repeated.iter().next() {
            return Classification {
                early_stop: true,
                reason: format!(
                    "repeated unresolved critical defect: '{key}' reported in {} rounds",
                    registry.occurrences(key)
                ),
            };
        }

        Classification::proceed()
    }
}

impl Default for ProblemClassifier {
    fn default() -> Self {
        Self::new(ProblemConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critical(key: &str) -> ProblemReport {
        ProblemReport::new(Severity::Critical, key, 1)
    }

    fn low(key: &str) -> ProblemReport {
        ProblemReport::new(Severity::Low, key, 1)
    }

    #[test]
    fn test_half_critical_is_systemic() {
        let problems = vec![critical("a"), critical("b"), low("c"), low("d")];
        let mut registry = ProblemRegistry::new();
        registry.record(1, &problems);
        let result = ProblemClassifier::default().classify(&problems, &registry);
        assert!(result.early_stop);
        assert!(result.reason.starts_with("systemic defect"));
    }

    #[test]
    fn test_below_fraction_threshold() {
        let problems = vec![critical("a"), low("b"), low("c"), low("d")];
        let mut registry = ProblemRegistry::new();
        registry.record(1, &problems);
        let result = ProblemClassifier::default().classify(&problems, &registry);
        assert!(!result.early_stop);
    }

    #[test]
    fn test_empty_report_is_not_systemic() {
        let result = ProblemClassifier::default().classify(&[], &ProblemRegistry::new());
        assert!(!result.early_stop);
        assert!(ProblemClassifier::critical_fraction(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_critical_on_third_round() {
        let classifier = ProblemClassifier::default();
        let mut registry = ProblemRegistry::new();
        let filler = [low("x1"), low("x2"), low("x3")];

        for (round, expect_stop) in [(3, false), (5, false), (7, true)] {
            let mut problems = vec![critical("schema-drift")];
            problems.extend_from_slice(&filler);
            registry.record(round, &problems);
            let result = classifier.classify(&problems, &registry);
            assert_eq!(result.early_stop, expect_stop, "round {round}");
            if expect_stop {
                assert!(result.reason.contains("schema-drift"));
            }
        }
        let record = registry.get("schema-drift").unwrap();
        assert_eq!(record.first_round, 3);
        assert_eq!(record.last_round, 7);
        assert_eq!(record.critical_occurrences, 3);
    }

    #[test]
    fn test_repeated_key_must_be_critical_now() {
        let classifier = ProblemClassifier::default();
        let mut registry = ProblemRegistry::new();
        for round in 1..=3 {
            registry.record(round, &[low("flaky"), low("f2"), low("f3"), low("f4")]);
        }
        let problems = vec![low("flaky")];
        assert!(!classifier.classify(&problems, &registry).early_stop);
    }

    #[test]
    fn test_same_key_counts_once_per_round() {
        let mut registry = ProblemRegistry::new();
        registry.record(1, &[low("dup"), critical("dup"), low("dup")]);
        let record = registry.get("dup").unwrap();
        assert_eq!(record.occurrences, 1);
        assert_eq!(record.last_severity, Severity::Critical);
    }
}
