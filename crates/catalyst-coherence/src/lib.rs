//! Catalyst Coherence Scorer
//!
//! Computes a scalar coherence reading from observed signals. The scorer is
//! a pure evaluation function: it never fails, produces no side effects, and
//! substitutes a documented neutral default for any missing or NaN input.
//! Every substitution is reported back in `defaulted_fields` so callers can
//! tell a genuine zero from a defaulted one.
//!
//! The reading has three components, each independently clamped to [0, 1]:
//!
//! - `curl` — rewards detecting cyclical repetition
//!   (`repeated_concept_ratio × context_weight`)
//! - `divergence` — relative distance between two supplied intent values
//! - `potential` — unresolved threads over active capacity
//!
//! `coherent` holds iff `curl` and `divergence` are below their configured
//! thresholds. Thresholds are configuration, not constants.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Bag of named numeric signals supplied by the caller.
///
/// `None` means the signal was not observed; the scorer substitutes the
/// neutral default and reports the field name in `defaulted_fields`. The
/// two intent values are supplied inputs, never derived by the scorer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Ratio of repeated concepts in the observed window, expected in [0, 1].
    pub repeated_concept_ratio: Option<f64>,
    /// Weight applied to the repetition ratio. Defaults to 1.0.
    pub context_weight: Option<f64>,
    /// First intent measurement (supplied, not derived).
    pub intent_a: Option<f64>,
    /// Second intent measurement (supplied, not derived).
    pub intent_b: Option<f64>,
    /// Count of unresolved threads of work or conversation.
    pub unresolved_threads: Option<f64>,
    /// How many threads the agent can actively hold.
    pub active_capacity: Option<f64>,
}

impl SignalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repetition(mut self, ratio: f64) -> Self {
        self.repeated_concept_ratio = Some(ratio);
        self
    }

    pub fn with_context_weight(mut self, weight: f64) -> Self {
        self.context_weight = Some(weight);
        self
    }

    pub fn with_intents(mut self, a: f64, b: f64) -> Self {
        self.intent_a = Some(a);
        self.intent_b = Some(b);
        self
    }

    pub fn with_threads(mut self, unresolved: f64, capacity: f64) -> Self {
        self.unresolved_threads = Some(unresolved);
        self.active_capacity = Some(capacity);
        self
    }
}

/// Coherence gate thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoherenceThresholds {
    /// `coherent` requires `curl` strictly below this value.
    pub curl_max: f64,
    /// `coherent` requires `divergence` strictly below this value.
    pub divergence_max: f64,
    /// Floor for the divergence denominator, preventing division by zero.
    pub epsilon: f64,
}

impl Default for CoherenceThresholds {
    fn default() -> Self {
        Self {
            curl_max: 0.5,
            divergence_max: 0.6,
            epsilon: 1e-9,
        }
    }
}

/// Derived coherence reading. Never stored as authoritative truth on its
/// own — always recomputed from a signal snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReading {
    /// Cyclical-repetition score in [0, 1].
    pub curl: f64,
    /// Intent-distance score in [0, 1].
    pub divergence: f64,
    /// Unresolved-load score in [0, 1].
    pub potential: f64,
    /// True iff curl and divergence are below their thresholds.
    pub coherent: bool,
}

/// Scoring output: the reading plus every input field that was substituted
/// with its neutral default (missing or NaN).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreResult {
    pub reading: CoherenceReading,
    pub defaulted_fields: Vec<String>,
}

/// Evaluates signal snapshots against configured thresholds.
#[derive(Clone, Debug, Default)]
pub struct CoherenceScorer {
    thresholds: CoherenceThresholds,
}

impl CoherenceScorer {
    pub fn new(thresholds: CoherenceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn with_default_thresholds() -> Self {
        Self::new(CoherenceThresholds::default())
    }

    pub fn thresholds(&self) -> &CoherenceThresholds {
        &self.thresholds
    }

    /// Score a snapshot. Pure and total: unknown or NaN inputs become the
    /// neutral default for their component and are reported, never raised.
    pub fn score(&self, signals: &SignalSnapshot) -> ScoreResult {
        let mut defaulted = Vec::new();

        let ratio = take_or_default(
            signals.repeated_concept_ratio,
            0.0,
            "repeated_concept_ratio",
            &mut defaulted,
        );
        let weight =
            take_or_default(signals.context_weight, 1.0, "context_weight", &mut defaulted);
        let intent_a = take_or_default(signals.intent_a, 0.0, "intent_a", &mut defaulted);
        let intent_b = take_or_default(signals.intent_b, 0.0, "intent_b", &mut defaulted);
        let unresolved = take_or_default(
            signals.unresolved_threads,
            0.0,
            "unresolved_threads",
            &mut defaulted,
        );
        let capacity =
            take_or_default(signals.active_capacity, 0.0, "active_capacity", &mut defaulted);

        let curl = clamp01(ratio * weight);

        let denominator = intent_a.max(intent_b).max(self.thresholds.epsilon);
        let divergence = clamp01((intent_a - intent_b).abs() / denominator);

        let potential = clamp01(unresolved / capacity.max(1.0));

        let coherent =
            curl < self.thresholds.curl_max && divergence < self.thresholds.divergence_max;

        ScoreResult {
            reading: CoherenceReading {
                curl,
                divergence,
                potential,
                coherent,
            },
            defaulted_fields: defaulted,
        }
    }
}

/// Resolve one signal: missing or NaN becomes `default` and is recorded.
fn take_or_default(
    value: Option<f64>,
    default: f64,
    field: &str,
    defaulted: &mut Vec<String>,
) -> f64 {
    match value {
        Some(v) if !v.is_nan() => v,
        _ => {
            defaulted.push(field.to_string());
            default
        }
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_snapshot() -> SignalSnapshot {
        SignalSnapshot::new()
            .with_repetition(0.1)
            .with_context_weight(1.0)
            .with_intents(0.8, 0.7)
            .with_threads(2.0, 10.0)
    }

    #[test]
    fn coherent_for_calm_signals() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let result = scorer.score(&full_snapshot());
        assert!(result.reading.coherent);
        assert!(result.defaulted_fields.is_empty());
        assert!((result.reading.curl - 0.1).abs() < 1e-12);
        assert!((result.reading.potential - 0.2).abs() < 1e-12);
    }

    #[test]
    fn high_curl_breaks_coherence() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_repetition(0.7);
        let result = scorer.score(&snapshot);
        assert!(!result.reading.coherent);
        assert!((result.reading.curl - 0.7).abs() < 1e-12);
    }

    #[test]
    fn high_divergence_breaks_coherence() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_intents(1.0, 0.2);
        let result = scorer.score(&snapshot);
        assert!((result.reading.divergence - 0.8).abs() < 1e-12);
        assert!(!result.reading.coherent);
    }

    #[test]
    fn divergence_threshold_is_strict() {
        // divergence exactly at the threshold is NOT coherent
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_intents(1.0, 0.4);
        let result = scorer.score(&snapshot);
        assert!((result.reading.divergence - 0.6).abs() < 1e-12);
        assert!(!result.reading.coherent);
    }

    #[test]
    fn empty_snapshot_defaults_everything() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let result = scorer.score(&SignalSnapshot::new());
        assert_eq!(result.reading.curl, 0.0);
        assert_eq!(result.reading.divergence, 0.0);
        assert_eq!(result.reading.potential, 0.0);
        assert!(result.reading.coherent);
        assert_eq!(result.defaulted_fields.len(), 6);
    }

    #[test]
    fn nan_inputs_are_defaulted_and_reported() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_repetition(f64::NAN);
        let result = scorer.score(&snapshot);
        assert_eq!(result.reading.curl, 0.0);
        assert!(!result.reading.curl.is_nan());
        assert_eq!(
            result.defaulted_fields,
            vec!["repeated_concept_ratio".to_string()]
        );
    }

    #[test]
    fn components_clamped_to_unit_interval() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = SignalSnapshot::new()
            .with_repetition(3.0)
            .with_context_weight(5.0)
            .with_intents(100.0, -50.0)
            .with_threads(500.0, 1.0);
        let result = scorer.score(&snapshot);
        assert_eq!(result.reading.curl, 1.0);
        assert_eq!(result.reading.divergence, 1.0);
        assert_eq!(result.reading.potential, 1.0);
    }

    #[test]
    fn missing_weight_defaults_to_one() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = SignalSnapshot::new().with_repetition(0.4);
        let result = scorer.score(&snapshot);
        assert!((result.reading.curl - 0.4).abs() < 1e-12);
        assert!(result
            .defaulted_fields
            .contains(&"context_weight".to_string()));
    }

    #[test]
    fn zero_intents_do_not_divide_by_zero() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_intents(0.0, 0.0);
        let result = scorer.score(&snapshot);
        assert_eq!(result.reading.divergence, 0.0);
    }

    #[test]
    fn capacity_floor_is_one() {
        let scorer = CoherenceScorer::with_default_thresholds();
        let snapshot = full_snapshot().with_threads(0.5, 0.0);
        let result = scorer.score(&snapshot);
        assert!((result.reading.potential - 0.5).abs() < 1e-12);
    }

    #[test]
    fn custom_thresholds_shift_the_gate() {
        let scorer = CoherenceScorer::new(CoherenceThresholds {
            curl_max: 0.05,
            ..Default::default()
        });
        let result = scorer.score(&full_snapshot());
        assert!(!result.reading.coherent); // curl 0.1 above the tightened gate
    }
}
