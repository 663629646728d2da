//! Append-only record of what happened to each subject.
//!
//! Weights are stored sparsely as `(step, value)` points and forward-filled
//! on read. Step 0 holds the start values; step `k >= 1` is the state after the
//! `k`-th stimulus.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::mechanism::{Mechanism, ResponseModel};
use crate::vocabulary::{BehaviorId, ElementId, Stimulus, Vocabulary};

/// One emitted stimulus and the response it got.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub stimulus: Stimulus,
    pub response: BehaviorId,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectOutput {
    v: Vec<Vec<(usize, f64)>>,
    w: Vec<Vec<(usize, f64)>>,
    step_phase: Vec<usize>,
    last_step: Option<usize>,
    history: Vec<HistoryEntry>,
    last_entry: Option<HistoryEntry>,
}

impl SubjectOutput {
    pub fn new(vocab: &Vocabulary) -> Self {
        Self {
            v: vec![Vec::new(); vocab.pair_count()],
            w: vec![Vec::new(); vocab.element_count()],
            ..Self::default()
        }
    }

    /// Record `v[element, behavior]` as of `step`.
    pub fn write_v(&mut self, pair: usize, step: usize, value: f64) {
        push_point(&mut self.v[pair], step, value);
    }

    pub fn write_w(&mut self, element: ElementId, step: usize, value: f64) {
        push_point(&mut self.w[element], step, value);
    }

    /// Mark `step` as belonging to phase index `phase`.
    pub fn write_step(&mut self, phase: usize, step: usize) {
        if self.step_phase.len() <= step {
            self.step_phase.resize(step + 1, phase);
        }
        self.step_phase[step] = phase;
    }

    pub fn write_history(&mut self, stimulus: Stimulus, response: BehaviorId) {
        self.history.push(HistoryEntry { stimulus, response });
    }

    /// Close the record: `step` is the last one and `entry` the final pair seen.
    pub fn write_last(&mut self, step: usize, entry: Option<HistoryEntry>) {
        self.last_step = Some(step);
        self.last_entry = entry;
    }

    /// Snapshot every `v` (and `w` when tracked) at `step`.
    pub fn write_all(&mut self, mechanism: &Mechanism, step: usize) {
        let vocab = Arc::clone(mechanism.vocabulary());
        for e in 0..vocab.element_count() {
            if mechanism.has_w() {
                self.write_w(e, step, mechanism.w(e));
            }
            for b in 0..vocab.behavior_count() {
                self.write_v(vocab.pair(e, b), step, mechanism.v(e, b));
            }
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.last_entry.as_ref()
    }

    /// Number of recorded steps including step 0.
    pub fn step_count(&self) -> usize {
        self.step_phase.len()
    }

    pub fn last_step(&self) -> Option<usize> {
        self.last_step
    }

    pub fn phase_of_step(&self, step: usize) -> Option<usize> {
        self.step_phase.get(step).copied()
    }

    /// Forward-filled `v` for a pair over steps `0..step_count()`.
    pub fn v_series(&self, pair: usize) -> Vec<f64> {
        forward_fill(&self.v[pair], self.step_count())
    }

    /// Forward-filled `w`; empty when the mechanism does not track `w`.
    pub fn w_series(&self, element: ElementId) -> Vec<f64> {
        if self.w[element].is_empty() {
            return Vec::new();
        }
        forward_fill(&self.w[element], self.step_count())
    }
}

fn push_point(points: &mut Vec<(usize, f64)>, step: usize, value: f64) {
    match points.last_mut() {
        Some(last) if last.0 == step => last.1 = value,
        _ => points.push((step, value)),
    }
}

fn forward_fill(points: &[(usize, f64)], len: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(len);
    let mut current = points.first().map(|p| p.1).unwrap_or(0.0);
    let mut next = 0;
    for step in 0..len {
        while next < points.len() && points[next].0 <= step {
            current = points[next].1;
            next += 1;
        }
        out.push(current);
    }
    out
}

/// Everything one `@run` produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub vocabulary: Arc<Vocabulary>,
    pub has_w: bool,
    pub response: ResponseModel,
    pub phase_labels: Vec<String>,
    pub subjects: Vec<SubjectOutput>,
}

impl RunOutput {
    pub fn phase_index(&self, label: &str) -> Option<usize> {
        self.phase_labels.iter().position(|p| p == label)
    }
}

/// Outputs of every run of a script, keyed by run label in run order.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutput {
    runs: IndexMap<String, RunOutput>,
}

impl SimulationOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, run: RunOutput) {
        self.runs.insert(label.into(), run);
    }

    pub fn get(&self, label: &str) -> Option<&RunOutput> {
        self.runs.get(label)
    }

    pub fn first(&self) -> Option<(&str, &RunOutput)> {
        self.runs.first().map(|(k, v)| (k.as_str(), v))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
