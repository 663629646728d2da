//! Phase graphs and the world that chains them.
//!
//! A `@phase` block is kept as text ([`PhaseDef`]) until a run compiles it
//! against that run's [`Vocabulary`]. The compiled [`Phase`] is a small
//! probabilistic state machine: each line emits a stimulus, and its conditions
//! pick the next line from the subject's latest response.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::literal::{parse_literal, Literal};
use crate::prng::Prng;
use crate::vocabulary::{BehaviorId, ElementId, Stimulus, Vocabulary};

const LINE_SEPARATOR: char = '|';
const PROBABILITY_EPSILON: f64 = 1e-9;

/// Uncompiled phase: label, end condition text, and body rows in order.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDef {
    pub label: String,
    pub end: String,
    pub rows: Vec<String>,
}

impl PhaseDef {
    pub fn new(label: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            end: end.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: impl Into<String>) -> Self {
        self.rows.push(row.into());
        self
    }

    /// Resolve every reference against `vocab` and build the state machine.
    pub fn compile(&self, vocab: &Arc<Vocabulary>) -> Result<Phase> {
        if self.rows.is_empty() {
            return Err(Error::invalid(format!("phase '{}' has no lines", self.label)));
        }

        let mut labels: Vec<&str> = Vec::with_capacity(self.rows.len());
        let mut rests: Vec<&str> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let (label, rest) = split_first_word(row);
            let Some(rest) = rest else {
                return Err(Error::syntax(format!(
                    "phase '{}': line '{row}' has no stimulus",
                    self.label
                )));
            };
            if vocab.element_id(label).is_some() {
                return Err(Error::invalid(format!(
                    "the phase line label '{label}' coincides with the name of a stimulus element"
                )));
            }
            if vocab.behavior_id(label).is_some() {
                return Err(Error::invalid(format!(
                    "the phase line label '{label}' coincides with the name of a behavior"
                )));
            }
            if labels.contains(&label) {
                return Err(Error::invalid(format!(
                    "line label '{label}' is duplicated in phase '{}'",
                    self.label
                )));
            }
            labels.push(label);
            rests.push(rest);
        }

        let lines = labels
            .iter()
            .zip(&rests)
            .map(|(label, rest)| PhaseLine::parse(label, rest, &labels, vocab, &self.label))
            .collect::<Result<Vec<_>>>()?;
        let end = EndCondition::parse(&self.end, &labels, vocab, &self.label)?;

        Ok(Phase {
            label: self.label.clone(),
            vocabulary: Arc::clone(vocab),
            lines,
            end,
            counts: EventCounts::new(labels.len(), vocab),
            current: 0,
            prev_line: None,
            started: false,
        })
    }
}

/// Guard of a [`Condition`]: which response and how many consecutive repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub response: Option<BehaviorId>,
    pub count: Option<u32>,
}

impl Guard {
    fn matches(&self, response: Option<BehaviorId>, line_count: u32, response_count: u32) -> bool {
        match (self.response, self.count) {
            (None, None) => true,
            (None, Some(n)) => line_count >= n,
            (Some(b), None) => response == Some(b),
            (Some(b), Some(n)) => response == Some(b) && response_count >= n,
        }
    }

    fn is_unconditional(&self) -> bool {
        self.response.is_none() && self.count.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub guard: Guard,
    /// `(probability, target line)` in declaration order.
    pub edges: Vec<(f64, usize)>,
    cumulative: Vec<f64>,
}

impl Condition {
    fn parse(
        text: &str,
        labels: &[&str],
        vocab: &Vocabulary,
        phase: &str,
    ) -> Result<Self> {
        if text.matches(':').count() > 1 {
            return Err(Error::syntax(format!(
                "condition '{text}' has more than one colon"
            )));
        }
        let (guard_text, edges_text) = match text.split_once(':') {
            Some((g, e)) => (Some(g.trim()), e.trim()),
            None => (None, text.trim()),
        };

        let mut guard = Guard {
            response: None,
            count: None,
        };
        if let Some(g) = guard_text {
            let response = match g.split_once('=') {
                Some((r, n)) => {
                    guard.count = Some(positive_int(n.trim()).ok_or_else(|| {
                        Error::syntax(format!("expected an integer, got '{}'", n.trim()))
                    })?);
                    Some(r.trim())
                }
                None => match positive_int(g) {
                    Some(n) => {
                        guard.count = Some(n);
                        None
                    }
                    None => Some(g),
                },
            };
            if let Some(r) = response {
                let name = strip_quotes(r);
                guard.response = Some(vocab.require_behavior(&name, &format!("phase '{phase}'"))?);
            }
        }

        let items: Vec<&str> = edges_text.split(',').map(str::trim).collect();
        let mut edges: Vec<(f64, usize)> = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(target) = labels.iter().position(|l| l == item) {
                if items.len() > 1 {
                    return Err(Error::syntax(format!("invalid condition '{edges_text}'")));
                }
                edges.push((1.0, target));
                continue;
            }
            let (open, close) = match (item.find('('), item.rfind(')')) {
                (Some(o), Some(c)) if o < c && item.matches('(').count() == 1 => (o, c),
                _ => return Err(Error::syntax(format!("malformed condition '{text}'"))),
            };
            if !item[close + 1..].trim().is_empty() {
                return Err(Error::syntax(format!("malformed condition '{text}'")));
            }
            let label = item[..open].trim();
            let target = labels.iter().position(|l| *l == label).ok_or_else(|| {
                Error::UnknownLine {
                    label: label.to_string(),
                    phase: phase.to_string(),
                }
            })?;
            let p_text = item[open + 1..close].trim();
            let p = probability(p_text).ok_or_else(|| {
                Error::invalid(format!("expected a probability, got '{p_text}'"))
            })?;
            if edges.iter().any(|&(_, t)| t == target) {
                return Err(Error::invalid(format!(
                    "label '{label}' duplicated in '{edges_text}'"
                )));
            }
            edges.push((p, target));
        }

        let mut cumulative = Vec::with_capacity(edges.len());
        let mut sum = 0.0;
        for &(p, _) in &edges {
            sum += p;
            cumulative.push(sum);
        }
        if sum > 1.0 + PROBABILITY_EPSILON {
            return Err(Error::invalid(format!(
                "sum of probabilities in '{edges_text}' is {sum} > 1"
            )));
        }
        // Full mass that misses 1.0 only by rounding must never leave a gap.
        if sum >= 1.0 - PROBABILITY_EPSILON {
            if let Some(last) = cumulative.last_mut() {
                *last = 1.0;
            }
        }

        Ok(Self {
            guard,
            edges,
            cumulative,
        })
    }

    /// Total probability assigned to the edges.
    pub fn assigned_mass(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// `None` when the guard fails or the draw lands in unassigned mass.
    fn resolve(
        &self,
        response: Option<BehaviorId>,
        line_count: u32,
        response_count: u32,
        rng: &mut Prng,
    ) -> Option<usize> {
        if !self.guard.matches(response, line_count, response_count) {
            return None;
        }
        rng.choose_cumulative(&self.cumulative)
            .map(|i| self.edges[i].1)
    }
}

/// A node of the phase graph.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseLine {
    pub label: String,
    pub stimulus: Stimulus,
    pub conditions: Vec<Condition>,

    // Per-subject counters, reset with the phase.
    line_count: u32,
    response_count: u32,
    prev_response: Option<BehaviorId>,
}

impl PhaseLine {
    fn parse(
        label: &str,
        rest: &str,
        labels: &[&str],
        vocab: &Vocabulary,
        phase: &str,
    ) -> Result<Self> {
        let Some((stimulus_text, conditions_text)) = rest.split_once(LINE_SEPARATOR) else {
            return Err(Error::syntax(format!(
                "line with label '{label}' has no conditions"
            )));
        };
        let context = format!("line '{label}' of phase '{phase}'");
        let names = stimulus_names(stimulus_text.trim());
        if names.is_empty() {
            return Err(Error::syntax(format!("line '{label}' has an empty stimulus")));
        }
        let elements = names
            .iter()
            .map(|n| vocab.require_element(n, &context))
            .collect::<Result<Vec<ElementId>>>()?;

        let conditions = conditions_text
            .split(LINE_SEPARATOR)
            .map(|c| Condition::parse(c.trim(), labels, vocab, phase))
            .collect::<Result<Vec<_>>>()?;

        if let Some(last) = conditions.last() {
            if last.guard.is_unconditional() && last.assigned_mass() < 1.0 - PROBABILITY_EPSILON {
                return Err(Error::invalid(format!(
                    "the last condition of line '{label}' in phase '{phase}' leaves probability unassigned"
                )));
            }
        }

        Ok(Self {
            label: label.to_string(),
            stimulus: Stimulus::new(elements),
            conditions,
            line_count: 1,
            response_count: 1,
            prev_response: None,
        })
    }

    fn reset(&mut self) {
        self.line_count = 1;
        self.response_count = 1;
        self.prev_response = None;
    }

    /// Pick the line after this one, given the line visited before it.
    fn next_line(
        &mut self,
        own_index: usize,
        prev_line: Option<usize>,
        response: Option<BehaviorId>,
        rng: &mut Prng,
    ) -> Option<usize> {
        if prev_line == Some(own_index) {
            self.line_count += 1;
            if self.prev_response == response {
                self.response_count += 1;
            } else {
                self.response_count = 1;
            }
        } else {
            self.line_count = 1;
            self.response_count = 1;
        }
        self.prev_response = response;

        self.conditions
            .iter()
            .find_map(|c| c.resolve(response, self.line_count, self.response_count, rng))
    }
}

/// What the end condition counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKey {
    Line(usize),
    Element(ElementId),
    Behavior(BehaviorId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndCondition {
    pub key: EndKey,
    pub threshold: u32,
}

impl EndCondition {
    fn parse(text: &str, labels: &[&str], vocab: &Vocabulary, phase: &str) -> Result<Self> {
        let Some((key, n)) = text.split_once('=') else {
            return Err(Error::syntax(format!(
                "end condition '{text}' of phase '{phase}' must have the form KEY=N"
            )));
        };
        let key = strip_quotes(key.trim());
        let threshold = positive_int(n.trim()).ok_or_else(|| {
            Error::syntax(format!(
                "end condition '{text}' of phase '{phase}': '{}' is not a positive integer",
                n.trim()
            ))
        })?;
        let key = if let Some(i) = labels.iter().position(|l| *l == key) {
            EndKey::Line(i)
        } else if let Some(e) = vocab.element_id(&key) {
            EndKey::Element(e)
        } else if let Some(b) = vocab.behavior_id(&key) {
            EndKey::Behavior(b)
        } else {
            return Err(Error::invalid(format!(
                "end condition key '{key}' of phase '{phase}' is not a line label, stimulus element or behavior"
            )));
        };
        Ok(Self { key, threshold })
    }
}

/// Occurrence counts of line labels, elements and responses since the last
/// subject reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCounts {
    lines: Vec<u32>,
    elements: Vec<u32>,
    behaviors: Vec<u32>,
}

impl EventCounts {
    fn new(lines: usize, vocab: &Vocabulary) -> Self {
        Self {
            lines: vec![0; lines],
            elements: vec![0; vocab.element_count()],
            behaviors: vec![0; vocab.behavior_count()],
        }
    }

    pub fn get(&self, key: EndKey) -> u32 {
        match key {
            EndKey::Line(i) => self.lines[i],
            EndKey::Element(e) => self.elements[e],
            EndKey::Behavior(b) => self.behaviors[b],
        }
    }

    fn clear(&mut self) {
        self.lines.fill(0);
        self.elements.fill(0);
        self.behaviors.fill(0);
    }

    fn tally(&mut self, line: usize, stimulus: &Stimulus, response: Option<BehaviorId>) {
        self.lines[line] += 1;
        for &e in stimulus.elements() {
            self.elements[e] += 1;
        }
        if let Some(b) = response {
            self.behaviors[b] += 1;
        }
    }
}

/// One compiled phase.
#[derive(Debug, Clone)]
pub struct Phase {
    label: String,
    vocabulary: Arc<Vocabulary>,
    lines: Vec<PhaseLine>,
    end: EndCondition,
    counts: EventCounts,

    current: usize,
    prev_line: Option<usize>,
    started: bool,
}

impl Phase {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn lines(&self) -> &[PhaseLine] {
        &self.lines
    }

    pub fn end(&self) -> EndCondition {
        self.end
    }

    pub fn counts(&self) -> &EventCounts {
        &self.counts
    }

    pub fn subject_reset(&mut self) {
        self.current = 0;
        self.prev_line = None;
        self.started = false;
        self.counts.clear();
        self.lines.iter_mut().for_each(PhaseLine::reset);
    }

    /// The next stimulus and the line that emits it, or `None` once the end
    /// condition has been reached.
    pub fn next_stimulus(
        &mut self,
        response: Option<BehaviorId>,
        rng: &mut Prng,
    ) -> Result<Option<(usize, Stimulus)>> {
        let line = if self.started {
            let current = self.current;
            let next = self.lines[current].next_line(current, self.prev_line, response, rng);
            let Some(next) = next else {
                return Err(Error::NoConditionMet {
                    phase: self.label.clone(),
                    line: self.lines[current].label.clone(),
                    response: response
                        .map(|b| self.vocabulary.behavior_name(b).to_string())
                        .unwrap_or_default(),
                });
            };
            self.prev_line = Some(current);
            self.current = next;
            next
        } else {
            self.started = true;
            self.current
        };

        if self.counts.get(self.end.key) >= self.end.threshold {
            return Ok(None);
        }
        let stimulus = self.lines[line].stimulus.clone();
        self.counts.tally(line, &stimulus, response);
        Ok(Some((line, stimulus)))
    }
}

/// Where a [`World`] emission came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub stimulus: Stimulus,
    pub phase: usize,
    pub line: usize,
}

/// The ordered phases of one run.
#[derive(Debug, Clone)]
pub struct World {
    phases: Vec<Phase>,
    current: usize,
}

impl World {
    pub fn new(phases: Vec<Phase>) -> Result<Self> {
        if phases.is_empty() {
            return Err(Error::invalid("a run needs at least one phase"));
        }
        Ok(Self { phases, current: 0 })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase_label(&self, index: usize) -> &str {
        &self.phases[index].label
    }

    pub fn current_phase(&self) -> usize {
        self.current
    }

    /// Advance the active phase; on exhaustion move on to the next phase with
    /// the same response. `None` once every phase is done.
    pub fn next_stimulus(
        &mut self,
        response: Option<BehaviorId>,
        rng: &mut Prng,
    ) -> Result<Option<Emission>> {
        loop {
            if let Some((line, stimulus)) = self.phases[self.current].next_stimulus(response, rng)? {
                return Ok(Some(Emission {
                    stimulus,
                    phase: self.current,
                    line,
                }));
            }
            if self.current + 1 >= self.phases.len() {
                return Ok(None);
            }
            self.current += 1;
            debug!(phase = %self.phases[self.current].label, "entering phase");
        }
    }

    pub fn subject_reset(&mut self) {
        self.current = 0;
        self.phases.iter_mut().for_each(Phase::subject_reset);
    }
}

/// Split at the first run of whitespace.
fn split_first_word(s: &str) -> (&str, Option<&str>) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], Some(s[i..].trim())),
        None => (s, None),
    }
}

fn strip_quotes(s: &str) -> String {
    s.chars().filter(|&c| c != '\'' && c != '"').collect()
}

fn positive_int(s: &str) -> Option<u32> {
    s.parse::<u32>().ok().filter(|&n| n > 0)
}

/// A number in `[0, 1]`, also accepted as a fraction `a/b`.
fn probability(s: &str) -> Option<f64> {
    let p = match parse_literal(s).ok().and_then(|l| l.as_f64()) {
        Some(p) => p,
        None => {
            let (num, den) = s.split_once('/')?;
            let num = parse_literal(num.trim()).ok()?.as_f64()?;
            let den = parse_literal(den.trim()).ok()?.as_f64()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
    };
    (0.0..=1.0).contains(&p).then_some(p)
}

/// A tuple literal of names, or a single name with or without quotes.
fn stimulus_names(text: &str) -> Vec<String> {
    match parse_literal(text) {
        Ok(Literal::Tuple(items)) => items
            .iter()
            .map(|i| match i {
                Literal::Str(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Ok(Literal::Str(s)) => vec![s],
        _ => {
            let name = strip_quotes(text).trim().to_string();
            if name.is_empty() {
                Vec::new()
            } else {
                vec![name]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::new(["S", "rew", "L1", "L2"], ["R0", "R1"]).unwrap())
    }

    fn run_until_end(phase: &mut Phase, rng: &mut Prng) -> usize {
        let mut steps = 0;
        while phase.next_stimulus(Some(0), rng).unwrap().is_some() {
            steps += 1;
            assert!(steps < 10_000, "phase never ended");
        }
        steps
    }

    #[test]
    fn end_condition_counts_before_tallying() {
        let vocab = vocab();
        let mut phase = PhaseDef::new("p", "'rew'=3")
            .with_row("A 'S' | B")
            .with_row("B 'rew' | A")
            .compile(&vocab)
            .unwrap();
        let mut rng = Prng::new(1);
        assert_eq!(run_until_end(&mut phase, &mut rng), 6);

        phase.subject_reset();
        assert_eq!(run_until_end(&mut phase, &mut rng), 6);
    }

    #[test]
    fn edge_sampling_matches_configured_split() {
        let vocab = vocab();
        let mut phase = PhaseDef::new("p", "S=100000")
            .with_row("START 'S' | A(0.3),B(0.7)")
            .with_row("A 'L1' | START")
            .with_row("B 'L2' | START")
            .compile(&vocab)
            .unwrap();
        let mut rng = Prng::new(42);
        let (mut a, mut b) = (0u32, 0u32);
        phase.next_stimulus(None, &mut rng).unwrap();
        for _ in 0..10_000 {
            match phase.next_stimulus(Some(0), &mut rng).unwrap() {
                Some((1, _)) => a += 1,
                Some((2, _)) => b += 1,
                other => panic!("unexpected emission {other:?}"),
            }
            phase.next_stimulus(Some(0), &mut rng).unwrap();
        }
        let frac_a = a as f64 / 10_000.0;
        assert!((frac_a - 0.3).abs() < 0.02, "A fraction {frac_a}");
        assert_eq!(a + b, 10_000);
    }

    #[test]
    fn guards_select_by_response_and_repeat_count() {
        let vocab = vocab();
        let mut phase = PhaseDef::new("p", "rew=1")
            .with_row("A 'S' | R1=2: B | A")
            .with_row("B 'rew' | A")
            .compile(&vocab)
            .unwrap();
        let mut rng = Prng::new(7);
        assert_eq!(phase.next_stimulus(None, &mut rng).unwrap().unwrap().0, 0);
        // first R1 on A: response count is 1
        assert_eq!(phase.next_stimulus(Some(1), &mut rng).unwrap().unwrap().0, 0);
        // second consecutive R1 on A: guard matches
        assert_eq!(phase.next_stimulus(Some(1), &mut rng).unwrap().unwrap().0, 1);
    }

    #[test]
    fn count_only_guard_uses_line_repeats() {
        let vocab = vocab();
        let mut phase = PhaseDef::new("p", "rew=1")
            .with_row("A 'S' | 3: B | A")
            .with_row("B 'rew' | A")
            .compile(&vocab)
            .unwrap();
        let mut rng = Prng::new(7);
        phase.next_stimulus(None, &mut rng).unwrap();
        let responses = [Some(0), Some(1), Some(0)];
        let lines: Vec<usize> = responses
            .iter()
            .map(|&r| phase.next_stimulus(r, &mut rng).unwrap().unwrap().0)
            .collect();
        assert_eq!(lines, vec![0, 0, 1]);
    }

    #[test]
    fn unmatched_guard_is_a_runtime_error() {
        let vocab = vocab();
        let mut phase = PhaseDef::new("p", "rew=1")
            .with_row("A 'S' | R1: B")
            .with_row("B 'rew' | A")
            .compile(&vocab)
            .unwrap();
        let mut rng = Prng::new(3);
        phase.next_stimulus(None, &mut rng).unwrap();
        let err = phase.next_stimulus(Some(0), &mut rng).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Runtime);
    }

    #[test]
    fn world_moves_through_phases_then_finishes() {
        let vocab = vocab();
        let first = PhaseDef::new("one", "S=2").with_row("A S | A").compile(&vocab).unwrap();
        let second = PhaseDef::new("two", "rew=1").with_row("B rew | B").compile(&vocab).unwrap();
        let mut world = World::new(vec![first, second]).unwrap();
        let mut rng = Prng::new(1);
        let mut phases = Vec::new();
        let mut response = None;
        while let Some(e) = world.next_stimulus(response, &mut rng).unwrap() {
            phases.push(e.phase);
            response = Some(0);
        }
        assert_eq!(phases, vec![0, 0, 1]);

        world.subject_reset();
        assert_eq!(world.current_phase(), 0);
        assert_eq!(world.next_stimulus(None, &mut rng).unwrap().unwrap().phase, 0);
    }

    #[test]
    fn tuple_stimulus_and_fraction_probabilities() {
        let vocab = vocab();
        let phase = PhaseDef::new("p", "L1=5")
            .with_row("A ('S', 'L1') | B(1/4), A(3/4)")
            .with_row("B L1 | A")
            .compile(&vocab)
            .unwrap();
        assert_eq!(phase.lines()[0].stimulus.elements(), &[0, 2]);
        assert_eq!(phase.lines()[0].conditions[0].edges, vec![(0.25, 1), (0.75, 0)]);
    }

    #[test]
    fn rejects_malformed_phases() {
        let vocab = vocab();
        let bad: [(&str, &[&str]); 11] = [
            ("S=1", &["A 'X' | A"]),
            ("S=1", &["S 'S' | S"]),
            ("S=1", &["A 'S' | A", "A 'S' | A"]),
            ("S=1", &["A 'S' | C"]),
            ("S=1", &["A 'S' | A(0.6),B(0.6)", "B 'S' | A"]),
            ("S=1", &["A 'S' | A(0.5)"]),
            ("S=1", &["A 'S' | A(0.5),A(0.5)"]),
            ("S=1", &["A 'S' | R9: A | A"]),
            ("S=1", &["A 'S'"]),
            ("nope=1", &["A 'S' | A"]),
            ("S=0", &["A 'S' | A"]),
        ];
        for (end, rows) in bad {
            let mut def = PhaseDef::new("p", end);
            for row in rows {
                def = def.with_row(*row);
            }
            assert!(def.compile(&vocab).is_err(), "{end} {rows:?}");
        }
    }

    #[test]
    fn probability_errors_are_validation_errors() {
        let vocab = vocab();
        for row in ["A 'S' | A(0.6),B(0.6)", "A 'S' | A(0.5)", "A 'S' | A(2/3),B(2/3)"] {
            let err = PhaseDef::new("p", "S=1")
                .with_row(row)
                .with_row("B 'S' | A")
                .compile(&vocab)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{row}: {err}");
        }
    }

    #[test]
    fn rounded_full_mass_closes_at_one() {
        let vocab = vocab();
        assert!(0.7 + 0.2 + 0.1 < 1.0);
        let phase = PhaseDef::new("p", "S=1")
            .with_row("A 'S' | A(0.7),B(0.2),C(0.1)")
            .with_row("B 'L1' | A(1/3),C(1/3),B(1/3)")
            .with_row("C 'L2' | A")
            .compile(&vocab)
            .unwrap();
        for line in &phase.lines[..2] {
            let condition = &line.conditions[0];
            assert_eq!(condition.assigned_mass(), 1.0, "{}", line.label);
        }
        // the largest draw below 1.0 still lands on the last edge
        let mut rng = Prng::new(1);
        let top = 1.0 - f64::EPSILON / 2.0;
        let cumulative = &phase.lines[0].conditions[0].cumulative;
        assert_eq!(cumulative.iter().position(|&c| top < c), Some(2));
        assert!(rng.choose_cumulative(cumulative).is_some());
    }
}
