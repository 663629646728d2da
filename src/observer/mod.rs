use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::literal::{Dict, Literal};
use crate::output::{RunOutput, SimulationOutput, SubjectOutput};
use crate::script::PlotCommand;
use crate::vocabulary::{BehaviorId, ElementId, Stimulus, Vocabulary};

/// What a query measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Quantity {
    V,
    W,
    P,
    N,
}

impl Quantity {
    pub fn name(self) -> &'static str {
        match self {
            Quantity::V => "v",
            Quantity::W => "w",
            Quantity::P => "p",
            Quantity::N => "n",
        }
    }
}

/// A history pattern: one name, a tuple of element names, or a list of those
/// that must occur consecutively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Name(String),
    Tuple(Vec<String>),
    Sequence(Vec<Pattern>),
}

impl Pattern {
    pub fn from_literal(lit: &Literal) -> Result<Self> {
        match lit {
            Literal::Str(s) => Ok(Pattern::Name(s.clone())),
            Literal::Tuple(_) => tuple_names(lit).map(Pattern::Tuple),
            Literal::List(items) => {
                let items = items
                    .iter()
                    .map(|i| match i {
                        Literal::List(_) => Err(Error::syntax(format!(
                            "nested list in sequence pattern {lit}"
                        ))),
                        other => Pattern::from_literal(other),
                    })
                    .collect::<Result<Vec<_>>>()?;
                if items.is_empty() {
                    return Err(Error::syntax("empty sequence pattern"));
                }
                Ok(Pattern::Sequence(items))
            }
            other => Err(Error::syntax(format!(
                "a pattern must be a string, tuple or list, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Name(n) => write!(f, "{n}"),
            Pattern::Tuple(names) => write!(f, "({})", names.join(",")),
            Pattern::Sequence(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

/// The expression argument of a plot or export directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    V { element: String, behavior: String },
    W { element: String },
    P { stimulus: Vec<String>, behavior: String },
    N { pattern: Pattern, reference: Option<Pattern> },
}

impl Expression {
    pub fn quantity(&self) -> Quantity {
        match self {
            Expression::V { .. } => Quantity::V,
            Expression::W { .. } => Quantity::W,
            Expression::P { .. } => Quantity::P,
            Expression::N { .. } => Quantity::N,
        }
    }

    /// `(element, behavior)` for v, an element for w, `(stimulus, behavior)`
    /// for p. For n use [`Expression::count`].
    pub fn from_literal(quantity: Quantity, lit: &Literal) -> Result<Self> {
        let shape_error = |expected: &str| {
            Error::syntax(format!(
                "first argument to @{}plot must be {expected}, got {lit}",
                quantity.name()
            ))
        };
        match quantity {
            Quantity::V => match lit.as_names().as_deref() {
                Some([e, b]) if lit.is_tuple() => Ok(Expression::V {
                    element: e.to_string(),
                    behavior: b.to_string(),
                }),
                _ => Err(shape_error("an (element, behavior) tuple")),
            },
            Quantity::W => match lit.as_names().as_deref() {
                Some([e]) => Ok(Expression::W {
                    element: e.to_string(),
                }),
                _ => Err(shape_error("a stimulus element")),
            },
            Quantity::P => match lit {
                Literal::Tuple(items) if items.len() == 2 => {
                    let stimulus = match &items[0] {
                        Literal::Str(s) => vec![s.clone()],
                        t @ Literal::Tuple(_) => tuple_names(t)?,
                        _ => return Err(shape_error("a (stimulus, behavior) tuple")),
                    };
                    let behavior = items[1]
                        .as_str()
                        .ok_or_else(|| shape_error("a (stimulus, behavior) tuple"))?;
                    Ok(Expression::P {
                        stimulus,
                        behavior: behavior.to_string(),
                    })
                }
                _ => Err(shape_error("a (stimulus, behavior) tuple")),
            },
            Quantity::N => Expression::count(lit, None),
        }
    }

    pub fn count(pattern: &Literal, reference: Option<&Literal>) -> Result<Self> {
        Ok(Expression::N {
            pattern: Pattern::from_literal(pattern)?,
            reference: reference.map(Pattern::from_literal).transpose()?,
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::V { element, behavior } => write!(f, "v({element}->{behavior})"),
            Expression::W { element } => write!(f, "w({element})"),
            Expression::P { stimulus, behavior } => {
                if stimulus.len() == 1 {
                    write!(f, "p({}->{behavior})", stimulus[0])
                } else {
                    write!(f, "p(({})->{behavior})", stimulus.join(","))
                }
            }
            Expression::N {
                pattern,
                reference: None,
            } => write!(f, "n({pattern})"),
            Expression::N {
                pattern,
                reference: Some(r),
            } => write!(f, "n({pattern})/n({r})"),
        }
    }
}

fn tuple_names(lit: &Literal) -> Result<Vec<String>> {
    match lit.as_names() {
        Some(names) if !names.is_empty() => Ok(names.into_iter().map(str::to_string).collect()),
        _ => Err(Error::syntax(format!(
            "expected a tuple of names, got {lit}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SubjectSelection {
    Average,
    All,
    Index(usize),
}

/// Evaluation properties of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    /// Run to read; the first run when unset.
    pub runlabel: Option<String>,
    pub subject: SubjectSelection,
    /// Restrict to steps of these phases; all steps when empty.
    pub phases: Vec<String>,
    /// Sample only at steps whose history matches this pattern.
    pub steps: Option<Pattern>,
    pub cumulative: bool,
    pub exact_steps: bool,
    pub exact_n: bool,
    /// Target of an export directive.
    pub filename: Option<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            runlabel: None,
            subject: SubjectSelection::Average,
            phases: Vec::new(),
            steps: None,
            cumulative: true,
            exact_steps: false,
            exact_n: false,
            filename: None,
        }
    }
}

impl EvalOptions {
    pub fn with_runlabel(mut self, label: impl Into<String>) -> Self {
        self.runlabel = Some(label.into());
        self
    }

    pub fn with_subject(mut self, subject: SubjectSelection) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phases.push(phase.into());
        self
    }

    pub fn with_steps(mut self, pattern: Pattern) -> Self {
        self.steps = Some(pattern);
        self
    }

    pub fn with_cumulative(mut self, on: bool) -> Self {
        self.cumulative = on;
        self
    }

    /// Read properties from a directive's evaluation dict.
    pub fn from_dict(dict: &Dict) -> Result<Self> {
        let mut opts = Self::default();
        for (key, value) in dict.iter() {
            let Some(key) = key.as_str() else {
                return Err(Error::syntax(format!(
                    "evaluation property keys must be strings, got {key}"
                )));
            };
            match key {
                "runlabel" => opts.runlabel = Some(string_prop(key, value)?),
                "subject" => {
                    opts.subject = match value {
                        Literal::Str(s) if s == "average" => SubjectSelection::Average,
                        Literal::Str(s) if s == "all" => SubjectSelection::All,
                        Literal::Int(i) if *i >= 0 => SubjectSelection::Index(*i as usize),
                        other => {
                            return Err(Error::syntax(format!(
                                "'subject' must be 'average', 'all' or a subject index, got {other}"
                            )))
                        }
                    }
                }
                "phase" => {
                    opts.phases = value
                        .as_names()
                        .ok_or_else(|| {
                            Error::syntax(format!("'phase' must be phase label(s), got {value}"))
                        })?
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                }
                "steps" => opts.steps = Some(Pattern::from_literal(value)?),
                "cumulative" => opts.cumulative = on_off(key, value)?,
                "exact_steps" => opts.exact_steps = on_off(key, value)?,
                "exact_n" => opts.exact_n = on_off(key, value)?,
                "filename" => opts.filename = Some(string_prop(key, value)?),
                // Legacy property carried by @pplot; beta comes from the run.
                "beta" => {}
                other => {
                    return Err(Error::syntax(format!(
                        "unknown evaluation property '{other}'"
                    )))
                }
            }
        }
        Ok(opts)
    }
}

fn string_prop(key: &str, value: &Literal) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::syntax(format!("'{key}' must be a string, got {value}")))
}

fn on_off(key: &str, value: &Literal) -> Result<bool> {
    match value.as_str() {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(Error::syntax(format!("'{key}' must be 'on' or 'off', got {value}"))),
    }
}

/// Result of a query: one series, or one per subject.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Evaluation {
    Series(Vec<f64>),
    PerSubject(Vec<Vec<f64>>),
}

/// Per-run overview of a finished simulation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    pub label: String,
    pub phases: Vec<String>,
    pub has_w: bool,
    /// Number of stimuli each subject saw.
    pub steps: Vec<usize>,
}

/// Read-only query adapter over a [`SimulationOutput`].
///
/// Every query returns per-step series where index 0 is the state before the
/// first stimulus.
pub struct Observer<'a> {
    output: &'a SimulationOutput,
}

impl<'a> Observer<'a> {
    pub fn new(output: &'a SimulationOutput) -> Self {
        Self { output }
    }

    pub fn summary(&self) -> Vec<RunSummary> {
        self.output
            .labels()
            .filter_map(|label| {
                let run = self.output.get(label)?;
                Some(RunSummary {
                    label: label.to_string(),
                    phases: run.phase_labels.clone(),
                    has_w: run.has_w,
                    steps: run.subjects.iter().map(|s| s.history().len()).collect(),
                })
            })
            .collect()
    }

    pub fn evaluate_command(&self, command: &PlotCommand) -> Result<Evaluation> {
        self.evaluate(&command.expression, &command.eval)
    }

    pub fn v(&self, element: &str, behavior: &str, opts: &EvalOptions) -> Result<Evaluation> {
        self.evaluate(
            &Expression::V {
                element: element.to_string(),
                behavior: behavior.to_string(),
            },
            opts,
        )
    }

    pub fn w(&self, element: &str, opts: &EvalOptions) -> Result<Evaluation> {
        self.evaluate(
            &Expression::W {
                element: element.to_string(),
            },
            opts,
        )
    }

    pub fn p(&self, stimulus: &[&str], behavior: &str, opts: &EvalOptions) -> Result<Evaluation> {
        self.evaluate(
            &Expression::P {
                stimulus: stimulus.iter().map(|s| s.to_string()).collect(),
                behavior: behavior.to_string(),
            },
            opts,
        )
    }

    pub fn n(
        &self,
        pattern: Pattern,
        reference: Option<Pattern>,
        opts: &EvalOptions,
    ) -> Result<Evaluation> {
        self.evaluate(&Expression::N { pattern, reference }, opts)
    }

    pub fn evaluate(&self, expr: &Expression, opts: &EvalOptions) -> Result<Evaluation> {
        let run = self.run(opts)?;
        let query = Query::resolve(run, expr, opts)?;
        let series = |subject: &SubjectOutput| query.series(run, subject, opts);

        match opts.subject {
            SubjectSelection::Index(i) => {
                let subject = run.subjects.get(i).ok_or_else(|| {
                    Error::eval(format!(
                        "subject index {i} out of range; the run has {} subject(s)",
                        run.subjects.len()
                    ))
                })?;
                series(subject).map(Evaluation::Series)
            }
            SubjectSelection::All => run
                .subjects
                .iter()
                .map(series)
                .collect::<Result<Vec<_>>>()
                .map(Evaluation::PerSubject),
            SubjectSelection::Average => {
                let all = run.subjects.iter().map(series).collect::<Result<Vec<_>>>()?;
                Ok(Evaluation::Series(average(&all)))
            }
        }
    }

    fn run(&self, opts: &EvalOptions) -> Result<&'a RunOutput> {
        match &opts.runlabel {
            Some(label) => self
                .output
                .get(label)
                .ok_or_else(|| Error::eval(format!("unknown run label '{label}'"))),
            None => self
                .output
                .first()
                .map(|(_, run)| run)
                .ok_or_else(|| Error::eval("there is no simulation output")),
        }
    }
}

/// One item of a resolved pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Elements(Vec<ElementId>),
    Behavior(BehaviorId),
}

impl Item {
    fn matches(&self, token: Token<'_>, exact: bool) -> bool {
        match (self, token) {
            (Item::Elements(es), Token::Stimulus(s)) => {
                let covered = es.iter().all(|e| s.contains(*e));
                if exact {
                    covered && s.elements().iter().all(|e| es.contains(e))
                } else {
                    covered
                }
            }
            (Item::Behavior(b), Token::Response(r)) => *b == r,
            _ => false,
        }
    }
}

#[derive(Clone, Copy)]
enum Token<'s> {
    Stimulus(&'s Stimulus),
    Response(BehaviorId),
}

fn tokens(subject: &SubjectOutput) -> Vec<Token<'_>> {
    subject
        .history()
        .iter()
        .flat_map(|h| [Token::Stimulus(&h.stimulus), Token::Response(h.response)])
        .collect()
}

fn resolve_pattern(vocab: &Vocabulary, pattern: &Pattern) -> Result<Vec<Item>> {
    let name_item = |name: &str| {
        if let Some(e) = vocab.element_id(name) {
            Ok(Item::Elements(vec![e]))
        } else if let Some(b) = vocab.behavior_id(name) {
            Ok(Item::Behavior(b))
        } else {
            Err(Error::eval(format!(
                "'{name}' is neither a stimulus element nor a behavior"
            )))
        }
    };
    let tuple_item = |names: &[String]| {
        names
            .iter()
            .map(|n| {
                vocab
                    .element_id(n)
                    .ok_or_else(|| Error::eval(format!("unknown stimulus element '{n}'")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Item::Elements)
    };
    match pattern {
        Pattern::Name(n) => Ok(vec![name_item(n)?]),
        Pattern::Tuple(names) => Ok(vec![tuple_item(names)?]),
        Pattern::Sequence(items) => items
            .iter()
            .map(|p| match p {
                Pattern::Name(n) => name_item(n),
                Pattern::Tuple(names) => tuple_item(names),
                Pattern::Sequence(_) => Err(Error::eval("nested sequence pattern")),
            })
            .collect(),
    }
}

/// Per-step match counts of `items` in the subject's history. A match is
/// credited to the step where it starts.
fn step_counts(subject: &SubjectOutput, items: &[Item], exact: bool) -> Vec<f64> {
    let tokens = tokens(subject);
    let mut counts = vec![0.0; subject.step_count()];
    if items.len() > tokens.len() {
        return counts;
    }
    for start in 0..=tokens.len() - items.len() {
        let hit = items
            .iter()
            .zip(&tokens[start..])
            .all(|(item, &token)| item.matches(token, exact));
        if hit {
            counts[start / 2 + 1] += 1.0;
        }
    }
    counts
}

/// A query with every name resolved against the run's vocabulary.
enum Query {
    V(usize),
    W(ElementId),
    P(Vec<ElementId>, BehaviorId),
    N(Vec<Item>, Option<Vec<Item>>),
}

impl Query {
    fn resolve(run: &RunOutput, expr: &Expression, opts: &EvalOptions) -> Result<Self> {
        let vocab = &run.vocabulary;
        let element = |n: &str| {
            vocab
                .element_id(n)
                .ok_or_else(|| Error::eval(format!("unknown stimulus element '{n}'")))
        };
        let behavior = |n: &str| {
            vocab
                .behavior_id(n)
                .ok_or_else(|| Error::eval(format!("unknown behavior '{n}'")))
        };
        for phase in &opts.phases {
            if run.phase_index(phase).is_none() {
                return Err(Error::eval(format!("phase '{phase}' is not part of the run")));
            }
        }
        Ok(match expr {
            Expression::V {
                element: e,
                behavior: b,
            } => Query::V(vocab.pair(element(e)?, behavior(b)?)),
            Expression::W { element: e } => {
                if !run.has_w {
                    return Err(Error::eval(
                        "w is only available for mechanisms with a salience table",
                    ));
                }
                Query::W(element(e)?)
            }
            Expression::P {
                stimulus,
                behavior: b,
            } => Query::P(
                stimulus.iter().map(|e| element(e)).collect::<Result<_>>()?,
                behavior(b)?,
            ),
            Expression::N { pattern, reference } => Query::N(
                resolve_pattern(vocab, pattern)?,
                reference
                    .as_ref()
                    .map(|r| resolve_pattern(vocab, r))
                    .transpose()?,
            ),
        })
    }

    fn series(&self, run: &RunOutput, subject: &SubjectOutput, opts: &EvalOptions) -> Result<Vec<f64>> {
        let selected = selected_steps(run, subject, opts)?;
        let sample = |full: Vec<f64>| selected.iter().map(|&k| full[k]).collect::<Vec<_>>();

        match self {
            Query::V(pair) => Ok(sample(subject.v_series(*pair))),
            Query::W(e) => Ok(sample(subject.w_series(*e))),
            Query::P(stimulus, behavior) => {
                let b_count = run.vocabulary.behavior_count();
                let table: Vec<Vec<f64>> = stimulus
                    .iter()
                    .flat_map(|&e| (0..b_count).map(move |b| (e, b)))
                    .map(|(e, b)| subject.v_series(run.vocabulary.pair(e, b)))
                    .collect();
                let column = |e: ElementId| stimulus.iter().position(|&x| x == e).unwrap_or(0);
                Ok(selected
                    .iter()
                    .map(|&k| {
                        run.response.probability(stimulus, *behavior, |e, b| {
                            table[column(e) * b_count + b][k]
                        })
                    })
                    .collect())
            }
            Query::N(pattern, reference) => {
                let counted = |items: &[Item]| {
                    let per_step = step_counts(subject, items, opts.exact_n);
                    accumulate(&per_step, &selected, opts)
                };
                let numerator = counted(pattern);
                Ok(match reference {
                    None => numerator,
                    Some(r) => divide(&numerator, &counted(r)),
                })
            }
        }
    }
}

/// Steps to report: filtered by phase, then sampled at `steps` matches.
fn selected_steps(run: &RunOutput, subject: &SubjectOutput, opts: &EvalOptions) -> Result<Vec<usize>> {
    let phases: Vec<usize> = opts
        .phases
        .iter()
        .filter_map(|p| run.phase_index(p))
        .collect();
    let mut steps: Vec<usize> = (0..subject.step_count())
        .filter(|&k| {
            phases.is_empty()
                || subject
                    .phase_of_step(k)
                    .is_some_and(|p| phases.contains(&p))
        })
        .collect();

    if let Some(pattern) = &opts.steps {
        let items = resolve_pattern(&run.vocabulary, pattern)?;
        let hits = step_counts(subject, &items, opts.exact_steps);
        steps.retain(|&k| hits[k] > 0.0);
    }
    Ok(steps)
}

/// Counts over the selected steps. Cumulative sums restart at the first
/// selected step; otherwise each value covers the steps since the previous
/// selected one.
fn accumulate(per_step: &[f64], selected: &[usize], opts: &EvalOptions) -> Vec<f64> {
    let sampled = opts.steps.is_some();
    let mut out = Vec::with_capacity(selected.len());
    let mut total = 0.0;
    let mut prev: Option<usize> = None;
    for &k in selected {
        let span = if sampled {
            let from = prev.map_or(0, |p| p + 1);
            per_step[from..=k].iter().sum::<f64>()
        } else {
            per_step[k]
        };
        total += span;
        out.push(if opts.cumulative { total } else { span });
        prev = Some(k);
    }
    out
}

/// Element-wise ratio; a zero denominator leaves the numerator unchanged.
fn divide(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter()
        .zip(den)
        .map(|(&n, &d)| if d != 0.0 { n / d } else { n })
        .collect()
}

/// Mean per index over series of possibly different lengths.
fn average(series: &[Vec<f64>]) -> Vec<f64> {
    let len = series.iter().map(Vec::len).max().unwrap_or(0);
    (0..len)
        .map(|i| {
            let (sum, n) = series
                .iter()
                .filter_map(|s| s.get(i))
                .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
            sum / n as f64
        })
        .collect()
}
