//! Learning mechanisms.
//!
//! A [`Mechanism`] holds the association table `v` (element × behavior), the
//! salience table `w` (element), and the fixed configuration that drives its
//! learning rule. The five rules form a closed set, see [`MechanismKind`].

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::literal::Literal;
use crate::parameters::{self, Parameters, DEFAULT_KEY};
use crate::prng::Prng;
use crate::vocabulary::{BehaviorId, ElementId, Stimulus, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    RescorlaWagner,
    QLearning,
    ExpectedSarsa,
    ActorCritic,
    Enquist,
}

impl MechanismKind {
    pub const ALL: [MechanismKind; 5] = [
        MechanismKind::RescorlaWagner,
        MechanismKind::QLearning,
        MechanismKind::ExpectedSarsa,
        MechanismKind::ActorCritic,
        MechanismKind::Enquist,
    ];

    /// Case-insensitive lookup by script name.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "rescorla_wagner" => Ok(Self::RescorlaWagner),
            "q_learning" | "qlearning" => Ok(Self::QLearning),
            "expected_sarsa" | "sarsa" => Ok(Self::ExpectedSarsa),
            "actor_critic" => Ok(Self::ActorCritic),
            "enquist" | "ga" => Ok(Self::Enquist),
            _ => Err(Error::UnknownMechanism(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RescorlaWagner => "rescorla_wagner",
            Self::QLearning => "q_learning",
            Self::ExpectedSarsa => "expected_sarsa",
            Self::ActorCritic => "actor_critic",
            Self::Enquist => "enquist",
        }
    }

    /// Whether the rule maintains the salience table `w`.
    pub fn has_w(self) -> bool {
        matches!(self, Self::ActorCritic | Self::Enquist)
    }
}

/// Beta plus feasibility: everything needed to turn `v` into response
/// probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseModel {
    pub beta: f64,
    /// Feasible behaviors per element, in declaration order.
    pub feasible: Vec<Vec<BehaviorId>>,
}

impl ResponseModel {
    /// Behaviors feasible for any element of `stimulus`, in order of first
    /// occurrence.
    pub fn feasible_behaviors(&self, stimulus: &[ElementId]) -> Vec<BehaviorId> {
        let mut out: Vec<BehaviorId> = Vec::new();
        for &e in stimulus {
            for &b in &self.feasible[e] {
                if !out.contains(&b) {
                    out.push(b);
                }
            }
        }
        out
    }

    /// Unnormalised response scores `exp(beta * sum_e v[e,b])` for the feasible
    /// behaviors, shifted by the maximum exponent so the sum stays finite.
    pub fn scores<F>(&self, stimulus: &[ElementId], v: F) -> Vec<(BehaviorId, f64)>
    where
        F: Fn(ElementId, BehaviorId) -> f64,
    {
        let feasible = self.feasible_behaviors(stimulus);
        let exponents: Vec<f64> = feasible
            .iter()
            .map(|&b| self.beta * stimulus.iter().map(|&e| v(e, b)).sum::<f64>())
            .collect();
        let max = exponents
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let shift = if max.is_finite() { max } else { 0.0 };
        feasible
            .into_iter()
            .zip(exponents)
            .map(|(b, x)| (b, (x - shift).exp()))
            .collect()
    }

    /// Probability of `behavior` given `stimulus`; zero when infeasible.
    pub fn probability<F>(&self, stimulus: &[ElementId], behavior: BehaviorId, v: F) -> f64
    where
        F: Fn(ElementId, BehaviorId) -> f64,
    {
        let scores = self.scores(stimulus, v);
        let total: f64 = scores.iter().map(|(_, s)| s).sum();
        scores
            .iter()
            .find(|(b, _)| *b == behavior)
            .map(|(_, s)| s / total)
            .unwrap_or(0.0)
    }
}

/// Fully expanded mechanism configuration: every table is dense.
#[derive(Debug, Clone, PartialEq)]
pub struct MechanismConfig {
    pub vocabulary: Arc<Vocabulary>,
    /// Start value of `v`, per (element, behavior) pair.
    pub start_v: Vec<f64>,
    /// Utility per element.
    pub u: Vec<f64>,
    /// Cost per behavior.
    pub c: Vec<f64>,
    /// Learning rate of `v`, per pair.
    pub alpha_v: Vec<f64>,
    /// Learning rate of `w`, per element.
    pub alpha_w: Vec<f64>,
    /// Elements whose presence suppresses learning.
    pub omit_learning: Vec<bool>,
    pub response: ResponseModel,
}

impl MechanismConfig {
    /// Defaults: `start_v = 0`, `u = 0`, `c = 0`, `alpha = 1`, `beta = 1`, every
    /// behavior feasible for every element.
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        let n_e = vocabulary.element_count();
        let n_b = vocabulary.behavior_count();
        let pairs = vocabulary.pair_count();
        Self {
            start_v: vec![0.0; pairs],
            u: vec![0.0; n_e],
            c: vec![0.0; n_b],
            alpha_v: vec![1.0; pairs],
            alpha_w: vec![1.0; n_e],
            omit_learning: vec![false; n_e],
            response: ResponseModel {
                beta: 1.0,
                feasible: vec![(0..n_b).collect(); n_e],
            },
            vocabulary,
        }
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.response.beta = beta;
        self
    }

    pub fn with_alpha_v(mut self, alpha: f64) -> Self {
        self.alpha_v.fill(alpha);
        self
    }

    pub fn with_alpha_w(mut self, alpha: f64) -> Self {
        self.alpha_w.fill(alpha);
        self
    }

    pub fn with_start_v(mut self, value: f64) -> Self {
        self.start_v.fill(value);
        self
    }

    pub fn with_u(mut self, element: ElementId, value: f64) -> Self {
        self.u[element] = value;
        self
    }

    pub fn with_cost(mut self, behavior: BehaviorId, value: f64) -> Self {
        self.c[behavior] = value;
        self
    }

    /// Build and validate from a script parameter map.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let vocab = Arc::new(params.vocabulary()?);
        let mut cfg = Self::new(Arc::clone(&vocab));

        cfg.start_v = table(
            params.get(parameters::START_V),
            parameters::START_V,
            &cfg.start_v,
            Coverage::DefaultOrExhaustive,
            |k| pair_slot(&vocab, k, parameters::START_V),
        )?;
        cfg.u = table(
            params.get(parameters::U),
            parameters::U,
            &cfg.u,
            Coverage::DefaultOrExhaustive,
            |k| element_slot(&vocab, k, parameters::U),
        )?;
        cfg.c = table(
            params.cost(),
            parameters::BEHAVIOR_COST,
            &cfg.c,
            Coverage::DefaultOrExhaustive,
            |k| behavior_slot(&vocab, k, parameters::BEHAVIOR_COST),
        )?;
        cfg.alpha_v = table(
            params.get(parameters::ALPHA_V),
            parameters::ALPHA_V,
            &cfg.alpha_v,
            Coverage::DefaultRequired,
            |k| pair_slot(&vocab, k, parameters::ALPHA_V),
        )?;
        cfg.alpha_w = table(
            params.get(parameters::ALPHA_W),
            parameters::ALPHA_W,
            &cfg.alpha_w,
            Coverage::DefaultRequired,
            |k| element_slot(&vocab, k, parameters::ALPHA_W),
        )?;
        if let Some(lit) = params.get(parameters::START_W) {
            if lit.as_f64().is_none() && lit.as_dict().is_none() {
                return Err(Error::invalid(format!(
                    "'{}' must be a number or a dict, got {lit}",
                    parameters::START_W
                )));
            }
        }

        cfg.response.beta = params.beta()?;

        if let Some(lit) = params.get(parameters::OMIT_LEARNING) {
            let names = lit.as_names().ok_or_else(|| {
                Error::invalid(format!(
                    "'{}' must be a list of stimulus elements, got {lit}",
                    parameters::OMIT_LEARNING
                ))
            })?;
            for name in names {
                let e = vocab.require_element(name, parameters::OMIT_LEARNING)?;
                cfg.omit_learning[e] = true;
            }
        }

        if let Some(lit) = params.get(parameters::RESPONSE_REQUIREMENTS) {
            cfg.response.feasible = response_requirements(&vocab, lit)?;
        }

        Ok(cfg)
    }
}

#[derive(Clone, Copy)]
enum Coverage {
    DefaultOrExhaustive,
    DefaultRequired,
}

/// Expand a scalar-or-map parameter into a dense table.
fn table<F>(
    lit: Option<&Literal>,
    name: &str,
    fallback: &[f64],
    coverage: Coverage,
    slot: F,
) -> Result<Vec<f64>>
where
    F: Fn(&Literal) -> Result<usize>,
{
    let Some(lit) = lit else {
        return Ok(fallback.to_vec());
    };
    if let Some(x) = lit.as_f64() {
        return Ok(vec![x; fallback.len()]);
    }
    let Some(dict) = lit.as_dict() else {
        return Err(Error::invalid(format!(
            "'{name}' must be a number or a dict, got {lit}"
        )));
    };

    let number = |v: &Literal| {
        v.as_f64()
            .ok_or_else(|| Error::invalid(format!("values in '{name}' must be numbers, got {v}")))
    };

    let default = dict.get(DEFAULT_KEY).map(number).transpose()?;
    let mut out = vec![default.unwrap_or(0.0); fallback.len()];
    let mut assigned = vec![false; fallback.len()];
    for (key, value) in dict.iter() {
        if key.as_str() == Some(DEFAULT_KEY) {
            continue;
        }
        let i = slot(key)?;
        out[i] = number(value)?;
        assigned[i] = true;
    }

    if default.is_none() {
        match coverage {
            Coverage::DefaultRequired => {
                return Err(Error::invalid(format!(
                    "the parameter '{name}' must have the key '{DEFAULT_KEY}' when given as a dict"
                )));
            }
            Coverage::DefaultOrExhaustive if assigned.iter().any(|a| !a) => {
                return Err(Error::invalid(format!(
                    "the parameter '{name}' must have the key '{DEFAULT_KEY}' or be exhaustive"
                )));
            }
            Coverage::DefaultOrExhaustive => {}
        }
    }
    Ok(out)
}

fn element_slot(vocab: &Vocabulary, key: &Literal, name: &str) -> Result<usize> {
    match key.as_str() {
        Some(e) => vocab.require_element(e, &format!("'{name}'")),
        None => Err(Error::invalid(format!(
            "keys in '{name}' must be stimulus elements or '{DEFAULT_KEY}', got {key}"
        ))),
    }
}

fn behavior_slot(vocab: &Vocabulary, key: &Literal, name: &str) -> Result<usize> {
    match key.as_str() {
        Some(b) => vocab.require_behavior(b, &format!("'{name}'")),
        None => Err(Error::invalid(format!(
            "keys in '{name}' must be behaviors or '{DEFAULT_KEY}', got {key}"
        ))),
    }
}

fn pair_slot(vocab: &Vocabulary, key: &Literal, name: &str) -> Result<usize> {
    let pair = match key {
        Literal::Tuple(items) if items.len() == 2 => items[0].as_str().zip(items[1].as_str()),
        _ => None,
    };
    let Some((e, b)) = pair else {
        return Err(Error::invalid(format!(
            "keys in '{name}' must be (element, behavior) tuples or '{DEFAULT_KEY}', got {key}"
        )));
    };
    let context = format!("'{name}'");
    let e = vocab.require_element(e, &context)?;
    let b = vocab.require_behavior(b, &context)?;
    Ok(vocab.pair(e, b))
}

/// Invert `behavior -> feasible elements` into `element -> feasible behaviors`.
///
/// Behaviors not listed are feasible for every element.
fn response_requirements(vocab: &Vocabulary, lit: &Literal) -> Result<Vec<Vec<BehaviorId>>> {
    let name = parameters::RESPONSE_REQUIREMENTS;
    let dict = lit
        .as_dict()
        .ok_or_else(|| Error::invalid(format!("'{name}' must be a dict, got {lit}")))?;

    let mut allowed: Vec<Option<Vec<ElementId>>> = vec![None; vocab.behavior_count()];
    let context = format!("'{name}'");
    for (key, value) in dict.iter() {
        let b = behavior_slot(vocab, key, name)?;
        let elements = value.as_names().ok_or_else(|| {
            Error::invalid(format!(
                "values in '{name}' must be a stimulus element or a list of them, got {value}"
            ))
        })?;
        let ids = elements
            .into_iter()
            .map(|e| vocab.require_element(e, &context))
            .collect::<Result<Vec<_>>>()?;
        allowed[b] = Some(ids);
    }

    let mut feasible = vec![Vec::new(); vocab.element_count()];
    for (b, elements) in allowed.iter().enumerate() {
        match elements {
            None => feasible.iter_mut().for_each(|f| f.push(b)),
            Some(ids) => {
                for &e in ids {
                    if !feasible[e].contains(&b) {
                        feasible[e].push(b);
                    }
                }
            }
        }
    }

    if let Some(e) = feasible.iter().position(Vec::is_empty) {
        return Err(Error::invalid(format!(
            "stimulus element '{}' has no feasible behavior in '{name}'",
            vocab.element_name(e)
        )));
    }
    Ok(feasible)
}

/// A learning subject's association state plus the rule that updates it.
#[derive(Debug, Clone)]
pub struct Mechanism {
    kind: MechanismKind,
    cfg: MechanismConfig,

    v: Vec<f64>,
    w: Vec<f64>,

    // What the subject saw and did on the previous step.
    prev_stimulus: Option<Stimulus>,
    response: Option<BehaviorId>,
}

impl Mechanism {
    pub fn new(kind: MechanismKind, cfg: MechanismConfig) -> Self {
        let mut m = Self {
            kind,
            v: Vec::new(),
            w: Vec::new(),
            cfg,
            prev_stimulus: None,
            response: None,
        };
        m.subject_reset();
        m
    }

    /// Factory: resolve the `mechanism` parameter and build the variant.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        if !params.contains(parameters::BEHAVIORS) {
            return Err(Error::MissingParameter(parameters::BEHAVIORS));
        }
        if !params.contains(parameters::STIMULUS_ELEMENTS) {
            return Err(Error::MissingParameter(parameters::STIMULUS_ELEMENTS));
        }
        let kind = MechanismKind::parse(&params.mechanism_name()?)?;
        let cfg = MechanismConfig::from_parameters(params)?;
        Ok(Self::new(kind, cfg))
    }

    pub fn kind(&self) -> MechanismKind {
        self.kind
    }

    pub fn config(&self) -> &MechanismConfig {
        &self.cfg
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.cfg.vocabulary
    }

    pub fn has_w(&self) -> bool {
        self.kind.has_w()
    }

    pub fn v(&self, element: ElementId, behavior: BehaviorId) -> f64 {
        self.v[self.cfg.vocabulary.pair(element, behavior)]
    }

    pub fn w(&self, element: ElementId) -> f64 {
        self.w[element]
    }

    pub fn previous(&self) -> Option<(&Stimulus, BehaviorId)> {
        self.prev_stimulus.as_ref().zip(self.response)
    }

    /// Restore start values and forget the previous step.
    pub fn subject_reset(&mut self) {
        self.v.clear();
        self.v.extend_from_slice(&self.cfg.start_v);
        self.w.clear();
        self.w.resize(self.cfg.vocabulary.element_count(), 0.0);
        self.prev_stimulus = None;
        self.response = None;
    }

    pub fn feasible_behaviors(&self, stimulus: &Stimulus) -> Vec<BehaviorId> {
        self.cfg.response.feasible_behaviors(stimulus.elements())
    }

    pub fn response_scores(&self, stimulus: &Stimulus) -> Vec<(BehaviorId, f64)> {
        self.cfg
            .response
            .scores(stimulus.elements(), |e, b| self.v(e, b))
    }

    pub fn response_probability(&self, stimulus: &Stimulus, behavior: BehaviorId) -> f64 {
        self.cfg
            .response
            .probability(stimulus.elements(), behavior, |e, b| self.v(e, b))
    }

    /// Learn from the transition into `stimulus`, then sample a response to it.
    pub fn learn_and_respond(&mut self, stimulus: &Stimulus, rng: &mut Prng) -> BehaviorId {
        let omit = stimulus
            .elements()
            .iter()
            .any(|&e| self.cfg.omit_learning[e]);
        if !omit {
            if let (Some(prev), Some(response)) = (self.prev_stimulus.clone(), self.response) {
                self.learn(&prev, response, stimulus);
            }
        }

        let response = self.respond(stimulus, rng);
        self.prev_stimulus = Some(stimulus.clone());
        self.response = Some(response);
        response
    }

    fn respond(&self, stimulus: &Stimulus, rng: &mut Prng) -> BehaviorId {
        let scores = self.response_scores(stimulus);
        let weights: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
        scores[rng.choose_weighted(&weights)].0
    }

    fn learn(&mut self, prev: &Stimulus, response: BehaviorId, stimulus: &Stimulus) {
        let usum: f64 = stimulus.elements().iter().map(|&e| self.cfg.u[e]).sum();
        let vsum_prev: f64 = prev.elements().iter().map(|&e| self.v(e, response)).sum();
        let wsum_prev: f64 = prev.elements().iter().map(|&e| self.w[e]).sum();
        let wsum: f64 = stimulus.elements().iter().map(|&e| self.w[e]).sum();
        let cost = self.cfg.c[response];

        let (v_error, w_error) = match self.kind {
            MechanismKind::RescorlaWagner => (usum - vsum_prev - cost, None),
            MechanismKind::QLearning => {
                let max_future = self.max_future_value(stimulus);
                (usum + max_future - vsum_prev - cost, None)
            }
            MechanismKind::ExpectedSarsa => {
                let expected = self.expected_future_value(stimulus);
                (usum + expected - vsum_prev - cost, None)
            }
            MechanismKind::ActorCritic => {
                // v follows the critic's error as well (wsum_prev, not vsum_prev).
                let delta = usum + wsum - cost - wsum_prev;
                (delta, Some(delta))
            }
            MechanismKind::Enquist => (
                usum + wsum - cost - vsum_prev,
                Some(usum + wsum - cost - wsum_prev),
            ),
        };

        for &e in prev.elements() {
            let i = self.cfg.vocabulary.pair(e, response);
            self.v[i] += self.cfg.alpha_v[i] * v_error;
        }
        if let Some(w_error) = w_error {
            for &e in prev.elements() {
                self.w[e] += self.cfg.alpha_w[e] * w_error;
            }
        }
    }

    /// Max over elements of the new stimulus of the summed `v` over that
    /// element's feasible behaviors.
    fn max_future_value(&self, stimulus: &Stimulus) -> f64 {
        stimulus
            .elements()
            .iter()
            .map(|&e| {
                self.cfg.response.feasible[e]
                    .iter()
                    .map(|&b| self.v(e, b))
                    .sum::<f64>()
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Sum over elements of the new stimulus of the policy-weighted `v`, each
    /// element evaluated on its own.
    fn expected_future_value(&self, stimulus: &Stimulus) -> f64 {
        stimulus
            .elements()
            .iter()
            .map(|&e| {
                let scores = self.cfg.response.scores(&[e], |e, b| self.v(e, b));
                let total: f64 = scores.iter().map(|(_, s)| s).sum();
                scores
                    .iter()
                    .map(|&(b, s)| s / total * self.v(e, b))
                    .sum::<f64>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::parse_dict;

    fn params(src: &str) -> Parameters {
        let mut p = Parameters::new();
        p.merge(&parse_dict(src).unwrap()).unwrap();
        p
    }

    fn single_pair(kind: MechanismKind, alpha: f64) -> Mechanism {
        let vocab = Arc::new(Vocabulary::new(["s"], ["R"]).unwrap());
        let cfg = MechanismConfig::new(vocab)
            .with_alpha_v(alpha)
            .with_alpha_w(alpha)
            .with_u(0, 1.0);
        Mechanism::new(kind, cfg)
    }

    #[test]
    fn rescorla_wagner_single_pair_converges_geometrically() {
        let mut m = single_pair(MechanismKind::RescorlaWagner, 0.5);
        let mut rng = Prng::new(1);
        let s = Stimulus::new(vec![0]);

        m.learn_and_respond(&s, &mut rng);
        assert_eq!(m.v(0, 0), 0.0, "first call must not learn");
        m.learn_and_respond(&s, &mut rng);
        assert_eq!(m.v(0, 0), 0.5);
        m.learn_and_respond(&s, &mut rng);
        assert_eq!(m.v(0, 0), 0.75);
    }

    #[test]
    fn reset_restores_configured_start_values() {
        let p = params(
            "{'mechanism': 'ga', 'behaviors': ['R0', 'R1'], 'stimulus_elements': ['a', 'b'],
              'start_v': {('a', 'R1'): 2, 'default': -1}, 'u': {'b': 3, 'default': 0}}",
        );
        let mut m = Mechanism::from_parameters(&p).unwrap();
        let mut rng = Prng::new(5);
        let a = Stimulus::new(vec![0]);
        let b = Stimulus::new(vec![1]);
        for _ in 0..20 {
            m.learn_and_respond(&a, &mut rng);
            m.learn_and_respond(&b, &mut rng);
        }
        for _ in 0..2 {
            m.subject_reset();
            assert_eq!(m.v(0, 0), -1.0);
            assert_eq!(m.v(0, 1), 2.0);
            assert_eq!(m.v(1, 0), -1.0);
            assert_eq!(m.v(1, 1), -1.0);
            assert_eq!(m.w(0), 0.0);
            assert_eq!(m.w(1), 0.0);
            assert!(m.previous().is_none());
        }
    }

    #[test]
    fn scores_stay_positive_for_extreme_weights() {
        let vocab = Arc::new(Vocabulary::new(["s"], ["R0", "R1"]).unwrap());
        for kind in MechanismKind::ALL {
            for start in [-1.0e6, 0.0, 1.0e6] {
                let m = Mechanism::new(
                    kind,
                    MechanismConfig::new(Arc::clone(&vocab))
                        .with_start_v(start)
                        .with_beta(3.0),
                );
                let scores = m.response_scores(&Stimulus::new(vec![0]));
                let total: f64 = scores.iter().map(|(_, s)| s).sum();
                assert!(total > 0.0 && total.is_finite(), "{kind:?} start={start}");
            }
        }
    }

    #[test]
    fn scalar_alpha_matches_default_only_map() {
        let base = "'mechanism': 'q_learning', 'behaviors': ['R0', 'R1'],
                    'stimulus_elements': ['a', 'rew'], 'u': {'rew': 1, 'default': 0}";
        let scalar = params(&format!("{{{base}, 'alpha_v': 0.3}}"));
        let mapped = params(&format!("{{{base}, 'alpha_v': {{'default': 0.3}}}}"));
        let mut m1 = Mechanism::from_parameters(&scalar).unwrap();
        let mut m2 = Mechanism::from_parameters(&mapped).unwrap();
        let mut r1 = Prng::new(9);
        let mut r2 = Prng::new(9);
        let seq = [vec![0], vec![1], vec![0, 1], vec![0]];
        for step in 0..200 {
            let s = Stimulus::new(seq[step % seq.len()].clone());
            assert_eq!(m1.learn_and_respond(&s, &mut r1), m2.learn_and_respond(&s, &mut r2));
        }
        for e in 0..2 {
            for b in 0..2 {
                assert_eq!(m1.v(e, b), m2.v(e, b));
            }
        }
    }

    #[test]
    fn actor_critic_uses_salience_error_for_both_tables() {
        let mut m = single_pair(MechanismKind::ActorCritic, 0.5);
        let mut rng = Prng::new(2);
        let s = Stimulus::new(vec![0]);
        m.learn_and_respond(&s, &mut rng);
        m.learn_and_respond(&s, &mut rng);
        // delta = u + w - c - w_prev = 1
        assert_eq!(m.v(0, 0), 0.5);
        assert_eq!(m.w(0), 0.5);
        m.learn_and_respond(&s, &mut rng);
        // delta = 1 + 0.5 - 0 - 0.5 = 1, independent of v
        assert_eq!(m.v(0, 0), 1.0);
        assert_eq!(m.w(0), 1.0);
    }

    #[test]
    fn enquist_updates_v_from_its_own_sum() {
        let mut m = single_pair(MechanismKind::Enquist, 0.5);
        let mut rng = Prng::new(2);
        let s = Stimulus::new(vec![0]);
        m.learn_and_respond(&s, &mut rng);
        m.learn_and_respond(&s, &mut rng);
        assert_eq!(m.v(0, 0), 0.5);
        assert_eq!(m.w(0), 0.5);
        m.learn_and_respond(&s, &mut rng);
        // v: 0.5 + 0.5 * (1 + 0.5 - 0.5) ; w: 0.5 + 0.5 * (1 + 0.5 - 0.5)
        assert_eq!(m.v(0, 0), 1.0);
        assert_eq!(m.w(0), 1.0);
    }

    #[test]
    fn q_learning_bootstraps_from_feasible_sum() {
        let vocab = Arc::new(Vocabulary::new(["s"], ["R"]).unwrap());
        let cfg = MechanismConfig::new(vocab)
            .with_alpha_v(0.5)
            .with_start_v(1.0);
        let mut m = Mechanism::new(MechanismKind::QLearning, cfg);
        let mut rng = Prng::new(4);
        let s = Stimulus::new(vec![0]);
        m.learn_and_respond(&s, &mut rng);
        m.learn_and_respond(&s, &mut rng);
        // u=0, max_future = v = 1, vsum_prev = 1 -> no change
        assert_eq!(m.v(0, 0), 1.0);
    }

    #[test]
    fn expected_sarsa_weights_by_policy() {
        let vocab = Arc::new(Vocabulary::new(["s"], ["R0", "R1"]).unwrap());
        let cfg = MechanismConfig::new(vocab).with_alpha_v(1.0).with_beta(0.0);
        let mut m = Mechanism::new(MechanismKind::ExpectedSarsa, cfg);
        m.v = vec![2.0, 4.0];
        let s = Stimulus::new(vec![0]);
        // beta = 0 -> uniform policy, E = 3
        assert!((m.expected_future_value(&s) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn omit_learning_suppresses_update() {
        let p = params(
            "{'mechanism': 'rescorla_wagner', 'behaviors': ['R'], 'stimulus_elements': ['s', 'iti'],
              'u': {'s': 1, 'default': 0}, 'alpha_v': 0.5, 'omit_learning': ['iti']}",
        );
        let mut m = Mechanism::from_parameters(&p).unwrap();
        let mut rng = Prng::new(3);
        m.learn_and_respond(&Stimulus::new(vec![0]), &mut rng);
        m.learn_and_respond(&Stimulus::new(vec![1]), &mut rng);
        assert_eq!(m.v(0, 0), 0.0);
        m.learn_and_respond(&Stimulus::new(vec![0]), &mut rng);
        // previous stimulus is 'iti', so the update lands on ('iti', R)
        assert_eq!(m.v(1, 0), 0.5);
    }

    #[test]
    fn response_requirements_restrict_and_order_feasible_behaviors() {
        let p = params(
            "{'mechanism': 'ga', 'behaviors': ['R0', 'R1', 'R2'], 'stimulus_elements': ['E0', 'E1', 'E2'],
              'response_requirements': {'R0': ['E0', 'E1'], 'R1': 'E1'}}",
        );
        let m = Mechanism::from_parameters(&p).unwrap();
        assert_eq!(m.feasible_behaviors(&Stimulus::new(vec![0])), vec![0, 2]);
        assert_eq!(m.feasible_behaviors(&Stimulus::new(vec![2])), vec![2]);
        assert_eq!(m.feasible_behaviors(&Stimulus::new(vec![2, 1])), vec![2, 0, 1]);
        assert_eq!(m.response_probability(&Stimulus::new(vec![2]), 0), 0.0);
    }

    #[test]
    fn rejects_bad_configuration() {
        let base = "'mechanism': 'ga', 'behaviors': ['R0', 'R1'], 'stimulus_elements': ['E0', 'E1']";
        let bad = [
            format!("{{{base}, 'u': {{'E0': 1}}}}"),
            format!("{{{base}, 'u': {{'E9': 1, 'default': 0}}}}"),
            format!("{{{base}, 'behavior_cost': {{'R0': 1}}}}"),
            format!("{{{base}, 'alpha_v': {{('E0', 'R0'): 0.1}}}}"),
            format!("{{{base}, 'alpha_w': {{'E0': 0.1, 'E1': 0.1}}}}"),
            format!("{{{base}, 'start_v': {{'E0': 1, 'default': 0}}}}"),
            format!("{{{base}, 'response_requirements': 'foo'}}"),
            format!("{{{base}, 'response_requirements': {{'R9': 'E0'}}}}"),
            format!("{{{base}, 'response_requirements': {{1234: 'E0'}}}}"),
            format!("{{{base}, 'response_requirements': {{'R0': 'E9'}}}}"),
            format!("{{{base}, 'response_requirements': {{'R0': 'E0', 'R1': 'E0'}}}}"),
            "{'mechanism': 'ga', 'stimulus_elements': ['E0']}".to_string(),
            "{'mechanism': 'nope', 'behaviors': ['R0'], 'stimulus_elements': ['E0']}".to_string(),
        ];
        for src in bad {
            assert!(Mechanism::from_parameters(&params(&src)).is_err(), "{src}");
        }

        let exhaustive = format!("{{{base}, 'u': {{'E0': 1, 'E1': 0}}, 'c': {{'R0': 1, 'R1': 0}}}}");
        assert!(Mechanism::from_parameters(&params(&exhaustive)).is_ok());
    }

    #[test]
    fn mechanism_names_are_case_insensitive() {
        assert_eq!(MechanismKind::parse("GA").unwrap(), MechanismKind::Enquist);
        assert_eq!(
            MechanismKind::parse("Rescorla_Wagner").unwrap(),
            MechanismKind::RescorlaWagner
        );
        assert!(MechanismKind::parse("backprop").is_err());
    }
}
