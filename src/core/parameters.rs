use tracing::warn;

use crate::error::{Error, Result};
use crate::literal::{Dict, Literal};
use crate::vocabulary::Vocabulary;

pub const MECHANISM: &str = "mechanism";
pub const SUBJECTS: &str = "subjects";
pub const BEHAVIORS: &str = "behaviors";
pub const STIMULUS_ELEMENTS: &str = "stimulus_elements";
pub const START_V: &str = "start_v";
pub const START_W: &str = "start_w";
pub const U: &str = "u";
pub const BEHAVIOR_COST: &str = "behavior_cost";
pub const C: &str = "c";
pub const ALPHA_V: &str = "alpha_v";
pub const ALPHA_W: &str = "alpha_w";
pub const BETA: &str = "beta";
pub const OMIT_LEARNING: &str = "omit_learning";
pub const RESPONSE_REQUIREMENTS: &str = "response_requirements";

/// Reserved key standing for "every other element/behavior/pair".
pub const DEFAULT_KEY: &str = "default";

const KNOWN_KEYS: &[&str] = &[
    MECHANISM,
    SUBJECTS,
    BEHAVIORS,
    STIMULUS_ELEMENTS,
    START_V,
    START_W,
    U,
    BEHAVIOR_COST,
    C,
    ALPHA_V,
    ALPHA_W,
    BETA,
    OMIT_LEARNING,
    RESPONSE_REQUIREMENTS,
];

/// The global parameter map built from `@parameters` blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Dict,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a parameter dict; keys already present are overridden.
    pub fn merge(&mut self, dict: &Dict) -> Result<()> {
        for (key, value) in dict.iter() {
            let Some(name) = key.as_str() else {
                return Err(Error::syntax(format!(
                    "@parameters keys must be strings, got {key}"
                )));
            };
            if !KNOWN_KEYS.contains(&name) {
                warn!(parameter = name, "ignoring unknown parameter");
            }
            self.values.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: Literal) {
        self.values.insert(Literal::Str(key.to_string()), value);
    }

    pub fn get(&self, key: &str) -> Option<&Literal> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains(key)
    }

    pub fn as_dict(&self) -> &Dict {
        &self.values
    }

    /// The cost table is accepted under its long or short name.
    pub fn cost(&self) -> Option<&Literal> {
        self.get(BEHAVIOR_COST).or_else(|| self.get(C))
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        let elements = self.names(STIMULUS_ELEMENTS)?;
        let behaviors = self.names(BEHAVIORS)?;
        Vocabulary::new(elements, behaviors)
    }

    pub fn mechanism_name(&self) -> Result<String> {
        match self.get(MECHANISM) {
            None => Err(Error::MissingParameter(MECHANISM)),
            Some(Literal::Str(s)) => Ok(s.to_lowercase()),
            Some(other) => Err(Error::invalid(format!(
                "'{MECHANISM}' must be a string, got {other}"
            ))),
        }
    }

    pub fn subjects(&self) -> Result<usize> {
        match self.get(SUBJECTS) {
            None => Ok(1),
            Some(lit) => match lit.as_int() {
                Some(n) if n > 0 => Ok(n as usize),
                _ => Err(Error::invalid(format!(
                    "'{SUBJECTS}' must be a positive integer, got {lit}"
                ))),
            },
        }
    }

    pub fn beta(&self) -> Result<f64> {
        match self.get(BETA) {
            None => Ok(1.0),
            Some(lit) => lit
                .as_f64()
                .ok_or_else(|| Error::invalid(format!("'{BETA}' must be a number, got {lit}"))),
        }
    }

    fn names(&self, key: &'static str) -> Result<Vec<String>> {
        let lit = self.get(key).ok_or(Error::MissingParameter(key))?;
        lit.as_names()
            .map(|names| names.into_iter().map(str::to_string).collect())
            .ok_or_else(|| Error::invalid(format!("'{key}' must be a list of strings, got {lit}")))
    }
}
