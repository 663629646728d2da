use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::{Error, Result};

pub type ElementId = usize;
pub type BehaviorId = usize;

/// The declared stimulus elements and behaviors of a script.
///
/// Everything downstream (association tables, phase lines, history) refers to
/// elements and behaviors by their index in these lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    elements: Vec<String>,
    behaviors: Vec<String>,
    element_index: HashMap<String, ElementId>,
    behavior_index: HashMap<String, BehaviorId>,
}

impl Vocabulary {
    pub fn new<E, B>(elements: E, behaviors: B) -> Result<Self>
    where
        E: IntoIterator,
        E::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();
        let behaviors: Vec<String> = behaviors.into_iter().map(Into::into).collect();
        if elements.is_empty() {
            return Err(Error::invalid("'stimulus_elements' must not be empty"));
        }
        if behaviors.is_empty() {
            return Err(Error::invalid("'behaviors' must not be empty"));
        }

        let element_index = index_names(&elements, "stimulus_elements")?;
        let behavior_index = index_names(&behaviors, "behaviors")?;
        if let Some(shared) = elements.iter().find(|e| behavior_index.contains_key(*e)) {
            return Err(Error::invalid(format!(
                "'{shared}' is declared both as a stimulus element and a behavior"
            )));
        }

        Ok(Self {
            elements,
            behaviors,
            element_index,
            behavior_index,
        })
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn behaviors(&self) -> &[String] {
        &self.behaviors
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.element_index.get(name).copied()
    }

    pub fn behavior_id(&self, name: &str) -> Option<BehaviorId> {
        self.behavior_index.get(name).copied()
    }

    /// Resolve an element name or fail with `context` in the message.
    pub fn require_element(&self, name: &str, context: &str) -> Result<ElementId> {
        self.element_id(name).ok_or_else(|| Error::UnknownElement {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    pub fn require_behavior(&self, name: &str, context: &str) -> Result<BehaviorId> {
        self.behavior_id(name).ok_or_else(|| Error::UnknownBehavior {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    pub fn element_name(&self, id: ElementId) -> &str {
        &self.elements[id]
    }

    pub fn behavior_name(&self, id: BehaviorId) -> &str {
        &self.behaviors[id]
    }

    /// Flat index of an (element, behavior) pair in a dense table.
    #[inline]
    pub fn pair(&self, element: ElementId, behavior: BehaviorId) -> usize {
        element * self.behaviors.len() + behavior
    }

    pub fn pair_count(&self) -> usize {
        self.elements.len() * self.behaviors.len()
    }
}

fn index_names(names: &[String], what: &str) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(Error::invalid(format!("empty name in '{what}'")));
        }
        if index.insert(name.clone(), i).is_some() {
            return Err(Error::invalid(format!("'{name}' is duplicated in '{what}'")));
        }
    }
    Ok(index)
}

/// The elements presented together at one step. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stimulus(Arc<[ElementId]>);

impl Stimulus {
    pub fn new(elements: impl Into<Arc<[ElementId]>>) -> Self {
        Self(elements.into())
    }

    pub fn elements(&self) -> &[ElementId] {
        &self.0
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.0.contains(&element)
    }

    pub fn display<'a>(&'a self, vocab: &'a Vocabulary) -> StimulusDisplay<'a> {
        StimulusDisplay {
            stimulus: self,
            vocab,
        }
    }
}

pub struct StimulusDisplay<'a> {
    stimulus: &'a Stimulus,
    vocab: &'a Vocabulary,
}

impl fmt::Display for StimulusDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .stimulus
            .elements()
            .iter()
            .map(|&e| self.vocab.element_name(e))
            .collect();
        if names.len() == 1 {
            write!(f, "{}", names[0])
        } else {
            write!(f, "({})", names.join(","))
        }
    }
}
