//! The world/mechanism feedback loop.

use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::mechanism::Mechanism;
use crate::output::{HistoryEntry, RunOutput, SubjectOutput};
use crate::prng::Prng;
use crate::world::World;

/// Options for executing a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Seed of the single random source; `None` means a fixed default.
    pub seed: Option<u64>,
}

impl RunOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn prng(&self) -> Prng {
        Prng::new(self.seed.unwrap_or(1))
    }
}

/// One `@run`: a world, a mechanism and a subject count.
#[derive(Debug, Clone)]
pub struct ScriptRun {
    label: String,
    world: World,
    mechanism: Mechanism,
    subjects: usize,
}

impl ScriptRun {
    pub fn new(label: impl Into<String>, world: World, mechanism: Mechanism, subjects: usize) -> Self {
        Self {
            label: label.into(),
            world,
            mechanism,
            subjects,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn subjects(&self) -> usize {
        self.subjects
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Simulate every subject. Each subject draws from its own stream split
    /// off `rng` up front, so the result does not depend on scheduling.
    pub fn run(&self, rng: &mut Prng) -> Result<RunOutput> {
        info!(
            "Run '{}': {} subject(s), mechanism {}",
            self.label,
            self.subjects,
            self.mechanism.kind().name()
        );
        let seeds: Vec<u64> = (0..self.subjects).map(|_| rng.split_seed()).collect();

        #[cfg(feature = "parallel")]
        let subjects = seeds
            .par_iter()
            .map(|&seed| {
                let mut world = self.world.clone();
                let mut mechanism = self.mechanism.clone();
                world.subject_reset();
                mechanism.subject_reset();
                simulate_subject(&mut world, &mut mechanism, seed)
            })
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let subjects = {
            let mut world = self.world.clone();
            let mut mechanism = self.mechanism.clone();
            world.subject_reset();
            mechanism.subject_reset();
            seeds
                .iter()
                .map(|&seed| simulate_subject(&mut world, &mut mechanism, seed))
                .collect::<Result<Vec<_>>>()?
        };

        let total_steps: usize = subjects.iter().map(|s| s.history().len()).sum();
        info!("Run '{}' finished: {} steps in total", self.label, total_steps);

        Ok(RunOutput {
            vocabulary: Arc::clone(self.mechanism.vocabulary()),
            has_w: self.mechanism.has_w(),
            response: self.mechanism.config().response.clone(),
            phase_labels: self
                .world
                .phases()
                .iter()
                .map(|p| p.label().to_string())
                .collect(),
            subjects,
        })
    }
}

/// Drive one subject to completion, then reset both sides for the next one.
fn simulate_subject(world: &mut World, mechanism: &mut Mechanism, seed: u64) -> Result<SubjectOutput> {
    let mut rng = Prng::new(seed);
    let vocab = Arc::clone(mechanism.vocabulary());
    let mut out = SubjectOutput::new(&vocab);
    out.write_all(mechanism, 0);
    out.write_step(0, 0);

    let mut step = 0;
    let mut response = None;
    let mut last = None;
    while let Some(emission) = world.next_stimulus(response, &mut rng)? {
        step += 1;
        let learned = mechanism.previous().map(|(s, b)| (s.clone(), b));
        let r = mechanism.learn_and_respond(&emission.stimulus, &mut rng);

        // The pairs just updated, then the pairs of this step.
        if let Some((prev, b)) = learned {
            for &e in prev.elements() {
                out.write_v(vocab.pair(e, b), step, mechanism.v(e, b));
                if mechanism.has_w() {
                    out.write_w(e, step, mechanism.w(e));
                }
            }
        }
        for &e in emission.stimulus.elements() {
            out.write_v(vocab.pair(e, r), step, mechanism.v(e, r));
        }

        out.write_history(emission.stimulus.clone(), r);
        out.write_step(emission.phase, step);
        response = Some(r);
        last = Some(HistoryEntry {
            stimulus: emission.stimulus,
            response: r,
        });
    }

    out.write_all(mechanism, step);
    out.write_last(step, last);
    debug!("Subject finished after {} steps", step);

    mechanism.subject_reset();
    world.subject_reset();
    Ok(out)
}
