//! # learnsim
//!
//! Simulation of stimulus-response learning in scripted behavioral
//! experiments.
//!
//! A script declares parameters, phases (small probabilistic stimulus graphs)
//! and runs. Each run drives a learning mechanism through the phases, one
//! subject at a time, and records weights and history for later queries.
//!
//! ## Quick Start
//!
//! ```
//! use learnsim::prelude::*;
//!
//! let script = Script::parse(
//!     "@parameters {'mechanism': 'ga', 'behaviors': ['R0', 'R1'],
//!                   'stimulus_elements': ['S', 'reward'],
//!                   'u': {'reward': 10, 'default': 0}, 'alpha_v': 0.1, 'alpha_w': 0.1}
//!      @phase {'label': 'train', 'end': 'S=50'}
//!      STIM S      | R0: REW | STIM
//!      REW  reward | STIM
//!      @run {'label': 'demo'}",
//! )
//! .unwrap();
//!
//! let out = script.run(RunOptions::default().with_seed(7)).unwrap();
//! let p = Observer::new(&out)
//!     .p(&["S"], "R0", &EvalOptions::default())
//!     .unwrap();
//! assert!(matches!(p, Evaluation::Series(_)));
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization of query results
//! - `parallel`: Simulate the subjects of a run on the rayon thread pool
//!
//! ## Modules
//!
//! - [`script`]: Script parsing and run assembly
//! - [`mechanism`]: The five learning rules
//! - [`world`]: Phase graphs and their composition
//! - [`simulation`]: The world/mechanism loop
//! - [`output`]: Per-subject record of a run
//! - [`observer`]: Read-only queries over simulation output

#[path = "core/error.rs"]
pub mod error;

#[path = "core/literal.rs"]
pub mod literal;

#[path = "core/vocabulary.rs"]
pub mod vocabulary;

#[path = "core/parameters.rs"]
pub mod parameters;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/mechanism.rs"]
pub mod mechanism;

#[path = "core/world.rs"]
pub mod world;

#[path = "core/output.rs"]
pub mod output;

#[path = "core/simulation.rs"]
pub mod simulation;

#[path = "core/script.rs"]
pub mod script;

pub mod observer;

pub use error::{Error, ErrorKind, Result};

/// Prelude module for convenient imports.
///
/// ```
/// use learnsim::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::mechanism::{Mechanism, MechanismConfig, MechanismKind};
    pub use crate::observer::{
        EvalOptions, Evaluation, Expression, Observer, Pattern, Quantity, RunSummary,
        SubjectSelection,
    };
    pub use crate::output::{RunOutput, SimulationOutput, SubjectOutput};
    pub use crate::prng::Prng;
    pub use crate::script::{PlotCommand, PostCommand, Script};
    pub use crate::simulation::{RunOptions, ScriptRun};
    pub use crate::vocabulary::{Stimulus, Vocabulary};
    pub use crate::world::{PhaseDef, World};
}
