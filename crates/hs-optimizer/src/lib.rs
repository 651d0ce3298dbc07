//! # hs-optimizer
//!
//! Search space definitions and the trial loop for HyperSweep.
//!
//! Provides validated search spaces (integer, real and categorical
//! dimensions), pluggable proposers (grid, random, TPE), trial tracking and
//! the [`TrialRunner`] that turns a trial budget into a [`SearchResult`].

mod runner;
mod search;
mod space;
mod tpe;
mod trial;

pub use runner::{Evaluator, TrialRunner};
pub use search::{GridSearch, Proposer, RandomSearch};
pub use space::{Declaration, ParameterKind, ParameterSpec, SearchSpace};
pub use tpe::TpeSearch;
pub use trial::{
    BestTrial, ObjectiveDirection, RunConfig, RunId, RunState, RunStatus, SearchResult, Trial,
    TrialStatus,
};
