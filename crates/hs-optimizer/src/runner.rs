//! The trial loop: propose, evaluate, record, keep the best.

use hs_types::{Assignment, EvalError, HsResult, SearchError};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::search::Proposer;
use crate::space::SearchSpace;
use crate::trial::{RunConfig, RunStatus, SearchResult, Trial};

/// Scores a complete assignment; higher or lower is better depending on
/// the run's [`ObjectiveDirection`](crate::ObjectiveDirection).
pub trait Evaluator {
    fn evaluate(&self, assignment: &Assignment) -> Result<f64, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Assignment) -> Result<f64, EvalError>,
{
    fn evaluate(&self, assignment: &Assignment) -> Result<f64, EvalError> {
        self(assignment)
    }
}

/// Drives a fixed budget of trials against one search space.
#[derive(Debug, Clone)]
pub struct TrialRunner {
    config: RunConfig,
}

impl TrialRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run trials one after another; each proposal sees every earlier result.
    pub fn run<E, P>(
        &self,
        evaluator: &E,
        space: &SearchSpace,
        proposer: &mut P,
    ) -> HsResult<SearchResult>
    where
        E: Evaluator + ?Sized,
        P: Proposer + ?Sized,
    {
        self.preflight(space)?;
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut status = RunStatus::new(&self.config);
        let mut history: Vec<Trial> = Vec::with_capacity(self.config.max_trials);

        info!(
            "Starting search '{}': {} trials over {} parameters with {} proposer",
            self.config.name,
            self.config.max_trials,
            space.len(),
            proposer.name()
        );
        status.mark_running();

        for number in 0..self.config.max_trials {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!("Deadline reached after {} trials", number);
                break;
            }
            let Some(assignment) = proposer.propose(space, &history, self.config.direction) else {
                info!("Proposer '{}' exhausted after {} trials", proposer.name(), number);
                break;
            };

            let mut trial = self.open_trial(space, number, assignment, &mut status)?;
            let outcome = evaluator.evaluate(&trial.assignment);
            self.settle(&mut trial, outcome, &mut status)?;
            history.push(trial);
        }

        self.finish(status, history)
    }

    /// Evaluate independent proposals `concurrency` at a time.
    ///
    /// Only proposers that support batching are run this way; anything else
    /// falls back to [`TrialRunner::run`]. Trial numbers follow issuance
    /// order and results are folded in that order, so ties resolve exactly
    /// as in a sequential run.
    pub fn run_parallel<E, P>(
        &self,
        evaluator: &E,
        space: &SearchSpace,
        proposer: &mut P,
    ) -> HsResult<SearchResult>
    where
        E: Evaluator + Sync + ?Sized,
        P: Proposer + ?Sized,
    {
        if !proposer.supports_batch() || self.config.concurrency <= 1 {
            if self.config.concurrency > 1 {
                warn!(
                    "Proposer '{}' does not support batches; running sequentially",
                    proposer.name()
                );
            }
            return self.run(evaluator, space, proposer);
        }

        self.preflight(space)?;
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut status = RunStatus::new(&self.config);
        let mut history: Vec<Trial> = Vec::with_capacity(self.config.max_trials);

        info!(
            "Starting parallel search '{}': {} trials, {} at a time, with {} proposer",
            self.config.name,
            self.config.max_trials,
            self.config.concurrency,
            proposer.name()
        );
        status.mark_running();

        while history.len() < self.config.max_trials {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!("Deadline reached after {} trials", history.len());
                break;
            }
            let count = self
                .config
                .concurrency
                .min(self.config.max_trials - history.len());
            let batch = proposer.propose_batch(space, &history, self.config.direction, count);
            if batch.is_empty() {
                info!(
                    "Proposer '{}' exhausted after {} trials",
                    proposer.name(),
                    history.len()
                );
                break;
            }
            let exhausted = batch.len() < count;

            let mut trials = Vec::with_capacity(batch.len());
            for (offset, assignment) in batch.into_iter().enumerate() {
                let number = history.len() + offset;
                trials.push(self.open_trial(space, number, assignment, &mut status)?);
            }

            let outcomes: Vec<Result<f64, EvalError>> = trials
                .par_iter()
                .map(|trial| evaluator.evaluate(&trial.assignment))
                .collect();

            for (mut trial, outcome) in trials.into_iter().zip(outcomes) {
                self.settle(&mut trial, outcome, &mut status)?;
                history.push(trial);
            }
            if exhausted {
                break;
            }
        }

        self.finish(status, history)
    }

    fn preflight(&self, space: &SearchSpace) -> HsResult<()> {
        if self.config.max_trials == 0 {
            return Err(SearchError::InvalidBudget {
                budget: self.config.max_trials,
            }
            .into());
        }
        if space.is_empty() {
            return Err(SearchError::EmptySearchSpace.into());
        }
        space.validate()?;
        Ok(())
    }

    fn open_trial(
        &self,
        space: &SearchSpace,
        number: usize,
        assignment: Assignment,
        status: &mut RunStatus,
    ) -> HsResult<Trial> {
        if let Err(message) = space.check_assignment(&assignment) {
            let err = SearchError::InvalidProposal {
                trial: number,
                message,
            };
            status.mark_failed(err.to_string());
            return Err(err.into());
        }
        Ok(Trial::new(number, assignment))
    }

    /// Record the evaluator's outcome on `trial`; fatal errors abort the run.
    fn settle(
        &self,
        trial: &mut Trial,
        outcome: Result<f64, EvalError>,
        status: &mut RunStatus,
    ) -> HsResult<()> {
        match outcome {
            Ok(score) if score.is_finite() => trial.mark_completed(score),
            Ok(score) => trial.mark_failed(
                EvalError::failure(format!("evaluator returned non-finite score {score}"))
                    .to_string(),
            ),
            Err(err) if err.is_fatal() => {
                warn!("Trial {} aborted the search: {}", trial.number, err);
                status.mark_failed(err.to_string());
                return Err(err.into());
            }
            Err(err) => trial.mark_failed(err.to_string()),
        }

        let improved = status.record(trial);
        match (&trial.score, &trial.error) {
            (Some(score), _) if improved => {
                info!("Trial {} new best {:.6}: {:?}", trial.number, score, trial.assignment)
            }
            (Some(score), _) => debug!("Trial {} scored {:.6}", trial.number, score),
            (None, error) => warn!(
                "Trial {} failed: {}",
                trial.number,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
        Ok(())
    }

    fn finish(&self, mut status: RunStatus, history: Vec<Trial>) -> HsResult<SearchResult> {
        let Some(best) = status.best.take() else {
            let err = SearchError::NoSuccessfulTrial {
                attempted: status.trials_attempted(),
            };
            status.mark_failed(err.to_string());
            warn!("Search '{}' failed: {}", self.config.name, err);
            return Err(err.into());
        };
        status.mark_completed();

        info!(
            "Search '{}' finished: best score {:.6} at trial {} ({} completed, {} failed)",
            self.config.name,
            best.score,
            best.number,
            status.trials_completed,
            status.trials_failed
        );

        Ok(SearchResult {
            run_id: status.id,
            best_params: best.assignment,
            best_score: best.score,
            best_trial: best.number,
            direction: status.direction,
            trials_completed: status.trials_completed,
            trials_failed: status.trials_failed,
            history: self.config.keep_history.then_some(history),
        })
    }
}
