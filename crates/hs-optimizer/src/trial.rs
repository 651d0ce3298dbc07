//! Trial tracking and search run management.

use chrono::{DateTime, Utc};
use hs_types::Assignment;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique search run identifier.
pub type RunId = Uuid;

/// Whether we are maximizing or minimizing the objective.
///
/// Has no `Default`; every run states its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// Strict improvement of `candidate` over `incumbent`.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// Map a score onto a lower-is-better scale.
    pub fn loss(self, score: f64) -> f64 {
        match self {
            Self::Maximize => -score,
            Self::Minimize => score,
        }
    }
}

impl std::str::FromStr for ObjectiveDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maximize" | "max" => Ok(Self::Maximize),
            "minimize" | "min" => Ok(Self::Minimize),
            other => Err(format!("unknown objective direction '{other}'")),
        }
    }
}

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub id: RunId,
    pub name: String,

    /// Trial budget.
    pub max_trials: usize,

    /// Direction of optimization.
    pub direction: ObjectiveDirection,

    /// How many trials `run_parallel` evaluates at once.
    pub concurrency: usize,

    /// Wall-clock limit checked between trials.
    pub timeout: Option<Duration>,

    /// Return the full trial history with the result.
    pub keep_history: bool,

    pub created_at: DateTime<Utc>,
}

impl RunConfig {
    pub fn new(max_trials: usize, direction: ObjectiveDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "search".to_string(),
            max_trials,
            direction,
            concurrency: 1,
            timeout: None,
            keep_history: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_history(mut self, keep: bool) -> Self {
        self.keep_history = keep;
        self
    }
}

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Best completed trial seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub number: usize,
    pub score: f64,
    pub assignment: Assignment,
}

/// Aggregate status of a search run; owned by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub direction: ObjectiveDirection,
    pub state: RunState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best: Option<BestTrial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            id: config.id,
            direction: config.direction,
            state: RunState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn trials_attempted(&self) -> usize {
        self.trials_completed + self.trials_failed
    }

    /// Count a finished trial; returns `true` when it became the new best.
    pub fn record(&mut self, trial: &Trial) -> bool {
        match trial.score {
            Some(score) => {
                self.trials_completed += 1;
                self.update_best(trial.number, score, &trial.assignment)
            }
            None => {
                self.trials_failed += 1;
                false
            }
        }
    }

    /// Update the best trial if `score` strictly improves on the current best.
    /// Ties keep the earlier trial.
    pub fn update_best(&mut self, number: usize, score: f64, assignment: &Assignment) -> bool {
        let improved = match &self.best {
            None => true,
            Some(current_best) => self.direction.improves(score, current_best.score),
        };
        if improved {
            self.best = Some(BestTrial {
                number,
                score,
                assignment: assignment.clone(),
            });
        }
        improved
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial (one assignment scored by the evaluator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    /// Issuance order within the run, starting at 0.
    pub number: usize,
    pub assignment: Assignment,
    pub status: TrialStatus,
    /// Mean cross-validation score; set iff the trial completed.
    pub score: Option<f64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(number: usize, assignment: Assignment) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            assignment,
            status: TrialStatus::Running,
            score: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn mark_completed(&mut self, score: f64) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.score = Some(score);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Running,
    Completed,
    Failed,
}

/// Outcome of a search run: the best assignment and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub run_id: RunId,
    pub best_params: Assignment,
    pub best_score: f64,
    /// Number of the trial that produced the best score.
    pub best_trial: usize,
    pub direction: ObjectiveDirection,
    pub trials_completed: usize,
    pub trials_failed: usize,
    /// Present when the run was configured with `keep_history`.
    pub history: Option<Vec<Trial>>,
}

impl SearchResult {
    pub fn best_params(&self) -> &Assignment {
        &self.best_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::ParameterValue;

    fn params(c: f64) -> Assignment {
        let mut p = Assignment::new();
        p.insert("C".into(), ParameterValue::Float(c));
        p
    }

    fn completed(number: usize, score: f64) -> Trial {
        let mut trial = Trial::new(number, params(number as f64));
        trial.mark_completed(score);
        trial
    }

    #[test]
    fn run_status_lifecycle() {
        let config = RunConfig::new(10, ObjectiveDirection::Maximize).with_name("lifecycle");
        let mut status = RunStatus::new(&config);

        assert_eq!(status.state, RunState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, RunState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, RunState::Completed);
        assert!(status.finished_at.is_some());

        let mut failed = RunStatus::new(&config);
        failed.mark_failed("Unknown metric: foo".into());
        assert_eq!(failed.state, RunState::Failed);
        assert_eq!(failed.error.as_deref(), Some("Unknown metric: foo"));
    }

    #[test]
    fn best_trial_tracking_maximize() {
        let mut status = RunStatus::new(&RunConfig::new(10, ObjectiveDirection::Maximize));

        assert!(status.record(&completed(0, 1.5)));
        assert!(status.record(&completed(1, 2.0)));
        // Worse result should not replace
        assert!(!status.record(&completed(2, 1.0)));
        assert_eq!(status.best.as_ref().unwrap().score, 2.0);
        assert_eq!(status.best.as_ref().unwrap().number, 1);
        assert_eq!(status.trials_completed, 3);
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let mut status = RunStatus::new(&RunConfig::new(10, ObjectiveDirection::Minimize));

        status.record(&completed(0, 0.15));
        status.record(&completed(1, 0.05));
        status.record(&completed(2, 0.10));
        assert_eq!(status.best.as_ref().unwrap().score, 0.05);
    }

    #[test]
    fn ties_keep_the_earlier_trial() {
        let mut status = RunStatus::new(&RunConfig::new(10, ObjectiveDirection::Maximize));
        status.record(&completed(0, 0.9));
        assert!(!status.record(&completed(1, 0.9)));
        assert_eq!(status.best.as_ref().unwrap().number, 0);
        assert_eq!(status.best.as_ref().unwrap().assignment, params(0.0));
    }

    #[test]
    fn failed_trials_do_not_touch_best() {
        let mut status = RunStatus::new(&RunConfig::new(10, ObjectiveDirection::Maximize));
        let mut trial = Trial::new(0, params(1.0));
        trial.mark_failed("C must be positive".into());

        assert!(!status.record(&trial));
        assert!(status.best.is_none());
        assert_eq!(status.trials_failed, 1);
        assert_eq!(status.trials_attempted(), 1);
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial = Trial::new(3, params(0.5));
        assert_eq!(trial.status, TrialStatus::Running);
        assert!(trial.duration().is_none());

        trial.mark_completed(0.87);
        assert!(trial.is_completed());
        assert!(trial.finished_at.is_some());
        assert_eq!(trial.score, Some(0.87));
        assert!(trial.duration().is_some());
    }

    #[test]
    fn direction_parsing_and_loss() {
        assert_eq!(
            "maximize".parse::<ObjectiveDirection>().unwrap(),
            ObjectiveDirection::Maximize
        );
        assert_eq!(
            "MIN".parse::<ObjectiveDirection>().unwrap(),
            ObjectiveDirection::Minimize
        );
        assert!("sideways".parse::<ObjectiveDirection>().is_err());
        assert_eq!(ObjectiveDirection::Maximize.loss(0.8), -0.8);
        assert_eq!(ObjectiveDirection::Minimize.loss(0.8), 0.8);
    }

    #[test]
    fn config_builder() {
        let config = RunConfig::new(25, ObjectiveDirection::Minimize)
            .with_concurrency(0)
            .with_timeout(Duration::from_secs(30))
            .with_history(true);
        assert_eq!(config.max_trials, 25);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.keep_history);

        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
