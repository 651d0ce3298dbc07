//! L2-regularized binary logistic regression.
//!
//! Minimizes `C * sum(log(1 + exp(-y * (w.x + b)))) + 0.5 * |w|^2` with
//! labels mapped to `y = +/-1`; the intercept is not penalized. Two solvers
//! share the objective: L-BFGS over all coefficients (`"lbfgs"`) and cyclic
//! coordinate Newton descent (`"liblinear"`).

use hs_data::ConfigObject;
use hs_types::{Assignment, EvalError, ParameterValue};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::debug;

use crate::dataset::Dataset;
use crate::model::{Model, ModelFactory};

/// L-BFGS history length.
const LBFGS_MEMORY: usize = 10;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    Lbfgs,
    Liblinear,
}

impl FromStr for Solver {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lbfgs" => Ok(Self::Lbfgs),
            "liblinear" => Ok(Self::Liblinear),
            other => Err(EvalError::failure(format!(
                "unsupported LogisticRegression solver '{other}' (expected lbfgs or liblinear)"
            ))),
        }
    }
}

/// Hyperparameters, keyed as `C`, `solver`, `max_iter`, `tol` and
/// `fit_intercept` when set by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    #[serde(rename = "C")]
    pub c: f64,
    pub solver: Solver,
    pub max_iter: usize,
    pub tol: f64,
    pub fit_intercept: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            solver: Solver::Lbfgs,
            max_iter: 100,
            tol: 1e-4,
            fit_intercept: true,
        }
    }
}

impl LogisticParams {
    /// Set one parameter by name; unknown names and ill-typed values fail.
    pub fn set(&mut self, name: &str, value: &ParameterValue) -> Result<(), EvalError> {
        let expected = |what: &str| {
            EvalError::failure(format!(
                "LogisticRegression parameter '{name}' expects {what}, got {value}"
            ))
        };
        match name {
            "C" => self.c = value.as_f64().ok_or_else(|| expected("a number"))?,
            "solver" => self.solver = value.as_str().ok_or_else(|| expected("a string"))?.parse()?,
            "max_iter" => {
                self.max_iter = value
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| expected("a non-negative integer"))?
            }
            "tol" => self.tol = value.as_f64().ok_or_else(|| expected("a number"))?,
            "fit_intercept" => {
                self.fit_intercept = value.as_bool().ok_or_else(|| expected("a boolean"))?
            }
            other => {
                return Err(EvalError::failure(format!(
                    "unknown LogisticRegression parameter '{other}'"
                )))
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(EvalError::failure(format!(
                "C must be a positive finite number, got {}",
                self.c
            )));
        }
        if self.max_iter == 0 {
            return Err(EvalError::failure("max_iter must be at least 1"));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(EvalError::failure(format!(
                "tol must be a positive finite number, got {}",
                self.tol
            )));
        }
        Ok(())
    }

    /// A copy of these parameters with `assignment` applied on top.
    pub fn with_assignment(&self, assignment: &Assignment) -> Result<Self, EvalError> {
        let mut params = self.clone();
        for (name, value) in assignment {
            params.set(name, value)?;
        }
        params.validate()?;
        Ok(params)
    }

    /// Defaults overridden by the scalar entries of a config object.
    pub fn from_config(config: &ConfigObject) -> Result<Self, EvalError> {
        let mut params = Self::default();
        for key in config.keys() {
            let value = config.value(key).ok_or_else(|| {
                EvalError::failure(format!("model setting '{key}' must be a scalar"))
            })?;
            params.set(key, &ParameterValue::Choice(value.clone()))?;
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    n_iter: usize,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            coefficients: None,
            intercept: 0.0,
            n_iter: 0,
        }
    }

    pub fn from_assignment(assignment: &Assignment) -> Result<Self, EvalError> {
        Ok(Self::new(LogisticParams::default().with_assignment(assignment)?))
    }

    /// A factory applying each assignment on top of `base`.
    pub fn factory(base: LogisticParams) -> impl ModelFactory {
        move |assignment: &Assignment| -> Result<Box<dyn Model>, EvalError> {
            Ok(Box::new(Self::new(base.with_assignment(assignment)?)))
        }
    }

    pub fn params(&self) -> &LogisticParams {
        &self.params
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Solver iterations used by the last fit.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Probability of class 1 for each row.
    pub fn predict_proba(&self, data: &Dataset) -> Result<Array1<f64>, EvalError> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| EvalError::failure("LogisticRegression used before fit"))?;
        if data.n_features() != coefficients.len() {
            return Err(EvalError::failure(format!(
                "model was fitted on {} features, got {}",
                coefficients.len(),
                data.n_features()
            )));
        }
        Ok((data.features().dot(coefficients) + self.intercept).mapv_into(sigmoid))
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, data: &Dataset) -> Result<(), EvalError> {
        self.params.validate()?;
        let problem = Problem {
            x: data.features(),
            labels: signed_labels(data.targets())?,
            c: self.params.c,
            fit_intercept: self.params.fit_intercept,
        };

        let start = Array1::zeros(data.n_features() + 1);
        let (theta, n_iter) = match self.params.solver {
            Solver::Lbfgs => lbfgs(&problem, start, self.params.max_iter, self.params.tol),
            Solver::Liblinear => {
                coordinate_newton(&problem, start, self.params.max_iter, self.params.tol)
            }
        };
        if n_iter >= self.params.max_iter {
            debug!(
                "{:?} solver stopped at max_iter={} before reaching tol={}",
                self.params.solver, self.params.max_iter, self.params.tol
            );
        }

        let d = data.n_features();
        self.intercept = theta[d];
        self.coefficients = Some(theta.slice(s![..d]).to_owned());
        self.n_iter = n_iter;
        Ok(())
    }

    fn predict(&self, data: &Dataset) -> Result<Array1<f64>, EvalError> {
        Ok(self
            .predict_proba(data)?
            .mapv_into(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

fn signed_labels(targets: &Array1<f64>) -> Result<Array1<f64>, EvalError> {
    let labels = targets
        .iter()
        .map(|&t| match t {
            t if t == 0.0 => Ok(-1.0),
            t if t == 1.0 => Ok(1.0),
            other => Err(EvalError::failure(format!(
                "LogisticRegression supports binary targets 0 and 1, found {other}"
            ))),
        })
        .collect::<Result<Array1<f64>, _>>()?;
    let positives = labels.iter().filter(|&&y| y > 0.0).count();
    if positives == 0 || positives == labels.len() {
        return Err(EvalError::failure(
            "training data must contain both classes 0 and 1",
        ));
    }
    Ok(labels)
}

/// Training rows plus the objective's constants.
///
/// Parameter vectors are `[w_0, .., w_{d-1}, b]`; `b` stays at zero when
/// the intercept is not fitted.
struct Problem<'a> {
    x: &'a Array2<f64>,
    labels: Array1<f64>,
    c: f64,
    fit_intercept: bool,
}

impl Problem<'_> {
    fn n_features(&self) -> usize {
        self.x.ncols()
    }

    fn margins(&self, theta: &Array1<f64>) -> Array1<f64> {
        let d = self.n_features();
        self.x.dot(&theta.slice(s![..d])) + theta[d]
    }

    fn value_and_gradient(&self, theta: &Array1<f64>) -> (f64, Array1<f64>) {
        let d = self.n_features();
        let w = theta.slice(s![..d]);
        let yz = &self.labels * &self.margins(theta);

        let loss: f64 = yz.iter().map(|&t| softplus(-t)).sum();
        let value = 0.5 * w.dot(&w) + self.c * loss;

        // d loss / d margin, per row
        let coeff: Array1<f64> = self
            .labels
            .iter()
            .zip(&yz)
            .map(|(&y, &t)| -self.c * y * sigmoid(-t))
            .collect();

        let mut gradient = Array1::zeros(d + 1);
        gradient
            .slice_mut(s![..d])
            .assign(&(&w + &self.x.t().dot(&coeff)));
        if self.fit_intercept {
            gradient[d] = coeff.sum();
        }
        (value, gradient)
    }
}

type Curvature = (Array1<f64>, Array1<f64>, f64);

/// Returns the solution and the number of iterations taken.
fn lbfgs(
    problem: &Problem<'_>,
    mut theta: Array1<f64>,
    max_iter: usize,
    tol: f64,
) -> (Array1<f64>, usize) {
    let (mut value, mut gradient) = problem.value_and_gradient(&theta);
    let mut history: VecDeque<Curvature> = VecDeque::with_capacity(LBFGS_MEMORY);

    for iter in 0..max_iter {
        if gradient.fold(0.0_f64, |m, g| m.max(g.abs())) <= tol {
            return (theta, iter);
        }

        let mut direction = two_loop(&gradient, &history);
        let mut slope = gradient.dot(&direction);
        if slope >= 0.0 {
            history.clear();
            direction = -&gradient;
            slope = -gradient.dot(&gradient);
        }
        if history.is_empty() {
            // Unit-length first step keeps the initial line search in range.
            let scale = 1.0 / direction.dot(&direction).sqrt().max(1.0);
            direction *= scale;
            slope *= scale;
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate = theta.clone();
            candidate.scaled_add(step, &direction);
            let (candidate_value, candidate_gradient) = problem.value_and_gradient(&candidate);
            if candidate_value <= value + ARMIJO * step * slope {
                accepted = Some((candidate, candidate_value, candidate_gradient));
                break;
            }
            step *= 0.5;
        }
        let Some((next, next_value, next_gradient)) = accepted else {
            return (theta, iter + 1);
        };

        let s = &next - &theta;
        let y = &next_gradient - &gradient;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            if history.len() == LBFGS_MEMORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        theta = next;
        value = next_value;
        gradient = next_gradient;
    }
    (theta, max_iter)
}

/// Approximate `-H^-1 g` from the stored curvature pairs.
fn two_loop(gradient: &Array1<f64>, history: &VecDeque<Curvature>) -> Array1<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * s.dot(&q);
        q.scaled_add(-alpha, y);
        alphas.push(alpha);
    }

    let gamma = history.back().map_or(1.0, |(s, y, _)| s.dot(y) / y.dot(y));
    q *= gamma;

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * y.dot(&q);
        q.scaled_add(alpha - beta, s);
    }
    -q
}

/// Cyclic one-coordinate Newton steps with a backtracking safeguard.
/// Stops once a full sweep moves no coordinate by more than `tol`.
fn coordinate_newton(
    problem: &Problem<'_>,
    mut theta: Array1<f64>,
    max_iter: usize,
    tol: f64,
) -> (Array1<f64>, usize) {
    let d = problem.n_features();
    let ones = Array1::<f64>::ones(problem.x.nrows());
    let mut margins = problem.margins(&theta);
    let last = if problem.fit_intercept { d + 1 } else { d };

    for epoch in 0..max_iter {
        let mut largest_move: f64 = 0.0;

        for j in 0..last {
            let penalized = j < d;
            let column = if penalized {
                problem.x.column(j)
            } else {
                ones.view()
            };

            let mut gradient = if penalized { theta[j] } else { 0.0 };
            let mut hessian = if penalized { 1.0 } else { 0.0 };
            for ((&y, &z), &x) in problem.labels.iter().zip(&margins).zip(&column) {
                let p = sigmoid(-y * z);
                gradient -= problem.c * y * p * x;
                hessian += problem.c * p * (1.0 - p) * x * x;
            }
            if gradient == 0.0 {
                continue;
            }

            let along = |t: f64| {
                let loss: f64 = problem
                    .labels
                    .iter()
                    .zip(&margins)
                    .zip(&column)
                    .map(|((&y, &z), &x)| softplus(-y * (z + t * x)))
                    .sum();
                let penalty = if penalized {
                    0.5 * (theta[j] + t).powi(2)
                } else {
                    0.0
                };
                problem.c * loss + penalty
            };

            let base = along(0.0);
            let mut step = -gradient / hessian.max(1e-12);
            let mut accepted = false;
            for _ in 0..MAX_BACKTRACKS {
                if along(step) <= base + ARMIJO * step * gradient {
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                continue;
            }

            theta[j] += step;
            margins.scaled_add(step, &column);
            largest_move = largest_move.max(step.abs());
        }

        if largest_move <= tol {
            return (theta, epoch + 1);
        }
    }
    (theta, max_iter)
}

fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^t)` without overflow.
fn softplus(t: f64) -> f64 {
    t.max(0.0) + (-t.abs()).exp().ln_1p()
}
