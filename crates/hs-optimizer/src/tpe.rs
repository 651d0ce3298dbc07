//! Tree-structured Parzen estimator proposer.
//!
//! Completed trials are split at the `gamma` quantile of their loss into a
//! "good" and a "bad" group. Each numeric parameter gets a Gaussian Parzen
//! estimator per group; candidates are drawn from the good density l(x)
//! and the one maximizing l(x)/g(x) is proposed. Categorical parameters use
//! smoothed frequency ratios instead. Until `n_startup_trials` trials have
//! completed, proposals are uniform.

use hs_types::{Assignment, ParameterValue};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::search::Proposer;
use crate::space::{ParameterKind, SearchSpace};
use crate::trial::{ObjectiveDirection, Trial};

/// Model-based sequential proposer.
#[derive(Debug, Clone)]
pub struct TpeSearch {
    /// Fraction of completed trials considered "good".
    gamma: f64,
    /// Completed trials required before the model is used.
    n_startup_trials: usize,
    /// Candidates drawn from l(x) per numeric parameter.
    n_ei_candidates: usize,
    rng: ChaCha8Rng,
}

impl TpeSearch {
    /// gamma 0.25, 10 startup trials, 24 candidates.
    pub fn new() -> Self {
        Self {
            gamma: 0.25,
            n_startup_trials: 10,
            n_ei_candidates: 24,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Clamped into the open interval (0, 1).
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_ei_candidates = n.max(1);
        self
    }

    /// Split completed trials into (good, bad), best first.
    fn split<'a>(
        &self,
        history: &'a [Trial],
        direction: ObjectiveDirection,
    ) -> (Vec<&'a Assignment>, Vec<&'a Assignment>) {
        let mut scored: Vec<(f64, &Assignment)> = history
            .iter()
            .filter_map(|t| t.score.map(|s| (direction.loss(s), &t.assignment)))
            .collect();
        // Stable sort: equal losses keep trial order.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let n_good = ((scored.len() as f64 * self.gamma).ceil() as usize)
            .max(1)
            .min(scored.len().saturating_sub(1));

        let mut assignments = scored.into_iter().map(|(_, a)| a);
        let good = assignments.by_ref().take(n_good).collect();
        let bad = assignments.collect();
        (good, bad)
    }

    fn sample_numeric(&mut self, low: f64, high: f64, good: &[f64], bad: &[f64]) -> f64 {
        if low == high {
            return low;
        }
        let l = ParzenEstimator::new(good, low, high);
        let g = ParzenEstimator::new(bad, low, high);

        let mut best = low;
        let mut best_ratio = f64::NEG_INFINITY;
        for _ in 0..self.n_ei_candidates {
            let candidate = l.sample(&mut self.rng).clamp(low, high);
            let l_density = l.pdf(candidate);
            let g_density = g.pdf(candidate);
            let ratio = if g_density < f64::EPSILON {
                if l_density > f64::EPSILON {
                    f64::INFINITY
                } else {
                    0.0
                }
            } else {
                l_density / g_density
            };
            if ratio > best_ratio {
                best_ratio = ratio;
                best = candidate;
            }
        }
        best
    }

    fn sample_categorical(&mut self, n_choices: usize, good: &[usize], bad: &[usize]) -> usize {
        let mut good_counts = vec![0usize; n_choices];
        let mut bad_counts = vec![0usize; n_choices];
        for &idx in good {
            good_counts[idx] += 1;
        }
        for &idx in bad {
            bad_counts[idx] += 1;
        }

        // Laplace smoothing keeps every choice reachable.
        let good_total = (good.len() + n_choices) as f64;
        let bad_total = (bad.len() + n_choices) as f64;
        let weights: Vec<f64> = (0..n_choices)
            .map(|i| {
                let l = (good_counts[i] as f64 + 1.0) / good_total;
                let g = (bad_counts[i] as f64 + 1.0) / bad_total;
                l / g
            })
            .collect();

        let threshold = self.rng.gen::<f64>() * weights.iter().sum::<f64>();
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if cumulative >= threshold {
                return i;
            }
        }
        n_choices - 1
    }
}

impl Default for TpeSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Proposer for TpeSearch {
    fn propose(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
    ) -> Option<Assignment> {
        let n_completed = history.iter().filter(|t| t.is_completed()).count();
        if n_completed < self.n_startup_trials.max(2) {
            return Some(space.sample(&mut self.rng));
        }

        let (good, bad) = self.split(history, direction);
        let mut point = Assignment::new();

        for param in space.parameters() {
            let value = match &param.kind {
                ParameterKind::IntRange { low, high } => {
                    let good = numeric_values(&good, &param.name);
                    let bad = numeric_values(&bad, &param.name);
                    if good.is_empty() || bad.is_empty() {
                        param.kind.sample(&mut self.rng)
                    } else {
                        let v = self.sample_numeric(*low as f64, *high as f64, &good, &bad);
                        ParameterValue::Int((v.round() as i64).clamp(*low, *high))
                    }
                }
                ParameterKind::RealRange { low, high } => {
                    let good = numeric_values(&good, &param.name);
                    let bad = numeric_values(&bad, &param.name);
                    if good.is_empty() || bad.is_empty() {
                        param.kind.sample(&mut self.rng)
                    } else {
                        ParameterValue::Float(self.sample_numeric(*low, *high, &good, &bad))
                    }
                }
                ParameterKind::Categorical { choices } => {
                    let good = choice_indices(&good, &param.name, choices);
                    let bad = choice_indices(&bad, &param.name, choices);
                    let idx = self.sample_categorical(choices.len(), &good, &bad);
                    ParameterValue::Choice(choices[idx].clone())
                }
            };
            point.insert(param.name.clone(), value);
        }

        Some(point)
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

fn numeric_values(group: &[&Assignment], name: &str) -> Vec<f64> {
    group
        .iter()
        .filter_map(|a| a.get(name).and_then(ParameterValue::as_f64))
        .collect()
}

fn choice_indices(group: &[&Assignment], name: &str, choices: &[serde_json::Value]) -> Vec<usize> {
    group
        .iter()
        .filter_map(|a| {
            let value = a.get(name)?.to_json();
            choices.iter().position(|c| *c == value)
        })
        .collect()
}

/// Gaussian kernel density over observed values of one parameter.
struct ParzenEstimator<'a> {
    samples: &'a [f64],
    bandwidth: f64,
}

impl<'a> ParzenEstimator<'a> {
    /// Scott's rule, floored relative to the domain width so a cluster of
    /// identical observations still spreads its mass.
    fn new(samples: &'a [f64], low: f64, high: f64) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let std_dev = (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        let width = high - low;
        let floor = if width > 0.0 { width * 0.01 } else { 1.0 };
        let bandwidth = (n.powf(-0.2) * std_dev).max(floor);
        Self { samples, bandwidth }
    }

    fn pdf(&self, x: f64) -> f64 {
        let inv_bandwidth = 1.0 / self.bandwidth;
        let normalization = inv_bandwidth / (2.0 * std::f64::consts::PI).sqrt();
        let density: f64 = self
            .samples
            .iter()
            .map(|&xi| {
                let z = (x - xi) * inv_bandwidth;
                normalization * (-0.5 * z * z).exp()
            })
            .sum();
        density / self.samples.len() as f64
    }

    /// Pick a kernel center, then add Box-Muller Gaussian noise.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let center = self.samples[rng.gen_range(0..self.samples.len())];
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        center + z * self.bandwidth
    }
}
