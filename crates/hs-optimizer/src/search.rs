//! Proposer trait and the sampling-free sweep strategies.

use hs_types::Assignment;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::space::SearchSpace;
use crate::trial::{ObjectiveDirection, Trial};

/// Common trait for all search strategies.
///
/// A proposer picks the next assignment to evaluate given the space and
/// every trial recorded so far (completed and failed, in trial order).
pub trait Proposer: Send {
    /// Next assignment to evaluate, or `None` once a finite strategy has
    /// nothing left to propose.
    fn propose(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
    ) -> Option<Assignment>;

    /// Whether proposals are independent of pending results, so a batch can
    /// be issued before any of it is evaluated.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Generate up to `count` proposals against the same history.
    fn propose_batch(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
        count: usize,
    ) -> Vec<Assignment> {
        (0..count)
            .map_while(|_| self.propose(space, history, direction))
            .collect()
    }

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

impl<P: Proposer + ?Sized> Proposer for Box<P> {
    fn propose(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
    ) -> Option<Assignment> {
        (**self).propose(space, history, direction)
    }

    fn supports_batch(&self) -> bool {
        (**self).supports_batch()
    }

    fn propose_batch(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
        count: usize,
    ) -> Vec<Assignment> {
        (**self).propose_batch(space, history, direction, count)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ---- Grid search ----

/// Exhaustive grid search over discrete parameter combinations.
///
/// Points are enumerated lazily in odometer order (the last declared
/// parameter varies fastest), so large grids are never materialized.
#[derive(Debug, Clone)]
pub struct GridSearch {
    /// Number of steps for continuous dimensions.
    float_steps: usize,
    cursor: usize,
    grid: Option<Grid>,
}

#[derive(Debug, Clone)]
struct Grid {
    space: SearchSpace,
    float_steps: usize,
    /// Axis lengths in declaration order.
    lengths: Vec<usize>,
    total: usize,
}

impl Grid {
    fn build(space: &SearchSpace, float_steps: usize) -> Self {
        let lengths: Vec<usize> = space
            .parameters()
            .iter()
            .map(|p| p.kind.axis_len(float_steps))
            .collect();
        let total = lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .unwrap_or(usize::MAX);
        Self {
            space: space.clone(),
            float_steps,
            lengths,
            total,
        }
    }

    fn point(&self, index: usize) -> Assignment {
        let mut rest = index;
        let mut point = Assignment::new();
        for (param, &len) in self.space.parameters().iter().zip(&self.lengths).rev() {
            let value = param.kind.axis_value(rest % len, self.float_steps);
            point.insert(param.name.clone(), value);
            rest /= len;
        }
        point
    }
}

impl GridSearch {
    pub fn new(float_steps: usize) -> Self {
        Self {
            float_steps,
            cursor: 0,
            grid: None,
        }
    }

    /// Number of points in the grid built for `space`.
    pub fn grid_len(&self, space: &SearchSpace) -> usize {
        Grid::build(space, self.float_steps).total
    }
}

impl Default for GridSearch {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Proposer for GridSearch {
    fn propose(
        &mut self,
        space: &SearchSpace,
        _history: &[Trial],
        _direction: ObjectiveDirection,
    ) -> Option<Assignment> {
        let stale = self.grid.as_ref().map_or(true, |g| g.space != *space);
        if stale {
            self.grid = Some(Grid::build(space, self.float_steps));
            self.cursor = 0;
        }
        let grid = self.grid.as_ref()?;
        if self.cursor >= grid.total {
            return None;
        }
        let point = grid.point(self.cursor);
        self.cursor += 1;
        Some(point)
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Same seed, same sequence of proposals.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Proposer for RandomSearch {
    fn propose(
        &mut self,
        space: &SearchSpace,
        _history: &[Trial],
        _direction: ObjectiveDirection,
    ) -> Option<Assignment> {
        Some(space.sample(&mut self.rng))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "random"
    }
}
