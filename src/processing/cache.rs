use nalgebra::Matrix3;

use crate::algorithms::precision::PrecisionMatrixBuilder;
use crate::core::{Ellipse, Position};
use crate::validation::error::FusionResult;

/// Index of a contributor within one fusion run
pub type ContributorId = usize;

/// Per-run memo of contributor precision matrices and ECEF positions.
///
/// Entries are keyed by the contributor's index in the run's input arena,
/// so the cache belongs to exactly one run and the input ellipses stay
/// untouched. Precision matrices are built once and reused across outlier
/// iterations.
#[derive(Debug)]
pub struct PrecisionCache {
    precisions: Vec<Option<Matrix3<f64>>>,
    positions: Vec<Option<Position>>,
    hit_count: usize,
    miss_count: usize,
}

impl PrecisionCache {
    /// Cache sized for a run with `len` contributors
    pub fn with_capacity(len: usize) -> Self {
        Self {
            precisions: vec![None; len],
            positions: vec![None; len],
            hit_count: 0,
            miss_count: 0,
        }
    }

    /// Precision of contributor `id`, building it on first use
    pub fn precision(
        &mut self,
        id: ContributorId,
        ellipse: &Ellipse,
        builder: &PrecisionMatrixBuilder,
    ) -> FusionResult<Matrix3<f64>> {
        self.ensure_slot(id);
        if let Some(precision) = self.precisions[id] {
            self.hit_count += 1;
            return Ok(precision);
        }
        self.miss_count += 1;
        let precision = builder.build(ellipse)?;
        self.precisions[id] = Some(precision);
        Ok(precision)
    }

    /// ECEF position of contributor `id`
    pub fn position(&mut self, id: ContributorId, ellipse: &Ellipse, builder: &PrecisionMatrixBuilder) -> Position {
        self.ensure_slot(id);
        *self.positions[id].get_or_insert_with(|| builder.ecef_position(ellipse))
    }

    /// Drop a memoized entry, e.g. after the caller edited the ellipse
    pub fn invalidate(&mut self, id: ContributorId) {
        if id < self.precisions.len() {
            self.precisions[id] = None;
            self.positions[id] = None;
        }
    }

    /// `(hits, misses)` of precision lookups
    pub fn statistics(&self) -> (usize, usize) {
        (self.hit_count, self.miss_count)
    }

    fn ensure_slot(&mut self, id: ContributorId) {
        if id >= self.precisions.len() {
            self.precisions.resize(id + 1, None);
            self.positions.resize(id + 1, None);
        }
    }
}
