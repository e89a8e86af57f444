//! Iterative fusion with outlier rejection
//!
//! A run copies its inputs into an arena and repeats
//! fuse -> score -> remove-one until no contributor exceeds the threshold.
//! Every iteration strictly shrinks the candidate set and removals are never
//! undone, so a run over `N` contributors stops after at most `N - 1`
//! refusions.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::algorithms::altitude::AltitudeVarianceAdjuster;
use crate::algorithms::error_ellipse::ErrorEllipseEstimator;
use crate::algorithms::fusion::PositionFuser;
use crate::algorithms::outlier::{OutlierDetector, OutlierReason};
use crate::algorithms::precision::PrecisionMatrixBuilder;
use crate::core::Ellipse;
use crate::processing::cache::{ContributorId, PrecisionCache};
use crate::utils::config::FusionConfig;
use crate::validation::data::InputValidator;
use crate::validation::error::{FusionError, FusionResult};

/// Where a run currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum FusionState {
    /// Still iterating over the remaining candidates
    Active { candidates: Vec<ContributorId> },
    /// Final ellipse available
    Converged { fused: Ellipse, rejected: Vec<ContributorId> },
    Failed(FusionError),
}

impl FusionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FusionState::Active { .. })
    }
}

/// Summary of how a converged run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStatus {
    /// Every contributor was kept
    Consistent,
    /// Converged after rejecting at least one contributor
    OutliersRejected,
    /// A single contributor was supplied; axes come from its own model
    SingleContributor,
}

/// Contributor removed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedContributor {
    /// Position in the caller's input slice
    pub index: ContributorId,
    pub ellipse: Ellipse,
    pub reason: OutlierReason,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionOutcome {
    pub fused: Ellipse,
    /// Rejected contributors in removal order
    pub rejected: Vec<RejectedContributor>,
    pub status: FusionStatus,
    /// Number of removal-and-refuse iterations
    pub iterations: usize,
    /// 1-sigma chi-square of the surviving contributors
    pub chi2: f64,
    /// Factor applied by the altitude spread check (1.0 when disabled)
    pub altitude_factor: f64,
}

/// Configured fusion pipeline. Stateless between runs and shareable across
/// threads.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
    validator: InputValidator,
    fuser: PositionFuser,
    detector: OutlierDetector,
    estimator: ErrorEllipseEstimator,
    adjuster: AltitudeVarianceAdjuster,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        let builder = PrecisionMatrixBuilder::new(&config);
        Self {
            validator: InputValidator::default(),
            detector: OutlierDetector::new(&config),
            estimator: ErrorEllipseEstimator::new(*builder.transform()),
            fuser: PositionFuser::new(builder),
            adjuster: AltitudeVarianceAdjuster::default(),
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Validate the configuration and inputs, then copy the inputs into a
    /// new step-wise run
    pub fn start(&self, ellipses: &[Ellipse]) -> FusionResult<FusionRun<'_>> {
        self.config
            .validate()
            .map_err(|e| FusionError::InvalidConfig { reason: e.to_string() })?;
        self.validator.validate_all(ellipses)?;
        Ok(FusionRun::new(self, ellipses.to_vec()))
    }

    /// Run to completion
    pub fn run(&self, ellipses: &[Ellipse]) -> FusionResult<FusionOutcome> {
        let result = self.start(ellipses).and_then(FusionRun::finish);
        match &result {
            Ok(outcome) => info!(
                contributors = ellipses.len(),
                rejected = outcome.rejected.len(),
                iterations = outcome.iterations,
                lat = outcome.fused.lat,
                lon = outcome.fused.lon,
                sma = outcome.fused.sma,
                smi = outcome.fused.smi,
                "fusion converged"
            ),
            Err(e) => warn!(contributors = ellipses.len(), error = %e, "fusion failed"),
        }
        result
    }

    /// Fuse independent groups in parallel. Groups may share ellipses; each
    /// run keeps its own precision memo.
    pub fn run_batch(&self, groups: &[Vec<Ellipse>]) -> Vec<FusionResult<FusionOutcome>> {
        groups.par_iter().map(|group| self.run(group)).collect()
    }
}

/// One fusion run, advanced with [`FusionRun::step`]
#[derive(Debug)]
pub struct FusionRun<'e> {
    engine: &'e FusionEngine,
    arena: Vec<Ellipse>,
    cache: PrecisionCache,
    state: FusionState,
    rejected: Vec<RejectedContributor>,
    iterations: usize,
    chi2: f64,
    altitude_factor: f64,
}

impl<'e> FusionRun<'e> {
    fn new(engine: &'e FusionEngine, arena: Vec<Ellipse>) -> Self {
        let candidates = (0..arena.len()).collect();
        Self {
            engine,
            cache: PrecisionCache::with_capacity(arena.len()),
            arena,
            state: FusionState::Active { candidates },
            rejected: Vec::new(),
            iterations: 0,
            chi2: 0.0,
            altitude_factor: 1.0,
        }
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn rejected(&self) -> &[RejectedContributor] {
        &self.rejected
    }

    /// Copy of the inputs this run works on
    pub fn contributors(&self) -> &[Ellipse] {
        &self.arena
    }

    /// Advance by one fuse-and-score pass. Terminal states are left as is.
    pub fn step(&mut self) -> &FusionState {
        if let FusionState::Active { candidates } = &self.state {
            let candidates = candidates.clone();
            self.state = match self.advance(candidates) {
                Ok(next) => next,
                Err(e) => FusionState::Failed(e),
            };
        }
        &self.state
    }

    /// Step until the run converges or fails
    pub fn finish(mut self) -> FusionResult<FusionOutcome> {
        while !self.state.is_terminal() {
            self.step();
        }
        match self.state {
            FusionState::Converged { fused, rejected } => {
                let status = if !rejected.is_empty() {
                    FusionStatus::OutliersRejected
                } else if self.arena.len() == 1 {
                    FusionStatus::SingleContributor
                } else {
                    FusionStatus::Consistent
                };
                Ok(FusionOutcome {
                    fused,
                    rejected: self.rejected,
                    status,
                    iterations: self.iterations,
                    chi2: self.chi2,
                    altitude_factor: self.altitude_factor,
                })
            }
            FusionState::Failed(e) => Err(e),
            FusionState::Active { .. } => Err(FusionError::unstable("fusion loop")),
        }
    }

    fn advance(&mut self, mut candidates: Vec<ContributorId>) -> FusionResult<FusionState> {
        let engine = self.engine;
        let builder = engine.fuser.builder();
        let fused = engine.fuser.fuse(&self.arena, &candidates, &mut self.cache)?;
        let (removed, scan) =
            engine
                .detector
                .remove_outlier(&fused, &self.arena, &mut candidates, &mut self.cache, builder)?;

        if let (Some(id), Some((_, reason))) = (removed, scan.outlier) {
            self.rejected.push(RejectedContributor {
                index: id,
                ellipse: self.arena[id].clone(),
                reason,
            });
            if candidates.is_empty() {
                // Nothing usable remains once sub-floor ellipses are excluded
                if reason == OutlierReason::DegenerateEllipse {
                    return Err(FusionError::InsufficientInput { available: 0, required: 1 });
                }
                return Err(FusionError::AllRejected { rejected: self.rejected.len() });
            }
            self.iterations += 1;
            debug!(
                iteration = self.iterations,
                rejected = %self.arena[id].display_name(),
                remaining = candidates.len(),
                max_norm = scan.max_norm,
                "contributor rejected"
            );
            return Ok(FusionState::Active { candidates });
        }

        let (mut ellipse, diagnostics) = engine.estimator.estimate(&fused, &self.arena, &scan.residuals)?;
        self.chi2 = diagnostics.chi2_one_sigma;
        if engine.config.adjust_altitude_spread {
            self.altitude_factor = engine
                .adjuster
                .adjust(&mut ellipse, self.arena.iter().map(|contributor| contributor.alt));
        }

        Ok(FusionState::Converged {
            fused: ellipse,
            rejected: self.rejected.iter().map(|r| r.index).collect(),
        })
    }
}
