//! Joint chain — block generator over (service phase × clients served).
//!
//! Purpose
//! -------
//! Lift a fitted [`PhaseTypeModel`] to the transient Markov chain that
//! tracks, from the decision epoch onward, both the phase of the client in
//! service and how many clients have completed service. The generator `Sn`
//! has `N + 1` diagonal blocks, one per completion count, each equal to `S`.
//! A service completion moves the chain one block to the right and restarts
//! service according to `alpha`, except for the very first completion, where
//! the residual distribution `alpha_start` applies.
//!
//! Key behaviors
//! -------------
//! - [`assemble_chain`] builds `Sn` and its dense inverse once per request.
//! - Because `Sn` is block upper-triangular, every leading principal
//!   `d × d` block of `Sn⁻¹` is the inverse of the matching leading block of
//!   `Sn`. The cost evaluator relies on this to reuse one inverse for every
//!   stage.
//!
//! Invariants & assumptions
//! ------------------------
//! - `horizon >= 1`; the chain dimension is `(horizon + 1) · m`.
//! - The inverse is checked through its residual; a failed check is reported
//!   as `NumericalInstability { stage: Invert, .. }`.
use crate::scheduling::{
    core::{linalg::checked_inverse, phase_type::PhaseTypeModel},
    errors::{ScheduleError, ScheduleResult, Stage},
};
use ndarray::{Array1, Array2, ArrayView2, s};
use tracing::debug;

/// Largest dense chain dimension `(horizon + 1) · m` that will be assembled.
pub const MAX_CHAIN_DIM: usize = 2048;

/// Joint generator `Sn` over a scheduling horizon together with its inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct JointChain {
    sn: Array2<f64>,
    sn_inv: Array2<f64>,
    phases: usize,
    horizon: usize,
}

impl JointChain {
    /// The generator `Sn`.
    pub fn sn(&self) -> &Array2<f64> {
        &self.sn
    }

    /// The dense inverse `Sn⁻¹`.
    pub fn sn_inv(&self) -> &Array2<f64> {
        &self.sn_inv
    }

    /// Phases `m` per block.
    pub fn phases(&self) -> usize {
        self.phases
    }

    /// Scheduling horizon `N`.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Full dimension `(N + 1) · m`.
    pub fn dim(&self) -> usize {
        self.sn.nrows()
    }

    /// Leading `dim × dim` block of `Sn`.
    pub fn generator_block(&self, dim: usize) -> ArrayView2<'_, f64> {
        self.sn.slice(s![..dim, ..dim])
    }

    /// Leading `dim × dim` block of `Sn⁻¹`, equal to the inverse of
    /// [`generator_block`](Self::generator_block).
    pub fn inverse_block(&self, dim: usize) -> ArrayView2<'_, f64> {
        self.sn_inv.slice(s![..dim, ..dim])
    }
}

/// Build `Sn` for `horizon` future clients and invert it.
///
/// # Errors
/// - `InvalidParameter { name: "horizon", .. }` if `horizon == 0` or if
///   `(horizon + 1) · m` exceeds [`MAX_CHAIN_DIM`].
/// - `NumericalInstability { stage: Invert, .. }` if the inversion fails its
///   residual check.
///
/// # Example
/// ```rust
/// use adaptive_schedule::scheduling::core::{
///     chain::assemble_chain, phase_type::fit_service_distribution,
/// };
///
/// let model = fit_service_distribution(1.0, 2.0, 0.0)?;
/// let chain = assemble_chain(&model, 3)?;
/// assert_eq!(chain.dim(), 8);
/// # Ok::<(), adaptive_schedule::scheduling::errors::ScheduleError>(())
/// ```
pub fn assemble_chain(model: &PhaseTypeModel, horizon: usize) -> ScheduleResult<JointChain> {
    if horizon == 0 {
        return Err(ScheduleError::InvalidParameter {
            name: "horizon",
            value: 0.0,
            reason: "must be at least 1",
        });
    }
    let m = model.phases();
    let dim = match horizon.checked_add(1).and_then(|blocks| blocks.checked_mul(m)) {
        Some(dim) if dim <= MAX_CHAIN_DIM => dim,
        _ => {
            return Err(ScheduleError::InvalidParameter {
                name: "horizon",
                value: horizon as f64,
                reason: "chain dimension (horizon + 1) x phases exceeds the dense limit",
            });
        }
    };
    let exit = model.exit_rates();
    let b_start = outer(&exit, model.alpha_start());
    let b = outer(&exit, model.alpha());

    let mut sn = Array2::<f64>::zeros((dim, dim));
    for block in 0..=horizon {
        let at = block * m;
        sn.slice_mut(s![at..at + m, at..at + m]).assign(model.s());
        if block < horizon {
            let next = at + m;
            let coupling = if block == 0 { &b_start } else { &b };
            sn.slice_mut(s![at..at + m, next..next + m]).assign(coupling);
        }
    }
    if sn.iter().any(|v| !v.is_finite()) {
        return Err(ScheduleError::unstable(Stage::Assemble, "generator has non-finite entries"));
    }

    let sn_inv = checked_inverse(sn.view())?;
    debug!(horizon, phases = m, dim, "assembled joint chain");
    Ok(JointChain { sn, sn_inv, phases: m, horizon })
}

// ---- Helper Methods ----

fn outer(col: &Array1<f64>, row: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((col.len(), row.len()), |(i, j)| col[i] * row[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::core::{linalg::checked_inverse, phase_type::fit_service_distribution};
    use ndarray::Axis;

    #[test]
    // Purpose
    // -------
    // Block layout: S on the diagonal, B_start on (0,1), B elsewhere above.
    fn block_layout_places_start_coupling_only_once() {
        // Arrange
        let model = fit_service_distribution(1.0, 2.0, 1.0).unwrap();
        let m = model.phases();

        // Act
        let chain = assemble_chain(&model, 3).unwrap();

        // Assert
        let sn = chain.sn();
        assert_eq!(chain.dim(), 4 * m);
        for block in 0..4 {
            let at = block * m;
            assert_eq!(sn.slice(s![at..at + m, at..at + m]), model.s().view());
        }
        let exit = model.exit_rates();
        let b01 = sn.slice(s![0..m, m..2 * m]);
        let b12 = sn.slice(s![m..2 * m, 2 * m..3 * m]);
        for i in 0..m {
            for j in 0..m {
                assert!((b01[[i, j]] - exit[i] * model.alpha_start()[j]).abs() < 1e-15);
                assert!((b12[[i, j]] - exit[i] * model.alpha()[j]).abs() < 1e-15);
            }
        }
        assert!(sn.slice(s![0..m, 2 * m..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    // Purpose
    // -------
    // Rows of Sn conserve the rate mass of S except in the last block,
    // where completions leave the chain.
    fn interior_rows_sum_to_zero() {
        let model = fit_service_distribution(1.0, 0.4, 0.3).unwrap();
        let chain = assemble_chain(&model, 2).unwrap();
        let m = chain.phases();
        let row_sums = chain.sn().sum_axis(Axis(1));
        for r in 0..2 * m {
            assert!(row_sums[r].abs() < 1e-12, "row {r}: {}", row_sums[r]);
        }
    }

    #[test]
    // Purpose
    // -------
    // Leading blocks of Sn⁻¹ invert the leading blocks of Sn.
    fn leading_inverse_blocks_match_direct_inversion() {
        let model = fit_service_distribution(1.0, 0.6, 0.5).unwrap();
        let chain = assemble_chain(&model, 4).unwrap();
        for stage in 1..=4 {
            let d = stage * chain.phases();
            let direct = checked_inverse(chain.generator_block(d)).unwrap();
            let shared = chain.inverse_block(d);
            for (x, y) in direct.iter().zip(shared.iter()) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Oversized chains are refused before the dense generator is allocated.
    fn oversized_chain_is_rejected_before_allocation() {
        // Arrange: 101 phases, so 2048 / 101 = 20 blocks fit.
        let model = fit_service_distribution(1.0, 0.01, 0.0).unwrap();
        assert_eq!(model.phases(), 101);

        // Act / Assert
        for horizon in [20, 5_000, usize::MAX] {
            assert!(
                matches!(
                    assemble_chain(&model, horizon),
                    Err(ScheduleError::InvalidParameter { name: "horizon", .. })
                ),
                "horizon {horizon}"
            );
        }
        let small = fit_service_distribution(1.0, 1.0, 0.0).unwrap();
        assert_eq!(assemble_chain(&small, 7).unwrap().dim(), 8);
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let model = fit_service_distribution(1.0, 1.0, 0.0).unwrap();
        assert!(matches!(
            assemble_chain(&model, 0),
            Err(ScheduleError::InvalidParameter { name: "horizon", .. })
        ));
    }
}
