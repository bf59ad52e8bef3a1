//! Rank-truncating rounding and soft thresholding.
//!
//! Both operations share the same sweep: canonicalize right, then walk the
//! chain right-to-left splitting each component with a truncated SVD and
//! absorbing the kept spectrum into the left neighbor. The caller's core
//! position is restored afterwards.

use crate::chain::Chain;
use crate::error::{Result, TtError};
use crate::factorize::SpectrumRule;
use crate::traits::SVDScalar;
use num_complex::ComplexFloat;

impl<T: SVDScalar> Chain<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Truncate every edge to `min(max_ranks[i], numerical rank at eps)`.
    ///
    /// Guarantees `|x - x_rounded| <= eps * |x|` in Frobenius norm, or the
    /// requested rank caps, whichever binds first.
    pub fn round(&mut self, max_ranks: &[usize], eps: f64) -> Result<()> {
        if !(0.0..1.0).contains(&eps) {
            return Err(TtError::invalid_argument(format!(
                "rounding tolerance must lie in [0, 1), got {eps}"
            )));
        }
        if max_ranks.len() != self.num_ranks() {
            return Err(TtError::invalid_argument(format!(
                "expected {} rank caps, got {}",
                self.num_ranks(),
                max_ranks.len()
            )));
        }
        if max_ranks.contains(&0) {
            return Err(TtError::invalid_argument(
                "rounding to rank zero is not possible",
            ));
        }

        let rules: Vec<SpectrumRule> = max_ranks
            .iter()
            .map(|&r| SpectrumRule::hard(r, eps))
            .collect();
        self.round_sweep(&rules)
    }

    /// Truncate every edge to a common maximal rank at machine precision.
    pub fn round_rank(&mut self, max_rank: usize) -> Result<()> {
        let caps = vec![max_rank; self.num_ranks()];
        self.round(&caps, crate::DEFAULT_TOLERANCE)
    }

    /// Truncate every edge by relative tolerance only.
    pub fn round_eps(&mut self, eps: f64) -> Result<()> {
        let caps = vec![usize::MAX; self.num_ranks()];
        self.round(&caps, eps)
    }

    /// Replace every singular value by `max(s - tau, 0)` on each edge.
    ///
    /// With `prevent_zero` the largest singular value per edge is kept above
    /// a floor of `s_0 * f64::EPSILON` so the chain never becomes zero.
    pub fn soft_threshold(&mut self, taus: &[f64], prevent_zero: bool) -> Result<()> {
        if taus.len() != self.num_ranks() {
            return Err(TtError::invalid_argument(format!(
                "expected {} thresholds, got {}",
                self.num_ranks(),
                taus.len()
            )));
        }
        let rules: Vec<SpectrumRule> = taus
            .iter()
            .map(|&tau| SpectrumRule::soft(tau, prevent_zero))
            .collect();
        self.round_sweep(&rules)
    }

    /// Soft-threshold all edges by the same `tau`.
    pub fn soft_threshold_uniform(&mut self, tau: f64, prevent_zero: bool) -> Result<()> {
        let taus = vec![tau; self.num_ranks()];
        self.soft_threshold(&taus, prevent_zero)
    }

    fn round_sweep(&mut self, rules: &[SpectrumRule]) -> Result<()> {
        if self.len() <= 1 {
            if !self.is_empty() && self.core_position().is_none() {
                self.assume_core_position(0);
            }
            return Ok(());
        }

        let initial_core = self.core_position();

        self.canonicalize_right()?;
        for i in (1..self.len()).rev() {
            self.transfer_core_left(i, Some(&rules[i - 1]))?;
        }
        self.assume_core_position(0);

        if let Some(p) = initial_core {
            self.move_core(p, true)?;
        }
        self.debug_check();
        Ok(())
    }
}
