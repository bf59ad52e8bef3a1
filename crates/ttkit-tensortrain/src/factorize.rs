//! Matrix splittings used by canonicalization and rounding.
//!
//! Every core move factorizes one unfolded component into an orthogonal part
//! and a remainder. Without a truncation rule the splitting is a plain QR
//! (exact up to roundoff); with a rule it is a truncated SVD where the kept
//! part of the spectrum is absorbed into the non-orthogonal factor.

use crate::backend::{qr_backend, svd_backend};
use crate::error::Result;
use crate::traits::{SVDScalar, TTScalar};
use crate::types::{conj_transpose, matrix2_zeros, Matrix2};
use mdarray::DSlice;
use num_complex::ComplexFloat;

/// Truncation rule applied to a singular value spectrum.
///
/// Singular values are kept while `s_k >= rel_eps * s_0` and `k < max_rank`;
/// `soft_tau` additionally shrinks every kept value by `max(s - tau, 0)`.
/// With `prevent_zero` the largest singular value never drops below
/// `s_0 * f64::EPSILON`, keeping the tensor non-zero.
#[derive(Debug, Clone)]
pub struct SpectrumRule {
    pub max_rank: usize,
    pub rel_eps: f64,
    pub soft_tau: f64,
    pub prevent_zero: bool,
}

impl SpectrumRule {
    /// Hard truncation at a maximal rank and relative tolerance.
    pub fn hard(max_rank: usize, rel_eps: f64) -> Self {
        Self {
            max_rank,
            rel_eps,
            soft_tau: 0.0,
            prevent_zero: false,
        }
    }

    /// Soft thresholding of the spectrum by `tau`.
    pub fn soft(tau: f64, prevent_zero: bool) -> Self {
        Self {
            max_rank: usize::MAX,
            rel_eps: 0.0,
            soft_tau: tau,
            prevent_zero,
        }
    }

    /// Value of the k-th singular value after thresholding.
    fn adjusted(&self, s: &[f64], k: usize) -> f64 {
        let v = (s[k] - self.soft_tau).max(0.0);
        if self.prevent_zero && k == 0 {
            v.max(s[0] * f64::EPSILON)
        } else {
            v
        }
    }

    /// Number of singular values to keep. Values below the numerical noise
    /// floor are always dropped, so exact rounding still strips rank
    /// deficiency; at least one value is retained so the chain keeps its
    /// structural rank.
    fn rank(&self, s: &[f64]) -> usize {
        let rel_eps = self.rel_eps.max(crate::DEFAULT_TOLERANCE);
        let mut kept = 0;
        for k in 0..s.len() {
            if kept >= self.max_rank {
                break;
            }
            if s[k] < rel_eps * s[0] {
                break;
            }
            if self.adjusted(s, k) <= 0.0 && !(self.prevent_zero && k == 0) {
                break;
            }
            kept += 1;
        }
        kept.max(1)
    }
}

/// Split `m` as `Q * R` with orthonormal columns in `Q`.
///
/// With a truncation rule the splitting is `U * (S' V^H)` instead, where
/// `S'` is the thresholded spectrum.
pub(crate) fn split_left_orthogonal<T: SVDScalar>(
    m: &Matrix2<T>,
    rule: Option<&SpectrumRule>,
) -> Result<(Matrix2<T>, Matrix2<T>)>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    match rule {
        None => {
            let mut a = m.clone();
            let a_slice: &mut DSlice<T, 2> = a.as_mut();
            let (q, r) = qr_backend(a_slice);
            let k = nrows_cols_min(m);
            let q_thin = Matrix2::from_fn([m.dim(0), k], |idx| q[[idx[0], idx[1]]]);
            let r_thin = Matrix2::from_fn([k, m.dim(1)], |idx| r[[idx[0], idx[1]]]);
            Ok((q_thin, r_thin))
        }
        Some(rule) => {
            let (u, s, vt) = truncated_svd(m, rule)?;
            let rank = s.len();
            let mut right = matrix2_zeros(rank, m.dim(1));
            for i in 0..rank {
                let sv = T::from_f64(s[i]);
                for j in 0..m.dim(1) {
                    right[[i, j]] = sv * vt[[i, j]];
                }
            }
            Ok((u, right))
        }
    }
}

/// Split `m` as `L * Q` with orthonormal rows in `Q`.
///
/// With a truncation rule the splitting is `(U S') * V^H` instead.
pub(crate) fn split_right_orthogonal<T: SVDScalar>(
    m: &Matrix2<T>,
    rule: Option<&SpectrumRule>,
) -> Result<(Matrix2<T>, Matrix2<T>)>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    match rule {
        None => {
            // LQ of m via QR of the conjugate transpose.
            let at = conj_transpose(m);
            let (qt, rt) = split_left_orthogonal(&at, None)?;
            Ok((conj_transpose(&rt), conj_transpose(&qt)))
        }
        Some(rule) => {
            let (u, s, vt) = truncated_svd(m, rule)?;
            let rank = s.len();
            let mut left = matrix2_zeros(m.dim(0), rank);
            for i in 0..m.dim(0) {
                for j in 0..rank {
                    left[[i, j]] = u[[i, j]] * T::from_f64(s[j]);
                }
            }
            Ok((left, vt))
        }
    }
}

/// SVD of `m` truncated according to `rule`.
///
/// Returns `(U, s', V^H)` where `U` has `rank` orthonormal columns, `V^H`
/// has `rank` orthonormal rows and `s'` is the kept, thresholded spectrum.
fn truncated_svd<T: SVDScalar>(
    m: &Matrix2<T>,
    rule: &SpectrumRule,
) -> Result<(Matrix2<T>, Vec<f64>, Matrix2<T>)>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    let mut a = m.clone();
    let a_slice: &mut DSlice<T, 2> = a.as_mut();
    let decomp = svd_backend(a_slice)?;

    let min_dim = nrows_cols_min(m);
    let svals: Vec<f64> = (0..min_dim)
        .map(|i| decomp.s[[0, i]].abs().into())
        .collect();

    let rank = rule.rank(&svals);
    let kept: Vec<f64> = (0..rank).map(|k| rule.adjusted(&svals, k)).collect();

    let u = Matrix2::from_fn([m.dim(0), rank], |idx| decomp.u[[idx[0], idx[1]]]);
    let vt = Matrix2::from_fn([rank, m.dim(1)], |idx| decomp.vt[[idx[0], idx[1]]]);
    Ok((u, kept, vt))
}

#[inline]
fn nrows_cols_min<T>(m: &Matrix2<T>) -> usize {
    m.dim(0).min(m.dim(1))
}
