//! Backend dispatch for the dense linear algebra primitives.
//!
//! The chain layer always reshapes a component into a matrix before calling
//! into this module, so SVD and QR on 2D slices are the only operations the
//! backend has to provide.

use crate::error::{Result, TtError};
use mdarray::{DSlice, DTensor};
use mdarray_linalg::qr::QR;
use mdarray_linalg::svd::{SVDDecomp, SVD};
use mdarray_linalg_faer::Faer;

/// Compute an SVD decomposition of `a`.
///
/// The singular values are returned in the first row of `s`
/// (LAPACK-style convention of mdarray-linalg).
pub(crate) fn svd_backend<T>(a: &mut DSlice<T, 2>) -> Result<SVDDecomp<T>>
where
    T: num_complex::ComplexFloat
        + faer_traits::ComplexField
        + Default
        + From<<T as num_complex::ComplexFloat>::Real>
        + 'static,
    <T as num_complex::ComplexFloat>::Real: Into<f64>,
{
    let bd = Faer;
    bd.svd(a).map_err(|e| TtError::NumericFailure {
        message: format!("SVD failed to converge: {e}"),
    })
}

/// Compute a full QR decomposition of `a`.
///
/// Returns `(Q, R)` with `Q` of shape m x m and `R` of shape m x n; callers
/// slice out the thin factors.
pub(crate) fn qr_backend<T>(a: &mut DSlice<T, 2>) -> (DTensor<T, 2>, DTensor<T, 2>)
where
    T: num_complex::ComplexFloat
        + faer_traits::ComplexField
        + Default
        + From<<T as num_complex::ComplexFloat>::Real>
        + 'static,
    <T as num_complex::ComplexFloat>::Real: Into<f64>,
{
    let bd = Faer;
    bd.qr(a)
}
