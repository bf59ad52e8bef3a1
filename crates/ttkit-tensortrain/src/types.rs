//! Core array types for tensor-train components.

use crate::traits::TTScalar;
use mdarray::DTensor;

/// Local index type (index within a single external axis).
pub type LocalIndex = usize;

/// Multi-index type (indices across all external axes).
pub type MultiIndex = Vec<LocalIndex>;

/// A 3D tensor represented using mdarray.
/// Shape is (left_rank, ext_dim, right_rank).
pub type Tensor3<T> = DTensor<T, 3>;

/// A 2D matrix using mdarray.
pub type Matrix2<T> = DTensor<T, 2>;

/// Create a zero-filled Tensor3.
pub fn tensor3_zeros<T: Clone + Default>(
    left_rank: usize,
    ext_dim: usize,
    right_rank: usize,
) -> Tensor3<T> {
    Tensor3::from_elem([left_rank, ext_dim, right_rank], T::default())
}

/// Create a Tensor3 from flat data (row-major order).
pub fn tensor3_from_data<T: Clone>(
    data: Vec<T>,
    left_rank: usize,
    ext_dim: usize,
    right_rank: usize,
) -> Tensor3<T> {
    assert_eq!(data.len(), left_rank * ext_dim * right_rank);
    Tensor3::from_fn([left_rank, ext_dim, right_rank], |idx| {
        data[(idx[0] * ext_dim + idx[1]) * right_rank + idx[2]].clone()
    })
}

/// Create a zero-filled 2D matrix.
#[inline]
pub fn matrix2_zeros<T: Clone + Default>(rows: usize, cols: usize) -> Matrix2<T> {
    Matrix2::from_elem([rows, cols], T::default())
}

/// Number of rows of a matrix.
#[inline]
pub fn nrows<T>(m: &Matrix2<T>) -> usize {
    m.dim(0)
}

/// Number of columns of a matrix.
#[inline]
pub fn ncols<T>(m: &Matrix2<T>) -> usize {
    m.dim(1)
}

/// Dense matrix product `a * b`.
pub fn mat_mul<T: TTScalar>(a: &Matrix2<T>, b: &Matrix2<T>) -> Matrix2<T> {
    let (m, k) = (a.dim(0), a.dim(1));
    let n = b.dim(1);
    assert_eq!(k, b.dim(0), "inner dimensions must agree");

    let mut out = matrix2_zeros(m, n);
    for i in 0..m {
        for l in 0..k {
            let av = a[[i, l]];
            for j in 0..n {
                out[[i, j]] = out[[i, j]] + av * b[[l, j]];
            }
        }
    }
    out
}

/// Conjugate transpose of a matrix.
pub fn conj_transpose<T: TTScalar>(m: &Matrix2<T>) -> Matrix2<T> {
    Matrix2::from_fn([m.dim(1), m.dim(0)], |idx| m[[idx[1], idx[0]]].conj())
}
