//! A single chain component: an order-3 dense block with a scalar prefactor.

use crate::traits::TTScalar;
use crate::types::{matrix2_zeros, tensor3_zeros, Matrix2, Tensor3};

/// One component of a tensor-train chain.
///
/// The data has shape `(left_rank, ext_dim, right_rank)`; for operator
/// chains the two external axes are fused into `ext_dim = n * m` with the
/// row index major. The prefactor scales the whole block and allows O(1)
/// scalar multiplication of a canonical chain.
#[derive(Debug, Clone)]
pub struct Component<T: TTScalar> {
    data: Tensor3<T>,
    factor: T,
}

impl<T: TTScalar> Component<T> {
    pub fn new(data: Tensor3<T>) -> Self {
        Self {
            data,
            factor: T::one(),
        }
    }

    pub fn zeros(left_rank: usize, ext_dim: usize, right_rank: usize) -> Self {
        Self::new(tensor3_zeros(left_rank, ext_dim, right_rank))
    }

    #[inline]
    pub fn left_rank(&self) -> usize {
        self.data.dim(0)
    }

    #[inline]
    pub fn ext_dim(&self) -> usize {
        self.data.dim(1)
    }

    #[inline]
    pub fn right_rank(&self) -> usize {
        self.data.dim(2)
    }

    #[inline]
    pub fn factor(&self) -> T {
        self.factor
    }

    #[inline]
    pub fn has_factor(&self) -> bool {
        self.factor != T::one()
    }

    pub fn scale(&mut self, s: T) {
        self.factor = self.factor * s;
    }

    /// Raw data block, without the prefactor applied.
    #[inline]
    pub fn data(&self) -> &Tensor3<T> {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Tensor3<T> {
        &mut self.data
    }

    /// Entry with the prefactor applied.
    #[inline]
    pub fn get(&self, l: usize, e: usize, r: usize) -> T {
        self.factor * self.data[[l, e, r]]
    }

    /// Multiply the prefactor into the data, leaving a unit factor.
    pub fn fold_factor(&mut self) {
        if !self.has_factor() {
            return;
        }
        let f = self.factor;
        for l in 0..self.left_rank() {
            for e in 0..self.ext_dim() {
                for r in 0..self.right_rank() {
                    self.data[[l, e, r]] = f * self.data[[l, e, r]];
                }
            }
        }
        self.factor = T::one();
    }

    /// Frobenius norm of the component, prefactor included.
    pub fn frob_norm(&self) -> f64 {
        let mut sum = 0.0;
        for l in 0..self.left_rank() {
            for e in 0..self.ext_dim() {
                for r in 0..self.right_rank() {
                    sum += self.data[[l, e, r]].abs_sq();
                }
            }
        }
        sum.sqrt() * self.factor.abs_val()
    }

    /// The fixed-external-index slab as a `(left_rank, right_rank)` matrix,
    /// prefactor included.
    pub fn slab(&self, e: usize) -> Matrix2<T> {
        let mut m = matrix2_zeros(self.left_rank(), self.right_rank());
        for l in 0..self.left_rank() {
            for r in 0..self.right_rank() {
                m[[l, r]] = self.factor * self.data[[l, e, r]];
            }
        }
        m
    }

    /// Left unfolding `(left_rank * ext_dim, right_rank)`, prefactor included.
    pub fn left_unfolding(&self) -> Matrix2<T> {
        let (lr, ed, rr) = (self.left_rank(), self.ext_dim(), self.right_rank());
        let mut m = matrix2_zeros(lr * ed, rr);
        for l in 0..lr {
            for e in 0..ed {
                for r in 0..rr {
                    m[[l * ed + e, r]] = self.factor * self.data[[l, e, r]];
                }
            }
        }
        m
    }

    /// Right unfolding `(left_rank, ext_dim * right_rank)`, prefactor included.
    pub fn right_unfolding(&self) -> Matrix2<T> {
        let (lr, ed, rr) = (self.left_rank(), self.ext_dim(), self.right_rank());
        let mut m = matrix2_zeros(lr, ed * rr);
        for l in 0..lr {
            for e in 0..ed {
                for r in 0..rr {
                    m[[l, e * rr + r]] = self.factor * self.data[[l, e, r]];
                }
            }
        }
        m
    }

    /// Rebuild the data from a left unfolding; the factor resets to one.
    pub fn set_from_left_unfolding(&mut self, m: &Matrix2<T>, ext_dim: usize) {
        let rows = m.dim(0);
        debug_assert_eq!(rows % ext_dim, 0);
        let left_rank = rows / ext_dim;
        let right_rank = m.dim(1);
        self.data = Tensor3::from_fn([left_rank, ext_dim, right_rank], |idx| {
            m[[idx[0] * ext_dim + idx[1], idx[2]]]
        });
        self.factor = T::one();
    }

    /// Rebuild the data from a right unfolding; the factor resets to one.
    pub fn set_from_right_unfolding(&mut self, m: &Matrix2<T>, ext_dim: usize) {
        let left_rank = m.dim(0);
        let cols = m.dim(1);
        debug_assert_eq!(cols % ext_dim, 0);
        let right_rank = cols / ext_dim;
        self.data = Tensor3::from_fn([left_rank, ext_dim, right_rank], |idx| {
            m[[idx[0], idx[1] * right_rank + idx[2]]]
        });
        self.factor = T::one();
    }

    /// Whether the left unfolding has orthonormal columns.
    pub fn is_left_orthogonal(&self, tol: f64) -> bool {
        let m = self.left_unfolding();
        gram_is_identity(&m, true, tol)
    }

    /// Whether the right unfolding has orthonormal rows.
    pub fn is_right_orthogonal(&self, tol: f64) -> bool {
        let m = self.right_unfolding();
        gram_is_identity(&m, false, tol)
    }
}

fn gram_is_identity<T: TTScalar>(m: &Matrix2<T>, columns: bool, tol: f64) -> bool {
    let k = if columns { m.dim(1) } else { m.dim(0) };
    let inner = if columns { m.dim(0) } else { m.dim(1) };
    for a in 0..k {
        for b in 0..k {
            let mut dot = T::zero();
            for i in 0..inner {
                let (x, y) = if columns {
                    (m[[i, a]], m[[i, b]])
                } else {
                    (m[[a, i]], m[[b, i]])
                };
                dot = dot + x.conj() * y;
            }
            let expect = if a == b { 1.0 } else { 0.0 };
            if ((dot - T::from_f64(expect)).abs_sq()).sqrt() > tol {
                return false;
            }
        }
    }
    true
}
