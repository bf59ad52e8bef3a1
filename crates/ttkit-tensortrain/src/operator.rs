//! The tensor-train operator: two external axes per component.
//!
//! Components store their row and column axes fused (`ext = i * m + j`), so
//! the chain machinery is shared with the tensor variant; this module owns
//! everything that needs the unfused view.

use crate::chain::Chain;
use crate::component::Component;
use crate::error::{Result, TtError};
use crate::tensor::{impl_tensor_ops, TtTensor};
use crate::traits::{SVDScalar, TTScalar};
use crate::types::{tensor3_from_data, tensor3_zeros, Tensor3};
use num_complex::ComplexFloat;
use rand::Rng;

/// An operator in tensor-train representation.
///
/// `O[(i_1, j_1), ..., (i_K, j_K)] = C_1[:, i_1, j_1, :] * ...` with
/// boundary ranks one. Dense interop uses the interleaved external layout
/// `(n_1, m_1, n_2, m_2, ...)`.
#[derive(Debug, Clone)]
pub struct TtOperator<T: TTScalar> {
    chain: Chain<T>,
    row_dims: Vec<usize>,
    col_dims: Vec<usize>,
}

impl<T: TTScalar> TtOperator<T> {
    /// Build an operator chain from fused components and the unfused
    /// external dimensions.
    pub fn new(
        components: Vec<Component<T>>,
        row_dims: Vec<usize>,
        col_dims: Vec<usize>,
    ) -> Result<Self> {
        if row_dims.len() != col_dims.len() {
            return Err(TtError::invalid_argument(format!(
                "row and column dimension counts differ: {} vs {}",
                row_dims.len(),
                col_dims.len()
            )));
        }
        if components.len() != row_dims.len() {
            return Err(TtError::invalid_argument(format!(
                "{} components given for {} external axis pairs",
                components.len(),
                row_dims.len()
            )));
        }
        for (i, c) in components.iter().enumerate() {
            if c.ext_dim() != row_dims[i] * col_dims[i] {
                return Err(TtError::dimension_mismatch(format!(
                    "component {} has external dimension {}, expected {} * {}",
                    i,
                    c.ext_dim(),
                    row_dims[i],
                    col_dims[i]
                )));
            }
        }
        let chain = Chain::new(components)?;
        Ok(Self {
            chain,
            row_dims,
            col_dims,
        })
    }

    fn from_chain(chain: Chain<T>, row_dims: Vec<usize>, col_dims: Vec<usize>) -> Self {
        Self {
            chain,
            row_dims,
            col_dims,
        }
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.row_dims.len()
    }

    #[inline]
    pub fn row_dims(&self) -> &[usize] {
        &self.row_dims
    }

    #[inline]
    pub fn col_dims(&self) -> &[usize] {
        &self.col_dims
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn ranks(&self) -> Vec<usize> {
        self.chain.ranks()
    }

    pub fn rank(&self, i: usize) -> usize {
        self.chain.rank(i)
    }

    pub fn num_ranks(&self) -> usize {
        self.chain.num_ranks()
    }

    pub fn core_position(&self) -> Option<usize> {
        self.chain.core_position()
    }

    pub fn component(&self, i: usize) -> &Component<T> {
        self.chain.component(i)
    }

    pub fn component_mut(&mut self, i: usize) -> &mut Component<T> {
        self.chain.component_mut(i)
    }

    pub fn set_component(&mut self, i: usize, component: Component<T>) -> Result<()> {
        self.chain.set_component(i, component)
    }

    /// Multiply by a scalar. O(1).
    pub fn scale(&mut self, s: T) {
        self.chain.scale(s);
    }

    pub fn scaled(&self, s: T) -> Self {
        let mut out = self.clone();
        out.scale(s);
        out
    }

    /// Evaluate one matrix entry of the operator.
    pub fn evaluate(&self, rows: &[usize], cols: &[usize]) -> Result<T> {
        if rows.len() != self.degree() || cols.len() != self.degree() {
            return Err(TtError::dimension_mismatch(format!(
                "index tuples must have length {}, got {} and {}",
                self.degree(),
                rows.len(),
                cols.len()
            )));
        }
        for (k, (&i, &j)) in rows.iter().zip(cols).enumerate() {
            if i >= self.row_dims[k] || j >= self.col_dims[k] {
                return Err(TtError::invalid_argument(format!(
                    "operator index ({i}, {j}) out of range at axis {k}"
                )));
            }
        }
        let fused: Vec<usize> = rows
            .iter()
            .zip(cols)
            .zip(&self.col_dims)
            .map(|((&i, &j), &m)| i * m + j)
            .collect();
        self.chain.evaluate(&fused)
    }

    pub fn dot(&self, other: &Self) -> Result<T> {
        self.chain.dot(&other.chain)
    }

    pub fn norm_squared(&self) -> f64 {
        self.chain.norm_squared()
    }

    pub fn frob_norm(&self) -> f64 {
        self.chain.frob_norm()
    }

    pub fn require_valid_format(&self) -> Result<()> {
        self.chain.require_valid_format()
    }

    /// Swap the row and column axes of every component.
    ///
    /// Orthogonality is invariant under the external permutation, so the
    /// canonical marker survives.
    pub fn transposed(&self) -> Self {
        let mut components = Vec::with_capacity(self.degree());
        for k in 0..self.degree() {
            let c = self.component(k);
            let (n, m) = (self.row_dims[k], self.col_dims[k]);
            let mut data: Tensor3<T> =
                tensor3_zeros(c.left_rank(), c.ext_dim(), c.right_rank());
            for l in 0..c.left_rank() {
                for i in 0..n {
                    for j in 0..m {
                        for r in 0..c.right_rank() {
                            data[[l, j * n + i, r]] = c.data()[[l, i * m + j, r]];
                        }
                    }
                }
            }
            let mut comp = Component::new(data);
            comp.scale(c.factor());
            components.push(comp);
        }
        let mut chain = Chain::from_components_unchecked(components);
        if let Some(p) = self.chain.core_position() {
            chain.assume_core_position(p);
        }
        Self::from_chain(chain, self.col_dims.clone(), self.row_dims.clone())
    }

    /// Interleaved dense layout `(n_1, m_1, n_2, m_2, ...)`.
    pub fn to_dense(&self) -> (Vec<T>, Vec<usize>) {
        let (data, _) = TtTensor::from_chain(self.chain.clone()).to_dense();
        let mut dims = Vec::with_capacity(2 * self.degree());
        for k in 0..self.degree() {
            dims.push(self.row_dims[k]);
            dims.push(self.col_dims[k]);
        }
        (data, dims)
    }
}

impl<T: SVDScalar> TtOperator<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// The identity operator. `dims` lists the row dimensions followed by
    /// the column dimensions; every rank is one.
    pub fn identity(dims: &[usize]) -> Result<Self> {
        let (row_dims, col_dims) = split_dims(dims)?;
        let mut components = Vec::with_capacity(row_dims.len());
        for (&n, &m) in row_dims.iter().zip(&col_dims) {
            let mut data: Tensor3<T> = tensor3_zeros(1, n * m, 1);
            for i in 0..n.min(m) {
                data[[0, i * m + i, 0]] = T::one();
            }
            components.push(Component::new(data));
        }
        let mut out = Self::new(components, row_dims, col_dims)?;
        out.chain.canonicalize_left()?;
        Ok(out)
    }

    /// The all-ones operator.
    pub fn ones(dims: &[usize]) -> Result<Self> {
        let (row_dims, col_dims) = split_dims(dims)?;
        let mut components = Vec::with_capacity(row_dims.len());
        for (&n, &m) in row_dims.iter().zip(&col_dims) {
            components.push(Component::new(tensor3_from_data(
                vec![T::one(); n * m],
                1,
                n * m,
                1,
            )));
        }
        let mut out = Self::new(components, row_dims, col_dims)?;
        out.chain.canonicalize_left()?;
        Ok(out)
    }

    /// A random operator with the requested rank tuple, canonicalized left.
    pub fn random<R: Rng + ?Sized>(dims: &[usize], ranks: &[usize], rng: &mut R) -> Result<Self> {
        let (row_dims, col_dims) = split_dims(dims)?;
        let fused: Vec<usize> = row_dims.iter().zip(&col_dims).map(|(&n, &m)| n * m).collect();
        let inner = TtTensor::<T>::random(&fused, ranks, rng)?;
        Ok(Self::from_chain(inner.into_chain(), row_dims, col_dims))
    }

    /// Decompose a dense operator given in interleaved row-major layout
    /// `(n_1, m_1, n_2, m_2, ...)`.
    pub fn from_dense(
        data: &[T],
        dims: &[usize],
        max_ranks: &[usize],
        eps: f64,
    ) -> Result<Self> {
        if dims.len() % 2 != 0 || dims.is_empty() {
            return Err(TtError::invalid_argument(
                "operator needs an even, positive number of external dimensions",
            ));
        }
        let row_dims: Vec<usize> = dims.iter().step_by(2).copied().collect();
        let col_dims: Vec<usize> = dims.iter().skip(1).step_by(2).copied().collect();
        let fused: Vec<usize> = row_dims.iter().zip(&col_dims).map(|(&n, &m)| n * m).collect();

        // The fused row-major layout coincides with the interleaved layout.
        let inner = TtTensor::from_dense(data, &fused, max_ranks, eps)?;
        Ok(Self::from_chain(inner.into_chain(), row_dims, col_dims))
    }

    pub fn move_core(&mut self, target: usize, keep_rank: bool) -> Result<()> {
        self.chain.move_core(target, keep_rank)
    }

    pub fn canonicalize_left(&mut self) -> Result<()> {
        self.chain.canonicalize_left()
    }

    pub fn canonicalize_right(&mut self) -> Result<()> {
        self.chain.canonicalize_right()
    }

    pub fn round(&mut self, max_ranks: &[usize], eps: f64) -> Result<()> {
        self.chain.round(max_ranks, eps)
    }

    pub fn round_rank(&mut self, max_rank: usize) -> Result<()> {
        self.chain.round_rank(max_rank)
    }

    pub fn round_eps(&mut self, eps: f64) -> Result<()> {
        self.chain.round_eps(eps)
    }

    pub fn soft_threshold(&mut self, taus: &[f64], prevent_zero: bool) -> Result<()> {
        self.chain.soft_threshold(taus, prevent_zero)
    }

    pub fn soft_threshold_uniform(&mut self, tau: f64, prevent_zero: bool) -> Result<()> {
        self.chain.soft_threshold_uniform(tau, prevent_zero)
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        if self.row_dims != other.row_dims || self.col_dims != other.col_dims {
            return Err(TtError::dimension_mismatch(
                "operator addition requires equal external dimensions",
            ));
        }
        self.chain.add_assign(&other.chain)
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        if self.row_dims != other.row_dims || self.col_dims != other.col_dims {
            return Err(TtError::dimension_mismatch(
                "operator subtraction requires equal external dimensions",
            ));
        }
        self.scale(-T::one());
        self.add_assign(other)?;
        self.scale(-T::one());
        Ok(())
    }

    /// Entrywise product of two operators.
    pub fn entrywise_product(a: &Self, b: &Self) -> Result<Self> {
        if a.row_dims != b.row_dims || a.col_dims != b.col_dims {
            return Err(TtError::dimension_mismatch(
                "entrywise product requires equal external dimensions",
            ));
        }
        Ok(Self::from_chain(
            a.chain.entrywise_product(&b.chain)?,
            a.row_dims.clone(),
            a.col_dims.clone(),
        ))
    }

    /// Square the operator entrywise, in place.
    pub fn entrywise_square(&mut self) -> Result<()> {
        let symmetric = self.degree() <= 1;
        self.chain.entrywise_square(symmetric)
    }

    /// Dyadic product: row axes of `lhs`, then of `rhs`; columns likewise.
    pub fn dyadic_product(lhs: &Self, rhs: &Self) -> Result<Self> {
        let chain = Chain::dyadic_product(&lhs.chain, &rhs.chain)?;
        let mut row_dims = lhs.row_dims.clone();
        row_dims.extend_from_slice(&rhs.row_dims);
        let mut col_dims = lhs.col_dims.clone();
        col_dims.extend_from_slice(&rhs.col_dims);
        Ok(Self::from_chain(chain, row_dims, col_dims))
    }

    /// Apply the operator to a tensor, materializing the product chain.
    ///
    /// The result is canonicalized at the operand's core position.
    pub fn apply(&self, v: &TtTensor<T>) -> Result<TtTensor<T>> {
        if self.col_dims != v.dims() {
            return Err(TtError::dimension_mismatch(format!(
                "operator column dimensions {:?} do not match tensor dimensions {:?}",
                self.col_dims,
                v.dims()
            )));
        }

        let mut components = Vec::with_capacity(self.degree());
        for k in 0..self.degree() {
            let a = self.component(k);
            let x = v.component(k);
            let (n, m) = (self.row_dims[k], self.col_dims[k]);

            let left = a.left_rank() * x.left_rank();
            let right = a.right_rank() * x.right_rank();
            let mut data: Tensor3<T> = tensor3_zeros(left, n, right);

            for la in 0..a.left_rank() {
                for lx in 0..x.left_rank() {
                    for i in 0..n {
                        for ra in 0..a.right_rank() {
                            for rx in 0..x.right_rank() {
                                let mut sum = T::zero();
                                for j in 0..m {
                                    sum = sum + a.get(la, i * m + j, ra) * x.get(lx, j, rx);
                                }
                                data[[la * x.left_rank() + lx, i, ra * x.right_rank() + rx]] = sum;
                            }
                        }
                    }
                }
            }
            components.push(Component::new(data));
        }

        let mut chain = Chain::from_components_unchecked(components);
        if let Some(p) = v.core_position() {
            chain.move_core(p, true)?;
        }
        Ok(TtTensor::from_chain(chain))
    }

    /// Compose two operators (`self * other`), materializing the product.
    pub fn compose(&self, other: &Self) -> Result<Self> {
        if self.col_dims != other.row_dims {
            return Err(TtError::dimension_mismatch(format!(
                "operator composition requires matching inner dimensions ({:?} vs {:?})",
                self.col_dims, other.row_dims
            )));
        }

        let mut components = Vec::with_capacity(self.degree());
        for k in 0..self.degree() {
            let a = self.component(k);
            let b = other.component(k);
            let (n, inner, m) = (self.row_dims[k], self.col_dims[k], other.col_dims[k]);

            let left = a.left_rank() * b.left_rank();
            let right = a.right_rank() * b.right_rank();
            let mut data: Tensor3<T> = tensor3_zeros(left, n * m, right);

            for la in 0..a.left_rank() {
                for lb in 0..b.left_rank() {
                    for i in 0..n {
                        for j in 0..m {
                            for ra in 0..a.right_rank() {
                                for rb in 0..b.right_rank() {
                                    let mut sum = T::zero();
                                    for c in 0..inner {
                                        sum = sum
                                            + a.get(la, i * inner + c, ra)
                                                * b.get(lb, c * m + j, rb);
                                    }
                                    data[[
                                        la * b.left_rank() + lb,
                                        i * m + j,
                                        ra * b.right_rank() + rb,
                                    ]] = sum;
                                }
                            }
                        }
                    }
                }
            }
            components.push(Component::new(data));
        }

        let mut chain = Chain::from_components_unchecked(components);
        if let Some(p) = other.core_position() {
            chain.move_core(p, true)?;
        }
        Ok(Self::from_chain(
            chain,
            self.row_dims.clone(),
            other.col_dims.clone(),
        ))
    }
}

fn split_dims(dims: &[usize]) -> Result<(Vec<usize>, Vec<usize>)> {
    if dims.len() % 2 != 0 || dims.is_empty() {
        return Err(TtError::invalid_argument(
            "operator needs an even, positive number of external dimensions",
        ));
    }
    if dims.contains(&0) {
        return Err(TtError::invalid_argument(
            "external dimensions must be strictly positive",
        ));
    }
    let half = dims.len() / 2;
    Ok((dims[..half].to_vec(), dims[half..].to_vec()))
}

impl_tensor_ops!(TtOperator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_evaluates_exactly() {
        let id = TtOperator::<f64>::identity(&[3, 3]).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v = id.evaluate(&[i], &[j]).unwrap();
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((v - expect).abs() < 1e-12, "entry ({i}, {j}) = {v}");
            }
        }
    }

    #[test]
    fn test_identity_apply_is_noop() {
        let id = TtOperator::<f64>::identity(&[4, 4, 4, 4]).unwrap();
        let v = TtTensor::<f64>::ones(&[4, 4]).unwrap();
        let w = id.apply(&v).unwrap();
        assert_eq!(w.dims(), &[4, 4]);
        for i in 0..4 {
            for j in 0..4 {
                let got = w.evaluate(&[i, j]).unwrap();
                let expect = v.evaluate(&[i, j]).unwrap();
                assert!((got - expect).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_apply_matches_dense_matvec() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
        let a = TtOperator::<f64>::random(&[2, 3, 2, 3], &[2], &mut rng).unwrap();
        let v = TtTensor::<f64>::random(&[2, 3], &[2], &mut rng).unwrap();
        let w = a.apply(&v).unwrap();

        for i0 in 0..2 {
            for i1 in 0..3 {
                let mut expect = 0.0;
                for j0 in 0..2 {
                    for j1 in 0..3 {
                        expect += a.evaluate(&[i0, i1], &[j0, j1]).unwrap()
                            * v.evaluate(&[j0, j1]).unwrap();
                    }
                }
                let got = w.evaluate(&[i0, i1]).unwrap();
                assert!((got - expect).abs() < 1e-10, "({i0},{i1}): {got} vs {expect}");
            }
        }
    }

    #[test]
    fn test_transpose_swaps_entries() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        let a = TtOperator::<f64>::random(&[2, 3, 3, 2], &[2], &mut rng).unwrap();
        let at = a.transposed();
        assert_eq!(at.row_dims(), &[3, 2]);
        assert_eq!(at.col_dims(), &[2, 3]);
        for i0 in 0..2 {
            for i1 in 0..3 {
                for j0 in 0..3 {
                    for j1 in 0..2 {
                        let lhs = a.evaluate(&[i0, i1], &[j0, j1]).unwrap();
                        let rhs = at.evaluate(&[j0, j1], &[i0, i1]).unwrap();
                        assert!((lhs - rhs).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_compose_with_identity() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(9);
        let a = TtOperator::<f64>::random(&[2, 2, 2, 2], &[3], &mut rng).unwrap();
        let id = TtOperator::<f64>::identity(&[2, 2, 2, 2]).unwrap();
        let prod = a.compose(&id).unwrap();

        for i0 in 0..2 {
            for i1 in 0..2 {
                for j0 in 0..2 {
                    for j1 in 0..2 {
                        let lhs = a.evaluate(&[i0, i1], &[j0, j1]).unwrap();
                        let rhs = prod.evaluate(&[i0, i1], &[j0, j1]).unwrap();
                        assert!((lhs - rhs).abs() < 1e-10);
                    }
                }
            }
        }
    }

    #[test]
    fn test_operator_dense_roundtrip() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(2);
        let a = TtOperator::<f64>::random(&[2, 2, 2, 2], &[2], &mut rng).unwrap();
        let (data, dims) = a.to_dense();
        assert_eq!(dims, vec![2, 2, 2, 2]);

        let b = TtOperator::<f64>::from_dense(&data, &dims, &[4], 0.0).unwrap();
        for i0 in 0..2 {
            for i1 in 0..2 {
                for j0 in 0..2 {
                    for j1 in 0..2 {
                        let lhs = a.evaluate(&[i0, i1], &[j0, j1]).unwrap();
                        let rhs = b.evaluate(&[i0, i1], &[j0, j1]).unwrap();
                        assert!((lhs - rhs).abs() < 1e-10);
                    }
                }
            }
        }
    }
}
