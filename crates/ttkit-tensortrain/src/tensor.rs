//! The tensor-train tensor: one external axis per component.

use crate::chain::Chain;
use crate::component::Component;
use crate::error::{Result, TtError};
use crate::factorize::SpectrumRule;
use crate::traits::{SVDScalar, TTScalar};
use crate::types::{mat_mul, tensor3_from_data, Matrix2, MultiIndex};
use num_complex::ComplexFloat;
use rand::Rng;

/// A tensor in tensor-train representation.
///
/// `T[i_1, ..., i_K] = C_1[:, i_1, :] * C_2[:, i_2, :] * ... * C_K[:, i_K, :]`
/// with boundary ranks one. The chain may carry a canonical marker; see
/// [`TtTensor::move_core`].
#[derive(Debug, Clone)]
pub struct TtTensor<T: TTScalar> {
    chain: Chain<T>,
    dims: Vec<usize>,
}

impl<T: TTScalar> TtTensor<T> {
    /// Build a tensor train from raw components.
    pub fn new(components: Vec<Component<T>>) -> Result<Self> {
        let chain = Chain::new(components)?;
        let dims = chain.ext_dims();
        Ok(Self { chain, dims })
    }

    pub(crate) fn from_chain(chain: Chain<T>) -> Self {
        let dims = chain.ext_dims();
        Self { chain, dims }
    }

    /// Number of external axes.
    #[inline]
    pub fn degree(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
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

    /// Mutable component access; drops the canonical marker unless the
    /// component is the core.
    pub fn component_mut(&mut self, i: usize) -> &mut Component<T> {
        self.chain.component_mut(i)
    }

    pub fn set_component(&mut self, i: usize, component: Component<T>) -> Result<()> {
        self.chain.set_component(i, component)
    }

    pub(crate) fn chain(&self) -> &Chain<T> {
        &self.chain
    }

    pub(crate) fn chain_mut(&mut self) -> &mut Chain<T> {
        &mut self.chain
    }

    pub(crate) fn into_chain(self) -> Chain<T> {
        self.chain
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

    /// Evaluate at one index per axis.
    pub fn evaluate(&self, indices: &[usize]) -> Result<T> {
        self.chain.evaluate(indices)
    }

    /// Hermitian inner product, conjugating `self`.
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

    /// Contract the chain into a dense row-major tensor.
    pub fn to_dense(&self) -> (Vec<T>, Vec<usize>) {
        if self.is_empty() {
            return (Vec::new(), Vec::new());
        }

        // acc is a (rows, rank) matrix over the axes consumed so far.
        let first = self.component(0);
        let mut acc: Matrix2<T> = Matrix2::from_fn([first.ext_dim(), first.right_rank()], |idx| {
            first.get(0, idx[0], idx[1])
        });

        for k in 1..self.degree() {
            let c = self.component(k);
            let unfolded = c.right_unfolding();
            let product = mat_mul(&acc, &unfolded);
            // product columns run over (e, r); rewrap rows as (row * ext + e).
            let rows = acc.dim(0) * c.ext_dim();
            let rank = c.right_rank();
            acc = Matrix2::from_fn([rows, rank], |idx| {
                let row = idx[0] / c.ext_dim();
                let e = idx[0] % c.ext_dim();
                product[[row, e * rank + idx[1]]]
            });
        }

        let size = acc.dim(0);
        let data = (0..size).map(|i| acc[[i, 0]]).collect();
        (data, self.dims.clone())
    }
}

impl<T: SVDScalar> TtTensor<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// The all-ones tensor; every rank is one.
    pub fn ones(dims: &[usize]) -> Result<Self> {
        validate_dims(dims)?;
        let components = dims
            .iter()
            .map(|&n| Component::new(tensor3_from_data(vec![T::one(); n], 1, n, 1)))
            .collect();
        let mut out = Self::new(components)?;
        out.chain.canonicalize_left()?;
        Ok(out)
    }

    /// A tensor train with uniformly distributed entries and the requested
    /// rank tuple (clamped to its feasible maxima), canonicalized left.
    pub fn random<R: Rng + ?Sized>(dims: &[usize], ranks: &[usize], rng: &mut R) -> Result<Self> {
        validate_dims(dims)?;
        validate_ranks(ranks, dims.len())?;
        let ranks = Chain::<T>::reduce_to_maximal_ranks(ranks.to_vec(), dims);

        let mut components = Vec::with_capacity(dims.len());
        for (i, &n) in dims.iter().enumerate() {
            let left = if i == 0 { 1 } else { ranks[i - 1] };
            let right = if i + 1 == dims.len() { 1 } else { ranks[i] };
            let data: Vec<T> = (0..left * n * right)
                .map(|_| T::from_f64(rng.random::<f64>() - 0.5))
                .collect();
            components.push(Component::new(tensor3_from_data(data, left, n, right)));
        }
        let mut out = Self::new(components)?;
        out.chain.canonicalize_left()?;
        Ok(out)
    }

    /// Decompose a dense row-major tensor by recursive truncated SVD.
    ///
    /// The result is canonical with the core at position zero.
    pub fn from_dense(data: &[T], dims: &[usize], max_ranks: &[usize], eps: f64) -> Result<Self> {
        validate_dims(dims)?;
        validate_ranks(max_ranks, dims.len())?;
        if !(0.0..1.0).contains(&eps) {
            return Err(TtError::invalid_argument(format!(
                "tolerance must lie in [0, 1), got {eps}"
            )));
        }
        let size: usize = dims.iter().product();
        if data.len() != size {
            return Err(TtError::dimension_mismatch(format!(
                "dense data has {} entries, dimensions {:?} require {}",
                data.len(),
                dims,
                size
            )));
        }

        let k = dims.len();
        let mut tail: Vec<Component<T>> = Vec::with_capacity(k - 1);

        let mut remainder: Vec<T> = data.to_vec();
        let mut right_rank = 1usize;

        for pos in (1..k).rev() {
            let rows: usize = dims[..pos].iter().product();
            let cols = dims[pos] * right_rank;
            let m = Matrix2::from_fn([rows, cols], |idx| remainder[idx[0] * cols + idx[1]]);

            let rule = SpectrumRule::hard(max_ranks[pos - 1], eps);
            let (l, q) = crate::factorize::split_right_orthogonal(&m, Some(&rule))?;
            let rank = q.dim(0);

            let mut comp = Component::zeros(1, dims[pos], 1);
            comp.set_from_right_unfolding(&q, dims[pos]);
            tail.push(comp);

            remainder = (0..rows * rank)
                .map(|i| l[[i / rank, i % rank]])
                .collect();
            right_rank = rank;
        }

        let mut components = Vec::with_capacity(k);
        components.push(Component::new(tensor3_from_data(
            remainder,
            1,
            dims[0],
            right_rank,
        )));
        components.extend(tail.into_iter().rev());

        let mut chain = Chain::new(components)?;
        chain.assume_core_position(0);
        chain.debug_check();
        Ok(Self::from_chain(chain))
    }

    /// Move the canonical core to `target`; see the chain-level docs for the
    /// feasibility corrective sweeps.
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
        self.chain.add_assign(&other.chain)
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.chain.sub_assign(&other.chain)
    }

    /// Entrywise (Hadamard) product; ranks multiply.
    pub fn entrywise_product(a: &Self, b: &Self) -> Result<Self> {
        Ok(Self::from_chain(a.chain.entrywise_product(&b.chain)?))
    }

    /// Square the tensor entrywise, in place.
    pub fn entrywise_square(&mut self) -> Result<()> {
        let symmetric = self.degree() <= 2;
        self.chain.entrywise_square(symmetric)
    }

    /// Dyadic product: external dimensions concatenate.
    pub fn dyadic_product(lhs: &Self, rhs: &Self) -> Result<Self> {
        Ok(Self::from_chain(Chain::dyadic_product(
            &lhs.chain, &rhs.chain,
        )?))
    }

    /// Flat row-major index of the entry with the largest magnitude.
    ///
    /// `accuracy` in `(0, 1)` trades cost for certainty; with zero the
    /// search only terminates quickly on low-rank chains. Squaring the
    /// tensor entrywise amplifies the gap between the top entries until the
    /// chain collapses to rank one, where the maximum factorizes.
    pub fn find_largest_entry(&self, accuracy: f64, lower_bound: f64) -> Result<usize> {
        if self.is_empty() {
            return Err(TtError::invalid_argument(
                "cannot search a degree-zero tensor",
            ));
        }

        if self.ranks().iter().sum::<usize>() >= self.degree() {
            let alpha = accuracy;
            let degree = self.degree() as f64;

            let mut probe = self.clone();
            probe.round_rank(1)?;
            let first_pos = probe.find_largest_entry(0.0, 0.0)?;
            let mut xn = self.entry_abs(first_pos)?.max(lower_bound);
            let mut tau = (1.0 - alpha) * alpha * xn * xn / (2.0 * (degree - 1.0));

            let mut x = self.clone();
            while x.ranks().iter().sum::<usize>() >= x.degree() {
                x.entrywise_square()?;
                x.soft_threshold_uniform(tau, true)?;

                let mut y = x.clone();
                y.round_rank(1)?;
                let y_max_pos = y.find_largest_entry(0.0, 0.0)?;

                xn = x
                    .entry_abs(y_max_pos)?
                    .max((1.0 - (1.0 - alpha) * alpha / 2.0) * xn * xn);

                let f_norm = x.frob_norm();
                xn /= f_norm;
                x.scale(T::from_f64(1.0 / f_norm));
                tau = (1.0 - alpha) * alpha * xn * xn / (2.0 * (degree - 1.0));
            }
            x.find_largest_entry(0.0, 0.0)
        } else {
            // All ranks are one: the maximum factorizes over the slabs.
            let mut position = 0usize;
            let mut stride: usize = self.dims.iter().product();
            for (c, &n) in self.dims.iter().enumerate() {
                stride /= n;
                let comp = self.component(c);
                let mut max_pos = 0;
                for e in 1..n {
                    if comp.get(0, e, 0).abs_val() > comp.get(0, max_pos, 0).abs_val() {
                        max_pos = e;
                    }
                }
                position += max_pos * stride;
            }
            Ok(position)
        }
    }

    fn entry_abs(&self, flat: usize) -> Result<f64> {
        let indices = unflatten(flat, &self.dims);
        Ok(self.evaluate(&indices)?.abs_val())
    }
}

/// Decompose a flat row-major index into a multi-index.
pub fn unflatten(mut flat: usize, dims: &[usize]) -> MultiIndex {
    let mut indices = vec![0usize; dims.len()];
    for (i, &n) in dims.iter().enumerate().rev() {
        indices[i] = flat % n;
        flat /= n;
    }
    indices
}

fn validate_dims(dims: &[usize]) -> Result<()> {
    if dims.contains(&0) {
        return Err(TtError::invalid_argument(
            "external dimensions must be strictly positive",
        ));
    }
    if dims.is_empty() {
        return Err(TtError::invalid_argument(
            "cannot construct a degree-zero chain from dimensions",
        ));
    }
    Ok(())
}

fn validate_ranks(ranks: &[usize], degree: usize) -> Result<()> {
    if ranks.len() + 1 != degree {
        return Err(TtError::invalid_argument(format!(
            "expected {} ranks for degree {}, got {}",
            degree.saturating_sub(1),
            degree,
            ranks.len()
        )));
    }
    if ranks.contains(&0) {
        return Err(TtError::invalid_argument(
            "ranks must be strictly positive",
        ));
    }
    Ok(())
}

macro_rules! impl_tensor_ops {
    ($ty:ident) => {
        impl<T: SVDScalar> std::ops::Add for &$ty<T>
        where
            <T as ComplexFloat>::Real: Into<f64>,
        {
            type Output = Result<$ty<T>>;

            fn add(self, other: Self) -> Self::Output {
                let mut out = self.clone();
                out.add_assign(other)?;
                Ok(out)
            }
        }

        impl<T: SVDScalar> std::ops::Sub for &$ty<T>
        where
            <T as ComplexFloat>::Real: Into<f64>,
        {
            type Output = Result<$ty<T>>;

            fn sub(self, other: Self) -> Self::Output {
                let mut out = self.clone();
                out.sub_assign(other)?;
                Ok(out)
            }
        }

        impl<T: TTScalar> std::ops::Neg for &$ty<T> {
            type Output = $ty<T>;

            fn neg(self) -> Self::Output {
                self.scaled(-T::one())
            }
        }

        impl<T: TTScalar> std::ops::Mul<T> for &$ty<T> {
            type Output = $ty<T>;

            fn mul(self, s: T) -> Self::Output {
                self.scaled(s)
            }
        }

        impl<T: TTScalar> std::ops::Div<T> for &$ty<T> {
            type Output = $ty<T>;

            fn div(self, s: T) -> Self::Output {
                self.scaled(T::one() / s)
            }
        }
    };
}
pub(crate) use impl_tensor_ops;

impl_tensor_ops!(TtTensor);

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_tensor() -> (Vec<f64>, Vec<usize>) {
        // T[i, j, k] = i + 2j + 4k over dims (2, 2, 2).
        let dims = vec![2, 2, 2];
        let mut data = vec![0.0; 8];
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    data[(i * 2 + j) * 2 + k] = (i + 2 * j + 4 * k) as f64;
                }
            }
        }
        (data, dims)
    }

    #[test]
    fn test_from_dense_ranks_and_roundtrip() {
        let (data, dims) = linear_tensor();
        let tt = TtTensor::from_dense(&data, &dims, &[8, 8], 0.0).unwrap();
        assert_eq!(tt.ranks(), vec![2, 2]);
        assert_eq!(tt.core_position(), Some(0));

        let (back, back_dims) = tt.to_dense();
        assert_eq!(back_dims, dims);
        for (a, b) in data.iter().zip(&back) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn test_evaluate_matches_dense() {
        let (data, dims) = linear_tensor();
        let tt = TtTensor::from_dense(&data, &dims, &[8, 8], 0.0).unwrap();
        for flat in 0..8 {
            let idx = unflatten(flat, &dims);
            let v = tt.evaluate(&idx).unwrap();
            assert!((v - data[flat]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ones_evaluates_to_one() {
        let tt = TtTensor::<f64>::ones(&[3, 3, 3]).unwrap();
        assert_eq!(tt.ranks(), vec![1, 1]);
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    let v = tt.evaluate(&[i, j, k]).unwrap();
                    assert!((v - 1.0).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_move_core_preserves_values_and_orthogonality() {
        let (data, dims) = linear_tensor();
        let mut tt = TtTensor::from_dense(&data, &dims, &[8, 8], 0.0).unwrap();

        tt.move_core(2, true).unwrap();
        assert_eq!(tt.core_position(), Some(2));
        for i in 0..2 {
            assert!(tt.component(i).is_left_orthogonal(1e-10), "component {i}");
        }

        tt.move_core(1, true).unwrap();
        assert!(tt.component(0).is_left_orthogonal(1e-10));
        assert!(tt.component(2).is_right_orthogonal(1e-10));

        let (back, _) = tt.to_dense();
        for (a, b) in data.iter().zip(&back) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_move_core_out_of_range() {
        let tt = TtTensor::<f64>::ones(&[2, 2]).unwrap();
        let mut tt2 = tt.clone();
        assert!(matches!(
            tt2.move_core(5, true),
            Err(TtError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_frob_norm_matches_dot() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let tt = TtTensor::<f64>::random(&[3, 4, 3], &[2, 2], &mut rng).unwrap();

        let via_dot = tt.dot(&tt).unwrap().sqrt();
        assert!((tt.frob_norm() - via_dot).abs() < 1e-10 * via_dot.max(1.0));
    }

    #[test]
    fn test_scale_is_factor_only() {
        let mut tt = TtTensor::<f64>::ones(&[2, 2]).unwrap();
        let norm = tt.frob_norm();
        tt.scale(3.0);
        assert!((tt.frob_norm() - 3.0 * norm).abs() < 1e-12);
        let v = tt.evaluate(&[1, 0]).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_random_respects_feasible_ranks() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        // Requested rank 10 is infeasible at the boundary (max 2 resp. 3).
        let tt = TtTensor::<f64>::random(&[2, 4, 3], &[10, 10], &mut rng).unwrap();
        assert!(tt.rank(0) <= 2);
        assert!(tt.rank(1) <= 3);
    }

    #[test]
    fn test_unflatten_row_major() {
        assert_eq!(unflatten(194, &[5, 5, 5, 5]), vec![1, 2, 3, 4]);
        assert_eq!(unflatten(0, &[3, 3]), vec![0, 0]);
        assert_eq!(unflatten(8, &[3, 3]), vec![2, 2]);
    }

    #[test]
    fn test_find_largest_entry_unit_tensor() {
        let dims = vec![5, 5, 5, 5];
        let mut data = vec![0.0f64; 625];
        data[194] = 1.0; // position (1, 2, 3, 4)
        let tt = TtTensor::from_dense(&data, &dims, &[4, 4, 4], 0.0).unwrap();
        assert_eq!(tt.find_largest_entry(0.0, 0.0).unwrap(), 194);
    }

    #[test]
    fn test_dyadic_product_is_kronecker() {
        let a = TtTensor::<f64>::ones(&[2, 2]).unwrap().scaled(2.0);
        let b = TtTensor::<f64>::ones(&[3]).unwrap().scaled(0.5);
        let d = TtTensor::dyadic_product(&a, &b).unwrap();
        assert_eq!(d.dims(), &[2, 2, 3]);
        let v = d.evaluate(&[1, 0, 2]).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }
}
