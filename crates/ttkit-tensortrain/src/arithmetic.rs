//! Structured arithmetic on component chains.
//!
//! Addition stacks the operands block-diagonally and therefore adds ranks;
//! the entrywise product multiplies them. Neither truncates, a subsequent
//! `round` is the caller's responsibility.

use crate::chain::Chain;
use crate::component::Component;
use crate::error::{Result, TtError};
use crate::traits::{SVDScalar, TTScalar};
use crate::types::{tensor3_zeros, Tensor3};
use num_complex::ComplexFloat;

impl<T: TTScalar> Chain<T> {
    /// Block-diagonal sum structure, before any re-canonicalization.
    ///
    /// Interior components become `[A 0; 0 B]`, the first a horizontal and
    /// the last a vertical stack. Prefactors are absorbed into the copied
    /// data, so every new component carries a unit factor.
    fn add_blocks(&self, other: &Self) -> Result<Vec<Component<T>>> {
        if self.len() != other.len() || self.ext_dims() != other.ext_dims() {
            return Err(TtError::dimension_mismatch(format!(
                "addition requires equal external dimensions ({:?} vs {:?})",
                self.ext_dims(),
                other.ext_dims()
            )));
        }

        let n = self.len();
        let mut components = Vec::with_capacity(n);

        if n == 1 {
            let a = self.component(0);
            let b = other.component(0);
            let ext = a.ext_dim();
            let mut data = tensor3_zeros(1, ext, 1);
            for e in 0..ext {
                data[[0, e, 0]] = a.get(0, e, 0) + b.get(0, e, 0);
            }
            components.push(Component::new(data));
            return Ok(components);
        }

        for i in 0..n {
            let a = self.component(i);
            let b = other.component(i);
            let ext = a.ext_dim();

            let left = if i == 0 {
                1
            } else {
                a.left_rank() + b.left_rank()
            };
            let right = if i == n - 1 {
                1
            } else {
                a.right_rank() + b.right_rank()
            };

            let mut data: Tensor3<T> = tensor3_zeros(left, ext, right);
            let (l_off, r_off) = (
                if i == 0 { 0 } else { a.left_rank() },
                if i == n - 1 { 0 } else { a.right_rank() },
            );

            for l in 0..a.left_rank() {
                for e in 0..ext {
                    for r in 0..a.right_rank() {
                        data[[l, e, r]] = a.get(l, e, r);
                    }
                }
            }
            for l in 0..b.left_rank() {
                for e in 0..ext {
                    for r in 0..b.right_rank() {
                        data[[l_off + l, e, r_off + r]] = b.get(l, e, r);
                    }
                }
            }
            components.push(Component::new(data));
        }
        Ok(components)
    }

    /// Entrywise (Hadamard) product. Ranks multiply.
    pub(crate) fn entrywise_blocks(&self, other: &Self) -> Result<Vec<Component<T>>> {
        if self.len() != other.len() || self.ext_dims() != other.ext_dims() {
            return Err(TtError::dimension_mismatch(format!(
                "entrywise product requires equal external dimensions ({:?} vs {:?})",
                self.ext_dims(),
                other.ext_dims()
            )));
        }

        let mut components = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            let a = self.component(i);
            let b = other.component(i);
            let ext = a.ext_dim();
            let left = a.left_rank() * b.left_rank();
            let right = a.right_rank() * b.right_rank();

            let mut data: Tensor3<T> = tensor3_zeros(left, ext, right);
            for la in 0..a.left_rank() {
                for lb in 0..b.left_rank() {
                    for e in 0..ext {
                        for ra in 0..a.right_rank() {
                            let av = a.get(la, e, ra);
                            if av == T::zero() {
                                continue;
                            }
                            for rb in 0..b.right_rank() {
                                data[[la * b.left_rank() + lb, e, ra * b.right_rank() + rb]] =
                                    av * b.get(lb, e, rb);
                            }
                        }
                    }
                }
            }
            components.push(Component::new(data));
        }
        Ok(components)
    }

    /// Square the chain entrywise, in place.
    ///
    /// With `symmetric_packing` the new edge ranks are `r(r+1)/2` instead of
    /// `r^2`, exploiting the symmetry of the Kronecker square; the packing
    /// is only worthwhile for very short chains.
    pub(crate) fn entrywise_square_blocks(&mut self, symmetric_packing: bool) {
        self.fold_core_factor();

        for idx in 0..self.len() {
            let comp = self.component(idx);
            let (lr, ext, rr) = (comp.left_rank(), comp.ext_dim(), comp.right_rank());

            let new = if symmetric_packing {
                let new_left = lr * (lr + 1) / 2;
                let new_right = rr * (rr + 1) / 2;
                let mut data: Tensor3<T> = tensor3_zeros(new_left, ext, new_right);
                let mut lp = 0;
                for l1 in 0..lr {
                    for l2 in 0..=l1 {
                        for e in 0..ext {
                            let mut rp = 0;
                            for r1 in 0..rr {
                                for r2 in 0..=r1 {
                                    let weight = if r1 == r2 { 1.0 } else { 2.0 };
                                    data[[lp, e, rp]] = T::from_f64(weight)
                                        * comp.get(l1, e, r1)
                                        * comp.get(l2, e, r2);
                                    rp += 1;
                                }
                            }
                        }
                        lp += 1;
                    }
                }
                data
            } else {
                let mut data: Tensor3<T> = tensor3_zeros(lr * lr, ext, rr * rr);
                for l1 in 0..lr {
                    for l2 in 0..lr {
                        for e in 0..ext {
                            for r1 in 0..rr {
                                let v1 = comp.get(l1, e, r1);
                                if v1 == T::zero() {
                                    continue;
                                }
                                for r2 in 0..rr {
                                    data[[l1 * lr + l2, e, r1 * rr + r2]] =
                                        v1 * comp.get(l2, e, r2);
                                }
                            }
                        }
                    }
                }
                data
            };

            self.components_mut()[idx] = Component::new(new);
        }
        self.clear_canonical();
    }

    /// Glue two chains end to end; external dimensions concatenate.
    pub(crate) fn dyadic_blocks(&self, other: &Self) -> Vec<Component<T>> {
        let mut components = Vec::with_capacity(self.len() + other.len());
        components.extend(self.components_cloned());
        components.extend(other.components_cloned());
        components
    }

    fn components_cloned(&self) -> Vec<Component<T>> {
        (0..self.len()).map(|i| self.component(i).clone()).collect()
    }
}

impl<T: SVDScalar> Chain<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// `self += other`. The result is re-canonicalized at the original core
    /// position when `self` was canonical; ranks grow additively.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        let initial_core = self.core_position();
        let components = self.add_blocks(other)?;
        *self = Chain::from_components_unchecked(components);
        if let Some(p) = initial_core {
            self.move_core(p, true)?;
        }
        self.debug_check();
        Ok(())
    }

    /// `self -= other`, defined as `-((-self) + other)`.
    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        if self.len() != other.len() || self.ext_dims() != other.ext_dims() {
            return Err(TtError::dimension_mismatch(format!(
                "subtraction requires equal external dimensions ({:?} vs {:?})",
                self.ext_dims(),
                other.ext_dims()
            )));
        }
        self.scale(-T::one());
        self.add_assign(other)?;
        self.scale(-T::one());
        Ok(())
    }

    /// Entrywise product of two chains, canonicalized like `self`.
    pub fn entrywise_product(&self, other: &Self) -> Result<Self> {
        let mut result = Chain::from_components_unchecked(self.entrywise_blocks(other)?);
        if let Some(p) = self.core_position() {
            result.move_core(p, true)?;
        }
        Ok(result)
    }

    /// Entrywise square, restoring the canonical position afterwards.
    pub fn entrywise_square(&mut self, symmetric_packing: bool) -> Result<()> {
        let initial_core = self.core_position();
        self.entrywise_square_blocks(symmetric_packing);
        if let Some(p) = initial_core {
            self.move_core(p, true)?;
        }
        Ok(())
    }

    /// Dyadic (tensor) product of two chains.
    pub fn dyadic_product(lhs: &Self, rhs: &Self) -> Result<Self> {
        if lhs.is_empty() {
            return Ok(rhs.clone());
        }
        if rhs.is_empty() {
            return Ok(lhs.clone());
        }

        let mut result = Chain::from_components_unchecked(lhs.dyadic_blocks(rhs));
        match (lhs.core_position(), rhs.core_position()) {
            (Some(0), Some(0)) => {
                // The glued right half is right-orthogonal beyond its core,
                // so the combined chain can be walked back to the far left.
                result.assume_core_position(lhs.len());
                result.move_core(0, true)?;
            }
            (Some(lc), Some(rc)) if lc == lhs.len() - 1 && rc == rhs.len() - 1 => {
                result.assume_core_position(lhs.len() - 1);
                result.move_core(lhs.len() + rhs.len() - 1, true)?;
            }
            _ => {}
        }
        result.debug_check();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tensor3_from_data;

    fn chain_from(values: Vec<Vec<f64>>) -> Chain<f64> {
        // Rank-one chain with the given per-axis slabs.
        let components = values
            .into_iter()
            .map(|v| {
                let ext = v.len();
                Component::new(tensor3_from_data(v, 1, ext, 1))
            })
            .collect();
        Chain::new(components).unwrap()
    }

    #[test]
    fn test_add_ranks_and_values() {
        let mut a = chain_from(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![1.0, 1.0]]);
        let b = chain_from(vec![vec![0.5, 1.0], vec![1.0, 2.0], vec![2.0, 0.0]]);

        let expect_00 = a.evaluate(&[0, 1, 0]).unwrap() + b.evaluate(&[0, 1, 0]).unwrap();
        a.add_assign(&b).unwrap();
        assert_eq!(a.ranks(), vec![2, 2]);
        assert!((a.evaluate(&[0, 1, 0]).unwrap() - expect_00).abs() < 1e-12);
    }

    #[test]
    fn test_sub_cancels() {
        let a = chain_from(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut d = a.clone();
        d.sub_assign(&a).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!(d.evaluate(&[i, j]).unwrap().abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_entrywise_product_values() {
        let a = chain_from(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = chain_from(vec![vec![2.0, 0.5], vec![1.0, 2.0]]);
        let h = a.entrywise_product(&b).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expect = a.evaluate(&[i, j]).unwrap() * b.evaluate(&[i, j]).unwrap();
                assert!((h.evaluate(&[i, j]).unwrap() - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_entrywise_square_both_packings() {
        for symmetric in [true, false] {
            let mut c = chain_from(vec![vec![1.0, -2.0], vec![0.5, 3.0]]);
            let before: Vec<f64> = (0..2)
                .flat_map(|i| (0..2).map(move |j| (i, j)))
                .map(|(i, j)| c.evaluate(&[i, j]).unwrap())
                .collect();
            c.entrywise_square(symmetric).unwrap();
            let after: Vec<f64> = (0..2)
                .flat_map(|i| (0..2).map(move |j| (i, j)))
                .map(|(i, j)| c.evaluate(&[i, j]).unwrap())
                .collect();
            for (b, a) in before.iter().zip(&after) {
                assert!((b * b - a).abs() < 1e-12, "packing {symmetric}: {b}^2 vs {a}");
            }
        }
    }

    #[test]
    fn test_dyadic_concatenates() {
        let a = chain_from(vec![vec![1.0, 2.0]]);
        let b = chain_from(vec![vec![3.0, 4.0, 5.0]]);
        let d = Chain::dyadic_product(&a, &b).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.ext_dims(), vec![2, 3]);
        assert!((d.evaluate(&[1, 2]).unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let mut a = chain_from(vec![vec![1.0, 2.0]]);
        let b = chain_from(vec![vec![1.0, 2.0, 3.0]]);
        assert!(matches!(
            a.add_assign(&b),
            Err(TtError::DimensionMismatch { .. })
        ));
    }
}
