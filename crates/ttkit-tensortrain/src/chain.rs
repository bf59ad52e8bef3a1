//! The component chain shared by tensor and operator variants.
//!
//! A chain is an ordered sequence of components with boundary ranks one and
//! an optional canonical marker. Operator chains fuse their two external
//! axes into one, so every chain-level algorithm is written once; the
//! wrappers in `tensor` and `operator` recover the unfused view where the
//! semantics require it.

use crate::component::Component;
use crate::error::{Result, TtError};
use crate::factorize::{split_left_orthogonal, split_right_orthogonal, SpectrumRule};
use crate::traits::{SVDScalar, TTScalar};
use crate::types::{mat_mul, matrix2_zeros, Matrix2};
use num_complex::ComplexFloat;

#[derive(Debug, Clone)]
pub struct Chain<T: TTScalar> {
    components: Vec<Component<T>>,
    core: Option<usize>,
}

impl<T: TTScalar> Chain<T> {
    /// Build a chain from components, validating boundary and neighbor ranks.
    pub fn new(components: Vec<Component<T>>) -> Result<Self> {
        if let Some(first) = components.first() {
            if first.left_rank() != 1 {
                return Err(TtError::invalid_argument(format!(
                    "first component must have left rank 1, got {}",
                    first.left_rank()
                )));
            }
        }
        if let Some(last) = components.last() {
            if last.right_rank() != 1 {
                return Err(TtError::invalid_argument(format!(
                    "last component must have right rank 1, got {}",
                    last.right_rank()
                )));
            }
        }
        for i in 0..components.len().saturating_sub(1) {
            if components[i].right_rank() != components[i + 1].left_rank() {
                return Err(TtError::dimension_mismatch(format!(
                    "rank mismatch between components {} and {}: {} vs {}",
                    i,
                    i + 1,
                    components[i].right_rank(),
                    components[i + 1].left_rank()
                )));
            }
        }
        Ok(Self {
            components,
            core: None,
        })
    }

    pub(crate) fn from_components_unchecked(components: Vec<Component<T>>) -> Self {
        Self {
            components,
            core: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Fused external dimension of every component.
    pub fn ext_dims(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.ext_dim()).collect()
    }

    #[inline]
    pub fn component(&self, i: usize) -> &Component<T> {
        &self.components[i]
    }

    /// Mutable component access. The canonical marker survives only if the
    /// mutated component is the core.
    pub fn component_mut(&mut self, i: usize) -> &mut Component<T> {
        if self.core != Some(i) {
            self.core = None;
        }
        &mut self.components[i]
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Component<T>] {
        &mut self.components
    }

    /// Replace a component, keeping the surrounding rank structure.
    pub fn set_component(&mut self, i: usize, component: Component<T>) -> Result<()> {
        if i >= self.len() {
            return Err(TtError::invalid_argument(format!(
                "component index {} out of range for chain of length {}",
                i,
                self.len()
            )));
        }
        let expect_left = if i == 0 {
            1
        } else {
            self.components[i - 1].right_rank()
        };
        let expect_right = if i + 1 == self.len() {
            1
        } else {
            self.components[i + 1].left_rank()
        };
        if component.left_rank() != expect_left
            || component.right_rank() != expect_right
            || component.ext_dim() != self.components[i].ext_dim()
        {
            return Err(TtError::dimension_mismatch(format!(
                "component {} must have shape ({}, {}, {}), got ({}, {}, {})",
                i,
                expect_left,
                self.components[i].ext_dim(),
                expect_right,
                component.left_rank(),
                component.ext_dim(),
                component.right_rank()
            )));
        }
        if self.core != Some(i) {
            self.core = None;
        }
        self.components[i] = component;
        Ok(())
    }

    /// The canonical marker: `Some(p)` iff the chain is canonical with core
    /// at position `p`.
    #[inline]
    pub fn core_position(&self) -> Option<usize> {
        self.core
    }

    pub(crate) fn assume_core_position(&mut self, p: usize) {
        self.core = Some(p);
    }

    pub(crate) fn clear_canonical(&mut self) {
        self.core = None;
    }

    /// Ranks along the internal edges (length `len() - 1`).
    pub fn ranks(&self) -> Vec<usize> {
        self.components
            .iter()
            .skip(1)
            .map(|c| c.left_rank())
            .collect()
    }

    pub fn rank(&self, i: usize) -> usize {
        self.components[i + 1].left_rank()
    }

    pub fn num_ranks(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Whether any edge rank exceeds its feasibility bound.
    pub fn exceeds_maximal_ranks(&self) -> bool {
        self.components.iter().any(|c| {
            c.left_rank() > c.ext_dim() * c.right_rank()
                || c.right_rank() > c.ext_dim() * c.left_rank()
        })
    }

    /// Clamp a requested rank tuple to the feasibility bounds implied by the
    /// fused external dimensions.
    pub fn reduce_to_maximal_ranks(mut ranks: Vec<usize>, ext_dims: &[usize]) -> Vec<usize> {
        debug_assert_eq!(ranks.len() + 1, ext_dims.len().max(1));

        let mut curr_max = 1usize;
        for i in 0..ranks.len() {
            curr_max = curr_max.saturating_mul(ext_dims[i]);
            if curr_max < ranks[i] {
                ranks[i] = curr_max;
            } else {
                curr_max = ranks[i];
            }
        }

        let n = ext_dims.len();
        let mut curr_max = 1usize;
        for i in 1..n {
            curr_max = curr_max.saturating_mul(ext_dims[n - i]);
            if curr_max < ranks[n - i - 1] {
                ranks[n - i - 1] = curr_max;
            } else {
                curr_max = ranks[n - i - 1];
            }
        }
        ranks
    }

    /// Debug-only structural check against the stored ranks.
    pub fn require_valid_format(&self) -> Result<()> {
        if let Some(p) = self.core {
            if !self.is_empty() && p >= self.len() {
                return Err(TtError::InvariantViolated {
                    message: format!("core position {} out of range ({})", p, self.len()),
                });
            }
            for (i, c) in self.components.iter().enumerate() {
                if i != p && c.has_factor() {
                    return Err(TtError::InvariantViolated {
                        message: format!("non-core component {i} carries a prefactor"),
                    });
                }
            }
        }
        if let Some(first) = self.components.first() {
            if first.left_rank() != 1 {
                return Err(TtError::InvariantViolated {
                    message: "left boundary rank is not 1".into(),
                });
            }
        }
        if let Some(last) = self.components.last() {
            if last.right_rank() != 1 {
                return Err(TtError::InvariantViolated {
                    message: "right boundary rank is not 1".into(),
                });
            }
        }
        for i in 0..self.len().saturating_sub(1) {
            if self.components[i].right_rank() != self.components[i + 1].left_rank() {
                return Err(TtError::InvariantViolated {
                    message: format!("rank mismatch at edge {i}"),
                });
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn debug_check(&self) {
        #[cfg(debug_assertions)]
        if let Err(e) = self.require_valid_format() {
            panic!("{e}");
        }
    }

    /// Multiply the chain by a scalar. O(1): only one prefactor changes.
    pub fn scale(&mut self, s: T) {
        if self.components.is_empty() {
            return;
        }
        let pos = self.core.unwrap_or(0).min(self.len() - 1);
        self.components[pos].scale(s);
    }

    /// Fold the core prefactor into its data block.
    pub fn fold_core_factor(&mut self) {
        for c in &mut self.components {
            c.fold_factor();
        }
    }

    /// Pointwise evaluation at one fused index per axis.
    pub fn evaluate(&self, indices: &[usize]) -> Result<T> {
        if indices.len() != self.len() {
            return Err(TtError::dimension_mismatch(format!(
                "index tuple length {} does not match chain degree {}",
                indices.len(),
                self.len()
            )));
        }
        if self.is_empty() {
            return Ok(T::one());
        }
        for (i, (&e, c)) in indices.iter().zip(&self.components).enumerate() {
            if e >= c.ext_dim() {
                return Err(TtError::invalid_argument(format!(
                    "index {} out of range at axis {} (dimension {})",
                    e,
                    i,
                    c.ext_dim()
                )));
            }
        }

        let mut current: Vec<T> = {
            let c = &self.components[0];
            (0..c.right_rank()).map(|r| c.get(0, indices[0], r)).collect()
        };
        for (i, &e) in indices.iter().enumerate().skip(1) {
            let c = &self.components[i];
            let mut next = vec![T::zero(); c.right_rank()];
            for (r, slot) in next.iter_mut().enumerate() {
                let mut sum = T::zero();
                for (l, &cur) in current.iter().enumerate() {
                    sum = sum + cur * c.get(l, e, r);
                }
                *slot = sum;
            }
            current = next;
        }
        Ok(current[0])
    }

    /// Hermitian inner product `<self|other>`, conjugating `self`.
    pub fn dot(&self, other: &Self) -> Result<T> {
        if self.len() != other.len() || self.ext_dims() != other.ext_dims() {
            return Err(TtError::dimension_mismatch(format!(
                "inner product requires equal external dimensions ({:?} vs {:?})",
                self.ext_dims(),
                other.ext_dims()
            )));
        }
        Ok(self.dot_unchecked(other))
    }

    pub(crate) fn dot_unchecked(&self, other: &Self) -> T {
        if self.is_empty() {
            return T::zero();
        }

        let a0 = &self.components[0];
        let b0 = &other.components[0];
        let mut env: Matrix2<T> = matrix2_zeros(a0.right_rank(), b0.right_rank());
        for e in 0..a0.ext_dim() {
            for ra in 0..a0.right_rank() {
                for rb in 0..b0.right_rank() {
                    env[[ra, rb]] = env[[ra, rb]] + a0.get(0, e, ra).conj() * b0.get(0, e, rb);
                }
            }
        }

        for i in 1..self.len() {
            let a = &self.components[i];
            let b = &other.components[i];
            let mut next: Matrix2<T> = matrix2_zeros(a.right_rank(), b.right_rank());
            for la in 0..a.left_rank() {
                for lb in 0..b.left_rank() {
                    let env_val = env[[la, lb]];
                    if env_val == T::zero() {
                        continue;
                    }
                    for e in 0..a.ext_dim() {
                        for ra in 0..a.right_rank() {
                            let av = a.get(la, e, ra).conj();
                            if av == T::zero() {
                                continue;
                            }
                            for rb in 0..b.right_rank() {
                                next[[ra, rb]] =
                                    next[[ra, rb]] + env_val * av * b.get(lb, e, rb);
                            }
                        }
                    }
                }
            }
            env = next;
        }
        env[[0, 0]]
    }

    pub fn norm_squared(&self) -> f64 {
        if let Some(p) = self.core {
            if self.is_empty() {
                return 0.0;
            }
            let n = self.components[p].frob_norm();
            return n * n;
        }
        self.dot_unchecked(self).abs_val()
    }

    /// Frobenius norm. For canonical chains this is just the core norm.
    pub fn frob_norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }
}

impl<T: SVDScalar> Chain<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Make component `i` left-orthogonal and absorb the remainder into
    /// `i + 1`, moving the core one step right.
    pub(crate) fn transfer_core_right(
        &mut self,
        i: usize,
        rule: Option<&SpectrumRule>,
    ) -> Result<()> {
        debug_assert!(i + 1 < self.len());
        let ext = self.components[i].ext_dim();
        let m = self.components[i].left_unfolding();
        let (q, r) = split_left_orthogonal(&m, rule)?;
        self.components[i].set_from_left_unfolding(&q, ext);

        let next_ext = self.components[i + 1].ext_dim();
        let next = self.components[i + 1].right_unfolding();
        let absorbed = mat_mul(&r, &next);
        self.components[i + 1].set_from_right_unfolding(&absorbed, next_ext);
        Ok(())
    }

    /// Make component `i` right-orthogonal and absorb the remainder into
    /// `i - 1`, moving the core one step left.
    pub(crate) fn transfer_core_left(
        &mut self,
        i: usize,
        rule: Option<&SpectrumRule>,
    ) -> Result<()> {
        debug_assert!(i > 0 && i < self.len());
        let ext = self.components[i].ext_dim();
        let m = self.components[i].right_unfolding();
        let (l, q) = split_right_orthogonal(&m, rule)?;
        self.components[i].set_from_right_unfolding(&q, ext);

        let prev_ext = self.components[i - 1].ext_dim();
        let prev = self.components[i - 1].left_unfolding();
        let absorbed = mat_mul(&prev, &l);
        self.components[i - 1].set_from_left_unfolding(&absorbed, prev_ext);
        Ok(())
    }

    /// Move the core to `target` by successive single-step transfers.
    ///
    /// With `keep_rank` the moves are plain QR transfers; otherwise
    /// numerically zero singular directions are dropped along the way.
    /// Whenever a rank exceeds its feasibility bound an extra corrective
    /// sweep to the opposite end and back reduces all ranks to their
    /// feasible maxima.
    pub fn move_core(&mut self, target: usize, keep_rank: bool) -> Result<()> {
        if self.is_empty() {
            if target != 0 {
                return Err(TtError::invalid_argument(
                    "core position out of range for degree-zero chain",
                ));
            }
            self.core = Some(0);
            return Ok(());
        }
        if target >= self.len() {
            return Err(TtError::invalid_argument(format!(
                "core position {} out of range for chain of length {}",
                target,
                self.len()
            )));
        }

        let rule = if keep_rank {
            None
        } else {
            Some(SpectrumRule::hard(usize::MAX, f64::EPSILON))
        };
        let rule = rule.as_ref();

        match self.core {
            Some(pos) => {
                for n in pos..target {
                    self.transfer_core_right(n, rule)?;
                }
                for n in (target + 1..=pos).rev() {
                    self.transfer_core_left(n, rule)?;
                }
            }
            None => {
                for n in 0..target {
                    self.transfer_core_right(n, rule)?;
                }
                for n in (target + 1..self.len()).rev() {
                    self.transfer_core_left(n, rule)?;
                }
            }
        }

        while self.exceeds_maximal_ranks() {
            for n in (1..=target).rev() {
                self.transfer_core_left(n, rule)?;
            }
            for n in 0..self.len() - 1 {
                self.transfer_core_right(n, rule)?;
            }
            for n in (target + 1..self.len()).rev() {
                self.transfer_core_left(n, rule)?;
            }
        }

        self.core = Some(target);
        self.debug_check();
        Ok(())
    }

    /// Move the core to the first component.
    pub fn canonicalize_left(&mut self) -> Result<()> {
        self.move_core(0, true)
    }

    /// Move the core to the last component.
    pub fn canonicalize_right(&mut self) -> Result<()> {
        let target = self.len().saturating_sub(1);
        self.move_core(target, true)
    }
}
