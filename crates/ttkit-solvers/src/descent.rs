//! Steepest descent and geometric conjugate gradients on the manifold of
//! tensor trains with fixed rank structure.
//!
//! Every step computes the residual `r = b - A x`, picks a direction and a
//! step length, and retracts the updated point back onto the manifold. The
//! retraction is pluggable.

use crate::error::{Result, SolverError};
use crate::perfdata::PerformanceData;
use log::debug;
use num_complex::ComplexFloat;
use ttkit_tensortrain::{types::matrix2_zeros, Matrix2, SVDScalar, TTScalar, TtOperator, TtTensor};

/// How the HOSVD retraction truncates after the additive step.
#[derive(Debug, Clone, Copy)]
pub enum HosvdMode {
    Rank(usize),
    Epsilon(f64),
}

/// Maps a point and a step back onto the fixed-rank manifold.
pub enum Retraction<T: SVDScalar>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Add, then round to a fixed rank or tolerance.
    Hosvd(HosvdMode),
    /// Add, then one rank-preserving truncation sweep at the old ranks.
    Submanifold,
    /// Add, then one alternating-least-squares half-sweep fitting the sum
    /// at the old rank structure.
    Als,
    /// Caller-supplied retraction `(x, step) -> x'` mutating `x` in place.
    #[allow(clippy::type_complexity)]
    Custom(Box<dyn Fn(&mut TtTensor<T>, &TtTensor<T>) -> Result<()> + Send + Sync>),
}

impl<T: SVDScalar> std::fmt::Debug for Retraction<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retraction::Hosvd(mode) => write!(f, "Hosvd({mode:?})"),
            Retraction::Submanifold => write!(f, "Submanifold"),
            Retraction::Als => write!(f, "Als"),
            Retraction::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl<T: SVDScalar> Retraction<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    pub fn apply(&self, x: &mut TtTensor<T>, step: &TtTensor<T>) -> Result<()> {
        match self {
            Retraction::Hosvd(HosvdMode::Rank(rank)) => {
                x.add_assign(step)?;
                x.round_rank(*rank)?;
                Ok(())
            }
            Retraction::Hosvd(HosvdMode::Epsilon(eps)) => {
                x.add_assign(step)?;
                x.round_eps(*eps)?;
                Ok(())
            }
            Retraction::Submanifold => {
                let ranks = x.ranks();
                x.add_assign(step)?;
                x.round(&ranks, 0.0)?;
                Ok(())
            }
            Retraction::Als => als_retraction(x, step),
            Retraction::Custom(f) => f(x, step),
        }
    }
}

/// One ALS half-sweep fitting `x + step` at the rank structure of `x`.
///
/// The iterate is kept canonical while sweeping left to right; with the
/// off-core components orthogonal, the locally optimal core is the target
/// contracted with the left and right fit environments.
fn als_retraction<T: SVDScalar>(x: &mut TtTensor<T>, step: &TtTensor<T>) -> Result<()>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    let target = {
        let mut t = x.clone();
        t.add_assign(step)?;
        t
    };
    let degree = x.degree();

    x.canonicalize_left()?;
    x.component_mut(0).fold_factor();

    // Right fit environments R[p] between the iterate and the target,
    // contracted over components p..degree.
    let mut right_envs: Vec<Matrix2<T>> = vec![matrix2_zeros(1, 1); degree + 1];
    right_envs[degree][[0, 0]] = T::one();
    for p in (1..degree).rev() {
        let y = x.component(p);
        let z = target.component(p);
        let next = &right_envs[p + 1];
        let mut env = matrix2_zeros(y.left_rank(), z.left_rank());
        for ly in 0..y.left_rank() {
            for lz in 0..z.left_rank() {
                let mut sum = T::zero();
                for e in 0..y.ext_dim() {
                    for ry in 0..y.right_rank() {
                        let yv = TTScalar::conj(y.get(ly, e, ry));
                        if yv == T::zero() {
                            continue;
                        }
                        for rz in 0..z.right_rank() {
                            sum = sum + yv * z.get(lz, e, rz) * next[[ry, rz]];
                        }
                    }
                }
                env[[ly, lz]] = sum;
            }
        }
        right_envs[p] = env;
    }

    let mut left_env: Matrix2<T> = matrix2_zeros(1, 1);
    left_env[[0, 0]] = T::one();

    for p in 0..degree {
        let z = target.component(p);
        let (lr, ext, rr) = {
            let y = x.component(p);
            (y.left_rank(), y.ext_dim(), y.right_rank())
        };

        // Locally optimal core: left_env * Z_p * right_env.
        let right_env = &right_envs[p + 1];
        let mut core = ttkit_tensortrain::types::tensor3_zeros::<T>(lr, ext, rr);
        for ly in 0..lr {
            for e in 0..ext {
                for ry in 0..rr {
                    let mut sum = T::zero();
                    for lz in 0..z.left_rank() {
                        let le = left_env[[ly, lz]];
                        if le == T::zero() {
                            continue;
                        }
                        for rz in 0..z.right_rank() {
                            sum = sum + le * z.get(lz, e, rz) * right_env[[ry, rz]];
                        }
                    }
                    core[[ly, e, ry]] = sum;
                }
            }
        }
        x.set_component(p, ttkit_tensortrain::Component::new(core))?;

        if p + 1 < degree {
            x.move_core(p + 1, true)?;

            // Extend the left environment with the orthogonalized component.
            let y = x.component(p);
            let mut env = matrix2_zeros(y.right_rank(), z.right_rank());
            for ry in 0..y.right_rank() {
                for rz in 0..z.right_rank() {
                    let mut sum = T::zero();
                    for ly in 0..y.left_rank() {
                        for lz in 0..z.left_rank() {
                            let le = left_env[[ly, lz]];
                            if le == T::zero() {
                                continue;
                            }
                            for e in 0..y.ext_dim() {
                                sum = sum + TTScalar::conj(y.get(ly, e, ry)) * le * z.get(lz, e, rz);
                            }
                        }
                    }
                    env[[ry, rz]] = sum;
                }
            }
            left_env = env;
        }
    }

    Ok(())
}

/// Steepest descent for `A x = b` on the fixed-rank manifold.
///
/// Without an operator the problem is the projection `min |x - b|`.
pub struct SteepestDescent<T: SVDScalar>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Maximum number of descent steps.
    pub max_steps: usize,
    /// Terminate once the residual shrinks by less than this relative
    /// amount in one step.
    pub convergence_epsilon: f64,
    /// Caller asserts that `A` is self-adjoint positive definite; the
    /// residual then doubles as the search direction.
    pub assume_spd: bool,
    pub retraction: Retraction<T>,
    pub verbosity: usize,
}

impl<T: SVDScalar> Default for SteepestDescent<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    fn default() -> Self {
        Self {
            max_steps: 100,
            convergence_epsilon: 1e-8,
            assume_spd: false,
            retraction: Retraction::Submanifold,
            verbosity: 0,
        }
    }
}

impl<T: SVDScalar> SteepestDescent<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Solve `A x = b` (or project onto `b` without an operator).
    ///
    /// Returns the final residual norm `|A x - b|`.
    pub fn solve(
        &self,
        a: Option<&TtOperator<T>>,
        x: &mut TtTensor<T>,
        b: &TtTensor<T>,
        perf: &mut PerformanceData,
    ) -> Result<f64> {
        check_system(a, x, b)?;

        let transposed = match a {
            Some(op) if !self.assume_spd => Some(op.transposed()),
            _ => None,
        };

        let mut last_residual = f64::INFINITY;
        let mut residual = f64::INFINITY;

        for step in 0..self.max_steps {
            let ax = match a {
                Some(op) => op.apply(x)?,
                None => x.clone(),
            };
            let r = (b - &ax)?;

            residual = r.frob_norm();
            perf.add_at(step, residual, &x.ranks(), 0);
            if self.verbosity > 0 {
                println!("step = {step}, residual = {residual:.3e}");
            }
            if residual / last_residual > 1.0 - self.convergence_epsilon {
                debug!("residual stalled at {residual:.3e} after {step} steps");
                break;
            }
            last_residual = residual;

            let (direction, alpha) = match a {
                None => (r.clone(), T::one()),
                Some(op) if self.assume_spd => {
                    let ar = op.apply(&r)?;
                    let num = r.dot(&r)?;
                    let den = r.dot(&ar)?;
                    if den == T::zero() {
                        break;
                    }
                    (r.clone(), num / den)
                }
                Some(op) => {
                    let d = transposed
                        .as_ref()
                        .map(|at| at.apply(&r))
                        .transpose()?
                        .unwrap_or_else(|| r.clone());
                    let ad = op.apply(&d)?;
                    let num = r.dot(&ad)?;
                    let den = ad.dot(&ad)?;
                    if den == T::zero() {
                        break;
                    }
                    (d, num / den)
                }
            };

            let change = direction.scaled(alpha);
            self.retraction.apply(x, &change)?;
        }

        Ok(residual)
    }
}

/// Formula for the conjugation coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BetaMethod {
    #[default]
    FletcherReeves,
    PolakRibiere,
}

/// Geometric conjugate gradients: the previous direction is transported by
/// re-expressing it at the new iterate's rank structure.
pub struct GeometricCg<T: SVDScalar>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    pub max_steps: usize,
    pub convergence_epsilon: f64,
    pub assume_spd: bool,
    pub beta_method: BetaMethod,
    pub retraction: Retraction<T>,
    pub verbosity: usize,
}

impl<T: SVDScalar> Default for GeometricCg<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    fn default() -> Self {
        Self {
            max_steps: 100,
            convergence_epsilon: 1e-8,
            assume_spd: false,
            beta_method: BetaMethod::default(),
            retraction: Retraction::Submanifold,
            verbosity: 0,
        }
    }
}

impl<T: SVDScalar> GeometricCg<T>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    /// Solve `A x = b` with conjugate directions.
    pub fn solve(
        &self,
        a: &TtOperator<T>,
        x: &mut TtTensor<T>,
        b: &TtTensor<T>,
        perf: &mut PerformanceData,
    ) -> Result<f64> {
        check_system(Some(a), x, b)?;

        let transposed = if self.assume_spd {
            None
        } else {
            Some(a.transposed())
        };

        let mut last_residual = f64::INFINITY;
        let mut residual = f64::INFINITY;
        let mut prev_gradient: Option<TtTensor<T>> = None;
        let mut prev_direction: Option<TtTensor<T>> = None;

        for step in 0..self.max_steps {
            let ax = a.apply(x)?;
            let r = (b - &ax)?;

            residual = r.frob_norm();
            perf.add_at(step, residual, &x.ranks(), 0);
            if self.verbosity > 0 {
                println!("step = {step}, residual = {residual:.3e}");
            }
            if residual / last_residual > 1.0 - self.convergence_epsilon {
                break;
            }
            last_residual = residual;

            let gradient = match &transposed {
                Some(at) => at.apply(&r)?,
                None => r.clone(),
            };

            let gg = gradient.dot(&gradient)?;
            let direction = match (&prev_gradient, &prev_direction) {
                (Some(pg), Some(pd)) => {
                    let beta = match self.beta_method {
                        BetaMethod::FletcherReeves => gg / pg.dot(pg)?,
                        BetaMethod::PolakRibiere => {
                            (gg - gradient.dot(pg)?) / pg.dot(pg)?
                        }
                    };
                    // Transport the previous direction by rounding the
                    // combination back to the iterate's rank structure.
                    let mut d = (&gradient + &pd.scaled(beta))?;
                    d.round(&x.ranks(), 0.0)?;
                    d
                }
                _ => gradient.clone(),
            };

            let ad = a.apply(&direction)?;
            let (num, den) = if self.assume_spd {
                (r.dot(&direction)?, direction.dot(&ad)?)
            } else {
                (r.dot(&ad)?, ad.dot(&ad)?)
            };
            if den == T::zero() {
                break;
            }
            let alpha = num / den;

            let change = direction.scaled(alpha);
            self.retraction.apply(x, &change)?;

            prev_gradient = Some(gradient);
            prev_direction = Some(direction);
        }

        Ok(residual)
    }
}

fn check_system<T: SVDScalar>(
    a: Option<&TtOperator<T>>,
    x: &TtTensor<T>,
    b: &TtTensor<T>,
) -> Result<()>
where
    <T as ComplexFloat>::Real: Into<f64>,
{
    if let Some(op) = a {
        if op.col_dims() != x.dims() {
            return Err(SolverError::dimension_mismatch(format!(
                "operator column dimensions {:?} do not match iterate dimensions {:?}",
                op.col_dims(),
                x.dims()
            )));
        }
        if op.row_dims() != b.dims() {
            return Err(SolverError::dimension_mismatch(format!(
                "operator row dimensions {:?} do not match right-hand side {:?}",
                op.row_dims(),
                b.dims()
            )));
        }
    } else if x.dims() != b.dims() {
        return Err(SolverError::dimension_mismatch(format!(
            "iterate dimensions {:?} do not match right-hand side {:?}",
            x.dims(),
            b.dims()
        )));
    }
    Ok(())
}
