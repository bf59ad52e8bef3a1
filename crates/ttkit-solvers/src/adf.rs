//! Alternating direction fitting: fit a tensor train to point measurements.
//!
//! One sweep moves the core left to right. At each core position the value
//! at measurement `k` factors as `L_k * C[j_k] * R_k`, where the forward
//! stack `L_k` contracts the components left of the core at the measured
//! indices and the backward stack `R_k` the components right of it.
//! Measurements sharing a position prefix share one forward stack entry,
//! measurements sharing a suffix one backward entry; the sharing maps are
//! computed once and only entries marked for update are recomputed during
//! the sweeps.

use crate::error::{Result, SolverError};
use crate::measurements::MeasurementSet;
use crate::perfdata::PerformanceData;
use log::debug;
use num_complex::ComplexFloat;
use ttkit_tensortrain::{types::matrix2_zeros, Matrix2, SVDScalar, TTScalar, TtTensor};

/// The alternating direction fitting solver.
#[derive(Debug, Clone)]
pub struct Adf {
    /// Maximum number of full sweeps.
    pub max_iterations: usize,
    /// Terminate once the relative residual drops below this value.
    pub convergence_epsilon: f64,
    /// A sweep counts as stagnant when the residual shrinks by less than
    /// this relative amount.
    pub stagnation_threshold: f64,
    /// Terminate after this many consecutive stagnant sweeps.
    pub stagnation_limit: usize,
    pub verbosity: usize,
}

impl Default for Adf {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_epsilon: 1e-8,
            stagnation_threshold: 1e-3,
            stagnation_limit: 3,
            verbosity: 0,
        }
    }
}

/// Shared-stack bookkeeping for one sweep direction.
struct StackMap<T> {
    /// Entry index per (level, measurement).
    index: Vec<Vec<usize>>,
    /// Whether the (level, measurement) pair owns its entry and has to
    /// recompute it.
    update: Vec<Vec<bool>>,
    /// Iteration order in which every owned entry precedes its sharers.
    order: Vec<usize>,
    /// Storage per level; shared measurements point at the same slot.
    entries: Vec<Vec<Vec<T>>>,
}

fn build_map<T: TTScalar>(
    positions: &[Vec<usize>],
    order: &[usize],
    degree: usize,
    forward: bool,
) -> StackMap<T> {
    let m_count = positions.len();
    let mut index = vec![vec![0usize; m_count]; degree];
    let mut update = vec![vec![false; m_count]; degree];
    let mut entries: Vec<Vec<Vec<T>>> = vec![Vec::new(); degree];

    let levels: Vec<usize> = if forward {
        (0..degree.saturating_sub(1)).collect()
    } else {
        (1..degree).collect()
    };

    for &level in &levels {
        let mut count = 0usize;
        for (i, &m) in order.iter().enumerate() {
            let shared = i > 0 && {
                let prev = order[i - 1];
                if forward {
                    positions[m][..=level] == positions[prev][..=level]
                } else {
                    positions[m][level..] == positions[prev][level..]
                }
            };
            if shared {
                index[level][m] = index[level][order[i - 1]];
            } else {
                index[level][m] = count;
                update[level][m] = true;
                count += 1;
            }
        }
        entries[level] = vec![Vec::new(); count];
    }

    StackMap {
        index,
        update,
        order: order.to_vec(),
        entries,
    }
}

impl Adf {
    /// Fit `x` to the measurements, minimizing the squared point residual.
    ///
    /// The rank structure of `x` is preserved. Returns the final relative
    /// residual; on error the iterate is left in its last valid state.
    pub fn solve<T>(
        &self,
        x: &mut TtTensor<T>,
        measurements: &MeasurementSet<T>,
        perf: &mut PerformanceData,
    ) -> Result<f64>
    where
        T: SVDScalar,
        <T as ComplexFloat>::Real: Into<f64>,
    {
        let degree = x.degree();
        let m_count = measurements.len();

        if m_count == 0 {
            return Err(SolverError::invalid_argument(
                "need at least one measurement",
            ));
        }
        if measurements.degree() != degree {
            return Err(SolverError::dimension_mismatch(format!(
                "measurement tuples have length {}, tensor has degree {}",
                measurements.degree(),
                degree
            )));
        }
        for pos in &measurements.positions {
            for (axis, (&i, &n)) in pos.iter().zip(x.dims()).enumerate() {
                if i >= n {
                    return Err(SolverError::invalid_argument(format!(
                        "measured index {i} out of range at axis {axis} (dimension {n})"
                    )));
                }
            }
        }
        if degree < 2 {
            return Err(SolverError::invalid_argument(
                "fitting needs a chain of degree at least two",
            ));
        }

        let norm_values = measurements.norm();
        if norm_values == 0.0 {
            return Err(SolverError::invalid_argument(
                "all measured values are zero",
            ));
        }

        let positions = &measurements.positions;

        let mut lex_order: Vec<usize> = (0..m_count).collect();
        lex_order.sort_by(|&a, &b| positions[a].cmp(&positions[b]));
        let mut suffix_order: Vec<usize> = (0..m_count).collect();
        suffix_order.sort_by(|&a, &b| positions[a].iter().rev().cmp(positions[b].iter().rev()));

        let mut forward: StackMap<T> = build_map(positions, &lex_order, degree, true);
        let mut backward: StackMap<T> = build_map(positions, &suffix_order, degree, false);
        debug!(
            "fitting {} measurements: {} forward and {} backward stack entries",
            m_count,
            forward.entries.iter().map(Vec::len).sum::<usize>(),
            backward.entries.iter().map(Vec::len).sum::<usize>()
        );

        x.canonicalize_left()?;
        x.component_mut(0).fold_factor();

        let mut residual = 1.0f64;
        let mut stagnant = 0usize;
        let mut diffs: Vec<T> = vec![T::zero(); m_count];

        for iteration in 0..self.max_iterations {
            x.move_core(0, true)?;

            rebuild_backward(x, positions, &mut backward);

            for core in 0..degree {
                update_core(x, measurements, &forward, &backward, core, &mut diffs);

                if core + 1 < degree {
                    x.move_core(core + 1, true)?;
                    extend_forward(x, positions, &mut forward, core);
                }
            }

            let last_residual = residual;
            residual = diffs.iter().map(|d| d.abs_sq()).sum::<f64>().sqrt() / norm_values;

            if residual / last_residual > 1.0 - self.stagnation_threshold {
                stagnant += 1;
            } else {
                stagnant = 0;
            }

            perf.add_at(iteration, residual, &x.ranks(), 0);
            if self.verbosity > 0 {
                println!(
                    "sweep = {}, residual = {:.3e}, change = {:.5}",
                    iteration,
                    residual,
                    residual / last_residual
                );
            }

            if residual <= self.convergence_epsilon || stagnant > self.stagnation_limit {
                break;
            }
        }

        Ok(residual)
    }
}

/// Recompute every owned backward entry, right to left.
fn rebuild_backward<T>(x: &TtTensor<T>, positions: &[Vec<usize>], backward: &mut StackMap<T>)
where
    T: TTScalar,
{
    let degree = x.degree();
    for level in (1..degree).rev() {
        let comp = x.component(level);
        let (lower, upper) = backward.entries.split_at_mut(level + 1);
        let current = &mut lower[level];

        for &m in &backward.order {
            if !backward.update[level][m] {
                continue;
            }
            let slab = comp.slab(positions[m][level]);
            let mut v = vec![T::zero(); comp.left_rank()];
            for (l, slot) in v.iter_mut().enumerate() {
                let mut sum = T::zero();
                for r in 0..comp.right_rank() {
                    let tail = if level + 1 == degree {
                        T::one()
                    } else {
                        upper[0][backward.index[level + 1][m]][r]
                    };
                    sum = sum + slab[[l, r]] * tail;
                }
                *slot = sum;
            }
            current[backward.index[level][m]] = v;
        }
    }
}

/// Refresh the forward entries of `level` after the core moved past it.
fn extend_forward<T>(x: &TtTensor<T>, positions: &[Vec<usize>], forward: &mut StackMap<T>, level: usize)
where
    T: TTScalar,
{
    let comp = x.component(level);
    let (lower, upper) = forward.entries.split_at_mut(level);

    for &m in &forward.order {
        if !forward.update[level][m] {
            continue;
        }
        let slab = comp.slab(positions[m][level]);
        let mut v = vec![T::zero(); comp.right_rank()];
        for (r, slot) in v.iter_mut().enumerate() {
            let mut sum = T::zero();
            for l in 0..comp.left_rank() {
                let head = if level == 0 {
                    T::one()
                } else {
                    lower[level - 1][forward.index[level - 1][m]][l]
                };
                sum = sum + head * slab[[l, r]];
            }
            *slot = sum;
        }
        upper[0][forward.index[level][m]] = v;
    }
}

/// Per-slab closed-form update of the core component.
fn update_core<T>(
    x: &mut TtTensor<T>,
    measurements: &MeasurementSet<T>,
    forward: &StackMap<T>,
    backward: &StackMap<T>,
    core: usize,
    diffs: &mut [T],
) where
    T: TTScalar,
{
    let degree = x.degree();
    let positions = &measurements.positions;
    let comp = x.component(core);
    let (lr, ext, rr) = (comp.left_rank(), comp.ext_dim(), comp.right_rank());

    let unit = [T::one()];
    let left_of = |m: usize| -> &[T] {
        if core == 0 {
            &unit
        } else {
            &forward.entries[core - 1][forward.index[core - 1][m]]
        }
    };
    let right_of = |m: usize| -> &[T] {
        if core + 1 == degree {
            &unit
        } else {
            &backward.entries[core + 1][backward.index[core + 1][m]]
        }
    };

    // Gradient contribution per external slab.
    let mut deltas: Vec<Matrix2<T>> = (0..ext).map(|_| matrix2_zeros(lr, rr)).collect();
    for m in 0..measurements.len() {
        let j = positions[m][core];
        let (left, right) = (left_of(m), right_of(m));

        let mut value = T::zero();
        for (l, &lv) in left.iter().enumerate() {
            for (r, &rv) in right.iter().enumerate() {
                value = value + lv * comp.get(l, j, r) * rv;
            }
        }
        let diff = measurements.values[m] - value;
        diffs[m] = diff;

        let delta = &mut deltas[j];
        for (l, &lv) in left.iter().enumerate() {
            for (r, &rv) in right.iter().enumerate() {
                delta[[l, r]] = delta[[l, r]] + diff * lv * rv;
            }
        }
    }

    // |P(delta_j)|^2, accumulated over the measurements hitting slab j.
    let mut projected = vec![0.0f64; ext];
    for m in 0..measurements.len() {
        let j = positions[m][core];
        let (left, right) = (left_of(m), right_of(m));
        let delta = &deltas[j];

        let mut proj = T::zero();
        for (l, &lv) in left.iter().enumerate() {
            for (r, &rv) in right.iter().enumerate() {
                proj = proj + lv * delta[[l, r]] * rv;
            }
        }
        projected[j] += proj.abs_sq();
    }

    // Each slab takes its own optimal step |delta|^2 / |P(delta)|^2.
    let data = x.component_mut(core).data_mut();
    for (j, delta) in deltas.iter().enumerate() {
        if projected[j] <= 0.0 {
            continue;
        }
        let delta_sq: f64 = (0..lr)
            .flat_map(|l| (0..rr).map(move |r| (l, r)))
            .map(|(l, r)| delta[[l, r]].abs_sq())
            .sum();
        let step = T::from_f64(delta_sq / projected[j]);
        for l in 0..lr {
            for r in 0..rr {
                data[[l, j, r]] = data[[l, j, r]] + step * delta[[l, r]];
            }
        }
    }
}
