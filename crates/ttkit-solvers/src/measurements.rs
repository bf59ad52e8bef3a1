//! Single-point measurement sets for fitting solvers.

use crate::error::{Result, SolverError};
use rand::Rng;
use std::collections::BTreeSet;
use ttkit_tensortrain::{MultiIndex, TTScalar, TtTensor};

/// A set of single-point measurements: index tuples with measured values.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSet<T: TTScalar> {
    pub positions: Vec<MultiIndex>,
    pub values: Vec<T>,
}

impl<T: TTScalar> MeasurementSet<T> {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append one measurement. All tuples must share the same length.
    pub fn add(&mut self, position: MultiIndex, value: T) -> Result<()> {
        if let Some(first) = self.positions.first() {
            if first.len() != position.len() {
                return Err(SolverError::dimension_mismatch(format!(
                    "measurement tuple has length {}, expected {}",
                    position.len(),
                    first.len()
                )));
            }
        }
        self.positions.push(position);
        self.values.push(value);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Length of the measured index tuples.
    pub fn degree(&self) -> usize {
        self.positions.first().map_or(0, Vec::len)
    }

    /// Euclidean norm of the measured values.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|v| v.abs_sq())
            .sum::<f64>()
            .sqrt()
    }

    /// Draw `count` distinct random positions with zero values.
    pub fn random<R: Rng + ?Sized>(dims: &[usize], count: usize, rng: &mut R) -> Result<Self> {
        let total: usize = dims.iter().product();
        if count > total {
            return Err(SolverError::invalid_argument(format!(
                "cannot draw {count} distinct positions from a grid of {total}"
            )));
        }

        let mut seen: BTreeSet<MultiIndex> = BTreeSet::new();
        let mut result = Self::new();
        while result.len() < count {
            let pos: MultiIndex = dims.iter().map(|&n| rng.random_range(0..n)).collect();
            if seen.contains(&pos) {
                continue;
            }
            seen.insert(pos.clone());
            result.add(pos, T::zero())?;
        }
        Ok(result)
    }

    /// Sort measurements lexicographically by position tuple.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.positions[a].cmp(&self.positions[b]));
        self.positions = order.iter().map(|&i| self.positions[i].clone()).collect();
        self.values = order.iter().map(|&i| self.values[i]).collect();
    }

    /// Relative residual of a candidate solution over this set.
    pub fn test_solution(&self, solution: &TtTensor<T>) -> Result<f64> {
        if self.degree() != solution.degree() {
            return Err(SolverError::dimension_mismatch(format!(
                "measurement tuples have length {}, tensor has degree {}",
                self.degree(),
                solution.degree()
            )));
        }
        let mut residual_sq = 0.0;
        for (pos, &value) in self.positions.iter().zip(&self.values) {
            let predicted = solution.evaluate(pos).map_err(SolverError::Tensor)?;
            residual_sq += (predicted - value).abs_sq();
        }
        let norm = self.norm();
        if norm == 0.0 {
            return Ok(residual_sq.sqrt());
        }
        Ok(residual_sq.sqrt() / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_add_and_degree() {
        let mut set = MeasurementSet::<f64>::new();
        set.add(vec![0, 1, 2], 1.5).unwrap();
        set.add(vec![2, 1, 0], -0.5).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.degree(), 3);
        assert!((set.norm() - (1.5f64 * 1.5 + 0.25).sqrt()).abs() < 1e-14);

        assert!(set.add(vec![0, 1], 0.0).is_err());
    }

    #[test]
    fn test_random_positions_are_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let set = MeasurementSet::<f64>::random(&[3, 3, 3], 27, &mut rng).unwrap();
        assert_eq!(set.len(), 27);
        let unique: BTreeSet<_> = set.positions.iter().cloned().collect();
        assert_eq!(unique.len(), 27);

        assert!(MeasurementSet::<f64>::random(&[2, 2], 5, &mut rng).is_err());
    }

    #[test]
    fn test_sort_is_lexicographic() {
        let mut set = MeasurementSet::<f64>::new();
        set.add(vec![1, 0], 2.0).unwrap();
        set.add(vec![0, 1], 1.0).unwrap();
        set.add(vec![0, 0], 0.5).unwrap();
        set.sort();
        assert_eq!(set.positions, vec![vec![0, 0], vec![0, 1], vec![1, 0]]);
        assert_eq!(set.values, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_test_solution_on_exact_values() {
        let x = TtTensor::<f64>::ones(&[2, 2]).unwrap();
        let mut set = MeasurementSet::<f64>::new();
        for i in 0..2 {
            for j in 0..2 {
                set.add(vec![i, j], 1.0).unwrap();
            }
        }
        assert!(set.test_solution(&x).unwrap() < 1e-12);
    }
}
