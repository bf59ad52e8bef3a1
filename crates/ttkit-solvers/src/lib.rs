//! Measurement fitting and Riemannian descent solvers for tensor trains.
//!
//! - [`Adf`]: alternating direction fitting of a chain to point
//!   measurements, with shared forward/backward evaluation stacks.
//! - [`SteepestDescent`] / [`GeometricCg`]: gradient methods for
//!   `A x = b` on the manifold of chains with fixed rank structure, with a
//!   pluggable [`Retraction`].
//! - [`PerformanceData`]: per-iteration progress records with text-file
//!   export and convergence-rate histograms.
//!
//! # Example
//!
//! ```no_run
//! use ttkit_solvers::{Adf, MeasurementSet, PerformanceData};
//! use ttkit_tensortrain::TtTensor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut measurements = MeasurementSet::<f64>::new();
//! measurements.add(vec![0, 1, 2], 0.5)?;
//! measurements.add(vec![2, 1, 0], -1.0)?;
//!
//! let mut rng = rand::rng();
//! let mut x = TtTensor::<f64>::random(&[3, 3, 3], &[2, 2], &mut rng)?;
//!
//! let solver = Adf::default();
//! let residual = solver.solve(&mut x, &measurements, &mut PerformanceData::inactive())?;
//! println!("fitted to relative residual {residual:e}");
//! # Ok(())
//! # }
//! ```

pub mod adf;
pub mod descent;
pub mod error;
pub mod measurements;
pub mod perfdata;

pub use adf::Adf;
pub use descent::{BetaMethod, GeometricCg, HosvdMode, Retraction, SteepestDescent};
pub use error::{Result, SolverError};
pub use measurements::MeasurementSet;
pub use perfdata::{DataPoint, Histogram, PerformanceData};
