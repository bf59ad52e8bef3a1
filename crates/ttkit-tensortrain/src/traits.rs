//! Scalar traits for tensor-train elements.

use num_complex::ComplexFloat;
use num_traits::{One, Zero};

/// Scalar trait for tensor-train elements.
pub trait TTScalar:
    Clone
    + Copy
    + Zero
    + One
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
    + PartialEq
    + std::fmt::Debug
    + Default
    + Send
    + Sync
    + 'static
{
    /// Complex conjugate.
    fn conj(self) -> Self;

    /// Square of the absolute value (for complex numbers, |z|^2).
    fn abs_sq(self) -> f64;

    /// Absolute value as f64.
    fn abs_val(self) -> f64 {
        self.abs_sq().sqrt()
    }

    /// Create from an f64 value.
    fn from_f64(val: f64) -> Self;
}

impl TTScalar for f64 {
    fn conj(self) -> Self {
        self
    }

    fn abs_sq(self) -> f64 {
        self * self
    }

    fn abs_val(self) -> f64 {
        self.abs()
    }

    fn from_f64(val: f64) -> Self {
        val
    }
}

impl TTScalar for f32 {
    fn conj(self) -> Self {
        self
    }

    fn abs_sq(self) -> f64 {
        f64::from(self) * f64::from(self)
    }

    fn from_f64(val: f64) -> Self {
        val as f32
    }
}

impl TTScalar for num_complex::Complex64 {
    fn conj(self) -> Self {
        num_complex::Complex64::conj(&self)
    }

    fn abs_sq(self) -> f64 {
        self.norm_sqr()
    }

    fn from_f64(val: f64) -> Self {
        num_complex::Complex64::new(val, 0.0)
    }
}

impl TTScalar for num_complex::Complex32 {
    fn conj(self) -> Self {
        num_complex::Complex32::conj(&self)
    }

    fn abs_sq(self) -> f64 {
        f64::from(self.norm_sqr())
    }

    fn from_f64(val: f64) -> Self {
        num_complex::Complex32::new(val as f32, 0.0)
    }
}

/// Trait bounds for scalars that can be fed to the SVD/QR backend.
pub trait SVDScalar:
    TTScalar
    + ComplexFloat
    + faer_traits::ComplexField
    + From<<Self as ComplexFloat>::Real>
    + 'static
where
    <Self as ComplexFloat>::Real: Into<f64>,
{
}

impl<T> SVDScalar for T
where
    T: TTScalar
        + ComplexFloat
        + faer_traits::ComplexField
        + From<<T as ComplexFloat>::Real>
        + 'static,
    <T as ComplexFloat>::Real: Into<f64>,
{
}
