//! SPH smoothing kernels for PBF.
//!
//! Both kernels are evaluated on the displacement `r = p_i - p_j` and a
//! smoothing radius `h`:
//!
//! - Poly6: `W(r, h) = 315 / (64πh⁹) * (h² - |r|²)³` for `|r| <= h`
//! - Spiky gradient: `∇W(r, h) = -45 / (πh⁶) * (h - |r|)² * r̂` for `0 < |r| <= h`
//!
//! Outside the support both return exactly zero, and the spiky gradient of a
//! zero displacement is the zero vector.
//!
//! The kernels are evaluated in normalized form with `q = |r| / h`, as
//! `315 / (64πh³) * (1 - q²)³` and `-45 / (πh⁴) * (1 - q)² * r̂`. The
//! coefficients are computed in `f64` and saturate at `f32::MAX`, so tiny
//! radii stay finite.

use std::f64::consts::PI;

use bevy::prelude::*;

/// Poly6 kernel for density estimation.
#[inline]
pub fn poly6(r: Vec3, h: f32) -> f32 {
    poly6_with_coeff(r.length_squared(), h, poly6_coefficient(h))
}

/// Gradient of the Spiky kernel with respect to the first particle.
#[inline]
pub fn spiky_gradient(r: Vec3, h: f32) -> Vec3 {
    spiky_gradient_with_coeff(r, h, spiky_gradient_coefficient(h))
}

/// Clamp an `f64` magnitude into the finite `f32` range.
#[inline]
fn saturate(value: f64) -> f32 {
    value.clamp(-f64::from(f32::MAX), f64::from(f32::MAX)) as f32
}

/// `315 / (64πh³)`, or zero for a non-positive radius.
#[inline]
pub fn poly6_coefficient(h: f32) -> f32 {
    if !(h > 0.0) {
        return 0.0;
    }
    saturate(315.0 / (64.0 * PI * f64::from(h).powi(3)))
}

/// `-45 / (πh⁴)`, or zero for a non-positive radius.
#[inline]
pub fn spiky_gradient_coefficient(h: f32) -> f32 {
    if !(h > 0.0) {
        return 0.0;
    }
    saturate(-45.0 / (PI * f64::from(h).powi(4)))
}

/// Poly6 kernel with precomputed coefficient.
#[inline]
pub fn poly6_with_coeff(r_sq: f32, h: f32, coeff: f32) -> f32 {
    if !(h > 0.0) {
        return 0.0;
    }
    let q = r_sq.sqrt() / h;
    if !(q <= 1.0) {
        return 0.0;
    }
    let diff = 1.0 - q * q;
    coeff * diff * diff * diff
}

/// Spiky gradient with precomputed coefficient.
#[inline]
pub fn spiky_gradient_with_coeff(r: Vec3, h: f32, coeff: f32) -> Vec3 {
    let r_len = r.length();
    // Self-term: direction is undefined.
    if !(h > 0.0) || !(r_len > 0.0) {
        return Vec3::ZERO;
    }
    let q = r_len / h;
    if !(q <= 1.0) {
        return Vec3::ZERO;
    }
    let diff = 1.0 - q;
    coeff * diff * diff * (r / r_len)
}

/// Kernel pair with coefficients precomputed for the configured radii.
///
/// The density kernel and the gradient kernel may use different radii.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingKernels {
    density_radius: f32,
    gradient_radius: f32,
    poly6_coeff: f32,
    spiky_coeff: f32,
}

impl SmoothingKernels {
    pub fn new(density_radius: f32, gradient_radius: f32) -> Self {
        Self {
            density_radius,
            gradient_radius,
            poly6_coeff: poly6_coefficient(density_radius),
            spiky_coeff: spiky_gradient_coefficient(gradient_radius),
        }
    }

    pub fn density_radius(&self) -> f32 {
        self.density_radius
    }

    pub fn gradient_radius(&self) -> f32 {
        self.gradient_radius
    }

    /// Poly6 at the density radius.
    #[inline]
    pub fn poly6(&self, r: Vec3) -> f32 {
        poly6_with_coeff(r.length_squared(), self.density_radius, self.poly6_coeff)
    }

    /// Poly6 evaluated at a scalar distance.
    #[inline]
    pub fn poly6_at_distance(&self, distance: f32) -> f32 {
        poly6_with_coeff(distance * distance, self.density_radius, self.poly6_coeff)
    }

    /// Spiky gradient at the gradient radius.
    #[inline]
    pub fn spiky_gradient(&self, r: Vec3) -> Vec3 {
        spiky_gradient_with_coeff(r, self.gradient_radius, self.spiky_coeff)
    }
}
