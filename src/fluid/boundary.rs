//! Boundary handling for fluid simulation.
//!
//! Boundaries act through the [`CollisionHook`]: during every solver
//! iteration each particle's corrected candidate position is passed to the
//! hook, which returns the adjusted position. Velocities are never touched
//! directly; they follow from the projected positions at finalization.
//!
//! Provided colliders:
//! - Plane boundaries (floors, walls)
//! - Box boundaries (AABB, containing or excluding)
//! - Sphere boundaries (containing or excluding)
//! - [`BoundarySet`], an ordered collection of the above

use bevy::prelude::*;

/// Resolves a candidate particle position against scene geometry.
///
/// Called once per particle per solver iteration, possibly from several
/// threads at once. Implementations must be pure with respect to the
/// simulation state.
pub trait CollisionHook: Send + Sync {
    fn resolve_collision(&self, index: usize, candidate: Vec3) -> Vec3;
}

impl<F> CollisionHook for F
where
    F: Fn(usize, Vec3) -> Vec3 + Send + Sync,
{
    fn resolve_collision(&self, index: usize, candidate: Vec3) -> Vec3 {
        self(index, candidate)
    }
}

/// Box-shaped boundary (AABB).
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct BoxBoundary {
    /// Minimum corner of the box.
    pub min: Vec3,
    /// Maximum corner of the box.
    pub max: Vec3,
    /// Whether particles should be contained inside (true) or outside (false).
    pub contain_inside: bool,
    /// Distance kept from the walls.
    pub margin: f32,
}

impl Default for BoxBoundary {
    fn default() -> Self {
        Self {
            min: Vec3::new(-5.0, 0.0, -5.0),
            max: Vec3::new(5.0, 10.0, 5.0),
            contain_inside: true,
            margin: 0.0,
        }
    }
}

impl BoxBoundary {
    /// Create a box boundary centered at origin.
    pub fn centered(half_extents: Vec3) -> Self {
        Self::new(-half_extents, half_extents)
    }

    /// Create a box boundary with custom bounds, given in any order.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            ..default()
        }
    }

    /// Keep particles out of the box instead of inside it.
    pub fn obstacle(mut self) -> Self {
        self.contain_inside = false;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Check if a point is inside the boundary.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Get the signed distance from a point to the boundary surface.
    /// Negative = inside, positive = outside.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        let center = (self.min + self.max) * 0.5;
        let half_extents = (self.max - self.min) * 0.5;

        let q = (point - center).abs() - half_extents;
        let outside_dist = q.max(Vec3::ZERO).length();
        let inside_dist = q.x.max(q.y).max(q.z).min(0.0);

        outside_dist + inside_dist
    }

    /// Get the closest point of the (solid) box.
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    /// Project a point onto the allowed region.
    pub fn project(&self, point: Vec3) -> Vec3 {
        if self.contain_inside {
            let lo = self.min + Vec3::splat(self.margin);
            let hi = self.max - Vec3::splat(self.margin);
            // A margin wider than the box collapses the region to its center.
            point.max(lo.min(hi)).min(hi.max(lo))
        } else {
            let lo = self.min - Vec3::splat(self.margin);
            let hi = self.max + Vec3::splat(self.margin);
            if !(point.cmpgt(lo).all() && point.cmplt(hi).all()) {
                return point;
            }
            // Push out through the nearest face.
            let to_lo = point - lo;
            let to_hi = hi - point;
            let mut best = (to_lo.x, 0, lo.x);
            for (dist, axis, value) in [
                (to_hi.x, 0, hi.x),
                (to_lo.y, 1, lo.y),
                (to_hi.y, 1, hi.y),
                (to_lo.z, 2, lo.z),
                (to_hi.z, 2, hi.z),
            ] {
                if dist < best.0 {
                    best = (dist, axis, value);
                }
            }
            let mut projected = point;
            projected[best.1] = best.2;
            projected
        }
    }
}

/// Plane boundary (infinite plane).
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct PlaneBoundary {
    /// Normal of the plane (pointing towards the valid side).
    pub normal: Vec3,
    /// Distance from origin along the normal.
    pub distance: f32,
    /// Distance kept from the plane.
    pub margin: f32,
}

impl Default for PlaneBoundary {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
            margin: 0.0,
        }
    }
}

impl PlaneBoundary {
    /// Create a floor at a given height.
    pub fn floor(height: f32) -> Self {
        Self {
            normal: Vec3::Y,
            distance: height,
            ..default()
        }
    }

    /// Create a wall with given normal and point on the plane.
    /// A zero normal falls back to +Y.
    pub fn wall(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.try_normalize().unwrap_or(Vec3::Y);
        Self {
            normal,
            distance: normal.dot(point),
            ..default()
        }
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Get signed distance to the plane.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Push a point back onto the valid side.
    pub fn project(&self, point: Vec3) -> Vec3 {
        let dist = self.signed_distance(point);
        if dist < self.margin {
            point + self.normal * (self.margin - dist)
        } else {
            point
        }
    }
}

/// Sphere boundary.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct SphereBoundary {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
    /// Whether particles should be contained inside (true) or outside (false).
    pub contain_inside: bool,
    /// Distance kept from the surface.
    pub margin: f32,
}

impl Default for SphereBoundary {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 5.0,
            contain_inside: true,
            margin: 0.0,
        }
    }
}

impl SphereBoundary {
    /// Create a sphere boundary.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius,
            ..default()
        }
    }

    /// Keep particles out of the sphere instead of inside it.
    pub fn obstacle(mut self) -> Self {
        self.contain_inside = false;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Get signed distance to the sphere surface.
    /// Negative = inside, positive = outside.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.center).length() - self.radius
    }

    /// Project a point onto the allowed region.
    pub fn project(&self, point: Vec3) -> Vec3 {
        let offset = point - self.center;
        let dist = offset.length();

        if self.contain_inside {
            let effective_radius = (self.radius - self.margin).max(0.0);
            if dist > effective_radius && dist > 1e-6 {
                return self.center + offset / dist * effective_radius;
            }
        } else {
            let effective_radius = self.radius + self.margin;
            if dist < effective_radius {
                // Exactly at the center there is no direction; push up.
                let normal = if dist > 1e-6 { offset / dist } else { Vec3::Y };
                return self.center + normal * effective_radius;
            }
        }
        point
    }
}

/// A single collider of a [`BoundarySet`].
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub enum Boundary {
    Box(BoxBoundary),
    Plane(PlaneBoundary),
    Sphere(SphereBoundary),
}

impl Boundary {
    pub fn project(&self, point: Vec3) -> Vec3 {
        match self {
            Boundary::Box(b) => b.project(point),
            Boundary::Plane(p) => p.project(point),
            Boundary::Sphere(s) => s.project(point),
        }
    }
}

impl From<BoxBoundary> for Boundary {
    fn from(b: BoxBoundary) -> Self {
        Boundary::Box(b)
    }
}

impl From<PlaneBoundary> for Boundary {
    fn from(p: PlaneBoundary) -> Self {
        Boundary::Plane(p)
    }
}

impl From<SphereBoundary> for Boundary {
    fn from(s: SphereBoundary) -> Self {
        Boundary::Sphere(s)
    }
}

/// Ordered collection of colliders, applied one after another.
#[derive(Clone, Debug, Default, PartialEq, Reflect)]
pub struct BoundarySet {
    boundaries: Vec<Boundary>,
}

impl BoundarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Six inward-facing walls around a box.
    pub fn container(min: Vec3, max: Vec3) -> Self {
        let lo = min.min(max);
        let hi = min.max(max);
        Self::new()
            .with(PlaneBoundary::wall(Vec3::X, lo))
            .with(PlaneBoundary::wall(Vec3::NEG_X, hi))
            .with(PlaneBoundary::wall(Vec3::Y, lo))
            .with(PlaneBoundary::wall(Vec3::NEG_Y, hi))
            .with(PlaneBoundary::wall(Vec3::Z, lo))
            .with(PlaneBoundary::wall(Vec3::NEG_Z, hi))
    }

    pub fn with(mut self, boundary: impl Into<Boundary>) -> Self {
        self.push(boundary);
        self
    }

    pub fn push(&mut self, boundary: impl Into<Boundary>) {
        self.boundaries.push(boundary.into());
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn project(&self, point: Vec3) -> Vec3 {
        self.boundaries
            .iter()
            .fold(point, |p, boundary| boundary.project(p))
    }
}

impl CollisionHook for BoxBoundary {
    fn resolve_collision(&self, _index: usize, candidate: Vec3) -> Vec3 {
        self.project(candidate)
    }
}

impl CollisionHook for PlaneBoundary {
    fn resolve_collision(&self, _index: usize, candidate: Vec3) -> Vec3 {
        self.project(candidate)
    }
}

impl CollisionHook for SphereBoundary {
    fn resolve_collision(&self, _index: usize, candidate: Vec3) -> Vec3 {
        self.project(candidate)
    }
}

impl CollisionHook for BoundarySet {
    fn resolve_collision(&self, _index: usize, candidate: Vec3) -> Vec3 {
        self.project(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_boundary_contains() {
        let boundary = BoxBoundary::new(Vec3::ZERO, Vec3::ONE);

        assert!(boundary.contains(Vec3::splat(0.5)));
        assert!(!boundary.contains(Vec3::new(1.5, 0.5, 0.5)));
        assert!(boundary.signed_distance(Vec3::splat(0.5)) < 0.0);
        assert!((boundary.signed_distance(Vec3::new(2.0, 0.5, 0.5)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_box_boundary_keeps_inside() {
        let boundary = BoxBoundary::new(Vec3::ZERO, Vec3::ONE).with_margin(0.1);

        let projected = boundary.project(Vec3::new(-0.5, 0.5, 1.5));
        assert!((projected - Vec3::new(0.1, 0.5, 0.9)).length() < 1e-6);

        let inside = Vec3::splat(0.5);
        assert_eq!(boundary.project(inside), inside);
    }

    #[test]
    fn test_box_obstacle_pushes_through_nearest_face() {
        let boundary = BoxBoundary::new(Vec3::ZERO, Vec3::ONE).obstacle();

        let projected = boundary.project(Vec3::new(0.9, 0.5, 0.5));
        assert_eq!(projected, Vec3::new(1.0, 0.5, 0.5));

        let outside = Vec3::new(2.0, 0.5, 0.5);
        assert_eq!(boundary.project(outside), outside);
    }

    #[test]
    fn test_plane_boundary_distance() {
        let plane = PlaneBoundary::floor(0.0);

        assert_eq!(plane.signed_distance(Vec3::new(0.0, 1.0, 0.0)), 1.0);
        assert_eq!(plane.signed_distance(Vec3::new(0.0, -1.0, 0.0)), -1.0);
        assert_eq!(plane.signed_distance(Vec3::ZERO), 0.0);
    }

    #[test]
    fn test_plane_projection() {
        let floor = PlaneBoundary::floor(1.0).with_margin(0.5);

        assert_eq!(floor.project(Vec3::new(3.0, 0.0, -2.0)), Vec3::new(3.0, 1.5, -2.0));
        assert_eq!(floor.project(Vec3::new(3.0, 4.0, -2.0)), Vec3::new(3.0, 4.0, -2.0));
    }

    #[test]
    fn test_sphere_boundary_distance() {
        let sphere = SphereBoundary::new(Vec3::ZERO, 1.0);

        assert_eq!(sphere.signed_distance(Vec3::ZERO), -1.0); // Inside
        assert_eq!(sphere.signed_distance(Vec3::new(1.0, 0.0, 0.0)), 0.0); // On surface
        assert_eq!(sphere.signed_distance(Vec3::new(2.0, 0.0, 0.0)), 1.0); // Outside
    }

    #[test]
    fn test_sphere_projection() {
        let container = SphereBoundary::new(Vec3::ZERO, 1.0);
        let projected = container.project(Vec3::new(0.0, 3.0, 0.0));
        assert!((projected - Vec3::Y).length() < 1e-6);

        let obstacle = SphereBoundary::new(Vec3::ZERO, 1.0).obstacle();
        let projected = obstacle.project(Vec3::new(0.5, 0.0, 0.0));
        assert!((projected - Vec3::X).length() < 1e-6);
        assert!(obstacle.project(Vec3::ZERO).is_finite());
    }

    #[test]
    fn test_container_clamps_to_box() {
        let set = BoundarySet::container(Vec3::ONE, -Vec3::ONE);
        assert_eq!(set.len(), 6);

        let projected = set.resolve_collision(0, Vec3::new(2.0, -3.0, 0.5));
        assert!((projected - Vec3::new(1.0, -1.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_closure_hook() {
        let hook = |index: usize, candidate: Vec3| candidate + Vec3::X * index as f32;
        assert_eq!(hook.resolve_collision(2, Vec3::ZERO), Vec3::new(2.0, 0.0, 0.0));
    }
}
