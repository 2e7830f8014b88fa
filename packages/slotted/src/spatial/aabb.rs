use std::fmt;

use glam::Vec3;

/// An axis-aligned bounding box.
///
/// Invariant: `min <= max` on every axis.
#[derive(Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners.
    pub fn new(min: Vec3, max: Vec3) -> Aabb {
        debug_assert!(min.cmple(max).all(), "inverted box: {:?} > {:?}", min, max);
        Aabb { min, max }
    }

    /// Create a box from its centre and half extents.
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Aabb {
        let half_extents = half_extents.abs();
        Aabb::new(center - half_extents, center + half_extents)
    }

    /// A cube of edge `size` centred on the origin.
    pub fn cube(size: f32) -> Aabb {
        let half = Vec3::splat(size * 0.5);
        Aabb::new(-half, half)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the diagonal.
    pub fn average_size(&self) -> f32 {
        self.max.distance(self.min)
    }

    pub fn center(&self) -> Vec3 {
        self.min + (self.max - self.min) * 0.5
    }

    /// Returns true if both corners are finite.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Returns true if the boxes overlap or touch.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns true if `point` is inside or on the boundary.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    /// Returns true if `other` lies within this box.
    ///
    /// The lower bound is inclusive but the upper bound is exclusive, so a box
    /// sharing this box's max face is not fully contained.
    pub fn contains_fully(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpgt(other.max).all()
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb[{} .. {}]", self.min, self.max)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(1.0), Vec3::splat(2.0));
        let d = Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(a.intersects(&c), "touching boxes intersect");
        assert!(!a.intersects(&d));
    }

    #[test]
    fn test_containment() {
        let outer = Aabb::cube(2.0);
        assert!(outer.contains_fully(&Aabb::cube(1.0)));
        assert!(outer.contains_fully(&Aabb::new(Vec3::splat(-1.0), Vec3::ZERO)));
        assert!(!outer.contains_fully(&Aabb::new(Vec3::ZERO, Vec3::ONE)));
        assert!(!outer.contains_fully(&Aabb::cube(3.0)));

        assert!(outer.contains_point(Vec3::ONE));
        assert!(!outer.contains_point(Vec3::new(0.0, 1.5, 0.0)));
    }

    #[test]
    fn test_measurements() {
        let aabb = Aabb::from_center_extents(Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, 2.0, 3.0));
        assert_eq!(aabb.min, Vec3::new(0.0, -1.0, -2.0));
        assert_eq!(aabb.size(), Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(aabb.center(), Vec3::ONE);
        assert!(aabb.is_finite());
    }
}
