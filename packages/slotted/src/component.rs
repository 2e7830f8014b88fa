//! Plain components consumed by the built-in systems.
//!
//! These are deliberately small. `Transform` matters most: it carries the
//! wrapping change counter that pools and colliders use to notice movement
//! without comparing values.

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::spatial::Aabb;

/// Position, rotation and scale of an entity.
///
/// Every mutation bumps `change_id` (wrapping). Consumers cache the last id
/// they saw and compare, so a consumer that sleeps through exactly 256
/// mutations will miss them.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    change_id: u8,
}

impl Transform {
    /// Create a new transform.
    ///
    /// A fresh transform starts at change id 1, so anything tracking from the
    /// default of 0 sees it as changed.
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Transform {
        Transform {
            position,
            rotation,
            scale,
            change_id: 1,
        }
    }

    /// Create an unrotated, unit-scale transform at a position.
    pub fn from_position(position: Vec3) -> Transform {
        Transform::new(position, Quat::IDENTITY, Vec3::ONE)
    }

    /// The current change counter.
    pub fn change_id(&self) -> u8 {
        self.change_id
    }

    /// Bump the change counter without touching any field.
    pub fn mark_changed(&mut self) -> &mut Self {
        self.change_id = self.change_id.wrapping_add(1);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) -> &mut Self {
        self.position = position;
        self.mark_changed()
    }

    /// Move by `delta`.
    pub fn translate(&mut self, delta: Vec3) -> &mut Self {
        self.position += delta;
        self.mark_changed()
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) -> &mut Self {
        self.rotation = rotation;
        self.mark_changed()
    }

    /// Apply `rotation` on top of the current rotation.
    pub fn rotate(&mut self, rotation: Quat) -> &mut Self {
        self.rotation = (rotation * self.rotation).normalize();
        self.mark_changed()
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) -> &mut Self {
        self.scale = scale;
        self.mark_changed()
    }

    /// The local +Z axis in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// The local-to-world matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::from_position(Vec3::ZERO)
    }
}

/// Linear velocity in units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity(pub Vec3);

impl Velocity {
    /// Move `transform` along this velocity for `delta_seconds`.
    pub fn apply_to(&self, transform: &mut Transform, delta_seconds: f32) {
        transform.translate(self.0 * delta_seconds);
    }

    /// Integrate a constant acceleration over `delta_seconds`.
    pub fn accelerate(&mut self, acceleration: Vec3, delta_seconds: f32) {
        self.0 += acceleration * delta_seconds;
    }
}

/// Angular velocity as euler angles in radians per second.
///
/// Angles are applied Z, then Y, then X, in the transform's local frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationalVelocity(pub Vec3);

impl RotationalVelocity {
    /// Turn `transform` by this velocity for `delta_seconds`.
    pub fn apply_to(&self, transform: &mut Transform, delta_seconds: f32) {
        let angles = self.0 * delta_seconds;
        let step = Quat::from_euler(EulerRot::ZYX, angles.z, angles.y, angles.x);
        let rotation = (transform.rotation() * step).normalize();
        transform.set_rotation(rotation);
    }
}

/// Rate of change of a transform's scale, per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScaleVelocity(pub Vec3);

impl ScaleVelocity {
    pub fn apply_to(&self, transform: &mut Transform, delta_seconds: f32) {
        let scale = transform.scale() + self.0 * delta_seconds;
        transform.set_scale(scale);
    }
}

/// Time left before the owning entity is erased.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifeTime {
    initial: f32,
    remaining: f32,
}

impl LifeTime {
    /// Create a lifetime of `seconds`.
    pub fn new(seconds: f32) -> LifeTime {
        LifeTime {
            initial: seconds,
            remaining: seconds,
        }
    }

    pub fn initial(&self) -> f32 {
        self.initial
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Count down by `delta_seconds`, returning true once time has run out.
    pub fn tick(&mut self, delta_seconds: f32) -> bool {
        self.remaining -= delta_seconds;
        self.remaining < 0.0
    }

    /// The fraction of the lifetime still remaining, in `0..=1`.
    pub fn fraction_remaining(&self) -> f32 {
        if self.initial <= 0.0 {
            0.0
        } else {
            (self.remaining / self.initial).clamp(0.0, 1.0)
        }
    }
}

/// Fades a light's intensity from `start` to `end` over the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifeTimeLightIntensity {
    pub start: f32,
    pub end: f32,
}

/// An axis-aligned box collider expressed as offsets from the transform.
///
/// The world-space box is recomputed lazily when the transform's change id
/// moves on. `last_aabb` returns whatever was computed most recently, which is
/// the box to use when removing an entity from a spatial index it was
/// inserted into earlier.
#[derive(Debug, Clone, PartialEq)]
pub struct AabbCollider {
    positive_offset: Vec3,
    negative_offset: Vec3,
    aabb: Aabb,
    tracked_change_id: Option<u8>,
}

impl AabbCollider {
    /// Create a collider extending `positive_offset` and `negative_offset`
    /// from the transform's position, both scaled by the transform's scale.
    pub fn new(positive_offset: Vec3, negative_offset: Vec3) -> AabbCollider {
        AabbCollider {
            positive_offset,
            negative_offset,
            aabb: Aabb::new(Vec3::ZERO, Vec3::ZERO),
            tracked_change_id: None,
        }
    }

    /// A collider spanning one unit in every direction.
    pub fn unit_bounds() -> AabbCollider {
        AabbCollider::new(Vec3::ONE, -Vec3::ONE)
    }

    /// The world-space box for `transform`, recomputing it if the transform
    /// changed since the last call.
    pub fn aabb(&mut self, transform: &Transform) -> Aabb {
        if self.tracked_change_id != Some(transform.change_id()) {
            self.tracked_change_id = Some(transform.change_id());
            let abs_scale = transform.scale().abs();
            let a = abs_scale * self.negative_offset + transform.position();
            let b = abs_scale * self.positive_offset + transform.position();
            self.aabb = Aabb::new(a.min(b), a.max(b));
        }
        self.aabb
    }

    /// The most recently computed world-space box.
    pub fn last_aabb(&self) -> Aabb {
        self.aabb
    }
}

/// Grows a shockwave towards `target_radius`, fading it as it goes.
///
/// Growth slows quadratically as the radius approaches one and a half times
/// the target. The entity is erased once the target is passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShockwaveExpandingAnimator {
    pub target_radius: f32,
    pub buffer_radius: f32,
    pub initial_thickness: f32,
    pub initial_intensity: f32,
    pub radius_step: f32,
}

impl ShockwaveExpandingAnimator {
    pub fn new(target_radius: f32, initial_thickness: f32, initial_intensity: f32, radius_step: f32) -> ShockwaveExpandingAnimator {
        ShockwaveExpandingAnimator {
            target_radius,
            buffer_radius: target_radius * 1.5,
            initial_thickness,
            initial_intensity,
            radius_step,
        }
    }

    /// Returns `(radius, intensity, thickness)` after one step from `radius`.
    pub fn step(&self, radius: f32, delta_seconds: f32) -> (f32, f32, f32) {
        let buffer_factor = ((self.buffer_radius - radius) / self.buffer_radius).powi(2);
        let target_factor = ((self.target_radius - radius) / self.target_radius).powi(2);
        (
            radius + self.radius_step * delta_seconds * buffer_factor,
            self.initial_intensity * buffer_factor,
            self.initial_thickness * target_factor,
        )
    }
}

/// A body taking part in pairwise gravitational attraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalBody {
    pub mass: f64,
}
