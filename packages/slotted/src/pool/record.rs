//! Pool-bound component records and their buffer layouts.
//!
//! All layouts are little-endian `f32`/`u32` words, padded to 16-byte
//! vectors so they can be read directly as std430 structs.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::component::Transform;
use crate::entity::Entity;

/// A component record which a `DenseSyncedPool` can mirror into a sink.
pub trait SyncedRecord: Send + Sync + Sized + 'static {
    /// Size of the header block preceding the records.
    ///
    /// When at least four bytes, the first `u32` holds the record count.
    const HEADER_BYTES: usize;

    /// Size of one serialized record.
    const RECORD_BYTES: usize;

    /// The record on `entity`, if it has one.
    fn component(entity: &Entity) -> Option<&Pooled<Self>>;

    /// The record on `entity` along with the transform it is serialized
    /// against. Returns `None` unless both are present.
    fn split_mut(entity: &mut Entity) -> Option<(&mut Pooled<Self>, &Transform)>;

    /// Serialize into `out`, which is exactly `RECORD_BYTES` long.
    fn write(&self, transform: &Transform, out: &mut [u8]);
}

/// A record bound (or waiting to be bound) into a pool.
///
/// The binding is shared with the pool so that it can rewrite the index of a
/// record it moves during a swap-remove.
///
/// Dropping a bound `Pooled`, for instance by clearing or replacing the
/// entity's slot, leaves its record in place until the pool's next sync,
/// which removes it.
#[derive(Debug)]
pub struct Pooled<T> {
    value: T,
    binding: Arc<AtomicI32>,
    dirty: bool,
    tracked_change_id: u8,
}

impl<T> Pooled<T> {
    /// Wrap a new, unbound record.
    pub fn new(value: T) -> Pooled<T> {
        Pooled {
            value,
            binding: Arc::new(AtomicI32::new(-1)),
            dirty: true,
            tracked_change_id: 0,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutable access to the record, marking it dirty.
    pub fn value_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }

    /// Force the record to be rewritten on the next sync.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The record's index in its pool, or `None` if it is not bound.
    pub fn manager_index(&self) -> Option<usize> {
        let index = self.binding.load(Ordering::Acquire);
        if index < 0 {
            None
        } else {
            Some(index as usize)
        }
    }

    pub fn is_bound(&self) -> bool {
        self.manager_index().is_some()
    }

    /// Returns true if the buffer copy of this record is stale with respect
    /// to `transform`.
    pub fn needs_sync(&self, transform: &Transform) -> bool {
        self.dirty
            || self.tracked_change_id != transform.change_id()
            || !self.is_bound()
    }

    pub(crate) fn binding(&self) -> &Arc<AtomicI32> {
        &self.binding
    }

    pub(crate) fn mark_synced(&mut self, change_id: u8) {
        self.tracked_change_id = change_id;
        self.dirty = false;
    }
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightType {
    Directional = 0,
    Spot = 1,
    Point = 2,
}

/// A light source.
///
/// `spot_angle` is in degrees and only meaningful for spot lights. `range`
/// is ignored for directional lights.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub range: f32,
    pub spot_angle: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn directional(color: Vec3, intensity: f32) -> Light {
        Light { light_type: LightType::Directional, range: 0.0, spot_angle: 0.0, color, intensity }
    }

    pub fn spot(range: f32, spot_angle: f32, color: Vec3, intensity: f32) -> Light {
        Light { light_type: LightType::Spot, range, spot_angle, color, intensity }
    }

    pub fn point(range: f32, color: Vec3, intensity: f32) -> Light {
        Light { light_type: LightType::Point, range, spot_angle: 0.0, color, intensity }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LightRecord {
    light_type: u32,
    range: f32,
    spot_angle_cos: f32,
    intensity: f32,
    position: [f32; 4],
    forward: [f32; 4],
    color: [f32; 4],
}

impl SyncedRecord for Light {
    const HEADER_BYTES: usize = 16;
    const RECORD_BYTES: usize = std::mem::size_of::<LightRecord>();

    fn component(entity: &Entity) -> Option<&Pooled<Self>> {
        entity.light.as_ref()
    }

    fn split_mut(entity: &mut Entity) -> Option<(&mut Pooled<Self>, &Transform)> {
        Some((entity.light.as_mut()?, entity.transform.as_ref()?))
    }

    fn write(&self, transform: &Transform, out: &mut [u8]) {
        let record = LightRecord {
            light_type: self.light_type as u32,
            range: self.range,
            spot_angle_cos: self.spot_angle.to_radians().cos(),
            intensity: self.intensity,
            position: vec4(transform.position(), 0.0),
            forward: vec4(transform.forward(), 0.0),
            color: vec4(self.color, 0.0),
        };
        out.copy_from_slice(bytemuck::bytes_of(&record));
    }
}

/// An expanding ring distortion.
#[derive(Debug, Clone, PartialEq)]
pub struct Shockwave {
    pub radius: f32,
    pub intensity: f32,
    pub thickness: f32,
}

impl Shockwave {
    pub fn new(radius: f32, intensity: f32, thickness: f32) -> Shockwave {
        Shockwave { radius, intensity, thickness }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ShockwaveRecord {
    radius: f32,
    intensity: f32,
    thickness: f32,
    _pad: f32,
    position: [f32; 4],
}

impl SyncedRecord for Shockwave {
    const HEADER_BYTES: usize = 16;
    const RECORD_BYTES: usize = std::mem::size_of::<ShockwaveRecord>();

    fn component(entity: &Entity) -> Option<&Pooled<Self>> {
        entity.shockwave.as_ref()
    }

    fn split_mut(entity: &mut Entity) -> Option<(&mut Pooled<Self>, &Transform)> {
        Some((entity.shockwave.as_mut()?, entity.transform.as_ref()?))
    }

    fn write(&self, transform: &Transform, out: &mut [u8]) {
        let record = ShockwaveRecord {
            radius: self.radius,
            intensity: self.intensity,
            thickness: self.thickness,
            _pad: 0.0,
            position: vec4(transform.position(), 0.0),
        };
        out.copy_from_slice(bytemuck::bytes_of(&record));
    }
}

/// A sphere drawn with a radial colour gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereParticle {
    pub radius: f32,
    pub inner_color: Vec4,
    pub outer_color: Vec4,
}

impl SphereParticle {
    pub fn new(radius: f32, inner_color: Vec4, outer_color: Vec4) -> SphereParticle {
        SphereParticle { radius, inner_color, outer_color }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SphereParticleRecord {
    position_radius: [f32; 4],
    inner_color: [f32; 4],
    outer_color: [f32; 4],
}

impl SyncedRecord for SphereParticle {
    // Particle count is supplied as the instance count at draw time.
    const HEADER_BYTES: usize = 0;
    const RECORD_BYTES: usize = std::mem::size_of::<SphereParticleRecord>();

    fn component(entity: &Entity) -> Option<&Pooled<Self>> {
        entity.particle.as_ref()
    }

    fn split_mut(entity: &mut Entity) -> Option<(&mut Pooled<Self>, &Transform)> {
        Some((entity.particle.as_mut()?, entity.transform.as_ref()?))
    }

    fn write(&self, transform: &Transform, out: &mut [u8]) {
        let record = SphereParticleRecord {
            position_radius: vec4(transform.position(), self.radius),
            inner_color: self.inner_color.to_array(),
            outer_color: self.outer_color.to_array(),
        };
        out.copy_from_slice(bytemuck::bytes_of(&record));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(Light::RECORD_BYTES, 64);
        assert_eq!(Shockwave::RECORD_BYTES, 32);
        assert_eq!(SphereParticle::RECORD_BYTES, 48);
    }

    #[test]
    fn test_light_layout() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let light = Light::spot(10.0, 60.0, Vec3::new(0.5, 0.25, 1.0), 4.0);
        let mut out = [0u8; 64];
        light.write(&transform, &mut out);

        assert_eq!(u32::from_le_bytes([out[0], out[1], out[2], out[3]]), 1);
        let words = floats(&out);
        assert_eq!(words[1], 10.0);
        assert!((words[2] - 0.5).abs() < 1e-6);
        assert_eq!(words[3], 4.0);
        assert_eq!(&words[4..8], &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(&words[8..12], &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(&words[12..16], &[0.5, 0.25, 1.0, 0.0]);
    }

    #[test]
    fn test_particle_layout() {
        let transform = Transform::from_position(Vec3::new(-1.0, 0.0, 2.0));
        let particle = SphereParticle::new(0.5, Vec4::ONE, Vec4::new(1.0, 0.0, 0.0, 0.0));
        let mut out = [0u8; 48];
        particle.write(&transform, &mut out);

        let words = floats(&out);
        assert_eq!(&words[0..4], &[-1.0, 0.0, 2.0, 0.5]);
        assert_eq!(&words[4..8], &[1.0; 4]);
        assert_eq!(&words[8..12], &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pooled_change_tracking() {
        let mut transform = Transform::default();
        let mut pooled = Pooled::new(Shockwave::new(1.0, 1.0, 0.1));
        assert!(pooled.is_dirty());
        assert!(!pooled.is_bound());
        assert!(pooled.needs_sync(&transform));

        pooled.binding().store(0, Ordering::Release);
        pooled.mark_synced(transform.change_id());
        assert_eq!(pooled.manager_index(), Some(0));
        assert!(!pooled.needs_sync(&transform));

        transform.translate(Vec3::X);
        assert!(pooled.needs_sync(&transform));
        pooled.mark_synced(transform.change_id());

        pooled.value_mut().radius = 2.0;
        assert!(pooled.needs_sync(&transform));
    }
}
