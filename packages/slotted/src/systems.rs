//! Built-in update systems for the stock components.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use glam::{DVec3, Vec3};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::trace;

use crate::entity::{Entity, EntityId};
use crate::system::{TickContext, UpdateSystem};

/// Moves every entity with a velocity.
#[derive(Debug, Default)]
pub struct ApplyVelocitySystem;

impl UpdateSystem for ApplyVelocitySystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.transform.is_some() && entity.velocity.is_some()
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        if let (Some(transform), Some(velocity)) = (entity.transform.as_mut(), entity.velocity.as_ref()) {
            velocity.apply_to(transform, ctx.delta_seconds());
        }
    }
}

/// Spins every entity with a rotational velocity.
#[derive(Debug, Default)]
pub struct RotationalVelocitySystem;

impl UpdateSystem for RotationalVelocitySystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.transform.is_some() && entity.rotational_velocity.is_some()
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        if let (Some(transform), Some(velocity)) = (entity.transform.as_mut(), entity.rotational_velocity.as_ref()) {
            velocity.apply_to(transform, ctx.delta_seconds());
        }
    }
}

/// Grows or shrinks every entity with a scale velocity.
#[derive(Debug, Default)]
pub struct ApplyScaleVelocitySystem;

impl UpdateSystem for ApplyScaleVelocitySystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.transform.is_some() && entity.scale_velocity.is_some()
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        if let (Some(transform), Some(velocity)) = (entity.transform.as_mut(), entity.scale_velocity.as_ref()) {
            velocity.apply_to(transform, ctx.delta_seconds());
        }
    }
}

/// Counts lifetimes down and erases entities whose time has run out.
#[derive(Debug, Default)]
pub struct LifeTimeSystem;

impl UpdateSystem for LifeTimeSystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.life_time.is_some()
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        let expired = entity.life_time.as_mut()
            .map_or(false, |life_time| life_time.tick(ctx.delta_seconds()));
        if expired {
            ctx.enqueue_erase(entity.id());
        }
    }
}

/// Fades lights over their entity's lifetime.
#[derive(Debug, Default)]
pub struct LifeTimeLightIntensitySystem;

impl UpdateSystem for LifeTimeLightIntensitySystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.life_time.is_some() && entity.life_time_light.is_some() && entity.light.is_some()
    }

    fn apply(&self, entity: &mut Entity, _ctx: &TickContext<'_>) {
        if let (Some(life_time), Some(fade), Some(light)) =
            (entity.life_time.as_ref(), entity.life_time_light.as_ref(), entity.light.as_mut())
        {
            let t = life_time.fraction_remaining();
            light.value_mut().intensity = fade.end + (fade.start - fade.end) * t;
        }
    }
}

/// Expands shockwaves and erases them once they pass their target radius.
#[derive(Debug, Default)]
pub struct ShockwaveExpandingAnimatorSystem;

impl UpdateSystem for ShockwaveExpandingAnimatorSystem {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.shockwave.is_some() && entity.shockwave_animator.is_some()
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        let finished = match (entity.shockwave.as_mut(), entity.shockwave_animator.as_ref()) {
            (Some(shockwave), Some(animator)) => {
                let shockwave = shockwave.value_mut();
                let (radius, intensity, thickness) = animator.step(shockwave.radius, ctx.delta_seconds());
                shockwave.radius = radius;
                shockwave.intensity = intensity;
                shockwave.thickness = thickness;
                radius > animator.target_radius
            },
            _ => false,
        };

        if finished {
            ctx.enqueue_erase(entity.id());
        }
    }
}

/// The gravitational constant used by default, scaled for scene units.
pub const GRAVITATIONAL_CONSTANT: f64 = 6.6743e-5;

#[derive(Debug, Clone, Copy)]
struct Body {
    id: EntityId,
    position: DVec3,
    mass: f64,
}

/// Pairwise gravity between every entity with an `OrbitalBody`.
///
/// This runs in two update systems. `gather` snapshots every body during
/// its parallel pass and, once that is done, computes every body's
/// acceleration in a separate parallel reduction over the snapshot. `apply`
/// then adds the acceleration to each body's velocity. Neither pass takes a
/// lock per pair, and the result does not depend on visit order.
///
/// Register `gather` before `apply`.
pub struct OrbitalGravity {
    gravitational_constant: f64,
    bodies: SegQueue<Body>,
    accelerations: RwLock<HashMap<EntityId, Vec3>>,
}

impl OrbitalGravity {
    pub fn new() -> Arc<OrbitalGravity> {
        OrbitalGravity::with_constant(GRAVITATIONAL_CONSTANT)
    }

    pub fn with_constant(gravitational_constant: f64) -> Arc<OrbitalGravity> {
        Arc::new(OrbitalGravity {
            gravitational_constant,
            bodies: SegQueue::new(),
            accelerations: RwLock::new(HashMap::new()),
        })
    }

    /// The system which snapshots bodies and computes accelerations.
    pub fn gather(self: &Arc<Self>) -> Arc<OrbitalGather> {
        Arc::new(OrbitalGather(self.clone()))
    }

    /// The system which applies computed accelerations.
    pub fn apply(self: &Arc<Self>) -> Arc<OrbitalApply> {
        Arc::new(OrbitalApply(self.clone()))
    }

    /// The acceleration computed for `id` on the last tick.
    pub fn acceleration(&self, id: EntityId) -> Option<Vec3> {
        self.accelerations.read().get(&id).copied()
    }

    fn is_body(entity: &Entity) -> bool {
        entity.transform.is_some() && entity.velocity.is_some() && entity.orbital.is_some()
    }

    fn reduce(&self) {
        let mut bodies = Vec::with_capacity(self.bodies.len());
        while let Some(body) = self.bodies.pop() {
            bodies.push(body);
        }

        let g = self.gravitational_constant;
        let accelerations: HashMap<EntityId, Vec3> = bodies.par_iter()
            .map(|body| {
                let acceleration = bodies.iter()
                    .filter(|other| other.id != body.id)
                    .fold(DVec3::ZERO, |sum, other| {
                        let to_other = other.position - body.position;
                        let distance_squared = to_other.length_squared();
                        if distance_squared <= f64::EPSILON {
                            return sum;
                        }
                        sum + to_other.normalize() * (g * other.mass / distance_squared)
                    });
                (body.id, acceleration.as_vec3())
            })
            .collect();

        trace!("computed orbital accelerations for {} bodies", accelerations.len());
        *self.accelerations.write() = accelerations;
    }
}

/// See `OrbitalGravity`.
pub struct OrbitalGather(Arc<OrbitalGravity>);

impl UpdateSystem for OrbitalGather {
    fn is_target(&self, entity: &Entity) -> bool {
        OrbitalGravity::is_body(entity)
    }

    fn apply(&self, entity: &mut Entity, _ctx: &TickContext<'_>) {
        if let (Some(transform), Some(orbital)) = (entity.transform.as_ref(), entity.orbital.as_ref()) {
            self.0.bodies.push(Body {
                id: entity.id(),
                position: transform.position().as_dvec3(),
                mass: orbital.mass,
            });
        }
    }

    fn on_done(&self) {
        self.0.reduce();
    }
}

/// See `OrbitalGravity`.
pub struct OrbitalApply(Arc<OrbitalGravity>);

impl UpdateSystem for OrbitalApply {
    fn is_target(&self, entity: &Entity) -> bool {
        OrbitalGravity::is_body(entity)
    }

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
        let acceleration = match self.0.acceleration(entity.id()) {
            Some(acceleration) => acceleration,
            None => return,
        };

        if let Some(velocity) = entity.velocity.as_mut() {
            velocity.accelerate(acceleration, ctx.delta_seconds());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::component::{
        LifeTime, LifeTimeLightIntensity, OrbitalBody, RotationalVelocity, ScaleVelocity, ShockwaveExpandingAnimator,
        Transform, Velocity,
    };
    use crate::pool::{DenseSyncedPool, Light, MemorySink, Pooled, Shockwave, SyncedRecord};
    use crate::registry::Registry;
    use crate::system::SystemRegistration;

    fn register(registry: &mut Registry, system: Arc<dyn UpdateSystem>) {
        registry.register_system(SystemRegistration::new().update(system));
    }

    #[test]
    fn test_apply_velocity() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(ApplyVelocitySystem));

        let id = registry.create_entity();
        let entity = registry.entity_mut(id).unwrap();
        entity.transform = Some(Transform::default());
        entity.velocity = Some(Velocity(Vec3::new(2.0, 0.0, -4.0)));

        registry.execute_update(0.5);
        let transform = registry.entity(id).unwrap().transform.as_ref().unwrap();
        assert_eq!(transform.position(), Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(transform.change_id(), 2);
    }

    fn light_pool(registry: &mut Registry) -> Arc<DenseSyncedPool<Light, MemorySink>> {
        let pool: Arc<DenseSyncedPool<Light, MemorySink>> = Arc::new(DenseSyncedPool::new(MemorySink::new()));
        registry.register_system(SystemRegistration::new()
            .update(pool.clone())
            .erase_listener(pool.clone()));
        pool
    }

    fn synced_light(pool: &DenseSyncedPool<Light, MemorySink>, entity: &Entity) -> (Vec<u8>, Vec<u8>) {
        let light = entity.light.as_ref().unwrap();
        let mut expected = vec![0; Light::RECORD_BYTES];
        light.value().write(entity.transform.as_ref().unwrap(), &mut expected);
        let index = light.manager_index().unwrap();
        let written = pool.sink().record(&pool.layout(), index).unwrap().to_vec();
        (written, expected)
    }

    #[test]
    fn test_rotational_velocity_resyncs_light() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(RotationalVelocitySystem));
        let pool = light_pool(&mut registry);

        let id = registry.create_entity();
        let entity = registry.entity_mut(id).unwrap();
        entity.transform = Some(Transform::default());
        entity.rotational_velocity = Some(RotationalVelocity(Vec3::new(0.0, std::f32::consts::PI, 0.0)));
        entity.light = Some(Pooled::new(Light::point(5.0, Vec3::ONE, 1.0)));

        registry.execute_update(0.5);
        let entity = registry.entity(id).unwrap();
        let transform = entity.transform.as_ref().unwrap();
        assert_eq!(transform.change_id(), 2);
        assert!((transform.forward() - Vec3::X).length() < 1e-5);
        let (written, expected) = synced_light(&pool, entity);
        assert_eq!(written, expected);

        let writes = pool.sink().write_count();
        registry.execute_update(0.5);
        let entity = registry.entity(id).unwrap();
        assert_eq!(entity.transform.as_ref().unwrap().change_id(), 3);
        assert_eq!(pool.sink().write_count(), writes + 1);
        let (written, expected) = synced_light(&pool, entity);
        assert_eq!(written, expected);
    }

    #[test]
    fn test_scale_velocity_resyncs_light() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(ApplyScaleVelocitySystem));
        let pool = light_pool(&mut registry);

        let id = registry.create_entity();
        let entity = registry.entity_mut(id).unwrap();
        entity.transform = Some(Transform::default());
        entity.scale_velocity = Some(ScaleVelocity(Vec3::splat(2.0)));
        entity.light = Some(Pooled::new(Light::point(5.0, Vec3::ONE, 1.0)));

        registry.execute_update(0.25);
        let writes = pool.sink().write_count();
        registry.execute_update(0.25);

        let entity = registry.entity(id).unwrap();
        let transform = entity.transform.as_ref().unwrap();
        assert_eq!(transform.scale(), Vec3::splat(2.0));
        assert_eq!(transform.change_id(), 3);
        assert_eq!(pool.sink().write_count(), writes + 1);
        assert!(!entity.light.as_ref().unwrap().needs_sync(transform));
    }

    #[test]
    fn test_life_time_erases() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(LifeTimeSystem));

        let short: Vec<_> = (0..300).map(|_| {
            let id = registry.create_entity();
            registry.entity_mut(id).unwrap().life_time = Some(LifeTime::new(0.1));
            id
        }).collect();
        let long = registry.create_entity();
        registry.entity_mut(long).unwrap().life_time = Some(LifeTime::new(10.0));

        registry.execute_update(0.05);
        assert_eq!(registry.len(), 301);

        // 300 concurrent requests overflow the primary queue into the fallback.
        registry.execute_update(0.1);
        let dropped = registry.erase_queue().dropped_count();
        assert_eq!(registry.len(), 1 + dropped);
        assert!(registry.is_alive(long));
        assert!(short.iter().filter(|id| registry.is_alive(**id)).count() == dropped);
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_light_fades() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(LifeTimeLightIntensitySystem));

        let id = registry.create_entity();
        let entity = registry.entity_mut(id).unwrap();
        entity.life_time = Some(LifeTime::new(2.0));
        entity.life_time_light = Some(LifeTimeLightIntensity { start: 10.0, end: 0.0 });
        entity.light = Some(Pooled::new(Light::point(1.0, Vec3::ONE, 10.0)));

        entity.life_time.as_mut().unwrap().tick(0.5);
        registry.execute_update(0.0);

        let light = registry.entity(id).unwrap().light.as_ref().unwrap();
        assert_eq!(light.value().intensity, 7.5);
        assert!(light.is_dirty());
    }

    #[test]
    fn test_shockwave_expands_then_erases() {
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(ShockwaveExpandingAnimatorSystem));

        let id = registry.create_entity();
        let entity = registry.entity_mut(id).unwrap();
        entity.transform = Some(Transform::default());
        entity.shockwave = Some(Pooled::new(Shockwave::new(0.0, 1.0, 1.0)));
        entity.shockwave_animator = Some(ShockwaveExpandingAnimator::new(1.0, 1.0, 1.0, 4.0));

        registry.execute_update(0.1);
        let radius = registry.entity(id).unwrap().shockwave.as_ref().unwrap().value().radius;
        assert!(radius > 0.0 && radius < 1.0);

        for _ in 0..100 {
            registry.execute_update(0.1);
        }
        assert!(!registry.is_alive(id));
    }

    #[test]
    fn test_orbital_pair_attracts() {
        let mut registry = Registry::new();
        let gravity = OrbitalGravity::with_constant(1.0);
        register(&mut registry, gravity.gather());
        register(&mut registry, gravity.apply());

        let spawn = |registry: &mut Registry, x: f32, mass: f64| {
            let id = registry.create_entity();
            let entity = registry.entity_mut(id).unwrap();
            entity.transform = Some(Transform::from_position(Vec3::new(x, 0.0, 0.0)));
            entity.velocity = Some(Velocity::default());
            entity.orbital = Some(OrbitalBody { mass });
            id
        };
        let light = spawn(&mut registry, 0.0, 1.0);
        let heavy = spawn(&mut registry, 2.0, 4.0);

        registry.execute_update(1.0);

        assert_eq!(gravity.acceleration(light), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(gravity.acceleration(heavy), Some(Vec3::new(-0.25, 0.0, 0.0)));

        let velocity = registry.entity(light).unwrap().velocity.unwrap();
        assert_eq!(velocity.0, Vec3::new(1.0, 0.0, 0.0));
        let velocity = registry.entity(heavy).unwrap().velocity.unwrap();
        assert_eq!(velocity.0, Vec3::new(-0.25, 0.0, 0.0));
    }

    #[test]
    fn test_coincident_bodies_ignored() {
        let gravity = OrbitalGravity::new();
        let gather = gravity.gather();
        let mut registry = Registry::new();
        for _ in 0..2 {
            let id = registry.create_entity();
            let entity = registry.entity_mut(id).unwrap();
            entity.transform = Some(Transform::default());
            entity.velocity = Some(Velocity::default());
            entity.orbital = Some(OrbitalBody { mass: 1.0 });
        }

        registry.execute_update_system(gather.as_ref(), 1.0);
        let id = registry.entities()[0].id();
        assert_eq!(gravity.acceleration(id), Some(Vec3::ZERO));
    }
}
