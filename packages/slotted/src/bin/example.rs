use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Quat, Vec3, Vec4};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotted::{
    CoreConfig, DenseSyncedPool, DrawSystem, Entity, LifeTime, LifeTimeLightIntensity, Light,
    MemorySink, Pooled, Registry, RotationalVelocity, ScaleVelocity, Shockwave, ShockwaveExpandingAnimator,
    SphereParticle, SystemRegistration, Transform, Velocity,
};
use slotted::systems::{
    ApplyScaleVelocitySystem, ApplyVelocitySystem, LifeTimeLightIntensitySystem, LifeTimeSystem,
    RotationalVelocitySystem, ShockwaveExpandingAnimatorSystem,
};

const CONFIG: &str = r#"
[registry]
erase_queue_capacity = 64

[pool]
initial_capacity = 4
"#;

/// Counts the lights it would submit.
#[derive(Default)]
struct LightCounter(AtomicUsize);

impl DrawSystem for LightCounter {
    fn is_target(&self, entity: &Entity) -> bool {
        entity.light.is_some()
    }

    fn apply(&self, _entity: &Entity) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn on_done(&self) {
        info!(lights = self.0.swap(0, Ordering::Relaxed), "draw");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CoreConfig::from_toml_str(CONFIG)?;
    let mut registry = Registry::with_config(&config.registry);

    let lights = Arc::new(DenseSyncedPool::<Light, _>::with_config(MemorySink::new(), &config.pool));
    let shockwaves = Arc::new(DenseSyncedPool::<Shockwave, _>::with_config(MemorySink::new(), &config.pool));
    let particles = Arc::new(DenseSyncedPool::<SphereParticle, _>::with_config(MemorySink::new(), &config.pool));

    registry.register_system(SystemRegistration::new().update(Arc::new(ApplyVelocitySystem)));
    registry.register_system(SystemRegistration::new().update(Arc::new(RotationalVelocitySystem)));
    registry.register_system(SystemRegistration::new().update(Arc::new(ApplyScaleVelocitySystem)));
    registry.register_system(SystemRegistration::new().update(Arc::new(LifeTimeSystem)));
    registry.register_system(SystemRegistration::new().update(Arc::new(LifeTimeLightIntensitySystem)));
    registry.register_system(SystemRegistration::new().update(Arc::new(ShockwaveExpandingAnimatorSystem)));
    registry.register_system(SystemRegistration::new()
        .update(lights.clone())
        .erase_listener(lights.clone()));
    registry.register_system(SystemRegistration::new()
        .update(shockwaves.clone())
        .erase_listener(shockwaves.clone()));
    registry.register_system(SystemRegistration::new()
        .update(particles.clone())
        .erase_listener(particles.clone()));
    registry.register_system(SystemRegistration::new().draw(Arc::new(LightCounter::default())));

    let sun = registry.create_entity();
    if let Some(entity) = registry.entity_mut(sun) {
        entity.transform = Some(Transform::new(Vec3::ZERO, Quat::from_rotation_x(-0.8), Vec3::ONE));
        entity.rotational_velocity = Some(RotationalVelocity(Vec3::new(0.0, 0.2, 0.0)));
        entity.light = Some(Pooled::new(Light::directional(Vec3::new(1.0, 0.95, 0.8), 1.0)));
    }

    for i in 0..12 {
        let angle = i as f32 * std::f32::consts::TAU / 12.0;
        let direction = Vec3::new(angle.cos(), 0.0, angle.sin());

        let id = registry.create_entity();
        if let Some(entity) = registry.entity_mut(id) {
            entity.transform = Some(Transform::from_position(direction));
            entity.velocity = Some(Velocity(direction * 2.0));
            entity.scale_velocity = Some(ScaleVelocity(Vec3::splat(-0.5)));
            entity.life_time = Some(LifeTime::new(0.5 + i as f32 * 0.1));
            entity.life_time_light = Some(LifeTimeLightIntensity { start: 4.0, end: 0.0 });
            entity.light = Some(Pooled::new(Light::point(3.0, Vec3::new(1.0, 0.5, 0.1), 4.0)));
            entity.particle = Some(Pooled::new(SphereParticle::new(0.2, Vec4::ONE, Vec4::new(1.0, 0.3, 0.0, 0.0))));
        }
    }

    let blast = registry.create_entity();
    if let Some(entity) = registry.entity_mut(blast) {
        entity.transform = Some(Transform::default());
        entity.shockwave = Some(Pooled::new(Shockwave::new(0.0, 1.0, 0.5)));
        entity.shockwave_animator = Some(ShockwaveExpandingAnimator::new(6.0, 0.5, 1.0, 8.0));
    }

    for tick in 0..30 {
        registry.execute_update(1.0 / 15.0);
        registry.execute_draw();

        info!(
            tick,
            entities = registry.len(),
            lights = lights.len(),
            shockwaves = shockwaves.len(),
            particles = particles.len(),
            light_bytes = lights.sink().bytes().len(),
            "update");
    }

    Ok(())
}
