use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use glam::{Vec3, Vec4};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotted::{
    Aabb, AabbCollider, DenseSyncedPool, EntityId, MemorySink, OcTree, OcTreeConfig, OrbitalBody,
    Pooled, Registry, SphereParticle, SystemRegistration, Transform, Velocity,
};
use slotted::systems::{ApplyVelocitySystem, OrbitalGravity};

const TIME_STEP: f32 = 1.0;

/// Erase the lighter of every pair of overlapping bodies.
fn resolve_collisions(registry: &mut Registry, tree: &mut OcTree<(EntityId, Aabb, f64)>) {
    tree.clear();

    let ids: Vec<EntityId> = registry.entities().iter().map(|e| e.id()).collect();
    let mut bodies = Vec::with_capacity(ids.len());
    for id in ids {
        let entity = match registry.entity_mut(id) {
            Some(entity) => entity,
            None => continue,
        };
        let mass = match entity.orbital {
            Some(orbital) => orbital.mass,
            None => continue,
        };
        if let (Some(transform), Some(collider)) = (entity.transform.as_ref(), entity.collider.as_mut()) {
            let aabb = collider.aabb(transform);
            tree.insert(aabb, (id, aabb, mass));
            bodies.push((id, aabb, mass));
        }
    }

    for (id, aabb, mass) in bodies.iter() {
        tree.for_each_candidate(aabb, |(other, other_aabb, other_mass)| {
            let heavier = *other_mass > *mass || (*other_mass == *mass && other < id);
            if other != id && heavier && aabb.intersects(other_aabb) {
                registry.enqueue_erase_entity(*id);
            }
        });
    }

    registry.drain_erase_queue();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut registry = Registry::new();
    let gravity = OrbitalGravity::with_constant(10.0);
    let particles = Arc::new(DenseSyncedPool::<SphereParticle, _>::new(MemorySink::new()));

    registry.register_system(SystemRegistration::new().update(gravity.gather()));
    registry.register_system(SystemRegistration::new().update(gravity.apply()));
    registry.register_system(SystemRegistration::new().update(Arc::new(ApplyVelocitySystem)));
    registry.register_system(SystemRegistration::new()
        .update(particles.clone())
        .erase_listener(particles.clone()));

    // Populate registry!
    const SQRT_NUM_ENTITIES: usize = 8;
    const SPACING: f32 = 2.0 / ((SQRT_NUM_ENTITIES - 1) as f32);

    for x in 0..SQRT_NUM_ENTITIES {
        for y in 0..SQRT_NUM_ENTITIES {
            let x = ((x as f32) * SPACING) - 1.0;
            let y = ((y as f32) * SPACING) - 1.0;

            let id = registry.create_entity();
            let entity = registry.entity_mut(id).expect("just created");
            entity.transform = Some(Transform::from_position(Vec3::new(x, y, 0.0)));
            entity.velocity = Some(Velocity(Vec3::new(y * 0.003, -x * 0.003, 0.0)));
            entity.orbital = Some(OrbitalBody { mass: 0.00001 });
            entity.collider = Some(AabbCollider::new(Vec3::splat(0.01), Vec3::splat(-0.01)));
            entity.particle = Some(Pooled::new(SphereParticle::new(0.01, Vec4::ONE, Vec4::ZERO)));
        }
    }

    let mut tree = OcTree::with_config(&OcTreeConfig {
        initial_root_size: 4.0,
        ..OcTreeConfig::default()
    });

    const SIZE: (i32, i32) = (500, 500);
    const OFFSET: (f32, f32) = (250.0, 250.0);
    const SCALE: (f32, f32) = (200.0, 200.0);
    const NUM_ITER: usize = 100;

    let mut dest = std::io::stdout();
    let mut last_positions = HashMap::new();

    writeln!(&mut dest, "<?xml version=\"1.0\" standalone=\"no\"?>")?;
    writeln!(&mut dest, "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.0//EN\" \"http://www.w3.org/TR/2001/REC-SVG-20010904/DTD/svg10.dtd\">")?;
    write!(&mut dest, "<svg xmlns=\"http://www.w3.org/2000/svg\" height=\"{}\" width=\"{}\">", SIZE.0, SIZE.1)?;
    write!(&mut dest, "<rect width=\"100%\" height=\"100%\" fill=\"black\"/>")?;

    for iter in 0..NUM_ITER {
        for _ in 0..10usize {
            registry.execute_update(TIME_STEP);
            resolve_collisions(&mut registry, &mut tree);
        }

        info!(iter, bodies = registry.len(), particles = particles.len(), "step");

        // Render result!
        for entity in registry.entities() {
            let (transform, velocity) = match (entity.transform.as_ref(), entity.velocity.as_ref()) {
                (Some(t), Some(v)) => (t, v),
                _ => continue,
            };

            let position = transform.position();
            let a = 1.0 - (velocity.0.length() / 0.03).clamp(0.0, 0.7);

            if let Some(last) = last_positions.get(&entity.id()) {
                let last: &Vec3 = last;
                write!(&mut dest,
                       "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" style=\"stroke:rgba(255,0,0,{});stroke-width:1\" />",
                       last.x * SCALE.0 + OFFSET.0, last.y * SCALE.1 + OFFSET.1,
                       position.x * SCALE.0 + OFFSET.0, position.y * SCALE.1 + OFFSET.1, a)?;
            }

            last_positions.insert(entity.id(), position);
        }
    }

    write!(&mut dest, "</svg>")?;
    Ok(())
}
