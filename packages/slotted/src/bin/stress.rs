use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use slotted::{LifeTime, Registry, SystemRegistration, Transform};
use slotted::systems::LifeTimeSystem;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut registry = Registry::new();
    registry.register_system(SystemRegistration::new().update(Arc::new(LifeTimeSystem)));

    let mut to_delete = Vec::new();

    for round in 0..8 {
        for id in to_delete.drain(..) {
            registry.erase_entity(id);
        }

        for idx in 0..512 {
            let id = registry.create_entity();
            let entity = registry.entity_mut(id).expect("just created");
            entity.transform = Some(Transform::default());

            if idx % 12 == 11 {
                to_delete.push(id);
            } else if idx % 3 == 0 {
                entity.life_time = Some(LifeTime::new(0.5));
            }
        }

        registry.execute_update(0.2);
        info!(round, entities = registry.len(), dropped = registry.erase_queue().dropped_count(), "tick");
    }

    assert!(registry.check_invariants());
    println!("registry: {} entities", registry.len());
}
