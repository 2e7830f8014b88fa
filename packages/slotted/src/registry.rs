//! The entity registry.
//!
//! Entities live packed in a `Vec`, so systems can iterate them in parallel
//! without holes. Erasing swap-removes, which moves the last entity into the
//! vacated slot. Handles are resolved through a separate id table which is
//! rewritten on every move, so an `EntityId` held across an erase either
//! still finds its entity or, if that entity is gone, finds nothing.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{trace, warn};

use crate::config::RegistryConfig;
use crate::entity::{Entity, EntityId};
use crate::erase_queue::EraseQueue;
use crate::system::{DrawSystem, EraseListener, SystemRegistration, TickContext, UpdateSystem};

#[derive(Debug, Clone, Copy)]
struct IdSlot {
    generation: u32,
    /// Position in the dense store while the entity is alive.
    slot_index: Option<u32>,
}

/// Owns every entity and drives the registered systems over them.
pub struct Registry {
    entities: Vec<Entity>,
    ids: Vec<IdSlot>,
    free_ids: Vec<u32>,
    update_systems: Vec<Arc<dyn UpdateSystem>>,
    draw_systems: Vec<Arc<dyn DrawSystem>>,
    erase_listeners: Vec<Arc<dyn EraseListener>>,
    erase_queue: EraseQueue,
}

impl Registry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Registry {
        Registry::with_config(&RegistryConfig::default())
    }

    /// Create an empty registry.
    pub fn with_config(config: &RegistryConfig) -> Registry {
        Registry {
            entities: Vec::new(),
            ids: Vec::new(),
            free_ids: Vec::new(),
            update_systems: Vec::new(),
            draw_systems: Vec::new(),
            erase_listeners: Vec::new(),
            erase_queue: EraseQueue::with_config(config),
        }
    }

    /// The number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All live entities, in store order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The deferred erase queue.
    pub fn erase_queue(&self) -> &EraseQueue {
        &self.erase_queue
    }

    fn resolve(&self, id: EntityId) -> Option<usize> {
        let slot = self.ids.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.slot_index.map(|i| i as usize)
    }

    /// Returns true if `id` refers to a live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.resolve(id).is_some()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.resolve(id).map(|i| &self.entities[i])
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let index = self.resolve(id)?;
        Some(&mut self.entities[index])
    }

    /// Append a new, empty entity.
    pub fn create_entity(&mut self) -> EntityId {
        let slot_index = self.entities.len() as u32;
        let id = match self.free_ids.pop() {
            Some(index) => {
                let slot = &mut self.ids[index as usize];
                slot.slot_index = Some(slot_index);
                EntityId::from_raw(index, slot.generation)
            },
            None => {
                let index = self.ids.len() as u32;
                self.ids.push(IdSlot {
                    generation: 0,
                    slot_index: Some(slot_index),
                });
                EntityId::from_raw(index, 0)
            },
        };

        self.entities.push(Entity::new(id, slot_index));
        id
    }

    /// Erase an entity immediately.
    ///
    /// Every erase listener sees the entity before it is removed. Returns
    /// false, doing nothing, if the entity was already erased.
    pub fn erase_entity(&mut self, id: EntityId) -> bool {
        let slot_index = match self.resolve(id) {
            Some(i) => i,
            None => return false,
        };

        let entity = &self.entities[slot_index];
        if entity.is_expired() {
            return false;
        }

        for listener in self.erase_listeners.iter() {
            listener.on_erase(entity);
        }

        let mut removed = self.entities.swap_remove(slot_index);
        removed.expire();

        if let Some(moved) = self.entities.get_mut(slot_index) {
            moved.set_slot_index(slot_index as u32);
            self.ids[moved.id().index() as usize].slot_index = Some(slot_index as u32);
        }

        let freed = &mut self.ids[id.index() as usize];
        freed.slot_index = None;
        freed.generation = freed.generation.wrapping_add(1);
        self.free_ids.push(id.index());

        debug_assert!(self.entities.get(slot_index)
            .map_or(true, |e| e.slot_index() as usize == slot_index));
        true
    }

    /// Queue an entity to be erased at the end of the next update.
    ///
    /// Safe to call concurrently. Requests dropped under overload are logged.
    pub fn enqueue_erase_entity(&self, id: EntityId) {
        let _ = self.erase_queue.push(id);
    }

    /// Erase everything in the erase queue, returning how many entities
    /// were actually erased.
    pub fn drain_erase_queue(&mut self) -> usize {
        let queued = self.erase_queue.drain();
        let requested = queued.len();
        let erased = queued.into_iter()
            .filter(|id| self.erase_entity(*id))
            .count();
        trace!("drained {} erase requests, erased {} entities", requested, erased);
        erased
    }

    /// Add a system in each role it was registered for.
    pub fn register_system(&mut self, registration: SystemRegistration) {
        if registration.is_empty() {
            warn!("ignoring system registration with no roles");
            return;
        }

        let SystemRegistration { update, draw, erase_listener } = registration;
        self.update_systems.extend(update);
        self.draw_systems.extend(draw);
        self.erase_listeners.extend(erase_listener);
    }

    /// Run one update tick.
    ///
    /// Each update system runs in registration order, in parallel across
    /// entities. Queued erasures are applied once all of them are done.
    pub fn execute_update(&mut self, delta_seconds: f32) {
        let ctx = TickContext::new(delta_seconds, &self.erase_queue);
        for system in self.update_systems.iter() {
            run_update(&mut self.entities, system.as_ref(), &ctx);
        }

        self.drain_erase_queue();
    }

    /// Run a single unregistered update system over every entity.
    ///
    /// Erasures it queues are applied at the end of the next update tick.
    pub fn execute_update_system(&mut self, system: &dyn UpdateSystem, delta_seconds: f32) {
        let ctx = TickContext::new(delta_seconds, &self.erase_queue);
        run_update(&mut self.entities, system, &ctx);
    }

    /// Run every draw system, in registration order.
    pub fn execute_draw(&self) {
        for system in self.draw_systems.iter() {
            self.execute_draw_system(system.as_ref());
        }
    }

    /// Run a single draw system over every entity, in store order.
    pub fn execute_draw_system(&self, system: &dyn DrawSystem) {
        for entity in self.entities.iter() {
            if !entity.is_expired() && system.is_target(entity) {
                system.apply(entity);
            }
        }
        system.on_done();
    }

    /// Drop every entity, system and queued erasure.
    ///
    /// Erase listeners are not notified: they are discarded along with
    /// everything else.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.ids.clear();
        self.free_ids.clear();
        self.update_systems.clear();
        self.draw_systems.clear();
        self.erase_listeners.clear();
        self.erase_queue.clear();
    }

    /// Check that every entity's slot index matches its position and that
    /// its handle resolves back to it.
    pub fn check_invariants(&self) -> bool {
        self.entities.iter()
            .enumerate()
            .all(|(i, e)| e.slot_index() as usize == i
                && !e.is_expired()
                && self.resolve(e.id()) == Some(i))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

fn run_update(entities: &mut [Entity], system: &dyn UpdateSystem, ctx: &TickContext<'_>) {
    entities.par_iter_mut()
        .filter(|entity| !entity.is_expired() && system.is_target(entity))
        .for_each(|entity| system.apply(entity, ctx));
    system.on_done();
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;
    use crate::component::LifeTime;

    #[derive(Default)]
    struct CountingListener {
        erased: Mutex<Vec<EntityId>>,
    }

    impl EraseListener for CountingListener {
        fn on_erase(&self, entity: &Entity) {
            assert!(!entity.is_expired());
            self.erased.lock().push(entity.id());
        }
    }

    /// Erases every entity with a lifetime.
    #[derive(Default)]
    struct EraseMarked {
        done: AtomicUsize,
    }

    impl UpdateSystem for EraseMarked {
        fn is_target(&self, entity: &Entity) -> bool {
            entity.life_time.is_some()
        }

        fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>) {
            // Requests are deferred, so the entity is still intact here.
            ctx.enqueue_erase(entity.id());
            ctx.enqueue_erase(entity.id());
        }

        fn on_done(&self) {
            self.done.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct DrawOrder {
        seen: Mutex<Vec<u32>>,
        done: AtomicUsize,
    }

    impl DrawSystem for DrawOrder {
        fn is_target(&self, _entity: &Entity) -> bool {
            true
        }

        fn apply(&self, entity: &Entity) {
            self.seen.lock().push(entity.slot_index());
        }

        fn on_done(&self) {
            self.done.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn with_entities(n: usize) -> (Registry, Vec<EntityId>) {
        let mut registry = Registry::new();
        let ids = (0..n).map(|_| registry.create_entity()).collect();
        (registry, ids)
    }

    #[test]
    fn test_create_assigns_slots() {
        let (registry, ids) = with_entities(4);
        assert_eq!(registry.len(), 4);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(registry.entity(*id).unwrap().slot_index() as usize, i);
        }
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_erase_moves_last() {
        let (mut registry, ids) = with_entities(16);
        assert!(registry.erase_entity(ids[5]));

        assert_eq!(registry.len(), 15);
        assert_eq!(registry.entity(ids[15]).unwrap().slot_index(), 5);
        assert_eq!(registry.entities()[5].id(), ids[15]);
        assert!(!registry.is_alive(ids[5]));
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_erase_last() {
        let (mut registry, ids) = with_entities(3);
        assert!(registry.erase_entity(ids[2]));
        assert_eq!(registry.len(), 2);
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_double_erase() {
        let (mut registry, ids) = with_entities(3);
        let listener = Arc::new(CountingListener::default());
        registry.register_system(SystemRegistration::new().erase_listener(listener.clone()));

        assert!(registry.erase_entity(ids[0]));
        assert!(!registry.erase_entity(ids[0]));
        assert_eq!(*listener.erased.lock(), vec![ids[0]]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_are_recycled() {
        let (mut registry, ids) = with_entities(2);
        registry.erase_entity(ids[0]);

        let reused = registry.create_entity();
        assert_eq!(reused.index(), ids[0].index());
        assert_ne!(reused.generation(), ids[0].generation());
        assert!(registry.entity(ids[0]).is_none());
        assert!(registry.is_alive(reused));

        // The stale handle must not erase the new entity.
        assert!(!registry.erase_entity(ids[0]));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_enqueued_erase_applies_once() {
        let (mut registry, ids) = with_entities(8);
        let listener = Arc::new(CountingListener::default());
        let marker = Arc::new(EraseMarked::default());
        registry.register_system(SystemRegistration::new()
            .update(marker.clone())
            .erase_listener(listener.clone()));

        for id in ids.iter().step_by(2) {
            registry.entity_mut(*id).unwrap().life_time = Some(LifeTime::new(1.0));
        }
        registry.enqueue_erase_entity(ids[0]);

        registry.execute_update(0.016);

        assert_eq!(marker.done.load(Ordering::Relaxed), 1);
        assert_eq!(registry.len(), 4);
        let mut erased = listener.erased.lock().clone();
        erased.sort();
        assert_eq!(erased, ids.iter().step_by(2).copied().collect::<Vec<_>>());
        assert!(ids.iter().skip(1).step_by(2).all(|id| registry.is_alive(*id)));
        assert!(registry.erase_queue().is_empty());
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_concurrent_enqueue() {
        let (mut registry, ids) = with_entities(300);
        let requested = &ids[..200];

        requested.par_iter().for_each(|id| registry.enqueue_erase_entity(*id));
        let dropped = registry.erase_queue().dropped_count();
        let erased = registry.drain_erase_queue();

        assert_eq!(erased + dropped, 200);
        assert!(ids[200..].iter().all(|id| registry.is_alive(*id)));
        assert_eq!(registry.len(), 300 - erased);
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_execute_update_system() {
        let (mut registry, ids) = with_entities(3);
        registry.entity_mut(ids[1]).unwrap().life_time = Some(LifeTime::new(1.0));

        let marker = EraseMarked::default();
        registry.execute_update_system(&marker, 0.016);
        assert_eq!(marker.done.load(Ordering::Relaxed), 1);

        // Not yet drained.
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.erase_queue().len(), 2);
        assert_eq!(registry.drain_erase_queue(), 1);
        assert!(!registry.is_alive(ids[1]));
    }

    #[test]
    fn test_draw_in_store_order() {
        let (mut registry, ids) = with_entities(5);
        let draw = Arc::new(DrawOrder::default());
        registry.register_system(SystemRegistration::new().draw(draw.clone()));
        registry.erase_entity(ids[1]);

        registry.execute_draw();
        assert_eq!(*draw.seen.lock(), vec![0, 1, 2, 3]);
        assert_eq!(draw.done.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reset() {
        let (mut registry, ids) = with_entities(5);
        registry.register_system(SystemRegistration::new()
            .erase_listener(Arc::new(CountingListener::default())));
        registry.enqueue_erase_entity(ids[0]);

        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.erase_queue().is_empty());
        assert!(!registry.is_alive(ids[0]));

        let id = registry.create_entity();
        assert_eq!(registry.entity(id).unwrap().slot_index(), 0);
    }

    proptest! {
        #[test]
        fn test_slots_stay_dense(ops in proptest::collection::vec((any::<bool>(), 0usize..64), 1..128)) {
            let mut registry = Registry::new();
            let mut alive: Vec<EntityId> = Vec::new();

            for (create, pick) in ops {
                if create || alive.is_empty() {
                    alive.push(registry.create_entity());
                } else {
                    let id = alive.swap_remove(pick % alive.len());
                    prop_assert!(registry.erase_entity(id));
                }

                prop_assert!(registry.check_invariants());
                prop_assert_eq!(registry.len(), alive.len());
            }

            for id in alive {
                prop_assert!(registry.is_alive(id));
            }
        }
    }
}
