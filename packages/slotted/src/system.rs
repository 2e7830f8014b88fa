//! Systems and how they are registered.

use std::sync::Arc;

use tracing::warn;

use crate::entity::{Entity, EntityId};
use crate::erase_queue::EraseQueue;

/// Per-tick state handed to every update system.
pub struct TickContext<'a> {
    delta_seconds: f32,
    erase_queue: &'a EraseQueue,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(delta_seconds: f32, erase_queue: &'a EraseQueue) -> TickContext<'a> {
        TickContext { delta_seconds, erase_queue }
    }

    /// Seconds elapsed since the previous tick.
    pub fn delta_seconds(&self) -> f32 {
        self.delta_seconds
    }

    /// Request that `entity` be erased once the update phase finishes.
    ///
    /// Safe to call from inside a parallel pass. Under extreme load the
    /// request may be dropped; that is logged by the queue.
    pub fn enqueue_erase(&self, entity: EntityId) {
        let _ = self.erase_queue.push(entity);
    }
}

/// A system run over every matching entity during the update phase.
///
/// `apply` is called from many threads at once, each with a different
/// entity. Any state shared between entities must be synchronized by the
/// system itself.
pub trait UpdateSystem: Send + Sync {
    /// Returns true if `apply` should be called for `entity`.
    fn is_target(&self, entity: &Entity) -> bool;

    fn apply(&self, entity: &mut Entity, ctx: &TickContext<'_>);

    /// Called once, on the driving thread, after every `apply` has returned.
    fn on_done(&self) {}
}

/// A system run serially, in store order, during the draw phase.
pub trait DrawSystem: Send + Sync {
    fn is_target(&self, entity: &Entity) -> bool;

    fn apply(&self, entity: &Entity);

    fn on_done(&self) {}
}

/// Notified synchronously as each entity is erased, while its components
/// are still intact.
pub trait EraseListener: Send + Sync {
    fn on_erase(&self, entity: &Entity);
}

/// A registration describing every role a system plays.
///
/// The same object may be registered in several roles by passing clones of
/// one `Arc`:
///
/// ```ignore
/// registry.register_system(SystemRegistration::new()
///     .update(pool.clone())
///     .erase_listener(pool));
/// ```
#[derive(Default)]
pub struct SystemRegistration {
    pub(crate) update: Option<Arc<dyn UpdateSystem>>,
    pub(crate) draw: Option<Arc<dyn DrawSystem>>,
    pub(crate) erase_listener: Option<Arc<dyn EraseListener>>,
}

impl SystemRegistration {
    /// Create an empty registration.
    pub fn new() -> SystemRegistration {
        SystemRegistration::default()
    }

    /// Register as an update system.
    pub fn update(mut self, system: Arc<dyn UpdateSystem>) -> Self {
        if self.update.is_some() {
            warn!("replacing update system in registration");
        }
        self.update = Some(system);
        self
    }

    /// Register as a draw system.
    pub fn draw(mut self, system: Arc<dyn DrawSystem>) -> Self {
        if self.draw.is_some() {
            warn!("replacing draw system in registration");
        }
        self.draw = Some(system);
        self
    }

    /// Register as an erase listener.
    pub fn erase_listener(mut self, listener: Arc<dyn EraseListener>) -> Self {
        if self.erase_listener.is_some() {
            warn!("replacing erase listener in registration");
        }
        self.erase_listener = Some(listener);
        self
    }

    /// Returns true if no role was given.
    pub fn is_empty(&self) -> bool {
        self.update.is_none() && self.draw.is_none() && self.erase_listener.is_none()
    }
}
