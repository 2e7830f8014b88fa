//! Entities and the handles used to refer to them.
//!
//! An `Entity` lives in the registry's dense store and carries its own
//! `slot_index`, which is rewritten whenever a swap-remove moves it. Code
//! outside the registry holds an `EntityId` instead: a generational handle
//! which stops resolving once the entity is erased, even if its id slot is
//! later recycled.

use std::fmt;

use crate::component::{
    AabbCollider, LifeTime, LifeTimeLightIntensity, OrbitalBody, RotationalVelocity, ScaleVelocity,
    ShockwaveExpandingAnimator, Transform, Velocity,
};
use crate::pool::{Light, Pooled, Shockwave, SphereParticle};

/// A generational handle to an entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Create an `EntityId` from its raw parts.
    pub fn from_raw(index: u32, generation: u32) -> EntityId {
        EntityId { index, generation }
    }

    /// The id slot this handle resolves through.
    ///
    /// This is not the entity's position in the dense store.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of the id slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A single entity and the components it owns.
///
/// Component slots are public and assigned directly by calling code. Systems
/// decide what they operate on with their `is_target` predicate; nothing else
/// guards against a missing component.
#[derive(Debug, Default)]
pub struct Entity {
    id: EntityId,
    slot_index: u32,
    expired: bool,

    pub transform: Option<Transform>,
    pub velocity: Option<Velocity>,
    pub rotational_velocity: Option<RotationalVelocity>,
    pub scale_velocity: Option<ScaleVelocity>,
    pub life_time: Option<LifeTime>,
    pub life_time_light: Option<LifeTimeLightIntensity>,
    pub collider: Option<AabbCollider>,
    pub orbital: Option<OrbitalBody>,
    pub light: Option<Pooled<Light>>,
    pub shockwave: Option<Pooled<Shockwave>>,
    pub shockwave_animator: Option<ShockwaveExpandingAnimator>,
    pub particle: Option<Pooled<SphereParticle>>,
}

impl Entity {
    /// Create an empty entity at a given dense position.
    pub(crate) fn new(id: EntityId, slot_index: u32) -> Entity {
        Entity {
            id,
            slot_index,
            ..Entity::default()
        }
    }

    /// The handle for this entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// This entity's position in the registry's dense store.
    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    /// Returns true once the entity has been erased.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub(crate) fn set_slot_index(&mut self, slot_index: u32) {
        self.slot_index = slot_index;
    }

    pub(crate) fn expire(&mut self) {
        self.expired = true;
    }
}

impl Default for EntityId {
    fn default() -> Self {
        EntityId::from_raw(u32::MAX, 0)
    }
}
