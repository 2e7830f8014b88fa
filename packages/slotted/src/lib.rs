//! An entity registry with parallel update systems, component pools kept in
//! sync with external buffers, and an octree for broad-phase queries.

pub use component::{
    AabbCollider,
    LifeTime,
    LifeTimeLightIntensity,
    OrbitalBody,
    RotationalVelocity,
    ScaleVelocity,
    ShockwaveExpandingAnimator,
    Transform,
    Velocity,
};
pub use config::{CoreConfig, OcTreeConfig, PoolConfig, RegistryConfig};
pub use entity::{Entity, EntityId};
pub use erase_queue::EraseQueue;
pub use error::{Error, Result};
pub use pool::{
    BufferSink,
    DenseSyncedPool,
    Light,
    LightType,
    MemorySink,
    PoolLayout,
    Pooled,
    Shockwave,
    SphereParticle,
    SyncedRecord,
};
pub use registry::Registry;
pub use spatial::{Aabb, OcTree, TreeProcessor};
pub use system::{
    DrawSystem,
    EraseListener,
    SystemRegistration,
    TickContext,
    UpdateSystem,
};

pub mod component;
pub mod config;
mod entity;
mod error;

mod erase_queue;
pub mod registry;
pub mod system;
pub mod systems;

pub mod pool;
pub mod spatial;
