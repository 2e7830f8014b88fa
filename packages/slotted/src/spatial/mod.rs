//! Spatial indexing for broad-phase proximity queries.

pub use aabb::Aabb;
pub use octree::{OcTree, TreeProcessor};

mod aabb;
pub mod octree;
