//! `anchorsight-perception` – Spatial math and the scene service.
//!
//! Turns device poses and object placements into the geometry the selection
//! loop needs to answer "what is the wearer looking at?".
//!
//! # Modules
//!
//! - [`transform`] – [`Transform3D`][transform::Transform3D]: scaled rigid
//!   transforms (translation, quaternion rotation, scale) with composition,
//!   inversion and 4x4 matrix conversion.
//! - [`scene`] – [`SceneGraph`][scene::SceneGraph]: an in-memory entity
//!   hierarchy implementing the [`Scene`][scene::Scene] service, including
//!   nearest-hit raycasts filtered by [`CollisionGroup`][scene::CollisionGroup].

pub mod scene;
pub mod transform;

pub use scene::{Aabb, CollisionGroup, EntityId, RaycastHit, Scene, SceneGraph, SceneNode};
pub use transform::{Quaternion, Transform3D, Vec3};
