//! `anchorsight-kernel` – Object bookkeeping & anchor binding.
//!
//! Owns every piece of mutable state the engine shares between tasks and
//! enforces the invariants that tie it together.
//!
//! # Modules
//!
//! - [`registry`] – [`ObjectRegistry`][registry::ObjectRegistry]: dense
//!   handle table of tracked objects plus the entity→handle map used to
//!   resolve raycast hits.
//! - [`selection`] – [`SelectionState`][selection::SelectionState]: the
//!   single-writer/multi-reader highlight cell read by the UI.
//! - [`world`] – [`World`][world::World] / [`SharedWorld`][world::SharedWorld]:
//!   scene, registry, selection and the pending-bind table behind one lock.
//!   Removing an object clears a matching highlight in the same critical
//!   section, so the UI never sees a highlight on a removed object.
//! - [`anchor_binding`] – [`AnchorBindingService`][anchor_binding::AnchorBindingService]:
//!   asynchronously binds objects to durable world anchors, handling
//!   capacity exhaustion and provider failures.

pub mod anchor_binding;
pub mod registry;
pub mod selection;
pub mod world;

pub use anchor_binding::{AnchorBindingService, BindFailurePolicy};
pub use registry::{NewObject, ObjectRegistry, PlacementState, TrackedObject};
pub use selection::{Highlight, SelectionReader, SelectionSnapshot, SelectionState};
pub use world::{SharedWorld, World};
