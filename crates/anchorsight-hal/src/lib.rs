//! `anchorsight-hal` – Device collaborator boundary.
//!
//! The head-worn device exposes two providers the engine depends on but does
//! not implement: world tracking (device poses) and world-anchor persistence.
//! Both are expressed as async traits so real platform bindings and the
//! in-process simulators are interchangeable.
//!
//! # Modules
//!
//! - [`pose`] – [`PoseSource`][pose::PoseSource]: timestamped device poses
//!   with a tracked/untracked flag.
//! - [`anchor`] – [`AnchorProvider`][anchor::AnchorProvider]: adds, removes
//!   and lists durable [`WorldAnchor`][anchor::WorldAnchor]s, failing with
//!   [`AnchorError::CapacityExceeded`][anchor::AnchorError::CapacityExceeded]
//!   when the device's anchor budget is spent.
//! - [`sim`] – scripted pose sources and an in-memory anchor provider for
//!   headless runs and tests.

pub mod anchor;
pub mod pose;
pub mod sim;

pub use anchor::{AnchorError, AnchorProvider, WorldAnchor};
pub use pose::{PoseSample, PoseSource};
