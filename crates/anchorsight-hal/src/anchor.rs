//! Generic `AnchorProvider` trait for world-anchor persistence.
//!
//! A [`WorldAnchor`] pins a transform to the physical environment.  The
//! provider persists anchors so that content bound to them reappears at the
//! same physical location in later sessions.  Devices cap the number of
//! anchors an app may hold; exceeding the cap yields
//! [`AnchorError::CapacityExceeded`].

use anchorsight_perception::Transform3D;
use anchorsight_types::AnchorId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A durable anchor: identity plus its pose in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldAnchor {
    pub id: AnchorId,
    pub origin_from_anchor: Transform3D,
}

impl WorldAnchor {
    /// A new anchor with a provisionally generated identity.
    pub fn new(origin_from_anchor: Transform3D) -> Self {
        Self {
            id: AnchorId::new(),
            origin_from_anchor,
        }
    }
}

/// Failures reported by an anchor provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnchorError {
    #[error("world anchor limit reached")]
    CapacityExceeded,
    #[error("{0}")]
    Provider(String),
}

/// A world-anchor persistence backend.
#[async_trait]
pub trait AnchorProvider: Send + Sync {
    /// Persist `anchor`.
    ///
    /// # Errors
    ///
    /// [`AnchorError::CapacityExceeded`] when the anchor budget is spent,
    /// [`AnchorError::Provider`] for every other failure.
    async fn add_anchor(&self, anchor: WorldAnchor) -> Result<(), AnchorError>;

    /// Forget the anchor with identity `id`.  Removing an unknown anchor is
    /// not an error.
    async fn remove_anchor(&self, id: AnchorId) -> Result<(), AnchorError>;

    /// Every anchor currently persisted, oldest first.
    async fn anchors(&self) -> Result<Vec<WorldAnchor>, AnchorError>;
}
