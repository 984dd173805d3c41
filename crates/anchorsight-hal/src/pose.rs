//! Generic `PoseSource` trait for world-tracking providers.
//!
//! The selection loop calls [`PoseSource::sample`] once per tick.  A provider
//! may have no pose for the requested instant (tracking is initialising or
//! the device lost its map) or may return a pose flagged as untracked; both
//! are transient gaps the loop tolerates.

use anchorsight_perception::Transform3D;
use anchorsight_types::SightError;
use async_trait::async_trait;

/// A single device pose reported by world tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Seconds since the tracking session started.
    pub timestamp: f64,
    /// Device frame expressed in world space.
    pub origin_from_device: Transform3D,
    /// `false` when the provider has a stale or low-confidence estimate.
    pub is_tracked: bool,
}

impl PoseSample {
    pub fn tracked(timestamp: f64, origin_from_device: Transform3D) -> Self {
        Self {
            timestamp,
            origin_from_device,
            is_tracked: true,
        }
    }

    pub fn untracked(timestamp: f64, origin_from_device: Transform3D) -> Self {
        Self {
            timestamp,
            origin_from_device,
            is_tracked: false,
        }
    }
}

/// A world-tracking provider that can be queried for the device pose.
#[async_trait]
pub trait PoseSource: Send + Sync {
    /// `false` while the provider is not running; the selection loop skips
    /// such ticks entirely.
    fn is_running(&self) -> bool {
        true
    }

    /// Query the device pose at `timestamp` (seconds since session start).
    ///
    /// # Errors
    ///
    /// Returns [`SightError::PoseUnavailable`] when the provider itself
    /// failed.  Callers treat this like a missing pose.
    async fn sample(&self, timestamp: f64) -> Result<Option<PoseSample>, SightError>;
}
