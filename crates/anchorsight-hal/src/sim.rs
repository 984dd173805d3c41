//! In-process simulation drivers for CI/CD testing without a headset.
//!
//! - [`ScriptedPoseSource`] replays a fixed list of [`PoseStep`]s, one per
//!   sample, and counts how many samples were requested.
//! - [`SweepPoseSource`] produces a continuous head sweep left and right,
//!   used by the CLI demo session.
//! - [`SimAnchorProvider`] keeps anchors in memory, enforces a capacity limit
//!   and can be told to fail the next request.
//!
//! # Example
//!
//! ```rust
//! use anchorsight_hal::sim::{PoseStep, ScriptedPoseSource};
//! use anchorsight_perception::Transform3D;
//!
//! let source = ScriptedPoseSource::new()
//!     .then(PoseStep::Tracked(Transform3D::identity()))
//!     .then(PoseStep::Missing);
//! assert_eq!(source.remaining(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anchorsight_perception::{Quaternion, Transform3D, Vec3};
use anchorsight_types::{AnchorId, SightError};
use async_trait::async_trait;
use tracing::debug;

use crate::anchor::{AnchorError, AnchorProvider, WorldAnchor};
use crate::pose::{PoseSample, PoseSource};

// ────────────────────────────────────────────────────────────────────────────
// Scripted pose source
// ────────────────────────────────────────────────────────────────────────────

/// One scripted answer of a [`ScriptedPoseSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum PoseStep {
    Tracked(Transform3D),
    Untracked(Transform3D),
    /// No pose at all for this instant.
    Missing,
    /// The provider call itself fails.
    Fault(String),
}

/// A pose source that answers each sample with the next scripted step.
/// Once the script is exhausted every further sample is [`PoseStep::Missing`].
pub struct ScriptedPoseSource {
    steps: Mutex<VecDeque<PoseStep>>,
    samples_requested: AtomicUsize,
    running: AtomicBool,
}

impl ScriptedPoseSource {
    /// An empty, running script.
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            samples_requested: AtomicUsize::new(0),
            running: AtomicBool::new(true),
        }
    }

    /// Append a step to the script.
    pub fn then(self, step: PoseStep) -> Self {
        self.push(step);
        self
    }

    /// Append a step to a script that is already in use.
    pub fn push(&self, step: PoseStep) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// How many times [`PoseSource::sample`] has been called.
    pub fn samples_requested(&self) -> usize {
        self.samples_requested.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl Default for ScriptedPoseSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoseSource for ScriptedPoseSource {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn sample(&self, timestamp: f64) -> Result<Option<PoseSample>, SightError> {
        self.samples_requested.fetch_add(1, Ordering::AcqRel);
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(PoseStep::Missing);
        match step {
            PoseStep::Tracked(t) => Ok(Some(PoseSample::tracked(timestamp, t))),
            PoseStep::Untracked(t) => Ok(Some(PoseSample::untracked(timestamp, t))),
            PoseStep::Missing => Ok(None),
            PoseStep::Fault(cause) => Err(SightError::PoseUnavailable(cause)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sweep pose source
// ────────────────────────────────────────────────────────────────────────────

/// A standing wearer slowly turning their head left and right.
///
/// Yaw follows `amplitude · sin(2π · t / period)`; the device never loses
/// tracking.
#[derive(Debug, Clone, Copy)]
pub struct SweepPoseSource {
    pub eye_height: f32,
    pub amplitude_rad: f32,
    pub period_s: f32,
}

impl SweepPoseSource {
    pub fn new(eye_height: f32, amplitude_rad: f32, period_s: f32) -> Self {
        Self {
            eye_height,
            amplitude_rad,
            period_s,
        }
    }

    /// Device pose at `timestamp`.
    pub fn pose_at(&self, timestamp: f64) -> Transform3D {
        let phase = (timestamp as f32 / self.period_s.max(f32::EPSILON)) * std::f32::consts::TAU;
        let yaw = self.amplitude_rad * phase.sin();
        Transform3D::new(
            Vec3::new(0.0, self.eye_height, 0.0),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), yaw),
        )
    }
}

#[async_trait]
impl PoseSource for SweepPoseSource {
    async fn sample(&self, timestamp: f64) -> Result<Option<PoseSample>, SightError> {
        Ok(Some(PoseSample::tracked(timestamp, self.pose_at(timestamp))))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated anchor provider
// ────────────────────────────────────────────────────────────────────────────

/// An in-memory anchor provider with a fixed anchor budget.
pub struct SimAnchorProvider {
    capacity: usize,
    latency: Duration,
    anchors: Mutex<Vec<WorldAnchor>>,
    next_fault: Mutex<Option<String>>,
    add_calls: AtomicUsize,
}

impl SimAnchorProvider {
    /// A provider that accepts at most `capacity` anchors.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            latency: Duration::ZERO,
            anchors: Mutex::new(Vec::new()),
            next_fault: Mutex::new(None),
            add_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every `add_anchor` call by `latency` to mimic a slow provider.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `add_anchor` call with [`AnchorError::Provider`].
    pub fn fail_next(&self, cause: impl Into<String>) {
        *self.next_fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(cause.into());
    }

    /// How many times `add_anchor` has been called.
    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.anchors.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: AnchorId) -> bool {
        self.anchors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|a| a.id == id)
    }
}

#[async_trait]
impl AnchorProvider for SimAnchorProvider {
    async fn add_anchor(&self, anchor: WorldAnchor) -> Result<(), AnchorError> {
        self.add_calls.fetch_add(1, Ordering::AcqRel);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(cause) = self
            .next_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(AnchorError::Provider(cause));
        }
        let mut anchors = self.anchors.lock().unwrap_or_else(PoisonError::into_inner);
        if anchors.len() >= self.capacity {
            return Err(AnchorError::CapacityExceeded);
        }
        debug!(anchor_id = %anchor.id, "sim anchor persisted");
        anchors.push(anchor);
        Ok(())
    }

    async fn remove_anchor(&self, id: AnchorId) -> Result<(), AnchorError> {
        self.anchors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a.id != id);
        Ok(())
    }

    async fn anchors(&self) -> Result<Vec<WorldAnchor>, AnchorError> {
        Ok(self.anchors.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}
