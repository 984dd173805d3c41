//! [`SelectionEngine`] – pose-driven raycast selection.
//!
//! Each tick:
//!
//! 1. Skip entirely when the pose source is not running.
//! 2. **Sense** – sample the device pose.  A missing, untracked or failed
//!    sample clears `pose_available` and ends the tick; the highlight is
//!    left alone.
//! 3. **Aim** – move the device entity to the sampled pose.  The ray starts
//!    at the world position of the raycast-origin child (pitched down by
//!    [`RAYCAST_TILT_DEG`]) and points along that child's negated Z axis.
//! 4. **Query** – nearest hit among [`CollisionGroup::SELECTABLE`] entities,
//!    mapped back to an object through the registry.
//! 5. **Reconcile** – only a different object (or a change to/from nothing)
//!    touches the selection cell, moves the indicator and publishes a
//!    [`EventPayload::HighlightChanged`] event.
//!
//! Nothing that goes wrong inside a tick ends the loop; only cancellation
//! does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anchorsight_hal::PoseSource;
use anchorsight_kernel::SharedWorld;
use anchorsight_middleware::{EventBus, Topic};
use anchorsight_perception::{CollisionGroup, EntityId, Quaternion, Scene, SceneNode, Transform3D, Vec3};
use anchorsight_types::{Event, EventPayload, HighlightStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pose polling frequency.
pub const POLL_HZ: u64 = 90;

/// Delay between two ticks.
pub const POLL_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / POLL_HZ);

/// Downward pitch of the selection ray relative to the device's forward axis.
pub const RAYCAST_TILT_DEG: f32 = 15.0;

const SOURCE: &str = "anchorsight_runtime::selection_engine";

/// The device entity and its tilted raycast-origin child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRig {
    pub device: EntityId,
    pub raycast_origin: EntityId,
}

impl DeviceRig {
    /// Add the rig to `scene`.  Neither entity is collidable.
    pub fn install(scene: &mut dyn Scene) -> Self {
        let device = scene.add_content(SceneNode::new("device"));
        let tilt = Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), -RAYCAST_TILT_DEG.to_radians());
        let raycast_origin =
            scene.add_content(SceneNode::new("raycast origin").with_transform(Transform3D::from_rotation(tilt)));
        scene.set_parent(raycast_origin, Some(device));
        Self { device, raycast_origin }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The pose source is not running.
    Skipped,
    /// No tracked pose this tick.
    NoPose,
    /// The ray resolved to the object that was already highlighted.
    Unchanged,
    /// The highlight moved.
    Changed(HighlightStatus),
}

/// The fixed-rate selection loop.
pub struct SelectionEngine {
    world: SharedWorld,
    pose: Arc<dyn PoseSource>,
    bus: EventBus,
    rig: DeviceRig,
    started: Instant,
}

impl SelectionEngine {
    pub fn new(world: SharedWorld, pose: Arc<dyn PoseSource>, bus: EventBus, rig: DeviceRig) -> Self {
        Self {
            world,
            pose,
            bus,
            rig,
            started: Instant::now(),
        }
    }

    pub fn rig(&self) -> DeviceRig {
        self.rig
    }

    /// Run one sense → aim → query → reconcile cycle.
    pub async fn tick(&self) -> TickOutcome {
        if !self.pose.is_running() {
            return TickOutcome::Skipped;
        }

        let timestamp = self.started.elapsed().as_secs_f64();
        let sample = match self.pose.sample(timestamp).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "pose query failed");
                None
            }
        };
        let Some(sample) = sample.filter(|s| s.is_tracked) else {
            self.world.lock().selection().set_pose_available(false);
            return TickOutcome::NoPose;
        };

        let changed = {
            let mut world = self.world.lock();
            world.selection().set_pose_available(true);

            let hit = {
                let scene = world.scene_mut();
                scene.set_world_transform(self.rig.device, sample.origin_from_device);
                scene.world_transform(self.rig.raycast_origin).and_then(|origin| {
                    let direction = origin.z_axis().neg().normalize();
                    scene.raycast(origin.translation, direction, CollisionGroup::SELECTABLE)
                })
            };
            let target = hit.and_then(|h| world.registry().lookup(h.entity));
            debug!(?hit, ?target, "ray resolved");
            world.apply_highlight(target)
        };

        match changed {
            Some(status) => {
                info!(status = %status, "highlight changed");
                // Best-effort: the watch cell is the source of truth.
                let _ = self.bus.publish_to(
                    Topic::Selection,
                    Event::new(SOURCE, EventPayload::HighlightChanged(status.clone())),
                );
                TickOutcome::Changed(status)
            }
            None => TickOutcome::Unchanged,
        }
    }

    /// Tick every [`POLL_PERIOD`] until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(hz = POLL_HZ, "selection loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_PERIOD) => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => debug!(?outcome, "tick"),
            }
        }
        info!("selection loop stopped");
    }
}
