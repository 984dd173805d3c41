//! [`Session`] – one run of the application: world, bus, binder and the
//! selection loop.
//!
//! The selection loop runs on its own Tokio task.  [`Session::start_selection`]
//! hands back a [`SelectionHandle`] whose [`CancellationToken`] stops it; a
//! stopped loop can be started again from scratch.

use std::sync::Arc;

use anchorsight_hal::{AnchorProvider, PoseSource};
use anchorsight_kernel::{AnchorBindingService, BindFailurePolicy, SelectionReader, SharedWorld, World};
use anchorsight_middleware::EventBus;
use anchorsight_perception::{EntityId, SceneGraph};
use anchorsight_types::{ObjectId, SightError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::seed;
use crate::selection_engine::{DeviceRig, SelectionEngine};

/// A populated world plus the services that act on it.
pub struct Session {
    world: SharedWorld,
    bus: EventBus,
    binder: Arc<AnchorBindingService>,
    pose: Arc<dyn PoseSource>,
    rig: DeviceRig,
    indicator: EntityId,
    objects: Vec<ObjectId>,
}

impl Session {
    /// Build an in-memory scene, install the device rig, and create the
    /// startup content.
    pub async fn start(
        pose: Arc<dyn PoseSource>,
        provider: Arc<dyn AnchorProvider>,
        policy: BindFailurePolicy,
    ) -> Result<Self, SightError> {
        let mut world = World::new(Box::new(SceneGraph::new()));
        let rig = DeviceRig::install(world.scene_mut());
        let world = SharedWorld::new(world);
        let (indicator, objects) = seed::populate(&world).await?;

        let bus = EventBus::default();
        let binder = Arc::new(AnchorBindingService::new(world.clone(), provider, bus.clone()).with_policy(policy));
        info!(objects = objects.len(), %policy, "session started");
        Ok(Self {
            world,
            bus,
            binder,
            pose,
            rig,
            indicator,
            objects,
        })
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn binder(&self) -> Arc<AnchorBindingService> {
        self.binder.clone()
    }

    pub fn rig(&self) -> DeviceRig {
        self.rig
    }

    pub fn indicator(&self) -> EntityId {
        self.indicator
    }

    /// Handles of the startup objects.
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Read-only selection handle for a UI.
    pub fn selection(&self) -> SelectionReader {
        self.world.subscribe_selection()
    }

    /// Spawn the selection loop.  Must be called inside a Tokio runtime.
    pub fn start_selection(&self) -> SelectionHandle {
        let cancel = CancellationToken::new();
        let engine = SelectionEngine::new(self.world.clone(), self.pose.clone(), self.bus.clone(), self.rig);
        let task = tokio::spawn(engine.run(cancel.clone()));
        SelectionHandle { cancel, task }
    }
}

/// A running selection loop.
pub struct SelectionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SelectionHandle {
    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), SightError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| SightError::Channel(format!("selection loop task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anchorsight_hal::sim::{PoseStep, ScriptedPoseSource, SimAnchorProvider};
    use anchorsight_perception::{Transform3D, Vec3};
    use anchorsight_types::{Color, HighlightStatus};

    /// Standing in front of the middle cylinder at chest height.
    fn facing_middle() -> Transform3D {
        Transform3D::from_translation(Vec3::new(0.0, 0.6, 0.0))
    }

    #[tokio::test]
    async fn gazing_at_middle_cylinder_highlights_it() {
        let pose = Arc::new(ScriptedPoseSource::new());
        for _ in 0..200 {
            pose.push(PoseStep::Tracked(facing_middle()));
        }
        let session = Session::start(pose, Arc::new(SimAnchorProvider::new(5)), BindFailurePolicy::Discard)
            .await
            .unwrap();
        let mut selection = session.selection();

        let handle = session.start_selection();
        let snap = tokio::time::timeout(Duration::from_secs(2), selection.changed())
            .await
            .expect("highlight within timeout")
            .expect("selection writer alive");
        handle.shutdown().await.unwrap();

        assert_eq!(
            snap.status(),
            HighlightStatus::Highlighted {
                name: "Cylinder Green".to_string(),
                color: Color::GREEN
            }
        );
        let world = session.world().lock();
        let green = snap.highlighted().unwrap();
        let entity = world.registry().get(green).unwrap().entity;
        assert_eq!(world.scene().parent(session.indicator()), Some(entity));
    }

    #[tokio::test]
    async fn selection_loop_restarts_after_shutdown() {
        let pose = Arc::new(ScriptedPoseSource::new());
        let session = Session::start(pose.clone(), Arc::new(SimAnchorProvider::new(5)), BindFailurePolicy::Discard)
            .await
            .unwrap();

        let first = session.start_selection();
        tokio::time::sleep(Duration::from_millis(40)).await;
        first.shutdown().await.unwrap();
        let after_first = pose.samples_requested();
        assert!(after_first > 0);

        let second = session.start_selection();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let token = second.cancel_token();
        token.cancel();
        second.shutdown().await.unwrap();
        assert!(pose.samples_requested() > after_first);
    }

    #[tokio::test]
    async fn binding_all_startup_objects_fits_default_capacity() {
        let pose = Arc::new(ScriptedPoseSource::new());
        let provider = Arc::new(SimAnchorProvider::new(5));
        let session = Session::start(pose, provider.clone(), BindFailurePolicy::Discard)
            .await
            .unwrap();

        let binder = session.binder();
        for id in session.objects() {
            binder.bind(*id).await.unwrap();
        }
        assert_eq!(provider.len(), 5);
        assert_eq!(session.world().lock().anchored().len(), 5);
    }
}
