//! Anchor Binding Service – binds tracked objects to durable world anchors.
//!
//! # Flow
//!
//! ```text
//! bind(id)
//!   │  lock world: check registered, check no pending bind,
//!   │  snapshot transform, leave the in-motion set, record pending
//!   ▼
//! provider.add_anchor(anchor).await        (world lock NOT held)
//!   │
//!   ├─ Ok            → Anchored(anchor_id), release previous anchor,
//!   │                  AnchorPersisted
//!   ├─ CapacityExceeded → AnchorCapacityExceeded { object_name }
//!   └─ Provider(e)   → AnchorFailed { anchor_id, cause }
//! ```
//!
//! An object holds at most one durable anchor.  Re-binding keeps the old
//! anchor until the new one is confirmed.  On failure the pending entry is
//! dropped and the [`BindFailurePolicy`] decides what happens to the object.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anchorsight_hal::{AnchorError, AnchorProvider};
use anchorsight_middleware::{EventBus, Topic};
use anchorsight_types::{AnchorId, Event, EventPayload, ObjectId, SightError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::world::SharedWorld;

const SOURCE: &str = "anchorsight_kernel::anchor_binding";

/// What to do with an object whose anchor could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindFailurePolicy {
    /// Remove the object from the scene and the registry.
    #[default]
    Discard,
    /// Keep the object.  It returns to the anchor it held before the bind,
    /// or to the wearer's hands as in motion if it had none.
    Restore,
}

impl fmt::Display for BindFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("discard"),
            Self::Restore => f.write_str("restore"),
        }
    }
}

impl FromStr for BindFailurePolicy {
    type Err = SightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "restore" => Ok(Self::Restore),
            other => Err(SightError::Config(format!(
                "unknown bind failure policy '{other}' (expected 'discard' or 'restore')"
            ))),
        }
    }
}

/// Binds objects to world anchors and removes them again.
///
/// Cheap to share behind an `Arc`; binds for different objects may run
/// concurrently.
pub struct AnchorBindingService {
    world: SharedWorld,
    provider: Arc<dyn AnchorProvider>,
    bus: EventBus,
    policy: BindFailurePolicy,
}

impl AnchorBindingService {
    pub fn new(world: SharedWorld, provider: Arc<dyn AnchorProvider>, bus: EventBus) -> Self {
        Self {
            world,
            provider,
            bus,
            policy: BindFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BindFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BindFailurePolicy {
        self.policy
    }

    /// The wearer started dragging `id`.
    pub fn grab(&self, id: ObjectId) -> Result<(), SightError> {
        self.world.lock().grab(id)
    }

    /// Bind `id` to a new world anchor at its current world transform.
    ///
    /// # Errors
    ///
    /// - [`SightError::UnknownObject`] / [`SightError::BindAlreadyPending`]
    ///   before the provider is contacted.
    /// - [`SightError::AnchorCapacityExceeded`] when the device anchor budget
    ///   is spent.
    /// - [`SightError::AnchorFailed`] for any other provider failure.
    #[instrument(skip(self), fields(policy = %self.policy))]
    pub async fn bind(&self, id: ObjectId) -> Result<AnchorId, SightError> {
        let (anchor, name) = {
            let mut world = self.world.lock();
            let anchor = world.begin_bind(id)?;
            let name = world
                .registry()
                .get(id)
                .map(|o| o.name.clone())
                .unwrap_or_default();
            (anchor, name)
        };
        debug!(anchor_id = %anchor.id, name = %name, "requesting world anchor");

        match self.provider.add_anchor(anchor).await {
            Ok(()) => {
                let bound = self.world.lock().complete_bind(anchor.id);
                let Some((_, replaced)) = bound else {
                    warn!(anchor_id = %anchor.id, "object removed while bind was outstanding");
                    self.release(anchor.id).await;
                    return Err(SightError::UnknownObject(id));
                };
                if let Some(old) = replaced {
                    debug!(anchor_id = %old, name = %name, "releasing replaced world anchor");
                    self.release(old).await;
                }
                info!(anchor_id = %anchor.id, name = %name, "world anchor persisted");
                self.publish(
                    Topic::Anchoring,
                    EventPayload::AnchorPersisted {
                        object: id,
                        anchor_id: anchor.id,
                    },
                );
                Ok(anchor.id)
            }
            Err(err) => {
                let (error, payload) = match err {
                    AnchorError::CapacityExceeded => (
                        SightError::AnchorCapacityExceeded {
                            object_name: name.clone(),
                        },
                        EventPayload::AnchorCapacityExceeded {
                            object: id,
                            object_name: name,
                        },
                    ),
                    AnchorError::Provider(cause) => (
                        SightError::AnchorFailed {
                            anchor_id: anchor.id,
                            cause: cause.clone(),
                        },
                        EventPayload::AnchorFailed {
                            object: id,
                            anchor_id: anchor.id,
                            cause,
                        },
                    ),
                };
                warn!(anchor_id = %anchor.id, error = %error, "world anchor rejected");
                self.publish(Topic::Anchoring, payload);
                if let Some(held) = self.recover(id, anchor.id) {
                    self.release(held).await;
                }
                Err(error)
            }
        }
    }

    /// Remove `id` from the session.  The durable anchor it holds is removed
    /// too, even if the object was grabbed or is being re-bound.
    pub async fn remove_object(&self, id: ObjectId) -> Result<(), SightError> {
        let object = self.world.lock().remove_object(id)?;
        self.publish(
            Topic::Lifecycle,
            EventPayload::ObjectRemoved {
                object: id,
                name: object.name.clone(),
            },
        );
        if let Some(anchor_id) = object.anchor {
            self.provider
                .remove_anchor(anchor_id)
                .await
                .map_err(|e| SightError::AnchorFailed {
                    anchor_id,
                    cause: e.to_string(),
                })?;
            info!(%anchor_id, name = %object.name, "world anchor removed");
        }
        Ok(())
    }

    /// Apply the failure policy after `anchor` was rejected.  Returns an
    /// earlier anchor that belonged to a now discarded object.
    fn recover(&self, id: ObjectId, anchor: AnchorId) -> Option<AnchorId> {
        let removed = {
            let mut world = self.world.lock();
            world.abort_bind(anchor)?;
            match self.policy {
                BindFailurePolicy::Restore => {
                    match world.restore(id) {
                        Ok(state) => debug!(object = %id, ?state, "restored object after failed bind"),
                        Err(e) => warn!(object = %id, error = %e, "could not restore object"),
                    }
                    None
                }
                BindFailurePolicy::Discard => world.remove_object(id).ok(),
            }
        }?;
        debug!(object = %id, name = %removed.name, "discarded object after failed bind");
        self.publish(
            Topic::Lifecycle,
            EventPayload::ObjectRemoved {
                object: id,
                name: removed.name,
            },
        );
        removed.anchor
    }

    /// Best-effort removal of an anchor no object holds any more.
    async fn release(&self, anchor_id: AnchorId) {
        match self.provider.remove_anchor(anchor_id).await {
            Ok(()) => debug!(%anchor_id, "world anchor released"),
            Err(e) => warn!(%anchor_id, error = %e, "failed to release world anchor"),
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        // Best-effort: nobody listening is fine.
        let _ = self.bus.publish_to(topic, Event::new(SOURCE, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anchorsight_hal::sim::SimAnchorProvider;
    use anchorsight_perception::{Aabb, CollisionGroup, SceneGraph, SceneNode, Transform3D, Vec3};
    use anchorsight_types::Color;

    use crate::registry::PlacementState;
    use crate::world::World;

    fn world_with(count: usize) -> (SharedWorld, Vec<ObjectId>) {
        let mut world = World::new(Box::new(SceneGraph::new()));
        let ids = (0..count)
            .map(|i| {
                let name = format!("Cylinder {i}");
                world.spawn_object(
                    name.clone(),
                    Color::GREEN,
                    SceneNode::new(name)
                        .with_transform(Transform3D::from_translation(Vec3::new(i as f32, 0.0, -1.0)))
                        .with_collision(Aabb::cylinder(0.2, 0.8), CollisionGroup::SELECTABLE),
                )
            })
            .collect();
        (SharedWorld::new(world), ids)
    }

    fn service(world: &SharedWorld, provider: &Arc<SimAnchorProvider>, bus: &EventBus) -> AnchorBindingService {
        AnchorBindingService::new(world.clone(), provider.clone(), bus.clone())
    }

    #[tokio::test]
    async fn bind_anchors_object_and_publishes() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let bus = EventBus::default();
        let mut anchoring = bus.subscribe_to(Topic::Anchoring);
        let service = service(&world, &provider, &bus);

        service.grab(ids[0]).unwrap();
        let anchor_id = service.bind(ids[0]).await.unwrap();

        assert!(provider.contains(anchor_id));
        let guard = world.lock();
        assert_eq!(
            guard.registry().get(ids[0]).unwrap().state,
            PlacementState::Anchored(anchor_id)
        );
        assert_eq!(guard.registry().in_motion().count(), 0);
        assert_eq!(guard.pending_binds(), 0);
        drop(guard);

        let event = anchoring.try_recv().expect("persisted event");
        assert_eq!(
            event.payload,
            EventPayload::AnchorPersisted {
                object: ids[0],
                anchor_id
            }
        );
    }

    #[tokio::test]
    async fn sixth_bind_exceeds_capacity_and_discards_object() {
        let (world, ids) = world_with(6);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let bus = EventBus::default();
        let mut anchoring = bus.subscribe_to(Topic::Anchoring);
        let service = service(&world, &provider, &bus);

        for id in &ids[..5] {
            service.bind(*id).await.unwrap();
        }
        let sixth_entity = world.lock().registry().get(ids[5]).unwrap().entity;
        let err = service.bind(ids[5]).await.unwrap_err();
        assert_eq!(
            err,
            SightError::AnchorCapacityExceeded {
                object_name: "Cylinder 5".to_string()
            }
        );
        assert!(err.to_string().contains("\"Cylinder 5\""));

        let guard = world.lock();
        assert_eq!(guard.anchored().len(), 5);
        assert!(!guard.registry().contains(ids[5]));
        assert!(!guard.scene().contains(sixth_entity));
        assert_eq!(guard.pending_binds(), 0);
        drop(guard);
        assert_eq!(provider.len(), 5);

        let mut last = None;
        while let Some(event) = anchoring.try_recv() {
            last = Some(event.payload);
        }
        assert_eq!(
            last,
            Some(EventPayload::AnchorCapacityExceeded {
                object: ids[5],
                object_name: "Cylinder 5".to_string()
            })
        );
    }

    #[tokio::test]
    async fn second_bind_for_same_object_is_rejected_before_provider_call() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5).with_latency(Duration::from_millis(20)));
        let bus = EventBus::default();
        let service = service(&world, &provider, &bus);

        let (first, second) = tokio::join!(service.bind(ids[0]), service.bind(ids[0]));

        assert!(first.is_ok());
        assert_eq!(second, Err(SightError::BindAlreadyPending(ids[0])));
        assert_eq!(provider.add_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_object_never_reaches_provider() {
        let (world, _) = world_with(0);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let service = service(&world, &provider, &EventBus::default());

        let ghost = ObjectId(3);
        assert_eq!(service.bind(ghost).await, Err(SightError::UnknownObject(ghost)));
        assert_eq!(service.grab(ghost), Err(SightError::UnknownObject(ghost)));
        assert_eq!(provider.add_calls(), 0);
    }

    #[tokio::test]
    async fn provider_fault_with_restore_policy_keeps_object_in_motion() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5));
        provider.fail_next("world tracking is not running");
        let bus = EventBus::default();
        let service = service(&world, &provider, &bus).with_policy(BindFailurePolicy::Restore);

        let err = service.bind(ids[0]).await.unwrap_err();
        let SightError::AnchorFailed { anchor_id, cause } = &err else {
            panic!("expected AnchorFailed, got {err:?}");
        };
        assert_eq!(cause, "world tracking is not running");
        assert!(!provider.contains(*anchor_id));

        let guard = world.lock();
        assert_eq!(
            guard.registry().get(ids[0]).unwrap().state,
            PlacementState::InMotion
        );
        assert_eq!(guard.pending_binds(), 0);
        drop(guard);

        // A retry after restoring is a fresh bind.
        assert!(service.bind(ids[0]).await.is_ok());
    }

    #[tokio::test]
    async fn failed_bind_clears_highlight_of_discarded_object() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(0));
        let bus = EventBus::default();
        let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);
        let service = service(&world, &provider, &bus);

        world.lock().apply_highlight(Some(ids[0]));
        assert!(service.bind(ids[0]).await.is_err());

        assert_eq!(world.lock().selection().highlighted(), None);
        assert!(matches!(
            lifecycle.try_recv().map(|e| e.payload),
            Some(EventPayload::ObjectRemoved { object, .. }) if object == ids[0]
        ));
    }

    #[tokio::test]
    async fn remove_object_releases_its_anchor() {
        let (world, ids) = world_with(2);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let service = service(&world, &provider, &EventBus::default());

        let anchor_id = service.bind(ids[0]).await.unwrap();
        service.remove_object(ids[0]).await.unwrap();
        service.remove_object(ids[1]).await.unwrap();

        assert!(!provider.contains(anchor_id));
        assert!(world.lock().registry().is_empty());
        assert_eq!(
            service.remove_object(ids[0]).await,
            Err(SightError::UnknownObject(ids[0]))
        );
    }

    #[tokio::test]
    async fn removal_during_outstanding_bind_releases_late_anchor() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5).with_latency(Duration::from_millis(20)));
        let service = service(&world, &provider, &EventBus::default());

        let (bound, removed) = tokio::join!(service.bind(ids[0]), service.remove_object(ids[0]));

        assert!(removed.is_ok());
        assert_eq!(bound, Err(SightError::UnknownObject(ids[0])));
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn rebind_releases_the_replaced_anchor() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let service = service(&world, &provider, &EventBus::default());

        let first = service.bind(ids[0]).await.unwrap();
        service.grab(ids[0]).unwrap();
        let second = service.bind(ids[0]).await.unwrap();

        assert_eq!(provider.len(), 1);
        assert!(!provider.contains(first));
        assert!(provider.contains(second));
        assert_eq!(world.lock().anchored(), [(ids[0], second)]);

        service.remove_object(ids[0]).await.unwrap();
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn repeated_placement_of_one_object_keeps_one_anchor() {
        let (world, ids) = world_with(2);
        let provider = Arc::new(SimAnchorProvider::new(2));
        let service = service(&world, &provider, &EventBus::default());

        for _ in 0..6 {
            service.grab(ids[0]).unwrap();
            service.bind(ids[0]).await.unwrap();
        }
        assert_eq!(provider.len(), 1);
        // The budget still has room for the other object.
        service.bind(ids[1]).await.unwrap();
        assert_eq!(provider.len(), 2);
    }

    #[tokio::test]
    async fn removing_grabbed_object_releases_its_anchor() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let service = service(&world, &provider, &EventBus::default());

        service.bind(ids[0]).await.unwrap();
        service.grab(ids[0]).unwrap();
        service.remove_object(ids[0]).await.unwrap();
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn failed_rebind_with_restore_policy_keeps_previous_anchor() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(5));
        let service = service(&world, &provider, &EventBus::default()).with_policy(BindFailurePolicy::Restore);

        let first = service.bind(ids[0]).await.unwrap();
        service.grab(ids[0]).unwrap();
        provider.fail_next("relocalizing");
        assert!(matches!(
            service.bind(ids[0]).await,
            Err(SightError::AnchorFailed { .. })
        ));

        assert_eq!(
            world.lock().registry().get(ids[0]).unwrap().state,
            PlacementState::Anchored(first)
        );
        assert_eq!(provider.len(), 1);
        assert!(provider.contains(first));
    }

    #[tokio::test]
    async fn failed_rebind_with_discard_policy_releases_previous_anchor() {
        let (world, ids) = world_with(1);
        let provider = Arc::new(SimAnchorProvider::new(1));
        let bus = EventBus::default();
        let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);
        let service = service(&world, &provider, &bus);

        service.bind(ids[0]).await.unwrap();
        service.grab(ids[0]).unwrap();
        // The held anchor still occupies the only slot.
        assert_eq!(
            service.bind(ids[0]).await,
            Err(SightError::AnchorCapacityExceeded {
                object_name: "Cylinder 0".to_string()
            })
        );

        assert!(world.lock().registry().is_empty());
        assert!(provider.is_empty());
        assert!(matches!(
            lifecycle.try_recv().map(|e| e.payload),
            Some(EventPayload::ObjectRemoved { object, .. }) if object == ids[0]
        ));
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("discard".parse::<BindFailurePolicy>().unwrap(), BindFailurePolicy::Discard);
        assert_eq!(" Restore ".parse::<BindFailurePolicy>().unwrap(), BindFailurePolicy::Restore);
        assert!(matches!(
            "keep".parse::<BindFailurePolicy>(),
            Err(SightError::Config(_))
        ));
        assert_eq!(BindFailurePolicy::default().to_string(), "discard");
    }
}
