//! [`World`] – everything the selection loop and the anchor binding service
//! share, behind a single mutex.
//!
//! Each critical section is synchronous.  Callers take the lock, mutate, and
//! drop the guard before any `.await`; [`SharedWorld::lock`] recovers from
//! poisoning so a panicked task cannot wedge the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anchorsight_hal::WorldAnchor;
use anchorsight_perception::{EntityId, Scene, SceneNode};
use anchorsight_types::{AnchorId, Color, HighlightStatus, ObjectId, SightError};
use tracing::debug;

use crate::registry::{NewObject, ObjectRegistry, PlacementState, TrackedObject};
use crate::selection::{Highlight, SelectionReader, SelectionState};

/// Scene, registry, selection cell and pending-bind table.
pub struct World {
    scene: Box<dyn Scene>,
    registry: ObjectRegistry,
    selection: SelectionState,
    pending: HashMap<AnchorId, ObjectId>,
    indicator: Option<EntityId>,
}

impl World {
    pub fn new(scene: Box<dyn Scene>) -> Self {
        Self {
            scene,
            registry: ObjectRegistry::new(),
            selection: SelectionState::new(),
            pending: HashMap::new(),
            indicator: None,
        }
    }

    pub fn scene(&self) -> &dyn Scene {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> &mut dyn Scene {
        self.scene.as_mut()
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Add `node` to the scene and track it as `name`.
    ///
    /// The node's collision group decides whether raycasts can select it.
    pub fn spawn_object(&mut self, name: impl Into<String>, color: Color, node: SceneNode) -> ObjectId {
        let group = node.group;
        let entity = self.scene.add_content(node);
        let name = name.into();
        let id = self.registry.register(NewObject {
            name: name.clone(),
            color,
            entity,
            group,
        });
        debug!(object = %id, %entity, name = %name, "object spawned");
        id
    }

    /// Use `entity` as the highlight indicator.  It is reparented under
    /// whichever object is highlighted and hidden while nothing is.
    pub fn set_indicator(&mut self, entity: EntityId) {
        self.indicator = Some(entity);
        let shown = self.selection.highlighted().is_some();
        self.scene.set_visible(entity, shown);
    }

    pub fn indicator(&self) -> Option<EntityId> {
        self.indicator
    }

    /// Make `target` the highlighted object.
    ///
    /// Handles that are no longer registered count as `None`.  When the
    /// highlight actually changes the selection cell is updated, the
    /// indicator is moved under the new object (or detached and hidden), and the new
    /// status is returned.  Otherwise nothing is touched and `None` is
    /// returned.
    pub fn apply_highlight(&mut self, target: Option<ObjectId>) -> Option<HighlightStatus> {
        let (highlight, parent) = match target.and_then(|id| self.registry.get(id)) {
            Some(object) => (
                Some(Highlight {
                    object: object.id,
                    name: object.name.clone(),
                    color: object.color,
                }),
                Some(object.entity),
            ),
            None => (None, None),
        };
        if !self.selection.set_highlight(highlight) {
            return None;
        }
        if let Some(indicator) = self.indicator {
            self.scene.set_parent(indicator, parent);
            self.scene.set_visible(indicator, parent.is_some());
        }
        Some(self.selection.snapshot().status())
    }

    /// Mark `id` as being manipulated by the wearer.
    pub fn grab(&mut self, id: ObjectId) -> Result<(), SightError> {
        if self.has_pending_bind(id) {
            return Err(SightError::BindAlreadyPending(id));
        }
        self.registry.mark_in_motion(id)
    }

    pub fn has_pending_bind(&self, id: ObjectId) -> bool {
        self.pending.values().any(|o| *o == id)
    }

    pub fn pending_binds(&self) -> usize {
        self.pending.len()
    }

    /// Start binding `id` to a new world anchor at its current transform.
    ///
    /// # Errors
    ///
    /// [`SightError::UnknownObject`] for unregistered handles and
    /// [`SightError::BindAlreadyPending`] when a bind for `id` is already
    /// outstanding.  Neither leaves any trace in the world.
    pub fn begin_bind(&mut self, id: ObjectId) -> Result<WorldAnchor, SightError> {
        let entity = self
            .registry
            .get(id)
            .ok_or(SightError::UnknownObject(id))?
            .entity;
        if self.has_pending_bind(id) {
            return Err(SightError::BindAlreadyPending(id));
        }
        let origin_from_anchor = self
            .scene
            .world_transform(entity)
            .ok_or(SightError::UnknownObject(id))?;
        let anchor = WorldAnchor::new(origin_from_anchor);
        self.pending.insert(anchor.id, id);
        self.registry.mark_pending(id, anchor.id)?;
        Ok(anchor)
    }

    /// The provider accepted `anchor`.
    ///
    /// Returns the object it now anchors together with the anchor that object
    /// held before, which the caller must release.  `None` when the object
    /// was removed while the bind was outstanding.
    pub fn complete_bind(&mut self, anchor: AnchorId) -> Option<(ObjectId, Option<AnchorId>)> {
        let id = self.pending.remove(&anchor)?;
        let replaced = self.registry.mark_anchored(id, anchor).ok()?;
        Some((id, replaced))
    }

    /// The provider rejected `anchor`.  Drops the pending entry and returns
    /// the affected object, if it is still registered.
    pub fn abort_bind(&mut self, anchor: AnchorId) -> Option<ObjectId> {
        let id = self.pending.remove(&anchor)?;
        self.registry.contains(id).then_some(id)
    }

    /// Undo a failed bind.  An object that still holds an earlier anchor
    /// goes back to it; anything else returns to the wearer's hands.
    pub fn restore(&mut self, id: ObjectId) -> Result<PlacementState, SightError> {
        let held = self
            .registry
            .get(id)
            .ok_or(SightError::UnknownObject(id))?
            .anchor;
        match held {
            Some(anchor) => {
                self.registry.mark_anchored(id, anchor)?;
                Ok(PlacementState::Anchored(anchor))
            }
            None => {
                self.registry.mark_in_motion(id)?;
                Ok(PlacementState::InMotion)
            }
        }
    }

    /// Remove `id` from the scene and the registry.
    ///
    /// A matching highlight is cleared first, so the selection cell never
    /// names an object the registry no longer knows.  The returned record
    /// carries the anchor the object held, if any.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<TrackedObject, SightError> {
        let entity = self
            .registry
            .get(id)
            .ok_or(SightError::UnknownObject(id))?
            .entity;
        if self.selection.highlighted() == Some(id) {
            self.apply_highlight(None);
        }
        if let Some(indicator) = self.indicator {
            if self.scene.parent(indicator) == Some(entity) {
                self.scene.set_parent(indicator, None);
                self.scene.set_visible(indicator, false);
            }
        }
        self.pending.retain(|_, object| *object != id);
        self.scene.remove(entity);
        let object = self.registry.remove(id)?;
        debug!(object = %id, name = %object.name, "object removed");
        Ok(object)
    }

    /// Handles of every anchored object, in registration order.
    pub fn anchored(&self) -> Vec<(ObjectId, AnchorId)> {
        self.registry
            .iter()
            .filter_map(|o| match o.state {
                PlacementState::Anchored(a) => Some((o.id, a)),
                _ => None,
            })
            .collect()
    }
}

/// Cloneable handle to the shared [`World`].
#[derive(Clone)]
pub struct SharedWorld {
    inner: Arc<Mutex<World>>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
        }
    }

    /// Enter a critical section.  Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only selection handle for the UI.
    pub fn subscribe_selection(&self) -> SelectionReader {
        self.lock().selection().subscribe()
    }
}
