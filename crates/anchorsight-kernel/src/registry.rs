//! [`ObjectRegistry`] – the set of tracked objects.
//!
//! Objects live in a dense table indexed by [`ObjectId`].  Slots of removed
//! objects stay empty rather than being reused, so an old handle can never
//! alias a newer object.  A side map from scene [`EntityId`] to handle turns
//! raycast hits back into objects in O(1).

use std::collections::HashMap;

use anchorsight_perception::{CollisionGroup, EntityId};
use anchorsight_types::{AnchorId, Color, ObjectId, SightError};

/// Where an object stands in the placement/anchoring lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    /// Created at startup or by placement; neither moving nor anchored.
    Placed,
    /// Actively manipulated by the wearer.
    InMotion,
    /// A bind to this anchor is awaiting provider confirmation.
    PendingAnchor(AnchorId),
    /// Bound to a durable anchor.
    Anchored(AnchorId),
}

/// A tracked virtual object.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub id: ObjectId,
    pub name: String,
    pub color: Color,
    /// Scene entity carrying the object's transform and collision shape.
    pub entity: EntityId,
    pub group: CollisionGroup,
    pub state: PlacementState,
    /// Durable anchor currently held for the object.  Survives grabbing and
    /// re-binding until a newer anchor replaces it.
    pub anchor: Option<AnchorId>,
}

impl TrackedObject {
    pub fn is_selectable(&self) -> bool {
        self.group.intersects(CollisionGroup::SELECTABLE)
    }
}

/// Registration request for [`ObjectRegistry::register`].
#[derive(Debug, Clone)]
pub struct NewObject {
    pub name: String,
    pub color: Color,
    pub entity: EntityId,
    pub group: CollisionGroup,
}

/// Dense table of tracked objects.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    slots: Vec<Option<TrackedObject>>,
    by_entity: HashMap<EntityId, ObjectId>,
    live: usize,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new object in the [`PlacementState::Placed`] state and return
    /// its handle.
    pub fn register(&mut self, object: NewObject) -> ObjectId {
        let id = ObjectId(self.slots.len() as u32);
        self.by_entity.insert(object.entity, id);
        self.slots.push(Some(TrackedObject {
            id,
            name: object.name,
            color: object.color,
            entity: object.entity,
            group: object.group,
            state: PlacementState::Placed,
            anchor: None,
        }));
        self.live += 1;
        id
    }

    /// Map a raycast hit back to a selectable tracked object.
    ///
    /// Returns `None` for entities that were never registered (such as the
    /// highlight indicator) and for registered objects outside the
    /// selectable group.
    pub fn lookup(&self, entity: EntityId) -> Option<ObjectId> {
        let id = *self.by_entity.get(&entity)?;
        self.get(id).filter(|o| o.is_selectable()).map(|o| o.id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ObjectId) -> Result<&mut TrackedObject, SightError> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(SightError::UnknownObject(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// The wearer started manipulating `id`.
    pub fn mark_in_motion(&mut self, id: ObjectId) -> Result<(), SightError> {
        self.get_mut(id)?.state = PlacementState::InMotion;
        Ok(())
    }

    /// A bind to `anchor` is outstanding for `id`.
    pub fn mark_pending(&mut self, id: ObjectId, anchor: AnchorId) -> Result<(), SightError> {
        self.get_mut(id)?.state = PlacementState::PendingAnchor(anchor);
        Ok(())
    }

    /// `id` is now bound to `anchor`.
    ///
    /// Returns the anchor it replaces, which no object holds any more.
    pub fn mark_anchored(&mut self, id: ObjectId, anchor: AnchorId) -> Result<Option<AnchorId>, SightError> {
        let object = self.get_mut(id)?;
        object.state = PlacementState::Anchored(anchor);
        Ok(object.anchor.replace(anchor).filter(|old| *old != anchor))
    }

    /// Remove `id` from the registry and return it.
    pub fn remove(&mut self, id: ObjectId) -> Result<TrackedObject, SightError> {
        let object = self
            .slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(SightError::UnknownObject(id))?;
        self.by_entity.remove(&object.entity);
        self.live -= 1;
        Ok(object)
    }

    /// Live objects in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.slots.iter().flatten()
    }

    /// Handles of every object currently in motion.
    pub fn in_motion(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.iter()
            .filter(|o| o.state == PlacementState::InMotion)
            .map(|o| o.id)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
