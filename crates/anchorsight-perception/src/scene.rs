//! Scene service and spatial queries.
//!
//! The rendering substrate is an external collaborator; the selection loop
//! only needs a handful of operations from it: add content, move and reparent
//! entities, read world transforms, and cast a ray that returns the nearest
//! entity in a given [`CollisionGroup`].  Those operations form the [`Scene`]
//! trait.  [`SceneGraph`] is the in-process implementation used by the
//! simulator and the tests.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`EntityId`]       | Opaque scene-node handle.                          |
//! | [`Aabb`]           | Axis-aligned collision bounds.                     |
//! | [`CollisionGroup`] | Bitmask scoping which entities a raycast can hit.  |
//! | [`SceneGraph`]     | Entity hierarchy with nearest-hit raycasts.        |
//!
//! # Example
//!
//! ```rust
//! use anchorsight_perception::scene::{Aabb, CollisionGroup, Scene, SceneGraph, SceneNode};
//! use anchorsight_perception::transform::{Transform3D, Vec3};
//!
//! let mut scene = SceneGraph::new();
//! let target = scene.add_content(
//!     SceneNode::new("crate")
//!         .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.0, -3.0)))
//!         .with_collision(Aabb::cube(0.5), CollisionGroup::SELECTABLE),
//! );
//!
//! let hit = scene
//!     .raycast(Vec3::zero(), Vec3::new(0.0, 0.0, -1.0), CollisionGroup::SELECTABLE)
//!     .unwrap();
//! assert_eq!(hit.entity, target);
//! assert!((hit.distance - 2.5).abs() < 1e-4);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transform::{Transform3D, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Identifiers and filters
// ────────────────────────────────────────────────────────────────────────────

/// Opaque handle of a node in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Collision-group bitmask.  A raycast only considers entities whose group
/// shares at least one bit with the query mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionGroup(pub u32);

impl CollisionGroup {
    /// Never hit by any query.
    pub const NONE: Self = Self(0);
    /// Tracked objects the wearer can highlight.
    pub const SELECTABLE: Self = Self(1 << 29);
    pub const ALL: Self = Self(u32::MAX);

    pub fn intersects(self, mask: Self) -> bool {
        self.0 & mask.0 != 0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A cube of half-extent `half` centred on the origin.
    pub fn cube(half: f32) -> Self {
        Self::new(Vec3::new(-half, -half, -half), Vec3::new(half, half, half))
    }

    /// Bounds of an upright cylinder standing on the origin plane.
    pub fn cylinder(radius: f32, height: f32) -> Self {
        Self::new(Vec3::new(-radius, 0.0, -radius), Vec3::new(radius, height, radius))
    }

    /// The box enclosing this one after it has been moved by `t`.
    pub fn transformed(&self, t: &Transform3D) -> Self {
        let (lo, hi) = (self.min, self.max);
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];
        let first = t.transform_point(corners[0]);
        let (min, max) = corners[1..]
            .iter()
            .map(|c| t.transform_point(*c))
            .fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    /// Distance along a ray to the first intersection with this box (slab
    /// method).  `direction` must be normalised.  Returns `Some(0.0)` when
    /// the origin is inside the box and `None` for a miss.
    pub fn ray_intersection(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let axes = [
            (origin.x, direction.x, self.min.x, self.max.x),
            (origin.y, direction.y, self.min.y, self.max.y),
            (origin.z, direction.z, self.min.z, self.max.z),
        ];
        let mut t_near = 0.0f32;
        let mut t_far = f32::INFINITY;
        for (o, d, lo, hi) in axes {
            if d.abs() < 1e-8 {
                // Parallel to this slab: must already be between its planes.
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
            if t_near > t_far {
                return None;
            }
        }
        Some(t_near)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scene service
// ────────────────────────────────────────────────────────────────────────────

/// Description of content to add to the scene.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    /// Transform relative to the parent (the world, for root content).
    pub local: Transform3D,
    /// Local-space collision bounds; `None` for purely visual content.
    pub bounds: Option<Aabb>,
    pub group: CollisionGroup,
}

impl SceneNode {
    /// Visual-only content at the origin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: Transform3D::identity(),
            bounds: None,
            group: CollisionGroup::NONE,
        }
    }

    pub fn with_transform(mut self, local: Transform3D) -> Self {
        self.local = local;
        self
    }

    /// Give the node a collision shape in `group`.
    pub fn with_collision(mut self, bounds: Aabb, group: CollisionGroup) -> Self {
        self.bounds = Some(bounds);
        self.group = group;
        self
    }
}

/// The nearest entity intersected by a raycast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    /// Distance from the ray origin, in world units.
    pub distance: f32,
    /// World-space point where the ray entered the entity's bounds.
    pub position: Vec3,
}

/// The external scene service consumed by the selection loop and the anchor
/// binding service.
///
/// Operations on unknown entities are no-ops that report `false` / `None`.
pub trait Scene: Send {
    /// Add `node` as root content and return its handle.
    fn add_content(&mut self, node: SceneNode) -> EntityId;

    /// Remove an entity and everything parented beneath it.
    fn remove(&mut self, id: EntityId) -> bool;

    fn contains(&self, id: EntityId) -> bool;

    fn name(&self, id: EntityId) -> Option<&str>;

    /// World-space transform of `id`, composed through its parents.
    fn world_transform(&self, id: EntityId) -> Option<Transform3D>;

    /// Place `id` so that its world transform becomes `world`.
    fn set_world_transform(&mut self, id: EntityId, world: Transform3D) -> bool;

    /// Make `child` a child of `parent` (or root content for `None`), keeping
    /// its local transform.  Refuses to create a cycle.
    fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> bool;

    fn parent(&self, id: EntityId) -> Option<EntityId>;

    /// Show or hide `id`.  Hidden entities stay in the hierarchy but are
    /// neither rendered nor hit by raycasts.
    fn set_visible(&mut self, id: EntityId, visible: bool) -> bool;

    /// True when `id` and all of its ancestors are shown.
    fn is_visible(&self, id: EntityId) -> bool;

    /// Nearest visible entity in `mask` hit by the ray, if any.
    fn raycast(&self, origin: Vec3, direction: Vec3, mask: CollisionGroup) -> Option<RaycastHit>;
}

// ────────────────────────────────────────────────────────────────────────────
// SceneGraph – in-memory implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct NodeEntry {
    name: String,
    local: Transform3D,
    parent: Option<EntityId>,
    bounds: Option<Aabb>,
    group: CollisionGroup,
    visible: bool,
}

/// An in-memory entity hierarchy.
///
/// Raycasts test every collidable entity's world-space bounds; entities are
/// visited in creation order so equal distances resolve to the oldest entity.
#[derive(Debug, Default)]
pub struct SceneGraph {
    next_id: u64,
    nodes: BTreeMap<EntityId, NodeEntry>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn is_descendant(&self, candidate: EntityId, ancestor: EntityId) -> bool {
        let mut cursor = Some(candidate);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn parent_world(&self, id: EntityId) -> Transform3D {
        self.nodes
            .get(&id)
            .and_then(|n| n.parent)
            .and_then(|p| self.world_transform(p))
            .unwrap_or_default()
    }
}

impl Scene for SceneGraph {
    fn add_content(&mut self, node: SceneNode) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeEntry {
                name: node.name,
                local: node.local,
                parent: None,
                bounds: node.bounds,
                group: node.group,
                visible: true,
            },
        );
        id
    }

    fn remove(&mut self, id: EntityId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        let doomed: Vec<EntityId> = self
            .nodes
            .keys()
            .copied()
            .filter(|candidate| self.is_descendant(*candidate, id))
            .collect();
        for d in doomed {
            self.nodes.remove(&d);
        }
        true
    }

    fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn name(&self, id: EntityId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    fn world_transform(&self, id: EntityId) -> Option<Transform3D> {
        let node = self.nodes.get(&id)?;
        Some(self.parent_world(id).compose(node.local))
    }

    fn set_world_transform(&mut self, id: EntityId, world: Transform3D) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        let local = self.parent_world(id).inverse().compose(world);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local = local;
        }
        true
    }

    fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> bool {
        if !self.nodes.contains_key(&child) {
            return false;
        }
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) || self.is_descendant(p, child) {
                return false;
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = parent;
        }
        true
    }

    fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    fn set_visible(&mut self, id: EntityId, visible: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.visible = visible;
                true
            }
            None => false,
        }
    }

    fn is_visible(&self, id: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(&current) {
                Some(node) if node.visible => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, mask: CollisionGroup) -> Option<RaycastHit> {
        let direction = direction.normalize();
        if direction.length() <= f32::EPSILON {
            return None;
        }

        let mut nearest: Option<RaycastHit> = None;
        for (id, node) in &self.nodes {
            let Some(bounds) = node.bounds else { continue };
            if !node.group.intersects(mask) || !self.is_visible(*id) {
                continue;
            }
            let Some(world) = self.world_transform(*id) else { continue };
            let Some(distance) = bounds.transformed(&world).ray_intersection(origin, direction)
            else {
                continue;
            };
            if nearest.is_none_or(|best| distance < best.distance) {
                nearest = Some(RaycastHit {
                    entity: *id,
                    distance,
                    position: origin.add(direction.scale(distance)),
                });
            }
        }
        nearest
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Quaternion;

    const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    fn selectable_at(scene: &mut SceneGraph, name: &str, z: f32) -> EntityId {
        scene.add_content(
            SceneNode::new(name)
                .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.0, z)))
                .with_collision(Aabb::cube(0.25), CollisionGroup::SELECTABLE),
        )
    }

    // ── Aabb ────────────────────────────────────────────────────────────────

    #[test]
    fn aabb_normalises_min_max() {
        let b = Aabb::new(Vec3::new(2.0, 2.0, 2.0), Vec3::zero());
        assert_eq!(b.min, Vec3::zero());
        assert_eq!(b.max, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn ray_enters_box_at_near_face() {
        let b = Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
        let t = b.ray_intersection(Vec3::zero(), FORWARD).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let b = Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
        assert!(b.ray_intersection(Vec3::zero(), Vec3::new(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn ray_from_inside_reports_zero_distance() {
        let t = Aabb::cube(1.0).ray_intersection(Vec3::zero(), FORWARD).unwrap();
        assert_eq!(t, 0.0);
    }

    #[test]
    fn transformed_bounds_follow_rotation_and_scale() {
        let t = Transform3D::new(
            Vec3::new(0.0, 0.0, -2.0),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2),
        )
        .with_scale(Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::new(Vec3::zero(), Vec3::new(1.0, 0.5, 0.25)).transformed(&t);
        // local +X maps to world −Z after a 90° yaw.
        assert!((b.min.z - -4.0).abs() < 1e-4, "min.z = {}", b.min.z);
        assert!((b.max.y - 1.0).abs() < 1e-4);
    }

    // ── SceneGraph hierarchy ────────────────────────────────────────────────

    #[test]
    fn child_world_transform_composes_parent() {
        let mut scene = SceneGraph::new();
        let parent = selectable_at(&mut scene, "parent", -2.0);
        let child = scene.add_content(
            SceneNode::new("child")
                .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.4, 0.2))),
        );
        assert!(scene.set_parent(child, Some(parent)));

        let world = scene.world_transform(child).unwrap();
        assert!((world.translation.z - -1.8).abs() < 1e-5);
        assert!((world.translation.y - 0.4).abs() < 1e-5);
        assert_eq!(scene.parent(child), Some(parent));
    }

    #[test]
    fn set_world_transform_accounts_for_parent() {
        let mut scene = SceneGraph::new();
        let parent = selectable_at(&mut scene, "parent", -2.0);
        let child = scene.add_content(SceneNode::new("child"));
        scene.set_parent(child, Some(parent));

        let target = Transform3D::from_translation(Vec3::new(1.0, 1.0, 1.0));
        assert!(scene.set_world_transform(child, target));
        let world = scene.world_transform(child).unwrap();
        assert!((world.translation.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn set_parent_refuses_cycles() {
        let mut scene = SceneGraph::new();
        let a = scene.add_content(SceneNode::new("a"));
        let b = scene.add_content(SceneNode::new("b"));
        assert!(scene.set_parent(b, Some(a)));
        assert!(!scene.set_parent(a, Some(b)));
        assert!(!scene.set_parent(a, Some(a)));
    }

    #[test]
    fn remove_drops_subtree() {
        let mut scene = SceneGraph::new();
        let parent = scene.add_content(SceneNode::new("parent"));
        let child = scene.add_content(SceneNode::new("child"));
        let other = scene.add_content(SceneNode::new("other"));
        scene.set_parent(child, Some(parent));

        assert!(scene.remove(parent));
        assert!(!scene.contains(parent));
        assert!(!scene.contains(child));
        assert!(scene.contains(other));
        assert!(!scene.remove(parent));
    }

    #[test]
    fn detaching_keeps_local_transform() {
        let mut scene = SceneGraph::new();
        let parent = selectable_at(&mut scene, "parent", -2.0);
        let child = scene.add_content(
            SceneNode::new("child")
                .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.4, 0.0))),
        );
        scene.set_parent(child, Some(parent));
        scene.set_parent(child, None);
        let world = scene.world_transform(child).unwrap();
        assert!((world.translation.z).abs() < 1e-5);
        assert_eq!(scene.parent(child), None);
    }

    // ── Raycasts ────────────────────────────────────────────────────────────

    #[test]
    fn raycast_returns_nearest_hit() {
        let mut scene = SceneGraph::new();
        let far = selectable_at(&mut scene, "far", -5.25);
        let near = selectable_at(&mut scene, "near", -2.25);
        let hit = scene
            .raycast(Vec3::zero(), FORWARD, CollisionGroup::SELECTABLE)
            .unwrap();
        assert_eq!(hit.entity, near);
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert_ne!(hit.entity, far);
    }

    #[test]
    fn raycast_ignores_entities_outside_mask() {
        let mut scene = SceneGraph::new();
        scene.add_content(
            SceneNode::new("indicator")
                .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.0, -1.0)))
                .with_collision(Aabb::cube(0.1), CollisionGroup(1)),
        );
        let target = selectable_at(&mut scene, "target", -3.0);
        let hit = scene
            .raycast(Vec3::zero(), FORWARD, CollisionGroup::SELECTABLE)
            .unwrap();
        assert_eq!(hit.entity, target);
    }

    #[test]
    fn raycast_skips_visual_only_content() {
        let mut scene = SceneGraph::new();
        scene.add_content(
            SceneNode::new("decal")
                .with_transform(Transform3D::from_translation(Vec3::new(0.0, 0.0, -1.0))),
        );
        assert!(scene.raycast(Vec3::zero(), FORWARD, CollisionGroup::ALL).is_none());
    }

    #[test]
    fn raycast_with_zero_direction_misses() {
        let mut scene = SceneGraph::new();
        selectable_at(&mut scene, "target", -3.0);
        assert!(scene.raycast(Vec3::zero(), Vec3::zero(), CollisionGroup::ALL).is_none());
    }

    #[test]
    fn raycast_hits_follow_parent_motion() {
        let mut scene = SceneGraph::new();
        let anchor = scene.add_content(SceneNode::new("anchor"));
        let target = selectable_at(&mut scene, "target", -3.0);
        scene.set_parent(target, Some(anchor));
        scene.set_world_transform(anchor, Transform3D::from_translation(Vec3::new(5.0, 0.0, 0.0)));

        assert!(scene.raycast(Vec3::zero(), FORWARD, CollisionGroup::SELECTABLE).is_none());
        let hit = scene
            .raycast(Vec3::new(5.0, 0.0, 0.0), FORWARD, CollisionGroup::SELECTABLE)
            .unwrap();
        assert_eq!(hit.entity, target);
    }

    #[test]
    fn hidden_entities_are_invisible_to_raycasts() {
        let mut scene = SceneGraph::new();
        let holder = scene.add_content(SceneNode::new("holder"));
        let near = selectable_at(&mut scene, "near", -2.0);
        let far = selectable_at(&mut scene, "far", -5.0);
        scene.set_parent(near, Some(holder));

        assert!(scene.set_visible(holder, false));
        assert!(!scene.is_visible(near));
        assert!(scene.contains(near));
        let hit = scene.raycast(Vec3::zero(), FORWARD, CollisionGroup::SELECTABLE).unwrap();
        assert_eq!(hit.entity, far);

        scene.set_visible(holder, true);
        assert!(scene.is_visible(near));
        let hit = scene.raycast(Vec3::zero(), FORWARD, CollisionGroup::SELECTABLE).unwrap();
        assert_eq!(hit.entity, near);

        assert!(!scene.set_visible(EntityId(99), false));
        assert!(!scene.is_visible(EntityId(99)));
    }
}
