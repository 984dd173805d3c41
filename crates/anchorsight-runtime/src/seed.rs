//! Startup content: five selectable cylinders and the highlight indicator.
//!
//! Each cylinder is generated on its own task (shape generation is
//! asynchronous on real hardware); registration is serialised by the world
//! lock, so objects are registered in completion order.

use anchorsight_kernel::SharedWorld;
use anchorsight_perception::{Aabb, CollisionGroup, EntityId, SceneNode, Transform3D, Vec3};
use anchorsight_types::{Color, ObjectId, SightError};
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const CYLINDER_RADIUS: f32 = 0.2;
pub const CYLINDER_HEIGHT: f32 = 0.8;
pub const INDICATOR_RADIUS: f32 = 0.1;
/// Indicator position relative to the highlighted object.
pub const INDICATOR_OFFSET: Vec3 = Vec3::new(0.0, 0.4, 0.2);
pub const INDICATOR_NAME: &str = "HighlightEntity";

/// One startup object.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedObject {
    pub name: String,
    pub color: Color,
    pub position: Vec3,
}

impl SeedObject {
    pub fn cylinder(color: Color, position: Vec3) -> Self {
        Self {
            name: format!("Cylinder {}", color.name()),
            color,
            position,
        }
    }

    /// Scene content for this object.  The cylinder stands on its position,
    /// so its collision bounds span `0..CYLINDER_HEIGHT` above it.
    pub fn node(&self) -> SceneNode {
        SceneNode::new(self.name.clone())
            .with_transform(Transform3D::from_translation(self.position))
            .with_collision(
                Aabb::cylinder(CYLINDER_RADIUS, CYLINDER_HEIGHT),
                CollisionGroup::SELECTABLE,
            )
    }
}

/// The five startup cylinders, left to right.
pub fn seed_objects() -> Vec<SeedObject> {
    vec![
        SeedObject::cylinder(Color::SYSTEM_GREEN, Vec3::new(-1.0, 0.0, -1.0)),
        SeedObject::cylinder(Color::RED, Vec3::new(-0.5, 0.0, -2.0)),
        SeedObject::cylinder(Color::GREEN, Vec3::new(0.0, 0.0, -1.0)),
        SeedObject::cylinder(Color::BLUE, Vec3::new(0.5, 0.0, -2.0)),
        SeedObject::cylinder(Color::YELLOW, Vec3::new(1.0, 0.0, -1.0)),
    ]
}

/// The magenta indicator sphere.  Visual only: it never takes part in
/// raycasts.
pub fn indicator_node() -> SceneNode {
    SceneNode::new(INDICATOR_NAME)
        .with_transform(Transform3D::from_translation(INDICATOR_OFFSET))
        .with_collision(Aabb::cube(INDICATOR_RADIUS), CollisionGroup::NONE)
}

/// Add the indicator and the seed objects to `world`.
///
/// Returns the object handles sorted by handle.
pub async fn populate(world: &SharedWorld) -> Result<(EntityId, Vec<ObjectId>), SightError> {
    let indicator = {
        let mut world = world.lock();
        let indicator = world.scene_mut().add_content(indicator_node());
        world.set_indicator(indicator);
        indicator
    };

    let mut creations = JoinSet::new();
    for seed in seed_objects() {
        let world = world.clone();
        creations.spawn(async move {
            let node = generate(&seed).await;
            world.lock().spawn_object(seed.name, seed.color, node)
        });
    }

    let mut ids = Vec::with_capacity(creations.len());
    while let Some(created) = creations.join_next().await {
        let id = created.map_err(|e| SightError::Channel(format!("object creation task failed: {e}")))?;
        ids.push(id);
    }
    ids.sort();
    info!(objects = ids.len(), %indicator, "startup content created");
    Ok((indicator, ids))
}

async fn generate(seed: &SeedObject) -> SceneNode {
    tokio::task::yield_now().await;
    debug!(name = %seed.name, "shape generated");
    seed.node()
}
