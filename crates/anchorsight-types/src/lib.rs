//! `anchorsight-types` – shared identifiers, colors, events and the
//! workspace-wide [`SightError`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable handle of a tracked object inside the object registry.
///
/// Handles are dense indices assigned in registration order and are never
/// reused, so a stale handle can only ever resolve to "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Durable world-anchor identity.  Generated provisionally when a bind
/// starts and confirmed (or discarded) by the anchor provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    /// Generate a fresh random anchor identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display color of a tracked object (linear RGBA, 0..=1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const SYSTEM_GREEN: Color = Color::rgb(0.204, 0.780, 0.349);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const MAGENTA: Color = Color::rgb(1.0, 0.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    /// Opaque color from its three channels.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Human-readable name of the well-known palette entries, `"Other"` for
    /// everything else.
    pub fn name(&self) -> &'static str {
        match *self {
            c if c == Self::SYSTEM_GREEN => "System Green",
            c if c == Self::RED => "Red",
            c if c == Self::GREEN => "Green",
            c if c == Self::BLUE => "Blue",
            c if c == Self::YELLOW => "Yellow",
            c if c == Self::MAGENTA => "Magenta",
            _ => "Other",
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// What the UI shows about the current highlight.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum HighlightStatus {
    /// The device is not pointing at any selectable object.
    #[default]
    None,
    /// The device is pointing at the named object.
    Highlighted { name: String, color: Color },
}

impl fmt::Display for HighlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("nothing highlighted"),
            Self::Highlighted { name, color } => write!(f, "{name} ({})", color.name()),
        }
    }
}

/// Unified event wrapper for the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "anchorsight-runtime::selection"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the notification bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// The selection loop resolved a different highlight than last tick.
    HighlightChanged(HighlightStatus),
    /// The anchor provider confirmed a binding.
    AnchorPersisted { object: ObjectId, anchor_id: AnchorId },
    /// The provider refused a new anchor because its capacity is exhausted.
    AnchorCapacityExceeded { object: ObjectId, object_name: String },
    /// Any other anchor provider failure.
    AnchorFailed {
        object: ObjectId,
        anchor_id: AnchorId,
        cause: String,
    },
    /// A tracked object left the scene.
    ObjectRemoved { object: ObjectId, name: String },
}

/// Global error type spanning registry contract violations, anchor provider
/// failures and infrastructure errors.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SightError {
    #[error("Unknown object handle: {0}")]
    UnknownObject(ObjectId),

    #[error("An anchor bind is already pending for {0}")]
    BindAlreadyPending(ObjectId),

    #[error(
        "Unable to place object \"{object_name}\". You've placed the maximum number of objects. \
         Remove old objects before placing new ones."
    )]
    AnchorCapacityExceeded { object_name: String },

    #[error("Failed to add world anchor {anchor_id} with error: {cause}")]
    AnchorFailed { anchor_id: AnchorId, cause: String },

    #[error("Pose source error: {0}")]
    PoseUnavailable(String),

    #[error("Anchor storage error: {0}")]
    Storage(String),

    #[error("Notification channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
