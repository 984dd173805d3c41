//! Highlight state shared between the selection loop and the UI.
//!
//! A single [`SelectionState`] owns a [`tokio::sync::watch`] channel.  The
//! selection loop is its only writer; any number of [`SelectionReader`]s can
//! observe the latest [`SelectionSnapshot`] or wait for the next change.
//! Every highlight transition bumps [`SelectionSnapshot::revision`], so a
//! reader can tell two distinct transitions apart even when they land on the
//! same status.

use anchorsight_types::{Color, HighlightStatus, ObjectId};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// The currently highlighted object.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub object: ObjectId,
    pub name: String,
    pub color: Color,
}

/// Point-in-time view of the selection state.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub highlight: Option<Highlight>,
    /// `false` while the device pose is missing or untracked.
    pub pose_available: bool,
    /// Number of highlight transitions so far.
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl SelectionSnapshot {
    fn initial() -> Self {
        Self {
            highlight: None,
            pose_available: false,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// UI-facing status derived from the highlight.
    pub fn status(&self) -> HighlightStatus {
        match &self.highlight {
            Some(h) => HighlightStatus::Highlighted {
                name: h.name.clone(),
                color: h.color,
            },
            None => HighlightStatus::None,
        }
    }

    pub fn highlighted(&self) -> Option<ObjectId> {
        self.highlight.as_ref().map(|h| h.object)
    }
}

/// Writer half of the selection cell.
#[derive(Debug)]
pub struct SelectionState {
    tx: watch::Sender<SelectionSnapshot>,
}

impl SelectionState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SelectionSnapshot::initial());
        Self { tx }
    }

    /// A read-only handle for UI consumers.
    pub fn subscribe(&self) -> SelectionReader {
        SelectionReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn highlighted(&self) -> Option<ObjectId> {
        self.tx.borrow().highlighted()
    }

    /// Record whether a tracked pose was available this tick.
    ///
    /// Readers are only woken when the flag actually flips.
    pub fn set_pose_available(&self, available: bool) -> bool {
        self.tx.send_if_modified(|snap| {
            if snap.pose_available == available {
                return false;
            }
            snap.pose_available = available;
            true
        })
    }

    /// Replace the highlight.
    ///
    /// Returns `false` without touching the snapshot when `highlight` names
    /// the object that is already highlighted (or both are `None`).
    pub fn set_highlight(&self, highlight: Option<Highlight>) -> bool {
        self.tx.send_if_modified(|snap| {
            let next = highlight.as_ref().map(|h| h.object);
            if snap.highlighted() == next {
                return false;
            }
            snap.highlight = highlight;
            snap.revision += 1;
            snap.updated_at = Utc::now();
            true
        })
    }
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only observer of a [`SelectionState`].
#[derive(Debug, Clone)]
pub struct SelectionReader {
    rx: watch::Receiver<SelectionSnapshot>,
}

impl SelectionReader {
    /// Latest snapshot; marks it as seen.
    pub fn current(&mut self) -> SelectionSnapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Wait until the snapshot changes.  Returns `None` once the writer is
    /// gone.
    pub async fn changed(&mut self) -> Option<SelectionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(object: u32, name: &str) -> Highlight {
        Highlight {
            object: ObjectId(object),
            name: name.to_string(),
            color: Color::RED,
        }
    }

    #[test]
    fn starts_with_nothing_highlighted() {
        let state = SelectionState::new();
        let snap = state.snapshot();
        assert_eq!(snap.status(), HighlightStatus::None);
        assert_eq!(snap.revision, 0);
        assert!(!snap.pose_available);
    }

    #[test]
    fn transition_bumps_revision() {
        let state = SelectionState::new();
        assert!(state.set_highlight(Some(highlight(1, "Cylinder Red"))));
        let snap = state.snapshot();
        assert_eq!(snap.revision, 1);
        assert_eq!(
            snap.status(),
            HighlightStatus::Highlighted {
                name: "Cylinder Red".to_string(),
                color: Color::RED
            }
        );

        assert!(state.set_highlight(None));
        assert_eq!(state.snapshot().revision, 2);
        assert_eq!(state.highlighted(), None);
    }

    #[test]
    fn same_object_is_not_a_transition() {
        let state = SelectionState::new();
        state.set_highlight(Some(highlight(1, "a")));
        let before = state.snapshot();
        assert!(!state.set_highlight(Some(highlight(1, "a"))));
        assert!(!state.set_highlight(Some(highlight(1, "a"))));
        assert_eq!(state.snapshot(), before);
        assert!(!SelectionState::new().set_highlight(None));
    }

    #[test]
    fn pose_flag_does_not_touch_highlight() {
        let state = SelectionState::new();
        state.set_highlight(Some(highlight(3, "b")));
        assert!(state.set_pose_available(true));
        assert!(!state.set_pose_available(true));
        assert!(state.set_pose_available(false));
        let snap = state.snapshot();
        assert_eq!(snap.highlighted(), Some(ObjectId(3)));
        assert_eq!(snap.revision, 1);
    }

    #[tokio::test]
    async fn reader_wakes_on_change() {
        let state = SelectionState::new();
        let mut reader = state.subscribe();
        assert_eq!(reader.current().revision, 0);

        state.set_highlight(Some(highlight(2, "c")));
        let snap = reader.changed().await.expect("writer alive");
        assert_eq!(snap.highlighted(), Some(ObjectId(2)));

        drop(state);
        assert!(reader.changed().await.is_none());
    }
}
