//! `anchorsight-middleware` – Notification routing.
//!
//! Carries selection transitions and anchor outcomes from the engine to UI
//! collaborators without either side knowing about the other.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
