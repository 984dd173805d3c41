//! `anchorsight-memory` – Durable anchor storage.
//!
//! World anchors are only useful if they outlive the process that created
//! them.  This crate persists them to a local SQLite substrate.
//!
//! # Modules
//!
//! - [`anchor_store`] – [`SqliteAnchorProvider`][anchor_store::SqliteAnchorProvider]:
//!   an [`AnchorProvider`][anchorsight_hal::AnchorProvider] that stores each
//!   anchor's identity and transform in SQLite and enforces the device's
//!   anchor budget.

pub mod anchor_store;

pub use anchor_store::{AnchorStoreError, SqliteAnchorProvider};
