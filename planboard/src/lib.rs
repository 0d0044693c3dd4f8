//! Planboard: realtime task and project board client core.
//!
//! Subscribes to live task and project collections, projects every snapshot
//! into day, project and status views, and coordinates creates and the
//! cascading project delete against the document store.

pub mod board;
pub mod config;
pub mod fixture;
pub mod identity;
pub mod projector;
pub mod store;
pub mod subscriber;
pub mod tasks;
