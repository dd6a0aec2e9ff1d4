//! Scene-graph entities as seen by the synchronization engine
//!
//! The tree is the authoritative store. The engine only keeps a back-reference
//! in each simulated entity and copies of its physical properties.

pub mod dirty;
pub mod item;
pub mod tree;

pub use item::{EntityId, EntityItem, PhysicalProperties};
pub use tree::{EntityTree, SharedEntityTree};
