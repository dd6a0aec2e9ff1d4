pub mod config;
pub mod entity;
pub mod error;
pub mod physics;
pub mod sync;

pub use config::SyncConfig;
pub use entity::{EntityId, EntityItem, EntityTree, PhysicalProperties, SharedEntityTree};
pub use error::{SyncError, SyncResult};
pub use physics::{MotionType, MotionUpdate, ShapeDescriptor, ShapeType};
pub use sync::{
    BodySnapshot, EntityPacketSender, EntityUpdate, NullPacketSender, SynchronizationEngine,
    TickReport,
};
