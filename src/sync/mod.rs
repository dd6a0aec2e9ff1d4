pub mod engine;
pub mod packet;

pub use engine::{BodySnapshot, SynchronizationEngine, TickReport};
pub use packet::{EntityPacketSender, EntityUpdate, NullPacketSender};
