pub mod body;
pub mod motion_state;
pub mod shape;
pub mod shape_manager;
pub mod world;

pub use body::{collision_flags, integrate_rotation, ActivationState, RigidBody};
pub use motion_state::{
    BridgeId, EntityMotionState, MotionBridge, MotionType, MotionUpdate, ObjectMotionState,
};
pub use shape::{CollisionShape, CompoundChild, ShapeDescriptor, ShapeKind, ShapeType};
pub use shape_manager::{ShapeHandle, ShapeManager};
pub use world::{BodyHandle, SimulationWorld};

pub const FIXED_SUBSTEP: f32 = 1.0 / 60.0;
pub const MAX_SUBSTEPS: u32 = 4;

/// Bodies slower than these for `DEACTIVATION_TIME` seconds fall asleep
pub const LINEAR_SLEEPING_THRESHOLD: f32 = 0.05; // 5 cm/sec
pub const ANGULAR_SLEEPING_THRESHOLD: f32 = 0.087266; // ~5 deg/sec
pub const DEACTIVATION_TIME: f32 = 2.0;
