use std::fmt;

use cgmath::{Point3, Quaternion, Vector3, Zero};
use serde::{Deserialize, Serialize};

use super::dirty;
use crate::physics::{BridgeId, CompoundChild, ShapeType};

/// Scene-graph entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const DEFAULT_DAMPING: f32 = 0.39;
pub const DEFAULT_RESTITUTION: f32 = 0.5;
pub const DEFAULT_FRICTION: f32 = 0.5;

/// Everything about an entity the simulation cares about
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalProperties {
    pub shape_type: ShapeType,
    /// Full dimensions in meters
    pub dimensions: Vector3<f32>,
    pub compound_children: Vec<CompoundChild>,
    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub gravity: Vector3<f32>,
    pub mass: f32,
    pub restitution: f32,
    pub friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub collision_group: u32,
    pub collisions_will_move: bool,
}

impl Default for PhysicalProperties {
    fn default() -> Self {
        Self {
            shape_type: ShapeType::Box,
            dimensions: Vector3::new(1.0, 1.0, 1.0),
            compound_children: Vec::new(),
            position: Point3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            gravity: Vector3::zero(),
            mass: 1.0,
            restitution: DEFAULT_RESTITUTION,
            friction: DEFAULT_FRICTION,
            linear_damping: DEFAULT_DAMPING,
            angular_damping: DEFAULT_DAMPING,
            collision_group: 1,
            collisions_will_move: false,
        }
    }
}

impl PhysicalProperties {
    pub fn is_moving(&self) -> bool {
        self.velocity != Vector3::zero() || self.angular_velocity != Vector3::zero()
    }
}

/// A spatial entity in the scene graph.
///
/// Setters record what changed in the dirty-flag word; the synchronization
/// engine takes those flags when it is told the entity was edited.
#[derive(Debug, Clone)]
pub struct EntityItem {
    id: EntityId,
    properties: PhysicalProperties,
    dirty_flags: u32,
    physics_info: Option<BridgeId>,
}

impl EntityItem {
    pub fn new(id: EntityId, properties: PhysicalProperties) -> Self {
        Self {
            id,
            properties,
            dirty_flags: 0,
            physics_info: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn properties(&self) -> &PhysicalProperties {
        &self.properties
    }

    pub fn dirty_flags(&self) -> u32 {
        self.dirty_flags
    }

    /// Take and clear the pending dirty flags
    pub fn take_dirty_flags(&mut self) -> u32 {
        std::mem::take(&mut self.dirty_flags)
    }

    /// Bridge attached to this entity, if it is simulated
    pub fn physics_info(&self) -> Option<BridgeId> {
        self.physics_info
    }

    pub(crate) fn set_physics_info(&mut self, bridge: Option<BridgeId>) {
        self.physics_info = bridge;
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        if self.properties.position != position {
            self.properties.position = position;
            self.dirty_flags |= dirty::POSITION;
        }
    }

    pub fn set_rotation(&mut self, rotation: Quaternion<f32>) {
        if self.properties.rotation != rotation {
            self.properties.rotation = rotation;
            self.dirty_flags |= dirty::POSITION;
        }
    }

    pub fn set_velocity(&mut self, velocity: Vector3<f32>) {
        if self.properties.velocity != velocity {
            let was_moving = self.properties.is_moving();
            self.properties.velocity = velocity;
            self.mark_velocity_changed(was_moving);
        }
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vector3<f32>) {
        if self.properties.angular_velocity != angular_velocity {
            let was_moving = self.properties.is_moving();
            self.properties.angular_velocity = angular_velocity;
            self.mark_velocity_changed(was_moving);
        }
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        if self.properties.gravity != gravity {
            self.properties.gravity = gravity;
            self.dirty_flags |= dirty::VELOCITY;
        }
    }

    fn mark_velocity_changed(&mut self, was_moving: bool) {
        self.dirty_flags |= dirty::VELOCITY;
        if was_moving != self.properties.is_moving() {
            self.dirty_flags |= dirty::MOTION_TYPE;
        }
    }

    pub fn set_dimensions(&mut self, dimensions: Vector3<f32>) {
        if self.properties.dimensions != dimensions {
            self.properties.dimensions = dimensions;
            self.dirty_flags |= dirty::SHAPE | dirty::MASS;
        }
    }

    pub fn set_shape_type(&mut self, shape_type: ShapeType) {
        if self.properties.shape_type != shape_type {
            self.properties.shape_type = shape_type;
            self.dirty_flags |= dirty::SHAPE | dirty::MASS;
        }
    }

    pub fn set_compound_children(&mut self, children: Vec<CompoundChild>) {
        if self.properties.compound_children != children {
            self.properties.compound_children = children;
            self.dirty_flags |= dirty::SHAPE | dirty::MASS;
        }
    }

    pub fn set_mass(&mut self, mass: f32) {
        if self.properties.mass != mass {
            self.properties.mass = mass;
            self.dirty_flags |= dirty::MASS;
        }
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        if self.properties.linear_damping != linear || self.properties.angular_damping != angular {
            self.properties.linear_damping = linear;
            self.properties.angular_damping = angular;
            self.dirty_flags |= dirty::DAMPING;
        }
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        if self.properties.restitution != restitution {
            self.properties.restitution = restitution;
            self.dirty_flags |= dirty::MATERIAL;
        }
    }

    pub fn set_friction(&mut self, friction: f32) {
        if self.properties.friction != friction {
            self.properties.friction = friction;
            self.dirty_flags |= dirty::MATERIAL;
        }
    }

    pub fn set_collision_group(&mut self, group: u32) {
        if self.properties.collision_group != group {
            self.properties.collision_group = group;
            self.dirty_flags |= dirty::COLLISION_GROUP;
        }
    }

    pub fn set_collisions_will_move(&mut self, will_move: bool) {
        if self.properties.collisions_will_move != will_move {
            self.properties.collisions_will_move = will_move;
            self.dirty_flags |= dirty::MOTION_TYPE;
        }
    }

    /// Write simulated motion back without marking anything dirty
    pub fn apply_simulation_motion(
        &mut self,
        position: Option<(Point3<f32>, Quaternion<f32>)>,
        velocity: Option<(Vector3<f32>, Vector3<f32>)>,
    ) {
        if let Some((position, rotation)) = position {
            self.properties.position = position;
            self.properties.rotation = rotation;
        }
        if let Some((linear, angular)) = velocity {
            self.properties.velocity = linear;
            self.properties.angular_velocity = angular;
        }
    }
}
