//! Two-way link between one scene entity and one simulation body
//!
//! A bridge carries the entity-side edits into the body (incoming half) and
//! the simulated motion back out towards the entity graph and the network
//! (outgoing half). The state every bridge kind shares lives in
//! [`ObjectMotionState`]; what differs per entity kind sits behind the
//! [`MotionBridge`] trait.

use std::fmt;

use cgmath::{InnerSpace, Point3, Quaternion, Vector3, Zero};

use super::body::{integrate_rotation, ActivationState, RigidBody};
use super::shape::ShapeDescriptor;
use super::world::BodyHandle;
use crate::config::SyncConfig;
use crate::entity::dirty::{self, OUTGOING_MOTION_FLAGS, PHYSICS_FLAGS};
use crate::entity::{EntityId, EntityItem, PhysicalProperties};
use crate::sync::packet::{to_glam_point, to_glam_quat, to_glam_vec, EntityUpdate};

/// Identifier of a bridge owned by the synchronization engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BridgeId(pub u32);

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge#{}", self.0)
    }
}

/// How a body takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionType {
    /// Never moves, never integrated
    Static,
    /// Moved by its own velocity, ignores collisions and gravity
    Kinematic,
    /// Fully simulated
    Dynamic,
}

/// Simulated motion of one body, in world coordinates, handed from the
/// engine to the entity graph after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionUpdate {
    pub bridge: BridgeId,
    pub entity_id: EntityId,
    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
}

/// State shared by every bridge kind
#[derive(Debug, Clone)]
pub struct ObjectMotionState {
    body: Option<BodyHandle>,
    /// World position of the simulation origin
    origin_offset: Vector3<f32>,

    incoming_dirty: u32,
    outgoing_flags: u32,

    mass: f32,
    restitution: f32,
    friction: f32,
    linear_damping: f32,
    angular_damping: f32,

    // What the network was last told, in simulation coordinates
    sent_frame: Option<u32>,
    sent_moving: bool,
    num_non_moving_updates: u32,
    sent_position: Point3<f32>,
    sent_rotation: Quaternion<f32>,
    sent_velocity: Vector3<f32>,
    sent_angular_velocity: Vector3<f32>,
    sent_acceleration: Vector3<f32>,
}

impl ObjectMotionState {
    pub fn new(origin_offset: Vector3<f32>) -> Self {
        Self {
            body: None,
            origin_offset,
            incoming_dirty: 0,
            outgoing_flags: 0,
            mass: 0.0,
            restitution: 0.0,
            friction: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            sent_frame: None,
            sent_moving: false,
            num_non_moving_updates: 0,
            sent_position: Point3::new(0.0, 0.0, 0.0),
            sent_rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            sent_velocity: Vector3::zero(),
            sent_angular_velocity: Vector3::zero(),
            sent_acceleration: Vector3::zero(),
        }
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub(crate) fn set_body(&mut self, body: Option<BodyHandle>) {
        self.body = body;
    }

    pub fn origin_offset(&self) -> Vector3<f32> {
        self.origin_offset
    }

    pub fn incoming_dirty(&self) -> u32 {
        self.incoming_dirty
    }

    pub fn outgoing_flags(&self) -> u32 {
        self.outgoing_flags
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn damping(&self) -> (f32, f32) {
        (self.linear_damping, self.angular_damping)
    }

    pub fn sent_frame(&self) -> Option<u32> {
        self.sent_frame
    }

    pub fn num_non_moving_updates(&self) -> u32 {
        self.num_non_moving_updates
    }

    fn remember_sent_state(&mut self, body: &RigidBody) {
        self.sent_position = body.position;
        self.sent_rotation = body.rotation;
        if body.is_active() {
            self.sent_velocity = body.linear_velocity;
            self.sent_angular_velocity = body.angular_velocity;
            self.sent_acceleration = if body.is_kinematic_object() {
                Vector3::zero()
            } else {
                body.gravity
            };
        } else {
            self.sent_velocity = Vector3::zero();
            self.sent_angular_velocity = Vector3::zero();
            self.sent_acceleration = Vector3::zero();
        }
    }

    /// Whether the object is at rest and has already told the network enough
    pub fn does_not_need_to_send_update(&self, body: Option<&RigidBody>, config: &SyncConfig) -> bool {
        match body {
            None => true,
            Some(body) => !body.is_active() && self.num_non_moving_updates >= config.max_non_moving_updates,
        }
    }

    /// Throttle for outgoing updates.
    ///
    /// Compares the body against where the receivers would have extrapolated
    /// the last sent state to, and only asks for a send once the difference
    /// is visible or enough time has passed.
    pub fn should_send_update(&mut self, body: &RigidBody, frame: u32, config: &SyncConfig) -> bool {
        let Some(sent_frame) = self.sent_frame else {
            self.remember_sent_state(body);
            self.sent_frame = Some(frame);
            self.sent_moving = body.is_active();
            return false;
        };

        let frames = frame.wrapping_sub(sent_frame);
        if frames < config.min_send_interval_frames {
            return false;
        }
        let dt = frames as f32 * config.fixed_substep;

        if !body.is_active() {
            if self.sent_moving {
                return true;
            }
            return dt > config.non_moving_update_period
                && self.num_non_moving_updates < config.max_non_moving_updates;
        }

        if dt > config.max_update_period {
            return true;
        }

        // Kinematic bodies keep their velocity: no gravity, no damping
        let kinematic = body.is_kinematic_object();
        let mut predicted_position = self.sent_position;
        if self.sent_velocity.magnitude2() > 0.0 {
            let mut velocity = self.sent_velocity;
            if !kinematic {
                velocity += self.sent_acceleration * dt;
                velocity *= (1.0 - self.linear_damping).clamp(0.0, 1.0).powf(dt);
            }
            predicted_position += (self.sent_velocity + velocity) * (0.5 * dt);
        }
        if (body.position - predicted_position).magnitude2() > config.max_position_error_squared {
            return true;
        }

        let mut predicted_rotation = self.sent_rotation;
        if self.sent_angular_velocity.magnitude2() > 0.0 {
            let attenuation = if kinematic {
                1.0
            } else {
                (1.0 - self.angular_damping).clamp(0.0, 1.0).powf(dt)
            };
            let spin = self.sent_angular_velocity * attenuation;
            for _ in 0..frames {
                predicted_rotation = integrate_rotation(predicted_rotation, spin, config.fixed_substep);
            }
        }
        body.rotation.dot(predicted_rotation).abs() < config.min_rotation_dot
    }

    /// Build the update for the current body state and remember it as sent
    pub fn send_update(&mut self, entity_id: EntityId, body: &RigidBody, frame: u32) -> EntityUpdate {
        let moving = body.is_active();
        let with_position = !moving || self.outgoing_flags & dirty::POSITION != 0;
        let with_velocity = !moving || self.outgoing_flags & dirty::VELOCITY != 0;
        let world_position = body.position + self.origin_offset;

        let update = EntityUpdate {
            entity_id,
            frame,
            position: with_position.then(|| to_glam_point(world_position)),
            rotation: with_position.then(|| to_glam_quat(body.rotation)),
            velocity: with_velocity.then(|| to_glam_vec(body.linear_velocity)),
            angular_velocity: with_velocity.then(|| to_glam_vec(body.angular_velocity)),
            moving,
        };

        self.remember_sent_state(body);
        self.sent_frame = Some(frame);
        self.sent_moving = moving;
        if moving {
            self.num_non_moving_updates = 0;
        } else {
            self.num_non_moving_updates += 1;
        }
        self.outgoing_flags = 0;
        update
    }
}

/// Entity-kind specific half of a bridge
pub trait MotionBridge: Send {
    fn object_state(&self) -> &ObjectMotionState;
    fn object_state_mut(&mut self) -> &mut ObjectMotionState;

    fn entity_id(&self) -> EntityId;
    fn compute_motion_type(&self) -> MotionType;
    fn compute_shape_descriptor(&self) -> ShapeDescriptor;

    /// Pull the entity's current properties and its pending dirty flags
    fn relay_entity_changes(&mut self, entity: &mut EntityItem);

    /// Apply edits that do not need the body out of the world
    fn update_object_easy(&mut self, body: &mut RigidBody, flags: u32, frame: u32);
    fn update_object_velocities(&mut self, body: &mut RigidBody);

    /// Record the body's simulated motion after a step
    fn set_world_transform(&mut self, bridge: BridgeId, body: &RigidBody) -> MotionUpdate;

    fn body(&self) -> Option<BodyHandle> {
        self.object_state().body()
    }

    fn incoming_dirty_flags(&self) -> u32 {
        self.object_state().incoming_dirty & PHYSICS_FLAGS
    }

    fn clear_incoming_dirty_flags(&mut self, flags: u32) {
        self.object_state_mut().incoming_dirty &= !flags;
    }

    fn clear_outgoing_packet_flags(&mut self, flags: u32) {
        self.object_state_mut().outgoing_flags &= !flags;
    }

    fn does_not_need_to_send_update(&self, body: Option<&RigidBody>, config: &SyncConfig) -> bool {
        self.object_state().does_not_need_to_send_update(body, config)
    }

    fn should_send_update(&mut self, body: &RigidBody, frame: u32, config: &SyncConfig) -> bool {
        self.object_state_mut().should_send_update(body, frame, config)
    }

    fn send_update(&mut self, body: &RigidBody, frame: u32) -> EntityUpdate {
        let entity_id = self.entity_id();
        self.object_state_mut().send_update(entity_id, body, frame)
    }
}

/// Bridge for ordinary scene entities
#[derive(Debug, Clone)]
pub struct EntityMotionState {
    entity_id: EntityId,
    properties: PhysicalProperties,
    object: ObjectMotionState,
}

impl EntityMotionState {
    pub fn new(entity: &EntityItem, origin_offset: Vector3<f32>) -> Self {
        let properties = entity.properties().clone();
        let mut object = ObjectMotionState::new(origin_offset);
        object.mass = properties.mass;
        object.restitution = properties.restitution;
        object.friction = properties.friction;
        object.linear_damping = properties.linear_damping;
        object.angular_damping = properties.angular_damping;
        Self {
            entity_id: entity.id(),
            properties,
            object,
        }
    }

    /// Last known entity properties, in world coordinates
    pub fn properties(&self) -> &PhysicalProperties {
        &self.properties
    }
}

impl MotionBridge for EntityMotionState {
    fn object_state(&self) -> &ObjectMotionState {
        &self.object
    }

    fn object_state_mut(&mut self) -> &mut ObjectMotionState {
        &mut self.object
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn compute_motion_type(&self) -> MotionType {
        if self.properties.collisions_will_move {
            MotionType::Dynamic
        } else if self.properties.is_moving() {
            MotionType::Kinematic
        } else {
            MotionType::Static
        }
    }

    fn compute_shape_descriptor(&self) -> ShapeDescriptor {
        ShapeDescriptor::from_geometry(
            self.properties.shape_type,
            self.properties.dimensions,
            &self.properties.compound_children,
        )
    }

    fn relay_entity_changes(&mut self, entity: &mut EntityItem) {
        self.properties = entity.properties().clone();
        self.object.incoming_dirty |= entity.take_dirty_flags();
    }

    fn update_object_easy(&mut self, body: &mut RigidBody, flags: u32, frame: u32) {
        if flags & (dirty::POSITION | dirty::VELOCITY) != 0 {
            if flags & dirty::POSITION != 0 {
                let position = self.properties.position - self.object.origin_offset;
                self.object.sent_position = position;
                self.object.sent_rotation = self.properties.rotation;
                body.set_world_transform(position, self.properties.rotation);
            }
            if flags & dirty::VELOCITY != 0 {
                self.update_object_velocities(body);
            }
            self.object.sent_frame = Some(frame);
        }

        self.object.restitution = self.properties.restitution;
        self.object.friction = self.properties.friction;
        body.restitution = self.properties.restitution;
        body.friction = self.properties.friction;

        self.object.linear_damping = self.properties.linear_damping;
        self.object.angular_damping = self.properties.angular_damping;
        body.set_damping(self.properties.linear_damping, self.properties.angular_damping);

        body.collision_group = self.properties.collision_group;

        if flags & dirty::MASS != 0 {
            self.object.mass = self.properties.mass;
            if !body.is_static_object() && !body.is_kinematic_object() {
                let inertia = body.collision_shape().calculate_local_inertia(self.object.mass);
                body.set_mass_props(self.object.mass, inertia);
            }
        }

        body.activate();
    }

    fn update_object_velocities(&mut self, body: &mut RigidBody) {
        self.object.sent_velocity = self.properties.velocity;
        self.object.sent_angular_velocity = self.properties.angular_velocity;
        self.object.sent_acceleration = self.properties.gravity;

        body.linear_velocity = self.properties.velocity;
        body.angular_velocity = self.properties.angular_velocity;
        body.gravity = self.properties.gravity;
        body.set_activation_state(ActivationState::Active);
    }

    fn set_world_transform(&mut self, bridge: BridgeId, body: &RigidBody) -> MotionUpdate {
        let position = body.position + self.object.origin_offset;
        self.properties.position = position;
        self.properties.rotation = body.rotation;
        self.properties.velocity = body.linear_velocity;
        self.properties.angular_velocity = body.angular_velocity;
        self.object.outgoing_flags |= OUTGOING_MOTION_FLAGS;

        MotionUpdate {
            bridge,
            entity_id: self.entity_id,
            position,
            rotation: body.rotation,
            velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
        }
    }
}
