//! Rigid body state held by the simulation world

use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Quaternion, Vector3, Zero};

use super::shape::CollisionShape;
use super::shape_manager::ShapeHandle;

/// Collision category flags
pub mod collision_flags {
    pub const STATIC_OBJECT: u32 = 1 << 0;
    pub const KINEMATIC_OBJECT: u32 = 1 << 1;
}

/// Activation state of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Active,
    IslandSleeping,
    /// Never falls asleep
    DisableDeactivation,
    /// Never integrated
    DisableSimulation,
}

/// Largest rotation a single integration step may apply, in radians
pub const ANGULAR_MOTION_THRESHOLD: f32 = 0.5 * std::f32::consts::FRAC_PI_4;

/// Integrate a rotation by an angular velocity over `dt`.
///
/// Exponential map with the per-step angle clamped to `ANGULAR_MOTION_THRESHOLD`.
/// Extrapolation of sent state uses the same step so both sides agree.
pub fn integrate_rotation(rotation: Quaternion<f32>, angular_velocity: Vector3<f32>, dt: f32) -> Quaternion<f32> {
    let mut angle = angular_velocity.magnitude();
    if angle * dt > ANGULAR_MOTION_THRESHOLD {
        angle = ANGULAR_MOTION_THRESHOLD / dt;
    }

    let axis = if angle < 0.001 {
        // Taylor expansion of sin(x/2)/x
        angular_velocity * (0.5 * dt - (dt * dt * dt) * 0.020_833_334 * angle * angle)
    } else {
        angular_velocity * ((0.5 * angle * dt).sin() / angle)
    };

    let step = Quaternion::new((angle * dt * 0.5).cos(), axis.x, axis.y, axis.z);
    (step * rotation).normalize()
}

/// A single simulated rigid body
#[derive(Debug, Clone)]
pub struct RigidBody {
    shape_handle: ShapeHandle,
    shape: Arc<CollisionShape>,

    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub gravity: Vector3<f32>,

    mass: f32,
    inverse_mass: f32,
    local_inertia: Vector3<f32>,

    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub collision_group: u32,

    collision_flags: u32,
    activation_state: ActivationState,
    deactivation_time: f32,
    linear_sleeping_threshold: f32,
    angular_sleeping_threshold: f32,

    /// Opaque owner tag, set by whoever created the body
    pub user_data: u64,
}

impl RigidBody {
    pub fn new(
        mass: f32,
        shape_handle: ShapeHandle,
        shape: Arc<CollisionShape>,
        local_inertia: Vector3<f32>,
    ) -> Self {
        let mut body = Self {
            shape_handle,
            shape,
            position: Point3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            gravity: Vector3::zero(),
            mass: 0.0,
            inverse_mass: 0.0,
            local_inertia: Vector3::zero(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            restitution: 0.0,
            friction: 0.5,
            collision_group: 1,
            collision_flags: 0,
            activation_state: ActivationState::Active,
            deactivation_time: 0.0,
            linear_sleeping_threshold: 0.8,
            angular_sleeping_threshold: 1.0,
            user_data: 0,
        };
        body.set_mass_props(mass, local_inertia);
        body
    }

    pub fn shape_handle(&self) -> ShapeHandle {
        self.shape_handle
    }

    pub fn collision_shape(&self) -> &CollisionShape {
        &self.shape
    }

    /// Swap the collision shape; the caller owns the reference bookkeeping
    pub fn set_collision_shape(&mut self, handle: ShapeHandle, shape: Arc<CollisionShape>) {
        self.shape_handle = handle;
        self.shape = shape;
    }

    pub fn set_mass_props(&mut self, mass: f32, local_inertia: Vector3<f32>) {
        if mass > 0.0 {
            self.mass = mass;
            self.inverse_mass = 1.0 / mass;
            self.local_inertia = local_inertia;
        } else {
            self.mass = 0.0;
            self.inverse_mass = 0.0;
            self.local_inertia = Vector3::zero();
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    pub fn local_inertia(&self) -> Vector3<f32> {
        self.local_inertia
    }

    pub fn set_world_transform(&mut self, position: Point3<f32>, rotation: Quaternion<f32>) {
        self.position = position;
        self.rotation = rotation;
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        self.linear_damping = linear.clamp(0.0, 1.0);
        self.angular_damping = angular.clamp(0.0, 1.0);
    }

    pub fn set_sleeping_thresholds(&mut self, linear: f32, angular: f32) {
        self.linear_sleeping_threshold = linear;
        self.angular_sleeping_threshold = angular;
    }

    pub fn collision_flags(&self) -> u32 {
        self.collision_flags
    }

    pub fn set_collision_flags(&mut self, flags: u32) {
        self.collision_flags = flags;
    }

    pub fn is_static_object(&self) -> bool {
        self.collision_flags & collision_flags::STATIC_OBJECT != 0
    }

    pub fn is_kinematic_object(&self) -> bool {
        self.collision_flags & collision_flags::KINEMATIC_OBJECT != 0
    }

    pub fn activation_state(&self) -> ActivationState {
        self.activation_state
    }

    /// Change activation state unless it is pinned by a DISABLE_* state
    pub fn set_activation_state(&mut self, state: ActivationState) {
        if !matches!(
            self.activation_state,
            ActivationState::DisableDeactivation | ActivationState::DisableSimulation
        ) {
            self.activation_state = state;
        }
    }

    pub fn force_activation_state(&mut self, state: ActivationState) {
        self.activation_state = state;
    }

    /// Wake the body; static and kinematic bodies are left alone
    pub fn activate(&mut self) {
        if self.collision_flags & (collision_flags::STATIC_OBJECT | collision_flags::KINEMATIC_OBJECT) == 0 {
            self.set_activation_state(ActivationState::Active);
            self.deactivation_time = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.activation_state,
            ActivationState::IslandSleeping | ActivationState::DisableSimulation
        )
    }

    /// Accumulate time spent below the sleeping thresholds
    pub(crate) fn update_deactivation(&mut self, dt: f32) {
        if matches!(
            self.activation_state,
            ActivationState::IslandSleeping
                | ActivationState::DisableDeactivation
                | ActivationState::DisableSimulation
        ) {
            return;
        }

        let slow = self.linear_velocity.magnitude2()
            < self.linear_sleeping_threshold * self.linear_sleeping_threshold
            && self.angular_velocity.magnitude2()
                < self.angular_sleeping_threshold * self.angular_sleeping_threshold;

        if slow {
            self.deactivation_time += dt;
        } else {
            self.deactivation_time = 0.0;
            self.set_activation_state(ActivationState::Active);
        }
    }

    pub(crate) fn wants_sleeping(&self, deactivation_time: f32) -> bool {
        self.activation_state != ActivationState::DisableDeactivation
            && self.deactivation_time > deactivation_time
    }

    pub(crate) fn put_to_sleep(&mut self) {
        self.set_activation_state(ActivationState::IslandSleeping);
        self.linear_velocity = Vector3::zero();
        self.angular_velocity = Vector3::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::shape::{ShapeDescriptor, ShapeType};

    fn test_body(mass: f32) -> RigidBody {
        let desc = ShapeDescriptor::primitive(ShapeType::Box, Vector3::new(1.0, 1.0, 1.0));
        let shape = Arc::new(CollisionShape::build(&desc).expect("box should build"));
        let inertia = shape.calculate_local_inertia(mass);
        RigidBody::new(mass, ShapeHandle(0), shape, inertia)
    }

    #[test]
    fn test_zero_mass_has_no_inertia() {
        let body = test_body(0.0);
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.local_inertia(), Vector3::zero());
    }

    #[test]
    fn test_disable_states_are_pinned() {
        let mut body = test_body(1.0);
        body.force_activation_state(ActivationState::DisableSimulation);
        body.set_activation_state(ActivationState::Active);
        assert_eq!(body.activation_state(), ActivationState::DisableSimulation);
        assert!(!body.is_active());

        body.force_activation_state(ActivationState::Active);
        assert!(body.is_active());
    }

    #[test]
    fn test_activate_skips_static_bodies() {
        let mut body = test_body(0.0);
        body.set_collision_flags(collision_flags::STATIC_OBJECT);
        body.force_activation_state(ActivationState::IslandSleeping);
        body.activate();
        assert_eq!(body.activation_state(), ActivationState::IslandSleeping);
    }

    #[test]
    fn test_integrate_rotation_quarter_turn() {
        let spin = Vector3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0);
        let mut rotation = Quaternion::new(1.0, 0.0, 0.0, 0.0);
        for _ in 0..60 {
            rotation = integrate_rotation(rotation, spin, 1.0 / 60.0);
        }
        let expected = std::f32::consts::FRAC_PI_4.cos();
        assert!((rotation.s - expected).abs() < 1e-3);
        assert!((rotation.v.y - expected).abs() < 1e-3);
    }

    #[test]
    fn test_integrate_rotation_is_clamped() {
        let spin = Vector3::new(1000.0, 0.0, 0.0);
        let rotated = integrate_rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0), spin, 1.0 / 60.0);
        let half_angle = rotated.s.acos();
        assert!(half_angle <= ANGULAR_MOTION_THRESHOLD * 0.5 + 1e-4);
    }
}
