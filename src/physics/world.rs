use std::collections::BTreeSet;

use cgmath::{Point3, Quaternion, Vector3};
use rustc_hash::FxHashMap;

use super::body::{integrate_rotation, RigidBody};

/// Handle to a body stored in the simulation world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Slack when counting whole substeps, so exact multiples are not lost to rounding
const SUBSTEP_EPSILON: f32 = 1.0e-6;
/// Upward speed below which a body resting on the floor stops bouncing
const FLOOR_REST_SPEED: f32 = 0.1;

/// Rigid-body world with zero global gravity.
///
/// Bodies are created detached and only take part in stepping after
/// `add_rigid_body`. Every body carries its own gravity vector.
pub struct SimulationWorld {
    bodies: FxHashMap<BodyHandle, RigidBody>,
    /// Bodies currently in the simulation, in insertion order
    collision_objects: Vec<BodyHandle>,
    next_handle: u32,
    local_time: f32,
    deactivation_time: f32,
    floor_height: Option<f32>,
    moved: BTreeSet<BodyHandle>,
}

impl SimulationWorld {
    pub fn new(deactivation_time: f32, floor_height: Option<f32>) -> Self {
        Self {
            bodies: FxHashMap::default(),
            collision_objects: Vec::new(),
            next_handle: 1,
            local_time: 0.0,
            deactivation_time,
            floor_height,
            moved: BTreeSet::new(),
        }
    }

    /// Store a body without adding it to the simulation
    pub fn create_body(&mut self, body: RigidBody) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.bodies.insert(handle, body);
        handle
    }

    /// Remove a body from the simulation and from storage
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        self.remove_rigid_body(handle);
        self.moved.remove(&handle);
        self.bodies.remove(&handle)
    }

    pub fn add_rigid_body(&mut self, handle: BodyHandle) -> bool {
        if !self.bodies.contains_key(&handle) || self.collision_objects.contains(&handle) {
            return false;
        }
        self.collision_objects.push(handle);
        true
    }

    pub fn remove_rigid_body(&mut self, handle: BodyHandle) -> bool {
        let before = self.collision_objects.len();
        self.collision_objects.retain(|h| *h != handle);
        before != self.collision_objects.len()
    }

    pub fn is_in_simulation(&self, handle: BodyHandle) -> bool {
        self.collision_objects.contains(&handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(&handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(&handle)
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn num_collision_objects(&self) -> usize {
        self.collision_objects.len()
    }

    /// Advance by whole fixed substeps.
    ///
    /// `time_step` is added to the local clock; at most `max_substeps` of the
    /// whole substeps it contains are simulated. Returns the substeps taken.
    pub fn step_simulation(&mut self, time_step: f32, max_substeps: u32, fixed_substep: f32) -> u32 {
        if max_substeps == 0 || !(fixed_substep > 0.0) || !(time_step >= 0.0) {
            return 0;
        }

        self.local_time += time_step;
        let whole = ((self.local_time + SUBSTEP_EPSILON) / fixed_substep).floor() as u32;
        self.local_time = (self.local_time - whole as f32 * fixed_substep).max(0.0);

        let substeps = whole.min(max_substeps);
        for _ in 0..substeps {
            self.internal_single_step(fixed_substep);
        }
        substeps
    }

    fn internal_single_step(&mut self, dt: f32) {
        for handle in &self.collision_objects {
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_static_object() || !body.is_active() {
                continue;
            }

            let position = body.position;
            let rotation = body.rotation;

            if body.is_kinematic_object() {
                integrate_transform(body, dt);
            } else if body.inverse_mass() > 0.0 {
                let gravity = body.gravity;
                body.linear_velocity += gravity * dt;
                body.linear_velocity *= (1.0 - body.linear_damping).powf(dt);
                body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);
                integrate_transform(body, dt);

                if let Some(floor) = self.floor_height {
                    resolve_floor_contact(body, floor, dt);
                }

                body.update_deactivation(dt);
                if body.wants_sleeping(self.deactivation_time) {
                    body.put_to_sleep();
                    self.moved.insert(*handle);
                }
            }

            if body.position != position || body.rotation != rotation {
                self.moved.insert(*handle);
            }
        }
    }

    /// Drain the bodies that moved (or fell asleep) since the last call
    pub fn synchronize_motion_states(&mut self) -> Vec<BodyHandle> {
        let moved = std::mem::take(&mut self.moved);
        moved
            .into_iter()
            .filter(|handle| self.bodies.contains_key(handle))
            .collect()
    }
}

fn integrate_transform(body: &mut RigidBody, dt: f32) {
    let velocity: Vector3<f32> = body.linear_velocity;
    body.position += velocity * dt;
    if body.angular_velocity != Vector3::new(0.0, 0.0, 0.0) {
        let rotation: Quaternion<f32> = body.rotation;
        body.rotation = integrate_rotation(rotation, body.angular_velocity, dt);
    }
}

fn resolve_floor_contact(body: &mut RigidBody, floor: f32, dt: f32) {
    let half_height = body.collision_shape().half_extents().y;
    let bottom = body.position.y - half_height;
    if bottom >= floor {
        return;
    }

    body.position = Point3::new(body.position.x, floor + half_height, body.position.z);
    if body.linear_velocity.y < 0.0 {
        let bounce = -body.linear_velocity.y * body.restitution;
        body.linear_velocity.y = if bounce < FLOOR_REST_SPEED { 0.0 } else { bounce };
    }

    let slide = (1.0 - body.friction).clamp(0.0, 1.0).powf(dt);
    body.linear_velocity.x *= slide;
    body.linear_velocity.z *= slide;
}
