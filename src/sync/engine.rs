//! Per-tick synchronization between the entity graph and the simulation
//!
//! Lock discipline: the entity graph lock, when held, is always the outer
//! lock. Entity edits and the write-back after a step are made by callers
//! that already hold the graph lock, so they take the engine lock inside it.
//! The step itself only takes the engine lock and hands its results out as a
//! list of [`MotionUpdate`]s.

use std::collections::BTreeSet;
use std::sync::Arc;

use cgmath::{Point3, Quaternion, Vector3, Zero};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::SyncConfig;
use crate::entity::dirty::{self, EASY_PHYSICS_FLAGS, OUTGOING_MOTION_FLAGS};
use crate::entity::{EntityId, EntityItem, EntityTree};
use crate::error::{inconsistent_bridge, shape_unavailable, SyncResult};
use crate::physics::{
    collision_flags, ActivationState, BodyHandle, BridgeId, EntityMotionState, MotionBridge,
    MotionType, MotionUpdate, RigidBody, ShapeDescriptor, ShapeManager, SimulationWorld,
};

use super::packet::EntityPacketSender;

/// Summary of one `advance` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub substeps: u32,
    pub frame_count: u32,
    pub entities_moved: usize,
    pub packets_sent: usize,
}

/// Snapshot of a simulated body, in world coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    pub motion_type: MotionType,
    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub mass: f32,
    pub local_inertia: Vector3<f32>,
    pub activation_state: ActivationState,
    pub in_simulation: bool,
    pub shape: Option<ShapeDescriptor>,
}

/// Everything guarded by the engine lock
struct EngineState {
    world: SimulationWorld,
    shape_manager: ShapeManager,
    /// Sole owner of every bridge
    motion_states: FxHashMap<BridgeId, Box<dyn MotionBridge>>,
    incoming_changes: BTreeSet<BridgeId>,
    moved_this_step: Vec<EntityId>,
    outgoing_packets: BTreeSet<BridgeId>,
    frame_count: u32,
    next_bridge_id: u32,
}

impl EngineState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            world: SimulationWorld::new(config.deactivation_time, config.floor_height),
            shape_manager: ShapeManager::new(),
            motion_states: FxHashMap::default(),
            incoming_changes: BTreeSet::new(),
            moved_this_step: Vec::new(),
            outgoing_packets: BTreeSet::new(),
            frame_count: 0,
            next_bridge_id: 1,
        }
    }

    fn bridge_for(&self, entity: &EntityItem) -> Option<BridgeId> {
        entity
            .physics_info()
            .filter(|id| self.motion_states.contains_key(id))
    }

    fn add_entity(&mut self, entity: &mut EntityItem, config: &SyncConfig) -> SyncResult<()> {
        let offset = Vector3::from(config.origin_offset);
        let mut bridge: Box<dyn MotionBridge> = Box::new(EntityMotionState::new(entity, offset));
        let id = BridgeId(self.next_bridge_id);

        if let Err(e) = self.add_object(id, bridge.as_mut(), config) {
            log::debug!("Entity {} left unsimulated: {}", entity.id(), e);
            return Err(e);
        }

        self.next_bridge_id = self.next_bridge_id.wrapping_add(1);
        self.motion_states.insert(id, bridge);
        entity.take_dirty_flags();
        entity.set_physics_info(Some(id));
        Ok(())
    }

    /// Build the body for a new bridge and put it into the world
    fn add_object(
        &mut self,
        id: BridgeId,
        bridge: &mut dyn MotionBridge,
        config: &SyncConfig,
    ) -> SyncResult<()> {
        let entity_id = bridge.entity_id();
        let descriptor = bridge.compute_shape_descriptor();
        let shape_handle = self
            .shape_manager
            .get_shape(&descriptor)
            .ok_or_else(|| shape_unavailable(entity_id, "geometry cannot form a collision shape"))?;
        let Some(shape) = self.shape_manager.shape(shape_handle) else {
            self.shape_manager.release_shape(shape_handle);
            return Err(shape_unavailable(entity_id, "shape evicted while in use"));
        };

        let motion_type = bridge.compute_motion_type();
        let mut body = RigidBody::new(0.0, shape_handle, shape, Vector3::zero());
        body.user_data = u64::from(id.0);
        body.set_sleeping_thresholds(config.linear_sleeping_threshold, config.angular_sleeping_threshold);

        bridge.update_object_easy(&mut body, EASY_PHYSICS_FLAGS, self.frame_count);
        configure_motion_type(&mut body, motion_type, bridge.object_state().mass(), true);

        let handle = self.world.create_body(body);
        self.world.add_rigid_body(handle);
        bridge.object_state_mut().set_body(Some(handle));

        log::debug!("Added entity {} as {:?} ({})", entity_id, motion_type, id);
        Ok(())
    }

    fn remove_bridge(&mut self, id: BridgeId) -> bool {
        let Some(bridge) = self.motion_states.remove(&id) else {
            return false;
        };
        self.incoming_changes.remove(&id);
        self.outgoing_packets.remove(&id);
        let entity_id = bridge.entity_id();
        self.moved_this_step.retain(|moved| *moved != entity_id);

        match bridge.body().and_then(|handle| self.world.destroy_body(handle)) {
            Some(body) => {
                self.shape_manager.release_shape(body.shape_handle());
            }
            None => log::debug!("Removing bridge: {}", inconsistent_bridge(entity_id)),
        }
        true
    }

    /// Phase 1: apply pending entity edits to the bodies
    fn relay_incoming_changes_to_simulation(&mut self) {
        let frame = self.frame_count;
        let incoming = std::mem::take(&mut self.incoming_changes);

        for id in incoming {
            let Some(bridge) = self.motion_states.get_mut(&id) else {
                continue;
            };
            let flags = bridge.incoming_dirty_flags();
            if flags == 0 {
                continue;
            }

            match bridge.body() {
                Some(handle) if dirty::is_hard(flags) => update_object_hard(
                    &mut self.world,
                    &mut self.shape_manager,
                    bridge.as_mut(),
                    handle,
                    flags,
                    frame,
                ),
                Some(handle) => match self.world.body_mut(handle) {
                    Some(body) => bridge.update_object_easy(body, flags, frame),
                    None => log::debug!("Easy update skipped: {}", inconsistent_bridge(bridge.entity_id())),
                },
                None => log::debug!("Update skipped: {}", inconsistent_bridge(bridge.entity_id())),
            }

            bridge.clear_outgoing_packet_flags(trumped_outgoing_flags(flags));
            bridge.clear_incoming_dirty_flags(flags);
        }
    }

    /// Phase 3: collect simulated motion from the bodies that moved
    fn synchronize_motion_states(&mut self) -> Vec<MotionUpdate> {
        self.moved_this_step.clear();
        let moved = self.world.synchronize_motion_states();
        let mut updates = Vec::with_capacity(moved.len());

        for handle in moved {
            let Some(body) = self.world.body(handle) else {
                continue;
            };
            let id = BridgeId(body.user_data as u32);
            let Some(bridge) = self.motion_states.get_mut(&id) else {
                continue;
            };

            let update = bridge.set_world_transform(id, body);
            self.moved_this_step.push(update.entity_id);
            self.outgoing_packets.insert(id);
            updates.push(update);
        }
        updates
    }

    fn clear_all(&mut self) {
        let ids: Vec<BridgeId> = self.motion_states.keys().copied().collect();
        for id in ids {
            self.remove_bridge(id);
        }
        self.incoming_changes.clear();
        self.outgoing_packets.clear();
        self.moved_this_step.clear();
        self.shape_manager.clear();
    }
}

/// Outgoing bits that a batch of incoming edits overrides.
///
/// Incoming always wins: a processed position or velocity edit drops the
/// matching outgoing bit, and any hard edit drops all outgoing motion.
fn trumped_outgoing_flags(incoming: u32) -> u32 {
    if dirty::is_hard(incoming) {
        OUTGOING_MOTION_FLAGS
    } else {
        incoming & OUTGOING_MOTION_FLAGS
    }
}

/// Collision flags, mass and activation policy for a motion type
fn configure_motion_type(body: &mut RigidBody, motion_type: MotionType, mass: f32, update_mass: bool) {
    let flags = body.collision_flags() & !(collision_flags::STATIC_OBJECT | collision_flags::KINEMATIC_OBJECT);
    match motion_type {
        MotionType::Kinematic => {
            body.set_collision_flags(flags | collision_flags::KINEMATIC_OBJECT);
            body.set_mass_props(0.0, Vector3::zero());
            body.force_activation_state(ActivationState::DisableDeactivation);
        }
        MotionType::Dynamic => {
            body.set_collision_flags(flags);
            if update_mass {
                let inertia = body.collision_shape().calculate_local_inertia(mass);
                body.set_mass_props(mass, inertia);
            }
            body.force_activation_state(ActivationState::Active);
        }
        MotionType::Static => {
            body.set_collision_flags(flags | collision_flags::STATIC_OBJECT);
            body.set_mass_props(0.0, Vector3::zero());
            body.linear_velocity = Vector3::zero();
            body.angular_velocity = Vector3::zero();
            body.force_activation_state(ActivationState::DisableSimulation);
        }
    }
}

fn motion_type_of(body: &RigidBody) -> MotionType {
    if body.is_static_object() {
        MotionType::Static
    } else if body.is_kinematic_object() {
        MotionType::Kinematic
    } else {
        MotionType::Dynamic
    }
}

/// Pull the body out of the world, rebuild it for its new shape and motion
/// type, and put it back.
fn update_object_hard(
    world: &mut SimulationWorld,
    shapes: &mut ShapeManager,
    bridge: &mut dyn MotionBridge,
    handle: BodyHandle,
    flags: u32,
    frame: u32,
) {
    let entity_id = bridge.entity_id();
    let motion_type = bridge.compute_motion_type();
    let mut flags = flags;

    world.remove_rigid_body(handle);
    let Some(body) = world.body_mut(handle) else {
        log::debug!("Hard update skipped: {}", inconsistent_bridge(entity_id));
        return;
    };
    let was_dynamic = motion_type_of(body) == MotionType::Dynamic;

    if flags & dirty::SHAPE != 0 {
        flags |= dirty::MASS;
        let old_shape = body.shape_handle();
        let descriptor = bridge.compute_shape_descriptor();
        match shapes.get_shape(&descriptor) {
            Some(new_shape) if new_shape == old_shape => {
                shapes.release_shape(new_shape);
            }
            Some(new_shape) => match shapes.shape(new_shape) {
                Some(shape) => {
                    body.set_collision_shape(new_shape, shape);
                    shapes.release_shape(old_shape);
                }
                None => {
                    shapes.release_shape(new_shape);
                }
            },
            None => log::debug!(
                "Keeping previous shape: {}",
                shape_unavailable(entity_id, "geometry cannot form a collision shape")
            ),
        }
    }

    let easy_flags = flags & EASY_PHYSICS_FLAGS;
    if easy_flags != 0 {
        bridge.update_object_easy(body, easy_flags, frame);
    }

    let mass_applied = was_dynamic && flags & dirty::MASS != 0;
    configure_motion_type(body, motion_type, bridge.object_state().mass(), !mass_applied);

    world.add_rigid_body(handle);
    if motion_type != MotionType::Static {
        if let Some(body) = world.body_mut(handle) {
            body.activate();
        }
    }

    log::debug!("Hard update of entity {} to {:?} (flags {:#x})", entity_id, motion_type, flags);
}

/// Keeps the entity graph and the rigid-body simulation consistent
pub struct SynchronizationEngine {
    state: Mutex<EngineState>,
    sender: Arc<dyn EntityPacketSender>,
    config: SyncConfig,
}

impl SynchronizationEngine {
    /// Create an engine with its own simulation world
    pub fn new(config: SyncConfig, sender: Arc<dyn EntityPacketSender>) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(EngineState::new(&config)),
            sender,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start simulating an entity. Does nothing if it is already simulated.
    pub fn add_entity(&self, entity: &mut EntityItem) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.bridge_for(entity).is_some() {
            return Ok(());
        }
        entity.set_physics_info(None);
        state.add_entity(entity, &self.config)
    }

    /// Stop simulating an entity; returns whether it had a bridge
    pub fn remove_entity(&self, entity: &mut EntityItem) -> bool {
        let Some(id) = entity.physics_info() else {
            return false;
        };
        entity.set_physics_info(None);
        self.state.lock().remove_bridge(id)
    }

    /// Queue an entity's edits for the next step, or retry adding it
    pub fn entity_changed(&self, entity: &mut EntityItem) -> SyncResult<()> {
        let mut state = self.state.lock();
        match state.bridge_for(entity) {
            Some(id) => {
                if let Some(bridge) = state.motion_states.get_mut(&id) {
                    bridge.relay_entity_changes(entity);
                }
                state.incoming_changes.insert(id);
                Ok(())
            }
            None => {
                entity.set_physics_info(None);
                state.add_entity(entity, &self.config)
            }
        }
    }

    /// Phases 1 to 3: relay edits, step, and collect what moved.
    ///
    /// Takes only the engine lock. The returned updates are meant for
    /// [`synchronize_entities`](Self::synchronize_entities).
    pub fn step_simulation(&self, elapsed: f32) -> Vec<MotionUpdate> {
        let mut state = self.state.lock();
        state.relay_incoming_changes_to_simulation();

        let elapsed = if elapsed.is_finite() { elapsed } else { 0.0 };
        let time_step = elapsed.min(self.config.max_timestep());
        let substeps = state.world.step_simulation(
            time_step,
            self.config.max_substeps,
            self.config.fixed_substep,
        );
        state.frame_count = state.frame_count.wrapping_add(substeps);

        state.synchronize_motion_states()
    }

    /// Write simulated motion back into the entity graph.
    ///
    /// Called with the graph lock held. Properties with edits that have not
    /// reached the simulation yet are left alone.
    pub fn synchronize_entities(&self, tree: &mut EntityTree, updates: &[MotionUpdate]) {
        let state = self.state.lock();
        for update in updates {
            let Some(entity) = tree.get_mut(update.entity_id) else {
                continue;
            };
            if entity.physics_info() != Some(update.bridge) {
                continue;
            }

            let pending = entity.dirty_flags()
                | state
                    .motion_states
                    .get(&update.bridge)
                    .map_or(0, |bridge| bridge.incoming_dirty_flags());

            let position = (pending & dirty::POSITION == 0).then_some((update.position, update.rotation));
            let velocity =
                (pending & dirty::VELOCITY == 0).then_some((update.velocity, update.angular_velocity));
            entity.apply_simulation_motion(position, velocity);
        }
    }

    /// Phase 4: prune the outgoing candidates and send what is due
    pub fn send_outgoing_packets(&self) -> usize {
        let mut state = self.state.lock();
        let frame = state.frame_count;
        let EngineState {
            world,
            motion_states,
            outgoing_packets,
            ..
        } = &mut *state;

        let mut sent = 0;
        outgoing_packets.retain(|id| {
            let Some(bridge) = motion_states.get_mut(id) else {
                return false;
            };
            let body = bridge.body().and_then(|handle| world.body(handle));
            if bridge.does_not_need_to_send_update(body, &self.config) {
                return false;
            }
            let Some(body) = body else {
                return false;
            };
            // Moving, but nothing left to report since incoming edits took over
            if body.is_active() && bridge.object_state().outgoing_flags() == 0 {
                return true;
            }

            if bridge.should_send_update(body, frame, &self.config) {
                self.sender.queue_edit_entity_message(bridge.send_update(body, frame));
                sent += 1;
            }
            true
        });
        sent
    }

    /// Run one tick of the pipeline against a shared entity graph
    pub fn advance(&self, tree: &RwLock<EntityTree>, elapsed: f32) -> TickReport {
        let frame_before = self.frame_count();
        let updates = self.step_simulation(elapsed);

        let mut tree = tree.write();
        self.synchronize_entities(&mut tree, &updates);
        let packets_sent = self.send_outgoing_packets();

        let frame_count = self.frame_count();
        TickReport {
            substeps: frame_count.wrapping_sub(frame_before),
            frame_count,
            entities_moved: updates.len(),
            packets_sent,
        }
    }

    /// Release every body and shape, detaching all entities in the tree
    pub fn clear_all(&self, tree: &mut EntityTree) {
        let mut state = self.state.lock();
        let bridges = state.motion_states.len();
        state.clear_all();
        for entity in tree.iter_mut() {
            entity.set_physics_info(None);
        }
        log::info!("Cleared {} simulated entities", bridges);
    }

    pub fn entities_moved_this_step(&self) -> Vec<EntityId> {
        self.state.lock().moved_this_step.clone()
    }

    pub fn frame_count(&self) -> u32 {
        self.state.lock().frame_count
    }

    pub fn is_simulated(&self, entity: &EntityItem) -> bool {
        self.state.lock().bridge_for(entity).is_some()
    }

    pub fn bridge_count(&self) -> usize {
        self.state.lock().motion_states.len()
    }

    pub fn outgoing_count(&self) -> usize {
        self.state.lock().outgoing_packets.len()
    }

    pub fn is_outgoing(&self, entity: &EntityItem) -> bool {
        let state = self.state.lock();
        state
            .bridge_for(entity)
            .map_or(false, |id| state.outgoing_packets.contains(&id))
    }

    pub fn pending_incoming_count(&self) -> usize {
        self.state.lock().incoming_changes.len()
    }

    /// Descriptor → reference count for every cached shape
    pub fn shape_ref_counts(&self) -> FxHashMap<ShapeDescriptor, u32> {
        self.state.lock().shape_manager.ref_counts()
    }

    pub fn body_state(&self, entity: &EntityItem) -> Option<BodySnapshot> {
        let state = self.state.lock();
        let id = state.bridge_for(entity)?;
        let bridge = state.motion_states.get(&id)?;
        let handle = bridge.body()?;
        let body = state.world.body(handle)?;

        Some(BodySnapshot {
            motion_type: motion_type_of(body),
            position: body.position + bridge.object_state().origin_offset(),
            rotation: body.rotation,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            mass: body.mass(),
            local_inertia: body.local_inertia(),
            activation_state: body.activation_state(),
            in_simulation: state.world.is_in_simulation(handle),
            shape: state.shape_manager.descriptor(body.shape_handle()).cloned(),
        })
    }
}
