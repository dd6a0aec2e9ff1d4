// Entity ↔ physics synchronization integration tests
//
// Drives the engine the way a host would: entities live in a shared tree,
// edits are reported while holding the tree lock, and `advance` runs once
// per tick. Network output is observed through a channel receiver.

use std::sync::Arc;
use std::thread;

use cgmath::{Point3, Vector3, Zero};
use crossbeam_channel::Receiver;
use physics_sync::physics::{ActivationState, CollisionShape, MotionType, ShapeDescriptor, ShapeType};
use physics_sync::{
    EntityId, EntityTree, EntityUpdate, PhysicalProperties, SharedEntityTree, SyncConfig,
    SynchronizationEngine,
};

const TICK: f32 = 1.0 / 60.0;

fn setup(config: SyncConfig) -> (SynchronizationEngine, SharedEntityTree, Receiver<EntityUpdate>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let engine = SynchronizationEngine::new(config, Arc::new(tx)).expect("Failed to create engine");
    (engine, EntityTree::new().into_shared(), rx)
}

fn dynamic_box(mass: f32) -> PhysicalProperties {
    PhysicalProperties {
        mass,
        collisions_will_move: true,
        ..PhysicalProperties::default()
    }
}

fn spawn(engine: &SynchronizationEngine, tree: &SharedEntityTree, properties: PhysicalProperties) -> EntityId {
    let mut tree = tree.write();
    let id = tree.add_entity(properties);
    let entity = tree.get_mut(id).expect("entity should exist");
    engine.add_entity(entity).expect("Failed to add entity");
    id
}

fn unit_box() -> ShapeDescriptor {
    ShapeDescriptor::primitive(ShapeType::Box, Vector3::new(1.0, 1.0, 1.0))
}

#[test]
fn test_at_most_one_bridge_per_entity() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    let id = spawn(&engine, &tree, dynamic_box(1.0));

    {
        let mut tree = tree.write();
        let entity = tree.get_mut(id).expect("entity should exist");
        for _ in 0..3 {
            engine.add_entity(entity).expect("Failed to add entity");
        }
        assert!(engine.is_simulated(entity));
    }

    assert_eq!(engine.bridge_count(), 1);
    assert_eq!(engine.shape_ref_counts().get(&unit_box()), Some(&1));
}

#[test]
fn test_shapes_are_shared_and_evicted() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    let a = spawn(&engine, &tree, dynamic_box(1.0));
    let b = spawn(&engine, &tree, PhysicalProperties::default());
    assert_eq!(engine.shape_ref_counts().get(&unit_box()), Some(&2));

    let mut tree = tree.write();
    let entity = tree.get_mut(a).expect("entity should exist");
    assert!(engine.remove_entity(entity));
    assert_eq!(engine.shape_ref_counts().get(&unit_box()), Some(&1));

    let entity = tree.get_mut(b).expect("entity should exist");
    assert!(engine.remove_entity(entity));
    assert!(engine.shape_ref_counts().get(&unit_box()).is_none());
    assert!(engine.shape_ref_counts().is_empty());
}

#[test]
fn test_static_body_is_not_stepped() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    let id = spawn(&engine, &tree, dynamic_box(1.0));

    {
        let mut tree = tree.write();
        let entity = tree.get_mut(id).expect("entity should exist");
        entity.set_collisions_will_move(false);
        entity.set_velocity(Vector3::new(0.0, 3.0, 0.0));
        entity.set_velocity(Vector3::zero());
        engine.entity_changed(entity).expect("Failed to queue edit");
    }
    engine.advance(&tree, TICK);

    {
        let guard = tree.read();
        let entity = guard.get(id).expect("entity should exist");
        let snapshot = engine.body_state(entity).expect("body should exist");
        assert_eq!(snapshot.motion_type, MotionType::Static);
        assert_eq!(snapshot.linear_velocity, Vector3::zero());
        assert_eq!(snapshot.angular_velocity, Vector3::zero());
        assert_eq!(snapshot.activation_state, ActivationState::DisableSimulation);
        assert!(snapshot.in_simulation);
    }

    for _ in 0..30 {
        let report = engine.advance(&tree, TICK);
        assert_eq!(report.entities_moved, 0);
    }
    let tree = tree.read();
    assert_eq!(tree.get(id).map(|e| e.properties().position), Some(Point3::new(0.0, 0.0, 0.0)));
}

#[test]
fn test_long_frame_is_clamped_to_max_substeps() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    spawn(&engine, &tree, dynamic_box(1.0));

    let before = engine.frame_count();
    let report = engine.advance(&tree, 10.0);
    assert_eq!(report.substeps, 4);
    assert_eq!(engine.frame_count(), before + 4);

    let report = engine.advance(&tree, 10.0);
    assert_eq!(report.frame_count, before + 8);
}

#[test]
fn test_frame_counter_follows_substeps_not_wall_time() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    for _ in 0..4 {
        engine.advance(&tree, TICK * 0.5);
    }
    assert_eq!(engine.frame_count(), 2);
}

#[test]
fn test_settled_object_leaves_outgoing_set() {
    let config = SyncConfig {
        deactivation_time: 0.1,
        non_moving_update_period: 0.0,
        max_non_moving_updates: 1,
        ..SyncConfig::default()
    };
    let (engine, tree, rx) = setup(config);
    let id = spawn(
        &engine,
        &tree,
        PhysicalProperties {
            velocity: Vector3::new(0.01, 0.0, 0.0),
            ..dynamic_box(1.0)
        },
    );

    engine.advance(&tree, TICK);
    assert!(engine.is_outgoing(tree.read().get(id).expect("entity should exist")));

    for _ in 0..60 {
        engine.advance(&tree, TICK);
    }

    let tree = tree.read();
    let entity = tree.get(id).expect("entity should exist");
    assert!(!engine.is_outgoing(entity));
    assert_eq!(engine.outgoing_count(), 0);

    let updates: Vec<EntityUpdate> = rx.try_iter().collect();
    assert_eq!(updates.len(), 1);
    assert!(!updates[0].moving);
    assert!(updates[0].position.is_some());
    assert_eq!(updates[0].entity_id, id);
}

#[test]
fn test_add_remove_round_trip_keeps_shape_cache() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    spawn(&engine, &tree, dynamic_box(1.0));
    spawn(
        &engine,
        &tree,
        PhysicalProperties {
            shape_type: ShapeType::Sphere,
            ..PhysicalProperties::default()
        },
    );
    let before = engine.shape_ref_counts();

    let mut tree = tree.write();
    let id = tree.add_entity(dynamic_box(5.0));
    let entity = tree.get_mut(id).expect("entity should exist");
    engine.add_entity(entity).expect("Failed to add entity");
    assert_ne!(engine.shape_ref_counts(), before);
    assert!(engine.remove_entity(entity));

    assert_eq!(engine.shape_ref_counts(), before);
}

#[test]
fn test_box_resize_scenario() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    let old_shape = unit_box();
    let new_shape = ShapeDescriptor::primitive(ShapeType::Box, Vector3::new(2.0, 1.0, 1.0));

    let id = spawn(&engine, &tree, dynamic_box(2.0));
    assert_eq!(engine.shape_ref_counts().get(&old_shape), Some(&1));
    assert_eq!(engine.frame_count(), 0);
    {
        let tree = tree.read();
        let snapshot = engine
            .body_state(tree.get(id).expect("entity should exist"))
            .expect("body should exist");
        assert_eq!(snapshot.motion_type, MotionType::Dynamic);
        assert_eq!(snapshot.mass, 2.0);
    }

    {
        let mut tree = tree.write();
        let entity = tree.get_mut(id).expect("entity should exist");
        entity.set_dimensions(Vector3::new(2.0, 1.0, 1.0));
        engine.entity_changed(entity).expect("Failed to queue edit");
    }
    assert_eq!(engine.pending_incoming_count(), 1);
    engine.advance(&tree, TICK);

    let counts = engine.shape_ref_counts();
    assert!(counts.get(&old_shape).is_none());
    assert_eq!(counts.get(&new_shape), Some(&1));

    let expected_inertia = CollisionShape::build(&new_shape)
        .expect("shape should build")
        .calculate_local_inertia(2.0);
    {
        let tree = tree.read();
        let snapshot = engine
            .body_state(tree.get(id).expect("entity should exist"))
            .expect("body should exist");
        assert_eq!(snapshot.shape.as_ref(), Some(&new_shape));
        assert_eq!(snapshot.mass, 2.0);
        assert_eq!(snapshot.local_inertia, expected_inertia);
        assert!(snapshot.in_simulation);
        assert_eq!(snapshot.activation_state, ActivationState::Active);
    }

    let mut tree = tree.write();
    let entity = tree.get_mut(id).expect("entity should exist");
    assert!(engine.remove_entity(entity));
    assert!(entity.physics_info().is_none());
    assert!(engine.shape_ref_counts().is_empty());
    assert_eq!(engine.bridge_count(), 0);
}

#[test]
fn test_resize_within_quantum_keeps_single_shape_reference() {
    let (engine, tree, _rx) = setup(SyncConfig::default());
    let id = spawn(&engine, &tree, dynamic_box(1.0));
    assert_eq!(engine.shape_ref_counts().get(&unit_box()), Some(&1));

    {
        let mut tree = tree.write();
        let entity = tree.get_mut(id).expect("entity should exist");
        entity.set_dimensions(Vector3::new(1.0001, 1.0, 1.0));
        engine.entity_changed(entity).expect("Failed to queue edit");
    }
    assert_eq!(engine.pending_incoming_count(), 1);
    engine.advance(&tree, TICK);

    let counts = engine.shape_ref_counts();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get(&unit_box()), Some(&1));

    let tree = tree.read();
    let snapshot = engine
        .body_state(tree.get(id).expect("entity should exist"))
        .expect("body should exist");
    assert_eq!(snapshot.shape.as_ref(), Some(&unit_box()));
    assert!(snapshot.in_simulation);
}

#[test]
fn test_kinematic_entity_is_not_rebroadcast() {
    let (engine, tree, rx) = setup(SyncConfig::default());
    let id = spawn(
        &engine,
        &tree,
        PhysicalProperties {
            velocity: Vector3::new(1.0, 0.0, 0.0),
            gravity: Vector3::new(0.0, -9.8, 0.0),
            ..PhysicalProperties::default()
        },
    );
    assert!(PhysicalProperties::default().linear_damping > 0.0);

    for _ in 0..120 {
        engine.advance(&tree, TICK);
    }

    let tree = tree.read();
    let entity = tree.get(id).expect("entity should exist");
    let snapshot = engine.body_state(entity).expect("body should exist");
    assert_eq!(snapshot.motion_type, MotionType::Kinematic);
    assert!((entity.properties().position.x - 2.0).abs() < 0.01);
    assert_eq!(entity.properties().position.y, 0.0);
    assert_eq!(rx.try_iter().count(), 0);
}

#[test]
fn test_falling_box_is_broadcast_in_world_coordinates() {
    let config = SyncConfig {
        origin_offset: [100.0, 0.0, 0.0],
        ..SyncConfig::default()
    };
    let (engine, tree, rx) = setup(config);
    let id = spawn(
        &engine,
        &tree,
        PhysicalProperties {
            position: Point3::new(100.0, 10.0, 0.0),
            gravity: Vector3::new(0.0, -9.8, 0.0),
            ..dynamic_box(1.0)
        },
    );

    for _ in 0..30 {
        engine.advance(&tree, TICK);
    }

    let updates: Vec<EntityUpdate> = rx.try_iter().collect();
    assert!(!updates.is_empty());
    for update in &updates {
        assert_eq!(update.entity_id, id);
        assert!(update.moving);
        let position = update.position.expect("moving update carries position");
        assert!((position.x - 100.0).abs() < 1e-3);
        assert!(position.y < 10.0);
    }

    let tree = tree.read();
    let entity = tree.get(id).expect("entity should exist");
    assert!(entity.properties().position.y < 10.0);
    assert!((entity.properties().position.x - 100.0).abs() < 1e-3);
    assert_eq!(entity.dirty_flags(), 0);
    assert_eq!(engine.entities_moved_this_step(), vec![id]);
}

#[test]
fn test_edits_from_another_thread() {
    let (engine, tree, rx) = setup(SyncConfig {
        floor_height: Some(0.0),
        ..SyncConfig::default()
    });
    let engine = Arc::new(engine);
    let ids: Vec<EntityId> = (0..4)
        .map(|i| {
            spawn(
                &engine,
                &tree,
                PhysicalProperties {
                    position: Point3::new(i as f32 * 2.0, 3.0, 0.0),
                    gravity: Vector3::new(0.0, -9.8, 0.0),
                    ..dynamic_box(1.0)
                },
            )
        })
        .collect();

    let editor = {
        let engine = Arc::clone(&engine);
        let tree = Arc::clone(&tree);
        let ids = ids.clone();
        thread::spawn(move || {
            for round in 0..100 {
                let mut tree = tree.write();
                for id in &ids {
                    if let Some(entity) = tree.get_mut(*id) {
                        entity.set_restitution(if round % 2 == 0 { 0.2 } else { 0.8 });
                        engine.entity_changed(entity).expect("Failed to queue edit");
                    }
                }
            }
        })
    };

    for _ in 0..100 {
        engine.advance(&tree, TICK);
    }
    editor.join().expect("editor thread panicked");
    engine.advance(&tree, TICK);

    assert_eq!(engine.bridge_count(), ids.len());
    assert_eq!(engine.pending_incoming_count(), 0);
    let tree = tree.read();
    for id in &ids {
        let entity = tree.get(*id).expect("entity should exist");
        assert!(entity.properties().position.y >= 0.5 - 1e-3);
        assert_eq!(entity.properties().restitution, 0.8);
    }
    assert!(rx.try_iter().count() > 0);
}
