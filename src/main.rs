//! Headless physics sync demo
//! Drops a box onto a static slab next to a spinning kinematic sphere and
//! prints the entity updates the engine decides to broadcast.
//!
//! Usage: physics-sync [config.toml]

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use cgmath::{Point3, Vector3};

use physics_sync::physics::ShapeType;
use physics_sync::{EntityTree, EntityUpdate, PhysicalProperties, SyncConfig, SynchronizationEngine};

const TICK: f32 = 1.0 / 60.0;
const DEMO_SECONDS: f32 = 3.0;

fn scene() -> Vec<(&'static str, PhysicalProperties)> {
    let falling_box = PhysicalProperties {
        position: Point3::new(0.0, 5.0, 0.0),
        gravity: Vector3::new(0.0, -9.8, 0.0),
        mass: 2.0,
        collisions_will_move: true,
        ..PhysicalProperties::default()
    };
    let spinning_sphere = PhysicalProperties {
        shape_type: ShapeType::Sphere,
        position: Point3::new(3.0, 1.0, 0.0),
        angular_velocity: Vector3::new(0.0, 1.5, 0.0),
        ..PhysicalProperties::default()
    };
    let slab = PhysicalProperties {
        dimensions: Vector3::new(20.0, 0.5, 20.0),
        position: Point3::new(0.0, -0.25, 0.0),
        ..PhysicalProperties::default()
    };
    vec![("box", falling_box), ("sphere", spinning_sphere), ("slab", slab)]
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => SyncConfig {
            floor_height: Some(0.0),
            ..SyncConfig::default()
        },
    };

    let (tx, rx) = crossbeam_channel::unbounded::<EntityUpdate>();
    let engine = SynchronizationEngine::new(config, Arc::new(tx))?;

    let tree = EntityTree::new().into_shared();
    {
        let mut tree = tree.write();
        for (name, properties) in scene() {
            let id = tree.add_entity(properties);
            if let Some(entity) = tree.get_mut(id) {
                engine.add_entity(entity)?;
                log::info!("Added {} as entity {}", name, id);
            }
        }
    }

    let consumer = thread::spawn(move || {
        let mut received = 0usize;
        for update in rx.iter() {
            log::debug!(
                "frame {}: entity {} position {:?} moving {}",
                update.frame,
                update.entity_id,
                update.position,
                update.moving
            );
            received += 1;
        }
        received
    });

    let ticks = (DEMO_SECONDS / TICK).round() as u32;
    let mut packets = 0;
    for _ in 0..ticks {
        let report = engine.advance(&tree, TICK);
        packets += report.packets_sent;
    }

    for entity in tree.read().iter() {
        let p = entity.properties().position;
        log::info!("Entity {} at ({:.3}, {:.3}, {:.3})", entity.id(), p.x, p.y, p.z);
    }

    let frames = engine.frame_count();
    engine.clear_all(&mut tree.write());
    drop(engine);

    let received = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("update consumer panicked"))?;
    log::info!(
        "Simulated {} frames over {} ticks, sent {} updates ({} received)",
        frames,
        ticks,
        packets,
        received
    );
    Ok(())
}
