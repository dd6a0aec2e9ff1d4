//! Outgoing network notifications
//!
//! The engine only decides *whether* an entity needs to be re-broadcast and
//! what changed. Transport is somebody else's job; sending never blocks.

use crossbeam_channel::{Sender, TrySendError};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// "Entity X changed at simulation frame N"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub entity_id: EntityId,
    pub frame: u32,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub velocity: Option<Vec3>,
    pub angular_velocity: Option<Vec3>,
    /// False once the body has come to rest
    pub moving: bool,
}

impl EntityUpdate {
    pub fn carries_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn carries_velocity(&self) -> bool {
        self.velocity.is_some()
    }
}

/// Fire-and-forget sink for entity updates
pub trait EntityPacketSender: Send + Sync {
    fn queue_edit_entity_message(&self, update: EntityUpdate);
}

impl EntityPacketSender for Sender<EntityUpdate> {
    fn queue_edit_entity_message(&self, update: EntityUpdate) {
        match self.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                log::warn!("Update queue full, dropping update for entity {}", update.entity_id);
            }
            Err(TrySendError::Disconnected(update)) => {
                log::warn!("Update receiver gone, dropping update for entity {}", update.entity_id);
            }
        }
    }
}

/// Sender that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPacketSender;

impl EntityPacketSender for NullPacketSender {
    fn queue_edit_entity_message(&self, _update: EntityUpdate) {}
}

pub(crate) fn to_glam_vec(v: cgmath::Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub(crate) fn to_glam_point(p: cgmath::Point3<f32>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

pub(crate) fn to_glam_quat(q: cgmath::Quaternion<f32>) -> Quat {
    Quat::from_xyzw(q.v.x, q.v.y, q.v.z, q.s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: u32) -> EntityUpdate {
        EntityUpdate {
            entity_id: EntityId(id),
            frame: 12,
            position: Some(Vec3::new(1.0, 2.0, 3.0)),
            rotation: Some(Quat::IDENTITY),
            velocity: None,
            angular_velocity: None,
            moving: true,
        }
    }

    #[test]
    fn test_channel_sender_delivers() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.queue_edit_entity_message(update(3));
        let received = rx.try_recv().expect("update should be queued");
        assert_eq!(received.entity_id, EntityId(3));
        assert!(received.carries_position());
        assert!(!received.carries_velocity());
    }

    #[test]
    fn test_full_or_closed_channel_does_not_block() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.queue_edit_entity_message(update(1));
        tx.queue_edit_entity_message(update(2));
        assert_eq!(rx.len(), 1);

        drop(rx);
        tx.queue_edit_entity_message(update(3));
    }

    #[test]
    fn test_quat_conversion_keeps_scalar() {
        let q = to_glam_quat(cgmath::Quaternion::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(q, Quat::IDENTITY);
    }
}
