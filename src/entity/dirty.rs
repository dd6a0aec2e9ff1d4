//! Entity dirty flags
//!
//! Bits set on an entity when one of its physical properties is edited from
//! outside the simulation. The same bits mark outgoing properties on a bridge.

pub const POSITION: u32 = 1 << 0;
pub const VELOCITY: u32 = 1 << 1;
pub const MASS: u32 = 1 << 2;
pub const DAMPING: u32 = 1 << 3;
pub const MATERIAL: u32 = 1 << 4;
pub const COLLISION_GROUP: u32 = 1 << 5;
pub const MOTION_TYPE: u32 = 1 << 6;
pub const SHAPE: u32 = 1 << 7;

/// Edits that need the body pulled out of the simulation and reinserted
pub const HARD_PHYSICS_FLAGS: u32 = MOTION_TYPE | SHAPE;

/// Edits that can be applied to a live body in place
pub const EASY_PHYSICS_FLAGS: u32 = POSITION | VELOCITY | MASS | DAMPING | MATERIAL | COLLISION_GROUP;

pub const PHYSICS_FLAGS: u32 = HARD_PHYSICS_FLAGS | EASY_PHYSICS_FLAGS;

/// Properties a moving body reports back to the network
pub const OUTGOING_MOTION_FLAGS: u32 = POSITION | VELOCITY;

pub fn is_hard(flags: u32) -> bool {
    flags & HARD_PHYSICS_FLAGS != 0
}

pub fn is_easy(flags: u32) -> bool {
    flags & EASY_PHYSICS_FLAGS != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_and_easy_are_disjoint() {
        assert_eq!(HARD_PHYSICS_FLAGS & EASY_PHYSICS_FLAGS, 0);
        assert_eq!(PHYSICS_FLAGS, HARD_PHYSICS_FLAGS | EASY_PHYSICS_FLAGS);
    }

    #[test]
    fn test_classification() {
        assert!(is_hard(SHAPE | MASS));
        assert!(is_easy(SHAPE | MASS));
        assert!(!is_hard(POSITION | DAMPING));
        assert!(!is_easy(MOTION_TYPE));
    }
}
